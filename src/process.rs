//! Bounded execution of external commands.
//!
//! [`ProcessRunner`] spawns a program, captures stdout and stderr, and waits
//! for it with an upper bound that also covers draining its output. When the
//! bound expires the child is sent `SIGKILL`; if it exited in the meantime
//! the resulting `ESRCH` is ignored.
//! Nothing is retried: each [`Invocation`] is executed exactly once.

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, warn};

/// Commands are a safety net against hangs, not an SLA.
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("process I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{program} exited with status {code}: {}", .stderr.trim())]
    Exited {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("{program} terminated by signal {signal}")]
    Signaled { program: String, signal: i32 },

    #[error("{program} did not finish within {}", format_timeout(.timeout))]
    Timeout { program: String, timeout: Duration },
}

fn format_timeout(timeout: &Duration) -> String {
    humantime::format_duration(*timeout).to_string()
}

impl ProcessError {
    /// Captured stderr for a non-zero exit, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ProcessError::Exited { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// Output of a command that exited on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub code: i32,
}

impl ProcessOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// A single external command to run.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub workdir: Option<PathBuf>,
    pub timeout: Duration,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            workdir: None,
            timeout: DEFAULT_PROCESS_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, val: impl Into<String>) -> Self {
        self.env.insert(key.into(), val.into());
        self
    }

    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: impl Into<Duration>) -> Self {
        self.timeout = timeout.into();
        self
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for a in &self.args {
            write!(f, " {}", a)?;
        }
        Ok(())
    }
}

/// Seam for running external commands, so orchestration logic can be
/// exercised without touching the host.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: Invocation) -> Result<ProcessOutput, ProcessError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: Invocation) -> Result<ProcessOutput, ProcessError> {
        let Invocation {
            program,
            args,
            env,
            workdir,
            timeout,
        } = invocation;

        let mut command = Command::new(&program);
        command
            .args(&args)
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &workdir {
            command.current_dir(dir);
        }

        debug!(program = %program, args = ?args, "spawning process");
        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

        // Both pipes are drained while waiting, or a full pipe stalls the child.
        let stdout = AbortOnDropHandle::new(tokio::spawn(drain(child.stdout.take())));
        let stderr = AbortOnDropHandle::new(tokio::spawn(drain(child.stderr.take())));

        // A grandchild can hold the pipes open after the child exits; the
        // deadline covers the reads as well as the wait.
        let exchange = async {
            let status = child.wait().await?;
            let (stdout, stderr) = tokio::join!(stdout, stderr);
            let stdout = stdout.map_err(std::io::Error::other)??;
            let stderr = stderr.map_err(std::io::Error::other)??;
            Ok::<_, ProcessError>((status, stdout, stderr))
        };
        let outcome = tokio::time::timeout(timeout, exchange).await;

        let (status, stdout, stderr) = match outcome {
            Ok(result) => result?,
            Err(_) => {
                if let Some(id) = child.id() {
                    match signal::kill(Pid::from_raw(id as i32), Signal::SIGKILL) {
                        Ok(()) => {
                            info!(program = %program, timeout = ?timeout, "killed process: timeout exceeded")
                        }
                        Err(Errno::ESRCH) => {}
                        Err(e) => warn!(program = %program, "failed to kill process: {}", e),
                    }
                } else {
                    warn!(program = %program, timeout = ?timeout, "output still open after exit: timeout exceeded");
                }
                let _ = child.wait().await;
                return Err(ProcessError::Timeout { program, timeout });
            }
        };

        match status.code() {
            Some(0) => Ok(ProcessOutput {
                stdout,
                stderr,
                code: 0,
            }),
            Some(code) => Err(ProcessError::Exited {
                program,
                code,
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            }),
            None => {
                use std::os::unix::process::ExitStatusExt;
                Err(ProcessError::Signaled {
                    program,
                    signal: status.signal().unwrap_or_default(),
                })
            }
        }
    }
}

async fn drain<R>(pipe: Option<R>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}
