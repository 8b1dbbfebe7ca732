use anyhow::Context;
use clap::{Arg, Args, CommandFactory};
use docker_xylem::cmd::Cli;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::ser::{PrettyFormatter, Serializer as JsonSerializer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::{fs, process};

/// Daemon arguments that only make sense outside the managed plugin.
const HIDDEN_ARGS: &[&str] = &["config"];

#[derive(Args)]
pub struct ManifestArgs {
    /// Managed plugin manifest to update
    #[arg(long, default_value = "docker/plugin/config.json")]
    manifest: PathBuf,

    /// Fail if the manifest is out of date instead of rewriting it
    #[arg(long)]
    check: bool,
}

/// One entry of the manifest's `env` block.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct ManifestEnv {
    name: String,
    description: String,
    settable: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

impl ManifestEnv {
    fn from_arg(arg: &Arg, pinned: &HashMap<String, String>) -> Option<Self> {
        if HIDDEN_ARGS.contains(&arg.get_id().as_str()) {
            return None;
        }
        let name = arg.get_env()?.to_string_lossy().into_owned();
        Some(Self {
            description: arg.get_help().map(ToString::to_string).unwrap_or_default(),
            settable: vec!["value".into()],
            value: pinned.get(&name).cloned(),
            name,
        })
    }
}

impl ManifestArgs {
    pub fn run(self) -> anyhow::Result<()> {
        let current = fs::read_to_string(&self.manifest)
            .with_context(|| format!("reading {}", self.manifest.display()))?;
        let updated = render(&sync_env(serde_json::from_str(&current)?)?)?;

        if !self.check {
            return write(&self.manifest, &updated);
        }
        if normalize(&current) != normalize(&updated) {
            eprintln!("{} is stale. Run 'cargo xtask plugin' to update.", self.manifest.display());
            process::exit(1);
        }
        println!("{} is up to date.", self.manifest.display());
        Ok(())
    }
}

/// Rebuilds `env` from the `serve` flags, keeping values pinned in the manifest.
fn sync_env(mut manifest: Value) -> anyhow::Result<Value> {
    let cli = Cli::command();
    let serve = cli
        .get_subcommands()
        .find(|c| c.get_name() == "serve")
        .context("serve subcommand not found")?;

    let pinned = pinned_values(&manifest);
    let mut env: Vec<_> = serve
        .get_arguments()
        .filter_map(|arg| ManifestEnv::from_arg(arg, &pinned))
        .collect();
    env.sort_by(|a, b| a.name.cmp(&b.name));

    manifest["env"] = serde_json::to_value(env)?;
    Ok(manifest)
}

/// Values the manifest sets explicitly. Anything else falls back to the
/// daemon's own layered defaults at runtime.
fn pinned_values(manifest: &Value) -> HashMap<String, String> {
    let entries: Vec<ManifestEnv> = manifest
        .get("env")
        .and_then(|env| serde_json::from_value(env.clone()).ok())
        .unwrap_or_default();
    entries
        .into_iter()
        .filter_map(|e| Some((e.name, e.value?)))
        .collect()
}

fn render(manifest: &Value) -> anyhow::Result<String> {
    let mut out = Vec::new();
    let mut ser = JsonSerializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    manifest.serialize(&mut ser)?;
    out.push(b'\n');
    Ok(String::from_utf8(out)?)
}

fn write(path: &Path, content: &str) -> anyhow::Result<()> {
    fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    println!("Updated {}", path.display());
    Ok(())
}

fn normalize(s: &str) -> String {
    s.trim().replace("\r\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env_of(manifest: &Value) -> Vec<ManifestEnv> {
        serde_json::from_value(manifest["env"].clone()).unwrap()
    }

    #[test]
    fn test_env_follows_serve_flags() {
        let manifest = sync_env(json!({"interface": {"socket": "xylem.sock"}})).unwrap();
        let env = env_of(&manifest);

        let names: Vec<_> = env.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"XYLEM_HOST"));
        assert!(!names.contains(&"XYLEM_CONFIG"));
        assert!(names.windows(2).all(|w| w[0] < w[1]));
        assert!(env.iter().all(|e| e.value.is_none()));
        assert_eq!(manifest["interface"]["socket"], "xylem.sock");
    }

    #[test]
    fn test_pinned_values_survive() {
        let manifest = sync_env(json!({
            "env": [
                {"name": "XYLEM_MOUNT_PATH", "description": "old", "settable": ["value"], "value": "/mnt/volumes"},
                {"name": "XYLEM_GONE", "description": "removed flag", "settable": ["value"], "value": "x"}
            ]
        }))
        .unwrap();
        let env = env_of(&manifest);

        let mount_path = env.iter().find(|e| e.name == "XYLEM_MOUNT_PATH").unwrap();
        assert_eq!(mount_path.value.as_deref(), Some("/mnt/volumes"));
        assert_ne!(mount_path.description, "old");
        assert!(env.iter().all(|e| e.name != "XYLEM_GONE"));
    }

    #[test]
    fn test_render_is_stable() {
        let manifest = sync_env(json!({})).unwrap();
        let rendered = render(&manifest).unwrap();
        assert!(rendered.ends_with("}\n"));
        assert_eq!(render(&serde_json::from_str(&rendered).unwrap()).unwrap(), rendered);
    }
}
