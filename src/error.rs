use crate::config::ConfigError;
use crate::http::ClientError;
use crate::logging::LoggingError;
use sysexits::ExitCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XylemError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl XylemError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            XylemError::Config(e) => match e {
                ConfigError::Io(_) => ExitCode::NoInput,
                ConfigError::Parse(_) => ExitCode::Config,
                ConfigError::Validation(_) => ExitCode::Usage,
            },
            XylemError::Logging(_) => ExitCode::Config,
            XylemError::Client(e) => match e {
                ClientError::TlsUnavailable | ClientError::InvalidUrl(_) => ExitCode::Config,
                _ => ExitCode::Unavailable,
            },
            XylemError::Io(e) => match e.kind() {
                std::io::ErrorKind::PermissionDenied => ExitCode::NoPerm,
                _ => ExitCode::IoErr,
            },
        }
    }
}

impl From<XylemError> for ExitCode {
    fn from(e: XylemError) -> Self {
        let code = e.exit_code();
        tracing::error!(exit_code = code as u8, "{}", e);
        code
    }
}
