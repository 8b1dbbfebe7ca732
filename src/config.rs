//! Layered configuration.
//!
//! A TOML file forms the base layer; CLI flags and environment variables are
//! overlaid on top of it. Defaults declared with `#[xylem(default = ...)]` fill
//! whatever is still unset, and the merged args are converted into a resolved
//! config struct.
use crate::error::XylemError;
use crate::path::AbsolutePath;
use clap::Args;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0}")]
    Validation(String),
}

/// Trait for merging two partial structs.
pub trait Overlay {
    /// self is the base layer, over is the top layer.
    fn overlay(self, over: Self) -> Self;
}

impl<T> Overlay for Option<T> {
    fn overlay(self, over: Self) -> Self {
        over.or(self)
    }
}

impl<T> Overlay for Vec<T> {
    fn overlay(self, over: Self) -> Self {
        if over.is_empty() { self } else { over }
    }
}

/// Fills unset optional fields from `#[xylem(default = ...)]`.
pub trait ApplyDefaults {
    fn apply_defaults(self) -> Self;
}

#[derive(Args, Debug, Clone)]
pub struct LayeredArgs<T: Args> {
    /// Path to configuration file
    #[arg(long, env = "XYLEM_CONFIG")]
    pub config: Option<AbsolutePath>,

    #[command(flatten)]
    pub inner: T,
}

impl<T> LayeredArgs<T>
where
    T: Args,
{
    pub fn load<C>(self) -> Result<C, XylemError>
    where
        T: Layered<C>,
    {
        self.inner.resolve(self.config.as_deref())
    }
}

pub trait Layered<C>: Overlay + DeserializeOwned + Default + Sized {
    fn resolve(self, config_path: Option<&Path>) -> Result<C, XylemError>;
}

impl<T, C> Layered<C> for T
where
    T: Overlay + DeserializeOwned + Default,
    T: TryInto<C>,
    <T as TryInto<C>>::Error: Into<XylemError>,
{
    fn resolve(self, config_path: Option<&Path>) -> Result<C, XylemError> {
        let base = match config_path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
                toml::from_str::<Self>(&content).map_err(ConfigError::Parse)?
            }
            _ => Self::default(),
        };

        base.overlay(self).try_into().map_err(Into::into)
    }
}

/// An upper bound on how long an external call may take.
///
/// Unitless numbers are seconds; anything else goes through humantime
/// (`"90s"`, `"1h"`, `"500ms"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeout(pub Duration);

impl Timeout {
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }
}

impl FromStr for Timeout {
    type Err = humantime::DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(secs) = s.parse::<u64>() {
            return Ok(Timeout(Duration::from_secs(secs)));
        }
        humantime::parse_duration(s).map(Timeout)
    }
}

impl TryFrom<String> for Timeout {
    type Error = humantime::DurationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Timeout> for String {
    fn from(t: Timeout) -> Self {
        t.to_string()
    }
}

impl From<Timeout> for Duration {
    fn from(t: Timeout) -> Self {
        t.0
    }
}

impl std::fmt::Display for Timeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", humantime::format_duration(self.0))
    }
}
