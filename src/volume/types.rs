use super::error::PluginError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

/// A Docker volume name.
///
/// Names are joined onto the mount root, so anything that could escape it
/// (`/`, NUL, `.`/`..`) is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct VolumeName(String);

impl VolumeName {
    pub fn new<S: Into<String>>(name: S) -> Result<Self, PluginError> {
        let s = name.into();
        Self::validate(&s)?;
        Ok(Self(s))
    }

    fn validate(s: &str) -> Result<(), PluginError> {
        if s.is_empty() {
            return Err(PluginError::Validation("Volume name cannot be empty".into()));
        }
        if s == "." || s == ".." {
            return Err(PluginError::Validation(format!(
                "Volume name cannot be '{}'",
                s
            )));
        }
        if s.contains('/') {
            return Err(PluginError::Validation(format!(
                "Volume name cannot contain slashes: '{}'",
                s
            )));
        }
        if s.contains('\0') {
            return Err(PluginError::Validation(
                "Volume name cannot contain null bytes".into(),
            ));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for VolumeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<std::path::Path> for VolumeName {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

impl Deref for VolumeName {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for VolumeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for VolumeName {
    type Error = PluginError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl FromStr for VolumeName {
    type Err = PluginError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(VolumeName::new("testvol").is_ok());
        assert!(VolumeName::new("my-app_data.1").is_ok());
    }

    #[test]
    fn test_rejects_path_escapes() {
        assert!(VolumeName::new("").is_err());
        assert!(VolumeName::new("..").is_err());
        assert!(VolumeName::new("a/b").is_err());
        assert!(VolumeName::new("a\0b").is_err());
    }
}
