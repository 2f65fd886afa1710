//! gridsched.toml configuration parser.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub state: StateConfig,
}

/// Where cluster state lives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub backend: StateBackend,
    /// Database file; required for the `disk` backend.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateBackend {
    #[default]
    Memory,
    Disk,
}

impl SchedulerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: SchedulerConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_defaults_to_memory() {
        let config = SchedulerConfig::from_toml_str("").unwrap();
        assert_eq!(config.state.backend, StateBackend::Memory);
        assert!(config.state.path.is_none());
    }

    #[test]
    fn test_parse_disk_backend() {
        let toml_str = r#"
[state]
backend = "disk"
path = "/var/lib/gridsched/state.redb"
"#;
        let config = SchedulerConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.state.backend, StateBackend::Disk);
        assert_eq!(
            config.state.path.as_deref(),
            Some(Path::new("/var/lib/gridsched/state.redb"))
        );
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let toml_str = r#"
[state]
backend = "etcd"
"#;
        assert!(SchedulerConfig::from_toml_str(toml_str).is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = SchedulerConfig {
            state: StateConfig {
                backend: StateBackend::Disk,
                path: Some(PathBuf::from("state.redb")),
            },
        };
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("disk"));
        assert_eq!(SchedulerConfig::from_toml_str(&toml_str).unwrap(), config);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gridsched.toml");
        std::fs::write(
            &path,
            "[state]\nbackend = \"disk\"\npath = \"state.redb\"\n",
        )
        .unwrap();

        let config = SchedulerConfig::from_file(&path).unwrap();
        assert_eq!(config.state.backend, StateBackend::Disk);
        assert_eq!(config.state.path, Some(PathBuf::from("state.redb")));
    }

    #[test]
    fn test_from_file_missing_or_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SchedulerConfig::from_file(&dir.path().join("absent.toml")).is_err());

        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[state\nbackend = ").unwrap();
        assert!(SchedulerConfig::from_file(&path).is_err());
    }
}
