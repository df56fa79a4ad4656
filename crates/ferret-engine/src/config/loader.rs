use super::FerretConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from default locations:
    /// 1. ./ferret.yaml
    /// 2. ~/.ferret/config.yaml
    /// 3. Default configuration
    pub async fn load_default() -> Result<FerretConfig, ConfigError> {
        let local_config = PathBuf::from("./ferret.yaml");
        if local_config.exists() {
            return Self::load_from(&local_config).await;
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".ferret").join("config.yaml");
            if home_config.exists() {
                return Self::load_from(&home_config).await;
            }
        }

        Ok(FerretConfig::default())
    }

    pub async fn load_from(path: &Path) -> Result<FerretConfig, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: FerretConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn loads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ferret.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "agent:\n  max_cycles: 9").unwrap();

        let config = ConfigLoader::load_from(&path).await.unwrap();
        assert_eq!(config.agent.max_cycles, 9);
        assert_eq!(config.agent.failure_ceiling, 5);
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigLoader::load_from(&dir.path().join("nope.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[tokio::test]
    async fn invalid_yaml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "agent: [not, a, mapping]").unwrap();

        let err = ConfigLoader::load_from(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
