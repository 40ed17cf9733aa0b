use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding extra colon-separated search directories
pub const DB_PATH_ENV: &str = "CONFGRAPH_DB_PATH";

/// Relationship toggled by `disable`/`enable` unless configured otherwise
pub const DEFAULT_DISABLED_RELATIONSHIP: &str = "disabled";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ConfgraphConfig {
    /// Directories searched for includes not found next to the including file
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_path: Vec<PathBuf>,
    /// Where extracted sub-configurations are written by default
    pub output_dir: Option<PathBuf>,
    pub disabled_relationship: Option<String>,
}

impl ConfgraphConfig {
    pub fn disabled_relationship(&self) -> &str {
        self.disabled_relationship
            .as_deref()
            .unwrap_or(DEFAULT_DISABLED_RELATIONSHIP)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("confgraph.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<ConfgraphConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: ConfgraphConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &ConfgraphConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_output_dir(dir: &Path) -> anyhow::Result<()> {
    if !dir.as_os_str().is_empty() && !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_is_none() {
        let dir = TempDir::new().unwrap();
        let loaded = load_config(Some(&dir.path().join("confgraph.toml"))).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_write_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("confgraph.toml");
        let config = ConfgraphConfig {
            search_path: vec![PathBuf::from("/opt/db")],
            output_dir: Some(PathBuf::from("out")),
            disabled_relationship: Some("Disabled".into()),
        };

        write_config(&path, &config, false).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), Some(config.clone()));

        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &ConfgraphConfig::default(), true).unwrap();
        let reloaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(reloaded.disabled_relationship(), "disabled");
    }
}
