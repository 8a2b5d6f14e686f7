//! Configuration loader with tier-based merging.
//!
//! Tiers, lowest to highest: embedded defaults, project
//! `./todo-board/config.yaml`, user `~/.todo-board/config.yaml`, environment.
//! Objects merge field by field; arrays and scalars replace.

use super::types::Config;
use anyhow::Result;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Configuration tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    Defaults = 0,
    Project = 1,
    User = 2,
    Environment = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Directories searched for `config.yaml`.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// Discover configuration paths from environment and defaults.
    pub fn discover() -> Self {
        // User dir: TODO_BOARD_USER_DIR or ~/.todo-board
        let user_dir = std::env::var("TODO_BOARD_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".todo-board")));

        // Project dir: TODO_BOARD_PROJECT_DIR or $CWD/todo-board
        let project_dir = std::env::var("TODO_BOARD_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("todo-board")));

        Self {
            project_dir,
            user_dir,
        }
    }

    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }
}

/// Deep merge `overlay` onto `base`. A null overlay keeps the base value.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

fn read_yaml(path: &Path) -> Option<Value> {
    if !path.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read config file");
            return None;
        }
    };
    match serde_yaml::from_str::<Value>(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring malformed config file");
            None
        }
    }
}

/// Loaded configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    config: Config,
    /// Highest-tier file that contributed, if any.
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn load() -> Result<Self> {
        Self::load_with_paths(ConfigPaths::discover())
    }

    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        // Explicit config path overrides all tiers
        if let Ok(explicit_path) = std::env::var("TODO_BOARD_CONFIG_PATH") {
            return Self::load_file(paths, PathBuf::from(explicit_path));
        }

        let mut layers: Vec<Value> = vec![serde_json::to_value(Config::default())?];
        let mut config_path = None;

        for (tier, dir) in [
            (ConfigTier::Project, paths.project_dir.as_deref()),
            (ConfigTier::User, paths.user_dir.as_deref()),
        ] {
            let Some(dir) = dir else { continue };
            let file = dir.join("config.yaml");
            if let Some(value) = read_yaml(&file) {
                debug!(tier = %tier, path = %file.display(), "Loaded config tier");
                layers.push(value);
                config_path = Some(file);
            }
        }

        let merged = layers.into_iter().fold(Value::Null, deep_merge);
        let mut config: Config = serde_json::from_value(merged)?;
        Self::apply_env_overrides(&mut config);
        config.validate()?;

        Ok(Self {
            paths,
            config,
            config_path,
        })
    }

    /// Load one explicit file on top of the defaults, then environment overrides.
    pub fn load_file(paths: ConfigPaths, path: PathBuf) -> Result<Self> {
        let mut config = Config::load(&path)?;
        Self::apply_env_overrides(&mut config);
        config.validate()?;
        Ok(Self {
            paths,
            config,
            config_path: Some(path),
        })
    }

    fn apply_env_overrides(config: &mut Config) {
        if let Ok(db_path) = std::env::var("TODO_BOARD_DB_PATH") {
            config.server.db_path = PathBuf::from(db_path);
        }

        if let Ok(port) = std::env::var("TODO_BOARD_PORT") {
            match port.parse() {
                Ok(port) => config.server.port = port,
                Err(_) => warn!(value = %port, "Ignoring invalid TODO_BOARD_PORT"),
            }
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn user_dir(&self) -> Option<&Path> {
        self.paths.user_dir.as_deref()
    }

    /// Where the theme preference lives: explicit config, else the user dir.
    pub fn theme_path(&self) -> Option<PathBuf> {
        self.config
            .server
            .theme_path
            .clone()
            .or_else(|| self.user_dir().map(|d| d.join("theme.yaml")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_merge_nested_objects_and_replace_arrays() {
        let base = json!({"tasks": {"page_size": 10, "open_status": "todo"}, "lead": [24, 1]});
        let overlay = json!({"tasks": {"page_size": 20}, "lead": [2]});
        assert_eq!(
            deep_merge(base, overlay),
            json!({"tasks": {"page_size": 20, "open_status": "todo"}, "lead": [2]})
        );
    }

    #[test]
    fn test_null_overlay_keeps_base() {
        let base = json!({"a": 1, "b": {"c": 2}});
        let overlay = json!({"a": null, "b": {"c": null}});
        assert_eq!(deep_merge(base.clone(), overlay), base);
    }

    #[test]
    fn test_load_defaults_only() {
        let temp = TempDir::new().unwrap();
        let paths = ConfigPaths::with_dirs(
            Some(temp.path().join("project")),
            Some(temp.path().join("user")),
        );

        let loader = ConfigLoader::load_with_paths(paths).unwrap();
        assert_eq!(loader.config().tasks.page_size, 10);
        assert!(loader.config_path().is_none());
    }

    #[test]
    fn test_user_config_overrides_project() {
        let temp = TempDir::new().unwrap();
        let project_dir = temp.path().join("todo-board");
        let user_dir = temp.path().join("user");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::create_dir_all(&user_dir).unwrap();

        std::fs::write(
            project_dir.join("config.yaml"),
            "tasks:\n  page_size: 15\n  done_status: finished\n",
        )
        .unwrap();
        std::fs::write(user_dir.join("config.yaml"), "tasks:\n  page_size: 30\n").unwrap();

        let paths = ConfigPaths::with_dirs(Some(project_dir), Some(user_dir.clone()));
        let loader = ConfigLoader::load_with_paths(paths).unwrap();
        let config = loader.config();

        assert_eq!(config.tasks.page_size, 30);
        assert_eq!(config.tasks.done_status, "finished");
        assert_eq!(config.tasks.open_status, "todo");
        assert_eq!(loader.config_path(), Some(user_dir.join("config.yaml").as_path()));
    }

    #[test]
    fn test_malformed_tier_is_skipped() {
        let temp = TempDir::new().unwrap();
        let project_dir = temp.path().join("todo-board");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(project_dir.join("config.yaml"), "tasks: [unclosed").unwrap();

        let paths = ConfigPaths::with_dirs(Some(project_dir), None);
        let loader = ConfigLoader::load_with_paths(paths).unwrap();
        assert_eq!(loader.config().tasks.page_size, 10);
    }

    #[test]
    fn test_theme_path_defaults_to_user_dir() {
        let temp = TempDir::new().unwrap();
        let paths = ConfigPaths::with_dirs(None, Some(temp.path().to_path_buf()));
        let loader = ConfigLoader::load_with_paths(paths).unwrap();
        assert_eq!(loader.theme_path(), Some(temp.path().join("theme.yaml")));
    }
}
