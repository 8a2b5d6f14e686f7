//! Configuration types.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default port for the web surface.
pub const DEFAULT_PORT: u16 = 31995;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub tasks: TasksConfig,

    #[serde(default)]
    pub reminders: RemindersConfig,

    #[serde(default)]
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite document store.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Port for the web surface (default: 31995).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Where the light/dark preference is kept. Defaults to the user data dir.
    #[serde(default)]
    pub theme_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            port: default_port(),
            theme_path: None,
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("todo-board/todo.db")
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Tasks per page (default: 10).
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Status assigned to open tasks and restored when un-completing.
    #[serde(default = "default_open_status")]
    pub open_status: String,

    /// Status assigned when a task is completed.
    #[serde(default = "default_done_status")]
    pub done_status: String,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            open_status: default_open_status(),
            done_status: default_done_status(),
        }
    }
}

fn default_page_size() -> usize {
    10
}

fn default_open_status() -> String {
    "todo".to_string()
}

fn default_done_status() -> String {
    "done".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemindersConfig {
    /// Lead times for users who never saved settings (default: 24h and 1h).
    #[serde(default = "default_lead_hours")]
    pub default_lead_hours: Vec<u32>,

    /// Hour of day (UTC) a task is due when it has no end hour (default: 9).
    #[serde(default = "default_due_hour")]
    pub default_due_hour: u32,

    /// How long toasts stay visible (default: 6000 ms).
    #[serde(default = "default_toast_ttl_ms")]
    pub toast_ttl_ms: u64,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            default_lead_hours: default_lead_hours(),
            default_due_hour: default_due_hour(),
            toast_ttl_ms: default_toast_ttl_ms(),
        }
    }
}

fn default_lead_hours() -> Vec<u32> {
    vec![24, 1]
}

fn default_due_hour() -> u32 {
    9
}

fn default_toast_ttl_ms() -> u64 {
    6_000
}

/// Principal the bundled identity provider signs in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_uid")]
    pub uid: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            uid: default_uid(),
            display_name: None,
            email: None,
            photo_url: None,
        }
    }
}

fn default_uid() -> String {
    "local-user".to_string()
}

impl Config {
    /// Load a single configuration file without tier merging.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the stores cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.tasks.page_size == 0 {
            return Err(anyhow!("tasks.page_size must be at least 1"));
        }
        if self.tasks.open_status == self.tasks.done_status {
            return Err(anyhow!(
                "tasks.open_status and tasks.done_status must differ (both are {:?})",
                self.tasks.open_status
            ));
        }
        if self.reminders.default_due_hour > 23 {
            return Err(anyhow!("reminders.default_due_hour must be 0-23"));
        }
        if self.identity.uid.trim().is_empty() {
            return Err(anyhow!("identity.uid must not be empty"));
        }
        Ok(())
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}
