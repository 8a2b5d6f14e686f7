//! Persisted light/dark preference.
//!
//! A single boolean read once at startup and written back on every toggle.
//! Without a path the preference lives in memory only.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct ThemeFile {
    #[serde(default)]
    dark: bool,
}

pub struct ThemePreference {
    path: Option<PathBuf>,
    dark: AtomicBool,
}

impl ThemePreference {
    /// Read the stored preference; a missing or unreadable file means light.
    pub fn load(path: Option<PathBuf>) -> Self {
        let dark = path.as_deref().map(read_flag).unwrap_or(false);
        Self {
            path,
            dark: AtomicBool::new(dark),
        }
    }

    pub fn is_dark(&self) -> bool {
        self.dark.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        if self.is_dark() { "dark" } else { "light" }
    }

    pub fn set(&self, dark: bool) -> Result<()> {
        self.dark.store(dark, Ordering::Relaxed);
        self.persist(dark)
    }

    /// Flip the preference and persist it. Returns the new value.
    pub fn toggle(&self) -> Result<bool> {
        let dark = !self.dark.fetch_xor(true, Ordering::Relaxed);
        self.persist(dark)?;
        Ok(dark)
    }

    fn persist(&self, dark: bool) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_yaml::to_string(&ThemeFile { dark })?)?;
        debug!(path = %path.display(), dark, "Theme preference saved");
        Ok(())
    }
}

fn read_flag(path: &Path) -> bool {
    let Ok(content) = std::fs::read_to_string(path) else {
        return false;
    };
    match serde_yaml::from_str::<ThemeFile>(&content) {
        Ok(file) => file.dark,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable theme preference");
            false
        }
    }
}
