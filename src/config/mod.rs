//! Configuration system.
//!
//! Consolidates configuration from tiers with field-by-field YAML merging:
//! 1. **Defaults** - compiled in
//! 2. **Project** - `$CWD/todo-board/config.yaml`
//! 3. **User** - `~/.todo-board/config.yaml`
//! 4. **Environment** - variables below
//!
//! ## Environment Variables
//! - `TODO_BOARD_CONFIG_PATH` - Explicit config file (overrides all tiers)
//! - `TODO_BOARD_DB_PATH` - Database path
//! - `TODO_BOARD_PORT` - Web surface port
//! - `TODO_BOARD_USER_DIR` - User config dir (default: `~/.todo-board`)
//! - `TODO_BOARD_PROJECT_DIR` - Project config dir (default: `./todo-board`)

mod loader;
mod types;

pub use loader::{ConfigLoader, ConfigPaths, ConfigTier, deep_merge};
pub use types::*;
