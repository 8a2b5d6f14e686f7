//! Web surface: server-rendered pages plus a JSON API over the stores.

mod server;
pub mod templates;

pub use server::{WebServer, build_router, start_server};
