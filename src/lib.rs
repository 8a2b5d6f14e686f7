//! todo-board
//!
//! Project and task board with filtered cursor pagination, due-date
//! reminders and live document subscriptions over a SQLite document store.

pub mod app;
pub mod cli;
pub mod config;
pub mod dates;
pub mod db;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod routes;
pub mod stores;
pub mod subscriptions;
pub mod theme;
pub mod toast;
pub mod types;
pub mod web;
