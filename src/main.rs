//! todo-board
//!
//! Project and task board served over HTTP, backed by a SQLite document store.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use todo_board::app::App;
use todo_board::cli::tasks::TasksArgs;
use todo_board::cli::{Cli, Command};
use todo_board::config::{Config, ConfigLoader};
use todo_board::db::Database;
use todo_board::logging::init_logging;
use todo_board::stores::{ConfiguredIdentityProvider, LogNotifier, Permission, SessionState};
use todo_board::theme::ThemePreference;
use todo_board::web;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log, cli.verbose)?;

    // SAFETY: This is safe at program startup before any other threads are spawned
    if let Some(config_path) = &cli.config {
        unsafe {
            std::env::set_var("TODO_BOARD_CONFIG_PATH", config_path);
        }
    }
    let mut loader = ConfigLoader::load()?;
    if let Some(path) = loader.config_path() {
        debug!(path = %path.display(), "Using config file");
    }

    if let Some(db_path) = &cli.database {
        loader.config_mut().server.db_path = db_path.into();
    }
    let theme = ThemePreference::load(loader.theme_path());

    match cli.command {
        Some(Command::Seed) => {
            let db = open_database(loader.config())?;
            let written = db.seed_reference_data()?;
            println!("Seeded {} reference documents", written);
        }
        Some(Command::Theme { toggle }) => {
            if toggle {
                theme.toggle()?;
            }
            println!("{}", theme.name());
        }
        Some(Command::Tasks(args)) => {
            let config = loader.into_config();
            let db = open_database(&config)?;
            let app = build_app(config, db, theme);
            run_tasks(&app, &args).await?;
        }
        Some(Command::Serve { port }) => {
            if let Some(port) = port {
                loader.config_mut().server.port = port;
            }
            let config = loader.into_config();
            run_server(config, theme).await?;
        }
        None => {
            let config = loader.into_config();
            run_server(config, theme).await?;
        }
    }

    Ok(())
}

fn open_database(config: &Config) -> Result<Database> {
    config.ensure_db_dir()?;
    Database::open(&config.server.db_path)
        .with_context(|| format!("opening {}", config.server.db_path.display()))
}

fn build_app(config: Config, db: Database, theme: ThemePreference) -> Arc<App> {
    let provider = Arc::new(ConfiguredIdentityProvider::new(&config.identity));
    let notifier = Arc::new(LogNotifier::new(Permission::Default));
    App::build(config, db, provider, notifier, theme)
}

async fn run_server(config: Config, theme: ThemePreference) -> Result<()> {
    let port = config.server.port;
    let db = open_database(&config)?;
    info!(path = %config.server.db_path.display(), "Opened database");

    let app = build_app(config, db, theme);
    let listener = app.session.listen();
    let (shutdown, addr) = web::start_server(Arc::clone(&app), port).await?;
    println!("todo-board listening on http://{}", addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    let _ = shutdown.send(());
    if app.session.is_signed_in() {
        let _ = app.session.sign_out().await;
    }
    listener.abort();
    Ok(())
}

async fn run_tasks(app: &Arc<App>, args: &TasksArgs) -> Result<()> {
    let listener = app.session.listen();
    app.session.sign_in().await?;
    let SessionState::SignedIn { user } = app.session.settled().await else {
        anyhow::bail!("sign-in did not complete");
    };
    debug!(uid = %user.uid, "Signed in");

    let mut view = app.tasks.set_filter(args.filter())?;
    for mv in args.moves() {
        view = app.tasks.fetch_page(mv)?;
    }

    if view.tasks.is_empty() {
        println!("No tasks");
    }
    for task in &view.tasks {
        println!(
            "{} {:<40} {:<10} {:<8} {}",
            if task.completed { "[x]" } else { "[ ]" },
            task.title,
            task.end_date.as_deref().unwrap_or("-"),
            task.priority.as_deref().unwrap_or("-"),
            task.status,
        );
    }
    if view.total_pages > 0 {
        println!("Page {} of {} ({} tasks)", view.page, view.total_pages, view.total);
    }

    app.session.sign_out().await?;
    listener.abort();
    Ok(())
}
