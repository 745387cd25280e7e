use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use deal_board::logging::{init_tracing, LogTarget};
use deal_board::{
    db, load_deals, setup_database, upsert_deals, AppConfig, Board, BoardQuery, SqliteDealSource,
    COLLECTION_DEALS,
};

#[derive(Parser)]
#[command(name = "deal-board", version, about = "Kanban board of deals grouped by status")]
struct Cli {
    /// Config file (default: deal-board.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database path, overrides the config file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Import deals from a .csv or .json file
    Import { file: PathBuf },
    /// Print the assembled board
    Board {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Interactive terminal board (default)
    Ui,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    match cli.command.unwrap_or(Command::Ui) {
        Command::Import { file } => {
            init_tracing(LogTarget::Stderr { json: config.log_json });
            run_import(&config, &file)
        }
        Command::Board { json } => {
            init_tracing(LogTarget::Stderr { json: config.log_json });
            run_board(&config, json)
        }
        Command::Ui => run_ui_mode(&config),
    }
}

fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {:?}", path))?;
    setup_database(&conn)?;
    Ok(conn)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

fn board_query(config: &AppConfig, conn: Arc<Mutex<Connection>>) -> Result<BoardQuery<SqliteDealSource>> {
    Ok(BoardQuery::new(
        SqliteDealSource::new(conn),
        config.template()?,
        config.query_config(),
    ))
}

fn run_import(config: &AppConfig, file: &Path) -> Result<()> {
    println!("🗄️  Deal Import - {} → SQLite", file.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load file
    println!("\n📂 Loading deals...");
    let deals = load_deals(file)?;
    println!("✓ Loaded {} deals from {:?}", deals.len(), file);

    // 2. Setup database
    println!("\n🔧 Setting up database...");
    let conn = open_database(&config.database_path)?;
    println!("✓ Database ready at {:?}", config.database_path);

    // 3. Upsert deals
    println!("\n💾 Writing deals...");
    let summary = upsert_deals(&conn, &deals)?;
    println!("✓ {} new, {} updated", summary.inserted, summary.updated);

    // 4. Verify count
    println!("\n🔍 Verifying database...");
    let count = db::count_documents(&conn, COLLECTION_DEALS)?;
    println!("✓ Store holds {} deals", count);

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Import complete");

    Ok(())
}

fn run_board(config: &AppConfig, json: bool) -> Result<()> {
    let conn = Arc::new(Mutex::new(open_database(&config.database_path)?));
    let query = board_query(config, conn)?;

    let board = runtime()?
        .block_on(query.fetch_board())
        .map_err(|err| anyhow::anyhow!("{} ({})", err.message, err.detail))?;

    if json {
        println!("{}", serde_json::to_string_pretty(board.as_ref())?);
    } else {
        print_board(&board);
    }

    Ok(())
}

fn print_board(board: &Board) {
    println!("📋 Deals: {} cards", board.total_cards());
    for column in &board.columns {
        println!("\n━━ {} ({}) ━━ ${:.2}", column.name, column.items.len(), column.total_price());
        for card in &column.items {
            println!(
                "  • {:<32} ${:>12.2}  {:<24} {}",
                card.name, card.price, card.company_name, card.created_at
            );
        }
    }
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &AppConfig) -> Result<()> {
    use deal_board::state::{AppState, Theme, ThemeState};
    use deal_board::ui::{self, terminal_prefers_dark, App, UiHooks};
    use deal_board::{BoardError, THEME_SETTING};
    use tracing::warn;

    struct Hooks {
        runtime: tokio::runtime::Runtime,
        query: BoardQuery<SqliteDealSource>,
        conn: Arc<Mutex<Connection>>,
    }

    impl UiHooks for Hooks {
        fn board(&mut self) -> std::result::Result<Arc<Board>, BoardError> {
            self.runtime.block_on(self.query.fetch_board())
        }

        fn refresh(&mut self) -> std::result::Result<Arc<Board>, BoardError> {
            self.runtime.block_on(self.query.refetch())
        }

        fn theme_changed(&mut self, theme: Theme) {
            let saved = self
                .conn
                .lock()
                .map_err(|_| anyhow::anyhow!("database lock poisoned"))
                .and_then(|conn| db::save_setting(&conn, THEME_SETTING, theme.as_str()));
            if let Err(err) = saved {
                warn!(error = %err, "failed to save theme");
            }
        }
    }

    // Keep log lines off the screen the UI draws on
    let log_dir = config
        .database_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let _guard = init_tracing(LogTarget::File { dir: log_dir });

    println!("🖥️  Loading Deal Board...\n");

    let conn = open_database(&config.database_path)?;
    let saved_theme = db::load_setting(&conn, THEME_SETTING)?.and_then(|value| value.parse().ok());
    let conn = Arc::new(Mutex::new(conn));

    let mut state = AppState::new(ThemeState::init(saved_theme, terminal_prefers_dark()));
    if let Some(session) = &config.session {
        state.auth.set(session.to_user());
    }

    let mut hooks = Hooks {
        runtime: runtime()?,
        query: board_query(config, Arc::clone(&conn))?,
        conn,
    };

    println!("📊 Loading deals...");
    let mut app = App::new(hooks.query.template().empty_board(), state);
    app.apply(hooks.board());
    match &app.error {
        None => println!("✓ Loaded {} cards\n", app.board.total_cards()),
        Some(err) => eprintln!("⚠️  {}", err.message),
    }

    println!("Starting UI... (Press 'q' to quit)\n");
    ui::run_ui(&mut app, &mut hooks)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &AppConfig) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or print the board: deal-board board");
    std::process::exit(1);
}
