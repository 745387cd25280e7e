// Deal Board - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod errors;
pub mod deal;
pub mod board;      // Board template + assembler
pub mod db;         // Document store (SQLite) + import
pub mod source;     // Deal sources
pub mod query;      // Cached board query: freshness, retry, coalescing
pub mod state;      // Session, loading, deal panel, theme
pub mod config;
pub mod logging;

#[cfg(feature = "server")]
pub mod api;

#[cfg(feature = "tui")]
pub mod ui;

// Re-export commonly used types
pub use errors::{
    BoardError, BoardErrorKind, FetchError, TemplateError, TransformError,
    LOAD_FAILED_MESSAGE, PROCESSING_FAILED_MESSAGE,
};
pub use deal::{Customer, Deal, CUSTOMER_UNSPECIFIED};
pub use board::{
    assemble, assemble_documents,
    Board, BoardTemplate, Card, Column, ColumnTemplate,
};
pub use db::{
    DocumentList, ImportSummary, COLLECTION_DEALS,
    setup_database, upsert_deals, list_documents, load_deals,
    load_setting, save_setting,
};
pub use source::{DealSource, SqliteDealSource, StaticDealSource};
pub use query::{BoardQuery, QueryConfig, QueryStatus, BOARD_QUERY_KEY};
pub use state::{AppState, AuthState, DealSlideState, LoadingState, Theme, ThemeState, User};
pub use config::AppConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Settings key holding the user's theme choice
pub const THEME_SETTING: &str = "theme";
