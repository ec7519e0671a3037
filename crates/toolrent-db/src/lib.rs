//! # toolrent-db: Database Layer and Services for ToolRent
//!
//! SQLite persistence (via sqlx) plus the two services that own every
//! transaction: the inventory bucket engine and the loan orchestrator.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        ToolRent Data Flow                               │
//! │                                                                         │
//! │  Façade (create loan, receive tools, ...)                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   toolrent-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Services    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │               │    │               │    │  (embedded)  │  │   │
//! │  │   │ Inventory     │───►│ tool, kardex  │    │              │  │   │
//! │  │   │ Lending       │───►│ loan, customer│    │ 001_init.sql │  │   │
//! │  │   │               │    │ setting       │    │              │  │   │
//! │  │   └───────┬───────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │           │  one tx per op     │                               │   │
//! │  │           ▼                    ▼                               │   │
//! │  │   ┌─────────────────────────────────────┐                     │   │
//! │  │   │     Database (pool.rs) SqlitePool   │                     │   │
//! │  │   └─────────────────────────────────────┘                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  toolrent-core: types, fines, activation, validation (pure)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`config`] - Lending configuration from the environment
//! - [`error`] - Database and service error types
//! - [`repository`] - Repository implementations
//! - [`inventory`] - Inventory bucket engine
//! - [`lending`] - Loan lifecycle orchestrator
//!
//! ## Usage
//!
//! ```rust,ignore
//! use toolrent_db::{Database, DbConfig, LendingConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/toolrent.db")).await?;
//!
//! let bucket = db.inventory().receive(&receipt, "admin").await?;
//! let loan = db.lending(LendingConfig::default()).create_loan(&request).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod inventory;
pub mod lending;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, LendingConfig};
pub use error::{DbError, DbResult, ErrorKind, ServiceError, ServiceResult};
pub use inventory::InventoryService;
pub use lending::LendingService;
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::{
    CustomerRepository, KardexFilter, KardexRepository, LoanRepository, SettingRepository,
    ToolRepository,
};

/// Installs a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Defaults to `info,toolrent=debug,sqlx=warn`. Safe to call more than once;
/// only the first call installs anything.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,toolrent=debug,sqlx=warn"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
