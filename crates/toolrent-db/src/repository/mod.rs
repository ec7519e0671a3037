//! # Repository Module
//!
//! Database repository implementations for ToolRent.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two ways into a repository                           │
//! │                                                                         │
//! │  Reads (façade queries)              Writes (inside a service tx)       │
//! │  ──────────────────────              ─────────────────────────────      │
//! │  db.tools().list_by_state(..)        let mut tx = pool.begin().await?;  │
//! │       │                              tool::take_one(&mut tx, ..)        │
//! │       │  pool connection             kardex::append(&mut tx, ..)        │
//! │       ▼                              tx.commit().await?;                │
//! │  SQLite                                   │                             │
//! │                                           ▼                             │
//! │                                      SQLite (one atomic unit)           │
//! │                                                                         │
//! │  Struct methods own a pool and serve reads. The `pub(crate)` free       │
//! │  functions take `&mut SqliteConnection` and are composed by services.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ToolRepository`] - Tool bucket lookups and listings
//! - [`KardexRepository`] - Movement log search
//! - [`LoanRepository`] - Loan queries (open, overdue, unpaid)
//! - [`CustomerRepository`] - Customer registry
//! - [`SettingRepository`] - Daily rate and other settings

pub mod customer;
pub mod kardex;
pub mod loan;
pub mod setting;
pub mod tool;

pub use customer::CustomerRepository;
pub use kardex::{KardexFilter, KardexRepository};
pub use loan::LoanRepository;
pub use setting::SettingRepository;
pub use tool::ToolRepository;
