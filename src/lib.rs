//! Foreign-key aware database cleaning for test suites.
//!
//! ```no_run
//! use db_cleaner::{CleanConfig, Cleaner, DuckDbConnection, Strategy};
//!
//! let mut conn = DuckDbConnection::open_in_memory()?;
//! let report = Cleaner::new(CleanConfig::new(Strategy::Delete)).clean(&mut conn)?;
//! println!("{report}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backend;
pub mod cleaner;
pub mod config;
pub mod connection;
pub mod error;
pub mod introspect;
pub mod schema;
pub mod strategy;

pub use backend::{Backend, BackendKind, Capabilities};
pub use cleaner::{CancellationToken, CleanReport, Cleaner};
pub use config::{CleanConfig, Strategy};
pub use connection::{
    Connection, ConnectionError, ConnectionPool, DuckDbConnection, DuckDbPool, StatementResult,
};
pub use error::{CleanError, Stage};
pub use schema::{ClearBatch, ClearPlan, ClearUnit, TableName};
pub use strategy::TransactionScope;
