//! School registry core: enrollment request lifecycle and ledger migration.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
