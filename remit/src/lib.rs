//! Unified facade over the Remit withdrawal core.
//!
//! Downstream applications depend on this crate and pick what they need:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use remit::config::RemitSettings;
//! use remit::engine::{StaticDirectory, WithdrawalService};
//! use remit::ledger::{LedgerStore, SqliteLedgerStore};
//!
//! let settings = RemitSettings::load_or_default("remit.toml").unwrap();
//! let store: Arc<dyn LedgerStore> =
//!     Arc::new(SqliteLedgerStore::new(&settings.storage.database_path).unwrap());
//! let service = WithdrawalService::new(
//!     store,
//!     Arc::new(StaticDirectory::new()),
//!     settings.withdrawal.clone(),
//! );
//! # let _ = service;
//! ```

pub use remit_accrual as accrual;
pub use remit_config as config;
pub use remit_core as core;
pub use remit_engine as engine;
pub use remit_ledger as ledger;
