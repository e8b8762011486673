//! Station Ledger client library.
//!
//! Daily fuel-station reconciliation for a multi-role dashboard: station
//! managers enter readings and cash, admins validate, super admins approve.
//! The derivation chain ([`reconcile`]) and the rules ([`validation`]) are
//! pure; the workflow ([`lifecycle`]) and the record flows go through the
//! backend with bounded retry ([`resilient`]) and degrade to cached or mock
//! data when it cannot be reached.

pub mod api;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod entry;
pub mod error;
pub mod format;
pub mod lifecycle;
pub mod logging;
pub mod mock;
pub mod monitor;
pub mod reconcile;
pub mod records;
pub mod resilient;
pub mod session;
pub mod storage;
pub mod validation;

pub use api::{ApiClient, EntryQuery, ExportDescriptor, ExportFormat, Page};
pub use config::ClientConfig;
pub use dashboard::Dashboard;
pub use db::LocalCache;
pub use entry::{Entry, EntryDraft, EntryField, EntryStatus, Product, ReferenceRates};
pub use error::{LedgerError, Result};
pub use lifecycle::{EntryLifecycle, Transition, TransitionOutcome};
pub use monitor::{spawn_monitor, ConnectivityStatus, MonitorHandle};
pub use records::{PriceChange, ProductSharingSupply, UtilityBill};
pub use resilient::{DataSource, Fetched, RetryPolicy, WriteOutcome};
pub use session::{Role, Session, UserProfile};
pub use validation::{validate, validate_entry, CashVarianceRule, ValidationContext, Violation};
