//! Chip Ledger - point economy for a private card room
//!
//! Customers request deposits, withdraw against their balance and collect
//! tournament prizes; administrators approve deposits, adjust balances,
//! run tournaments and record rake.
//!
//! # Modules
//!
//! - [`store`] - Persisted tables over one JSON document, with transactions
//! - [`account`] - Users and chip accounts (enforced balance)
//! - [`identity`] - Signup, login, seeding, credential verification
//! - [`ledger`] - Balance mutations (deposit, withdraw, adjust, prizes)
//! - [`request`] - Deposit/withdraw/adjust request rows and their state machine
//! - [`tournament`] - Tournaments, prize distribution, earnings ranking
//! - [`rake`] - House commission records
//! - [`app`] - `ChipLedger`, the session-checked surface

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod error;
pub mod logging;
pub mod store;

pub mod account;
pub mod app;
pub mod identity;
pub mod ledger;
pub mod rake;
pub mod request;
pub mod tournament;

// Convenient re-exports at crate root
pub use account::{ChipAccount, Role, User};
pub use app::ChipLedger;
pub use config::AppConfig;
pub use core_types::{Chips, RecordId, Timestamp, UserId};
pub use error::LedgerError;
pub use identity::{IdentityService, Session};
pub use ledger::{AdjustDirection, CustomerBalance, LedgerService};
pub use rake::{RakeBook, RakeRecord, RakeTotals};
pub use request::{Request, RequestFilter, RequestStatus, RequestType, RequestWorkflow};
pub use store::{RecordStore, StoreError, Table};
pub use tournament::{
    RankingEntry, Tournament, TournamentDraft, TournamentResult, TournamentService, Winner,
};
