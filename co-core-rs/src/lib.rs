//! Charging-option marketplace core
//!
//! Pre-purchased EV charging slots ("charging options") traded on a
//! key-value ledger. Each station-slot carries a congestion price from a
//! queueing model; each option moves through ISSUED → BOUGHT → LISTED.
//!
//! ## Components
//!
//! ```text
//!  ChargingOptionContract (dispatch: buy, confirm, list, ...)
//!        │
//!        ├── lifecycle  ── option state machine, purchase fold
//!        ├── query      ── lookups, listed search, window prices
//!        └── grid       ── station-slot records
//!               │
//!               └── pricing ── price(N, Lambda_b, Lambda_k)
//!
//!  LedgerStore (trait) ◄── Transaction ◄── Ledger ── storage (WAL)
//! ```
//!
//! ## Usage
//!
//! ```
//! use co_core::{ChargingOptionContract, Ledger, MarketConfig};
//!
//! let contract = ChargingOptionContract::new(MarketConfig::default()).unwrap();
//! let ledger = Ledger::in_memory();
//!
//! contract.submit::<&str>(&ledger, "initLedger", &[]).unwrap();
//! contract.submit(&ledger, "buy", &["CO1", "car1", "0", "0", "3"]).unwrap();
//!
//! let record = contract.submit(&ledger, "queryCO", &["CO1"]).unwrap().payload;
//! assert!(String::from_utf8(record).unwrap().contains("\"CO_price\":\"12\""));
//! ```

pub mod codec;
pub mod config;
pub mod contract;
pub mod error;
pub mod grid;
pub mod ledger;
pub mod lifecycle;
pub mod pricing;
pub mod query;
pub mod storage;
pub mod types;

pub use config::{MarketConfig, PricingMode};
pub use contract::{ChargingOptionContract, Function, Outcome};
pub use error::{ConfigError, LifecycleError, MarketError, PricingError, StoreError};
pub use grid::{StationGrid, StationState};
pub use ledger::{CommitReceipt, Ledger, LedgerStore, Selector, Transaction};
pub use lifecycle::{ChargingOption, OptionState, PurchasePlan, PurchaseRequest};
pub use pricing::PricingEngine;
pub use query::{ListedOption, StationQuote};
pub use storage::StorageConfig;
pub use types::*;
