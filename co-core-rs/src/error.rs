//! Error types for the marketplace core

use crate::lifecycle::OptionState;
use std::io;
use thiserror::Error;

/// Invalid marketplace parameterization
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown pricing mode: {0}")]
    UnknownPricingMode(String),
}

/// Pricing formula evaluated outside its domain
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("slot saturated: capacity {capacity}, busy {busy}, arrival rate {arrival_rate}")]
    Saturated {
        capacity: u32,
        busy: u32,
        arrival_rate: u32,
    },

    #[error("price arithmetic overflow or undefined division")]
    Overflow,
}

/// Wrong lifecycle state for the requested transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("confirmation is not needed")]
    AlreadyBought,

    #[error("the charging option is not paid yet (state {0})")]
    NotBought(OptionState),

    #[error("the charging option is not listed yet (state {0})")]
    NotListed(OptionState),
}

/// Ledger store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("read conflict on {key:?} in transaction {tx_id}")]
    Conflict { key: String, tx_id: String },
}

/// Errors returned by marketplace operations
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("Incorrect number of arguments for {function}. Expecting {expected}, got {got}")]
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("Invalid {field} {value:?}, expecting a non-negative integer value")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Invalid time range [{arrival}, {departure}): arrival must be before departure and within {horizon} slots")]
    InvalidTimeRange {
        arrival: u32,
        departure: u32,
        horizon: u32,
    },

    #[error("Invalid station {station}: {station_count} stations configured")]
    InvalidStation { station: u32, station_count: u32 },

    #[error("Invalid function name: {0}")]
    UnknownFunction(String),

    #[error("Charging option {0:?} not found")]
    OptionNotFound(String),

    #[error("Charging option {0:?} already exists")]
    OptionExists(String),

    #[error("Station slot {0:?} not found")]
    SlotNotFound(String),

    #[error("Charging option {key:?}: {source}")]
    Lifecycle {
        key: String,
        #[source]
        source: LifecycleError,
    },

    #[error("Pricing error on {key:?}: {source}")]
    Pricing {
        key: String,
        #[source]
        source: PricingError,
    },

    #[error("Malformed record under {key:?}: {source}")]
    MalformedRecord {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MarketError {
    /// True when the invocation lost an optimistic-concurrency race and may be resubmitted
    pub fn is_conflict(&self) -> bool {
        matches!(self, MarketError::Store(StoreError::Conflict { .. }))
    }
}
