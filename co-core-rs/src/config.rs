//! Marketplace configuration
//!
//! System-wide pricing constants and grid dimensions. Injected into the
//! pricing engine and the station grid so several parameterizations can
//! coexist (tests, simulations, production ledger).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Arithmetic used by the pricing engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PricingMode {
    /// Truncating 64-bit integer division, strictly left to right.
    /// Reproduces the values stored by existing ledgers.
    #[default]
    Integer,
    /// Q32.32 fixed point, rounded to the nearest unit at the end
    FixedPoint,
}

impl std::fmt::Display for PricingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PricingMode::Integer => write!(f, "integer"),
            PricingMode::FixedPoint => write!(f, "fixed-point"),
        }
    }
}

impl std::str::FromStr for PricingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "integer" => Ok(PricingMode::Integer),
            "fixed-point" | "fixed" => Ok(PricingMode::FixedPoint),
            other => Err(ConfigError::UnknownPricingMode(other.to_string())),
        }
    }
}

/// Complete marketplace configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Number of charging stations (L_CS)
    pub station_count: u32,

    /// Number of discrete time slots per station (TIMELEN)
    pub horizon: u32,

    /// Revenue of charging (R_ek)
    pub revenue_rate: i64,

    /// Average unit cost of time (w)
    pub time_cost: i64,

    /// Average charging rate (mu)
    pub charging_rate: i64,

    /// Charging slots per station-slot at initialization (N)
    pub slot_capacity: u32,

    /// Baseline arrival rate at initialization (Lambda_k)
    pub arrival_rate: u32,

    pub pricing_mode: PricingMode,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            station_count: 9,
            horizon: 10,
            revenue_rate: 6,
            time_cost: 4,
            charging_rate: 1,
            slot_capacity: 20,
            arrival_rate: 15,
            pricing_mode: PricingMode::Integer,
        }
    }
}

impl MarketConfig {
    /// Set number of stations
    pub fn with_stations(mut self, count: u32) -> Self {
        self.station_count = count;
        self
    }

    /// Set number of time slots
    pub fn with_horizon(mut self, slots: u32) -> Self {
        self.horizon = slots;
        self
    }

    /// Set the queueing rates (R_ek, w, mu)
    pub fn with_rates(mut self, revenue_rate: i64, time_cost: i64, charging_rate: i64) -> Self {
        self.revenue_rate = revenue_rate;
        self.time_cost = time_cost;
        self.charging_rate = charging_rate;
        self
    }

    /// Set initial slot capacity and arrival rate
    pub fn with_slot_profile(mut self, capacity: u32, arrival_rate: u32) -> Self {
        self.slot_capacity = capacity;
        self.arrival_rate = arrival_rate;
        self
    }

    /// Set pricing arithmetic
    pub fn with_pricing_mode(mut self, mode: PricingMode) -> Self {
        self.pricing_mode = mode;
        self
    }

    /// Reject parameterizations the pricing formula cannot evaluate
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.station_count == 0 {
            return Err(ConfigError::Invalid("station_count must be positive".into()));
        }
        if self.horizon == 0 {
            return Err(ConfigError::Invalid("horizon must be positive".into()));
        }
        if self.charging_rate <= 0 {
            return Err(ConfigError::Invalid("charging_rate must be positive".into()));
        }
        if self.revenue_rate < 0 || self.time_cost < 0 {
            return Err(ConfigError::Invalid("rates must be non-negative".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = MarketConfig::default()
            .with_stations(3)
            .with_horizon(24)
            .with_rates(8, 2, 1)
            .with_pricing_mode(PricingMode::FixedPoint);

        assert_eq!(config.station_count, 3);
        assert_eq!(config.horizon, 24);
        assert_eq!(config.revenue_rate, 8);
        assert_eq!(config.slot_capacity, 20);
        assert_eq!(config.pricing_mode, PricingMode::FixedPoint);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(MarketConfig::default().validate().is_ok());
        assert!(MarketConfig::default().with_stations(0).validate().is_err());
        assert!(MarketConfig::default().with_rates(6, 4, 0).validate().is_err());
    }

    #[test]
    fn test_pricing_mode_parse() {
        assert_eq!("integer".parse::<PricingMode>().unwrap(), PricingMode::Integer);
        assert_eq!("fixed-point".parse::<PricingMode>().unwrap(), PricingMode::FixedPoint);
        assert!("float".parse::<PricingMode>().is_err());
    }
}
