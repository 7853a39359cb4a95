//! Station pricing engine
//!
//! Two-part congestion price of a station-slot:
//!
//! ```text
//! term1 = R_ek * (L_CS - 1) / L_CS * Lambda_k / (mu*N - Lambda_b)
//! term2 = w / mu * Lambda_k^2 / (mu*N - Lambda_b - Lambda_k)^2 / 4 / L_CS
//! price = term1 + term2
//! ```
//!
//! `term1` is the queueing-delay cost and `term2` the variance cost. The
//! expression is evaluated left to right; in [`PricingMode::Integer`] every
//! division truncates, reproducing existing ledger values exactly.
//! Every peer recomputes the same price from the same inputs, so the engine
//! is a pure function of its configuration and arguments.

use crate::config::{MarketConfig, PricingMode};
use crate::error::PricingError;
use crate::types::Price;
use fixed::types::I32F32;

/// Fixed-point type used by [`PricingMode::FixedPoint`]
pub type Fixed = I32F32;

/// Pure pricing function bound to one configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingEngine {
    revenue_rate: i64,
    time_cost: i64,
    charging_rate: i64,
    station_count: i64,
    mode: PricingMode,
}

impl PricingEngine {
    /// Create an engine from the marketplace configuration
    pub fn new(config: &MarketConfig) -> Self {
        Self {
            revenue_rate: config.revenue_rate,
            time_cost: config.time_cost,
            charging_rate: config.charging_rate,
            station_count: i64::from(config.station_count),
            mode: config.pricing_mode,
        }
    }

    pub fn mode(&self) -> PricingMode {
        self.mode
    }

    /// Price of one slot with capacity `capacity`, busy count `busy` and
    /// baseline arrival rate `arrival_rate`.
    ///
    /// Configurations that leave the formula undefined (no stations, zero
    /// charging rate) yield an error rather than a panic.
    pub fn price(&self, capacity: u32, busy: u32, arrival_rate: u32) -> Result<Price, PricingError> {
        let saturated = PricingError::Saturated {
            capacity,
            busy,
            arrival_rate,
        };

        let free = self
            .charging_rate
            .checked_mul(i64::from(capacity))
            .ok_or(PricingError::Overflow)?
            - i64::from(busy);
        let slack = free - i64::from(arrival_rate);
        if free <= 0 || slack <= 0 {
            return Err(saturated);
        }

        let lk = i64::from(arrival_rate);
        let price = match self.mode {
            PricingMode::Integer => self.integer_price(lk, free, slack),
            PricingMode::FixedPoint => self.fixed_price(lk, free, slack),
        }
        .ok_or(PricingError::Overflow)?;

        Price::try_from(price).map_err(|_| PricingError::Overflow)
    }

    fn integer_price(&self, lk: i64, free: i64, slack: i64) -> Option<i64> {
        let l = self.station_count;

        let term1 = self.revenue_rate.checked_mul(l - 1)?.checked_div(l)?;
        let term1 = term1.checked_mul(lk)?.checked_div(free)?;

        let term2 = self
            .time_cost
            .checked_div(self.charging_rate)?
            .checked_mul(lk.checked_mul(lk)?)?;
        let term2 = term2.checked_div(slack)?.checked_div(slack)?.checked_div(4)?.checked_div(l)?;

        term1.checked_add(term2)
    }

    fn fixed_price(&self, lk: i64, free: i64, slack: i64) -> Option<i64> {
        let fx = Fixed::checked_from_num;
        let l = fx(self.station_count)?;

        let term1 = fx(self.revenue_rate)?
            .checked_mul(fx(self.station_count - 1)?)?
            .checked_div(l)?
            .checked_mul(fx(lk)?)?
            .checked_div(fx(free)?)?;

        let slack = fx(slack)?;
        let term2 = fx(self.time_cost)?
            .checked_div(fx(self.charging_rate)?)?
            .checked_mul(fx(lk.checked_mul(lk)?)?)?
            .checked_div(slack)?
            .checked_div(slack)?
            .checked_div(fx(4)?)?
            .checked_div(l)?;

        term1.checked_add(term2)?.checked_round()?.checked_to_num::<i64>()
    }
}
