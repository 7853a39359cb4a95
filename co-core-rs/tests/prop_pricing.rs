//! Property tests for the pricing engine and the occupancy rule
//!
//! Tests invariants for:
//! - Pricing: determinism, non-negativity, domain boundary
//! - Occupancy: busy grows by exactly one, price recomputed, other fields fixed
//! - Purchase plan: total equals the sum of pre-increment prices

use co_core::lifecycle::plan_purchase;
use co_core::{MarketConfig, PricingEngine, PricingError, PricingMode, PurchaseRequest, StationState};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn pricing_mode() -> impl Strategy<Value = PricingMode> {
    prop_oneof![Just(PricingMode::Integer), Just(PricingMode::FixedPoint)]
}

/// Configurations with small positive rates
fn config_strategy() -> impl Strategy<Value = MarketConfig> {
    (1u32..32, 0i64..50, 0i64..50, 1i64..4, pricing_mode()).prop_map(
        |(stations, revenue, time_cost, rate, mode)| {
            MarketConfig::default()
                .with_stations(stations)
                .with_rates(revenue, time_cost, rate)
                .with_pricing_mode(mode)
        },
    )
}

/// (capacity, busy, arrival_rate) inside the pricing domain for `mu`
fn in_domain(mu: i64) -> impl Strategy<Value = (u32, u32, u32)> {
    (2u32..200)
        .prop_flat_map(move |capacity| {
            let free = mu * i64::from(capacity);
            (Just(capacity), 0..free - 1)
        })
        .prop_flat_map(move |(capacity, busy)| {
            let slack = mu * i64::from(capacity) - busy;
            (Just(capacity), Just(busy as u32), 0..(slack - 1) as u32)
        })
}

// ============================================================================
// Pricing Property Tests
// ============================================================================

proptest! {
    /// Same inputs, same price, in every mode
    #[test]
    fn price_deterministic(config in config_strategy(), n in 1u32..100, busy in 0u32..100, lk in 0u32..100) {
        let a = PricingEngine::new(&config);
        let b = PricingEngine::new(&config.clone());
        prop_assert_eq!(a.price(n, busy, lk), b.price(n, busy, lk));
    }

    /// Inside the domain the price is defined (and non-negative by type)
    #[test]
    fn price_defined_in_domain(
        (config, (n, busy, lk)) in config_strategy()
            .prop_flat_map(|c| { let mu = c.charging_rate; (Just(c), in_domain(mu)) })
    ) {
        let engine = PricingEngine::new(&config);
        prop_assert!(engine.price(n, busy, lk).is_ok());
    }

    /// At or beyond the boundary the slot is saturated
    #[test]
    fn price_saturated_outside_domain(n in 1u32..100, extra in 0u32..10, lk in 0u32..50) {
        let engine = PricingEngine::new(&MarketConfig::default());
        let busy = n - lk.min(n) + extra;
        let saturated = matches!(engine.price(n, busy, lk), Err(PricingError::Saturated { .. }));
        prop_assert!(saturated);
    }

    /// More occupants never make the integer price cheaper
    #[test]
    fn integer_price_monotone_in_busy((n, busy, lk) in in_domain(1)) {
        let engine = PricingEngine::new(&MarketConfig::default());
        let lower = engine.price(n, busy, lk).unwrap();
        if let Ok(higher) = engine.price(n, busy + 1, lk) {
            prop_assert!(higher >= lower);
        }
    }
}

// ============================================================================
// Occupancy Property Tests
// ============================================================================

fn slot(capacity: u32, busy: u32, arrival_rate: u32, engine: &PricingEngine) -> StationState {
    StationState {
        station: 0,
        time: 0,
        capacity,
        busy,
        arrival_rate,
        price: engine.price(capacity, busy, arrival_rate).unwrap(),
    }
}

proptest! {
    /// occupy adds exactly one occupant and reprices; N and Lambda_k fixed
    #[test]
    fn occupy_increments_by_one((n, busy, lk) in in_domain(1), mode in pricing_mode()) {
        let engine = PricingEngine::new(&MarketConfig::default().with_pricing_mode(mode));
        let before = slot(n, busy, lk, &engine);

        match before.occupy(&engine) {
            Ok((charged, after)) => {
                prop_assert_eq!(charged, before.price);
                prop_assert_eq!(after.busy, before.busy + 1);
                prop_assert_eq!(after.capacity, before.capacity);
                prop_assert_eq!(after.arrival_rate, before.arrival_rate);
                prop_assert_eq!(Ok(after.price), engine.price(n, busy + 1, lk));
            }
            Err(e) => {
                let saturated = matches!(e, PricingError::Saturated { .. });
                prop_assert!(saturated);
            }
        }
    }

    /// A purchase charges the sum of the pre-increment prices of its window
    #[test]
    fn plan_total_is_sum_of_prior_prices(busies in prop::collection::vec(0u32..4, 1..10)) {
        let engine = PricingEngine::new(&MarketConfig::default());
        let prior: Vec<StationState> = busies
            .iter()
            .enumerate()
            .map(|(t, b)| StationState { time: t as u32, ..slot(20, *b, 15, &engine) })
            .collect();
        let request = PurchaseRequest {
            key: "CO".to_string(),
            car: "car".to_string(),
            station: 0,
            arrival: 0,
            departure: prior.len() as u32,
        };

        let plan = plan_purchase(&engine, &request, &prior).unwrap();
        let expected: u64 = prior.iter().map(|s| s.price).sum();
        prop_assert_eq!(plan.option.price, expected);
        for (before, after) in prior.iter().zip(&plan.slots) {
            prop_assert_eq!(after.busy, before.busy + 1);
            prop_assert_eq!(after.time, before.time);
        }
    }
}
