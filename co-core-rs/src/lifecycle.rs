//! Charging option lifecycle
//!
//! ```text
//!            buy                 confirm               list
//!   (none) -------> ISSUED ------------------> BOUGHT -------> LISTED
//!                     ^                          ^               |
//!                     |                          |   confirm     |
//!                     |                          +---------------+
//!                     +------------------------------------------+
//!                                   delist (new car)
//! ```
//!
//! A purchase is planned as a pure fold over the prior slot states and
//! then written back by [`purchase`]; the whole read-modify-write is one
//! ledger transaction, so a stale read of any slot rejects it at commit.

use crate::codec::{decimal, RecordExt};
use crate::error::{LifecycleError, MarketError, PricingError};
use crate::grid::{StationGrid, StationState};
use crate::ledger::LedgerStore;
use crate::pricing::PricingEngine;
use crate::types::{Price, SlotIndex, StationId};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Lifecycle state of a charging option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionState {
    #[serde(rename = "1")]
    Issued,
    /// Paid by the holder; may be listed for resale
    #[serde(rename = "2")]
    Bought,
    /// Offered for resale
    #[serde(rename = "3")]
    Listed,
}

impl OptionState {
    /// Code stored in the `CO_state` field
    pub fn code(&self) -> &'static str {
        match self {
            OptionState::Issued => "1",
            OptionState::Bought => "2",
            OptionState::Listed => "3",
        }
    }
}

impl std::fmt::Display for OptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionState::Issued => write!(f, "ISSUED"),
            OptionState::Bought => write!(f, "BOUGHT"),
            OptionState::Listed => write!(f, "LISTED"),
        }
    }
}

/// Reservation of one station over `[arrival, departure)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargingOption {
    #[serde(rename = "ID_car")]
    pub car: String,

    #[serde(rename = "ID_cs", with = "decimal")]
    pub station: StationId,

    #[serde(rename = "T_arrive", with = "decimal")]
    pub arrival: SlotIndex,

    #[serde(rename = "T_leave", with = "decimal")]
    pub departure: SlotIndex,

    #[serde(rename = "CO_price", with = "decimal")]
    pub price: Price,

    #[serde(rename = "CO_state")]
    pub state: OptionState,
}

impl ChargingOption {
    /// Holder paid: any state except BOUGHT moves to BOUGHT
    pub fn confirm(&mut self) -> Result<(), LifecycleError> {
        if self.state == OptionState::Bought {
            return Err(LifecycleError::AlreadyBought);
        }
        self.state = OptionState::Bought;
        Ok(())
    }

    /// Offer a paid option for resale at `price`
    pub fn list(&mut self, price: Price) -> Result<(), LifecycleError> {
        if self.state != OptionState::Bought {
            return Err(LifecycleError::NotBought(self.state));
        }
        self.state = OptionState::Listed;
        self.price = price;
        Ok(())
    }

    /// Withdraw a listed option, handing it to `car`
    pub fn delist(&mut self, car: impl Into<String>) -> Result<(), LifecycleError> {
        if self.state != OptionState::Listed {
            return Err(LifecycleError::NotListed(self.state));
        }
        self.state = OptionState::Issued;
        self.car = car.into();
        Ok(())
    }
}

/// Validated purchase arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseRequest {
    pub key: String,
    pub car: String,
    pub station: StationId,
    pub arrival: SlotIndex,
    pub departure: SlotIndex,
}

/// Outcome of a purchase, computed without touching the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchasePlan {
    pub option: ChargingOption,
    /// Updated slot states, one per slot in the window
    pub slots: Vec<StationState>,
}

/// Fold the purchase over the prior states of the slots in its window.
///
/// `prior` must hold the window's slots in slot order.
pub fn plan_purchase(
    engine: &PricingEngine,
    request: &PurchaseRequest,
    prior: &[StationState],
) -> Result<PurchasePlan, (String, PricingError)> {
    let mut total: Price = 0;
    let mut slots = Vec::with_capacity(prior.len());

    for slot in prior {
        let (charged, next) = slot.occupy(engine).map_err(|e| (slot.key(), e))?;
        total = total
            .checked_add(charged)
            .ok_or_else(|| (slot.key(), PricingError::Overflow))?;
        slots.push(next);
    }

    Ok(PurchasePlan {
        option: ChargingOption {
            car: request.car.clone(),
            station: request.station,
            arrival: request.arrival,
            departure: request.departure,
            price: total,
            state: OptionState::Issued,
        },
        slots,
    })
}

/// Buy a new charging option, occupying every slot of its window.
///
/// Legacy contracts on this ledger format silently overwrote whatever was
/// stored under the key. Here an existing key is rejected with
/// [`MarketError::OptionExists`] and the grid is left untouched.
pub fn purchase<S: LedgerStore + ?Sized>(
    grid: &StationGrid,
    store: &mut S,
    request: &PurchaseRequest,
) -> Result<ChargingOption, MarketError> {
    grid.check_station(request.station)?;
    grid.check_window(request.arrival, request.departure)?;

    if store.get_state(&request.key)?.is_some() {
        return Err(MarketError::OptionExists(request.key.clone()));
    }

    let prior = (request.arrival..request.departure)
        .map(|time| grid.require_slot(store, request.station, time))
        .collect::<Result<Vec<_>, _>>()?;

    let plan = plan_purchase(grid.engine(), request, &prior)
        .map_err(|(key, source)| MarketError::Pricing { key, source })?;

    for slot in &plan.slots {
        store.put_record(&slot.key(), slot)?;
    }
    store.put_record(&request.key, &plan.option)?;

    info!(
        "Lifecycle: {} bought by {} at station {} slots [{}, {}) for {}",
        request.key,
        request.car,
        request.station,
        request.arrival,
        request.departure,
        plan.option.price
    );
    Ok(plan.option)
}

/// Load an option or fail with not-found
pub fn load_option<S: LedgerStore + ?Sized>(store: &mut S, key: &str) -> Result<ChargingOption, MarketError> {
    store
        .get_record(key)?
        .ok_or_else(|| MarketError::OptionNotFound(key.to_string()))
}

fn transition<S, F>(store: &mut S, key: &str, apply: F) -> Result<ChargingOption, MarketError>
where
    S: LedgerStore + ?Sized,
    F: FnOnce(&mut ChargingOption) -> Result<(), LifecycleError>,
{
    let mut option = load_option(store, key)?;
    let from = option.state;

    apply(&mut option).map_err(|source| MarketError::Lifecycle {
        key: key.to_string(),
        source,
    })?;
    store.put_record(key, &option)?;

    info!("Lifecycle: {} {} -> {}", key, from, option.state);
    Ok(option)
}

/// Mark an option as paid
pub fn confirm<S: LedgerStore + ?Sized>(store: &mut S, key: &str) -> Result<ChargingOption, MarketError> {
    transition(store, key, ChargingOption::confirm)
}

/// List a paid option for resale at `price`
pub fn list<S: LedgerStore + ?Sized>(store: &mut S, key: &str, price: Price) -> Result<ChargingOption, MarketError> {
    transition(store, key, |option| option.list(price))
}

/// Withdraw a listed option and reassign it to `car`
pub fn delist<S: LedgerStore + ?Sized>(store: &mut S, key: &str, car: &str) -> Result<ChargingOption, MarketError> {
    transition(store, key, |option| option.delist(car))
}
