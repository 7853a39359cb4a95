//! Station grid model
//!
//! One [`StationState`] per (station, slot) over `station_count × horizon`.
//! Occupancy only ever grows, and the stored price is always the pricing
//! engine's output for the record's current (N, Lambda_b, Lambda_k).

use crate::codec::{decimal, RecordExt};
use crate::config::MarketConfig;
use crate::error::{MarketError, PricingError};
use crate::ledger::LedgerStore;
use crate::pricing::PricingEngine;
use crate::types::{station_slot_key, Price, SlotIndex, StationId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Occupancy and price of one station at one time slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationState {
    #[serde(rename = "ID_cs", with = "decimal")]
    pub station: StationId,

    #[serde(rename = "Time", with = "decimal")]
    pub time: SlotIndex,

    /// Charging slots (N)
    #[serde(rename = "Number of charging slots", with = "decimal")]
    pub capacity: u32,

    /// Busy occupancy (Lambda_b)
    #[serde(rename = "Lambda_b", with = "decimal")]
    pub busy: u32,

    /// Baseline arrival rate (Lambda_k)
    #[serde(rename = "Lambda_k", with = "decimal")]
    pub arrival_rate: u32,

    #[serde(rename = "CO_price", with = "decimal")]
    pub price: Price,
}

impl StationState {
    /// Ledger key of this record
    pub fn key(&self) -> String {
        station_slot_key(self.station, self.time)
    }

    /// Add one occupant: returns the price charged (the price before the
    /// increment) and the next state with its recomputed price
    pub fn occupy(&self, engine: &PricingEngine) -> Result<(Price, StationState), PricingError> {
        let busy = self.busy.checked_add(1).ok_or(PricingError::Overflow)?;
        let price = engine.price(self.capacity, busy, self.arrival_rate)?;

        let next = StationState {
            busy,
            price,
            ..self.clone()
        };
        Ok((self.price, next))
    }
}

/// Station grid bound to one marketplace configuration
#[derive(Debug, Clone)]
pub struct StationGrid {
    config: MarketConfig,
    engine: PricingEngine,
}

impl StationGrid {
    pub fn new(config: MarketConfig) -> Self {
        let engine = PricingEngine::new(&config);
        Self { config, engine }
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn engine(&self) -> &PricingEngine {
        &self.engine
    }

    /// Baseline occupancy at initialization
    pub fn initial_busy(station: StationId) -> u32 {
        station / 2
    }

    /// Freshly initialized record for (station, time)
    pub fn initial_slot(&self, station: StationId, time: SlotIndex) -> Result<StationState, PricingError> {
        let busy = Self::initial_busy(station);
        let price = self
            .engine
            .price(self.config.slot_capacity, busy, self.config.arrival_rate)?;

        Ok(StationState {
            station,
            time,
            capacity: self.config.slot_capacity,
            busy,
            arrival_rate: self.config.arrival_rate,
            price,
        })
    }

    /// Write every station-slot record with baseline occupancy.
    /// Returns the number of records written.
    pub fn initialize<S: LedgerStore + ?Sized>(&self, store: &mut S) -> Result<usize, MarketError> {
        let mut written = 0;
        for station in 0..self.config.station_count {
            for time in 0..self.config.horizon {
                let slot = self.initial_slot(station, time).map_err(|source| MarketError::Pricing {
                    key: station_slot_key(station, time),
                    source,
                })?;
                store.put_record(&slot.key(), &slot)?;
                written += 1;
            }
        }

        info!(
            "Grid: Initialized {} stations x {} slots ({} pricing)",
            self.config.station_count,
            self.config.horizon,
            self.engine.mode()
        );
        Ok(written)
    }

    /// Point lookup of one station-slot
    pub fn get_slot<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        station: StationId,
        time: SlotIndex,
    ) -> Result<Option<StationState>, MarketError> {
        store.get_record(&station_slot_key(station, time))
    }

    /// Like [`get_slot`](Self::get_slot), but absence is an error
    pub fn require_slot<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        station: StationId,
        time: SlotIndex,
    ) -> Result<StationState, MarketError> {
        self.get_slot(store, station, time)?
            .ok_or_else(|| MarketError::SlotNotFound(station_slot_key(station, time)))
    }

    /// Increment a slot's occupancy and store its new price.
    /// Returns the price before the increment and the updated state.
    pub fn occupy_slot<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        station: StationId,
        time: SlotIndex,
    ) -> Result<(Price, StationState), MarketError> {
        let slot = self.require_slot(store, station, time)?;
        let (charged, next) = slot.occupy(&self.engine).map_err(|source| MarketError::Pricing {
            key: slot.key(),
            source,
        })?;

        store.put_record(&next.key(), &next)?;
        debug!(
            "Grid: {} busy {} -> {}, price {} -> {}",
            next.key(),
            slot.busy,
            next.busy,
            charged,
            next.price
        );
        Ok((charged, next))
    }

    /// Reject station indices outside the grid
    pub fn check_station(&self, station: StationId) -> Result<(), MarketError> {
        if station >= self.config.station_count {
            return Err(MarketError::InvalidStation {
                station,
                station_count: self.config.station_count,
            });
        }
        Ok(())
    }

    /// Require `arrival < departure <= horizon`
    pub fn check_window(&self, arrival: SlotIndex, departure: SlotIndex) -> Result<(), MarketError> {
        if arrival >= departure || departure > self.config.horizon {
            return Err(MarketError::InvalidTimeRange {
                arrival,
                departure,
                horizon: self.config.horizon,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;

    fn grid() -> StationGrid {
        StationGrid::new(MarketConfig::default())
    }

    #[test]
    fn test_station_state_wire_format() {
        let slot = grid().initial_slot(3, 7).unwrap();
        let json = serde_json::to_string(&slot).unwrap();
        assert_eq!(
            json,
            r#"{"ID_cs":"3","Time":"7","Number of charging slots":"20","Lambda_b":"1","Lambda_k":"15","CO_price":"4"}"#
        );

        let parsed: StationState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, slot);
    }

    #[test]
    fn test_initial_prices_per_station() {
        let grid = grid();
        let prices: Vec<Price> = (0..9).map(|s| grid.initial_slot(s, 0).unwrap().price).collect();
        assert_eq!(prices, vec![4, 4, 4, 4, 6, 6, 10, 10, 29]);
    }

    #[test]
    fn test_occupy_pure() {
        let grid = grid();
        let slot = grid.initial_slot(0, 0).unwrap();

        let (charged, next) = slot.occupy(grid.engine()).unwrap();
        assert_eq!(charged, 4);
        assert_eq!(next.busy, 1);
        assert_eq!(next.price, 4);
        assert_eq!(next.capacity, slot.capacity);
        assert_eq!(next.arrival_rate, slot.arrival_rate);

        // Station 8 starts at busy=4; one more leaves the pricing domain
        let full = grid.initial_slot(8, 0).unwrap();
        assert!(matches!(full.occupy(grid.engine()), Err(PricingError::Saturated { .. })));
    }

    #[test]
    fn test_initialize_and_occupy() {
        let grid = grid();
        let ledger = Ledger::in_memory();

        let mut tx = ledger.begin();
        assert_eq!(grid.initialize(&mut tx).unwrap(), 90);
        ledger.commit(tx).unwrap();

        let mut tx = ledger.begin();
        let (charged, updated) = grid.occupy_slot(&mut tx, 6, 2).unwrap();
        assert_eq!(charged, 10);
        assert_eq!(updated.busy, 4);
        assert_eq!(updated.price, 29);
        assert_eq!(grid.get_slot(&mut tx, 6, 2).unwrap(), Some(updated));
        ledger.commit(tx).unwrap();

        let mut tx = ledger.begin();
        let err = grid.occupy_slot(&mut tx, 6, 2).unwrap_err();
        assert!(matches!(err, MarketError::Pricing { .. }));
        // Neighbouring slot untouched
        assert_eq!(grid.get_slot(&mut tx, 6, 3).unwrap().unwrap().busy, 3);
    }

    #[test]
    fn test_missing_slot_is_explicit() {
        let grid = grid();
        let ledger = Ledger::in_memory();
        let mut tx = ledger.begin();

        assert_eq!(grid.get_slot(&mut tx, 0, 0).unwrap(), None);
        assert!(matches!(
            grid.occupy_slot(&mut tx, 0, 0),
            Err(MarketError::SlotNotFound(key)) if key == "Station0Slot0"
        ));
    }

    #[test]
    fn test_window_checks() {
        let grid = grid();
        assert!(grid.check_window(0, 1).is_ok());
        assert!(grid.check_window(0, 10).is_ok());
        assert!(grid.check_window(3, 3).is_err());
        assert!(grid.check_window(4, 2).is_err());
        assert!(grid.check_window(5, 11).is_err());
        assert!(grid.check_station(8).is_ok());
        assert!(grid.check_station(9).is_err());
    }
}
