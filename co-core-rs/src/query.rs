//! Read-only projections over options and the station grid

use crate::codec::RecordExt;
use crate::error::MarketError;
use crate::grid::StationGrid;
use crate::ledger::{LedgerStore, Selector};
use crate::lifecycle::{ChargingOption, OptionState};
use crate::types::{Price, SlotIndex, StationId};
use tracing::debug;

/// A listed option with the exact bytes stored for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedOption {
    pub key: String,
    pub option: ChargingOption,
    pub raw: Vec<u8>,
}

/// Summed live price of one station over a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationQuote {
    pub station: StationId,
    pub price: Price,
}

/// Raw stored bytes of an option; empty when absent
pub fn query_option<S: LedgerStore + ?Sized>(store: &mut S, key: &str) -> Result<Vec<u8>, MarketError> {
    Ok(store.get_state(key)?.unwrap_or_default())
}

/// Selector for options offered for resale
pub fn listed_selector() -> Selector {
    Selector::field_eq("CO_state", OptionState::Listed.code())
}

/// All options currently in the LISTED state, ordered by key
pub fn query_listed<S: LedgerStore + ?Sized>(store: &mut S) -> Result<Vec<ListedOption>, MarketError> {
    let results = store.query(&listed_selector())?;

    let listed = results
        .into_iter()
        .map(|(key, raw)| {
            serde_json::from_slice(&raw)
                .map(|option| ListedOption {
                    key: key.clone(),
                    option,
                    raw,
                })
                .map_err(|source| MarketError::MalformedRecord { key, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!("Query: {} listed options", listed.len());
    Ok(listed)
}

/// Text rendering of listed options: `"Listed Charging Option":"<key>"<record>` per option
pub fn render_listed(listed: &[ListedOption]) -> Vec<u8> {
    let mut buffer = Vec::new();
    for entry in listed {
        buffer.extend_from_slice(b"\"Listed Charging Option\":\"");
        buffer.extend_from_slice(entry.key.as_bytes());
        buffer.push(b'"');
        buffer.extend_from_slice(&entry.raw);
    }
    buffer
}

/// Per-station sum of the live slot prices over `[arrival, departure)`
pub fn query_price_range<S: LedgerStore + ?Sized>(
    grid: &StationGrid,
    store: &mut S,
    arrival: SlotIndex,
    departure: SlotIndex,
) -> Result<Vec<StationQuote>, MarketError> {
    grid.check_window(arrival, departure)?;

    (0..grid.config().station_count)
        .map(|station| -> Result<StationQuote, MarketError> {
            let mut price: Price = 0;
            for time in arrival..departure {
                price = price.saturating_add(grid.require_slot(store, station, time)?.price);
            }
            Ok(StationQuote { station, price })
        })
        .collect()
}

/// One `Station: <id>, Price: <sum>` line per station
pub fn render_quotes(quotes: &[StationQuote]) -> String {
    quotes
        .iter()
        .map(|q| format!("Station: {}, Price: {}\n", q.station, q.price))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketConfig;
    use crate::ledger::Ledger;
    use crate::lifecycle::{self, PurchaseRequest};

    fn setup() -> (StationGrid, Ledger) {
        let grid = StationGrid::new(MarketConfig::default());
        let ledger = Ledger::in_memory();
        let mut tx = ledger.begin();
        grid.initialize(&mut tx).unwrap();
        ledger.commit(tx).unwrap();
        (grid, ledger)
    }

    #[test]
    fn test_query_option_absent_is_empty() {
        let ledger = Ledger::in_memory();
        let mut tx = ledger.begin();
        assert!(query_option(&mut tx, "nope").unwrap().is_empty());

        tx.put_state("CO9", b"{\"x\":1}".to_vec()).unwrap();
        assert_eq!(query_option(&mut tx, "CO9").unwrap(), b"{\"x\":1}".to_vec());
    }

    #[test]
    fn test_price_range_reads_live_prices() {
        let (grid, ledger) = setup();
        let mut tx = ledger.begin();

        let quotes = query_price_range(&grid, &mut tx, 0, 2).unwrap();
        assert_eq!(quotes.len(), 9);
        assert_eq!(quotes[0], StationQuote { station: 0, price: 8 });
        assert_eq!(quotes[8], StationQuote { station: 8, price: 58 });

        // Two purchases on station 2 push busy from 1 to 3 at slot 0
        for key in ["A", "B"] {
            let request = PurchaseRequest {
                key: key.to_string(),
                car: "car".to_string(),
                station: 2,
                arrival: 0,
                departure: 1,
            };
            lifecycle::purchase(&grid, &mut tx, &request).unwrap();
        }
        let quotes = query_price_range(&grid, &mut tx, 0, 2).unwrap();
        assert_eq!(quotes[2].price, 10 + 4);
    }

    #[test]
    fn test_price_range_rejects_bad_window() {
        let (grid, ledger) = setup();
        let mut tx = ledger.begin();
        assert!(matches!(
            query_price_range(&grid, &mut tx, 2, 2),
            Err(MarketError::InvalidTimeRange { .. })
        ));
        assert!(query_price_range(&grid, &mut tx, 9, 11).is_err());
    }

    #[test]
    fn test_render_quotes() {
        let quotes = [
            StationQuote { station: 0, price: 4 },
            StationQuote { station: 1, price: 6 },
        ];
        assert_eq!(render_quotes(&quotes), "Station: 0, Price: 4\nStation: 1, Price: 6\n");
    }

    #[test]
    fn test_render_listed() {
        let option = ChargingOption {
            car: "car1".to_string(),
            station: 0,
            arrival: 0,
            departure: 3,
            price: 50,
            state: OptionState::Listed,
        };
        let raw = serde_json::to_vec(&option).unwrap();
        let listed = [ListedOption {
            key: "CO1".to_string(),
            option,
            raw: raw.clone(),
        }];

        let mut expected = b"\"Listed Charging Option\":\"CO1\"".to_vec();
        expected.extend_from_slice(&raw);
        assert_eq!(render_listed(&listed), expected);
    }
}
