//! Core identifiers and ledger key layout

/// Caller-assigned key of a charging option
pub type OptionKey = String;

/// Charging station index in `0..station_count`
pub type StationId = u32;

/// Discrete time slot index in `0..horizon`
pub type SlotIndex = u32;

/// Integer currency units
pub type Price = u64;

/// Ledger key prefixes
pub mod keys {
    pub const STATION: &str = "Station";
    pub const SLOT: &str = "Slot";
}

/// Ledger key of a station-slot record, e.g. `Station3Slot7`
pub fn station_slot_key(station: StationId, time: SlotIndex) -> String {
    format!("{}{}{}{}", keys::STATION, station, keys::SLOT, time)
}

/// Parse a positional argument as a non-negative integer
pub fn parse_index(field: &'static str, value: &str) -> Result<u32, crate::MarketError> {
    value.parse().map_err(|_| crate::MarketError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Parse a positional argument as a price
pub fn parse_price(value: &str) -> Result<Price, crate::MarketError> {
    value.parse().map_err(|_| crate::MarketError::InvalidNumber {
        field: "price",
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MarketError;

    #[test]
    fn test_station_slot_key() {
        assert_eq!(station_slot_key(0, 0), "Station0Slot0");
        assert_eq!(station_slot_key(8, 12), "Station8Slot12");
    }

    #[test]
    fn test_parse_index() {
        assert_eq!(parse_index("arrival", "7").unwrap(), 7);
        assert!(matches!(
            parse_index("arrival", "-1"),
            Err(MarketError::InvalidNumber { field: "arrival", .. })
        ));
        assert!(parse_index("departure", "soon").is_err());
        assert!(parse_price("50").is_ok());
        assert!(parse_price("5.0").is_err());
    }
}
