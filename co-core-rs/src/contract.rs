//! Named-operation dispatcher
//!
//! | Operation  | Arguments                               | Payload                  |
//! |------------|-----------------------------------------|--------------------------|
//! | initLedger | -                                       | -                        |
//! | buy        | key, car, station, arrival, departure   | -                        |
//! | confirm    | key                                     | -                        |
//! | list       | key, newPrice                           | -                        |
//! | delist     | key, newCar                             | -                        |
//! | queryCO    | key                                     | raw option record        |
//! | queryList  | -                                       | listed options           |
//! | queryPrice | arrival, departure                      | `Station: i, Price: p`   |
//!
//! [`ChargingOptionContract::submit`] runs one invocation in its own ledger
//! transaction: errors drop the transaction, success commits it.

use crate::config::MarketConfig;
use crate::error::MarketError;
use crate::grid::StationGrid;
use crate::ledger::{CommitReceipt, Ledger, LedgerStore};
use crate::lifecycle::{self, PurchaseRequest};
use crate::query;
use crate::types::{parse_index, parse_price};
use tracing::{debug, info};

/// Operations exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    InitLedger,
    Buy,
    Confirm,
    List,
    Delist,
    QueryCo,
    QueryList,
    QueryPrice,
}

impl Function {
    pub const ALL: [Function; 8] = [
        Function::InitLedger,
        Function::Buy,
        Function::Confirm,
        Function::List,
        Function::Delist,
        Function::QueryCo,
        Function::QueryList,
        Function::QueryPrice,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Function::InitLedger => "initLedger",
            Function::Buy => "buy",
            Function::Confirm => "confirm",
            Function::List => "list",
            Function::Delist => "delist",
            Function::QueryCo => "queryCO",
            Function::QueryList => "queryList",
            Function::QueryPrice => "queryPrice",
        }
    }

    /// Number of positional arguments
    pub fn arity(&self) -> usize {
        match self {
            Function::InitLedger | Function::QueryList => 0,
            Function::Confirm | Function::QueryCo => 1,
            Function::List | Function::Delist | Function::QueryPrice => 2,
            Function::Buy => 5,
        }
    }

    /// Whether the operation only reads the ledger
    pub fn is_query(&self) -> bool {
        matches!(self, Function::QueryCo | Function::QueryList | Function::QueryPrice)
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Function {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Function::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| MarketError::UnknownFunction(s.to_string()))
    }
}

/// Payload and commit receipt of a submitted invocation
#[derive(Debug, Clone)]
pub struct Outcome {
    pub payload: Vec<u8>,
    pub receipt: CommitReceipt,
}

/// Charging-option marketplace contract
#[derive(Debug, Clone)]
pub struct ChargingOptionContract {
    grid: StationGrid,
}

impl ChargingOptionContract {
    /// Create a contract, rejecting configurations the pricing formula cannot use
    pub fn new(config: MarketConfig) -> Result<Self, MarketError> {
        config.validate()?;
        Ok(Self {
            grid: StationGrid::new(config),
        })
    }

    pub fn grid(&self) -> &StationGrid {
        &self.grid
    }

    /// Route a named operation to its handler against `store`
    pub fn invoke<S, A>(&self, store: &mut S, function: &str, args: &[A]) -> Result<Vec<u8>, MarketError>
    where
        S: LedgerStore + ?Sized,
        A: AsRef<str>,
    {
        let function: Function = function.parse()?;
        if args.len() != function.arity() {
            return Err(MarketError::ArgumentCount {
                function: function.name().to_string(),
                expected: function.arity(),
                got: args.len(),
            });
        }
        let arg = |i: usize| args[i].as_ref();

        debug!("Contract: invoke {} with {} args", function, args.len());

        match function {
            Function::InitLedger => {
                self.grid.initialize(store)?;
                Ok(Vec::new())
            }
            Function::Buy => {
                let request = PurchaseRequest {
                    key: arg(0).to_string(),
                    car: arg(1).to_string(),
                    station: parse_index("station", arg(2))?,
                    arrival: parse_index("arrival", arg(3))?,
                    departure: parse_index("departure", arg(4))?,
                };
                lifecycle::purchase(&self.grid, store, &request)?;
                Ok(Vec::new())
            }
            Function::Confirm => {
                lifecycle::confirm(store, arg(0))?;
                Ok(Vec::new())
            }
            Function::List => {
                let price = parse_price(arg(1))?;
                lifecycle::list(store, arg(0), price)?;
                Ok(Vec::new())
            }
            Function::Delist => {
                lifecycle::delist(store, arg(0), arg(1))?;
                Ok(Vec::new())
            }
            Function::QueryCo => query::query_option(store, arg(0)),
            Function::QueryList => {
                let listed = query::query_listed(store)?;
                Ok(query::render_listed(&listed))
            }
            Function::QueryPrice => {
                let arrival = parse_index("arrival", arg(0))?;
                let departure = parse_index("departure", arg(1))?;
                let quotes = query::query_price_range(&self.grid, store, arrival, departure)?;
                Ok(query::render_quotes(&quotes).into_bytes())
            }
        }
    }

    /// Run one invocation as a ledger transaction and commit it.
    /// Queries are released under the read lock instead of committed.
    ///
    /// A [`MarketError::Store`] conflict means another transaction committed
    /// first; nothing was applied and the caller may resubmit.
    pub fn submit<A: AsRef<str>>(&self, ledger: &Ledger, function: &str, args: &[A]) -> Result<Outcome, MarketError> {
        let parsed: Function = function.parse()?;

        let mut tx = ledger.begin();
        let payload = self.invoke(&mut tx, function, args)?;
        let receipt = if parsed.is_query() {
            ledger.release(tx)?
        } else {
            ledger.commit(tx)?
        };

        if receipt.keys_written > 0 {
            info!(
                "Contract: {} committed as {} at height {}",
                function, receipt.tx_id, receipt.height
            );
        }
        Ok(Outcome { payload, receipt })
    }
}
