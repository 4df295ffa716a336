use chrono::NaiveDate;
use pmcc_core::{OptionSide, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Filter predicates for `screen_stocks`, evaluated by provider F.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreenFilter {
    pub min_market_cap: Option<Decimal>,
    pub max_market_cap: Option<Decimal>,
    pub exchanges: Option<Vec<String>>,
    pub sectors: Option<Vec<String>>,
    pub min_avg_volume: Option<i64>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
}

/// One row of a `screen_stocks` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenedSymbol {
    pub symbol: Symbol,
    pub market_cap: Option<Decimal>,
    pub exchange: Option<String>,
    pub sector: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionFeed {
    Live,
    Cached,
}

/// Filter predicates for `get_option_chain`, evaluated by provider O.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainFilter {
    pub side: Option<OptionSide>,
    pub min_dte: Option<i64>,
    pub max_dte: Option<i64>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub min_strike: Option<Decimal>,
    pub max_strike: Option<Decimal>,
    pub min_delta: Option<Decimal>,
    pub max_delta: Option<Decimal>,
    pub min_open_interest: Option<i64>,
    pub max_bid_ask_spread_pct: Option<Decimal>,
    pub feed: Option<OptionFeed>,
}
