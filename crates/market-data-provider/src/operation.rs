use std::fmt;

/// The exact operation catalog the registry routes against. Adapters declare
/// which of these they support via `MarketDataProvider::supported_ops`; the
/// registry refuses to route an op to a provider that didn't declare it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ScreenStocks,
    GetQuote,
    GetQuotesBatch,
    GetOptionChain,
    GetExpirations,
    GetStrikes,
    GetFundamentals,
    GetCalendarEvents,
    GetTechnicals,
    AnalyzePmccOpportunity,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::ScreenStocks,
        Operation::GetQuote,
        Operation::GetQuotesBatch,
        Operation::GetOptionChain,
        Operation::GetExpirations,
        Operation::GetStrikes,
        Operation::GetFundamentals,
        Operation::GetCalendarEvents,
        Operation::GetTechnicals,
        Operation::AnalyzePmccOpportunity,
    ];

    /// The exact wire/config string this operation is identified by. Routing
    /// preference lists in config are keyed on these strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ScreenStocks => "screen_stocks",
            Operation::GetQuote => "get_quote",
            Operation::GetQuotesBatch => "get_quotes_batch",
            Operation::GetOptionChain => "get_option_chain",
            Operation::GetExpirations => "get_expirations",
            Operation::GetStrikes => "get_strikes",
            Operation::GetFundamentals => "get_fundamentals",
            Operation::GetCalendarEvents => "get_calendar_events",
            Operation::GetTechnicals => "get_technicals",
            Operation::AnalyzePmccOpportunity => "analyze_pmcc_opportunity",
        }
    }

    pub fn from_str(s: &str) -> Option<Operation> {
        Operation::ALL.into_iter().find(|op| op.as_str() == s)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
