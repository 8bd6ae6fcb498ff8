use std::time::Duration;

use crate::{DebounceTicket, Generation, QueryParams, SearchDomain};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Start a timer that reports back with `Msg::DebounceElapsed { ticket }`.
    ScheduleDebounce {
        ticket: DebounceTicket,
        delay: Duration,
    },
    DispatchSearch(SearchRequest),
    /// Mirror the shareable part of the query into the address bar.
    ReplaceUrl { query: String },
    RedirectToSignIn,
}

/// One search fetch. `params` holds the filter pairs only; paging is added by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub generation: Generation,
    pub domain: SearchDomain,
    pub page: u32,
    pub limit: u32,
    pub params: QueryParams,
}
