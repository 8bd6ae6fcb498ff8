//! Marketplace core: pure search controller state machine and view-model helpers.
mod effect;
mod filters;
mod msg;
mod results;
mod state;
mod update;
mod view_model;

pub use effect::{Effect, SearchRequest};
pub use filters::{
    decode_pairs, encode_pairs, from_query_params, from_query_string, to_query_params,
    to_query_string, url_query, Availability, BudgetRange, GeoRadius, QueryParams, SearchDomain,
    SearchFilters, SortOrder, UnknownVariant, Verification,
};
pub use msg::Msg;
pub use results::{
    Budget, Generation, LoadState, Pagination, ResultAccumulator, ResultLocation, SearchPage,
    SearchResult,
};
pub use state::{
    DebounceTicket, SearchSettings, SearchState, DEFAULT_DEBOUNCE, DEFAULT_PAGE_SIZE,
};
pub use update::update;
pub use view_model::{ResultRowView, SearchViewModel};
