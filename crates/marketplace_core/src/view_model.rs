use crate::results::{LoadState, SearchResult};
use crate::{SearchDomain, SearchFilters};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchViewModel {
    pub domain: SearchDomain,
    pub filters: SearchFilters,
    pub url_query: String,
    pub rows: Vec<ResultRowView>,
    pub result_count: usize,
    pub total: Option<u32>,
    pub page: Option<u32>,
    pub pages: Option<u32>,
    pub has_more: bool,
    pub is_empty: bool,
    pub is_loading: bool,
    pub load_state: LoadState,
    pub error: Option<String>,
    pub suggestions: Vec<String>,
    pub search_time_ms: Option<f64>,
    pub debounce_pending: bool,
    pub session_expired: bool,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRowView {
    pub id: Option<String>,
    pub headline: String,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub rating: Option<f64>,
    pub verified: bool,
    pub distance: Option<f64>,
}

impl ResultRowView {
    pub(crate) fn from_result(result: &SearchResult) -> Self {
        Self {
            id: result.id.clone(),
            headline: result.headline().to_string(),
            summary: result.summary().map(ToOwned::to_owned),
            category: result.category.clone(),
            location: result.location.as_ref().map(|location| location.display()),
            rating: result.rating,
            verified: result.verified.unwrap_or(false),
            distance: result.distance,
        }
    }
}
