use std::time::Duration;

use crate::filters::{to_query_params, url_query};
use crate::results::ResultAccumulator;
use crate::view_model::{ResultRowView, SearchViewModel};
use crate::{Generation, SearchDomain, SearchFilters, SearchPage, SearchRequest};

/// Identifies the most recently armed debounce timer.
pub type DebounceTicket = u64;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSettings {
    pub debounce: Duration,
    pub page_size: u32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SearchStart {
    /// Keep showing the previous results until page 1 arrives.
    KeepResults,
    /// Clear results and pagination now.
    Reset,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchState {
    settings: SearchSettings,
    domain: SearchDomain,
    filters: SearchFilters,
    /// Filters of the active generation; load-more pages reuse them.
    dispatched: Option<SearchFilters>,
    generation: Generation,
    debounce_ticket: DebounceTicket,
    pending_debounce: Option<DebounceTicket>,
    reflected_url: Option<String>,
    results: ResultAccumulator,
    suggestions: Vec<String>,
    search_time_ms: Option<f64>,
    session_expired: bool,
    dirty: bool,
}

impl SearchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: SearchSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> SearchSettings {
        self.settings
    }

    pub fn domain(&self) -> SearchDomain {
        self.domain
    }

    pub fn filters(&self) -> &SearchFilters {
        &self.filters
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn pending_debounce(&self) -> Option<DebounceTicket> {
        self.pending_debounce
    }

    pub fn results(&self) -> &ResultAccumulator {
        &self.results
    }

    pub fn session_expired(&self) -> bool {
        self.session_expired
    }

    pub fn view(&self) -> SearchViewModel {
        let pagination = self.results.pagination();
        SearchViewModel {
            domain: self.domain,
            filters: self.filters.clone(),
            url_query: url_query(&self.filters),
            rows: self
                .results
                .results()
                .iter()
                .map(ResultRowView::from_result)
                .collect(),
            result_count: self.results.len(),
            total: pagination.map(|p| p.total),
            page: pagination.map(|p| p.page),
            pages: pagination.map(|p| p.pages),
            has_more: self.results.has_more(),
            is_empty: self.results.is_empty(),
            is_loading: self.results.is_loading(),
            load_state: self.results.state(),
            error: self.results.error().map(ToOwned::to_owned),
            suggestions: self.suggestions.clone(),
            search_time_ms: self.search_time_ms,
            debounce_pending: self.pending_debounce.is_some(),
            session_expired: self.session_expired,
            dirty: self.dirty,
        }
    }

    /// Returns whether a render is due and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn set_filters(&mut self, filters: SearchFilters) {
        self.filters = filters;
        self.mark_dirty();
    }

    pub(crate) fn set_domain(&mut self, domain: SearchDomain) {
        self.domain = domain;
        self.mark_dirty();
    }

    /// Supersedes any pending timer and returns the ticket of the new one.
    pub(crate) fn arm_debounce(&mut self) -> DebounceTicket {
        self.debounce_ticket += 1;
        self.pending_debounce = Some(self.debounce_ticket);
        self.debounce_ticket
    }

    pub(crate) fn cancel_debounce(&mut self) {
        self.pending_debounce = None;
    }

    /// Consumes the pending timer if `ticket` is the latest one.
    pub(crate) fn take_debounce(&mut self, ticket: DebounceTicket) -> bool {
        if self.pending_debounce == Some(ticket) {
            self.pending_debounce = None;
            true
        } else {
            false
        }
    }

    /// Bumps the generation and snapshots the current filters for page 1.
    pub(crate) fn begin_search(&mut self, start: SearchStart) -> SearchRequest {
        self.generation += 1;
        match start {
            SearchStart::KeepResults => self.results.begin_search(self.generation),
            SearchStart::Reset => {
                self.results.reset(self.generation);
                self.suggestions.clear();
                self.search_time_ms = None;
            }
        }
        self.dispatched = Some(self.filters.clone());
        self.mark_dirty();
        self.request_for(1)
    }

    pub(crate) fn load_more(&mut self) -> Option<SearchRequest> {
        let page = self.results.begin_load_more()?;
        self.mark_dirty();
        Some(self.request_for(page))
    }

    /// Re-requests a failed page under the active generation. A failed first page
    /// becomes a fresh search.
    pub(crate) fn retry(&mut self) -> Option<SearchRequest> {
        match self.results.failed_page()? {
            0 | 1 => Some(self.begin_search(SearchStart::KeepResults)),
            _ => {
                let page = self.results.begin_retry()?;
                self.mark_dirty();
                Some(self.request_for(page))
            }
        }
    }

    /// Returns the address-bar query when it differs from the one last reflected.
    pub(crate) fn reflect_url(&mut self) -> Option<String> {
        let query = url_query(&self.filters);
        if self.reflected_url.as_deref() == Some(query.as_str()) {
            return None;
        }
        self.reflected_url = Some(query.clone());
        Some(query)
    }

    pub(crate) fn mark_url_reflected(&mut self) {
        self.reflected_url = Some(url_query(&self.filters));
    }

    pub(crate) fn apply_outcome(
        &mut self,
        generation: Generation,
        page: u32,
        outcome: Result<SearchPage, String>,
    ) {
        let applied = match outcome {
            Ok(search_page) => {
                let SearchPage {
                    results,
                    pagination,
                    suggestions,
                    search_time_ms,
                } = search_page;
                let applied = self
                    .results
                    .apply_page(generation, page, results, pagination);
                if applied {
                    self.suggestions = suggestions;
                    self.search_time_ms = search_time_ms;
                }
                applied
            }
            Err(message) => self.results.apply_error(generation, page, message),
        };
        if applied {
            self.mark_dirty();
        }
    }

    pub(crate) fn expire_session(&mut self) -> bool {
        if self.session_expired {
            return false;
        }
        self.session_expired = true;
        self.mark_dirty();
        true
    }

    pub(crate) fn restore_session(&mut self) {
        self.session_expired = false;
        self.mark_dirty();
    }

    fn request_for(&self, page: u32) -> SearchRequest {
        let filters = self.dispatched.as_ref().unwrap_or(&self.filters);
        SearchRequest {
            generation: self.generation,
            domain: self.domain,
            page,
            limit: self.settings.page_size,
            params: to_query_params(filters),
        }
    }
}
