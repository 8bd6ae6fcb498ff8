#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// User replaced the filter snapshot.
    FiltersEdited(crate::SearchFilters),
    /// Debounce timer fired.
    DebounceElapsed { ticket: crate::DebounceTicket },
    /// Filters restored from the address bar (page load, back/forward).
    QueryRestored(crate::QueryParams),
    /// User switched between job and artisan search.
    DomainSwitched(crate::SearchDomain),
    /// User asked for the next page.
    LoadMoreRequested,
    /// User asked to retry the last failed fetch.
    RetryRequested,
    /// Engine finished a search fetch.
    SearchCompleted {
        generation: crate::Generation,
        page: u32,
        outcome: Result<crate::SearchPage, String>,
    },
    /// Credential renewal failed and the session was cleared.
    SessionExpired,
    /// A new sign-in succeeded.
    SignedIn,
}
