use serde::Deserialize;

use marketplace_logging::market_debug;

/// Identifies one dispatched search; only responses carrying the current value are applied.
pub type Generation = u64;

/// Monetary budget as either a flat amount or a range.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Budget {
    Amount(f64),
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ResultLocation {
    Label(String),
    Place {
        #[serde(default)]
        address: Option<String>,
        #[serde(default)]
        city: Option<String>,
        #[serde(default)]
        state: Option<String>,
    },
}

impl ResultLocation {
    pub fn display(&self) -> String {
        match self {
            ResultLocation::Label(label) => label.clone(),
            ResultLocation::Place {
                address,
                city,
                state,
            } => [address, city, state]
                .into_iter()
                .flatten()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// One job or artisan record. Jobs carry `title`/`description`, artisans `name`/`bio`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    #[serde(alias = "_id")]
    pub id: Option<String>,
    pub title: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub bio: Option<String>,
    pub category: Option<String>,
    pub budget: Option<Budget>,
    pub location: Option<ResultLocation>,
    pub rating: Option<f64>,
    pub verified: Option<bool>,
    pub availability: Option<String>,
    pub created_at: Option<String>,
    pub distance: Option<f64>,
}

impl SearchResult {
    pub fn headline(&self) -> &str {
        self.title
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("(untitled)")
    }

    pub fn summary(&self) -> Option<&str> {
        self.description.as_deref().or(self.bio.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u32,
    pub pages: u32,
}

impl Pagination {
    pub fn has_more(&self) -> bool {
        self.page < self.pages
    }
}

/// One decoded page from the search endpoints.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchPage {
    pub results: Vec<SearchResult>,
    pub pagination: Pagination,
    pub suggestions: Vec<String>,
    pub search_time_ms: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Loaded,
    Errored,
}

/// Merges pages into one result list, keyed by generation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultAccumulator {
    generation: Generation,
    results: Vec<SearchResult>,
    pagination: Option<Pagination>,
    loaded_generation: Option<Generation>,
    state: LoadState,
    error: Option<String>,
    failed_page: Option<u32>,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn pagination(&self) -> Option<Pagination> {
        self.pagination
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn failed_page(&self) -> Option<u32> {
        self.failed_page
    }

    pub fn is_loading(&self) -> bool {
        self.state == LoadState::Loading
    }

    /// Only pagination received under the current generation counts; rows kept from an
    /// earlier search cannot be extended.
    pub fn has_more(&self) -> bool {
        self.current_pagination().is_some_and(|p| p.has_more())
    }

    fn current_pagination(&self) -> Option<Pagination> {
        self.pagination
            .filter(|_| self.loaded_generation == Some(self.generation))
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && !self.is_loading()
    }

    /// Starts a new search under `generation`. The current results stay visible until
    /// page 1 of the new generation replaces them.
    pub fn begin_search(&mut self, generation: Generation) {
        self.generation = generation;
        self.state = LoadState::Loading;
        self.error = None;
        self.failed_page = None;
    }

    /// Starts a new search and drops the accumulated results and pagination immediately.
    pub fn reset(&mut self, generation: Generation) {
        self.begin_search(generation);
        self.results.clear();
        self.pagination = None;
    }

    /// Claims the next page for a load-more fetch. Returns `None` while a fetch is
    /// outstanding or when every page has already been loaded.
    pub fn begin_load_more(&mut self) -> Option<u32> {
        if self.is_loading() {
            return None;
        }
        let pagination = self.current_pagination().filter(Pagination::has_more)?;
        self.state = LoadState::Loading;
        self.error = None;
        self.failed_page = None;
        Some(pagination.page + 1)
    }

    /// Re-enters `Loading` to re-request the page that failed under the current generation.
    pub fn begin_retry(&mut self) -> Option<u32> {
        if self.state != LoadState::Errored {
            return None;
        }
        let page = self.failed_page?;
        self.state = LoadState::Loading;
        self.error = None;
        self.failed_page = None;
        Some(page)
    }

    /// Applies a page. Returns `false` when it was discarded as stale or duplicate.
    pub fn apply_page(
        &mut self,
        generation: Generation,
        page: u32,
        data: Vec<SearchResult>,
        pagination: Pagination,
    ) -> bool {
        if generation != self.generation {
            market_debug!(
                "Discarding page {} of generation {} (current {})",
                page,
                generation,
                self.generation
            );
            return false;
        }

        if page <= 1 {
            self.results = data;
        } else {
            let expected = self.current_pagination().map_or(1, |p| p.page + 1);
            if page != expected {
                market_debug!(
                    "Discarding duplicate page {} of generation {} (expected {})",
                    page,
                    generation,
                    expected
                );
                return false;
            }
            self.results.extend(data);
        }

        self.pagination = Some(pagination);
        self.loaded_generation = Some(generation);
        self.state = LoadState::Loaded;
        self.error = None;
        self.failed_page = None;
        true
    }

    /// Records a failed fetch. Existing results are kept. Stale failures are ignored.
    pub fn apply_error(&mut self, generation: Generation, page: u32, message: String) -> bool {
        if generation != self.generation {
            market_debug!(
                "Discarding failure for page {} of generation {} (current {})",
                page,
                generation,
                self.generation
            );
            return false;
        }
        self.state = LoadState::Errored;
        self.error = Some(message);
        self.failed_page = Some(page);
        true
    }
}
