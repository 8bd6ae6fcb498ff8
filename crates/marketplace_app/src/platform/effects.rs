use std::sync::mpsc;
use std::thread;

use marketplace_core::{Effect, Msg, Pagination, SearchDomain, SearchPage, SearchResult};
use marketplace_engine::{
    ClientSettings, CredentialStore, EngineError, EngineEvent, EngineHandle, PageInfo,
    SearchCommand, SearchEndpoint,
};
use marketplace_logging::{market_info, market_warn};

use super::app::AppEvent;

/// Something the engine reported that the main loop must act on.
#[derive(Debug)]
pub enum Notice {
    Msg(Msg),
    SignInFailed(String),
    RedirectToSignIn,
}

/// Executes effects produced by `update` and turns engine events back into messages.
pub struct EffectRunner {
    engine: EngineHandle<SearchResult>,
    timer_tx: mpsc::Sender<AppEvent>,
    address: String,
    redirect_pending: bool,
}

impl EffectRunner {
    pub fn new(
        settings: ClientSettings,
        store: CredentialStore,
        timer_tx: mpsc::Sender<AppEvent>,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            engine: EngineHandle::new(settings, store)?,
            timer_tx,
            address: String::new(),
            redirect_pending: false,
        })
    }

    /// Query string most recently mirrored into the address line.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_signed_in(&self) -> bool {
        self.engine.client().credentials().get().is_some()
    }

    pub fn enqueue(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::ScheduleDebounce { ticket, delay } => {
                    let timer_tx = self.timer_tx.clone();
                    thread::spawn(move || {
                        thread::sleep(delay);
                        let _ = timer_tx.send(AppEvent::Msg(Msg::DebounceElapsed { ticket }));
                    });
                }
                Effect::DispatchSearch(request) => {
                    self.engine.search(SearchCommand {
                        generation: request.generation,
                        endpoint: map_domain(request.domain),
                        params: request.params,
                        page: request.page,
                        limit: request.limit,
                    });
                }
                Effect::ReplaceUrl { query } => {
                    market_info!("ReplaceUrl ?{}", query);
                    self.address = query;
                }
                Effect::RedirectToSignIn => {
                    self.redirect_pending = true;
                }
            }
        }
    }

    pub fn sign_in(&self, email: String, password: String) {
        self.engine.sign_in(email, password);
    }

    pub fn sign_out(&self) {
        self.engine.sign_out();
    }

    /// Drains everything the engine has reported since the last call.
    pub fn drain(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        if std::mem::take(&mut self.redirect_pending) {
            notices.push(Notice::RedirectToSignIn);
        }
        while let Some(event) = self.engine.try_recv() {
            notices.push(map_event(event));
        }
        notices
    }
}

fn map_event(event: EngineEvent<SearchResult>) -> Notice {
    match event {
        EngineEvent::SearchCompleted {
            generation,
            page,
            result,
        } => {
            let outcome = match result {
                Ok(found) => Ok(SearchPage {
                    results: found.data,
                    pagination: map_pagination(found.pagination),
                    suggestions: found.suggestions,
                    search_time_ms: found.search_time_ms,
                }),
                Err(err) => {
                    market_warn!(
                        "Search generation {} page {} failed: {} ({})",
                        generation,
                        page,
                        err,
                        err.kind
                    );
                    Err(err.message)
                }
            };
            Notice::Msg(Msg::SearchCompleted {
                generation,
                page,
                outcome,
            })
        }
        EngineEvent::SignInCompleted(Ok(())) => Notice::Msg(Msg::SignedIn),
        EngineEvent::SignInCompleted(Err(err)) => Notice::SignInFailed(err.message),
        EngineEvent::SessionExpired => Notice::Msg(Msg::SessionExpired),
    }
}

fn map_domain(domain: SearchDomain) -> SearchEndpoint {
    match domain {
        SearchDomain::Jobs => SearchEndpoint::Jobs,
        SearchDomain::Artisans => SearchEndpoint::Artisans,
    }
}

fn map_pagination(info: PageInfo) -> Pagination {
    Pagination {
        page: info.page,
        limit: info.limit,
        total: info.total,
        pages: info.pages,
    }
}
