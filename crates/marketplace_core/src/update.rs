use marketplace_logging::{market_debug, market_info};

use crate::filters::from_query_params;
use crate::state::SearchStart;
use crate::{Effect, Msg, SearchState};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: SearchState, msg: Msg) -> (SearchState, Vec<Effect>) {
    let effects = match msg {
        Msg::FiltersEdited(filters) => {
            if filters == *state.filters() {
                return (state, Vec::new());
            }
            state.set_filters(filters);
            let ticket = state.arm_debounce();
            vec![Effect::ScheduleDebounce {
                ticket,
                delay: state.settings().debounce,
            }]
        }
        Msg::DebounceElapsed { ticket } => {
            if !state.take_debounce(ticket) {
                market_debug!("Ignoring superseded debounce ticket {}", ticket);
                return (state, Vec::new());
            }
            start_search(&mut state, SearchStart::KeepResults)
        }
        Msg::QueryRestored(params) => {
            state.set_filters(from_query_params(&params));
            state.cancel_debounce();
            // The address bar already shows this query.
            state.mark_url_reflected();
            start_search(&mut state, SearchStart::KeepResults)
        }
        Msg::DomainSwitched(domain) => {
            if domain == state.domain() {
                return (state, Vec::new());
            }
            state.set_domain(domain);
            state.cancel_debounce();
            start_search(&mut state, SearchStart::Reset)
        }
        Msg::LoadMoreRequested => match state.load_more() {
            Some(request) => {
                market_debug!(
                    "Loading page {} of generation {}",
                    request.page,
                    request.generation
                );
                vec![Effect::DispatchSearch(request)]
            }
            None => Vec::new(),
        },
        Msg::RetryRequested => match state.retry() {
            Some(request) => vec![Effect::DispatchSearch(request)],
            None => Vec::new(),
        },
        Msg::SearchCompleted {
            generation,
            page,
            outcome,
        } => {
            state.apply_outcome(generation, page, outcome);
            Vec::new()
        }
        Msg::SessionExpired => {
            if state.expire_session() {
                vec![Effect::RedirectToSignIn]
            } else {
                Vec::new()
            }
        }
        Msg::SignedIn => {
            state.restore_session();
            start_search(&mut state, SearchStart::KeepResults)
        }
    };

    (state, effects)
}

fn start_search(state: &mut SearchState, start: SearchStart) -> Vec<Effect> {
    let request = state.begin_search(start);
    market_info!(
        "Dispatching {} search generation {}",
        request.domain.as_str(),
        request.generation
    );
    let mut effects = Vec::with_capacity(2);
    if let Some(query) = state.reflect_url() {
        effects.push(Effect::ReplaceUrl { query });
    }
    effects.push(Effect::DispatchSearch(request));
    effects
}
