use marketplace_core::{LoadState, ResultRowView, SearchViewModel};

/// Builds the text block for one view snapshot.
pub fn render(view: &SearchViewModel, address: &str, signed_in: bool) -> Vec<String> {
    let mut lines = Vec::new();
    let session = if signed_in { "signed in" } else { "anonymous" };
    let address = if address.is_empty() {
        String::from("/search")
    } else {
        format!("/search?{address}")
    };
    lines.push(format!(
        "── {} search · {} · {}",
        view.domain.as_str(),
        address,
        session
    ));

    if view.session_expired {
        lines.push("Session expired. Sign in again with `login <email> <password>`.".to_string());
    }

    lines.extend(view.rows.iter().enumerate().map(|(index, row)| render_row(index + 1, row)));

    if view.is_empty {
        lines.push(match view.load_state {
            LoadState::Errored => "No results.".to_string(),
            _ => "No results match these filters.".to_string(),
        });
        if !view.suggestions.is_empty() {
            lines.push(format!("Did you mean: {}", view.suggestions.join(", ")));
        }
    }

    if let Some(error) = &view.error {
        lines.push(format!("Error: {error}  (type `retry`)"));
    }

    let mut status = Vec::new();
    if let Some(total) = view.total {
        status.push(format!("{} of {} shown", view.result_count, total));
    }
    if let (Some(page), Some(pages)) = (view.page, view.pages) {
        status.push(format!("page {page}/{pages}"));
    }
    if let Some(ms) = view.search_time_ms {
        status.push(format!("{ms:.0} ms"));
    }
    if view.is_loading {
        status.push("loading…".to_string());
    } else if view.debounce_pending {
        status.push("waiting for typing to settle".to_string());
    } else if view.has_more {
        status.push("`more` for next page".to_string());
    }
    if !status.is_empty() {
        lines.push(status.join(" · "));
    }
    lines
}

fn render_row(position: usize, row: &ResultRowView) -> String {
    let mut line = format!("{position:>3}. {}", row.headline);
    if row.verified {
        line.push_str(" ✔");
    }
    let details: Vec<String> = [
        row.category.clone(),
        row.location.clone(),
        row.rating.map(|rating| format!("★ {rating:.1}")),
        row.distance.map(|distance| format!("{distance:.1} km")),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !details.is_empty() {
        line.push_str(&format!("  [{}]", details.join(" | ")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(headline: &str) -> ResultRowView {
        ResultRowView {
            id: Some(headline.to_lowercase()),
            headline: headline.to_string(),
            summary: None,
            category: Some("plumbing".to_string()),
            location: None,
            rating: Some(4.3),
            verified: true,
            distance: None,
        }
    }

    #[test]
    fn renders_rows_and_paging_status() {
        let view = SearchViewModel {
            rows: vec![row("Fix sink"), row("Unblock drain")],
            result_count: 2,
            total: Some(45),
            page: Some(1),
            pages: Some(3),
            has_more: true,
            load_state: LoadState::Loaded,
            ..SearchViewModel::default()
        };
        let lines = render(&view, "keyword=plumber", false);

        assert_eq!(lines[0], "── jobs search · /search?keyword=plumber · anonymous");
        assert_eq!(lines[1], "  1. Fix sink ✔  [plumbing | ★ 4.3]");
        assert_eq!(
            lines.last().unwrap(),
            "2 of 45 shown · page 1/3 · `more` for next page"
        );
    }

    #[test]
    fn empty_results_show_suggestions() {
        let view = SearchViewModel {
            is_empty: true,
            load_state: LoadState::Loaded,
            suggestions: vec!["plumber".to_string()],
            ..SearchViewModel::default()
        };
        let lines = render(&view, "", true);
        assert!(lines.contains(&"No results match these filters.".to_string()));
        assert!(lines.contains(&"Did you mean: plumber".to_string()));
        assert!(lines[0].ends_with("/search · signed in"));
    }

    #[test]
    fn errors_offer_retry_and_expiry_prompts_sign_in() {
        let view = SearchViewModel {
            error: Some("Network error. Please check your internet connection.".to_string()),
            load_state: LoadState::Errored,
            session_expired: true,
            ..SearchViewModel::default()
        };
        let lines = render(&view, "", false);
        assert!(lines.iter().any(|line| line.starts_with("Session expired.")));
        assert!(lines.iter().any(|line| line.ends_with("(type `retry`)")));
    }
}
