//! Parses one stdin line into a message or an app-level action.
//!
//! Filter commands never mutate in place: each one clones the current snapshot, applies a
//! single change and hands the whole value to `Msg::FiltersEdited`.

use anyhow::{anyhow, bail, Context};
use marketplace_core::{
    decode_pairs, Availability, BudgetRange, GeoRadius, Msg, SearchDomain, SearchFilters,
    SortOrder, Verification,
};

pub const HELP: &str = "\
Filters:  keyword <text> | category <text> | near <lat> <lng> <radius_m> [label] | anywhere
          budget <min> <max> | budget any | rating <min> | rating any
          skill +<name> | skill -<name> | availability <available|busy|offline|any>
          verification <verified|unverified|any> | sort <relevance|rating|price_low|price_high|distance|newest>
          clear
Search:   jobs | artisans | more | retry | open <query-string>
Session:  login <email> <password> | logout
Other:    help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Msg(Msg),
    SignIn { email: String, password: String },
    SignOut,
    Help,
    Quit,
}

pub fn parse(line: &str, current: &SearchFilters) -> anyhow::Result<Option<Input>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };
    let edit = |filters: SearchFilters| -> anyhow::Result<Option<Input>> {
        Ok(Some(Input::Msg(Msg::FiltersEdited(filters))))
    };
    let base = current.clone();

    match command.to_ascii_lowercase().as_str() {
        "keyword" | "k" => edit(base.with_keyword(rest)),
        "category" => edit(base.with_category(rest)),
        "near" => edit(base.with_location(Some(parse_location(rest)?))),
        "anywhere" => edit(base.with_location(None)),
        "budget" => edit(base.with_budget(parse_budget(rest)?)),
        "rating" => edit(base.with_rating_min(parse_rating(rest)?)),
        "skill" => edit(parse_skill(base, rest)?),
        "availability" => edit(base.with_availability(parse_optional::<Availability>(rest)?)),
        "verification" => edit(base.with_verification(parse_optional::<Verification>(rest)?)),
        "sort" => {
            let order: SortOrder = rest.parse().map_err(|err| anyhow!("sort: {err}"))?;
            edit(base.with_sort(order))
        }
        "clear" => edit(SearchFilters::default()),
        "jobs" => Ok(Some(Input::Msg(Msg::DomainSwitched(SearchDomain::Jobs)))),
        "artisans" => Ok(Some(Input::Msg(Msg::DomainSwitched(SearchDomain::Artisans)))),
        "more" => Ok(Some(Input::Msg(Msg::LoadMoreRequested))),
        "retry" => Ok(Some(Input::Msg(Msg::RetryRequested))),
        "open" => Ok(Some(Input::Msg(Msg::QueryRestored(decode_pairs(rest))))),
        "login" => {
            let mut parts = rest.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(email), Some(password), None) => Ok(Some(Input::SignIn {
                    email: email.to_string(),
                    password: password.to_string(),
                })),
                _ => bail!("usage: login <email> <password>"),
            }
        }
        "logout" => Ok(Some(Input::SignOut)),
        "help" | "?" => Ok(Some(Input::Help)),
        "quit" | "exit" | "q" => Ok(Some(Input::Quit)),
        other => bail!("unknown command `{other}`, type `help`"),
    }
}

fn parse_location(rest: &str) -> anyhow::Result<GeoRadius> {
    let mut parts = rest.splitn(4, char::is_whitespace);
    let (Some(lat), Some(lng), Some(radius)) = (parts.next(), parts.next(), parts.next()) else {
        bail!("usage: near <lat> <lng> <radius_m> [label]");
    };
    let lat = parse_number(lat, "latitude")?;
    let lng = parse_number(lng, "longitude")?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        bail!("coordinates out of range");
    }
    let radius_meters: u32 = radius
        .parse()
        .with_context(|| format!("radius `{radius}` is not a whole number of metres"))?;
    if radius_meters == 0 {
        bail!("radius must be positive");
    }
    Ok(GeoRadius {
        lat,
        lng,
        radius_meters,
        label: parts.next().unwrap_or_default().trim().to_string(),
    })
}

fn parse_budget(rest: &str) -> anyhow::Result<Option<BudgetRange>> {
    if rest.eq_ignore_ascii_case("any") {
        return Ok(None);
    }
    let mut parts = rest.split_whitespace();
    let (Some(min), Some(max), None) = (parts.next(), parts.next(), parts.next()) else {
        bail!("usage: budget <min> <max> | budget any");
    };
    let min = parse_number(min, "minimum budget")?;
    let max = parse_number(max, "maximum budget")?;
    if min < 0.0 || min > max {
        bail!("budget range must satisfy 0 <= min <= max");
    }
    Ok(Some(BudgetRange { min, max }))
}

fn parse_rating(rest: &str) -> anyhow::Result<Option<f64>> {
    if rest.eq_ignore_ascii_case("any") {
        return Ok(None);
    }
    let rating = parse_number(rest, "rating")?;
    if !(0.0..=5.0).contains(&rating) {
        bail!("rating must be between 0 and 5");
    }
    Ok(Some(rating))
}

fn parse_skill(base: SearchFilters, rest: &str) -> anyhow::Result<SearchFilters> {
    if let Some(name) = rest.strip_prefix('+') {
        Ok(base.with_skill(name))
    } else if let Some(name) = rest.strip_prefix('-') {
        Ok(base.without_skill(name))
    } else {
        bail!("usage: skill +<name> | skill -<name>")
    }
}

fn parse_optional<T>(rest: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if rest.is_empty() || rest.eq_ignore_ascii_case("any") {
        return Ok(None);
    }
    rest.parse().map(Some).map_err(|err| anyhow!("{err}"))
}

fn parse_number(raw: &str, what: &str) -> anyhow::Result<f64> {
    let value: f64 = raw
        .parse()
        .with_context(|| format!("{what} `{raw}` is not a number"))?;
    if !value.is_finite() {
        bail!("{what} must be finite");
    }
    Ok(value)
}
