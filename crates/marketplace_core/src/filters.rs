use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use url::form_urlencoded;

/// Ordered query-string pairs, as sent to the server and shown in the address bar.
pub type QueryParams = Vec<(String, String)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchDomain {
    #[default]
    Jobs,
    Artisans,
}

impl SearchDomain {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchDomain::Jobs => "jobs",
            SearchDomain::Artisans => "artisans",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoRadius {
    pub lat: f64,
    pub lng: f64,
    pub radius_meters: u32,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    Busy,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Verified,
    Unverified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Relevance,
    Rating,
    PriceLow,
    PriceHigh,
    Distance,
    Newest,
}

/// Snapshot of the active query. Edits replace the whole value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchFilters {
    pub keyword: String,
    pub category: String,
    pub location: Option<GeoRadius>,
    pub budget: Option<BudgetRange>,
    pub rating_min: Option<f64>,
    pub skills: BTreeSet<String>,
    pub availability: Option<Availability>,
    pub verification: Option<Verification>,
    pub sort_by: SortOrder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value `{}`", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

macro_rules! string_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                match raw {
                    $($text => Ok($ty::$variant),)+
                    other => Err(UnknownVariant(other.to_string())),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(Availability {
    Available => "available",
    Busy => "busy",
    Offline => "offline",
});

string_enum!(Verification {
    Verified => "verified",
    Unverified => "unverified",
});

string_enum!(SortOrder {
    Relevance => "relevance",
    Rating => "rating",
    PriceLow => "price_low",
    PriceHigh => "price_high",
    Distance => "distance",
    Newest => "newest",
});

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no field differs from the default snapshot.
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Text fields are stored trimmed, so a snapshot survives a trip through the query string.
    pub fn with_keyword(mut self, keyword: &str) -> Self {
        self.keyword = keyword.trim().to_string();
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.trim().to_string();
        self
    }

    pub fn with_location(mut self, location: Option<GeoRadius>) -> Self {
        self.location = location.map(|mut location| {
            location.label = location.label.trim().to_string();
            location
        });
        self
    }

    pub fn with_budget(mut self, budget: Option<BudgetRange>) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_rating_min(mut self, rating_min: Option<f64>) -> Self {
        self.rating_min = rating_min;
        self
    }

    /// Adds a skill after trimming it. Blank names and names containing a comma are dropped,
    /// since the query string joins skills with commas.
    pub fn with_skill(mut self, skill: &str) -> Self {
        let skill = skill.trim();
        if !skill.is_empty() && !skill.contains(',') {
            self.skills.insert(skill.to_string());
        }
        self
    }

    pub fn without_skill(mut self, skill: &str) -> Self {
        self.skills.remove(skill.trim());
        self
    }

    pub fn with_availability(mut self, availability: Option<Availability>) -> Self {
        self.availability = availability;
        self
    }

    pub fn with_verification(mut self, verification: Option<Verification>) -> Self {
        self.verification = verification;
        self
    }

    pub fn with_sort(mut self, sort_by: SortOrder) -> Self {
        self.sort_by = sort_by;
        self
    }
}

/// Serializes the non-default fields in a fixed key order.
pub fn to_query_params(filters: &SearchFilters) -> QueryParams {
    let mut params = QueryParams::new();
    let mut push = |key: &str, value: String| params.push((key.to_string(), value));

    let keyword = filters.keyword.trim();
    if !keyword.is_empty() {
        push("keyword", keyword.to_string());
    }
    let category = filters.category.trim();
    if !category.is_empty() {
        push("category", category.to_string());
    }
    if let Some(location) = &filters.location {
        push("lat", location.lat.to_string());
        push("lng", location.lng.to_string());
        push("radius", location.radius_meters.to_string());
        if !location.label.is_empty() {
            push("location", location.label.clone());
        }
    }
    if let Some(budget) = filters.budget {
        push("minBudget", budget.min.to_string());
        push("maxBudget", budget.max.to_string());
    }
    if let Some(rating) = filters.rating_min {
        push("minRating", rating.to_string());
    }
    if !filters.skills.is_empty() {
        let joined = filters
            .skills
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",");
        push("skills", joined);
    }
    if let Some(availability) = filters.availability {
        push("availability", availability.as_str().to_string());
    }
    if let Some(verification) = filters.verification {
        push("verification", verification.as_str().to_string());
    }
    if filters.sort_by != SortOrder::Relevance {
        push("sortBy", filters.sort_by.as_str().to_string());
    }
    params
}

/// Rebuilds a snapshot from query pairs. Unknown keys and malformed values are ignored;
/// when a key repeats, the last occurrence wins.
pub fn from_query_params<K, V>(params: &[(K, V)]) -> SearchFilters
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut filters = SearchFilters::default();
    let mut lat = None;
    let mut lng = None;
    let mut radius = None;
    let mut label = String::new();
    let mut min_budget = None;
    let mut max_budget = None;

    for (key, value) in params {
        let value = value.as_ref().trim();
        match key.as_ref() {
            "keyword" => filters.keyword = value.to_string(),
            "category" => filters.category = value.to_string(),
            "lat" => lat = parse_finite(value),
            "lng" => lng = parse_finite(value),
            "radius" => radius = value.parse::<u32>().ok(),
            "location" => label = value.to_string(),
            "minBudget" => min_budget = parse_finite(value),
            "maxBudget" => max_budget = parse_finite(value),
            "minRating" => filters.rating_min = parse_finite(value),
            "skills" => {
                filters.skills = value
                    .split(',')
                    .map(str::trim)
                    .filter(|skill| !skill.is_empty())
                    .map(ToOwned::to_owned)
                    .collect();
            }
            "availability" => filters.availability = value.parse().ok(),
            "verification" => filters.verification = value.parse().ok(),
            "sortBy" => filters.sort_by = value.parse().unwrap_or_default(),
            _ => {}
        }
    }

    if let (Some(lat), Some(lng), Some(radius_meters)) = (lat, lng, radius) {
        filters.location = Some(GeoRadius {
            lat,
            lng,
            radius_meters,
            label,
        });
    }
    if let (Some(min), Some(max)) = (min_budget, max_budget) {
        filters.budget = Some(BudgetRange { min, max });
    }
    filters
}

pub fn to_query_string(filters: &SearchFilters) -> String {
    encode_pairs(&to_query_params(filters))
}

/// Accepts a raw query string with or without the leading `?`.
pub fn from_query_string(query: &str) -> SearchFilters {
    from_query_params(&decode_pairs(query))
}

/// The shareable subset reflected into the address bar: keyword and category only.
pub fn url_query(filters: &SearchFilters) -> String {
    let pairs: QueryParams = to_query_params(filters)
        .into_iter()
        .filter(|(key, _)| key == "keyword" || key == "category")
        .collect();
    encode_pairs(&pairs)
}

pub fn encode_pairs(pairs: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter())
        .finish()
}

pub fn decode_pairs(query: &str) -> QueryParams {
    let query = query.strip_prefix('?').unwrap_or(query);
    form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

fn parse_finite(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|value| value.is_finite())
}
