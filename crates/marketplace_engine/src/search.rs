use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::classify::{envelope_status_of, message_of, unexpected_format};
use crate::transport::ApiRequest;
use crate::types::SERVER_MESSAGE;
use crate::{ApiClient, ApiError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEndpoint {
    Jobs,
    Artisans,
}

impl SearchEndpoint {
    pub fn path(self) -> &'static str {
        match self {
            SearchEndpoint::Jobs => "/search/jobs",
            SearchEndpoint::Artisans => "/search/artisans",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct PageInfo {
    pub page: u32,
    pub limit: u32,
    pub total: u32,
    pub pages: u32,
}

/// One page of the search envelope `{success, data, pagination, suggestions?, facets?, searchTime}`.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage<T> {
    pub data: Vec<T>,
    pub pagination: PageInfo,
    pub suggestions: Vec<String>,
    pub facets: Option<Value>,
    pub search_time_ms: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchBody<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    pagination: Option<PageInfo>,
    #[serde(default)]
    suggestions: Vec<String>,
    #[serde(default)]
    facets: Option<Value>,
    #[serde(default)]
    search_time: Option<f64>,
}

impl ApiClient {
    /// Fetches one page. `params` carries the filter pairs; `page` and `limit` are appended.
    pub async fn search<T: DeserializeOwned>(
        &self,
        endpoint: SearchEndpoint,
        params: &[(String, String)],
        page: u32,
        limit: u32,
    ) -> Result<SearchPage<T>, ApiError> {
        let mut query = params.to_vec();
        query.push(("page".to_string(), page.to_string()));
        query.push(("limit".to_string(), limit.to_string()));

        let response = self
            .execute(ApiRequest::get(endpoint.path()).with_query(query))
            .await?;
        decode_search_page(response.status, &response.body, page, limit)
    }
}

fn decode_search_page<T: DeserializeOwned>(
    status: u16,
    body: &[u8],
    page: u32,
    limit: u32,
) -> Result<SearchPage<T>, ApiError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| unexpected_format(status))?;
    let Value::Object(object) = &value else {
        return Err(unexpected_format(status));
    };
    if envelope_status_of(object) == crate::EnvelopeStatus::Error {
        return Err(ApiError::new(
            ErrorKind::Server,
            message_of(object).unwrap_or_else(|| SERVER_MESSAGE.to_string()),
        ));
    }

    let body: SearchBody<T> =
        serde_json::from_value(value).map_err(|_| unexpected_format(status))?;
    // Servers that omit pagination return everything on one page.
    let pagination = body.pagination.unwrap_or_else(|| {
        let total = u32::try_from(body.data.len()).unwrap_or(u32::MAX);
        PageInfo {
            page,
            limit,
            total,
            pages: u32::from(total > 0),
        }
    });
    Ok(SearchPage {
        data: body.data,
        pagination,
        suggestions: body.suggestions,
        facets: body.facets,
        search_time_ms: body.search_time,
    })
}
