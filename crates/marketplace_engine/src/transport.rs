use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use marketplace_logging::market_debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;

use crate::{ApiError, ErrorKind};

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const BASE_URL_ENV: &str = "MARKETPLACE_API_URL";
pub const TIMEOUT_ENV: &str = "MARKETPLACE_API_TIMEOUT_MS";

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub timeout: Duration,
    /// Extra headers sent with every request.
    pub default_headers: Vec<(String, String)>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            default_headers: Vec::new(),
        }
    }
}

impl ClientSettings {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `MARKETPLACE_API_URL` and `MARKETPLACE_API_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            if !base_url.trim().is_empty() {
                settings.base_url = base_url.trim().to_string();
            }
        }
        if let Some(millis) = std::env::var(TIMEOUT_ENV)
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
        {
            settings.timeout = Duration::from_millis(millis);
        }
        settings
    }
}

/// Owned multipart field, kept so an upload can be replayed after renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPart {
    pub field: String,
    pub file_name: Option<String>,
    pub mime: Option<String>,
    pub bytes: Bytes,
}

impl UploadPart {
    pub fn text(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            file_name: None,
            mime: None,
            bytes: Bytes::from(value.into()),
        }
    }

    pub fn file(
        field: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            field: field.into(),
            file_name: Some(file_name.into()),
            mime: Some(mime.into()),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<UploadPart>),
}

/// Transport-neutral request passed through the middleware chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    /// Set once the request has been replayed after renewal.
    pub retried: bool,
    /// Requests that must never trigger renewal, such as the refresh call itself.
    pub skip_renewal: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            retried: false,
            skip_renewal: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn with_parts(mut self, parts: Vec<UploadPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    pub fn without_renewal(mut self) -> Self {
        self.skip_renewal = true;
        self
    }

    /// Sets a header, replacing any earlier value with the same name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn set_bearer(&mut self, token: &str) {
        self.set_header(AUTHORIZATION.as_str(), format!("Bearer {token}"));
    }

    pub fn bearer(&self) -> Option<&str> {
        self.header(AUTHORIZATION.as_str())
            .and_then(|value| value.strip_prefix("Bearer "))
    }
}

impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Status and body as received; classification happens after the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Terminal link of the chain: sends one request and returns whatever status came back.
/// Only a missing response is an error.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ApiError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(settings: &ClientSettings) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        for (name, value) in &settings.default_headers {
            let (name, value) = parse_header(name, value)?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| ApiError::new(ErrorKind::Network, err.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, request: &ApiRequest) -> Result<url::Url, ApiError> {
        let path = if request.path.starts_with('/') {
            request.path.clone()
        } else {
            format!("/{}", request.path)
        };
        let mut url = url::Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|err| ApiError::new(ErrorKind::Unknown, format!("invalid url: {err}")))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url)
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ApiError> {
        let url = self.url_for(request)?;
        // Rejected headers are a caller error, not a connectivity failure.
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let (name, value) = parse_header(name, value)?;
            headers.insert(name, value);
        }
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(headers);
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => {
                let body = serde_json::to_vec(value)
                    .map_err(|err| ApiError::new(ErrorKind::Unknown, err.to_string()))?;
                builder.header(CONTENT_TYPE, "application/json").body(body)
            }
            RequestBody::Multipart(parts) => builder.multipart(build_form(parts)?),
        };

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        Ok(RawResponse { status, body })
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ApiError> {
    let invalid = |err: &dyn fmt::Display| {
        ApiError::new(ErrorKind::Unknown, format!("invalid header `{name}`: {err}"))
    };
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| invalid(&err))?;
    let header_value = HeaderValue::from_str(value).map_err(|err| invalid(&err))?;
    Ok((header_name, header_value))
}

fn build_form(parts: &[UploadPart]) -> Result<reqwest::multipart::Form, ApiError> {
    let mut form = reqwest::multipart::Form::new();
    for part in parts {
        let mut field = reqwest::multipart::Part::bytes(part.bytes.to_vec());
        if let Some(file_name) = &part.file_name {
            field = field.file_name(file_name.clone());
        }
        if let Some(mime) = &part.mime {
            field = field
                .mime_str(mime)
                .map_err(|err| ApiError::new(ErrorKind::Unknown, err.to_string()))?;
        }
        form = form.part(part.field.clone(), field);
    }
    Ok(form)
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    market_debug!("No response received: {}", err);
    if err.is_timeout() {
        return ApiError::timeout();
    }
    ApiError::network()
}
