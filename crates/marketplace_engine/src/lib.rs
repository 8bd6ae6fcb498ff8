//! Marketplace engine: credential lifecycle, HTTP access core and background search execution.
mod auth;
mod classify;
mod client;
mod credentials;
mod engine;
mod middleware;
mod persist;
mod reauth;
mod search;
mod transport;
mod types;

pub use auth::LOGIN_PATH;
pub use classify::{classify_status, decode_envelope};
pub use client::{ApiClient, ApiClientBuilder};
pub use credentials::{
    CredentialStore, FileSlot, KeyValueSlot, MemorySlot, REFRESH_TOKEN_KEY, TOKEN_KEY,
};
pub use engine::{EngineError, EngineEvent, EngineHandle, SearchCommand};
pub use middleware::{LoggingMiddleware, Middleware, Next};
pub use persist::{ensure_storage_dir, AtomicFileWriter, PersistError};
pub use reauth::{AuthMiddleware, RefreshFlow, RefreshPhase, SignOutHook, REFRESH_PATH};
pub use search::{PageInfo, SearchEndpoint, SearchPage};
pub use transport::{
    ApiRequest, ClientSettings, RawResponse, ReqwestTransport, RequestBody, Transport,
    UploadPart, DEFAULT_BASE_URL, DEFAULT_TIMEOUT,
};
pub use types::{
    ApiError, Credential, Envelope, EnvelopeStatus, ErrorKind, NETWORK_MESSAGE,
    SERVER_MESSAGE, SESSION_EXPIRED_MESSAGE, TIMEOUT_MESSAGE, UNKNOWN_MESSAGE,
    VALIDATION_MESSAGE,
};
