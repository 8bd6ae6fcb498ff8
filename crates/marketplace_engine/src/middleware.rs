use std::sync::Arc;
use std::time::Instant;

use marketplace_logging::{market_debug, market_warn};

use crate::transport::{ApiRequest, RawResponse, Transport};
use crate::ApiError;

/// One link of the request pipeline. Implementations may inspect or rewrite the request,
/// call `next` zero or more times, and inspect the response.
#[async_trait::async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<RawResponse, ApiError>;
}

/// The remainder of the chain after the current middleware. `Copy`, so a middleware can
/// run it more than once (replay after renewal).
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middleware: &'a [Arc<dyn Middleware>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub fn new(middleware: &'a [Arc<dyn Middleware>], transport: &'a dyn Transport) -> Self {
        Self {
            middleware,
            transport,
        }
    }

    pub async fn run(self, request: ApiRequest) -> Result<RawResponse, ApiError> {
        match self.middleware.split_first() {
            Some((current, rest)) => {
                current
                    .handle(request, Next::new(rest, self.transport))
                    .await
            }
            None => self.transport.send(&request).await,
        }
    }
}

/// Logs method, path, status and latency of every exchange.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<RawResponse, ApiError> {
        let label = request.to_string();
        let started = Instant::now();
        let result = next.run(request).await;
        let elapsed_ms = started.elapsed().as_millis();
        match &result {
            Ok(response) => {
                market_debug!("{} -> {} in {}ms", label, response.status, elapsed_ms);
            }
            Err(err) => {
                market_warn!("{} failed after {}ms: {} ({})", label, elapsed_ms, err, err.kind);
            }
        }
        result
    }
}
