use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use marketplace_logging::market_debug;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::credentials::CredentialStore;
use crate::search::{SearchEndpoint, SearchPage};
use crate::transport::ClientSettings;
use crate::{ApiClient, ApiError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to start async runtime: {0}")]
    Runtime(#[from] io::Error),
    #[error("failed to build http client: {0}")]
    Client(#[from] ApiError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCommand {
    pub generation: u64,
    pub endpoint: SearchEndpoint,
    pub params: Vec<(String, String)>,
    pub page: u32,
    pub limit: u32,
}

enum EngineCommand {
    Search(SearchCommand),
    SignIn { email: String, password: String },
    SignOut,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent<T> {
    SearchCompleted {
        generation: u64,
        page: u32,
        result: Result<SearchPage<T>, ApiError>,
    },
    SignInCompleted(Result<(), ApiError>),
    /// Renewal failed; the credential store has been cleared.
    SessionExpired,
}

/// Runs the HTTP client on a background tokio runtime. Commands go in through a channel
/// and results come back as events, so the caller never blocks on the network.
pub struct EngineHandle<T> {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent<T>>,
    client: ApiClient,
}

impl<T> EngineHandle<T>
where
    T: DeserializeOwned + Send + 'static,
{
    pub fn new(settings: ClientSettings, store: CredentialStore) -> Result<Self, EngineError> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();

        let expiry_tx = event_tx.clone();
        let client = ApiClient::builder(settings, store)
            .on_sign_out(move || {
                let _ = expiry_tx.send(EngineEvent::SessionExpired);
            })
            .build()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        let worker_client = client.clone();
        thread::spawn(move || {
            let mut active: Option<(u64, CancellationToken)> = None;
            while let Ok(command) = cmd_rx.recv() {
                let client = worker_client.clone();
                let event_tx = event_tx.clone();
                match command {
                    EngineCommand::Search(search) => {
                        let token = token_for(&mut active, search.generation);
                        runtime.spawn(run_search(client, search, token, event_tx));
                    }
                    EngineCommand::SignIn { email, password } => {
                        runtime.spawn(async move {
                            let result = client.sign_in(&email, &password).await;
                            let _ = event_tx.send(EngineEvent::SignInCompleted(result));
                        });
                    }
                    EngineCommand::SignOut => client.sign_out(),
                }
            }
        });

        Ok(Self {
            cmd_tx,
            event_rx,
            client,
        })
    }

    pub fn search(&self, command: SearchCommand) {
        let _ = self.cmd_tx.send(EngineCommand::Search(command));
    }

    pub fn sign_in(&self, email: impl Into<String>, password: impl Into<String>) {
        let _ = self.cmd_tx.send(EngineCommand::SignIn {
            email: email.into(),
            password: password.into(),
        });
    }

    pub fn sign_out(&self) {
        let _ = self.cmd_tx.send(EngineCommand::SignOut);
    }

    pub fn try_recv(&self) -> Option<EngineEvent<T>> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent<T>> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

/// Tasks of one generation share a token; a newer generation cancels the older one.
fn token_for(active: &mut Option<(u64, CancellationToken)>, generation: u64) -> CancellationToken {
    if let Some((current, token)) = active.as_ref() {
        if *current == generation {
            return token.clone();
        }
        if generation < *current {
            // Out-of-order command; let it run detached and let the caller discard it.
            return CancellationToken::new();
        }
    }
    if let Some((superseded, token)) = active.take() {
        market_debug!("Aborting superseded search generation {}", superseded);
        token.cancel();
    }
    let token = CancellationToken::new();
    *active = Some((generation, token.clone()));
    token
}

async fn run_search<T: DeserializeOwned + Send + 'static>(
    client: ApiClient,
    search: SearchCommand,
    token: CancellationToken,
    event_tx: mpsc::Sender<EngineEvent<T>>,
) {
    let SearchCommand {
        generation,
        endpoint,
        params,
        page,
        limit,
    } = search;
    tokio::select! {
        _ = token.cancelled() => {
            market_debug!("Search generation {} page {} aborted", generation, page);
        }
        result = client.search::<T>(endpoint, &params, page, limit) => {
            let _ = event_tx.send(EngineEvent::SearchCompleted {
                generation,
                page,
                result,
            });
        }
    }
}
