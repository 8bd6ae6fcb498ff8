use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use marketplace_logging::{market_debug, market_warn};
use serde_json::{Map, Value};

use crate::persist::{AtomicFileWriter, PersistError};
use crate::Credential;

pub const TOKEN_KEY: &str = "token";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Durable string storage addressed by key.
pub trait KeyValueSlot: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, PersistError>;
    fn write(&self, key: &str, value: &str) -> Result<(), PersistError>;
    fn remove(&self, key: &str) -> Result<(), PersistError>;
}

#[derive(Debug, Default)]
pub struct MemorySlot {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueSlot for MemorySlot {
    fn read(&self, key: &str) -> Result<Option<String>, PersistError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PersistError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

/// Keys stored as one JSON object in a file, rewritten atomically on every change.
pub struct FileSlot {
    writer: AtomicFileWriter,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            writer: AtomicFileWriter::new(path.into()),
        }
    }

    fn load(&self) -> Result<Map<String, Value>, PersistError> {
        let text = match fs::read_to_string(self.writer.path()) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(err.into()),
        };
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn store(&self, values: &Map<String, Value>) -> Result<(), PersistError> {
        if values.is_empty() {
            return self.writer.remove();
        }
        let text = serde_json::to_string_pretty(values)?;
        self.writer.write(&text)
    }
}

impl KeyValueSlot for FileSlot {
    fn read(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self
            .load()?
            .get(key)
            .and_then(Value::as_str)
            .map(ToOwned::to_owned))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PersistError> {
        let mut values = self.load()?;
        values.insert(key.to_string(), Value::String(value.to_string()));
        self.store(&values)
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        let mut values = self.load()?;
        if values.remove(key).is_some() {
            self.store(&values)?;
        }
        Ok(())
    }
}

type Listener = Arc<dyn Fn(Option<&Credential>) + Send + Sync>;

struct StoreInner {
    current: RwLock<Option<Credential>>,
    slot: Mutex<Option<Box<dyn KeyValueSlot>>>,
    listeners: RwLock<Vec<Listener>>,
}

/// Owner of the current credential. Cloning shares the same store.
///
/// Every `set` is written through to the durable slot. When the slot fails the store
/// detaches it and keeps working in memory for the rest of the process.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<StoreInner>,
}

impl CredentialStore {
    pub fn in_memory() -> Self {
        Self::build(None, None)
    }

    /// Opens the store over `slot`, loading any persisted credential.
    pub fn open(slot: impl KeyValueSlot + 'static) -> Self {
        match load_credential(&slot) {
            Ok(credential) => {
                market_debug!(
                    "Credential store opened (credential present: {})",
                    credential.is_some()
                );
                Self::build(credential, Some(Box::new(slot)))
            }
            Err(err) => {
                market_warn!("Credential storage unavailable, keeping session in memory: {}", err);
                Self::build(None, None)
            }
        }
    }

    fn build(credential: Option<Credential>, slot: Option<Box<dyn KeyValueSlot>>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                current: RwLock::new(credential),
                slot: Mutex::new(slot),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn get(&self) -> Option<Credential> {
        self.inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the credential; `None` clears every persisted key.
    pub fn set(&self, credential: Option<Credential>) {
        {
            let mut current = self
                .inner
                .current
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            current.clone_from(&credential);
        }
        self.persist(credential.as_ref());

        let listeners = self
            .inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(credential.as_ref());
        }
    }

    pub fn clear(&self) {
        self.set(None);
    }

    pub fn on_change(&self, listener: impl Fn(Option<&Credential>) + Send + Sync + 'static) {
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    /// False once the store has fallen back to memory only.
    pub fn is_durable(&self) -> bool {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn persist(&self, credential: Option<&Credential>) {
        let mut slot = self
            .inner
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(storage) = slot.as_ref() else {
            return;
        };
        if let Err(err) = save_credential(&**storage, credential) {
            market_warn!(
                "Failed to persist credential, continuing in memory only: {}",
                err
            );
            *slot = None;
        }
    }
}

fn load_credential(slot: &dyn KeyValueSlot) -> Result<Option<Credential>, PersistError> {
    let Some(access_token) = slot.read(TOKEN_KEY)? else {
        return Ok(None);
    };
    let refresh_token = slot.read(REFRESH_TOKEN_KEY)?;
    Ok(Some(Credential {
        access_token,
        refresh_token,
    }))
}

fn save_credential(
    slot: &dyn KeyValueSlot,
    credential: Option<&Credential>,
) -> Result<(), PersistError> {
    match credential {
        Some(credential) => {
            slot.write(TOKEN_KEY, &credential.access_token)?;
            match &credential.refresh_token {
                Some(refresh) => slot.write(REFRESH_TOKEN_KEY, refresh),
                None => slot.remove(REFRESH_TOKEN_KEY),
            }
        }
        None => {
            slot.remove(TOKEN_KEY)?;
            slot.remove(REFRESH_TOKEN_KEY)
        }
    }
}
