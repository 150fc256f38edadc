//! Persisted connection settings.
//!
//! The engine itself never reads settings; applications load a [`ConnectionSettings`] from a
//! [`SettingsStore`] and turn it into a URL and [`Options`] for
//! [`WebSocketConnection::connect`](crate::WebSocketConnection::connect).
use std::{
    collections::BTreeMap,
    sync::{Mutex, PoisonError},
};

use url::Url;

use crate::{options::DEFAULT_CONNECT_TIMEOUT, Options, Result, WebSocketError};

pub const KEY_HOSTNAME: &str = "hostname";
pub const KEY_PORT: &str = "port";
pub const KEY_TIMEOUT: &str = "timeout";
pub const KEY_DISABLE_NOTIFICATIONS: &str = "disable_notifications";
pub const KEY_DISABLE_MULTIPLE_NOTIFICATIONS: &str = "disable_multiple_notifications";

/// A string key-value store. Implementations must answer quickly; callers may sit on a UI path.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn get_bool(&self, key: &str) -> bool {
        self.get(key).is_some_and(|value| value == "true")
    }
}

/// Settings kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(feature = "json")]
pub use json::JsonFileStore;

#[cfg(feature = "json")]
mod json {
    use std::{
        collections::BTreeMap,
        io,
        path::PathBuf,
        sync::{Mutex, PoisonError},
    };

    use super::SettingsStore;
    use crate::Result;

    /// Settings stored as a flat JSON object in a file, rewritten on every change.
    #[derive(Debug)]
    pub struct JsonFileStore {
        path: PathBuf,
        values: Mutex<BTreeMap<String, String>>,
    }

    impl JsonFileStore {
        /// Opens the store at `path`. A missing file is an empty store.
        pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
            let path = path.into();
            let values = match std::fs::read(&path) {
                Ok(contents) => serde_json::from_slice(&contents)?,
                Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
                Err(err) => return Err(err.into()),
            };

            Ok(Self {
                path,
                values: Mutex::new(values),
            })
        }
    }

    impl SettingsStore for JsonFileStore {
        fn get(&self, key: &str) -> Option<String> {
            let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
            values.get(key).cloned()
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
            values.insert(key.to_string(), value.to_string());
            let contents = serde_json::to_vec_pretty(&*values)?;
            std::fs::write(&self.path, contents)?;
            Ok(())
        }
    }
}

/// What the user last connected to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub hostname: Option<String>,
    pub port: Option<u16>,
    /// Connect timeout in milliseconds.
    pub timeout: u64,
    pub notifications_disabled: bool,
    pub multiple_notifications_disabled: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            hostname: None,
            port: None,
            timeout: DEFAULT_CONNECT_TIMEOUT,
            notifications_disabled: false,
            multiple_notifications_disabled: false,
        }
    }
}

impl ConnectionSettings {
    /// Reads the settings, falling back to defaults for missing or unparsable values.
    pub fn load(store: &dyn SettingsStore) -> Self {
        let defaults = Self::default();
        Self {
            hostname: store
                .get(KEY_HOSTNAME)
                .filter(|hostname| !hostname.is_empty()),
            port: store.get(KEY_PORT).and_then(|port| port.trim().parse().ok()),
            timeout: store
                .get(KEY_TIMEOUT)
                .and_then(|timeout| timeout.trim().parse().ok())
                .unwrap_or(defaults.timeout),
            notifications_disabled: store.get_bool(KEY_DISABLE_NOTIFICATIONS),
            multiple_notifications_disabled: store.get_bool(KEY_DISABLE_MULTIPLE_NOTIFICATIONS),
        }
    }

    pub fn save(&self, store: &dyn SettingsStore) -> Result<()> {
        if let Some(hostname) = &self.hostname {
            store.set(KEY_HOSTNAME, hostname)?;
        }
        if let Some(port) = self.port {
            store.set(KEY_PORT, &port.to_string())?;
        }
        store.set(KEY_TIMEOUT, &self.timeout.to_string())?;
        store.set(
            KEY_DISABLE_NOTIFICATIONS,
            &self.notifications_disabled.to_string(),
        )?;
        store.set(
            KEY_DISABLE_MULTIPLE_NOTIFICATIONS,
            &self.multiple_notifications_disabled.to_string(),
        )?;
        Ok(())
    }

    /// The `ws://host:port` address the settings describe.
    pub fn url(&self) -> Result<Url> {
        let hostname = self
            .hostname
            .as_deref()
            .ok_or(WebSocketError::MissingHost)?;
        let url = match self.port {
            Some(port) => format!("ws://{hostname}:{port}"),
            None => format!("ws://{hostname}"),
        };
        Ok(url.parse()?)
    }

    /// Default options with the saved connect timeout applied.
    pub fn options(&self) -> Options {
        Options::default().with_socket_connect_timeout(i64::try_from(self.timeout).unwrap_or(i64::MAX))
    }
}
