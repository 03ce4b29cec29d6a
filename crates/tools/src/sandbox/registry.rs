//! JSON file-backed registries of provisioned containers.
//!
//! One file per container role, each `{ "entries": [...] }`. Entries are
//! cached after the first read and every mutation runs under one async lock,
//! so writers within a process never interleave. Files are replaced through
//! a temp file and a rename.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use {
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    tokio::sync::Mutex,
    tracing::{debug, warn},
};

use crate::sandbox::error::{Error, Result};

/// A registry row, keyed by container name.
pub trait RegistryRecord: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn container_name(&self) -> &str;
    fn scope_key(&self) -> &str;
    fn created_at_ms(&self) -> u64;
    fn last_used_at_ms(&self) -> u64;

    /// Carry over fields from the row this one replaces.
    fn merge_from(&mut self, previous: &Self);
}

/// Lifecycle metadata for a primary container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerEntry {
    pub container_name: String,
    pub scope_key: String,
    pub created_at_ms: u64,
    pub last_used_at_ms: u64,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
}

impl RegistryRecord for ContainerEntry {
    fn container_name(&self) -> &str {
        &self.container_name
    }

    fn scope_key(&self) -> &str {
        &self.scope_key
    }

    fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    fn last_used_at_ms(&self) -> u64 {
        self.last_used_at_ms
    }

    fn merge_from(&mut self, previous: &Self) {
        self.created_at_ms = previous.created_at_ms;
        if self.config_hash.is_none() {
            self.config_hash = previous.config_hash.clone();
        }
    }
}

/// Lifecycle metadata for a browser container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserEntry {
    pub container_name: String,
    pub scope_key: String,
    pub created_at_ms: u64,
    pub last_used_at_ms: u64,
    pub image: String,
    pub cdp_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub novnc_port: Option<u16>,
}

impl RegistryRecord for BrowserEntry {
    fn container_name(&self) -> &str {
        &self.container_name
    }

    fn scope_key(&self) -> &str {
        &self.scope_key
    }

    fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    fn last_used_at_ms(&self) -> u64 {
        self.last_used_at_ms
    }

    fn merge_from(&mut self, previous: &Self) {
        self.created_at_ms = previous.created_at_ms;
    }
}

#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "E: Serialize", deserialize = "E: DeserializeOwned"))]
struct RegistryFile<E> {
    #[serde(default)]
    entries: Vec<E>,
}

/// Single-writer key-value store of `E` rows persisted at one path.
pub struct Registry<E> {
    path: PathBuf,
    cache: Mutex<Option<HashMap<String, E>>>,
}

pub type ContainerRegistry = Registry<ContainerEntry>;
pub type BrowserRegistry = Registry<BrowserEntry>;

pub const CONTAINER_REGISTRY_FILE: &str = "containers.json";
pub const BROWSER_REGISTRY_FILE: &str = "browsers.json";

impl ContainerRegistry {
    pub fn in_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join(CONTAINER_REGISTRY_FILE))
    }
}

impl BrowserRegistry {
    pub fn in_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join(BROWSER_REGISTRY_FILE))
    }
}

impl<E: RegistryRecord> Registry<E> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<HashMap<String, E>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(source) => {
                return Err(Error::RegistryIo {
                    path: self.path.clone(),
                    source,
                });
            },
        };
        let file: RegistryFile<E> = match serde_json::from_str(&raw) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable sandbox registry, starting empty");
                return Ok(HashMap::new());
            },
        };
        Ok(file
            .entries
            .into_iter()
            .map(|e| (e.container_name().to_string(), e))
            .collect())
    }

    async fn persist(&self, entries: &HashMap<String, E>) -> Result<()> {
        let io_err = |source| Error::RegistryIo {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let mut rows: Vec<&E> = entries.values().collect();
        rows.sort_by(|a, b| a.container_name().cmp(b.container_name()));
        let count = rows.len();
        let data = serde_json::to_string_pretty(&RegistryFile { entries: rows })
            .map_err(|source| Error::RegistryEncode {
                path: self.path.clone(),
                source,
            })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, data).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        debug!(path = %self.path.display(), entries = count, "sandbox registry written");
        Ok(())
    }

    /// All rows keyed by container name.
    pub async fn read(&self) -> Result<HashMap<String, E>> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.load().await?);
        }
        Ok(cache.clone().unwrap_or_default())
    }

    pub async fn get(&self, container_name: &str) -> Result<Option<E>> {
        Ok(self.read().await?.remove(container_name))
    }

    /// All rows, ordered by container name.
    pub async fn list(&self) -> Result<Vec<E>> {
        let mut rows: Vec<E> = self.read().await?.into_values().collect();
        rows.sort_by(|a, b| a.container_name().cmp(b.container_name()));
        Ok(rows)
    }

    /// Insert or replace one row, keeping the fields [`RegistryRecord::merge_from`]
    /// carries over. Returns the row as stored.
    pub async fn upsert(&self, entry: E) -> Result<E> {
        self.store(entry, true).await
    }

    /// Insert a row for a freshly created container, discarding whatever the
    /// previous container under that name left behind.
    pub async fn replace(&self, entry: E) -> Result<E> {
        self.store(entry, false).await
    }

    async fn store(&self, mut entry: E, merge: bool) -> Result<E> {
        let mut cache = self.cache.lock().await;
        let mut entries = match cache.take() {
            Some(entries) => entries,
            None => self.load().await?,
        };
        if merge && let Some(previous) = entries.get(entry.container_name()) {
            entry.merge_from(previous);
        }
        entries.insert(entry.container_name().to_string(), entry.clone());
        let persisted = self.persist(&entries).await;
        *cache = Some(entries);
        persisted?;
        Ok(entry)
    }

    pub async fn remove(&self, container_name: &str) -> Result<Option<E>> {
        let mut cache = self.cache.lock().await;
        let mut entries = match cache.take() {
            Some(entries) => entries,
            None => self.load().await?,
        };
        let removed = entries.remove(container_name);
        let persisted = if removed.is_some() {
            self.persist(&entries).await
        } else {
            Ok(())
        };
        *cache = Some(entries);
        persisted?;
        Ok(removed)
    }
}
