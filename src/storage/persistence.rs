//! Gateway persistence layer
//!
//! Each gateway lives in `gateways/<name>.json` under the data directory;
//! deployed tokens share `tokens.json`. Writes go to a temporary file that is
//! renamed into place, after the previous version has been rotated into
//! numbered backups.
//!
//! Processes sharing a data directory serialize their load-mutate-save cycles
//! through an exclusive lock on `<data_dir>/.lock` (see [`Storage::lock`]).

use crate::multisig::MultiSig;
use crate::token::TokenManager;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;

const GATEWAY_DIR: &str = "gateways";
const TOKENS_FILE: &str = "tokens.json";
const LOCK_FILE: &str = ".lock";

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Gateway not found: {0}")]
    GatewayNotFound(String),
    #[error("Invalid gateway name: {0}")]
    InvalidName(String),
    #[error("Data directory is locked by another process: {0}")]
    Locked(String),
}

/// Exclusive hold on a data directory, released on drop
#[derive(Debug)]
pub struct DataDirLock {
    file: fs::File,
    path: PathBuf,
}

impl DataDirLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        log::debug!("Released {}", self.path.display());
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub backup_enabled: bool,
    pub max_backups: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".gateway_data"),
            backup_enabled: true,
            max_backups: 5,
        }
    }
}

/// Gateway and token storage manager
#[derive(Debug, Clone)]
pub struct Storage {
    config: StorageConfig,
}

impl Storage {
    /// Create a new storage manager, creating the directory layout
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(config.data_dir.join(GATEWAY_DIR))?;
        Ok(Self { config })
    }

    /// Create with default configuration
    pub fn with_defaults() -> Result<Self, StorageError> {
        Self::new(StorageConfig::default())
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    fn gateway_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        Ok(self
            .config
            .data_dir
            .join(GATEWAY_DIR)
            .join(format!("{}.json", name)))
    }

    fn tokens_path(&self) -> PathBuf {
        self.config.data_dir.join(TOKENS_FILE)
    }

    // =========================================================================
    // Locking
    // =========================================================================

    fn open_lock_file(&self) -> Result<(fs::File, PathBuf), StorageError> {
        let path = self.config.data_dir.join(LOCK_FILE);
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        Ok((file, path))
    }

    /// Lock the data directory, waiting for the current holder if any
    pub fn lock(&self) -> Result<DataDirLock, StorageError> {
        let (file, path) = self.open_lock_file()?;

        if file.try_lock_exclusive().is_err() {
            log::info!("Waiting for lock on {}", path.display());
            file.lock_exclusive()?;
        }

        Ok(DataDirLock { file, path })
    }

    /// Lock the data directory, failing if another holder has it
    pub fn try_lock(&self) -> Result<DataDirLock, StorageError> {
        let (file, path) = self.open_lock_file()?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(DataDirLock { file, path }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(StorageError::Locked(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Gateways
    // =========================================================================

    /// Save a gateway, dropping approvals that can no longer execute
    pub fn save_gateway(&self, name: &str, gateway: &mut MultiSig) -> Result<(), StorageError> {
        let path = self.gateway_path(name)?;
        gateway.purge_stale();
        self.write_json(&path, gateway)?;
        log::debug!("Saved gateway '{}' to {}", name, path.display());
        Ok(())
    }

    /// Load a gateway and re-check its invariants
    pub fn load_gateway(&self, name: &str) -> Result<MultiSig, StorageError> {
        let path = self.gateway_path(name)?;
        if !path.exists() {
            return Err(StorageError::GatewayNotFound(name.to_string()));
        }

        let gateway: MultiSig = read_json(&path)?;
        gateway
            .validate()
            .map_err(|e| StorageError::InvalidData(format!("gateway '{}': {}", name, e)))?;

        Ok(gateway)
    }

    pub fn gateway_exists(&self, name: &str) -> bool {
        self.gateway_path(name).map(|p| p.exists()).unwrap_or(false)
    }

    /// Names of all saved gateways, sorted
    pub fn list_gateways(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();

        for entry in fs::read_dir(self.config.data_dir.join(GATEWAY_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Load every saved gateway
    pub fn load_all_gateways(&self) -> Result<Vec<(String, MultiSig)>, StorageError> {
        self.list_gateways()?
            .into_iter()
            .map(|name| {
                let gateway = self.load_gateway(&name)?;
                Ok((name, gateway))
            })
            .collect()
    }

    pub fn delete_gateway(&self, name: &str) -> Result<(), StorageError> {
        let path = self.gateway_path(name)?;
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Restore a gateway from one of its backups
    pub fn restore_gateway_backup(&self, name: &str, backup_index: usize) -> Result<MultiSig, StorageError> {
        let backup_path = backup_path(&self.gateway_path(name)?, backup_index);

        if !backup_path.exists() {
            return Err(StorageError::InvalidData(format!(
                "Backup {} of '{}' not found",
                backup_index, name
            )));
        }

        let gateway: MultiSig = read_json(&backup_path)?;
        gateway
            .validate()
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;
        Ok(gateway)
    }

    /// Available backup indexes for a gateway
    pub fn list_gateway_backups(&self, name: &str) -> Result<Vec<usize>, StorageError> {
        let path = self.gateway_path(name)?;
        Ok((0..self.config.max_backups)
            .filter(|i| backup_path(&path, *i).exists())
            .collect())
    }

    // =========================================================================
    // Tokens
    // =========================================================================

    pub fn save_tokens(&self, tokens: &TokenManager) -> Result<(), StorageError> {
        self.write_json(&self.tokens_path(), tokens)
    }

    /// Load deployed tokens; an empty manager if none were saved yet
    pub fn load_tokens(&self) -> Result<TokenManager, StorageError> {
        let path = self.tokens_path();
        if !path.exists() {
            return Ok(TokenManager::new());
        }
        read_json(&path)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StorageError> {
        // Create backup if enabled
        if self.config.backup_enabled && self.config.max_backups > 0 && path.exists() {
            self.rotate_backups(path)?;
            fs::copy(path, backup_path(path, 0))?;
        }

        // Write to temporary file first
        let mut temp_path = path.as_os_str().to_owned();
        temp_path.push(".tmp");
        let temp_path = PathBuf::from(temp_path);

        let file = fs::File::create(&temp_path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, value)?;

        // Atomic rename
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    fn rotate_backups(&self, path: &Path) -> Result<(), StorageError> {
        let max = self.config.max_backups;

        // Delete oldest backup
        let oldest = backup_path(path, max - 1);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }

        // Shift existing backups
        for i in (0..max - 1).rev() {
            let current = backup_path(path, i);
            if current.exists() {
                fs::rename(&current, backup_path(path, i + 1))?;
            }
        }

        Ok(())
    }
}

fn backup_path(path: &Path, index: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".backup.{}", index));
    PathBuf::from(name)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

/// Names become file names: ASCII letters, digits, `-` and `_` only
fn validate_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}
