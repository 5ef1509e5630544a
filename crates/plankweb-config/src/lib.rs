//! Configuration loading for PlankWeb.
//! Reads plankweb.toml from the current directory or the path in PLANKWEB_CONFIG.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};


#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
}

// ── Server ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String { "0.0.0.0:8020".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

// ── Storage ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of `inputs/` and `results/`.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// URL under which `root` is served; used for `pdbUrl` in result documents.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

fn default_storage_root() -> PathBuf { PathBuf::from("data") }
fn default_public_url() -> String { "http://localhost:8020/data".to_string() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self { root: default_storage_root(), public_url: default_public_url() }
    }
}

// ── Identity ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// File-backed identity store; `false` keeps the mapping in memory only.
    #[serde(default = "default_true")]
    pub persistent: bool,
    #[serde(default = "default_identity_path")]
    pub path: PathBuf,
}

fn default_true() -> bool { true }
fn default_identity_path() -> PathBuf { PathBuf::from("data/identity.json") }

impl Default for IdentityConfig {
    fn default() -> Self {
        Self { persistent: default_true(), path: default_identity_path() }
    }
}

// ── Queues ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_backend_workers")]
    pub workers_per_backend: usize,
    /// Per-task overrides keyed by task name, e.g. `ds_p2rank = 4`.
    #[serde(default)]
    pub workers: BTreeMap<String, usize>,
    /// Jobs orchestrated concurrently.
    #[serde(default = "default_orchestrator_workers")]
    pub orchestrator_workers: usize,
}

fn default_backend_workers() -> usize { 2 }
fn default_orchestrator_workers() -> usize { 4 }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers_per_backend: default_backend_workers(),
            workers: BTreeMap::new(),
            orchestrator_workers: default_orchestrator_workers(),
        }
    }
}

impl QueueConfig {
    pub fn workers_for(&self, task: &str) -> usize {
        self.workers.get(task).copied().unwrap_or(self.workers_per_backend).max(1)
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_conversion_poll_ms")]
    pub conversion_poll_ms: u64,
    #[serde(default = "default_conservation_poll_ms")]
    pub conservation_poll_ms: u64,
    /// Bound on the conversion barrier wait. Unset waits forever.
    #[serde(default)]
    pub barrier_timeout_secs: Option<u64>,
    /// Bound on the conservation gate wait. Unset waits forever.
    #[serde(default)]
    pub gate_timeout_secs: Option<u64>,
    /// A STARTED record older than this is treated as crashed and re-dispatched.
    /// Unset trusts STARTED forever.
    #[serde(default)]
    pub started_grace_secs: Option<u64>,
}

fn default_conversion_poll_ms() -> u64 { 100 }
fn default_conservation_poll_ms() -> u64 { 5_000 }

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            conversion_poll_ms: default_conversion_poll_ms(),
            conservation_poll_ms: default_conservation_poll_ms(),
            barrier_timeout_secs: None,
            gate_timeout_secs: None,
            started_grace_secs: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn conversion_poll(&self) -> Duration { Duration::from_millis(self.conversion_poll_ms) }
    pub fn conservation_poll(&self) -> Duration { Duration::from_millis(self.conservation_poll_ms) }
    pub fn barrier_timeout(&self) -> Option<Duration> { self.barrier_timeout_secs.map(Duration::from_secs) }
    pub fn gate_timeout(&self) -> Option<Duration> { self.gate_timeout_secs.map(Duration::from_secs) }
    pub fn started_grace(&self) -> Option<Duration> { self.started_grace_secs.map(Duration::from_secs) }
}

// ── Fetching ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Hosts allowed in addition to the built-in list.
    #[serde(default)]
    pub extra_hosts: Vec<String>,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub allow_local_files: bool,
}

fn default_fetch_timeout() -> u64 { 30 }

impl Default for FetchConfig {
    fn default() -> Self {
        Self { extra_hosts: Vec::new(), timeout_secs: default_fetch_timeout(), allow_local_files: false }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }
}

// ── Backends ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default = "default_p2rank")]
    pub p2rank_executable: PathBuf,
    #[serde(default = "default_foldseek")]
    pub foldseek_executable: PathBuf,
    #[serde(default = "default_foldseek_db")]
    pub foldseek_database: PathBuf,
    #[serde(default = "default_max_seqs")]
    pub foldseek_max_seqs: usize,
    #[serde(default = "default_conservation")]
    pub conservation_executable: PathBuf,
    #[serde(default = "default_plm")]
    pub plm_executable: PathBuf,
    #[serde(default = "default_plm_threshold")]
    pub plm_threshold: f64,
    #[serde(default = "default_esmfold_url")]
    pub esmfold_url: String,
    /// Cache for structures of similarity hits.
    #[serde(default = "default_structure_cache")]
    pub structure_cache: PathBuf,
    /// Ligand contact distance in Å.
    #[serde(default = "default_contact_cutoff")]
    pub contact_cutoff: f64,
}

fn default_p2rank() -> PathBuf { PathBuf::from("prank") }
fn default_foldseek() -> PathBuf { PathBuf::from("foldseek") }
fn default_foldseek_db() -> PathBuf { PathBuf::from("/opt/foldseek/db/pdb") }
fn default_max_seqs() -> usize { 5 }
fn default_conservation() -> PathBuf { PathBuf::from("compute-conservation") }
fn default_plm() -> PathBuf { PathBuf::from("plm-predict") }
fn default_plm_threshold() -> f64 { 0.5 }
fn default_esmfold_url() -> String { "https://api.esmatlas.com/foldSequence/v1/pdb/".to_string() }
fn default_structure_cache() -> PathBuf { PathBuf::from("data/pdb-cache") }
fn default_contact_cutoff() -> f64 { 5.0 }

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            p2rank_executable: default_p2rank(),
            foldseek_executable: default_foldseek(),
            foldseek_database: default_foldseek_db(),
            foldseek_max_seqs: default_max_seqs(),
            conservation_executable: default_conservation(),
            plm_executable: default_plm(),
            plm_threshold: default_plm_threshold(),
            esmfold_url: default_esmfold_url(),
            structure_cache: default_structure_cache(),
            contact_cutoff: default_contact_cutoff(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl Config {
    /// Load configuration from plankweb.toml.
    /// Checks PLANKWEB_CONFIG env var first, then current directory.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let path = config_path();

        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }
        Self::load_from(&path)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default() -> Result<Self> {
        match Self::load() {
            Err(ConfigError::NotFound(path)) => {
                warn!("Config file {:?} not found, using defaults", path);
                let mut config = Config::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
            other => other,
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        info!("Configuration loaded from {:?}", path);
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// PLANKWEB_STORAGE_ROOT, PLANKWEB_PUBLIC_URL and PLANKWEB_BIND win over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup("PLANKWEB_STORAGE_ROOT").filter(|v| !v.is_empty()) {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(url) = lookup("PLANKWEB_PUBLIC_URL").filter(|v| !v.is_empty()) {
            self.storage.public_url = url;
        }
        if let Some(bind) = lookup("PLANKWEB_BIND").filter(|v| !v.is_empty()) {
            self.server.bind = bind;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.conversion_poll_ms == 0 || self.orchestrator.conservation_poll_ms == 0 {
            return Err(ConfigError::Invalid("poll intervals must be positive".to_string()));
        }
        if self.queue.orchestrator_workers == 0 || self.queue.workers_per_backend == 0 {
            return Err(ConfigError::Invalid("worker counts must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.backends.plm_threshold) {
            return Err(ConfigError::Invalid(format!(
                "plm_threshold {} outside [0, 1]",
                self.backends.plm_threshold
            )));
        }
        if self.backends.contact_cutoff <= 0.0 {
            return Err(ConfigError::Invalid("contact_cutoff must be positive".to_string()));
        }
        Ok(())
    }
}

fn config_path() -> PathBuf {
    std::env::var("PLANKWEB_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("plankweb.toml"))
}
