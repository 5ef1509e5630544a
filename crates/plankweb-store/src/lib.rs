//! PlankWeb storage layer
//!
//! Everything the orchestrator and the backends share lives here:
//!
//! - [`IdentityStore`]: fingerprint → job id, atomic get-or-create
//! - [`StatusTracker`]: last-write-wins per-task status records
//! - [`ArtifactStore`]: input files under `inputs/<job>/`, write-if-absent
//! - [`ResultAggregator`]: validated per-chain result documents
//!
//! # Example
//!
//! ```rust,no_run
//! use plankweb_common::Fingerprint;
//! use plankweb_store::{FileIdentityStore, IdentityStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let identity = FileIdentityStore::open("./data/identity.json").await?;
//!     let fingerprint: Fingerprint = "pdb:2SRC".parse()?;
//!     let allocation = identity.get_or_create(&fingerprint).await?;
//!     println!("{} (existed: {})", allocation.job_id, allocation.existed);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod fsutil;
pub mod layout;
pub mod identity;
pub mod status;
pub mod artifacts;
pub mod results;

pub use error::{StoreError, Result};
pub use layout::StoreLayout;
pub use identity::{Allocation, FileIdentityStore, IdentityStore, InMemoryIdentityStore};
pub use status::{read_or_absent, FsStatusTracker, InMemoryStatusTracker, StatusTracker};
pub use artifacts::ArtifactStore;
pub use results::{tracked_keys, ResultAggregator, TaskOverview};
