//! plankweb-web: HTTP surface for PlankWeb
//! Provides:
//!   - Job intake with validation and deduplication
//!   - Read-only id lookup
//!   - Per-task status records and per-chain result documents

pub mod error;
pub mod handlers;
pub mod intake;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use state::{AppState, SharedState};
