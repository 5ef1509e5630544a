//! plankweb-orchestrator: turns a submitted job into dispatched backend tasks.
//!
//! [`InputMaterializer`] writes the canonical inputs, [`Orchestrator`] drives
//! the two waves around the conversion barrier, and [`OrchestratorPool`] runs
//! a bounded number of jobs at once.

pub mod error;
pub mod materializer;
pub mod resume;
pub mod orchestrator;
pub mod pool;

pub use error::{MaterializeError, Result};
pub use materializer::InputMaterializer;
pub use orchestrator::{BarrierOutcome, GateOutcome, JobPhase, Orchestrator, OrchestratorSettings, RunReport};
pub use pool::{JobTicket, OrchestratorPool, PoolClosed};
