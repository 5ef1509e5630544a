//! plankweb-dispatch: task queues in front of the analysis backends.
//!
//! Each registered backend gets its own queue drained by a fixed number of
//! workers. `enqueue` records STARTED and returns a [`TaskHandle`]; the worker
//! records COMPLETED or FAILED and resolves the handle.

pub mod error;
pub mod task;
pub mod registry;
pub mod handle;
pub mod queue;

pub use error::{BackendError, DispatchError};
pub use task::{TaskArgs, TaskOutput, TaskRequest};
pub use registry::{AnalysisBackend, BackendRegistry};
pub use handle::{OutcomeSender, TaskHandle, TaskOutcome};
pub use queue::{QueueDispatcher, TaskDispatch};
