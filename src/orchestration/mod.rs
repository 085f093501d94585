//! Grading orchestration: queue, locks, coordinator, ingress, worker pool.

pub mod coordinator;
pub mod ingress;
pub mod locks;
pub mod queue;
pub mod workers;

pub use coordinator::{GradingCoordinator, GradingError, GradingOutcome};
pub use ingress::{IngressError, IngressSummary, ResultIngress};
pub use locks::{Scope, ScopeLocks};
pub use queue::{GradingTask, TaskQueue};
pub use workers::WorkerPool;
