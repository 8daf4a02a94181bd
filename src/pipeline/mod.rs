pub mod buffer;
pub mod item;
pub mod scheduler;
pub mod submitter;

pub use buffer::ResultBuffer;
pub use item::{CoordinatorHealth, ExecutionResult, ResultUpload, WorkItem};
pub use scheduler::BatchScheduler;
pub use submitter::ResultSubmitter;
