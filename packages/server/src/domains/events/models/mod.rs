pub mod attempt;
pub mod event;

pub use attempt::{AttemptStatus, AttemptWithExecutions, EventAttempt, ExecutionView};
pub use event::{Event, EventFilter, EventState, EventStats};
