// Kernel: the processing core behind the HTTP surface.
//
// claim     - reserve pending events with FOR UPDATE SKIP LOCKED
// engine    - evaluate rules and record executions for a claimed event
// dispatch  - execute rule actions with bounded time
// worker    - the claim/process/sleep loop
// stream_hub - broadcast channel feeding the /ws live-update endpoint

pub mod claim;
pub mod dispatch;
pub mod engine;
pub mod stream_hub;
pub mod worker;

pub use claim::{claim_next, recover_stuck, ClaimedEvent};
pub use dispatch::{ActionDispatcher, DispatchError, EmailMode, RuleAction};
pub use engine::EventProcessor;
pub use stream_hub::StreamHub;
pub use worker::{EventWorker, WorkerConfig};
