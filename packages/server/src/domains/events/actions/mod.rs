pub mod ingest;
pub mod queries;
pub mod replay;
pub mod requeue_stuck;

pub use ingest::ingest_event;
pub use queries::{
    event_stats, get_event, get_event_attempts, list_events, EventFilterParams, EventListResponse,
};
pub use replay::{replay_batch, replay_event, BatchReplayResponse, ReplayResponse, REPLAY_WARNING};
pub use requeue_stuck::{requeue_stuck, RequeueStuckResponse};
