pub mod events;
pub mod health;
pub mod rules;
pub mod ws;

pub use events::{
    event_attempts_handler, event_stats_handler, get_event_handler, ingest_event_handler,
    list_events_handler, replay_batch_handler, replay_event_handler, requeue_stuck_handler,
};
pub use health::health_handler;
pub use rules::{
    create_rule_handler, deactivate_rule_handler, get_rule_handler, list_rules_handler,
    rule_versions_handler, update_rule_handler,
};
pub use ws::ws_handler;
