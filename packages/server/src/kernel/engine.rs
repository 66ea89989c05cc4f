//! Rule engine: one pass over one claimed event.
//!
//! Loads the active rules for the event's type, evaluates each condition in
//! isolation, dispatches matched actions (with replay dedup for
//! non-idempotent ones), records one execution per rule, and finalizes the
//! attempt and event state in a single transaction.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::domains::events::models::{event::EVENT_COLUMNS, Event};
use crate::domains::rules::condition;
use crate::domains::rules::models::{ActiveRule, ExecutionResult, Rule, RuleExecution};
use crate::kernel::dispatch::{ActionDispatcher, RuleAction};
use crate::kernel::stream_hub::StreamHub;

/// Processes claimed events against the active rule set.
pub struct EventProcessor {
    pool: PgPool,
    dispatcher: Arc<ActionDispatcher>,
    hub: StreamHub,
}

impl EventProcessor {
    pub fn new(pool: PgPool, dispatcher: Arc<ActionDispatcher>, hub: StreamHub) -> Self {
        Self {
            pool,
            dispatcher,
            hub,
        }
    }

    /// Run the full pass for a claimed event.
    ///
    /// Per-rule failures are captured in execution records and the attempt
    /// error list; only engine-level faults (e.g. the store going away)
    /// surface as `Err`, which the worker turns into a failed attempt.
    pub async fn process(&self, event: &Event, attempt_id: i64) -> Result<()> {
        let rules = Rule::load_active_for_type(&event.event_type, &self.pool)
            .await
            .context("failed to load active rules")?;

        debug!(
            event_id = event.id,
            attempt_id,
            rule_count = rules.len(),
            "processing event"
        );

        let mut errors: Vec<String> = Vec::new();

        for rule in &rules {
            let (result, error) = self.run_rule(rule, event).await;

            RuleExecution::record(
                attempt_id,
                rule.rule_id,
                rule.version_id,
                result,
                error.as_deref(),
                &self.pool,
            )
            .await
            .context("failed to record rule execution")?;

            if let Some(error) = error {
                warn!(
                    event_id = event.id,
                    rule_id = rule.rule_id,
                    error = %error,
                    "rule execution failed"
                );
                errors.push(error);
            }
        }

        self.finalize(event, attempt_id, &errors).await?;

        self.hub.publish_event_id(event.id);

        Ok(())
    }

    /// Evaluate one rule and dispatch its action. Never unwinds into the
    /// outer loop: every outcome is a `(result, error)` pair.
    async fn run_rule(&self, rule: &ActiveRule, event: &Event) -> (ExecutionResult, Option<String>) {
        let matched = match condition::evaluate(&rule.condition, &event.payload) {
            Ok(matched) => matched,
            Err(e) => return (ExecutionResult::Failed, Some(e.to_string())),
        };

        if !matched {
            return (ExecutionResult::Skipped, None);
        }

        let action = match RuleAction::parse(&rule.action) {
            Ok(action) => action,
            Err(e) => return (ExecutionResult::Failed, Some(e.to_string())),
        };

        if !action.is_idempotent() {
            match RuleExecution::version_already_applied(event.id, rule.version_id, &self.pool)
                .await
            {
                Ok(true) => return (ExecutionResult::Deduped, None),
                Ok(false) => {}
                Err(e) => return (ExecutionResult::Failed, Some(e.to_string())),
            }
        }

        match self.dispatcher.dispatch(&action).await {
            Ok(()) => (ExecutionResult::Applied, None),
            Err(e) => (ExecutionResult::Failed, Some(e.to_string())),
        }
    }

    /// Finalize the attempt and advance the event, atomically.
    async fn finalize(&self, event: &Event, attempt_id: i64, errors: &[String]) -> Result<()> {
        let (attempt_status, event_state, error) = if errors.is_empty() {
            ("success", "processed", None)
        } else {
            ("failed", "failed", Some(errors.join("\n")))
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE event_attempts
            SET status = $2::attempt_status,
                error = $3,
                finished_at = NOW(),
                duration_ms = (EXTRACT(EPOCH FROM (NOW() - started_at)) * 1000)::BIGINT
            WHERE id = $1
            "#,
        )
        .bind(attempt_id)
        .bind(attempt_status)
        .bind(error.as_deref())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE events
            SET state = $2::event_state,
                processed_at = NOW(),
                processing_started_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(event.id)
        .bind(event_state)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            event_id = event.id,
            attempt_id,
            status = attempt_status,
            "finalized attempt"
        );

        Ok(())
    }

    /// Engine-level fault path: the attempt is failed with the fault as its
    /// error and the event lands in `failed`, visible instead of stuck.
    pub async fn finalize_fault(
        &self,
        event: &Event,
        attempt_id: i64,
        fault: &anyhow::Error,
    ) -> Result<()> {
        self.finalize(event, attempt_id, &[fault.to_string()]).await?;
        self.hub.publish_event_id(event.id);
        Ok(())
    }

    /// Per-event timeout path: fail the attempt with an "exceeded timeout"
    /// marker and return the event to `pending` so a fresh claim can retry.
    pub async fn abort_timed_out(&self, event: &Event, attempt_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE event_attempts
            SET status = 'failed',
                error = 'exceeded timeout',
                finished_at = NOW(),
                duration_ms = (EXTRACT(EPOCH FROM (NOW() - started_at)) * 1000)::BIGINT
            WHERE id = $1
            "#,
        )
        .bind(attempt_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query_as::<_, Event>(&format!(
            r#"
            UPDATE events
            SET state = 'pending', processing_started_at = NULL
            WHERE id = $1
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(event.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        warn!(event_id = event.id, attempt_id, "event processing exceeded timeout");

        self.hub.publish_event_id(event.id);

        Ok(())
    }
}
