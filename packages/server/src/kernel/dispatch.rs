//! Action dispatcher for matched rules.
//!
//! Actions are a tagged union stored as `{type, params}` JSON on the rule
//! version. The dispatcher owns no persistence: it executes one action with
//! bounded time and returns an outcome the engine records.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WebhookMethod {
    Post,
    Put,
    Patch,
}

impl WebhookMethod {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
        }
    }
}

/// A rule action as stored on a rule version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum RuleAction {
    Log {
        #[serde(default)]
        level: LogLevel,
        message: String,
    },
    Noop {},
    CallWebhook {
        url: String,
        method: WebhookMethod,
        #[serde(default)]
        headers: Option<HashMap<String, String>>,
        #[serde(default)]
        body: Option<Value>,
    },
    SendEmail {
        to: String,
        subject: String,
        template: String,
        #[serde(default)]
        data: Option<Value>,
    },
}

const KNOWN_ACTION_TYPES: &[&str] = &["log", "noop", "call_webhook", "send_email"];

#[derive(Debug, thiserror::Error)]
pub enum ActionParseError {
    #[error("Unknown action type: {0}")]
    UnknownType(String),

    #[error("Invalid action: {0}")]
    Invalid(String),
}

impl RuleAction {
    /// Parse and validate an action document.
    ///
    /// Accepts `{type, params?}`; an absent `params` is treated as `{}` so
    /// parameterless actions stay terse in the console.
    pub fn parse(value: &Value) -> Result<Self, ActionParseError> {
        let map = value
            .as_object()
            .ok_or_else(|| ActionParseError::Invalid("action must be a JSON object".into()))?;

        let tag = map
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ActionParseError::Invalid("action is missing a 'type' tag".into()))?;

        if !KNOWN_ACTION_TYPES.contains(&tag) {
            return Err(ActionParseError::UnknownType(tag.to_string()));
        }

        let mut normalized = map.clone();
        normalized
            .entry("params")
            .or_insert_with(|| Value::Object(Default::default()));

        serde_json::from_value(Value::Object(normalized))
            .map_err(|e| ActionParseError::Invalid(e.to_string()))
    }

    /// Idempotent actions always run on replay so the audit log reflects
    /// every pass; only non-idempotent actions are deduplicated.
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Self::Log { .. } | Self::Noop {})
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Log { .. } => "log",
            Self::Noop {} => "noop",
            Self::CallWebhook { .. } => "call_webhook",
            Self::SendEmail { .. } => "send_email",
        }
    }
}

/// send_email behavior, set by deployment configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmailMode {
    #[default]
    Disabled,
    Log,
}

impl FromStr for EmailMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "disabled" => Ok(Self::Disabled),
            "log" => Ok(Self::Log),
            other => anyhow::bail!("unknown email mode: {other}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Webhook failed with status {0}")]
    WebhookStatus(u16),

    #[error("Webhook request failed: {0}")]
    WebhookTransport(String),

    #[error("send_email is not implemented")]
    EmailNotImplemented,

    #[error("{0}")]
    UnknownAction(#[from] ActionParseError),
}

/// Executes rule actions with bounded time.
pub struct ActionDispatcher {
    http: reqwest::Client,
    email_mode: EmailMode,
}

impl ActionDispatcher {
    pub fn new(webhook_timeout: Duration, email_mode: EmailMode) -> Self {
        let http = reqwest::Client::builder()
            .timeout(webhook_timeout)
            .build()
            .expect("default reqwest client configuration is valid");
        Self { http, email_mode }
    }

    /// Execute one action. Success means the side effect completed; any
    /// failure is classified for the rule execution record.
    pub async fn dispatch(&self, action: &RuleAction) -> Result<(), DispatchError> {
        match action {
            RuleAction::Log { level, message } => {
                match level {
                    LogLevel::Info => info!(message = %message, "rule action log"),
                    LogLevel::Warn => warn!(message = %message, "rule action log"),
                    LogLevel::Error => error!(message = %message, "rule action log"),
                }
                Ok(())
            }
            RuleAction::Noop {} => Ok(()),
            RuleAction::CallWebhook {
                url,
                method,
                headers,
                body,
            } => self.call_webhook(url, *method, headers.as_ref(), body.as_ref()).await,
            RuleAction::SendEmail {
                to,
                subject,
                template,
                ..
            } => match self.email_mode {
                EmailMode::Log => {
                    info!(to = %to, subject = %subject, template = %template, "send_email (log mode)");
                    Ok(())
                }
                EmailMode::Disabled => Err(DispatchError::EmailNotImplemented),
            },
        }
    }

    async fn call_webhook(
        &self,
        url: &str,
        method: WebhookMethod,
        headers: Option<&HashMap<String, String>>,
        body: Option<&Value>,
    ) -> Result<(), DispatchError> {
        let mut request = self.http.request(method.as_reqwest(), url);

        if let Some(headers) = headers {
            for (name, value) in headers {
                request = request.header(name, value);
            }
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DispatchError::WebhookTransport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::WebhookStatus(status.as_u16()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_log_action() {
        let action = RuleAction::parse(&json!({
            "type": "log",
            "params": {"level": "info", "message": "ok"}
        }))
        .unwrap();
        assert_eq!(
            action,
            RuleAction::Log {
                level: LogLevel::Info,
                message: "ok".to_string()
            }
        );
        assert!(action.is_idempotent());
    }

    #[test]
    fn parses_noop_without_params() {
        let action = RuleAction::parse(&json!({"type": "noop"})).unwrap();
        assert_eq!(action, RuleAction::Noop {});
        assert!(action.is_idempotent());
    }

    #[test]
    fn parses_webhook_action() {
        let action = RuleAction::parse(&json!({
            "type": "call_webhook",
            "params": {
                "url": "https://example.com/hook",
                "method": "POST",
                "headers": {"x-token": "abc"},
                "body": {"hello": true}
            }
        }))
        .unwrap();
        assert!(!action.is_idempotent());
        assert_eq!(action.type_tag(), "call_webhook");
    }

    #[test]
    fn parses_email_action() {
        let action = RuleAction::parse(&json!({
            "type": "send_email",
            "params": {"to": "ops@example.com", "subject": "hi", "template": "alert"}
        }))
        .unwrap();
        assert!(!action.is_idempotent());
    }

    #[test]
    fn unknown_tag_is_rejected_with_name() {
        let err = RuleAction::parse(&json!({"type": "run_shell", "params": {}})).unwrap_err();
        assert_eq!(err.to_string(), "Unknown action type: run_shell");
    }

    #[test]
    fn missing_tag_is_invalid() {
        let err = RuleAction::parse(&json!({"params": {}})).unwrap_err();
        assert!(matches!(err, ActionParseError::Invalid(_)));
    }

    #[test]
    fn webhook_method_must_be_allowed() {
        let err = RuleAction::parse(&json!({
            "type": "call_webhook",
            "params": {"url": "https://example.com", "method": "GET"}
        }))
        .unwrap_err();
        assert!(matches!(err, ActionParseError::Invalid(_)));
    }

    #[test]
    fn email_mode_parses() {
        assert_eq!("log".parse::<EmailMode>().unwrap(), EmailMode::Log);
        assert_eq!("disabled".parse::<EmailMode>().unwrap(), EmailMode::Disabled);
        assert!("smtp".parse::<EmailMode>().is_err());
    }

    #[tokio::test]
    async fn noop_and_log_dispatch_succeed() {
        let dispatcher = ActionDispatcher::new(Duration::from_secs(1), EmailMode::Disabled);
        dispatcher.dispatch(&RuleAction::Noop {}).await.unwrap();
        dispatcher
            .dispatch(&RuleAction::Log {
                level: LogLevel::Warn,
                message: "hello".into(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn disabled_email_fails_not_implemented() {
        let dispatcher = ActionDispatcher::new(Duration::from_secs(1), EmailMode::Disabled);
        let err = dispatcher
            .dispatch(&RuleAction::SendEmail {
                to: "a@b.c".into(),
                subject: "s".into(),
                template: "t".into(),
                data: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::EmailNotImplemented));
    }

    #[tokio::test]
    async fn log_mode_email_succeeds() {
        let dispatcher = ActionDispatcher::new(Duration::from_secs(1), EmailMode::Log);
        dispatcher
            .dispatch(&RuleAction::SendEmail {
                to: "a@b.c".into(),
                subject: "s".into(),
                template: "t".into(),
                data: Some(json!({"k": 1})),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn webhook_transport_error_is_classified() {
        let dispatcher = ActionDispatcher::new(Duration::from_millis(200), EmailMode::Disabled);
        // Nothing listens on this port.
        let err = dispatcher
            .dispatch(&RuleAction::CallWebhook {
                url: "http://127.0.0.1:9/unreachable".into(),
                method: WebhookMethod::Post,
                headers: None,
                body: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::WebhookTransport(_)));
    }
}
