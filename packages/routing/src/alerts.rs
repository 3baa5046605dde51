//! Alert hysteresis, message formatting, and dispatch.
//!
//! Alerts use two thresholds so a score hovering around a single cutoff
//! does not flap: alerting starts at `up_threshold` and only stops once the
//! score falls below `down_threshold`.

use safe_steps_grid::Cell;
use safe_steps_routing_models::{AlertDecision, AlertReason};

use crate::config::AlertConfig;

/// Errors from notification sinks.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The sink could not deliver the message.
    #[error("failed to send notification to {destination}: {message}")]
    Send {
        /// Intended recipient.
        destination: String,
        /// Sink error message.
        message: String,
    },
}

/// Delivery channel for alert messages (SMS, push, topic, ...).
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    /// Sends `message` to `destination` and returns the sink's message id.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the message could not be delivered.
    async fn send(&self, message: &str, destination: &str) -> Result<String, NotifyError>;
}

/// Dry-run sink: logs each message and returns a fresh UUID as its id.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationSink;

#[async_trait::async_trait]
impl NotificationSink for LogNotificationSink {
    async fn send(&self, message: &str, destination: &str) -> Result<String, NotifyError> {
        let id = uuid::Uuid::new_v4().to_string();
        log::info!("Notification {id} to {destination}: {message}");
        Ok(id)
    }
}

/// Decides whether a score change warrants an alert.
///
/// * no previous score: alert iff `new >= up`
/// * previous `>= up`: keep alerting while `new >= down`
/// * previous `< up <= new`: alert iff `new - previous >= min_jump`
/// * otherwise: no alert
#[must_use]
pub fn evaluate_alert(previous: Option<f64>, new: f64, config: &AlertConfig) -> AlertDecision {
    let up = config.up_threshold;

    let Some(previous) = previous else {
        return if new >= up {
            AlertDecision {
                alert: true,
                reason: AlertReason::NoPrevHigh,
            }
        } else {
            AlertDecision {
                alert: false,
                reason: AlertReason::NoPrevLow,
            }
        };
    };

    if previous >= up && new >= config.down_threshold {
        return AlertDecision {
            alert: true,
            reason: AlertReason::StillHigh,
        };
    }

    if previous < up && up <= new && new - previous >= config.min_jump {
        return AlertDecision {
            alert: true,
            reason: AlertReason::CrossedUp,
        };
    }

    AlertDecision {
        alert: false,
        reason: AlertReason::LowOrSmallChange,
    }
}

/// What an alert is about.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertContext {
    /// Cell whose score changed.
    pub cell: Cell,
    /// Region the cell belongs to, if known.
    pub city: Option<String>,
    /// Current score.
    pub new_score: f64,
    /// Score at the last evaluation, if any.
    pub previous_score: Option<f64>,
    /// Nearest safe cell, if one was found.
    pub nearest_safe: Option<Cell>,
}

/// Formats the alert text:
/// `SafeSteps alert | Zone: <cell> | City: <city> | Severity: <score><arrow>
/// | Nearest safer area: <cell>`.
///
/// The arrow shows the direction relative to the previous score and is
/// omitted when unchanged or unknown; the last part is omitted without a
/// safe cell.
#[must_use]
pub fn build_alert_message(context: &AlertContext) -> String {
    let arrow = match context.previous_score {
        Some(prev) if context.new_score > prev => " ⬆️",
        Some(prev) if context.new_score < prev => " ⬇️",
        _ => "",
    };

    let mut parts = vec![
        "SafeSteps alert".to_string(),
        format!("Zone: {}", context.cell),
        format!("City: {}", context.city.as_deref().unwrap_or("N/A")),
        format!("Severity: {:.2}{arrow}", context.new_score),
    ];
    if let Some(safe) = context.nearest_safe {
        parts.push(format!("Nearest safer area: {safe}"));
    }
    parts.join(" | ")
}

/// Result of [`alert_if_needed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertDispatch {
    /// Hysteresis outcome.
    pub decision: AlertDecision,
    /// Sink message id, when a message was sent.
    pub message_id: Option<String>,
}

/// Evaluates the hysteresis and, on a positive decision, sends the
/// formatted message through `sink`.
///
/// # Errors
///
/// Returns [`NotifyError`] if the sink fails. Nothing is sent (and no
/// error is possible) when the decision is negative.
pub async fn alert_if_needed<S>(
    sink: &S,
    destination: &str,
    context: &AlertContext,
    config: &AlertConfig,
) -> Result<AlertDispatch, NotifyError>
where
    S: NotificationSink + ?Sized,
{
    let decision = evaluate_alert(context.previous_score, context.new_score, config);
    log::debug!(
        "Alert decision for {}: {} ({})",
        context.cell,
        decision.alert,
        decision.reason
    );

    if !decision.alert {
        return Ok(AlertDispatch {
            decision,
            message_id: None,
        });
    }

    let message = build_alert_message(context);
    let message_id = sink.send(&message, destination).await?;
    Ok(AlertDispatch {
        decision,
        message_id: Some(message_id),
    })
}
