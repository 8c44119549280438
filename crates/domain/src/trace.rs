//! Structured trace events, logged as JSON via `tracing`.

use serde::Serialize;
use uuid::Uuid;

use crate::models::{FailureKind, FillFormResultStatus, TaskKind};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent<'a> {
    TaskDispatched {
        task_id: Uuid,
        kind: TaskKind,
        owner: Option<&'a str>,
    },
    TaskSucceeded {
        task_id: Uuid,
        kind: TaskKind,
        duration_ms: u64,
    },
    TaskFailed {
        task_id: Uuid,
        kind: TaskKind,
        failure_kind: FailureKind,
        message: &'a str,
        retry_count: u32,
    },
    TaskRetryScheduled {
        task_id: Uuid,
        kind: TaskKind,
        retry_in_seconds: u64,
    },
    RateLimitDeferred {
        task_id: Uuid,
        group: &'a str,
        push_forward_seconds: u64,
    },
    FillFormCompleted {
        user_token_prefix: &'a str,
        result: FillFormResultStatus,
    },
    ApiRequestRejected {
        path: &'a str,
        status: u16,
        reason: &'a str,
    },
    SchedulerLate {
        task_id: Uuid,
        lateness_ms: u64,
    },
    VaultDecryptFailed {
        user_token_prefix: &'a str,
    },
}

impl<'a> TraceEvent<'a> {
    /// Serializes `self` and emits it at info level (warn for failure variants).
    pub fn emit(&self) {
        let payload = serde_json::to_value(self).unwrap_or_default();
        match self {
            TraceEvent::TaskFailed { .. } | TraceEvent::VaultDecryptFailed { .. } => {
                tracing::warn!(event = %payload, "trace event");
            }
            TraceEvent::SchedulerLate { .. } | TraceEvent::RateLimitDeferred { .. } => {
                tracing::warn!(event = %payload, "trace event");
            }
            _ => {
                tracing::info!(event = %payload, "trace event");
            }
        }
    }
}
