// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! Real-time events pushed to connected browsers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::scenario::{CommandResult, ScenarioAction};
use crate::vm::{LaunchKind, LaunchStatus};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LabEvent {
    ConnectionEstablished {
        role: String,
        connection_id: String,
    },
    ConnectionClosed {
        role: String,
    },
    ScenarioCompleted {
        scenario: String,
        action: ScenarioAction,
        result: CommandResult,
    },
    BulkCompleted {
        action: ScenarioAction,
        total: usize,
        succeeded: usize,
        failed: usize,
    },
    SessionReset {
        invalidated_tokens: usize,
    },
    SessionExpired {
        session_id: String,
    },
    VmLaunch {
        launch_id: String,
        kind: LaunchKind,
        command: String,
    },
    VmFinished {
        launch_id: String,
        kind: LaunchKind,
        status: LaunchStatus,
    },
}

/// An event plus its audience. `session_id: None` reaches every listener.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: LabEvent,
}

impl EventEnvelope {
    pub fn visible_to(&self, session_id: &str) -> bool {
        self.session_id.as_deref().map_or(true, |id| id == session_id)
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Number of live feeds.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Send to the listeners of one session.
    pub fn to_session(&self, session_id: &str, event: LabEvent) {
        self.publish(Some(session_id.to_string()), event);
    }

    /// Send to every listener.
    pub fn broadcast(&self, event: LabEvent) {
        self.publish(None, event);
    }

    fn publish(&self, session_id: Option<String>, event: LabEvent) {
        let envelope = EventEnvelope {
            session_id,
            timestamp: Utc::now(),
            event,
        };
        // No subscribers is the normal case between page loads.
        if let Ok(n) = self.tx.send(envelope) {
            debug!("Event delivered to {} listeners", n);
        }
    }
}
