// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! VM lifecycle trigger.
//!
//! `up`/`halt` commands run as background processes. Each launch is
//! represented by a [`LaunchHandle`] whose status can be observed while the
//! process runs; its combined output is appended to a log file that
//! [`LogTail`] follows.

mod tail;
mod trigger;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

pub use tail::LogTail;
pub use trigger::VmTrigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchKind {
    Up,
    Halt,
}

impl std::fmt::Display for LaunchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchKind::Up => write!(f, "up"),
            LaunchKind::Halt => write!(f, "halt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LaunchStatus {
    NotStarted,
    Running,
    Completed { exit_code: i32 },
    Failed { message: String },
}

impl LaunchStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, LaunchStatus::Completed { .. } | LaunchStatus::Failed { .. })
    }
}

/// Observable handle on one launched command.
#[derive(Debug, Clone)]
pub struct LaunchHandle {
    pub id: String,
    pub kind: LaunchKind,
    pub command: String,
    pub started_at: DateTime<Utc>,
    status: watch::Receiver<LaunchStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaunchSnapshot {
    pub id: String,
    pub kind: LaunchKind,
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub status: LaunchStatus,
}

impl LaunchHandle {
    pub(crate) fn new(
        kind: LaunchKind,
        command: String,
        status: watch::Receiver<LaunchStatus>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            command,
            started_at: Utc::now(),
            status,
        }
    }

    pub fn status(&self) -> LaunchStatus {
        self.status.borrow().clone()
    }

    /// Resolves once the process has exited or failed.
    pub async fn wait(&self) -> LaunchStatus {
        let mut rx = self.status.clone();
        loop {
            let current = rx.borrow_and_update().clone();
            if current.is_finished() {
                return current;
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    pub fn snapshot(&self) -> LaunchSnapshot {
        LaunchSnapshot {
            id: self.id.clone(),
            kind: self.kind,
            command: self.command.clone(),
            started_at: self.started_at,
            status: self.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_returns_final_status() {
        let (tx, rx) = watch::channel(LaunchStatus::NotStarted);
        let handle = LaunchHandle::new(LaunchKind::Up, "true".into(), rx);

        tx.send_replace(LaunchStatus::Running);
        assert_eq!(handle.status(), LaunchStatus::Running);

        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.wait().await })
        };
        tx.send_replace(LaunchStatus::Completed { exit_code: 0 });
        assert_eq!(waiter.await.unwrap(), LaunchStatus::Completed { exit_code: 0 });
    }

    #[test]
    fn test_status_json() {
        let json = serde_json::to_value(LaunchStatus::Completed { exit_code: 2 }).unwrap();
        assert_eq!(json["state"], "completed");
        assert_eq!(json["exit_code"], 2);
        let json = serde_json::to_value(LaunchStatus::NotStarted).unwrap();
        assert_eq!(json["state"], "not_started");
    }
}
