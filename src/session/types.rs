// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! Session records held by the session store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::scenario::{CommandResult, ScenarioAction};

/// Token issued by the gateway for one role, with the data source it belongs to.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamToken {
    pub token: String,
    pub data_source: String,
}

impl UpstreamToken {
    pub fn new(token: impl Into<String>, data_source: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            data_source: data_source.into(),
        }
    }
}

impl std::fmt::Debug for UpstreamToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamToken")
            .field("token", &"<redacted>")
            .field("data_source", &self.data_source)
            .finish()
    }
}

/// Browser session state visible to API clients
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Roles with a live remote desktop connection. A set, so a role is never listed twice.
    pub active_connections: BTreeSet<String>,
    /// Last result per scenario and action
    pub scenario_results: BTreeMap<String, BTreeMap<ScenarioAction, CommandResult>>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            last_activity: now,
            active_connections: BTreeSet::new(),
            scenario_results: BTreeMap::new(),
        }
    }
}

/// Everything stored for one session id. Tokens live inside the record so
/// that deleting the record drops them in the same lock acquisition.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session: Session,
    pub tokens: HashMap<String, UpstreamToken>,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            session: Session::new(id),
            tokens: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.session.id
    }
}
