//! LABGATE Session Lifecycle Management
//!
//! Background task that expires idle sessions and revokes their upstream tokens.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::events::{EventBus, LabEvent};
use crate::gateway::Gateway;
use crate::session::SessionManager;

/// Configuration for lifecycle management
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Interval for the expiry sweep
    pub sweep_interval: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(300),
        }
    }
}

/// Lifecycle manager for handling background tasks
pub struct LifecycleManager {
    sessions: Arc<SessionManager>,
    gateway: Arc<dyn Gateway>,
    events: EventBus,
    config: LifecycleConfig,
}

impl LifecycleManager {
    pub fn new(
        sessions: Arc<SessionManager>,
        gateway: Arc<dyn Gateway>,
        events: EventBus,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            sessions,
            gateway,
            events,
            config,
        }
    }

    /// Start the sweep task. It runs until `shutdown` flips to `true` or its
    /// sender is dropped.
    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        info!(
            "Starting session sweep every {}s",
            self.config.sweep_interval.as_secs()
        );

        tokio::spawn(async move {
            let mut ticker = interval(self.config.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_sweep_once().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Session sweep stopped");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Expire idle sessions, then invalidate their tokens upstream.
    /// Returns the number of sessions removed.
    pub async fn run_sweep_once(&self) -> usize {
        let started = Instant::now();
        debug!("Running session sweep");

        // The store lock is released before any network call.
        let expired = self.sessions.sweep_expired();

        for record in &expired {
            for (role, token) in &record.tokens {
                debug!("Invalidating {} token of expired session", role);
                self.gateway.invalidate(token).await;
            }
            self.events.to_session(
                record.id(),
                LabEvent::SessionExpired {
                    session_id: record.id().to_string(),
                },
            );
        }

        info!(
            target: "perf",
            "session_sweep removed={} remaining={} duration_ms={}",
            expired.len(),
            self.sessions.len(),
            started.elapsed().as_millis()
        );
        expired.len()
    }
}
