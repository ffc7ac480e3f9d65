use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{ Mutex, RwLock };
use tokio::time::{ Duration, Instant };

use crate::models::TrackedEntity;
use crate::notify::NotificationDispatcher;
use crate::services::poller::Poller;
use crate::store::StateStore;

/// Which half of the watchlist a cycle refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollScope {
    Prices,
    Transactions,
}

impl PollScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollScope::Prices => "prices",
            PollScope::Transactions => "transactions",
        }
    }

    fn includes(&self, entity: &TrackedEntity) -> bool {
        match self {
            PollScope::Prices => !entity.is_address(),
            PollScope::Transactions => entity.is_address(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorHealth {
    Healthy,
    Degraded,
    CredentialsExhausted,
}

/// Lets one warning through per interval.
pub struct WarningThrottle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl WarningThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub async fn allow(&self) -> bool {
        self.allow_at(Instant::now()).await
    }

    async fn allow_at(&self, now: Instant) -> bool {
        let mut last = self.last.lock().await;
        match *last {
            Some(prev) if now.duration_since(prev) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub scope: PollScope,
    /// Another cycle of the same scope was still running.
    pub skipped: bool,
    pub polled: usize,
    pub updated: usize,
    pub failed: usize,
    pub discarded: usize,
    pub triggered: usize,
}

impl CycleReport {
    fn empty(scope: PollScope, skipped: bool) -> Self {
        Self {
            scope,
            skipped,
            polled: 0,
            updated: 0,
            failed: 0,
            discarded: 0,
            triggered: 0,
        }
    }
}

/// Runs poll cycles: fetch, evaluate and persist under one lock, then notify.
pub struct AlertChecker {
    store: Arc<StateStore>,
    poller: Arc<Poller>,
    dispatcher: NotificationDispatcher,
    throttle: WarningThrottle,
    prices_in_flight: Mutex<()>,
    transactions_in_flight: Mutex<()>,
    health: RwLock<HashMap<PollScope, MonitorHealth>>,
}

impl AlertChecker {
    pub fn new(
        store: Arc<StateStore>,
        poller: Arc<Poller>,
        dispatcher: NotificationDispatcher,
        warning_interval: Duration
    ) -> Self {
        Self {
            store,
            poller,
            dispatcher,
            throttle: WarningThrottle::new(warning_interval),
            prices_in_flight: Mutex::new(()),
            transactions_in_flight: Mutex::new(()),
            health: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    fn in_flight(&self, scope: PollScope) -> &Mutex<()> {
        match scope {
            PollScope::Prices => &self.prices_in_flight,
            PollScope::Transactions => &self.transactions_in_flight,
        }
    }

    /// Runs one cycle for `scope`. Returns immediately, marked skipped, if a cycle for the
    /// same scope is already running.
    pub async fn run_cycle(&self, scope: PollScope) -> CycleReport {
        let Ok(_guard) = self.in_flight(scope).try_lock() else {
            tracing::debug!(scope = scope.as_str(), "Previous cycle still running, skipping tick");
            return CycleReport::empty(scope, true);
        };

        let (entities, source) = self.store.read(|state| {
            let entities: Vec<TrackedEntity> = state.entities
                .iter()
                .filter(|e| scope.includes(e))
                .cloned()
                .collect();
            (entities, state.data_source)
        }).await;

        if entities.is_empty() {
            self.set_health(scope, MonitorHealth::Healthy).await;
            return CycleReport::empty(scope, false);
        }

        let results = match scope {
            PollScope::Prices => self.poller.poll_prices(&entities, source).await,
            PollScope::Transactions => self.poller.poll_transactions(&entities).await,
        };

        let applied = self.store
            .mutate(|state| Ok(state.apply_poll(&entities, results, Utc::now()))).await
            .unwrap_or_default();

        for event in &applied.events {
            self.dispatcher.dispatch(event).await;
        }

        let exhausted = applied.failures.iter().any(|(_, e)| e.is_exhaustion());
        let health = if exhausted {
            MonitorHealth::CredentialsExhausted
        } else if !applied.failures.is_empty() {
            MonitorHealth::Degraded
        } else {
            MonitorHealth::Healthy
        };
        let previous = self.set_health(scope, health).await;

        if exhausted {
            if previous != MonitorHealth::CredentialsExhausted {
                self.dispatcher.warn(
                    "All API credentials were rejected. The key pool was reset and will be retried from the first key on the next cycle."
                ).await;
            }
        } else if let Some((id, error)) = applied.failures.first() {
            if self.throttle.allow().await {
                self.dispatcher.warn(
                    &format!(
                        "{} of {} {} failed to refresh (e.g. {}: {})",
                        applied.failures.len(),
                        entities.len(),
                        scope.as_str(),
                        id,
                        error
                    )
                ).await;
            }
        }

        let report = CycleReport {
            scope,
            skipped: false,
            polled: entities.len(),
            updated: applied.updated,
            failed: applied.failures.len(),
            discarded: applied.discarded,
            triggered: applied.events.len(),
        };
        tracing::debug!(
            scope = scope.as_str(),
            source = %source,
            polled = report.polled,
            updated = report.updated,
            failed = report.failed,
            triggered = report.triggered,
            "Poll cycle finished"
        );
        report
    }

    async fn set_health(&self, scope: PollScope, health: MonitorHealth) -> MonitorHealth {
        self.health
            .write().await
            .insert(scope, health)
            .unwrap_or(MonitorHealth::Healthy)
    }

    pub async fn scope_health(&self, scope: PollScope) -> MonitorHealth {
        self.health.read().await.get(&scope).copied().unwrap_or(MonitorHealth::Healthy)
    }

    /// Worst health across scopes, with storage failures counting as degraded.
    pub async fn health(&self) -> MonitorHealth {
        let health = self.health.read().await;
        if health.values().any(|h| *h == MonitorHealth::CredentialsExhausted) {
            MonitorHealth::CredentialsExhausted
        } else if self.store.is_degraded() || health.values().any(|h| *h == MonitorHealth::Degraded) {
            MonitorHealth::Degraded
        } else {
            MonitorHealth::Healthy
        }
    }
}
