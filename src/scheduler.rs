use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{ interval, Duration, MissedTickBehavior };
use tokio_util::sync::CancellationToken;

use crate::alert_checker::{ AlertChecker, PollScope };
use crate::config::PollIntervals;
use crate::enums::DataSource;

/// A recurring job running on its own task until stopped.
///
/// The job runs to completion before the next tick is considered, and ticks that come due
/// while it runs are dropped rather than queued.
pub struct ScheduledTask {
    name: String,
    period: Duration,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn spawn<F, Fut>(name: impl Into<String>, period: Duration, mut job: F) -> Self
        where F: FnMut() -> Fut + Send + 'static, Fut: Future<Output = ()> + Send + 'static
    {
        let name = name.into();
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => job().await,
                }
            }

            tracing::debug!(task = %task_name, "Scheduled task stopped");
        });

        tracing::info!(task = %name, period_secs = period.as_secs_f64(), "Scheduled task started");

        Self {
            name,
            period,
            token,
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Cancels the task and waits for an in-progress run to finish.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(task = %self.name, error = %e, "Scheduled task ended abnormally");
        }
    }
}

/// Owns the price and transaction polling tasks.
pub struct MonitorScheduler {
    checker: Arc<AlertChecker>,
    intervals: PollIntervals,
    prices: Mutex<Option<ScheduledTask>>,
    transactions: Mutex<Option<ScheduledTask>>,
}

impl MonitorScheduler {
    pub fn new(checker: Arc<AlertChecker>, intervals: PollIntervals) -> Self {
        Self {
            checker,
            intervals,
            prices: Mutex::new(None),
            transactions: Mutex::new(None),
        }
    }

    fn cycle_task(&self, scope: PollScope, period: Duration) -> ScheduledTask {
        let checker = self.checker.clone();
        ScheduledTask::spawn(scope.as_str(), period, move || {
            let checker = checker.clone();
            async move {
                checker.run_cycle(scope).await;
            }
        })
    }

    pub async fn start(&self) {
        self.reschedule_prices().await;

        let mut slot = self.transactions.lock().await;
        if slot.is_none() {
            *slot = Some(self.cycle_task(PollScope::Transactions, self.intervals.transactions));
        }
    }

    /// Restarts the price task with the cadence of the stored data source.
    ///
    /// The source is read while the price slot is held, so concurrent switches always leave
    /// the task on the cadence of the last persisted source.
    pub async fn reschedule_prices(&self) -> DataSource {
        let mut slot = self.prices.lock().await;
        let source = self.checker.store().read(|state| state.data_source).await;

        if let Some(task) = slot.take() {
            task.stop().await;
        }

        let period = self.intervals.for_source(source);
        tracing::info!(source = %source, period_secs = period.as_secs(), "Price polling scheduled");
        *slot = Some(self.cycle_task(PollScope::Prices, period));
        source
    }

    pub async fn price_period(&self) -> Option<Duration> {
        self.prices.lock().await.as_ref().map(ScheduledTask::period)
    }

    pub async fn shutdown(&self) {
        for slot in [&self.prices, &self.transactions] {
            if let Some(task) = slot.lock().await.take() {
                task.stop().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryKeyValueStore;
    use crate::notify::NotificationDispatcher;
    use crate::providers::PriceProviders;
    use crate::services::Poller;
    use crate::store::StateStore;
    use std::sync::atomic::{ AtomicUsize, Ordering };

    async fn monitor() -> (MonitorScheduler, Arc<StateStore>) {
        let store = Arc::new(
            StateStore::load(Arc::new(MemoryKeyValueStore::new()), DataSource::CoinGecko).await
        );
        let checker = AlertChecker::new(
            store.clone(),
            Arc::new(Poller::new(PriceProviders::new(Vec::new()), Vec::new())),
            NotificationDispatcher::new(Vec::new()),
            Duration::from_secs(60)
        );
        (MonitorScheduler::new(Arc::new(checker), PollIntervals::default()), store)
    }

    async fn switch(scheduler: &MonitorScheduler, store: &StateStore, source: DataSource) {
        store.mutate(|s| Ok(s.set_data_source(source))).await.unwrap();
        scheduler.reschedule_prices().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_runs_until_stopped() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let task = ScheduledTask::spawn("counter", Duration::from_secs(5), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(task.name(), "counter");

        tokio::time::sleep(Duration::from_millis(12_500)).await;
        task.stop().await;
        let seen = runs.load(Ordering::SeqCst);
        assert_eq!(seen, 3);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_job_never_overlaps() {
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let (a, m) = (active.clone(), max_seen.clone());

        let task = ScheduledTask::spawn("slow", Duration::from_secs(1), move || {
            let (a, m) = (a.clone(), m.clone());
            async move {
                let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                m.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(3_500)).await;
                a.fetch_sub(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(20)).await;
        task.stop().await;
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_price_cadence_follows_stored_source() {
        let (scheduler, store) = monitor().await;
        scheduler.start().await;
        assert_eq!(scheduler.price_period().await, Some(Duration::from_secs(30)));

        switch(&scheduler, &store, DataSource::Binance).await;
        assert_eq!(scheduler.price_period().await, Some(Duration::from_secs(5)));

        scheduler.shutdown().await;
        assert_eq!(scheduler.price_period().await, None);
    }

    #[tokio::test]
    async fn test_concurrent_switches_settle_on_persisted_source() {
        let (scheduler, store) = monitor().await;
        scheduler.start().await;

        for _ in 0..10 {
            tokio::join!(
                switch(&scheduler, &store, DataSource::Binance),
                switch(&scheduler, &store, DataSource::CoinGecko)
            );
            let persisted = store.read(|s| s.data_source).await;
            let expected = PollIntervals::default().for_source(persisted);
            assert_eq!(scheduler.price_period().await, Some(expected));
        }

        scheduler.shutdown().await;
    }
}
