use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use futures::future::{BoxFuture, FutureExt};
use tokio::{
    sync::Notify,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, RegistryError};

/// The remote aggregates a session mirrors, one poller each.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AggregateId {
    RoundStatus,
    GameState,
    Grid,
    Motherlode,
    PrimaryBalance,
    RewardBalance,
    MinerStats,
    Automation,
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateId::RoundStatus => "round_status",
            AggregateId::GameState => "game_state",
            AggregateId::Grid => "grid",
            AggregateId::Motherlode => "motherlode",
            AggregateId::PrimaryBalance => "primary_balance",
            AggregateId::RewardBalance => "reward_balance",
            AggregateId::MinerStats => "miner_stats",
            AggregateId::Automation => "automation",
        };
        f.write_str(name)
    }
}

pub type FetchFn<T> = Box<dyn FnMut() -> BoxFuture<'static, Result<T, ClientError>> + Send>;

/// One recurring read and where its results go.
pub struct PollerConfig<T> {
    pub interval: Duration,
    pub fetch: FetchFn<T>,
    pub on_success: Box<dyn FnMut(T) + Send>,
    pub on_error: Box<dyn FnMut(ClientError) + Send>,
    /// Set for round-scoped aggregates. Runs synchronously when a round
    /// transition is signalled, before the forced refresh is scheduled.
    pub on_reset: Option<Box<dyn FnMut() + Send>>,
    /// Bound on a single fetch. Expiry is reported as [`ClientError::Timeout`].
    pub timeout: Option<Duration>,
}

impl<T: Send + 'static> PollerConfig<T> {
    pub fn new<F, Fut>(interval: Duration, mut fetch: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
    {
        Self {
            interval,
            fetch: Box::new(move || fetch().boxed()),
            on_success: Box::new(|_| {}),
            on_error: Box::new(|_| {}),
            on_reset: None,
            timeout: None,
        }
    }

    pub fn on_success(mut self, f: impl FnMut(T) + Send + 'static) -> Self {
        self.on_success = Box::new(f);
        self
    }

    pub fn on_error(mut self, f: impl FnMut(ClientError) + Send + 'static) -> Self {
        self.on_error = Box::new(f);
        self
    }

    /// Marks the aggregate round-scoped.
    pub fn on_reset(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_reset = Some(Box::new(f));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

struct Sinks<T> {
    epoch: u64,
    on_success: Box<dyn FnMut(T) + Send>,
    on_error: Box<dyn FnMut(ClientError) + Send>,
    on_reset: Option<Box<dyn FnMut() + Send>>,
}

// Callbacks and the epoch live under one lock so that a reset and a result
// delivery can never interleave.
struct Slot<T> {
    sinks: Mutex<Sinks<T>>,
}

impl<T> Slot<T> {
    fn lock(&self) -> MutexGuard<'_, Sinks<T>> {
        self.sinks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    fn deliver(
        &self,
        id: AggregateId,
        started: u64,
        result: Result<T, ClientError>,
        cancel: &CancellationToken,
    ) {
        let mut sinks = self.lock();
        if cancel.is_cancelled() {
            return;
        }
        if sinks.epoch != started {
            tracing::debug!(aggregate = %id, "discarding result fetched before round transition");
            return;
        }
        match result {
            Ok(value) => (sinks.on_success)(value),
            Err(err) => {
                tracing::warn!(aggregate = %id, %err, "poll failed");
                (sinks.on_error)(err)
            }
        }
    }
}

trait RoundScope: Send + Sync {
    fn invalidate(&self);
}

impl<T: Send> RoundScope for Slot<T> {
    fn invalidate(&self) {
        let mut sinks = self.lock();
        sinks.epoch += 1;
        if let Some(reset) = sinks.on_reset.as_mut() {
            reset();
        }
    }
}

#[derive(Clone)]
struct Control {
    notify: Arc<Notify>,
    scope: Option<Arc<dyn RoundScope>>,
}

type Controls = Arc<Mutex<HashMap<AggregateId, Control>>>;

fn lock_controls(controls: &Controls) -> MutexGuard<'_, HashMap<AggregateId, Control>> {
    controls.lock().unwrap_or_else(|e| e.into_inner())
}

/// Owns one polling task per aggregate.
///
/// Each task fetches on its own interval with at most one fetch in flight;
/// ticks that fire during a fetch are skipped. Forced refreshes requested
/// during a fetch collapse into a single follow-up fetch. Dropping the
/// registry or calling [`PollerRegistry::shutdown`] cancels every task, and no
/// callback runs after cancellation.
pub struct PollerRegistry {
    cancel: CancellationToken,
    controls: Controls,
    tasks: Vec<JoinHandle<()>>,
}

impl Default for PollerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PollerRegistry {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            controls: Arc::new(Mutex::new(HashMap::new())),
            tasks: Vec::new(),
        }
    }

    /// Starts polling `id`. The first fetch runs immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register<T: Send + 'static>(
        &mut self,
        id: AggregateId,
        config: PollerConfig<T>,
    ) -> Result<(), RegistryError> {
        if self.cancel.is_cancelled() {
            return Err(RegistryError::Closed);
        }
        if config.interval.is_zero() {
            return Err(RegistryError::ZeroInterval(id));
        }
        let mut controls = lock_controls(&self.controls);
        if controls.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }

        let PollerConfig {
            interval,
            fetch,
            on_success,
            on_error,
            on_reset,
            timeout,
        } = config;
        let round_scoped = on_reset.is_some();
        let slot = Arc::new(Slot {
            sinks: Mutex::new(Sinks {
                epoch: 0,
                on_success,
                on_error,
                on_reset,
            }),
        });
        let notify = Arc::new(Notify::new());
        controls.insert(
            id,
            Control {
                notify: notify.clone(),
                scope: round_scoped.then(|| slot.clone() as Arc<dyn RoundScope>),
            },
        );
        drop(controls);

        tracing::debug!(aggregate = %id, ?interval, round_scoped, "poller registered");
        let task = PollTask {
            id,
            interval,
            timeout,
            fetch,
            slot,
            notify,
            cancel: self.cancel.child_token(),
        };
        self.tasks.push(tokio::spawn(task.run()));
        Ok(())
    }

    pub fn refresh_handle(&self) -> RefreshHandle {
        RefreshHandle {
            cancel: self.cancel.clone(),
            controls: self.controls.clone(),
        }
    }

    pub fn force_refresh(&self, id: AggregateId) -> Result<(), RegistryError> {
        self.refresh_handle().force_refresh(id)
    }

    pub fn on_round_transition(&self) {
        self.refresh_handle().round_transition()
    }

    /// Cancels every poller and waits for their tasks to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                if err.is_panic() {
                    tracing::error!(%err, "poller task panicked");
                }
            }
        }
        tracing::debug!("pollers stopped");
    }
}

impl Drop for PollerRegistry {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Cloneable handle for out-of-band refreshes, given to whoever learns that
/// remote state changed: the round clock and the transaction submitter.
#[derive(Clone)]
pub struct RefreshHandle {
    cancel: CancellationToken,
    controls: Controls,
}

impl RefreshHandle {
    /// Fetches `id` now without disturbing its regular interval.
    pub fn force_refresh(&self, id: AggregateId) -> Result<(), RegistryError> {
        if self.cancel.is_cancelled() {
            return Err(RegistryError::Closed);
        }
        let controls = lock_controls(&self.controls);
        let control = controls.get(&id).ok_or(RegistryError::Unknown(id))?;
        control.notify.notify_one();
        tracing::trace!(aggregate = %id, "forced refresh");
        Ok(())
    }

    /// Refreshes each of `ids` that is registered; unknown ones are skipped.
    pub fn force_refresh_all(&self, ids: &[AggregateId]) {
        for id in ids {
            match self.force_refresh(*id) {
                Ok(()) | Err(RegistryError::Unknown(_)) => {}
                Err(err) => {
                    tracing::debug!(aggregate = %id, %err, "refresh skipped");
                    return;
                }
            }
        }
    }

    /// Resets every round-scoped aggregate to its empty state, discards any
    /// of their fetches still in flight, then refreshes them.
    pub fn round_transition(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        let controls: Vec<(AggregateId, Control)> = lock_controls(&self.controls)
            .iter()
            .map(|(id, control)| (*id, control.clone()))
            .collect();
        for (id, control) in controls {
            if let Some(scope) = control.scope {
                scope.invalidate();
                control.notify.notify_one();
                tracing::debug!(aggregate = %id, "round-scoped aggregate reset");
            }
        }
    }
}

struct PollTask<T> {
    id: AggregateId,
    interval: Duration,
    timeout: Option<Duration>,
    fetch: FetchFn<T>,
    slot: Arc<Slot<T>>,
    notify: Arc<Notify>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> PollTask<T> {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = self.notify.notified() => {}
                _ = ticker.tick() => {}
            }

            let started_epoch = self.slot.epoch();
            let started_at = Instant::now();
            let fetch = (self.fetch)();
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = bounded(fetch, self.timeout) => result,
            };
            self.slot.deliver(self.id, started_epoch, result, &self.cancel);

            // Ticks that came due during a long fetch are dropped, not replayed.
            if started_at.elapsed() >= self.interval {
                ticker.reset();
            }
        }
        tracing::trace!(aggregate = %self.id, "poller stopped");
    }
}

async fn bounded<T>(
    fetch: BoxFuture<'static, Result<T, ClientError>>,
    timeout: Option<Duration>,
) -> Result<T, ClientError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fetch)
            .await
            .unwrap_or(Err(ClientError::Timeout(limit))),
        None => fetch.await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::sleep;

    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    /// Fetch that takes `delay` and returns its call number.
    fn counting_fetch(
        delay: Duration,
        calls: Arc<AtomicUsize>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    ) -> impl FnMut() -> BoxFuture<'static, Result<usize, ClientError>> + Send + 'static {
        move || {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let in_flight = in_flight.clone();
            let max_in_flight = max_in_flight.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(now, Ordering::SeqCst);
                sleep(delay).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(call)
            }
            .boxed()
        }
    }

    fn counters() -> (Arc<AtomicUsize>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        Default::default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_never_overlaps() {
        let (calls, in_flight, max) = counters();
        let mut registry = PollerRegistry::new();
        registry
            .register(
                AggregateId::Grid,
                PollerConfig::new(
                    secs(1.0),
                    counting_fetch(secs(3.0), calls.clone(), in_flight, max.clone()),
                ),
            )
            .unwrap();

        sleep(secs(10.5)).await;
        assert_eq!(max.load(Ordering::SeqCst), 1);
        // Fetches at 0, 4 and 8; the ticks at 1, 2 and 3 are skipped.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_refresh_runs_out_of_cadence() {
        let (calls, in_flight, max) = counters();
        let mut registry = PollerRegistry::new();
        registry
            .register(
                AggregateId::GameState,
                PollerConfig::new(
                    secs(60.0),
                    counting_fetch(secs(0.1), calls.clone(), in_flight, max),
                ),
            )
            .unwrap();

        sleep(secs(1.0)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        registry.force_refresh(AggregateId::GameState).unwrap();
        sleep(secs(1.0)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert_eq!(
            registry.force_refresh(AggregateId::Automation),
            Err(RegistryError::Unknown(AggregateId::Automation))
        );
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_refreshes_coalesce_during_fetch() {
        let (calls, in_flight, max) = counters();
        let mut registry = PollerRegistry::new();
        registry
            .register(
                AggregateId::Motherlode,
                PollerConfig::new(
                    secs(60.0),
                    counting_fetch(secs(5.0), calls.clone(), in_flight, max.clone()),
                ),
            )
            .unwrap();

        sleep(secs(1.0)).await;
        for _ in 0..3 {
            registry.force_refresh(AggregateId::Motherlode).unwrap();
        }
        sleep(secs(20.0)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(max.load(Ordering::SeqCst), 1);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_transition_zeroes_then_discards_stale_result() {
        let (calls, in_flight, max) = counters();
        let cells = Arc::new(Mutex::new(vec![0usize; 25]));
        let mut registry = PollerRegistry::new();

        let on_success = cells.clone();
        let on_reset = cells.clone();
        registry
            .register(
                AggregateId::Grid,
                PollerConfig::new(
                    secs(60.0),
                    counting_fetch(secs(5.0), calls.clone(), in_flight, max),
                )
                .on_success(move |call| *on_success.lock().unwrap() = vec![call; 25])
                .on_reset(move || *on_reset.lock().unwrap() = vec![0; 25]),
            )
            .unwrap();

        sleep(secs(6.0)).await;
        assert_eq!(*cells.lock().unwrap(), vec![1; 25]);

        // Fetch #2 starts at 6 and would land at 11.
        registry.force_refresh(AggregateId::Grid).unwrap();
        sleep(secs(1.0)).await;

        registry.on_round_transition();
        assert_eq!(*cells.lock().unwrap(), vec![0; 25]);

        // #2 resolves at 11 and is dropped; #3 follows and lands at 16.
        sleep(secs(5.0)).await;
        assert_eq!(*cells.lock().unwrap(), vec![0; 25]);
        sleep(secs(5.0)).await;
        assert_eq!(*cells.lock().unwrap(), vec![3; 25]);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transition_leaves_other_aggregates_alone() {
        let (calls, in_flight, max) = counters();
        let resets = Arc::new(AtomicUsize::new(0));
        let mut registry = PollerRegistry::new();
        registry
            .register(
                AggregateId::PrimaryBalance,
                PollerConfig::new(
                    secs(60.0),
                    counting_fetch(secs(0.1), calls.clone(), in_flight, max),
                ),
            )
            .unwrap();
        let counter = resets.clone();
        registry
            .register(
                AggregateId::Grid,
                PollerConfig::new(secs(60.0), || async { Ok(()) }).on_reset(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        sleep(secs(1.0)).await;
        registry.on_round_transition();
        sleep(secs(1.0)).await;
        assert_eq!(resets.load(Ordering::SeqCst), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_and_timeouts_keep_polling() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let mut registry = PollerRegistry::new();
        let mut call = 0;
        registry
            .register(
                AggregateId::RewardBalance,
                PollerConfig::new(secs(10.0), move || {
                    call += 1;
                    let slow = call == 1;
                    async move {
                        if slow {
                            sleep(secs(30.0)).await;
                        }
                        Err::<(), _>(ClientError::RateLimited)
                    }
                })
                .timeout(secs(2.0))
                .on_error(move |err| sink.lock().unwrap().push(err)),
            )
            .unwrap();

        sleep(secs(15.0)).await;
        let errors = errors.lock().unwrap().clone();
        assert_eq!(errors, vec![ClientError::Timeout(secs(2.0)), ClientError::RateLimited]);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_callbacks_after_shutdown() {
        let (calls, in_flight, max) = counters();
        let delivered = Arc::new(AtomicUsize::new(0));
        let sink = delivered.clone();
        let mut registry = PollerRegistry::new();
        registry
            .register(
                AggregateId::Automation,
                PollerConfig::new(
                    secs(1.0),
                    counting_fetch(secs(5.0), calls.clone(), in_flight, max),
                )
                .on_success(move |_| {
                    sink.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        sleep(secs(1.0)).await;
        let handle = registry.refresh_handle();
        registry.shutdown().await;
        sleep(secs(20.0)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
        assert_eq!(handle.force_refresh(AggregateId::Automation), Err(RegistryError::Closed));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_config() {
        let mut registry = PollerRegistry::new();
        let fetch = || async { Ok(()) };
        registry
            .register(AggregateId::Grid, PollerConfig::new(secs(5.0), fetch))
            .unwrap();
        assert_eq!(
            registry.register(AggregateId::Grid, PollerConfig::new(secs(5.0), fetch)),
            Err(RegistryError::Duplicate(AggregateId::Grid))
        );
        assert_eq!(
            registry.register(AggregateId::GameState, PollerConfig::new(Duration::ZERO, fetch)),
            Err(RegistryError::ZeroInterval(AggregateId::GameState))
        );
    }
}
