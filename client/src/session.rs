use std::sync::{Arc, Mutex, MutexGuard};

use motherlode_api::prelude::*;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::{timed_fetch, RemainingTime, RoundClock, SyncReport, TimedSnapshot},
    config::ClientConfig,
    error::{ClientError, RegistryError},
    poller::{AggregateId, PollerConfig, PollerRegistry, RefreshHandle},
    rpc::RemoteStateClient,
    time::{SystemClock, TimeSource},
};

/// Refreshed right after a round transition, on top of the round-scoped grid.
const SETTLED_BY_ROUND_END: [AggregateId; 4] = [
    AggregateId::GameState,
    AggregateId::Motherlode,
    AggregateId::MinerStats,
    AggregateId::RewardBalance,
];

type SharedClock = Arc<Mutex<RoundClock<Arc<dyn TimeSource>>>>;

fn lock(clock: &SharedClock) -> MutexGuard<'_, RoundClock<Arc<dyn TimeSource>>> {
    clock.lock().unwrap_or_else(|e| e.into_inner())
}

/// Read side of a session. Cheap to clone; every field is a watch receiver
/// holding the latest value.
#[derive(Clone, Debug)]
pub struct SessionView {
    pub round: watch::Receiver<RemainingTime>,
    pub last_sync: watch::Receiver<Option<SyncReport>>,
    pub grid: watch::Receiver<Grid>,
    pub game_state: watch::Receiver<Option<GameState>>,
    pub motherlode: watch::Receiver<Amount>,
    pub primary_balance: watch::Receiver<Amount>,
    pub reward_balance: watch::Receiver<Amount>,
    pub miner_stats: watch::Receiver<MinerStats>,
    pub automation: watch::Receiver<Option<AutomationConfig>>,
}

struct Publishers {
    round: watch::Sender<RemainingTime>,
    last_sync: watch::Sender<Option<SyncReport>>,
    grid: watch::Sender<Grid>,
    game_state: watch::Sender<Option<GameState>>,
    motherlode: watch::Sender<Amount>,
    primary_balance: watch::Sender<Amount>,
    reward_balance: watch::Sender<Amount>,
    miner_stats: watch::Sender<MinerStats>,
    automation: watch::Sender<Option<AutomationConfig>>,
}

fn channels(initial: RemainingTime) -> (Publishers, SessionView) {
    let (round, round_rx) = watch::channel(initial);
    let (last_sync, last_sync_rx) = watch::channel(None);
    let (grid, grid_rx) = watch::channel(Grid::zeroed());
    let (game_state, game_state_rx) = watch::channel(None);
    let (motherlode, motherlode_rx) = watch::channel(Amount::ZERO);
    let (primary_balance, primary_balance_rx) = watch::channel(Amount::ZERO);
    let (reward_balance, reward_balance_rx) = watch::channel(Amount::ZERO);
    let (miner_stats, miner_stats_rx) = watch::channel(MinerStats::default());
    let (automation, automation_rx) = watch::channel(None);
    (
        Publishers {
            round,
            last_sync,
            grid,
            game_state,
            motherlode,
            primary_balance,
            reward_balance,
            miner_stats,
            automation,
        },
        SessionView {
            round: round_rx,
            last_sync: last_sync_rx,
            grid: grid_rx,
            game_state: game_state_rx,
            motherlode: motherlode_rx,
            primary_balance: primary_balance_rx,
            reward_balance: reward_balance_rx,
            miner_stats: miner_stats_rx,
            automation: automation_rx,
        },
    )
}

/// Live mirror of the game for one optional wallet.
///
/// Owns the round clock, a poller per aggregate and the one-second countdown
/// task. Everything stops on [`GameSession::shutdown`] or drop.
pub struct GameSession {
    registry: PollerRegistry,
    cancel: CancellationToken,
    ticker: Option<JoinHandle<()>>,
    clock: SharedClock,
    view: SessionView,
    wallet: Option<Address>,
}

impl GameSession {
    /// Starts polling with the system clock. Must run inside a tokio runtime.
    pub fn start(
        client: RemoteStateClient,
        config: &ClientConfig,
        wallet: Option<Address>,
    ) -> Result<Self, RegistryError> {
        Self::start_with_time(client, config, wallet, Arc::new(SystemClock::new()))
    }

    pub fn start_with_time(
        client: RemoteStateClient,
        config: &ClientConfig,
        wallet: Option<Address>,
        time: Arc<dyn TimeSource>,
    ) -> Result<Self, RegistryError> {
        let clock: SharedClock = Arc::new(Mutex::new(RoundClock::new(
            time.clone(),
            config.drift_threshold_secs,
            config.stale_after_failures,
        )));
        let (publish, view) = channels(lock(&clock).tick());
        let publish = Arc::new(publish);

        let mut registry = PollerRegistry::new();
        let refresh = registry.refresh_handle();
        let intervals = config.intervals;
        let timeout = config.request_timeout;

        {
            let client = client.clone();
            let on_success = RoundSync {
                clock: clock.clone(),
                publish: publish.clone(),
                refresh: refresh.clone(),
            };
            let on_error = on_success.clone();
            registry.register(
                AggregateId::RoundStatus,
                PollerConfig::new(intervals.round_sync, move || {
                    let client = client.clone();
                    let time = time.clone();
                    async move { timed_fetch(time.as_ref(), client.fetch_round_status()).await }
                })
                .timeout(timeout)
                .on_success(move |timed| on_success.apply(Ok(timed)))
                .on_error(move |err| on_error.apply(Err(err))),
            )?;
        }

        {
            let client = client.clone();
            let (on_success, on_reset) = (publish.clone(), publish.clone());
            registry.register(
                AggregateId::Grid,
                PollerConfig::new(intervals.grid, move || {
                    let client = client.clone();
                    async move { client.fetch_grid().await }
                })
                .timeout(timeout)
                .on_success(move |grid| {
                    on_success.grid.send_replace(grid);
                })
                .on_reset(move || {
                    on_reset.grid.send_replace(Grid::zeroed());
                }),
            )?;
        }

        {
            let client = client.clone();
            let publish = publish.clone();
            registry.register(
                AggregateId::GameState,
                PollerConfig::new(intervals.game_state, move || {
                    let client = client.clone();
                    async move { client.fetch_game_state().await }
                })
                .timeout(timeout)
                .on_success(move |state| {
                    publish.game_state.send_replace(Some(state));
                }),
            )?;
        }

        {
            let client = client.clone();
            let publish = publish.clone();
            registry.register(
                AggregateId::Motherlode,
                PollerConfig::new(intervals.motherlode, move || {
                    let client = client.clone();
                    async move { client.fetch_motherlode().await }
                })
                .timeout(timeout)
                .on_success(move |amount| {
                    publish.motherlode.send_replace(amount);
                }),
            )?;
        }

        if let Some(wallet) = wallet {
            register_wallet_pollers(&mut registry, &client, config, wallet, &publish)?;
        }

        let cancel = CancellationToken::new();
        let ticker = tokio::spawn(run_ticker(
            clock.clone(),
            publish,
            config.intervals.tick,
            cancel.clone(),
        ));

        tracing::info!(wallet = ?wallet, rpc = config.fullnode_url(), "session started");
        Ok(Self {
            registry,
            cancel,
            ticker: Some(ticker),
            clock,
            view,
            wallet,
        })
    }

    pub fn view(&self) -> SessionView {
        self.view.clone()
    }

    pub fn wallet(&self) -> Option<Address> {
        self.wallet
    }

    /// Current countdown, computed now.
    pub fn remaining(&self) -> RemainingTime {
        lock(&self.clock).tick()
    }

    pub fn clock_offset(&self) -> Option<f64> {
        lock(&self.clock).offset()
    }

    pub fn refresh_handle(&self) -> RefreshHandle {
        self.registry.refresh_handle()
    }

    pub fn force_refresh(&self, id: AggregateId) -> Result<(), RegistryError> {
        self.registry.force_refresh(id)
    }

    /// Cancels every poller and the countdown, then waits for them to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(ticker) = self.ticker.take() {
            if let Err(err) = ticker.await {
                if err.is_panic() {
                    tracing::error!(%err, "countdown task panicked");
                }
            }
        }
        std::mem::take(&mut self.registry).shutdown().await;
        tracing::info!("session stopped");
    }
}

impl Drop for GameSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn register_wallet_pollers(
    registry: &mut PollerRegistry,
    client: &RemoteStateClient,
    config: &ClientConfig,
    wallet: Address,
    publish: &Arc<Publishers>,
) -> Result<(), RegistryError> {
    let intervals = config.intervals;
    let timeout = config.request_timeout;

    let (c, p) = (client.clone(), publish.clone());
    registry.register(
        AggregateId::PrimaryBalance,
        PollerConfig::new(intervals.balances, move || {
            let client = c.clone();
            async move { client.fetch_primary_balance(wallet).await }
        })
        .timeout(timeout)
        .on_success(move |balance| {
            p.primary_balance.send_replace(balance);
        }),
    )?;

    let (c, p) = (client.clone(), publish.clone());
    registry.register(
        AggregateId::RewardBalance,
        PollerConfig::new(intervals.balances, move || {
            let client = c.clone();
            async move { client.fetch_reward_balance(wallet).await }
        })
        .timeout(timeout)
        .on_success(move |balance| {
            p.reward_balance.send_replace(balance);
        }),
    )?;

    let (c, p) = (client.clone(), publish.clone());
    registry.register(
        AggregateId::MinerStats,
        PollerConfig::new(intervals.miner_stats, move || {
            let client = c.clone();
            async move { client.fetch_miner_stats(wallet).await }
        })
        .timeout(timeout)
        .on_success(move |stats| {
            p.miner_stats.send_replace(stats);
        }),
    )?;

    let (c, p) = (client.clone(), publish.clone());
    registry.register(
        AggregateId::Automation,
        PollerConfig::new(intervals.automation, move || {
            let client = c.clone();
            async move { client.fetch_automation(wallet).await }
        })
        .timeout(timeout)
        .on_success(move |automation| {
            p.automation.send_replace(automation);
        }),
    )
}

/// Feeds round-status reads into the clock and fans out transitions.
#[derive(Clone)]
struct RoundSync {
    clock: SharedClock,
    publish: Arc<Publishers>,
    refresh: RefreshHandle,
}

impl RoundSync {
    fn apply(&self, result: Result<TimedSnapshot, ClientError>) {
        // Clock update and countdown publish happen under one lock.
        let (report, remaining) = {
            let mut clock = lock(&self.clock);
            let report = clock.apply(result);
            (report, clock.tick())
        };
        self.publish.round.send_replace(remaining);

        if report.transition.is_some() {
            self.refresh.round_transition();
            self.refresh.force_refresh_all(&SETTLED_BY_ROUND_END);
        }
        self.publish.last_sync.send_replace(Some(report));
    }
}

async fn run_ticker(
    clock: SharedClock,
    publish: Arc<Publishers>,
    period: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let remaining = lock(&clock).tick();
                publish.round.send_if_modified(|current| {
                    let changed = *current != remaining;
                    *current = remaining;
                    changed
                });
            }
        }
    }
}
