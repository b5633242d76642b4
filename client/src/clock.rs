use std::future::Future;

use motherlode_api::prelude::*;

use crate::{error::ClientError, time::TimeSource};

/// A round snapshot with the local times the read was sent and answered.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimedSnapshot {
    pub snapshot: RoundSnapshot,
    pub sent_at: f64,
    pub received_at: f64,
}

impl TimedSnapshot {
    /// One-way latency, estimated as half the round trip.
    pub fn latency(&self) -> f64 {
        ((self.received_at - self.sent_at) / 2.0).max(0.0)
    }
}

/// Runs `fetch`, stamping it with local send and receive times.
pub async fn timed_fetch<T, Fut>(time: &T, fetch: Fut) -> Result<TimedSnapshot, ClientError>
where
    T: TimeSource + ?Sized,
    Fut: Future<Output = Result<RoundSnapshot, ClientError>>,
{
    let sent_at = time.now();
    let snapshot = fetch.await?;
    let received_at = time.now();
    Ok(TimedSnapshot {
        snapshot,
        sent_at,
        received_at,
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundTransition {
    pub from: u64,
    pub to: u64,
}

/// Outcome of one authoritative read.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncReport {
    /// The snapshot the clock now ticks from. Unchanged on failure.
    pub snapshot: RoundSnapshot,
    pub transition: Option<RoundTransition>,
    /// Local estimate minus reported remaining time, in seconds. `None` when
    /// the read calibrated the clock from scratch or failed.
    pub drift: Option<f64>,
    pub recalibrated: bool,
    pub error: Option<ClientError>,
    pub stale: bool,
}

/// Countdown value for display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RemainingTime {
    pub round: u64,
    pub remaining: u64,
    pub ended: bool,
    /// Set once authoritative reads have failed repeatedly.
    pub stale: bool,
}

/// Local countdown reconciled against periodic authoritative reads.
///
/// Between reads the countdown is computed purely from the local clock and
/// the stored offset (authoritative time minus local time), so it only ever
/// moves down. A read that disagrees with the local estimate by more than the
/// drift threshold resets the offset. A read reporting a different round
/// resets the tick basis immediately and reports a [`RoundTransition`].
///
/// Failed reads never disturb the countdown. After `stale_after` failures in
/// a row [`RemainingTime::stale`] is set until the next good read.
#[derive(Debug)]
pub struct RoundClock<T> {
    time: T,
    snapshot: RoundSnapshot,
    offset: Option<f64>,
    last_drift: Option<f64>,
    last_round: Option<u64>,
    consecutive_failures: u32,
    stale_after: u32,
    drift_threshold: f64,
}

impl<T: TimeSource> RoundClock<T> {
    pub fn new(time: T, drift_threshold: f64, stale_after: u32) -> Self {
        Self {
            time,
            snapshot: RoundSnapshot::FALLBACK,
            offset: None,
            last_drift: None,
            last_round: None,
            consecutive_failures: 0,
            stale_after: stale_after.max(1),
            drift_threshold,
        }
    }

    /// Whether the next read is the initial calibration.
    pub fn is_initial(&self) -> bool {
        self.offset.is_none()
    }

    pub fn offset(&self) -> Option<f64> {
        self.offset
    }

    pub fn last_drift(&self) -> Option<f64> {
        self.last_drift
    }

    /// Last good snapshot, or [`RoundSnapshot::FALLBACK`] before the first.
    pub fn snapshot(&self) -> &RoundSnapshot {
        &self.snapshot
    }

    /// Last round observed from the contract. `None` until a read succeeds.
    pub fn current_round(&self) -> Option<u64> {
        self.last_round
    }

    pub fn is_stale(&self) -> bool {
        self.consecutive_failures >= self.stale_after
    }

    /// Performs one authoritative read through `fetch` and applies it.
    pub async fn sync<Fut>(&mut self, fetch: Fut) -> SyncReport
    where
        Fut: Future<Output = Result<RoundSnapshot, ClientError>>,
    {
        let result = timed_fetch(&self.time, fetch).await;
        self.apply(result)
    }

    /// Applies the outcome of a read made with [`timed_fetch`].
    pub fn apply(&mut self, result: Result<TimedSnapshot, ClientError>) -> SyncReport {
        let timed = match result {
            Ok(timed) => timed,
            Err(err) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if self.consecutive_failures == self.stale_after {
                    tracing::warn!(
                        failures = self.consecutive_failures,
                        %err,
                        "round status unavailable, countdown is stale"
                    );
                } else {
                    tracing::debug!(%err, "round sync failed, keeping last snapshot");
                }
                return SyncReport {
                    snapshot: self.snapshot,
                    transition: None,
                    drift: None,
                    recalibrated: false,
                    error: Some(err),
                    stale: self.is_stale(),
                };
            }
        };

        self.consecutive_failures = 0;
        let snapshot = timed.snapshot;

        let transition = match self.last_round {
            Some(from) if from != snapshot.round => Some(RoundTransition {
                from,
                to: snapshot.round,
            }),
            _ => None,
        };
        self.last_round = Some(snapshot.round);
        self.snapshot = snapshot;

        let (drift, recalibrated) = match self.offset {
            Some(offset) if transition.is_none() => {
                let candidate = remaining_at(&snapshot, timed.received_at, offset);
                let drift = candidate as f64 - snapshot.reported_remaining as f64;
                if drift.abs() > self.drift_threshold {
                    tracing::warn!(
                        drift,
                        round = snapshot.round,
                        "countdown drifted, recalibrating"
                    );
                    self.calibrate(&timed);
                    (Some(drift), true)
                } else {
                    (Some(drift), false)
                }
            }
            _ => {
                if let Some(t) = transition {
                    tracing::info!(from = t.from, to = t.to, "round transition");
                }
                self.calibrate(&timed);
                (None, true)
            }
        };
        self.last_drift = drift;

        SyncReport {
            snapshot,
            transition,
            drift,
            recalibrated,
            error: None,
            stale: false,
        }
    }

    fn calibrate(&mut self, timed: &TimedSnapshot) {
        let estimated_local = timed.received_at - timed.latency();
        let offset = timed.snapshot.authoritative_time() - estimated_local;
        tracing::debug!(offset, latency = timed.latency(), "clock calibrated");
        self.offset = Some(offset);
    }

    /// Local countdown. Never touches the network.
    pub fn tick(&self) -> RemainingTime {
        let now = self.time.now();
        let remaining = remaining_at(&self.snapshot, now, self.offset.unwrap_or(0.0));
        RemainingTime {
            round: self.snapshot.round,
            remaining,
            ended: remaining == 0 || self.snapshot.ended,
            stale: self.is_stale(),
        }
    }
}

fn remaining_at(snapshot: &RoundSnapshot, local: f64, offset: f64) -> u64 {
    (snapshot.round_end as f64 - (local + offset)).max(0.0).floor() as u64
}
