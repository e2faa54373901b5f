//! Periodic reconciliation of started matches against the match service
//!
//! Each sweep polls every tracked match without holding the registry lock,
//! decides what to do with it, and only then removes the marked matches and
//! finishes or abandons them. A poll failure leaves the match for the next
//! sweep.

use crate::config::AppConfig;
use crate::lobby::manager::{CallbackOutcome, LobbyManager};
use crate::match_service::MatchInfo;
use crate::matches::AbandonReason;
use crate::types::{MatchId, MatchStatus};
use crate::utils::{current_timestamp, random_jitter};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Timing of the watchdog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// Pause between sweeps
    pub interval: Duration,
    /// How long a match may stay `pending` before it is abandoned
    pub pending_grace: Duration,
    /// Upper bound of the random pause between two polls
    pub jitter_max_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            pending_grace: Duration::from_secs(120),
            jitter_max_ms: 300,
        }
    }
}

impl From<&AppConfig> for WatchdogConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            interval: config.watchdog_interval(),
            pending_grace: config.pending_grace(),
            jitter_max_ms: config.matchmaking.poll_jitter_max_ms,
        }
    }
}

/// What a single sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub polled: usize,
    pub abandoned: usize,
    pub finished: usize,
    pub poll_failures: usize,
}

enum Verdict {
    Abandon(AbandonReason),
    Finish(MatchInfo),
}

/// Background task evicting matches the match service gave up on
#[derive(Clone)]
pub struct TimeoutWatchdog {
    manager: LobbyManager,
    config: WatchdogConfig,
}

impl TimeoutWatchdog {
    pub fn new(manager: LobbyManager, config: WatchdogConfig) -> Self {
        Self { manager, config }
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    fn is_overdue(&self, started_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        (now - started_at)
            .to_std()
            .map(|age| age > self.config.pending_grace)
            .unwrap_or(false)
    }

    /// Run one sweep using the current time
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(current_timestamp()).await
    }

    /// Run one sweep, judging pending ages against `now`
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let timer = self.manager.metrics().start_timer();
        let started = self.manager.matches().started_matches().await;
        let client = self.manager.match_service();

        let mut report = SweepReport::default();
        let mut marked: Vec<(MatchId, Verdict)> = Vec::new();

        for (index, tracked) in started.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(random_jitter(self.config.jitter_max_ms)).await;
            }

            report.polled += 1;
            let poll_timer = self.manager.metrics().start_timer();
            let polled = client.get_match(&tracked.match_id).await;
            self.manager
                .metrics()
                .record_match_service_call("get_match", polled.is_ok(), poll_timer.stop());

            let info = match polled {
                Ok(info) => info,
                Err(e) => {
                    report.poll_failures += 1;
                    warn!("Failed to poll match {}: {}", tracked.match_id, e);
                    continue;
                }
            };

            let verdict = match info.status {
                MatchStatus::Cancelled => Some(Verdict::Abandon(AbandonReason::Cancelled)),
                MatchStatus::Pending if self.is_overdue(tracked.started_at, now) => {
                    Some(Verdict::Abandon(AbandonReason::PendingTimeout))
                }
                MatchStatus::Complete => Some(Verdict::Finish(info)),
                MatchStatus::Pending | MatchStatus::Running => {
                    if info.status != tracked.status {
                        self.manager
                            .matches()
                            .update_status(&tracked.match_id, info.status)
                            .await;
                    }
                    None
                }
            };

            if let Some(verdict) = verdict {
                marked.push((tracked.match_id.clone(), verdict));
            }
        }

        for (match_id, verdict) in marked {
            let Some(m) = self.manager.matches().remove(&match_id).await else {
                debug!("Match {} was already handled elsewhere", match_id);
                continue;
            };

            let outcome = match verdict {
                Verdict::Abandon(reason) => self.manager.abandon_match(m, reason).await,
                Verdict::Finish(info) => self.manager.finish_match(m, &info).await,
            };
            match outcome {
                CallbackOutcome::Abandoned => report.abandoned += 1,
                CallbackOutcome::Finished { .. } => report.finished += 1,
                CallbackOutcome::Failed { message } => {
                    error!("Watchdog could not reconcile match {}: {}", match_id, message)
                }
                other => debug!("Match {} ended up {}", match_id, other.as_str()),
            }
        }

        self.manager.metrics().record_sweep(timer.stop());
        if report.abandoned > 0 || report.finished > 0 {
            info!(
                "Watchdog sweep: polled {}, abandoned {}, finished {}, poll failures {}",
                report.polled, report.abandoned, report.finished, report.poll_failures
            );
        } else {
            debug!("Watchdog sweep: {:?}", report);
        }
        report
    }

    /// Sweep and retry stalled starts
    async fn reconcile(&self) {
        self.sweep().await;
        let restarted = self.manager.start_ready_lobbies().await;
        if restarted > 0 {
            info!("Started {} lobbies left waiting after a failed start", restarted);
        }
    }

    /// Sweep every interval until a shutdown signal arrives.
    ///
    /// A sweep in progress is interrupted by the signal.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            "Timeout watchdog started ({}s interval, {}s pending grace)",
            self.config.interval.as_secs(),
            self.config.pending_grace.as_secs()
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.recv() => break,
            }
            tokio::select! {
                _ = self.reconcile() => {}
                _ = shutdown.recv() => {
                    warn!("Timeout watchdog interrupted mid-sweep by shutdown");
                    break;
                }
            }
        }

        info!("Timeout watchdog stopped");
    }

    /// Spawn `run` on the runtime
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
