//! Async tick loop
//!
//! [`drive`] ticks a [`BroadcastOrchestrator`] on a fixed cadence and streams
//! one [`TickReport`] per tick. Dropping the receiving end cancels the run and
//! aborts the broadcast.

use std::time::Duration;

use meshcast_logging::spans;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{Instrument, debug, info, info_span};

use crate::orchestrator::{BroadcastOrchestrator, BroadcastPhase};
use crate::types::DeliveryEvent;

/// Cadence and limits for [`drive`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveOptions {
    /// Delay between ticks; zero only yields to the runtime
    pub tick_interval: Duration,
    pub max_ticks: u64,
}

impl Default for DriveOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::ZERO,
            max_ticks: 1000,
        }
    }
}

/// Deliveries of one tick
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub step: u64,
    pub events: Vec<DeliveryEvent>,
}

/// How a [`drive`] run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    /// No session has anything left to relay
    Complete { ticks: u64 },
    /// Hit `max_ticks` before completing
    TickLimit { ticks: u64 },
    /// Report receiver dropped; the broadcast was aborted
    Aborted { ticks: u64 },
    /// Nothing to drive
    NotInitiated,
}

/// Tick `orchestrator` until it completes, hits the tick limit or the
/// receiver goes away
pub async fn drive(
    orchestrator: &mut BroadcastOrchestrator,
    options: DriveOptions,
    reports: mpsc::Sender<TickReport>,
) -> DriveOutcome {
    if orchestrator.phase() == BroadcastPhase::Idle {
        return DriveOutcome::NotInitiated;
    }

    let span = info_span!(
        spans::DRIVE_BROADCAST,
        origin = orchestrator.origin().map(|n| n.0),
        destination = orchestrator.destination().map(|n| n.0),
        strategy = %orchestrator.strategy()
    );

    async move {
        let mut cadence = (!options.tick_interval.is_zero()).then(|| {
            let mut cadence = interval(options.tick_interval);
            cadence.set_missed_tick_behavior(MissedTickBehavior::Delay);
            cadence
        });
        let mut ticks = 0;

        let outcome = loop {
            if orchestrator.is_complete() {
                break DriveOutcome::Complete { ticks };
            }
            if ticks >= options.max_ticks {
                break DriveOutcome::TickLimit { ticks };
            }

            match cadence.as_mut() {
                Some(cadence) => {
                    cadence.tick().await;
                }
                None => tokio::task::yield_now().await,
            }

            let events = orchestrator.tick();
            ticks += 1;
            let report = TickReport {
                step: orchestrator.step_count(),
                events,
            };
            if reports.send(report).await.is_err() {
                debug!(ticks, "Report receiver dropped");
                orchestrator.abort();
                break DriveOutcome::Aborted { ticks };
            }
        };

        info!(?outcome, "Drive finished");
        outcome
    }
    .instrument(span)
    .await
}
