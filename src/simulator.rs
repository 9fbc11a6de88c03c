//! Stage simulator
//!
//! A cosmetic progress sequence with no ledger effect. The state machine
//! ([`StageMachine`]) and delay table ([`StagePlan`]) are pure; the timer-driven
//! runner ([`StageSimulator`]) only sleeps between transitions, so tests can
//! step the machine directly or run it under a paused clock.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::status::{StatusChannel, PROGRESS_ID, STAGE_ID};

/// Phase of the simulated workflow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    #[default]
    Idle,
    Eligibility,
    Routing,
    Bridging,
    Finalizing,
    Complete,
}

impl Stage {
    /// Stages entered by one run, in order
    pub const SEQUENCE: [Stage; 5] = [
        Stage::Eligibility,
        Stage::Routing,
        Stage::Bridging,
        Stage::Finalizing,
        Stage::Complete,
    ];

    /// Next stage, or `None` from the terminal stage
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Idle => Some(Stage::Eligibility),
            Stage::Eligibility => Some(Stage::Routing),
            Stage::Routing => Some(Stage::Bridging),
            Stage::Bridging => Some(Stage::Finalizing),
            Stage::Finalizing => Some(Stage::Complete),
            Stage::Complete => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Stage::Complete
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Eligibility => "eligibility",
            Stage::Routing => "routing",
            Stage::Bridging => "bridging",
            Stage::Finalizing => "finalizing",
            Stage::Complete => "complete",
        }
    }

    /// Status line shown while the stage is current
    pub fn message(self) -> &'static str {
        match self {
            Stage::Idle => "Idle",
            Stage::Eligibility => "Checking eligibility (simulated)…",
            Stage::Routing => "Routing (simulated)…",
            Stage::Bridging => "Bridging (simulated)…",
            Stage::Finalizing => "Finalizing (simulated)…",
            Stage::Complete => "Simulated workflow complete. No funds were moved.",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How long each stage stays current before the next transition
#[derive(Debug, Clone, PartialEq)]
pub struct StagePlan {
    pub eligibility: Duration,
    pub routing: Duration,
    /// Total bridging time, split into `bridging_step` sized sub-steps
    pub bridging: Duration,
    pub bridging_step: Duration,
    pub finalizing: Duration,
    /// Upper bound of random extra delay per stage
    pub jitter: Duration,
}

impl Default for StagePlan {
    fn default() -> Self {
        Self {
            eligibility: Duration::from_millis(1600),
            routing: Duration::from_millis(2200),
            bridging: Duration::from_millis(2400),
            bridging_step: Duration::from_millis(300),
            finalizing: Duration::from_millis(2000),
            jitter: Duration::ZERO,
        }
    }
}

impl StagePlan {
    /// Dwell time of `stage` before jitter
    pub fn dwell(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Eligibility => self.eligibility,
            Stage::Routing => self.routing,
            Stage::Bridging => self.bridging_step * self.progress_steps(),
            Stage::Finalizing => self.finalizing,
            Stage::Idle | Stage::Complete => Duration::ZERO,
        }
    }

    /// Number of progress notifications emitted during bridging
    pub fn progress_steps(&self) -> u32 {
        let step = self.bridging_step.as_millis().max(1);
        self.bridging.as_millis().div_ceil(step) as u32
    }

    /// Sum of all dwell times without jitter
    pub fn total(&self) -> Duration {
        Stage::SEQUENCE.iter().map(|s| self.dwell(*s)).sum()
    }

    fn jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        let ms = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        Duration::from_millis(ms)
    }
}

/// Forward-only stage machine
#[derive(Debug, Clone, Default)]
pub struct StageMachine {
    current: Stage,
}

impl StageMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    /// Reset to idle for a fresh invocation
    pub fn reset(&mut self) {
        self.current = Stage::Idle;
    }

    /// Move to the next stage. Returns `None` once complete.
    pub fn advance(&mut self) -> Option<Stage> {
        let next = self.current.next()?;
        self.current = next;
        Some(next)
    }
}

/// How a simulation run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationOutcome {
    Completed,
    Cancelled { at: Stage },
}

/// Timer-driven runner for the stage machine
#[derive(Debug, Clone, Default)]
pub struct StageSimulator {
    plan: StagePlan,
}

impl StageSimulator {
    pub fn new(plan: StagePlan) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    /// Run the full sequence, publishing each stage on `stage_tx`.
    ///
    /// Every sleep races `cancel`; once it fires nothing further is published.
    /// The cancellation check and the publish happen under the channel's
    /// write lock, so a run cancelled before a newer run resets to `Idle`
    /// can never write after that reset.
    pub async fn run(
        &self,
        stage_tx: &watch::Sender<Stage>,
        status: &StatusChannel,
        cancel: &CancellationToken,
    ) -> SimulationOutcome {
        if cancel.is_cancelled() {
            return SimulationOutcome::Cancelled { at: Stage::Idle };
        }

        let mut machine = StageMachine::new();
        if !publish(stage_tx, Stage::Idle, cancel) {
            return SimulationOutcome::Cancelled { at: Stage::Idle };
        }

        while let Some(stage) = machine.advance() {
            if !publish(stage_tx, stage, cancel) {
                return SimulationOutcome::Cancelled { at: stage };
            }
            info!("Simulated stage: {}", stage);

            if stage.is_terminal() {
                status.success(Some(STAGE_ID), stage.message());
                break;
            }

            status.loading(STAGE_ID, stage.message());

            let finished = if stage == Stage::Bridging {
                self.run_progress(status, cancel).await
            } else {
                sleep_or_cancel(self.plan.dwell(stage) + self.plan.jitter(), cancel).await
            };

            if !finished {
                debug!("Simulation cancelled during {}", stage);
                return SimulationOutcome::Cancelled { at: stage };
            }
        }

        SimulationOutcome::Completed
    }

    async fn run_progress(&self, status: &StatusChannel, cancel: &CancellationToken) -> bool {
        let steps = self.plan.progress_steps();
        for i in 0..steps {
            status.loading(PROGRESS_ID, format!("Processing {}/{}…", i + 1, steps));
            if !sleep_or_cancel(self.plan.bridging_step, cancel).await {
                return false;
            }
        }

        let extra = self.plan.jitter();
        if !extra.is_zero() && !sleep_or_cancel(extra, cancel).await {
            return false;
        }

        status.dismiss(PROGRESS_ID);
        true
    }
}

/// Publish `stage` unless `cancel` has fired. Returns `false` on cancellation.
fn publish(stage_tx: &watch::Sender<Stage>, stage: Stage, cancel: &CancellationToken) -> bool {
    let mut live = true;
    stage_tx.send_if_modified(|current| {
        if cancel.is_cancelled() {
            live = false;
            return false;
        }
        *current = stage;
        true
    });
    live
}

/// Sleep unless cancelled first. Returns `false` on cancellation.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
