//! The automation loop. Each cycle captures a snapshot, asks the oracle
//! for one step, executes it, and decides whether to continue. Circuit
//! breakers bound the damage a stuck page or an oscillating oracle can
//! do: a consecutive-failure ceiling, a hard cycle cap, and a repeated
//! step-signature window that forces an alternate action.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use ferret_common::model::{Action, ExecutionResult, Step};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::Driver;
use crate::executor::Executor;
use crate::observer::{Observer, ProgressEvent, SessionStatus};
use crate::oracle::{Oracle, OracleContext, OracleError, StepRecord};
use crate::snapshot;

pub const MAX_CYCLES: u32 = 20;
pub const FAILURE_CEILING: u32 = 5;
/// Oracle `done` verdicts before this many successful steps are treated
/// as premature and replaced with a verification pause.
pub const MIN_STEPS_BEFORE_DONE: u32 = 2;
/// Identical proposals needed before the oscillation breaker trips.
pub const SIGNATURE_WINDOW: usize = 3;
/// Step records shown back to the oracle.
pub const HISTORY_WINDOW: usize = 5;
pub const ORACLE_BACKOFF: Duration = Duration::from_secs(20);
pub const ORACLE_NODE_BUDGET: usize = 40;

const SIGNATURE_TARGET_LIMIT: usize = 40;
const CAPTURE_RETRY_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_cycles: u32,
    pub failure_ceiling: u32,
    pub min_steps_before_done: u32,
    pub signature_window: usize,
    pub history_window: usize,
    pub oracle_backoff: Duration,
    pub oracle_node_budget: usize,
    /// Attach a screenshot to every successful-step event.
    pub screenshots: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            max_cycles: MAX_CYCLES,
            failure_ceiling: FAILURE_CEILING,
            min_steps_before_done: MIN_STEPS_BEFORE_DONE,
            signature_window: SIGNATURE_WINDOW,
            history_window: HISTORY_WINDOW,
            oracle_backoff: ORACLE_BACKOFF,
            oracle_node_budget: ORACLE_NODE_BUDGET,
            screenshots: false,
        }
    }
}

/// Requests cancellation of a running agent. Dropping the handle never
/// aborts the session; only an explicit `cancel` does.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Fresh handle plus the receiver a loop watches. `Agent::new` wires
    /// this internally; transports use it to stand in for a live agent.
    pub fn pair() -> (CancelHandle, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, rx)
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentOutcome {
    pub status: SessionStatus,
    pub message: String,
    pub cycles: u32,
    pub successes: u32,
    pub failures: u32,
    pub history: Vec<StepRecord>,
}

impl AgentOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == SessionStatus::Done
    }
}

pub struct Agent {
    config: AgentConfig,
    executor: Executor,
    oracle: Box<dyn Oracle>,
    observer: Arc<dyn Observer>,
    stop: watch::Receiver<bool>,
    cycles: u32,
    successes: u32,
    failures: u32,
    history: Vec<StepRecord>,
    next_auto_id: u32,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        executor: Executor,
        oracle: Box<dyn Oracle>,
        observer: Arc<dyn Observer>,
    ) -> (Self, CancelHandle) {
        let (cancel, stop) = CancelHandle::pair();
        let agent = Agent {
            config,
            executor,
            oracle,
            observer,
            stop,
            cycles: 0,
            successes: 0,
            failures: 0,
            history: Vec::new(),
            next_auto_id: 1,
        };
        (agent, cancel)
    }

    /// Run one session to completion. The driver is owned for the whole
    /// session and closed best-effort on every exit path. Exactly one
    /// `done` or `failed` event is emitted, followed by a trailing
    /// `completed` notice.
    pub async fn run(mut self, mut driver: Box<dyn Driver>, goal: &str, url: &str) -> AgentOutcome {
        self.notify(SessionStatus::Starting, format!("Starting automation for: {goal}"))
            .await;

        let (status, message) = self.drive(driver.as_mut(), goal, url).await;
        self.notify(status, message.clone()).await;
        self.notify(
            SessionStatus::Completed,
            format!(
                "{}/{} steps succeeded over {} cycles",
                self.successes,
                self.successes + self.failures,
                self.cycles
            ),
        )
        .await;

        if let Err(e) = driver.close().await {
            debug!("driver close failed: {e}");
        }

        AgentOutcome {
            status,
            message,
            cycles: self.cycles,
            successes: self.successes,
            failures: self.failures,
            history: self.history,
        }
    }

    async fn drive(
        &mut self,
        driver: &mut dyn Driver,
        goal: &str,
        url: &str,
    ) -> (SessionStatus, String) {
        self.notify(SessionStatus::Navigating, format!("Opening {url}"))
            .await;
        if let Err(e) = driver.navigate(url).await {
            return (
                SessionStatus::Failed,
                format!("Initial navigation to {url} failed: {e}"),
            );
        }

        let mut last_url = url.to_string();
        let mut signatures: VecDeque<(Action, String)> = VecDeque::new();
        let mut consecutive_failures = 0u32;

        while self.cycles < self.config.max_cycles {
            if *self.stop.borrow() {
                return (SessionStatus::Failed, "Session cancelled".to_string());
            }
            self.cycles += 1;

            // ANALYZE
            self.notify(
                SessionStatus::Analyzing,
                format!("Cycle {}: analyzing page", self.cycles),
            )
            .await;
            let snap = match snapshot::capture(driver).await {
                Ok(snap) => snap,
                Err(e) => {
                    warn!("snapshot capture failed: {e}");
                    consecutive_failures += 1;
                    if consecutive_failures >= self.config.failure_ceiling {
                        return (
                            SessionStatus::Failed,
                            format!(
                                "Aborted after {consecutive_failures} consecutive failures: {e}"
                            ),
                        );
                    }
                    tokio::time::sleep(CAPTURE_RETRY_PAUSE).await;
                    continue;
                }
            };
            info!(
                "cycle {}: {} nodes at {}",
                self.cycles,
                snap.nodes.len(),
                snap.url
            );

            // Navigation is evidence of real progress.
            if snap.url != last_url {
                signatures.clear();
                last_url = snap.url.clone();
            }

            // RESOLVE_TARGET
            self.notify(SessionStatus::Planning, "Choosing the next step")
                .await;
            let ctx = OracleContext {
                goal: goal.to_string(),
                url: snap.url.clone(),
                nodes: snapshot::oracle_view(&snap, self.config.oracle_node_budget),
                history: self.recent_history(),
            };
            let mut step = match self.oracle.propose(&ctx).await {
                Ok(step) => step,
                Err(OracleError::RateLimited { retry_after }) => {
                    let backoff = retry_after
                        .map(Duration::from_secs)
                        .unwrap_or(self.config.oracle_backoff);
                    warn!("oracle rate limited, backing off {:?}", backoff);
                    self.notify(
                        SessionStatus::Planning,
                        format!("Rate limited, pausing {}s", backoff.as_secs()),
                    )
                    .await;
                    tokio::time::sleep(backoff).await;
                    self.placeholder_step("rate limited")
                }
                Err(e) => {
                    warn!("oracle unavailable, substituting a pause: {e}");
                    self.placeholder_step("oracle unavailable")
                }
            };

            if step.action == Action::Done {
                if self.successes >= self.config.min_steps_before_done {
                    return (
                        SessionStatus::Done,
                        step.value.unwrap_or_else(|| "goal reached".to_string()),
                    );
                }
                debug!(
                    "oracle answered done after {} successes, deferring",
                    self.successes
                );
                self.notify(
                    SessionStatus::Planning,
                    "Premature done verdict, verifying progress first",
                )
                .await;
                step = self.placeholder_step("verifying progress");
            }

            // Loop-cycle breaker: an oracle proposing the same signature
            // over and over gets overridden with a scroll.
            let sig = signature_of(&step);
            if oscillating(&signatures, &sig, self.config.signature_window) {
                warn!(
                    "loop detected on {:?} '{}', forcing a scroll",
                    sig.0, sig.1
                );
                self.notify(
                    SessionStatus::Planning,
                    format!("Loop detected on '{}', scrolling instead", step.target),
                )
                .await;
                step = self.forced_scroll_step();
                signatures.clear();
            } else {
                signatures.push_back(sig);
                while signatures.len() > self.config.signature_window {
                    signatures.pop_front();
                }
            }

            // EXECUTE
            self.observer
                .notify(
                    ProgressEvent::new(
                        SessionStatus::Executing,
                        format!("Step {}: {} {}", step.step_id, step.action, step.target),
                    )
                    .with_step(&step.step_id),
                )
                .await;
            let result = self.executor.run(driver, &step, &snap).await;

            // OBSERVE
            self.push_history(&step, &result);
            if result.ok {
                consecutive_failures = 0;
                self.successes += 1;
                let mut event = ProgressEvent::new(SessionStatus::StepSuccess, &result.message)
                    .with_step(&result.step_id);
                if self.config.screenshots {
                    if let Ok(png) = driver.screenshot().await {
                        event = event.with_screenshot(png);
                    }
                }
                self.observer.notify(event).await;
            } else {
                consecutive_failures += 1;
                self.failures += 1;
                self.observer
                    .notify(
                        ProgressEvent::new(SessionStatus::StepFailed, &result.message)
                            .with_step(&result.step_id),
                    )
                    .await;
                if consecutive_failures >= self.config.failure_ceiling {
                    return (
                        SessionStatus::Failed,
                        format!(
                            "Aborted after {consecutive_failures} consecutive step failures: {}",
                            result.message
                        ),
                    );
                }
            }
        }

        (
            SessionStatus::Failed,
            format!(
                "Cycle cap of {} reached without completing the goal",
                self.config.max_cycles
            ),
        )
    }

    fn recent_history(&self) -> Vec<StepRecord> {
        let start = self.history.len().saturating_sub(self.config.history_window);
        self.history[start..].to_vec()
    }

    fn push_history(&mut self, step: &Step, result: &ExecutionResult) {
        self.history.push(StepRecord {
            step_id: result.step_id.clone(),
            action: step.action,
            target: step.target.clone(),
            ok: result.ok,
            message: result.message.clone(),
        });
    }

    /// Safe stand-in step when the oracle cannot be consulted.
    fn placeholder_step(&mut self, note: &str) -> Step {
        let mut step = Step::new(self.auto_id(), Action::Wait, "");
        step.value = Some(note.to_string());
        step
    }

    fn forced_scroll_step(&mut self) -> Step {
        let mut step = Step::new(self.auto_id(), Action::Scroll, "page");
        step.value = Some("down".to_string());
        step
    }

    fn auto_id(&mut self) -> String {
        let id = format!("auto-{}", self.next_auto_id);
        self.next_auto_id += 1;
        id
    }

    async fn notify(&self, status: SessionStatus, message: impl Into<String>) {
        self.observer.notify(ProgressEvent::new(status, message)).await;
    }
}

fn signature_of(step: &Step) -> (Action, String) {
    let target: String = step
        .target
        .trim()
        .to_lowercase()
        .chars()
        .take(SIGNATURE_TARGET_LIMIT)
        .collect();
    (step.action, target)
}

fn oscillating(window: &VecDeque<(Action, String)>, sig: &(Action, String), span: usize) -> bool {
    window.len() >= span && window.iter().all(|s| s == sig)
}

/// Synchronous entry point: builds a runtime and drives the session to
/// completion on the calling thread.
pub fn run_goal_blocking(
    config: AgentConfig,
    executor: Executor,
    oracle: Box<dyn Oracle>,
    observer: Arc<dyn Observer>,
    driver: Box<dyn Driver>,
    goal: &str,
    url: &str,
) -> std::io::Result<AgentOutcome> {
    let runtime = tokio::runtime::Runtime::new()?;
    let (agent, _cancel) = Agent::new(config, executor, oracle, observer);
    Ok(runtime.block_on(agent.run(driver, goal, url)))
}
