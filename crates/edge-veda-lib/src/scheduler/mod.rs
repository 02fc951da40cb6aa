//! Priority task scheduler with budget enforcement
//!
//! Admits caller-supplied task bodies in priority order, records how long
//! each one ran, calibrates an adaptive budget once enough samples exist and
//! reports budget violations to registered listeners. Enforcement is
//! advisory: a violation never stops a task from running.

mod queue;


pub use queue::{QueueEntry, TaskQueue};

use crate::budget::{
    evaluate_constraints, BudgetLimits, BudgetViolation, ConstraintReadings, EdgeVedaBudget,
    MeasuredBaseline,
};
use crate::error::TaskError;
use crate::listeners::{dispatch, Listener, ListenerId, ListenerRegistry};
use crate::models::{QueueStatus, TaskHandle, TaskId, TaskPriority, TaskStatus, Workload};
use crate::observability::{RuntimeMetrics, StructuredLogger};
use crate::tracker::Trackers;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Latency samples required before the baseline is measured
pub const DEFAULT_WARMUP_THRESHOLD: usize = 20;

/// Task bodies allowed to run at the same time
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 1;

/// Decides whether a violation was acted upon; returns true when mitigated
pub type MitigationHandler = Arc<dyn Fn(&BudgetViolation) -> bool + Send + Sync>;

/// Configuration for the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Latency samples needed to complete warm-up
    pub warmup_threshold: usize,
    /// Upper bound on concurrently running task bodies
    pub max_concurrent_tasks: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            warmup_threshold: DEFAULT_WARMUP_THRESHOLD,
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
        }
    }
}

struct SchedulerState {
    queue: TaskQueue<oneshot::Sender<()>>,
    tasks: HashMap<TaskId, TaskHandle>,
    running: usize,
    completed: u64,
    failed: u64,
    cancelled: u64,
    /// Budget as declared by the caller
    budget: Option<EdgeVedaBudget>,
    /// Concrete limits checked after every task
    working: Option<BudgetLimits>,
    warmup_complete: bool,
    baseline: Option<MeasuredBaseline>,
    listeners: ListenerRegistry<BudgetViolation>,
    mitigation_handler: Option<MitigationHandler>,
    workloads: HashMap<Workload, TaskPriority>,
}

impl SchedulerState {
    fn new() -> Self {
        Self {
            queue: TaskQueue::new(),
            tasks: HashMap::new(),
            running: 0,
            completed: 0,
            failed: 0,
            cancelled: 0,
            budget: None,
            working: None,
            warmup_complete: false,
            baseline: None,
            listeners: ListenerRegistry::new(),
            mitigation_handler: None,
            workloads: HashMap::new(),
        }
    }

    /// Move a task to a terminal status and forget it
    fn retire(&mut self, id: TaskId, status: TaskStatus) {
        self.tasks.remove(&id);
        match status {
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
            TaskStatus::Queued | TaskStatus::Running => {}
        }
    }
}

/// Orchestrates task admission, latency recording and budget checks
pub struct Scheduler {
    config: SchedulerConfig,
    trackers: Trackers,
    next_id: AtomicU64,
    state: Mutex<SchedulerState>,
    metrics: RuntimeMetrics,
    logger: StructuredLogger,
}

/// Undoes admission bookkeeping if the task future is dropped early
struct TaskGuard<'a> {
    scheduler: &'a Scheduler,
    id: TaskId,
    armed: bool,
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.scheduler.abandon(self.id);
        }
    }
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, trackers: Trackers) -> Self {
        Self::with_logger(config, trackers, StructuredLogger::new("local"))
    }

    pub fn with_logger(
        mut config: SchedulerConfig,
        trackers: Trackers,
        logger: StructuredLogger,
    ) -> Self {
        // The window can never hold more samples than its capacity
        let window = trackers.latency.window_size();
        if config.warmup_threshold > window {
            warn!(
                warmup_threshold = config.warmup_threshold,
                latency_window = window,
                "Warm-up threshold exceeds latency window, clamping"
            );
            config.warmup_threshold = window;
        }
        config.max_concurrent_tasks = config.max_concurrent_tasks.max(1);

        Self {
            config,
            trackers,
            next_id: AtomicU64::new(1),
            state: Mutex::new(SchedulerState::new()),
            metrics: RuntimeMetrics::new(),
            logger,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn trackers(&self) -> &Trackers {
        &self.trackers
    }

    /// Run `body` once an execution slot is free, in priority order.
    ///
    /// The body's own error comes back as [`TaskError::Failed`]. A task
    /// removed by [`cancel_task`](Self::cancel_task) while still queued
    /// resolves to [`TaskError::Cancelled`]. Dropping the returned future
    /// cancels the task wherever it is.
    pub async fn schedule_task<T, E, F, Fut>(
        &self,
        priority: TaskPriority,
        workload: Workload,
        body: F,
    ) -> Result<T, TaskError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let permit = {
            let mut state = self.lock();
            let (tx, rx) = oneshot::channel();
            state.tasks.insert(
                id,
                TaskHandle {
                    id,
                    priority,
                    workload,
                    status: TaskStatus::Queued,
                },
            );
            state.queue.push(id, priority, workload, tx);
            self.pump(&mut state);
            rx
        };
        self.logger.log_task_admitted(id, priority, workload);

        let mut guard = TaskGuard {
            scheduler: self,
            id,
            armed: true,
        };

        if permit.await.is_err() {
            // Sender dropped: cancelled while queued
            guard.armed = false;
            return Err(TaskError::Cancelled);
        }

        self.check_budget_constraints().await;

        let started = Instant::now();
        let outcome = body().await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(value) => {
                let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
                self.trackers.latency.record(elapsed_ms);
                self.finish(id, TaskStatus::Completed);
                guard.armed = false;

                self.metrics.observe_task_latency(elapsed.as_secs_f64());
                self.metrics.set_latency_p95(self.trackers.latency.p95());
                self.logger
                    .log_task_finished(id, TaskStatus::Completed, Some(elapsed_ms));

                if self.maybe_calibrate().await {
                    self.check_budget_constraints().await;
                }
                Ok(value)
            }
            Err(e) => {
                self.finish(id, TaskStatus::Failed);
                guard.armed = false;
                self.logger.log_task_finished(id, TaskStatus::Failed, None);
                Err(TaskError::Failed(e))
            }
        }
    }

    /// Hand free execution slots to the highest-priority waiters
    fn pump(&self, state: &mut SchedulerState) {
        while state.running < self.config.max_concurrent_tasks {
            let Some(entry) = state.queue.pop() else {
                break;
            };
            if entry.payload.send(()).is_ok() {
                state.running += 1;
                if let Some(handle) = state.tasks.get_mut(&entry.id) {
                    handle.status = TaskStatus::Running;
                }
            } else {
                state.retire(entry.id, TaskStatus::Cancelled);
                self.metrics.inc_task_outcome(TaskStatus::Cancelled);
            }
        }
        self.metrics.set_queue_depth(state.queue.len());
    }

    /// Release the slot of a running task
    fn finish(&self, id: TaskId, status: TaskStatus) {
        let mut state = self.lock();
        state.running = state.running.saturating_sub(1);
        state.retire(id, status);
        self.metrics.inc_task_outcome(status);
        self.pump(&mut state);
    }

    /// Bookkeeping for a task whose future was dropped
    fn abandon(&self, id: TaskId) {
        let mut state = self.lock();
        let status = match state.tasks.get(&id) {
            Some(handle) => handle.status,
            None => return,
        };
        match status {
            TaskStatus::Queued => {
                state.queue.remove(id);
            }
            TaskStatus::Running => {
                state.running = state.running.saturating_sub(1);
            }
            _ => return,
        }
        state.retire(id, TaskStatus::Cancelled);
        self.metrics.inc_task_outcome(TaskStatus::Cancelled);
        self.pump(&mut state);
        drop(state);
        self.logger
            .log_task_finished(id, TaskStatus::Cancelled, None);
    }

    /// Cancel a task that has not started yet.
    ///
    /// Returns false for unknown, running or finished tasks.
    pub fn cancel_task(&self, id: TaskId) -> bool {
        let mut state = self.lock();
        if state.queue.remove(id).is_none() {
            return false;
        }
        state.retire(id, TaskStatus::Cancelled);
        self.metrics.inc_task_outcome(TaskStatus::Cancelled);
        self.metrics.set_queue_depth(state.queue.len());
        drop(state);
        self.logger
            .log_task_finished(id, TaskStatus::Cancelled, None);
        true
    }

    /// Point-in-time counts by priority and lifecycle stage
    pub fn queue_status(&self) -> QueueStatus {
        let state = self.lock();
        QueueStatus {
            queued: state.queue.len(),
            running: state.running,
            completed: state.completed,
            failed: state.failed,
            cancelled: state.cancelled,
            high_priority: state.queue.count_priority(TaskPriority::High),
            normal_priority: state.queue.count_priority(TaskPriority::Normal),
            low_priority: state.queue.count_priority(TaskPriority::Low),
        }
    }

    /// Tasks that are queued or running, oldest first
    pub fn active_tasks(&self) -> Vec<TaskHandle> {
        let mut tasks: Vec<TaskHandle> = self.lock().tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    /// Declare the budget to enforce.
    ///
    /// Explicit limits apply immediately. An adaptive profile is resolved
    /// right away when a baseline already exists, otherwise at warm-up.
    pub fn set_compute_budget(&self, budget: EdgeVedaBudget) {
        let working = {
            let mut state = self.lock();
            state.budget = Some(budget);
            state.working = match budget {
                EdgeVedaBudget::Explicit(limits) => Some(limits),
                EdgeVedaBudget::Adaptive { profile } => state
                    .baseline
                    .as_ref()
                    .and_then(|b| EdgeVedaBudget::resolve(profile, b).limits().copied()),
            };
            state.working
        };

        debug!(budget = ?budget, working = ?working, "Compute budget set");
        if let Some(limits) = working {
            self.logger
                .log_budget_warnings(&EdgeVedaBudget::Explicit(limits).validate());
        }
    }

    /// Stop enforcing any budget
    pub fn clear_compute_budget(&self) {
        let mut state = self.lock();
        state.budget = None;
        state.working = None;
    }

    /// The budget as declared, adaptive profiles unresolved
    pub fn compute_budget(&self) -> Option<EdgeVedaBudget> {
        self.lock().budget
    }

    /// The concrete limits currently enforced, if any
    pub fn working_budget(&self) -> Option<EdgeVedaBudget> {
        self.lock().working.map(EdgeVedaBudget::Explicit)
    }

    pub fn measured_baseline(&self) -> Option<MeasuredBaseline> {
        self.lock().baseline.clone()
    }

    pub fn is_warmup_complete(&self) -> bool {
        self.lock().warmup_complete
    }

    /// Register a listener for budget violations
    pub fn on_budget_violation<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&BudgetViolation) + Send + Sync + 'static,
    {
        let listener: Listener<BudgetViolation> = Arc::new(listener);
        self.lock().listeners.add(listener)
    }

    pub fn remove_violation_listener(&self, id: ListenerId) -> bool {
        self.lock().listeners.remove(id)
    }

    pub fn violation_listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Install the hook that acts on latency, battery and thermal breaches.
    ///
    /// Memory breaches never reach it.
    pub fn set_mitigation_handler<F>(&self, handler: F)
    where
        F: Fn(&BudgetViolation) -> bool + Send + Sync + 'static,
    {
        self.lock().mitigation_handler = Some(Arc::new(handler));
    }

    pub fn clear_mitigation_handler(&self) {
        self.lock().mitigation_handler = None;
    }

    /// Record which priority a logical workload should run at
    pub fn register_workload(&self, workload: Workload, priority: TaskPriority) {
        self.lock().workloads.insert(workload, priority);
    }

    pub fn registered_workloads(&self) -> HashMap<Workload, TaskPriority> {
        self.lock().workloads.clone()
    }

    /// Compare tracker readings with the working limits and notify
    /// listeners of every breach. No-op before warm-up completes.
    pub async fn check_budget_constraints(&self) -> Vec<BudgetViolation> {
        let limits = {
            let state = self.lock();
            if !state.warmup_complete {
                return Vec::new();
            }
            match state.working {
                Some(limits) => limits,
                None => return Vec::new(),
            }
        };

        let rss_mb = if limits.memory_ceiling_mb.is_some() {
            self.trackers.memory.current_rss_mb().await
        } else {
            self.trackers.memory.last_rss_mb()
        };
        let readings = ConstraintReadings {
            p95_latency_ms: self.trackers.latency.p95(),
            drain_per_ten_min: self.trackers.battery.current_drain_rate(),
            thermal_level: self.trackers.thermal.current_level(),
            rss_mb,
        };

        let mut violations = evaluate_constraints(&limits, &readings, Utc::now());
        if violations.is_empty() {
            return violations;
        }

        let (handler, listeners) = {
            let state = self.lock();
            (state.mitigation_handler.clone(), state.listeners.snapshot())
        };

        for violation in &mut violations {
            if !violation.observe_only {
                if let Some(handler) = &handler {
                    let mitigated = catch_unwind(AssertUnwindSafe(|| handler(&*violation)))
                        .unwrap_or_else(|_| {
                            warn!(
                                constraint = %violation.constraint,
                                "Mitigation handler panicked, violation left unmitigated"
                            );
                            false
                        });
                    violation.mitigated = mitigated;
                }
            }

            self.metrics.inc_violation(violation);
            self.logger.log_violation(violation);
            dispatch(&listeners, violation, "budget_violation");
        }

        violations
    }

    /// Measure the baseline once enough latency samples exist.
    ///
    /// Returns true only for the call that completed warm-up.
    async fn maybe_calibrate(&self) -> bool {
        if self.lock().warmup_complete
            || self.trackers.latency.sample_count() < self.config.warmup_threshold
        {
            return false;
        }

        let baseline = MeasuredBaseline {
            measured_p95_ms: self.trackers.latency.p95(),
            measured_drain_per_ten_min: self.trackers.battery.average_drain_rate(),
            current_thermal_state: self.trackers.thermal.current_level(),
            current_rss_mb: self.trackers.memory.current_rss_mb().await,
            sample_count: self.trackers.latency.sample_count(),
            measured_at: Utc::now(),
        };

        let (profile, working) = {
            let mut state = self.lock();
            if state.warmup_complete {
                return false;
            }
            state.warmup_complete = true;
            let profile = state.budget.and_then(|b| b.profile());
            if let Some(profile) = profile {
                state.working = EdgeVedaBudget::resolve(profile, &baseline)
                    .limits()
                    .copied();
            }
            state.baseline = Some(baseline.clone());
            (profile, state.working)
        };

        self.logger
            .log_calibration(&baseline, profile, working.as_ref().filter(|_| profile.is_some()));
        if let (Some(_), Some(limits)) = (profile, working) {
            self.logger
                .log_budget_warnings(&EdgeVedaBudget::Explicit(limits).validate());
        }
        true
    }
}
