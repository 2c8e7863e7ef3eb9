//! Low-latency scheduler: ordered per-core task lists run on domain wakes.
//!
//! Each core has one list, ordered by priority (0 runs first, equal
//! priorities first-come-first-served), unless a task was placed explicitly
//! before or after another one. On every wake of the core's worker, due tasks
//! run in list order. The scheduler lock is released while a task runs, so
//! tasks may be scheduled or cancelled from inside a running task.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::domain::{Handler, RegistrationId, SchedulingDomain};
use crate::{Result, SchedError};

/// What a task wants after running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Run again next period.
    Reschedule,
    /// Remove from the scheduler.
    Completed,
}

/// Periodic work run by the [`LlScheduler`].
pub trait Task: Send {
    /// Runs one period's work.
    fn run(&mut self) -> TaskState;

    /// Name for log lines.
    fn name(&self) -> &str {
        "task"
    }
}

/// Handle for a scheduled task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

struct Entry {
    id: TaskId,
    priority: u32,
    period_us: u32,
    deadline: Instant,
    /// `None` while the task is running.
    task: Option<Box<dyn Task>>,
}

struct CoreQueue {
    tasks: Vec<Entry>,
    registration: RegistrationId,
    period_us: u32,
}

impl CoreQueue {
    fn min_period(&self) -> Option<u32> {
        self.tasks.iter().map(|e| e.period_us).min()
    }

    fn position(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|e| e.id == id)
    }
}

#[derive(Default)]
struct LlState {
    cores: BTreeMap<u32, CoreQueue>,
    next_id: u64,
}

impl LlState {
    fn core_of(&self, id: TaskId) -> Option<u32> {
        self.cores
            .iter()
            .find(|(_, q)| q.position(id).is_some())
            .map(|(core, _)| *core)
    }
}

enum Placement {
    ByPriority,
    Before(TaskId),
    After(TaskId),
}

struct LlShared {
    domain: Arc<SchedulingDomain>,
    state: Mutex<LlState>,
}

/// Ordered per-core task lists driven by a [`SchedulingDomain`].
pub struct LlScheduler {
    shared: Arc<LlShared>,
}

impl LlScheduler {
    /// Creates a scheduler on `domain`. Nothing is registered until the first
    /// task is scheduled.
    pub fn new(domain: Arc<SchedulingDomain>) -> Self {
        Self {
            shared: Arc::new(LlShared {
                domain,
                state: Mutex::new(LlState::default()),
            }),
        }
    }

    /// The domain this scheduler registers with.
    pub fn domain(&self) -> &Arc<SchedulingDomain> {
        &self.shared.domain
    }

    /// Queues `task` on `core` by priority, first run on the next wake.
    pub fn schedule(&self, core: u32, priority: u32, period_us: u32, task: Box<dyn Task>) -> Result<TaskId> {
        self.insert(Some(core), Placement::ByPriority, priority, period_us, task)
    }

    /// Queues `task` directly before `before`, on the same core.
    pub fn schedule_before(
        &self,
        before: TaskId,
        priority: u32,
        period_us: u32,
        task: Box<dyn Task>,
    ) -> Result<TaskId> {
        self.insert(None, Placement::Before(before), priority, period_us, task)
    }

    /// Queues `task` directly after `after`, on the same core.
    pub fn schedule_after(
        &self,
        after: TaskId,
        priority: u32,
        period_us: u32,
        task: Box<dyn Task>,
    ) -> Result<TaskId> {
        self.insert(None, Placement::After(after), priority, period_us, task)
    }

    fn insert(
        &self,
        core: Option<u32>,
        placement: Placement,
        priority: u32,
        period_us: u32,
        task: Box<dyn Task>,
    ) -> Result<TaskId> {
        if period_us == 0 {
            return Err(SchedError::InvalidPeriod(period_us));
        }
        let domain = &self.shared.domain;
        let mut state = self.shared.state.lock();

        let core = match (core, &placement) {
            (Some(core), _) => core,
            (None, Placement::Before(anchor) | Placement::After(anchor)) => {
                state.core_of(*anchor).ok_or(SchedError::TaskNotFound(*anchor))?
            }
            (None, Placement::ByPriority) => 0,
        };
        let cores = domain.config().cores;
        if core >= cores {
            return Err(SchedError::CoreOutOfRange { core, cores });
        }

        let id = TaskId(state.next_id);
        state.next_id += 1;
        let name = task.name().to_owned();
        let entry = Entry {
            id,
            priority,
            period_us,
            deadline: Instant::now(),
            task: Some(task),
        };

        if !state.cores.contains_key(&core) {
            let registration = domain.register(core, period_us, self.handler(core))?;
            state.cores.insert(
                core,
                CoreQueue {
                    tasks: Vec::new(),
                    registration,
                    period_us,
                },
            );
        }
        let Some(queue) = state.cores.get_mut(&core) else {
            return Err(SchedError::CoreOutOfRange { core, cores });
        };

        let index = match placement {
            Placement::ByPriority => queue
                .tasks
                .iter()
                .position(|e| priority < e.priority)
                .unwrap_or(queue.tasks.len()),
            Placement::Before(anchor) => queue.position(anchor).ok_or(SchedError::TaskNotFound(anchor))?,
            Placement::After(anchor) => queue.position(anchor).ok_or(SchedError::TaskNotFound(anchor))? + 1,
        };
        queue.tasks.insert(index, entry);

        if period_us < queue.period_us {
            domain.set_period(queue.registration, period_us)?;
            queue.period_us = period_us;
        }
        tracing::info!("ll: {id} '{name}' added on core {core}, priority {priority}, period {period_us} us");
        Ok(id)
    }

    fn handler(&self, core: u32) -> Handler {
        let weak: Weak<LlShared> = Arc::downgrade(&self.shared);
        Arc::new(move || {
            if let Some(shared) = weak.upgrade() {
                run_due(&shared, core);
            }
        })
    }

    /// Stops future runs of `id` and drops the task. A run in progress
    /// finishes first.
    pub fn cancel(&self, id: TaskId) -> Result<()> {
        self.remove(id).map(drop)
    }

    /// Removes `id` and hands the task back, or `None` if it is running right
    /// now (it is dropped once that run returns).
    pub fn free(&self, id: TaskId) -> Result<Option<Box<dyn Task>>> {
        self.remove(id)
    }

    fn remove(&self, id: TaskId) -> Result<Option<Box<dyn Task>>> {
        let mut state = self.shared.state.lock();
        let core = state.core_of(id).ok_or(SchedError::TaskNotFound(id))?;
        let (task, retire) = {
            let Some(queue) = state.cores.get_mut(&core) else {
                return Err(SchedError::TaskNotFound(id));
            };
            let Some(index) = queue.position(id) else {
                return Err(SchedError::TaskNotFound(id));
            };
            let entry = queue.tasks.remove(index);
            (entry.task, update_core_period(&self.shared.domain, queue))
        };
        let retired = if retire { state.cores.remove(&core) } else { None };
        drop(state);

        if let Some(queue) = retired {
            self.shared.domain.unregister(queue.registration)?;
        }
        tracing::info!("ll: {id} removed from core {core}");
        Ok(task)
    }

    /// True while `id` is queued (or running).
    pub fn contains(&self, id: TaskId) -> bool {
        self.shared.state.lock().core_of(id).is_some()
    }

    /// Tasks queued on `core`, in run order.
    pub fn tasks_on(&self, core: u32) -> Vec<TaskId> {
        self.shared
            .state
            .lock()
            .cores
            .get(&core)
            .map(|q| q.tasks.iter().map(|e| e.id).collect())
            .unwrap_or_default()
    }

    /// Total number of queued tasks.
    pub fn len(&self) -> usize {
        self.shared.state.lock().cores.values().map(|q| q.tasks.len()).sum()
    }

    /// True when no task is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every due task on `core` once, as a domain wake would.
    ///
    /// Returns the number of tasks run.
    pub fn run_due(&self, core: u32) -> usize {
        run_due(&self.shared, core)
    }

    /// Drops every task and releases every domain registration.
    pub fn shutdown(&self) {
        let retired = std::mem::take(&mut self.shared.state.lock().cores);
        for queue in retired.into_values() {
            let _ = self.shared.domain.unregister(queue.registration);
        }
    }
}

impl Drop for LlScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for LlScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        let mut map = f.debug_map();
        for (core, queue) in &state.cores {
            map.entry(core, &queue.tasks.iter().map(|e| e.id).collect::<Vec<_>>());
        }
        map.finish()
    }
}

/// Re-arms the core registration at the new minimum period. Returns `true`
/// if the core has no tasks left and should be unregistered.
fn update_core_period(domain: &SchedulingDomain, queue: &mut CoreQueue) -> bool {
    let Some(min) = queue.min_period() else {
        return true;
    };
    if min != queue.period_us {
        if let Err(err) = domain.set_period(queue.registration, min) {
            tracing::error!("ll: core re-arm failed: {err}");
        }
        queue.period_us = min;
    }
    false
}

fn run_due(shared: &LlShared, core: u32) -> usize {
    let now = Instant::now();
    // Deadlines are only as precise as the domain tick.
    let horizon = now + Duration::from_micros(u64::from(shared.domain.config().tick_us));
    let mut ran: Vec<TaskId> = Vec::new();

    loop {
        // Pick the next due task that has not run this wake.
        let (id, mut task) = {
            let mut state = shared.state.lock();
            let Some(queue) = state.cores.get_mut(&core) else {
                break;
            };
            let next = queue
                .tasks
                .iter_mut()
                .find(|e| e.task.is_some() && e.deadline <= horizon && !ran.contains(&e.id));
            let Some(entry) = next else {
                break;
            };
            let Some(task) = entry.task.take() else {
                break;
            };
            (entry.id, task)
        };

        let outcome = task.run();
        ran.push(id);

        let mut state = shared.state.lock();
        let Some(queue) = state.cores.get_mut(&core) else {
            // Cancelled along with the whole core while running.
            continue;
        };
        let Some(index) = queue.position(id) else {
            tracing::debug!("ll: {id} '{}' cancelled while running", task.name());
            continue;
        };
        match outcome {
            TaskState::Reschedule => {
                let entry = &mut queue.tasks[index];
                let period = Duration::from_micros(u64::from(entry.period_us));
                entry.deadline += period;
                if entry.deadline <= now {
                    entry.deadline = now + period;
                }
                entry.task = Some(task);
            }
            TaskState::Completed => {
                queue.tasks.remove(index);
                tracing::info!("ll: {id} '{}' completed", task.name());
                if update_core_period(&shared.domain, queue) {
                    let retired = state.cores.remove(&core);
                    drop(state);
                    if let Some(queue) = retired {
                        let _ = shared.domain.unregister(queue.registration);
                    }
                }
            }
        }
    }

    let earliest = shared
        .state
        .lock()
        .cores
        .get(&core)
        .and_then(|q| q.tasks.iter().map(|e| e.deadline).min());
    if let Some(deadline) = earliest {
        shared.domain.domain_set(deadline);
    }
    ran.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SchedConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Logged {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        runs_left: usize,
    }

    impl Task for Logged {
        fn run(&mut self) -> TaskState {
            self.log.lock().push(self.name);
            self.runs_left = self.runs_left.saturating_sub(1);
            if self.runs_left == 0 {
                TaskState::Completed
            } else {
                TaskState::Reschedule
            }
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    fn logged(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>, runs: usize) -> Box<dyn Task> {
        Box::new(Logged {
            name,
            log: Arc::clone(log),
            runs_left: runs,
        })
    }

    /// Two-core scheduler for tests that call `run_due` by hand; their tasks
    /// use 10 s periods so the live timer never gets to them first.
    fn manual() -> LlScheduler {
        let domain = SchedulingDomain::new(SchedConfig {
            cores: 2,
            ..SchedConfig::default()
        })
        .unwrap();
        LlScheduler::new(Arc::new(domain))
    }

    #[test]
    fn priority_orders_the_list() {
        let ll = manual();
        let log = Arc::new(Mutex::new(Vec::new()));
        let low = ll.schedule(0, 5, 10_000_000, logged("low", &log, 10)).unwrap();
        let high = ll.schedule(0, 0, 10_000_000, logged("high", &log, 10)).unwrap();
        let mid = ll.schedule(0, 2, 10_000_000, logged("mid", &log, 10)).unwrap();
        assert_eq!(ll.tasks_on(0), [high, mid, low]);
    }

    #[test]
    fn before_and_after_place_relative_to_anchor() {
        let ll = manual();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = ll.schedule(1, 0, 10_000_000, logged("a", &log, 10)).unwrap();
        let b = ll.schedule_after(a, 9, 10_000_000, logged("b", &log, 10)).unwrap();
        let c = ll.schedule_before(a, 9, 10_000_000, logged("c", &log, 10)).unwrap();
        assert_eq!(ll.tasks_on(1), [c, a, b]);

        assert!(matches!(
            ll.schedule_after(TaskId(99), 0, 1000, logged("x", &log, 1)),
            Err(SchedError::TaskNotFound(TaskId(99)))
        ));
    }

    #[test]
    fn due_tasks_run_in_list_order_and_completed_ones_leave() {
        let ll = manual();
        let log = Arc::new(Mutex::new(Vec::new()));
        ll.schedule(0, 1, 10_000_000, logged("second", &log, 1)).unwrap();
        ll.schedule(0, 0, 10_000_000, logged("first", &log, 2)).unwrap();

        assert_eq!(ll.run_due(0), 2);
        assert_eq!(*log.lock(), ["first", "second"]);
        assert_eq!(ll.len(), 1);

        // Not due again for ten seconds.
        assert_eq!(ll.run_due(0), 0);
    }

    #[test]
    fn last_task_releases_the_core() {
        let ll = manual();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = ll.schedule(0, 0, 10_000_000, logged("a", &log, 5)).unwrap();
        assert_eq!(ll.domain().active_cores(), [0]);

        ll.cancel(a).unwrap();
        assert!(ll.is_empty());
        assert!(ll.domain().active_cores().is_empty());
        assert_eq!(ll.domain().armed_period(), None);
        assert!(matches!(ll.cancel(a), Err(SchedError::TaskNotFound(_))));
    }

    #[test]
    fn free_hands_back_idle_task() {
        let ll = manual();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = ll.schedule(0, 0, 10_000_000, logged("a", &log, 5)).unwrap();
        let mut task = ll.free(a).unwrap().unwrap();
        assert_eq!(task.name(), "a");
        assert_eq!(task.run(), TaskState::Reschedule);
    }

    #[test]
    fn core_period_tracks_minimum() {
        let ll = manual();
        let log = Arc::new(Mutex::new(Vec::new()));
        let slow = ll.schedule(0, 0, 5_000_000, logged("slow", &log, 10)).unwrap();
        let fast = ll.schedule(0, 0, 2_000_000, logged("fast", &log, 10)).unwrap();
        assert_eq!(ll.domain().armed_period(), Some(Duration::from_secs(2)));

        ll.cancel(fast).unwrap();
        assert_eq!(ll.domain().armed_period(), Some(Duration::from_secs(5)));
        ll.cancel(slow).unwrap();
        assert_eq!(ll.domain().armed_period(), None);
    }

    #[test]
    fn task_can_cancel_itself_while_running() {
        struct SelfCancel {
            ll: Weak<LlShared>,
            id: Arc<Mutex<Option<TaskId>>>,
            runs: Arc<AtomicUsize>,
        }

        impl Task for SelfCancel {
            fn run(&mut self) -> TaskState {
                self.runs.fetch_add(1, Ordering::Relaxed);
                if let (Some(shared), Some(id)) = (self.ll.upgrade(), *self.id.lock()) {
                    let mut state = shared.state.lock();
                    if let Some(queue) = state.cores.get_mut(&0) {
                        queue.tasks.retain(|e| e.id != id);
                    }
                }
                TaskState::Reschedule
            }
        }

        let ll = manual();
        let id = Arc::new(Mutex::new(None));
        let runs = Arc::new(AtomicUsize::new(0));
        let task = SelfCancel {
            ll: Arc::downgrade(&ll.shared),
            id: Arc::clone(&id),
            runs: Arc::clone(&runs),
        };
        *id.lock() = Some(ll.schedule(0, 0, 10_000_000, Box::new(task)).unwrap());

        assert_eq!(ll.run_due(0), 1);
        assert_eq!(runs.load(Ordering::Relaxed), 1);
        assert_eq!(ll.run_due(0), 0);
    }
}
