//! Scheduling domain: one periodic timer, one worker thread per core.
//!
//! The timer thread sleeps on a condition variable until the armed deadline,
//! then wakes every core that has a registered handler. Each core's worker
//! blocks on a channel, runs its handlers when woken and goes back to sleep.
//! A per-core pending flag keeps a still-running worker from being woken
//! twice; a wake that finds the flag set counts as an overrun.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Condvar, Mutex};

use crate::{Result, SchedError};

/// Work a core's worker runs on every wake.
pub type Handler = Arc<dyn Fn() + Send + Sync>;

/// Scheduling domain configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedConfig {
    /// Timer resolution in microseconds. Periods are rounded up to a multiple.
    pub tick_us: u32,
    /// Interrupt plus wake latency. [`SchedulingDomain::domain_set`] ignores
    /// requests that would move the deadline by less than this.
    pub sched_cost_us: u32,
    /// Number of cores (worker slots).
    pub cores: u32,
    /// Statistics are reported every `2^stats_window_log2` runs. Values
    /// above [`MAX_STATS_WINDOW_LOG2`] are clamped.
    pub stats_window_log2: u32,
}

/// Largest statistics window exponent.
pub const MAX_STATS_WINDOW_LOG2: u32 = 31;

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            tick_us: 100,
            sched_cost_us: 50,
            cores: 1,
            stats_window_log2: 10,
        }
    }
}

impl SchedConfig {
    /// `period_us` rounded up to the next whole tick.
    pub fn round_period(&self, period_us: u32) -> Duration {
        let tick = u64::from(self.tick_us.max(1));
        let ticks = u64::from(period_us).div_ceil(tick);
        Duration::from_micros(ticks * tick)
    }
}

/// Handle for one [`SchedulingDomain::register`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(pub u64);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegistrationId({})", self.0)
    }
}

/// Per-core worker statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreStats {
    /// Core index.
    pub core: u32,
    /// Wakes handled since the worker started.
    pub runs: u64,
    /// Timer wakes that arrived while the worker was still busy.
    pub overruns: u64,
    /// Average handler time over the last completed window.
    pub avg: Duration,
    /// Longest handler time since the worker started.
    pub max: Duration,
}

#[derive(Debug, Default)]
struct StatsWindow {
    stats: CoreStats,
    window_sum: Duration,
    window_max: Duration,
}

impl StatsWindow {
    fn record(&mut self, elapsed: Duration, window_log2: u32) {
        self.stats.runs += 1;
        self.stats.max = self.stats.max.max(elapsed);
        self.window_sum += elapsed;
        self.window_max = self.window_max.max(elapsed);

        let log2 = window_log2.min(MAX_STATS_WINDOW_LOG2);
        let mask = (1u64 << log2) - 1;
        if self.stats.runs & mask == 0 {
            self.stats.avg = self.window_sum / (1u32 << log2);
            tracing::info!(
                core = self.stats.core,
                avg_us = self.stats.avg.as_micros() as u64,
                max_us = self.window_max.as_micros() as u64,
                overruns = self.stats.overruns,
                "ll core timer stats"
            );
            self.window_sum = Duration::ZERO;
            self.window_max = Duration::ZERO;
        }
    }
}

/// State shared between a core's worker thread and the timer.
struct CoreSlot {
    handlers: Mutex<Vec<(RegistrationId, Handler)>>,
    pending: AtomicBool,
    exit: AtomicBool,
    stats: Mutex<StatsWindow>,
}

enum WorkerMsg {
    Wake,
    Exit,
}

struct Worker {
    slot: Arc<CoreSlot>,
    tx: Sender<WorkerMsg>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

struct Registration {
    core: u32,
    period: Duration,
}

#[derive(Default)]
struct DomainState {
    registrations: BTreeMap<RegistrationId, Registration>,
    workers: BTreeMap<u32, Worker>,
    armed: Option<Duration>,
    deadline: Option<Instant>,
    next_id: u64,
    shutdown: bool,
}

impl DomainState {
    fn min_period(&self) -> Option<Duration> {
        self.registrations.values().map(|r| r.period).min()
    }

    /// Re-arms the timer if the minimum period changed.
    fn rearm(&mut self) {
        let period = self.min_period();
        if period == self.armed {
            return;
        }
        self.armed = period;
        self.deadline = period.map(|p| Instant::now() + p);
        match period {
            Some(p) => tracing::info!("domain: timer armed at {} us", p.as_micros()),
            None => tracing::info!("domain: timer stopped"),
        }
    }

    /// Timer expiry: wake every core with handlers.
    fn fire(&mut self) {
        for (core, worker) in &self.workers {
            if worker.slot.pending.swap(true, Ordering::AcqRel) {
                worker.slot.stats.lock().stats.overruns += 1;
                tracing::trace!("domain: core {core} still busy");
                continue;
            }
            if worker.tx.send(WorkerMsg::Wake).is_err() {
                worker.slot.pending.store(false, Ordering::Release);
            }
        }
    }
}

struct Shared {
    config: SchedConfig,
    state: Mutex<DomainState>,
    timer_cv: Condvar,
}

/// One periodic timer shared by all cores.
///
/// Created with [`SchedulingDomain::new`], which starts the timer thread
/// disarmed. [`shutdown`](Self::shutdown) (also run on drop) stops the timer
/// and joins every worker.
pub struct SchedulingDomain {
    shared: Arc<Shared>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulingDomain {
    /// Creates a domain and starts its (disarmed) timer thread.
    pub fn new(config: SchedConfig) -> Result<Self> {
        if config.cores == 0 {
            return Err(SchedError::CoreOutOfRange { core: 0, cores: 0 });
        }
        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(DomainState::default()),
            timer_cv: Condvar::new(),
        });
        let timer_shared = Arc::clone(&shared);
        let timer = thread::Builder::new()
            .name("cadence-timer".into())
            .spawn(move || timer_loop(&timer_shared))?;
        tracing::debug!("domain: init, {} cores, tick {} us", config.cores, config.tick_us);
        Ok(Self {
            shared,
            timer: Mutex::new(Some(timer)),
        })
    }

    /// Domain configuration.
    pub fn config(&self) -> &SchedConfig {
        &self.shared.config
    }

    /// Registers `handler` to run on `core` and arms the timer to the minimum
    /// period across all registrations.
    ///
    /// The first registration on a core starts that core's worker, initially
    /// waiting for a wake.
    pub fn register(&self, core: u32, period_us: u32, handler: Handler) -> Result<RegistrationId> {
        let cores = self.shared.config.cores;
        if core >= cores {
            return Err(SchedError::CoreOutOfRange { core, cores });
        }
        if period_us == 0 {
            return Err(SchedError::InvalidPeriod(period_us));
        }

        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(SchedError::ShutDown);
        }
        let id = RegistrationId(state.next_id);
        state.next_id += 1;

        if let Some(worker) = state.workers.get(&core) {
            worker.slot.handlers.lock().push((id, handler));
        } else {
            let worker = spawn_worker(core, id, handler, self.shared.config.stats_window_log2)?;
            state.workers.insert(core, worker);
            tracing::info!("domain: core {core} worker started");
        }

        state.registrations.insert(
            id,
            Registration {
                core,
                period: self.shared.config.round_period(period_us),
            },
        );
        state.rearm();
        drop(state);
        self.shared.timer_cv.notify_one();
        tracing::debug!("domain: {id} on core {core}, period {period_us} us");
        Ok(id)
    }

    /// Changes the period of an existing registration and re-arms the timer
    /// if the minimum changed.
    pub fn set_period(&self, id: RegistrationId, period_us: u32) -> Result<()> {
        if period_us == 0 {
            return Err(SchedError::InvalidPeriod(period_us));
        }
        let mut state = self.shared.state.lock();
        let period = self.shared.config.round_period(period_us);
        let reg = state
            .registrations
            .get_mut(&id)
            .ok_or(SchedError::RegistrationNotFound(id))?;
        reg.period = period;
        state.rearm();
        drop(state);
        self.shared.timer_cv.notify_one();
        Ok(())
    }

    /// Removes a registration.
    ///
    /// If it was the last one on its core, the worker is torn down. If it was
    /// the last one overall, the timer stops. Safe to call from a handler.
    pub fn unregister(&self, id: RegistrationId) -> Result<()> {
        let mut state = self.shared.state.lock();
        let reg = state
            .registrations
            .remove(&id)
            .ok_or(SchedError::RegistrationNotFound(id))?;

        let idle = state.workers.get(&reg.core).is_some_and(|worker| {
            let mut handlers = worker.slot.handlers.lock();
            handlers.retain(|(rid, _)| *rid != id);
            handlers.is_empty()
        });
        let retired = if idle { state.workers.remove(&reg.core) } else { None };
        state.rearm();
        drop(state);
        self.shared.timer_cv.notify_one();

        if let Some(worker) = retired {
            tracing::info!("domain: core {} worker stopped", reg.core);
            stop_worker(worker);
        }
        tracing::debug!("domain: {id} unregistered");
        Ok(())
    }

    /// Requests a wake no later than `requested`.
    ///
    /// The timer is only re-armed if `requested` is earlier than the armed
    /// deadline by more than the scheduling cost, to avoid churn from
    /// near-simultaneous requests.
    pub fn domain_set(&self, requested: Instant) {
        let margin = Duration::from_micros(u64::from(self.shared.config.sched_cost_us));
        let mut state = self.shared.state.lock();
        let Some(deadline) = state.deadline else {
            return;
        };
        if requested + margin < deadline {
            state.deadline = Some(requested);
            drop(state);
            self.shared.timer_cv.notify_one();
            tracing::trace!("domain: re-armed early");
        }
    }

    /// Period the timer is currently armed at, `None` while stopped.
    pub fn armed_period(&self) -> Option<Duration> {
        self.shared.state.lock().armed
    }

    /// Next timer expiry, `None` while stopped.
    pub fn deadline(&self) -> Option<Instant> {
        self.shared.state.lock().deadline
    }

    /// Cores that currently have a worker.
    pub fn active_cores(&self) -> Vec<u32> {
        self.shared.state.lock().workers.keys().copied().collect()
    }

    /// Number of live registrations.
    pub fn registrations(&self) -> usize {
        self.shared.state.lock().registrations.len()
    }

    /// Statistics of every running worker, by core.
    pub fn stats(&self) -> Vec<CoreStats> {
        self.shared
            .state
            .lock()
            .workers
            .values()
            .map(|w| w.slot.stats.lock().stats)
            .collect()
    }

    /// Stops the timer, drops every registration and joins the workers.
    /// Idempotent.
    pub fn shutdown(&self) {
        let workers = {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            state.registrations.clear();
            state.armed = None;
            state.deadline = None;
            std::mem::take(&mut state.workers)
        };
        self.shared.timer_cv.notify_all();
        for worker in workers.into_values() {
            stop_worker(worker);
        }
        if let Some(timer) = self.timer.lock().take() {
            if timer.join().is_err() {
                tracing::error!("domain: timer thread panicked");
            }
        }
        tracing::debug!("domain: shut down");
    }
}

impl Drop for SchedulingDomain {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for SchedulingDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("SchedulingDomain")
            .field("config", &self.shared.config)
            .field("armed", &state.armed)
            .field("registrations", &state.registrations.len())
            .field("cores", &state.workers.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn timer_loop(shared: &Shared) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            break;
        }
        let Some(deadline) = state.deadline else {
            shared.timer_cv.wait(&mut state);
            continue;
        };
        if Instant::now() < deadline {
            shared.timer_cv.wait_until(&mut state, deadline);
            continue;
        }

        state.fire();
        if let Some(period) = state.armed {
            let now = Instant::now();
            let mut next = deadline + period;
            if next <= now {
                // Fell behind; realign instead of firing a burst.
                next = now + period;
            }
            state.deadline = Some(next);
        }
    }
}

fn spawn_worker(core: u32, id: RegistrationId, handler: Handler, window_log2: u32) -> Result<Worker> {
    let slot = Arc::new(CoreSlot {
        handlers: Mutex::new(vec![(id, handler)]),
        pending: AtomicBool::new(false),
        exit: AtomicBool::new(false),
        stats: Mutex::new(StatsWindow {
            stats: CoreStats {
                core,
                ..CoreStats::default()
            },
            ..StatsWindow::default()
        }),
    });
    let (tx, rx) = unbounded();
    let worker_slot = Arc::clone(&slot);
    let thread = thread::Builder::new()
        .name(format!("cadence-ll{core}"))
        .spawn(move || worker_loop(&worker_slot, &rx, window_log2))?;
    let thread_id = thread.thread().id();
    Ok(Worker {
        slot,
        tx,
        thread: Some(thread),
        thread_id,
    })
}

fn stop_worker(mut worker: Worker) {
    worker.slot.exit.store(true, Ordering::Release);
    let _ = worker.tx.send(WorkerMsg::Exit);
    let Some(thread) = worker.thread.take() else {
        return;
    };
    if thread::current().id() == worker.thread_id {
        // Unregistered from its own handler: the loop exits after it returns.
        return;
    }
    if thread.join().is_err() {
        tracing::error!("domain: worker thread panicked");
    }
}

fn worker_loop(slot: &CoreSlot, rx: &Receiver<WorkerMsg>, window_log2: u32) {
    for msg in rx {
        if matches!(msg, WorkerMsg::Exit) || slot.exit.load(Ordering::Acquire) {
            break;
        }
        let handlers: Vec<Handler> = slot.handlers.lock().iter().map(|(_, h)| Arc::clone(h)).collect();

        let start = Instant::now();
        for handler in &handlers {
            handler();
        }
        slot.stats.lock().record(start.elapsed(), window_log2);
        slot.pending.store(false, Ordering::Release);

        if slot.exit.load(Ordering::Acquire) {
            break;
        }
    }
}
