use std::{
    io,
    sync::{
        Arc, Condvar, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{log::log_sink::LogSink, sink_debug, sink_info};

/// Idle wait when no task is scheduled.
const IDLE_WAIT: Duration = Duration::from_millis(500);

/// Returned by a job to keep or drop its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskControl {
    Continue,
    Stop,
}

/// Cancellation handle for a scheduled task. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

type Job = Box<dyn FnMut() -> TaskControl + Send>;

struct ScheduledTask {
    next_run: Instant,
    interval: Duration,
    handle: TaskHandle,
    job: Job,
}

struct Shared {
    tasks: Mutex<Vec<ScheduledTask>>,
    wakeup: Condvar,
    stop: AtomicBool,
}

/// Single thread running fixed-rate jobs (STUN harvesting and similar timers).
///
/// Jobs run outside the task lock, so a job may schedule or cancel other tasks.
pub struct PeriodicExecutor {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    logger: Arc<dyn LogSink>,
}

impl PeriodicExecutor {
    pub fn start(logger: Arc<dyn LogSink>) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            tasks: Mutex::new(Vec::new()),
            wakeup: Condvar::new(),
            stop: AtomicBool::new(false),
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("periodic-executor".into())
            .spawn(move || run_loop(&worker_shared))?;

        sink_info!(logger, "[SCHED] periodic executor started");
        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
            logger,
        })
    }

    /// Runs `job` after `initial_delay`, then every `interval`, until it
    /// returns [`TaskControl::Stop`] or the handle is cancelled.
    pub fn schedule<F>(&self, initial_delay: Duration, interval: Duration, job: F) -> TaskHandle
    where
        F: FnMut() -> TaskControl + Send + 'static,
    {
        let handle = TaskHandle::default();
        let task = ScheduledTask {
            next_run: Instant::now() + initial_delay,
            interval,
            handle: handle.clone(),
            job: Box::new(job),
        };
        let mut tasks = self.shared.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.push(task);
        drop(tasks);
        self.shared.wakeup.notify_all();
        handle
    }

    /// Number of live (not yet dropped) tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.shared
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|t| !t.handle.is_cancelled())
            .count()
    }

    /// Stops the worker and drops every task. Idempotent.
    pub fn shutdown(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.wakeup.notify_all();
        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(worker) = worker {
            let _ = worker.join();
            sink_debug!(self.logger, "[SCHED] periodic executor stopped");
        }
        self.shared
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl Drop for PeriodicExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(shared: &Shared) {
    loop {
        let mut tasks = shared.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }
        tasks.retain(|t| !t.handle.is_cancelled());

        let now = Instant::now();
        let (due, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut *tasks).into_iter().partition(|t| t.next_run <= now);
        *tasks = pending;

        if due.is_empty() {
            let wait = tasks
                .iter()
                .map(|t| t.next_run.saturating_duration_since(now))
                .min()
                .unwrap_or(IDLE_WAIT);
            let _ = shared
                .wakeup
                .wait_timeout(tasks, wait)
                .unwrap_or_else(|e| e.into_inner());
            continue;
        }
        drop(tasks);

        let mut keep = Vec::with_capacity(due.len());
        for mut task in due {
            if task.handle.is_cancelled() {
                continue;
            }
            match (task.job)() {
                TaskControl::Continue => {
                    task.next_run += task.interval;
                    let now = Instant::now();
                    if task.next_run < now {
                        task.next_run = now + task.interval;
                    }
                    keep.push(task);
                }
                TaskControl::Stop => task.handle.cancel(),
            }
        }

        shared
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(keep);
    }
}
