//! Recurring task loop implementation.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::{ErrorKind, RunError, SchedulerError, TaskError};
use crate::retry::{Backoff, BackoffFactory, default_backoff_factory};
use crate::sleep::sleep_until;

/// Boxed future returned by jobs and hooks.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// The unit of work executed each iteration.
pub type JobFn<A> = Arc<dyn Fn(A) -> BoxFuture<Result<(), TaskError>> + Send + Sync>;

/// Fallible lifecycle hook (`before_run` / `after_run`).
pub type HookFn = Arc<dyn Fn() -> BoxFuture<Result<(), TaskError>> + Send + Sync>;

/// Error-reporting hook.
pub type ErrorHookFn = Arc<dyn Fn(TaskError) -> BoxFuture<()> + Send + Sync>;

/// Interval between iterations, kept in the units it was configured with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    seconds: f64,
    minutes: f64,
    hours: f64,
}

impl Interval {
    /// Validate and construct an interval. Components may be fractional; the
    /// total must be finite and non-negative.
    pub fn new(seconds: f64, minutes: f64, hours: f64) -> Result<Self, SchedulerError> {
        let interval = Self {
            seconds,
            minutes,
            hours,
        };
        let total = interval.total_seconds();
        if !total.is_finite() {
            return Err(SchedulerError::InvalidConfig(
                "interval must be finite".to_string(),
            ));
        }
        if total < 0.0 {
            return Err(SchedulerError::InvalidConfig(
                "total number of seconds cannot be less than zero".to_string(),
            ));
        }
        Ok(interval)
    }

    /// The seconds component.
    pub fn seconds(&self) -> f64 {
        self.seconds
    }

    /// The minutes component.
    pub fn minutes(&self) -> f64 {
        self.minutes
    }

    /// The hours component.
    pub fn hours(&self) -> f64 {
        self.hours
    }

    /// Total length in seconds.
    pub fn total_seconds(&self) -> f64 {
        self.seconds + self.minutes * 60.0 + self.hours * 3600.0
    }

    pub(crate) fn as_chrono(&self) -> chrono::Duration {
        std::time::Duration::try_from_secs_f64(self.total_seconds())
            .ok()
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .unwrap_or(chrono::Duration::MAX)
    }
}

/// Lifecycle hooks attached to a loop.
#[derive(Clone, Default)]
pub(crate) struct Hooks {
    pub(crate) before: Option<HookFn>,
    pub(crate) after: Option<HookFn>,
    pub(crate) on_error: Option<ErrorHookFn>,
}

/// Mutable scheduling state shared between the control surface and the loop
/// task.
struct LoopState {
    current_iteration: AtomicU64,
    stop_requested: AtomicBool,
    is_being_cancelled: AtomicBool,
    has_failed: AtomicBool,
    last_iteration: Mutex<Option<DateTime<Utc>>>,
    next_iteration: Mutex<Option<DateTime<Utc>>>,
}

impl LoopState {
    fn new() -> Self {
        Self {
            current_iteration: AtomicU64::new(0),
            stop_requested: AtomicBool::new(false),
            is_being_cancelled: AtomicBool::new(false),
            has_failed: AtomicBool::new(false),
            last_iteration: Mutex::new(None),
            next_iteration: Mutex::new(None),
        }
    }

    /// Reset transient flags and the counter so the loop is reusable.
    fn reset(&self) {
        self.is_being_cancelled.store(false, Ordering::SeqCst);
        self.current_iteration.store(0, Ordering::SeqCst);
        self.stop_requested.store(false, Ordering::SeqCst);
        self.has_failed.store(false, Ordering::SeqCst);
    }
}

/// Control-side record of a live run.
struct ActiveRun {
    cancel: watch::Sender<bool>,
    done: watch::Receiver<bool>,
    runtime: Handle,
}

impl ActiveRun {
    /// Whether the loop task is still live. A dropped sender with no pending
    /// completion value means the task died without reaching its cleanup.
    fn is_live(&self) -> bool {
        !*self.done.borrow() && self.done.has_changed().is_ok()
    }
}

struct LoopInner<A> {
    job: JobFn<A>,
    interval: RwLock<Interval>,
    count: Option<u64>,
    reconnect: bool,
    retryable: RwLock<HashSet<ErrorKind>>,
    hooks: Hooks,
    backoff: BackoffFactory,
    runtime: Option<Handle>,
    state: LoopState,
    run: Mutex<Option<ActiveRun>>,
}

/// A recurring task: executes an async job at a fixed wall-clock cadence,
/// absorbing transient failures with backoff, until an iteration bound, a
/// fatal error, or an external stop/cancel.
///
/// Handles are cheap to clone and all refer to the same loop; at most one run
/// is live at a time across every clone, which makes controlling a running
/// loop from another thread a matter of cloning the handle.
pub struct TaskLoop<A = ()> {
    inner: Arc<LoopInner<A>>,
}

impl<A> Clone for TaskLoop<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Owned handle to one in-flight run of a [`TaskLoop`].
pub struct RunHandle {
    join: JoinHandle<Result<(), RunError>>,
}

impl RunHandle {
    /// Wait for the run to terminate and return its outcome.
    pub async fn join(self) -> Result<(), RunError> {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(RunError::Panicked),
            Err(_) => Err(RunError::Cancelled),
        }
    }

    /// Whether the run has terminated.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Configuration for a [`TaskLoop`], validated by [`build`].
///
/// [`build`]: TaskLoopBuilder::build
pub struct TaskLoopBuilder<A = ()> {
    job: JobFn<A>,
    seconds: f64,
    minutes: f64,
    hours: f64,
    count: Option<u64>,
    reconnect: bool,
    retryable: HashSet<ErrorKind>,
    hooks: Hooks,
    backoff: BackoffFactory,
    runtime: Option<Handle>,
}

impl<A: Clone + Send + 'static> TaskLoopBuilder<A> {
    /// Seconds component of the interval.
    pub fn seconds(mut self, seconds: f64) -> Self {
        self.seconds = seconds;
        self
    }

    /// Minutes component of the interval.
    pub fn minutes(mut self, minutes: f64) -> Self {
        self.minutes = minutes;
        self
    }

    /// Hours component of the interval.
    pub fn hours(mut self, hours: f64) -> Self {
        self.hours = hours;
        self
    }

    /// Bound the loop to `count` successful iterations. Unbounded when not
    /// set.
    pub fn count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    /// Whether retryable failures are absorbed with backoff (`true`, the
    /// default) or terminate the loop.
    pub fn reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Treat `kind` as transient, on top of the default I/O kind.
    pub fn retry_on(mut self, kind: ErrorKind) -> Self {
        self.retryable.insert(kind);
        self
    }

    /// Hook invoked once before the first iteration. A suspension here delays
    /// the first execution until it resolves.
    pub fn before_run<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let hook: HookFn = Arc::new(move || Box::pin(hook()));
        self.hooks.before = Some(hook);
        self
    }

    /// Hook invoked after the loop terminates, on every exit path.
    pub fn after_run<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let hook: HookFn = Arc::new(move || Box::pin(hook()));
        self.hooks.after = Some(hook);
        self
    }

    /// Hook invoked with the error when the loop terminates fatally. The
    /// default logs through `tracing`.
    pub fn on_error<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(TaskError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: ErrorHookFn = Arc::new(move |err| Box::pin(hook(err)));
        self.hooks.on_error = Some(hook);
        self
    }

    /// Backoff policy factory; a fresh policy is created for each run.
    pub fn backoff<F, B>(mut self, factory: F) -> Self
    where
        F: Fn() -> B + Send + Sync + 'static,
        B: Backoff + Send + 'static,
    {
        self.backoff = Arc::new(move || Box::new(factory()));
        self
    }

    /// Runtime to spawn runs on. Defaults to the ambient runtime at `start`.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Validate the configuration and construct the loop.
    pub fn build(self) -> Result<TaskLoop<A>, SchedulerError> {
        let interval = Interval::new(self.seconds, self.minutes, self.hours)?;
        if self.count == Some(0) {
            return Err(SchedulerError::InvalidConfig(
                "count must be greater than 0 or unbounded".to_string(),
            ));
        }
        Ok(TaskLoop::from_parts(
            self.job,
            interval,
            self.count,
            self.reconnect,
            self.retryable,
            self.hooks,
            self.backoff,
            self.runtime,
        ))
    }
}

impl<A: Clone + Send + 'static> TaskLoop<A> {
    /// Start configuring a loop around `job`.
    pub fn builder<F, Fut>(job: F) -> TaskLoopBuilder<A>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let job: JobFn<A> = Arc::new(move |args| Box::pin(job(args)));
        TaskLoopBuilder {
            job,
            seconds: 0.0,
            minutes: 0.0,
            hours: 0.0,
            count: None,
            reconnect: true,
            retryable: HashSet::from([ErrorKind::Io]),
            hooks: Hooks::default(),
            backoff: default_backoff_factory(),
            runtime: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        job: JobFn<A>,
        interval: Interval,
        count: Option<u64>,
        reconnect: bool,
        retryable: HashSet<ErrorKind>,
        hooks: Hooks,
        backoff: BackoffFactory,
        runtime: Option<Handle>,
    ) -> Self {
        Self {
            inner: Arc::new(LoopInner {
                job,
                interval: RwLock::new(interval),
                count,
                reconnect,
                retryable: RwLock::new(retryable),
                hooks,
                backoff,
                runtime,
                state: LoopState::new(),
                run: Mutex::new(None),
            }),
        }
    }

    /// Launch the iteration loop.
    ///
    /// `args` is cloned into every job invocation. Fails with
    /// [`SchedulerError::AlreadyRunning`] while a previous run is live, and
    /// with [`SchedulerError::NoRuntime`] when no runtime was configured and
    /// none is ambient.
    pub fn start(&self, args: A) -> Result<RunHandle, SchedulerError> {
        let mut run = lock(&self.inner.run);
        if run.as_ref().is_some_and(ActiveRun::is_live) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let runtime = match &self.inner.runtime {
            Some(handle) => handle.clone(),
            None => Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?,
        };

        // A previous run that died before its cleanup leaves stale flags.
        self.inner.state.reset();

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        let join = runtime.spawn(run_loop(
            Arc::clone(&self.inner),
            args,
            cancel_rx,
            done_tx,
        ));
        *run = Some(ActiveRun {
            cancel: cancel_tx,
            done: done_rx,
            runtime,
        });
        Ok(RunHandle { join })
    }

    /// Request graceful termination after the current iteration's success.
    ///
    /// No-op without a live run. Never interrupts an in-flight execution; a
    /// loop parked in its inter-iteration sleep finishes that cycle first.
    pub fn stop(&self) {
        let run = lock(&self.inner.run);
        if run.as_ref().is_some_and(ActiveRun::is_live) {
            self.inner.state.stop_requested.store(true, Ordering::SeqCst);
        }
    }

    /// Cancel the live run, interrupting it at its current suspension point.
    ///
    /// No-op if there is no live run or cancellation is already underway.
    pub fn cancel(&self) {
        let run = lock(&self.inner.run);
        if self.inner.state.is_being_cancelled.load(Ordering::SeqCst) {
            return;
        }
        if let Some(active) = run.as_ref().filter(|r| r.is_live()) {
            let _ = active.cancel.send(true);
        }
    }

    /// Cancel the live run and start a new one once it has fully completed.
    ///
    /// No-op under the same guard as [`cancel`]. The new run is launched by a
    /// continuation that waits for the cancelled run's cleanup, so the two
    /// never overlap.
    ///
    /// [`cancel`]: TaskLoop::cancel
    pub fn restart(&self, args: A) {
        let run = lock(&self.inner.run);
        if self.inner.state.is_being_cancelled.load(Ordering::SeqCst) {
            return;
        }
        let Some(active) = run.as_ref().filter(|r| r.is_live()) else {
            return;
        };

        let mut done = active.done.clone();
        let this = self.clone();
        active.runtime.spawn(async move {
            while !*done.borrow_and_update() {
                if done.changed().await.is_err() {
                    break;
                }
            }
            if let Err(e) = this.start(args) {
                warn!(error = %e, "restart could not relaunch the loop");
            }
        });
        let _ = active.cancel.send(true);
    }

    /// Add error kinds treated as transient. Takes effect at the next retry
    /// decision.
    pub fn add_retryable_kinds(&self, kinds: &[ErrorKind]) {
        let mut set = write(&self.inner.retryable);
        for kind in kinds {
            set.insert(*kind);
        }
    }

    /// Remove error kinds from the retryable set.
    ///
    /// Kinds that are present are removed; returns `false` unless every
    /// requested kind was present.
    pub fn remove_retryable_kinds(&self, kinds: &[ErrorKind]) -> bool {
        let mut set = write(&self.inner.retryable);
        let mut all_present = true;
        for kind in kinds {
            all_present &= set.remove(kind);
        }
        all_present
    }

    /// Drop every retryable kind, making all failures fatal.
    pub fn clear_retryable_kinds(&self) {
        write(&self.inner.retryable).clear();
    }

    /// The error kinds currently treated as transient.
    pub fn retryable_kinds(&self) -> HashSet<ErrorKind> {
        read(&self.inner.retryable).clone()
    }

    /// Replace the interval. Same validation as construction; takes effect at
    /// the next sleep computation.
    pub fn change_interval(
        &self,
        seconds: f64,
        minutes: f64,
        hours: f64,
    ) -> Result<(), SchedulerError> {
        let interval = Interval::new(seconds, minutes, hours)?;
        *write(&self.inner.interval) = interval;
        Ok(())
    }

    /// The configured interval.
    pub fn interval(&self) -> Interval {
        *read(&self.inner.interval)
    }

    /// Completed iterations of the current run; zero when idle.
    pub fn current_iteration(&self) -> u64 {
        self.inner.state.current_iteration.load(Ordering::SeqCst)
    }

    /// When the next iteration is scheduled, or `None` when there is no live
    /// run, the run has completed, or a stop has been requested.
    pub fn next_iteration(&self) -> Option<DateTime<Utc>> {
        let run = lock(&self.inner.run);
        if !run.as_ref().is_some_and(ActiveRun::is_live) {
            return None;
        }
        if self.inner.state.stop_requested.load(Ordering::SeqCst) {
            return None;
        }
        *lock(&self.inner.state.next_iteration)
    }

    /// When the current run's most recent iteration was scheduled.
    pub fn last_iteration(&self) -> Option<DateTime<Utc>> {
        *lock(&self.inner.state.last_iteration)
    }

    /// Whether a run is live.
    pub fn is_running(&self) -> bool {
        lock(&self.inner.run)
            .as_ref()
            .is_some_and(ActiveRun::is_live)
    }

    /// Whether the current run has hit a fatal failure.
    pub fn failed(&self) -> bool {
        self.inner.state.has_failed.load(Ordering::SeqCst)
    }

    /// Whether cancellation of the current run is underway.
    pub fn is_being_cancelled(&self) -> bool {
        self.inner.state.is_being_cancelled.load(Ordering::SeqCst)
    }
}

/// Exit reason of the inner iteration loop.
enum LoopExit {
    Cancelled,
    Failed(TaskError),
}

async fn run_loop<A: Clone + Send + 'static>(
    inner: Arc<LoopInner<A>>,
    args: A,
    mut cancel_rx: watch::Receiver<bool>,
    done_tx: watch::Sender<bool>,
) -> Result<(), RunError> {
    debug!(
        interval_secs = read(&inner.interval).total_seconds(),
        count = ?inner.count,
        "task loop started"
    );

    let outcome = iterate(&inner, args, &mut cancel_rx).await;

    let result = match outcome {
        Ok(()) => {
            debug!(
                iterations = inner.state.current_iteration.load(Ordering::SeqCst),
                "task loop completed"
            );
            Ok(())
        }
        Err(LoopExit::Cancelled) => Err(RunError::Cancelled),
        Err(LoopExit::Failed(e)) => {
            inner.state.has_failed.store(true, Ordering::SeqCst);
            match &inner.hooks.on_error {
                Some(hook) => hook(e.clone()).await,
                None => error!(error = %e, "unhandled error in task loop"),
            }
            Err(RunError::Failed(e))
        }
    };

    // Cleanup runs on every exit path: after hook, then flag reset. The reset
    // happens even when the after hook itself fails.
    let after = match &inner.hooks.after {
        Some(hook) => hook().await,
        None => Ok(()),
    };
    inner.state.reset();
    let _ = done_tx.send(true);

    match (result, after) {
        (Ok(()), Err(e)) => Err(RunError::Failed(e)),
        (Err(run_err), Err(e)) => {
            warn!(error = %e, "after hook failed during abnormal termination");
            Err(run_err)
        }
        (result, Ok(())) => result,
    }
}

async fn iterate<A: Clone>(
    inner: &LoopInner<A>,
    args: A,
    cancel_rx: &mut watch::Receiver<bool>,
) -> Result<(), LoopExit> {
    let mut backoff = (inner.backoff)();
    let state = &inner.state;

    // First entry only: the before hook. Hook errors bypass the retry logic.
    if let Some(before) = &inner.hooks.before {
        match cancellable(cancel_rx, before()).await {
            Some(Ok(())) => {}
            Some(Err(e)) => return Err(LoopExit::Failed(e)),
            None => return cancelled(state),
        }
    }

    let mut last_iteration_failed = false;
    let mut next = Utc::now();
    *lock(&state.next_iteration) = Some(next);

    // Yield once so a cancellation issued before the first execution is seen.
    if cancellable(cancel_rx, tokio::task::yield_now())
        .await
        .is_none()
    {
        return cancelled(state);
    }

    loop {
        if !last_iteration_failed {
            let last = next;
            next = last
                .checked_add_signed(read(&inner.interval).as_chrono())
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            *lock(&state.last_iteration) = Some(last);
            *lock(&state.next_iteration) = Some(next);
        }

        match cancellable(cancel_rx, (inner.job)(args.clone())).await {
            None => return cancelled(state),
            Some(Ok(())) => {
                last_iteration_failed = false;
                let now = Utc::now();
                if now > next {
                    // The job overran its slot; drop the missed ticks rather
                    // than bursting to catch up.
                    next = now;
                    *lock(&state.next_iteration) = Some(next);
                }

                if state.stop_requested.load(Ordering::SeqCst) {
                    return Ok(());
                }
                let completed = state.current_iteration.fetch_add(1, Ordering::SeqCst) + 1;
                if inner.count == Some(completed) {
                    return Ok(());
                }
                if cancellable(cancel_rx, sleep_until(next)).await.is_none() {
                    return cancelled(state);
                }
            }
            Some(Err(e)) => {
                let retryable = read(&inner.retryable).contains(&e.kind());
                if !retryable {
                    return Err(LoopExit::Failed(e));
                }
                last_iteration_failed = true;
                if !inner.reconnect {
                    return Err(LoopExit::Failed(e));
                }
                let Some(delay) = backoff.next_backoff() else {
                    return Err(LoopExit::Failed(e));
                };
                warn!(
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "job failed with retryable error, backing off"
                );
                if cancellable(cancel_rx, tokio::time::sleep(delay))
                    .await
                    .is_none()
                {
                    return cancelled(state);
                }
            }
        }
    }
}

fn cancelled(state: &LoopState) -> Result<(), LoopExit> {
    state.is_being_cancelled.store(true, Ordering::SeqCst);
    Err(LoopExit::Cancelled)
}

/// Await `fut`, racing it against the run's cancellation signal.
///
/// Returns `None` when cancellation is observed; the future is dropped at
/// whatever suspension point it had reached. If the control side has gone
/// away entirely the future runs to completion.
async fn cancellable<T>(
    cancel_rx: &mut watch::Receiver<bool>,
    fut: impl Future<Output = T>,
) -> Option<T> {
    tokio::pin!(fut);
    loop {
        if *cancel_rx.borrow() {
            return None;
        }
        tokio::select! {
            changed = cancel_rx.changed() => match changed {
                Ok(()) => continue,
                Err(_) => return Some(fut.await),
            },
            out = &mut fut => return Some(out),
        }
    }
}

/// Lock a std mutex, recovering the guard from a poisoned holder; the
/// protected values are plain data that stay consistent across panics.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(rwlock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(rwlock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn noop_loop() -> TaskLoopBuilder<()> {
        TaskLoop::builder(|_: ()| async { Ok(()) })
    }

    #[test_case(-1.0, 0.0, 0.0 ; "negative seconds")]
    #[test_case(0.0, -1.0, 0.0 ; "negative minutes")]
    #[test_case(0.0, 0.0, -1.0 ; "negative hours")]
    #[test_case(30.0, -1.0, 0.0 ; "negative total")]
    #[test_case(f64::NAN, 0.0, 0.0 ; "nan seconds")]
    #[test_case(f64::INFINITY, 0.0, 0.0 ; "infinite seconds")]
    fn test_invalid_interval_rejected(seconds: f64, minutes: f64, hours: f64) {
        let result = noop_loop()
            .seconds(seconds)
            .minutes(minutes)
            .hours(hours)
            .build();
        assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
    }

    #[test]
    fn test_positive_total_with_negative_component_accepted() {
        // Mirrors summing semantics: -30s + 1min is a valid 30s total.
        let task = noop_loop().seconds(-30.0).minutes(1.0).build();
        assert!(task.is_ok());
        assert_eq!(task.expect("valid").interval().total_seconds(), 30.0);
    }

    #[test]
    fn test_zero_count_rejected() {
        let result = noop_loop().seconds(1.0).count(0).build();
        assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_interval_accepted() {
        assert!(noop_loop().build().is_ok());
    }

    #[test]
    fn test_default_retryable_set_is_io_only() {
        let task = noop_loop().build().expect("valid");
        assert_eq!(task.retryable_kinds(), HashSet::from([ErrorKind::Io]));
    }

    #[test]
    fn test_retryable_kind_add_remove() {
        let task = noop_loop().build().expect("valid");

        task.add_retryable_kinds(&[ErrorKind::Timeout, ErrorKind::Unavailable]);
        assert_eq!(
            task.retryable_kinds(),
            HashSet::from([ErrorKind::Io, ErrorKind::Timeout, ErrorKind::Unavailable])
        );

        assert!(task.remove_retryable_kinds(&[ErrorKind::Timeout]));
        assert!(!task.retryable_kinds().contains(&ErrorKind::Timeout));
    }

    #[test]
    fn test_remove_absent_kind_returns_false_and_leaves_set_unchanged() {
        let task = noop_loop().build().expect("valid");
        let before = task.retryable_kinds();

        assert!(!task.remove_retryable_kinds(&[ErrorKind::Timeout]));
        assert_eq!(task.retryable_kinds(), before);
    }

    #[test]
    fn test_remove_mixed_kinds_removes_present_but_returns_false() {
        let task = noop_loop().build().expect("valid");

        assert!(!task.remove_retryable_kinds(&[ErrorKind::Io, ErrorKind::Timeout]));
        assert!(task.retryable_kinds().is_empty());
    }

    #[test]
    fn test_clear_retryable_kinds() {
        let task = noop_loop().build().expect("valid");
        task.clear_retryable_kinds();
        assert!(task.retryable_kinds().is_empty());
    }

    #[test]
    fn test_change_interval_validates() {
        let task = noop_loop().seconds(1.0).build().expect("valid");

        assert!(matches!(
            task.change_interval(-5.0, 0.0, 0.0),
            Err(SchedulerError::InvalidConfig(_))
        ));
        assert_eq!(task.interval().total_seconds(), 1.0);

        task.change_interval(0.0, 2.0, 0.0).expect("valid");
        assert_eq!(task.interval().total_seconds(), 120.0);
    }

    #[test]
    fn test_idle_loop_introspection() {
        let task = noop_loop().seconds(1.0).build().expect("valid");

        assert!(!task.is_running());
        assert!(!task.failed());
        assert!(!task.is_being_cancelled());
        assert_eq!(task.current_iteration(), 0);
        assert!(task.next_iteration().is_none());
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let task = noop_loop().seconds(1.0).build().expect("valid");
        assert!(matches!(task.start(()), Err(SchedulerError::NoRuntime)));
    }

    #[test]
    fn test_stop_and_cancel_are_noops_when_idle() {
        let task = noop_loop().seconds(1.0).build().expect("valid");
        task.stop();
        task.cancel();
        task.restart(());
        assert!(!task.is_running());
    }

    proptest! {
        #[test]
        fn interval_total_combines_units(
            seconds in 0.0f64..1000.0,
            minutes in 0.0f64..1000.0,
            hours in 0.0f64..100.0,
        ) {
            let interval = Interval::new(seconds, minutes, hours).expect("non-negative");
            let expected = seconds + minutes * 60.0 + hours * 3600.0;
            prop_assert!((interval.total_seconds() - expected).abs() < 1e-6);
        }

        #[test]
        fn negative_total_always_rejected(seconds in -1000.0f64..-0.001) {
            prop_assert!(Interval::new(seconds, 0.0, 0.0).is_err());
        }

        #[test]
        fn chrono_conversion_never_negative(
            seconds in 0.0f64..1_000_000.0,
        ) {
            let interval = Interval::new(seconds, 0.0, 0.0).expect("non-negative");
            prop_assert!(interval.as_chrono() >= chrono::Duration::zero());
        }
    }
}
