//! Owner-bound loop definitions.
//!
//! A [`LoopDef`] describes a recurring task whose job and hooks receive the
//! owning object as their leading argument. Each owner binds its own
//! independent [`TaskLoop`] with [`LoopDef::bind_to`], typically once during
//! the owner's construction, so owners never share counters, flags, or run
//! handles.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::error::{ErrorKind, SchedulerError, TaskError};
use crate::retry::{Backoff, BackoffFactory, default_backoff_factory};
use crate::scheduler::{BoxFuture, ErrorHookFn, HookFn, Hooks, Interval, JobFn, TaskLoop};

type OwnerJobFn<O, A> = Arc<dyn Fn(Arc<O>, A) -> BoxFuture<Result<(), TaskError>> + Send + Sync>;
type OwnerHookFn<O> = Arc<dyn Fn(Arc<O>) -> BoxFuture<Result<(), TaskError>> + Send + Sync>;
type OwnerErrorHookFn<O> = Arc<dyn Fn(Arc<O>, TaskError) -> BoxFuture<()> + Send + Sync>;

/// A validated, owner-aware loop definition.
///
/// The definition itself holds no runtime state; every bound loop gets its
/// own.
pub struct LoopDef<O, A = ()> {
    job: OwnerJobFn<O, A>,
    interval: Interval,
    count: Option<u64>,
    reconnect: bool,
    retryable: HashSet<ErrorKind>,
    before: Option<OwnerHookFn<O>>,
    after: Option<OwnerHookFn<O>>,
    on_error: Option<OwnerErrorHookFn<O>>,
    backoff: BackoffFactory,
    runtime: Option<Handle>,
}

impl<O: Send + Sync + 'static, A: Clone + Send + 'static> LoopDef<O, A> {
    /// Start configuring a definition around an owner-aware `job`.
    pub fn builder<F, Fut>(job: F) -> LoopDefBuilder<O, A>
    where
        F: Fn(Arc<O>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let job: OwnerJobFn<O, A> = Arc::new(move |owner, args| Box::pin(job(owner, args)));
        LoopDefBuilder {
            job,
            seconds: 0.0,
            minutes: 0.0,
            hours: 0.0,
            count: None,
            reconnect: true,
            retryable: HashSet::from([ErrorKind::Io]),
            before: None,
            after: None,
            on_error: None,
            backoff: default_backoff_factory(),
            runtime: None,
        }
    }

    /// Produce an independent loop bound to `owner`.
    ///
    /// The bound loop shares this definition's configuration but has isolated
    /// mutable state; the owner is passed as the leading argument to the job
    /// and every hook.
    pub fn bind_to(&self, owner: Arc<O>) -> TaskLoop<A> {
        let job = Arc::clone(&self.job);
        let job_owner = Arc::clone(&owner);
        let bound_job: JobFn<A> = Arc::new(move |args| job(Arc::clone(&job_owner), args));

        let hooks = Hooks {
            before: self.before.as_ref().map(|hook| {
                let hook = Arc::clone(hook);
                let owner = Arc::clone(&owner);
                let bound: HookFn = Arc::new(move || hook(Arc::clone(&owner)));
                bound
            }),
            after: self.after.as_ref().map(|hook| {
                let hook = Arc::clone(hook);
                let owner = Arc::clone(&owner);
                let bound: HookFn = Arc::new(move || hook(Arc::clone(&owner)));
                bound
            }),
            on_error: self.on_error.as_ref().map(|hook| {
                let hook = Arc::clone(hook);
                let owner = Arc::clone(&owner);
                let bound: ErrorHookFn = Arc::new(move |err| hook(Arc::clone(&owner), err));
                bound
            }),
        };

        TaskLoop::from_parts(
            bound_job,
            self.interval,
            self.count,
            self.reconnect,
            self.retryable.clone(),
            hooks,
            Arc::clone(&self.backoff),
            self.runtime.clone(),
        )
    }
}

/// Configuration for a [`LoopDef`], validated by [`build`].
///
/// [`build`]: LoopDefBuilder::build
pub struct LoopDefBuilder<O, A = ()> {
    job: OwnerJobFn<O, A>,
    seconds: f64,
    minutes: f64,
    hours: f64,
    count: Option<u64>,
    reconnect: bool,
    retryable: HashSet<ErrorKind>,
    before: Option<OwnerHookFn<O>>,
    after: Option<OwnerHookFn<O>>,
    on_error: Option<OwnerErrorHookFn<O>>,
    backoff: BackoffFactory,
    runtime: Option<Handle>,
}

impl<O: Send + Sync + 'static, A: Clone + Send + 'static> LoopDefBuilder<O, A> {
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

    /// Bound each bound loop to `count` successful iterations.
    pub fn count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    /// Whether retryable failures are absorbed with backoff.
    pub fn reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Treat `kind` as transient, on top of the default I/O kind.
    pub fn retry_on(mut self, kind: ErrorKind) -> Self {
        self.retryable.insert(kind);
        self
    }

    /// Hook invoked with the owner before the first iteration.
    pub fn before_run<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Arc<O>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let hook: OwnerHookFn<O> = Arc::new(move |owner| Box::pin(hook(owner)));
        self.before = Some(hook);
        self
    }

    /// Hook invoked with the owner after a bound loop terminates.
    pub fn after_run<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Arc<O>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let hook: OwnerHookFn<O> = Arc::new(move |owner| Box::pin(hook(owner)));
        self.after = Some(hook);
        self
    }

    /// Hook invoked with the owner and the error on fatal termination.
    pub fn on_error<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Arc<O>, TaskError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: OwnerErrorHookFn<O> = Arc::new(move |owner, err| Box::pin(hook(owner, err)));
        self.on_error = Some(hook);
        self
    }

    /// Backoff policy factory shared by every bound loop; each run still gets
    /// a fresh policy instance.
    pub fn backoff<F, B>(mut self, factory: F) -> Self
    where
        F: Fn() -> B + Send + Sync + 'static,
        B: Backoff + Send + 'static,
    {
        self.backoff = Arc::new(move || Box::new(factory()));
        self
    }

    /// Runtime the bound loops spawn runs on.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Validate the configuration and construct the definition.
    ///
    /// Validation happens here, once, so [`LoopDef::bind_to`] is infallible.
    pub fn build(self) -> Result<LoopDef<O, A>, SchedulerError> {
        let interval = Interval::new(self.seconds, self.minutes, self.hours)?;
        if self.count == Some(0) {
            return Err(SchedulerError::InvalidConfig(
                "count must be greater than 0 or unbounded".to_string(),
            ));
        }
        Ok(LoopDef {
            job: self.job,
            interval,
            count: self.count,
            reconnect: self.reconnect,
            retryable: self.retryable,
            before: self.before,
            after: self.after,
            on_error: self.on_error,
            backoff: self.backoff,
            runtime: self.runtime,
        })
    }
}
