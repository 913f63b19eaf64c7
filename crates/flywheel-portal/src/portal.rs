//! Dedicated runtime thread driving async work for synchronous callers.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::thread;

use tokio::runtime::Builder;
use tokio::sync::{oneshot, watch};
use tracing::debug;

use crate::error::PortalError;

/// Handle to a runtime thread accepting futures from synchronous code.
///
/// Work is submitted with [`call`] from any thread; the portal keeps running
/// until [`stop`] is called or the handle is dropped.
///
/// [`call`]: Portal::call
/// [`stop`]: Portal::stop
pub struct Portal {
    handle: tokio::runtime::Handle,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Portal {
    /// Start the runtime thread and wait until it is accepting work.
    pub fn spawn() -> Result<Self, PortalError> {
        let (handle_tx, handle_rx) = std::sync::mpsc::channel();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let thread = thread::Builder::new()
            .name("flywheel-portal".to_string())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = handle_tx.send(Err(e));
                        return;
                    }
                };
                let _ = handle_tx.send(Ok(runtime.handle().clone()));

                // Park on the shutdown signal; submitted tasks run on this
                // same thread while we wait.
                runtime.block_on(async {
                    while !*shutdown_rx.borrow_and_update() {
                        if shutdown_rx.changed().await.is_err() {
                            break;
                        }
                    }
                });
                debug!("portal runtime thread exiting");
            })?;

        let handle = handle_rx
            .recv()
            .map_err(|_| PortalError::Closed)?
            .map_err(PortalError::Spawn)?;

        Ok(Self {
            handle,
            shutdown: Mutex::new(Some(shutdown_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Submit a future to the portal runtime.
    ///
    /// Returns immediately; collect the result through the returned
    /// [`PortalFuture`], blocking with [`wait`] or by awaiting it.
    ///
    /// [`wait`]: PortalFuture::wait
    pub fn call<F, T>(&self, fut: F) -> PortalFuture<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.handle.spawn(async move {
            let _ = tx.send(fut.await);
        });
        PortalFuture { rx }
    }

    /// Shut the runtime down and join its thread. Idempotent.
    ///
    /// Must not be called from within a future submitted to this portal.
    pub fn stop(&self) {
        if let Some(shutdown) = lock(&self.shutdown).take() {
            let _ = shutdown.send(true);
        }
        if let Some(thread) = lock(&self.thread).take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Portal {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pending result of a [`Portal::call`].
pub struct PortalFuture<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> PortalFuture<T> {
    /// Block the calling thread until the result is available.
    ///
    /// Fails with [`PortalError::Closed`] if the portal shut down before the
    /// submitted future completed. Must not be called from async context; use
    /// `.await` there instead.
    pub fn wait(self) -> Result<T, PortalError> {
        self.rx.blocking_recv().map_err(|_| PortalError::Closed)
    }
}

impl<T> Future for PortalFuture<T> {
    type Output = Result<T, PortalError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| PortalError::Closed))
    }
}

/// Lock a std mutex, recovering the guard from a poisoned holder.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_call_from_sync_thread() {
        let portal = Portal::spawn().expect("portal starts");

        let result = portal
            .call(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                21 * 2
            })
            .wait()
            .expect("result delivered");

        assert_eq!(result, 42);
        portal.stop();
    }

    #[test]
    fn test_calls_from_multiple_threads() {
        let portal = std::sync::Arc::new(Portal::spawn().expect("portal starts"));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let portal = std::sync::Arc::clone(&portal);
                std::thread::spawn(move || portal.call(async move { i * 10 }).wait())
            })
            .collect();

        let mut results: Vec<i32> = handles
            .into_iter()
            .map(|h| h.join().expect("thread").expect("result"))
            .collect();
        results.sort_unstable();
        assert_eq!(results, vec![0, 10, 20, 30]);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let portal = Portal::spawn().expect("portal starts");
        portal.stop();
        portal.stop();
    }

    #[test]
    fn test_call_after_stop_is_closed() {
        let portal = Portal::spawn().expect("portal starts");
        portal.stop();

        let outcome = portal.call(async { 1 }).wait();
        assert!(matches!(outcome, Err(PortalError::Closed)));
    }

    #[tokio::test]
    async fn test_portal_future_is_awaitable() {
        let portal = Portal::spawn().expect("portal starts");

        let result = portal.call(async { "hello" }).await.expect("result");
        assert_eq!(result, "hello");

        // Stopping joins a foreign thread, so hand it to the blocking pool.
        tokio::task::spawn_blocking(move || portal.stop())
            .await
            .expect("stop");
    }
}
