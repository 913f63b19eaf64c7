//! Running blocking code from async context.

use tokio::task;

/// Run a blocking closure on the runtime's blocking pool and await its
/// result.
///
/// A panic inside the closure is resumed on the calling task.
pub async fn unblock<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match task::spawn_blocking(f).await {
        Ok(value) => value,
        Err(e) => match e.try_into_panic() {
            Ok(panic) => std::panic::resume_unwind(panic),
            // Blocking tasks are only ever cancelled before they start, when
            // the runtime is already shutting down.
            Err(e) => panic!("blocking task cancelled: {e}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unblock_returns_closure_value() {
        let value = unblock(|| {
            std::thread::sleep(std::time::Duration::from_millis(10));
            7
        })
        .await;
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_unblock_moves_captured_state() {
        let input = vec![1, 2, 3];
        let sum = unblock(move || input.iter().sum::<i32>()).await;
        assert_eq!(sum, 6);
    }

    #[tokio::test]
    #[should_panic(expected = "kaboom")]
    async fn test_unblock_resumes_panics() {
        unblock(|| panic!("kaboom")).await;
    }
}
