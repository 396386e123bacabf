use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// Collapses bursts of calls into one trailing call.
///
/// Every `call` restarts the window; the callback runs once the window
/// elapses with no further calls, receiving the arguments of the last call.
/// Must be used from within a tokio runtime.
pub struct Debouncer<A> {
    window: Duration,
    callback: Arc<dyn Fn(A) + Send + Sync>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<A: Send + 'static> Debouncer<A> {
    pub fn new(window: Duration, callback: impl Fn(A) + Send + Sync + 'static) -> Self {
        Self {
            window,
            callback: Arc::new(callback),
            pending: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn call(&self, args: A) {
        let callback = Arc::clone(&self.callback);
        let window = self.window;
        let task = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            callback(args);
        });

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.replace(task) {
            if !previous.is_finished() {
                trace!("superseding pending debounced call");
            }
            previous.abort();
        }
    }

    /// Drops the pending call, if any.
    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = pending.take() {
            task.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(false, |task| !task.is_finished())
    }
}

impl<A> Drop for Debouncer<A> {
    fn drop(&mut self) {
        let pending = self.pending.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = pending.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, Instant};

    type Fired = Arc<Mutex<Vec<(u32, Duration)>>>;

    fn recorder(start: Instant) -> (Fired, impl Fn(u32) + Send + Sync + 'static) {
        let fired: Fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        (fired, move |value| {
            sink.lock().unwrap().push((value, start.elapsed()));
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_fires_once_with_last_args() {
        let start = Instant::now();
        let (fired, callback) = recorder(start);
        let debouncer = Debouncer::new(Duration::from_millis(50), callback);

        debouncer.call(1);
        sleep(Duration::from_millis(10)).await;
        debouncer.call(2);
        sleep(Duration::from_millis(10)).await;
        debouncer.call(3);

        sleep(Duration::from_millis(100)).await;

        let fired = fired.lock().unwrap();
        assert_eq!(fired.len(), 1);
        let (value, at) = fired[0];
        assert_eq!(value, 3);
        assert!(at >= Duration::from_millis(70), "fired at {at:?}");
        assert!(at < Duration::from_millis(71), "fired at {at:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_after_window_start_fresh_window() {
        let (fired, callback) = recorder(Instant::now());
        let debouncer = Debouncer::new(Duration::from_millis(50), callback);

        debouncer.call(1);
        sleep(Duration::from_millis(60)).await;
        debouncer.call(2);
        sleep(Duration::from_millis(60)).await;

        let values: Vec<u32> = fired.lock().unwrap().iter().map(|(v, _)| *v).collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_leading_call() {
        let (fired, callback) = recorder(Instant::now());
        let debouncer = Debouncer::new(Duration::from_millis(50), callback);

        debouncer.call(1);
        sleep(Duration::from_millis(49)).await;
        assert!(fired.lock().unwrap().is_empty());
        assert!(debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_drop_discard_pending_call() {
        let (fired, callback) = recorder(Instant::now());
        let debouncer = Debouncer::new(Duration::from_millis(50), callback);
        debouncer.call(1);
        debouncer.cancel();
        assert!(!debouncer.is_pending());

        debouncer.call(2);
        drop(debouncer);

        sleep(Duration::from_millis(100)).await;
        assert!(fired.lock().unwrap().is_empty());
    }
}
