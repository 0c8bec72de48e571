//! Periodic callbacks that live as named triggers

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Callback, Session};

/// Name used when a timer is started without one
pub const DEFAULT_TIMER_NAME: &str = "timer";

impl Session {
    /// Register `callback` as a trigger named `name` and invoke it every
    /// `interval` until the trigger is removed, the session disconnects, or
    /// the callback fails.
    pub fn run_timer(
        self: &Arc<Self>,
        name: &str,
        interval: Duration,
        callback: Arc<dyn Callback>,
    ) -> JoinHandle<()> {
        let name = if name.is_empty() {
            DEFAULT_TIMER_NAME.to_string()
        } else {
            name.to_string()
        };

        self.triggers.register(name.clone(), callback);

        info!(
            session_id = %self.id,
            name = %name,
            interval_ms = interval.as_millis() as u64,
            "Timer started"
        );

        self.runtime
            .spawn(timer_task(Arc::clone(self), name, interval))
    }
}

async fn timer_task(session: Arc<Session>, name: String, interval: Duration) {
    let shutdown = session.shutdown_token();

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.cancelled() => {
                debug!(session_id = %session.id(), name = %name, "Timer cancelled");
                break;
            }
        }

        if !session.is_connected() {
            break;
        }

        let Some(callback) = session.triggers().get(&name) else {
            debug!(session_id = %session.id(), name = %name, "Timer trigger removed, stopping");
            break;
        };

        let tick_name = name.clone();
        match tokio::task::spawn_blocking(move || callback.invoke(&tick_name)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(
                    session_id = %session.id(),
                    name = %name,
                    error = %e,
                    "Timer callback failed, stopping timer"
                );
                break;
            }
            Err(e) => {
                warn!(session_id = %session.id(), name = %name, error = %e, "Timer task failed");
                break;
            }
        }
    }

    debug!(session_id = %session.id(), name = %name, "Timer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::test_session;
    use atomic_utils::{AtomicError, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (Arc<AtomicUsize>, Arc<dyn Callback>) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let callback: Arc<dyn Callback> = Arc::new(move |_: &str| -> Result<()> {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (count, callback)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_timer_ticks_until_removed() {
        let (session, _rx) = test_session();
        let (count, callback) = counting();

        let task = session.run_timer("clock", Duration::from_millis(10), callback);
        assert!(session.triggers().contains("clock"));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(count.load(Ordering::SeqCst) >= 2);

        session.triggers().remove("clock");
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        let after = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(count.load(Ordering::SeqCst), after);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_timer_default_name() {
        let (session, _rx) = test_session();
        let (_, callback) = counting();

        let task = session.run_timer("", Duration::from_secs(60), callback);
        assert!(session.triggers().contains(DEFAULT_TIMER_NAME));

        session.disconnect();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_timer_stops_on_callback_error() {
        let (session, _rx) = test_session();
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&calls);
        let callback: Arc<dyn Callback> = Arc::new(move |_: &str| -> Result<()> {
            inner.fetch_add(1, Ordering::SeqCst);
            Err(AtomicError::script("tick failed"))
        });

        let task = session.run_timer("bad", Duration::from_millis(5), callback);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // The session itself stays up
        assert!(session.is_connected());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_timer_callback_receives_name() {
        let (session, _rx) = test_session();
        let seen = Arc::new(parking_lot::Mutex::new(String::new()));
        let inner = Arc::clone(&seen);
        let callback: Arc<dyn Callback> = Arc::new(move |name: &str| -> Result<()> {
            *inner.lock() = name.to_string();
            Ok(())
        });

        session.run_timer("status", Duration::from_millis(5), callback);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*seen.lock(), "status");
        session.disconnect();
    }
}
