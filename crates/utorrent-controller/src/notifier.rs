//! Listeners interested in session rotations.

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::session::Credentials;

/// Error a listener may report. It is logged and does not stop other listeners.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

type Listener = Arc<dyn Fn(&Credentials) -> Result<(), ListenerError> + Send + Sync>;

/// Handle returned by [`crate::WebUiClient::register_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct UpdateNotifier {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
    /// Session generation of the last pair handed to listeners. Held for the
    /// whole pass so passes never overlap.
    delivered: Mutex<u64>,
}

impl fmt::Debug for UpdateNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UpdateNotifier(listeners={})", self.len())
    }
}

impl UpdateNotifier {
    pub(crate) fn register_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Credentials) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    pub(crate) fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Invoke every listener in registration order. Returns how many failed.
    pub(crate) fn notify_all(&self, credentials: &Credentials) -> usize {
        // Snapshot so listeners may (un)register without deadlocking.
        let listeners: Vec<_> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut failed = 0;
        for (id, listener) in listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(credentials))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(?id, "session listener failed: {err}");
                    failed += 1;
                }
                Err(_) => {
                    warn!(?id, "session listener panicked");
                    failed += 1;
                }
            }
        }
        failed
    }

    /// Run a pass for the pair of session `generation`, unless a newer pair
    /// was already delivered. Returns the failure count of the pass, if it ran.
    pub(crate) fn deliver(&self, generation: u64, credentials: &Credentials) -> Option<usize> {
        let mut delivered = self.delivered.lock().unwrap_or_else(PoisonError::into_inner);
        if generation <= *delivered {
            debug!(generation, "skipping superseded session update");
            return None;
        }
        *delivered = generation;
        Some(self.notify_all(credentials))
    }

    /// Notify without blocking the caller: on the blocking pool when inside a
    /// tokio runtime, inline otherwise.
    ///
    /// Listeners always finish with the newest pair: passes run one at a time
    /// and a pair older than one already delivered is dropped.
    pub(crate) fn dispatch(self: &Arc<Self>, generation: u64, credentials: Credentials) {
        if self.len() == 0 {
            return;
        }
        let notifier = Arc::clone(self);
        match Handle::try_current() {
            Ok(handle) => {
                debug!(generation, "Dispatching session update to listeners");
                let _ = handle.spawn_blocking(move || notifier.deliver(generation, &credentials));
            }
            Err(_) => {
                notifier.deliver(generation, &credentials);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn credentials(token: &str) -> Credentials {
        Credentials {
            token: token.into(),
            cookie: "xyz".into(),
        }
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let notifier = UpdateNotifier::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let seen = Arc::clone(&seen);
            notifier.register_listener(move |c| {
                seen.lock().unwrap().push((n, c.clone()));
                Ok(())
            });
        }

        assert_eq!(notifier.notify_all(&credentials("abc123")), 0);
        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (0, credentials("abc123")),
                (1, credentials("abc123")),
                (2, credentials("abc123")),
            ]
        );
    }

    #[test]
    fn failing_listener_does_not_stop_the_pass() {
        let notifier = UpdateNotifier::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        notifier.register_listener(|_| Err("disk full".into()));
        notifier.register_listener(|_| panic!("listener bug"));
        let sink = Arc::clone(&seen);
        notifier.register_listener(move |c| {
            sink.lock().unwrap().push(c.token.clone());
            Ok(())
        });

        assert_eq!(notifier.notify_all(&credentials("abc123")), 2);
        assert_eq!(*seen.lock().unwrap(), vec!["abc123".to_string()]);
    }

    #[test]
    fn same_listener_may_register_twice() {
        let notifier = UpdateNotifier::default();
        let calls = Arc::new(AtomicU64::new(0));
        let listener = {
            let calls = Arc::clone(&calls);
            move |_: &Credentials| -> Result<(), ListenerError> {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        };

        notifier.register_listener(listener.clone());
        notifier.register_listener(listener);
        notifier.notify_all(&credentials("t"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn removed_listener_is_not_called() {
        let notifier = UpdateNotifier::default();
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let id = notifier.register_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(notifier.remove_listener(id));
        assert!(!notifier.remove_listener(id));
        notifier.notify_all(&credentials("t"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(notifier.len(), 0);
    }

    #[test]
    fn dispatch_without_runtime_runs_inline() {
        let notifier = Arc::new(UpdateNotifier::default());
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        notifier.register_listener(move |c| {
            *sink.lock().unwrap() = Some(c.clone());
            Ok(())
        });

        notifier.dispatch(1, credentials("abc123"));
        assert_eq!(*seen.lock().unwrap(), Some(credentials("abc123")));
    }

    #[test]
    fn superseded_pair_is_not_delivered() {
        let notifier = UpdateNotifier::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        notifier.register_listener(move |c| {
            sink.lock().unwrap().push(c.token.clone());
            Ok(())
        });

        assert_eq!(notifier.deliver(3, &credentials("new")), Some(0));
        assert_eq!(notifier.deliver(2, &credentials("old")), None);
        assert_eq!(notifier.deliver(3, &credentials("new")), None);
        assert_eq!(*seen.lock().unwrap(), vec!["new".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_pass_is_not_overtaken_by_an_older_pair() {
        let notifier = Arc::new(UpdateNotifier::default());
        let persisted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&persisted);
        notifier.register_listener(move |c| {
            if c.token == "token-0" {
                std::thread::sleep(std::time::Duration::from_millis(200));
            }
            sink.lock().unwrap().push(c.token.clone());
            Ok(())
        });

        notifier.dispatch(1, credentials("token-0"));
        notifier.dispatch(2, credentials("token-1"));

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while persisted.lock().unwrap().last().map(String::as_str) != Some("token-1") {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("newest pair was not delivered");

        // Give a straggling pass the chance to land.
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        assert_eq!(persisted.lock().unwrap().last().map(String::as_str), Some("token-1"));
    }
}
