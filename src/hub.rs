//! Publish/subscribe registry for session signals.
//!
//! Listeners are registered per signal name and run synchronously, in
//! subscription order, on the task that publishes the signal (the session
//! loop). A listener must therefore not block; use
//! [`EventHub::subscribe`] to hand signals off to another task instead.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::event::Signal;

/// Callback invoked with every signal published under its name.
pub type Listener = Arc<dyn Fn(&Signal) + Send + Sync>;

/// Handle returned by [`EventHub::on`], used to remove that one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Clone)]
enum Sink {
    Callback(Listener),
    Channel(mpsc::UnboundedSender<Signal>),
}

struct Entry {
    id: ListenerId,
    name: String,
    once: bool,
    sink: Sink,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Entry>,
}

/// Signal registry owned by a session.
///
/// # Example
///
/// ```
/// use mopidy_client::event::{names, Signal};
/// use mopidy_client::hub::EventHub;
///
/// let hub = EventHub::new();
/// let id = hub.on(names::STATE_ONLINE, |signal| {
///     assert_eq!(*signal, Signal::Online);
/// });
/// hub.emit(&Signal::Online);
/// assert!(hub.off(id));
/// ```
#[derive(Default)]
pub struct EventHub {
    registry: Mutex<Registry>,
}

impl EventHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for every signal named `name`.
    pub fn on<F>(&self, name: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&Signal) + Send + Sync + 'static,
    {
        self.register(name.into(), false, Sink::Callback(Arc::new(listener)))
    }

    /// Register `listener` for the next signal named `name` only.
    pub fn once<F>(&self, name: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&Signal) + Send + Sync + 'static,
    {
        self.register(name.into(), true, Sink::Callback(Arc::new(listener)))
    }

    /// Forward every signal named `name` to an unbounded channel.
    ///
    /// The forwarder is dropped from the hub once the receiver is dropped.
    pub fn subscribe(&self, name: impl Into<String>) -> mpsc::UnboundedReceiver<Signal> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.register(name.into(), false, Sink::Channel(tx));
        rx
    }

    /// Remove one listener. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut registry = self.lock();
        let before = registry.entries.len();
        registry.entries.retain(|entry| entry.id != id);
        registry.entries.len() != before
    }

    /// Remove every listener registered for `name`.
    pub fn off_event(&self, name: &str) {
        self.lock().entries.retain(|entry| entry.name != name);
    }

    /// Remove every listener.
    pub fn off_all(&self) {
        self.lock().entries.clear();
    }

    /// Number of listeners registered for `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|entry| entry.name == name)
            .count()
    }

    /// Deliver `signal` to every listener registered under its name, callbacks
    /// and channels alike, in registration order.
    ///
    /// The registry lock is released before any listener runs, so listeners
    /// may register or remove listeners themselves.
    pub fn emit(&self, signal: &Signal) {
        let name = signal.name();
        let targets: Vec<(ListenerId, Sink)> = {
            let mut registry = self.lock();
            let targets = registry
                .entries
                .iter()
                .filter(|entry| entry.name == name)
                .map(|entry| (entry.id, entry.sink.clone()))
                .collect();
            registry
                .entries
                .retain(|entry| !(entry.once && entry.name == name));
            targets
        };

        let mut closed = Vec::new();
        for (id, sink) in targets {
            match sink {
                Sink::Callback(listener) => listener(signal),
                Sink::Channel(tx) => {
                    if tx.send(signal.clone()).is_err() {
                        closed.push(id);
                    }
                }
            }
        }
        if !closed.is_empty() {
            self.lock()
                .entries
                .retain(|entry| !closed.contains(&entry.id));
        }
    }

    /// Publish several signals in order.
    pub(crate) fn emit_all<I>(&self, signals: I)
    where
        I: IntoIterator<Item = Signal>,
    {
        for signal in signals {
            self.emit(&signal);
        }
    }

    fn register(&self, name: String, once: bool, sink: Sink) -> ListenerId {
        let mut registry = self.lock();
        let id = ListenerId(registry.next_id);
        registry.next_id += 1;
        registry.entries.push(Entry {
            id,
            name,
            once,
            sink,
        });
        id
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // A panicking listener never holds the lock, so a poisoned registry is still consistent.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("listeners", &self.lock().entries.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::event::names;
    use std::sync::Mutex as StdMutex;

    fn recorder() -> (Arc<StdMutex<Vec<String>>>, impl Fn(&str) -> Listener) {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let make = {
            let log = Arc::clone(&log);
            move |tag: &str| -> Listener {
                let log = Arc::clone(&log);
                let tag = tag.to_string();
                Arc::new(move |signal: &Signal| {
                    log.lock().unwrap().push(format!("{tag}:{}", signal.name()));
                })
            }
        };
        (log, make)
    }

    #[test]
    fn listeners_run_in_subscription_order() {
        let hub = EventHub::new();
        let (log, make) = recorder();
        let first = make("first");
        let second = make("second");
        hub.on(names::STATE_ONLINE, move |s| first(s));
        hub.on(names::STATE_ONLINE, move |s| second(s));

        hub.emit(&Signal::Online);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:state:online", "second:state:online"]
        );
    }

    #[test]
    fn emit_only_reaches_matching_name() {
        let hub = EventHub::new();
        let (log, make) = recorder();
        let listener = make("l");
        hub.on(names::STATE_OFFLINE, move |s| listener(s));

        hub.emit(&Signal::Online);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn off_removes_single_listener() {
        let hub = EventHub::new();
        let id = hub.on(names::RECONNECTING, |_| {});
        hub.on(names::RECONNECTING, |_| {});
        assert_eq!(hub.listener_count(names::RECONNECTING), 2);

        assert!(hub.off(id));
        assert!(!hub.off(id));
        assert_eq!(hub.listener_count(names::RECONNECTING), 1);
    }

    #[test]
    fn off_event_and_off_all() {
        let hub = EventHub::new();
        hub.on(names::STATE_ONLINE, |_| {});
        hub.on(names::STATE_ONLINE, |_| {});
        hub.on(names::STATE_OFFLINE, |_| {});

        hub.off_event(names::STATE_ONLINE);
        assert_eq!(hub.listener_count(names::STATE_ONLINE), 0);
        assert_eq!(hub.listener_count(names::STATE_OFFLINE), 1);

        hub.off_all();
        assert_eq!(hub.listener_count(names::STATE_OFFLINE), 0);
    }

    #[test]
    fn once_fires_a_single_time() {
        let hub = EventHub::new();
        let (log, make) = recorder();
        let listener = make("once");
        hub.once(names::STATE_ONLINE, move |s| listener(s));

        hub.emit(&Signal::Online);
        hub.emit(&Signal::Online);

        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(hub.listener_count(names::STATE_ONLINE), 0);
    }

    #[test]
    fn listener_may_subscribe_during_emit() {
        let hub = Arc::new(EventHub::new());
        let inner = Arc::clone(&hub);
        hub.on(names::STATE_ONLINE, move |_| {
            inner.on(names::STATE_OFFLINE, |_| {});
        });

        hub.emit(&Signal::Online);
        assert_eq!(hub.listener_count(names::STATE_OFFLINE), 1);
    }

    #[tokio::test]
    async fn subscribe_forwards_to_channel() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe("event:trackPlaybackStarted");

        hub.emit_all(Signal::event_pair(
            "event:trackPlaybackStarted".into(),
            serde_json::Map::new(),
        ));

        let signal = rx.recv().await.unwrap();
        assert_eq!(signal.name(), "event:trackPlaybackStarted");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn callbacks_and_channels_share_one_order() {
        let hub = Arc::new(EventHub::new());
        let later = Arc::new(StdMutex::new(None));
        let rx = Arc::new(StdMutex::new(None::<mpsc::UnboundedReceiver<Signal>>));
        {
            let later = Arc::clone(&later);
            let rx = Arc::clone(&rx);
            hub.on(names::STATE_ONLINE, move |_| {
                let delivered = rx
                    .lock()
                    .unwrap()
                    .as_mut()
                    .map(|rx| rx.try_recv().is_ok());
                *later.lock().unwrap() = delivered;
            });
        }
        *rx.lock().unwrap() = Some(hub.subscribe(names::STATE_ONLINE));

        hub.emit(&Signal::Online);

        assert_eq!(*later.lock().unwrap(), Some(false));
        let mut rx = rx.lock().unwrap().take().unwrap();
        assert_eq!(rx.try_recv().unwrap(), Signal::Online);
    }

    #[test]
    fn channel_before_callback_is_served_first() {
        let hub = EventHub::new();
        let rx = Arc::new(StdMutex::new(hub.subscribe(names::STATE_OFFLINE)));
        let seen = Arc::new(StdMutex::new(false));
        {
            let rx = Arc::clone(&rx);
            let seen = Arc::clone(&seen);
            hub.on(names::STATE_OFFLINE, move |_| {
                *seen.lock().unwrap() = rx.lock().unwrap().try_recv().is_ok();
            });
        }

        hub.emit(&Signal::Offline);
        assert!(*seen.lock().unwrap());
    }

    #[test]
    fn dropped_subscription_is_pruned() {
        let hub = EventHub::new();
        let rx = hub.subscribe(names::STATE_ONLINE);
        assert_eq!(hub.listener_count(names::STATE_ONLINE), 1);

        drop(rx);
        hub.emit(&Signal::Online);
        assert_eq!(hub.listener_count(names::STATE_ONLINE), 0);
    }
}
