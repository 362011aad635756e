//! Append-only, strictly ordered event stream with asynchronous fan-out.
//!
//! Producers append events; each subscriber drains its own unbounded
//! queue on a dedicated task, so a slow subscriber never blocks a
//! producer or another subscriber. Position allocation, the durable
//! append, and the per-subscriber enqueue happen inside one short
//! critical section; no lock is held across handler execution, which
//! makes re-entrant appends from inside a handler safe.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Event, EventPayload, EventSource};

/// Structural errors from the event stream.
///
/// These are fatal to the operation that caused them but never corrupt
/// previously appended events.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("duplicate event position {position} (last appended: {last})")]
    DuplicatePosition { position: u64, last: u64 },

    #[error("event stream is closed")]
    Closed,
}

/// Result type for stream operations.
pub type StreamResult<T> = std::result::Result<T, StreamError>;

/// Handle returned by [`EventStream::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

/// Subscriber callback seam.
///
/// Handlers run on their own delivery task and observe every event in
/// append order. A handler may itself append to the stream.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, event: Event);
}

#[derive(Debug)]
struct StreamState {
    events: Vec<Event>,
    next_position: u64,
    closed: bool,
}

struct Subscriber {
    id: SubscriberId,
    tx: mpsc::UnboundedSender<Event>,
}

/// The append-only event log for one session.
pub struct EventStream {
    sid: String,
    state: Mutex<StreamState>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventStream {
    pub fn new(sid: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            sid: sid.into(),
            state: Mutex::new(StreamState {
                events: Vec::new(),
                next_position: 0,
                closed: false,
            }),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// Session identifier this stream belongs to.
    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// Append a new event, assigning it the next position.
    ///
    /// Returns the stored event. Never blocks on subscriber work;
    /// delivery happens asynchronously per subscriber, in append order.
    ///
    /// Position assignment and the per-subscriber enqueue happen inside
    /// the same critical section: releasing the state lock between the
    /// two would let a parallel producer enqueue a later position
    /// first. Enqueueing is a non-blocking unbounded send, so nothing
    /// slow runs under the lock.
    pub fn append(&self, source: EventSource, payload: EventPayload) -> StreamResult<Event> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(StreamError::Closed);
        }
        let event = Event {
            position: state.next_position,
            source,
            payload,
            timestamp: Utc::now(),
        };
        state.next_position += 1;
        state.events.push(event.clone());
        self.fan_out(&event);
        Ok(event)
    }

    /// Append a pre-positioned event (replay/import path).
    ///
    /// The position must be greater than every position already in the
    /// stream; otherwise the append fails with
    /// [`StreamError::DuplicatePosition`] and the stream is unchanged.
    pub fn append_raw(&self, event: Event) -> StreamResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(StreamError::Closed);
        }
        if let Some(last) = state.events.last() {
            if event.position <= last.position {
                return Err(StreamError::DuplicatePosition {
                    position: event.position,
                    last: last.position,
                });
            }
        }
        state.next_position = event.position + 1;
        state.events.push(event.clone());
        self.fan_out(&event);
        Ok(())
    }

    /// Snapshot of all events appended so far, in position order.
    ///
    /// Safe to call while appends continue; the snapshot simply ends at
    /// whatever was durable at call time.
    pub fn read_all(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    /// Number of events appended so far.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a subscriber and spawn its delivery worker.
    ///
    /// The subscriber observes every event appended after this call, in
    /// append order. Must be called from within a tokio runtime.
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) -> SubscriberId {
        let id = SubscriberId(Uuid::new_v4());
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

        self.subscribers.lock().unwrap().push(Subscriber { id, tx });

        let sid = self.sid.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler.on_event(event).await;
            }
            debug!(%sid, subscriber = %id.0, "event stream delivery worker stopped");
        });

        id
    }

    /// Remove a subscriber.
    ///
    /// Events appended after this call are not delivered to it; events
    /// already queued may still drain.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.lock().unwrap().retain(|s| s.id != id);
    }

    /// Close the stream. Further appends fail with [`StreamError::Closed`];
    /// already appended events remain readable.
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        // Dropping the senders lets delivery workers finish draining.
        self.subscribers.lock().unwrap().clear();
    }

    /// Enqueue an event for every live subscriber.
    ///
    /// Called with the state lock held; lock order is always state →
    /// subscribers (subscribe/unsubscribe/close touch only the
    /// subscribers lock, so the order cannot invert).
    fn fan_out(&self, event: &Event) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|s| {
            if s.tx.send(event.clone()).is_ok() {
                true
            } else {
                warn!(subscriber = %s.id.0, "dropping subscriber with dead delivery queue");
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Records every observed event.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Event>>,
    }

    impl Recorder {
        fn positions(&self) -> Vec<u64> {
            self.seen.lock().unwrap().iter().map(|e| e.position).collect()
        }
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn on_event(&self, event: Event) {
            self.seen.lock().unwrap().push(event);
        }
    }

    fn message(text: &str) -> EventPayload {
        EventPayload::UserMessage {
            content: text.to_string(),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn appends_assign_increasing_positions() {
        let stream = EventStream::new("test");
        for i in 0..5 {
            let event = stream.append(EventSource::User, message("m")).unwrap();
            assert_eq!(event.position, i);
        }
        let positions: Vec<u64> = stream.read_all().iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn subscriber_observes_events_in_append_order() {
        let stream = EventStream::new("test");
        let recorder = Arc::new(Recorder::default());
        stream.subscribe(recorder.clone());

        for i in 0..20 {
            stream
                .append(EventSource::User, message(&format!("m{i}")))
                .unwrap();
        }
        settle().await;

        assert_eq!(recorder.positions(), (0..20).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn all_subscribers_observe_the_same_order() {
        let stream = EventStream::new("test");
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        stream.subscribe(a.clone());
        stream.subscribe(b.clone());

        for i in 0..10 {
            stream
                .append(EventSource::Agent, message(&format!("m{i}")))
                .unwrap();
        }
        settle().await;

        assert_eq!(a.positions(), b.positions());
        assert_eq!(a.positions(), (0..10).collect::<Vec<u64>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_producers_observe_position_order() {
        let stream = EventStream::new("test");
        let recorder = Arc::new(Recorder::default());
        stream.subscribe(recorder.clone());

        // Genuinely parallel producers: OS threads released together by
        // a barrier, so appends race on the stream's critical section.
        let barrier = Arc::new(std::sync::Barrier::new(4));
        let mut producers = Vec::new();
        for p in 0..4 {
            let stream = stream.clone();
            let barrier = barrier.clone();
            producers.push(std::thread::spawn(move || {
                barrier.wait();
                for i in 0..250 {
                    stream
                        .append(EventSource::User, message(&format!("p{p}-{i}")))
                        .unwrap();
                }
            }));
        }
        for producer in producers {
            producer.join().unwrap();
        }
        tokio::time::sleep(Duration::from_millis(300)).await;

        let observed = recorder.positions();
        assert_eq!(observed.len(), 1000);
        // Per-subscriber delivery order equals assigned-position order:
        // no reordering, no gaps, no duplicates.
        let expected: Vec<u64> = (0..1000).collect();
        assert_eq!(observed, expected);
        assert_eq!(stream.len(), 1000);
    }

    /// Echoes one reply for every user message it sees.
    struct Echo {
        stream: Arc<EventStream>,
    }

    #[async_trait]
    impl EventHandler for Echo {
        async fn on_event(&self, event: Event) {
            if let EventPayload::UserMessage { content } = &event.payload {
                if !content.starts_with("echo:") {
                    self.stream
                        .append(
                            EventSource::Environment,
                            EventPayload::UserMessage {
                                content: format!("echo:{content}"),
                            },
                        )
                        .unwrap();
                }
            }
        }
    }

    #[tokio::test]
    async fn reentrant_append_from_handler_does_not_deadlock() {
        let stream = EventStream::new("test");
        let recorder = Arc::new(Recorder::default());
        stream.subscribe(Arc::new(Echo {
            stream: stream.clone(),
        }));
        stream.subscribe(recorder.clone());

        stream.append(EventSource::User, message("hello")).unwrap();
        settle().await;

        let events = stream.read_all();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1].payload,
            EventPayload::UserMessage { content } if content == "echo:hello"
        ));
        // The re-entrant append reaches every live subscriber, echo
        // handler included (it sees its own reply), in log order.
        assert_eq!(recorder.positions(), vec![0, 1]);
    }

    #[tokio::test]
    async fn duplicate_position_append_is_rejected() {
        let stream = EventStream::new("test");
        let first = stream.append(EventSource::User, message("a")).unwrap();

        let stale = Event {
            position: first.position,
            source: EventSource::User,
            payload: message("b"),
            timestamp: Utc::now(),
        };
        let err = stream.append_raw(stale).unwrap_err();
        assert!(matches!(err, StreamError::DuplicatePosition { position: 0, .. }));

        // Prior events are untouched.
        assert_eq!(stream.len(), 1);
        assert_eq!(stream.read_all()[0], first);
    }

    #[tokio::test]
    async fn append_raw_advances_position_counter() {
        let stream = EventStream::new("test");
        let imported = Event {
            position: 41,
            source: EventSource::Environment,
            payload: message("imported"),
            timestamp: Utc::now(),
        };
        stream.append_raw(imported).unwrap();

        let next = stream.append(EventSource::User, message("next")).unwrap();
        assert_eq!(next.position, 42);
    }

    #[tokio::test]
    async fn append_after_close_fails() {
        let stream = EventStream::new("test");
        stream.append(EventSource::User, message("a")).unwrap();
        stream.close();

        let err = stream.append(EventSource::User, message("b")).unwrap_err();
        assert!(matches!(err, StreamError::Closed));
        assert_eq!(stream.len(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_future_deliveries() {
        let stream = EventStream::new("test");
        let recorder = Arc::new(Recorder::default());
        let id = stream.subscribe(recorder.clone());

        stream.append(EventSource::User, message("before")).unwrap();
        settle().await;

        stream.unsubscribe(id);
        stream.append(EventSource::User, message("after")).unwrap();
        settle().await;

        assert_eq!(recorder.positions(), vec![0]);
    }

    #[tokio::test]
    async fn read_all_is_a_snapshot() {
        let stream = EventStream::new("test");
        stream.append(EventSource::User, message("a")).unwrap();
        let snapshot = stream.read_all();
        stream.append(EventSource::User, message("b")).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(stream.len(), 2);
    }
}
