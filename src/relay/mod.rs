//! Live run relay: clients publish run events, every other client gets them.
//!
//! Frames are JSON text `{"event": <kind>, "data": <anything>}`. Only the
//! kind is checked; accepted frames are forwarded byte for byte. The relay
//! keeps no state and has nothing to do with the territory ledger.

pub mod connection;

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::util::id::new_connection_id;

/// Kinds of frames the relay forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunEvent {
    StartRun,
    LocationUpdate,
    StopRun,
}

#[derive(Deserialize)]
struct Envelope {
    event: RunEvent,
}

#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("bad frame: {0}")]
    BadFrame(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Relayed {
    from: ConnectionId,
    frame: Arc<str>,
}

/// What a subscriber gets next.
#[derive(Debug, PartialEq)]
pub enum Delivery {
    Frame(Arc<str>),
    /// The subscriber fell behind and this many frames were dropped.
    Lagged(u64),
    Closed,
}

#[derive(Clone)]
pub struct RelayHub {
    tx: broadcast::Sender<Relayed>,
}

impl RelayHub {
    /// `capacity` frames are buffered per subscriber before it starts lagging.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn join(&self) -> Subscription {
        Subscription { id: ConnectionId(new_connection_id()), rx: self.tx.subscribe() }
    }

    /// Checks the frame's kind and forwards it verbatim to every other subscriber.
    pub fn publish(&self, from: ConnectionId, frame: &str) -> Result<RunEvent, RelayError> {
        let Envelope { event } = serde_json::from_str(frame)?;
        let receivers = self.tx.send(Relayed { from, frame: frame.into() }).unwrap_or(0);
        debug!(%from, ?event, receivers, "relayed");
        Ok(event)
    }

    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct Subscription {
    id: ConnectionId,
    rx: broadcast::Receiver<Relayed>,
}

impl Subscription {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Next frame published by someone else.
    pub async fn recv(&mut self) -> Delivery {
        loop {
            match self.rx.recv().await {
                Ok(relayed) if relayed.from == self.id => continue,
                Ok(relayed) => return Delivery::Frame(relayed.frame),
                Err(broadcast::error::RecvError::Lagged(skipped)) => return Delivery::Lagged(skipped),
                Err(broadcast::error::RecvError::Closed) => return Delivery::Closed,
            }
        }
    }
}

/// Frame sent back to a client whose frame was refused or who lagged.
pub fn error_frame(message: &str) -> String {
    serde_json::json!({ "event": "error", "data": { "message": message } }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = r#"{"event":"start-run","data":{"user_id":"alice"}}"#;
    const MOVE: &str = r#"{"event":"location-update","data":{"latitude":51.5,"longitude":-0.1}}"#;
    const STOP: &str = r#"{"event":"stop-run"}"#;

    #[tokio::test]
    async fn frames_reach_others_verbatim() {
        let hub = RelayHub::new(16);
        let alice = hub.join();
        let mut bob = hub.join();
        let mut carol = hub.join();

        assert_eq!(hub.publish(alice.id(), MOVE).unwrap(), RunEvent::LocationUpdate);
        assert_eq!(bob.recv().await, Delivery::Frame(MOVE.into()));
        assert_eq!(carol.recv().await, Delivery::Frame(MOVE.into()));
    }

    #[tokio::test]
    async fn sender_does_not_get_its_own_frame() {
        let hub = RelayHub::new(16);
        let mut alice = hub.join();
        let bob = hub.join();

        hub.publish(alice.id(), START).unwrap();
        hub.publish(bob.id(), STOP).unwrap();
        // alice's own start-run is skipped, so bob's stop-run is next
        assert_eq!(alice.recv().await, Delivery::Frame(STOP.into()));
    }

    #[tokio::test]
    async fn refused_frames_are_not_broadcast() {
        let hub = RelayHub::new(16);
        let alice = hub.join();
        let mut bob = hub.join();

        assert!(hub.publish(alice.id(), "not json").is_err());
        assert!(hub.publish(alice.id(), r#"{"event":"teleport"}"#).is_err());
        assert!(hub.publish(alice.id(), r#"{"data":{}}"#).is_err());
        hub.publish(alice.id(), STOP).unwrap();
        assert_eq!(bob.recv().await, Delivery::Frame(STOP.into()));
    }

    #[tokio::test]
    async fn slow_subscriber_is_told_how_much_it_missed() {
        let hub = RelayHub::new(2);
        let alice = hub.join();
        let mut bob = hub.join();
        for _ in 0..5 {
            hub.publish(alice.id(), MOVE).unwrap();
        }
        assert_eq!(bob.recv().await, Delivery::Lagged(3));
        assert_eq!(bob.recv().await, Delivery::Frame(MOVE.into()));
    }

    #[test]
    fn publishing_without_listeners_is_fine() {
        let hub = RelayHub::new(4);
        let id = ConnectionId(1);
        assert_eq!(hub.subscribers(), 0);
        assert_eq!(hub.publish(id, START).unwrap(), RunEvent::StartRun);
    }

    #[test]
    fn error_frame_shape() {
        let value: serde_json::Value = serde_json::from_str(&error_frame("nope")).unwrap();
        assert_eq!(value["event"], "error");
        assert_eq!(value["data"]["message"], "nope");
    }
}
