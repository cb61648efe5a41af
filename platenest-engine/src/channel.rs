//! Update channel
//!
//! One-directional, ordered delivery path from engine to caller for the
//! events belonging to one job. The transport carries serialized wire
//! payloads, exactly as they would cross a process boundary; the receive
//! side decodes them, so a payload that cannot be parsed surfaces as a
//! [`ChannelEvent::Malformed`] instead of crashing the channel or being
//! dropped silently.
//!
//! Delivery is exactly-once and in emission order for everything the engine
//! actually sends. A sink refuses further sends once it has delivered a
//! terminal event; the stream ends when every sink clone is dropped.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;

use platenest_core::{UpdateEvent, wire};

/// Creates a connected sink/stream pair for one job's updates
pub fn update_channel() -> (UpdateSink, UpdateStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = UpdateSink {
        tx,
        closed: Arc::new(Mutex::new(false)),
    };
    (sink, UpdateStream { rx })
}

/// Error returned when sending on a sink that already delivered a terminal
/// event or whose receiver is gone
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("update sink is closed")]
pub struct SinkClosed;

/// Send half of an update channel, handed to the engine at submission
///
/// Cloneable so the engine can share it between the job task and progress
/// callbacks; the terminal guard is shared across clones.
#[derive(Debug, Clone)]
pub struct UpdateSink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    /// Terminal guard. Held across the closed check and the transport send
    /// so no clone can slip a payload in behind a terminal event.
    closed: Arc<Mutex<bool>>,
}

impl UpdateSink {
    /// Encodes and sends one update event.
    ///
    /// A terminal event closes the sink: any later send fails with
    /// [`SinkClosed`], which is the use-after-terminal guard.
    pub fn send(&self, event: &UpdateEvent) -> Result<(), SinkClosed> {
        let mut closed = self.closed.lock().unwrap();
        if *closed {
            return Err(SinkClosed);
        }
        if event.is_terminal() {
            *closed = true;
        }
        self.tx
            .send(wire::encode_update(event))
            .map_err(|_| SinkClosed)
    }

    /// Sends an already-serialized payload.
    ///
    /// This is the raw transport; [`Self::send`] is the typed entry point.
    /// The terminal guard applies here too, so a raw payload cannot follow
    /// a terminal event.
    pub fn send_raw(&self, payload: Vec<u8>) -> Result<(), SinkClosed> {
        let closed = self.closed.lock().unwrap();
        if *closed {
            return Err(SinkClosed);
        }
        self.tx.send(payload).map_err(|_| SinkClosed)
    }

    /// Whether a terminal event has been delivered through this sink
    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

/// A received payload that failed to parse as an update event
///
/// Local to the channel: the stream keeps delivering subsequent events, and
/// the caller decides whether to treat the job as unreliable.
#[derive(Debug, Error)]
#[error("malformed update payload ({preview:?}): {source}")]
pub struct MalformedUpdate {
    /// Truncated payload text for diagnostics
    pub preview: String,
    #[source]
    pub source: serde_json::Error,
}

const PREVIEW_LEN: usize = 80;

/// What the receive side observes: a decoded event or a local decode failure
#[derive(Debug)]
pub enum ChannelEvent {
    Update(UpdateEvent),
    Malformed(MalformedUpdate),
}

/// Receive half of an update channel
///
/// Must stay alive for as long as any job referencing its sink may still be
/// running; the coordinator's registry owns it for exactly that span.
pub struct UpdateStream {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl UpdateStream {
    /// Receives the next event in emission order.
    ///
    /// Returns `None` once every sink clone has been dropped and the
    /// buffered events are drained.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        let payload = self.rx.recv().await?;
        match wire::decode_update(&payload) {
            Ok(event) => Some(ChannelEvent::Update(event)),
            Err(source) => {
                let text = String::from_utf8_lossy(&payload);
                let preview: String = text.chars().take(PREVIEW_LEN).collect();
                Some(ChannelEvent::Malformed(MalformedUpdate { preview, source }))
            }
        }
    }
}
