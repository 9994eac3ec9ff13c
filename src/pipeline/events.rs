//! Engine notifications: the message bus and per-stage signals.
//!
//! Two channels carry asynchronous notifications from the execution engine to
//! the control plane:
//!
//! - the **bus** carries engine-wide [`BusMessage`]s (errors, end-of-stream,
//!   state changes). The receiver returned by [`bus`] is an unbounded queue
//!   and never loses a message. Further observers [`subscribe`] to a bounded
//!   broadcast and may miss messages if they fall behind.
//!
//! [`subscribe`]: BusSender::subscribe
//! - the **signal** channel carries per-stage [`StageSignal`]s (port
//!   discovery, property changes). It is an unbounded queue: a lost
//!   `PortAdded` would leave a segment unlinked forever.

use crate::engine::EngineState;
use crate::stage::PropertyValue;
use std::fmt;
use tokio::sync::{broadcast, mpsc};

/// Messages posted by the engine on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    /// A fatal error.
    Error {
        /// Stage that posted the error.
        source: String,
        /// Human-readable message.
        message: String,
        /// Underlying cause (debug detail).
        cause: String,
    },

    /// End of stream reached the sink.
    Eos,

    /// The engine changed state.
    StateChanged {
        /// Previous state.
        from: EngineState,
        /// New state.
        to: EngineState,
    },

    /// A source started producing.
    StreamStart {
        /// The source stage.
        source: String,
    },

    /// Warning (non-fatal issue).
    Warning {
        /// Stage that posted the warning.
        source: String,
        /// Human-readable message.
        message: String,
    },

    /// Stage-specific message.
    Element {
        /// Stage that posted the message.
        source: String,
        /// Message name.
        name: String,
    },
}

impl BusMessage {
    /// Create an error message.
    pub fn error(
        source: impl Into<String>,
        message: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        BusMessage::Error {
            source: source.into(),
            message: message.into(),
            cause: cause.into(),
        }
    }

    /// The message type name (`error`, `eos`, `state-changed`, ...).
    pub fn type_name(&self) -> &'static str {
        match self {
            BusMessage::Error { .. } => "error",
            BusMessage::Eos => "eos",
            BusMessage::StateChanged { .. } => "state-changed",
            BusMessage::StreamStart { .. } => "stream-start",
            BusMessage::Warning { .. } => "warning",
            BusMessage::Element { .. } => "element",
        }
    }

    /// Whether this message ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BusMessage::Error { .. } | BusMessage::Eos)
    }
}

impl fmt::Display for BusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusMessage::Error {
                source, message, ..
            } => write!(f, "Error in {}: {}", source, message),
            BusMessage::Eos => write!(f, "EOS"),
            BusMessage::StateChanged { from, to } => {
                write!(f, "StateChanged: {:?} -> {:?}", from, to)
            }
            BusMessage::StreamStart { source } => write!(f, "Stream started by {}", source),
            BusMessage::Warning { source, message } => {
                write!(f, "Warning in {}: {}", source, message)
            }
            BusMessage::Element { source, name } => write!(f, "Element message '{}' from {}", name, source),
        }
    }
}

/// Sender side of the bus, held by the engine.
#[derive(Clone)]
pub struct BusSender {
    primary: mpsc::UnboundedSender<BusMessage>,
    observers: broadcast::Sender<BusMessage>,
}

impl BusSender {
    /// Post a message.
    ///
    /// Returns the number of receivers that received it.
    /// Returns 0 if there are no receivers (which is fine).
    pub fn post(&self, message: BusMessage) -> usize {
        let observed = self.observers.send(message.clone()).unwrap_or(0);
        let primary = usize::from(self.primary.send(message).is_ok());
        primary + observed
    }

    /// Post an error message.
    pub fn post_error(
        &self,
        source: impl Into<String>,
        message: impl Into<String>,
        cause: impl Into<String>,
    ) {
        self.post(BusMessage::error(source, message, cause));
    }

    /// Post an end-of-stream message.
    pub fn post_eos(&self) {
        self.post(BusMessage::Eos);
    }

    /// Create an observer.
    ///
    /// Observers share a bounded buffer: one that falls behind by more than
    /// the bus capacity skips the oldest messages.
    pub fn subscribe(&self) -> BusReceiver {
        BusReceiver {
            feed: Feed::Observer(self.observers.subscribe()),
        }
    }
}

enum Feed {
    Primary(mpsc::UnboundedReceiver<BusMessage>),
    Observer(broadcast::Receiver<BusMessage>),
}

/// Receiver side of the bus.
pub struct BusReceiver {
    feed: Feed,
}

impl BusReceiver {
    /// Receive the next message.
    ///
    /// Returns `None` if every sender has been dropped.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        let receiver = match &mut self.feed {
            Feed::Primary(receiver) => return receiver.recv().await,
            Feed::Observer(receiver) => receiver,
        };
        loop {
            match receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "bus observer lagged, messages dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive a message without waiting.
    pub fn try_recv(&mut self) -> Option<BusMessage> {
        let receiver = match &mut self.feed {
            Feed::Primary(receiver) => return receiver.try_recv().ok(),
            Feed::Observer(receiver) => receiver,
        };
        loop {
            match receiver.try_recv() {
                Ok(message) => return Some(message),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Wait for end-of-stream or an error.
    ///
    /// Returns `Ok(())` on EOS, `Err(message)` on error.
    pub async fn wait_terminal(&mut self) -> Result<(), String> {
        while let Some(message) = self.recv().await {
            match message {
                BusMessage::Eos => return Ok(()),
                BusMessage::Error {
                    source, message, ..
                } => return Err(format!("Error in {}: {}", source, message)),
                _ => continue,
            }
        }
        Err("bus closed unexpectedly".to_string())
    }
}

/// Create a bus.
///
/// The returned receiver sees every message. `capacity` bounds the buffer
/// shared by observers created with [`BusSender::subscribe`].
pub fn bus(capacity: usize) -> (BusSender, BusReceiver) {
    let (primary, receiver) = mpsc::unbounded_channel();
    let (observers, _) = broadcast::channel(capacity);
    (
        BusSender { primary, observers },
        BusReceiver {
            feed: Feed::Primary(receiver),
        },
    )
}

/// Notifications about a single stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageSignal {
    /// The stage created a dynamic output port.
    PortAdded {
        /// Stage name.
        stage: String,
        /// New port name.
        port: String,
    },

    /// The stage removed a dynamic output port.
    PortRemoved {
        /// Stage name.
        stage: String,
        /// Removed port name.
        port: String,
    },

    /// A runtime property changed.
    PropertyChanged {
        /// Stage name.
        stage: String,
        /// Property key.
        property: String,
        /// New value.
        value: PropertyValue,
    },
}

impl StageSignal {
    /// Name of the stage the signal concerns.
    pub fn stage(&self) -> &str {
        match self {
            StageSignal::PortAdded { stage, .. }
            | StageSignal::PortRemoved { stage, .. }
            | StageSignal::PropertyChanged { stage, .. } => stage,
        }
    }
}

/// Sender side of the signal queue, held by the engine.
#[derive(Clone)]
pub struct SignalSender {
    sender: mpsc::UnboundedSender<StageSignal>,
}

impl SignalSender {
    /// Emit a signal. Signals emitted after the receiver is gone are dropped.
    pub fn emit(&self, signal: StageSignal) {
        if self.sender.send(signal).is_err() {
            tracing::trace!("signal receiver gone, dropping signal");
        }
    }

    /// Emit [`StageSignal::PortAdded`].
    pub fn port_added(&self, stage: impl Into<String>, port: impl Into<String>) {
        self.emit(StageSignal::PortAdded {
            stage: stage.into(),
            port: port.into(),
        });
    }
}

/// Receiver side of the signal queue.
pub struct SignalReceiver {
    receiver: mpsc::UnboundedReceiver<StageSignal>,
}

impl SignalReceiver {
    /// Receive the next signal.
    pub async fn recv(&mut self) -> Option<StageSignal> {
        self.receiver.recv().await
    }

    /// Try to receive a signal without waiting.
    pub fn try_recv(&mut self) -> Option<StageSignal> {
        self.receiver.try_recv().ok()
    }
}

/// Create a signal queue.
pub fn signals() -> (SignalSender, SignalReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (SignalSender { sender }, SignalReceiver { receiver })
}
