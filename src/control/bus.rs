//! Reaction to engine bus messages.

use crate::engine::Engine;
use crate::pipeline::{BusMessage, RunState, TopologyGraph};
use std::fmt;

/// Why the control loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// A stage posted a fatal error.
    Error {
        /// Stage that posted the error.
        source: String,
        /// Error message.
        message: String,
    },
    /// The output reached end-of-stream.
    EndOfStream,
    /// Shutdown was requested from outside (e.g. Ctrl-C).
    Shutdown,
    /// The engine dropped the bus.
    BusClosed,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Error { source, message } => write!(f, "error from {source}: {message}"),
            ExitReason::EndOfStream => write!(f, "end of stream"),
            ExitReason::Shutdown => write!(f, "shutdown requested"),
            ExitReason::BusClosed => write!(f, "bus closed"),
        }
    }
}

/// Whether to keep watching the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Watch {
    /// Keep handling messages.
    Continue,
    /// Leave the event loop; the graph has been stopped.
    Exit(ExitReason),
}

/// Maps bus messages to graph lifecycle actions.
#[derive(Debug, Default)]
pub struct EventBusHandler {
    seen: u64,
}

impl EventBusHandler {
    /// Create a handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages handled so far.
    pub fn messages_seen(&self) -> u64 {
        self.seen
    }

    /// Handle one message.
    ///
    /// Errors stop the graph. End-of-stream drains and then stops it. Any
    /// other message is only logged.
    pub fn handle<E: Engine>(&mut self, graph: &mut TopologyGraph<E>, message: &BusMessage) -> Watch {
        self.seen += 1;
        tracing::debug!("Got {} message", message.type_name());

        match message {
            BusMessage::Error {
                source,
                message,
                cause,
            } => {
                tracing::error!(source = %source, "Error: {message}");
                tracing::debug!(source = %source, "Debugging information: {cause}");
                graph.stop();
                Watch::Exit(ExitReason::Error {
                    source: source.clone(),
                    message: message.clone(),
                })
            }
            BusMessage::Eos => {
                tracing::info!("End-Of-Stream reached");
                if graph.run_state() == RunState::Playing {
                    if let Err(e) = graph.drain() {
                        tracing::warn!(error = %e, "could not drain");
                    }
                }
                graph.stop();
                Watch::Exit(ExitReason::EndOfStream)
            }
            BusMessage::Warning { source, message } => {
                tracing::debug!(source = %source, "Warning: {message}");
                Watch::Continue
            }
            BusMessage::StateChanged { .. }
            | BusMessage::StreamStart { .. }
            | BusMessage::Element { .. } => Watch::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineState;
    use crate::engine::mock::MockEngine;
    use crate::stage::StageDescriptor;

    fn playing_graph() -> TopologyGraph<MockEngine> {
        let mut graph = TopologyGraph::new(MockEngine::new());
        graph
            .add_stage(&StageDescriptor::new("videotestsrc", "src1"))
            .unwrap();
        graph.start().unwrap();
        graph
    }

    #[test]
    fn test_error_stops_and_exits() {
        let mut graph = playing_graph();
        let mut handler = EventBusHandler::new();

        let watch = handler.handle(
            &mut graph,
            &BusMessage::error("dec1", "Could not open resource for reading.", "ENOENT"),
        );

        assert_eq!(
            watch,
            Watch::Exit(ExitReason::Error {
                source: "dec1".into(),
                message: "Could not open resource for reading.".into(),
            })
        );
        assert_eq!(graph.run_state(), RunState::Stopped);
        assert_eq!(graph.engine().release_count("src1"), 1);
    }

    #[test]
    fn test_eos_drains_then_stops() {
        let mut graph = playing_graph();
        let mut handler = EventBusHandler::new();

        assert_eq!(
            handler.handle(&mut graph, &BusMessage::Eos),
            Watch::Exit(ExitReason::EndOfStream)
        );
        assert_eq!(
            graph.state_history(),
            &[
                RunState::Idle,
                RunState::Playing,
                RunState::Draining,
                RunState::Stopped
            ]
        );
    }

    #[test]
    fn test_other_messages_continue() {
        let mut graph = playing_graph();
        let mut handler = EventBusHandler::new();

        for message in [
            BusMessage::StateChanged {
                from: EngineState::Ready,
                to: EngineState::Playing,
            },
            BusMessage::StreamStart {
                source: "src1".into(),
            },
            BusMessage::Warning {
                source: "src1".into(),
                message: "late frame".into(),
            },
            BusMessage::Element {
                source: "src1".into(),
                name: "progress".into(),
            },
        ] {
            assert_eq!(handler.handle(&mut graph, &message), Watch::Continue);
        }
        assert_eq!(handler.messages_seen(), 4);
        assert_eq!(graph.run_state(), RunState::Playing);
    }

    #[test]
    fn test_error_after_stop_is_harmless() {
        let mut graph = playing_graph();
        graph.stop();
        let mut handler = EventBusHandler::new();

        let watch = handler.handle(&mut graph, &BusMessage::error("src1", "late", ""));
        assert!(matches!(watch, Watch::Exit(_)));
        assert_eq!(graph.engine().release_count("src1"), 1);
    }
}
