//! The control-plane event loop.

use super::bus::{EventBusHandler, ExitReason, Watch};
use super::switch::{Schedule, SwitchController};
use crate::engine::Engine;
use crate::error::Result;
use crate::pipeline::{BusReceiver, RunState, SignalReceiver, TopologyGraph};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

/// Owns a graph and serialises everything that happens to it.
///
/// Bus messages, stage signals and switch ticks are handled one at a time
/// on the task running [`run`](Self::run), so the graph is never shared.
pub struct Controller<E: Engine> {
    graph: TopologyGraph<E>,
    bus: BusReceiver,
    signals: SignalReceiver,
    switch: SwitchController,
    handler: EventBusHandler,
}

impl<E: Engine> Controller<E> {
    /// Create a controller.
    pub fn new(
        graph: TopologyGraph<E>,
        bus: BusReceiver,
        signals: SignalReceiver,
        switch: SwitchController,
    ) -> Self {
        Self {
            graph,
            bus,
            signals,
            switch,
            handler: EventBusHandler::new(),
        }
    }

    /// Start the graph and run until an error or end-of-stream.
    pub async fn run(&mut self) -> Result<ExitReason> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Like [`run`](Self::run), but also return when `shutdown` completes.
    ///
    /// The graph is stopped whichever way the loop ends. The first switch
    /// happens one full period after the start.
    pub async fn run_until<F: Future>(&mut self, shutdown: F) -> Result<ExitReason> {
        let Self {
            graph,
            bus,
            signals,
            switch,
            handler,
        } = self;

        if graph.run_state() == RunState::Idle {
            graph.start()?;
        }

        tokio::pin!(shutdown);
        // interval_at panics on a zero period
        let period = switch.period().max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut switching = true;
        let mut signals_open = true;

        let reason = loop {
            tokio::select! {
                message = bus.recv() => match message {
                    Some(message) => {
                        if let Watch::Exit(reason) = handler.handle(graph, &message) {
                            break reason;
                        }
                    }
                    None => break ExitReason::BusClosed,
                },
                signal = signals.recv(), if signals_open => match signal {
                    Some(signal) => {
                        graph.handle_signal(&signal);
                    }
                    None => signals_open = false,
                },
                _ = ticker.tick(), if switching => {
                    if switch.tick(graph) == Schedule::Cancel {
                        switching = false;
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break ExitReason::Shutdown;
                }
            }
        };

        graph.stop();
        tracing::info!(reason = %reason, "control loop finished");
        Ok(reason)
    }

    /// The controlled graph.
    pub fn graph(&self) -> &TopologyGraph<E> {
        &self.graph
    }

    /// The switch controller.
    pub fn switch(&self) -> &SwitchController {
        &self.switch
    }

    /// Give the graph back.
    pub fn into_graph(self) -> TopologyGraph<E> {
        self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockEngine;
    use crate::pipeline::events::{bus, signals};
    use crate::pipeline::{BusMessage, SegmentBuilder, StageSignal};
    use crate::stage::StageDescriptor;

    fn graph() -> TopologyGraph<MockEngine> {
        let mut graph = TopologyGraph::new(MockEngine::new());
        SegmentBuilder::new("a")
            .stage(StageDescriptor::new("rtspsrc", "src0"))
            .stage(StageDescriptor::new("rtph265depay", "depay0"))
            .build(&mut graph)
            .unwrap();
        let out = SegmentBuilder::new("out")
            .stage(StageDescriptor::new("input-selector", "video_switch"))
            .stage(StageDescriptor::new("fakesink", "video_sink"))
            .build(&mut graph)
            .unwrap();
        let a = graph.segment("a").unwrap().clone();
        graph.wire(&[a], &out).unwrap();
        graph
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_message_ends_loop() {
        let (bus_tx, bus_rx) = bus(16);
        let (_signal_tx, signal_rx) = signals();
        let graph = graph();
        let switch = SwitchController::for_graph(&graph, Duration::from_millis(1000)).unwrap();
        let mut controller = Controller::new(graph, bus_rx, signal_rx, switch);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            bus_tx.post_error("src0", "Could not connect", "timeout");
            // Keep the bus open until the loop has exited
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let reason = controller.run().await.unwrap();
        assert!(matches!(reason, ExitReason::Error { ref source, .. } if source == "src0"));
        assert_eq!(controller.graph().run_state(), RunState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signals_are_applied() {
        let (bus_tx, bus_rx) = bus(16);
        let (signal_tx, signal_rx) = signals();
        let graph = graph();
        let switch = SwitchController::for_graph(&graph, Duration::from_millis(1000)).unwrap();
        let mut controller = Controller::new(graph, bus_rx, signal_rx, switch);

        signal_tx.emit(StageSignal::PortAdded {
            stage: "src0".into(),
            port: "recv_rtp_src_0_0_96".into(),
        });
        signal_tx.emit(StageSignal::PortAdded {
            stage: "src0".into(),
            port: "recv_rtp_src_0_0_96".into(),
        });

        let shutdown = tokio::time::sleep(Duration::from_millis(500));
        let reason = controller.run_until(shutdown).await.unwrap();
        assert_eq!(reason, ExitReason::Shutdown);

        let graph = controller.into_graph();
        let src = graph.stage_id("src0").unwrap();
        let depay = graph.stage_id("depay0").unwrap();
        assert_eq!(graph.link_count_between(src, depay), 1);
        assert_eq!(graph.run_state(), RunState::Stopped);
        drop(bus_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eos_ends_loop_via_draining() {
        let (bus_tx, bus_rx) = bus(16);
        let (_signal_tx, signal_rx) = signals();
        let graph = graph();
        let switch = SwitchController::for_graph(&graph, Duration::from_millis(1000)).unwrap();
        let mut controller = Controller::new(graph, bus_rx, signal_rx, switch);

        bus_tx.post(BusMessage::StreamStart {
            source: "src0".into(),
        });
        bus_tx.post_eos();

        assert_eq!(controller.run().await.unwrap(), ExitReason::EndOfStream);
        assert_eq!(
            controller.graph().state_history(),
            &[
                RunState::Idle,
                RunState::Playing,
                RunState::Draining,
                RunState::Stopped
            ]
        );
    }
}
