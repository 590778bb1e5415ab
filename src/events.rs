//! Injectable trace sink decoupling the algorithm from any output format.
//!
//! Every color transition and phase boundary is reported as a structured
//! [`TraceEvent`]; what happens to it (stdout, log facade, channel, buffer,
//! nothing) is the sink's business, not the collector's.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::collector::Phase;
use crate::color::Color;
use crate::heap::NodeId;

/// Who performed a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// The collector driver (initial mark, re-mark, sweep reset).
    Driver,
    /// A concurrent marker worker, by index.
    Marker(usize),
    /// The simulated mutator, via the write barrier.
    Mutator,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Driver => write!(f, "driver"),
            Actor::Marker(worker) => write!(f, "marker-{worker}"),
            Actor::Mutator => write!(f, "mutator"),
        }
    }
}

/// Structured trace record emitted by the collector and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A node's color advanced (or was reset at sweep time).
    ColorTransition {
        node: NodeId,
        from: Color,
        to: Color,
        phase: Phase,
        actor: Actor,
    },
    /// The write barrier shaded `child` grey because `parent` was black.
    BarrierShade { parent: NodeId, child: NodeId },
    /// The driver crossed a phase boundary.
    PhaseChange { from: Phase, to: Phase },
    /// A cycle finished with the given partition sizes.
    CycleComplete { garbage: usize, live: usize },
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::ColorTransition {
                node,
                from,
                to,
                phase,
                actor,
            } => write!(f, "[{phase}] {actor}: {node} {from} -> {to}"),
            TraceEvent::BarrierShade { parent, child } => {
                write!(f, "barrier: black {parent} -> white {child}, shaded grey")
            }
            TraceEvent::PhaseChange { from, to } => write!(f, "phase: {from} -> {to}"),
            TraceEvent::CycleComplete { garbage, live } => {
                write!(f, "cycle complete: {garbage} garbage, {live} live")
            }
        }
    }
}

/// Observer for collection activity. Implementations must tolerate calls
/// from the driver, markers, and the mutator concurrently.
pub trait TraceSink: Send + Sync {
    fn emit(&self, event: TraceEvent);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn emit(&self, _event: TraceEvent) {}
}

/// Buffers events in memory; the sink tests assert against.
///
/// # Examples
///
/// ```
/// use trimark::events::{MemorySink, TraceEvent, TraceSink};
///
/// let sink = MemorySink::new();
/// sink.emit(TraceEvent::CycleComplete { garbage: 1, live: 5 });
/// assert_eq!(sink.take().len(), 1);
/// assert!(sink.take().is_empty());
/// ```
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<TraceEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    /// Drain and return everything recorded so far.
    pub fn take(&self) -> Vec<TraceEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Clone of the recorded events, leaving the buffer intact.
    pub fn snapshot(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }
}

impl TraceSink for MemorySink {
    fn emit(&self, event: TraceEvent) {
        self.events.lock().push(event);
    }
}

/// Forwards events over a flume channel, e.g. to a consumer thread. A closed
/// receiver simply drops further events.
pub struct ChannelSink {
    sender: flume::Sender<TraceEvent>,
}

impl ChannelSink {
    pub fn new(sender: flume::Sender<TraceEvent>) -> Self {
        ChannelSink { sender }
    }
}

impl TraceSink for ChannelSink {
    fn emit(&self, event: TraceEvent) {
        let _ = self.sender.send(event);
    }
}

/// Routes events through the `log` facade at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn emit(&self, event: TraceEvent) {
        log::debug!(target: "trimark", "{event}");
    }
}

/// Fan out one event stream to several sinks.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TraceSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn TraceSink>>) -> Self {
        FanoutSink { sinks }
    }
}

impl TraceSink for FanoutSink {
    fn emit(&self, event: TraceEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
