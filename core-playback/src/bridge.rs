//! # Property Bridge
//!
//! Turns telemetry from whichever backend is active into one ordered stream
//! of [`EngineMessage`]s for the presentation layer.
//!
//! ## Generations
//!
//! Every backend receives a [`BridgeEmitter`] stamped with the bridge's
//! generation at attach time. Attaching a new backend, or detaching the
//! current one, bumps the generation; from then on the old emitter's
//! messages are discarded. The generation check, sequence numbering and
//! queueing happen under one lock, so no message from an old backend can
//! interleave with the first message of its successor.
//!
//! ## Delivery
//!
//! The sink is called outside every lock. Whichever thread finds the queue
//! idle drains it, one message at a time; messages queued meanwhile (by other
//! backends, or by a sink that calls back into the engine) are delivered by
//! that same drain after the current `deliver` returns.
//!
//! ## Units
//!
//! Timing properties (`time-pos`, `duration`, `demuxer-cache-time`) are
//! delivered in seconds. Backends that track milliseconds report them with
//! [`BridgeEmitter::timing_ms`].
//!
//! ## Subscriptions
//!
//! Only observed property names are delivered; events always are. The
//! subscription list outlives backends and is replayed onto a new backend
//! after a swap.

use crate::traits::BackendKind;
use bridge_traits::PropertyFormat;
use core_runtime::events::{EngineMessage, MessageSink, PropertyValue};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;

/// Properties the engine observes by default, with their formats.
pub const DEFAULT_OBSERVED: &[(&str, PropertyFormat)] = &[
    ("time-pos", PropertyFormat::Double),
    ("duration", PropertyFormat::Double),
    ("pause", PropertyFormat::Flag),
    ("paused-for-cache", PropertyFormat::Flag),
    ("demuxer-cache-time", PropertyFormat::Double),
    ("eof-reached", PropertyFormat::Flag),
    ("track-list", PropertyFormat::Node),
    ("aid", PropertyFormat::String),
    ("sid", PropertyFormat::String),
    ("volume", PropertyFormat::Double),
    ("speed", PropertyFormat::Double),
];

/// A declared interest in one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub name: String,
    pub format: PropertyFormat,
}

struct BridgeState {
    generation: u64,
    active: Option<BackendKind>,
    sequence: u64,
    subscriptions: Vec<Subscription>,
    queue: VecDeque<EngineMessage>,
    draining: bool,
}

/// Latest values of the properties the orchestrator decides on.
#[derive(Default)]
struct Samples {
    position_secs: Option<f64>,
    paused: Option<bool>,
}

/// Normalizing, order-preserving telemetry bridge.
pub struct PropertyBridge {
    sink: Arc<dyn MessageSink>,
    state: Mutex<BridgeState>,
    samples: Mutex<Samples>,
}

impl PropertyBridge {
    /// Creates a bridge observing [`DEFAULT_OBSERVED`].
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        let subscriptions = DEFAULT_OBSERVED
            .iter()
            .map(|(name, format)| Subscription {
                name: (*name).to_string(),
                format: *format,
            })
            .collect();

        Self {
            sink,
            state: Mutex::new(BridgeState {
                generation: 0,
                active: None,
                sequence: 0,
                subscriptions,
                queue: VecDeque::new(),
                draining: false,
            }),
            samples: Mutex::new(Samples::default()),
        }
    }

    /// Installs `kind` as the only backend allowed to deliver. Messages from
    /// previously issued emitters are discarded from now on.
    pub fn attach(self: &Arc<Self>, kind: BackendKind) -> BridgeEmitter {
        let mut state = self.state.lock();
        state.generation += 1;
        state.active = Some(kind);
        BridgeEmitter {
            bridge: Arc::clone(self),
            generation: state.generation,
            kind,
        }
    }

    /// Stops delivery from the current backend.
    pub fn detach(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.active = None;
    }

    /// Forgets position and pause samples of the previous session.
    pub fn reset_samples(&self) {
        *self.samples.lock() = Samples::default();
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn active(&self) -> Option<BackendKind> {
        self.state.lock().active
    }

    /// Adds a subscription. Returns `false` if `name` was already observed.
    pub fn observe(&self, name: &str, format: PropertyFormat) -> bool {
        let mut state = self.state.lock();
        if state.subscriptions.iter().any(|s| s.name == name) {
            return false;
        }
        state.subscriptions.push(Subscription {
            name: name.to_string(),
            format,
        });
        true
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.state.lock().subscriptions.clone()
    }

    /// Last accepted `time-pos`, in milliseconds.
    pub fn last_position_ms(&self) -> Option<i64> {
        self.samples
            .lock()
            .position_secs
            .map(|secs| (secs * 1000.0).round() as i64)
    }

    /// Last accepted `pause` value.
    pub fn is_paused(&self) -> Option<bool> {
        self.samples.lock().paused
    }

    /// `true` only when the last `pause` value says playback is running.
    pub fn is_playing(&self) -> bool {
        self.is_paused() == Some(false)
    }

    /// Emits an engine-originated event (`backend-switched`, terminal
    /// `end-file`, ...). Not tied to a backend generation.
    pub fn emit_engine_event(&self, name: &str, data: Option<Value>) {
        {
            let mut state = self.state.lock();
            Self::enqueue(&mut state, EngineMessage::event(name, data));
        }
        self.drain();
    }

    fn deliver(&self, generation: u64, message: EngineMessage) -> bool {
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                trace!(message = %message, "Discarding message from detached backend");
                return false;
            }

            if let EngineMessage::Property { name, value, .. } = &message {
                if !state.subscriptions.iter().any(|s| &s.name == name) {
                    return false;
                }
                let mut samples = self.samples.lock();
                match name.as_str() {
                    "time-pos" => samples.position_secs = value.as_f64(),
                    "pause" => samples.paused = value.as_bool(),
                    _ => {}
                }
            }

            Self::enqueue(&mut state, message);
        }
        self.drain();
        true
    }

    fn enqueue(state: &mut BridgeState, message: EngineMessage) {
        state.sequence += 1;
        let sequence = state.sequence;
        state.queue.push_back(message.with_sequence(sequence));
    }

    /// Hands queued messages to the sink unless another drain is running.
    fn drain(&self) {
        {
            let mut state = self.state.lock();
            if state.draining {
                return;
            }
            state.draining = true;
        }

        let guard = DrainGuard(self);
        loop {
            let next = {
                let mut state = self.state.lock();
                let next = state.queue.pop_front();
                if next.is_none() {
                    state.draining = false;
                }
                next
            };
            match next {
                Some(message) => self.sink.deliver(message),
                None => break,
            }
        }
        std::mem::forget(guard);
    }
}

/// Releases the drain when the sink panics mid-delivery.
struct DrainGuard<'a>(&'a PropertyBridge);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.state.lock().draining = false;
    }
}

/// Backend-side handle for emitting telemetry.
#[derive(Clone)]
pub struct BridgeEmitter {
    bridge: Arc<PropertyBridge>,
    generation: u64,
    kind: BackendKind,
}

impl BridgeEmitter {
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Whether messages from this emitter are still delivered.
    pub fn is_current(&self) -> bool {
        self.bridge.generation() == self.generation
    }

    /// Emits a property change. Returns `false` if it was discarded.
    pub fn property(&self, name: &str, value: impl Into<PropertyValue>) -> bool {
        self.bridge
            .deliver(self.generation, EngineMessage::property(name, value))
    }

    /// Emits a timing property reported in milliseconds, converted to seconds.
    pub fn timing_ms(&self, name: &str, millis: i64) -> bool {
        self.property(name, PropertyValue::Double(millis as f64 / 1000.0))
    }

    pub fn event(&self, name: &str, data: Option<Value>) -> bool {
        self.bridge
            .deliver(self.generation, EngineMessage::event(name, data))
    }
}
