//! The three single-producer/single-consumer queues that connect the editor
//! thread and the audio thread. All of them are fixed-capacity heap ring
//! buffers: pushing never blocks and never allocates, a full queue simply
//! refuses the item.

use crate::events::MidiEvent;
use ringbuf::{HeapCons, HeapProd, HeapRb, traits::Split};

/// A request to replace the running script. An empty source stops it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSwapMessage {
    pub source: String,
}

impl ScriptSwapMessage {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn stop() -> Self {
        Self::new(String::new())
    }

    pub fn is_stop(&self) -> bool {
        self.source.is_empty()
    }
}

pub type ScriptProducer = HeapProd<ScriptSwapMessage>;
pub type ScriptConsumer = HeapCons<ScriptSwapMessage>;

pub type EventProducer = HeapProd<MidiEvent>;
pub type EventConsumer = HeapCons<MidiEvent>;

pub type LogProducer = HeapProd<String>;
pub type LogConsumer = HeapCons<String>;

pub fn script_channel(capacity: usize) -> (ScriptProducer, ScriptConsumer) {
    HeapRb::<ScriptSwapMessage>::new(capacity.max(1)).split()
}

pub fn event_channel(capacity: usize) -> (EventProducer, EventConsumer) {
    HeapRb::<MidiEvent>::new(capacity.max(1)).split()
}

pub fn log_channel(capacity: usize) -> (LogProducer, LogConsumer) {
    HeapRb::<String>::new(capacity.max(1)).split()
}
