use crate::channels::{EventProducer, LogProducer};
use crate::events::{MIDI_CHANNELS, MidiEvent};
use crate::timing::{NoteOffSchedule, ScheduledNoteOff, TransportSnapshot};
use parking_lot::Mutex;
use ringbuf::traits::Producer;
use std::sync::Arc;

/// Everything a script is allowed to touch: the event and log writers, the
/// transport as of this block and the pending note-offs.
#[derive(Default)]
pub struct PluginContext {
    events: Option<EventProducer>,
    logs: Option<LogProducer>,
    transport: TransportSnapshot,
    note_offs: NoteOffSchedule,
    dropped: DropCounts,
}

/// Items refused since the counters were last taken.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DropCounts {
    pub events: u32,
    pub notes: u32,
    pub log_lines: u32,
}

impl DropCounts {
    pub fn is_empty(&self) -> bool {
        self.events == 0 && self.notes == 0 && self.log_lines == 0
    }
}

impl PluginContext {
    pub fn new(events: EventProducer, logs: LogProducer, note_offs: NoteOffSchedule) -> Self {
        Self {
            events: Some(events),
            logs: Some(logs),
            note_offs,
            ..Default::default()
        }
    }

    /// A context with no channels; every emission is a no-op.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn transport(&self) -> &TransportSnapshot {
        &self.transport
    }

    pub fn set_transport(&mut self, transport: TransportSnapshot) {
        self.transport = transport;
    }

    pub fn note_offs(&self) -> &NoteOffSchedule {
        &self.note_offs
    }

    pub fn emit(&mut self, event: MidiEvent) {
        let Some(events) = self.events.as_mut() else {
            return;
        };
        if events.try_push(event).is_err() {
            self.dropped.events += 1;
        }
    }

    pub fn log(&mut self, line: String) {
        let Some(logs) = self.logs.as_mut() else {
            return;
        };
        if logs.try_push(line).is_err() {
            self.dropped.log_lines += 1;
        }
    }

    /// Starts a note now and schedules its release `duration` beats later.
    /// When the schedule is full the note is not started at all.
    pub fn play_note(&mut self, note: u8, velocity: u8, duration: f64, channel: u8) {
        if self.events.is_none() {
            return;
        }
        let duration = if duration.is_finite() {
            duration.max(0.0)
        } else {
            0.0
        };
        let entry = ScheduledNoteOff {
            note,
            channel,
            end_beat: self.transport.beat + duration,
        };
        if self.note_offs.schedule(entry).is_err() {
            self.dropped.notes += 1;
            return;
        }
        self.emit(MidiEvent::note_on(note, velocity, channel));
    }

    /// Emits the note-off of every scheduled note whose end beat has passed.
    pub fn release_due_note_offs(&mut self) {
        let beat = self.transport.beat;
        let Self {
            events,
            note_offs,
            dropped,
            ..
        } = self;
        note_offs.release_due(beat, |event| {
            if let Some(events) = events.as_mut() {
                if events.try_push(event).is_err() {
                    dropped.events += 1;
                }
            }
        });
    }

    /// CC 123 on every channel and forgets all pending note-offs.
    pub fn all_notes_off(&mut self) {
        for channel in 0..MIDI_CHANNELS {
            self.emit(MidiEvent::all_notes_off(channel));
        }
        self.note_offs.clear();
    }

    pub fn take_dropped(&mut self) -> DropCounts {
        std::mem::take(&mut self.dropped)
    }
}

/// Shared ownership of one [`PluginContext`] between the block driver and
/// the capability functions bound into a single interpreter.
///
/// The mutex is a borrow guard, not synchronization: capability closures
/// must be `Send` to live in the interpreter, so the context cannot sit in
/// a `RefCell`. Only the audio thread ever reaches it, always through
/// `try_lock`, and a busy guard is treated like a missing channel, so the
/// audio path never waits on it.
#[derive(Clone, Default)]
pub struct ContextHandle(Arc<Mutex<PluginContext>>);

impl ContextHandle {
    pub fn new(context: PluginContext) -> Self {
        Self(Arc::new(Mutex::new(context)))
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut PluginContext) -> R) -> Option<R> {
        self.0.try_lock().map(|mut context| f(&mut *context))
    }

    /// Moves the context out, leaving a detached one behind so that any
    /// function still holding this handle can no longer reach the channels.
    pub fn detach(&self) -> PluginContext {
        self.with(std::mem::take).unwrap_or_default()
    }
}
