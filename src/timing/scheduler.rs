use crate::events::MidiEvent;

/// A note-off waiting for the transport to reach `end_beat`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledNoteOff {
    pub note: u8,
    pub channel: u8,
    pub end_beat: f64,
}

/// Pending note-offs in insertion order. Storage is reserved up front and
/// never grows, so scheduling from the audio thread does not allocate.
#[derive(Debug, Default)]
pub struct NoteOffSchedule {
    pending: Vec<ScheduledNoteOff>,
    capacity: usize,
}

impl NoteOffSchedule {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn schedule(&mut self, entry: ScheduledNoteOff) -> Result<(), SchedulerError> {
        if self.pending.len() >= self.capacity {
            return Err(SchedulerError::Full);
        }
        self.pending.push(entry);
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.capacity
    }

    /// Removes every entry due at `beat` and hands its note-off to `emit`,
    /// oldest first. Entries not yet due keep their relative order.
    pub fn release_due(&mut self, beat: f64, mut emit: impl FnMut(MidiEvent)) -> usize {
        let before = self.pending.len();
        self.pending.retain(|entry| {
            if beat >= entry.end_beat {
                emit(MidiEvent::note_off(entry.note, entry.channel));
                false
            } else {
                true
            }
        });
        before - self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduledNoteOff> {
        self.pending.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchedulerError {
    Full,
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::Full => write!(f, "Note-off schedule is full"),
        }
    }
}

impl std::error::Error for SchedulerError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn off(note: u8, end_beat: f64) -> ScheduledNoteOff {
        ScheduledNoteOff {
            note,
            channel: 0,
            end_beat,
        }
    }

    #[test]
    fn releases_only_due_entries_in_insertion_order() {
        let mut schedule = NoteOffSchedule::with_capacity(8);
        schedule.schedule(off(64, 2.0)).unwrap();
        schedule.schedule(off(60, 1.0)).unwrap();
        schedule.schedule(off(67, 1.5)).unwrap();

        let mut released = Vec::new();
        let count = schedule.release_due(1.5, |event| released.push(event));

        assert_eq!(count, 2);
        assert_eq!(
            released,
            vec![MidiEvent::note_off(60, 0), MidiEvent::note_off(67, 0)]
        );
        assert_eq!(schedule.iter().map(|e| e.note).collect::<Vec<_>>(), vec![64]);
    }

    #[test]
    fn deadline_is_inclusive() {
        let mut schedule = NoteOffSchedule::with_capacity(1);
        schedule.schedule(off(60, 1.0)).unwrap();
        assert_eq!(schedule.release_due(0.999, |_| {}), 0);
        assert_eq!(schedule.release_due(1.0, |_| {}), 1);
        assert!(schedule.is_empty());
    }

    #[test]
    fn refuses_entries_past_capacity() {
        let mut schedule = NoteOffSchedule::with_capacity(2);
        schedule.schedule(off(60, 1.0)).unwrap();
        schedule.schedule(off(61, 1.0)).unwrap();
        assert!(schedule.is_full());
        assert_eq!(schedule.schedule(off(62, 1.0)), Err(SchedulerError::Full));
        assert_eq!(schedule.len(), 2);
    }
}
