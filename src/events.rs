/// Controller number that silences every sounding note on a channel.
pub const ALL_NOTES_OFF: u8 = 123;

/// Synthetic controller id the host uses to carry pitch bend.
pub const PITCH_BEND_CONTROLLER: u8 = 129;

pub const MIDI_CHANNELS: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MidiEvent {
    NoteOn {
        note: u8,
        velocity: u8,
        channel: u8,
        sample_offset: i32,
    },
    NoteOff {
        note: u8,
        channel: u8,
        sample_offset: i32,
    },
    ControlChange {
        controller: u8,
        value: u8,
        channel: u8,
        sample_offset: i32,
    },
    PitchBend {
        value: i16,
        channel: u8,
        sample_offset: i32,
    },
}

impl MidiEvent {
    pub fn note_on(note: u8, velocity: u8, channel: u8) -> Self {
        MidiEvent::NoteOn {
            note,
            velocity,
            channel,
            sample_offset: 0,
        }
    }

    pub fn note_off(note: u8, channel: u8) -> Self {
        MidiEvent::NoteOff {
            note,
            channel,
            sample_offset: 0,
        }
    }

    pub fn control_change(controller: u8, value: u8, channel: u8) -> Self {
        MidiEvent::ControlChange {
            controller,
            value,
            channel,
            sample_offset: 0,
        }
    }

    pub fn pitch_bend(value: i16, channel: u8) -> Self {
        MidiEvent::PitchBend {
            value,
            channel,
            sample_offset: 0,
        }
    }

    pub fn all_notes_off(channel: u8) -> Self {
        Self::control_change(ALL_NOTES_OFF, 0, channel)
    }

    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::PitchBend { channel, .. } => channel,
        }
    }

    pub fn sample_offset(&self) -> i32 {
        match *self {
            MidiEvent::NoteOn { sample_offset, .. }
            | MidiEvent::NoteOff { sample_offset, .. }
            | MidiEvent::ControlChange { sample_offset, .. }
            | MidiEvent::PitchBend { sample_offset, .. } => sample_offset,
        }
    }
}

/// Clamps a script-supplied integer into a 7-bit MIDI data byte.
pub fn data_byte(value: i64) -> u8 {
    value.clamp(0, 127) as u8
}

pub fn channel_number(value: i64) -> u8 {
    value.clamp(0, MIDI_CHANNELS as i64 - 1) as u8
}

pub fn bend_value(value: i64) -> i16 {
    value.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

/// An event in the host's output event list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostEvent {
    pub sample_offset: i32,
    /// Transport position (in quarter notes) of the block that produced it.
    pub ppq_position: f64,
    pub kind: HostEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostEventKind {
    NoteOn {
        channel: u8,
        pitch: u8,
        velocity: f32,
        note_id: i32,
    },
    NoteOff {
        channel: u8,
        pitch: u8,
        velocity: f32,
        note_id: i32,
    },
    ControlChange {
        channel: u8,
        controller: u8,
        value: i32,
    },
}

impl HostEvent {
    pub fn from_midi(event: MidiEvent, ppq_position: f64) -> Self {
        let kind = match event {
            MidiEvent::NoteOn {
                note,
                velocity,
                channel,
                ..
            } => HostEventKind::NoteOn {
                channel,
                pitch: note,
                velocity: velocity as f32 / 127.0,
                note_id: note as i32,
            },
            MidiEvent::NoteOff { note, channel, .. } => HostEventKind::NoteOff {
                channel,
                pitch: note,
                velocity: 0.0,
                note_id: note as i32,
            },
            MidiEvent::ControlChange {
                controller,
                value,
                channel,
                ..
            } => HostEventKind::ControlChange {
                channel,
                controller,
                value: value as i32,
            },
            MidiEvent::PitchBend { value, channel, .. } => HostEventKind::ControlChange {
                channel,
                controller: PITCH_BEND_CONTROLLER,
                value: value as i32,
            },
        };

        HostEvent {
            sample_offset: event.sample_offset(),
            ppq_position,
            kind,
        }
    }

    /// Renders the event as a raw MIDI 1.0 message, for hosts that talk to
    /// hardware ports directly. Controllers outside the MIDI range other than
    /// pitch bend have no wire form.
    pub fn to_midi_bytes(&self) -> Option<[u8; 3]> {
        match self.kind {
            HostEventKind::NoteOn {
                channel,
                pitch,
                velocity,
                ..
            } => {
                let velocity = (velocity.clamp(0.0, 1.0) * 127.0).round() as u8;
                Some([0x90 | (channel & 0x0F), pitch & 0x7F, velocity])
            }
            HostEventKind::NoteOff { channel, pitch, .. } => {
                Some([0x80 | (channel & 0x0F), pitch & 0x7F, 0])
            }
            HostEventKind::ControlChange {
                channel,
                controller: PITCH_BEND_CONTROLLER,
                value,
            } => {
                // signed 16-bit bend onto the 14-bit wire range, centre 8192
                let bend = ((value.clamp(i16::MIN as i32, i16::MAX as i32) + 32768) >> 2) as u16;
                Some([
                    0xE0 | (channel & 0x0F),
                    (bend & 0x7F) as u8,
                    ((bend >> 7) & 0x7F) as u8,
                ])
            }
            HostEventKind::ControlChange {
                channel,
                controller,
                value,
            } if controller < 128 => Some([
                0xB0 | (channel & 0x0F),
                controller,
                value.clamp(0, 127) as u8,
            ]),
            HostEventKind::ControlChange { .. } => None,
        }
    }
}

/// Receives the events a block produced, in emission order.
pub trait EventSink {
    fn push(&mut self, event: HostEvent);
}

impl EventSink for Vec<HostEvent> {
    fn push(&mut self, event: HostEvent) {
        Vec::push(self, event);
    }
}
