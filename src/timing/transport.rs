/// Transport fields a host hands over with each block. Optional fields are
/// only present when the host marks them valid; absent ones keep their
/// previous value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostTransport {
    pub tempo: Option<f64>,
    pub beat_position: Option<f64>,
    pub time_signature: Option<(i32, i32)>,
    pub playing: bool,
    pub sample_rate: f64,
    pub block_size: usize,
}

/// Playback position as seen by one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportSnapshot {
    /// Position in quarter notes.
    pub beat: f64,
    /// Bar index, derived from `beat` and `time_sig_num`.
    pub bar: i32,
    pub tempo: f64,
    pub playing: bool,
    pub sample_rate: f64,
    pub time_sig_num: i32,
    pub time_sig_den: i32,
    /// `floor(beat)` of the previous block.
    pub last_beat_int: i32,
}

impl Default for TransportSnapshot {
    fn default() -> Self {
        Self {
            beat: 0.0,
            bar: 0,
            tempo: 120.0,
            playing: false,
            sample_rate: 44100.0,
            time_sig_num: 4,
            time_sig_den: 4,
            last_beat_int: -1,
        }
    }
}

impl TransportSnapshot {
    pub fn update(&mut self, host: &HostTransport) {
        if let Some(tempo) = host.tempo {
            self.tempo = tempo;
        }
        if let Some(beat) = host.beat_position {
            self.beat = beat;
        }
        if let Some((num, den)) = host.time_signature {
            self.time_sig_num = num;
            self.time_sig_den = den;
        }
        self.playing = host.playing;
        self.sample_rate = host.sample_rate;

        if self.time_sig_num > 0 {
            self.bar = (self.beat / self.time_sig_num as f64).floor() as i32;
        }
    }

    pub fn current_beat_int(&self) -> i32 {
        self.beat.floor() as i32
    }

    /// True when the integer beat changed since the previous block while the
    /// transport is rolling.
    pub fn is_beat_boundary(&self) -> bool {
        self.playing && self.current_beat_int() != self.last_beat_int
    }

    /// Remembers this block's integer beat for the next boundary check.
    pub fn mark_beat(&mut self) {
        self.last_beat_int = self.current_beat_int();
    }
}
