use super::HostTransport;

/// A transport source for running without a host: advances the beat
/// position from tempo, sample rate and the number of frames per block.
#[derive(Debug, Clone)]
pub struct FreeRunningClock {
    tempo: f64,
    sample_rate: f64,
    time_signature: (i32, i32),
    beat: f64,
    playing: bool,
}

impl FreeRunningClock {
    pub fn new(tempo: f64, sample_rate: f64) -> Self {
        Self {
            tempo,
            sample_rate,
            time_signature: (4, 4),
            beat: 0.0,
            playing: false,
        }
    }

    pub fn with_time_signature(mut self, numerator: i32, denominator: i32) -> Self {
        self.time_signature = (numerator, denominator);
        self
    }

    pub fn start(&mut self) {
        self.playing = true;
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    pub fn locate(&mut self, beat: f64) {
        self.beat = beat;
    }

    pub fn set_tempo(&mut self, tempo: f64) {
        self.tempo = tempo;
    }

    pub fn beat(&self) -> f64 {
        self.beat
    }

    pub fn beats_per_sample(&self) -> f64 {
        self.tempo / 60.0 / self.sample_rate
    }

    /// Transport for a block of `frames` samples starting at the current
    /// position; the clock then moves past the block if it is running.
    pub fn next_block(&mut self, frames: usize) -> HostTransport {
        let transport = HostTransport {
            tempo: Some(self.tempo),
            beat_position: Some(self.beat),
            time_signature: Some(self.time_signature),
            playing: self.playing,
            sample_rate: self.sample_rate,
            block_size: frames,
        };

        if self.playing {
            self.beat += frames as f64 * self.beats_per_sample();
        }

        transport
    }
}
