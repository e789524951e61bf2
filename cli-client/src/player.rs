use std::time::Duration;
use tokio::time::Instant;

/// The local media element an agent drives.
pub trait Actuator {
    fn play(&mut self);
    fn pause(&mut self);
    fn paused(&self) -> bool;
    /// Seconds from the start of the media.
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, secs: f64);
    /// Length in seconds, `NaN` until the media has loaded.
    fn duration(&self) -> f64;
}

/// A video stand-in whose position follows the clock while playing.
#[derive(Debug)]
pub struct SimulatedPlayer {
    length: f64,
    ready_at: Instant,
    offset: f64,
    playing_since: Option<Instant>,
}

impl SimulatedPlayer {
    pub fn new(length: Duration, load_delay: Duration) -> Self {
        Self {
            length: length.as_secs_f64(),
            ready_at: Instant::now() + load_delay,
            offset: 0.0,
            playing_since: None,
        }
    }

    fn loaded(&self) -> bool {
        Instant::now() >= self.ready_at
    }
}

impl Actuator for SimulatedPlayer {
    fn play(&mut self) {
        if self.playing_since.is_none() {
            self.playing_since = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        self.offset = self.current_time();
        self.playing_since = None;
    }

    fn paused(&self) -> bool {
        self.playing_since.is_none()
    }

    fn current_time(&self) -> f64 {
        let elapsed = self
            .playing_since
            .map_or(0.0, |since| since.elapsed().as_secs_f64());
        (self.offset + elapsed).min(self.length)
    }

    fn set_current_time(&mut self, secs: f64) {
        self.offset = secs.clamp(0.0, self.length);
        if self.playing_since.is_some() {
            self.playing_since = Some(Instant::now());
        }
    }

    fn duration(&self) -> f64 {
        if self.loaded() {
            self.length
        } else {
            f64::NAN
        }
    }
}
