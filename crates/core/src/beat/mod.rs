use std::{sync::Arc, time::Duration};

use tokio::time::{sleep, Instant};

use crate::PinkyDisplay;

/// Time left until the next beat boundary, measured against the fixed
/// anchor rather than the previous wake-up so scheduling jitter never
/// accumulates. Exactly on a boundary, the full period is returned.
pub fn delay_to_next_beat(since_start: Duration, period: Duration) -> Duration {
    let period_nanos = period.as_nanos().max(1);
    let offset = since_start.as_nanos() % period_nanos;
    let nanos = period_nanos - offset;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Beat counter anchored to the instant it was started.
#[derive(Debug, Clone)]
pub struct BeatClock {
    start: Instant,
    period: Duration,
    beat: u32,
    beats_per_measure: u32,
}

impl BeatClock {
    pub fn start(bpm: f32, beats_per_measure: u32) -> Self {
        Self {
            start: Instant::now(),
            period: beat_period(bpm),
            beat: 0,
            beats_per_measure: beats_per_measure.max(1),
        }
    }

    pub fn beat(&self) -> u32 {
        self.beat
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn start_time(&self) -> Instant {
        self.start
    }

    pub fn delay_to_next(&self) -> Duration {
        delay_to_next_beat(self.start.elapsed(), self.period)
    }

    /// Sleeps until the next beat boundary and advances the counter.
    pub async fn tick(&mut self) -> u32 {
        sleep(self.delay_to_next()).await;
        self.beat = (self.beat + 1) % self.beats_per_measure;
        self.beat
    }
}

fn beat_period(bpm: f32) -> Duration {
    let bpm = if bpm.is_finite() && bpm > 0.0 { bpm } else { 120.0 };
    Duration::from_secs_f64(60.0 / f64::from(bpm))
}

/// Publishes the current beat to the display, once per beat, forever.
#[derive(Debug)]
pub struct BeatProvider {
    bpm: f32,
    beats_per_measure: u32,
    display: Arc<PinkyDisplay>,
}

impl BeatProvider {
    pub fn new(bpm: f32, beats_per_measure: u32, display: Arc<PinkyDisplay>) -> Self {
        Self {
            bpm,
            beats_per_measure,
            display,
        }
    }

    pub async fn run(self) {
        let mut clock = BeatClock::start(self.bpm, self.beats_per_measure);
        tracing::info!(
            bpm = self.bpm,
            beats_per_measure = self.beats_per_measure,
            "beat provider started"
        );

        loop {
            self.display.set_beat(clock.beat());
            clock.tick().await;
        }
    }
}
