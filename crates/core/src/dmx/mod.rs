use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
};

use crate::TransportError;

type DmxResult<T> = std::result::Result<T, TransportError>;

/// Channel-addressed bus for non-panel fixtures.
pub trait DmxUniverse: Send + Sync {
    /// Reserves `channel_count` channels starting at `base_channel`.
    fn writer(&self, base_channel: usize, channel_count: usize) -> DmxResult<DmxBuffer>;

    /// Pushes the current channel values out as one frame.
    fn send_frame(&self) -> DmxResult<()>;
}

/// Write handle onto a slice of a universe's channels.
#[derive(Debug, Clone)]
pub struct DmxBuffer {
    channels: Arc<Mutex<Vec<u8>>>,
    base: usize,
    count: usize,
}

impl DmxBuffer {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Sets channel `offset` relative to this buffer's base.
    pub fn set(&self, offset: usize, value: u8) -> DmxResult<()> {
        if offset >= self.count {
            return Err(TransportError::DmxRange {
                base: self.base + offset,
                count: 1,
                capacity: self.base + self.count,
            });
        }
        lock_channels(&self.channels)?[self.base + offset] = value;
        Ok(())
    }

    pub fn get(&self, offset: usize) -> DmxResult<u8> {
        if offset >= self.count {
            return Err(TransportError::DmxRange {
                base: self.base + offset,
                count: 1,
                capacity: self.base + self.count,
            });
        }
        Ok(lock_channels(&self.channels)?[self.base + offset])
    }
}

/// Universe held in memory; `send_frame` snapshots the channels.
///
/// Used when no DMX hardware is attached.
#[derive(Debug)]
pub struct MemoryUniverse {
    channels: Arc<Mutex<Vec<u8>>>,
    last_frame: Mutex<Vec<u8>>,
    frames_sent: AtomicU64,
}

impl MemoryUniverse {
    pub fn new(channel_count: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(vec![0; channel_count])),
            last_frame: Mutex::new(Vec::new()),
            frames_sent: AtomicU64::new(0),
        }
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Acquire)
    }

    /// Channel values as of the last `send_frame`.
    pub fn last_frame(&self) -> DmxResult<Vec<u8>> {
        self.last_frame
            .lock()
            .map(|frame| frame.clone())
            .map_err(|_| TransportError::Poisoned("DMX frame"))
    }
}

impl DmxUniverse for MemoryUniverse {
    fn writer(&self, base_channel: usize, channel_count: usize) -> DmxResult<DmxBuffer> {
        let capacity = lock_channels(&self.channels)?.len();
        if base_channel
            .checked_add(channel_count)
            .map_or(true, |end| end > capacity)
        {
            return Err(TransportError::DmxRange {
                base: base_channel,
                count: channel_count,
                capacity,
            });
        }
        Ok(DmxBuffer {
            channels: self.channels.clone(),
            base: base_channel,
            count: channel_count,
        })
    }

    fn send_frame(&self) -> DmxResult<()> {
        let snapshot = lock_channels(&self.channels)?.clone();
        *self
            .last_frame
            .lock()
            .map_err(|_| TransportError::Poisoned("DMX frame"))? = snapshot;
        self.frames_sent.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

fn lock_channels(channels: &Mutex<Vec<u8>>) -> DmxResult<MutexGuard<'_, Vec<u8>>> {
    channels
        .lock()
        .map_err(|_| TransportError::Poisoned("DMX channels"))
}

/// Shenzarpy moving head: a 16-channel fixture.
#[derive(Debug, Clone)]
pub struct Shenzarpy {
    buffer: DmxBuffer,
}

impl Shenzarpy {
    pub const CHANNEL_COUNT: usize = 16;

    const COLOR_WHEEL: usize = 0;
    const SHUTTER: usize = 1;
    const DIMMER: usize = 2;
    const GOBO_WHEEL: usize = 3;
    const PAN: usize = 8;
    const PAN_FINE: usize = 9;
    const TILT: usize = 10;
    const TILT_FINE: usize = 11;
    const PAN_TILT_SPEED: usize = 12;

    const SHUTTER_OPEN: u8 = 255;

    pub fn new(buffer: DmxBuffer) -> Self {
        Self { buffer }
    }

    pub fn set_color_wheel(&self, slot: u8) -> DmxResult<()> {
        self.buffer.set(Self::COLOR_WHEEL, slot)
    }

    pub fn set_gobo(&self, slot: u8) -> DmxResult<()> {
        self.buffer.set(Self::GOBO_WHEEL, slot)
    }

    pub fn open_shutter(&self, open: bool) -> DmxResult<()> {
        self.buffer
            .set(Self::SHUTTER, if open { Self::SHUTTER_OPEN } else { 0 })
    }

    /// `level` in `[0, 1]`.
    pub fn set_dimmer(&self, level: f32) -> DmxResult<()> {
        self.buffer.set(Self::DIMMER, coarse(level))
    }

    /// `position` in `[0, 1]` across the full pan range.
    pub fn set_pan(&self, position: f32) -> DmxResult<()> {
        self.set_fine(Self::PAN, Self::PAN_FINE, position)
    }

    /// `position` in `[0, 1]` across the full tilt range.
    pub fn set_tilt(&self, position: f32) -> DmxResult<()> {
        self.set_fine(Self::TILT, Self::TILT_FINE, position)
    }

    pub fn set_pan_tilt_speed(&self, speed: u8) -> DmxResult<()> {
        self.buffer.set(Self::PAN_TILT_SPEED, speed)
    }

    fn set_fine(&self, coarse_channel: usize, fine_channel: usize, value: f32) -> DmxResult<()> {
        let wide = (value.clamp(0.0, 1.0) * f32::from(u16::MAX)).round() as u16;
        let [hi, lo] = wide.to_be_bytes();
        self.buffer.set(coarse_channel, hi)?;
        self.buffer.set(fine_channel, lo)
    }
}

fn coarse(level: f32) -> u8 {
    (level.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writers_share_the_universe_and_frames_snapshot_it() {
        let universe = MemoryUniverse::new(32);
        let buffer = universe.writer(4, 2).unwrap();
        buffer.set(1, 99).unwrap();

        assert_eq!(universe.frames_sent(), 0);
        universe.send_frame().unwrap();
        buffer.set(1, 7).unwrap();

        assert_eq!(universe.frames_sent(), 1);
        assert_eq!(universe.last_frame().unwrap()[5], 99);
        assert_eq!(buffer.get(1).unwrap(), 7);
    }

    #[test]
    fn out_of_range_writers_are_refused() {
        let universe = MemoryUniverse::new(16);
        assert!(matches!(
            universe.writer(10, 8),
            Err(TransportError::DmxRange {
                base: 10,
                count: 8,
                capacity: 16
            })
        ));
        assert!(universe.writer(usize::MAX, 2).is_err());

        let buffer = universe.writer(0, 2).unwrap();
        assert!(buffer.set(2, 1).is_err());
    }

    #[test]
    fn moving_head_splits_pan_into_coarse_and_fine() {
        let universe = MemoryUniverse::new(64);
        let head = Shenzarpy::new(universe.writer(20, Shenzarpy::CHANNEL_COUNT).unwrap());

        head.set_pan(1.0).unwrap();
        head.set_tilt(0.0).unwrap();
        head.set_dimmer(0.5).unwrap();
        head.open_shutter(true).unwrap();
        universe.send_frame().unwrap();

        let frame = universe.last_frame().unwrap();
        assert_eq!(&frame[28..30], &[0xff, 0xff]);
        assert_eq!(&frame[30..32], &[0, 0]);
        assert_eq!(frame[22], 128);
        assert_eq!(frame[21], 255);
    }

    #[test]
    fn moving_head_wheels_use_their_own_channels() {
        let universe = MemoryUniverse::new(32);
        let head = Shenzarpy::new(universe.writer(8, Shenzarpy::CHANNEL_COUNT).unwrap());

        head.set_color_wheel(42).unwrap();
        head.set_gobo(7).unwrap();
        head.set_pan_tilt_speed(3).unwrap();
        universe.send_frame().unwrap();

        let frame = universe.last_frame().unwrap();
        assert_eq!(frame[8], 42);
        assert_eq!(frame[11], 7);
        assert_eq!(frame[20], 3);
        assert_eq!(frame[9], 0);
    }
}
