use std::sync::{
    atomic::{AtomicU32, AtomicUsize, Ordering},
    RwLock,
};

use crate::Color;

/// Operator-facing state shared between the control loop, the beat provider
/// and whatever front end renders it.
///
/// The controller only reads `selected_show` and `color`; everything else is
/// published by the controller for display.
#[derive(Debug, Default)]
pub struct PinkyDisplay {
    beat: AtomicU32,
    brain_count: AtomicUsize,
    selected_show: RwLock<Option<String>>,
    show_names: RwLock<Vec<String>>,
    color: RwLock<Option<Color>>,
    last_build_error: RwLock<Option<String>>,
}

impl PinkyDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beat(&self) -> u32 {
        self.beat.load(Ordering::Acquire)
    }

    pub fn set_beat(&self, beat: u32) {
        self.beat.store(beat, Ordering::Release);
    }

    pub fn brain_count(&self) -> usize {
        self.brain_count.load(Ordering::Acquire)
    }

    pub fn set_brain_count(&self, count: usize) {
        self.brain_count.store(count, Ordering::Release);
    }

    pub fn selected_show(&self) -> Option<String> {
        read(&self.selected_show)
    }

    pub fn select_show(&self, name: Option<String>) {
        write(&self.selected_show, name);
    }

    pub fn show_names(&self) -> Vec<String> {
        read(&self.show_names)
    }

    pub fn list_shows(&self, names: Vec<String>) {
        write(&self.show_names, names);
    }

    pub fn color(&self) -> Option<Color> {
        read(&self.color)
    }

    pub fn set_color(&self, color: Option<Color>) {
        write(&self.color, color);
    }

    pub fn last_build_error(&self) -> Option<String> {
        read(&self.last_build_error)
    }

    pub fn set_build_error(&self, error: Option<String>) {
        write(&self.last_build_error, error);
    }
}

// A panicked writer leaves a complete value behind, so poisoning is ignored.
fn read<T: Clone>(lock: &RwLock<T>) -> T {
    match lock.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn write<T>(lock: &RwLock<T>, value: T) {
    match lock.write() {
        Ok(mut guard) => *guard = value,
        Err(poisoned) => *poisoned.into_inner() = value,
    }
}
