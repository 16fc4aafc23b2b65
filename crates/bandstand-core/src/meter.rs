//! Callback timing: CPU load and missed-deadline counting.

use crate::lockfree::AtomicFloat;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Tracks how much of its deadline each device callback consumed.
pub struct CallbackMeter {
    current: AtomicFloat,
    peak: AtomicFloat,
    average: AtomicFloat,
    overruns: AtomicU32,
    samples: AtomicU32,
    sample_rate: f64,
}

impl CallbackMeter {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            current: AtomicFloat::default(),
            peak: AtomicFloat::default(),
            average: AtomicFloat::default(),
            overruns: AtomicU32::new(0),
            samples: AtomicU32::new(0),
            sample_rate,
        }
    }

    /// Records one callback: `frames` rendered in `elapsed` wall time.
    pub fn record(&self, frames: u32, elapsed: Duration) {
        if frames == 0 {
            return;
        }

        let budget = f64::from(frames) / self.sample_rate;
        let load = (elapsed.as_secs_f64() / budget) as f32;

        self.current.set(load);

        if load > self.peak.get() {
            self.peak.set(load);
        }

        // Exponential moving average
        let count = self.samples.fetch_add(1, Ordering::Relaxed);
        let alpha = 1.0 / (count.min(100) + 1) as f32;
        let average = self.average.get();
        self.average.set(average * (1.0 - alpha) + load * alpha);

        if load > 1.0 {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Smoothed load in [0, 1] (may exceed 1 while overrunning).
    pub fn load(&self) -> f64 {
        f64::from(self.average.get())
    }

    pub fn peak(&self) -> f64 {
        f64::from(self.peak.get())
    }

    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.current.set(0.0);
        self.peak.set(0.0);
        self.average.set(0.0);
        self.overruns.store(0, Ordering::Relaxed);
        self.samples.store(0, Ordering::Relaxed);
    }
}
