//! Rolling-window averages over the ride time series.

use std::collections::VecDeque;

/// Rolling average over the last `window_size` samples.
#[derive(Debug)]
pub struct RollingAverage {
    /// Buffer of recent values
    buffer: VecDeque<u16>,
    /// Window size in samples
    window_size: usize,
    /// Running sum for efficient calculation
    sum: u32,
}

impl RollingAverage {
    /// Create a new rolling average with the given window size.
    pub fn new(window_size: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(window_size),
            window_size: window_size.max(1),
            sum: 0,
        }
    }

    /// Add a new value and return the current average.
    pub fn add(&mut self, value: u16) -> Option<f32> {
        self.buffer.push_back(value);
        self.sum += value as u32;

        if self.buffer.len() > self.window_size {
            if let Some(old) = self.buffer.pop_front() {
                self.sum -= old as u32;
            }
        }

        self.average()
    }

    /// Current average without adding a value.
    pub fn average(&self) -> Option<f32> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.sum as f32 / self.buffer.len() as f32)
        }
    }

    /// Whether the window holds enough samples for a full-width average.
    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.window_size
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.sum = 0;
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Highest full-window average across `values`.
///
/// `None` when there are fewer values than the window.
pub fn best_window_average(
    values: impl IntoIterator<Item = u16>,
    window_size: usize,
) -> Option<f32> {
    let mut rolling = RollingAverage::new(window_size);
    let mut best: Option<f32> = None;

    for value in values {
        rolling.add(value);
        if rolling.is_full() {
            if let Some(avg) = rolling.average() {
                best = Some(best.map_or(avg, |b| b.max(avg)));
            }
        }
    }

    best
}
