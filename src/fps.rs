use std::collections::VecDeque;
use std::time::Duration;

/// Number of samples averaged by default.
pub const DEFAULT_FPS_WINDOW: usize = 200;

/// Bounded history of per-frame FPS samples. Oldest sample is evicted first.
#[derive(Clone, Debug)]
pub struct FpsWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl FpsWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record one sample.
    pub fn push(&mut self, fps: f64) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(fps);
    }

    /// Record the instantaneous rate of a frame that took `elapsed`.
    /// Zero-length frames carry no rate information and are skipped.
    pub fn push_elapsed(&mut self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            self.push(1.0 / secs);
        }
    }

    /// Mean of the retained samples, 0.0 when empty.
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn oldest(&self) -> Option<f64> {
        self.samples.front().copied()
    }
}

impl Default for FpsWindow {
    fn default() -> Self {
        Self::new(DEFAULT_FPS_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_never_exceeds_capacity() {
        let mut window = FpsWindow::default();
        for i in 0..(DEFAULT_FPS_WINDOW + 50) {
            window.push(i as f64);
            assert!(window.len() <= DEFAULT_FPS_WINDOW);
        }
        assert_eq!(window.len(), DEFAULT_FPS_WINDOW);
    }

    #[test]
    fn oldest_sample_is_evicted_first() {
        let mut window = FpsWindow::default();
        for i in 0..DEFAULT_FPS_WINDOW {
            window.push(i as f64);
        }
        assert_eq!(window.oldest(), Some(0.0));
        window.push(1000.0);
        assert_eq!(window.len(), DEFAULT_FPS_WINDOW);
        assert_eq!(window.oldest(), Some(1.0));
    }

    #[test]
    fn average_tracks_retained_samples() {
        let mut window = FpsWindow::new(2);
        assert_eq!(window.average(), 0.0);
        window.push(10.0);
        window.push(20.0);
        window.push(40.0);
        assert!((window.average() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn elapsed_converts_to_rate() {
        let mut window = FpsWindow::new(4);
        window.push_elapsed(Duration::from_millis(50));
        window.push_elapsed(Duration::ZERO);
        assert_eq!(window.len(), 1);
        assert!((window.average() - 20.0).abs() < 1e-9);
    }
}
