//! Time-bucketed rolling window of call outcomes.
//!
//! The window is a fixed ring of buckets, each covering `interval`. Writes land
//! in the bucket under `offset`; when a write arrives after one or more
//! intervals have elapsed, the buckets in between are zeroed and the cursor
//! moves forward. Reads skip the buckets that expired since the last write, so
//! an idle window decays to nothing without needing a write.
//!
//! ```text
//!  offset ──┐
//!  [b0][b1][b2][b3] ... [b39]     span = buckets * interval
//! ```

use std::{
    sync::{PoisonError, RwLock},
    time::{Duration, Instant},
};

use super::instant_now;

/// Aggregated outcomes recorded during one time slice.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bucket {
    /// Accumulated weight; one per success.
    pub sum: f64,
    /// Number of outcomes recorded.
    pub count: i64,
}

impl Bucket {
    fn add(&mut self, weight: f64) {
        self.sum += weight;
        self.count += 1;
    }

    fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }
}

#[derive(Debug)]
struct State {
    buckets: Box<[Bucket]>,
    offset: usize,
    // Always aligned to a bucket boundary.
    last_time: Instant,
}

impl State {
    /// Number of whole intervals elapsed since the last write, capped at the
    /// ring size.
    fn span(&self, now: Instant, interval: Duration) -> usize {
        let elapsed = now.saturating_duration_since(self.last_time);
        let size = self.buckets.len();
        let intervals = elapsed.as_nanos() / interval.as_nanos();
        usize::try_from(intervals).map_or(size, |n| n.min(size))
    }

    fn advance(&mut self, now: Instant, interval: Duration) {
        let span = self.span(now, interval);
        if span == 0 {
            return;
        }

        let size = self.buckets.len();
        if span == size {
            // Idle for at least the whole window.
            self.buckets.iter_mut().for_each(Bucket::reset);
        } else {
            for i in 0..span {
                self.buckets[(self.offset + i + 1) % size].reset();
            }
        }
        self.offset = (self.offset + span) % size;

        let elapsed = now.saturating_duration_since(self.last_time);
        let remainder = elapsed.as_nanos() % interval.as_nanos();
        // remainder < interval, which always fits in u64 nanoseconds here.
        self.last_time = now - Duration::from_nanos(remainder as u64);
    }
}

/// Fixed-size circular window of [`Bucket`]s that advances with wall-clock
/// time.
///
/// `add` and `reduce` are safe to call from any number of threads; the lock is
/// held only while buckets are rotated, bumped or read.
#[derive(Debug)]
pub struct RollingWindow {
    interval: Duration,
    ignore_current: bool,
    state: RwLock<State>,
}

impl RollingWindow {
    /// Creates a window of `size` buckets, each covering `interval`.
    ///
    /// # Panics
    ///
    /// Panics if `size` or `interval` is zero.
    pub fn new(size: usize, interval: Duration) -> Self {
        assert!(size > 0, "rolling window needs at least one bucket");
        assert!(!interval.is_zero(), "rolling window interval must be non-zero");

        Self {
            interval,
            ignore_current: false,
            state: RwLock::new(State {
                buckets: vec![Bucket::default(); size].into_boxed_slice(),
                offset: 0,
                last_time: instant_now(),
            }),
        }
    }

    /// Leaves the bucket that is still being written out of [`reduce`](Self::reduce)
    /// until its interval has elapsed.
    pub fn ignore_current_bucket(mut self, ignore: bool) -> Self {
        self.ignore_current = ignore;
        self
    }

    pub fn size(&self) -> usize {
        self.read_state(|state| state.buckets.len())
    }

    /// Total time covered by the window, saturating at [`Duration::MAX`].
    pub fn span(&self) -> Duration {
        u32::try_from(self.size())
            .map_or(Duration::MAX, |size| self.interval.saturating_mul(size))
    }

    /// Records one outcome with the given weight in the current bucket.
    pub fn add(&self, weight: f64) {
        let now = instant_now();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.advance(now, self.interval);
        let offset = state.offset;
        state.buckets[offset].add(weight);
    }

    /// Folds `f` over every bucket still inside the window, oldest first.
    ///
    /// Buckets whose interval expired since the last write are skipped. All
    /// buckets are visited under one read lock, so the fold never observes a
    /// half-applied `add`.
    pub fn reduce<F>(&self, mut f: F)
    where
        F: FnMut(&Bucket),
    {
        let now = instant_now();
        self.read_state(|state| {
            let size = state.buckets.len();
            let span = state.span(now, self.interval);
            let live = if span == 0 && self.ignore_current {
                size - 1
            } else {
                size - span
            };

            let start = state.offset + span + 1;
            for i in 0..live {
                f(&state.buckets[(start + i) % size]);
            }
        })
    }

    fn read_state<R>(&self, f: impl FnOnce(&State) -> R) -> R {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::time;

    use super::*;

    const INTERVAL: Duration = Duration::from_millis(50);

    fn totals(window: &RollingWindow) -> (f64, i64) {
        let mut sum = 0.0;
        let mut count = 0;
        window.reduce(|b| {
            sum += b.sum;
            count += b.count;
        });
        (sum, count)
    }

    #[test]
    fn span_saturates_instead_of_overflowing() {
        assert_eq!(RollingWindow::new(40, INTERVAL).span(), Duration::from_secs(2));
        let huge = RollingWindow::new(4, Duration::MAX / 2);
        assert_eq!(huge.span(), Duration::MAX);
    }

    fn buckets(window: &RollingWindow) -> Vec<(f64, i64)> {
        let mut seen = Vec::new();
        window.reduce(|b| seen.push((b.sum, b.count)));
        seen
    }

    #[test]
    #[should_panic(expected = "at least one bucket")]
    fn zero_buckets_panics() {
        RollingWindow::new(0, INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn add_within_one_interval_lands_in_one_bucket() {
        let window = RollingWindow::new(3, INTERVAL);
        window.add(1.0);
        window.add(0.0);
        window.add(1.0);

        assert_eq!(buckets(&window), vec![(0.0, 0), (0.0, 0), (2.0, 3)]);
        assert_eq!(window.span(), Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn rotates_with_time() {
        let window = RollingWindow::new(3, INTERVAL);
        window.add(1.0);
        time::advance(INTERVAL).await;
        window.add(2.0);
        window.add(3.0);
        assert_eq!(buckets(&window), vec![(0.0, 0), (1.0, 1), (5.0, 2)]);

        time::advance(INTERVAL).await;
        window.add(4.0);
        assert_eq!(buckets(&window), vec![(1.0, 1), (5.0, 2), (4.0, 1)]);

        // The oldest bucket is recycled for the new slice.
        time::advance(INTERVAL).await;
        window.add(5.0);
        assert_eq!(buckets(&window), vec![(5.0, 2), (4.0, 1), (5.0, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn reduce_skips_expired_buckets_without_writes() {
        let window = RollingWindow::new(4, INTERVAL);
        window.add(1.0);
        time::advance(INTERVAL).await;
        window.add(1.0);
        assert_eq!(totals(&window), (2.0, 2));

        time::advance(INTERVAL * 3).await;
        // Only the second write is still within the trailing window.
        assert_eq!(totals(&window), (1.0, 1));

        time::advance(INTERVAL).await;
        assert_eq!(totals(&window), (0.0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_window_decays_to_zero() {
        let window = RollingWindow::new(40, Duration::from_millis(250));
        for _ in 0..100 {
            window.add(0.0);
        }
        assert_eq!(totals(&window), (0.0, 100));

        time::advance(Duration::from_secs(10)).await;
        assert_eq!(totals(&window), (0.0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn very_long_gap_clears_whole_window() {
        let window = RollingWindow::new(4, INTERVAL);
        for _ in 0..4 {
            window.add(1.0);
            time::advance(INTERVAL).await;
        }

        time::advance(Duration::from_secs(60 * 60 * 24 * 365)).await;
        window.add(1.0);
        assert_eq!(totals(&window), (1.0, 1));
        assert_eq!(buckets(&window).iter().filter(|(_, c)| *c > 0).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_interval_keeps_bucket_alignment() {
        let window = RollingWindow::new(3, INTERVAL);
        time::advance(INTERVAL + INTERVAL / 2).await;
        window.add(1.0);

        // Still inside the same slice: 1.5 + 0.4 intervals since creation.
        time::advance(INTERVAL * 2 / 5).await;
        window.add(1.0);
        assert_eq!(buckets(&window).last(), Some(&(2.0, 2)));

        // Crossing the boundary starts a fresh bucket.
        time::advance(INTERVAL / 5).await;
        window.add(1.0);
        assert_eq!(buckets(&window).last(), Some(&(1.0, 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn ignore_current_excludes_bucket_in_progress() {
        let window = RollingWindow::new(3, INTERVAL).ignore_current_bucket(true);
        window.add(1.0);
        assert_eq!(totals(&window), (0.0, 0));

        time::advance(INTERVAL).await;
        assert_eq!(totals(&window), (1.0, 1));
    }

    #[test]
    fn concurrent_adds_are_not_lost() {
        let window = Arc::new(RollingWindow::new(40, Duration::from_millis(250)));
        let threads = 8;
        let per_thread = 1_000;

        std::thread::scope(|s| {
            for t in 0..threads {
                let window = Arc::clone(&window);
                s.spawn(move || {
                    for i in 0..per_thread {
                        window.add(((t + i) % 2) as f64);
                    }
                });
            }
        });

        let (sum, count) = totals(&window);
        assert_eq!(count, threads * per_thread);
        assert_eq!(sum, (threads * per_thread / 2) as f64);
    }
}
