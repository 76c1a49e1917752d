//! Server clock estimation for stage countdowns.
//!
//! The server pushes its wall-clock time in the metadata of every event (and on a
//! dedicated `TIME_SYNC` queue every 10 s, every 2 s during ban/pick/shop). Each
//! observation becomes one offset sample; the active offset is the median of the
//! most recent [`MAX_SAMPLES`] so a single late frame cannot drag the countdown.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::{collections::VecDeque, fmt, sync::Arc, time::Instant};

pub const MAX_SAMPLES: usize = 10;

pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

pub trait Timer: Send + Sync {
    /// Milliseconds on a monotonic clock with an arbitrary origin.
    fn monotonic_ms(&self) -> i64;
    /// Milliseconds since the Unix epoch according to the local wall clock.
    fn wall_clock_ms(&self) -> i64;
}

pub struct SystemTimer {
    origin: Instant,
}

impl Default for SystemTimer {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Timer for SystemTimer {
    fn monotonic_ms(&self) -> i64 {
        self.origin.elapsed().as_millis() as i64
    }

    fn wall_clock_ms(&self) -> i64 {
        current_timestamp().timestamp_millis()
    }
}

#[derive(Default)]
struct Samples {
    offsets: VecDeque<i64>,
    active_offset: i64,
}

impl Samples {
    fn push(&mut self, offset: i64) {
        self.offsets.push_back(offset);
        if self.offsets.len() > MAX_SAMPLES {
            self.offsets.pop_front();
        }

        let mut sorted: Vec<i64> = self.offsets.iter().copied().collect();
        sorted.sort_unstable();
        self.active_offset = sorted[sorted.len() / 2];
    }
}

/// Estimates the server's clock from pushed timestamps.
///
/// Clones share the same samples, so the dispatcher can feed the clock while
/// stores and the UI read from it.
#[derive(Clone)]
pub struct ServerClock {
    samples: Arc<Mutex<Samples>>,
    timer: Arc<dyn Timer>,
}

impl Default for ServerClock {
    fn default() -> Self {
        Self::with_timer(SystemTimer::default())
    }
}

impl fmt::Debug for ServerClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let samples = self.samples.lock();
        f.debug_struct("ServerClock")
            .field("samples", &samples.offsets.len())
            .field("offset_ms", &samples.active_offset)
            .finish()
    }
}

impl ServerClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timer<T: Timer + 'static>(timer: T) -> Self {
        Self {
            samples: Arc::default(),
            timer: Arc::new(timer),
        }
    }

    /// Records one observation. There is no request/response pair, so the round
    /// trip is taken as zero: `offset = server_time - local_receive_time`.
    pub fn feed_sample(&self, server_time: DateTime<Utc>) {
        let received_at = self.timer.monotonic_ms();
        let offset = server_time.timestamp_millis() - received_at;
        self.samples.lock().push(offset);
    }

    /// Estimated server time in epoch milliseconds. Falls back to the local wall
    /// clock until the first sample arrives.
    pub fn estimated_server_now(&self) -> i64 {
        let samples = self.samples.lock();
        if samples.offsets.is_empty() {
            self.timer.wall_clock_ms()
        } else {
            self.timer.monotonic_ms() + samples.active_offset
        }
    }

    pub fn server_now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.estimated_server_now())
            .unwrap_or_else(current_timestamp)
    }

    pub fn estimate_remaining_ms(&self, deadline: DateTime<Utc>) -> u64 {
        let remaining = deadline.timestamp_millis() - self.estimated_server_now();
        remaining.max(0) as u64
    }

    pub fn offset_ms(&self) -> i64 {
        self.samples.lock().active_offset
    }

    pub fn sample_count(&self) -> usize {
        self.samples.lock().offsets.len()
    }

    pub fn dispose(&self) {
        let mut samples = self.samples.lock();
        samples.offsets.clear();
        samples.active_offset = 0;
    }
}
