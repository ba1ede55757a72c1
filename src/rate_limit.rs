use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Token bucket shared by all fetch workers. One token is one provider call.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_every: Duration,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Bucket that starts full with `burst` tokens and regains one token every `refill_every`.
    pub fn new(refill_every: Duration, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            capacity,
            refill_every,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Takes a token if one is available, otherwise reports how long until the next one.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> Result<(), Duration> {
        if self.refill_every.is_zero() {
            return Ok(());
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let elapsed = now.saturating_duration_since(state.last_refill);
        let gained = elapsed.as_secs_f64() / self.refill_every.as_secs_f64();
        state.tokens = (state.tokens + gained).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(());
        }
        let missing = 1.0 - state.tokens;
        Err(self.refill_every.mul_f64(missing))
    }

    /// Blocks the calling worker until a token is available.
    pub fn acquire(&self) {
        while let Err(wait) = self.try_acquire() {
            thread::sleep(wait);
        }
    }
}
