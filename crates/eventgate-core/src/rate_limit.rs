use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(10);

struct CallWindow {
    count: u32,
    last_call: Instant,
}

/// Coarse fixed-window call-rate guard, applied before any backend call.
///
/// State is process-local: a deployment running N instances under-limits
/// by a factor of N. Accuracy is approximate by design; the limiter is a
/// cheap front-line guard, not the store-authoritative daily quota.
pub struct RateLimiter {
    calls_per_window: u32,
    callers: Mutex<HashMap<String, CallWindow>>,
}

impl RateLimiter {
    pub fn new(calls_per_minute: u32) -> Self {
        Self {
            // Budget is expressed per minute, enforced per 10 seconds.
            calls_per_window: calls_per_minute / 6,
            callers: Mutex::new(HashMap::new()),
        }
    }

    /// Count one call for `caller_key` and report whether its window
    /// budget is now exceeded. Entries idle past the window are swept
    /// on every check.
    pub fn is_rate_exceeded(&self, caller_key: &str) -> bool {
        let now = Instant::now();
        let mut callers = match self.callers.lock() {
            Ok(guard) => guard,
            // Poisoning only loses counter state; keep serving.
            Err(poisoned) => poisoned.into_inner(),
        };

        callers.retain(|_, window| now.duration_since(window.last_call) <= WINDOW);

        let window = callers.entry(caller_key.to_string()).or_insert(CallWindow {
            count: 0,
            last_call: now,
        });
        window.count += 1;

        if window.count > self.calls_per_window {
            window.last_call = now;
            return true;
        }

        false
    }

    #[cfg(test)]
    fn tracked_callers(&self) -> usize {
        self.callers
            .lock()
            .map(|callers| callers.len())
            .unwrap_or(0)
    }
}
