use std::time::Duration;

/// Controls how a serial listener reopens its port after the port fails
pub trait RetryStrategy: Send {
    /// Reset internal state. Called when the port is successfully reopened
    fn reset(&mut self);
    /// Return the delay before the next attempt after a failed open
    fn after_failed_open(&mut self) -> Duration;
    /// Return the delay to wait after an open port fails before trying to reopen it
    fn after_disconnect(&mut self) -> Duration;
}

/// Return the default [`RetryStrategy`]: doubling from 1 second up to 60 seconds
pub fn default_retry_strategy() -> Box<dyn RetryStrategy> {
    doubling_retry_strategy(Duration::from_millis(1000), Duration::from_millis(60000))
}

/// Return a [`RetryStrategy`] that doubles on failure up to a maximum value
pub fn doubling_retry_strategy(min: Duration, max: Duration) -> Box<dyn RetryStrategy> {
    Doubling::create(min, max)
}

struct Doubling {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Doubling {
    fn create(min: Duration, max: Duration) -> Box<dyn RetryStrategy> {
        Box::new(Doubling {
            min,
            max: max.max(min),
            current: min,
        })
    }
}

impl RetryStrategy for Doubling {
    fn reset(&mut self) {
        self.current = self.min;
    }

    fn after_failed_open(&mut self) -> Duration {
        let ret = self.current;
        self.current = std::cmp::min(2 * self.current, self.max);
        ret
    }

    fn after_disconnect(&mut self) -> Duration {
        self.min
    }
}
