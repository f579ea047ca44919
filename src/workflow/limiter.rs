use dashmap::DashMap;

/// Fixed one-second window counter of lease calls per queue.
pub struct LeaseLimiter {
    per_second: u32,
    windows: DashMap<String, (i64, u32)>,
}

impl LeaseLimiter {
    /// `per_second == 0` never limits.
    pub fn new(per_second: u32) -> Self {
        Self {
            per_second,
            windows: DashMap::new(),
        }
    }

    /// Count one call at `now_millis` and report whether it fits the budget.
    pub fn try_acquire(&self, queue: &str, now_millis: i64) -> bool {
        if self.per_second == 0 {
            return true;
        }
        let second = now_millis.div_euclid(1000);
        let mut window = self.windows.entry(queue.to_string()).or_insert((second, 0));
        if window.0 != second {
            *window = (second, 0);
        }
        if window.1 >= self.per_second {
            return false;
        }
        window.1 += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_resets_every_second() {
        let limiter = LeaseLimiter::new(2);
        assert!(limiter.try_acquire("q", 1_000));
        assert!(limiter.try_acquire("q", 1_500));
        assert!(!limiter.try_acquire("q", 1_999));
        assert!(limiter.try_acquire("other", 1_999));
        assert!(limiter.try_acquire("q", 2_000));
    }

    #[test]
    fn zero_means_unlimited() {
        let limiter = LeaseLimiter::new(0);
        assert!((0..100).all(|_| limiter.try_acquire("q", 0)));
    }
}
