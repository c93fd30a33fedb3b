use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::AppError;

/// Per-user sliding-window limiter for actions that leave no row behind (code runs).
///
/// Persisted actions count rows in the database instead.
pub struct RateLimiter {
    window: Duration,
    hits: DashMap<i32, VecDeque<Instant>>,
    last_prune: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            hits: DashMap::new(),
            last_prune: Mutex::new(Instant::now()),
        }
    }

    pub fn per_minute() -> Self {
        Self::new(Duration::from_secs(60))
    }

    /// Record a hit for `user_id`, or fail with `RateLimited` if `limit` hits
    /// already happened within the window. A limit of 0 disables the check.
    pub fn check(&self, user_id: i32, limit: u32) -> Result<(), AppError> {
        if limit == 0 {
            return Ok(());
        }
        let now = Instant::now();
        self.prune_idle(now);
        let mut entry = self.hits.entry(user_id).or_default();
        while entry
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            entry.pop_front();
        }
        if entry.len() >= limit as usize {
            let retry_after = entry
                .front()
                .map(|oldest| {
                    self.window
                        .saturating_sub(now.duration_since(*oldest))
                        .as_secs()
                        .max(1)
                })
                .unwrap_or(1);
            return Err(AppError::RateLimited { retry_after });
        }
        entry.push_back(now);
        Ok(())
    }

    /// Drop users whose every hit has left the window. Runs at most once per window.
    fn prune_idle(&self, now: Instant) {
        if let Ok(mut last) = self.last_prune.try_lock()
            && now.duration_since(*last) >= self.window
        {
            *last = now;
            drop(last);
            self.hits.retain(|_, hits| {
                hits.back()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }
    }
}
