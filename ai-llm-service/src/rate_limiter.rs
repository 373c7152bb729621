//! Sliding-window rate limiter for outbound cloud calls.
//!
//! In-memory and per process. The lock is held across the wait so that
//! concurrent callers queue up instead of all waking at the same instant.

use std::{collections::VecDeque, time::Duration};

use tokio::{sync::Mutex, time::Instant};
use tracing::info;

/// Default number of requests per window (free-tier Gemini quota minus one).
pub const DEFAULT_MAX_REQUESTS: usize = 14;
/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Slack added to every computed wait.
const WAIT_SLACK: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<VecDeque<Instant>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            requests: Mutex::new(VecDeque::new()),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Waits until a request may be sent, then records it.
    ///
    /// Returns how long the caller was suspended.
    pub async fn acquire(&self) -> Duration {
        let mut q = self.requests.lock().await;
        let now = Instant::now();
        prune(&mut q, now, self.window);

        let mut waited = Duration::ZERO;
        if q.len() >= self.max_requests {
            if let Some(oldest) = q.front().copied() {
                let wait = self.window.saturating_sub(now.duration_since(oldest)) + WAIT_SLACK;
                info!(
                    wait_ms = wait.as_millis(),
                    in_window = q.len(),
                    "rate limit reached, waiting"
                );
                tokio::time::sleep(wait).await;
                waited = wait;
                prune(&mut q, Instant::now(), self.window);
            }
        }

        q.push_back(Instant::now());
        waited
    }

    /// Number of requests recorded inside the current window.
    pub async fn in_window(&self) -> usize {
        let mut q = self.requests.lock().await;
        prune(&mut q, Instant::now(), self.window);
        q.len()
    }

    #[cfg(test)]
    async fn recorded(&self) -> Vec<Instant> {
        self.requests.lock().await.iter().copied().collect()
    }
}

fn prune(q: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = q.front() {
        if now.duration_since(*front) >= window {
            q.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn requests_under_limit_do_not_wait() {
        let rl = RateLimiter::new(3, Duration::from_secs(10));
        for _ in 0..3 {
            assert_eq!(rl.acquire().await, Duration::ZERO);
        }
        assert_eq!(rl.in_window().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn request_over_limit_waits_for_oldest_to_age_out() {
        let rl = RateLimiter::new(3, Duration::from_secs(10));
        let started = Instant::now();
        for _ in 0..3 {
            rl.acquire().await;
        }

        let waited = rl.acquire().await;

        assert_eq!(waited, Duration::from_secs(11));
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(rl.in_window().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn never_more_than_max_in_any_window() {
        let rl = Arc::new(RateLimiter::new(2, Duration::from_secs(5)));
        let mut handles = Vec::new();
        for _ in 0..7 {
            let rl = rl.clone();
            handles.push(tokio::spawn(async move { rl.acquire().await }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let stamps = rl.recorded().await;
        for (i, start) in stamps.iter().enumerate() {
            let in_window = stamps[i..]
                .iter()
                .filter(|t| t.duration_since(*start) < Duration::from_secs(5))
                .count();
            assert!(in_window <= 2, "window starting at #{i} holds {in_window}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn old_requests_are_pruned() {
        let rl = RateLimiter::new(2, Duration::from_secs(5));
        rl.acquire().await;
        rl.acquire().await;
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(rl.acquire().await, Duration::ZERO);
        assert_eq!(rl.in_window().await, 1);
    }
}
