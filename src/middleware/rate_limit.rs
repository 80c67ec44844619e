use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use redis::aio::ConnectionManager;

#[derive(Debug)]
struct Window {
    requests: HashMap<String, Vec<Instant>>,
    last_sweep: Instant,
}

/// Sliding-window limiter kept in process memory.
#[derive(Clone)]
pub struct RateLimiter {
    window_state: Arc<Mutex<Window>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            window_state: Arc::new(Mutex::new(Window {
                requests: HashMap::new(),
                last_sweep: Instant::now(),
            })),
            max_requests,
            window,
        }
    }

    pub fn is_allowed(&self, key: &str) -> bool {
        let mut state = self.window_state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        // Keys with nothing inside the window are forgotten once per window.
        if now.duration_since(state.last_sweep) >= self.window {
            let window = self.window;
            state.requests.retain(|_, stamps| {
                stamps
                    .last()
                    .is_some_and(|&last| now.duration_since(last) < window)
            });
            state.last_sweep = now;
        }

        let entry = state.requests.entry(key.to_string()).or_default();
        entry.retain(|&timestamp| now.duration_since(timestamp) < self.window);

        if entry.len() < self.max_requests {
            entry.push(now);
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.window_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .requests
            .len()
    }
}

/// Rate limit shared across instances through Redis when it is available,
/// falling back to the in-process window otherwise.
#[derive(Clone)]
pub struct SubmissionLimiter {
    local: RateLimiter,
    redis: Option<Arc<ConnectionManager>>,
    prefix: &'static str,
    max_requests: usize,
    window: Duration,
}

impl SubmissionLimiter {
    pub fn new(
        prefix: &'static str,
        max_requests: usize,
        window: Duration,
        redis: Option<Arc<ConnectionManager>>,
    ) -> Self {
        Self {
            local: RateLimiter::new(max_requests, window),
            redis,
            prefix,
            max_requests,
            window,
        }
    }

    pub async fn is_allowed(&self, key: &str) -> bool {
        let key = format!("rl:{}:{}", self.prefix, key);

        if let Some(redis) = &self.redis {
            match self.check_redis(redis, &key).await {
                Ok(allowed) => return allowed,
                Err(e) => {
                    tracing::warn!("Redis rate limit check failed ({}); using local window", e);
                }
            }
        }

        self.local.is_allowed(&key)
    }

    async fn check_redis(
        &self,
        redis: &Arc<ConnectionManager>,
        key: &str,
    ) -> Result<bool, redis::RedisError> {
        let mut conn = ConnectionManager::clone(redis);
        let count: i64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
        if count == 1 {
            let _: () = redis::cmd("EXPIRE")
                .arg(key)
                .arg(self.window.as_secs().max(1))
                .query_async(&mut conn)
                .await?;
        }
        Ok(count <= self.max_requests as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_allows_up_to_the_limit() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.is_allowed("ada@x.com"));
        assert!(limiter.is_allowed("ada@x.com"));
        assert!(!limiter.is_allowed("ada@x.com"));
        assert!(limiter.is_allowed("bob@x.com"));
    }

    #[test]
    fn old_requests_fall_out_of_the_window() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.is_allowed("k"));
        assert!(!limiter.is_allowed("k"));
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.is_allowed("k"));
    }

    #[test]
    fn idle_keys_are_forgotten() {
        let limiter = RateLimiter::new(3, Duration::from_millis(20));
        for email in ["ada@x.com", "bob@x.com", "cy@x.com"] {
            assert!(limiter.is_allowed(email));
        }
        assert_eq!(limiter.tracked_keys(), 3);

        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.is_allowed("dee@x.com"));
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn submission_limiter_without_redis_uses_local_window() {
        let limiter = SubmissionLimiter::new("waitlist", 1, Duration::from_secs(60), None);
        assert!(limiter.is_allowed("ada@x.com").await);
        assert!(!limiter.is_allowed("ada@x.com").await);
    }
}
