//! Per-author cap on public replies: a bounded ring of reply timestamps per
//! author, checked against a rolling window. Suppression is policy, not an
//! error; callers log and move on.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

pub struct ReplyLimiter {
    max_per_window: usize,
    window: Duration,
    stamps: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl ReplyLimiter {
    pub fn new(max_per_window: usize, window_secs: i64) -> Self {
        Self {
            max_per_window,
            window: Duration::seconds(window_secs),
            stamps: Mutex::new(HashMap::new()),
        }
    }

    /// Take one reply slot for the author if the window has room.
    pub async fn try_acquire(&self, author: &str) -> bool {
        let now = Utc::now();
        let cutoff = now - self.window;

        let mut stamps = self.stamps.lock().await;
        let ring = stamps.entry(author.to_string()).or_default();
        while ring.front().is_some_and(|at| *at < cutoff) {
            ring.pop_front();
        }

        if ring.len() >= self.max_per_window {
            return false;
        }
        ring.push_back(now);
        true
    }

    /// Drop authors whose whole ring has aged out.
    pub async fn prune_idle(&self) {
        let cutoff = Utc::now() - self.window;
        let mut stamps = self.stamps.lock().await;
        stamps.retain(|_, ring| ring.back().is_some_and(|at| *at >= cutoff));
    }
}
