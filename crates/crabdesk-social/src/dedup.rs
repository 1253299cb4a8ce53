//! Seen-post window. Each post id is processed at most once; the record is
//! persisted so polling overlaps and restarts do not reprocess, and pruned
//! by age so it stays bounded.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use crabdesk_store::DeskStore;

pub struct SeenPosts {
    store: Arc<DeskStore>,
    window: Duration,
}

impl SeenPosts {
    pub fn new(store: Arc<DeskStore>, window_secs: i64) -> Self {
        Self {
            store,
            window: Duration::seconds(window_secs),
        }
    }

    /// Atomically record the post id. Returns true exactly once per id
    /// within the window.
    pub async fn check_and_mark(&self, post_id: &str) -> Result<bool> {
        self.store.mark_post_seen(post_id, Utc::now()).await
    }

    pub async fn prune_expired(&self) -> Result<usize> {
        self.store.prune_seen_before(Utc::now() - self.window).await
    }
}
