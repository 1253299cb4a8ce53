//! The social watch loop: poll the platform, funnel qualifying posts
//! through the same escalation path as chat, and answer publicly within
//! the per-author reply budget.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crabdesk_core::{Orchestrator, SocialConfig};
use crabdesk_schema::SocialPost;
use crabdesk_store::DeskStore;
use tokio_util::sync::CancellationToken;

use crate::client::SocialClient;
use crate::contact::{compose_reply, contact_token, contact_url};
use crate::dedup::SeenPosts;
use crate::rate_limit::ReplyLimiter;

pub struct SocialWatch {
    client: Arc<dyn SocialClient>,
    orchestrator: Arc<Orchestrator>,
    seen: SeenPosts,
    limiter: ReplyLimiter,
    hashtags: Vec<String>,
    poll_interval: Duration,
    contact_base_url: String,
    since_id: Option<String>,
}

impl SocialWatch {
    pub fn new(
        client: Arc<dyn SocialClient>,
        orchestrator: Arc<Orchestrator>,
        store: Arc<DeskStore>,
        config: &SocialConfig,
    ) -> Self {
        Self {
            client,
            orchestrator,
            seen: SeenPosts::new(store, config.seen_window_secs),
            limiter: ReplyLimiter::new(config.replies_per_window, config.reply_window_secs),
            hashtags: config.hashtags.iter().map(|h| h.to_lowercase()).collect(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            contact_base_url: config.contact_base_url.clone(),
            since_id: None,
        }
    }

    /// Run until cancelled. Poll failures are logged and retried on the
    /// next tick; they never kill the loop.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(hashtags = ?self.hashtags, "social watch started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("social watch stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.poll_once().await {
                        tracing::warn!("social poll failed: {err}");
                    }
                }
            }
        }
    }

    /// One poll cycle. Returns how many posts escalated.
    pub async fn poll_once(&mut self) -> Result<usize> {
        self.seen.prune_expired().await?;
        self.limiter.prune_idle().await;

        let posts = self
            .client
            .poll(&self.hashtags, self.since_id.as_deref())
            .await?;

        let mut escalated = 0;
        for post in posts {
            self.advance_since_id(&post.post_id);

            if self.matched_hashtags(&post).is_empty() {
                continue;
            }
            if !self.seen.check_and_mark(&post.post_id).await? {
                tracing::debug!(post_id = %post.post_id, "post already processed");
                continue;
            }

            match self.orchestrator.handle_social_post(&post).await {
                Ok(Some(ticket)) => {
                    escalated += 1;
                    self.answer_publicly(&post, ticket.id).await;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(post_id = %post.post_id, "failed to process post: {err}");
                }
            }
        }
        Ok(escalated)
    }

    fn matched_hashtags(&self, post: &SocialPost) -> BTreeSet<String> {
        post.hashtags
            .iter()
            .map(|h| h.to_lowercase())
            .filter(|h| self.hashtags.contains(h))
            .collect()
    }

    /// Reply unless the author's window is spent. Either way the ticket
    /// already exists; suppression only mutes the public side.
    async fn answer_publicly(&self, post: &SocialPost, ticket_id: uuid::Uuid) {
        if !self.limiter.try_acquire(&post.author).await {
            tracing::info!(
                author = %post.author,
                ticket_id = %ticket_id,
                "public reply suppressed by rate limit"
            );
            return;
        }

        let token = contact_token(&post.author, &post.post_id);
        let url = contact_url(&self.contact_base_url, &token);
        let text = compose_reply(&post.author, &url);

        match self.client.reply(&post.post_id, &text).await {
            Ok(()) => {
                tracing::info!(
                    post_id = %post.post_id,
                    ticket_id = %ticket_id,
                    token,
                    "public reply sent"
                );
            }
            Err(err) => {
                tracing::warn!(post_id = %post.post_id, "public reply failed: {err}");
            }
        }
    }

    /// Mastodon ids are decimal strings; longer means newer.
    fn advance_since_id(&mut self, post_id: &str) {
        let newer = match self.since_id.as_deref() {
            None => true,
            Some(current) => {
                (post_id.len(), post_id) > (current.len(), current)
            }
        };
        if newer {
            self.since_id = Some(post_id.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use crabdesk_core::{
        ContextManager, EscalationConfig, PolicyEvaluator, PriorityRanker, SignalNormalizer,
    };
    use crabdesk_provider::{
        Classification, Classifier, Draft, Generator, Passage, Retriever,
    };
    use crabdesk_ticket::TicketManager;
    use std::sync::Mutex;

    struct ScriptedSocial {
        batches: Mutex<Vec<Vec<SocialPost>>>,
        replies: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedSocial {
        fn new(batches: Vec<Vec<SocialPost>>) -> Self {
            Self {
                batches: Mutex::new(batches),
                replies: Mutex::new(Vec::new()),
            }
        }

        fn reply_count(&self) -> usize {
            self.replies.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SocialClient for ScriptedSocial {
        async fn poll(
            &self,
            _hashtags: &[String],
            _since_id: Option<&str>,
        ) -> Result<Vec<SocialPost>> {
            let mut batches = self.batches.lock().unwrap();
            if batches.is_empty() {
                Ok(vec![])
            } else {
                Ok(batches.remove(0))
            }
        }

        async fn reply(&self, post_id: &str, text: &str) -> Result<()> {
            self.replies
                .lock()
                .unwrap()
                .push((post_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    struct AngryClassifier;

    #[async_trait]
    impl Classifier for AngryClassifier {
        async fn classify(&self, _text: &str) -> Result<Classification> {
            Ok(Classification {
                intent: "general".into(),
                confidence: 0.9,
                sentiment: -0.9,
                keywords: vec![],
            })
        }
    }

    struct EmptyRetriever;

    #[async_trait]
    impl Retriever for EmptyRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<Passage>> {
            Ok(vec![])
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn generate(&self, query: &str, _passages: &[Passage]) -> Result<Draft> {
            Ok(Draft {
                text: format!("re: {query}"),
                confidence: 0.9,
            })
        }
    }

    fn social_config(replies_per_window: usize) -> SocialConfig {
        SocialConfig {
            enabled: true,
            instance_url: "https://mastodon.example".into(),
            access_token: String::new(),
            hashtags: vec!["support".into()],
            poll_interval_secs: 1,
            replies_per_window,
            reply_window_secs: 3_600,
            seen_window_secs: 86_400,
            contact_base_url: "https://desk.example/contact".into(),
        }
    }

    fn orchestrator(store: Arc<DeskStore>) -> Arc<Orchestrator> {
        let config = EscalationConfig {
            keywords: vec!["complaint".into()],
            legal_keywords: vec![],
            cancellation_labels: vec!["cancellation".into()],
            thresholds: Default::default(),
            context_ttl_secs: 86_400,
        };
        Arc::new(Orchestrator::new(
            Arc::new(AngryClassifier),
            Arc::new(EmptyRetriever),
            Arc::new(EchoGenerator),
            SignalNormalizer::new(&config).unwrap(),
            PolicyEvaluator::new(&config),
            PriorityRanker::new(config.thresholds),
            Arc::new(TicketManager::new(store.clone())),
            ContextManager::new(store, config.context_ttl_secs),
        ))
    }

    fn post(id: &str, author: &str, tags: &[&str]) -> SocialPost {
        SocialPost {
            post_id: id.to_string(),
            text: "this is terrible".into(),
            author: author.to_string(),
            at: Utc::now(),
            hashtags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn replayed_post_escalates_once() {
        let store = Arc::new(DeskStore::open_in_memory().unwrap());
        let client = Arc::new(ScriptedSocial::new(vec![
            vec![post("1", "mika", &["support"])],
            vec![post("1", "mika", &["support"])],
        ]));
        let mut watch = SocialWatch::new(
            client.clone(),
            orchestrator(store.clone()),
            store.clone(),
            &social_config(10),
        );

        assert_eq!(watch.poll_once().await.unwrap(), 1);
        assert_eq!(watch.poll_once().await.unwrap(), 0);
        assert_eq!(client.reply_count(), 1);

        // One ticket, not two.
        let ticket = store.active_ticket_for("social:mika").await.unwrap();
        assert!(ticket.is_some());
    }

    #[tokio::test]
    async fn rate_limited_reply_still_opens_ticket() {
        let store = Arc::new(DeskStore::open_in_memory().unwrap());
        let client = Arc::new(ScriptedSocial::new(vec![vec![
            post("1", "mika", &["support"]),
            post("2", "mika", &["support"]),
        ]]));
        let mut watch = SocialWatch::new(
            client.clone(),
            orchestrator(store.clone()),
            store.clone(),
            &social_config(1),
        );

        // Both posts escalate (the second merges into the active ticket),
        // but only one public reply goes out.
        assert_eq!(watch.poll_once().await.unwrap(), 2);
        assert_eq!(client.reply_count(), 1);
        assert!(store
            .active_ticket_for("social:mika")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn unmatched_hashtags_are_skipped() {
        let store = Arc::new(DeskStore::open_in_memory().unwrap());
        let client = Arc::new(ScriptedSocial::new(vec![vec![post(
            "1",
            "mika",
            &["cooking"],
        )]]));
        let mut watch = SocialWatch::new(
            client.clone(),
            orchestrator(store.clone()),
            store.clone(),
            &social_config(10),
        );

        assert_eq!(watch.poll_once().await.unwrap(), 0);
        assert_eq!(client.reply_count(), 0);
    }

    #[tokio::test]
    async fn reply_carries_contact_reference() {
        let store = Arc::new(DeskStore::open_in_memory().unwrap());
        let client = Arc::new(ScriptedSocial::new(vec![vec![post(
            "1",
            "mika",
            &["support"],
        )]]));
        let mut watch = SocialWatch::new(
            client.clone(),
            orchestrator(store.clone()),
            store.clone(),
            &social_config(10),
        );

        watch.poll_once().await.unwrap();
        let replies = client.replies.lock().unwrap();
        let (reply_to, text) = &replies[0];
        assert_eq!(reply_to, "1");
        assert!(text.starts_with("@mika"));
        assert!(text.contains("https://desk.example/contact?token="));
        assert!(text.contains("&source=social"));
    }

    #[tokio::test]
    async fn since_id_tracks_newest_post() {
        let store = Arc::new(DeskStore::open_in_memory().unwrap());
        let client = Arc::new(ScriptedSocial::new(vec![vec![
            post("99", "a", &["support"]),
            post("100", "b", &["support"]),
            post("98", "c", &["support"]),
        ]]));
        let mut watch = SocialWatch::new(
            client,
            orchestrator(store.clone()),
            store,
            &social_config(10),
        );

        watch.poll_once().await.unwrap();
        assert_eq!(watch.since_id.as_deref(), Some("100"));
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let store = Arc::new(DeskStore::open_in_memory().unwrap());
        let client = Arc::new(ScriptedSocial::new(vec![]));
        let watch = SocialWatch::new(
            client,
            orchestrator(store.clone()),
            store,
            &social_config(10),
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watch.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watch did not stop")
            .unwrap();
    }
}
