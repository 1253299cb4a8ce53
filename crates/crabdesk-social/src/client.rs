//! Social platform access. The watch loop only sees the trait; the
//! Mastodon implementation is one of possibly many connectors.

use std::collections::BTreeSet;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crabdesk_schema::SocialPost;
use serde::Deserialize;

#[async_trait]
pub trait SocialClient: Send + Sync {
    /// Fetch posts for the given hashtags, newest first, optionally only
    /// those newer than `since_id`.
    async fn poll(&self, hashtags: &[String], since_id: Option<&str>) -> Result<Vec<SocialPost>>;

    /// Post a public reply to the given post.
    async fn reply(&self, post_id: &str, text: &str) -> Result<()>;
}

pub struct MastodonClient {
    instance_url: String,
    access_token: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct MastodonStatus {
    id: String,
    content: String,
    account: MastodonAccount,
    created_at: DateTime<Utc>,
    #[serde(default)]
    tags: Vec<MastodonTag>,
}

#[derive(Deserialize)]
struct MastodonAccount {
    acct: String,
}

#[derive(Deserialize)]
struct MastodonTag {
    name: String,
}

impl MastodonClient {
    pub fn new(instance_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            instance_url: instance_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            client: reqwest::Client::new(),
        }
    }

    fn to_post(status: MastodonStatus) -> SocialPost {
        SocialPost {
            post_id: status.id,
            text: strip_html(&status.content),
            author: status.account.acct,
            at: status.created_at,
            hashtags: status
                .tags
                .into_iter()
                .map(|t| t.name.to_lowercase())
                .collect::<BTreeSet<_>>(),
        }
    }
}

/// Statuses arrive as HTML; keep the text, drop the markup. Tag
/// boundaries collapse to single spaces so words stay apart.
fn strip_html(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut in_tag = false;
    for c in content.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                if !out.is_empty() && !out.ends_with(' ') {
                    out.push(' ');
                }
            }
            c if !in_tag => {
                if c.is_whitespace() {
                    if !out.is_empty() && !out.ends_with(' ') {
                        out.push(' ');
                    }
                } else {
                    out.push(c);
                }
            }
            _ => {}
        }
    }
    out.trim_end().to_string()
}

#[async_trait]
impl SocialClient for MastodonClient {
    async fn poll(&self, hashtags: &[String], since_id: Option<&str>) -> Result<Vec<SocialPost>> {
        let mut posts: Vec<SocialPost> = Vec::new();
        let mut seen_ids = BTreeSet::new();

        for tag in hashtags {
            let url = format!("{}/api/v1/timelines/tag/{}", self.instance_url, tag);
            let mut req = self
                .client
                .get(&url)
                .bearer_auth(&self.access_token);
            if let Some(since) = since_id {
                req = req.query(&[("since_id", since)]);
            }

            let resp = req.send().await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(anyhow!("mastodon timeline {tag} failed ({status}): {body}"));
            }

            let statuses: Vec<MastodonStatus> = resp.json().await?;
            for status in statuses {
                // A post can show up under several of our hashtags.
                if seen_ids.insert(status.id.clone()) {
                    posts.push(Self::to_post(status));
                }
            }
        }

        Ok(posts)
    }

    async fn reply(&self, post_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/api/v1/statuses", self.instance_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({
                "status": text,
                "in_reply_to_id": post_id,
                "visibility": "public",
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("mastodon reply to {post_id} failed ({status}): {body}"));
        }
        Ok(())
    }
}
