//! HTTP client for the AI engine service (classification, retrieval and
//! draft generation live behind one JSON API).

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{Classification, Classifier, Draft, Generator, Passage, Retriever};

const MAX_RETRIES: usize = 2;
const BASE_BACKOFF_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct EngineClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct RetrieveRequest<'a> {
    query: &'a str,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    query: &'a str,
    passages: &'a [Passage],
}

#[derive(Deserialize)]
struct RetrieveResponse {
    passages: Vec<Passage>,
}

impl EngineClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut attempts = 0;

        loop {
            let result = self.client.post(&url).json(body).send().await;

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp.json::<T>().await?);
                    }
                    // Retry server-side failures; client errors are final.
                    if status.is_server_error() && attempts < MAX_RETRIES {
                        attempts += 1;
                        let backoff = BASE_BACKOFF_MS * (1 << (attempts - 1));
                        tracing::warn!(
                            "engine {path} returned {status} (attempt {attempts}/{MAX_RETRIES}), backing off {backoff}ms"
                        );
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                        continue;
                    }
                    let body = resp.text().await.unwrap_or_default();
                    return Err(anyhow!("engine {path} failed ({status}): {body}"));
                }
                Err(err) if (err.is_timeout() || err.is_connect()) && attempts < MAX_RETRIES => {
                    attempts += 1;
                    let backoff = BASE_BACKOFF_MS * (1 << (attempts - 1));
                    tracing::warn!(
                        "engine {path} unreachable (attempt {attempts}/{MAX_RETRIES}), backing off {backoff}ms: {err}"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[async_trait]
impl Classifier for EngineClient {
    async fn classify(&self, text: &str) -> Result<Classification> {
        self.post_json("/api/classify", &ClassifyRequest { text })
            .await
    }
}

#[async_trait]
impl Retriever for EngineClient {
    async fn retrieve(&self, query: &str) -> Result<Vec<Passage>> {
        let resp: RetrieveResponse = self
            .post_json("/api/retrieve", &RetrieveRequest { query })
            .await?;
        Ok(resp.passages)
    }
}

#[async_trait]
impl Generator for EngineClient {
    async fn generate(&self, query: &str, passages: &[Passage]) -> Result<Draft> {
        self.post_json("/api/generate", &GenerateRequest { query, passages })
            .await
    }
}
