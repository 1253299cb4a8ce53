pub mod engine;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use engine::EngineClient;

/// One retrieved documentation passage, ranked by the retrieval backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    pub score: f32,
    #[serde(default)]
    pub source: Option<String>,
}

/// Output of the intent/sentiment classifier for one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub intent: String,
    pub confidence: f32,
    pub sentiment: f32,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// A drafted reply plus the generator's own confidence in it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub text: String,
    pub confidence: f32,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification>;
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<Passage>>;
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, query: &str, passages: &[Passage]) -> Result<Draft>;
}

/// Fixed-output collaborators for tests and offline runs.
pub struct StubClassifier {
    pub classification: Classification,
}

impl StubClassifier {
    pub fn neutral() -> Self {
        Self {
            classification: Classification {
                intent: "general".into(),
                confidence: 0.9,
                sentiment: 0.0,
                keywords: vec![],
            },
        }
    }
}

#[async_trait]
impl Classifier for StubClassifier {
    async fn classify(&self, _text: &str) -> Result<Classification> {
        Ok(self.classification.clone())
    }
}

pub struct StubRetriever;

#[async_trait]
impl Retriever for StubRetriever {
    async fn retrieve(&self, _query: &str) -> Result<Vec<Passage>> {
        Ok(vec![])
    }
}

pub struct StubGenerator;

#[async_trait]
impl Generator for StubGenerator {
    async fn generate(&self, query: &str, passages: &[Passage]) -> Result<Draft> {
        Ok(Draft {
            text: format!("[stub:{} passages] {query}", passages.len()),
            confidence: 0.9,
        })
    }
}
