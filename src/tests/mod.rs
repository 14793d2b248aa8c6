
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::candidates::CandidateRegistry;
use crate::errors::DrugRagError;
use crate::errors::Result;
use crate::llm::ChatMessage;
use crate::llm::LanguageModel;
use crate::rag::AdviceOptions;
use crate::rag::AdvicePipeline;
use crate::rag::MatchType;
use crate::rag::Retriever;
use crate::rag::SearchBackend;
use crate::rag::Snippet;

/// Language model answering from a script; the last reply repeats
pub struct MockLlm {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockLlm {
    pub fn replying(reply: &str) -> Self {
        Self::scripted(&[reply])
    }

    pub fn scripted(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| (*r).to_string()).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every conversation sent so far
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for MockLlm {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());
        let mut replies = self.replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            replies.pop_front().unwrap_or_default()
        } else {
            replies.front().cloned().unwrap_or_default()
        };
        Ok(reply)
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// Language model whose every call fails
pub struct FailingLlm;

#[async_trait]
impl LanguageModel for FailingLlm {
    async fn chat(&self, _messages: &[ChatMessage]) -> Result<String> {
        Err(DrugRagError::LlmError("HTTP 503: service unavailable".to_string()))
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// Backend returning fixed snippets and recording queries
pub struct MockBackend {
    snippets: Vec<Snippet>,
    queries: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn with_texts(texts: &[&str]) -> Self {
        Self {
            snippets: texts
                .iter()
                .enumerate()
                .map(|(i, t)| Snippet::new(*t, 1.0 - i as f32 * 0.1, MatchType::Semantic))
                .collect(),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchBackend for MockBackend {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Snippet>> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.snippets.iter().take(top_k).cloned().collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Backend whose every search fails
pub struct FailingBackend;

#[async_trait]
impl SearchBackend for FailingBackend {
    async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<Snippet>> {
        Err(DrugRagError::GraphError("connection refused".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Pipeline over the given collaborators
pub fn build_pipeline(
    llm: Arc<dyn LanguageModel>,
    backend: Arc<dyn SearchBackend>,
    candidates: CandidateRegistry,
    options: AdviceOptions,
) -> AdvicePipeline {
    AdvicePipeline::new(llm, Retriever::new(backend, 10), Arc::new(candidates), options)
}

/// The two-drug formulary used across tests
pub fn sample_candidates() -> CandidateRegistry {
    CandidateRegistry::from_names(["阿司匹林", "二甲双胍"])
}
