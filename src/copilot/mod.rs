//! Policy copilot: retrieval over the KYC rulebook with canned answers.

pub mod retrieval;
pub mod splitter;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::CopilotConfig;
use crate::core::db::{PolicyChunk, PolicyRepository};
use retrieval::TermVector;
use splitter::TextSplitter;

pub const NOT_INITIALIZED_ANSWER: &str = "I'm sorry, my knowledge base is not initialized.";

const PAGE_BREAK: char = '\u{000C}';

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<String>,
}

/// Split a rulebook into chunks. Pages are separated by form feeds; a
/// document without any has no page numbers.
pub fn chunk_document(text: &str, splitter: &TextSplitter) -> Vec<PolicyChunk> {
    if !text.contains(PAGE_BREAK) {
        return splitter
            .split(text)
            .into_iter()
            .map(|content| PolicyChunk { page: None, content })
            .collect();
    }

    text.split(PAGE_BREAK)
        .enumerate()
        .flat_map(|(page, page_text)| {
            splitter.split(page_text).into_iter().map(move |content| PolicyChunk {
                page: Some(page as i64),
                content,
            })
        })
        .collect()
}

/// Indexed rulebook chunks
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    chunks: Vec<PolicyChunk>,
    vectors: Vec<TermVector>,
}

impl KnowledgeBase {
    pub fn new(chunks: Vec<PolicyChunk>) -> Self {
        let vectors = chunks.iter().map(|c| TermVector::from_text(&c.content)).collect();
        Self { chunks, vectors }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Best matching chunks for `question`, best first
    pub fn search(&self, question: &str, k: usize) -> Vec<&PolicyChunk> {
        let query = TermVector::from_text(question);
        retrieval::rank(&query, &self.vectors, k)
            .into_iter()
            .map(|i| &self.chunks[i])
            .collect()
    }
}

fn source_label(chunk: &PolicyChunk) -> String {
    match chunk.page {
        Some(page) => format!("Page {}", page),
        None => "Page Unknown".to_string(),
    }
}

fn prefix(text: &str, chars: usize) -> &str {
    match text.char_indices().nth(chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Rule based reply built around the retrieved context
pub fn compose_answer(question: &str, context: &str) -> String {
    let lowered = question.to_lowercase();
    let reference = prefix(context, 200);

    if lowered.contains("address") {
        format!(
            "Based on the KYC Policy, address verification requires proof of residence such as a utility bill or bank statement issued within the last 3 months. Reference Context: {}...",
            reference
        )
    } else if lowered.contains("id") || lowered.contains("identity") {
        format!(
            "The policy states that identity verification (KYC) must be performed using a government-issued photo ID (Passport, Driving License, or National ID). Reference Context: {}...",
            reference
        )
    } else if lowered.contains("forgery") || lowered.contains("tampering") {
        format!(
            "In case of suspected document tampering, the protocol requires immediate escalation to the Fraud Investigation Team. ELA heatmaps must be saved for the report. Reference Context: {}...",
            reference
        )
    } else {
        format!(
            "I found some relevant information in the policy regarding '{}'. Here is a summary of the matched sections: {}...",
            question,
            prefix(context, 300)
        )
    }
}

/// Answers compliance questions from the stored rulebook
#[derive(Debug, Clone)]
pub struct Copilot {
    knowledge: Option<KnowledgeBase>,
    top_k: usize,
}

impl Copilot {
    pub fn new(knowledge: Option<KnowledgeBase>, top_k: usize) -> Self {
        Self {
            knowledge: knowledge.filter(|kb| !kb.is_empty()),
            top_k,
        }
    }

    /// Stored chunks when there are any, else the policy document, else nothing
    pub async fn init<R: PolicyRepository>(repo: &R, config: &CopilotConfig) -> anyhow::Result<Self> {
        let stored = repo.get_policy_chunks().await?;
        if !stored.is_empty() {
            info!(chunks = stored.len(), "loaded stored policy knowledge base");
            return Ok(Self::new(Some(KnowledgeBase::new(stored)), config.top_k));
        }

        if config.policy_doc.is_file() {
            let knowledge = Self::ingest_document(repo, &config.policy_doc, config).await?;
            return Ok(Self::new(Some(knowledge), config.top_k));
        }

        warn!(
            policy_doc = %config.policy_doc.display(),
            "policy document not found; copilot starts without a knowledge base"
        );
        Ok(Self::new(None, config.top_k))
    }

    /// Chunk a text rulebook and replace the stored chunks with it
    pub async fn ingest_document<R: PolicyRepository>(
        repo: &R,
        path: &Path,
        config: &CopilotConfig,
    ) -> anyhow::Result<KnowledgeBase> {
        info!(policy_doc = %path.display(), "ingesting policy document");
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read policy document {:?}", path))?;

        let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap)?;
        let chunks = chunk_document(&text, &splitter);
        repo.replace_policy_chunks(&chunks).await?;
        debug!(chunks = chunks.len(), "policy document chunked");
        Ok(KnowledgeBase::new(chunks))
    }

    pub fn is_initialized(&self) -> bool {
        self.knowledge.is_some()
    }

    pub fn query(&self, question: &str) -> ChatResponse {
        let Some(knowledge) = &self.knowledge else {
            return ChatResponse {
                answer: NOT_INITIALIZED_ANSWER.to_string(),
                sources: Vec::new(),
            };
        };

        let hits = knowledge.search(question, self.top_k);
        let context = hits
            .iter()
            .map(|chunk| chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut sources: Vec<String> = Vec::new();
        for label in hits.iter().map(|chunk| source_label(chunk)) {
            if !sources.contains(&label) {
                sources.push(label);
            }
        }

        debug!(hits = hits.len(), "copilot query answered");
        ChatResponse {
            answer: compose_answer(question, &context),
            sources,
        }
    }
}
