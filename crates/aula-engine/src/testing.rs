//! Scripted collaborators for unit tests

use async_trait::async_trait;
use aula_ai::LanguageModel;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::services::{
    ComplaintPriority, ComplaintRecord, ComplaintService, ComplaintStatus, ComplaintSubmission,
    DocumentChunk, DocumentInfo, DocumentService, SearchQuery, SearchResponse, ServiceResult,
};

/// Build a chunk whose document id is `doc-<filename>`
pub fn chunk(content: &str, similarity_score: f32, filename: &str) -> DocumentChunk {
    DocumentChunk {
        content: content.to_string(),
        similarity_score,
        document_id: format!("doc-{}", filename),
        filename: filename.to_string(),
        page_number: Some(1),
    }
}

enum Reply {
    Text(String),
    Fail,
    Hang,
}

/// A language model that answers from a script. Queued replies are used
/// first; afterwards every call gets the default reply.
pub struct ScriptedModel {
    queue: Mutex<Vec<String>>,
    default: Reply,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    fn with_default(default: Reply) -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            default,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::with_default(Reply::Text(text.to_string()))
    }

    /// Replies in order, then repeats the last one
    pub fn sequence(replies: &[&str]) -> Self {
        let last = replies.last().copied().unwrap_or_default();
        let model = Self::replying(last);
        *model.queue.lock() = replies.iter().map(|r| r.to_string()).collect();
        model
    }

    /// Every call fails with an API error
    pub fn failing() -> Self {
        Self::with_default(Reply::Fail)
    }

    /// Every call waits forever
    pub fn hanging() -> Self {
        Self::with_default(Reply::Hang)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate_text(
        &self,
        prompt: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> aula_ai::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());

        let queued = {
            let mut queue = self.queue.lock();
            if queue.is_empty() {
                None
            } else {
                Some(queue.remove(0))
            }
        };
        if let Some(text) = queued {
            return Ok(text);
        }

        match &self.default {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Fail => Err(aula_ai::Error::api("server_error", "model unavailable")),
            Reply::Hang => std::future::pending().await,
        }
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

/// Document service returning a fixed set of chunks
pub struct FakeDocuments {
    chunks: Vec<DocumentChunk>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl FakeDocuments {
    pub fn with_chunks(chunks: Vec<DocumentChunk>) -> Self {
        Self {
            chunks,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every search fails with an I/O error carrying `message`
    pub fn failing(message: &str) -> Self {
        Self {
            chunks: Vec::new(),
            failure: Some(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentService for FakeDocuments {
    async fn search(&self, query: &SearchQuery) -> ServiceResult<SearchResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(Box::new(std::io::Error::other(message.clone())));
        }
        let chunks: Vec<DocumentChunk> = self.chunks.iter().take(query.limit).cloned().collect();
        let best_similarity = chunks.first().map(|c| c.similarity_score).unwrap_or(0.0);
        Ok(SearchResponse {
            total_found: chunks.len(),
            best_similarity,
            chunks,
        })
    }

    async fn get_document(&self, id: &str) -> ServiceResult<Option<DocumentInfo>> {
        if let Some(message) = &self.failure {
            return Err(Box::new(std::io::Error::other(message.clone())));
        }
        Ok(self
            .chunks
            .iter()
            .find(|c| c.document_id == id)
            .map(|c| DocumentInfo {
                id: c.document_id.clone(),
                filename: c.filename.clone(),
                document_type: "pdf".into(),
                processing_status: "completed".into(),
            }))
    }

    async fn health_check(&self) -> ServiceResult<()> {
        match &self.failure {
            Some(message) => Err(Box::new(std::io::Error::other(message.clone()))),
            None => Ok(()),
        }
    }
}

/// Complaint service that records submissions in memory
pub struct FakeComplaints {
    submissions: Mutex<Vec<ComplaintSubmission>>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl FakeComplaints {
    pub fn new() -> Self {
        Self {
            submissions: Mutex::new(Vec::new()),
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<ComplaintSubmission> {
        self.submissions.lock().clone()
    }
}

#[async_trait]
impl ComplaintService for FakeComplaints {
    async fn submit(&self, submission: ComplaintSubmission) -> ServiceResult<ComplaintRecord> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(message) = &self.failure {
            return Err(Box::new(std::io::Error::other(message.clone())));
        }
        let record = ComplaintRecord {
            id: format!("c0ffee{:02x}-0000-4000-8000-000000000000", n),
            title: submission.title.clone(),
            category: submission.category,
            priority: ComplaintPriority::Medium,
            status: ComplaintStatus::Submitted,
            is_anonymous: submission.is_anonymous,
            created_at: Utc::now(),
        };
        self.submissions.lock().push(submission);
        Ok(record)
    }

    async fn health_check(&self) -> ServiceResult<()> {
        match &self.failure {
            Some(message) => Err(Box::new(std::io::Error::other(message.clone()))),
            None => Ok(()),
        }
    }
}
