//! Contracts for the collaborators the engine depends on.
//!
//! Retrieval, complaint storage and persistence live outside this crate;
//! the engine only sees them through these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error returned by collaborator implementations
pub type ServiceError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for collaborator calls
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Vector-similarity search request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub limit: usize,
    pub similarity_threshold: f32,
}

/// A retrieved document fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub content: String,
    pub similarity_score: f32,
    pub document_id: String,
    /// Filename of the source document, used as the citation label
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
}

/// Search response, chunks ordered best-first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub chunks: Vec<DocumentChunk>,
    pub best_similarity: f32,
    #[serde(default)]
    pub total_found: usize,
}

/// Catalogue entry for one uploaded document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub id: String,
    pub filename: String,
    pub document_type: String,
    pub processing_status: String,
}

/// Document retrieval service
#[async_trait]
pub trait DocumentService: Send + Sync {
    /// Search chunks by similarity to the query
    async fn search(&self, query: &SearchQuery) -> ServiceResult<SearchResponse>;

    /// Look up a document by id
    async fn get_document(&self, id: &str) -> ServiceResult<Option<DocumentInfo>>;

    /// Liveness probe
    async fn health_check(&self) -> ServiceResult<()> {
        Ok(())
    }
}

/// Complaint categories, in keyword-scoring order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintCategory {
    Academic,
    Administrative,
    Technology,
    Infrastructure,
    Services,
    Financial,
    Other,
}

impl ComplaintCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintCategory::Academic => "academic",
            ComplaintCategory::Administrative => "administrative",
            ComplaintCategory::Technology => "technology",
            ComplaintCategory::Infrastructure => "infrastructure",
            ComplaintCategory::Services => "services",
            ComplaintCategory::Financial => "financial",
            ComplaintCategory::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintPriority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    Submitted,
    Acknowledged,
    InProgress,
    Escalated,
    Resolved,
    Closed,
}

/// A complaint ready to be stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintSubmission {
    pub title: String,
    pub description: String,
    pub category: ComplaintCategory,
    pub is_anonymous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// A stored complaint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintRecord {
    pub id: String,
    pub title: String,
    pub category: ComplaintCategory,
    pub priority: ComplaintPriority,
    pub status: ComplaintStatus,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
}

impl ComplaintRecord {
    /// First 8 characters of the id, shown to users for follow-up
    pub fn short_id(&self) -> String {
        self.id.chars().take(8).collect()
    }
}

/// Complaint submission service
#[async_trait]
pub trait ComplaintService: Send + Sync {
    async fn submit(&self, submission: ComplaintSubmission) -> ServiceResult<ComplaintRecord>;

    /// Liveness probe
    async fn health_check(&self) -> ServiceResult<()> {
        Ok(())
    }
}
