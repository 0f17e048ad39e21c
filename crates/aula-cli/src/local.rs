//! In-process collaborators for running the engine from a terminal.
//!
//! `LocalDocuments` scores corpus paragraphs by word overlap with the query;
//! `LocalComplaints` keeps submitted complaints in memory.

use async_trait::async_trait;
use aula_engine::{
    ComplaintPriority, ComplaintRecord, ComplaintService, ComplaintStatus, ComplaintSubmission,
    DocumentChunk, DocumentInfo, DocumentService, SearchQuery, SearchResponse, ServiceResult,
};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Words shorter than this are ignored when scoring
const MIN_WORD_LEN: usize = 3;

/// One corpus entry as stored on disk
#[derive(Debug, Clone, Deserialize)]
pub struct CorpusDocument {
    pub filename: String,
    pub content: String,
}

struct Paragraph {
    document_id: String,
    filename: String,
    page_number: u32,
    content: String,
    words: HashSet<String>,
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_WORD_LEN)
        .map(str::to_lowercase)
        .collect()
}

/// Document search over an in-memory corpus
pub struct LocalDocuments {
    documents: Vec<CorpusDocument>,
    paragraphs: Vec<Paragraph>,
}

impl LocalDocuments {
    pub fn new(documents: Vec<CorpusDocument>) -> Self {
        let mut paragraphs = Vec::new();
        for (index, doc) in documents.iter().enumerate() {
            let document_id = format!("doc-{}", index + 1);
            for (n, text) in doc
                .content
                .split("\n\n")
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .enumerate()
            {
                paragraphs.push(Paragraph {
                    document_id: document_id.clone(),
                    filename: doc.filename.clone(),
                    page_number: n as u32 + 1,
                    content: text.to_string(),
                    words: words(text),
                });
            }
        }
        tracing::debug!(
            documents = documents.len(),
            paragraphs = paragraphs.len(),
            "Local corpus loaded"
        );
        Self {
            documents,
            paragraphs,
        }
    }

    /// Load a JSON array of `{filename, content}` objects
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let documents: Vec<CorpusDocument> = serde_json::from_str(&content)?;
        Ok(Self::new(documents))
    }

    /// Small built-in corpus used when none is configured
    pub fn sample() -> Self {
        Self::new(vec![
            CorpusDocument {
                filename: "calendario_academico.pdf".into(),
                content: "Los exámenes finales del semestre se realizan del 1 al 15 de julio.\n\n\
                          La matrícula para el siguiente semestre abre el 1 de agosto y cierra el 15 de agosto."
                    .into(),
            },
            CorpusDocument {
                filename: "reglamento_biblioteca.pdf".into(),
                content: "La biblioteca central atiende de lunes a viernes de 8:00 a 21:00 horas.\n\n\
                          El préstamo de libros dura siete días y puede renovarse una vez."
                    .into(),
            },
        ])
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Fraction of the query's words present in the paragraph
    fn score(query: &HashSet<String>, paragraph: &Paragraph) -> f32 {
        if query.is_empty() {
            return 0.0;
        }
        let hits = query.intersection(&paragraph.words).count();
        hits as f32 / query.len() as f32
    }
}

#[async_trait]
impl DocumentService for LocalDocuments {
    async fn search(&self, query: &SearchQuery) -> ServiceResult<SearchResponse> {
        let query_words = words(&query.query);
        let mut scored: Vec<(f32, &Paragraph)> = self
            .paragraphs
            .iter()
            .map(|p| (Self::score(&query_words, p), p))
            .filter(|(score, _)| *score > 0.0 && *score >= query.similarity_threshold)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let total_found = scored.len();
        let chunks: Vec<DocumentChunk> = scored
            .into_iter()
            .take(query.limit)
            .map(|(score, p)| DocumentChunk {
                content: p.content.clone(),
                similarity_score: score,
                document_id: p.document_id.clone(),
                filename: p.filename.clone(),
                page_number: Some(p.page_number),
            })
            .collect();
        let best_similarity = chunks.first().map_or(0.0, |c| c.similarity_score);

        Ok(SearchResponse {
            chunks,
            best_similarity,
            total_found,
        })
    }

    async fn get_document(&self, id: &str) -> ServiceResult<Option<DocumentInfo>> {
        let index = id
            .strip_prefix("doc-")
            .and_then(|n| n.parse::<usize>().ok())
            .and_then(|n| n.checked_sub(1));
        Ok(index
            .and_then(|i| self.documents.get(i))
            .map(|doc| DocumentInfo {
                id: id.to_string(),
                filename: doc.filename.clone(),
                document_type: Path::new(&doc.filename)
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("txt")
                    .to_string(),
                processing_status: "completed".into(),
            }))
    }
}

/// Complaint store kept in memory for the lifetime of the process
#[derive(Default)]
pub struct LocalComplaints {
    records: Mutex<Vec<ComplaintRecord>>,
}

impl LocalComplaints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ComplaintRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl ComplaintService for LocalComplaints {
    async fn submit(&self, submission: ComplaintSubmission) -> ServiceResult<ComplaintRecord> {
        let priority = if submission.description.to_lowercase().contains("urgente") {
            ComplaintPriority::High
        } else {
            ComplaintPriority::Medium
        };
        let record = ComplaintRecord {
            id: uuid::Uuid::new_v4().to_string(),
            title: submission.title,
            category: submission.category,
            priority,
            status: ComplaintStatus::Submitted,
            is_anonymous: submission.is_anonymous,
            created_at: Utc::now(),
        };
        tracing::info!(
            complaint_id = %record.id,
            category = record.category.as_str(),
            "Complaint stored"
        );
        self.records.lock().push(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aula_engine::ComplaintCategory;

    fn query(text: &str, threshold: f32) -> SearchQuery {
        SearchQuery {
            query: text.into(),
            limit: 3,
            similarity_threshold: threshold,
        }
    }

    #[tokio::test]
    async fn test_search_ranks_by_overlap() {
        let docs = LocalDocuments::sample();
        let response = docs
            .search(&query("¿Cuándo son los exámenes finales?", 0.5))
            .await
            .unwrap();
        assert_eq!(response.chunks.len(), 1);
        assert_eq!(response.chunks[0].filename, "calendario_academico.pdf");
        assert!(response.chunks[0].content.contains("1 al 15 de julio"));
        assert_eq!(response.best_similarity, response.chunks[0].similarity_score);
    }

    #[tokio::test]
    async fn test_search_threshold_filters() {
        let docs = LocalDocuments::sample();
        let response = docs.search(&query("piscina olímpica", 0.1)).await.unwrap();
        assert!(response.chunks.is_empty());
        assert_eq!(response.best_similarity, 0.0);
    }

    #[tokio::test]
    async fn test_get_document() {
        let docs = LocalDocuments::sample();
        let info = docs.get_document("doc-2").await.unwrap().unwrap();
        assert_eq!(info.filename, "reglamento_biblioteca.pdf");
        assert_eq!(info.document_type, "pdf");
        assert!(docs.get_document("doc-9").await.unwrap().is_none());
        assert!(docs.get_document("doc-0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complaints_are_stored() {
        let store = LocalComplaints::new();
        let record = store
            .submit(ComplaintSubmission {
                title: "Wifi caído".into(),
                description: "Es urgente, el wifi no funciona".into(),
                category: ComplaintCategory::Technology,
                is_anonymous: true,
                user_id: None,
                conversation_id: None,
            })
            .await
            .unwrap();
        assert_eq!(record.priority, ComplaintPriority::High);
        assert_eq!(record.id.len(), 36);
        assert_eq!(store.records().len(), 1);
    }
}
