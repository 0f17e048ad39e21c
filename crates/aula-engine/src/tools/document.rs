//! Document retrieval adapter

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::ToolExecutionError;
use crate::services::{DocumentChunk, DocumentService, SearchQuery};
use crate::tool::{Tool, ToolResult, ToolType, cancellable, instrumented, sanitize};

/// Maximum chunks requested in one search
pub const MAX_SEARCH_LIMIT: usize = 50;

/// Chunks whose text is merged into the `content` field
const CONTENT_CHUNKS: usize = 3;

/// Wraps a [`DocumentService`] behind the uniform tool contract
pub struct DocumentTool {
    service: Arc<dyn DocumentService>,
}

impl DocumentTool {
    pub fn new(service: Arc<dyn DocumentService>) -> Self {
        Self { service }
    }

    /// Similarity search. `success` is true only when at least one chunk
    /// passed the threshold; confidence is the best similarity.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        similarity_threshold: f32,
        cancel: &CancellationToken,
    ) -> ToolResult {
        let params = json!({
            "query": sanitize(query),
            "limit": limit,
            "similarity_threshold": similarity_threshold,
        });
        instrumented(
            self.name(),
            ToolType::Document,
            "search",
            params,
            self.search_inner(query, limit, similarity_threshold, cancel),
        )
        .await
    }

    async fn search_inner(
        &self,
        query: &str,
        limit: usize,
        similarity_threshold: f32,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolExecutionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ToolExecutionError::invalid_input("Search query cannot be empty")
                .with_detail("query", query));
        }
        if limit == 0 || limit > MAX_SEARCH_LIMIT {
            return Err(ToolExecutionError::invalid_input(format!(
                "Search limit must be between 1 and {}",
                MAX_SEARCH_LIMIT
            ))
            .with_detail("limit", limit));
        }
        if !(0.0..=1.0).contains(&similarity_threshold) {
            return Err(ToolExecutionError::invalid_input(
                "Similarity threshold must be between 0.0 and 1.0",
            )
            .with_detail("similarity_threshold", similarity_threshold));
        }

        let request = SearchQuery {
            query: query.to_string(),
            limit,
            similarity_threshold,
        };

        let response = cancellable(cancel, self.service.search(&request))
            .await?
            .map_err(|e| {
                ToolExecutionError::from_service("Document search failed", &*e)
                    .with_detail("query", query)
            })?;

        let chunks_found = response.chunks.len();
        let best_similarity = response
            .chunks
            .iter()
            .map(|c| c.similarity_score)
            .fold(0.0_f32, f32::max);
        let sources = distinct_sources(&response.chunks);
        let content = response
            .chunks
            .iter()
            .take(CONTENT_CHUNKS)
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        tracing::info!(
            query = %sanitize(query),
            chunks_found,
            best_similarity,
            sources_count = sources.len(),
            "Document search completed"
        );

        let mut data = Map::new();
        data.insert("query".into(), Value::from(query));
        data.insert("content".into(), Value::from(content));
        data.insert(
            "chunks".into(),
            serde_json::to_value(&response.chunks).unwrap_or(Value::Array(vec![])),
        );
        data.insert("chunks_found".into(), Value::from(chunks_found));
        data.insert("best_similarity".into(), json!(best_similarity));
        data.insert(
            "total_found".into(),
            Value::from(response.total_found.max(chunks_found)),
        );

        let result = ToolResult::ok(ToolType::Document, data, best_similarity).with_sources(sources);
        Ok(if chunks_found > 0 {
            result
        } else {
            result.unsuccessful()
        })
    }

    /// Fetch catalogue information for one document
    pub async fn get_document(&self, document_id: &str, cancel: &CancellationToken) -> ToolResult {
        let params = json!({ "document_id": document_id });
        instrumented(self.name(), ToolType::Document, "get_document", params, async {
            let id = document_id.trim();
            if id.is_empty() {
                return Err(ToolExecutionError::invalid_input("Document ID cannot be empty")
                    .with_detail("document_id", document_id));
            }

            let found = cancellable(cancel, self.service.get_document(id))
                .await?
                .map_err(|e| {
                    ToolExecutionError::from_service("Document retrieval failed", &*e)
                        .with_detail("document_id", id)
                })?;

            let mut data = Map::new();
            data.insert("document_id".into(), Value::from(id));
            Ok(match found {
                Some(info) => {
                    data.insert("filename".into(), Value::from(info.filename.clone()));
                    data.insert("document_type".into(), Value::from(info.document_type));
                    data.insert(
                        "processing_status".into(),
                        Value::from(info.processing_status),
                    );
                    ToolResult::ok(ToolType::Document, data, 1.0)
                        .with_sources(vec![info.filename])
                }
                None => ToolResult::ok(ToolType::Document, data, 0.0).unsuccessful(),
            })
        })
        .await
    }
}

/// Distinct filenames behind the chunks, first occurrence order
pub fn distinct_sources(chunks: &[DocumentChunk]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for chunk in chunks {
        if !sources.iter().any(|s| s == &chunk.filename) {
            sources.push(chunk.filename.clone());
        }
    }
    sources
}

#[async_trait]
impl Tool for DocumentTool {
    fn name(&self) -> &str {
        "DocumentTool"
    }

    fn tool_type(&self) -> ToolType {
        ToolType::Document
    }

    async fn health_check(&self) -> bool {
        match self.service.health_check().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(tool = self.name(), error = %e, "Tool health check failed");
                false
            }
        }
    }

    fn capabilities(&self) -> Value {
        json!({
            "tool_name": self.name(),
            "tool_type": ToolType::Document.as_str(),
            "operations": ["search", "get_document"],
            "max_search_limit": MAX_SEARCH_LIMIT,
        })
    }
}
