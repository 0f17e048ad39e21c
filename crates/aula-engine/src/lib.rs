//! aula-engine: Conversation engine for a university assistant
//!
//! Each user turn is classified into an intent, routed to one tool-backed
//! step (document question answering, complaint filing or small talk) and
//! formatted into a reply. Collaborators are reached only through the traits
//! in [`services`] and [`aula_ai::LanguageModel`].

pub mod config;
pub mod engine;
pub mod error;
#[cfg(feature = "graph")]
pub mod graph;
pub mod nodes;
pub mod replies;
pub mod services;
pub mod state;
pub mod tool;
pub mod tools;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use config::{EngineConfig, ExecutionMode, Sampling};
pub use engine::{
    ConversationContext, ConversationEngine, ConversationResponse, EngineStats, HealthReport,
    HealthStatus, QueryType,
};
pub use error::{Error, ErrorKind, Result, ToolExecutionError};
pub use nodes::{Handler, Node, Steps, Toolbox, route};
pub use services::{
    ComplaintCategory, ComplaintPriority, ComplaintRecord, ComplaintService, ComplaintStatus,
    ComplaintSubmission, DocumentChunk, DocumentInfo, DocumentService, SearchQuery,
    SearchResponse, ServiceError, ServiceResult,
};
pub use state::{ConversationState, Intent, ProcessingStep};
pub use tool::{Tool, ToolResult, ToolType};
pub use workflow::{SequentialWorkflow, Workflow, WorkflowInfo, build_workflow};

#[cfg(feature = "graph")]
pub use graph::{GraphWorkflow, StateGraph};
