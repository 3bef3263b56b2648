//! Semantic retrieval over the SIMAP knowledge base.
//!
//! - [`QdrantStore`]: the vector store over Qdrant's REST API
//! - [`RetryVectorStore`]: backoff around any store
//! - [`Retriever`]: embed, search top-k, serialize fragments
//! - [`RetrieveTool`]: the `retrieve` tool bound to the decide step

pub mod qdrant;
pub mod resilient;
pub mod retriever;
pub mod tool;

pub use qdrant::QdrantStore;
pub use resilient::RetryVectorStore;
pub use retriever::{
    NO_RESULTS_SENTINEL, Retrieval, RetrievalReport, RetrievalStatus, Retriever,
    UNAVAILABLE_SENTINEL, serialize_fragments,
};
pub use tool::{RETRIEVE_TOOL_NAME, RetrieveTool};
