pub mod embedding;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;
pub mod vector_index;

pub mod test_support;

pub use embedding::{build_embedder, Embedder, HashingEmbedder, OpenAiEmbedder};
pub use error::StoreError;
pub use sqlite::{PendingOutcome, SqliteStore};
pub use store::ContextStore;
pub use vector_index::{
    cosine_similarity, HistoricalRecord, IndexEntry, RecordKind, SearchFilter, VectorIndex,
};
