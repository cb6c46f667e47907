pub mod memory;
pub mod pgvector;

pub use memory::{InMemoryChunkStore, InMemoryRegistry};
pub use pgvector::PgVectorChunkStore;
