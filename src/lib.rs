pub mod batch;
pub mod cli;
pub mod config;
pub mod encoder;
pub mod error;
pub mod index;
pub mod loader;
pub mod matches;
pub mod pipeline;
pub mod provider;
pub mod record;
pub mod utils;

pub use batch::{BatchEmbedder, BatchOutput};
pub use config::Opts;
pub use encoder::{ClipEncoder, Embedding, ImageEncoder};
pub use error::{Error, Result};
pub use index::{IndexBackend, LocalIndex, PineconeIndex, VectorIndex};
pub use loader::{ImageFetcher, ImageHandle, ImageLoader};
pub use matches::{MatchResult, QueryResponse, RawMatch, highest_score, select_top};
pub use pipeline::Pipeline;
pub use record::{IndexRecord, RecordMetadata, assemble};
