//! Collaborator layer
//!
//! Narrow interfaces to the systems the pipeline depends on but does not
//! own: blob storage, text extraction and content generation. Each has more
//! than one implementation; the active one is chosen once at startup and the
//! pipeline never branches on which it got.

pub mod extraction;
pub mod generation;
pub mod storage;

pub use extraction::{ExtractionChain, ExtractionError, HttpExtractor, LocalExtractor, TextExtractor};
pub use generation::{ContentGenerator, GenerationError, HttpGenerator, StubGenerator};
pub use storage::{BlobStorage, LocalStorage, MemoryStorage, StorageError};

use std::sync::Arc;

/// The collaborator handles shared by the pipeline, Q&A and upload paths
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn BlobStorage>,
    pub extraction: Arc<ExtractionChain>,
    pub generator: Arc<dyn ContentGenerator>,
}
