//! findit-core: library and indexing engine for FindIt
//!
//! Provides the authoritative per-folder storage, the aggregated global
//! query index, the layered media indexer, the hybrid search engine, and
//! the supporting services (probing, speech-to-text, vision-language
//! description, network resilience, folder hierarchy resolution) that
//! back the daemon and CLI.

pub mod embed;
pub mod error;
pub mod export;
pub mod filter;
pub mod hash;
pub mod hierarchy;
pub mod hnsw;
pub mod indexer;
pub mod media;
pub mod network;
pub mod query_cache;
pub mod search;
pub mod segment_clips;
pub mod storage;
pub mod timecode;
pub mod vector_index;
pub mod volume;

#[cfg(feature = "audio-transcription")]
pub mod stt;

pub mod vlm;

pub use error::{FindItError, Result};
pub use export::{EdlClip, EdlExport, FcpxmlExport, ReelNamingPolicy, SourceClip};
pub use filter::{ClipFilter, FilterPredicate, SortField};
pub use hash::{check_integrity, hash_file, IntegrityStatus};
pub use hierarchy::{plan_registration, FolderRelation, RegistrationPlan};
pub use hnsw::HnswGraph;
pub use indexer::{CloudAccess, IndexLayer, Indexer, IndexerConfig};
pub use media::{probe_media, MediaProbe};
pub use network::{ConnState, ConnectivityError, ConnectivityObserver, RateLimiter, RetryPolicy};
pub use query_cache::{CachedEmbedding, QueryCache};
pub use search::{search, FusionWeights, HybridSearchOptions, SearchContext, SearchHit, SearchMode};
pub use segment_clips::{segment_video, ClipSpan};
pub use storage::{Clip, ClipLists, ColorLabel, FacetCounts, Folder, FolderDb, FtsHit, GlobalDb, IndexStatus, MediaType, Video};
pub use timecode::Timecode;
pub use vector_index::VectorIndex;
pub use volume::{list_mounted_volumes, resolve_by_uuid, MountedVolume};

#[cfg(feature = "audio-transcription")]
pub use stt::{transcribe, TranscriptSegment};

pub use vlm::{describe_clip, ClipDescription, VlmClient};
