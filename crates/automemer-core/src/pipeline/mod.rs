//! The meme lifecycle: ingestion into the archive and staging set, and
//! threshold-gated release into the outbound queue.

pub mod ingest;
pub mod release;

pub use ingest::{IngestProgress, IngestReport, Ingestor, ProgressFn};
pub use release::{MemeCounts, ReleaseEngine, ReleaseReport, format_meme_message};
