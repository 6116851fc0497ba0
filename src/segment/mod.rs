//! Segment file codec, reader, and merger (spec.md §4.1–§4.3).
//!
//! A segment is an immutable, on-disk, sorted collection of `(hash, doc_id)`
//! postings, laid out as a fixed header, delta-encoded posting blocks, and a
//! skip table for binary-search block lookup.

pub mod header;
pub mod merger;
pub mod reader;
pub mod writer;

pub use header::{SegmentHeader, FORMAT_VERSION, HEADER_SIZE};
pub use merger::merge_segments;
pub use reader::SegmentReader;
pub use writer::write_segment;
