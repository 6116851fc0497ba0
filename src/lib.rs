//! # acoustidx
//!
//! A persistent, transactional inverted index for 32-bit audio-fingerprint
//! hashes. Client sessions submit documents — a document id paired with a
//! bag of hashes — and later query the index with a new bag of hashes to get
//! back the document ids whose hashes overlap most, ranked by score.
//!
//! ## Architecture
//!
//! - [`segment`] - the on-disk segment codec, memory-mapped reader, and
//!   k-way merger
//! - [`manifest`] - the atomic listing of live segments plus attributes and
//!   generation number
//! - [`index`] - the snapshot holder: publishes manifests to readers and
//!   drives commits/merges for the writer
//! - [`session`] - the transactional API: `begin`, `insert`, `commit`,
//!   `rollback`, `optimize`, `cleanup`, `search`, attributes
//! - [`query`] - the evaluator that walks segments for a hash bag and feeds
//!   a [`collector::TopHitsCollector`]
//!
//! ## Quick start
//!
//! ```no_run
//! use acoustidx::{open_index, IndexOptions};
//!
//! let index = open_index("/tmp/acoustidx-example", IndexOptions::default()).unwrap();
//! let mut session = index.begin_session();
//!
//! session.begin().unwrap();
//! session.insert(1, &[100, 200, 300]).unwrap();
//! session.commit().unwrap();
//!
//! let results = session.search(&[100]);
//! assert_eq!(results[0].doc_id, 1);
//! ```

pub mod bloom;
pub mod collector;
pub mod encoding;
pub mod error;
pub mod index;
pub mod manifest;
pub mod query;
pub mod segment;
pub mod session;
pub mod types;

pub use error::{IndexError, Result};
pub use index::{Index, Snapshot};
pub use session::{open_index, Session};
pub use types::{DocId, Hash, IndexOptions, Posting, ScoredDoc, SegmentId};
