//! Linkgraph core - the link/edge store behind the crawler pipeline.
//!
//! Crawler workers upsert links and edges as pages are fetched, batch jobs
//! scan disjoint `[from, to)` partitions of the id space in parallel, and a
//! pruning pass drops edges that a crawl did not reconfirm.
//!
//! # Example
//!
//! ```
//! use linkgraph_core::{Edge, Graph, InMemoryGraph, Link, collect_records};
//! use uuid::Uuid;
//!
//! let graph = InMemoryGraph::new();
//!
//! let mut home = Link::new("https://example.com/", 100);
//! let mut about = Link::new("https://example.com/about", 0);
//! graph.upsert_link(&mut home).unwrap();
//! graph.upsert_link(&mut about).unwrap();
//!
//! let mut edge = Edge::new(home.id, about.id);
//! graph.upsert_edge(&mut edge).unwrap();
//!
//! let all = graph
//!     .links(Uuid::nil(), Uuid::from_u128(u128::MAX), i64::MAX)
//!     .and_then(collect_records)
//!     .unwrap();
//! assert_eq!(all.len(), 2);
//! ```

pub mod data;
pub mod error;
pub mod graph;
pub mod iterator;
pub mod memory;
pub mod model;
pub mod partition;

pub use data::SqliteGraph;
pub use error::{GraphError, Result};
pub use graph::{EdgeIterator, Graph, LinkIterator, RecordIterator, collect_records};
pub use iterator::SnapshotIterator;
pub use memory::{Clock, IdSource, InMemoryGraph, MAX_ID_ATTEMPTS};
pub use model::{Edge, Link};
pub use partition::{PartitionError, PartitionRange};
