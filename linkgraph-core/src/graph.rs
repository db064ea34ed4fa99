use crate::error::{GraphError, Result};
use crate::model::{Edge, Link};
use uuid::Uuid;

/// Store contract shared by every link-graph backend.
///
/// Ranges are half-open: `[from, to)`. Identifiers order the same way as
/// their canonical lowercase hyphenated text, so contiguous ranges tile the
/// identifier space without gaps or overlap.
pub trait Graph: Send + Sync {
    /// Creates a new link or updates the existing link with the same URL.
    ///
    /// The resolved `id` and the stored `retrieved_at` (never lower than any
    /// value previously submitted for the URL) are written back into `link`.
    fn upsert_link(&self, link: &mut Link) -> Result<()>;

    /// Looks up a link by its identifier.
    fn find_link(&self, id: Uuid) -> Result<Link>;

    /// Creates a new edge or refreshes the existing edge for the same
    /// `(src, dst)` pair, writing back `id` and `updated_at`.
    fn upsert_edge(&self, edge: &mut Edge) -> Result<()>;

    /// Removes every edge originating at `from` that was last updated
    /// strictly before `updated_before`.
    fn remove_stale_edges(&self, from: Uuid, updated_before: i64) -> Result<()>;

    /// Links with an id in `[from, to)` retrieved before `retrieved_before`.
    fn links(&self, from: Uuid, to: Uuid, retrieved_before: i64) -> Result<LinkIterator>;

    /// Edges whose source id is in `[from, to)` updated before `updated_before`.
    fn edges(&self, from: Uuid, to: Uuid, updated_before: i64) -> Result<EdgeIterator>;
}

/// Pull-based cursor over store records.
pub trait RecordIterator<T>: Send {
    /// Moves to the next record. Returns false once the records are
    /// exhausted, a fault occurred, or the iterator was closed.
    fn advance(&mut self) -> bool;

    /// Copy of the record under the cursor. `None` before the first
    /// successful `advance`, after exhaustion, and after `close`.
    fn current(&self) -> Option<T>;

    /// The fault that stopped iteration, if iteration did not simply run out.
    fn fault(&self) -> Option<&GraphError>;

    /// Moves the fault out of the iterator, leaving it in the exhausted state.
    fn take_fault(&mut self) -> Option<GraphError>;

    /// Releases the iterator's resources. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;
}

pub type LinkIterator = Box<dyn RecordIterator<Link>>;
pub type EdgeIterator = Box<dyn RecordIterator<Edge>>;

/// Drains `iter`, closing it afterwards. A fault surfaces as `Err` so an
/// empty result is never mistaken for success.
pub fn collect_records<T>(mut iter: Box<dyn RecordIterator<T>>) -> Result<Vec<T>> {
    let mut records = Vec::new();
    while iter.advance() {
        if let Some(record) = iter.current() {
            records.push(record);
        }
    }

    let fault = iter.take_fault();
    iter.close()?;
    match fault {
        Some(err) => Err(err),
        None => Ok(records),
    }
}
