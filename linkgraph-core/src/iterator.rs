use crate::error::{GraphError, Result};
use crate::graph::RecordIterator;

/// Cursor over a privately owned, already materialised list of records.
///
/// Holds no reference to the store that produced it, so it can be kept
/// across any amount of writer activity. It serves the state of the store
/// at the moment it was built.
pub struct SnapshotIterator<T> {
    pending: std::vec::IntoIter<T>,
    current: Option<T>,
    fault: Option<GraphError>,
    closed: bool,
}

impl<T> SnapshotIterator<T> {
    pub fn new(records: Vec<T>) -> Self {
        Self {
            pending: records.into_iter(),
            current: None,
            fault: None,
            closed: false,
        }
    }

    /// An iterator that yields nothing and reports `fault`.
    pub fn failed(fault: GraphError) -> Self {
        Self {
            pending: Vec::new().into_iter(),
            current: None,
            fault: Some(fault),
            closed: false,
        }
    }

    /// Number of records not yet reached by the cursor.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl<T: Clone + Send> RecordIterator<T> for SnapshotIterator<T> {
    fn advance(&mut self) -> bool {
        if self.closed || self.fault.is_some() {
            self.current = None;
            return false;
        }

        self.current = self.pending.next();
        self.current.is_some()
    }

    fn current(&self) -> Option<T> {
        self.current.clone()
    }

    fn fault(&self) -> Option<&GraphError> {
        self.fault.as_ref()
    }

    fn take_fault(&mut self) -> Option<GraphError> {
        self.current = None;
        self.pending = Vec::new().into_iter();
        self.fault.take()
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.current = None;
            self.pending = Vec::new().into_iter();
        }
        Ok(())
    }
}

impl<T: Clone + Send> Iterator for SnapshotIterator<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.advance() { self.current() } else { None }
    }
}
