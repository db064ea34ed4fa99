//! Splitting the identifier space into contiguous `[from, to)` extents.
//!
//! Batch jobs hand one extent to each worker; because the extents share
//! their boundaries exactly, every link id lands in exactly one of them.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PartitionError {
    #[error("partition count must be greater than zero")]
    ZeroPartitions,

    #[error("range start {start} must be lower than range end {end}")]
    EmptyRange { start: Uuid, end: Uuid },

    #[error("range is too narrow to split into {0} partitions")]
    TooManyPartitions(usize),

    #[error("partition index {index} out of bounds for {count} partitions")]
    IndexOutOfBounds { index: usize, count: usize },

    #[error("identifier {0} falls outside the partitioned range")]
    OutOfRange(Uuid),
}

/// A half-open identifier range split into equally sized extents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRange {
    start: Uuid,
    end: Uuid,
    boundaries: Vec<Uuid>,
}

impl PartitionRange {
    pub fn new(start: Uuid, end: Uuid, count: usize) -> Result<Self, PartitionError> {
        if count == 0 {
            return Err(PartitionError::ZeroPartitions);
        }
        if start >= end {
            return Err(PartitionError::EmptyRange { start, end });
        }

        let (lo, hi) = (start.as_u128(), end.as_u128());
        let step = (hi - lo) / count as u128;
        if step == 0 {
            return Err(PartitionError::TooManyPartitions(count));
        }

        // boundaries[i] is the exclusive upper bound of extent i.
        let mut boundaries: Vec<Uuid> = (1..count)
            .map(|i| Uuid::from_u128(lo + step * i as u128))
            .collect();
        boundaries.push(end);

        Ok(Self {
            start,
            end,
            boundaries,
        })
    }

    /// Covers the whole identifier space, from the nil id up to the max id.
    ///
    /// The max id itself sits on the exclusive bound and is never visited;
    /// random (v4) identifiers can never take that value.
    pub fn full(count: usize) -> Result<Self, PartitionError> {
        Self::new(Uuid::nil(), Uuid::from_u128(u128::MAX), count)
    }

    pub fn count(&self) -> usize {
        self.boundaries.len()
    }

    pub fn start(&self) -> Uuid {
        self.start
    }

    pub fn end(&self) -> Uuid {
        self.end
    }

    /// The `[from, to)` bounds of extent `index`.
    pub fn extents(&self, index: usize) -> Result<(Uuid, Uuid), PartitionError> {
        let to = *self
            .boundaries
            .get(index)
            .ok_or(PartitionError::IndexOutOfBounds {
                index,
                count: self.count(),
            })?;
        let from = if index == 0 {
            self.start
        } else {
            self.boundaries[index - 1]
        };
        Ok((from, to))
    }

    /// Index of the extent that contains `id`.
    pub fn partition_for(&self, id: Uuid) -> Result<usize, PartitionError> {
        if id < self.start || id >= self.end {
            return Err(PartitionError::OutOfRange(id));
        }
        Ok(self.boundaries.partition_point(|bound| *bound <= id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Uuid, Uuid)> + '_ {
        std::iter::once(self.start)
            .chain(self.boundaries.iter().copied())
            .zip(self.boundaries.iter().copied())
    }
}
