use crate::error::{GraphError, Result};
use crate::graph::{EdgeIterator, Graph, LinkIterator};
use crate::iterator::SnapshotIterator;
use crate::model::{Edge, Link};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Source of "now" (unix seconds) used to stamp edges.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Generator for fresh link and edge identifiers.
pub type IdSource = Arc<dyn Fn() -> Uuid + Send + Sync>;

/// Upper bound on identifier regeneration before giving up.
pub const MAX_ID_ATTEMPTS: usize = 8;

#[derive(Default)]
struct Indices {
    // Ordered by id so range scans visit only the requested partition.
    links: BTreeMap<Uuid, Link>,
    link_url_index: HashMap<String, Uuid>,

    edges: HashMap<Uuid, Edge>,
    // Outgoing edge ids per source link, in insertion order.
    link_edge_map: BTreeMap<Uuid, Vec<Uuid>>,
}

/// In-memory link graph that can be shared between threads.
///
/// All four indices sit behind one reader-writer lock. The lock is taken
/// once per public call and never nested. Range reads copy their matches
/// into a [`SnapshotIterator`] and release the lock before returning.
pub struct InMemoryGraph {
    state: RwLock<Indices>,
    clock: Clock,
    id_source: IdSource,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Indices::default()),
            clock: Arc::new(|| chrono::Utc::now().timestamp()),
            id_source: Arc::new(Uuid::new_v4),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_source(mut self, id_source: IdSource) -> Self {
        self.id_source = id_source;
        self
    }

    pub fn link_count(&self) -> usize {
        self.state.read().links.len()
    }

    pub fn edge_count(&self) -> usize {
        self.state.read().edges.len()
    }

    /// Draws identifiers until one is neither nil nor already taken.
    fn fresh_id(&self, op: &'static str, is_taken: impl Fn(&Uuid) -> bool) -> Result<Uuid> {
        for attempt in 1..=MAX_ID_ATTEMPTS {
            let id = (self.id_source)();
            if !id.is_nil() && !is_taken(&id) {
                return Ok(id);
            }
            warn!(%id, attempt, "{}: identifier collision, regenerating", op);
        }

        Err(GraphError::IdExhausted {
            op,
            attempts: MAX_ID_ATTEMPTS,
        })
    }
}

impl Default for InMemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph for InMemoryGraph {
    fn upsert_link(&self, link: &mut Link) -> Result<()> {
        const OP: &str = "upsert link";
        let mut guard = self.state.write();
        let Indices {
            links,
            link_url_index,
            ..
        } = &mut *guard;

        // A known URL turns the insert into an update of the existing record.
        if let Some(&id) = link_url_index.get(&link.url) {
            let existing = links.get_mut(&id).ok_or_else(|| GraphError::InvalidRecord {
                op: OP,
                reason: format!("url index points at missing link {}", id),
            })?;

            let prior_retrieved_at = existing.retrieved_at;
            link.id = id;
            *existing = link.clone();
            existing.retrieved_at = existing.retrieved_at.max(prior_retrieved_at);
            link.retrieved_at = existing.retrieved_at;

            debug!(%id, url = %link.url, retrieved_at = link.retrieved_at, "updated link");
            return Ok(());
        }

        link.id = self.fresh_id(OP, |id| links.contains_key(id))?;
        link_url_index.insert(link.url.clone(), link.id);
        links.insert(link.id, link.clone());

        debug!(id = %link.id, url = %link.url, "inserted link");
        Ok(())
    }

    fn find_link(&self, id: Uuid) -> Result<Link> {
        self.state
            .read()
            .links
            .get(&id)
            .cloned()
            .ok_or(GraphError::NotFound { op: "find link" })
    }

    fn upsert_edge(&self, edge: &mut Edge) -> Result<()> {
        const OP: &str = "upsert edge";
        let mut guard = self.state.write();
        let Indices {
            links,
            edges,
            link_edge_map,
            ..
        } = &mut *guard;

        if !links.contains_key(&edge.src) || !links.contains_key(&edge.dst) {
            return Err(GraphError::UnknownEdgeLinks { op: OP });
        }

        let now = (self.clock)();

        // Out-degree is small, so a linear scan of the source's edges is
        // enough to find an existing (src, dst) pair.
        if let Some(edge_ids) = link_edge_map.get(&edge.src) {
            for edge_id in edge_ids {
                if let Some(existing) = edges.get_mut(edge_id)
                    && existing.dst == edge.dst
                {
                    existing.updated_at = existing.updated_at.max(now);
                    *edge = existing.clone();
                    debug!(id = %edge.id, src = %edge.src, dst = %edge.dst, "refreshed edge");
                    return Ok(());
                }
            }
        }

        edge.id = self.fresh_id(OP, |id| edges.contains_key(id))?;
        edge.updated_at = now;
        edges.insert(edge.id, edge.clone());
        link_edge_map.entry(edge.src).or_default().push(edge.id);

        debug!(id = %edge.id, src = %edge.src, dst = %edge.dst, "inserted edge");
        Ok(())
    }

    fn remove_stale_edges(&self, from: Uuid, updated_before: i64) -> Result<()> {
        let mut guard = self.state.write();
        let Indices {
            edges,
            link_edge_map,
            ..
        } = &mut *guard;

        let Some(edge_ids) = link_edge_map.get_mut(&from) else {
            return Ok(());
        };

        let before = edge_ids.len();
        edge_ids.retain(|edge_id| {
            let stale = edges
                .get(edge_id)
                .is_none_or(|edge| edge.updated_at < updated_before);
            if stale {
                edges.remove(edge_id);
            }
            !stale
        });

        let removed = before - edge_ids.len();
        if edge_ids.is_empty() {
            link_edge_map.remove(&from);
        }

        debug!(src = %from, removed, updated_before, "removed stale edges");
        Ok(())
    }

    fn links(&self, from: Uuid, to: Uuid, retrieved_before: i64) -> Result<LinkIterator> {
        if from >= to {
            return Ok(Box::new(SnapshotIterator::<Link>::new(Vec::new())));
        }

        let list: Vec<Link> = {
            let state = self.state.read();
            state
                .links
                .range(from..to)
                .map(|(_, link)| link)
                .filter(|link| link.retrieved_at < retrieved_before)
                .cloned()
                .collect()
        };

        Ok(Box::new(SnapshotIterator::new(list)))
    }

    fn edges(&self, from: Uuid, to: Uuid, updated_before: i64) -> Result<EdgeIterator> {
        if from >= to {
            return Ok(Box::new(SnapshotIterator::<Edge>::new(Vec::new())));
        }

        let list: Vec<Edge> = {
            let state = self.state.read();
            state
                .link_edge_map
                .range(from..to)
                .flat_map(|(_, edge_ids)| edge_ids.iter())
                .filter_map(|edge_id| state.edges.get(edge_id))
                .filter(|edge| edge.updated_at < updated_before)
                .cloned()
                .collect()
        };

        Ok(Box::new(SnapshotIterator::new(list)))
    }
}
