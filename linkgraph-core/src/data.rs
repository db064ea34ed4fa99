use crate::error::{GraphError, Result};
use crate::graph::{EdgeIterator, Graph, LinkIterator};
use crate::iterator::SnapshotIterator;
use crate::memory::{Clock, IdSource, MAX_ID_ATTEMPTS};
use crate::model::{Edge, Link};
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, Row, ffi, params};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const UPSERT_LINK_QUERY: &str = "
INSERT INTO links (id, url, retrieved_at) VALUES (?1, ?2, ?3)
ON CONFLICT (url) DO UPDATE SET retrieved_at = MAX(links.retrieved_at, excluded.retrieved_at)
RETURNING id, retrieved_at";

const FIND_LINK_QUERY: &str = "SELECT id, url, retrieved_at FROM links WHERE id = ?1";

const LINKS_IN_PARTITION_QUERY: &str = "
SELECT id, url, retrieved_at FROM links
WHERE id >= ?1 AND id < ?2 AND retrieved_at < ?3
ORDER BY id";

const UPSERT_EDGE_QUERY: &str = "
INSERT INTO edges (id, src, dst, updated_at) VALUES (?1, ?2, ?3, ?4)
ON CONFLICT (src, dst) DO UPDATE SET updated_at = MAX(edges.updated_at, excluded.updated_at)
RETURNING id, updated_at";

const EDGES_IN_PARTITION_QUERY: &str = "
SELECT id, src, dst, updated_at FROM edges
WHERE src >= ?1 AND src < ?2 AND updated_at < ?3
ORDER BY src, rowid";

const REMOVE_STALE_EDGES_QUERY: &str = "DELETE FROM edges WHERE src = ?1 AND updated_at < ?2";

/// Link graph persisted to a SQLite database.
///
/// Identifiers are stored in their canonical hyphenated text form, which
/// sorts the same way as the ids themselves, so `[from, to)` partitions map
/// directly onto `TEXT` comparisons.
pub struct SqliteGraph {
    conn: Mutex<Connection>,
    clock: Clock,
    id_source: IdSource,
}

// Files SQLite keeps next to the database while in WAL mode.
const SIDECAR_SUFFIXES: [&str; 2] = ["-wal", "-shm"];

fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

impl SqliteGraph {
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    /// Removes the database file along with any leftover WAL sidecars.
    pub fn remove(path: &Path) -> io::Result<()> {
        fs::remove_file(path)?;
        for suffix in SIDECAR_SUFFIXES {
            let sidecar = sidecar_path(path, suffix);
            if sidecar.exists() {
                fs::remove_file(&sidecar)?;
            }
        }
        Ok(())
    }

    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(GraphError::database("open"))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )
        .map_err(GraphError::database("open"))?;

        info!("opened link graph database at {}", path.display());
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(GraphError::database("open"))?;
        Self::from_connection(conn)
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_source(mut self, id_source: IdSource) -> Self {
        self.id_source = id_source;
        self
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let graph = SqliteGraph {
            conn: Mutex::new(conn),
            clock: Arc::new(|| chrono::Utc::now().timestamp()),
            id_source: Arc::new(Uuid::new_v4),
        };
        graph.init_schema()?;
        Ok(graph)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(
                "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS links (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL UNIQUE,
    retrieved_at INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_links_retrieved_at ON links(retrieved_at);

CREATE TABLE IF NOT EXISTS edges (
    id TEXT PRIMARY KEY,
    src TEXT NOT NULL,
    dst TEXT NOT NULL,
    updated_at INTEGER NOT NULL,

    FOREIGN KEY(src) REFERENCES links(id) ON DELETE CASCADE,
    FOREIGN KEY(dst) REFERENCES links(id) ON DELETE CASCADE,
    UNIQUE(src, dst)
);

CREATE INDEX IF NOT EXISTS idx_edges_src_updated ON edges(src, updated_at);
                ",
            )
            .map_err(GraphError::database("init schema"))
    }
}

fn is_constraint(err: &rusqlite::Error, extended_code: i32) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation && e.extended_code == extended_code
    )
}

fn parse_id(op: &'static str, text: &str) -> Result<Uuid> {
    Uuid::parse_str(text).map_err(|e| GraphError::InvalidRecord {
        op,
        reason: format!("bad identifier {:?}: {}", text, e),
    })
}

fn link_from_row(op: &'static str, row: &Row<'_>) -> rusqlite::Result<Result<Link>> {
    let id: String = row.get(0)?;
    let url: String = row.get(1)?;
    let retrieved_at: i64 = row.get(2)?;
    Ok(parse_id(op, &id).map(|id| Link {
        id,
        url,
        retrieved_at,
    }))
}

fn edge_from_row(op: &'static str, row: &Row<'_>) -> rusqlite::Result<Result<Edge>> {
    let id: String = row.get(0)?;
    let src: String = row.get(1)?;
    let dst: String = row.get(2)?;
    let updated_at: i64 = row.get(3)?;
    Ok(decode_edge(op, &id, &src, &dst, updated_at))
}

fn decode_edge(op: &'static str, id: &str, src: &str, dst: &str, updated_at: i64) -> Result<Edge> {
    Ok(Edge {
        id: parse_id(op, id)?,
        src: parse_id(op, src)?,
        dst: parse_id(op, dst)?,
        updated_at,
    })
}

/// Turns per-row results into a snapshot. Driver errors abort the call,
/// while an undecodable row becomes the iterator's fault.
fn into_snapshot<T>(rows: Vec<Result<T>>) -> SnapshotIterator<T> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        match row {
            Ok(record) => records.push(record),
            Err(err) => return SnapshotIterator::failed(err),
        }
    }
    SnapshotIterator::new(records)
}

impl Graph for SqliteGraph {
    fn upsert_link(&self, link: &mut Link) -> Result<()> {
        const OP: &str = "upsert link";
        let conn = self.conn.lock();

        for attempt in 1..=MAX_ID_ATTEMPTS {
            let candidate = (self.id_source)();
            if candidate.is_nil() {
                warn!(attempt, "{}: nil identifier drawn, regenerating", OP);
                continue;
            }
            let row = conn.query_row(
                UPSERT_LINK_QUERY,
                params![candidate.to_string(), &link.url, link.retrieved_at],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            );

            match row {
                Ok((id, retrieved_at)) => {
                    link.id = parse_id(OP, &id)?;
                    link.retrieved_at = retrieved_at;
                    debug!(id = %link.id, url = %link.url, retrieved_at, "upserted link");
                    return Ok(());
                }
                Err(err) if is_constraint(&err, ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => {
                    warn!(id = %candidate, attempt, "{}: identifier collision, regenerating", OP);
                }
                Err(err) => return Err(GraphError::Database { op: OP, source: err }),
            }
        }

        Err(GraphError::IdExhausted {
            op: OP,
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    fn find_link(&self, id: Uuid) -> Result<Link> {
        const OP: &str = "find link";
        let conn = self.conn.lock();

        match conn.query_row(FIND_LINK_QUERY, params![id.to_string()], |row| {
            link_from_row(OP, row)
        }) {
            Ok(link) => link,
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(GraphError::NotFound { op: OP }),
            Err(err) => Err(GraphError::Database { op: OP, source: err }),
        }
    }

    fn upsert_edge(&self, edge: &mut Edge) -> Result<()> {
        const OP: &str = "upsert edge";
        let now = (self.clock)();
        let conn = self.conn.lock();

        for attempt in 1..=MAX_ID_ATTEMPTS {
            let candidate = (self.id_source)();
            if candidate.is_nil() {
                warn!(attempt, "{}: nil identifier drawn, regenerating", OP);
                continue;
            }
            let row = conn.query_row(
                UPSERT_EDGE_QUERY,
                params![
                    candidate.to_string(),
                    edge.src.to_string(),
                    edge.dst.to_string(),
                    now
                ],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            );

            match row {
                Ok((id, updated_at)) => {
                    edge.id = parse_id(OP, &id)?;
                    edge.updated_at = updated_at;
                    debug!(id = %edge.id, src = %edge.src, dst = %edge.dst, "upserted edge");
                    return Ok(());
                }
                Err(err) if is_constraint(&err, ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => {
                    return Err(GraphError::UnknownEdgeLinks { op: OP });
                }
                Err(err) if is_constraint(&err, ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => {
                    warn!(id = %candidate, attempt, "{}: identifier collision, regenerating", OP);
                }
                Err(err) => return Err(GraphError::Database { op: OP, source: err }),
            }
        }

        Err(GraphError::IdExhausted {
            op: OP,
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    fn remove_stale_edges(&self, from: Uuid, updated_before: i64) -> Result<()> {
        const OP: &str = "remove stale edges";
        let removed = self
            .conn
            .lock()
            .execute(
                REMOVE_STALE_EDGES_QUERY,
                params![from.to_string(), updated_before],
            )
            .map_err(GraphError::database(OP))?;

        debug!(src = %from, removed, updated_before, "removed stale edges");
        Ok(())
    }

    fn links(&self, from: Uuid, to: Uuid, retrieved_before: i64) -> Result<LinkIterator> {
        const OP: &str = "links";
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(LINKS_IN_PARTITION_QUERY)
            .map_err(GraphError::database(OP))?;

        let rows = stmt
            .query_map(
                params![from.to_string(), to.to_string(), retrieved_before],
                |row| link_from_row(OP, row),
            )
            .map_err(GraphError::database(OP))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(GraphError::database(OP))?;

        Ok(Box::new(into_snapshot(rows)))
    }

    fn edges(&self, from: Uuid, to: Uuid, updated_before: i64) -> Result<EdgeIterator> {
        const OP: &str = "edges";
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(EDGES_IN_PARTITION_QUERY)
            .map_err(GraphError::database(OP))?;

        let rows = stmt
            .query_map(
                params![from.to_string(), to.to_string(), updated_before],
                |row| edge_from_row(OP, row),
            )
            .map_err(GraphError::database(OP))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(GraphError::database(OP))?;

        Ok(Box::new(into_snapshot(rows)))
    }
}
