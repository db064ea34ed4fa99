// Behaviour every Graph backend must share. Each backend's test file builds
// its own store and runs these checks against it.
#![allow(dead_code)]

use linkgraph_core::{Clock, Edge, Graph, Link, PartitionRange, collect_records};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::thread;
use uuid::Uuid;

pub const MIN_ID: Uuid = Uuid::nil();
pub const MAX_ID: Uuid = Uuid::from_u128(u128::MAX);

/// Manually driven clock shared between a test and the store under test.
#[derive(Clone)]
pub struct TestClock(Arc<AtomicI64>);

impl TestClock {
    pub fn new(start: i64) -> Self {
        Self(Arc::new(AtomicI64::new(start)))
    }

    pub fn clock(&self) -> Clock {
        let now = self.0.clone();
        Arc::new(move || now.load(Ordering::SeqCst))
    }

    pub fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

fn insert_link(graph: &dyn Graph, url: &str, retrieved_at: i64) -> Link {
    let mut link = Link::new(url, retrieved_at);
    graph.upsert_link(&mut link).unwrap();
    link
}

fn all_links(graph: &dyn Graph, retrieved_before: i64) -> Vec<Link> {
    graph
        .links(MIN_ID, MAX_ID, retrieved_before)
        .and_then(collect_records)
        .unwrap()
}

fn all_edges(graph: &dyn Graph, updated_before: i64) -> Vec<Edge> {
    graph
        .edges(MIN_ID, MAX_ID, updated_before)
        .and_then(collect_records)
        .unwrap()
}

// ============================================================================
// Links
// ============================================================================

pub fn check_upsert_link_keeps_latest_retrieved_at(graph: &dyn Graph) {
    let original = insert_link(graph, "https://example.com", 100);
    assert!(!original.id.is_nil());

    let mut older = Link::new("https://example.com", 50);
    graph.upsert_link(&mut older).unwrap();
    assert_eq!(older.id, original.id);
    assert_eq!(older.retrieved_at, 100);
    assert_eq!(graph.find_link(original.id).unwrap().retrieved_at, 100);

    let mut newer = Link::new("https://example.com", 150);
    graph.upsert_link(&mut newer).unwrap();
    assert_eq!(newer.id, original.id);
    assert_eq!(newer.retrieved_at, 150);
    assert_eq!(graph.find_link(original.id).unwrap().retrieved_at, 150);
}

pub fn check_distinct_urls_get_distinct_ids(graph: &dyn Graph) {
    let mut ids = HashSet::new();
    for i in 0..50 {
        let link = insert_link(graph, &format!("https://example.com/page/{}", i), i);
        assert!(ids.insert(link.id), "duplicate id for page {}", i);
    }

    for i in 0..50 {
        let link = insert_link(graph, &format!("https://example.com/page/{}", i), i);
        assert!(ids.contains(&link.id));
    }
    assert_eq!(all_links(graph, i64::MAX).len(), 50);
}

pub fn check_find_link(graph: &dyn Graph) {
    let link = insert_link(graph, "https://example.com/about", 42);

    let found = graph.find_link(link.id).unwrap();
    assert_eq!(found, link);

    let err = graph.find_link(Uuid::new_v4()).unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.operation(), Some("find link"));
    assert_eq!(err.to_string(), "find link: not found");
}

pub fn check_find_link_returns_copy(graph: &dyn Graph) {
    let link = insert_link(graph, "https://example.com/copy", 10);

    let mut found = graph.find_link(link.id).unwrap();
    found.url = "https://mutated.example".to_string();
    found.retrieved_at = 999;

    let again = graph.find_link(link.id).unwrap();
    assert_eq!(again.url, "https://example.com/copy");
    assert_eq!(again.retrieved_at, 10);
}

pub fn check_links_filters_by_retrieved_at(graph: &dyn Graph) {
    insert_link(graph, "https://a.example", 10);
    insert_link(graph, "https://b.example", 20);
    insert_link(graph, "https://c.example", 30);

    let mut urls: Vec<String> = all_links(graph, 30).into_iter().map(|l| l.url).collect();
    urls.sort();
    assert_eq!(urls, vec!["https://a.example", "https://b.example"]);
    assert!(all_links(graph, 10).is_empty());
}

pub fn check_links_partition_tiling(graph: &dyn Graph) {
    for i in 0..200 {
        insert_link(graph, &format!("https://example.com/{}", i), i % 20);
    }

    for threshold in [5, 20] {
        let expected: HashSet<Uuid> = all_links(graph, threshold).into_iter().map(|l| l.id).collect();

        for count in [1, 3, 7, 16] {
            let range = PartitionRange::full(count).unwrap();
            let mut seen = HashSet::new();
            let mut total = 0;
            for (from, to) in range.iter() {
                for link in graph
                    .links(from, to, threshold)
                    .and_then(collect_records)
                    .unwrap()
                {
                    assert!(link.id >= from && link.id < to);
                    seen.insert(link.id);
                    total += 1;
                }
            }
            assert_eq!(total, seen.len(), "link reported twice with {} partitions", count);
            assert_eq!(seen, expected, "partitions do not tile with {} partitions", count);
        }
    }
}

pub fn check_empty_and_inverted_ranges(graph: &dyn Graph) {
    let a = insert_link(graph, "https://a.example", 1);
    let b = insert_link(graph, "https://b.example", 1);
    let mut edge = Edge::new(a.id, b.id);
    graph.upsert_edge(&mut edge).unwrap();

    let empty = graph.links(a.id, a.id, i64::MAX).and_then(collect_records).unwrap();
    assert!(empty.is_empty());
    let inverted = graph.links(MAX_ID, MIN_ID, i64::MAX).and_then(collect_records).unwrap();
    assert!(inverted.is_empty());
    let inverted = graph.edges(MAX_ID, MIN_ID, i64::MAX).and_then(collect_records).unwrap();
    assert!(inverted.is_empty());
}

// ============================================================================
// Edges
// ============================================================================

pub fn check_upsert_edge_rejects_unknown_links(graph: &dyn Graph) {
    let known = insert_link(graph, "https://known.example", 1);
    let unknown = Uuid::new_v4();

    for (src, dst) in [(known.id, unknown), (unknown, known.id), (unknown, Uuid::new_v4())] {
        let mut edge = Edge::new(src, dst);
        let err = graph.upsert_edge(&mut edge).unwrap_err();
        assert!(err.is_unknown_edge_links(), "unexpected error: {}", err);
        assert_eq!(err.operation(), Some("upsert edge"));
    }

    assert!(all_edges(graph, i64::MAX).is_empty());
}

pub fn check_upsert_edge_is_unique_per_pair(graph: &dyn Graph, clock: &TestClock) {
    let a = insert_link(graph, "https://a.example", 1);
    let b = insert_link(graph, "https://b.example", 1);

    let mut first = Edge::new(a.id, b.id);
    graph.upsert_edge(&mut first).unwrap();
    assert!(!first.id.is_nil());
    assert_eq!(first.updated_at, clock.now());

    clock.advance(30);
    let mut second = Edge::new(a.id, b.id);
    graph.upsert_edge(&mut second).unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.updated_at, first.updated_at + 30);

    // The reverse direction is a different edge.
    let mut reverse = Edge::new(b.id, a.id);
    graph.upsert_edge(&mut reverse).unwrap();
    assert_ne!(reverse.id, first.id);

    assert_eq!(all_edges(graph, i64::MAX).len(), 2);
}

pub fn check_edges_filters_by_source_and_updated_at(graph: &dyn Graph, clock: &TestClock) {
    let a = insert_link(graph, "https://a.example", 1);
    let b = insert_link(graph, "https://b.example", 1);
    let c = insert_link(graph, "https://c.example", 1);

    let mut ab = Edge::new(a.id, b.id);
    graph.upsert_edge(&mut ab).unwrap();
    clock.advance(10);
    let mut ac = Edge::new(a.id, c.id);
    graph.upsert_edge(&mut ac).unwrap();
    let mut bc = Edge::new(b.id, c.id);
    graph.upsert_edge(&mut bc).unwrap();

    let old: Vec<Uuid> = all_edges(graph, ab.updated_at + 1).into_iter().map(|e| e.id).collect();
    assert_eq!(old, vec![ab.id]);

    // A one-id range selects exactly that source's outgoing edges.
    for (src, out_degree) in [(a.id, 2), (b.id, 1), (c.id, 0)] {
        let to = Uuid::from_u128(src.as_u128() + 1);
        let edges = graph.edges(src, to, i64::MAX).and_then(collect_records).unwrap();
        assert_eq!(edges.len(), out_degree);
        assert!(edges.iter().all(|e| e.src == src));
    }
}

pub fn check_remove_stale_edges(graph: &dyn Graph, clock: &TestClock) {
    let a = insert_link(graph, "https://a.example", 1);
    let b = insert_link(graph, "https://b.example", 1);
    let c = insert_link(graph, "https://c.example", 1);

    let mut ab = Edge::new(a.id, b.id);
    graph.upsert_edge(&mut ab).unwrap();
    let mut ba = Edge::new(b.id, a.id);
    graph.upsert_edge(&mut ba).unwrap();

    clock.advance(100);
    let cutoff = clock.now();
    let mut ac = Edge::new(a.id, c.id);
    graph.upsert_edge(&mut ac).unwrap();

    graph.remove_stale_edges(a.id, cutoff).unwrap();

    let remaining = all_edges(graph, i64::MAX);
    let from_a: Vec<&Edge> = remaining.iter().filter(|e| e.src == a.id).collect();
    assert_eq!(from_a.len(), 1);
    assert_eq!(from_a[0].id, ac.id);
    assert!(from_a.iter().all(|e| e.updated_at >= cutoff));

    // Other sources and the links themselves are untouched.
    assert!(remaining.iter().any(|e| e.id == ba.id));
    assert_eq!(all_links(graph, i64::MAX).len(), 3);

    // Idempotent, and fine for sources without edges.
    graph.remove_stale_edges(a.id, cutoff).unwrap();
    graph.remove_stale_edges(c.id, cutoff).unwrap();
    graph.remove_stale_edges(Uuid::new_v4(), cutoff).unwrap();
    assert_eq!(all_edges(graph, i64::MAX).len(), 2);

    // A pruned pair can be re-created afterwards with a fresh identity.
    let mut again = Edge::new(a.id, b.id);
    graph.upsert_edge(&mut again).unwrap();
    assert_ne!(again.id, ab.id);
}

// ============================================================================
// Iteration and concurrency
// ============================================================================

pub fn check_iterator_is_a_snapshot(graph: &dyn Graph) {
    let a = insert_link(graph, "https://a.example", 1);
    insert_link(graph, "https://b.example", 1);

    let mut iter = graph.links(MIN_ID, MAX_ID, i64::MAX).unwrap();
    assert!(iter.current().is_none());

    // Writes after the snapshot was taken stay invisible to it.
    insert_link(graph, "https://c.example", 1);
    let mut moved = Link::new("https://a.example", 500);
    graph.upsert_link(&mut moved).unwrap();

    let mut seen = Vec::new();
    while iter.advance() {
        seen.push(iter.current().unwrap());
    }
    assert!(iter.fault().is_none());
    assert!(iter.current().is_none());
    iter.close().unwrap();
    iter.close().unwrap();

    assert_eq!(seen.len(), 2);
    let snap_a = seen.iter().find(|l| l.id == a.id).unwrap();
    assert_eq!(snap_a.retrieved_at, 1);
    assert_eq!(all_links(graph, i64::MAX).len(), 3);
}

pub fn check_concurrent_upserts(graph: &dyn Graph) {
    const WORKERS: usize = 8;
    const PER_WORKER: usize = 25;

    // Every worker upserts the same URL set, so all of them must agree on ids.
    let per_worker: Vec<Vec<(String, Uuid)>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..WORKERS)
            .map(|worker| {
                scope.spawn(move || {
                    (0..PER_WORKER)
                        .map(|i| {
                            let url = format!("https://example.com/{}", i);
                            let mut link = Link::new(url.clone(), (worker * 10 + i) as i64);
                            graph.upsert_link(&mut link).unwrap();
                            (url, link.id)
                        })
                        .collect::<Vec<(String, Uuid)>>()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for results in &per_worker[1..] {
        assert_eq!(results, &per_worker[0]);
    }

    let links = all_links(graph, i64::MAX);
    assert_eq!(links.len(), PER_WORKER);
    for link in &links {
        let i: usize = link.url.rsplit('/').next().unwrap().parse().unwrap();
        assert_eq!(link.retrieved_at, ((WORKERS - 1) * 10 + i) as i64);
    }

    // Fan edges out from every link to every other link in parallel.
    let ids: Vec<Uuid> = links.iter().map(|l| l.id).collect();
    thread::scope(|scope| {
        for chunk in ids.chunks(5) {
            let ids = &ids;
            scope.spawn(move || {
                for src in chunk {
                    for dst in ids {
                        graph.upsert_edge(&mut Edge::new(*src, *dst)).unwrap();
                    }
                }
            });
        }
    });
    assert_eq!(all_edges(graph, i64::MAX).len(), PER_WORKER * PER_WORKER);
}

pub fn check_end_to_end_scenario(graph: &dyn Graph, clock: &TestClock) {
    let mut a = Link::new("a", 100);
    graph.upsert_link(&mut a).unwrap();
    let x = a.id;

    let mut a_again = Link::new("a", 50);
    graph.upsert_link(&mut a_again).unwrap();
    assert_eq!(a_again.id, x);
    assert_eq!(graph.find_link(x).unwrap().retrieved_at, 100);

    let mut b = Link::new("b", 90);
    graph.upsert_link(&mut b).unwrap();
    let y = b.id;
    assert_ne!(x, y);

    let mut e1 = Edge::new(x, y);
    graph.upsert_edge(&mut e1).unwrap();

    clock.advance(5);
    let mut e1_again = Edge::new(x, y);
    graph.upsert_edge(&mut e1_again).unwrap();
    assert_eq!(e1_again.id, e1.id);
    assert!(e1_again.updated_at > e1.updated_at);

    graph.remove_stale_edges(x, clock.now() + 1).unwrap();

    let from_x: Vec<Edge> = graph
        .edges(MIN_ID, MAX_ID, i64::MAX)
        .and_then(collect_records)
        .unwrap()
        .into_iter()
        .filter(|e| e.src == x)
        .collect();
    assert!(from_x.is_empty());
}
