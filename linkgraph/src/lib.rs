pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    ImportSummary, PartitionStats, generate_scan_report, import_adjacency, parse_adjacency_line,
    parse_url_line, resolve_db_path, scan_partitions, wait_for_next_second,
};
