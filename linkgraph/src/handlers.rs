use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use linkgraph_core::{Edge, Graph, Link, PartitionRange, SqliteGraph, collect_records};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

pub const DATABASE_FILE: &str = "linkgraph.db";

// Helper functions for the import handler

/// Parse a single token as a web URL, trying to add http:// if needed.
///
/// The serialized form of the parsed URL is returned, so equivalent spellings
/// such as `https://example.com` and `https://example.com/` map to one link.
pub fn parse_url_line(line: &str) -> Option<String> {
    match Url::parse(line) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => return Some(url.to_string()),
        // Other schemes with an authority (ftp://, file://) are not crawlable.
        Ok(url) if url.has_host() => {
            warn!("skipping non-web URL '{}'", line);
            return None;
        }
        // `localhost:8080` parses with `localhost` as its scheme.
        _ => {}
    }

    match Url::parse(&format!("http://{}", line)) {
        Ok(url) => Some(url.to_string()),
        Err(_) => {
            warn!("skipping invalid URL '{}'", line);
            None
        }
    }
}

/// Parse an adjacency line of the form `SRC_URL DST_URL...`.
///
/// Blank lines, `#` comments and lines whose source is not a URL yield
/// `None`. Invalid destinations are dropped individually.
pub fn parse_adjacency_line(line: &str) -> Option<(String, Vec<String>)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut tokens = line.split_whitespace();
    let src = parse_url_line(tokens.next()?)?;
    let dsts = tokens.filter_map(parse_url_line).collect();
    Some((src, dsts))
}

/// Resolve the database file inside a (possibly `~`-prefixed) directory.
pub fn resolve_db_path(dir: &str) -> PathBuf {
    let expanded = shellexpand::tilde(dir);
    Path::new(expanded.as_ref()).join(DATABASE_FILE)
}

/// Blocks until `clock` has moved past the second it reads on entry and
/// returns the new reading.
///
/// Store timestamps have one-second granularity. Edges confirmed by an
/// earlier pass carry at most the current second, so a pruning import that
/// starts on the next second has a cutoff strictly newer than all of them.
pub fn wait_for_next_second(clock: impl Fn() -> i64) -> i64 {
    let start = clock();
    loop {
        let now = clock();
        if now > start {
            return now;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub lines: usize,
    pub skipped: usize,
    pub links: usize,
    pub edges: usize,
    pub pruned_sources: usize,
}

/// Load adjacency lines into `graph`.
///
/// Sources are stamped as retrieved at `now`; destinations are recorded as
/// discovered but never retrieved. With `prune`, edges of every imported
/// source that this import did not reconfirm are removed afterwards.
pub fn import_adjacency<R: BufRead>(
    graph: &dyn Graph,
    reader: R,
    now: i64,
    prune: bool,
) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    let mut urls = HashSet::new();
    let mut sources = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_no + 1))?;
        summary.lines += 1;

        let Some((src_url, dst_urls)) = parse_adjacency_line(&line) else {
            summary.skipped += 1;
            continue;
        };

        let mut src = Link::new(src_url, now);
        graph
            .upsert_link(&mut src)
            .with_context(|| format!("Failed to store {}", src.url))?;
        urls.insert(src.url.clone());
        sources.push(src.id);

        for dst_url in dst_urls {
            let mut dst = Link::new(dst_url, 0);
            graph
                .upsert_link(&mut dst)
                .with_context(|| format!("Failed to store {}", dst.url))?;
            urls.insert(dst.url.clone());

            let mut edge = Edge::new(src.id, dst.id);
            graph
                .upsert_edge(&mut edge)
                .with_context(|| format!("Failed to link {} -> {}", src.url, dst.url))?;
            summary.edges += 1;
        }
    }
    summary.links = urls.len();

    if prune {
        sources.sort();
        sources.dedup();
        for src in &sources {
            graph
                .remove_stale_edges(*src, now)
                .with_context(|| format!("Failed to prune edges of {}", src))?;
        }
        summary.pruned_sources = sources.len();
    }

    debug!(?summary, "import finished");
    Ok(summary)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionStats {
    pub index: usize,
    pub from: Uuid,
    pub to: Uuid,
    pub links: usize,
    pub edges: usize,
}

/// Scan `count` partitions of the full id space, one worker per partition.
pub fn scan_partitions(graph: &dyn Graph, count: usize, before: i64) -> Result<Vec<PartitionStats>> {
    let range = PartitionRange::full(count)?;

    thread::scope(|scope| {
        let workers: Vec<_> = range
            .iter()
            .enumerate()
            .map(|(index, (from, to))| {
                scope.spawn(move || -> Result<PartitionStats> {
                    let links = graph.links(from, to, before).and_then(collect_records)?;
                    let edges = graph.edges(from, to, before).and_then(collect_records)?;
                    Ok(PartitionStats {
                        index,
                        from,
                        to,
                        links: links.len(),
                        edges: edges.len(),
                    })
                })
            })
            .collect();

        workers
            .into_iter()
            .map(|worker| {
                worker
                    .join()
                    .map_err(|_| anyhow!("partition worker panicked"))?
            })
            .collect()
    })
}

/// Generate a scan report from partition statistics
pub fn generate_scan_report(stats: &[PartitionStats]) -> String {
    let total_links: usize = stats.iter().map(|s| s.links).sum();
    let total_edges: usize = stats.iter().map(|s| s.edges).sum();

    let mut report = String::new();
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    report.push_str("# Summary:\n");
    report.push_str(&format!("  Partitions: {}\n", stats.len()));
    report.push_str(&format!("  Links: {}\n", total_links));
    report.push_str(&format!("  Edges: {}\n", total_edges));
    report.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");

    for s in stats {
        report.push_str(&format!(
            "  [{:>3}] {} .. {}  links: {:>6}  edges: {:>6}\n",
            s.index, s.from, s.to, s.links, s.edges
        ));
    }

    report
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> Result<String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_lowercase())
}

fn open_store(args: &ArgMatches) -> Result<SqliteGraph> {
    let dir = args
        .get_one::<String>("db")
        .context("missing --db argument")?;
    let db_path = resolve_db_path(dir);

    if !SqliteGraph::exists(&db_path) {
        bail!(
            "No database at {} (run `linkgraph init` first)",
            db_path.display()
        );
    }

    SqliteGraph::open(&db_path).with_context(|| format!("Failed to open {}", db_path.display()))
}

pub fn handle_init(args: &ArgMatches) -> Result<()> {
    print_divider();
    println!("{}", "  LINKGRAPH INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let dir = args.get_one::<String>("PATH").context("missing PATH argument")?;
    let force = args.get_flag("force");
    let db_path = resolve_db_path(dir);
    let db_dir = db_path
        .parent()
        .context("Invalid database path")?
        .to_path_buf();

    println!(
        "{} Target: {}",
        "→".blue(),
        db_dir.display().to_string().bright_white()
    );
    println!();

    if SqliteGraph::exists(&db_path) {
        let overwrite = if force {
            true
        } else {
            println!("{}", "⚠ WARNING".yellow().bold());
            println!("Database already exists at:");
            println!(
                "  {} {}",
                "•".yellow(),
                db_path.display().to_string().bright_white()
            );
            println!();

            let response = print_prompt("Would you like to overwrite it? [y/N]:")?;
            println!();
            response == "y" || response == "yes"
        };

        if !overwrite {
            println!("{} Keeping existing database", "→".blue());
            return Ok(());
        }

        SqliteGraph::remove(&db_path)
            .with_context(|| format!("Failed to remove {}", db_path.display()))?;
        println!("{} Existing database removed", "✓".green().bold());
    }

    fs::create_dir_all(&db_dir)
        .with_context(|| format!("Failed to create {}", db_dir.display()))?;
    SqliteGraph::open(&db_path)
        .with_context(|| format!("Failed to create database at {}", db_path.display()))?;
    info!("initialized database at {}", db_path.display());

    println!(
        "{} Database initialized: {}",
        "✓".green().bold(),
        db_path.display().to_string().bright_white()
    );
    println!();
    Ok(())
}

pub fn handle_import(args: &ArgMatches) -> Result<()> {
    let input = args
        .get_one::<PathBuf>("input")
        .context("missing --input argument")?;
    let prune = args.get_flag("prune");
    let graph = open_store(args)?;

    let file = File::open(input).with_context(|| format!("Failed to read {}", input.display()))?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("Importing {}...", input.display()));

    let wall_clock = || chrono::Utc::now().timestamp();
    let now = if prune {
        wait_for_next_second(wall_clock)
    } else {
        wall_clock()
    };
    let summary = import_adjacency(&graph, BufReader::new(file), now, prune)?;

    spinner.finish_with_message(format!(
        "{} Imported {} lines: {} links, {} edges ({} skipped)",
        "✓".green().bold(),
        summary.lines,
        summary.links,
        summary.edges,
        summary.skipped
    ));
    if prune {
        println!(
            "{} Pruned stale edges of {} source links",
            "✓".green().bold(),
            summary.pruned_sources
        );
    }
    Ok(())
}

pub fn handle_scan(args: &ArgMatches) -> Result<()> {
    let partitions = *args.get_one::<usize>("partitions").unwrap_or(&4);
    let before = args.get_one::<i64>("before").copied().unwrap_or(i64::MAX);
    let format = args
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("text");
    let graph = open_store(args)?;

    let stats = scan_partitions(&graph, partitions, before)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&stats)?),
        _ => print!("{}", generate_scan_report(&stats)),
    }
    Ok(())
}

pub fn handle_find(args: &ArgMatches) -> Result<()> {
    let id = *args.get_one::<Uuid>("ID").context("missing ID argument")?;
    let graph = open_store(args)?;

    let link = graph.find_link(id)?;
    println!("{}", serde_json::to_string_pretty(&link)?);
    Ok(())
}
