use crate::CLAP_STYLING;
use clap::{arg, command};
use uuid::Uuid;

const DEFAULT_DB_DIR: &str = "~/.config/linkgraph/";

fn db_arg() -> clap::Arg {
    arg!(-d --"db" <DIR>)
        .required(false)
        .help("Directory holding the linkgraph database")
        .default_value(DEFAULT_DB_DIR)
}

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("linkgraph")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("linkgraph")
        .styles(CLAP_STYLING)
        .subcommand_required(true)
        .subcommand(
            command!("init")
                .about("Initializes the linkgraph database on your filesystem")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Location to store the linkgraph database")
                        .default_value(DEFAULT_DB_DIR),
                )
                .arg(
                    arg!(-f --"force")
                        .help(
                            "Forces the overwriting of any existing database at the specified \
                        location.",
                        )
                        .required(false),
                ),
        )
        .subcommand(
            command!("import")
                .about(
                    "Loads crawl results into the graph. Each line holds a source URL followed \
                by the URLs it links to.",
                )
                .arg(db_arg())
                .arg(
                    arg!(-i --"input" <PATH>)
                        .required(true)
                        .help("Path to a newline-delimited adjacency file")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(--"prune")
                        .required(false)
                        .help("Remove edges of imported sources that this import did not reconfirm")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("scan")
                .about("Scans the graph partition by partition with one worker per partition")
                .arg(db_arg())
                .arg(
                    arg!(-p --"partitions" <NUM>)
                        .required(false)
                        .help("Number of partitions to split the id space into")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("4"),
                )
                .arg(
                    arg!(-b --"before" <UNIX_SECS>)
                        .required(false)
                        .help("Only count links retrieved and edges updated before this time")
                        .value_parser(clap::value_parser!(i64)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
        .subcommand(
            command!("find")
                .about("Looks up a single link by id")
                .arg(db_arg())
                .arg(
                    arg!(<ID>)
                        .required(true)
                        .help("Link identifier")
                        .value_parser(clap::value_parser!(Uuid)),
                ),
        )
}
