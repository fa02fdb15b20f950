//! bigt command-line front end
//!
//! Loads CSV data into a partitioned big table and queries it.

use std::fs::File;
use std::path::PathBuf;
use std::process;

use bigt::{BigTable, BigtResult, BufferManager, Config, OrderType, PAGE_SIZE, Stream};
use clap::{Args, Parser, Subcommand};
use prettytable::{Table, row};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "bigt")]
#[command(about = "Partitioned big tables over directory-indexed heap files")]
#[command(version)]
struct Cli {
    /// Page size in bytes, fixed when the database is created
    #[arg(long, global = true, default_value_t = PAGE_SIZE)]
    page_size: usize,

    /// Number of buffer pool frames
    #[arg(long, global = true, default_value_t = bigt::BUFFER_POOL_SIZE)]
    frames: usize,

    #[command(subcommand)]
    command: Command,
}

/// Which table to work on
#[derive(Args, Debug)]
struct TableArgs {
    /// Database file
    #[arg(long)]
    db: PathBuf,

    /// Table name
    #[arg(long)]
    table: String,

    /// Number of partitions
    #[arg(long, default_value_t = 3)]
    partitions: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load `row,column,timestamp,value` lines from a CSV file
    Load {
        #[command(flatten)]
        target: TableArgs,

        /// Partition receiving the maps
        #[arg(long, default_value_t = 1)]
        part: usize,

        /// CSV file to load
        csv: PathBuf,
    },

    /// Print the maps matching the filters
    Query {
        #[command(flatten)]
        target: TableArgs,

        /// Order type: 0 none, 1 row/column/time, 2 column/row/time,
        /// 3 row/time, 4 column/time, 6 time
        #[arg(long, default_value_t = 0)]
        order: u8,

        /// Row filter: `*`, `[lo,hi]` or an exact key
        #[arg(long, default_value = "*")]
        row: String,

        /// Column filter
        #[arg(long, default_value = "*")]
        column: String,

        /// Value filter
        #[arg(long, default_value = "*")]
        value: String,
    },

    /// Count the maps in every partition
    Count {
        #[command(flatten)]
        target: TableArgs,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(true).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> BigtResult<()> {
    let target = match &cli.command {
        Command::Load { target, .. } | Command::Query { target, .. } | Command::Count { target } => {
            target
        }
    };

    let config = Config::builder()
        .db_path(&target.db)
        .page_size(cli.page_size)
        .buffer_pool_frames(cli.frames)
        .build();
    let mut bm = BufferManager::open(&config)?;
    let mut table = BigTable::open(&mut bm, &target.table, target.partitions)?;

    match &cli.command {
        Command::Load { part, csv, .. } => {
            let file = File::open(csv).map_err(bigt::FileError::from)?;
            let inserted = table.load_csv(&mut bm, file, *part)?;
            println!("Loaded {} maps into {}", inserted, BigTable::part_name(table.name(), *part));
        }
        Command::Query {
            order,
            row,
            column,
            value,
            ..
        } => {
            let order = OrderType::try_from(*order)?;
            let mut stream = Stream::open(&mut bm, &table, order, row, column, value)?;

            let mut output = Table::new();
            output.set_titles(row!["Row", "Column", "Timestamp", "Value"]);
            let mut found = 0;
            let printed = (|| -> BigtResult<()> {
                while let Some(map) = stream.get_next(&mut bm)? {
                    output.add_row(row![map.row(), map.column(), map.timestamp(), map.value()]);
                    found += 1;
                }
                Ok(())
            })();
            let closed = stream.close(&mut bm);
            printed?;
            closed?;

            output.printstd();
            println!("{} maps found", found);
        }
        Command::Count { .. } => {
            let mut output = Table::new();
            output.set_titles(row!["Partition", "Maps"]);
            let mut total = 0;
            for part in table.parts() {
                let count = part.map_count(&mut bm)?;
                output.add_row(row![part.name(), count]);
                total += count;
            }
            output.add_row(row!["total", total]);
            output.printstd();
        }
    }

    bm.flush_all()?;
    Ok(())
}
