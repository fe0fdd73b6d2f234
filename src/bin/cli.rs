use clap::{Parser, Subcommand};
use std::{
    fs::File,
    io::{self, BufRead, BufReader, Write},
    path::PathBuf,
};
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use unique_filter_rs::{
    EvictionPolicy, FilterConfigBuilder, Record, StoreKind, UniqueFilter,
    open_store,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Backing store: memory or redis (redis reads UNIQUE_REDIS_* variables).
    /// Memory state only lives as long as the command.
    #[arg(short, long, default_value = "memory", global = true)]
    store: StoreKind,

    /// Filter identifier, selects the key in the backing store
    #[arg(short, long, default_value = "1", global = true)]
    id: String,

    /// Template selecting the fingerprinted value, empty for whole payload
    #[arg(short, long, default_value = "{{value}}", global = true)]
    property: String,

    /// Number of past unique fingerprints to remember (0 for unlimited)
    #[arg(short, long, default_value = "1000", global = true)]
    lookback: usize,

    /// Evict strictly by insertion order instead of store order
    #[arg(long, global = true)]
    fifo: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read JSON records (one per line) and print the ones re-emitted
    Process {
        /// Input file, stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,

        /// Treat each line as a bare payload instead of {"id", "payload"}
        #[arg(long)]
        raw: bool,
    },

    /// Print the remembered fingerprints
    Memory,

    /// Forget all remembered fingerprints (with confirmation)
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logs go to stderr so stdout stays a clean record stream
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let config = FilterConfigBuilder::default()
        .property(cli.property.clone())
        .lookback(cli.lookback)
        .eviction(if cli.fifo {
            EvictionPolicy::InsertionOrder
        } else {
            EvictionPolicy::SharedRank
        })
        .build()?;
    let filter = UniqueFilter::new(&cli.id, config, open_store(cli.store)?)?;

    match &cli.command {
        Commands::Process { input, raw } => {
            let reader: Box<dyn BufRead> = match input {
                Some(path) => Box::new(BufReader::new(File::open(path)?)),
                None => Box::new(BufReader::new(io::stdin())),
            };
            process(&filter, reader, *raw)?;
        }
        Commands::Memory => {
            let snapshot = filter.diagnostics()?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Commands::Reset { force } => {
            if *force
                || confirm_action(&format!(
                    "Are you sure you want to forget everything filter '{}' has seen?",
                    filter.id()
                ))?
            {
                filter.reset_state()?;
                println!("Filter '{}' state cleared", filter.id());
            } else {
                println!("Reset cancelled");
            }
        }
    }

    Ok(())
}

fn process(
    filter: &UniqueFilter,
    reader: Box<dyn BufRead>,
    raw: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for (index, line) in reader.lines().enumerate() {
        let line_no = index as u64 + 1;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = parse_line(&line, line_no, raw).inspect_err(|e| {
            error!(line = line_no, error = %e, "Aborting on malformed input");
        })?;

        if filter.process_record(&record)?.reemit {
            writeln!(out, "{}", serde_json::to_string(&record.payload)?)?;
        }
    }

    Ok(())
}

/// Parses one input line. Bare payloads take the line number as record id.
fn parse_line(line: &str, line_no: u64, raw: bool) -> Result<Record, String> {
    let parsed = if raw {
        serde_json::from_str(line).map(|payload| Record::new(line_no, payload))
    } else {
        serde_json::from_str::<Record>(line)
    };
    parsed.map_err(|e| format!("Invalid record on line {line_no}: {e}"))
}

fn confirm_action(prompt: &str) -> io::Result<bool> {
    print!("{prompt} [y/N]: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case("y"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_raw_line_uses_line_number_as_id() {
        let record = parse_line(r#"{"value": "a"}"#, 4, true).unwrap();
        assert_eq!(record.id, 4);
        assert_eq!(record.payload, json!({ "value": "a" }));
    }

    #[test]
    fn test_parse_record_line() {
        let record =
            parse_line(r#"{"id": 9, "payload": {"value": "a"}}"#, 1, false).unwrap();
        assert_eq!(record.id, 9);
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let err = parse_line("{not json", 17, false).unwrap_err();
        assert!(err.contains("line 17"), "{err}");
        assert!(parse_line("[1, 2", 3, true).unwrap_err().contains("line 3"));
    }
}
