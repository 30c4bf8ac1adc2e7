use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use glob::Pattern;
use log::debug;
use tools::{decode_datagram_json, format_decode_pretty, inspect_datagram, schema_from_json, InspectReport};

#[derive(Parser)]
#[command(
    name = "tickwire-tools",
    version,
    about = "tickwire capture inspection and decoding tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect datagram kinds and sizes.
    Inspect {
        /// A datagram file or a capture directory.
        path: PathBuf,
        /// Optional schema JSON for per-class snapshot summaries.
        #[arg(long)]
        schema: Option<PathBuf>,
        /// Optional glob filter when inspecting a directory.
        #[arg(long)]
        glob: Option<String>,
        /// Sort inspected datagrams.
        #[arg(long, value_enum)]
        sort: Option<InspectSort>,
        /// Limit the number of inspected datagrams (after sorting).
        #[arg(long)]
        limit: Option<usize>,
        /// Print reports as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Decode a datagram into structured JSON.
    Decode {
        /// Path to the datagram bytes.
        datagram: PathBuf,
        /// Schema JSON the datagram was encoded with.
        #[arg(long)]
        schema: PathBuf,
        /// Output format.
        #[arg(long, value_enum, default_value_t = DecodeFormat::Json)]
        format: DecodeFormat,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InspectSort {
    Size,
    Name,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DecodeFormat {
    Json,
    Pretty,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match cli.command {
        Command::Inspect {
            path,
            schema,
            glob,
            sort,
            limit,
            json,
        } => {
            let schema = schema
                .as_deref()
                .map(load_schema)
                .transpose()
                .context("load schema")?;
            let entries = if path.is_dir() {
                let mut entries = collect_entries(&path, glob.as_deref())?;
                sort_entries(&mut entries, sort);
                if let Some(limit) = limit.or(sort.and_then(|sort| match sort {
                    InspectSort::Size => Some(10),
                    InspectSort::Name => None,
                })) {
                    entries.truncate(limit);
                }
                entries
            } else {
                let size = fs::metadata(&path)
                    .with_context(|| format!("stat {}", path.display()))?
                    .len();
                vec![Entry { path, size }]
            };

            debug!("inspecting {} datagrams", entries.len());
            for entry in entries {
                let bytes = fs::read(&entry.path)
                    .with_context(|| format!("read datagram {}", entry.path.display()))?;
                let report = inspect_datagram(
                    &bytes,
                    schema.as_ref(),
                    &wire::Limits::default(),
                    &codec::CodecLimits::default(),
                )
                .with_context(|| format!("inspect {}", entry.path.display()))?;
                if json {
                    println!("{}", serde_json::to_string(&report).context("serialize report")?);
                } else {
                    println!("== {} ({} bytes) ==", entry.path.display(), entry.size);
                    print_report(&report);
                }
            }
        }
        Command::Decode {
            datagram,
            schema,
            format,
        } => {
            let bytes = fs::read(&datagram)
                .with_context(|| format!("read datagram {}", datagram.display()))?;
            let schema = load_schema(&schema).context("load schema")?;
            let output = decode_datagram_json(
                &bytes,
                &schema,
                &wire::Limits::default(),
                &codec::CodecLimits::default(),
            )?;
            match format {
                DecodeFormat::Json => {
                    let json = serde_json::to_string_pretty(&output).context("serialize json")?;
                    println!("{json}");
                }
                DecodeFormat::Pretty => print!("{}", format_decode_pretty(&output)),
            }
        }
    }
    Ok(())
}

fn load_schema(path: &Path) -> Result<schema::Schema> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read schema {}", path.display()))?;
    schema_from_json(&contents)
}

struct Entry {
    path: PathBuf,
    size: u64,
}

fn collect_entries(dir: &Path, glob: Option<&str>) -> Result<Vec<Entry>> {
    let pattern = glob
        .map(Pattern::new)
        .transpose()
        .context("invalid glob pattern")?;

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || path.extension().is_some_and(|ext| ext == "json") {
            continue;
        }
        if let Some(pattern) = &pattern {
            let matches_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| pattern.matches(name));
            if !pattern.matches_path(&path) && !matches_name {
                continue;
            }
        }
        let size = entry.metadata()?.len();
        entries.push(Entry { path, size });
    }
    Ok(entries)
}

fn sort_entries(entries: &mut [Entry], sort: Option<InspectSort>) {
    match sort {
        Some(InspectSort::Size) => {
            entries.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
        }
        Some(InspectSort::Name) | None => entries.sort_by(|a, b| a.path.cmp(&b.path)),
    }
}

fn print_report(report: &InspectReport) {
    println!(
        "kind: {} (tag {}) body: {} bytes",
        report.kind, report.tag, report.body_bytes
    );
    if let Some(snapshot) = &report.snapshot {
        let more = if snapshot.continued { ", continued" } else { "" };
        println!(
            "snapshot: {} tick {} with {} entities{more}",
            snapshot.mode, snapshot.tick, snapshot.entities
        );
        if let Some(skipped) = snapshot.skipped.filter(|skipped| *skipped > 0) {
            println!("  skipped: {skipped}");
        }
        if let Some(fields) = snapshot.changed_fields {
            println!("  fields: {fields}");
        }
        for class in &snapshot.by_class {
            println!(
                "  class {} ({}): {} entities, {} fields",
                class.class, class.name, class.entities, class.fields
            );
        }
    }
    if let Some(commands) = &report.commands {
        let newest = commands
            .newest
            .map_or_else(|| String::from("n/a"), |number| number.to_string());
        println!(
            "usercmd: {} new, {} backup, newest #{newest}",
            commands.new, commands.backup
        );
    }
}
