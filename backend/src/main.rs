//! agsmerge CLI - Combine AGS geotechnical files and reconcile depth intervals
//!
//! # Main Commands
//!
//! ```bash
//! agsmerge combine a.ags b.ags -o out/          # One CSV per group
//! agsmerge intervals a.ags b.ags -o intervals.csv
//! agsmerge combine --prefixed a.ags --prefixed b.ags --expand
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! agsmerge detect *.ags                         # Version + content flags
//! agsmerge parse site.ags                       # ParsedFile as JSON
//! agsmerge default-config                       # Interval mapping JSON
//! ```
//!
//! `AGSMERGE_MODE` and `AGSMERGE_EXPAND` (from the environment or `.env`)
//! set defaults; flags win.

use agsmerge::export::{table_to_csv_string, write_table_csv};
use agsmerge::logs::set_echo;
use agsmerge::{
    analyze_content, detect_version, parse_auto, process_batch, tables_to_json, write_tables_csv,
    BatchOptions, BatchResult, ExpandPolicy, FileInput, IntervalConfig, IntervalEngine,
    VersionMode,
};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "agsmerge")]
#[command(about = "Combine AGS3/AGS4 borehole files and reconcile depth intervals", long_about = None)]
struct Cli {
    /// Do not echo the run log to stderr
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show detected version and content flags
    Detect {
        /// Input AGS files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Parse one file and output it as JSON
    Parse {
        /// Input AGS file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Combine files into one table per group
    Combine {
        /// Input AGS files
        files: Vec<PathBuf>,

        #[command(flatten)]
        batch: BatchArgs,

        /// Expand <CONT> values into separate rows
        #[arg(long)]
        expand: bool,

        /// Fail on continuation lists of different lengths instead of padding
        #[arg(long, requires = "expand")]
        strict: bool,

        /// Output directory for one CSV per group (default: JSON on stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Reconcile depth intervals across groups
    Intervals {
        /// Input AGS files
        files: Vec<PathBuf>,

        #[command(flatten)]
        batch: BatchArgs,

        /// Copy every source column instead of the mapped attributes
        #[arg(long)]
        full: bool,

        /// Interval mapping JSON (default: built-in mapping)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output CSV file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the built-in interval mapping
    DefaultConfig,
}

#[derive(clap::Args)]
struct BatchArgs {
    /// Accepted versions: ags3, ags4 or auto
    #[arg(short, long)]
    mode: Option<VersionMode>,

    /// Input file whose hole identifiers get a filename prefix (repeatable;
    /// also marks a positional file as prefixed)
    #[arg(long, value_name = "FILE")]
    prefixed: Vec<PathBuf>,
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if cli.quiet {
        set_echo(false);
    }

    let result = match cli.command {
        Commands::Detect { files } => cmd_detect(&files),

        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),

        Commands::Combine {
            files,
            batch,
            expand,
            strict,
            output,
        } => cmd_combine(&files, &batch, expand, strict, output.as_deref()),

        Commands::Intervals {
            files,
            batch,
            full,
            config,
            output,
        } => cmd_intervals(&files, &batch, full, config.as_deref(), output.as_deref()),

        Commands::DefaultConfig => cmd_default_config(),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_detect(files: &[PathBuf]) -> Result<(), Box<dyn std::error::Error>> {
    for path in files {
        let bytes = fs::read(path)?;
        let version = detect_version(&bytes);
        println!("{}: {}", path.display(), version);
        for (flag, value) in analyze_content(&bytes) {
            println!("   {}: {}", flag, value);
        }
    }
    Ok(())
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing: {}", input.display());

    let file = FileInput::from_path(input)?;
    let parsed = parse_auto(&file.bytes, &file.filename);

    eprintln!("   Version: {}", parsed.version);
    eprintln!("   Groups: {}", parsed.groups.keys().cloned().collect::<Vec<_>>().join(", "));
    for issue in &parsed.errors {
        eprintln!("   ❌ {}", issue);
    }

    let json = serde_json::to_string_pretty(&parsed)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_combine(
    files: &[PathBuf],
    args: &BatchArgs,
    expand: bool,
    strict: bool,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut options = batch_options(args);
    if expand {
        options.expand = true;
    }
    if strict {
        options.expand_policy = ExpandPolicy::Strict;
    }

    let result = run_batch(files, args, &options)?;

    match output {
        Some(dir) => {
            let written = write_tables_csv(dir, &result.combined, "")?;
            eprintln!("💾 {} tables written to: {}", written.len(), dir.display());
        }
        None => {
            let json = serde_json::to_string_pretty(&tables_to_json(&result.combined))?;
            write_output(&json, None)?;
        }
    }

    Ok(())
}

fn cmd_intervals(
    files: &[PathBuf],
    args: &BatchArgs,
    full: bool,
    config: Option<&Path>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config {
        Some(path) => IntervalConfig::from_json(&fs::read_to_string(path)?)?,
        None => IntervalConfig::default(),
    };
    let engine = IntervalEngine::new(config);

    let result = run_batch(files, args, &batch_options(args))?;
    let outcome = if full {
        engine.full(&result.combined)
    } else {
        engine.mapped(&result.combined)
    };

    eprintln!("📏 {} master intervals", outcome.table.len());
    for skipped in &outcome.skipped {
        eprintln!("   ⚠️  {}", skipped);
    }

    match output {
        Some(path) => {
            write_table_csv(path, &outcome.table)?;
            eprintln!("💾 Output written to: {}", path.display());
        }
        None => print!("{}", table_to_csv_string(&outcome.table)?),
    }

    Ok(())
}

fn cmd_default_config() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", IntervalConfig::default().to_json()?);
    Ok(())
}

fn batch_options(args: &BatchArgs) -> BatchOptions {
    let mut options = BatchOptions::from_env();
    if let Some(mode) = args.mode {
        options.mode = mode;
    }
    options
}

fn run_batch(
    files: &[PathBuf],
    args: &BatchArgs,
    options: &BatchOptions,
) -> Result<BatchResult, Box<dyn std::error::Error>> {
    let mut inputs = Vec::new();
    for (path, prefix) in input_plan(files, &args.prefixed) {
        inputs.push(FileInput::from_path(path)?.with_prefix(prefix));
    }
    if inputs.is_empty() {
        return Err("no input files".into());
    }

    let result = process_batch(&inputs, options)?;

    if !result.failures.is_empty() {
        eprintln!("\n⚠️  {} file(s) skipped:", result.failures.len());
        for failure in &result.failures {
            eprintln!("   - {}: {}", failure.filename, failure.reason);
        }
    }
    eprintln!(
        "📊 {} accepted, {} groups",
        result.accepted.len(),
        result.combined.len()
    );

    Ok(result)
}

/// Each path once, with its prefix flag: positional files in order, then
/// files given only through `--prefixed`.
fn input_plan<'a>(files: &'a [PathBuf], prefixed: &'a [PathBuf]) -> Vec<(&'a Path, bool)> {
    let mut plan: Vec<(&Path, bool)> = Vec::with_capacity(files.len() + prefixed.len());
    for path in files.iter().chain(prefixed) {
        let prefix = prefixed.contains(path);
        if !plan.iter().any(|(seen, _)| *seen == path.as_path()) {
            plan.push((path.as_path(), prefix));
        }
    }
    plan
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_plan_dedupes_paths() {
        let files = vec![PathBuf::from("a.ags"), PathBuf::from("b.ags"), PathBuf::from("a.ags")];
        let prefixed = vec![PathBuf::from("c.ags"), PathBuf::from("b.ags")];

        let plan = input_plan(&files, &prefixed);

        assert_eq!(
            plan,
            vec![
                (Path::new("a.ags"), false),
                (Path::new("b.ags"), true),
                (Path::new("c.ags"), true),
            ]
        );
    }
}
