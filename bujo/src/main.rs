use std::{
    collections::{BTreeSet, HashSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use bujo::core::ParsedDocument;
use bujo::outline::document_lines;
use bujo::projectors::carry_forward;
use bujo::storage::JournalParser;
use bujo::{TextJournalParser, find_entry_line, fold_range, fold_ranges, format_document};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// File extensions picked up when a directory is given as input.
const JOURNAL_EXTENSIONS: [&str; 2] = ["bujo", "txt"];

#[derive(Debug, Parser)]
#[command(
    name = "bujo",
    about = "Bullet-journal outline tooling built on the bujo crate",
    version
)]
struct Cli {
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse journal files and print their classified lines.
    Parse(ParseArgs),

    /// Report every invalid line; fails if any document is invalid.
    Check(CheckArgs),

    /// Show the foldable subtree under a line.
    Fold(FoldArgs),

    /// Locate the first entry whose content contains the given text.
    Find(FindArgs),

    /// Rewrite entries in canonical form, leaving other lines untouched.
    Format(FormatArgs),

    /// Carry open tasks into a new day and mark them migrated.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// Journal files or directories containing journal files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Emit JSON instead of a debug representation.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Journal files or directories containing journal files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct FoldArgs {
    file: PathBuf,
    /// 1-based line to fold; every foldable line when omitted.
    #[arg(long)]
    line: Option<usize>,
}

#[derive(Debug, Args)]
struct FindArgs {
    file: PathBuf,
    text: String,
}

#[derive(Debug, Args)]
struct FormatArgs {
    /// Journal files or directories to format.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Overwrite the file instead of printing to stdout.
    #[arg(long)]
    in_place: bool,
}

#[derive(Debug, Args)]
struct MigrateArgs {
    /// Journal page to carry open tasks from.
    file: PathBuf,
    /// Date of the new page. Defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Rewrite the source page with carried tasks marked migrated.
    #[arg(long)]
    in_place: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Parse(args) => handle_parse(args),
        Commands::Check(args) => handle_check(args),
        Commands::Fold(args) => handle_fold(args),
        Commands::Find(args) => handle_find(args),
        Commands::Format(args) => handle_format(args),
        Commands::Migrate(args) => handle_migrate(args),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn parse_all(inputs: &[PathBuf]) -> Result<Vec<(PathBuf, ParsedDocument)>> {
    let expanded = expand_inputs(inputs)?;
    if expanded.is_empty() {
        anyhow::bail!("no journal files found in the provided inputs");
    }

    let parser = TextJournalParser;
    let mut parsed = Vec::new();
    for path in expanded {
        debug!(path = %path.display(), "parsing");
        let doc = parser
            .parse_file(&path)
            .with_context(|| format!("parsing {:?}", path))?;
        parsed.push((path, doc));
    }
    Ok(parsed)
}

fn handle_parse(args: ParseArgs) -> Result<()> {
    let ParseArgs { inputs, json } = args;
    let parsed = parse_all(&inputs)?;

    if json {
        #[derive(serde::Serialize)]
        struct JsonOutput<'a> {
            path: String,
            document: &'a ParsedDocument,
        }

        let payload: Vec<JsonOutput<'_>> = parsed
            .iter()
            .map(|(path, doc)| JsonOutput {
                path: path.display().to_string(),
                document: doc,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for (idx, (path, doc)) in parsed.iter().enumerate() {
            if parsed.len() > 1 {
                println!("== {} ==", path.display());
            }
            println!("{:#?}", doc);
            if parsed.len() > 1 && idx + 1 < parsed.len() {
                println!();
            }
        }
    }
    Ok(())
}

fn handle_check(args: CheckArgs) -> Result<()> {
    let parsed = parse_all(&args.inputs)?;

    let mut invalid_files = 0;
    let mut total_errors = 0;
    for (path, doc) in &parsed {
        for line in check_report(path, doc) {
            println!("{line}");
        }
        if !doc.is_valid {
            invalid_files += 1;
            total_errors += doc.errors.len();
        }
    }

    if total_errors > 0 {
        anyhow::bail!(
            "{} invalid line(s) in {} of {} file(s)",
            total_errors,
            invalid_files,
            parsed.len()
        );
    }
    info!(files = parsed.len(), "all journal files are valid");
    Ok(())
}

/// `path:line: message` for every error in the document.
fn check_report(path: &Path, doc: &ParsedDocument) -> Vec<String> {
    doc.errors
        .iter()
        .map(|e| format!("{}:{}: {}", path.display(), e.line_number, e.message))
        .collect()
}

fn handle_fold(args: FoldArgs) -> Result<()> {
    let FoldArgs { file, line } = args;
    let text = fs::read_to_string(&file).with_context(|| format!("reading {:?}", file))?;
    let lines = document_lines(&text);

    let ranges = match line {
        Some(0) => anyhow::bail!("line numbers start at 1"),
        Some(n) => fold_range(&lines, n - 1).into_iter().collect(),
        None => fold_ranges(&lines),
    };

    if ranges.is_empty() {
        eprintln!("Nothing to fold.");
        return Ok(());
    }
    for range in ranges {
        println!(
            "{}-{} ({} hidden): {}",
            range.from + 1,
            range.to + 1,
            range.hidden(),
            lines[range.from].trim()
        );
    }
    Ok(())
}

fn handle_find(args: FindArgs) -> Result<()> {
    let FindArgs { file, text } = args;
    let source = fs::read_to_string(&file).with_context(|| format!("reading {:?}", file))?;

    match find_entry_line(&source, &text) {
        Some(found) => {
            println!(
                "{}:{} [{}..{}] {}",
                file.display(),
                found.line,
                found.from,
                found.to,
                found.slice(&source).unwrap_or_default()
            );
            Ok(())
        }
        None => anyhow::bail!("no entry matching {:?} in {:?}", text, file),
    }
}

fn handle_format(args: FormatArgs) -> Result<()> {
    let FormatArgs { inputs, in_place } = args;
    let expanded = expand_inputs(&inputs)?;
    if expanded.is_empty() {
        anyhow::bail!("no journal files found in the provided inputs");
    }

    let mut first = true;
    for path in expanded {
        debug!(path = %path.display(), "formatting");
        let text = fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?;
        let formatted = format_document(&text);

        if in_place {
            if formatted != text {
                fs::write(&path, formatted.as_bytes())
                    .with_context(|| format!("writing {:?}", path))?;
                info!(path = %path.display(), "reformatted");
            }
        } else {
            if !first {
                println!();
                println!("== {} ==", path.display());
            } else if inputs.len() > 1 {
                println!("== {} ==", path.display());
            }
            first = false;
            print!("{formatted}");
            if !formatted.ends_with('\n') {
                println!();
            }
        }
    }

    Ok(())
}

fn handle_migrate(args: MigrateArgs) -> Result<()> {
    let MigrateArgs {
        file,
        date,
        in_place,
    } = args;
    let source = fs::read_to_string(&file).with_context(|| format!("reading {:?}", file))?;
    let date = date.unwrap_or_else(|| Local::now().date_naive());

    let result = carry_forward::next_day(&source, date);
    if result.carried == 0 {
        warn!(path = %file.display(), "no open tasks to carry forward");
    }

    if in_place {
        fs::write(&file, result.previous.as_bytes())
            .with_context(|| format!("writing {:?}", file))?;
        info!(carried = result.carried, path = %file.display(), "marked tasks migrated");
    }

    print!("{}", result.next);
    if !result.next.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn is_journal_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| JOURNAL_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

fn expand_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut visited = BTreeSet::new();
    for path in paths {
        let canonical =
            fs::canonicalize(path).with_context(|| format!("resolving path {:?}", path))?;
        let meta = fs::metadata(&canonical)
            .with_context(|| format!("reading metadata for {:?}", canonical))?;
        if meta.is_dir() {
            debug!(dir = %canonical.display(), "scanning directory");
            for file in collect_journal_files(&canonical)? {
                if visited.insert(file.clone()) {
                    out.push(file);
                }
            }
        } else if meta.is_file() {
            if !is_journal_file(&canonical) {
                anyhow::bail!("{:?} is not a journal file (.bujo or .txt)", canonical);
            }
            if visited.insert(canonical.clone()) {
                out.push(canonical);
            }
        }
    }
    Ok(out)
}

fn collect_journal_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut visited = HashSet::new();
    visit_dir(dir, &mut out, &mut visited)?;
    out.sort();
    out.dedup();
    Ok(out)
}

fn visit_dir(path: &Path, out: &mut Vec<PathBuf>, visited: &mut HashSet<PathBuf>) -> Result<()> {
    let canonical = fs::canonicalize(path)?;
    if !visited.insert(canonical.clone()) {
        return Ok(());
    }

    let metadata = fs::metadata(&canonical)?;
    if metadata.is_dir() {
        for entry in fs::read_dir(&canonical)? {
            let entry = entry?;
            if entry.file_type()?.is_symlink() {
                continue;
            }
            visit_dir(&entry.path(), out, visited)?;
        }
    } else if metadata.is_file() && is_journal_file(&canonical) {
        debug!(path = %canonical.display(), "found journal file");
        out.push(canonical);
    }
    Ok(())
}
