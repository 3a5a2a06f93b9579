//! `survey-audit`: audit a live survey against its extracted logic map.
//!
//! Extracts logic maps from specification sections, enumerates every
//! respondent path, walks selected paths in a browser and reports verdicts
//! under `.audit/runs/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use auditor::audit::{AuditRequest, run_audit};
use auditor::core::enumerate::{Enumeration, enumerate_paths};
use auditor::core::invariants::lint_logic;
use auditor::core::selection::PathSelection;
use auditor::exit_codes;
use auditor::graph::LogicGraph;
use auditor::io::config::{AuditConfig, DEFAULT_CONFIG_PATH, load_config, write_config};
use auditor::io::extract::CommandExtractor;
use auditor::io::logic_store::{load_graph, load_logic, write_logic};
use auditor::io::results_log::{ResultsLog, RunPaths, new_run_id, read_results};
use auditor::io::webdriver::WebDriverFactory;
use auditor::logging;
use auditor::report::{AuditSummary, render_paths};
use auditor::stitch::{SectionSource, Stitcher};
use auditor::walk::CancelFlag;
use clap::{Args, Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;

#[derive(Parser)]
#[command(
    name = "survey-audit",
    version,
    about = "Audit a live survey's branching against its logic map"
)]
struct Cli {
    /// Config file (missing file means defaults).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file and create `.audit/runs/`.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Extract a logic map from specification sections, in order.
    Extract {
        /// Section files (text or HTML), first section first.
        #[arg(required = true)]
        sections: Vec<PathBuf>,
        /// Where to write the stitched logic map.
        #[arg(long)]
        out: PathBuf,
    },
    /// Validate a logic map (schema, ids, destinations).
    Check {
        #[arg(long)]
        logic: PathBuf,
    },
    /// Print every respondent path through a logic map.
    Paths {
        #[arg(long)]
        logic: PathBuf,
        /// Print JSON instead of `index<TAB>path` lines.
        #[arg(long)]
        json: bool,
        /// Override the configured path cap.
        #[arg(long)]
        max_paths: Option<usize>,
    },
    /// Walk selected paths against the live survey and classify each walk.
    Audit {
        #[arg(long)]
        logic: PathBuf,
        /// Survey URL to audit.
        #[arg(long)]
        url: String,
        #[command(flatten)]
        selection: SelectionArgs,
        /// Seed for `--sample` (random when omitted).
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Summarize a finished run from its `results.jsonl`.
    Report {
        /// Run directory under `.audit/runs/`.
        run_dir: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
#[group(multiple = false)]
struct SelectionArgs {
    /// Audit every path (default).
    #[arg(long)]
    all: bool,
    /// Audit a random sample (size from config when no value is given).
    #[arg(long, value_name = "N", num_args = 0..=1)]
    sample: Option<Option<usize>>,
    /// Audit specific path indices, run in the order given.
    #[arg(long = "path", value_name = "INDEX", num_args = 1..)]
    paths: Vec<usize>,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Extract { sections, out } => {
            let config = load_config(&cli.config)?;
            cmd_extract(&config, &sections, &out)
        }
        Command::Check { logic } => {
            let config = load_config(&cli.config)?;
            cmd_check(&config, &logic)
        }
        Command::Paths {
            logic,
            json,
            max_paths,
        } => {
            let config = load_config(&cli.config)?;
            cmd_paths(&config, &logic, json, max_paths)
        }
        Command::Audit {
            logic,
            url,
            selection,
            seed,
        } => {
            let config = load_config(&cli.config)?;
            cmd_audit(&config, &logic, &url, &selection, seed)
        }
        Command::Report { run_dir } => cmd_report(&run_dir),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if force || !config_path.exists() {
        write_config(config_path, &AuditConfig::default())?;
        println!("wrote {}", config_path.display());
    } else {
        println!("kept existing {}", config_path.display());
    }
    let runs = Path::new(".audit").join("runs");
    fs::create_dir_all(&runs).with_context(|| format!("create {}", runs.display()))?;
    Ok(exit_codes::OK)
}

fn cmd_extract(config: &AuditConfig, sections: &[PathBuf], out: &Path) -> Result<i32> {
    let extractor = CommandExtractor::from_config(&config.extractor)?;
    let mut stitcher = Stitcher::new(sections.len());
    for path in sections {
        let source = SectionSource {
            label: path.display().to_string(),
            content: fs::read_to_string(path)
                .with_context(|| format!("read section {}", path.display()))?,
        };
        let section = stitcher.next_section();
        let count = stitcher
            .extract_next(&extractor, &source)
            .with_context(|| format!("section {section} ({}) failed", path.display()))?;
        eprintln!(
            "section {section}/{}: {count} question(s)",
            stitcher.total()
        );
    }
    let graph = stitcher.finish()?;
    let map = graph.to_map();
    for warning in lint_logic(&map).warnings {
        eprintln!("warning: {warning}");
    }
    write_logic(out, &map)?;
    println!(
        "wrote {} question(s) from {} section(s) to {}",
        graph.len(),
        sections.len(),
        out.display()
    );
    Ok(exit_codes::OK)
}

fn cmd_check(config: &AuditConfig, logic: &Path) -> Result<i32> {
    let map = load_logic(logic)?;
    let lint = lint_logic(&map);
    for warning in &lint.warnings {
        println!("warning: {warning}");
    }
    for error in &lint.errors {
        println!("error: {error}");
    }
    if !lint.errors.is_empty() {
        return Ok(exit_codes::INVALID);
    }
    let graph = LogicGraph::from_map(map)?;
    let enumeration = enumerate_paths(&graph, &config.enumeration_limits());
    println!(
        "ok: {} question(s), {} path(s){}",
        graph.len(),
        enumeration.paths.len(),
        truncated_note(&enumeration)
    );
    Ok(exit_codes::OK)
}

fn cmd_paths(
    config: &AuditConfig,
    logic: &Path,
    json: bool,
    max_paths: Option<usize>,
) -> Result<i32> {
    let graph = load_graph(logic)?;
    let mut limits = config.enumeration_limits();
    if let Some(max_paths) = max_paths {
        if max_paths == 0 {
            bail!("--max-paths must be > 0");
        }
        limits.max_paths = max_paths;
    }
    let enumeration = enumerate_paths(&graph, &limits);
    if json {
        let payload = json!({
            "paths": enumeration.paths,
            "truncated": enumeration.truncated,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("serialize paths")?
        );
    } else {
        print!("{}", render_paths(&enumeration.paths));
    }
    if enumeration.truncated {
        eprintln!(
            "warning: stopped at {} path(s); raise --max-paths to see more",
            limits.max_paths
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_audit(
    config: &AuditConfig,
    logic: &Path,
    url: &str,
    args: &SelectionArgs,
    seed: Option<u64>,
) -> Result<i32> {
    let graph = load_graph(logic)?;
    let enumeration = enumerate_paths(&graph, &config.enumeration_limits());
    if enumeration.paths.is_empty() {
        bail!("logic map {} yields no paths", logic.display());
    }
    if enumeration.truncated {
        eprintln!(
            "warning: enumeration capped at {} path(s)",
            config.enumeration.max_paths
        );
    }
    let selection = build_selection(enumeration.paths.len(), args, seed, config)?;

    let factory = WebDriverFactory::new(config.webdriver.clone())?;
    let root = std::env::current_dir().context("resolve working directory")?;
    let run_id = new_run_id();
    let mut log = ResultsLog::create(&root, &run_id, url, &graph.to_map(), &enumeration.paths)?;
    let walk = config.walk_config();
    let cancel = CancelFlag::new();
    let request = AuditRequest {
        survey_url: url,
        graph: &graph,
        paths: &enumeration.paths,
        selection: &selection,
        walk: &walk,
        cancel: &cancel,
    };

    eprintln!(
        "auditing {} path(s) against {url} (run {})",
        selection.count(),
        log.run_id()
    );
    let outcome = run_audit(&factory, &request, |progress, record| {
        println!("{}", record.line());
        eprintln!("[{}/{}]", progress.done, progress.total);
        log.append(record)
    })?;

    let run = log.finish(&outcome.summary, outcome.cancelled)?;
    print!("{}", outcome.summary.render());
    if outcome.cancelled {
        println!("cancelled before every selected path ran");
    }
    println!("results: {}", run.dir.display());
    Ok(outcome.summary.exit_code())
}

fn build_selection(
    total: usize,
    args: &SelectionArgs,
    seed: Option<u64>,
    config: &AuditConfig,
) -> Result<PathSelection> {
    if let Some(sample) = args.sample {
        let size = sample.unwrap_or(config.selection.sample_size);
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut selection = PathSelection::none(total);
        selection.sample(size, &mut rng);
        return Ok(selection);
    }
    if !args.paths.is_empty() {
        let mut selection = PathSelection::none(total);
        for &index in &args.paths {
            selection
                .set(index, true)
                .with_context(|| format!("--path {index}"))?;
        }
        return Ok(selection);
    }
    Ok(PathSelection::all(total))
}

fn cmd_report(run_dir: &Path) -> Result<i32> {
    let run = RunPaths::in_dir(run_dir.to_path_buf());
    let loaded = read_results(&run.results_path)?;
    for record in &loaded.records {
        println!("{}", record.line());
    }
    if !loaded.skipped.is_empty() {
        eprintln!(
            "warning: skipped {} malformed line(s): {:?}",
            loaded.skipped.len(),
            loaded.skipped
        );
    }
    let summary = AuditSummary::from_records(&loaded.records);
    print!("{}", summary.render());
    Ok(summary.exit_code())
}

fn truncated_note(enumeration: &Enumeration) -> &'static str {
    if enumeration.truncated {
        " (capped)"
    } else {
        ""
    }
}
