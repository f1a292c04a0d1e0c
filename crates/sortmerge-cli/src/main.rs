//! sortmerge CLI: run, validate and explain YAML join jobs.

use clap::{Args, Parser, Subcommand};
use sortmerge_core::config::EngineConfig;
use sortmerge_io::{parse_join_job, JoinJob};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sortmerge")]
#[command(about = "Sort-merge equi-join of two CSV inputs under a page budget", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a join job and write its output
    Run {
        /// Path to the job YAML file
        #[arg(short, long)]
        job: PathBuf,

        #[command(flatten)]
        overrides: Overrides,

        /// Print the join metrics as JSON when done
        #[arg(long)]
        json: bool,
    },

    /// Parse and validate a join job without reading its inputs
    Validate {
        /// Path to the job YAML file
        #[arg(short, long)]
        job: PathBuf,
    },

    /// Show the resolved join: keys, sort decisions, budget, output schema
    Explain {
        /// Path to the job YAML file
        #[arg(short, long)]
        job: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Settings that take priority over both the job file and the environment.
#[derive(Args, Debug, Default, Clone)]
struct Overrides {
    /// Memory budget in pages
    #[arg(long)]
    mem_pages: Option<usize>,

    /// Bytes per page
    #[arg(long)]
    page_size: Option<usize>,

    /// Spill directory for external sort runs
    #[arg(long)]
    spill_dir: Option<String>,

    /// Spill compression codec: none, zstd or lz4
    #[arg(long)]
    spill_codec: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { job, overrides, json } => {
            if let Err(e) = run_job(&job, &overrides, json) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Validate { job } => {
            if let Err(e) = validate_job(&job) {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
            println!("✓ Job is valid");
        }
        Commands::Explain { job, overrides } => {
            if let Err(e) = explain_job(&job, &overrides) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn load_job(path: &Path) -> Result<JoinJob, Box<dyn std::error::Error>> {
    let yaml = fs::read_to_string(path)?;
    Ok(parse_join_job(&yaml)?)
}

/// Directory relative job paths resolve against.
fn job_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}

fn apply_overrides(job: &mut JoinJob, o: &Overrides) {
    if let Some(pages) = o.mem_pages {
        job.mem_pages = Some(pages);
    }
    if let Some(bytes) = o.page_size {
        job.page_size = Some(bytes);
    }
    if o.spill_dir.is_some() || o.spill_codec.is_some() {
        let spill = job.spill.get_or_insert_with(Default::default);
        if let Some(dir) = &o.spill_dir {
            spill.dir = Some(dir.clone());
        }
        if let Some(codec) = &o.spill_codec {
            spill.codec = Some(codec.clone());
        }
    }
}

fn run_job(path: &Path, overrides: &Overrides, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut job = load_job(path)?;
    apply_overrides(&mut job, overrides);
    let config = EngineConfig::from_env();

    let started = std::time::Instant::now();
    let report = job.run(job_dir(path), &config)?;
    tracing::info!(rows = report.rows_written, "join job finished");

    println!("✓ Join executed successfully");
    println!("  Duration: {}ms", started.elapsed().as_millis());
    println!("  Rows written: {}", report.rows_written);
    if let Some(dest) = &report.destination {
        println!("  Output: {}", dest);
    }
    println!(
        "  Pulls: left {}, right {}; sorts invoked: {}",
        report.metrics.left_pulls, report.metrics.right_pulls, report.metrics.sorts_invoked
    );
    if json {
        println!("{}", serde_json::to_string_pretty(&report.metrics)?);
    }
    Ok(())
}

fn validate_job(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let job = load_job(path)?;
    job.to_options(&EngineConfig::from_env())?;
    Ok(())
}

fn explain_job(path: &Path, overrides: &Overrides) -> Result<(), Box<dyn std::error::Error>> {
    let mut job = load_job(path)?;
    apply_overrides(&mut job, overrides);
    println!("Join Plan");
    println!("=========");
    print!("{}", job.explain(&EngineConfig::from_env())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{apply_overrides, job_dir, Overrides};
    use sortmerge_core::config::EngineConfig;
    use sortmerge_io::parse_join_job;
    use std::path::Path;

    const JOB: &str = r#"
left:  { source: "l.csv", schema: [ { name: "k", type: "Int32" } ], key: 1 }
right: { source: "r.csv", schema: [ { name: "k", type: "Int32" } ], key: 1 }
mem_pages: 8
spill: { dir: "/tmp/job-spill" }
"#;

    #[test]
    fn job_settings_override_env_defaults() {
        let job = parse_join_job(JOB).unwrap();
        let cfg = job.engine_config(&EngineConfig::default());
        assert_eq!(cfg.default_mem_pages, 8);
        assert_eq!(cfg.spill_dir, "/tmp/job-spill");
        assert_eq!(cfg.spill_codec, "none");
    }

    #[test]
    fn cli_overrides_higher_priority_than_job() {
        let mut job = parse_join_job(JOB).unwrap();
        let overrides = Overrides {
            mem_pages: Some(3),
            spill_dir: Some("/tmp/cli".into()),
            spill_codec: Some("zstd".into()),
            ..Default::default()
        };
        apply_overrides(&mut job, &overrides);
        let cfg = job.engine_config(&EngineConfig::default());
        assert_eq!(cfg.default_mem_pages, 3);
        assert_eq!(cfg.spill_dir, "/tmp/cli");
        assert_eq!(cfg.spill_codec, "zstd");
        assert_eq!(job.to_options(&EngineConfig::default()).unwrap().mem_pages, 3);
    }

    #[test]
    fn relative_paths_resolve_next_to_the_job() {
        assert_eq!(job_dir(Path::new("jobs/a.yaml")), Path::new("jobs"));
        assert_eq!(job_dir(Path::new("/a.yaml")), Path::new("/"));
    }
}
