//! `qaap run`: assess one sample.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::shims::quast::CONTIG_THRESHOLD_INPUT;
use crate::adapters::shims::registry_for;
use crate::cli::inputs::Inputs;
use crate::cli::output::{list_table, output, CommandOutput};
use crate::domain::models::{
    Blackboard, Config, DependencyGraph, NodeStatus, Param, SeqPairing, SeqPlatform, Target,
    WorkflowStatus,
};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging::{LogConfig, LoggerImpl};
use crate::infrastructure::report::write_outputs;
use crate::infrastructure::scheduler::{resolve_caps, SubprocessScheduler};
use crate::infrastructure::workflow::builtin::{PARAM_CONTIGS, PARAM_READS, PARAM_REFERENCE};
use crate::infrastructure::workflow::DEFAULT_TARGET;
use crate::services::{Executor, WorkflowResolver};

use super::load_workflow;

/// Name recorded as the service of the run itself.
const RUN_SERVICE: &str = "QAAP";

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Input files: at most one FASTA (contigs) and up to two fastq files
    pub files: Vec<PathBuf>,

    /// Targets to produce, comma separated
    #[arg(short, long, value_delimiter = ',', default_value = DEFAULT_TARGET)]
    pub targets: Vec<String>,

    /// Targets or services to exclude, comma separated
    #[arg(short = 'x', long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Reference genome (FASTA)
    #[arg(short, long)]
    pub reference: Option<PathBuf>,

    /// Sample identifier; derived from the file names when omitted
    #[arg(short, long)]
    pub id: Option<String>,

    /// Output directory; jobs run in subdirectories of it
    #[arg(short, long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Maximum number of CPUs to use
    #[arg(long)]
    pub max_cpus: Option<u32>,

    /// Maximum memory to use, in GB
    #[arg(long, value_name = "GB")]
    pub max_mem: Option<f64>,

    /// Maximum disk space to use, in GB
    #[arg(long, value_name = "GB")]
    pub max_disk: Option<f64>,

    /// Maximum run time, in seconds
    #[arg(long, value_name = "SECS")]
    pub max_time: Option<u64>,

    /// Seconds between polls of running jobs
    #[arg(long, value_name = "SECS")]
    pub poll: Option<u64>,

    /// Sequencing platform of the reads (illumina, nanopore, pacbio)
    #[arg(long = "sq-p", value_name = "PLATFORM")]
    pub seq_platform: Option<SeqPlatform>,

    /// Read pairing (paired, unpaired, mate-paired)
    #[arg(long = "sq-r", value_name = "PAIRING")]
    pub seq_pairing: Option<SeqPairing>,

    /// Minimum contig length for Quast
    #[arg(long = "qu-t", value_name = "LEN", default_value_t = 500)]
    pub contig_threshold: u64,

    /// Workflow definition to run instead of the built-in one
    #[arg(long)]
    pub workflow: Option<PathBuf>,

    /// Configuration file
    #[arg(long, env = "QAAP_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub run_id: String,
    pub sample_id: String,
    pub status: WorkflowStatus,
    pub stalled: bool,
    pub services: BTreeMap<String, NodeStatus>,
    pub errors: BTreeMap<String, String>,
    pub warnings: Vec<String>,
    pub results_file: PathBuf,
    pub summary_file: PathBuf,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["service", "status", "error"]);
        for (service, status) in &self.services {
            let error = self.errors.get(service).map_or("", String::as_str);
            table.add_row(vec![service.as_str(), status.as_str(), error]);
        }

        let mut lines = vec![
            format!("Sample:  {}", self.sample_id),
            format!(
                "Status:  {}{}",
                self.status,
                if self.stalled { " (stalled)" } else { "" }
            ),
            String::new(),
            table.to_string(),
        ];
        if !self.warnings.is_empty() {
            lines.push(String::new());
            lines.extend(self.warnings.iter().map(|w| format!("warning: {w}")));
        }
        lines.push(String::new());
        lines.push(format!("Results: {}", self.results_file.display()));
        lines.push(format!("Summary: {}", self.summary_file.display()));
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Overlay the command-line flags on the loaded configuration.
fn apply_overrides(config: &mut Config, args: &RunArgs) {
    let scheduler = &mut config.scheduler;
    scheduler.max_cpus = args.max_cpus.or(scheduler.max_cpus);
    scheduler.max_mem_gb = args.max_mem.or(scheduler.max_mem_gb);
    scheduler.max_disk_gb = args.max_disk.or(scheduler.max_disk_gb);
    scheduler.max_time_secs = args.max_time.or(scheduler.max_time_secs);
    if let Some(poll) = args.poll {
        scheduler.poll_interval_secs = poll;
    }
    if args.workflow.is_some() {
        config.workflow.clone_from(&args.workflow);
    }
    if args.verbose {
        config.logging.level = "debug".to_string();
    }
}

fn resolve_targets(graph: &DependencyGraph, names: &[String]) -> Result<Vec<Target>> {
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(|name| match graph.find(name) {
            Some(target @ Target::UserTarget(_)) => Ok(target.clone()),
            _ => bail!("invalid target: {name} (see `qaap targets`)"),
        })
        .collect()
}

fn resolve_excludes(graph: &DependencyGraph, names: &[String]) -> Result<Vec<Target>> {
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(|name| match graph.find(name) {
            Some(target @ (Target::UserTarget(_) | Target::Service(_))) => Ok(target.clone()),
            _ => bail!("invalid exclude: {name} (see `qaap targets` and `qaap services`)"),
        })
        .collect()
}

/// Params of `graph` the inputs supply.
fn provided_params(graph: &DependencyGraph, inputs: &Inputs) -> Vec<Param> {
    [
        (PARAM_CONTIGS, inputs.contigs.is_some()),
        (PARAM_READS, !inputs.fastqs.is_empty()),
        (PARAM_REFERENCE, inputs.reference.is_some()),
    ]
    .into_iter()
    .filter(|(_, present)| *present)
    .map(|(name, _)| Param::new(name))
    .filter(|param| graph.contains(&param.clone().into()))
    .collect()
}

fn prepare_out_dir(out_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("cannot create output directory: {}", out_dir.display()))?;
    out_dir
        .canonicalize()
        .with_context(|| format!("cannot resolve output directory: {}", out_dir.display()))
}

/// Record the run's inputs on a fresh Blackboard.
fn seed_blackboard(
    args: &RunArgs,
    inputs: &Inputs,
    out_dir: &Path,
    run_id: &str,
) -> Result<Blackboard> {
    let mut blackboard = Blackboard::new();
    blackboard.start_run(
        RUN_SERVICE,
        env!("CARGO_PKG_VERSION"),
        json!({
            "targets": args.targets,
            "exclude": args.exclude,
            "out_dir": out_dir.display().to_string(),
        }),
    );
    blackboard.put_run_info("run_id", run_id);

    let sample_id = args.id.clone().unwrap_or_else(|| inputs.sample_id());
    blackboard.put_sample_id(&sample_id);

    if let Some(contigs) = &inputs.contigs {
        blackboard.put_contigs_path(contigs);
    }
    if !inputs.fastqs.is_empty() {
        blackboard.put_fastq_paths(&inputs.fastqs);
        if let Some(platform) = inputs.seq_platform(args.seq_platform)? {
            blackboard.put_seq_platform(platform);
        }
        let (pairing, assumption) = inputs.seq_pairing(args.seq_pairing);
        if let Some(pairing) = pairing {
            blackboard.put_seq_pairing(pairing);
        }
        if let Some(assumption) = assumption {
            warn!("{assumption}");
            blackboard.add_warning(assumption);
        }
    }
    if let Some(reference) = &inputs.reference {
        blackboard.put_reference_path(reference);
    }
    blackboard.put_user_input(CONTIG_THRESHOLD_INPUT, args.contig_threshold);
    Ok(blackboard)
}

pub async fn execute(args: RunArgs, json_mode: bool) -> Result<ExitCode> {
    let mut config = ConfigLoader::load(args.config.as_deref())?;
    apply_overrides(&mut config, &args);
    ConfigLoader::validate(&config)?;
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))?;

    let result = run_sample(&args, &config).await?;
    output(&result, json_mode);

    Ok(match result.status {
        WorkflowStatus::Completed => ExitCode::SUCCESS,
        _ => ExitCode::from(2),
    })
}

/// Classify the inputs, run the workflow to the end and write the output
/// files. A failed workflow is still an `Ok` result.
pub async fn run_sample(args: &RunArgs, config: &Config) -> Result<RunOutput> {
    let inputs = Inputs::classify(&args.files, args.reference.as_deref())?;
    let workflow = load_workflow(config.workflow.as_deref())?;
    let shims = registry_for(&workflow);
    shims.validate(&workflow.graph)?;
    let graph = Arc::new(workflow.graph);
    let targets = resolve_targets(&graph, &args.targets)?;
    let excluded = resolve_excludes(&graph, &args.exclude)?;
    let out_dir = prepare_out_dir(&args.out_dir)?;

    let run_id = Uuid::new_v4().to_string();
    let mut blackboard = seed_blackboard(args, &inputs, &out_dir, &run_id)?;
    info!(
        run_id = %run_id,
        sample_id = %blackboard.sample_id(),
        out_dir = %out_dir.display(),
        "starting run"
    );

    let resolver = WorkflowResolver::new(
        Arc::clone(&graph),
        provided_params(&graph, &inputs),
        targets,
        excluded,
    )?;
    let scheduler = SubprocessScheduler::new(&out_dir, resolve_caps(&config.scheduler))?;
    let mut executor = Executor::new(
        resolver,
        shims,
        Box::new(scheduler),
        Duration::from_secs(config.scheduler.poll_interval_secs),
    )?;

    let outcome = executor.run(&mut blackboard).await;
    blackboard.end_run(outcome.status);
    let files = write_outputs(&mut blackboard, &out_dir, &config.output)?;

    Ok(RunOutput {
        run_id,
        sample_id: blackboard.sample_id().to_string(),
        status: outcome.status,
        stalled: outcome.stalled,
        services: outcome.services,
        errors: outcome.errors,
        warnings: blackboard.warnings(),
        results_file: files.results,
        summary_file: files.summary,
    })
}
