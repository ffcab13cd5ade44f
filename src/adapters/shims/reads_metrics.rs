//! ReadsMetrics: per-file read statistics from `fastq-stats`.

use serde_json::{Map, Value};

use crate::domain::errors::ShimError;
use crate::domain::models::{Blackboard, JobSpec, Service};
use crate::domain::ports::{Job, Scheduler, ServiceShim, Task};
use crate::services::{JobCollector, MultiJobExecution, ServiceExecution};

use super::{cat_any, fastq_inputs, job_dir};

const SHIM: &str = "ReadsMetrics";
/// fastq-utils release providing `fastq-stats`.
const VERSION: &str = "1.2.0";

const MAX_CPUS: u32 = 2;
const MAX_MEM_GB: f64 = 0.01;
const MAX_DISK_GB: f64 = 0.001;
const MAX_TIME_SECS: u64 = 5 * 60;

pub struct ReadsMetricsShim;

impl ServiceShim for ReadsMetricsShim {
    fn name(&self) -> &str {
        SHIM
    }

    fn version(&self) -> &str {
        VERSION
    }

    fn execute(
        &self,
        service: &Service,
        execution_id: Option<&str>,
        blackboard: &mut Blackboard,
        scheduler: &mut dyn Scheduler,
    ) -> Box<dyn Task> {
        let base = ServiceExecution::start(SHIM, VERSION, service, execution_id, blackboard);
        let mut execution = MultiJobExecution::new(base, FastqStats);

        let inputs = fastq_inputs(blackboard);
        if inputs.is_empty() {
            execution.fail(blackboard, ShimError::user("no fastq files to process"));
            return Box::new(execution);
        }

        for (input_id, path) in inputs {
            let script = format!("{} | fastq-stats", cat_any(&path));
            let spec = JobSpec::shell(script, "fastq-stats")
                .with_cpus(MAX_CPUS)
                .with_mem_gb(MAX_MEM_GB)
                .with_disk_gb(MAX_DISK_GB)
                .with_time_secs(MAX_TIME_SECS);
            let added = execution.add_job(
                blackboard,
                scheduler,
                &format!("fastq-stats_{input_id}"),
                spec,
                &job_dir(service, Some(&input_id)),
                input_id.clone(),
            );
            if let Err(err) = added {
                execution.fail(blackboard, err);
                break;
            }
        }
        Box::new(execution)
    }
}

/// Collects `fastq-stats` output into typed metrics.
struct FastqStats;

impl JobCollector for FastqStats {
    type Tag = String;

    fn collect_job(
        &self,
        results: &mut Map<String, Value>,
        job: &Job,
        input_id: &String,
    ) -> Result<(), ShimError> {
        let text = std::fs::read_to_string(job.stdout())?;
        let mut metrics = Map::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let (key, value) = parse_line(line)?;
            metrics.insert(key, value);
        }
        results.insert(input_id.clone(), Value::Object(metrics));
        Ok(())
    }
}

/// `n_*` values are counts, `pct_*` values are percentages, the rest is text.
fn parse_line(line: &str) -> Result<(String, Value), ShimError> {
    let (key, raw) = line
        .trim()
        .split_once('\t')
        .ok_or_else(|| ShimError::internal(format!("malformed fastq-stats line: {line}")))?;
    let raw = raw.trim();
    let value = if key.starts_with("n_") {
        raw.parse::<i64>().map(Value::from).map_err(|e| {
            ShimError::internal(format!("invalid count for {key}: {raw}: {e}"))
        })?
    } else if key.starts_with("pct_") {
        raw.parse::<f64>().map(Value::from).map_err(|e| {
            ShimError::internal(format!("invalid percentage for {key}: {raw}: {e}"))
        })?
    } else {
        Value::from(raw)
    };
    Ok((key.to_string(), value))
}
