//! ContigsMetrics: assembly statistics from `uf-stats`.

use serde_json::{Map, Value};

use crate::domain::errors::ShimError;
use crate::domain::models::{Blackboard, JobSpec, Service};
use crate::domain::ports::{Job, Scheduler, ServiceShim, Task};
use crate::services::{JobCollector, MultiJobExecution, ServiceExecution};

use super::{cat_any, job_dir, tab_pairs};

const SHIM: &str = "ContigsMetrics";
/// unfasta release providing `uf` and `uf-stats`.
const VERSION: &str = "1.2.0";

const MAX_CPUS: u32 = 2;
const MAX_MEM_GB: f64 = 1.0;
const MAX_TIME_SECS: u64 = 5 * 60;

/// Input id of the user's contigs.
pub const CONTIGS_ID: &str = "contigs";

pub struct ContigsMetricsShim;

impl ServiceShim for ContigsMetricsShim {
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
        let mut execution = MultiJobExecution::new(base, UfStats);

        let Some(fasta) = blackboard.contigs_path() else {
            execution.fail(blackboard, ShimError::user("no FASTA files to process"));
            return Box::new(execution);
        };

        let script = format!("{} | uf | uf-stats -t", cat_any(&fasta));
        let spec = JobSpec::shell(script, "uf-stats")
            .with_cpus(MAX_CPUS)
            .with_mem_gb(MAX_MEM_GB)
            .with_time_secs(MAX_TIME_SECS);

        if let Err(err) = execution.add_job(
            blackboard,
            scheduler,
            &format!("uf-stats-{CONTIGS_ID}"),
            spec,
            &job_dir(service, Some(CONTIGS_ID)),
            CONTIGS_ID.to_string(),
        ) {
            execution.fail(blackboard, err);
        }
        Box::new(execution)
    }
}

/// Collects `uf-stats -t` output: one `metric<TAB>value` per line.
struct UfStats;

impl JobCollector for UfStats {
    type Tag = String;

    fn collect_job(
        &self,
        results: &mut Map<String, Value>,
        job: &Job,
        input_id: &String,
    ) -> Result<(), ShimError> {
        let path = job.stdout();
        let text = std::fs::read_to_string(&path).map_err(|e| {
            ShimError::internal(format!(
                "failed to process job output ({}): {e}",
                path.display()
            ))
        })?;

        let metrics: Map<String, Value> = tab_pairs(&text)
            .map(|(key, value)| (key.to_string(), metric_value(value)))
            .collect();
        if metrics.is_empty() {
            return Err(ShimError::internal(format!(
                "no metrics in job output ({})",
                path.display()
            )));
        }
        results.insert(input_id.clone(), Value::Object(metrics));
        Ok(())
    }
}

/// Integers and decimals become JSON numbers, anything else stays text.
fn metric_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map_or_else(|| Value::from(raw), Value::from)
}
