//! FastQC: one `fastqc` job over all of the user's reads.

use serde_json::json;

use crate::domain::errors::ShimError;
use crate::domain::models::{Blackboard, JobSpec, Service};
use crate::domain::ports::{Job, Scheduler, ServiceShim, Task};
use crate::services::{OutputCollector, ServiceExecution, SingleJobExecution};

use super::job_dir;

const SHIM: &str = "FastQC";
const VERSION: &str = "0.11.9";

const MAX_CPUS: u32 = 2;
const MAX_MEM_GB: f64 = 1.0;
const MAX_DISK_GB: f64 = 1.0;
const MAX_TIME_SECS: u64 = 5 * 60;

pub struct FastQcShim;

impl ServiceShim for FastQcShim {
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
        let mut execution = SingleJobExecution::new(base, FastQcReports);

        let fastqs = blackboard.fastq_paths();
        if fastqs.is_empty() {
            execution.fail(
                blackboard,
                ShimError::user("FastQC requires FASTQ or BAM/SAM files"),
            );
            return Box::new(execution);
        }

        let mut args = vec![
            "--outdir".to_string(),
            ".".to_string(),
            "--extract".to_string(),
            "--quiet".to_string(),
        ];
        args.extend(fastqs.iter().map(|p| p.display().to_string()));
        let spec = JobSpec::new("fastqc", args)
            .with_cpus(MAX_CPUS)
            .with_mem_gb(MAX_MEM_GB)
            .with_disk_gb(MAX_DISK_GB)
            .with_time_secs(MAX_TIME_SECS);

        if let Err(err) = execution.start(blackboard, scheduler, "fastqc", spec, &job_dir(service, None)) {
            execution.fail(blackboard, err);
        }
        Box::new(execution)
    }
}

/// Points the results at the output directory and lists the HTML reports.
struct FastQcReports;

impl OutputCollector for FastQcReports {
    fn collect_output(
        &self,
        job: &Job,
        execution: &ServiceExecution,
        blackboard: &mut Blackboard,
    ) -> Result<(), ShimError> {
        let mut reports: Vec<String> = std::fs::read_dir(job.work_dir())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with("_fastqc.html"))
            })
            .map(|path| path.display().to_string())
            .collect();
        reports.sort();

        execution.store_results(
            blackboard,
            json!({
                "see_here": job.work_dir().display().to_string(),
                "html_reports": reports,
            }),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::JobControl;

    #[test]
    fn test_lists_html_reports() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b_R2_fastqc.html", "a_R1_fastqc.html", "a_R1_fastqc.zip", "stdout"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let (job, control): (Job, JobControl) =
            Job::channel("fastqc", JobSpec::new("fastqc", ["x.fq"]), dir.path());
        control.complete();

        let mut bb = Blackboard::new();
        let exec = ServiceExecution::start(SHIM, VERSION, &Service::new("FastQC"), None, &mut bb);
        FastQcReports.collect_output(&job, &exec, &mut bb).unwrap();

        let reports = bb.get_strings("services/FastQC/results/html_reports");
        assert_eq!(reports.len(), 2);
        assert!(reports[0].ends_with("a_R1_fastqc.html"));
        assert_eq!(
            bb.get_str("services/FastQC/results/see_here"),
            Some(dir.path().display().to_string().as_str())
        );
    }
}
