//! Quast: assembly quality assessment, optionally against a reference.

use serde_json::{json, Map, Value};

use crate::domain::errors::ShimError;
use crate::domain::models::{Blackboard, JobSpec, Service};
use crate::domain::ports::{Job, Scheduler, ServiceShim, Task};
use crate::services::{OutputCollector, ServiceExecution, SingleJobExecution};

use super::job_dir;

const SHIM: &str = "Quast";
const VERSION: &str = "5.1.0rc1";

const MAX_CPUS: u32 = 12;
const MAX_MEM_GB: f64 = 12.0;

/// User input holding the minimum contig length Quast considers.
pub const CONTIG_THRESHOLD_INPUT: &str = "qu_t";

/// Quast `report.tsv` row labels and the metric names we store them under.
const TRANSLATE: &[(&str, &str)] = &[
    ("Assembly", "sample"),
    ("# contigs", "num_ctg"),
    ("Largest contig", "max_ctg"),
    ("Total length", "tot_len"),
    ("Reference length", "ref_len"),
    ("Reference GC (%)", "ref_pct_gc"),
    ("# contigs (>= 0 bp)", "ctg_min_0k"),
    ("# contigs (>= 1000 bp)", "ctg_min_1k"),
    ("# contigs (>= 5000 bp)", "ctg_min_5k"),
    ("# contigs (>= 10000 bp)", "ctg_min_10k"),
    ("# contigs (>= 25000 bp)", "ctg_min_25k"),
    ("# contigs (>= 50000 bp)", "ctg_min_50k"),
    ("Total length (>= 0 bp)", "len_min_0k"),
    ("Total length (>= 1000 bp)", "len_min_1k"),
    ("Total length (>= 5000 bp)", "len_min_5k"),
    ("Total length (>= 10000 bp)", "len_min_10k"),
    ("Total length (>= 25000 bp)", "len_min_25k"),
    ("Total length (>= 50000 bp)", "len_min_50k"),
    ("GC (%)", "pct_gc"),
    ("N50", "n50"),
    ("NG50", "ng50"),
    ("N75", "n75"),
    ("NG75", "ng75"),
    ("L50", "l50"),
    ("LG50", "lg50"),
    ("L75", "l75"),
    ("LG75", "lg75"),
    ("# total reads", "num_reads"),
    ("# left", "reads_fwd"),
    ("# right", "reads_rev"),
    ("Mapped (%)", "pct_map"),
    ("Reference mapped (%)", "pct_map_ref"),
    ("Properly paired (%)", "pct_paired"),
    ("Reference properly paired (%)", "pct_paired_ref"),
    ("Avg. coverage depth", "cov_dep"),
    ("Reference avg. coverage depth", "cov_dep_ref"),
    ("Coverage >= 1x (%)", "pct_cov_1x"),
    ("Reference coverage >= 1x (%)", "pct_cov_1x_ref"),
    ("# misassemblies", "num_mis_asm"),
    ("# misassembled contigs", "ctg_mis_asm"),
    ("Misassembled contigs length", "len_mis_asm"),
    ("# local misassemblies", "lcl_mis_asm"),
    ("# scaffold gap ext. mis.", "gap_ext_mis"),
    ("# scaffold gap loc. mis.", "gap_loc_mis"),
    ("# unaligned mis. contigs", "ctg_unal_mis"),
    ("# unaligned contigs", "ctg_unal"),
    ("Unaligned length", "len_unal"),
    ("Genome fraction (%)", "pct_cov"),
    ("Duplication ratio", "dup_rat"),
    ("# N's per 100 kbp", "nbase_p_100k"),
    ("# mismatches per 100 kbp", "mismt_p_100k"),
    ("# indels per 100 kbp", "indel_p_100k"),
    ("Largest alignment", "max_aln"),
    ("Total aligned length", "tot_aln"),
    ("NA50", "na50"),
    ("NGA50", "nga50"),
    ("NA75", "na75"),
    ("NGA75", "nga75"),
    ("LA50", "la50"),
    ("LGA50", "lga50"),
    ("LA75", "la75"),
    ("LGA75", "lga75"),
];

fn translate(label: &str) -> &str {
    TRANSLATE
        .iter()
        .find(|(from, _)| *from == label)
        .map_or(label, |(_, to)| to)
}

pub struct QuastShim;

impl ServiceShim for QuastShim {
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
        let threshold = blackboard
            .user_input(CONTIG_THRESHOLD_INPUT)
            .and_then(Value::as_u64);
        let mut execution = SingleJobExecution::new(base, QuastReport { threshold });

        let Some(fasta) = blackboard.contigs_path() else {
            execution.fail(blackboard, ShimError::user("no FASTA files to process"));
            return Box::new(execution);
        };

        let cpus = scheduler.caps().cpus.min(MAX_CPUS);
        let mut args = vec![
            "--output-dir".to_string(),
            ".".to_string(),
            "--threads".to_string(),
            cpus.to_string(),
            "--no-sv".to_string(),
            "--circos".to_string(),
            "--rna-finding".to_string(),
        ];
        if let Some(min_contig) = threshold {
            args.extend(["--min-contig".to_string(), min_contig.to_string()]);
        }
        if let Some(reference) = blackboard.reference_path() {
            args.extend(["-r".to_string(), reference.display().to_string()]);
        }
        args.extend([
            "--labels".to_string(),
            blackboard.sample_id().to_string(),
            fasta.display().to_string(),
        ]);

        let spec = JobSpec::new("quast.py", args)
            .with_cpus(cpus)
            .with_mem_gb(MAX_MEM_GB);
        if let Err(err) = execution.start(blackboard, scheduler, "quast", spec, &job_dir(service, None)) {
            execution.fail(blackboard, err);
        }
        Box::new(execution)
    }
}

/// Parses `report.tsv` from the job directory.
struct QuastReport {
    threshold: Option<u64>,
}

impl OutputCollector for QuastReport {
    fn collect_output(
        &self,
        job: &Job,
        execution: &ServiceExecution,
        blackboard: &mut Blackboard,
    ) -> Result<(), ShimError> {
        let tsv = job.file_path("report.tsv");
        let text = std::fs::read_to_string(&tsv).map_err(|e| {
            ShimError::internal(format!("failed to parse output file {}: {e}", tsv.display()))
        })?;
        let metrics = parse_report(&text);
        if metrics.is_empty() {
            return Err(ShimError::internal(format!(
                "failed to parse output file {}: no metrics",
                tsv.display()
            )));
        }

        execution.store_results(
            blackboard,
            json!({
                "contig_threshold": self.threshold,
                "metrics": metrics,
                "html_report": job.file_path("report.html").display().to_string(),
            }),
        );
        Ok(())
    }
}

/// First two columns of every row, labels translated. Values stay text.
fn parse_report(text: &str) -> Map<String, Value> {
    text.lines()
        .filter_map(|line| {
            let mut cols = line.split('\t');
            let label = cols.next()?.trim();
            let value = cols.next()?.trim();
            (!label.is_empty()).then(|| (translate(label).to_string(), Value::from(value)))
        })
        .collect()
}
