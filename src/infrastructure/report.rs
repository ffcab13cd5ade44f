//! Output files of a run: the full Blackboard as JSON and a one-sample
//! summary as TSV.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use crate::adapters::shims::contigs_metrics::CONTIGS_ID;
use crate::domain::models::{Blackboard, OutputConfig};
use crate::infrastructure::workflow::builtin::{CONTIGS_METRICS, READS_METRICS};

/// Written for every summary field without a value.
const NA: &str = "NA";

/// Summary columns, in output order.
pub const SUMMARY_KEYS: [&str; 10] = [
    "s_id", "n_reads", "nt_read", "pct_q30", "n_ctgs", "nt_ctgs", "n1", "n50", "l50", "pct_gc",
];

/// Summary metrics derived from the service results on the Blackboard.
///
/// Read metrics are totals over all fastq inputs; percentages are weighted
/// by base count. Contig metrics come from the single FASTA input. GC
/// content prefers the contigs and falls back to the reads.
pub fn summarize(blackboard: &Blackboard) -> Vec<(&'static str, String)> {
    let contigs = blackboard.get(&format!("services/{CONTIGS_METRICS}/results/{CONTIGS_ID}"));
    let reads: Vec<&Value> = match blackboard.get(&format!("services/{READS_METRICS}/results")) {
        Some(Value::Object(per_input)) => per_input.values().collect(),
        _ => Vec::new(),
    };

    let contig_metric = |key: &str| contigs.and_then(|c| c.get(key)).map(render);
    let read_total = |key: &str| {
        let values: Vec<f64> = reads.iter().filter_map(|r| number(r.get(key))).collect();
        (!values.is_empty()).then(|| format_count(values.iter().sum()))
    };
    let read_pct = |key: &str| weighted_pct(&reads, key).map(|p| format!("{p:.2}"));

    let values = [
        Some(blackboard.sample_id().to_string()),
        read_total("n_reads"),
        read_total("n_bases"),
        read_pct("pct_q30"),
        contig_metric("n_seqs"),
        contig_metric("tot_len"),
        contig_metric("max_len"),
        contig_metric("n50"),
        contig_metric("l50"),
        contig_metric("pct_gc").or_else(|| read_pct("pct_gc")),
    ];

    SUMMARY_KEYS
        .into_iter()
        .zip(values)
        .map(|(key, value)| (key, value.unwrap_or_else(|| NA.to_string())))
        .collect()
}

/// Header line and value line, tab separated.
pub fn summary_tsv(summary: &[(&str, String)]) -> String {
    let header: Vec<&str> = summary.iter().map(|(k, _)| *k).collect();
    let values: Vec<&str> = summary.iter().map(|(_, v)| v.as_str()).collect();
    format!("{}\n{}\n", header.join("\t"), values.join("\t"))
}

/// Paths of the files written by [`write_outputs`].
#[derive(Debug, Clone)]
pub struct OutputFiles {
    pub results: PathBuf,
    pub summary: PathBuf,
}

/// Store the summary on the Blackboard, then write both output files into
/// `out_dir`.
pub fn write_outputs(
    blackboard: &mut Blackboard,
    out_dir: &Path,
    config: &OutputConfig,
) -> Result<OutputFiles> {
    let summary = summarize(blackboard);
    for (key, value) in summary.iter().skip(1) {
        blackboard.put(&format!("qaap/summary/{key}"), value.as_str());
    }

    let files = OutputFiles {
        results: out_dir.join(&config.results_file),
        summary: out_dir.join(&config.summary_file),
    };

    let json = serde_json::to_string_pretty(blackboard.as_value())
        .context("Failed to serialize results")?;
    fs::write(&files.results, json + "\n")
        .with_context(|| format!("Failed to write {}", files.results.display()))?;
    fs::write(&files.summary, summary_tsv(&summary))
        .with_context(|| format!("Failed to write {}", files.summary.display()))?;

    info!(
        results = %files.results.display(),
        summary = %files.summary.display(),
        "outputs written"
    );
    Ok(files)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn format_count(total: f64) -> String {
    format!("{}", total.round() as u64)
}

/// Base-weighted mean of a percentage across read inputs; unweighted when
/// base counts are missing.
fn weighted_pct(reads: &[&Value], key: &str) -> Option<f64> {
    let points: Vec<(f64, f64)> = reads
        .iter()
        .filter_map(|r| number(r.get(key)).map(|pct| (pct, number(r.get("n_bases")).unwrap_or(0.0))))
        .collect();
    if points.is_empty() {
        return None;
    }
    let weight: f64 = points.iter().map(|(_, w)| w).sum();
    if weight > 0.0 {
        Some(points.iter().map(|(p, w)| p * w).sum::<f64>() / weight)
    } else {
        #[allow(clippy::cast_precision_loss)]
        let n = points.len() as f64;
        Some(points.iter().map(|(p, _)| p).sum::<f64>() / n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn value_of<'a>(summary: &'a [(&str, String)], key: &str) -> &'a str {
        summary
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .unwrap()
    }

    #[test]
    fn test_empty_blackboard_is_all_na() {
        let summary = summarize(&Blackboard::new());
        assert_eq!(summary.len(), SUMMARY_KEYS.len());
        assert_eq!(value_of(&summary, "s_id"), "unknown");
        assert!(summary.iter().skip(1).all(|(_, v)| v == NA));
    }

    #[test]
    fn test_reads_are_totalled_and_weighted() {
        let mut bb = Blackboard::new();
        bb.put_sample_id("S1");
        bb.put(
            "services/ReadsMetrics/results",
            json!({
                "R1": { "n_reads": 100, "n_bases": 1000, "pct_q30": 90.0, "pct_gc": 50.0 },
                "R2": { "n_reads": 100, "n_bases": 3000, "pct_q30": 80.0, "pct_gc": 40.0 },
            }),
        );
        let summary = summarize(&bb);
        assert_eq!(value_of(&summary, "s_id"), "S1");
        assert_eq!(value_of(&summary, "n_reads"), "200");
        assert_eq!(value_of(&summary, "nt_read"), "4000");
        assert_eq!(value_of(&summary, "pct_q30"), "82.50");
        assert_eq!(value_of(&summary, "pct_gc"), "42.50");
        assert_eq!(value_of(&summary, "n50"), NA);
    }

    #[test]
    fn test_contig_gc_wins_over_reads() {
        let mut bb = Blackboard::new();
        bb.put(
            "services/ContigsMetrics/results/contigs",
            json!({ "n_seqs": 12, "tot_len": 2_800_000, "max_len": 500_000,
                    "n50": 300_000, "l50": 4, "pct_gc": 32.8 }),
        );
        bb.put(
            "services/ReadsMetrics/results/reads",
            json!({ "n_reads": 10, "n_bases": 1500, "pct_gc": 50.0 }),
        );
        let summary = summarize(&bb);
        assert_eq!(value_of(&summary, "n_ctgs"), "12");
        assert_eq!(value_of(&summary, "n1"), "500000");
        assert_eq!(value_of(&summary, "pct_gc"), "32.8");
        assert_eq!(value_of(&summary, "pct_q30"), NA);
    }

    #[test]
    fn test_write_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut bb = Blackboard::new();
        bb.put_sample_id("S9");
        let files = write_outputs(&mut bb, dir.path(), &OutputConfig::default()).unwrap();

        let tsv = std::fs::read_to_string(&files.summary).unwrap();
        let lines: Vec<&str> = tsv.lines().collect();
        assert_eq!(lines[0], SUMMARY_KEYS.join("\t"));
        assert!(lines[1].starts_with("S9\tNA\t"));

        let results: Value =
            serde_json::from_str(&std::fs::read_to_string(&files.results).unwrap()).unwrap();
        assert_eq!(results["qaap"]["summary"]["sample_id"], "S9");
        assert_eq!(results["qaap"]["summary"]["n50"], NA);
    }
}
