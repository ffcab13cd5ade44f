//! `qaap run` end to end, without external analysis tools.

use std::path::Path;

use clap::Parser;
use qaap::cli::commands::run::{run_sample, RunArgs};
use qaap::cli::{Cli, Commands};
use qaap::domain::models::{Config, NodeStatus, WorkflowStatus};
use serde_json::Value;

fn run_args(argv: &[&str]) -> RunArgs {
    let mut full = vec!["qaap", "run"];
    full.extend_from_slice(argv);
    match Cli::try_parse_from(full).unwrap().command {
        Commands::Run(args) => *args,
        _ => unreachable!(),
    }
}

fn config(workflow: Option<&Path>) -> Config {
    let mut config = Config::default();
    config.scheduler.poll_interval_secs = 1;
    config.scheduler.max_cpus = Some(1);
    config.scheduler.max_mem_gb = Some(1.0);
    config.workflow = workflow.map(Path::to_path_buf);
    config
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn excluded_services_complete_without_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let fasta = dir.path().join("asm.fa");
    std::fs::write(&fasta, ">ctg1\nACGT\n").unwrap();
    let out = dir.path().join("out");

    let args = run_args(&[
        fasta.to_str().unwrap(),
        "-x",
        "Quast,ContigsMetrics",
        "-o",
        out.to_str().unwrap(),
    ]);
    let result = run_sample(&args, &config(None)).await.unwrap();

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.sample_id, "asm");
    assert_eq!(result.services.get("Quast"), Some(&NodeStatus::Failed));
    assert_eq!(result.errors.get("Quast").map(String::as_str), Some("excluded"));
    assert!(!result.errors.contains_key("FastQC"));

    let tsv = std::fs::read_to_string(&result.summary_file).unwrap();
    assert!(tsv.lines().nth(1).unwrap().starts_with("asm\tNA\t"));

    let results = read_json(&result.results_file);
    assert_eq!(results["qaap"]["run_info"]["status"], "COMPLETED");
    assert_eq!(
        results["qaap"]["user_inputs"]["contigs"],
        fasta.canonicalize().unwrap().display().to_string()
    );
}

#[tokio::test]
async fn declared_stand_in_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let fasta = dir.path().join("S9.fasta");
    std::fs::write(&fasta, ">ctg1\nACGT\n").unwrap();
    let workflow = dir.path().join("wf.yaml");
    std::fs::write(
        &workflow,
        "params: [contigs]\nservices:\n  Custom: { param: contigs }\ntargets:\n  T: { service: Custom }\nunimplemented: [Custom]\n",
    )
    .unwrap();

    let args = run_args(&[
        fasta.to_str().unwrap(),
        "-t",
        "T",
        "-o",
        dir.path().join("out").to_str().unwrap(),
    ]);
    let result = run_sample(&args, &config(Some(&workflow))).await.unwrap();

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert!(!result.stalled);
    assert_eq!(
        result.errors.get("Custom").map(String::as_str),
        Some("service Custom is not implemented")
    );
    let results = read_json(&result.results_file);
    assert_eq!(results["services"]["Custom"]["task_info"]["status"], "FAILED");
    assert_eq!(results["qaap"]["run_info"]["status"], "FAILED");
}

#[tokio::test]
async fn service_without_shim_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let fasta = dir.path().join("S9.fasta");
    std::fs::write(&fasta, ">ctg1\nACGT\n").unwrap();
    let workflow = dir.path().join("wf.yaml");
    std::fs::write(
        &workflow,
        "params: [contigs]\nservices:\n  Quasst: { param: contigs }\ntargets:\n  T: { service: Quasst }\n",
    )
    .unwrap();
    let out = dir.path().join("out");

    let args = run_args(&[fasta.to_str().unwrap(), "-t", "T", "-o", out.to_str().unwrap()]);
    let err = run_sample(&args, &config(Some(&workflow))).await.unwrap_err();
    assert_eq!(err.to_string(), "No service shim defined for service Quasst");
    assert!(!out.exists());
}

#[tokio::test]
async fn user_errors_are_single_messages() {
    let dir = tempfile::tempdir().unwrap();
    let fasta = dir.path().join("a.fa");
    std::fs::write(&fasta, ">x\nA\n").unwrap();
    let out = dir.path().join("out");

    let args = run_args(&[fasta.to_str().unwrap(), "-t", "NOPE", "-o", out.to_str().unwrap()]);
    let err = run_sample(&args, &config(None)).await.unwrap_err();
    assert_eq!(err.to_string(), "invalid target: NOPE (see `qaap targets`)");

    let args = run_args(&["missing.fq"]);
    let err = run_sample(&args, &config(None)).await.unwrap_err();
    assert_eq!(err.to_string(), "no such file: missing.fq");
    assert!(!out.exists());
}
