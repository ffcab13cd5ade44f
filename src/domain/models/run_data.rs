//! Run-level data on the Blackboard: metadata, user inputs and summary.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::blackboard::Blackboard;
use super::status::WorkflowStatus;

/// Sequencing platform of the reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeqPlatform {
    Illumina,
    Nanopore,
    PacBio,
}

impl SeqPlatform {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Illumina => "Illumina",
            Self::Nanopore => "Nanopore",
            Self::PacBio => "PacBio",
        }
    }
}

impl fmt::Display for SeqPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeqPlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "illumina" => Ok(Self::Illumina),
            "nanopore" => Ok(Self::Nanopore),
            "pacbio" => Ok(Self::PacBio),
            other => Err(format!("invalid sequencing platform: {other}")),
        }
    }
}

/// Read pairing of the fastq inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeqPairing {
    Paired,
    Unpaired,
    MatePaired,
}

impl SeqPairing {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Paired => "paired",
            Self::Unpaired => "unpaired",
            Self::MatePaired => "mate-paired",
        }
    }
}

impl fmt::Display for SeqPairing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeqPairing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "paired" => Ok(Self::Paired),
            "unpaired" => Ok(Self::Unpaired),
            "mate-paired" => Ok(Self::MatePaired),
            other => Err(format!("invalid read pairing: {other}")),
        }
    }
}

const RUN_INFO: &str = "qaap/run_info";
const USER_INPUTS: &str = "qaap/user_inputs";
const WARNINGS: &str = "qaap/warnings";
const SAMPLE_ID: &str = "qaap/summary/sample_id";

pub(crate) fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Seconds between a stored RFC 3339 start stamp and `end`; zero if unparsable.
pub(crate) fn seconds_since(start: Option<&str>, end: DateTime<Utc>) -> f64 {
    start
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or(0.0, |start| {
            #[allow(clippy::cast_precision_loss)]
            let millis = (end - start.with_timezone(&Utc)).num_milliseconds() as f64;
            millis / 1000.0
        })
}

impl Blackboard {
    /// Record the start of a run along with everything the user asked for.
    pub fn start_run(&mut self, service: &str, version: &str, user_inputs: Value) {
        self.put(&format!("{RUN_INFO}/service"), service);
        self.put(&format!("{RUN_INFO}/version"), version);
        self.put(&format!("{RUN_INFO}/time/start"), timestamp(Utc::now()));
        self.put(USER_INPUTS, user_inputs);
    }

    pub fn end_run(&mut self, status: WorkflowStatus) {
        let now = Utc::now();
        let duration = seconds_since(self.get_str(&format!("{RUN_INFO}/time/start")), now);
        self.put(&format!("{RUN_INFO}/time/end"), timestamp(now));
        self.put(&format!("{RUN_INFO}/time/duration"), duration);
        self.put(&format!("{RUN_INFO}/status"), status.as_str());
    }

    pub fn put_run_info(&mut self, key: &str, value: impl Into<Value>) {
        self.put(&format!("{RUN_INFO}/{key}"), value);
    }

    pub fn run_status(&self) -> Option<&str> {
        self.get_str(&format!("{RUN_INFO}/status"))
    }

    pub fn put_user_input(&mut self, param: &str, value: impl Into<Value>) {
        self.put(&format!("{USER_INPUTS}/{param}"), value);
    }

    pub fn user_input(&self, param: &str) -> Option<&Value> {
        self.get(&format!("{USER_INPUTS}/{param}"))
    }

    /// Run-level warning; services record theirs under their own path.
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.append_to(WARNINGS, warning.into());
    }

    pub fn warnings(&self) -> Vec<String> {
        self.get_strings(WARNINGS)
    }

    pub fn put_sample_id(&mut self, id: &str) {
        self.put(SAMPLE_ID, id);
    }

    pub fn sample_id(&self) -> &str {
        self.get_str(SAMPLE_ID).unwrap_or("unknown")
    }

    pub fn put_seq_platform(&mut self, platform: SeqPlatform) {
        self.put_user_input("seq_platform", platform.as_str());
    }

    pub fn seq_platform(&self) -> Option<SeqPlatform> {
        self.user_input("seq_platform")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    pub fn put_seq_pairing(&mut self, pairing: SeqPairing) {
        self.put_user_input("seq_pairing", pairing.as_str());
    }

    pub fn seq_pairing(&self) -> Option<SeqPairing> {
        self.user_input("seq_pairing")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    pub fn put_fastq_paths(&mut self, paths: &[PathBuf]) {
        let paths: Vec<Value> = paths
            .iter()
            .map(|p| Value::from(p.display().to_string()))
            .collect();
        self.put_user_input("fastqs", paths);
    }

    pub fn fastq_paths(&self) -> Vec<PathBuf> {
        self.get_strings(&format!("{USER_INPUTS}/fastqs"))
            .into_iter()
            .map(PathBuf::from)
            .collect()
    }

    pub fn put_contigs_path(&mut self, path: &std::path::Path) {
        self.put_user_input("contigs", path.display().to_string());
    }

    pub fn contigs_path(&self) -> Option<PathBuf> {
        self.user_input("contigs")
            .and_then(Value::as_str)
            .map(PathBuf::from)
    }

    pub fn put_reference_path(&mut self, path: &std::path::Path) {
        self.put_user_input("reference", path.display().to_string());
    }

    pub fn reference_path(&self) -> Option<PathBuf> {
        self.user_input("reference")
            .and_then(Value::as_str)
            .map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_start_and_end_run() {
        let mut bb = Blackboard::new();
        bb.start_run("QAAP", "1.0.0", json!({"inputs": ["a.fq"]}));
        bb.end_run(WorkflowStatus::Completed);
        assert_eq!(bb.get_str("qaap/run_info/service"), Some("QAAP"));
        assert_eq!(bb.run_status(), Some("COMPLETED"));
        assert!(bb.get("qaap/run_info/time/end").is_some());
        assert!(bb.get("qaap/run_info/time/duration").unwrap().as_f64().unwrap() >= 0.0);
        assert_eq!(bb.user_input("inputs"), Some(&json!(["a.fq"])));
    }

    #[test]
    fn test_seq_specs_round_trip_through_user_inputs() {
        let mut bb = Blackboard::new();
        assert_eq!(bb.seq_platform(), None);
        bb.put_seq_platform(SeqPlatform::Illumina);
        bb.put_seq_pairing(SeqPairing::MatePaired);
        assert_eq!(bb.seq_platform(), Some(SeqPlatform::Illumina));
        assert_eq!(bb.seq_pairing(), Some(SeqPairing::MatePaired));
        assert_eq!(bb.user_input("seq_pairing"), Some(&json!("mate-paired")));
    }

    #[test]
    fn test_paths_and_sample_id() {
        let mut bb = Blackboard::new();
        assert_eq!(bb.sample_id(), "unknown");
        bb.put_sample_id("S42");
        bb.put_fastq_paths(&[PathBuf::from("r1.fq"), PathBuf::from("r2.fq")]);
        bb.put_contigs_path(std::path::Path::new("asm.fa"));
        assert_eq!(bb.sample_id(), "S42");
        assert_eq!(bb.fastq_paths().len(), 2);
        assert_eq!(bb.contigs_path(), Some(PathBuf::from("asm.fa")));
        assert_eq!(bb.reference_path(), None);
    }

    #[test]
    fn test_platform_parse_is_case_insensitive() {
        assert_eq!("pacbio".parse::<SeqPlatform>(), Ok(SeqPlatform::PacBio));
        assert!("sanger".parse::<SeqPlatform>().is_err());
    }

    #[test]
    fn test_seconds_since_unparsable_start() {
        assert!((seconds_since(Some("garbage"), Utc::now())).abs() < f64::EPSILON);
    }
}
