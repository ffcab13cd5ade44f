//! Service shims for the built-in QAAP services.

pub mod contigs_metrics;
pub mod fastqc;
pub mod quast;
pub mod reads_metrics;
pub mod unimplemented;

pub use contigs_metrics::ContigsMetricsShim;
pub use fastqc::FastQcShim;
pub use quast::QuastShim;
pub use reads_metrics::ReadsMetricsShim;
pub use unimplemented::UnimplementedShim;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use crate::domain::models::{Blackboard, Service};
use crate::domain::ports::ServiceShim;
use crate::infrastructure::workflow::builtin::{CONTIGS_METRICS, FASTQC, QUAST, READS_METRICS};
use crate::infrastructure::workflow::Workflow;
use crate::services::ShimRegistry;

/// The shim implementing a built-in service, if `name` is one.
pub fn builtin_shim(name: &str) -> Option<Arc<dyn ServiceShim>> {
    match name {
        CONTIGS_METRICS => Some(Arc::new(ContigsMetricsShim)),
        READS_METRICS => Some(Arc::new(ReadsMetricsShim)),
        QUAST => Some(Arc::new(QuastShim)),
        FASTQC => Some(Arc::new(FastQcShim)),
        _ => None,
    }
}

/// Registry for the built-in workflow.
pub fn default_registry() -> ShimRegistry {
    [CONTIGS_METRICS, READS_METRICS, QUAST, FASTQC]
        .into_iter()
        .filter_map(|name| builtin_shim(name).map(|shim| (name, shim)))
        .fold(ShimRegistry::new(), |registry, (name, shim)| {
            registry.with(name, shim)
        })
}

/// Registry for a loaded workflow. Services it declares unimplemented are
/// bound to [`UnimplementedShim`]; the rest get their built-in shim or stay
/// unbound, which [`ShimRegistry::validate`] rejects.
pub fn registry_for(workflow: &Workflow) -> ShimRegistry {
    let mut registry = ShimRegistry::new();
    for service in workflow.graph.services() {
        let shim = if workflow.unimplemented.contains(service) {
            warn!(service = %service, "service declared unimplemented, it will fail when run");
            Some(Arc::new(UnimplementedShim) as Arc<dyn ServiceShim>)
        } else {
            builtin_shim(service.as_str())
        };
        if let Some(shim) = shim {
            registry.register(service.clone(), shim);
        }
    }
    registry
}

/// Quote `value` for a POSIX shell.
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Shell snippet writing the decompressed or plain contents of `path` to stdout.
pub(crate) fn cat_any(path: &Path) -> String {
    let quoted = shell_quote(&path.display().to_string());
    format!("(gzip -dc {quoted} 2>/dev/null || cat {quoted})")
}

/// Input ids for the user's fastq files: `reads` for a single file,
/// `R1`, `R2`, ... otherwise.
pub(crate) fn fastq_inputs(blackboard: &Blackboard) -> Vec<(String, PathBuf)> {
    let paths = blackboard.fastq_paths();
    if let [single] = paths.as_slice() {
        return vec![("reads".to_string(), single.clone())];
    }
    paths
        .into_iter()
        .enumerate()
        .map(|(i, path)| (format!("R{}", i + 1), path))
        .collect()
}

/// Work directory of one job of `service`.
pub(crate) fn job_dir(service: &Service, input: Option<&str>) -> PathBuf {
    let dir = PathBuf::from(service.as_str());
    match input {
        Some(id) => dir.join(id),
        None => dir,
    }
}

/// `key<TAB>value` lines; anything else is skipped.
pub(crate) fn tab_pairs(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.lines().filter_map(|line| {
        let mut fields = line.split('\t');
        match (fields.next(), fields.next(), fields.next()) {
            (Some(key), Some(value), None) if !key.trim().is_empty() => {
                Some((key.trim(), value.trim()))
            }
            _ => None,
        }
    })
}
