//! The QAAP workflow compiled into the binary.

use crate::domain::errors::DomainResult;
use crate::domain::models::{all, opt, DependencyGraph, Param, Service};

pub const PARAM_READS: &str = "reads";
pub const PARAM_CONTIGS: &str = "contigs";
pub const PARAM_REFERENCE: &str = "reference";

pub const CONTIGS_METRICS: &str = "ContigsMetrics";
pub const READS_METRICS: &str = "ReadsMetrics";
pub const QUAST: &str = "Quast";
pub const FASTQC: &str = "FastQC";

/// Target requested when the user names none.
pub const DEFAULT_TARGET: &str = "DEFAULT";

/// Every service runs when its inputs are present; none of them is required.
pub fn qaap_graph() -> DomainResult<DependencyGraph> {
    DependencyGraph::builder()
        .param(PARAM_READS)
        .param(PARAM_CONTIGS)
        .param(PARAM_REFERENCE)
        .target(
            DEFAULT_TARGET,
            all([
                opt(Service::new(CONTIGS_METRICS)),
                opt(Service::new(READS_METRICS)),
                opt(Service::new(QUAST)),
                opt(Service::new(FASTQC)),
            ]),
        )
        .service(READS_METRICS, Param::new(PARAM_READS))
        .service(CONTIGS_METRICS, Param::new(PARAM_CONTIGS))
        .service(FASTQC, Param::new(PARAM_READS))
        .service(
            QUAST,
            all([
                Param::new(PARAM_CONTIGS).into(),
                opt(Param::new(PARAM_REFERENCE)),
            ]),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Target, UserTarget};

    #[test]
    fn test_builtin_graph_is_valid() {
        let graph = qaap_graph().unwrap();
        let services: Vec<&str> = graph.services().map(Service::as_str).collect();
        assert_eq!(services, vec![CONTIGS_METRICS, FASTQC, QUAST, READS_METRICS]);
        assert_eq!(graph.params().count(), 3);
        assert!(graph.contains(&Target::from(UserTarget::new(DEFAULT_TARGET))));
    }
}
