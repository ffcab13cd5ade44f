//! Job scheduling infrastructure
//!
//! - Local subprocess execution with admission control
//! - Host resource detection for unset caps

pub mod subprocess;

pub use subprocess::SubprocessScheduler;

use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

use crate::domain::models::{ResourceCaps, SchedulerConfig};

/// Resolve configured caps, filling unset CPU and memory from the host.
/// Disk and time stay unlimited unless configured.
pub fn resolve_caps(config: &SchedulerConfig) -> ResourceCaps {
    let needs_host = config.max_cpus.is_none() || config.max_mem_gb.is_none();
    let (host_cpus, host_mem_gb) = if needs_host {
        let system = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::new())
                .with_memory(MemoryRefreshKind::everything()),
        );
        #[allow(clippy::cast_precision_loss)]
        let mem_gb = system.total_memory() as f64 / 1_073_741_824.0;
        (u32::try_from(system.cpus().len()).unwrap_or(1).max(1), mem_gb)
    } else {
        (1, 0.0)
    };

    ResourceCaps {
        cpus: config.max_cpus.unwrap_or(host_cpus),
        mem_gb: config.max_mem_gb.unwrap_or(host_mem_gb),
        disk_gb: config.max_disk_gb,
        time_secs: config.max_time_secs,
    }
}
