//! Local subprocess scheduler.
//!
//! Every job runs in its own process group inside its own work directory,
//! with stdout and stderr captured to files there. A job waits in `PENDING`
//! until its CPU, memory and disk requests fit in what the running jobs leave
//! free, and is killed when it exceeds its own time budget or the overall
//! budget of the run.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::domain::errors::SchedulerError;
use crate::domain::models::{JobSpec, ResourceCaps};
use crate::domain::ports::{Job, JobControl, Scheduler};

/// Lines of stderr quoted in the error of a failed job.
const STDERR_TAIL_LINES: usize = 5;

/// Memory and disk are accounted in whole megabytes so that releasing
/// reservations always restores the pool exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Request {
    cpus: u32,
    mem_mb: u64,
    disk_mb: u64,
}

#[derive(Debug)]
struct Available {
    cpus: u32,
    mem_mb: u64,
    disk_mb: Option<u64>,
}

/// Whole megabytes in `gb`, rounded up. Negative and NaN become zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn megabytes(gb: f64) -> u64 {
    if gb.is_nan() || gb <= 0.0 {
        return 0;
    }
    // float to int casts saturate
    (gb * 1024.0).ceil() as u64
}

/// `now + secs`, or `None` when that is past what `Instant` can represent.
fn deadline_after(secs: u64) -> Option<Instant> {
    Instant::now().checked_add(Duration::from_secs(secs))
}

/// Shared accounting of free resources.
#[derive(Debug)]
struct ResourcePool {
    available: Mutex<Available>,
    released: Notify,
}

impl ResourcePool {
    fn new(caps: &ResourceCaps) -> Self {
        Self {
            available: Mutex::new(Available {
                cpus: caps.cpus,
                mem_mb: megabytes(caps.mem_gb),
                disk_mb: caps.disk_gb.map(megabytes),
            }),
            released: Notify::new(),
        }
    }

    fn try_reserve(&self, req: Request) -> bool {
        let mut free = self.available.lock().unwrap_or_else(PoisonError::into_inner);
        let disk_fits = free.disk_mb.map_or(true, |d| req.disk_mb <= d);
        if req.cpus <= free.cpus && req.mem_mb <= free.mem_mb && disk_fits {
            free.cpus -= req.cpus;
            free.mem_mb -= req.mem_mb;
            if let Some(d) = free.disk_mb.as_mut() {
                *d -= req.disk_mb;
            }
            true
        } else {
            false
        }
    }

    fn release(&self, req: Request) {
        {
            let mut free = self.available.lock().unwrap_or_else(PoisonError::into_inner);
            free.cpus += req.cpus;
            free.mem_mb += req.mem_mb;
            if let Some(d) = free.disk_mb.as_mut() {
                *d += req.disk_mb;
            }
        }
        self.released.notify_waiters();
    }

    /// Wait until `req` fits. `false` when `deadline` passes first.
    async fn acquire(&self, req: Request, deadline: Option<Instant>) -> bool {
        loop {
            let released = self.released.notified();
            if self.try_reserve(req) {
                return true;
            }
            match deadline {
                Some(at) => {
                    if timeout_at(at, released).await.is_err() {
                        return false;
                    }
                }
                None => released.await,
            }
        }
    }
}

/// Runs jobs as local processes on the current tokio runtime.
#[derive(Debug)]
pub struct SubprocessScheduler {
    base_dir: PathBuf,
    caps: ResourceCaps,
    pool: Arc<ResourcePool>,
    deadline: Option<Instant>,
    names: HashSet<String>,
    runtime: Handle,
}

impl SubprocessScheduler {
    /// Create a scheduler rooted at `base_dir`. The overall time budget in
    /// `caps` starts counting now; a budget too large to represent is
    /// treated as unlimited.
    pub fn new(base_dir: impl Into<PathBuf>, caps: ResourceCaps) -> Result<Self, SchedulerError> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        let deadline = caps.time_secs.and_then(deadline_after);
        info!(
            cpus = caps.cpus,
            mem_gb = caps.mem_gb,
            disk_gb = ?caps.disk_gb,
            time_secs = ?caps.time_secs,
            "subprocess scheduler ready"
        );
        Ok(Self {
            base_dir: base_dir.into(),
            caps,
            pool: Arc::new(ResourcePool::new(&caps)),
            deadline,
            names: HashSet::new(),
            runtime,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Requests larger than a cap are clamped to it so they can still run.
    fn clamp(&self, spec: &JobSpec) -> Request {
        let disk_mb = megabytes(spec.disk_gb);
        Request {
            cpus: spec.cpus.min(self.caps.cpus),
            mem_mb: megabytes(spec.mem_gb).min(megabytes(self.caps.mem_gb)),
            disk_mb: self
                .caps
                .disk_gb
                .map_or(disk_mb, |cap| disk_mb.min(megabytes(cap))),
        }
    }
}

impl Scheduler for SubprocessScheduler {
    fn schedule_job(
        &mut self,
        name: &str,
        spec: JobSpec,
        work_dir: &Path,
    ) -> Result<Job, SchedulerError> {
        if spec.command.trim().is_empty() {
            return Err(SchedulerError::InvalidSpec {
                job: name.to_string(),
                reason: "command is empty".to_string(),
            });
        }
        if !self.names.insert(name.to_string()) {
            return Err(SchedulerError::DuplicateJob(name.to_string()));
        }

        let dir = self.base_dir.join(work_dir);
        std::fs::create_dir_all(&dir).map_err(|source| SchedulerError::WorkDir {
            path: dir.display().to_string(),
            source,
        })?;

        let request = self.clamp(&spec);
        let run = Run {
            name: name.to_string(),
            spec: spec.clone(),
            dir: dir.clone(),
            request,
            deadline: self.deadline,
        };
        let (job, control) = Job::channel(name, spec, dir);
        debug!(job = name, command = %job.spec().command_line(), "job queued");
        self.runtime
            .spawn(supervise(run, control, Arc::clone(&self.pool)));
        Ok(job)
    }

    fn caps(&self) -> ResourceCaps {
        self.caps
    }
}

/// Everything the supervising task needs about one job.
struct Run {
    name: String,
    spec: JobSpec,
    dir: PathBuf,
    request: Request,
    /// Overall budget of the run; bounds both queueing and running.
    deadline: Option<Instant>,
}

impl Run {
    /// Deadline once the process is running: its own budget, counted from
    /// start, bounded by the overall budget.
    fn run_deadline(&self) -> Option<Instant> {
        let secs = self.spec.time_secs;
        let own = if secs > 0 { deadline_after(secs) } else { None };
        match (own, self.deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

async fn supervise(run: Run, control: JobControl, pool: Arc<ResourcePool>) {
    if !pool.acquire(run.request, run.deadline).await {
        warn!(job = %run.name, "job timed out waiting for resources");
        control.fail("timed out waiting for resources");
        return;
    }

    control.set_running();
    info!(job = %run.name, cpus = run.request.cpus, mem_mb = run.request.mem_mb, "job started");
    let outcome = execute(&run).await;
    pool.release(run.request);

    match outcome {
        Ok(()) => {
            info!(job = %run.name, "job completed");
            control.complete();
        }
        Err(message) => {
            warn!(job = %run.name, error = %message, "job failed");
            control.fail(message);
        }
    }
}

async fn execute(run: &Run) -> Result<(), String> {
    let stdout = File::create(run.dir.join("stdout"))
        .map_err(|e| format!("cannot create stdout file: {e}"))?;
    let stderr = File::create(run.dir.join("stderr"))
        .map_err(|e| format!("cannot create stderr file: {e}"))?;

    let mut child = Command::new(&run.spec.command)
        .args(&run.spec.args)
        .current_dir(&run.dir)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("failed to start {}: {e}", run.spec.command))?;
    let pid = child.id();

    let status: ExitStatus = match run.run_deadline() {
        Some(at) => match timeout_at(at, child.wait()).await {
            Ok(waited) => waited.map_err(|e| format!("failed to wait for job: {e}"))?,
            Err(_) => {
                kill_group(pid);
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err("timed out".to_string());
            }
        },
        None => child
            .wait()
            .await
            .map_err(|e| format!("failed to wait for job: {e}"))?,
    };

    if status.success() {
        Ok(())
    } else {
        let tail = stderr_tail(&run.dir.join("stderr"));
        if tail.is_empty() {
            Err(format!("{} exited with {status}", run.spec.command))
        } else {
            Err(format!("{} exited with {status}: {tail}", run.spec.command))
        }
    }
}

/// Kill the whole process group so pipelines started through `sh -c` die too.
fn kill_group(pid: Option<u32>) {
    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    if let Err(err) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        debug!(pid, error = %err, "process group already gone");
    }
}

fn stderr_tail(path: &Path) -> String {
    let Ok(text) = std::fs::read_to_string(path) else {
        return String::new();
    };
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}
