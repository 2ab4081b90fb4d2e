//! Execution client: the worker pool every batch of work units runs on
//!
//! The client is a dedicated Rayon thread pool sized from the launch mode.
//! Locally it is a fixed set of single-threaded workers; under MPI or LSF the
//! pool is sized from the launcher's environment, and a missing launcher
//! environment is a bootstrap failure.

use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{error, info};

use crate::errors::{ReplotsError, Result};

/// Workers started in local mode.
pub const LOCAL_WORKERS: usize = 8;
/// Threads per worker in every mode.
pub const THREADS_PER_WORKER: usize = 1;
/// Memory budget of a single worker, 6 GB.
pub const MEMORY_PER_WORKER: u64 = 6 * 1024 * 1024 * 1024;

const MPI_SIZE_VARS: &[&str] = &["OMPI_COMM_WORLD_SIZE", "PMI_SIZE", "SLURM_NTASKS"];
const LSF_SIZE_VARS: &[&str] = &["LSB_DJOB_NUMPROC", "LSB_MAX_NUM_PROCESSORS"];

/// How the execution client is bootstrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientMode {
    #[default]
    Local,
    Mpi,
    Lsf,
}

impl fmt::Display for ClientMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Mpi => "MPI",
            Self::Lsf => "LSF",
        })
    }
}

impl FromStr for ClientMode {
    type Err = ReplotsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "mpi" => Ok(Self::Mpi),
            "lsf" => Ok(Self::Lsf),
            other => Err(ReplotsError::ClientInitialization(format!(
                "unknown client mode '{other}' (expected local, mpi or lsf)"
            ))),
        }
    }
}

fn workers_from_env(vars: &[&str], lookup: &dyn Fn(&str) -> Option<String>) -> Option<usize> {
    vars.iter().find_map(|var| {
        lookup(var)
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
    })
}

/// A started worker pool.
pub struct ExecutionClient {
    mode: ClientMode,
    workers: usize,
    threads_per_worker: usize,
    memory_per_worker: u64,
    pool: ThreadPool,
}

impl fmt::Debug for ExecutionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionClient")
            .field("mode", &self.mode)
            .field("workers", &self.workers)
            .field("threads_per_worker", &self.threads_per_worker)
            .field("memory_per_worker", &self.memory_per_worker)
            .finish()
    }
}

impl ExecutionClient {
    /// Start a client, reading launcher sizes from the process environment.
    ///
    /// `threads` overrides the local worker count; it is ignored under MPI and LSF.
    pub fn start(mode: ClientMode, threads: Option<usize>) -> Result<Self> {
        Self::start_with_env(mode, threads, &|var| std::env::var(var).ok())
    }

    /// Start a client with an explicit environment lookup.
    pub fn start_with_env(
        mode: ClientMode,
        threads: Option<usize>,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let workers = match mode {
            ClientMode::Local => threads.unwrap_or(LOCAL_WORKERS),
            ClientMode::Mpi => workers_from_env(MPI_SIZE_VARS, lookup).ok_or_else(|| {
                ReplotsError::ClientInitialization(format!(
                    "MPI launcher environment not found (checked {})",
                    MPI_SIZE_VARS.join(", ")
                ))
            })?,
            ClientMode::Lsf => workers_from_env(LSF_SIZE_VARS, lookup).ok_or_else(|| {
                ReplotsError::ClientInitialization(format!(
                    "LSF job environment not found (checked {})",
                    LSF_SIZE_VARS.join(", ")
                ))
            })?,
        };
        if workers == 0 {
            return Err(ReplotsError::ClientInitialization(
                "worker count must be at least 1".to_string(),
            ));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers * THREADS_PER_WORKER)
            .thread_name(|i| format!("replots-worker-{i}"))
            .build()
            .map_err(|e| {
                ReplotsError::ClientInitialization(format!(
                    "failed to start {workers} workers: {e}"
                ))
            })?;

        info!(%mode, workers, threads_per_worker = THREADS_PER_WORKER, "execution client started");

        Ok(Self {
            mode,
            workers,
            threads_per_worker: THREADS_PER_WORKER,
            memory_per_worker: MEMORY_PER_WORKER,
            pool,
        })
    }

    pub fn mode(&self) -> ClientMode {
        self.mode
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Total memory budget across all workers, in bytes.
    pub fn memory_limit(&self) -> u64 {
        self.memory_per_worker * self.workers as u64
    }

    /// Run `op` inside the client's pool so nested parallel iterators use it.
    pub fn install<R, OP>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    /// Run every unit concurrently and collect the results in unit order.
    ///
    /// All units run to completion; failures are gathered into
    /// [`ReplotsError::BatchFailed`].
    pub fn run_batch<U, R, F>(&self, units: &[U], work: F) -> Result<Vec<R>>
    where
        U: Sync,
        R: Send,
        F: Fn(&U) -> Result<R> + Sync + Send,
    {
        let outcomes: Vec<Result<R>> = self.pool.install(|| units.par_iter().map(&work).collect());

        let total = outcomes.len();
        let mut done = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(value) => done.push(value),
                Err(e) => {
                    error!(error = %e, "work unit failed");
                    failures.push(e);
                }
            }
        }

        if failures.is_empty() {
            Ok(done)
        } else {
            Err(ReplotsError::BatchFailed { total, failures })
        }
    }

    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            mode: self.mode,
            workers: self.workers,
            threads_per_worker: self.threads_per_worker,
            memory_limit: self.memory_limit(),
            available_cores: num_cpus::get(),
        }
    }
}

/// Summary of a running client.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub mode: ClientMode,
    pub workers: usize,
    pub threads_per_worker: usize,
    pub memory_limit: u64,
    pub available_cores: usize,
}

impl ClientInfo {
    /// Print client information
    pub fn print_info(&self) {
        println!("📊 Execution client:");
        println!("   Mode: {}", self.mode);
        println!(
            "   Workers: {} × {} thread(s)",
            self.workers, self.threads_per_worker
        );
        println!(
            "   Memory limit: {:.1} GB",
            self.memory_limit as f64 / (1024.0 * 1024.0 * 1024.0)
        );
        println!("   Available CPU cores: {}", self.available_cores);
    }
}
