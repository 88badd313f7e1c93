//! `kslurm` is a set of front-ends to the SLURM workload manager.
//!
//! Each tool turns a terse, order-insensitive argument list into a SLURM command line.
//! Resources are recognised by their shape rather than by flags: `07:23` is a time, `16G` is memory, `3` is a
//! cpu count, and `gpu` requests a gpu.
//! The first argument which is none of these starts the command to run.
//!
//! ```console
//! $ kbatch 07:23 gpu 3 -j Regular -- ./script.sh
//! $ krun 1-00:00 16G ls /tmp
//! $ kslurm config account.cpu def-lab
//! $ kapp pull docker://akhanf/hippunfold:latest -a hippunfold
//! ```
//!
//! The tools:
//! * `kbatch`: submit a command to the batch queue (`sbatch`).
//! * `krun`: run a command in a new allocation (`srun`), or open an interactive one (`salloc`).
//! * `kjupyter`: start Jupyter Lab in a batch job, follow its log, and cancel the job on Ctrl-C.
//! * `kapp`: pull, alias, and run container images.
//! * `kpy`: save and restore python virtual environments.
//! * `kslurm`: read & write settings, and list the job templates.
//!
//! Argument matching and dispatch is done by [`kslurm_args`]; this crate holds the SLURM domain and the commands.
//!
//! # State
//! Settings are read from `<config dir>/kslurm/config.json`, cached lookups live under `<cache dir>/kslurm`, and
//! images & saved environments under `<data dir>/kslurm`.
//! Setting `KSLURM_HOME` moves all three under one root.
//!
//! # Logging
//! Diagnostics go to standard error, filtered by `KSLURM_LOG` (ex: `KSLURM_LOG=debug`); the default is `warn`.
//!
//! # Features
//! * `tracing_debug`: Emit `tracing` debug events from argument matching.
pub mod cache;
pub mod cli;
pub mod config;
pub mod container;
pub mod env;
pub mod logging;
pub mod shell;
pub mod slurm;
pub mod venv;

#[cfg(test)]
#[macro_use]
extern crate assert_matches;
