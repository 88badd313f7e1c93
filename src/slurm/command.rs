use crate::shell::{join, single_quoted};
use crate::slurm::args::Resources;

/// A bash script running `lines`.
pub fn batch_script<S: AsRef<str>>(lines: &[S]) -> String {
    let mut script = vec!["#!/bin/bash"];
    script.extend(lines.iter().map(|line| line.as_ref()));
    script.join("\n")
}

/// Submit `script` to the batch queue: `echo <script> | sbatch <flags>`.
pub fn sbatch(resources: &Resources, script: &str) -> String {
    format!("echo {} | sbatch {}", single_quoted(script), resources.flags())
}

/// Run `command` in a new allocation: `srun <flags> <command>`.
pub fn srun(resources: &Resources, command: &[String]) -> String {
    format!("srun {} {}", resources.flags(), join(command))
}

/// Open an interactive allocation: `salloc <flags>`.
pub fn salloc(resources: &Resources) -> String {
    format!("salloc {}", resources.flags())
}

/// The job id printed by `sbatch --parsable` (`<id>[;<cluster>]`).
pub fn parse_job_id(stdout: &str) -> Option<u64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.split(';').next())
        .and_then(|id| id.trim().parse().ok())
}
