//! Fast Downward invocation.
//!
//! The planner is a black box: spawn it against the generated problem, kill
//! it at the hard timeout, and report stdout/stderr verbatim. Never retried
//! automatically.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::config::PlannerConfig;
use crate::error::PlanError;

/// Outcome of one planner run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PlannerOutcome {
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
    /// Action lines of the solution, in order.
    pub actions: Vec<String>,
    pub plan_length: Option<usize>,
    pub plan_cost: Option<usize>,
}

/// Run the planner on `domain` + `problem`, writing the solution (if any)
/// to `solution_path`. The working directory matters: Fast Downward drops
/// its `sas_plan` there.
pub fn run_planner(
    config: &PlannerConfig,
    domain: &Path,
    problem: &Path,
    workdir: &Path,
    solution_path: &Path,
) -> Result<PlannerOutcome, PlanError> {
    let search = config.search_command();
    tracing::info!(command = %config.command, search = %search, "running planner");

    let mut child = Command::new(&config.command)
        .arg(domain)
        .arg(problem)
        .arg("--search")
        .arg(&search)
        .current_dir(workdir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PlanError::PlannerMissing {
                    path: config.command.clone(),
                }
            } else {
                PlanError::Io { source: e }
            }
        })?;

    // Drain the pipes on background threads; a full pipe would deadlock the
    // wait loop below.
    let stdout_handle = spawn_reader(child.stdout.take());
    let stderr_handle = spawn_reader(child.stderr.take());

    let deadline = Instant::now() + Duration::from_secs(config.timeout_secs);
    let status = loop {
        match child.try_wait().map_err(|e| PlanError::Io { source: e })? {
            Some(status) => break status,
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PlanError::PlannerTimeout {
                    seconds: config.timeout_secs,
                });
            }
            None => std::thread::sleep(Duration::from_millis(100)),
        }
    };

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();
    let returncode = status.code().unwrap_or(-1);

    let mut outcome = PlannerOutcome {
        returncode,
        stdout,
        stderr,
        ..Default::default()
    };

    if returncode == 0 {
        let sas_plan = workdir.join("sas_plan");
        if sas_plan.exists() {
            std::fs::copy(&sas_plan, solution_path).map_err(|e| PlanError::Io { source: e })?;
            std::fs::remove_file(&sas_plan).map_err(|e| PlanError::Io { source: e })?;
        }
        if solution_path.exists() {
            let solution =
                std::fs::read_to_string(solution_path).map_err(|e| PlanError::Io { source: e })?;
            outcome.actions = solution
                .lines()
                .map(str::trim)
                .filter(|l| l.starts_with('('))
                .map(str::to_string)
                .collect();
        }
        outcome.plan_length = grep_metric(&outcome.stdout, "Plan length");
        outcome.plan_cost = grep_metric(&outcome.stdout, "Plan cost");
    }

    Ok(outcome)
}

fn spawn_reader<R: Read + Send + 'static>(
    source: Option<R>,
) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buffer = String::new();
        if let Some(mut source) = source {
            let _ = source.read_to_string(&mut buffer);
        }
        buffer
    })
}

/// Pull the first integer off a `"<label>: N"` planner output line.
fn grep_metric(stdout: &str, label: &str) -> Option<usize> {
    stdout
        .lines()
        .find(|line| line.contains(label))
        .and_then(|line| {
            line.chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse()
                .ok()
        })
}
