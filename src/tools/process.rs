//! Tool Process Lifecycle
//!
//! Owns the external tool-serving process: spawn with piped stdio, state
//! tracking, and teardown. Exactly one `ToolProcess` lives inside each
//! `ToolClient`; requests may only be sent while it is `Running`.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

/// Lifecycle states of the tool process.
///
/// `Stopped` and `Crashed` are terminal until an explicit new `start()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    NotStarted,
    Starting,
    Running,
    Stopped,
    Crashed,
}

/// Snapshot of the process state for status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStatus {
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub uptime_seconds: Option<u64>,
}

/// Stdio handles for a freshly spawned process, tagged with the spawn
/// generation so a reader task outliving its process cannot act on a
/// successor's behalf.
pub struct SpawnedIo {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub generation: u64,
}

/// Manages the external tool process handle.
pub struct ToolProcess {
    state: ProcessState,
    child: Option<Child>,
    pid: Option<u32>,
    started_at: Option<Instant>,
    generation: u64,
}

impl ToolProcess {
    pub fn new() -> Self {
        Self {
            state: ProcessState::NotStarted,
            child: None,
            pid: None,
            started_at: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ProcessState::Running
    }

    /// Spawn the executable with piped stdin/stdout.
    ///
    /// Returns `Ok(None)` if the process is already running (a second
    /// concurrent `start()` must not produce a second live process).
    /// stderr is inherited so the tool's own diagnostics reach the
    /// operator's terminal.
    pub fn spawn(
        &mut self,
        executable: &str,
        args: &[String],
        working_dir: Option<&Path>,
    ) -> io::Result<Option<SpawnedIo>> {
        if matches!(self.state, ProcessState::Starting | ProcessState::Running) {
            debug!(executable = %executable, "Tool process already running, spawn skipped");
            return Ok(None);
        }

        let previous = self.state;
        self.state = ProcessState::Starting;

        let mut cmd = Command::new(executable);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                self.state = previous;
                return Err(e);
            }
        };

        let handles = child.stdin.take().zip(child.stdout.take());
        let (stdin, stdout) = match handles {
            Some(pair) => pair,
            None => {
                self.state = previous;
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    "tool process stdio unavailable",
                ));
            }
        };

        self.pid = child.id();
        self.child = Some(child);
        self.started_at = Some(Instant::now());
        self.state = ProcessState::Running;
        self.generation += 1;

        info!(executable = %executable, pid = ?self.pid, "Started tool process");
        Ok(Some(SpawnedIo {
            stdin,
            stdout,
            generation: self.generation,
        }))
    }

    /// Transition to `Stopped` and hand back the child for termination.
    ///
    /// Idempotent: returns `None` when there is nothing left to kill.
    pub fn begin_stop(&mut self) -> Option<Child> {
        let child = self.child.take();
        if self.state != ProcessState::NotStarted {
            self.state = ProcessState::Stopped;
        }
        self.started_at = None;
        self.pid = None;
        child
    }

    /// Record an unexpected exit observed on the output stream.
    ///
    /// Only the `Running` process of the same spawn generation can crash;
    /// a process being stopped on purpose keeps its `Stopped` state, and a
    /// stale reader from a previous generation cannot touch a successor.
    /// Returns the child (if still held) so the caller can reap it and
    /// log the exit status.
    pub fn mark_crashed(&mut self, generation: u64) -> Option<Child> {
        if self.state != ProcessState::Running || self.generation != generation {
            return None;
        }
        self.state = ProcessState::Crashed;
        self.started_at = None;
        self.child.take()
    }

    pub fn status(&self) -> ProcessStatus {
        ProcessStatus {
            state: self.state,
            pid: self.pid,
            uptime_seconds: self.started_at.map(|s| s.elapsed().as_secs()),
        }
    }
}

impl Default for ToolProcess {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let proc = ToolProcess::new();
        assert_eq!(proc.state(), ProcessState::NotStarted);
        assert!(!proc.is_running());
        assert!(proc.status().pid.is_none());
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let mut proc = ToolProcess::new();
        assert!(proc.begin_stop().is_none());
        assert_eq!(proc.state(), ProcessState::NotStarted);
    }

    #[test]
    fn test_crash_only_from_running() {
        let mut proc = ToolProcess::new();
        assert!(proc.mark_crashed(1).is_none());
        assert_eq!(proc.state(), ProcessState::NotStarted);
    }

    #[tokio::test]
    async fn test_spawn_failure_restores_state() {
        let mut proc = ToolProcess::new();
        let result = proc.spawn("/nonexistent/definitely-not-a-binary", &[], None);
        assert!(result.is_err());
        assert_eq!(proc.state(), ProcessState::NotStarted);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_and_stop() {
        let mut proc = ToolProcess::new();
        let io = proc
            .spawn("cat", &[], None)
            .expect("cat should spawn")
            .expect("first spawn returns handles");
        assert!(proc.is_running());
        assert!(proc.status().pid.is_some());

        // Second spawn while running is refused.
        assert!(proc.spawn("cat", &[], None).unwrap().is_none());

        drop(io);
        let mut child = proc.begin_stop().expect("child handle");
        let _ = child.start_kill();
        let _ = child.wait().await;
        assert_eq!(proc.state(), ProcessState::Stopped);
        assert!(proc.begin_stop().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stale_generation_cannot_crash_successor() {
        let mut proc = ToolProcess::new();
        let first = proc.spawn("cat", &[], None).unwrap().unwrap();
        let old_generation = first.generation;
        drop(first);
        if let Some(mut child) = proc.begin_stop() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }

        let second = proc.spawn("cat", &[], None).unwrap().unwrap();
        assert!(second.generation > old_generation);

        // A reader from the stopped process observing EOF must not touch
        // the replacement.
        assert!(proc.mark_crashed(old_generation).is_none());
        assert!(proc.is_running());

        drop(second);
        if let Some(mut child) = proc.begin_stop() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}
