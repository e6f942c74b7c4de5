//! Worker process lifecycle: spawn, graceful terminate (SIGTERM, escalating
//! to SIGKILL), and the in-memory handle map tying a session id to a live
//! child process.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use muster_core::{Error, Result, SessionId};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tokio::process::{Child, Command};

/// A live worker process tracked by the supervisor.
struct WorkerHandle {
    child: Child,
    pid: i64,
}

/// Owns the `session_id -> process` mapping. All access goes through a
/// single mutex — the command server processes one connection at a time
/// (see `muster-server::server`), so concurrent commands never contend for
/// it; the mutex exists for `Send + Sync` across the handle, not for
/// cross-command contention.
pub struct ProcessSupervisor {
    handles: Mutex<HashMap<SessionId, WorkerHandle>>,
    worker_binary: PathBuf,
    db_path: String,
    stop_timeout: Duration,
}

impl ProcessSupervisor {
    #[must_use]
    pub fn new(worker_binary: PathBuf, db_path: String, stop_timeout: Duration) -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            worker_binary,
            db_path,
            stop_timeout,
        }
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.handles.lock().len()
    }

    /// Spawns a worker for `session_id` over the two payload blobs, with an
    /// optional deadline (`None` = run forever). Returns the OS pid.
    pub async fn spawn(
        &self,
        session_id: SessionId,
        blob_a: &[u8],
        blob_b: &[u8],
        deadline: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<i64> {
        let mut command = Command::new(&self.worker_binary);
        command
            .arg("--session-id")
            .arg(session_id.get().to_string())
            .arg("--db-path")
            .arg(&self.db_path)
            .arg("--blob-a")
            .arg(base64::Engine::encode(&base64::engine::general_purpose::STANDARD, blob_a))
            .arg("--blob-b")
            .arg(base64::Engine::encode(&base64::engine::general_purpose::STANDARD, blob_b))
            .kill_on_drop(true);
        if let Some(deadline) = deadline {
            command.arg("--deadline").arg(deadline.to_rfc3339());
        }

        let child = command
            .spawn()
            .map_err(|err| Error::SpawnFailure(err.to_string()))?;
        let pid = i64::from(child.id().ok_or_else(|| {
            Error::SpawnFailure("child exited before pid could be read".to_string())
        })?);

        self.handles
            .lock()
            .insert(session_id, WorkerHandle { child, pid });
        metrics::gauge!("muster_active_workers").set(self.active_count() as f64);
        tracing::info!(session_id = session_id.get(), pid, "spawned worker");
        Ok(pid)
    }

    /// Sends SIGTERM and waits up to `stop_timeout`; escalates to SIGKILL if
    /// the process hasn't exited by then. No-op if the session has no
    /// tracked handle (already exited or never spawned by this process).
    pub async fn terminate(&self, session_id: SessionId) {
        let handle = self.handles.lock().remove(&session_id);
        let Some(mut handle) = handle else {
            return;
        };

        let pid = Pid::from_raw(handle.pid as i32);
        if signal::kill(pid, Signal::SIGTERM).is_err() {
            // Already exited between removal and signaling; nothing left to do.
            return;
        }

        let waited = tokio::time::timeout(self.stop_timeout, handle.child.wait()).await;
        if waited.is_err() {
            tracing::warn!(session_id = session_id.get(), pid = handle.pid, "SIGTERM timed out, sending SIGKILL");
            let _ = handle.child.kill().await;
        }
        metrics::gauge!("muster_active_workers").set(self.active_count() as f64);
    }

    /// Removes and forgets any handle whose process has already exited on
    /// its own (normal completion at the worker's deadline). The worker is
    /// responsible for writing its own terminal status before exiting.
    pub fn reap_exited(&self) {
        let mut handles = self.handles.lock();
        handles.retain(|session_id, handle| match handle.child.try_wait() {
            Ok(Some(_)) => {
                tracing::debug!(session_id = session_id.get(), "worker exited on its own");
                false
            }
            Ok(None) => true,
            Err(_) => false,
        });
        drop(handles);
        metrics::gauge!("muster_active_workers").set(self.active_count() as f64);
    }

    #[must_use]
    pub fn is_tracked(&self, session_id: SessionId) -> bool {
        self.handles.lock().contains_key(&session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn true_binary() -> PathBuf {
        PathBuf::from("/usr/bin/true")
    }

    #[tokio::test]
    async fn spawn_tracks_handle() {
        let supervisor = ProcessSupervisor::new(true_binary(), ":memory:".to_string(), Duration::from_secs(1));
        let pid = supervisor
            .spawn(SessionId(1), b"a", b"b", None)
            .await
            .unwrap();
        assert!(pid > 0);
        assert!(supervisor.is_tracked(SessionId(1)));
    }

    #[tokio::test]
    async fn reap_exited_drops_finished_handle() {
        let supervisor = ProcessSupervisor::new(true_binary(), ":memory:".to_string(), Duration::from_secs(1));
        supervisor.spawn(SessionId(1), b"a", b"b", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        supervisor.reap_exited();
        assert!(!supervisor.is_tracked(SessionId(1)));
    }

    #[tokio::test]
    async fn terminate_missing_handle_is_noop() {
        let supervisor = ProcessSupervisor::new(true_binary(), ":memory:".to_string(), Duration::from_secs(1));
        supervisor.terminate(SessionId(42)).await;
    }

    #[tokio::test]
    async fn spawn_missing_binary_errors() {
        let supervisor =
            ProcessSupervisor::new(PathBuf::from("/nonexistent/binary"), ":memory:".to_string(), Duration::from_secs(1));
        let err = supervisor.spawn(SessionId(1), b"a", b"b", None).await.unwrap_err();
        assert!(matches!(err, Error::SpawnFailure(_)));
    }
}
