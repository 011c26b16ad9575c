use std::path::{Path, PathBuf};
use std::process::{Child, Command as ProcessCommand, Stdio};

use tracing::{debug, info, warn};

use crate::error::{Result, StageError};

/// The VAST stage-control executable, owned for the controller's lifetime.
///
/// The pipe protocol has no shutdown handshake, so teardown is a kill.
/// Dropping a `VastProcess` kills the child if it is still running.
#[derive(Debug)]
pub struct VastProcess {
    child: Option<Child>,
    path: PathBuf,
}

impl VastProcess {
    /// Start `path` with `args`, inheriting nothing on stdin.
    pub fn spawn(path: impl AsRef<Path>, args: &[String]) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let child = ProcessCommand::new(&path)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| StageError::Process {
                path: path.clone(),
                source,
            })?;
        info!(?path, pid = child.id(), "launched stage-control process");
        Ok(Self {
            child: Some(child),
            path,
        })
    }

    /// OS process id, if the child has not been reaped yet.
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// The executable this process was started from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true while the child has not exited.
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Kill and reap the child. Safe to call more than once.
    pub fn kill(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(path = ?self.path, %status, "stage-control process already exited");
                return;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(path = ?self.path, error = %err, "cannot query stage-control process");
            }
        }
        if let Err(err) = child.kill() {
            warn!(path = ?self.path, error = %err, "failed to kill stage-control process");
        }
        match child.wait() {
            Ok(status) => info!(path = ?self.path, %status, "stage-control process stopped"),
            Err(err) => {
                warn!(path = ?self.path, error = %err, "failed to reap stage-control process");
            }
        }
    }
}

impl Drop for VastProcess {
    fn drop(&mut self) {
        self.kill();
    }
}
