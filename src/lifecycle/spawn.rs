//! Replacement process launch with listener inheritance.
//!
//! # Responsibilities
//! - Duplicate the serving listener's descriptor
//! - Launch the same executable with the same arguments, stdio inherited
//!   and the listener placed at [`HANDOFF_FD`]
//! - Publish the matching [`HandoffDescriptor`] in the child's environment
//!
//! # Design Decisions
//! - Every failure is returned to the caller; the current process keeps its
//!   listener and keeps serving
//! - The child is never waited on; Tokio reaps it if it exits first

use std::ffi::OsString;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use thiserror::Error;
use tokio::process::Command;

use crate::net::handoff::set_cloexec;
use crate::net::{
    extract_os_handle, HandoffDescriptor, HandoffError, ListenerHandle, HANDOFF_FD, LISTENER_ENV,
};

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("cannot hand off listener: {0}")]
    Handoff(#[from] HandoffError),

    #[error("cannot resolve current executable: {0}")]
    ResolveExecutable(#[source] io::Error),

    #[error("cannot resolve working directory: {0}")]
    WorkingDir(#[source] io::Error),

    #[error("failed to start {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Launches replacement processes that inherit the listener.
#[derive(Debug, Clone)]
pub struct ChildSpawner {
    address: String,
    listener: Arc<ListenerHandle>,
    program: Option<PathBuf>,
    args: Option<Vec<OsString>>,
    working_dir: Option<PathBuf>,
}

impl ChildSpawner {
    /// Spawner for the listener serving `address`.
    ///
    /// By default the child is this executable, run with this process's
    /// arguments from this process's working directory.
    pub fn new(address: impl Into<String>, listener: Arc<ListenerHandle>) -> Self {
        Self {
            address: address.into(),
            listener,
            program: None,
            args: None,
            working_dir: None,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    #[cfg(test)]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Start a replacement process and return its PID.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_replacement(&self) -> Result<u32, SpawnError> {
        let handle = extract_os_handle(self.listener.as_ref())?;
        let descriptor = HandoffDescriptor::encode(&self.address, &self.listener);
        let env_value = descriptor.to_env_value()?;

        let program = match &self.program {
            Some(program) => program.clone(),
            None => std::env::current_exe().map_err(SpawnError::ResolveExecutable)?,
        };
        let working_dir = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().map_err(SpawnError::WorkingDir)?,
        };
        let args = self
            .args
            .clone()
            .unwrap_or_else(|| std::env::args_os().skip(1).collect());

        tracing::debug!(
            program = %program.display(),
            working_dir = %working_dir.display(),
            listener = %descriptor.filename,
            "Spawning replacement process"
        );

        let mut command = Command::new(&program);
        command
            .args(&args)
            .current_dir(&working_dir)
            .env(LISTENER_ENV, &env_value)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let source = handle.as_raw_fd();
        // `place_listener` only calls dup2/fcntl, which are async-signal-safe.
        unsafe {
            command.pre_exec(move || place_listener(source));
        }

        let child = command.spawn().map_err(|source| SpawnError::Spawn {
            program: program.clone(),
            source,
        })?;
        let pid = child.id().unwrap_or_default();

        tracing::info!(
            pid,
            address = %descriptor.address,
            fd = descriptor.fd,
            "Spawned replacement process"
        );
        Ok(pid)
    }
}

/// Runs in the child between fork and exec.
fn place_listener(source: RawFd) -> io::Result<()> {
    if source == HANDOFF_FD {
        return set_cloexec(HANDOFF_FD, false);
    }
    // dup2 leaves close-on-exec cleared on the new slot.
    if unsafe { libc::dup2(source, HANDOFF_FD) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::create_listener;

    fn spawner() -> ChildSpawner {
        let listener = Arc::new(create_listener("127.0.0.1:0").unwrap());
        ChildSpawner::new("127.0.0.1:0", listener)
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = spawner()
            .with_program("/nonexistent/dragonfly")
            .spawn_replacement()
            .unwrap_err();
        assert!(matches!(err, SpawnError::Spawn { .. }), "{err}");
    }

    #[tokio::test]
    async fn missing_working_dir_is_spawn_error() {
        let err = spawner()
            .with_program("/bin/true")
            .with_args(Vec::<OsString>::new())
            .with_working_dir("/nonexistent/dir")
            .spawn_replacement()
            .unwrap_err();
        assert!(matches!(err, SpawnError::Spawn { .. }), "{err}");
    }

    #[tokio::test]
    async fn spawn_returns_pid() {
        let pid = spawner()
            .with_program("/bin/true")
            .with_args(Vec::<OsString>::new())
            .spawn_replacement()
            .unwrap();
        assert_ne!(pid, 0);
        assert_ne!(pid, std::process::id());
    }
}
