//! Listener handoff: descriptor extraction and encoding.
//!
//! # Responsibilities
//! - Extract a duplicate OS descriptor from a serving listener
//! - Describe that descriptor in a form that survives exec (environment JSON)
//! - Probe inherited descriptors before they are trusted as listeners
//!
//! # Protocol
//! ```text
//! parent                                   child
//!   extract_os_handle(listener) ──dup2──▶  fd 3
//!   HandoffDescriptor { fd: 3 } ──env───▶  LISTENER={"address":..,"fd":3,..}
//! ```
//!
//! # Design Decisions
//! - The descriptor slot is a protocol constant shared with the spawner,
//!   never read from the parent's file table
//! - Only stream sockets in listening state can be handed off

use std::io;
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::listener::ListenerHandle;

/// Environment variable carrying the JSON-encoded [`HandoffDescriptor`].
pub const LISTENER_ENV: &str = "LISTENER";

/// Descriptor slot the listener occupies in the child: right after stdio.
pub const HANDOFF_FD: RawFd = 3;

/// Errors raised while extracting or describing a listener descriptor.
#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("unsupported listener: {0}")]
    UnsupportedListener(String),

    #[error("descriptor {0} is not open in this process")]
    NotOpen(RawFd),

    #[error("descriptor I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode handoff descriptor: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Everything a replacement process needs to rebuild the listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffDescriptor {
    /// Logical bind address, exactly as requested by the operator.
    pub address: String,
    /// Slot the descriptor occupies in the receiving process.
    pub fd: RawFd,
    /// Diagnostic name of the socket.
    pub filename: String,
}

impl HandoffDescriptor {
    /// Describe `listener` for a child that will find it at [`HANDOFF_FD`].
    pub fn encode(address: &str, listener: &ListenerHandle) -> Self {
        Self {
            address: address.to_string(),
            fd: HANDOFF_FD,
            filename: listener.describe(),
        }
    }

    /// Serialize into the value stored under [`LISTENER_ENV`].
    pub fn to_env_value(&self) -> Result<String, HandoffError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a value previously produced by [`HandoffDescriptor::to_env_value`].
    pub fn parse(value: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(value)
    }
}

/// Address family of a socket descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketFamily {
    Inet,
    Unix,
}

/// Duplicate the OS descriptor behind `listener`.
///
/// The duplicate has close-on-exec set, so it only reaches a child through an
/// explicit `dup2`. Anything that is not a listening stream socket (datagram
/// sockets, regular files, connected streams) is rejected.
pub fn extract_os_handle<L: AsFd>(listener: &L) -> Result<OwnedFd, HandoffError> {
    let fd = listener.as_fd();
    probe_listener(fd.as_raw_fd())?;
    Ok(fd.try_clone_to_owned()?)
}

/// Verify that `fd` is an open, listening stream socket.
pub(crate) fn probe_listener(fd: RawFd) -> Result<SocketFamily, HandoffError> {
    let sock_type = socket_option(fd, libc::SO_TYPE).map_err(|e| match e.raw_os_error() {
        Some(libc::EBADF) => HandoffError::NotOpen(fd),
        Some(libc::ENOTSOCK) => {
            HandoffError::UnsupportedListener(format!("descriptor {fd} is not a socket"))
        }
        _ => HandoffError::Io(e),
    })?;

    if sock_type != libc::SOCK_STREAM {
        return Err(HandoffError::UnsupportedListener(format!(
            "descriptor {fd} is not a stream socket (type {sock_type})"
        )));
    }

    if socket_option(fd, libc::SO_ACCEPTCONN)? == 0 {
        return Err(HandoffError::UnsupportedListener(format!(
            "descriptor {fd} is not listening"
        )));
    }

    match socket_family(fd)? as libc::c_int {
        libc::AF_INET | libc::AF_INET6 => Ok(SocketFamily::Inet),
        libc::AF_UNIX => Ok(SocketFamily::Unix),
        other => Err(HandoffError::UnsupportedListener(format!(
            "descriptor {fd} has address family {other}"
        ))),
    }
}

/// Set or clear close-on-exec.
///
/// Only calls `fcntl`, so it is safe to use between fork and exec.
pub(crate) fn set_cloexec(fd: RawFd, enabled: bool) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    let flags = if enabled {
        flags | libc::FD_CLOEXEC
    } else {
        flags & !libc::FD_CLOEXEC
    };
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn socket_option(fd: RawFd, option: libc::c_int) -> io::Result<libc::c_int> {
    let mut value: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            option,
            &mut value as *mut libc::c_int as *mut libc::c_void,
            &mut len,
        )
    };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(value)
}

fn socket_family(fd: RawFd) -> io::Result<libc::sa_family_t> {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockname(
            fd,
            &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr,
            &mut len,
        )
    };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(storage.ss_family)
}
