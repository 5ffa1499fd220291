//! Listener acquisition: import an inherited socket or bind a new one.
//!
//! # Responsibilities
//! - Parse operator-facing addresses (`host:port`, `:port`, `unix:/path`)
//! - Import the listener described by [`LISTENER_ENV`] when present
//! - Bind a fresh listener otherwise, clearing a unix socket file left
//!   behind by a process that is no longer listening
//!
//! # Design Decisions
//! - Import is always tried before bind, so a replacement process never
//!   races its parent for the port
//! - A descriptor for a different address is a configuration error unless
//!   the acquirer was built non-strict
//! - The descriptor is consumed on first use; it can back one listener only

use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::net::handoff::{
    probe_listener, set_cloexec, HandoffDescriptor, HandoffError, SocketFamily, LISTENER_ENV,
};

/// Error type for listener acquisition.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("handoff descriptor is for {found:?}, but {expected:?} was requested")]
    AddressMismatch { expected: String, found: String },

    #[error("failed to import descriptor {fd}: {source}")]
    Import {
        fd: RawFd,
        #[source]
        source: HandoffError,
    },
}

/// A bound, listening socket owned by this process.
#[derive(Debug)]
pub enum ListenerHandle {
    Tcp(std::net::TcpListener),
    Unix(UnixListener),
}

impl ListenerHandle {
    /// Short name of the listener kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ListenerHandle::Tcp(_) => "tcp",
            ListenerHandle::Unix(_) => "unix",
        }
    }

    /// Human-readable name used in handoff descriptors and logs.
    pub fn describe(&self) -> String {
        match self {
            ListenerHandle::Tcp(l) => match l.local_addr() {
                Ok(addr) => format!("tcp:{addr}"),
                Err(_) => "tcp:unknown".to_string(),
            },
            ListenerHandle::Unix(l) => l
                .local_addr()
                .ok()
                .and_then(|addr| addr.as_pathname().map(|p| format!("unix:{}", p.display())))
                .unwrap_or_else(|| "unix:unnamed".to_string()),
        }
    }

    /// Local TCP address, if this is a TCP listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            ListenerHandle::Tcp(l) => l.local_addr().ok(),
            ListenerHandle::Unix(_) => None,
        }
    }

    /// Duplicate the handle; both copies refer to the same socket.
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(match self {
            ListenerHandle::Tcp(l) => ListenerHandle::Tcp(l.try_clone()?),
            ListenerHandle::Unix(l) => ListenerHandle::Unix(l.try_clone()?),
        })
    }
}

impl AsFd for ListenerHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match self {
            ListenerHandle::Tcp(l) => l.as_fd(),
            ListenerHandle::Unix(l) => l.as_fd(),
        }
    }
}

impl IntoRawFd for ListenerHandle {
    fn into_raw_fd(self) -> RawFd {
        match self {
            ListenerHandle::Tcp(l) => l.into_raw_fd(),
            ListenerHandle::Unix(l) => l.into_raw_fd(),
        }
    }
}

/// Parsed form of an operator-facing listen address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindAddress {
    /// `host:port`; an empty host means every IPv4 interface.
    Tcp(String),
    /// `unix:/path/to.sock`
    Unix(PathBuf),
}

impl BindAddress {
    pub fn parse(address: &str) -> Result<Self, ListenerError> {
        let invalid = || ListenerError::InvalidAddress(address.to_string());

        if let Some(path) = address.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(invalid());
            }
            return Ok(BindAddress::Unix(PathBuf::from(path)));
        }

        let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
        port.parse::<u16>().map_err(|_| invalid())?;
        if host.is_empty() {
            Ok(BindAddress::Tcp(format!("0.0.0.0:{port}")))
        } else {
            Ok(BindAddress::Tcp(address.to_string()))
        }
    }
}

/// Bind a new listener at `address`.
pub fn create_listener(address: &str) -> Result<ListenerHandle, ListenerError> {
    let bind_err = |source| ListenerError::Bind {
        address: address.to_string(),
        source,
    };

    match BindAddress::parse(address)? {
        BindAddress::Tcp(addr) => std::net::TcpListener::bind(addr.as_str())
            .map(ListenerHandle::Tcp)
            .map_err(bind_err),
        BindAddress::Unix(path) => {
            remove_stale_socket(&path).map_err(bind_err)?;
            UnixListener::bind(&path)
                .map(ListenerHandle::Unix)
                .map_err(bind_err)
        }
    }
}

/// Remove the socket file at `path` if nothing accepts connections on it.
///
/// A live listener is left alone so the bind reports the conflict.
fn remove_stale_socket(path: &Path) -> io::Result<()> {
    let Ok(metadata) = std::fs::symlink_metadata(path) else {
        return Ok(());
    };
    if !metadata.file_type().is_socket() {
        return Ok(());
    }

    match UnixStream::connect(path) {
        Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
            tracing::info!(path = %path.display(), "Removing stale unix socket");
            std::fs::remove_file(path)
        }
        _ => Ok(()),
    }
}

/// Take ownership of the inherited socket named by `descriptor`.
fn import_descriptor(descriptor: &HandoffDescriptor) -> Result<ListenerHandle, HandoffError> {
    let family = probe_listener(descriptor.fd)?;

    // Inherited slots arrive without close-on-exec; later children get the
    // socket only through the spawner's explicit dup2.
    set_cloexec(descriptor.fd, true)?;

    // The probe proved the slot is an open listening socket, and the acquirer
    // consumes its descriptor so the slot is never adopted twice.
    let owned = unsafe { OwnedFd::from_raw_fd(descriptor.fd) };
    Ok(match family {
        SocketFamily::Inet => ListenerHandle::Tcp(owned.into()),
        SocketFamily::Unix => ListenerHandle::Unix(owned.into()),
    })
}

/// Creates or imports the process's listener.
#[derive(Debug)]
pub struct ListenerAcquirer {
    descriptor: Option<String>,
    strict: bool,
}

impl ListenerAcquirer {
    /// Read the handoff descriptor from [`LISTENER_ENV`].
    pub fn from_env(strict: bool) -> Self {
        Self::with_descriptor(std::env::var(LISTENER_ENV).ok(), strict)
    }

    /// Use an explicit descriptor value instead of the environment.
    pub fn with_descriptor(descriptor: Option<String>, strict: bool) -> Self {
        Self { descriptor, strict }
    }

    /// Whether a descriptor value is still waiting to be imported.
    pub fn has_descriptor(&self) -> bool {
        self.descriptor.as_deref().is_some_and(|v| !v.is_empty())
    }

    /// Import the inherited listener for `address`, or bind a new one.
    pub fn acquire(&mut self, address: &str) -> Result<ListenerHandle, ListenerError> {
        if let Some(listener) = self.import(address)? {
            tracing::info!(
                address = %address,
                kind = listener.kind(),
                listener = %listener.describe(),
                "Imported listener file descriptor"
            );
            return Ok(listener);
        }

        let listener = create_listener(address)?;
        tracing::info!(
            address = %address,
            kind = listener.kind(),
            listener = %listener.describe(),
            "Created listener file descriptor"
        );
        Ok(listener)
    }

    fn import(&mut self, address: &str) -> Result<Option<ListenerHandle>, ListenerError> {
        let Some(raw) = self.descriptor.take().filter(|v| !v.is_empty()) else {
            return Ok(None);
        };

        let descriptor = match HandoffDescriptor::parse(&raw) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unparsable {} value", LISTENER_ENV);
                return Ok(None);
            }
        };

        if descriptor.address != address {
            if self.strict {
                return Err(ListenerError::AddressMismatch {
                    expected: address.to_string(),
                    found: descriptor.address,
                });
            }
            tracing::warn!(
                requested = %address,
                inherited = %descriptor.address,
                "Discarding handoff descriptor for a different address"
            );
            return Ok(None);
        }

        import_descriptor(&descriptor)
            .map(Some)
            .map_err(|source| ListenerError::Import {
                fd: descriptor.fd,
                source,
            })
    }
}
