//! Error types for kernel synchronization.

use std::io;

use super::message::message_type_name;

/// Result type for kernel synchronization operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the kernel or reconciling its state.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Kernel returned an error code.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel (positive).
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Kernel rejected a command sent on the command socket.
    #[error("{}: {message} (errno {errno})", request_name(.msg_type))]
    KernelCommand {
        /// Type of the request the kernel rejected.
        msg_type: u16,
        /// The errno value from the kernel (positive).
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Message was truncated.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected message length.
        expected: usize,
        /// Actual bytes available.
        actual: usize,
    },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid attribute format.
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    /// An encode would run past the end of the target buffer.
    #[error("buffer capacity exceeded: need {needed} bytes, {available} available")]
    CapacityExceeded {
        /// Bytes the append needed.
        needed: usize,
        /// Bytes left in the buffer.
        available: usize,
    },

    /// Zero-length read: the kernel channel is gone.
    #[error("{socket}: connection closed")]
    ConnectionClosed {
        /// Role label of the socket.
        socket: &'static str,
    },

    /// The sender address returned by the kernel has an unexpected size.
    #[error("{socket}: sender address length error: length {len}")]
    AddressLength {
        /// Role label of the socket.
        socket: &'static str,
        /// Length reported by recvmsg.
        len: usize,
    },

    /// No interface is bound to the given kernel index.
    #[error("no interface with index {index}")]
    UnknownInterface {
        /// The kernel interface index.
        index: u32,
    },

    /// The kernel tried to bind an interface to the reserved internal index.
    #[error("interface {name}: kernel index is the reserved internal value")]
    ReservedIndex {
        /// Interface name.
        name: String,
    },

    /// A command did not complete in time.
    #[error("{socket}: timed out waiting for kernel reply")]
    Timeout {
        /// Role label of the socket.
        socket: &'static str,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

fn request_name(msg_type: &u16) -> &'static str {
    message_type_name(*msg_type)
}

impl Error {
    /// Create a kernel error from a (negative) netlink errno value.
    pub fn from_errno(errno: i32) -> Self {
        let errno = errno.saturating_neg();
        let message = io::Error::from_raw_os_error(errno).to_string();
        Self::Kernel { errno, message }
    }

    /// Create a command failure from a (negative) netlink errno value and the
    /// type of the request that caused it.
    pub fn from_command_errno(errno: i32, msg_type: u16) -> Self {
        let errno = errno.saturating_neg();
        let message = io::Error::from_raw_os_error(errno).to_string();
        Self::KernelCommand {
            msg_type,
            errno,
            message,
        }
    }

    /// Check if this is a "not found" error (ENOENT, ENODEV, ESRCH).
    pub fn is_not_found(&self) -> bool {
        match self.errno() {
            Some(errno) => matches!(errno, libc::ENOENT | libc::ENODEV | libc::ESRCH),
            None => matches!(self, Self::UnknownInterface { .. }),
        }
    }

    /// Check if this is an "already exists" error (EEXIST).
    pub fn is_already_exists(&self) -> bool {
        self.errno() == Some(libc::EEXIST)
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        matches!(self.errno(), Some(libc::EPERM | libc::EACCES))
    }

    /// Get the errno value if this is a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } | Self::KernelCommand { errno, .. } => Some(*errno),
            _ => None,
        }
    }

    /// Faults after which the channel cannot be used again.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed { .. } | Self::AddressLength { .. }
        )
    }
}
