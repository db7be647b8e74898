//! 9P error representations.
//!
//! Since 9P2000.L, errors are represented as errno values rather than the
//! strings older 9P used. The error strings are kept around in
//! [`string`] for interop with the legacy wire format.

use std::io;
use std::io::ErrorKind::*;

use nix::errno::Errno;

fn errno_from_ioerror(e: &io::Error) -> Errno {
    e.raw_os_error().map(Errno::from_raw).unwrap_or(match e.kind() {
        NotFound => errno::ENOENT,
        PermissionDenied => errno::EPERM,
        ConnectionRefused => errno::ECONNREFUSED,
        ConnectionReset => errno::ECONNRESET,
        ConnectionAborted => errno::ECONNABORTED,
        NotConnected => errno::ENOTCONN,
        AddrInUse => errno::EADDRINUSE,
        AddrNotAvailable => errno::EADDRNOTAVAIL,
        BrokenPipe => errno::EPIPE,
        AlreadyExists => errno::EALREADY,
        WouldBlock => errno::EAGAIN,
        InvalidInput => errno::EINVAL,
        InvalidData => errno::EINVAL,
        TimedOut => errno::ETIMEDOUT,
        WriteZero => errno::EAGAIN,
        Interrupted => errno::EINTR,
        UnexpectedEof => errno::ECONNRESET,
        _ => errno::EIO,
    })
}

/// Error taxonomy shared by the client and server engines.
///
/// `errno()` always resolves to a concrete POSIX errno so callers on either
/// side of the wire can act on it without matching variants.
#[derive(Debug)]
pub enum Error {
    /// I/O failed beneath the codec. Fatal for the connection.
    Transport(io::Error),
    /// The decoder rejected a frame, or an unexpected response type arrived.
    Protocol(String),
    /// `RlError`/`RError` from the peer, carrying its errno unchanged.
    Remote(Errno),
    /// Caller violated a precondition (oversize string, walk fanout, closed fid).
    InvalidArgument(String),
    /// The in-flight request's waiter was released by a flush or shutdown.
    Canceled,
    /// Allocator exhaustion (tag pool or fid pool).
    Alloc,
}

impl Error {
    /// Get the errno representation of this error.
    pub fn errno(&self) -> Errno {
        match self {
            Error::Transport(e) => errno_from_ioerror(e),
            Error::Protocol(_) => errno::EPROTO,
            Error::Remote(e) => *e,
            Error::InvalidArgument(_) => errno::EINVAL,
            Error::Canceled => errno::EINTR,
            Error::Alloc => errno::ENOMEM,
        }
    }

    /// Construct a `Remote` error from an errno. Named to read naturally at
    /// call sites as `Error::No(EBADF)`.
    #[allow(non_snake_case)]
    pub fn No(errno: Errno) -> Error {
        Error::Remote(errno)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "transport error: {e}"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::Remote(e) => write!(f, "remote error: {e}"),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::Canceled => write!(f, "request canceled"),
            Error::Alloc => write!(f, "allocator exhausted"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Transport(e)
    }
}

impl From<Errno> for Error {
    fn from(e: Errno) -> Self {
        Error::Remote(e)
    }
}

/// Errno, error numbers.
pub mod errno {
    pub use nix::errno::Errno::*;
}

/// 9P error strings (legacy 9P2000; kept for interop with `TError`/`RError`).
pub mod string {
    pub const EPERM: &str = "Operation not permitted";
    pub const ENOENT: &str = "No such file or directory";
    pub const EINTR: &str = "Interrupted system call";
    pub const EIO: &str = "Input/output error";
    pub const EBADF: &str = "Bad file descriptor";
    pub const EAGAIN: &str = "Resource temporarily unavailable";
    pub const ENOMEM: &str = "Cannot allocate memory";
    pub const EACCES: &str = "Permission denied";
    pub const EEXIST: &str = "File exists";
    pub const ENOTDIR: &str = "Not a directory";
    pub const EISDIR: &str = "Is a directory";
    pub const EINVAL: &str = "Invalid argument";
    pub const ENOSPC: &str = "No space left on device";
    pub const EROFS: &str = "Read-only file system";
    pub const ENAMETOOLONG: &str = "File name too long";
    pub const ENOSYS: &str = "Function not implemented";
    pub const ENOTEMPTY: &str = "Directory not empty";
    pub const ELOOP: &str = "Too many levels of symbolic links";
    pub const EPROTO: &str = "Protocol error";
    pub const EOPNOTSUPP: &str = "Operation not supported";
    pub const ECONNRESET: &str = "Connection reset by peer";
    pub const ETIMEDOUT: &str = "Connection timed out";
}
