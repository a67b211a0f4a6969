// SPDX-License-Identifier: GPL-2.0

//! Error handling types and utilities

use core::fmt;

/// Kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
	/// Out of memory
	OutOfMemory,
	/// Invalid argument
	InvalidArgument,
	/// Resource busy
	Busy,
	/// Generic I/O error (EIO)
	EIO,
	/// Out of memory (ENOMEM)
	ENOMEM,

	// POSIX errno values
	/// Operation not permitted (EPERM)
	EPERM,
	/// No such file or directory (ENOENT)
	ENOENT,
	/// Bad file descriptor (EBADF)
	EBADF,
	/// No such device (ENODEV)
	ENODEV,
	/// Invalid argument (EINVAL)
	EINVAL,
	/// No space left on device (ENOSPC)
	ENOSPC,
	/// Inappropriate ioctl for device (ENOTTY)
	ENOTTY,
	/// Illegal seek (ESPIPE)
	ESPIPE,
	/// No data available (ENODATA)
	ENODATA,
	/// Function not implemented (ENOSYS)
	ENOSYS,
	/// Not a directory (ENOTDIR)
	ENOTDIR,
	/// Is a directory (EISDIR)
	EISDIR,
	/// File exists (EEXIST)
	EEXIST,
	/// Directory not empty (ENOTEMPTY)
	ENOTEMPTY,
	/// No child process (ECHILD)
	ECHILD,
	/// No such process (ESRCH)
	ESRCH,
	/// Cross-device link (EXDEV)
	EXDEV,
	/// Permission denied by DAC/MAC check (EACCES)
	EACCES,
	/// Alias of EAGAIN used by the socket/wait paths (EWOULDBLOCK)
	EWOULDBLOCK,
	/// Path component too long (ENAMETOOLONG)
	ENAMETOOLONG,
	/// Too many open files system-wide (ENFILE)
	ENFILE,
	/// Too many open files for this process (EMFILE)
	EMFILE,
	/// Operation not supported (ENOTSUP)
	ENOTSUP,
	/// Bad address (EFAULT)
	EFAULT,
	/// Value too large to be stored (EOVERFLOW)
	EOVERFLOW,
	/// Result too large (ERANGE)
	ERANGE,
	/// Cross-domain error, internal use only: signals the namei walker that
	/// a lookup stepped past the root of a mounted filesystem via ".." and
	/// must be retried one level up in the mount stack (spec.md 4.4, 7).
	/// Never returned to userland.
	EDOM,
}

impl Error {
	/// Convert error to errno value
	pub fn to_errno(self) -> i32 {
		match self {
			Error::OutOfMemory => -12,     // ENOMEM
			Error::InvalidArgument => -22, // EINVAL
			Error::Busy => -16,            // EBUSY

			// POSIX errno mappings
			Error::EPERM => -1,                // EPERM
			Error::ENOENT => -2,               // ENOENT
			Error::EBADF => -9,                // EBADF
			Error::ENODEV => -19,              // ENODEV
			Error::EINVAL => -22,              // EINVAL
			Error::ENOSPC => -28,              // ENOSPC
			Error::ENOTTY => -25,              // ENOTTY
			Error::ESPIPE => -29,              // ESPIPE
			Error::ENODATA => -61,             // ENODATA
			Error::ENOSYS => -38,              // ENOSYS
			Error::ENOTDIR => -20,             // ENOTDIR
			Error::EISDIR => -21,              // EISDIR
			Error::EEXIST => -17,              // EEXIST
			Error::ENOTEMPTY => -39,           // ENOTEMPTY
			Error::ECHILD => -10,              // ECHILD
			Error::ESRCH => -3,                // ESRCH
			Error::ENOMEM => -12,              // ENOMEM
			Error::EIO => -5,                  // EIO
			Error::EXDEV => -18,               // EXDEV
			Error::EACCES => -13,              // EACCES
			Error::EWOULDBLOCK => -11,          // EAGAIN
			Error::ENAMETOOLONG => -36,         // ENAMETOOLONG
			Error::ENFILE => -23,               // ENFILE
			Error::EMFILE => -24,               // EMFILE
			Error::ENOTSUP => -95,              // ENOTSUP
			Error::EFAULT => -14,               // EFAULT
			Error::EOVERFLOW => -75,            // EOVERFLOW
			Error::ERANGE => -34,               // ERANGE
			Error::EDOM => -33,                 // EDOM
		}
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::OutOfMemory => write!(f, "Out of memory"),
			Error::InvalidArgument => write!(f, "Invalid argument"),
			Error::Busy => write!(f, "Resource busy"),
			Error::ENOMEM => write!(f, "Out of memory"),

			// POSIX errno variants
			Error::EPERM => write!(f, "Operation not permitted"),
			Error::ENOENT => write!(f, "No such file or directory"),
			Error::EBADF => write!(f, "Bad file descriptor"),
			Error::ENODEV => write!(f, "No such device"),
			Error::EINVAL => write!(f, "Invalid argument"),
			Error::ENOSPC => write!(f, "No space left on device"),
			Error::ENOTTY => write!(f, "Inappropriate ioctl for device"),
			Error::ESPIPE => write!(f, "Illegal seek"),
			Error::ENODATA => write!(f, "No data available"),
			Error::ENOSYS => write!(f, "Function not implemented"),
			Error::ENOTDIR => write!(f, "Not a directory"),
			Error::EISDIR => write!(f, "Is a directory"),
			Error::EEXIST => write!(f, "File exists"),
			Error::ENOTEMPTY => write!(f, "Directory not empty"),
			Error::ECHILD => write!(f, "No child processes"),
			Error::ESRCH => write!(f, "No such process"),
			Error::EIO => write!(f, "Input/output error"),
			Error::EXDEV => write!(f, "Cross-device link"),
			Error::EACCES => write!(f, "Permission denied"),
			Error::EWOULDBLOCK => write!(f, "Operation would block"),
			Error::ENAMETOOLONG => write!(f, "File name too long"),
			Error::ENFILE => write!(f, "Too many open files in system"),
			Error::EMFILE => write!(f, "Too many open files"),
			Error::ENOTSUP => write!(f, "Operation not supported"),
			Error::EFAULT => write!(f, "Bad address"),
			Error::EOVERFLOW => write!(f, "Value too large for defined data type"),
			Error::ERANGE => write!(f, "Result too large"),
			Error::EDOM => write!(f, "Internal mount-boundary signal"),
		}
	}
}

/// Kernel result type
pub type Result<T> = core::result::Result<T, Error>;

/// Convert from various error types
impl From<()> for Error {
	fn from(_: ()) -> Self {
		Error::EINVAL
	}
}
