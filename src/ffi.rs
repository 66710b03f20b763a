//! Raw [`inotify(7)`](https://man7.org/linux/man-pages/man7/inotify.7.html)
//! and `epoll(7)` interface.
#![allow(clippy::unreadable_literal)]

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::Duration;

/// Identifier the kernel assigns to a registered watch.
///
/// Unique among the active watches of one handle only; the kernel may reuse
/// a descriptor after removal, so staleness must be checked against the
/// watch table rather than assumed.
pub type WatchDescriptor = i32;

/// Bit mask accepted by [`add_watch`].
pub type WatchMask = u32;

pub const IN_ACCESS: WatchMask = 0x00000001;
pub const IN_MODIFY: WatchMask = 0x00000002;
pub const IN_ATTRIB: WatchMask = 0x00000004;
pub const IN_CLOSE_WRITE: WatchMask = 0x00000008;
pub const IN_CLOSE_NOWRITE: WatchMask = 0x00000010;
pub const IN_OPEN: WatchMask = 0x00000020;
pub const IN_MOVED_FROM: WatchMask = 0x00000040;
pub const IN_MOVED_TO: WatchMask = 0x00000080;
pub const IN_CREATE: WatchMask = 0x00000100;
pub const IN_DELETE: WatchMask = 0x00000200;
pub const IN_DELETE_SELF: WatchMask = 0x00000400;
pub const IN_MOVE_SELF: WatchMask = 0x00000800;

// Sent by the kernel regardless of the requested mask.
pub const IN_UNMOUNT: WatchMask = 0x00002000;
pub const IN_Q_OVERFLOW: WatchMask = 0x00004000;
pub const IN_IGNORED: WatchMask = 0x00008000;

// Accepted by add_watch only, never reported back.
pub const IN_ONLYDIR: WatchMask = 0x01000000;
pub const IN_DONT_FOLLOW: WatchMask = 0x02000000;
pub const IN_EXCL_UNLINK: WatchMask = 0x04000000;
pub const IN_MASK_CREATE: WatchMask = 0x10000000;
pub const IN_MASK_ADD: WatchMask = 0x20000000;
pub const IN_ONESHOT: WatchMask = 0x80000000;

/// Qualifier reported alongside an event that occurred against a directory.
pub const IN_ISDIR: WatchMask = 0x40000000;

pub const IN_CLOSE: WatchMask = IN_CLOSE_WRITE | IN_CLOSE_NOWRITE;
pub const IN_MOVE: WatchMask = IN_MOVED_FROM | IN_MOVED_TO;

/// Every event a watch can be registered for.
pub const IN_ALL_EVENTS_WATCH: WatchMask = IN_ACCESS
    | IN_MODIFY
    | IN_ATTRIB
    | IN_CLOSE_WRITE
    | IN_CLOSE_NOWRITE
    | IN_OPEN
    | IN_MOVED_FROM
    | IN_MOVED_TO
    | IN_CREATE
    | IN_DELETE
    | IN_DELETE_SELF
    | IN_MOVE_SELF;

/// Every event the kernel can report, including the unsolicited ones.
pub const IN_ALL_EVENTS: WatchMask =
    IN_ALL_EVENTS_WATCH | IN_UNMOUNT | IN_Q_OVERFLOW | IN_IGNORED;

/// Create a new inotify handle.
pub fn init() -> io::Result<OwnedFd> {
    let fd = unsafe { libc::inotify_init1(libc::IN_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Register a watch on `path`, returning the kernel-assigned descriptor.
pub fn add_watch(fd: BorrowedFd<'_>, path: &Path, mask: WatchMask) -> io::Result<WatchDescriptor> {
    let path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    let wd = unsafe { libc::inotify_add_watch(fd.as_raw_fd(), path.as_ptr(), mask) };
    if wd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(wd)
}

/// Deregister a watch.
pub fn rm_watch(fd: BorrowedFd<'_>, wd: WatchDescriptor) -> io::Result<()> {
    let rc = unsafe { libc::inotify_rm_watch(fd.as_raw_fd(), wd) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Read raw event bytes from a ready handle.
///
/// Returns `Ok(0)` on graceful closure of the channel.
#[allow(clippy::cast_sign_loss)]
pub fn read_events(fd: BorrowedFd<'_>, buf: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { libc::read(fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

/// Readiness wait on a single registered handle, backed by epoll.
pub struct Poll {
    epoll: OwnedFd,
}

impl Poll {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            epoll: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Start watching `fd` for input readiness.
    pub fn register(&self, fd: BorrowedFd<'_>) -> io::Result<()> {
        #[allow(clippy::cast_sign_loss)]
        let mut event = libc::epoll_event {
            events: libc::EPOLLIN as u32,
            u64: fd.as_raw_fd() as u64,
        };
        let rc = unsafe {
            libc::epoll_ctl(
                self.epoll.as_raw_fd(),
                libc::EPOLL_CTL_ADD,
                fd.as_raw_fd(),
                &mut event,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Block until the registered handle becomes readable or `timeout`
    /// elapses, whichever comes first.
    ///
    /// A wait cut short by a signal surfaces as
    /// [`io::ErrorKind::Interrupted`], distinct from every other failure.
    pub fn wait(&self, timeout: Duration) -> io::Result<bool> {
        #[allow(clippy::cast_possible_truncation)]
        let millis = timeout.as_millis().min(i32::MAX as u128) as i32;
        let mut event = libc::epoll_event { events: 0, u64: 0 };
        let rc = unsafe { libc::epoll_wait(self.epoll.as_raw_fd(), &mut event, 1, millis) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(rc > 0)
    }
}
