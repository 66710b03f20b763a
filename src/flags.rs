use std::fmt::{Display, Formatter};

use crate::ffi;

bitflags::bitflags! {
  /// Event bits the kernel may report: the decodable universe.
  ///
  /// Flags that are only meaningful when registering a watch
  /// (`IN_ONLYDIR`, `IN_ONESHOT`, ...) are deliberately not part of it.
  #[repr(C)]
  pub struct EventFlags: u32 {
    const ACCESS = ffi::IN_ACCESS;
    const MODIFY = ffi::IN_MODIFY;
    const ATTRIB = ffi::IN_ATTRIB;
    const CLOSE_WRITE = ffi::IN_CLOSE_WRITE;
    const CLOSE_NOWRITE = ffi::IN_CLOSE_NOWRITE;
    const OPEN = ffi::IN_OPEN;
    const MOVED_FROM = ffi::IN_MOVED_FROM;
    const MOVED_TO = ffi::IN_MOVED_TO;
    const CREATE = ffi::IN_CREATE;
    const DELETE = ffi::IN_DELETE;
    const DELETE_SELF = ffi::IN_DELETE_SELF;
    const MOVE_SELF = ffi::IN_MOVE_SELF;
    const UNMOUNT = ffi::IN_UNMOUNT;
    const Q_OVERFLOW = ffi::IN_Q_OVERFLOW;
    const IGNORED = ffi::IN_IGNORED;
    const ISDIR = ffi::IN_ISDIR;
  }
}

/// Elementary event bits in resolution order, ascending by bit value.
///
/// `ISDIR` is a qualifier, not an event of its own; its name is appended
/// after the event names it decorates.
const NAMES: [(EventFlags, &str); 15] = [
    (EventFlags::ACCESS, "IN_ACCESS"),
    (EventFlags::MODIFY, "IN_MODIFY"),
    (EventFlags::ATTRIB, "IN_ATTRIB"),
    (EventFlags::CLOSE_WRITE, "IN_CLOSE_WRITE"),
    (EventFlags::CLOSE_NOWRITE, "IN_CLOSE_NOWRITE"),
    (EventFlags::OPEN, "IN_OPEN"),
    (EventFlags::MOVED_FROM, "IN_MOVED_FROM"),
    (EventFlags::MOVED_TO, "IN_MOVED_TO"),
    (EventFlags::CREATE, "IN_CREATE"),
    (EventFlags::DELETE, "IN_DELETE"),
    (EventFlags::DELETE_SELF, "IN_DELETE_SELF"),
    (EventFlags::MOVE_SELF, "IN_MOVE_SELF"),
    (EventFlags::UNMOUNT, "IN_UNMOUNT"),
    (EventFlags::Q_OVERFLOW, "IN_Q_OVERFLOW"),
    (EventFlags::IGNORED, "IN_IGNORED"),
];

impl EventFlags {
    /// Parse a raw event mask.
    ///
    /// # Panics
    /// Panics when `mask` carries a bit outside the known universe. That
    /// means the constant table above no longer matches the running kernel
    /// and must be brought up to date; it is not a transient condition.
    #[must_use]
    pub fn from_mask(mask: u32) -> Self {
        Self::from_bits(mask).unwrap_or_else(|| {
            panic!("event mask {mask:#010x} carries bits outside the known universe")
        })
    }

    /// Symbolic names of all event bits set, in a stable ascending-bit
    /// order, with `IN_ISDIR` appended last when the directory qualifier is
    /// present. Any bit-valid combination resolves, including ones the
    /// kernel does not document.
    #[must_use]
    pub fn type_names(self) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(2);
        for (flag, name) in NAMES {
            if self.contains(flag) {
                names.push(name);
            }
        }
        if self.contains(Self::ISDIR) {
            names.push("IN_ISDIR");
        }
        names
    }
}

impl Display for EventFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.type_names().join(" "))
    }
}
