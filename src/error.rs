use std::io;
use std::path::PathBuf;

use crate::stream::Event;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Creating the inotify handle or its readiness poller failed. There is
    /// no recovery; typically the per-user instance or fd limit is
    /// exhausted.
    #[error("failed to initialize inotify: {0}")]
    Init(#[source] io::Error),

    /// Registering a watch failed. Not retried internally; whether a
    /// missing path is expected is the caller's call, so the errno is kept
    /// reachable through [`Error::raw_os_error`].
    #[error("failed to add watch on {path:?}: {source}")]
    AddWatch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Deregistering a watch failed.
    #[error("failed to remove watch on {path:?}: {source}")]
    RemoveWatch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The readiness wait or the subsequent read failed for a reason other
    /// than a transient signal interruption (those are retried internally).
    #[error("event wait failed: {0}")]
    Wait(#[source] io::Error),

    /// The requested tree mask carries one-shot or merge semantics, which
    /// make recursive watch bookkeeping impossible.
    #[error("mask {mask:#010x} is unsupported for recursive trees")]
    UnsupportedMask { mask: u32 },

    /// A terminal event (queue overflow, backing store unmounted) ended the
    /// stream. The watch session is no longer trustworthy and must be
    /// rebuilt from scratch, not resumed.
    #[error("terminal event {type_name} received")]
    Terminal {
        type_name: &'static str,
        event: Event,
    },
}

impl Error {
    /// Underlying OS errno, for callers that pattern-match on it.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Init(source) | Self::Wait(source) => source.raw_os_error(),
            Self::AddWatch { source, .. } | Self::RemoveWatch { source, .. } => {
                source.raw_os_error()
            }
            Self::UnsupportedMask { .. } | Self::Terminal { .. } => None,
        }
    }
}
