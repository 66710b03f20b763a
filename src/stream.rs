//! Iterator-based inotify event streams.
#![allow(clippy::module_name_repetitions)]

use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::io;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::decode::{Decoder, EventHeader, Record};
use crate::error::{Error, Result};
use crate::ffi::{self, Poll, WatchDescriptor, WatchMask};
pub use crate::flags::EventFlags;
pub use crate::watch::{Removal, WatchTable};

/// Default poll quantum: how long one readiness wait may block before the
/// loop re-checks its timeout budget.
pub const DEFAULT_BLOCK_DURATION: Duration = Duration::from_secs(1);

/// Event types that end a stream destructively unless overridden.
pub const DEFAULT_TERMINAL_EVENTS: &[&str] = &["IN_Q_OVERFLOW", "IN_UNMOUNT"];

const READ_BUFFER_LEN: usize = 4096;

/// A fully resolved inotify event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Raw wire header, mask included verbatim.
    pub header: EventHeader,
    /// Parsed event bits.
    pub flags: EventFlags,
    /// Symbolic names of the event bits, in resolution order.
    pub type_names: Vec<&'static str>,
    /// Path of the watch the event was reported against.
    pub path: PathBuf,
    /// Name of the affected entry relative to [`path`](Event::path); empty
    /// for events on the watched path itself.
    pub name: OsString,
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] path: {:?}, name: {:?}, types: {} ({:#x})",
            self.header.wd, self.path, self.name, self.flags, self.header.mask
        )
    }
}

/// An entry produced by an event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    /// A resolved filesystem event.
    Event(Event),
    /// Heartbeat: a poll quantum elapsed without producing an event.
    Idle,
}

/// Poll quantum: either a fixed duration or a callback re-evaluated before
/// every single readiness wait.
pub enum Quantum {
    Fixed(Duration),
    Dynamic(Box<dyn FnMut() -> Duration + Send>),
}

impl Quantum {
    #[must_use]
    pub fn fixed(duration: Duration) -> Self {
        Self::Fixed(duration)
    }

    pub fn dynamic(f: impl FnMut() -> Duration + Send + 'static) -> Self {
        Self::Dynamic(Box::new(f))
    }

    fn next(&mut self) -> Duration {
        match self {
            Self::Fixed(duration) => *duration,
            Self::Dynamic(f) => f(),
        }
    }
}

impl Default for Quantum {
    fn default() -> Self {
        Self::Fixed(DEFAULT_BLOCK_DURATION)
    }
}

impl From<Duration> for Quantum {
    fn from(duration: Duration) -> Self {
        Self::Fixed(duration)
    }
}

/// Per-event predicate; returning `false` ends the stream and records the
/// triggering pair in [`Watcher::last_filter_hit`].
pub type EventFilter = Box<dyn FnMut(&'static str, &Event) -> bool>;

/// Options for one [`Watcher::events`] call.
pub struct StreamOptions {
    /// End the stream normally once no event has been produced for this
    /// long. `None` streams forever.
    pub timeout: Option<Duration>,
    /// Emit [`StreamItem::Idle`] for quanta that produced no event.
    pub yield_idle: bool,
    /// Evaluated for every type name of every resolved event, before the
    /// terminal check.
    pub filter: Option<EventFilter>,
    /// Type names whose occurrence invalidates the whole session and ends
    /// the stream through [`Error::Terminal`].
    pub terminal_events: Vec<&'static str>,
    /// Only events whose mask intersects this are emitted. Bookkeeping in a
    /// recursive tree still sees the rest.
    pub mask: WatchMask,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            yield_idle: true,
            filter: None,
            terminal_events: DEFAULT_TERMINAL_EVENTS.to_vec(),
            mask: ffi::IN_ALL_EVENTS,
        }
    }
}

/// Owner of one inotify handle: watch table, decode buffer and poll loop.
///
/// The handle and its poller are released exactly once, when the watcher is
/// dropped.
pub struct Watcher {
    fd: OwnedFd,
    poll: Poll,
    pub(crate) table: WatchTable,
    pub(crate) decoder: Decoder,
    quantum: Quantum,
    pub(crate) last_filter_hit: Option<(&'static str, Event)>,
}

impl Watcher {
    pub fn new() -> Result<Self> {
        Self::with_quantum(Quantum::default())
    }

    pub fn with_quantum(quantum: impl Into<Quantum>) -> Result<Self> {
        let fd = ffi::init().map_err(Error::Init)?;
        let poll = Poll::new().map_err(Error::Init)?;
        poll.register(fd.as_fd()).map_err(Error::Init)?;
        debug!("inotify handle is ({})", fd.as_raw_fd());
        Ok(Self {
            fd,
            poll,
            table: WatchTable::default(),
            decoder: Decoder::new(),
            quantum: quantum.into(),
            last_filter_hit: None,
        })
    }

    /// Register a watch on `path`.
    ///
    /// An already-watched path is tolerated with a warning and without a
    /// second kernel registration, since recursive discovery can race with
    /// live events for the same directory; `Ok(None)` is returned in that
    /// case.
    pub fn add_watch(
        &mut self,
        path: impl Into<PathBuf>,
        mask: WatchMask,
    ) -> Result<Option<WatchDescriptor>> {
        let path = path.into();
        debug!("adding watch: [{}]", path.display());
        if self.table.contains_path(&path) {
            warn!("path already being watched: [{}]", path.display());
            return Ok(None);
        }

        let wd = ffi::add_watch(self.fd.as_fd(), &path, mask).map_err(|source| {
            Error::AddWatch {
                path: path.clone(),
                source,
            }
        })?;
        debug!("added watch ({}): [{}]", wd, path.display());
        self.table.insert(path, wd);
        Ok(Some(wd))
    }

    /// Remove the watch on `path` according to `mode`.
    ///
    /// An unknown path is tolerated with a warning and a no-op, since
    /// removal bookkeeping can race with kernel-side cleanup.
    pub fn remove_watch(&mut self, path: impl AsRef<Path>, mode: Removal) -> Result<()> {
        let path = path.as_ref();
        let Some(wd) = self.table.wd_of(path) else {
            warn!("path not in watch list: [{}]", path.display());
            return Ok(());
        };
        self.remove(wd, path.to_path_buf(), mode)
    }

    /// Same as [`remove_watch`](Watcher::remove_watch), addressed by
    /// descriptor.
    pub fn remove_watch_by_wd(&mut self, wd: WatchDescriptor, mode: Removal) -> Result<()> {
        let Some(path) = self.table.path_of(wd).map(Path::to_path_buf) else {
            warn!("watch descriptor not in watch list: [{wd}]");
            return Ok(());
        };
        self.remove(wd, path, mode)
    }

    fn remove(&mut self, wd: WatchDescriptor, path: PathBuf, mode: Removal) -> Result<()> {
        debug!(
            "removing watch ({}) [{}], mode {:?}",
            wd,
            path.display(),
            mode
        );
        self.table.remove_path(&path);
        if mode == Removal::Active {
            ffi::rm_watch(self.fd.as_fd(), wd)
                .map_err(|source| Error::RemoveWatch { path, source })?;
        }
        Ok(())
    }

    /// Current watches, for diagnostics.
    #[must_use]
    pub fn watches(&self) -> &WatchTable {
        &self.table
    }

    /// The `(type name, event)` pair that last ended a stream through its
    /// filter predicate. Cleared when a new stream starts.
    #[must_use]
    pub fn last_filter_hit(&self) -> Option<&(&'static str, Event)> {
        self.last_filter_hit.as_ref()
    }

    /// Stream events according to `options`.
    ///
    /// The stream is lazy and blocking: each [`next`](Iterator::next) call
    /// drains buffered records first and only then waits for readiness, one
    /// quantum at a time. Decode and watch state live in the watcher, so a
    /// dropped stream can be resumed by calling `events` again; stopping to
    /// pull is the only cancellation mechanism.
    pub fn events(&mut self, options: StreamOptions) -> EventStream<'_> {
        self.last_filter_hit = None;
        EventStream {
            state: StreamState::new(options),
            watcher: self,
        }
    }
}

/// Lazy blocking event sequence over a [`Watcher`].
pub struct EventStream<'a> {
    watcher: &'a mut Watcher,
    state: StreamState,
}

impl Iterator for EventStream<'_> {
    type Item = Result<StreamItem>;

    fn next(&mut self) -> Option<Self::Item> {
        self.state.next_item(self.watcher)
    }
}

/// The poll-loop state machine, shared between [`EventStream`] and the
/// recursive tree stream.
pub(crate) struct StreamState {
    options: StreamOptions,
    last_hit: Instant,
    done: bool,
}

impl StreamState {
    pub(crate) fn new(options: StreamOptions) -> Self {
        Self {
            options,
            last_hit: Instant::now(),
            done: false,
        }
    }

    pub(crate) fn finish(&mut self) {
        self.done = true;
    }

    fn timed_out(&self) -> bool {
        self.options
            .timeout
            .map_or(false, |timeout| self.last_hit.elapsed() > timeout)
    }

    /// Advance the loop until one item can be emitted, the timeout budget
    /// runs out, or the stream dies.
    pub(crate) fn next_item(&mut self, watcher: &mut Watcher) -> Option<Result<StreamItem>> {
        if self.done {
            return None;
        }
        loop {
            // Drain records already buffered before waiting again.
            while let Some(record) = watcher.decoder.pop() {
                let Some(event) = resolve(record, &watcher.table) else {
                    continue;
                };
                self.last_hit = Instant::now();

                let mut idx = 0;
                while idx < event.type_names.len() {
                    let type_name = event.type_names[idx];
                    if let Some(filter) = self.options.filter.as_mut() {
                        if !filter(type_name, &event) {
                            watcher.last_filter_hit = Some((type_name, event));
                            self.done = true;
                            return None;
                        }
                    }
                    if self.options.terminal_events.contains(&type_name) {
                        self.done = true;
                        return Some(Err(Error::Terminal { type_name, event }));
                    }
                    idx += 1;
                }

                if event.header.mask & self.options.mask != 0 {
                    return Some(Ok(StreamItem::Event(event)));
                }
            }

            if self.timed_out() {
                self.done = true;
                return None;
            }

            let quantum = watcher.quantum.next();
            match watcher.poll.wait(quantum) {
                Ok(true) => {
                    let mut buf = [0_u8; READ_BUFFER_LEN];
                    match ffi::read_events(watcher.fd.as_fd(), &mut buf) {
                        // Zero bytes means the channel closed gracefully;
                        // the drain above will find nothing and the timeout
                        // budget ends the stream.
                        Ok(0) => {}
                        Ok(n) => {
                            watcher.decoder.feed(&buf[..n]);
                        }
                        Err(source) => {
                            self.done = true;
                            return Some(Err(Error::Wait(source)));
                        }
                    }
                }
                Ok(false) => {
                    if self.timed_out() {
                        self.done = true;
                        return None;
                    }
                    if self.options.yield_idle {
                        return Some(Ok(StreamItem::Idle));
                    }
                }
                // A transient signal interrupted the wait; re-check the
                // budget and retry.
                Err(source) if source.kind() == io::ErrorKind::Interrupted => {
                    if self.timed_out() {
                        self.done = true;
                        return None;
                    }
                }
                Err(source) => {
                    self.done = true;
                    return Some(Err(Error::Wait(source)));
                }
            }
        }
    }
}

/// Resolve a decoded record against the watch table.
///
/// Records for descriptors that are no longer known belong to a watch that
/// was already torn down and are dropped, except for queue-overflow
/// records: those are not tied to any watch (the kernel reports them with
/// a descriptor of -1) and must survive resolution to reach the terminal
/// check.
fn resolve(record: Record, table: &WatchTable) -> Option<Event> {
    let Record {
        header,
        flags,
        type_names,
        name,
    } = record;
    let path = match table.path_of(header.wd) {
        Some(path) => path.to_path_buf(),
        None if flags.contains(EventFlags::Q_OVERFLOW) => PathBuf::new(),
        None => {
            debug!("dropping event for stale watch descriptor ({})", header.wd);
            return None;
        }
    };
    Some(Event {
        header,
        flags,
        type_names,
        path,
        name,
    })
}
