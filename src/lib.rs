//! [![crates.io](https://img.shields.io/crates/v/inotify-stream?style=flat-square)](https://crates.io/crates/inotify-stream)
//! [![Documentation](https://img.shields.io/docsrs/inotify-stream?style=flat-square)](https://docs.rs/inotify-stream)
//!
//! Iterator-based recursive [`inotify`](https://man7.org/linux/man-pages/man7/inotify.7.html)
//! watch streams.
//!
//! ## Features
//!
//! - Decode the raw, length-prefixed inotify byte stream into typed records,
//!   robust against arbitrary short reads.
//! - Blocking, lazily-pulled event sequences with timeout, idle heartbeats,
//!   filter predicates and terminal-event detection.
//! - Recursive watch trees that curate their own watch set as directories
//!   are created, deleted and renamed, ignore lists included.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use inotify_stream::stream::{StreamItem, StreamOptions};
//! use inotify_stream::tree::{TreeOptions, WatchTree};
//!
//! # fn main() -> Result<(), inotify_stream::error::Error> {
//! let mut tree = WatchTree::new(".", TreeOptions::default())?;
//!
//! let options = StreamOptions {
//!     timeout: Some(Duration::from_secs(30)),
//!     yield_idle: false,
//!     ..StreamOptions::default()
//! };
//! for item in tree.events(options) {
//!     match item? {
//!         StreamItem::Event(event) => println!("{event}"),
//!         StreamItem::Idle => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! This project is licensed under MIT License.

pub mod decode;
pub mod error;
pub mod ffi;
pub mod flags;
pub mod stream;
pub mod tree;
pub mod watch;
