use std::env;
use std::time::Duration;

use log::info;

use inotify_stream::error::Error;
use inotify_stream::ffi;
use inotify_stream::stream::{StreamItem, StreamOptions, Watcher};

fn main() -> Result<(), Error> {
    pretty_env_logger::init();
    let path = env::args().nth(1).unwrap_or_else(|| String::from("."));

    let mut watcher = Watcher::new()?;
    watcher.add_watch(path, ffi::IN_ALL_EVENTS_WATCH)?;

    let options = StreamOptions {
        timeout: Some(Duration::from_secs(60)),
        yield_idle: false,
        ..StreamOptions::default()
    };
    for item in watcher.events(options) {
        if let StreamItem::Event(event) = item? {
            info!("{event}");
        }
    }
    Ok(())
}
