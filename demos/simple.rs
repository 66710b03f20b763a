use std::env;
use std::time::Duration;

use log::info;

use inotify_stream::error::Error;
use inotify_stream::stream::{StreamItem, StreamOptions};
use inotify_stream::tree::{TreeOptions, WatchTree};

fn main() -> Result<(), Error> {
    pretty_env_logger::init();
    let root = env::args().nth(1).unwrap_or_else(|| String::from("."));

    let mut tree = WatchTree::new(&root, TreeOptions::default())?;
    let options = StreamOptions {
        timeout: Some(Duration::from_secs(60)),
        yield_idle: false,
        ..StreamOptions::default()
    };
    for item in tree.events(options) {
        if let StreamItem::Event(event) = item? {
            info!("{event}");
        }
    }
    Ok(())
}
