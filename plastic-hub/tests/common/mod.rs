//! Shared helpers for the plastic-hub integration tests

#![allow(dead_code)]

use plastic_hub::{FnListener, HubConfig, Identifier, PlasticHub, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Starts a hub on OS-chosen ports that publishes itself in `dir`
pub async fn start_hub(dir: &Path) -> (Arc<PlasticHub>, PathBuf) {
    let path = dir.join(".plastic");
    let config = HubConfig::ephemeral()
        .with_rendezvous_file(Some(path.clone()))
        .with_notify_timeout(Duration::from_secs(2));
    let hub = PlasticHub::start(config).await.unwrap();
    (hub, path)
}

/// A listener that records every message it receives and answers with
/// its first argument
pub fn recorder() -> (Arc<FnListener>, Arc<Mutex<Vec<Identifier>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let listener = FnListener::new(move |_sender, message, args: Vec<Value>| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(message);
            Ok(args.into_iter().next().unwrap_or(Value::Null))
        }
    });
    (Arc::new(listener), log)
}

pub fn count(log: &Mutex<Vec<Identifier>>, message: &Identifier) -> usize {
    log.lock().unwrap().iter().filter(|m| *m == message).count()
}

/// Polls `condition` for up to two seconds
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

pub fn message(text: &str) -> Identifier {
    Identifier::parse(text).unwrap()
}
