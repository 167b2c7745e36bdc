#![allow(dead_code)]

use parking_lot::Mutex;
use routekit::{
    Acquired, Depends, Handler, Json, Outcome, Primitive, Provider, RouteRegistry, RouteSpec,
    ValueParam,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Ordered log shared between providers, cleanups and assertions.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

/// Generator provider that logs `acquire {name}` and `release {name} {outcome}`.
pub fn recording_generator(name: &'static str, log: &Recorder) -> Provider {
    let log = log.clone();
    Provider::generator(name, move |_| {
        let log = log.clone();
        async move {
            log.push(format!("acquire {name}"));
            Ok(Acquired::new(name).on_cleanup(move |_, outcome: Outcome| async move {
                log.push(format!("release {name} {outcome}"));
                Ok::<(), anyhow::Error>(())
            }))
        }
    })
}

/// Fixed database handle returned by `get_db`.
pub struct Db {
    pub tag: &'static str,
}

pub fn db_provider(calls: &Arc<AtomicUsize>) -> Provider {
    let calls = Arc::clone(calls);
    Provider::sync("get_db", move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(Db { tag: "primary" })
    })
}

/// `GET /items/{item_id}` returning `{id, source}` from the `get_db` handle.
pub fn items_route() -> RouteSpec {
    RouteSpec::get(
        "/items/{item_id}",
        Handler::sync(|args| {
            let id: i64 = args.param_as("item_id")?;
            let db = args.dep::<Db>("db")?;
            Ok(Json(json!({ "id": id, "source": db.tag })))
        }),
    )
    .name("read_item")
    .param(ValueParam::path("item_id", Primitive::Integer))
    .depends("db", Depends::on("get_db"))
}

pub fn items_registry() -> RouteRegistry {
    let mut registry = RouteRegistry::new();
    registry.add(items_route()).unwrap();
    registry
}

pub mod temp_files {
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Write `content` to `config.{ext}` in a fresh temporary directory.
    /// The directory is removed when the returned `TempDir` drops.
    pub fn write_config(content: &str, ext: &str) -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("config.{ext}"));
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }
}
