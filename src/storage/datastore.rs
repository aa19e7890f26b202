// This file is part of Byway.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Overlay publication for long-running query processes.
//!
//! Two data regions alternate: a writer fills the idle region, bumps the
//! `(region, timestamp)` pair under the mutex and notifies waiting
//! readers. Readers attach by cloning the region's `Arc`, which doubles as
//! the reference count that keeps a replaced region alive until its last
//! reader detaches. Writers serialize against each other through an
//! exclusive lock file next to the artifacts.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};

use crate::query::RouteData;

pub const REGION_1: usize = 0;
pub const REGION_2: usize = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Published {
    pub region: usize,
    pub timestamp: u64,
}

struct Slots {
    regions: [Option<Arc<RouteData>>; 2],
    current: Published,
}

/// In-process stand-in for the shared-memory region pair.
pub struct Datastore {
    slots: Mutex<Slots>,
    changed: Condvar,
}

impl Default for Datastore {
    fn default() -> Self {
        Datastore {
            slots: Mutex::new(Slots {
                regions: [None, None],
                current: Published {
                    region: REGION_2,
                    timestamp: 0,
                },
            }),
            changed: Condvar::new(),
        }
    }
}

impl Datastore {
    pub fn new() -> Self {
        Default::default()
    }

    /// Publishes a new dataset into the idle region and wakes all waiting
    /// readers. Returns the new timestamp.
    pub fn publish(&self, data: RouteData) -> u64 {
        let mut slots = self.slots.lock().expect("datastore mutex poisoned");
        let idle = 1 - slots.current.region;
        slots.regions[idle] = Some(Arc::new(data));
        slots.current = Published {
            region: idle,
            timestamp: slots.current.timestamp + 1,
        };
        info!(
            "published dataset into region {} at timestamp {}",
            idle + 1,
            slots.current.timestamp
        );
        self.changed.notify_all();
        slots.current.timestamp
    }

    /// Attaches to the currently published dataset.
    pub fn attach(&self) -> Option<(Arc<RouteData>, Published)> {
        let slots = self.slots.lock().expect("datastore mutex poisoned");
        slots.regions[slots.current.region]
            .as_ref()
            .map(|data| (Arc::clone(data), slots.current))
    }

    /// Blocks until a dataset newer than `seen` is published.
    pub fn wait_for_update(&self, seen: u64) -> (Arc<RouteData>, Published) {
        let mut slots = self.slots.lock().expect("datastore mutex poisoned");
        while slots.current.timestamp <= seen || slots.regions[slots.current.region].is_none() {
            slots = self
                .changed
                .wait(slots)
                .expect("datastore mutex poisoned");
        }
        let data = slots.regions[slots.current.region]
            .as_ref()
            .expect("published region is filled");
        (Arc::clone(data), slots.current)
    }
}

/// An exclusive lock file serializing writers. Dropping the guard removes
/// the file.
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Acquires the lock, retrying for a few seconds before giving up.
    pub fn acquire(path: &Path) -> Result<FileLock> {
        for attempt in 0..50 {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(_) => {
                    debug!("acquired dataset lock `{}`", path.display());
                    return Ok(FileLock {
                        path: path.to_path_buf(),
                    });
                }
                Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                    if attempt == 0 {
                        warn!(
                            "dataset lock `{}` is held, waiting for the other writer",
                            path.display()
                        );
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(error) => {
                    return Err(error).with_context(|| {
                        format!("Cannot create dataset lock `{}`", path.display())
                    });
                }
            }
        }
        bail!("Timed out waiting for dataset lock `{}`", path.display());
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_file(&self.path) {
            warn!(
                "cannot remove dataset lock `{}`: {}",
                self.path.display(),
                error
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeometryTable;
    use crate::graph::{edge, EdgeBasedGraph};
    use crate::query::NameTable;

    fn tiny_data() -> RouteData {
        let graph = EdgeBasedGraph::from_edges(2, vec![edge(0, 1, 1)]);
        RouteData {
            names: NameTable::unnamed(2),
            geometry: GeometryTable::default(),
            turn_instructions: Vec::new(),
            ch: None,
            mld: None,
            graph,
        }
    }

    #[test]
    fn publish_and_attach_test() {
        let store = Datastore::new();
        assert!(store.attach().is_none());
        let timestamp = store.publish(tiny_data());
        assert_eq!(timestamp, 1);
        let (_, published) = store.attach().unwrap();
        assert_eq!(published.region, REGION_1);
        assert_eq!(published.timestamp, 1);
        // A second publish lands in the other region.
        store.publish(tiny_data());
        let (_, published) = store.attach().unwrap();
        assert_eq!(published.region, REGION_2);
        assert_eq!(published.timestamp, 2);
    }

    #[test]
    fn old_readers_keep_their_region_test() {
        let store = Datastore::new();
        store.publish(tiny_data());
        let (old, _) = store.attach().unwrap();
        store.publish(tiny_data());
        store.publish(tiny_data());
        // The replaced region stays usable through the held Arc.
        assert_eq!(crate::graph::Graph::num_nodes(&old.graph), 2);
    }

    #[test]
    fn wait_for_update_test() {
        let store = Arc::new(Datastore::new());
        let waiter = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || store.wait_for_update(0).1.timestamp)
        };
        std::thread::sleep(Duration::from_millis(20));
        store.publish(tiny_data());
        assert_eq!(waiter.join().unwrap(), 1);
    }

    #[test]
    fn file_lock_test() {
        let mut path = std::env::temp_dir();
        path.push(format!("byway-lock-{}", std::process::id()));
        let guard = FileLock::acquire(&path).unwrap();
        assert!(path.exists());
        drop(guard);
        assert!(!path.exists());
    }
}
