use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{DeviceError, Result};

enum Slot<H> {
    /// An open is in flight; the guard owns the handle it replaces.
    Opening,
    Open(Arc<H>),
}

/// Registry of open device handles keyed by path.
///
/// Enforces the physical single-opener rule: while an open of a path is in
/// flight, any other open of that path fails with `Busy`.
pub(crate) struct OpenHandles<H> {
    slots: Mutex<HashMap<String, Slot<H>>>,
}

/// Outcome of [`OpenHandles::begin`].
pub(crate) enum Begin<'a, H> {
    /// A handle already exists and may be reused (non-exclusive open).
    Reuse(Arc<H>),
    /// The caller must open the device and hand the result to the guard, or
    /// drop the guard to keep the handle being replaced.
    Open(OpenGuard<'a, H>),
}

impl<H> OpenHandles<H> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Start opening `path`.
    pub(crate) fn begin(&self, path: &str, exclusive: bool) -> Result<Begin<'_, H>> {
        let mut slots = self.slots.lock();
        let previous = match slots.get(path) {
            Some(Slot::Opening) => {
                return Err(DeviceError::Busy {
                    path: path.to_string(),
                })
            }
            Some(Slot::Open(handle)) if !exclusive => return Ok(Begin::Reuse(Arc::clone(handle))),
            Some(Slot::Open(handle)) => Some(Arc::clone(handle)),
            None => None,
        };
        slots.insert(path.to_string(), Slot::Opening);
        Ok(Begin::Open(OpenGuard {
            handles: self,
            path: path.to_string(),
            previous,
            committed: false,
        }))
    }

    /// Handle for `path`, if it is open.
    pub(crate) fn get(&self, path: &str) -> Result<Arc<H>> {
        match self.slots.lock().get(path) {
            Some(Slot::Open(handle)) => Ok(Arc::clone(handle)),
            _ => Err(DeviceError::NotOpened(path.to_string())),
        }
    }

    /// Remove the handle for `path`. Returns it if one was open.
    pub(crate) fn remove(&self, path: &str) -> Option<Arc<H>> {
        let mut slots = self.slots.lock();
        match slots.get(path) {
            Some(Slot::Open(_)) => match slots.remove(path) {
                Some(Slot::Open(handle)) => Some(handle),
                _ => None,
            },
            _ => None,
        }
    }

    /// Drop handles whose path is not in `present`.
    pub(crate) fn retain_present<'p>(&self, present: impl IntoIterator<Item = &'p str>) {
        let present: Vec<&str> = present.into_iter().collect();
        self.slots.lock().retain(|path, slot| {
            let keep = matches!(slot, Slot::Opening) || present.contains(&path.as_str());
            if !keep {
                debug!(path = %path, "dropping handle for vanished device");
            }
            keep
        });
    }

    /// Drop every open handle.
    pub(crate) fn clear(&self) {
        self.slots.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self, path: &str) -> bool {
        matches!(self.slots.lock().get(path), Some(Slot::Open(_)))
    }
}

/// Pending open of one path. Dropping it without [`commit`](Self::commit)
/// restores whatever handle the path had before.
pub(crate) struct OpenGuard<'a, H> {
    handles: &'a OpenHandles<H>,
    path: String,
    previous: Option<Arc<H>>,
    committed: bool,
}

impl<H> OpenGuard<'_, H> {
    /// Handle being replaced, if this open is a reopen.
    pub(crate) fn previous(&self) -> Option<&Arc<H>> {
        self.previous.as_ref()
    }

    /// Publish the newly opened handle.
    pub(crate) fn commit(mut self, handle: H) -> Arc<H> {
        let handle = Arc::new(handle);
        self.handles
            .slots
            .lock()
            .insert(self.path.clone(), Slot::Open(Arc::clone(&handle)));
        self.committed = true;
        handle
    }
}

impl<H> Drop for OpenGuard<'_, H> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut slots = self.handles.slots.lock();
        match self.previous.take() {
            Some(handle) => {
                slots.insert(self.path.clone(), Slot::Open(handle));
            }
            None => {
                slots.remove(&self.path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_open_while_opening_is_busy() {
        let handles = OpenHandles::<u8>::new();
        let _first = match handles.begin("a", true).unwrap() {
            Begin::Open(guard) => guard,
            Begin::Reuse(_) => panic!("nothing to reuse yet"),
        };

        let err = handles.begin("a", true).err().expect("second open must fail");
        assert!(matches!(err, DeviceError::Busy { .. }));

        let err = handles.begin("a", false).err().expect("shared open must fail too");
        assert!(matches!(err, DeviceError::Busy { .. }));
    }

    #[test]
    fn non_exclusive_open_reuses_handle() {
        let handles = OpenHandles::<u8>::new();
        if let Begin::Open(guard) = handles.begin("a", true).unwrap() {
            guard.commit(7);
        }

        match handles.begin("a", false).unwrap() {
            Begin::Reuse(handle) => assert_eq!(*handle, 7),
            Begin::Open(_) => panic!("expected reuse"),
        };
    }

    #[test]
    fn exclusive_reopen_replaces_handle() {
        let handles = OpenHandles::<u8>::new();
        if let Begin::Open(guard) = handles.begin("a", true).unwrap() {
            guard.commit(1);
        }
        match handles.begin("a", true).unwrap() {
            Begin::Open(guard) => {
                assert_eq!(guard.previous().map(|h| **h), Some(1));
                guard.commit(2);
            }
            Begin::Reuse(_) => panic!("exclusive open must not reuse"),
        }
        assert_eq!(*handles.get("a").unwrap(), 2);
    }

    #[test]
    fn abandoned_open_restores_previous_state() {
        let handles = OpenHandles::<u8>::new();
        if let Begin::Open(guard) = handles.begin("a", true).unwrap() {
            drop(guard);
        }
        assert!(!handles.is_open("a"));
        assert!(matches!(handles.get("a"), Err(DeviceError::NotOpened(_))));

        if let Begin::Open(guard) = handles.begin("a", true).unwrap() {
            guard.commit(3);
        }
        if let Begin::Open(guard) = handles.begin("a", true).unwrap() {
            drop(guard);
        }
        assert_eq!(*handles.get("a").unwrap(), 3);
    }

    #[test]
    fn declined_reopen_keeps_the_same_handle() {
        let handles = OpenHandles::<u8>::new();
        let original = match handles.begin("a", true).unwrap() {
            Begin::Open(guard) => guard.commit(4),
            Begin::Reuse(_) => panic!("nothing to reuse yet"),
        };
        match handles.begin("a", true).unwrap() {
            Begin::Open(guard) => {
                assert!(guard.previous().is_some());
                assert!(matches!(handles.get("a"), Err(DeviceError::NotOpened(_))));
                drop(guard);
            }
            Begin::Reuse(_) => panic!("exclusive open must not reuse"),
        }
        assert!(Arc::ptr_eq(&handles.get("a").unwrap(), &original));
    }

    #[test]
    fn retain_present_drops_vanished() {
        let handles = OpenHandles::<u8>::new();
        for path in ["a", "b"] {
            if let Begin::Open(guard) = handles.begin(path, true).unwrap() {
                guard.commit(0);
            }
        }
        handles.retain_present(["b"]);
        assert!(!handles.is_open("a"));
        assert!(handles.is_open("b"));
        assert!(handles.remove("b").is_some());
        assert!(handles.remove("b").is_none());
    }
}
