//! Process-wide registry of open device links keyed by port path.
//!
//! Opening the same serial device twice gives two handles that can interleave
//! bytes on the wire. Every front end asks the registry instead, which opens a
//! path on first use and hands back a clone of the same [`TransportGuard`]
//! afterwards. Entries live for the rest of the process.

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::Mutex;

use super::{DeviceLink, TransportGuard};
use crate::error::LinkError;

/// Type-erased guarded link as stored in the registry.
pub type SharedLink = TransportGuard<Box<dyn DeviceLink>>;

/// Map from port path to its single guarded link.
#[derive(Default)]
pub struct PortRegistry {
    ports: Mutex<HashMap<String, SharedLink>>,
}

impl PortRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process.
    pub fn global() -> &'static PortRegistry {
        static REGISTRY: OnceLock<PortRegistry> = OnceLock::new();
        REGISTRY.get_or_init(PortRegistry::new)
    }

    /// Returns the link for `path`, opening it with `open` on first use.
    ///
    /// `open` runs while the registry is locked, so two threads racing on
    /// the same path still open it once. A failed open leaves no entry
    /// behind and can be retried.
    pub fn get_or_open<F>(&self, path: &str, open: F) -> Result<SharedLink, LinkError>
    where
        F: FnOnce(&str) -> Result<Box<dyn DeviceLink>, LinkError>,
    {
        let mut ports = self.ports.lock();
        if let Some(existing) = ports.get(path) {
            return Ok(existing.clone());
        }

        log::info!("opening device link on {path}");
        let link = TransportGuard::new(open(path)?);
        ports.insert(path.to_string(), link.clone());
        Ok(link)
    }

    /// Returns the link for `path` if it has already been opened.
    pub fn get(&self, path: &str) -> Option<SharedLink> {
        self.ports.lock().get(path).cloned()
    }

    /// Number of distinct ports opened so far.
    pub fn len(&self) -> usize {
        self.ports.lock().len()
    }

    /// Returns `true` when no port has been opened.
    pub fn is_empty(&self) -> bool {
        self.ports.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{StatusReport, Unit};

    struct NullLink;

    impl DeviceLink for NullLink {
        fn get_status(&mut self) -> Result<Option<StatusReport>, LinkError> {
            Ok(None)
        }

        fn set_speed(&mut self, _: i32, _: Unit) -> Result<(), LinkError> {
            Ok(())
        }

        fn set_grade(&mut self, _: i32, _: Unit) -> Result<(), LinkError> {
            Ok(())
        }

        fn reset(&mut self) -> Result<(), LinkError> {
            Ok(())
        }

        fn go_idle(&mut self) -> Result<(), LinkError> {
            Ok(())
        }

        fn go_inuse(&mut self) -> Result<(), LinkError> {
            Ok(())
        }

        fn get_id(&mut self) -> Result<Option<String>, LinkError> {
            Ok(None)
        }
    }

    fn open_null(_: &str) -> Result<Box<dyn DeviceLink>, LinkError> {
        Ok(Box::new(NullLink))
    }

    #[test]
    fn same_path_opens_once() {
        let registry = PortRegistry::new();
        let mut opens = 0;

        let first = registry
            .get_or_open("/dev/ttyUSB0", |path| {
                opens += 1;
                open_null(path)
            })
            .unwrap();
        let second = registry
            .get_or_open("/dev/ttyUSB0", |path| {
                opens += 1;
                open_null(path)
            })
            .unwrap();

        assert_eq!(opens, 1);
        assert!(first.same_link(&second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_paths_get_distinct_links() {
        let registry = PortRegistry::new();
        let a = registry.get_or_open("/dev/ttyUSB0", open_null).unwrap();
        let b = registry.get_or_open("/dev/ttyUSB1", open_null).unwrap();

        assert!(!a.same_link(&b));
        assert_eq!(registry.len(), 2);
        assert!(registry.get("/dev/ttyUSB1").is_some());
        assert!(registry.get("/dev/ttyACM0").is_none());
    }

    #[test]
    fn failed_open_leaves_no_entry() {
        let registry = PortRegistry::new();
        let result = registry.get_or_open("/dev/missing", |_| {
            Err(LinkError::Io("no such device".into()))
        });

        assert!(result.is_err());
        assert!(registry.is_empty());
    }
}
