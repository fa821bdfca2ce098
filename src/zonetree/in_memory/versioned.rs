use crate::base::serial::Serial;
use core::fmt;
use std::vec::Vec;

//------------ Version -------------------------------------------------------

/// A version of a zone.
///
/// Versions are handed out in increasing order. A reader asking for a
/// version sees the state as of that version, never any later change.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd)]
pub struct Version(Serial);

impl Version {
    pub fn next(self) -> Version {
        Version(self.0.add(1))
    }
}

impl Default for Version {
    fn default() -> Self {
        Version(0.into())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

//------------ Versioned -----------------------------------------------------

/// The history of a single value across zone versions.
///
/// Each entry is tagged with the version that introduced it. `None` marks
/// the value as removed as of that version.
#[derive(Clone, Debug)]
pub struct Versioned<T> {
    data: Vec<(Version, Option<T>)>,
}

impl<T> Versioned<T> {
    pub fn new() -> Self {
        Versioned { data: Vec::new() }
    }

    pub fn get(&self, version: Version) -> Option<&T> {
        self.data
            .iter()
            .rev()
            .find(|item| item.0 <= version)
            .and_then(|item| item.1.as_ref())
    }

    pub fn update(&mut self, version: Version, value: T) {
        if let Some(last) = self.data.last_mut() {
            if last.0 == version {
                last.1 = Some(value);
                return;
            }
        }
        self.data.push((version, Some(value)))
    }

    /// Drops the last entry if it belongs to `version`.
    pub fn rollback(&mut self, version: Version) {
        if self.data.last().map(|item| item.0) == Some(version) {
            self.data.pop();
        }
    }

    pub fn remove(&mut self, version: Version) {
        // Older versions may still be read, so an earlier value has to be
        // masked rather than dropped.
        let len = self.data.len();
        if let Some(last) = self.data.last_mut() {
            if last.1.is_none() {
                return;
            }
            if last.0 == version {
                if len == 1 {
                    let _ = self.data.pop();
                } else {
                    last.1 = None;
                }
                return;
            }
        }
        if !self.data.is_empty() {
            self.data.push((version, None))
        }
    }

    /// Returns whether there is no history at all.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T> Default for Versioned<T> {
    fn default() -> Self {
        Self::new()
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn versions_are_isolated() {
        let v0 = Version::default();
        let v1 = v0.next();
        let v2 = v1.next();

        let mut value = Versioned::new();
        value.update(v1, "one");
        assert_eq!(value.get(v0), None);
        assert_eq!(value.get(v1), Some(&"one"));

        value.update(v2, "two");
        assert_eq!(value.get(v1), Some(&"one"));
        assert_eq!(value.get(v2), Some(&"two"));

        value.rollback(v2);
        assert_eq!(value.get(v2), Some(&"one"));
    }

    #[test]
    fn remove_masks_older_values() {
        let v1 = Version::default().next();
        let v2 = v1.next();

        let mut value = Versioned::new();
        value.update(v1, 1);
        value.remove(v2);
        assert_eq!(value.get(v1), Some(&1));
        assert_eq!(value.get(v2), None);

        value.rollback(v2);
        assert_eq!(value.get(v2), Some(&1));
    }

    #[test]
    fn remove_of_new_value_leaves_nothing() {
        let v1 = Version::default().next();
        let mut value = Versioned::new();
        value.update(v1, 1);
        value.remove(v1);
        assert!(value.is_empty());
    }
}
