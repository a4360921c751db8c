//! Round-robin ring of operator credential bundles
//!
//! Each harvest run snapshots one bundle at start via [`CredentialRotator::next`];
//! hot add/remove mutates the ring without disturbing in-flight runs. The
//! ring is process-global with an instance API for tests.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::records::CredentialBundle;

#[derive(Debug, Default)]
struct Ring {
    bundles: Vec<CredentialBundle>,
    cursor: usize,
}

/// Fair round-robin hand-out of credential bundles.
#[derive(Debug, Default)]
pub struct CredentialRotator {
    ring: Mutex<Ring>,
}

impl CredentialRotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole ring and reset the cursor.
    pub fn set_all(&self, bundles: Vec<CredentialBundle>) {
        let mut ring = self.ring.lock();
        ring.bundles = bundles;
        ring.cursor = 0;
    }

    pub fn add(&self, bundle: CredentialBundle) {
        self.ring.lock().bundles.push(bundle);
    }

    /// Remove the bundle at `index`; out-of-range indices are ignored.
    /// The cursor is pulled back when it would overflow the shrunk ring.
    pub fn remove_at(&self, index: usize) {
        let mut ring = self.ring.lock();
        if index >= ring.bundles.len() {
            return;
        }
        ring.bundles.remove(index);
        if ring.cursor > index {
            ring.cursor -= 1;
        }
        if !ring.bundles.is_empty() {
            let len = ring.bundles.len();
            ring.cursor %= len;
        } else {
            ring.cursor = 0;
        }
    }

    pub fn count(&self) -> usize {
        self.ring.lock().bundles.len()
    }

    /// Index the next `next()` call will hand out.
    pub fn current_index(&self) -> usize {
        self.ring.lock().cursor
    }

    /// Hand out the cursor element and advance modulo size.
    ///
    /// An empty ring yields `None`; the harvest may still run anonymously
    /// and will usually hit the login wall.
    pub fn next(&self) -> Option<CredentialBundle> {
        let mut ring = self.ring.lock();
        if ring.bundles.is_empty() {
            return None;
        }
        let bundle = ring.bundles[ring.cursor].clone();
        ring.cursor = (ring.cursor + 1) % ring.bundles.len();
        Some(bundle)
    }
}

/// Process-global rotator shared by all harvest entry points.
static GLOBAL_ROTATOR: Lazy<Arc<CredentialRotator>> =
    Lazy::new(|| Arc::new(CredentialRotator::new()));

pub fn global_rotator() -> Arc<CredentialRotator> {
    Arc::clone(&GLOBAL_ROTATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::CookieEntry;
    use proptest::prelude::*;

    fn bundle(tag: &str) -> CredentialBundle {
        CredentialBundle {
            cookies: vec![CookieEntry {
                name: "auth_token".into(),
                value: tag.into(),
                domain: None,
                path: None,
            }],
        }
    }

    fn tag_of(b: &CredentialBundle) -> String {
        b.cookies[0].value.clone()
    }

    #[test]
    fn empty_ring_yields_none() {
        let rotator = CredentialRotator::new();
        assert_eq!(rotator.next(), None);
        assert_eq!(rotator.count(), 0);
    }

    #[test]
    fn round_robin_is_fair() {
        let rotator = CredentialRotator::new();
        rotator.set_all(vec![bundle("a"), bundle("b"), bundle("c")]);

        let seen: Vec<String> = (0..3).map(|_| tag_of(&rotator.next().unwrap())).collect();
        assert_eq!(seen, ["a", "b", "c"]);
        // wraps around
        assert_eq!(tag_of(&rotator.next().unwrap()), "a");
    }

    #[test]
    fn remove_shifts_cursor_on_overflow() {
        let rotator = CredentialRotator::new();
        rotator.set_all(vec![bundle("a"), bundle("b"), bundle("c")]);
        rotator.next();
        rotator.next(); // cursor now at index 2 ("c")

        rotator.remove_at(2);
        assert_eq!(rotator.count(), 2);
        // cursor clamped back into range
        assert_eq!(tag_of(&rotator.next().unwrap()), "a");
    }

    #[test]
    fn remove_before_cursor_keeps_position() {
        let rotator = CredentialRotator::new();
        rotator.set_all(vec![bundle("a"), bundle("b"), bundle("c")]);
        rotator.next(); // cursor -> 1

        rotator.remove_at(0);
        assert_eq!(tag_of(&rotator.next().unwrap()), "b");
    }

    #[test]
    fn add_during_harvest_does_not_reorder_handouts() {
        let rotator = CredentialRotator::new();
        rotator.set_all(vec![bundle("a"), bundle("b")]);
        let in_flight = rotator.next().unwrap();
        rotator.add(bundle("late"));

        assert_eq!(tag_of(&in_flight), "a");
        assert_eq!(tag_of(&rotator.next().unwrap()), "b");
        assert_eq!(tag_of(&rotator.next().unwrap()), "late");
    }

    proptest! {
        /// With N credentials, N consecutive next() calls hand out each
        /// bundle exactly once.
        #[test]
        fn n_calls_cover_all_credentials(n in 1usize..12) {
            let rotator = CredentialRotator::new();
            let tags: Vec<String> = (0..n).map(|i| format!("c{i}")).collect();
            rotator.set_all(tags.iter().map(|t| bundle(t)).collect());

            let mut seen: Vec<String> =
                (0..n).map(|_| tag_of(&rotator.next().unwrap())).collect();
            seen.sort();
            let mut expected = tags.clone();
            expected.sort();
            prop_assert_eq!(seen, expected);
        }
    }
}
