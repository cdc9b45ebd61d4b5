use std::{
    cell::RefCell,
    collections::BTreeMap,
    ops::{Deref, DerefMut},
    rc::Rc,
};

/// Category of a resource acquired while a view is mounted, declared in
/// teardown order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Controls,
    RenderSurface,
    Geometry,
    Material,
    Uniform,
    Texture,
}

/// Anything that holds GPU state (or input hooks) which must be given back.
pub trait Release {
    fn release(&mut self);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub acquired: u32,
    pub released: u32,
}

impl Counts {
    pub fn live(&self) -> u32 {
        self.acquired - self.released
    }
}

/// Book-keeping of every tracked acquisition and release.
///
/// Cloning the ledger shares the same records, so every [`Tracked`] handle
/// reports back to the ledger that created it. Single threaded: the frame
/// loop, input handling and teardown all run on the event loop thread.
#[derive(Debug, Clone, Default)]
pub struct ResourceLedger {
    records: Rc<RefCell<Records>>,
}

#[derive(Debug, Default)]
struct Records {
    counts: BTreeMap<ResourceKind, Counts>,
    releases: Vec<(ResourceKind, &'static str)>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `inner` and record its acquisition.
    pub fn track<T: Release>(
        &self,
        kind: ResourceKind,
        label: &'static str,
        inner: T,
    ) -> Tracked<T> {
        self.records.borrow_mut().counts.entry(kind).or_default().acquired += 1;
        tracing::trace!(?kind, label, "acquired");
        Tracked {
            inner,
            kind,
            label,
            ledger: self.clone(),
            released: false,
        }
    }

    fn record_release(&self, kind: ResourceKind, label: &'static str) {
        let mut records = self.records.borrow_mut();
        records.counts.entry(kind).or_default().released += 1;
        records.releases.push((kind, label));
    }

    pub fn counts(&self, kind: ResourceKind) -> Counts {
        self.records
            .borrow()
            .counts
            .get(&kind)
            .copied()
            .unwrap_or_default()
    }

    /// Number of handles acquired but not yet released, across all kinds.
    pub fn live(&self) -> u32 {
        self.records.borrow().counts.values().map(Counts::live).sum()
    }

    /// Every release so far, oldest first.
    pub fn release_log(&self) -> Vec<(ResourceKind, &'static str)> {
        self.records.borrow().releases.clone()
    }

    pub fn is_balanced(&self) -> bool {
        self.live() == 0
    }
}

/// Scoped handle whose release runs exactly once, either through an explicit
/// [`Tracked::release`] or when the handle is dropped.
pub struct Tracked<T: Release> {
    inner: T,
    kind: ResourceKind,
    label: &'static str,
    ledger: ResourceLedger,
    released: bool,
}

impl<T: Release> Tracked<T> {
    /// Release the wrapped resource. Returns `false` if it was already released.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.inner.release();
        self.released = true;
        self.ledger.record_release(self.kind, self.label);
        tracing::debug!(kind = ?self.kind, label = self.label, "released");
        true
    }
}

impl<T: Release> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: Release> DerefMut for Tracked<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: Release> Drop for Tracked<T> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counter(Rc<Cell<u32>>);

    impl Release for Counter {
        fn release(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn release_runs_once() {
        let ledger = ResourceLedger::new();
        let calls = Rc::new(Cell::new(0));
        let mut handle = ledger.track(ResourceKind::Texture, "counter", Counter(calls.clone()));

        assert_eq!(ledger.live(), 1);
        assert!(handle.release());
        assert!(!handle.release());
        drop(handle);

        assert_eq!(calls.get(), 1);
        assert_eq!(
            ledger.counts(ResourceKind::Texture),
            Counts {
                acquired: 1,
                released: 1
            }
        );
        assert!(ledger.is_balanced());
    }

    #[test]
    fn drop_releases_unreleased_handle() {
        let ledger = ResourceLedger::new();
        let calls = Rc::new(Cell::new(0));
        {
            let _handle = ledger.track(ResourceKind::Geometry, "counter", Counter(calls.clone()));
            assert!(!ledger.is_balanced());
        }
        assert_eq!(calls.get(), 1);
        assert!(ledger.is_balanced());
    }

    #[test]
    fn counts_are_per_kind() {
        let ledger = ResourceLedger::new();
        let calls = Rc::new(Cell::new(0));
        let mut a = ledger.track(ResourceKind::Material, "a", Counter(calls.clone()));
        let _b = ledger.track(ResourceKind::Material, "b", Counter(calls.clone()));
        let _c = ledger.track(ResourceKind::Controls, "c", Counter(calls.clone()));

        a.release();

        assert_eq!(ledger.counts(ResourceKind::Material).live(), 1);
        assert_eq!(ledger.counts(ResourceKind::Controls).live(), 1);
        assert_eq!(ledger.counts(ResourceKind::Texture), Counts::default());
        assert_eq!(ledger.live(), 2);
    }

    #[test]
    fn release_log_keeps_order_and_skips_repeats() {
        let ledger = ResourceLedger::new();
        let calls = Rc::new(Cell::new(0));
        let mut texture = ledger.track(ResourceKind::Texture, "map", Counter(calls.clone()));
        let mut controls = ledger.track(ResourceKind::Controls, "orbit", Counter(calls.clone()));

        controls.release();
        texture.release();
        controls.release();
        drop(texture);

        assert_eq!(
            ledger.release_log(),
            vec![
                (ResourceKind::Controls, "orbit"),
                (ResourceKind::Texture, "map")
            ]
        );
    }
}
