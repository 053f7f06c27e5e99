//! Store change observers.
//!
//! Observers fire once per committed transaction — including batches
//! and merged remote updates — never per individual operation, and run
//! synchronously on the committing thread. Local and remote changes go
//! through the same path; the only distinction a caller gets is the
//! origin carried in the [`ChangeSet`].

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Where a change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A write on this store instance.
    Local,
    /// A merged update from another replica.
    Remote,
}

/// The keys changed by one committed transaction.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    /// Keys whose live value was written, deleted, or repointed.
    pub keys: Vec<String>,
    /// Transaction origin.
    pub origin: ChangeOrigin,
}

type ChangeFn = Arc<dyn Fn(&ChangeSet) + Send + Sync>;

#[derive(Default)]
pub(crate) struct SubscriberSet {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, ChangeFn)>>,
}

impl SubscriberSet {
    pub(crate) fn subscribe(self: &Arc<Self>, cb: ChangeFn) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().push((id, cb));
        Subscription {
            id,
            set: Arc::downgrade(self),
        }
    }

    pub(crate) fn notify(&self, change: &ChangeSet) {
        // Snapshot so a callback may subscribe or cancel without
        // deadlocking.
        let callbacks: Vec<ChangeFn> =
            self.entries.lock().iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for cb in callbacks {
            cb(change);
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.entries.lock().retain(|(sub_id, _)| *sub_id != id);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Token for a registered store observer.
///
/// Cancelling is deterministic: after `cancel` returns, the callback
/// will not fire again.
pub struct Subscription {
    id: u64,
    set: Weak<SubscriberSet>,
}

impl Subscription {
    /// Removes the observer this token stands for.
    pub fn cancel(self) {
        if let Some(set) = self.set.upgrade() {
            set.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn notify_reaches_all_subscribers() {
        let set = Arc::new(SubscriberSet::default());
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&count);
        let _s1 = set.subscribe(Arc::new(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));
        let c2 = Arc::clone(&count);
        let _s2 = set.subscribe(Arc::new(move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
        }));

        set.notify(&ChangeSet {
            keys: vec!["k".into()],
            origin: ChangeOrigin::Local,
        });
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cancel_removes_subscriber() {
        let set = Arc::new(SubscriberSet::default());
        let sub = set.subscribe(Arc::new(|_| {}));
        assert_eq!(set.len(), 1);

        sub.cancel();
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn cancel_after_set_dropped_is_harmless() {
        let set = Arc::new(SubscriberSet::default());
        let sub = set.subscribe(Arc::new(|_| {}));
        drop(set);
        sub.cancel();
    }
}
