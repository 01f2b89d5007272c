use std::sync::Mutex;

/// Single-slot latest-wins buffer.
///
/// Holds at most one item; every `store` replaces what was there. Used for
/// the command issued while the robot link is down, and by the relay client
/// for the command issued while the broker is unreachable.
#[derive(Debug)]
pub struct PendingBuffer<T> {
    slot: Mutex<Option<T>>,
}

impl<T> Default for PendingBuffer<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<T> PendingBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `item`, returning the entry it displaced.
    pub fn store(&self, item: T) -> Option<T> {
        self.lock().replace(item)
    }

    /// Stores `item` unless the current entry should be kept. Returns whether
    /// `item` was stored.
    pub fn store_unless(&self, item: T, keep: impl FnOnce(&T) -> bool) -> bool {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(keep) {
            return false;
        }
        *slot = Some(item);
        true
    }

    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<T>> {
        // The slot stays consistent even if a holder panicked mid-replace.
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone> PendingBuffer<T> {
    pub fn peek(&self) -> Option<T> {
        self.lock().clone()
    }
}
