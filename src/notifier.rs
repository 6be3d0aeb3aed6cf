//! Attribute change reporting.
//!
//! Drivers implement `mark_attribute_dirty` by handing the path to a
//! [`DirtyReporter`]. The reporting side (a subscription processor, or the
//! demo's log loop) waits on the reporter and drains the queued paths.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use parking_lot::Mutex;

use crate::clusters::fan_control::AttributePath;

/// Queue of dirty attribute paths plus a wake-up signal for the reporter.
///
/// Marking the same path twice before it is drained reports it once.
pub struct DirtyReporter {
    signal: Signal<CriticalSectionRawMutex, ()>,
    pending: Mutex<Vec<AttributePath>>,
}

impl Default for DirtyReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl DirtyReporter {
    pub fn new() -> Self {
        Self {
            signal: Signal::new(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Queue `path` and wake the reporter. Non-blocking.
    pub fn mark_dirty(&self, path: AttributePath) {
        {
            let mut pending = self.pending.lock();
            if !pending.contains(&path) {
                pending.push(path);
            }
        }
        self.signal.signal(());
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Drain the queued paths in the order they were first marked.
    pub fn take_pending(&self) -> Vec<AttributePath> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Wait until something is marked, then drain.
    pub async fn wait(&self) -> Vec<AttributePath> {
        loop {
            self.signal.wait().await;
            let pending = self.take_pending();
            // A signal can outlive a drain done by take_pending
            if !pending.is_empty() {
                return pending;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clusters::fan_control::AttributeId;

    #[test]
    fn test_duplicate_marks_are_coalesced() {
        let reporter = DirtyReporter::new();
        reporter.mark_dirty(AttributePath::new(1, AttributeId::SpeedSetting));
        reporter.mark_dirty(AttributePath::new(1, AttributeId::FanMode));
        reporter.mark_dirty(AttributePath::new(1, AttributeId::SpeedSetting));

        let pending = reporter.take_pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].attribute_id, AttributeId::SpeedSetting);
        assert_eq!(pending[0].cluster_id, 0x0202);
        assert!(!reporter.has_pending());
    }

    #[test]
    fn test_wait_returns_marked_paths() {
        let reporter = DirtyReporter::new();
        reporter.mark_dirty(AttributePath::new(2, AttributeId::RockSetting));

        let pending = tokio_test::block_on(reporter.wait());
        assert_eq!(pending, vec![AttributePath::new(2, AttributeId::RockSetting)]);
    }
}
