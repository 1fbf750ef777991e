//! Admission scheduling.
//!
//! Decides when a `pending` task may start. Like the registry it is pure
//! and synchronous; the queue facade runs it after every state change.

use lightbox_core::UploadStatus;

use crate::registry::{UploadRegistry, UploadTask};

/// Concurrency gate over the registry.
#[derive(Debug, Clone)]
pub struct AdmissionScheduler {
    ceiling: usize,
    paused: bool,
}

impl AdmissionScheduler {
    /// Create a scheduler admitting at most `ceiling` transfers at once.
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling: ceiling.max(1),
            paused: false,
        }
    }

    /// Maximum simultaneous transfers.
    pub const fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Whether admission is suspended.
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Suspend admission.
    pub const fn pause(&mut self) {
        self.paused = true;
    }

    /// Allow admission again.
    pub const fn resume(&mut self) {
        self.paused = false;
    }

    /// Admit the next task if a slot is free.
    ///
    /// `active` is the number of transfers currently holding a slot. On
    /// success the earliest `pending` task is moved to `uploading` and a
    /// copy of it is returned. Callers loop until this yields `None`.
    pub fn admit_next(&self, registry: &mut UploadRegistry, active: usize) -> Option<UploadTask> {
        if self.paused || active >= self.ceiling {
            return None;
        }

        let id = registry.next_pending()?;
        registry
            .transition(&id, UploadStatus::Uploading, None)
            .ok()
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lightbox_core::{NewUpload, WriteTarget};

    use super::*;
    use crate::sources::MemorySource;

    fn registry_of(n: usize) -> UploadRegistry {
        let mut registry = UploadRegistry::new();
        registry.enqueue(
            (0..n)
                .map(|i| {
                    NewUpload::new(
                        format!("IMG_{i:04}.jpg"),
                        3,
                        "image/jpeg",
                        WriteTarget::new("https://put.example", "https://cdn.example", "k"),
                        Arc::new(MemorySource::new(b"abc".to_vec())),
                    )
                })
                .collect(),
        );
        registry
    }

    #[test]
    fn test_admits_up_to_ceiling() {
        let mut registry = registry_of(7);
        let scheduler = AdmissionScheduler::new(5);

        let mut active = 0;
        while scheduler.admit_next(&mut registry, active).is_some() {
            active += 1;
        }

        assert_eq!(active, 5);
        assert_eq!(registry.count(UploadStatus::Uploading), 5);
        assert_eq!(registry.count(UploadStatus::Pending), 2);
    }

    #[test]
    fn test_paused_admits_nothing() {
        let mut registry = registry_of(2);
        let mut scheduler = AdmissionScheduler::new(5);

        scheduler.pause();
        assert!(scheduler.is_paused());
        assert!(scheduler.admit_next(&mut registry, 0).is_none());

        scheduler.resume();
        let admitted = scheduler.admit_next(&mut registry, 0).unwrap();
        assert_eq!(admitted.status(), UploadStatus::Uploading);
    }

    #[test]
    fn test_empty_registry() {
        let mut registry = UploadRegistry::new();
        let scheduler = AdmissionScheduler::new(1);
        assert!(scheduler.admit_next(&mut registry, 0).is_none());
    }

    #[test]
    fn test_zero_ceiling_is_floored() {
        assert_eq!(AdmissionScheduler::new(0).ceiling(), 1);
    }
}
