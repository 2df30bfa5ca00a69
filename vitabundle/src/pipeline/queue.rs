//! FIFO of bundles waiting to be unpacked and sealed.

use std::collections::VecDeque;
use std::path::PathBuf;

use crate::manager::{BundleDescriptor, BundleId};

/// One bundle to extract and seal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackJob {
    /// Archive to extract.
    pub archive_path: PathBuf,
    /// Identifier the sealed output is written under.
    pub bundle_id: BundleId,
}

impl UnpackJob {
    /// Create a job.
    pub fn new(archive_path: PathBuf, bundle_id: BundleId) -> Self {
        Self {
            archive_path,
            bundle_id,
        }
    }
}

impl From<&BundleDescriptor> for UnpackJob {
    fn from(descriptor: &BundleDescriptor) -> Self {
        Self::new(
            descriptor.archive_path.clone(),
            descriptor.bundle_id.clone(),
        )
    }
}

/// Jobs in the order they will run.
#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    jobs: VecDeque<UnpackJob>,
}

impl PendingQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the selected bundles in order, then the primary job last.
    pub fn with_primary_last<'a>(
        selected: impl IntoIterator<Item = &'a BundleDescriptor>,
        primary: UnpackJob,
    ) -> Self {
        let mut queue: Self = selected.into_iter().map(UnpackJob::from).collect();
        queue.push(primary);
        queue
    }

    /// Append a job.
    pub fn push(&mut self, job: UnpackJob) {
        self.jobs.push_back(job);
    }

    /// Take the next job.
    pub fn pop(&mut self) -> Option<UnpackJob> {
        self.jobs.pop_front()
    }

    /// The next job, without removing it.
    pub fn peek(&self) -> Option<&UnpackJob> {
        self.jobs.front()
    }

    /// Drop every pending job.
    pub fn clear(&mut self) {
        self.jobs.clear();
    }

    /// Number of pending jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Pending jobs in run order.
    pub fn iter(&self) -> impl Iterator<Item = &UnpackJob> {
        self.jobs.iter()
    }
}

impl FromIterator<UnpackJob> for PendingQueue {
    fn from_iter<I: IntoIterator<Item = UnpackJob>>(iter: I) -> Self {
        Self {
            jobs: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str) -> BundleDescriptor {
        BundleDescriptor {
            archive_path: PathBuf::from(format!("/bundles/{}.zip", id)),
            bundle_id: BundleId::parse(id).unwrap(),
            display_name: id.to_string(),
        }
    }

    #[test]
    fn test_primary_is_last() {
        let selected = [descriptor("PCSE00002"), descriptor("PCSE00001")];
        let primary = UnpackJob::new(
            PathBuf::from("/bundles/h-encore.zip"),
            BundleId::parse("PCSG90096").unwrap(),
        );

        let mut queue = PendingQueue::with_primary_last(&selected, primary);
        assert_eq!(queue.len(), 3);

        let order: Vec<String> = std::iter::from_fn(|| queue.pop())
            .map(|job| job.bundle_id.to_string())
            .collect();
        assert_eq!(order, ["PCSE00002", "PCSE00001", "PCSG90096"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut queue: PendingQueue = [descriptor("PCSE00001"), descriptor("PCSE00002")]
            .iter()
            .map(UnpackJob::from)
            .collect();
        assert_eq!(queue.peek().unwrap().bundle_id.as_str(), "PCSE00001");

        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
    }
}
