use std::ops::AddAssign;

/// Counts of what one run did to the destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub directories_created: usize,
    pub copied: usize,
    pub skipped: usize,
    pub deleted_files: usize,
    pub deleted_directories: usize,
}

impl SyncReport {
    pub fn merge(&mut self, other: SyncReport) {
        self.directories_created += other.directories_created;
        self.copied += other.copied;
        self.skipped += other.skipped;
        self.deleted_files += other.deleted_files;
        self.deleted_directories += other.deleted_directories;
    }

    pub fn deletes(&self) -> usize {
        self.deleted_files + self.deleted_directories
    }

    pub(crate) fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Copied => self.copied += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::DeletedFile => self.deleted_files += 1,
            Outcome::DeletedSubtree(removed) => {
                self.deleted_files += removed.files;
                self.deleted_directories += removed.directories;
            }
        }
    }
}

/// Result of executing a single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Copied,
    Skipped,
    DeletedFile,
    DeletedSubtree(Removed),
}

/// Entries removed by a subtree delete, the subtree root included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Removed {
    pub files: usize,
    pub directories: usize,
}

impl AddAssign for Removed {
    fn add_assign(&mut self, other: Removed) {
        self.files += other.files;
        self.directories += other.directories;
    }
}
