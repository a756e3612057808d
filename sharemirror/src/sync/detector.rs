/// Why a file has to be copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyReason {
    Missing,
    SizeMismatch { source: u64, destination: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDecision {
    Copy(CopyReason),
    Skip,
    /// The source file disappeared after it was listed.
    SourceVanished,
}

/// Decides whether a file needs copying from the sizes on both sides.
///
/// Only existence and size are compared. Two files of equal size are treated
/// as synchronized even when their contents differ.
pub fn decide(source_size: Option<u64>, destination_size: Option<u64>) -> CopyDecision {
    let Some(source) = source_size else {
        return CopyDecision::SourceVanished;
    };
    match destination_size {
        None => CopyDecision::Copy(CopyReason::Missing),
        Some(destination) if destination == source => CopyDecision::Skip,
        Some(destination) => CopyDecision::Copy(CopyReason::SizeMismatch {
            source,
            destination,
        }),
    }
}
