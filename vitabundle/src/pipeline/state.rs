//! Pipeline states and the transition table.

use std::fmt;

/// Stage the pipeline is in.
///
/// Exactly one state is active. The controller moves between states only in
/// response to completion events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Nothing started yet.
    Idle,
    /// Verifying cached artifacts.
    CheckingCache,
    /// Downloading the demo package.
    Downloading,
    /// Verifying a fresh download.
    VerifyingDownload,
    /// Decrypting the demo package or extracting the primary bundle.
    UnpackingPrimary,
    /// Extracting a user-selected bundle.
    UnpackingQueued,
    /// Pruning and sealing the last extracted bundle.
    Sealing,
    /// Every job has been sealed.
    Drained,
    /// A stage failed; nothing more will run.
    Failed,
}

impl PipelineState {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Drained | Self::Failed)
    }

    /// Whether the transition `self -> next` is allowed.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;

        if next == Failed {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Idle, CheckingCache)
                | (CheckingCache, UnpackingPrimary)
                | (CheckingCache, UnpackingQueued)
                | (CheckingCache, Downloading)
                | (Downloading, VerifyingDownload)
                | (VerifyingDownload, UnpackingPrimary)
                // decrypted demo, then the first queued job
                | (UnpackingPrimary, UnpackingPrimary)
                | (UnpackingPrimary, UnpackingQueued)
                | (UnpackingPrimary, Sealing)
                | (UnpackingQueued, Sealing)
                | (Sealing, UnpackingQueued)
                | (Sealing, UnpackingPrimary)
                | (Sealing, Drained)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Idle => "idle",
            Self::CheckingCache => "checking cache",
            Self::Downloading => "downloading",
            Self::VerifyingDownload => "verifying download",
            Self::UnpackingPrimary => "unpacking primary bundle",
            Self::UnpackingQueued => "unpacking queued bundle",
            Self::Sealing => "sealing",
            Self::Drained => "done",
            Self::Failed => "failed",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineState::*;

    const ALL: [PipelineState; 9] = [
        Idle,
        CheckingCache,
        Downloading,
        VerifyingDownload,
        UnpackingPrimary,
        UnpackingQueued,
        Sealing,
        Drained,
        Failed,
    ];

    #[test]
    fn test_download_path() {
        let path = [
            Idle,
            CheckingCache,
            Downloading,
            VerifyingDownload,
            UnpackingPrimary,
            UnpackingQueued,
            Sealing,
            UnpackingPrimary,
            Sealing,
            Drained,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be allowed",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_cache_hit_skips_download() {
        assert!(CheckingCache.can_transition_to(UnpackingPrimary));
        assert!(!CheckingCache.can_transition_to(VerifyingDownload));
        assert!(!Idle.can_transition_to(Downloading));
    }

    #[test]
    fn test_any_live_state_can_fail() {
        for state in ALL {
            assert_eq!(state.can_transition_to(Failed), !state.is_terminal());
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for next in ALL {
            assert!(!Drained.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Sealing.to_string(), "sealing");
        assert_eq!(CheckingCache.to_string(), "checking cache");
    }
}
