//! Package Install State Machine
//!
//! Tracks the lifecycle of a firmware package on a download/install driver:
//! download, queue for install, install, and the final outcome.

/// Lifecycle state of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallState {
    /// Nothing downloaded, ready for a new package
    #[default]
    Idle,
    /// Chunks are being written to the staging file
    Downloading,
    /// Last chunk received, staging file complete
    Downloaded,
    /// Install requested, waiting for the delayed install job
    QueuedForInstall,
    /// Hardware is applying the package
    Installing,
    /// Hardware reported a successful install
    Complete,
    /// Install could not be started or hardware reported an error
    Failed,
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallEvent {
    /// A package chunk was appended to the staging file
    ChunkWritten,
    /// The last chunk of a package was appended
    DownloadComplete,
    /// Install was executed by the management server
    InstallRequested,
    /// Delayed install job handed the package to the hardware
    InstallStarted,
    /// Hardware reported install success
    InstallSucceeded,
    /// Install trigger or hardware install failed
    InstallFailed,
    /// Uninstall was executed, state is reset
    Reset,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and state changed (or stayed the same)
    Success(InstallState),
    /// Transition was invalid from current state
    Invalid {
        from: InstallState,
        event: InstallEvent,
    },
}

/// The install state machine for one driver instance
#[derive(Debug, Default)]
pub struct InstallStateMachine {
    current_state: InstallState,
}

impl InstallStateMachine {
    /// Create a new state machine in Idle state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current state
    pub fn state(&self) -> InstallState {
        self.current_state
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: InstallEvent) -> TransitionResult {
        match self.get_next_state(event) {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    /// Get the next state for a given event, if the transition is valid
    fn get_next_state(&self, event: InstallEvent) -> Option<InstallState> {
        use InstallEvent::*;
        use InstallState::*;

        match (self.current_state, event) {
            // Uninstall resets from anywhere
            (_, Reset) => Some(Idle),

            // Hardware outcome may arrive late, after a reset or a new download
            (_, InstallSucceeded) => Some(Complete),
            (_, InstallFailed) => Some(Failed),

            // The hardware owns the staging file while installing
            (Installing, ChunkWritten | DownloadComplete) => None,
            (_, ChunkWritten) => Some(Downloading),
            (_, DownloadComplete) => Some(Downloaded),

            (Installing, InstallRequested) => None,
            (_, InstallRequested) => Some(QueuedForInstall),

            (QueuedForInstall, InstallStarted) => Some(Installing),

            _ => None,
        }
    }
}

/// Whether the state is terminal for the current package
pub fn is_finished(state: InstallState) -> bool {
    matches!(state, InstallState::Complete | InstallState::Failed)
}
