//! Cycle state machine.

use std::fmt;

use serde::Serialize;

/// Stage of one issuance-and-deploy cycle.
///
/// ```text
/// Start -> ResolvingHosts -> Challenging -> Verifying -> Deploying
///       -> TestingConfig -> Committing -> Done
///
/// ResolvingHosts | Challenging | Verifying           -> Failed
/// Deploying | TestingConfig | Committing -> RollingBack -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleState {
    Start,
    ResolvingHosts,
    Challenging,
    Verifying,
    Deploying,
    TestingConfig,
    Committing,
    Done,
    RollingBack,
    Failed,
}

impl CycleState {
    /// Whether `self -> next` is a legal transition
    pub fn can_advance(self, next: CycleState) -> bool {
        use CycleState::*;
        matches!(
            (self, next),
            (Start, ResolvingHosts)
                | (ResolvingHosts, Challenging)
                | (Challenging, Verifying)
                | (Verifying, Deploying)
                | (Deploying, TestingConfig)
                | (TestingConfig, Committing)
                | (Committing, Done)
                | (Deploying | TestingConfig | Committing, RollingBack)
                | (Start | ResolvingHosts | Challenging | Verifying, Failed)
                | (RollingBack, Failed)
        )
    }

    /// States in which the installer's configuration may differ from the
    /// last durable checkpoint
    pub fn mutates_configuration(self) -> bool {
        matches!(
            self,
            CycleState::Deploying | CycleState::TestingConfig | CycleState::Committing
        )
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CycleState::Start => "start",
            CycleState::ResolvingHosts => "resolving-hosts",
            CycleState::Challenging => "challenging",
            CycleState::Verifying => "verifying",
            CycleState::Deploying => "deploying",
            CycleState::TestingConfig => "testing-config",
            CycleState::Committing => "committing",
            CycleState::Done => "done",
            CycleState::RollingBack => "rolling-back",
            CycleState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CycleState::*;

    const ALL: [CycleState; 10] = [
        Start,
        ResolvingHosts,
        Challenging,
        Verifying,
        Deploying,
        TestingConfig,
        Committing,
        Done,
        RollingBack,
        Failed,
    ];

    #[test]
    fn test_happy_path() {
        let path = [
            Start,
            ResolvingHosts,
            Challenging,
            Verifying,
            Deploying,
            TestingConfig,
            Committing,
            Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_mutating_states_must_roll_back() {
        for state in ALL.iter().filter(|s| s.mutates_configuration()) {
            assert!(state.can_advance(RollingBack));
            assert!(!state.can_advance(Failed));
        }
        assert!(!Verifying.can_advance(RollingBack));
        assert!(Verifying.can_advance(Failed));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for state in [Done, Failed] {
            assert!(ALL.iter().all(|next| !state.can_advance(*next)));
        }
    }
}
