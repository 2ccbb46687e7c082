//! Decision gate
//!
//! Pure policy over the review checkpoints: given where the workflow
//! stands and how many improvement iterations have run, enumerate the
//! user's legal next actions. Cancelling a review requires a second,
//! explicit confirmation before the session is reset.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Which review checkpoint the user is at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStage {
    /// Metrics from the first training run are on screen.
    AfterTraining,
    /// Metrics from an improvement iteration are on screen.
    AfterImprovement,
}

/// A legal user action at a review checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    ProceedToDeployment,
    SendToImprovement,
    RejectAndReselect,
}

impl std::fmt::Display for UserAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UserAction::ProceedToDeployment => "proceed_to_deployment",
            UserAction::SendToImprovement => "send_to_improvement",
            UserAction::RejectAndReselect => "reject_and_reselect",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for UserAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proceed_to_deployment" => Ok(UserAction::ProceedToDeployment),
            "send_to_improvement" => Ok(UserAction::SendToImprovement),
            "reject_and_reselect" => Ok(UserAction::RejectAndReselect),
            _ => Err(Error::Validation(format!("invalid user action: {s}"))),
        }
    }
}

/// Enumerate the legal actions for a review checkpoint.
///
/// Deployment is always on the table. Another improvement round is offered
/// only below the iteration cap; rejecting the model is offered once an
/// improvement pass has been reviewed.
pub fn available_actions(
    stage: ReviewStage,
    improvement_iterations: u32,
    max_iterations: u32,
) -> Vec<UserAction> {
    match stage {
        ReviewStage::AfterTraining => vec![
            UserAction::ProceedToDeployment,
            UserAction::SendToImprovement,
        ],
        ReviewStage::AfterImprovement => {
            let mut actions = vec![UserAction::ProceedToDeployment];
            if improvement_iterations < max_iterations {
                actions.push(UserAction::SendToImprovement);
            }
            actions.push(UserAction::RejectAndReselect);
            actions
        }
    }
}

/// Whether one action is legal at a checkpoint.
pub fn is_allowed(
    action: UserAction,
    stage: ReviewStage,
    improvement_iterations: u32,
    max_iterations: u32,
) -> bool {
    available_actions(stage, improvement_iterations, max_iterations).contains(&action)
}

/// Two-stage cancellation: the first request arms the guard, only an
/// explicit confirmation fires it. Any other decision disarms it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CancellationGuard {
    armed: bool,
}

impl CancellationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// First stage: ask to cancel. Returns true if confirmation is now
    /// required.
    pub fn request(&mut self) -> bool {
        self.armed = true;
        self.armed
    }

    /// Second stage: confirm. Only succeeds after a request; consumes the
    /// armed state either way.
    pub fn confirm(&mut self) -> bool {
        std::mem::take(&mut self.armed)
    }

    /// Back out of a pending cancellation.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_after_training_actions() {
        let actions = available_actions(ReviewStage::AfterTraining, 0, 3);
        assert_eq!(
            actions,
            vec![UserAction::ProceedToDeployment, UserAction::SendToImprovement]
        );
    }

    #[test]
    fn test_after_improvement_below_cap() {
        let actions = available_actions(ReviewStage::AfterImprovement, 1, 3);
        assert!(actions.contains(&UserAction::ProceedToDeployment));
        assert!(actions.contains(&UserAction::SendToImprovement));
        assert!(actions.contains(&UserAction::RejectAndReselect));
    }

    #[test]
    fn test_after_improvement_at_cap() {
        let actions = available_actions(ReviewStage::AfterImprovement, 3, 3);
        assert!(!actions.contains(&UserAction::SendToImprovement));
        assert!(actions.contains(&UserAction::ProceedToDeployment));
        assert!(actions.contains(&UserAction::RejectAndReselect));
    }

    #[test]
    fn test_is_allowed() {
        assert!(is_allowed(UserAction::SendToImprovement, ReviewStage::AfterTraining, 0, 3));
        assert!(!is_allowed(UserAction::RejectAndReselect, ReviewStage::AfterTraining, 0, 3));
        assert!(!is_allowed(UserAction::SendToImprovement, ReviewStage::AfterImprovement, 3, 3));
    }

    #[test]
    fn test_action_string_roundtrip() {
        for action in [
            UserAction::ProceedToDeployment,
            UserAction::SendToImprovement,
            UserAction::RejectAndReselect,
        ] {
            assert_eq!(action.to_string().parse::<UserAction>().unwrap(), action);
        }
        assert!("ship_it".parse::<UserAction>().is_err());
    }

    #[test]
    fn test_cancellation_requires_two_stages() {
        let mut guard = CancellationGuard::new();
        // Confirming without requesting does nothing.
        assert!(!guard.confirm());

        assert!(guard.request());
        assert!(guard.is_armed());
        assert!(guard.confirm());
        // The armed state is consumed.
        assert!(!guard.confirm());
    }

    #[test]
    fn test_cancellation_disarm() {
        let mut guard = CancellationGuard::new();
        guard.request();
        guard.disarm();
        assert!(!guard.confirm());
    }

    #[cfg(test)]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Deployment is always legal; improvement is legal exactly
            /// below the cap; rejection only after an improvement review.
            #[test]
            fn action_policy_invariants(iterations in 0u32..10, max in 1u32..10) {
                for stage in [ReviewStage::AfterTraining, ReviewStage::AfterImprovement] {
                    let actions = available_actions(stage, iterations, max);
                    prop_assert!(actions.contains(&UserAction::ProceedToDeployment));
                    prop_assert_eq!(
                        actions.contains(&UserAction::RejectAndReselect),
                        stage == ReviewStage::AfterImprovement
                    );
                    if stage == ReviewStage::AfterImprovement {
                        prop_assert_eq!(
                            actions.contains(&UserAction::SendToImprovement),
                            iterations < max
                        );
                    }
                }
            }
        }
    }
}
