//! Deployment state machine
//!
//! A pure function from (current deployment state, the instance state that
//! just changed, every instance state, policy flags) to a [`Transition`].
//! Nothing here performs I/O; the manager applies the transition, appending
//! one state event per committed change and executing the obligations in
//! order.
//!
//! ```text
//! NEW --launch--> PENDING --all running--> RUNNING --instance leaves RUNNING--> INCOMPLETE
//!                    |                        ^                                   |
//!                    |                        +-----------all running-------------+
//!                    +--instance failed--> ROLLBACK_IN_PROGRESS --all inactive--> ROLLBACK_COMPLETE
//!                                                 |
//!                                                 +--stop failed--> ROLLBACK_FAILED
//! any (outside rollback) --user stop--> SHUTTING_DOWN --all inactive--> STOPPED
//!                                            |
//!                                            +--instance comes up--> stop it
//! ```
//!
//! ROLLBACK_IN_PROGRESS and ROLLBACK_FAILED are committed by the rollback
//! controller, SHUTTING_DOWN and PENDING by the manager; everything else is
//! decided here.

use flotilla_types::{all_running, DeploymentState, InstanceState};

/// Side effect the caller must carry out after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Obligation {
    /// Record `instance_launch_failed` for the triggering instance
    RecordLaunchFailure,
    /// Hand the deployment to the rollback controller
    StartRollback,
    /// Stop the triggering instance
    StopInstance,
    /// Delete the deployment and its history
    Destroy,
}

/// Outcome of one evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    /// State to commit, if it differs from the current one
    pub next: Option<DeploymentState>,
    pub obligations: Vec<Obligation>,
}

impl Transition {
    fn none() -> Self {
        Self::default()
    }

    fn to(next: DeploymentState) -> Self {
        Self {
            next: Some(next),
            obligations: Vec::new(),
        }
    }

    fn with(mut self, obligation: Obligation) -> Self {
        self.obligations.push(obligation);
        self
    }

    pub fn is_noop(&self) -> bool {
        self.next.is_none() && self.obligations.is_empty()
    }
}

/// Everything the machine looks at
#[derive(Debug, Clone, Copy)]
pub struct MachineInput<'a> {
    pub current: DeploymentState,
    /// New state of the instance whose change triggered the evaluation
    pub trigger: InstanceState,
    /// States of every instance, trigger included
    pub instances: &'a [InstanceState],
    pub partial_launch: bool,
    pub scheduled_for_deletion: bool,
}

/// Evaluate one instance state change
pub fn evaluate(input: MachineInput<'_>) -> Transition {
    let transition = match input.current {
        DeploymentState::New => Transition::none(),
        DeploymentState::Pending => from_pending(&input),
        DeploymentState::Running => {
            if input.trigger != InstanceState::Running {
                Transition::to(DeploymentState::Incomplete)
            } else {
                Transition::none()
            }
        }
        DeploymentState::Incomplete => {
            if all_running(input.instances) {
                Transition::to(DeploymentState::Running)
            } else {
                Transition::none()
            }
        }
        DeploymentState::ShuttingDown => {
            if input.trigger == InstanceState::Running {
                // Was still pending when the stop went out
                Transition::none().with(Obligation::StopInstance)
            } else if input.trigger == InstanceState::Stopped && all_inactive(input.instances) {
                Transition::to(DeploymentState::Stopped)
            } else {
                Transition::none()
            }
        }
        DeploymentState::RollbackInProgress => {
            if all_inactive(input.instances) {
                Transition::to(DeploymentState::RollbackComplete)
            } else if input.trigger == InstanceState::Running {
                // An instance came up after the rollback started
                Transition::none().with(Obligation::StartRollback)
            } else {
                Transition::none()
            }
        }
        DeploymentState::Failed
        | DeploymentState::Stopped
        | DeploymentState::RollbackComplete
        | DeploymentState::RollbackFailed => Transition::none(),
    };

    with_destroy(transition, &input)
}

fn from_pending(input: &MachineInput<'_>) -> Transition {
    if all_running(input.instances) {
        return Transition::to(DeploymentState::Running);
    }

    if input.partial_launch {
        let settled = input.instances.iter().all(|s| s.is_failed_or_running());
        if settled {
            let any_running = input.instances.contains(&InstanceState::Running);
            return Transition::to(if any_running {
                DeploymentState::Running
            } else {
                DeploymentState::Failed
            });
        }
        return Transition::none();
    }

    if input.trigger.is_failed() {
        return Transition::none()
            .with(Obligation::RecordLaunchFailure)
            .with(Obligation::StartRollback);
    }

    Transition::none()
}

/// Ask for destruction once a deployment flagged for deletion is terminal
/// with nothing left running.
fn with_destroy(transition: Transition, input: &MachineInput<'_>) -> Transition {
    let resulting = transition.next.unwrap_or(input.current);
    if input.scheduled_for_deletion && resulting.is_terminal() && all_inactive(input.instances) {
        transition.with(Obligation::Destroy)
    } else {
        transition
    }
}

fn all_inactive(states: &[InstanceState]) -> bool {
    states.iter().all(|s| s.is_inactive())
}
