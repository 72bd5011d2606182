// Declarative transition table over Status

use crate::domain::Status;

/// Processor-side work fired while a transition is applied. `Before` hooks
/// run with the state still at the source and abort the transition on error;
/// `After` hooks run with the state already at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    LoadData,
    StartRun,
}

/// Events that drive the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Proceed,
    Suspend,
    Succeeded,
    Error,
    Expired,
    Revoke,
}

pub struct TransitionDef {
    pub trigger: Trigger,
    pub sources: &'static [Status],
    pub dest: Status,
    pub before: Option<Hook>,
    pub after: Option<Hook>,
}

/// The whole lifecycle, evaluated in declaration order. Terminal states
/// appear in no source set.
pub const TRANSITIONS: &[TransitionDef] = &[
    TransitionDef {
        trigger: Trigger::Proceed,
        sources: &[Status::Pending],
        dest: Status::VariablesLoaded,
        before: Some(Hook::LoadData),
        after: None,
    },
    TransitionDef {
        trigger: Trigger::Proceed,
        sources: &[Status::VariablesLoaded, Status::Retry],
        dest: Status::Running,
        before: None,
        after: Some(Hook::StartRun),
    },
    TransitionDef {
        trigger: Trigger::Suspend,
        sources: &[Status::Running],
        dest: Status::Suspended,
        before: None,
        after: None,
    },
    TransitionDef {
        trigger: Trigger::Succeeded,
        sources: &[Status::Running],
        dest: Status::Success,
        before: None,
        after: None,
    },
    TransitionDef {
        trigger: Trigger::Error,
        sources: &[Status::Running],
        dest: Status::Retry,
        before: None,
        after: None,
    },
    TransitionDef {
        trigger: Trigger::Expired,
        sources: &[Status::Pending, Status::Retry],
        dest: Status::Failure,
        before: None,
        after: None,
    },
    TransitionDef {
        trigger: Trigger::Revoke,
        sources: &[
            Status::Pending,
            Status::VariablesLoaded,
            Status::Running,
            Status::Retry,
        ],
        dest: Status::Revoked,
        before: None,
        after: None,
    },
];

/// First transition matching (`trigger`, `current`), if any.
pub fn find_transition(trigger: Trigger, current: Status) -> Option<&'static TransitionDef> {
    TRANSITIONS
        .iter()
        .find(|t| t.trigger == trigger && t.sources.contains(&current))
}
