// Job Status Domain Model

use serde::{Deserialize, Serialize};

/// Job lifecycle state. The wire name is the SCREAMING_SNAKE_CASE form,
/// both in serialized models and in the store's `state` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pending,
    VariablesLoaded,
    Running,
    Suspended,
    Retry,
    Success,
    Failure,
    Revoked,
}

impl Status {
    pub const fn name(&self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::VariablesLoaded => "VARIABLES_LOADED",
            Status::Running => "RUNNING",
            Status::Suspended => "SUSPENDED",
            Status::Retry => "RETRY",
            Status::Success => "SUCCESS",
            Status::Failure => "FAILURE",
            Status::Revoked => "REVOKED",
        }
    }

    pub fn from_name(name: &str) -> Option<Status> {
        match name {
            "PENDING" => Some(Status::Pending),
            "VARIABLES_LOADED" => Some(Status::VariablesLoaded),
            "RUNNING" => Some(Status::Running),
            "SUSPENDED" => Some(Status::Suspended),
            "RETRY" => Some(Status::Retry),
            "SUCCESS" => Some(Status::Success),
            "FAILURE" => Some(Status::Failure),
            "REVOKED" => Some(Status::Revoked),
            _ => None,
        }
    }

    /// Terminal states are never transitioned out of.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Status::Success | Status::Failure | Status::Revoked)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Status; 8] = [
        Status::Pending,
        Status::VariablesLoaded,
        Status::Running,
        Status::Suspended,
        Status::Retry,
        Status::Success,
        Status::Failure,
        Status::Revoked,
    ];

    #[test]
    fn name_round_trips() {
        for status in ALL {
            assert_eq!(Status::from_name(status.name()), Some(status));
        }
        assert_eq!(Status::from_name("NO_SUCH_STATE"), None);
    }

    #[test]
    fn serde_uses_wire_names() {
        let encoded = serde_json::to_string(&Status::VariablesLoaded).unwrap();
        assert_eq!(encoded, "\"VARIABLES_LOADED\"");
        let decoded: Status = serde_json::from_str("\"RETRY\"").unwrap();
        assert_eq!(decoded, Status::Retry);
    }

    #[test]
    fn exactly_three_terminal_states() {
        let terminal: Vec<_> = ALL.iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(
            terminal,
            [&Status::Success, &Status::Failure, &Status::Revoked]
        );
    }
}
