use std::fmt;

/// Why a decision was refused. A refused decision leaves the mission untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    MissionEnded,
    UnknownNode(String),
    NodeCompromised(String),
    InvalidAction(i64),
}

impl ActionError {
    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissionEnded => "mission_ended",
            Self::UnknownNode(_) => "unknown_node",
            Self::NodeCompromised(_) => "node_compromised",
            Self::InvalidAction(_) => "invalid_action",
        }
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissionEnded => write!(f, "mission has already ended"),
            Self::UnknownNode(id) => write!(f, "node '{id}' does not exist"),
            Self::NodeCompromised(id) => write!(f, "node '{id}' is compromised by fire"),
            Self::InvalidAction(value) => write!(f, "action code {value} is not recognized"),
        }
    }
}

impl std::error::Error for ActionError {}

/// Failure reaching or reading the probability service. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UplinkError {
    Unreachable(String),
    Malformed(String),
    /// Simulated drop used by the headless runner.
    Dropped,
}

impl fmt::Display for UplinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable(detail) => write!(f, "probability service unreachable: {detail}"),
            Self::Malformed(detail) => write!(f, "probability response malformed: {detail}"),
            Self::Dropped => write!(f, "probability uplink dropped"),
        }
    }
}

impl std::error::Error for UplinkError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_node() {
        let err = ActionError::NodeCompromised("ACT-3".to_string());
        assert_eq!(err.to_string(), "node 'ACT-3' is compromised by fire");
        assert_eq!(err.code(), "node_compromised");
    }
}
