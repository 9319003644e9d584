use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperatorRole {
    Admin,
    Operator,
    Viewer,
}

impl OperatorRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "admin" => Some(OperatorRole::Admin),
            "operator" => Some(OperatorRole::Operator),
            "viewer" => Some(OperatorRole::Viewer),
            _ => None,
        }
    }
}

/// Who is asking. Passed explicitly into every actuation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorContext {
    pub identity: String,
    pub role: OperatorRole,
}

impl OperatorContext {
    pub fn new(identity: impl Into<String>, role: OperatorRole) -> Self {
        Self {
            identity: identity.into(),
            role,
        }
    }

    /// Viewers may watch status and history but never drive hardware.
    pub fn can_operate(&self) -> bool {
        matches!(self.role, OperatorRole::Admin | OperatorRole::Operator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_admins_and_operators_drive_hardware() {
        assert!(OperatorContext::new("root", OperatorRole::Admin).can_operate());
        assert!(OperatorContext::new("line1", OperatorRole::Operator).can_operate());
        assert!(!OperatorContext::new("qa", OperatorRole::Viewer).can_operate());
    }

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!(OperatorRole::parse("Admin"), Some(OperatorRole::Admin));
        assert_eq!(OperatorRole::parse("VIEWER"), Some(OperatorRole::Viewer));
        assert_eq!(OperatorRole::parse("guest"), None);
    }
}
