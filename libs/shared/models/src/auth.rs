use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: Option<String>,
    pub exp: Option<u64>,
    pub role: Option<String>,
    pub session_id: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

impl JwtClaims {
    /// Application role, preferring `app_metadata.role` over the top-level claim.
    pub fn app_role(&self) -> Option<&str> {
        self.app_metadata
            .as_ref()
            .and_then(|meta| meta.get("role"))
            .and_then(|role| role.as_str())
            .or(self.role.as_deref())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Doctor,
    Admin,
    Hr,
    Finance,
    Audit,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "patient" => Some(Role::Patient),
            "doctor" => Some(Role::Doctor),
            "admin" => Some(Role::Admin),
            "hr" => Some(Role::Hr),
            "finance" => Some(Role::Finance),
            "audit" => Some(Role::Audit),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Patient => write!(f, "patient"),
            Role::Doctor => write!(f, "doctor"),
            Role::Admin => write!(f, "admin"),
            Role::Hr => write!(f, "hr"),
            Role::Finance => write!(f, "finance"),
            Role::Audit => write!(f, "audit"),
        }
    }
}

/// Verified caller. Patients are anonymous and keyed by their session; every
/// other role is keyed by its user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Identity {
    Patient { session_id: Uuid },
    Doctor { user_id: Uuid },
    Admin { user_id: Uuid },
    Hr { user_id: Uuid },
    Finance { user_id: Uuid },
    Audit { user_id: Uuid },
}

impl Identity {
    pub fn from_parts(role: Role, user_id: Option<Uuid>, session_id: Option<Uuid>) -> Option<Self> {
        match role {
            Role::Patient => session_id.map(|session_id| Identity::Patient { session_id }),
            Role::Doctor => user_id.map(|user_id| Identity::Doctor { user_id }),
            Role::Admin => user_id.map(|user_id| Identity::Admin { user_id }),
            Role::Hr => user_id.map(|user_id| Identity::Hr { user_id }),
            Role::Finance => user_id.map(|user_id| Identity::Finance { user_id }),
            Role::Audit => user_id.map(|user_id| Identity::Audit { user_id }),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Identity::Patient { .. } => Role::Patient,
            Identity::Doctor { .. } => Role::Doctor,
            Identity::Admin { .. } => Role::Admin,
            Identity::Hr { .. } => Role::Hr,
            Identity::Finance { .. } => Role::Finance,
            Identity::Audit { .. } => Role::Audit,
        }
    }

    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            Identity::Patient { session_id } => Some(*session_id),
            _ => None,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Identity::Patient { .. } => None,
            Identity::Doctor { user_id }
            | Identity::Admin { user_id }
            | Identity::Hr { user_id }
            | Identity::Finance { user_id }
            | Identity::Audit { user_id } => Some(*user_id),
        }
    }

    /// Tenant key used for rate-limit buckets and audit entries.
    pub fn tenant_key(&self) -> String {
        self.session_id()
            .or_else(|| self.user_id())
            .map(|id| id.to_string())
            .unwrap_or_else(|| "anon".to_string())
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Identity::Admin { .. })
    }

    pub fn is_doctor(&self, doctor_id: Uuid) -> bool {
        matches!(self, Identity::Doctor { user_id } if *user_id == doctor_id)
    }

    pub fn is_patient_session(&self, session_id: Uuid) -> bool {
        matches!(self, Identity::Patient { session_id: own } if *own == session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patient_requires_session_id() {
        let user_id = Uuid::new_v4();
        assert_eq!(Identity::from_parts(Role::Patient, Some(user_id), None), None);

        let session_id = Uuid::new_v4();
        let identity = Identity::from_parts(Role::Patient, None, Some(session_id)).unwrap();
        assert_eq!(identity.tenant_key(), session_id.to_string());
        assert_eq!(identity.role(), Role::Patient);
    }

    #[test]
    fn portal_roles_are_keyed_by_user() {
        let user_id = Uuid::new_v4();
        let identity = Identity::from_parts(Role::Finance, Some(user_id), None).unwrap();
        assert_eq!(identity.user_id(), Some(user_id));
        assert_eq!(identity.session_id(), None);
        assert!(!identity.is_admin());
    }

    #[test]
    fn app_metadata_role_wins() {
        let claims = JwtClaims {
            sub: None,
            exp: None,
            role: Some("authenticated".to_string()),
            session_id: None,
            app_metadata: Some(serde_json::json!({ "role": "doctor" })),
            aud: None,
            iat: None,
        };
        assert_eq!(claims.app_role(), Some("doctor"));
    }
}
