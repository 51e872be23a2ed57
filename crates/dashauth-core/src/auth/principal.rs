use serde::{Deserialize, Serialize};

/// Dashboard roles, highest privilege first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Operator,
    Executive,
    /// Anything the backend sends that we don't recognise (e.g. `visitor`).
    #[default]
    #[serde(other)]
    Default,
}

impl Role {
    fn rank(self) -> u8 {
        match self {
            Role::Admin => 4,
            Role::Operator => 3,
            Role::Executive => 2,
            Role::Default => 1,
        }
    }

    /// Whether this role carries at least the privileges of `required`.
    pub fn satisfies(self, required: Role) -> bool {
        self.rank() >= required.rank()
    }
}

/// The authenticated identity.
///
/// The backend's user record carries more fields (id, email, full name);
/// only username and role are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    #[serde(default)]
    pub role: Role,
}

impl Principal {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Operators and admins.
    pub fn is_operator(&self) -> bool {
        self.role.satisfies(Role::Operator)
    }

    /// Executives and everything above.
    pub fn is_executive(&self) -> bool {
        self.role.satisfies(Role::Executive)
    }
}
