use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

/// 员工角色，存储为 `employee_details.user_role` 中的文本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Accounts,
    Admin,
    Engineer,
    #[serde(rename = "Super Admin")]
    SuperAdmin,
    TeamLeader,
    Technician,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Accounts,
        Role::Admin,
        Role::Engineer,
        Role::SuperAdmin,
        Role::TeamLeader,
        Role::Technician,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Accounts => "Accounts",
            Role::Admin => "Admin",
            Role::Engineer => "Engineer",
            Role::SuperAdmin => "Super Admin",
            Role::TeamLeader => "TeamLeader",
            Role::Technician => "Technician",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    /// Roles this role may give to an employee it creates or edits.
    pub fn assignable(&self) -> &'static [Role] {
        match self {
            Role::SuperAdmin => &Role::ALL,
            Role::Admin => &[
                Role::Accounts,
                Role::Engineer,
                Role::TeamLeader,
                Role::Technician,
            ],
            _ => &[],
        }
    }

    pub fn can_assign(&self, role: Role) -> bool {
        self.assignable().contains(&role)
    }

    /// Whether this role may open the record of an employee holding `other`.
    /// Admins cannot see other admins; their own record is checked separately.
    pub fn can_view(&self, other: Role) -> bool {
        match self {
            Role::SuperAdmin => true,
            Role::Admin => !other.is_admin(),
            _ => false,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownRole(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip_through_text() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!(" super admin ".parse::<Role>().unwrap(), Role::SuperAdmin);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn admin_cannot_hand_out_admin_roles() {
        assert!(Role::Admin.can_assign(Role::Technician));
        assert!(!Role::Admin.can_assign(Role::Admin));
        assert!(!Role::Admin.can_assign(Role::SuperAdmin));
        assert!(Role::SuperAdmin.can_assign(Role::Admin));
        assert!(Role::TeamLeader.assignable().is_empty());
    }

    #[test]
    fn admin_cannot_view_other_admins() {
        assert!(Role::Admin.can_view(Role::Engineer));
        assert!(!Role::Admin.can_view(Role::SuperAdmin));
        assert!(Role::SuperAdmin.can_view(Role::Admin));
    }

    #[test]
    fn serde_uses_stored_labels() {
        assert_eq!(serde_json::to_value(Role::SuperAdmin).unwrap(), "Super Admin");
        let role: Role = serde_json::from_value(serde_json::json!("TeamLeader")).unwrap();
        assert_eq!(role, Role::TeamLeader);
    }
}
