pub mod action;
pub mod roles;

use std::collections::{HashMap, HashSet};

pub use action::Action;
pub use roles::Role;

use crate::Response;

lazy_static::lazy_static! {
    /// 角色 -> 允许的操作，所有权限判断只查这张表
    pub static ref CAPABILITIES: HashMap<Role, HashSet<Action>> = {
        use Action::*;
        let mut map = HashMap::new();
        for role in Role::ALL {
            let actions: &[Action] = match role {
                Role::SuperAdmin | Role::Admin => &[
                    MarkOwnAttendance,
                    ViewAttendanceRecords,
                    ManageEmployees,
                    ManageCenters,
                    QueryWorkorders,
                    EditWorkorder,
                    DeleteWorkorder,
                ],
                Role::TeamLeader => &[
                    MarkOwnAttendance,
                    MarkTeamAttendance,
                    CreateWorkorder,
                    ReassignWorkorder,
                    CloseWorkorder,
                    RepeatWorkorder,
                    QueryWorkorders,
                ],
                Role::Accounts | Role::Engineer | Role::Technician => &[MarkOwnAttendance],
            };
            map.insert(role, actions.iter().copied().collect());
        }
        map
    };
}

pub fn allowed(role: Role, action: Action) -> bool {
    CAPABILITIES
        .get(&role)
        .is_some_and(|actions| actions.contains(&action))
}

/// Policy boundary: handlers call this once before touching any data.
pub fn require(role: Role, action: Action) -> Result<(), Response> {
    if allowed(role, action) {
        Ok(())
    } else {
        tracing::debug!("{role} denied {action:?}");
        Err(Response::permission_denied())
    }
}

/// Navigation labels available to `role`, in display order.
pub fn menu_for(role: Role) -> Vec<&'static str> {
    action::MENU
        .iter()
        .filter(|entry| entry.action.map_or(true, |a| allowed(role, a)))
        .map(|entry| entry.label)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_role_has_a_row() {
        for role in Role::ALL {
            assert!(allowed(role, Action::MarkOwnAttendance));
        }
    }

    #[test]
    fn workorder_lifecycle_belongs_to_team_leaders() {
        for action in [
            Action::CreateWorkorder,
            Action::ReassignWorkorder,
            Action::CloseWorkorder,
            Action::RepeatWorkorder,
        ] {
            assert!(allowed(Role::TeamLeader, action));
            assert!(!allowed(Role::Admin, action));
            assert!(!allowed(Role::Technician, action));
        }
        assert!(allowed(Role::Admin, Action::EditWorkorder));
        assert!(!allowed(Role::TeamLeader, Action::EditWorkorder));
    }

    #[test]
    fn denied_actions_answer_with_status_four() {
        let err = require(Role::Technician, Action::ManageEmployees).unwrap_err();
        assert_eq!(err.status(), 4);
        assert!(require(Role::SuperAdmin, Action::ManageCenters).is_ok());
    }

    #[test]
    fn menus_follow_the_table() {
        assert_eq!(menu_for(Role::Technician), vec!["Attendance", "Profile"]);
        assert_eq!(
            menu_for(Role::Admin),
            vec![
                "Attendance",
                "Administration",
                "Attendance Records",
                "View Workorders",
                "Update Workorder",
                "Profile"
            ]
        );
        assert!(menu_for(Role::TeamLeader).contains(&"Mark attendance for the other"));
    }
}
