use serde::Serialize;

/// Everything a handler may ask the capability table about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// 本人打卡
    MarkOwnAttendance,
    /// 替本中心技师打卡
    MarkTeamAttendance,
    ViewAttendanceRecords,
    ManageEmployees,
    ManageCenters,
    CreateWorkorder,
    ReassignWorkorder,
    CloseWorkorder,
    RepeatWorkorder,
    QueryWorkorders,
    EditWorkorder,
    DeleteWorkorder,
}

/// One navigation entry; shown when the role holds `action`.
pub struct MenuEntry {
    pub label: &'static str,
    pub action: Option<Action>,
}

pub static MENU: [MenuEntry; 8] = [
    MenuEntry {
        label: "Attendance",
        action: Some(Action::MarkOwnAttendance),
    },
    MenuEntry {
        label: "Administration",
        action: Some(Action::ManageEmployees),
    },
    MenuEntry {
        label: "Attendance Records",
        action: Some(Action::ViewAttendanceRecords),
    },
    MenuEntry {
        label: "Mark attendance for the other",
        action: Some(Action::MarkTeamAttendance),
    },
    MenuEntry {
        label: "Workorder Entry",
        action: Some(Action::CreateWorkorder),
    },
    MenuEntry {
        label: "View Workorders",
        action: Some(Action::QueryWorkorders),
    },
    MenuEntry {
        label: "Update Workorder",
        action: Some(Action::EditWorkorder),
    },
    MenuEntry {
        label: "Profile",
        action: None,
    },
];
