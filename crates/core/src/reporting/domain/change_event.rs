/// A state change observed by the reporter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeEvent {
    IdentityAppeared { name: String },
    EquipmentChanged { name: String, equipped: bool },
}

impl ChangeEvent {
    /// Wire tag used by subscription endpoints, which carry no payload.
    pub fn tag(&self) -> &'static str {
        match self {
            ChangeEvent::IdentityAppeared { .. } => "face_update",
            ChangeEvent::EquipmentChanged { .. } => "helmet_update",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ChangeEvent::IdentityAppeared { name } | ChangeEvent::EquipmentChanged { name, .. } => {
                name
            }
        }
    }
}
