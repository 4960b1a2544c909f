use std::time::SystemTime;

/// Last known state of one identity, owned by the state reporter.
#[derive(Clone, Debug, PartialEq)]
pub struct IdentityState {
    pub name: String,
    pub equipped: bool,
    pub last_seen: SystemTime,
}

impl IdentityState {
    /// First sighting: not equipped until an association says otherwise.
    pub fn first_seen(name: impl Into<String>, at: SystemTime) -> Self {
        Self {
            name: name.into(),
            equipped: false,
            last_seen: at,
        }
    }
}
