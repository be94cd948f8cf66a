/// Replication role of the local database node.
///
/// Only equality matters: the registrar compares consecutive values to
/// detect a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RoleState {
    /// Accepts writes.
    Primary,
    /// Read-only, streaming from a primary.
    Replica,
    /// The role could not be determined (database unreachable).
    #[default]
    Unknown,
}

impl RoleState {
    /// Classify the answer of a role probe.
    pub fn from_is_primary(is_primary: bool) -> Self {
        if is_primary {
            Self::Primary
        } else {
            Self::Replica
        }
    }

    /// Convert to string for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Replica => "replica",
            Self::Unknown => "unknown",
        }
    }

    /// Registry tag advertised for this role, if any.
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            Self::Primary => Some("primary"),
            Self::Replica => Some("replica"),
            Self::Unknown => None,
        }
    }

    /// Full tag set advertised for this role.
    pub fn tags(&self) -> Vec<String> {
        self.tag().map(|t| vec![t.to_string()]).unwrap_or_default()
    }

    /// Whether the registry entry should be held in maintenance mode.
    pub fn requires_maintenance(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl std::fmt::Display for RoleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
