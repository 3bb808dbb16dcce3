// Datastore target identifiers and the lock-free published active target

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One of the two independently configured graph backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatastoreTarget {
    /// Read-mostly reference dataset.
    Primary,
    /// Mutable sandbox, the only target a reset may run against.
    Workspace,
}

impl DatastoreTarget {
    pub const ALL: [DatastoreTarget; 2] = [DatastoreTarget::Primary, DatastoreTarget::Workspace];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatastoreTarget::Primary => "primary",
            DatastoreTarget::Workspace => "workspace",
        }
    }
}

impl fmt::Display for DatastoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatastoreTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(DatastoreTarget::Primary),
            "workspace" => Ok(DatastoreTarget::Workspace),
            other => Err(format!("unknown datastore target '{}'", other)),
        }
    }
}

/// Published view of which target is live. Writers are serialized by the
/// connection manager; readers never block.
#[derive(Clone, Default)]
pub struct ActiveTarget {
    inner: Arc<ArcSwapOption<DatastoreTarget>>,
}

impl ActiveTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, new_target: DatastoreTarget) {
        if self.get() == Some(new_target) {
            warn!("datastore target set() called, but no change (still {})", new_target);
        }
        self.inner.store(Some(Arc::new(new_target)));
    }

    pub fn clear(&self) {
        self.inner.store(None);
    }

    pub fn get(&self) -> Option<DatastoreTarget> {
        self.inner.load().as_deref().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parsing_is_case_insensitive() {
        assert_eq!("Primary".parse::<DatastoreTarget>().unwrap(), DatastoreTarget::Primary);
        assert_eq!(" WORKSPACE ".parse::<DatastoreTarget>().unwrap(), DatastoreTarget::Workspace);
        assert!("sandbox".parse::<DatastoreTarget>().is_err());
    }

    #[test]
    fn test_target_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&DatastoreTarget::Workspace).unwrap();
        assert_eq!(json, "\"workspace\"");
        let back: DatastoreTarget = serde_json::from_str("\"primary\"").unwrap();
        assert_eq!(back, DatastoreTarget::Primary);
    }

    #[test]
    fn test_active_target_lifecycle() {
        let active = ActiveTarget::new();
        assert_eq!(active.get(), None);

        active.set(DatastoreTarget::Primary);
        assert_eq!(active.get(), Some(DatastoreTarget::Primary));

        active.set(DatastoreTarget::Workspace);
        assert_eq!(active.get(), Some(DatastoreTarget::Workspace));

        active.clear();
        assert_eq!(active.get(), None);
    }
}
