//! Version records tracked between polls

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a version record tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionKind {
    /// The dedicated server build, keyed by Steam app id
    Game,
    /// A workshop item, keyed by published file id
    Mod,
}

impl VersionKind {
    /// Value stored in the `kind` column
    pub fn as_str(self) -> &'static str {
        match self {
            VersionKind::Game => "game",
            VersionKind::Mod => "mod",
        }
    }

    /// Parse the `kind` column
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "game" => Some(VersionKind::Game),
            "mod" => Some(VersionKind::Mod),
            _ => None,
        }
    }
}

impl fmt::Display for VersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last observed version of one tracked item. Unique by `(kind, item_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub kind: VersionKind,
    pub item_id: String,
    /// Opaque build token, compared by equality (or numerically for mods)
    pub build_id: String,
    /// Unix seconds of the last write
    pub last_checked: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_column_values() {
        for kind in [VersionKind::Game, VersionKind::Mod] {
            assert_eq!(VersionKind::from_str_opt(kind.as_str()), Some(kind));
        }
        assert_eq!(VersionKind::from_str_opt("GAME"), None);
    }
}
