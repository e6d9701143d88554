//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Every entity the scheduler touches has a strongly-typed ID so a node id
//! can never be passed where an agent id is expected. All IDs use UUID v7
//! (time-ordered), which also gives the `BTreeMap`-backed registries a
//! stable iteration order.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a worker agent.
    AgentId
}

define_id! {
    /// Unique identifier for a zone (spatial partition with its own cache
    /// namespace, request market, and resource nodes).
    ZoneId
}

define_id! {
    /// Unique identifier for a resource node.
    NodeId
}

define_id! {
    /// Unique identifier for a consumer site (spawn, extension, controller, ...).
    SiteId
}

define_id! {
    /// Unique identifier for an open resource request.
    RequestId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let first = AgentId::new();
        let second = AgentId::new();
        assert_ne!(first, second);
        assert_ne!(first.into_inner(), Uuid::nil());
    }

    #[test]
    fn id_roundtrip_serde() {
        let original = ZoneId::new();
        let json = serde_json::to_string(&original).ok();
        assert!(json.is_some());
        let restored: Result<ZoneId, _> = serde_json::from_str(json.as_deref().unwrap_or(""));
        assert_eq!(restored.ok(), Some(original));
    }

    #[test]
    fn id_display_matches_uuid() {
        let id = RequestId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }
}
