//! Typed names for persisted per-zone values.
//!
//! The durable layout groups a zone's values into three sections
//! (`facts`, `requests`, `plans`). A [`ZoneField`] knows which section it
//! lives in and the string key it is stored under, so call sites never
//! build key strings by hand.

use colony_types::{FactClass, RequestId, Role};

/// Section of a zone record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    /// Derived facts and counters.
    Facts,
    /// Open resource requests.
    Requests,
    /// Placement plans written by the siting collaborator.
    Plans,
}

/// A single persisted per-zone value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ZoneField {
    /// A cached world fact.
    Fact(FactClass),
    /// Number of live agents of a role.
    RoleCount(Role),
    /// Number of open resource requests.
    OpenRequests,
    /// One open resource request.
    Request(RequestId),
    /// A named placement plan.
    Plan(String),
}

impl ZoneField {
    /// Section the field is stored in.
    pub const fn section(&self) -> Section {
        match self {
            Self::Fact(_) | Self::RoleCount(_) | Self::OpenRequests => Section::Facts,
            Self::Request(_) => Section::Requests,
            Self::Plan(_) => Section::Plans,
        }
    }

    /// Key within the section.
    pub fn key(&self) -> String {
        match self {
            Self::Fact(class) => format!("fact.{}", class.label()),
            Self::RoleCount(role) => format!("role_count.{}", role.label()),
            Self::OpenRequests => "open_requests".to_owned(),
            Self::Request(id) => id.to_string(),
            Self::Plan(name) => name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_stable() {
        assert_eq!(ZoneField::RoleCount(Role::Gatherer).key(), "role_count.gatherer");
        assert_eq!(ZoneField::Fact(FactClass::EnergySinks).key(), "fact.energy_sinks");
        assert_eq!(ZoneField::OpenRequests.section(), Section::Facts);
        assert_eq!(ZoneField::Plan("roads".to_owned()).section(), Section::Plans);
    }

    #[test]
    fn request_key_is_the_id() {
        let id = RequestId::new();
        let field = ZoneField::Request(id);
        assert_eq!(field.key(), id.to_string());
        assert_eq!(field.section(), Section::Requests);
    }
}
