//! Node identifiers of the dependency graph.
//!
//! Every node belongs to exactly one of four kinds. Each kind gets its own
//! newtype so that operations which only make sense for one kind (starting a
//! service, requesting a user target) are checked at compile time, while
//! [`Target`] is the tagged union used wherever any node may appear.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! target_kind {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create the identifier from its symbolic name.
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            /// The symbolic name of this node.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                Self::new(name)
            }
        }

        impl From<$name> for Target {
            fn from(value: $name) -> Self {
                Self::$name(value)
            }
        }
    };
}

target_kind!(
    /// A boolean fact supplied before the run starts (e.g. "reads were provided").
    Param
);
target_kind!(
    /// Internal alias target for "this condition holds", whoever produced it.
    Checkpoint
);
target_kind!(
    /// An executable unit, bound at runtime to a shim.
    Service
);
target_kind!(
    /// A goal the caller can request.
    UserTarget
);

/// The kind of a graph node, without its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Param,
    Checkpoint,
    Service,
    UserTarget,
}

impl TargetKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Param => "param",
            Self::Checkpoint => "checkpoint",
            Self::Service => "service",
            Self::UserTarget => "target",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any node in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum Target {
    Param(Param),
    Checkpoint(Checkpoint),
    Service(Service),
    UserTarget(UserTarget),
}

impl Target {
    pub const fn kind(&self) -> TargetKind {
        match self {
            Self::Param(_) => TargetKind::Param,
            Self::Checkpoint(_) => TargetKind::Checkpoint,
            Self::Service(_) => TargetKind::Service,
            Self::UserTarget(_) => TargetKind::UserTarget,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Param(p) => p.as_str(),
            Self::Checkpoint(c) => c.as_str(),
            Self::Service(s) => s.as_str(),
            Self::UserTarget(t) => t.as_str(),
        }
    }

    pub const fn as_service(&self) -> Option<&Service> {
        match self {
            Self::Service(s) => Some(s),
            _ => None,
        }
    }

    /// Params are facts, everything else needs a dependency expression.
    pub const fn requires_dependency(&self) -> bool {
        !matches!(self, Self::Param(_))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_kind_and_name() {
        let t: Target = Service::new("FastQC").into();
        assert_eq!(t.kind(), TargetKind::Service);
        assert_eq!(t.name(), "FastQC");
        assert_eq!(t.as_service(), Some(&Service::new("FastQC")));
        assert!(t.requires_dependency());

        let p: Target = Param::new("reads").into();
        assert!(!p.requires_dependency());
        assert!(p.as_service().is_none());
    }

    #[test]
    fn test_same_name_different_kind_is_distinct() {
        let a: Target = Checkpoint::new("x").into();
        let b: Target = UserTarget::new("x").into();
        assert_ne!(a, b);
    }

    #[test]
    fn test_target_serialization() {
        let t: Target = UserTarget::new("DEFAULT").into();
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "user_target", "name": "DEFAULT"}));
        let back: Target = serde_json::from_value(json).unwrap();
        assert_eq!(back, t);
    }
}
