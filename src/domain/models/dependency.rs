//! Dependency expressions and their connectors.
//!
//! | Connector | Triggers children          | Succeeds when              | Fails when             |
//! |-----------|----------------------------|----------------------------|------------------------|
//! | `ALL`     | all, any order             | every child succeeded      | any child failed       |
//! | `SEQ`     | strictly in order          | every child, in order      | first child to fail    |
//! | `ONE`     | left to right, lazily      | first child to succeed     | all children failed    |
//! | `OPT`     | yes                        | child reached terminal     | never                  |
//! | `OIF`     | no                         | child already succeeded    | child already failed   |
//!
//! Expressions serialize externally tagged, so a YAML workflow reads
//! `{ all: [ { param: reads }, { opt: { service: Quast } } ] }` (YAML goes
//! through `serde_yaml::with::singleton_map_recursive`).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::target::{Checkpoint, Param, Service, Target, UserTarget};

/// A dependency expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
    Param(Param),
    Checkpoint(Checkpoint),
    Service(Service),
    Target(UserTarget),
    All(Vec<Dependency>),
    Seq(Vec<Dependency>),
    One(Vec<Dependency>),
    Opt(Box<Dependency>),
    Oif(Box<Dependency>),
}

impl Dependency {
    /// The node this expression refers to, if it is a leaf.
    pub fn as_target(&self) -> Option<Target> {
        match self {
            Self::Param(p) => Some(p.clone().into()),
            Self::Checkpoint(c) => Some(c.clone().into()),
            Self::Service(s) => Some(s.clone().into()),
            Self::Target(t) => Some(t.clone().into()),
            _ => None,
        }
    }

    /// Direct child expressions of a connector; empty for leaves.
    pub fn children(&self) -> &[Self] {
        match self {
            Self::All(c) | Self::Seq(c) | Self::One(c) => c,
            Self::Opt(c) | Self::Oif(c) => std::slice::from_ref(c.as_ref()),
            _ => &[],
        }
    }

    pub const fn connector_name(&self) -> Option<&'static str> {
        match self {
            Self::All(_) => Some("ALL"),
            Self::Seq(_) => Some("SEQ"),
            Self::One(_) => Some("ONE"),
            Self::Opt(_) => Some("OPT"),
            Self::Oif(_) => Some("OIF"),
            _ => None,
        }
    }

    /// All nodes referenced anywhere in this expression, left to right.
    pub fn referenced_targets(&self) -> Vec<Target> {
        let mut out = Vec::new();
        self.collect_targets(&mut out);
        out
    }

    fn collect_targets(&self, out: &mut Vec<Target>) {
        if let Some(target) = self.as_target() {
            if !out.contains(&target) {
                out.push(target);
            }
            return;
        }
        for child in self.children() {
            child.collect_targets(out);
        }
    }
}

impl From<Target> for Dependency {
    fn from(target: Target) -> Self {
        match target {
            Target::Param(p) => Self::Param(p),
            Target::Checkpoint(c) => Self::Checkpoint(c),
            Target::Service(s) => Self::Service(s),
            Target::UserTarget(t) => Self::Target(t),
        }
    }
}

impl From<Param> for Dependency {
    fn from(p: Param) -> Self {
        Self::Param(p)
    }
}

impl From<Checkpoint> for Dependency {
    fn from(c: Checkpoint) -> Self {
        Self::Checkpoint(c)
    }
}

impl From<Service> for Dependency {
    fn from(s: Service) -> Self {
        Self::Service(s)
    }
}

impl From<UserTarget> for Dependency {
    fn from(t: UserTarget) -> Self {
        Self::Target(t)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(target) = self.as_target() {
            return write!(f, "{target}");
        }
        let name = self.connector_name().unwrap_or("?");
        let children: Vec<String> = self.children().iter().map(ToString::to_string).collect();
        write!(f, "{name}({})", children.join(", "))
    }
}

/// Every child must succeed, in any order.
pub fn all<I, D>(children: I) -> Dependency
where
    I: IntoIterator<Item = D>,
    D: Into<Dependency>,
{
    Dependency::All(children.into_iter().map(Into::into).collect())
}

/// Every child must succeed, strictly in order.
pub fn seq<I, D>(children: I) -> Dependency
where
    I: IntoIterator<Item = D>,
    D: Into<Dependency>,
{
    Dependency::Seq(children.into_iter().map(Into::into).collect())
}

/// The first child to succeed, alternatives tried left to right.
pub fn one<I, D>(children: I) -> Dependency
where
    I: IntoIterator<Item = D>,
    D: Into<Dependency>,
{
    Dependency::One(children.into_iter().map(Into::into).collect())
}

/// Run the child, absorb its failure.
pub fn opt(child: impl Into<Dependency>) -> Dependency {
    Dependency::Opt(Box::new(child.into()))
}

/// Follow the child's outcome without triggering it.
pub fn oif(child: impl Into<Dependency>) -> Dependency {
    Dependency::Oif(Box::new(child.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let dep = all([
            opt(Service::new("ContigsMetrics")),
            opt(Service::new("ReadsMetrics")),
        ]);
        assert_eq!(dep.to_string(), "ALL(OPT(ContigsMetrics), OPT(ReadsMetrics))");
    }

    #[test]
    fn test_referenced_targets_deduplicates() {
        let dep = one([
            Dependency::from(Service::new("A")),
            seq([Dependency::from(Service::new("A")), Param::new("reads").into()]),
        ]);
        let refs = dep.referenced_targets();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0], Service::new("A").into());
        assert_eq!(refs[1], Param::new("reads").into());
    }

    #[test]
    fn test_yaml_shape() {
        let yaml = "all:\n  - param: contigs\n  - opt:\n      param: reference\n";
        let dep: Dependency = serde_yaml::with::singleton_map_recursive::deserialize(
            serde_yaml::Deserializer::from_str(yaml),
        )
        .unwrap();
        assert_eq!(
            dep,
            all([
                Dependency::from(Param::new("contigs")),
                opt(Param::new("reference")),
            ])
        );
    }

    #[test]
    fn test_children_of_leaf_is_empty() {
        let dep = Dependency::from(Checkpoint::new("cp"));
        assert!(dep.children().is_empty());
        assert!(dep.connector_name().is_none());
    }
}
