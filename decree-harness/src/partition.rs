//! Per-step cluster state: network reachability and leader choice.
//!
//! A [`Partition`] describes which nodes can reach each other during one
//! step; an [`Actions`] entry describes which node, if any, acts as leader.
//! The generator enumerates schedules over the Cartesian product of the
//! registered partitions and actions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identifier of a node within the cluster under test.
pub type NodeId = u32;

/// A symmetric reachability relation on node ids.
///
/// Routes are unreachable by default; [`link`](Partition::link) opens a
/// route in both directions. A node is always able to mutate its own local
/// state, so self-edges are never materialized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    routes: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl Partition {
    /// Create a partition with every route blocked.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a partition from disjoint groups of mutually reachable nodes.
    ///
    /// Every pair of nodes within a group is linked; nodes in different
    /// groups stay unreachable.
    ///
    /// # Example
    ///
    /// ```
    /// use decree_harness::Partition;
    ///
    /// let p = Partition::from_groups(&[&[1, 2, 3], &[4, 5]]);
    /// assert!(p.reachable(1, 3));
    /// assert!(p.reachable(5, 4));
    /// assert!(!p.reachable(3, 4));
    /// ```
    pub fn from_groups(groups: &[&[NodeId]]) -> Self {
        let mut partition = Self::new();
        for group in groups {
            for (i, &from) in group.iter().enumerate() {
                for &to in &group[i + 1..] {
                    partition.link(from, to);
                }
            }
        }
        partition
    }

    /// Open the route between `a` and `b` in both directions.
    pub fn link(&mut self, a: NodeId, b: NodeId) {
        self.routes.entry(a).or_default().insert(b);
        self.routes.entry(b).or_default().insert(a);
    }

    /// Returns true if the route from `from` to `to` is not blocked.
    pub fn reachable(&self, from: NodeId, to: NodeId) -> bool {
        self.routes
            .get(&from)
            .is_some_and(|routes| routes.contains(&to))
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "routes(")?;
        let mut first = true;
        for (from, routes) in &self.routes {
            for to in routes {
                if from < to {
                    if !first {
                        write!(f, " ")?;
                    }
                    write!(f, "{from}<->{to}")?;
                    first = false;
                }
            }
        }
        write!(f, ")")
    }
}

/// Leader choice for one step: which node, if any, proposes.
///
/// The empty mapping means "no leader this step". The generator only ever
/// constructs entries with at most one leader, but the type does not
/// enforce that.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actions {
    leaders: BTreeMap<NodeId, bool>,
}

impl Actions {
    /// The step where no node acts as leader.
    pub fn none() -> Self {
        Self::default()
    }

    /// The step where `id` acts as leader.
    pub fn leader(id: NodeId) -> Self {
        let mut leaders = BTreeMap::new();
        leaders.insert(id, true);
        Self { leaders }
    }

    /// Returns true if `id` is scheduled to propose this step.
    ///
    /// Absent ids are not leaders.
    pub fn is_leader(&self, id: NodeId) -> bool {
        self.leaders.get(&id).copied().unwrap_or(false)
    }
}

impl fmt::Display for Actions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cluster(")?;
        let mut first = true;
        for (id, is_leader) in &self.leaders {
            if *is_leader {
                if !first {
                    write!(f, " ")?;
                }
                write!(f, "leader={id}")?;
                first = false;
            }
        }
        if first {
            write!(f, "no leader")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_blocked_by_default() {
        let p = Partition::new();
        assert!(!p.reachable(1, 2));
        assert!(!p.reachable(2, 1));
    }

    #[test]
    fn test_link_is_symmetric() {
        let mut p = Partition::new();
        p.link(1, 2);
        assert!(p.reachable(1, 2));
        assert!(p.reachable(2, 1));
        assert!(!p.reachable(1, 3));
    }

    #[test]
    fn test_from_groups_links_within_groups_only() {
        let p = Partition::from_groups(&[&[1, 2, 3], &[4, 5]]);
        for (a, b) in [(1, 2), (1, 3), (2, 3), (4, 5)] {
            assert!(p.reachable(a, b), "{a}<->{b} should be open");
            assert!(p.reachable(b, a), "{b}<->{a} should be open");
        }
        for (a, b) in [(1, 4), (2, 5), (3, 4)] {
            assert!(!p.reachable(a, b), "{a}<->{b} should be blocked");
        }
    }

    #[test]
    fn test_singleton_group_has_no_routes() {
        let p = Partition::from_groups(&[&[1]]);
        assert_eq!(p, Partition::new());
    }

    #[test]
    fn test_actions_empty_means_no_leader() {
        let a = Actions::none();
        assert!(!a.is_leader(1));
        assert!(!a.is_leader(42));
    }

    #[test]
    fn test_actions_single_leader() {
        let a = Actions::leader(3);
        assert!(a.is_leader(3));
        assert!(!a.is_leader(1));
    }

    #[test]
    fn test_display() {
        let p = Partition::from_groups(&[&[1, 2]]);
        assert_eq!(p.to_string(), "routes(1<->2)");
        assert_eq!(Actions::none().to_string(), "cluster(no leader)");
        assert_eq!(Actions::leader(3).to_string(), "cluster(leader=3)");
    }
}
