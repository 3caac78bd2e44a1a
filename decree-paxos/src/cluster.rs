//! Canonical cluster driver for model-checked runs.
//!
//! A [`Cluster`] owns one [`Replica`] per node and executes a test-case
//! schedule one step at a time: leaders scheduled by the step's
//! [`Actions`] propose, outboxes are collected, and every message whose
//! route the step's [`Partition`] leaves open is delivered. Messages that
//! cannot reach their destination are *delayed*, not dropped — they carry
//! over to subsequent steps, which keeps the execution deterministic
//! while still modelling link failures.
//!
//! After every step the driver checks the two safety properties of the
//! protocol: all learned values agree across replicas, and no replica's
//! learned value ever changes once set.

use std::collections::BTreeMap;

use decree_harness::{Actions, CaseFailure, Partition, TestCase};
use thiserror::Error;

use crate::message::Message;
use crate::replica::Replica;
use crate::types::{NodeId, Value};

/// A detected violation of the protocol's safety properties.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SafetyViolation {
    /// Two replicas learned different values.
    #[error("agreement violated: node {a} learned {a_value:02x?}, node {b} learned {b_value:02x?}")]
    Disagreement {
        /// First node compared.
        a: NodeId,
        /// Value the first node learned.
        a_value: Value,
        /// Second node compared.
        b: NodeId,
        /// Value the second node learned.
        b_value: Value,
    },

    /// A replica's learned value changed after it was first set.
    #[error("learned value changed on node {node}: {was:02x?} -> {now:02x?}")]
    Mutated {
        /// The offending node.
        node: NodeId,
        /// Value first learned.
        was: Value,
        /// Value observed afterwards.
        now: Value,
    },
}

impl From<SafetyViolation> for CaseFailure {
    fn from(violation: SafetyViolation) -> Self {
        CaseFailure::new(violation.to_string())
    }
}

/// One cluster of replicas executing a single test case.
///
/// Construct a fresh cluster per test case; replicas share nothing across
/// cases.
#[derive(Debug)]
pub struct Cluster {
    replicas: BTreeMap<NodeId, Replica>,
    in_flight: Vec<Message>,
    first_learned: BTreeMap<NodeId, Value>,
}

impl Cluster {
    /// Build a cluster with simple-majority quorums.
    pub fn new(nodes: &[NodeId]) -> Self {
        Self::build(nodes, None)
    }

    /// Build a cluster with explicit Phase 1 and Phase 2 quorum sizes.
    pub fn with_majorities(nodes: &[NodeId], r1_majority: usize, r2_majority: usize) -> Self {
        Self::build(nodes, Some((r1_majority, r2_majority)))
    }

    fn build(nodes: &[NodeId], majorities: Option<(usize, usize)>) -> Self {
        let replicas = nodes
            .iter()
            .map(|&id| {
                let mut replica = Replica::new(id, nodes.to_vec());
                if let Some((r1, r2)) = majorities {
                    replica = replica.with_majorities(r1, r2);
                }
                (id, replica)
            })
            .collect();
        Self {
            replicas,
            in_flight: Vec::new(),
            first_learned: BTreeMap::new(),
        }
    }

    /// The value a node proposes when scheduled as leader.
    fn proposal_for(id: NodeId) -> Value {
        id.to_le_bytes().to_vec()
    }

    /// Execute one step and check the safety properties.
    pub fn step(
        &mut self,
        partition: &Partition,
        actions: &Actions,
    ) -> Result<(), SafetyViolation> {
        // Scheduled leaders propose, then every outbox joins the queue
        // behind the messages delayed by earlier steps.
        let mut queue = std::mem::take(&mut self.in_flight);
        for (&id, replica) in &mut self.replicas {
            if actions.is_leader(id) {
                replica.propose(Self::proposal_for(id));
            }
            queue.append(&mut replica.take_outbox());
        }

        for message in queue {
            if partition.reachable(message.from, message.to) {
                match self.replicas.get_mut(&message.to) {
                    Some(replica) => replica.deliver(message),
                    None => panic!("message addressed to unknown node {}", message.to),
                }
            } else {
                self.in_flight.push(message);
            }
        }

        self.check()
    }

    /// Execute a whole schedule, stopping at the first violation.
    pub fn run(mut self, case: &mut TestCase) -> Result<(), SafetyViolation> {
        while let Some((partition, actions)) = case.next_step() {
            self.step(partition, actions)?;
        }
        Ok(())
    }

    /// Assert agreement and learned-value immutability across the cluster.
    fn check(&mut self) -> Result<(), SafetyViolation> {
        let mut decided: Option<(NodeId, &Value)> = None;
        for (&id, replica) in &self.replicas {
            let Some(value) = replica.learned_value() else {
                continue;
            };
            match self.first_learned.get(&id) {
                Some(first) if first != value => {
                    return Err(SafetyViolation::Mutated {
                        node: id,
                        was: first.clone(),
                        now: value.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    self.first_learned.insert(id, value.clone());
                }
            }
            match decided {
                None => decided = Some((id, value)),
                Some((other, other_value)) if other_value != value => {
                    return Err(SafetyViolation::Disagreement {
                        a: other,
                        a_value: other_value.clone(),
                        b: id,
                        b_value: value.clone(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// The learned value of `node`, if any.
    pub fn learned(&self, node: NodeId) -> Option<&Value> {
        self.replicas.get(&node).and_then(|r| r.learned_value())
    }
}
