//! The single-decree Paxos replica state machine.
//!
//! Every replica plays all three protocol roles at once:
//!
//! 1. **Proposer**: [`propose`](Replica::propose) starts Phase 1 by
//!    advancing the ballot and broadcasting Prepare to every peer.
//! 2. **Acceptor**: Prepare and Accept messages are answered with Promise
//!    and Accepted according to the ballot ordering rules.
//! 3. **Learner**: once votes from an r2-majority are in, the voted value
//!    becomes the learned value.
//!
//! ## Quorums
//!
//! The Phase 1 and Phase 2 majorities are configured separately. For
//! correctness it is not necessary to collect exactly half plus one
//! responses in each round, but every r1-majority must intersect every
//! r2-majority; [`with_majorities`](Replica::with_majorities) exists so
//! tests can break that property on purpose and prove the surrounding
//! harness notices.
//!
//! ## Key invariants
//!
//! - `ballot >= voted_ballot` at all times.
//! - Messages with a ballot below the replica's are dropped silently.
//! - Quorum transitions are edge-triggered: the Accept broadcast and the
//!   learn transition fire exactly when the tracked set *first* reaches
//!   its majority, so each happens at most once per round. The proposer's
//!   own promise and vote count toward the quorums without any message
//!   to itself, which is what lets a single-replica cluster decide
//!   during `propose`.
//!
//! State changes to the replica itself apply immediately; everything
//! addressed to a peer lands in the outbox for the driver to route.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use crate::message::{Message, MessageKind};
use crate::types::{Ballot, NodeId, Value};

/// A single-decree Paxos replica.
///
/// Owned by one test case at a time; `propose` and `deliver` are never
/// concurrent.
#[derive(Debug, Clone)]
pub struct Replica {
    id: NodeId,
    nodes: Vec<NodeId>,
    r1_majority: usize,
    r2_majority: usize,

    // Durable in a real deployment.
    ballot: Ballot,
    voted_ballot: Ballot,
    voted_value: Option<Value>,

    // Per-round volatile state, reset by propose.
    proposed_value: Option<Value>,
    promises: BTreeSet<NodeId>,
    promise_ballot: Ballot,
    promise_value: Option<Value>,
    accepts: BTreeSet<NodeId>,

    learned_value: Option<Value>,

    outbox: Vec<Message>,
}

impl Replica {
    /// Create a replica with simple-majority quorums for both phases.
    pub fn new(id: NodeId, nodes: Vec<NodeId>) -> Self {
        let majority = nodes.len() / 2 + 1;
        Self {
            id,
            nodes,
            r1_majority: majority,
            r2_majority: majority,
            ballot: Ballot::ZERO,
            voted_ballot: Ballot::ZERO,
            voted_value: None,
            proposed_value: None,
            promises: BTreeSet::new(),
            promise_ballot: Ballot::ZERO,
            promise_value: None,
            accepts: BTreeSet::new(),
            learned_value: None,
            outbox: Vec::new(),
        }
    }

    /// Override the Phase 1 and Phase 2 quorum sizes.
    ///
    /// Safety requires every r1-majority to intersect every r2-majority;
    /// passing sizes that break the intersection is how tests demonstrate
    /// the harness catches agreement violations.
    pub fn with_majorities(mut self, r1_majority: usize, r2_majority: usize) -> Self {
        self.r1_majority = r1_majority;
        self.r2_majority = r2_majority;
        self
    }

    /// This replica's node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The current ballot.
    pub fn ballot(&self) -> Ballot {
        self.ballot
    }

    /// The value decided by a majority, if any.
    ///
    /// Once set this must never change to a different value; that is the
    /// agreement property the harness asserts.
    pub fn learned_value(&self) -> Option<&Value> {
        self.learned_value.as_ref()
    }

    /// Drain the pending outbound messages.
    pub fn take_outbox(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.outbox)
    }

    /// Phase 1a: start a new round proposing `value`.
    ///
    /// Advances the ballot, broadcasts Prepare to every peer, resets the
    /// per-round tracking, and counts the replica's own promise. With
    /// quorums of one this can run the round to completion on the spot.
    pub fn propose(&mut self, value: Value) {
        self.proposed_value = Some(value);
        self.ballot = self.ballot.next();
        debug!(replica = self.id, ballot = self.ballot.0, "proposing");
        for i in 0..self.nodes.len() {
            let id = self.nodes[i];
            if id != self.id {
                self.outbox.push(Message::prepare(self.id, id, self.ballot));
            }
        }
        self.promises.clear();
        self.promise_ballot = Ballot::ZERO;
        self.promise_value = None;
        self.accepts.clear();
        // The proposer promises to itself without sending a message.
        self.note_promise(self.id, self.voted_value.clone(), self.voted_ballot);
    }

    /// Process one inbound message.
    ///
    /// # Panics
    ///
    /// Panics if the message is addressed to a different node; the driver
    /// routing messages to the wrong replica is a bug in the harness, not
    /// a protocol state.
    pub fn deliver(&mut self, message: Message) {
        assert!(
            message.to == self.id,
            "message addressed to node {} delivered to replica {}",
            message.to,
            self.id
        );
        if message.ballot < self.ballot {
            trace!(replica = self.id, msg = %message, "dropping stale message");
            return;
        }

        match message.kind {
            MessageKind::Prepare => self.on_prepare(message),
            MessageKind::Promise => self.on_promise(message),
            MessageKind::Accept => self.on_accept(message),
            MessageKind::Accepted => self.on_accepted(message),
        }
    }

    /// Phase 1b: promise a higher ballot and report the previous vote.
    ///
    /// Equal-ballot Prepares are ignored: ballots are unique per proposer,
    /// so an equal ballot is this replica's own round.
    fn on_prepare(&mut self, message: Message) {
        if message.ballot > self.ballot {
            self.ballot = message.ballot;
            self.outbox.push(Message::promise(
                self.id,
                message.from,
                message.ballot,
                self.voted_ballot,
                self.voted_value.clone(),
            ));
        }
    }

    /// Phase 1b on the proposer: aggregate a promise for the current round.
    fn on_promise(&mut self, message: Message) {
        if message.ballot == self.ballot {
            self.note_promise(message.from, message.value, message.voted_ballot);
        }
    }

    /// Phase 2a: vote for the proposed value and confirm.
    fn on_accept(&mut self, message: Message) {
        if message.ballot >= self.ballot {
            self.ballot = message.ballot;
            self.voted_ballot = message.ballot;
            self.voted_value = message.value;
            self.outbox
                .push(Message::accepted(self.id, message.from, message.ballot));
        }
    }

    /// Phase 2b on the proposer: count a vote for the current round.
    fn on_accepted(&mut self, message: Message) {
        if message.ballot == self.ballot {
            self.note_accept(message.from);
        }
    }

    /// Record a promise from `from` and fire the Phase 2 transition when
    /// the promise set first reaches the r1-majority.
    ///
    /// A promise carrying a vote with a higher ballot than anything seen
    /// this round supersedes the aggregate: the proposer must adopt the
    /// value a previous round may already have decided.
    fn note_promise(&mut self, from: NodeId, voted_value: Option<Value>, voted_ballot: Ballot) {
        let newly = self.promises.insert(from);
        if voted_ballot > self.promise_ballot {
            self.promise_ballot = voted_ballot;
            self.promise_value = voted_value;
        }
        if newly && self.promises.len() == self.r1_majority {
            self.enter_accept_phase();
        }
    }

    /// Phase 2a broadcast, fired once per round.
    fn enter_accept_phase(&mut self) {
        if self.promise_value.is_none() {
            self.promise_value = self.proposed_value.clone();
        }
        debug!(
            replica = self.id,
            ballot = self.ballot.0,
            value = ?self.promise_value,
            "promise quorum reached, broadcasting accept"
        );
        for i in 0..self.nodes.len() {
            let id = self.nodes[i];
            if id != self.id {
                self.outbox.push(Message::accept(
                    self.id,
                    id,
                    self.ballot,
                    self.promise_value.clone(),
                ));
            }
        }
        // The proposer votes explicitly, without a message to itself.
        self.voted_value = self.promise_value.clone();
        self.voted_ballot = self.ballot;
        self.note_accept(self.id);
    }

    /// Record a vote from `from` and learn the decided value when the vote
    /// set first reaches the r2-majority.
    fn note_accept(&mut self, from: NodeId) {
        if self.accepts.insert(from) && self.accepts.len() == self.r2_majority {
            debug!(
                replica = self.id,
                ballot = self.ballot.0,
                value = ?self.voted_value,
                "vote quorum reached, learning value"
            );
            self.learned_value = self.voted_value.clone();
        }
    }
}
