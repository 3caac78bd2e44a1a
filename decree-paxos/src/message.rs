//! The four Paxos message kinds and their common envelope.

use std::fmt;

use crate::types::{Ballot, NodeId, Value};

/// Discriminant of a protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Phase 1a: a proposer asks acceptors to promise a ballot.
    Prepare,
    /// Phase 1b: an acceptor promises, reporting its most recent vote.
    Promise,
    /// Phase 2a: the proposer asks acceptors to vote for a value.
    Accept,
    /// Phase 2b: an acceptor confirms its vote.
    Accepted,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MessageKind::Prepare => "Prepare",
            MessageKind::Promise => "Promise",
            MessageKind::Accept => "Accept",
            MessageKind::Accepted => "Accepted",
        })
    }
}

/// An immutable protocol message between two replicas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sending node.
    pub from: NodeId,
    /// Destination node.
    pub to: NodeId,
    /// Message kind.
    pub kind: MessageKind,
    /// Ballot this message belongs to.
    pub ballot: Ballot,
    /// For a Promise, the sender's previously voted value; for an Accept,
    /// the value to vote for in the current ballot. Meaningless otherwise.
    pub value: Option<Value>,
    /// For a Promise, the ballot of the sender's previous vote.
    /// Meaningless otherwise.
    pub voted_ballot: Ballot,
}

impl Message {
    /// Phase 1a request.
    pub fn prepare(from: NodeId, to: NodeId, ballot: Ballot) -> Self {
        Self {
            from,
            to,
            kind: MessageKind::Prepare,
            ballot,
            value: None,
            voted_ballot: Ballot::ZERO,
        }
    }

    /// Phase 1b response carrying the acceptor's most recent vote.
    pub fn promise(
        from: NodeId,
        to: NodeId,
        ballot: Ballot,
        voted_ballot: Ballot,
        value: Option<Value>,
    ) -> Self {
        Self {
            from,
            to,
            kind: MessageKind::Promise,
            ballot,
            value,
            voted_ballot,
        }
    }

    /// Phase 2a request carrying the value to vote for.
    pub fn accept(from: NodeId, to: NodeId, ballot: Ballot, value: Option<Value>) -> Self {
        Self {
            from,
            to,
            kind: MessageKind::Accept,
            ballot,
            value,
            voted_ballot: Ballot::ZERO,
        }
    }

    /// Phase 2b confirmation.
    pub fn accepted(from: NodeId, to: NodeId, ballot: Ballot) -> Self {
        Self {
            from,
            to,
            kind: MessageKind::Accepted,
            ballot,
            value: None,
            voted_ballot: Ballot::ZERO,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{} -> {}, {}, voted={}, value={:02x?}]",
            self.kind, self.from, self.to, self.ballot, self.voted_ballot, self.value
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_fill_the_envelope() {
        let m = Message::prepare(1, 2, Ballot(3));
        assert_eq!(m.kind, MessageKind::Prepare);
        assert_eq!((m.from, m.to, m.ballot), (1, 2, Ballot(3)));
        assert!(m.value.is_none());

        let m = Message::promise(2, 1, Ballot(3), Ballot(1), Some(vec![0xAA]));
        assert_eq!(m.kind, MessageKind::Promise);
        assert_eq!(m.voted_ballot, Ballot(1));
        assert_eq!(m.value.as_deref(), Some([0xAA].as_slice()));

        let m = Message::accept(1, 2, Ballot(3), Some(vec![0xBB]));
        assert_eq!(m.kind, MessageKind::Accept);

        let m = Message::accepted(2, 1, Ballot(3));
        assert_eq!(m.kind, MessageKind::Accepted);
        assert!(m.value.is_none());
    }

    #[test]
    fn test_display_names_the_kind() {
        let m = Message::prepare(1, 2, Ballot(3));
        let rendered = m.to_string();
        assert!(rendered.starts_with("Prepare["));
        assert!(rendered.contains("1 -> 2"));
    }
}
