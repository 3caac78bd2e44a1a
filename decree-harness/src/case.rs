//! Test cases: fixed-length schedules of per-step cluster states.

use std::fmt;
use std::sync::Arc;

use crate::error::ReplayError;
use crate::generator::StateTables;
use crate::partition::{Actions, NodeId, Partition};

/// Width of the step-state count prefix in an encoded payload.
const COUNT_WIDTH: usize = 8;

/// Width of one encoded step-state index.
const STATE_WIDTH: usize = 2;

/// One unit of work for a worker: a fixed-length sequence of step states.
///
/// A test case owns a snapshot of the generator's counter (the index
/// vector) plus a shared handle on the immutable state tables, so cases
/// handed to different workers are fully independent. The step function
/// consumes it by calling [`next_step`](TestCase::next_step) until it
/// returns `None`.
#[derive(Debug, Clone)]
pub struct TestCase {
    tables: Arc<StateTables>,
    states: Vec<i16>,
    step: usize,
}

impl TestCase {
    pub(crate) fn new(tables: Arc<StateTables>, states: Vec<i16>) -> Self {
        Self {
            tables,
            states,
            step: 0,
        }
    }

    /// Cluster membership configured on the generator.
    pub fn nodes(&self) -> &[NodeId] {
        self.tables.nodes()
    }

    /// Advance the step cursor and return the cluster state for this step.
    ///
    /// Returns `None` once the schedule is exhausted, signalling the end of
    /// the sequence to the step function.
    pub fn next_step(&mut self) -> Option<(&Partition, &Actions)> {
        if self.step == self.states.len() {
            return None;
        }
        let state = self.tables.state(self.states[self.step] as usize);
        self.step += 1;
        Some(state)
    }

    /// The raw step-state index vector.
    pub fn states(&self) -> &[i16] {
        &self.states
    }

    /// Encode the schedule into the replay payload format.
    ///
    /// Layout, little-endian throughout: a signed 64-bit step-state count
    /// followed by one signed 16-bit index per step.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(COUNT_WIDTH + STATE_WIDTH * self.states.len());
        buf.extend_from_slice(&(self.states.len() as i64).to_le_bytes());
        for state in &self.states {
            buf.extend_from_slice(&state.to_le_bytes());
        }
        buf
    }

    /// Decode a replay payload back into a step-state index vector.
    pub(crate) fn decode(payload: &[u8]) -> Result<Vec<i16>, ReplayError> {
        if payload.len() < COUNT_WIDTH {
            return Err(ReplayError::Malformed {
                reason: format!("payload of {} bytes is shorter than the count prefix", payload.len()),
            });
        }
        let (prefix, rest) = payload.split_at(COUNT_WIDTH);
        let mut count_bytes = [0u8; COUNT_WIDTH];
        count_bytes.copy_from_slice(prefix);
        let count = i64::from_le_bytes(count_bytes);
        if count < 0 {
            return Err(ReplayError::Malformed {
                reason: format!("negative step-state count {count}"),
            });
        }
        let expected = count as usize * STATE_WIDTH;
        if rest.len() != expected {
            return Err(ReplayError::Malformed {
                reason: format!(
                    "count {count} implies {expected} payload bytes, found {}",
                    rest.len()
                ),
            });
        }
        Ok(rest
            .chunks_exact(STATE_WIDTH)
            .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
            .collect())
    }
}

impl fmt::Display for TestCase {
    /// Renders the executed portion of the schedule, one step per line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let executed = self.states.len().min(self.step + 1);
        for (i, index) in self.states[..executed].iter().enumerate() {
            let (partition, actions) = self.tables.state(*index as usize);
            writeln!(f, "step {}: {partition} {actions}", i + 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::GeneratorBuilder;

    fn one_case() -> TestCase {
        let generator = GeneratorBuilder::new()
            .replicas([1, 2, 3])
            .partition(Partition::from_groups(&[&[1, 2, 3]]))
            .leaders([1])
            .steps(4)
            .build()
            .expect("valid configuration");
        generator.next().expect("fresh generator yields a case")
    }

    #[test]
    fn test_next_step_exhausts_after_step_limit() {
        let mut tc = one_case();
        for _ in 0..4 {
            assert!(tc.next_step().is_some());
        }
        assert!(tc.next_step().is_none());
        assert!(tc.next_step().is_none());
    }

    #[test]
    fn test_encode_layout() {
        let tc = one_case();
        let buf = tc.encode();
        assert_eq!(buf.len(), COUNT_WIDTH + STATE_WIDTH * 4);
        assert_eq!(&buf[..COUNT_WIDTH], &4i64.to_le_bytes());
    }

    #[test]
    fn test_decode_rejects_short_prefix() {
        assert!(matches!(
            TestCase::decode(&[0u8; 3]),
            Err(ReplayError::Malformed { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_negative_count() {
        let buf = (-1i64).to_le_bytes();
        assert!(matches!(
            TestCase::decode(&buf),
            Err(ReplayError::Malformed { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        let mut buf = 3i64.to_le_bytes().to_vec();
        buf.extend_from_slice(&1i16.to_le_bytes());
        assert!(matches!(
            TestCase::decode(&buf),
            Err(ReplayError::Malformed { .. })
        ));
    }

    #[test]
    fn test_decode_roundtrip() {
        let tc = one_case();
        let decoded = TestCase::decode(&tc.encode()).expect("well-formed payload");
        assert_eq!(decoded, tc.states());
    }

    #[test]
    fn test_decode_empty_schedule() {
        let buf = 0i64.to_le_bytes();
        assert_eq!(TestCase::decode(&buf).expect("empty payload"), Vec::<i16>::new());
    }
}
