//! Communication backend abstraction for the redistribution layer.
//!
//! Provides a trait for point-to-point data motion between ranks and a
//! no-op single-process implementation. Transform calls are collective:
//! every rank owning data must walk the same descriptor list in the same
//! order, so blocking send/recv pairs match in lockstep.

/// Abstraction over inter-process communication.
///
/// Implementations: `SingleProcessComm` (no-op), `MpiComm` (via mpi crate,
/// `distributed` feature).
pub trait CommunicationBackend: Send + Sync {
    /// This process's rank.
    fn rank(&self) -> usize;

    /// Total number of ranks.
    fn num_ranks(&self) -> usize;

    /// Blocking send of f64 words to a peer rank.
    fn send_f64(&self, to: usize, data: &[f64]);

    /// Blocking receive of f64 words from a peer rank.
    fn recv_f64(&self, from: usize, out: &mut [f64]);

    /// Synchronization barrier.
    fn barrier(&self);
}

/// No-op communication backend for single-process execution.
///
/// With one rank every copy descriptor is local, so `send_f64`/`recv_f64`
/// are never reached; calling them is a choreography bug.
pub struct SingleProcessComm;

impl CommunicationBackend for SingleProcessComm {
    fn rank(&self) -> usize {
        0
    }

    fn num_ranks(&self) -> usize {
        1
    }

    fn send_f64(&self, to: usize, _data: &[f64]) {
        unreachable!("single process has no peer rank {to}");
    }

    fn recv_f64(&self, from: usize, _out: &mut [f64]) {
        unreachable!("single process has no peer rank {from}");
    }

    fn barrier(&self) {}
}
