//! MPI communication backend.
//!
//! Requires the `distributed` feature flag and an MPI installation.
//! Implements `CommunicationBackend` using `mpi::traits::*`.
//!
//! # Usage
//!
//! The caller must initialize MPI before constructing `MpiComm`:
//!
//! ```ignore
//! let universe = mpi::initialize().expect("MPI init failed");
//! let comm = MpiComm::new();
//! ```
//!
//! Sends and receives are blocking. Deadlock freedom comes from the caller
//! side: `parallel_copy` walks a globally ordered descriptor list, so every
//! send is matched by a receive posted at the same position on the peer.

use crate::comm::CommunicationBackend;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

/// MPI-based communication backend.
///
/// Wraps the MPI world communicator. Requires `mpi::initialize()` to have
/// been called before construction.
pub struct MpiComm;

impl MpiComm {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MpiComm {
    fn default() -> Self {
        Self::new()
    }
}

impl CommunicationBackend for MpiComm {
    fn rank(&self) -> usize {
        let world = SimpleCommunicator::world();
        world.rank() as usize
    }

    fn num_ranks(&self) -> usize {
        let world = SimpleCommunicator::world();
        world.size() as usize
    }

    fn send_f64(&self, to: usize, data: &[f64]) {
        let world = SimpleCommunicator::world();
        world.process_at_rank(to as i32).send(data);
    }

    fn recv_f64(&self, from: usize, out: &mut [f64]) {
        let world = SimpleCommunicator::world();
        world.process_at_rank(from as i32).receive_into(out);
    }

    fn barrier(&self) {
        let world = SimpleCommunicator::world();
        world.barrier();
    }
}
