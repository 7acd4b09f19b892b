//! Distributed multi-dimensional discrete Fourier transforms over
//! block-decomposed Cartesian grids, with spectral Poisson solvers.
//!
//! The engines rearrange a distributed array one axis at a time so each
//! 1-D transform runs locally (pencil decomposition), dispatching per-axis
//! kernels (r2c, c2c, or a DCT/DST variant chosen by the axis boundary
//! conditions) onto the vendor FFT crates. Transform calls are collective
//! across the communicator; single-process by default, MPI behind the
//! `distributed` feature.

pub mod comm;
#[cfg(feature = "distributed")]
pub mod comm_mpi;
pub mod dist_array;
pub mod domain;
pub mod error;
pub mod plan;
pub mod poisson;
pub mod r2c;
pub mod r2x;
pub mod redistribute;

pub use comm::{CommunicationBackend, SingleProcessComm};
pub use dist_array::{Arena, DistArray};
pub use domain::{decompose, BoxArray, IndexBox, RankMap};
pub use error::{FftError, Result};
pub use plan::{Boundary, BoundaryPair, Direction};
pub use poisson::{Geometry, Poisson, PoissonHybrid};
pub use r2c::{Info, R2c};
pub use r2x::{IdentityCallback, PostForward, R2x};
pub use redistribute::{parallel_copy, CommMetadata, IndexTransform};
