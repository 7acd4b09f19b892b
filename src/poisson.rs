//! Spectral Poisson solvers.
//!
//! `Poisson` inverts the separable discrete Laplacian entirely in spectral
//! space through an `R2x` round trip. `PoissonHybrid` handles the
//! periodic-periodic-Neumann 3-D case with a 2-D FFT in the periodic plane
//! and a tridiagonal solve along z.

use std::sync::Arc;

use num_complex::Complex64;
use tracing::debug_span;

use crate::comm::CommunicationBackend;
use crate::dist_array::{Arena, DistArray};
use crate::domain::{decompose, IndexBox, RankMap};
use crate::error::{FftError, Result};
use crate::plan::{Boundary, BoundaryPair};
use crate::r2c::{Info, R2c};
use crate::r2x::{PostForward, R2x};

/// Rectangular problem geometry: the cell-centered index domain and the
/// uniform cell size per axis.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub domain: IndexBox,
    pub cell_size: [f64; 3],
}

impl Geometry {
    pub fn new(domain: IndexBox, cell_size: [f64; 3]) -> Self {
        Self { domain, cell_size }
    }
}

/// Inverts the spectral symbol of the 7-point Laplacian.
///
/// alpha_d = pi_d (i_d + delta_d) / N_d with pi = 2*pi on periodic axes and
/// pi otherwise; delta encodes the half-cell shift of the staggered grid
/// implied by the BC parity. Zero eigenvalues are left untouched (zero-mean
/// gauge).
struct SpectralInverse {
    fac: [f64; 3],
    dxfac: [f64; 3],
    offset: [f64; 3],
    scale: f64,
}

impl SpectralInverse {
    fn eigenvalue(&self, i: i64, j: i64, k: i64) -> f64 {
        let a = self.fac[0] * (i as f64 + self.offset[0]);
        let b = self.fac[1] * (j as f64 + self.offset[1]);
        let c = self.fac[2] * (k as f64 + self.offset[2]);
        self.dxfac[0] * (a.cos() - 1.0)
            + self.dxfac[1] * (b.cos() - 1.0)
            + self.dxfac[2] * (c.cos() - 1.0)
    }
}

impl PostForward for SpectralInverse {
    fn modify_real(&mut self, i: i64, j: i64, k: i64, value: &mut f64) {
        let k2 = self.eigenvalue(i, j, k);
        if k2 != 0.0 {
            *value /= k2;
        }
        *value *= self.scale;
    }

    fn modify_complex(&mut self, i: i64, j: i64, k: i64, value: &mut Complex64) {
        let k2 = self.eigenvalue(i, j, k);
        if k2 != 0.0 {
            *value /= k2;
        }
        *value *= self.scale;
    }
}

/// Poisson solver for separable boundary conditions using an R2X round
/// trip with the Laplacian symbol inverted in spectral space.
pub struct Poisson {
    geom: Geometry,
    bc: [BoundaryPair; 3],
    r2x: R2x,
}

impl Poisson {
    pub fn new(
        geom: Geometry,
        bc: [BoundaryPair; 3],
        comm: Arc<dyn CommunicationBackend>,
    ) -> Result<Self> {
        for (d, &h) in geom.cell_size.iter().enumerate() {
            if geom.domain.length(d) > 1 && h <= 0.0 {
                return Err(FftError::invalid_domain(
                    "Poisson",
                    format!("cell size {h} on axis {d}"),
                ));
            }
        }
        let r2x = R2x::new(geom.domain, bc, comm)?;
        Ok(Self { geom, bc, r2x })
    }

    /// All-periodic convenience constructor. The mean of the right-hand
    /// side must be zero for the solve to be meaningful.
    pub fn new_periodic(geom: Geometry, comm: Arc<dyn CommunicationBackend>) -> Result<Self> {
        let p = (Boundary::Periodic, Boundary::Periodic);
        Self::new(geom, [p, p, p], comm)
    }

    /// Solve lap(soln) = rhs.
    pub fn solve(&mut self, soln: &DistArray<f64>, rhs: &DistArray<f64>) -> Result<()> {
        let _span = debug_span!("poisson_solve").entered();

        let mut fac = [0.0; 3];
        let mut dxfac = [0.0; 3];
        let mut offset = [0.0; 3];
        for d in 0..3 {
            let n = self.geom.domain.length(d) as f64;
            fac[d] = std::f64::consts::PI / n;
            if self.bc[d].0 == Boundary::Periodic {
                fac[d] *= 2.0;
            }
            let h = self.geom.cell_size[d];
            dxfac[d] = if self.geom.domain.length(d) > 1 {
                2.0 / (h * h)
            } else {
                0.0
            };
            offset[d] = match self.bc[d] {
                (Boundary::Odd, Boundary::Odd) => 1.0,
                (Boundary::Odd, Boundary::Even) | (Boundary::Even, Boundary::Odd) => 0.5,
                _ => 0.0,
            };
        }

        let mut inverse = SpectralInverse {
            fac,
            dxfac,
            offset,
            scale: self.r2x.scaling_factor(),
        };
        self.r2x.forward_then_backward(rhs, soln, &mut inverse)
    }
}

/// Forward elimination and back substitution for one tridiagonal column.
/// `ald`/`bd`/`cud` are the sub-, main- and super-diagonals; `rhs` is
/// overwritten with the solution; `scratch` holds the eliminated pivots.
fn thomas_solve(
    ald: &[f64],
    bd: &[f64],
    cud: &[f64],
    rhs: &mut [Complex64],
    scratch: &mut [f64],
) {
    let nz = rhs.len();
    scratch[0] = cud[0] / bd[0];
    rhs[0] /= bd[0];
    for k in 1..nz {
        if k < nz - 1 {
            scratch[k] = cud[k] / (bd[k] - ald[k] * scratch[k - 1]);
        }
        let denom = bd[k] - ald[k] * scratch[k - 1];
        rhs[k] = (rhs[k] - rhs[k - 1] * ald[k]) / denom;
    }
    for k in (0..nz - 1).rev() {
        let upper = rhs[k + 1];
        rhs[k] -= upper * scratch[k];
    }
}

/// 3-D Poisson solver for periodic boundaries in x and y and homogeneous
/// Neumann along z. A batch-mode R2C transforms the periodic plane; every
/// spectral (i,j) column is then solved directly along z.
pub struct PoissonHybrid {
    geom: Geometry,
    delz: Vec<f64>,
    r2c: R2c,
    comm: Arc<dyn CommunicationBackend>,
}

impl PoissonHybrid {
    pub fn new(geom: Geometry, comm: Arc<dyn CommunicationBackend>) -> Result<Self> {
        let nz = geom.domain.length(2);
        let dz = geom.cell_size[2];
        Self::with_spacing(geom, vec![dz; nz], comm)
    }

    /// Variant with a per-cell z spacing for vertically stretched grids.
    pub fn with_spacing(
        geom: Geometry,
        delz: Vec<f64>,
        comm: Arc<dyn CommunicationBackend>,
    ) -> Result<Self> {
        for d in 0..2 {
            if geom.cell_size[d] <= 0.0 {
                return Err(FftError::invalid_domain(
                    "PoissonHybrid",
                    format!("cell size {} on axis {d}", geom.cell_size[d]),
                ));
            }
        }
        if delz.len() != geom.domain.length(2) || delz.iter().any(|&h| h <= 0.0) {
            return Err(FftError::invalid_domain(
                "PoissonHybrid",
                "z spacing must be positive for every cell",
            ));
        }
        let r2c = R2c::new(geom.domain, Info { batch_mode: true }, Arc::clone(&comm))?;
        Ok(Self {
            geom,
            delz,
            r2c,
            comm,
        })
    }

    /// Solve lap(soln) = rhs. The constant mode is pinned by the gauge fix,
    /// so a compatible right-hand side (zero mean) is required for the
    /// result to solve the original problem.
    pub fn solve(&mut self, soln: &DistArray<f64>, rhs: &DistArray<f64>) -> Result<()> {
        let _span = debug_span!("poisson_hybrid_solve").entered();

        let n0 = self.geom.domain.length(0);
        let n1 = self.geom.domain.length(1);
        let nz = self.geom.domain.length(2);
        let facx = 2.0 * std::f64::consts::PI / n0 as f64;
        let facy = 2.0 * std::f64::consts::PI / n1 as f64;
        let dx2 = self.geom.cell_size[0] * self.geom.cell_size[0];
        let dy2 = self.geom.cell_size[1] * self.geom.cell_size[1];
        let scale = 1.0 / (n0 as f64 * n1 as f64);
        let delz = &self.delz;

        // Caller-layout spectral array: canonical (x,y,z) ordering, z kept
        // whole on every rank so each column solve is local.
        let cdomain = self.geom.domain.with_hi(0, (n0 / 2) as i64);
        let cba = decompose(&cdomain, self.comm.num_ranks(), [false, false, true])?;
        let dm = RankMap::iota(cba.len());
        let mut spmf = DistArray::<Complex64>::define(cba, dm);
        let words = spmf.local_words(self.comm.rank()).max(1);
        let arena = Arena::alloc(words, "PoissonHybrid")?;
        spmf.attach(self.comm.rank(), &arena);

        self.r2c.forward_into(rhs, &spmf)?;

        if let Some(b) = spmf.local_box().copied() {
            let mut data = spmf.local_mut().expect("spectral patch missing");
            let mut ald = vec![0.0; nz];
            let mut bd = vec![0.0; nz];
            let mut cud = vec![0.0; nz];
            let mut scratch = vec![0.0; nz];
            let mut column = vec![Complex64::default(); nz];

            for j in b.lo[1]..=b.hi[1] {
                for i in b.lo[0]..=b.hi[0] {
                    let a = facx * i as f64;
                    let bj = if j < (n1 / 2) as i64 {
                        facy * j as f64
                    } else {
                        facy * (n1 as f64 - j as f64)
                    };
                    let k2 = 2.0 * (a.cos() - 1.0) / dx2 + 2.0 * (bj.cos() - 1.0) / dy2;

                    // Second-order differences along z; boundary rows drop
                    // the outward coefficient (homogeneous Neumann).
                    for k in 0..nz {
                        ald[k] = if k == 0 {
                            0.0
                        } else {
                            2.0 / (delz[k] * (delz[k] + delz[k - 1]))
                        };
                        cud[k] = if k == nz - 1 {
                            0.0
                        } else {
                            2.0 / (delz[k] * (delz[k] + delz[k + 1]))
                        };
                        bd[k] = k2 - ald[k] - cud[k];
                    }
                    if i == 0 && j == 0 {
                        // Pin the constant mode of the otherwise singular
                        // zero-wavenumber system.
                        bd[nz - 1] *= 2.0;
                    }

                    for (k, c) in column.iter_mut().enumerate() {
                        *c = data[b.flat_index([i, j, k as i64])];
                    }
                    thomas_solve(&ald, &bd, &cud, &mut column, &mut scratch);
                    for (k, c) in column.iter().enumerate() {
                        data[b.flat_index([i, j, k as i64])] = *c * scale;
                    }
                }
            }
        }

        self.r2c.backward_from(&spmf, soln)
    }
}
