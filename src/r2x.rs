//! Distributed transform engine with per-axis boundary conditions.
//!
//! Each axis independently chooses periodic (r2c on the first real array,
//! c2c on later complex arrays) or a real-to-real DCT/DST variant selected
//! by its endpoint pair. Storage follows one of four variants depending on
//! where the pipeline first turns complex:
//!
//! 1. x periodic:            rx -> cx, cy, cz     alias (rx,cy) (cx,cz)
//! 2. x real, y periodic:    rx, ry -> cy, cz     alias (rx,cy) (ry,cz)
//! 3. x,y real, z periodic:  rx, ry, rz -> cz     alias (rx,rz) (ry,cz)
//! 4. all real:              rx, ry, rz           alias (rx,rz)
//!
//! A non-periodic axis reached after the pipeline has turned complex runs
//! its DCT/DST on the real and imaginary parts separately.

use std::rc::Rc;
use std::sync::Arc;

use num_complex::Complex64;
use tracing::debug_span;

use crate::comm::CommunicationBackend;
use crate::dist_array::{alias_pair, Arena, DistArray};
use crate::domain::{decompose, BoxArray, IndexBox, RankMap};
use crate::error::{FftError, Result};
use crate::plan::{AxisPlan, Boundary, BoundaryPair, Direction};
use crate::redistribute::{copy_into, parallel_copy, CommMetadata, IndexTransform};

/// Spectral modification applied between the forward and backward passes.
///
/// The innermost array is real when every axis is non-periodic and complex
/// otherwise, so a callback provides both forms; indices arrive in
/// canonical (x,y,z) order, over the reduced index space when the effective
/// dimensionality is below 3.
pub trait PostForward {
    fn modify_real(&mut self, i: i64, j: i64, k: i64, value: &mut f64);
    fn modify_complex(&mut self, i: i64, j: i64, k: i64, value: &mut Complex64);
}

/// The do-nothing spectral modification; turns `forward_then_backward`
/// into a pure round trip.
pub struct IdentityCallback;

impl PostForward for IdentityCallback {
    fn modify_real(&mut self, _i: i64, _j: i64, _k: i64, _value: &mut f64) {}
    fn modify_complex(&mut self, _i: i64, _j: i64, _k: i64, _value: &mut Complex64) {}
}

/// Distributed transform with independent per-axis boundary conditions.
pub struct R2x {
    comm: Arc<dyn CommunicationBackend>,
    dom_0: IndexBox,
    bc: [BoundaryPair; 3],

    rx: DistArray<f64>,
    ry: DistArray<f64>,
    rz: DistArray<f64>,
    cx: DistArray<Complex64>,
    cy: DistArray<Complex64>,
    cz: DistArray<Complex64>,
    _arena_1: Rc<Arena>,
    _arena_2: Rc<Arena>,

    plan_x: AxisPlan,
    plan_y: AxisPlan,
    plan_z: AxisPlan,

    cmd_x2y: Option<CommMetadata>,
    cmd_y2x: Option<CommMetadata>,
    cmd_y2z: Option<CommMetadata>,
    cmd_z2y: Option<CommMetadata>,
}

impl std::fmt::Debug for R2x {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("R2x")
            .field("dom_0", &self.dom_0)
            .field("bc", &self.bc)
            .finish_non_exhaustive()
    }
}

impl R2x {
    pub fn new(
        domain: IndexBox,
        bc: [BoundaryPair; 3],
        comm: Arc<dyn CommunicationBackend>,
    ) -> Result<Self> {
        let _span = debug_span!("r2x_new").entered();

        let n0 = domain.length(0);
        let n1 = domain.length(1);
        let n2 = domain.length(2);
        if domain.lo != [0, 0, 0] {
            return Err(FftError::invalid_domain("R2X", "domain must start at 0"));
        }
        if n0 <= 1 {
            return Err(FftError::invalid_domain("R2X", format!("N0 = {n0} <= 1")));
        }
        if n1 <= 1 && n2 > 1 {
            return Err(FftError::invalid_domain(
                "R2X",
                format!("N1 = {n1} <= 1 while N2 = {n2} > 1"),
            ));
        }
        for (axis, pair) in bc.iter().enumerate() {
            let periodic_ends =
                usize::from(pair.0 == Boundary::Periodic) + usize::from(pair.1 == Boundary::Periodic);
            if periodic_ends == 1 {
                return Err(FftError::InvalidBoundary { axis });
            }
        }

        let myrank = comm.rank();
        let nprocs = comm.num_ranks();

        //
        // data containers
        //

        let dom_rx = domain;
        let bax = decompose(&dom_rx, nprocs, [true, false, false])?;
        let dmx = RankMap::iota(bax.len());
        let mut rx = DistArray::<f64>::define(bax.clone(), dmx.clone());

        let mut cx = DistArray::<Complex64>::empty();
        let mut dom_cx = IndexBox::from_lengths([1, 1, 1]);
        if bc[0].0 == Boundary::Periodic {
            // x-fft: r2c(rx -> cx)
            dom_cx = dom_rx.with_hi(0, (n0 / 2) as i64);
            let cbax = BoxArray::new(
                bax.boxes
                    .iter()
                    .map(|b| b.with_hi(0, dom_cx.hi[0]))
                    .collect(),
            );
            cx = DistArray::define(cbax, dmx.clone());
        } // else: x-fft: r2r in rx

        let mut ry = DistArray::<f64>::empty();
        let mut cy = DistArray::<Complex64>::empty();
        let mut dom_ry = IndexBox::from_lengths([1, 1, 1]);
        let mut dom_cy = IndexBox::from_lengths([1, 1, 1]);
        if n1 > 1 {
            if !cx.is_empty() {
                // copy(cx -> cy); y-fft is c2c or r2r on complex parts
                dom_cy = IndexBox::new([0, 0, 0], [dom_cx.hi[1], dom_cx.hi[0], dom_cx.hi[2]]);
                let ba = decompose(&dom_cy, nprocs, [true, false, false])?;
                let dm = if ba.len() == cx.num_boxes() {
                    cx.rank_map().clone()
                } else {
                    RankMap::iota(ba.len())
                };
                cy = DistArray::define(ba, dm);
            } else {
                // copy(rx -> ry); y-fft is r2c(ry -> cy) or r2r in ry
                dom_ry = IndexBox::new([0, 0, 0], [dom_rx.hi[1], dom_rx.hi[0], dom_rx.hi[2]]);
                let ba = decompose(&dom_ry, nprocs, [true, false, false])?;
                let dm = if ba.len() == rx.num_boxes() {
                    rx.rank_map().clone()
                } else {
                    RankMap::iota(ba.len())
                };
                ry = DistArray::define(ba.clone(), dm.clone());
                if bc[1].0 == Boundary::Periodic {
                    dom_cy = dom_ry.with_hi(0, (n1 / 2) as i64);
                    let cba = BoxArray::new(
                        ba.boxes
                            .iter()
                            .map(|b| b.with_hi(0, dom_cy.hi[0]))
                            .collect(),
                    );
                    cy = DistArray::define(cba, dm);
                }
            }
        }

        let mut rz = DistArray::<f64>::empty();
        let mut cz = DistArray::<Complex64>::empty();
        let mut dom_rz = IndexBox::from_lengths([1, 1, 1]);
        let mut dom_cz = IndexBox::from_lengths([1, 1, 1]);
        if n2 > 1 {
            if !cy.is_empty() {
                // copy(cy -> cz); z-fft is c2c or r2r on complex parts
                dom_cz = IndexBox::new([0, 0, 0], [dom_cy.hi[2], dom_cy.hi[1], dom_cy.hi[0]]);
                let ba = decompose(&dom_cz, nprocs, [true, false, false])?;
                let dm = if ba.len() == cy.num_boxes() {
                    cy.rank_map().clone()
                } else {
                    RankMap::iota(ba.len())
                };
                cz = DistArray::define(ba, dm);
            } else {
                // copy(ry -> rz); z-fft is r2c(rz -> cz) or r2r in rz
                dom_rz = IndexBox::new([0, 0, 0], [dom_ry.hi[2], dom_ry.hi[1], dom_ry.hi[0]]);
                let ba = decompose(&dom_rz, nprocs, [true, false, false])?;
                let dm = if ba.len() == ry.num_boxes() {
                    ry.rank_map().clone()
                } else {
                    RankMap::iota(ba.len())
                };
                rz = DistArray::define(ba.clone(), dm.clone());
                if bc[2].0 == Boundary::Periodic {
                    dom_cz = dom_rz.with_hi(0, (n2 / 2) as i64);
                    let cba = BoxArray::new(
                        ba.boxes
                            .iter()
                            .map(|b| b.with_hi(0, dom_cz.hi[0]))
                            .collect(),
                    );
                    cz = DistArray::define(cba, dm);
                }
            }
        }

        // Aliased storage, paired so every copy and every out-of-place
        // kernel crosses from one arena to the other.
        let (arena_1, arena_2) = if !cx.is_empty() {
            (
                alias_pair(&mut rx, &mut cy, myrank, "R2X")?,
                alias_pair(&mut cx, &mut cz, myrank, "R2X")?,
            )
        } else if !cy.is_empty() {
            (
                alias_pair(&mut rx, &mut cy, myrank, "R2X")?,
                alias_pair(&mut ry, &mut cz, myrank, "R2X")?,
            )
        } else {
            (
                alias_pair(&mut rx, &mut rz, myrank, "R2X")?,
                alias_pair(&mut ry, &mut cz, myrank, "R2X")?,
            )
        };

        //
        // copiers
        //

        let (mut cmd_x2y, mut cmd_y2x, mut cmd_y2z, mut cmd_z2y) = (None, None, None, None);
        if n1 > 1 {
            if !cx.is_empty() {
                cmd_x2y = Some(CommMetadata::build(&cy, &dom_cy, &cx, IndexTransform::Swap01));
                cmd_y2x = Some(CommMetadata::build(&cx, &dom_cx, &cy, IndexTransform::Swap01));
            } else {
                cmd_x2y = Some(CommMetadata::build(&ry, &dom_ry, &rx, IndexTransform::Swap01));
                cmd_y2x = Some(CommMetadata::build(&rx, &dom_rx, &ry, IndexTransform::Swap01));
            }
        }
        if n2 > 1 {
            if !cy.is_empty() {
                cmd_y2z = Some(CommMetadata::build(&cz, &dom_cz, &cy, IndexTransform::Swap02));
                cmd_z2y = Some(CommMetadata::build(&cy, &dom_cy, &cz, IndexTransform::Swap02));
            } else {
                cmd_y2z = Some(CommMetadata::build(&rz, &dom_rz, &ry, IndexTransform::Swap02));
                cmd_z2y = Some(CommMetadata::build(&ry, &dom_ry, &rz, IndexTransform::Swap02));
            }
        }

        //
        // plans
        //

        let plan_x = if rx.local_box().is_some() {
            if bc[0].0 == Boundary::Periodic {
                AxisPlan::r2c(n0)?
            } else {
                AxisPlan::r2r(n0, bc[0])?
            }
        } else {
            AxisPlan::noop()
        };

        let plan_y = if n1 > 1 {
            let owner = if ry.is_empty() { cy.local_box().is_some() } else { ry.local_box().is_some() };
            if !owner {
                AxisPlan::noop()
            } else if bc[1].0 == Boundary::Periodic {
                if ry.is_empty() {
                    AxisPlan::c2c(n1)
                } else {
                    AxisPlan::r2c(n1)?
                }
            } else {
                AxisPlan::r2r(n1, bc[1])?
            }
        } else {
            AxisPlan::noop()
        };

        let plan_z = if n2 > 1 {
            let owner = if rz.is_empty() { cz.local_box().is_some() } else { rz.local_box().is_some() };
            if !owner {
                AxisPlan::noop()
            } else if bc[2].0 == Boundary::Periodic {
                if rz.is_empty() {
                    AxisPlan::c2c(n2)
                } else {
                    AxisPlan::r2c(n2)?
                }
            } else {
                AxisPlan::r2r(n2, bc[2])?
            }
        } else {
            AxisPlan::noop()
        };

        Ok(Self {
            comm,
            dom_0: domain,
            bc,
            rx,
            ry,
            rz,
            cx,
            cy,
            cz,
            _arena_1: arena_1,
            _arena_2: arena_2,
            plan_x,
            plan_y,
            plan_z,
            cmd_x2y,
            cmd_y2x,
            cmd_y2z,
            cmd_z2y,
        })
    }

    pub fn domain(&self) -> &IndexBox {
        &self.dom_0
    }

    pub fn boundaries(&self) -> &[BoundaryPair; 3] {
        &self.bc
    }

    /// The factor making forward-then-backward the identity when the
    /// spectral data is left unmodified: the unnormalised kernels multiply
    /// by Nd per periodic axis and 2Nd per non-periodic axis.
    pub fn scaling_factor(&self) -> f64 {
        let mut r = self.dom_0.num_pts() as f64;
        for d in 0..3 {
            if self.bc[d].0 != Boundary::Periodic && self.dom_0.length(d) > 1 {
                r *= 2.0;
            }
        }
        1.0 / r
    }

    /// Forward transform, spectral modification, backward transform; the
    /// only exposed round trip.
    pub fn forward_then_backward<F: PostForward>(
        &mut self,
        inmf: &DistArray<f64>,
        outmf: &DistArray<f64>,
        post_forward: &mut F,
    ) -> Result<()> {
        let _span = debug_span!("r2x_forward_backward").entered();

        // forward

        copy_into(&self.rx, inmf, self.comm.as_ref());
        if self.bc[0].0 == Boundary::Periodic {
            if let (Some(mut r), Some(mut c)) = (self.rx.local_mut(), self.cx.local_mut()) {
                self.plan_x.compute_r2c(Direction::Forward, &mut r, &mut c)?;
            }
        } else if let Some(mut r) = self.rx.local_mut() {
            self.plan_x.compute_r2r(Direction::Forward, &mut r);
        }

        if let Some(cmd) = &self.cmd_x2y {
            if !self.cx.is_empty() {
                parallel_copy(&self.cy, &self.cx, cmd, IndexTransform::Swap01, self.comm.as_ref());
            } else {
                parallel_copy(&self.ry, &self.rx, cmd, IndexTransform::Swap01, self.comm.as_ref());
            }
        }
        self.compute_y(Direction::Forward)?;

        if let Some(cmd) = &self.cmd_y2z {
            if !self.cy.is_empty() {
                parallel_copy(&self.cz, &self.cy, cmd, IndexTransform::Swap02, self.comm.as_ref());
            } else {
                parallel_copy(&self.rz, &self.ry, cmd, IndexTransform::Swap02, self.comm.as_ref());
            }
        }
        self.compute_z(Direction::Forward)?;

        // post-forward

        self.post_forward_doit(post_forward);

        // backward

        self.compute_z(Direction::Backward)?;
        if let Some(cmd) = &self.cmd_z2y {
            if !self.cy.is_empty() {
                parallel_copy(&self.cy, &self.cz, cmd, IndexTransform::Swap02, self.comm.as_ref());
            } else {
                parallel_copy(&self.ry, &self.rz, cmd, IndexTransform::Swap02, self.comm.as_ref());
            }
        }

        self.compute_y(Direction::Backward)?;
        if let Some(cmd) = &self.cmd_y2x {
            if !self.cx.is_empty() {
                parallel_copy(&self.cx, &self.cy, cmd, IndexTransform::Swap01, self.comm.as_ref());
            } else {
                parallel_copy(&self.rx, &self.ry, cmd, IndexTransform::Swap01, self.comm.as_ref());
            }
        }

        if self.bc[0].0 == Boundary::Periodic {
            if let (Some(mut r), Some(mut c)) = (self.rx.local_mut(), self.cx.local_mut()) {
                self.plan_x.compute_r2c(Direction::Backward, &mut r, &mut c)?;
            }
        } else if let Some(mut r) = self.rx.local_mut() {
            self.plan_x.compute_r2r(Direction::Backward, &mut r);
        }
        copy_into(outmf, &self.rx, self.comm.as_ref());
        Ok(())
    }

    /// y-phase kernel dispatch: r2r (real or complex parts), c2c, or r2c,
    /// depending on this axis's BC and where the pipeline turned complex.
    fn compute_y(&mut self, dir: Direction) -> Result<()> {
        if self.bc[1].0 != Boundary::Periodic {
            if !self.cy.is_empty() {
                if let Some(mut c) = self.cy.local_mut() {
                    self.plan_y.compute_r2r_complex(dir, &mut c);
                }
            } else if let Some(mut r) = self.ry.local_mut() {
                self.plan_y.compute_r2r(dir, &mut r);
            }
        } else if self.bc[0].0 == Boundary::Periodic {
            if let Some(mut c) = self.cy.local_mut() {
                self.plan_y.compute_c2c(dir, &mut c);
            }
        } else if let (Some(mut r), Some(mut c)) = (self.ry.local_mut(), self.cy.local_mut()) {
            self.plan_y.compute_r2c(dir, &mut r, &mut c)?;
        }
        Ok(())
    }

    fn compute_z(&mut self, dir: Direction) -> Result<()> {
        if self.bc[2].0 != Boundary::Periodic {
            if !self.cz.is_empty() && self.rz.is_empty() {
                if let Some(mut c) = self.cz.local_mut() {
                    self.plan_z.compute_r2r_complex(dir, &mut c);
                }
            } else if let Some(mut r) = self.rz.local_mut() {
                self.plan_z.compute_r2r(dir, &mut r);
            }
        } else if self.bc[0].0 == Boundary::Periodic || self.bc[1].0 == Boundary::Periodic {
            if let Some(mut c) = self.cz.local_mut() {
                self.plan_z.compute_c2c(dir, &mut c);
            }
        } else if let (Some(mut r), Some(mut c)) = (self.rz.local_mut(), self.cz.local_mut()) {
            self.plan_z.compute_r2c(dir, &mut r, &mut c)?;
        }
        Ok(())
    }

    fn post_forward_doit<F: PostForward>(&mut self, f: &mut F) {
        let n1 = self.dom_0.length(1);
        let n2 = self.dom_0.length(2);
        let actual_dim = if n1 == 1 {
            1
        } else if n2 == 1 {
            2
        } else {
            3
        };

        match actual_dim {
            1 => {
                if self.cx.is_empty() {
                    Self::visit_real(&self.rx, [0, 1, 2], f);
                } else {
                    Self::visit_complex(&self.cx, [0, 1, 2], f);
                }
            }
            2 => {
                // y-phase arrays store (y,x,z)
                if self.cy.is_empty() {
                    Self::visit_real(&self.ry, [1, 0, 2], f);
                } else {
                    Self::visit_complex(&self.cy, [1, 0, 2], f);
                }
            }
            _ => {
                // z-phase arrays store (z,x,y)
                if self.cz.is_empty() {
                    Self::visit_real(&self.rz, [1, 2, 0], f);
                } else {
                    Self::visit_complex(&self.cz, [1, 2, 0], f);
                }
            }
        }
    }

    fn visit_real<F: PostForward>(arr: &DistArray<f64>, order: [usize; 3], f: &mut F) {
        if let Some(b) = arr.local_box().copied() {
            let mut data = arr.local_mut().expect("spectral patch missing");
            for s2 in b.lo[2]..=b.hi[2] {
                for s1 in b.lo[1]..=b.hi[1] {
                    for s0 in b.lo[0]..=b.hi[0] {
                        let stored = [s0, s1, s2];
                        let v = &mut data[b.flat_index(stored)];
                        f.modify_real(stored[order[0]], stored[order[1]], stored[order[2]], v);
                    }
                }
            }
        }
    }

    fn visit_complex<F: PostForward>(arr: &DistArray<Complex64>, order: [usize; 3], f: &mut F) {
        if let Some(b) = arr.local_box().copied() {
            let mut data = arr.local_mut().expect("spectral patch missing");
            for s2 in b.lo[2]..=b.hi[2] {
                for s1 in b.lo[1]..=b.hi[1] {
                    for s0 in b.lo[0]..=b.hi[0] {
                        let stored = [s0, s1, s2];
                        let v = &mut data[b.flat_index(stored)];
                        f.modify_complex(stored[order[0]], stored[order[1]], stored[order[2]], v);
                    }
                }
            }
        }
    }
}
