//! Distributed real-to-complex transform engine for fully periodic domains.
//!
//! The forward transform runs one axis at a time: the x axis is transformed
//! locally (the decomposition keeps it undivided), then the array is
//! transposed so y becomes local, then z. The backward transform reverses
//! the sequence. All plans, layouts, and communication metadata are frozen
//! at construction; `forward`/`backward` are collective calls.
//!
//! Internal orderings after the transpositions: the y-phase array stores
//! (y,x,z), the z-phase array stores (z,x,y).

use std::rc::Rc;
use std::sync::Arc;

use num_complex::Complex64;
use tracing::debug_span;

use crate::comm::CommunicationBackend;
use crate::dist_array::{alias_pair, Arena, DistArray};
use crate::domain::{decompose, BoxArray, IndexBox, RankMap};
use crate::error::{FftError, Result};
use crate::plan::{AxisPlan, Direction};
use crate::redistribute::{copy_into, parallel_copy, CommMetadata, IndexTransform};

/// Optional engine configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Info {
    /// Treat the highest axis of a 3-D domain as an independent batch axis:
    /// no transform along z and no z-direction redistribution.
    pub batch_mode: bool,
}

/// Distributed R2C transform over a fully periodic domain.
pub struct R2c {
    comm: Arc<dyn CommunicationBackend>,
    info: Info,

    real_domain: IndexBox,
    spectral_domain_x: IndexBox,
    spectral_domain_y: IndexBox,
    spectral_domain_z: IndexBox,

    rx: DistArray<f64>,
    cx: DistArray<Complex64>,
    cy: DistArray<Complex64>,
    cz: DistArray<Complex64>,
    _arena_rx_cy: Rc<Arena>,
    _arena_cx_cz: Rc<Arena>,

    plan_x: AxisPlan,
    plan_y: AxisPlan,
    plan_z: AxisPlan,

    cmd_x2y: Option<CommMetadata>,
    cmd_y2x: Option<CommMetadata>,
    cmd_y2z: Option<CommMetadata>,
    cmd_z2y: Option<CommMetadata>,
}

impl R2c {
    pub fn new(
        domain: IndexBox,
        info: Info,
        comm: Arc<dyn CommunicationBackend>,
    ) -> Result<Self> {
        let _span = debug_span!("r2c_new").entered();

        let n0 = domain.length(0);
        let n1 = domain.length(1);
        let n2 = domain.length(2);
        if domain.lo != [0, 0, 0] {
            return Err(FftError::invalid_domain("R2C", "domain must start at 0"));
        }
        if n0 <= 1 {
            return Err(FftError::invalid_domain("R2C", format!("N0 = {n0} <= 1")));
        }
        if n1 <= 1 && n2 > 1 {
            return Err(FftError::invalid_domain(
                "R2C",
                format!("N1 = {n1} <= 1 while N2 = {n2} > 1"),
            ));
        }
        if info.batch_mode && n2 <= 1 {
            return Err(FftError::invalid_domain(
                "R2C",
                "batch_mode requires a 3-D domain",
            ));
        }

        let myrank = comm.rank();
        let nprocs = comm.num_ranks();

        let spectral_domain_x = IndexBox::new(
            [0, 0, 0],
            [(n0 / 2) as i64, n1 as i64 - 1, n2 as i64 - 1],
        );
        let spectral_domain_y = IndexBox::new(
            [0, 0, 0],
            [n1 as i64 - 1, (n0 / 2) as i64, n2 as i64 - 1],
        );
        let spectral_domain_z = IndexBox::new(
            [0, 0, 0],
            [n2 as i64 - 1, (n0 / 2) as i64, n1 as i64 - 1],
        );

        // Data containers. The x decomposition keeps axis 0 whole; the
        // half-spectrum boxes are the same boxes with the x extent clipped.
        let bax = decompose(&domain, nprocs, [true, false, false])?;
        let dmx = RankMap::iota(bax.len());
        let mut rx = DistArray::<f64>::define(bax.clone(), dmx.clone());

        let cbax = BoxArray::new(
            bax.boxes
                .iter()
                .map(|b| b.with_hi(0, spectral_domain_x.hi[0]))
                .collect(),
        );
        let mut cx = DistArray::<Complex64>::define(cbax, dmx.clone());

        let mut cy = DistArray::<Complex64>::empty();
        if n1 > 1 {
            let cbay = decompose(&spectral_domain_y, nprocs, [true, false, false])?;
            let cdmy = if cbay.len() == dmx.ranks.len() {
                dmx.clone()
            } else {
                RankMap::iota(cbay.len())
            };
            cy = DistArray::define(cbay, cdmy);
        }

        let mut cz = DistArray::<Complex64>::empty();
        if n1 > 1 && !info.batch_mode && n2 > 1 {
            let cbaz = decompose(&spectral_domain_z, nprocs, [true, false, false])?;
            let cdmz = if cbaz.len() == dmx.ranks.len() {
                dmx.clone()
            } else if cbaz.len() == cy.rank_map().ranks.len() {
                cy.rank_map().clone()
            } else {
                RankMap::iota(cbaz.len())
            };
            cz = DistArray::define(cbaz, cdmz);
        }

        // Aliased storage: rx/cy share one arena, cx/cz the other. During
        // forward rx is dead before cy is written and cx is dead before cz;
        // backward reverses the order.
        let arena_rx_cy = alias_pair(&mut rx, &mut cy, myrank, "R2C")?;
        let arena_cx_cz = alias_pair(&mut cx, &mut cz, myrank, "R2C")?;

        // Copiers, skipped for axes of length 1.
        let (mut cmd_x2y, mut cmd_y2x, mut cmd_y2z, mut cmd_z2y) = (None, None, None, None);
        if !cy.is_empty() {
            cmd_x2y = Some(CommMetadata::build(
                &cy,
                &spectral_domain_y,
                &cx,
                IndexTransform::Swap01,
            ));
            cmd_y2x = Some(CommMetadata::build(
                &cx,
                &spectral_domain_x,
                &cy,
                IndexTransform::Swap01,
            ));
        }
        if !cz.is_empty() {
            cmd_y2z = Some(CommMetadata::build(
                &cz,
                &spectral_domain_z,
                &cy,
                IndexTransform::Swap02,
            ));
            cmd_z2y = Some(CommMetadata::build(
                &cy,
                &spectral_domain_y,
                &cz,
                IndexTransform::Swap02,
            ));
        }

        // Plans, built only on ranks that own data.
        let plan_x = if rx.local_box().is_some() {
            AxisPlan::r2c(n0)?
        } else {
            AxisPlan::noop()
        };
        let plan_y = if cy.local_box().is_some() {
            AxisPlan::c2c(n1)
        } else {
            AxisPlan::noop()
        };
        let plan_z = if cz.local_box().is_some() {
            AxisPlan::c2c(n2)
        } else {
            AxisPlan::noop()
        };

        Ok(Self {
            comm,
            info,
            real_domain: domain,
            spectral_domain_x,
            spectral_domain_y,
            spectral_domain_z,
            rx,
            cx,
            cy,
            cz,
            _arena_rx_cy: arena_rx_cy,
            _arena_cx_cz: arena_cx_cz,
            plan_x,
            plan_y,
            plan_z,
            cmd_x2y,
            cmd_y2x,
            cmd_y2z,
            cmd_z2y,
        })
    }

    pub fn real_domain(&self) -> &IndexBox {
        &self.real_domain
    }

    pub fn info(&self) -> &Info {
        &self.info
    }

    pub fn spectral_domain(&self) -> &IndexBox {
        &self.spectral_domain_x
    }

    /// Forward transform into the engine's internal spectral storage.
    pub fn forward(&mut self, inmf: &DistArray<f64>) -> Result<()> {
        let _span = debug_span!("r2c_forward").entered();

        copy_into(&self.rx, inmf, self.comm.as_ref());
        if let (Some(mut r), Some(mut c)) = (self.rx.local_mut(), self.cx.local_mut()) {
            self.plan_x.compute_r2c(Direction::Forward, &mut r, &mut c)?;
        }

        if let Some(cmd) = &self.cmd_x2y {
            parallel_copy(&self.cy, &self.cx, cmd, IndexTransform::Swap01, self.comm.as_ref());
        }
        if let Some(mut c) = self.cy.local_mut() {
            self.plan_y.compute_c2c(Direction::Forward, &mut c);
        }

        if let Some(cmd) = &self.cmd_y2z {
            parallel_copy(&self.cz, &self.cy, cmd, IndexTransform::Swap02, self.comm.as_ref());
        }
        if let Some(mut c) = self.cz.local_mut() {
            self.plan_z.compute_c2c(Direction::Forward, &mut c);
        }
        Ok(())
    }

    /// Forward transform, storing the spectral data in the caller's array
    /// in canonical (x,y,z) order.
    pub fn forward_into(
        &mut self,
        inmf: &DistArray<f64>,
        outmf: &DistArray<Complex64>,
    ) -> Result<()> {
        self.forward(inmf)?;
        if !self.cz.is_empty() {
            // cz order (z,x,y) -> (x,y,z)
            let cmd = CommMetadata::build(
                outmf,
                &self.spectral_domain_x,
                &self.cz,
                IndexTransform::RotateBackward,
            );
            parallel_copy(outmf, &self.cz, &cmd, IndexTransform::RotateBackward, self.comm.as_ref());
        } else if !self.cy.is_empty() {
            // cy order (y,x,z) -> (x,y,z)
            let cmd = CommMetadata::build(
                outmf,
                &self.spectral_domain_x,
                &self.cy,
                IndexTransform::Swap01,
            );
            parallel_copy(outmf, &self.cy, &cmd, IndexTransform::Swap01, self.comm.as_ref());
        } else {
            copy_into(outmf, &self.cx, self.comm.as_ref());
        }
        Ok(())
    }

    /// Backward transform from the engine's internal spectral storage.
    pub fn backward(&mut self, outmf: &DistArray<f64>) -> Result<()> {
        self.backward_doit(outmf)
    }

    /// Backward transform from a caller-supplied spectral array in
    /// canonical (x,y,z) order.
    pub fn backward_from(
        &mut self,
        inmf: &DistArray<Complex64>,
        outmf: &DistArray<f64>,
    ) -> Result<()> {
        if !self.cz.is_empty() {
            // (x,y,z) -> cz order (z,x,y)
            let cmd = CommMetadata::build(
                &self.cz,
                &self.spectral_domain_z,
                inmf,
                IndexTransform::RotateForward,
            );
            parallel_copy(&self.cz, inmf, &cmd, IndexTransform::RotateForward, self.comm.as_ref());
        } else if !self.cy.is_empty() {
            // (x,y,z) -> cy order (y,x,z)
            let cmd = CommMetadata::build(
                &self.cy,
                &self.spectral_domain_y,
                inmf,
                IndexTransform::Swap01,
            );
            parallel_copy(&self.cy, inmf, &cmd, IndexTransform::Swap01, self.comm.as_ref());
        } else {
            copy_into(&self.cx, inmf, self.comm.as_ref());
        }
        self.backward_doit(outmf)
    }

    fn backward_doit(&mut self, outmf: &DistArray<f64>) -> Result<()> {
        let _span = debug_span!("r2c_backward").entered();

        if let Some(mut c) = self.cz.local_mut() {
            self.plan_z.compute_c2c(Direction::Backward, &mut c);
        }
        if let Some(cmd) = &self.cmd_z2y {
            parallel_copy(&self.cy, &self.cz, cmd, IndexTransform::Swap02, self.comm.as_ref());
        }

        if let Some(mut c) = self.cy.local_mut() {
            self.plan_y.compute_c2c(Direction::Backward, &mut c);
        }
        if let Some(cmd) = &self.cmd_y2x {
            parallel_copy(&self.cx, &self.cy, cmd, IndexTransform::Swap01, self.comm.as_ref());
        }

        if let (Some(mut r), Some(mut c)) = (self.rx.local_mut(), self.cx.local_mut()) {
            self.plan_x.compute_r2c(Direction::Backward, &mut r, &mut c)?;
        }
        copy_into(outmf, &self.rx, self.comm.as_ref());
        Ok(())
    }

    /// Forward transform, spectral modification, backward transform.
    ///
    /// `post_forward(i, j, k, &mut value)` runs exactly once per spectral
    /// cell with indices in canonical (x,y,z) order, operating on the
    /// current internal layout; no extra redistribution happens for the
    /// callback. In batch mode the callback fires once per
    /// (spectral-x, spectral-y, batch-z) tuple.
    pub fn forward_then_backward<F>(
        &mut self,
        inmf: &DistArray<f64>,
        outmf: &DistArray<f64>,
        post_forward: F,
    ) -> Result<()>
    where
        F: FnMut(i64, i64, i64, &mut Complex64),
    {
        let _span = debug_span!("r2c_forward_backward").entered();
        self.forward(inmf)?;
        self.post_forward_doit(post_forward);
        self.backward_doit(outmf)
    }

    fn post_forward_doit<F>(&mut self, mut f: F)
    where
        F: FnMut(i64, i64, i64, &mut Complex64),
    {
        // Pick the innermost spectral array and translate its stored axis
        // order back to canonical (x,y,z). Batch mode stops at the y phase
        // with z as the batch axis, so the y-phase mapping applies.
        let (arr, order) = if !self.cz.is_empty() {
            (&self.cz, [1usize, 2, 0]) // stored (z,x,y)
        } else if !self.cy.is_empty() {
            (&self.cy, [1usize, 0, 2]) // stored (y,x,z)
        } else {
            (&self.cx, [0usize, 1, 2])
        };
        if let Some(b) = arr.local_box().copied() {
            let mut data = arr.local_mut().expect("spectral patch missing");
            for s2 in b.lo[2]..=b.hi[2] {
                for s1 in b.lo[1]..=b.hi[1] {
                    for s0 in b.lo[0]..=b.hi[0] {
                        let stored = [s0, s1, s2];
                        let v = &mut data[b.flat_index(stored)];
                        f(stored[order[0]], stored[order[1]], stored[order[2]], v);
                    }
                }
            }
        }
    }

    /// The innermost spectral array together with the permutation mapping
    /// its stored axes to (x,y,z).
    pub fn get_spectral_data(&self) -> (&DistArray<Complex64>, [usize; 3]) {
        if !self.cz.is_empty() {
            (&self.cz, [2, 0, 1])
        } else if !self.cy.is_empty() {
            (&self.cy, [1, 0, 2])
        } else {
            (&self.cx, [0, 1, 2])
        }
    }

    /// Spectral layout in canonical (x,y,z) order, suitable for building a
    /// caller-side spectral array for `forward_into`/`backward_from`.
    pub fn get_spectral_layout(&self) -> (BoxArray, RankMap) {
        if !self.cz.is_empty() {
            let boxes = self
                .cz
                .boxes()
                .boxes
                .iter()
                .map(|b| IndexTransform::RotateBackward.apply_box(b))
                .collect();
            (BoxArray::new(boxes), self.cz.rank_map().clone())
        } else if !self.cy.is_empty() {
            let boxes = self
                .cy
                .boxes()
                .boxes
                .iter()
                .map(|b| IndexTransform::Swap01.apply_box(b))
                .collect();
            (BoxArray::new(boxes), self.cy.rank_map().clone())
        } else {
            (self.cx.boxes().clone(), self.cx.rank_map().clone())
        }
    }
}
