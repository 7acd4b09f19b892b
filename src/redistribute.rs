//! Data redistribution between distributed arrays.
//!
//! For each axis of a multi-dimensional transform, the array is rearranged
//! so that axis becomes fully local (pencil transposition). The rearrangement
//! is described by an `IndexTransform` mapping destination indices to source
//! indices, compiled once into `CommMetadata`, and executed by
//! `parallel_copy` with pure point-to-point motion. No reductions.

use tracing::debug_span;

use crate::comm::CommunicationBackend;
use crate::dist_array::{DistArray, Element};
use crate::domain::{IndexBox, IntVect};

/// Index-space permutations used to rewrite indices during redistribution.
/// Values are copied verbatim; only indices change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTransform {
    Identity,
    /// (i,j,k) -> (j,i,k)
    Swap01,
    /// (i,j,k) -> (k,j,i)
    Swap02,
    /// (i,j,k) -> (k,i,j); takes (x,y,z) into (z,x,y)
    RotateForward,
    /// (i,j,k) -> (j,k,i); inverse of RotateForward
    RotateBackward,
}

impl IndexTransform {
    pub fn apply(self, v: IntVect) -> IntVect {
        match self {
            IndexTransform::Identity => v,
            IndexTransform::Swap01 => [v[1], v[0], v[2]],
            IndexTransform::Swap02 => [v[2], v[1], v[0]],
            IndexTransform::RotateForward => [v[2], v[0], v[1]],
            IndexTransform::RotateBackward => [v[1], v[2], v[0]],
        }
    }

    pub fn inverse(self) -> IndexTransform {
        match self {
            IndexTransform::RotateForward => IndexTransform::RotateBackward,
            IndexTransform::RotateBackward => IndexTransform::RotateForward,
            other => other,
        }
    }

    /// Image of a box. Permutations map boxes to boxes.
    pub fn apply_box(self, b: &IndexBox) -> IndexBox {
        IndexBox::new(self.apply(b.lo), self.apply(b.hi))
    }
}

/// One copy descriptor: move the cells of `dst_region` (destination index
/// space) from `src_rank` to `dst_rank`. The source region is the inverse
/// transform image of `dst_region`. Both sides walk `dst_region` in
/// row-major order, so payload layouts agree without further metadata.
#[derive(Debug, Clone)]
pub struct CopyDescriptor {
    pub src_rank: usize,
    pub src_box_id: usize,
    pub dst_rank: usize,
    pub dst_box_id: usize,
    pub dst_region: IndexBox,
}

/// Precomputed communication metadata for one redistribution.
///
/// For every destination cell inside the destination mask whose inverse
/// image lies in the source domain, exactly one descriptor covers it; no
/// destination cell is covered twice. Descriptor order is (dst box id,
/// src box id), which makes the execution schedule identical on all ranks.
#[derive(Debug, Default)]
pub struct CommMetadata {
    pub descriptors: Vec<CopyDescriptor>,
}

impl CommMetadata {
    /// Build metadata for `dst(i) = src(T⁻¹(i))`.
    ///
    /// `dst_mask` restricts which destination cells participate (the
    /// destination's spectral domain). Each destination box is pulled back
    /// through the inverse transform and intersected with every source box.
    pub fn build<A: Element, B: Element>(
        dst: &DistArray<A>,
        dst_mask: &IndexBox,
        src: &DistArray<B>,
        transform: IndexTransform,
    ) -> Self {
        let inv = transform.inverse();
        let mut descriptors = Vec::new();
        for (dst_id, dst_box) in dst.boxes().boxes.iter().enumerate() {
            let masked = dst_box.intersect(dst_mask);
            if masked.is_empty() {
                continue;
            }
            let pulled_back = inv.apply_box(&masked);
            for (src_id, src_box) in src.boxes().boxes.iter().enumerate() {
                let overlap = pulled_back.intersect(src_box);
                if overlap.is_empty() {
                    continue;
                }
                descriptors.push(CopyDescriptor {
                    src_rank: src.rank_map().rank_of(src_id),
                    src_box_id: src_id,
                    dst_rank: dst.rank_map().rank_of(dst_id),
                    dst_box_id: dst_id,
                    dst_region: transform.apply_box(&overlap),
                });
            }
        }
        CommMetadata { descriptors }
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Iterate `region` in row-major order (axis 0 fastest), yielding indices.
fn for_each_cell(region: &IndexBox, mut f: impl FnMut(IntVect)) {
    for k in region.lo[2]..=region.hi[2] {
        for j in region.lo[1]..=region.hi[1] {
            for i in region.lo[0]..=region.hi[0] {
                f([i, j, k]);
            }
        }
    }
}

/// Execute a redistribution: after return, `dst(i) = src(T⁻¹(i))` for every
/// destination cell covered by the metadata.
///
/// Collective across the communicator: every participating rank must call
/// with the same metadata. Synchronous on return. At most one send per
/// source cell and one receive per destination cell.
pub fn parallel_copy<A: Element, B: Element>(
    dst: &DistArray<A>,
    src: &DistArray<B>,
    meta: &CommMetadata,
    transform: IndexTransform,
    comm: &dyn CommunicationBackend,
) {
    let _span = debug_span!("parallel_copy", descriptors = meta.descriptors.len()).entered();
    debug_assert_eq!(A::UNITS, B::UNITS, "element types must have equal width");

    let myrank = comm.rank();
    let inv = transform.inverse();

    // Every rank walks the descriptors in the same order; each descriptor
    // involves exactly one matched send/recv (or a local copy), so blocking
    // point-to-point operations cannot deadlock.
    for d in &meta.descriptors {
        let i_send = d.src_rank == myrank;
        let i_recv = d.dst_rank == myrank;
        if !i_send && !i_recv {
            continue;
        }

        if i_send && i_recv {
            let src_box = *src.boxes().get(d.src_box_id);
            let dst_box = *dst.boxes().get(d.dst_box_id);
            let src_data = src.local().expect("source patch missing");
            let mut dst_data = dst.local_mut().expect("destination patch missing");
            let src_words: &[f64] = bytemuck::cast_slice(&src_data);
            let dst_words: &mut [f64] = bytemuck::cast_slice_mut(&mut dst_data);
            let n = A::UNITS;
            for_each_cell(&d.dst_region, |idx| {
                let s = src_box.flat_index(inv.apply(idx)) * n;
                let t = dst_box.flat_index(idx) * n;
                dst_words[t..t + n].copy_from_slice(&src_words[s..s + n]);
            });
        } else if i_send {
            let src_box = *src.boxes().get(d.src_box_id);
            let src_data = src.local().expect("source patch missing");
            let src_words: &[f64] = bytemuck::cast_slice(&src_data);
            let n = B::UNITS;
            let mut payload = Vec::with_capacity(d.dst_region.num_pts() * n);
            for_each_cell(&d.dst_region, |idx| {
                let s = src_box.flat_index(inv.apply(idx)) * n;
                payload.extend_from_slice(&src_words[s..s + n]);
            });
            comm.send_f64(d.dst_rank, &payload);
        } else {
            let dst_box = *dst.boxes().get(d.dst_box_id);
            let n = A::UNITS;
            let mut payload = vec![0.0f64; d.dst_region.num_pts() * n];
            comm.recv_f64(d.src_rank, &mut payload);
            let mut dst_data = dst.local_mut().expect("destination patch missing");
            let dst_words: &mut [f64] = bytemuck::cast_slice_mut(&mut dst_data);
            let mut off = 0;
            for_each_cell(&d.dst_region, |idx| {
                let t = dst_box.flat_index(idx) * n;
                dst_words[t..t + n].copy_from_slice(&payload[off..off + n]);
                off += n;
            });
        }
    }
}

/// Identity copy between arrays with identical element types, used for the
/// user-facing in/out copies at the ends of a transform.
pub fn copy_into<T: Element>(
    dst: &DistArray<T>,
    src: &DistArray<T>,
    comm: &dyn CommunicationBackend,
) {
    let mask = if dst.boxes().is_empty() {
        return;
    } else {
        // Union of destination boxes is the destination domain; any box
        // bound works as a mask because build() intersects per box.
        let mut m = *dst.boxes().get(0);
        for b in &dst.boxes().boxes {
            m = IndexBox::new(
                [
                    m.lo[0].min(b.lo[0]),
                    m.lo[1].min(b.lo[1]),
                    m.lo[2].min(b.lo[2]),
                ],
                [
                    m.hi[0].max(b.hi[0]),
                    m.hi[1].max(b.hi[1]),
                    m.hi[2].max(b.hi[2]),
                ],
            );
        }
        m
    };
    let meta = CommMetadata::build(dst, &mask, src, IndexTransform::Identity);
    parallel_copy(dst, src, &meta, IndexTransform::Identity, comm);
}
