//! End-to-end tests of the R2X engine with mixed boundary conditions.

use std::sync::Arc;

use pencilfft::{
    decompose, Arena, Boundary, BoundaryPair, DistArray, IdentityCallback, IndexBox, R2x, RankMap,
    SingleProcessComm,
};

const TOL: f64 = 1e-10;

const PP: BoundaryPair = (Boundary::Periodic, Boundary::Periodic);
const EE: BoundaryPair = (Boundary::Even, Boundary::Even);
const OO: BoundaryPair = (Boundary::Odd, Boundary::Odd);
const EO: BoundaryPair = (Boundary::Even, Boundary::Odd);
const OE: BoundaryPair = (Boundary::Odd, Boundary::Even);

fn make_real(domain: &IndexBox) -> DistArray<f64> {
    let ba = decompose(domain, 1, [true, false, false]).unwrap();
    let rm = RankMap::iota(ba.len());
    let mut a = DistArray::define(ba, rm);
    let arena = Arena::alloc(a.local_words(0).max(1), "test").unwrap();
    a.attach(0, &arena);
    a
}

fn fill(arr: &DistArray<f64>, f: impl Fn(i64, i64, i64) -> f64) {
    let b = *arr.local_box().unwrap();
    let mut d = arr.local_mut().unwrap();
    for k in b.lo[2]..=b.hi[2] {
        for j in b.lo[1]..=b.hi[1] {
            for i in b.lo[0]..=b.hi[0] {
                d[b.flat_index([i, j, k])] = f(i, j, k);
            }
        }
    }
}

/// Round trip with the identity callback; the scaled output must equal the
/// input (invariant 2).
fn check_roundtrip(n: [usize; 3], bc: [BoundaryPair; 3]) {
    let domain = IndexBox::from_lengths(n);
    let mut engine = R2x::new(domain, bc, Arc::new(SingleProcessComm)).unwrap();
    let input = make_real(&domain);
    fill(&input, |i, j, k| {
        ((7 * i + 3 * j + 11 * k) % 13) as f64 - 6.0 + 0.5 * (i as f64 * 0.37).sin()
    });

    let output = make_real(&domain);
    engine
        .forward_then_backward(&input, &output, &mut IdentityCallback)
        .unwrap();

    let scale = engine.scaling_factor();
    let din = input.local().unwrap();
    let dout = output.local().unwrap();
    for idx in 0..din.len() {
        let got = dout[idx] * scale;
        assert!(
            (got - din[idx]).abs() < TOL / scale.min(1.0),
            "bc {bc:?} n {n:?} cell {idx}: got {got}, want {}",
            din[idx]
        );
    }
}

#[test]
fn roundtrip_dct_x_periodic_y() {
    // S3: 8x8, even-even along x, periodic along y.
    check_roundtrip([8, 8, 1], [EE, PP, PP]);
}

#[test]
fn roundtrip_all_periodic_3d() {
    check_roundtrip([4, 4, 4], [PP, PP, PP]);
}

#[test]
fn roundtrip_all_nonperiodic_3d() {
    check_roundtrip([4, 4, 4], [EE, OO, EE]);
}

#[test]
fn roundtrip_periodic_x_dct_y() {
    // Complex pipeline reaching a real-to-real axis: DCT on re/im parts.
    check_roundtrip([8, 8, 1], [PP, EE, PP]);
}

#[test]
fn roundtrip_real_pipeline_periodic_z() {
    // x,y real, z periodic: the r2c happens in the z phase.
    check_roundtrip([4, 4, 4], [OO, OE, PP]);
}

#[test]
fn roundtrip_mixed_type4_kernels() {
    check_roundtrip([8, 4, 1], [EO, OE, PP]);
}

#[test]
fn roundtrip_1d_dct() {
    check_roundtrip([8, 1, 1], [EE, PP, PP]);
}

#[test]
fn roundtrip_periodic_xy_dst_z() {
    check_roundtrip([4, 4, 8], [PP, PP, OO]);
}

#[test]
fn scaling_factor_formula() {
    // Invariant 5: 1/(prod Nd * 2^(non-periodic axes with Nd > 1)).
    let comm: Arc<SingleProcessComm> = Arc::new(SingleProcessComm);
    let engine = R2x::new(
        IndexBox::from_lengths([8, 8, 1]),
        [EE, PP, PP],
        comm.clone(),
    )
    .unwrap();
    assert!((engine.scaling_factor() - 1.0 / 128.0).abs() < 1e-15);

    let engine = R2x::new(IndexBox::from_lengths([4, 4, 4]), [EE, OO, EE], comm.clone()).unwrap();
    assert!((engine.scaling_factor() - 1.0 / 512.0).abs() < 1e-15);

    let engine = R2x::new(IndexBox::from_lengths([4, 4, 4]), [PP, PP, PP], comm).unwrap();
    assert!((engine.scaling_factor() - 1.0 / 64.0).abs() < 1e-15);
}

#[test]
fn callback_sees_reduced_index_space() {
    // 2-D problem: the callback runs over (N1, N0/2+1) cells when x is
    // periodic, never over a third axis.
    struct Counter {
        cells: usize,
        max_k: i64,
    }
    impl pencilfft::PostForward for Counter {
        fn modify_real(&mut self, _i: i64, _j: i64, k: i64, _v: &mut f64) {
            self.cells += 1;
            self.max_k = self.max_k.max(k);
        }
        fn modify_complex(&mut self, _i: i64, _j: i64, k: i64, _v: &mut num_complex::Complex64) {
            self.cells += 1;
            self.max_k = self.max_k.max(k);
        }
    }

    let domain = IndexBox::from_lengths([8, 4, 1]);
    let mut engine = R2x::new(domain, [PP, PP, PP], Arc::new(SingleProcessComm)).unwrap();
    let input = make_real(&domain);
    fill(&input, |i, j, _| (i + j) as f64);
    let output = make_real(&domain);

    let mut counter = Counter { cells: 0, max_k: 0 };
    engine
        .forward_then_backward(&input, &output, &mut counter)
        .unwrap();
    assert_eq!(counter.cells, (8 / 2 + 1) * 4);
    assert_eq!(counter.max_k, 0);
}

#[test]
fn rejects_mixed_periodic_endpoint() {
    let comm: Arc<SingleProcessComm> = Arc::new(SingleProcessComm);
    let bad = (Boundary::Periodic, Boundary::Even);
    let err = R2x::new(IndexBox::from_lengths([8, 8, 1]), [bad, PP, PP], comm).unwrap_err();
    assert!(matches!(err, pencilfft::FftError::InvalidBoundary { axis: 0 }));
}

#[test]
fn rejects_degenerate_domains() {
    let comm: Arc<SingleProcessComm> = Arc::new(SingleProcessComm);
    assert!(R2x::new(IndexBox::from_lengths([1, 8, 1]), [PP, PP, PP], comm.clone()).is_err());
    assert!(R2x::new(IndexBox::from_lengths([8, 1, 4]), [PP, PP, PP], comm).is_err());
}
