//! End-to-end tests of the R2C engine on a single process.

use num_complex::Complex64;
use std::sync::Arc;

use pencilfft::{
    decompose, Arena, BoxArray, DistArray, IndexBox, Info, R2c, RankMap, SingleProcessComm,
};

const TOL: f64 = 1e-10;

fn make_real(domain: &IndexBox) -> DistArray<f64> {
    let ba = decompose(domain, 1, [true, false, false]).unwrap();
    let rm = RankMap::iota(ba.len());
    let mut a = DistArray::define(ba, rm);
    let arena = Arena::alloc(a.local_words(0).max(1), "test").unwrap();
    a.attach(0, &arena);
    a
}

fn make_complex(ba: BoxArray, rm: RankMap) -> DistArray<Complex64> {
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

#[test]
fn cosine_lands_in_one_bin_1d() {
    // 8x1x1, rhs[i] = cos(2*pi*i/8): the half-spectrum holds 4 at k=1 and
    // zero elsewhere (the conjugate partner at k=7 is implicit).
    let domain = IndexBox::from_lengths([8, 1, 1]);
    let mut engine = R2c::new(domain, Info::default(), Arc::new(SingleProcessComm)).unwrap();
    let input = make_real(&domain);
    fill(&input, |i, _, _| {
        (2.0 * std::f64::consts::PI * i as f64 / 8.0).cos()
    });

    engine.forward(&input).unwrap();
    {
        let (spec, perm) = engine.get_spectral_data();
        assert_eq!(perm, [0, 1, 2]);
        let d = spec.local().unwrap();
        assert_eq!(d.len(), 5);
        for (k, c) in d.iter().enumerate() {
            let expected = if k == 1 { 4.0 } else { 0.0 };
            assert!(
                (c.norm() - expected).abs() < TOL,
                "bin {k}: |C| = {}, expected {expected}",
                c.norm()
            );
        }
    }

    let output = make_real(&domain);
    engine.backward(&output).unwrap();
    let b = *output.local_box().unwrap();
    let d = output.local().unwrap();
    for i in 0..8i64 {
        let want = 8.0 * (2.0 * std::f64::consts::PI * i as f64 / 8.0).cos();
        assert!((d[b.flat_index([i, 0, 0])] - want).abs() < TOL);
    }
}

#[test]
fn half_spectrum_matches_naive_dft() {
    // Conjugate symmetry: the stored half equals the naive full DFT, whose
    // upper half is the conjugate mirror.
    let n = 8usize;
    let domain = IndexBox::from_lengths([n, 1, 1]);
    let mut engine = R2c::new(domain, Info::default(), Arc::new(SingleProcessComm)).unwrap();
    let input = make_real(&domain);
    fill(&input, |i, _, _| 0.3 + (i as f64 * 0.9).sin() - 0.2 * (i as f64).cos());

    let samples: Vec<f64> = {
        let d = input.local().unwrap();
        d.to_vec()
    };
    let naive: Vec<Complex64> = (0..n)
        .map(|k| {
            (0..n)
                .map(|m| {
                    let phase = -2.0 * std::f64::consts::PI * (k * m) as f64 / n as f64;
                    Complex64::new(samples[m] * phase.cos(), samples[m] * phase.sin())
                })
                .sum()
        })
        .collect();

    engine.forward(&input).unwrap();
    let (spec, _) = engine.get_spectral_data();
    let d = spec.local().unwrap();
    for k in 0..=n / 2 {
        assert!((d[k] - naive[k]).norm() < TOL, "bin {k} mismatch");
    }
    for k in 1..n / 2 {
        assert!((naive[n - k] - naive[k].conj()).norm() < TOL);
    }
}

#[test]
fn roundtrip_3d_scales_by_domain_size() {
    let domain = IndexBox::from_lengths([4, 4, 4]);
    let mut engine = R2c::new(domain, Info::default(), Arc::new(SingleProcessComm)).unwrap();
    let input = make_real(&domain);
    fill(&input, |i, j, k| {
        (i as f64 * 0.7).sin() + (j as f64 * 1.3).cos() + 0.1 * k as f64
    });

    let output = make_real(&domain);
    engine.forward(&input).unwrap();
    engine.backward(&output).unwrap();

    let b = *input.local_box().unwrap();
    let din = input.local().unwrap();
    let dout = output.local().unwrap();
    let n = domain.num_pts() as f64;
    for idx in 0..din.len() {
        assert!(
            (dout[idx] - n * din[idx]).abs() < TOL * n,
            "cell {idx} of {:?}",
            b
        );
    }
}

#[test]
fn forward_then_backward_identity_callback() {
    let domain = IndexBox::from_lengths([4, 8, 2]);
    let mut engine = R2c::new(domain, Info::default(), Arc::new(SingleProcessComm)).unwrap();
    let input = make_real(&domain);
    fill(&input, |i, j, k| ((3 * i + 5 * j + 7 * k) % 11) as f64 - 5.0);

    let output = make_real(&domain);
    let mut cells = 0usize;
    engine
        .forward_then_backward(&input, &output, |_i, _j, _k, _v| cells += 1)
        .unwrap();
    // One callback per spectral cell.
    assert_eq!(cells, (4 / 2 + 1) * 8 * 2);

    let din = input.local().unwrap();
    let dout = output.local().unwrap();
    let n = domain.num_pts() as f64;
    for idx in 0..din.len() {
        assert!((dout[idx] - n * din[idx]).abs() < TOL * n);
    }
}

#[test]
fn callback_indices_are_canonical() {
    // Modifying exactly the (1,0,0) mode of a cosine must zero the output.
    let domain = IndexBox::from_lengths([8, 4, 4]);
    let mut engine = R2c::new(domain, Info::default(), Arc::new(SingleProcessComm)).unwrap();
    let input = make_real(&domain);
    fill(&input, |i, _, _| {
        (2.0 * std::f64::consts::PI * i as f64 / 8.0).cos()
    });

    let output = make_real(&domain);
    engine
        .forward_then_backward(&input, &output, |i, j, k, v| {
            if i == 1 && j == 0 && k == 0 {
                *v = Complex64::default();
            }
        })
        .unwrap();
    let d = output.local().unwrap();
    for v in d.iter() {
        assert!(v.abs() < TOL, "mode survived: {v}");
    }
}

#[test]
fn linearity_of_forward() {
    let domain = IndexBox::from_lengths([4, 4, 4]);
    let comm: Arc<SingleProcessComm> = Arc::new(SingleProcessComm);
    let mut engine = R2c::new(domain, Info::default(), comm).unwrap();

    let x = make_real(&domain);
    let y = make_real(&domain);
    let z = make_real(&domain);
    fill(&x, |i, j, k| (i + 2 * j + 3 * k) as f64);
    fill(&y, |i, j, k| ((i * j) as f64).sin() + k as f64);
    let (alpha, beta) = (2.5, -1.25);
    {
        let dx = x.local().unwrap();
        let dy = y.local().unwrap();
        let mut dz = z.local_mut().unwrap();
        for idx in 0..dz.len() {
            dz[idx] = alpha * dx[idx] + beta * dy[idx];
        }
    }

    let (ba, rm) = engine.get_spectral_layout();
    let sx = make_complex(ba.clone(), rm.clone());
    let sy = make_complex(ba.clone(), rm.clone());
    let sz = make_complex(ba, rm);
    engine.forward_into(&x, &sx).unwrap();
    engine.forward_into(&y, &sy).unwrap();
    engine.forward_into(&z, &sz).unwrap();

    let dx = sx.local().unwrap();
    let dy = sy.local().unwrap();
    let dz = sz.local().unwrap();
    for idx in 0..dz.len() {
        let want = dx[idx] * alpha + dy[idx] * beta;
        assert!((dz[idx] - want).norm() < TOL * domain.num_pts() as f64);
    }
}

#[test]
fn spectral_layout_is_canonical() {
    let domain = IndexBox::from_lengths([8, 4, 4]);
    let engine = R2c::new(domain, Info::default(), Arc::new(SingleProcessComm)).unwrap();
    let (ba, rm) = engine.get_spectral_layout();
    assert_eq!(ba.len(), rm.ranks.len());
    // The union of the layout boxes is the canonical half-spectrum domain.
    let mut total = 0;
    for b in &ba.boxes {
        assert!(b.hi[0] <= 4 && b.hi[1] <= 3 && b.hi[2] <= 3);
        total += b.num_pts();
    }
    assert_eq!(total, 5 * 4 * 4);
}

#[test]
fn batch_mode_leaves_z_untouched() {
    // S6: 8x8x4 with batch_mode treats z as an independent batch axis.
    let domain = IndexBox::from_lengths([8, 8, 4]);
    let mut engine = R2c::new(
        domain,
        Info { batch_mode: true },
        Arc::new(SingleProcessComm),
    )
    .unwrap();
    assert!(engine.info().batch_mode);

    let input = make_real(&domain);
    // One 2-D cosine per z plane, with a plane-dependent amplitude.
    fill(&input, |i, _, k| {
        (k as f64 + 1.0) * (2.0 * std::f64::consts::PI * i as f64 / 8.0).cos()
    });

    engine.forward(&input).unwrap();
    {
        let (spec, perm) = engine.get_spectral_data();
        assert_eq!(perm, [1, 0, 2]);
        // Stored order is (y,x,z): plane k holds (k+1) * N0/2 at x-bin 1.
        let b = *spec.local_box().unwrap();
        let d = spec.local().unwrap();
        for k in 0..4i64 {
            let c = d[b.flat_index([0, 1, k])];
            let want = (k as f64 + 1.0) * 4.0 * 8.0; // x bin amplitude * N1
            assert!((c.re - want).abs() < TOL * 64.0, "plane {k}: {c}");
        }
    }

    let output = make_real(&domain);
    engine.backward(&output).unwrap();
    let din = input.local().unwrap();
    let dout = output.local().unwrap();
    // Round trip scales by N0*N1 only; no z transform happened.
    for idx in 0..din.len() {
        assert!((dout[idx] - 64.0 * din[idx]).abs() < TOL * 64.0);
    }
}

#[test]
fn construction_rejects_bad_domains() {
    let comm: Arc<SingleProcessComm> = Arc::new(SingleProcessComm);
    // N0 <= 1
    assert!(R2c::new(
        IndexBox::from_lengths([1, 4, 4]),
        Info::default(),
        comm.clone()
    )
    .is_err());
    // N1 == 1 while N2 > 1
    assert!(R2c::new(
        IndexBox::from_lengths([8, 1, 4]),
        Info::default(),
        comm.clone()
    )
    .is_err());
    // batch_mode needs a 3-D domain
    assert!(R2c::new(
        IndexBox::from_lengths([8, 8, 1]),
        Info { batch_mode: true },
        comm.clone()
    )
    .is_err());
    // nonzero origin
    assert!(R2c::new(
        IndexBox::new([1, 0, 0], [8, 3, 3]),
        Info::default(),
        comm
    )
    .is_err());
}
