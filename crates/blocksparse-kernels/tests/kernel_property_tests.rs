//! Property tests for `blocksparse-kernels`.
//!
//! 1. **Gemv vs loop reference** over random sizes, windows and repeated indices.
//! 2. **Parallel vs fallback**: gemv bitwise, outer within tolerance.
//! 3. **Outer vs loop reference** with heavy index collisions.
//! 4. **Dot decomposition**: `dot == gemv(gather(bias))` bit for bit.
//! 5. **Out-of-range rejection** leaves the accumulator untouched.

use blocksparse_common::{BackendPreference, IndexMatrix, KernelConfig};
use blocksparse_kernels::reference::{gemv_loop, outer_loop};
use blocksparse_kernels::{KernelManager, gather_bias};
use blocksparse_test_support::fixtures::indices_with_replacement;
use blocksparse_test_support::{GemvProblem, GemvSizes, OuterProblem, max_abs_diff, seeded_rng};
use proptest::prelude::*;

fn manager(backend: BackendPreference) -> KernelManager {
    KernelManager::with_config(KernelConfig {
        backend,
        parallel_threshold: 0,
        ..KernelConfig::default()
    })
}

fn sizes_strategy() -> impl Strategy<Value = GemvSizes> {
    (1usize..5, 1usize..5, 1usize..5, 1usize..5, 0usize..3, 0usize..3, 1usize..6).prop_map(
        |(input_window, output_window, input_size, output_size, extra_in, extra_out, batch)| {
            GemvSizes {
                n_input_blocks: input_window + extra_in,
                n_output_blocks: output_window + extra_out,
                input_size,
                output_size,
                input_window,
                output_window,
                batch,
            }
        },
    )
}

/// Gemv problem whose index matrices may repeat blocks within a row.
fn colliding_problem(sizes: &GemvSizes, seed: u64) -> GemvProblem {
    let mut rng = seeded_rng(seed);
    let mut p = GemvProblem::random(&mut rng, sizes);
    p.i_idx =
        indices_with_replacement(&mut rng, sizes.batch, sizes.input_window, sizes.n_input_blocks);
    p.o_idx =
        indices_with_replacement(&mut rng, sizes.batch, sizes.output_window, sizes.n_output_blocks);
    p
}

// ---------------------------------------------------------------------------
// Properties: gemv
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_gemv_matches_reference(sizes in sizes_strategy(), seed in any::<u64>()) {
        let p = colliding_problem(&sizes, seed);
        let expected = gemv_loop(&p.o, &p.w, &p.h, &p.i_idx, &p.o_idx).unwrap();
        let out = manager(BackendPreference::Sequential)
            .gemv(&p.o, &p.w, &p.h, &p.i_idx, &p.o_idx)
            .unwrap();

        let scale = expected.iter_logical().fold(1.0f32, |m, v| m.max(v.abs()));
        prop_assert!(max_abs_diff(&out, &expected) <= 1e-5 * scale * 16.0);
    }

    #[test]
    fn prop_parallel_gemv_is_bitwise_sequential(sizes in sizes_strategy(), seed in any::<u64>()) {
        let p = colliding_problem(&sizes, seed);
        let seq = manager(BackendPreference::Sequential)
            .gemv(&p.o, &p.w, &p.h, &p.i_idx, &p.o_idx)
            .unwrap();
        let par = manager(BackendPreference::Parallel)
            .gemv(&p.o, &p.w, &p.h, &p.i_idx, &p.o_idx)
            .unwrap();
        prop_assert_eq!(par, seq);
    }

    #[test]
    fn prop_dot_is_gather_then_gemv(sizes in sizes_strategy(), seed in any::<u64>()) {
        let p = colliding_problem(&sizes, seed);
        let m = manager(BackendPreference::Auto);
        let dot = m.dot(&p.w, &p.h, &p.i_idx, &p.bias, &p.o_idx).unwrap();
        let gathered = gather_bias(&p.bias, &p.o_idx).unwrap();
        let manual = m.gemv(&gathered, &p.w, &p.h, &p.i_idx, &p.o_idx).unwrap();
        prop_assert_eq!(dot.to_vec(), manual.to_vec());
    }
}

// ---------------------------------------------------------------------------
// Properties: outer
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_outer_matches_reference(sizes in sizes_strategy(), seed in any::<u64>()) {
        let p = OuterProblem::random(&mut seeded_rng(seed), &sizes);
        let expected = outer_loop(&p.acc, &p.x, &p.y, &p.x_idx, &p.y_idx).unwrap();
        let scale = expected.iter_logical().fold(1.0f32, |m, v| m.max(v.abs()));

        for backend in [BackendPreference::Sequential, BackendPreference::Parallel] {
            let out = manager(backend).outer(&p.acc, &p.x, &p.y, &p.x_idx, &p.y_idx).unwrap();
            prop_assert!(
                max_abs_diff(&out, &expected) <= 1e-5 * scale * 16.0,
                "{:?} drifted from the reference", backend
            );
        }
    }

    #[test]
    fn prop_all_rows_into_one_block(
        batch in 1usize..12,
        window in 1usize..4,
        seed in any::<u64>(),
    ) {
        let sizes = GemvSizes {
            n_input_blocks: 2,
            n_output_blocks: 2,
            input_size: 2,
            output_size: 3,
            input_window: window,
            output_window: window,
            batch,
        };
        let mut p = OuterProblem::random(&mut seeded_rng(seed), &sizes);
        p.x_idx = IndexMatrix::from_vec(vec![1; batch * window], batch, window).unwrap();
        p.y_idx = IndexMatrix::from_vec(vec![0; batch * window], batch, window).unwrap();

        let out = manager(BackendPreference::Parallel)
            .outer(&p.acc, &p.x, &p.y, &p.x_idx, &p.y_idx)
            .unwrap();

        // Every block other than (1, 0) keeps its initial value exactly.
        for xb in 0..2 {
            for yb in 0..2 {
                if (xb, yb) == (1, 0) {
                    continue;
                }
                for k in 0..2 {
                    for l in 0..3 {
                        prop_assert_eq!(out.get(&[xb, yb, k, l]), p.acc.get(&[xb, yb, k, l]));
                    }
                }
            }
        }
        // The hit block carries the full sum over rows and window pairs.
        let expected = outer_loop(&p.acc, &p.x, &p.y, &p.x_idx, &p.y_idx).unwrap();
        for k in 0..2 {
            for l in 0..3 {
                let (a, e) = (out.get(&[1, 0, k, l]), expected.get(&[1, 0, k, l]));
                prop_assert!((a - e).abs() <= 1e-4 * e.abs().max(1.0) * batch as f32);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Properties: rejection
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_out_of_range_index_is_rejected_without_side_effects(
        sizes in sizes_strategy(),
        seed in any::<u64>(),
        overshoot in 0i32..4,
        negative in any::<bool>(),
    ) {
        let p = colliding_problem(&sizes, seed);
        let mut data = p.i_idx.as_slice().to_vec();
        let last = data.len() - 1;
        data[last] = if negative {
            -1 - overshoot
        } else {
            sizes.n_input_blocks as i32 + overshoot
        };
        let bad = IndexMatrix::from_vec(data, sizes.batch, sizes.input_window).unwrap();

        for backend in [BackendPreference::Sequential, BackendPreference::Parallel] {
            let mut o = p.o.clone();
            prop_assert!(manager(backend).gemv_inplace(&mut o, &p.w, &p.h, &bad, &p.o_idx).is_err());
            prop_assert_eq!(&o, &p.o);
        }
    }
}
