//! Element-wise tolerance checks.

use blocksparse_common::Tensor;

/// Largest absolute element difference between two same-shaped tensors.
pub fn max_abs_diff(a: &Tensor, b: &Tensor) -> f32 {
    assert_eq!(a.shape(), b.shape(), "shape mismatch");
    a.iter_logical().zip(b.iter_logical()).map(|(x, y)| (x - y).abs()).fold(0.0, f32::max)
}

/// Panics unless `|actual - expected| <= atol + rtol * |expected|` holds for
/// every element, comparing logical contents regardless of layout.
#[track_caller]
pub fn assert_allclose(actual: &Tensor, expected: &Tensor, rtol: f32, atol: f32) {
    assert_eq!(actual.shape(), expected.shape(), "shape mismatch");
    for (flat, (a, e)) in actual.iter_logical().zip(expected.iter_logical()).enumerate() {
        let bound = atol + rtol * e.abs();
        assert!(
            (a - e).abs() <= bound,
            "element {flat}: {a} vs {e} (|diff| {} > {bound})",
            (a - e).abs()
        );
    }
}
