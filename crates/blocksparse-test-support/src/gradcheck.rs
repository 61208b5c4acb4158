//! Finite-difference gradient verification.
//!
//! A tensor-valued function `f` is reduced to the scalar
//! `L = Σ projection ⊙ f(inputs)`. The analytic gradient of `L` with respect
//! to any input equals the adjoint evaluated at `gradO = projection`, and is
//! compared against central differences of `L`.

use blocksparse_common::Tensor;

use crate::tolerance::assert_allclose;

/// Step and tolerances for [`numeric_grad`] comparisons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradCheck {
    pub eps: f32,
    pub rtol: f32,
    pub atol: f32,
}

impl Default for GradCheck {
    fn default() -> Self {
        Self { eps: 2e-3, rtol: 1e-2, atol: 1e-2 }
    }
}

impl GradCheck {
    /// Assert that `analytic` matches the central-difference gradient of
    /// `Σ projection ⊙ f(inputs)` with respect to `inputs[wrt]`.
    #[track_caller]
    pub fn verify(
        &self,
        inputs: &[Tensor],
        wrt: usize,
        projection: &Tensor,
        analytic: &Tensor,
        f: impl FnMut(&[Tensor]) -> Tensor,
    ) {
        let numeric = numeric_grad(inputs, wrt, projection, self.eps, f);
        assert_allclose(analytic, &numeric, self.rtol, self.atol);
    }
}

fn projected(projection: &Tensor, out: &Tensor) -> f64 {
    assert_eq!(projection.shape(), out.shape(), "projection must match the output shape");
    projection.iter_logical().zip(out.iter_logical()).map(|(p, o)| f64::from(p) * f64::from(o)).sum()
}

fn logical_index(mut flat: usize, shape: &[usize], index: &mut [usize]) {
    for axis in (0..shape.len()).rev() {
        index[axis] = flat % shape[axis];
        flat /= shape[axis];
    }
}

/// Central-difference gradient of `Σ projection ⊙ f(inputs)` with respect to
/// `inputs[wrt]`, in that input's logical shape.
pub fn numeric_grad(
    inputs: &[Tensor],
    wrt: usize,
    projection: &Tensor,
    eps: f32,
    mut f: impl FnMut(&[Tensor]) -> Tensor,
) -> Tensor {
    let mut work = inputs.to_vec();
    let shape = inputs[wrt].shape().to_vec();
    let numel = inputs[wrt].numel();
    let mut index = vec![0; shape.len()];
    let mut grad = Vec::with_capacity(numel);

    for flat in 0..numel {
        logical_index(flat, &shape, &mut index);

        work[wrt].add_at(&index, eps);
        let plus = projected(projection, &f(&work));
        work[wrt].add_at(&index, -2.0 * eps);
        let minus = projected(projection, &f(&work));
        work[wrt].clone_from(&inputs[wrt]);

        grad.push(((plus - minus) / (2.0 * f64::from(eps))) as f32);
    }
    Tensor::from_vec(grad, &shape).expect("one gradient per element")
}
