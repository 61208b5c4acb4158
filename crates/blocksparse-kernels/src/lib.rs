//! Block-sparse gemv and outer-product kernels
//!
//! # Operations
//!
//! - [`sparse_block_gemv`]: `O[b,j,:] += Σ_i H[b,i,:] · W[iIdx[b,i], oIdx[b,j]]`
//! - [`sparse_block_outer`]: `Acc[xIdx[b,i], yIdx[b,j]] += outer(X[b,i,:], Y[b,j,:])`
//! - [`sparse_block_dot`]: gathers bias rows by `oIdx`, then runs gemv
//! - [`sparse_block_gemv_grad`] / [`sparse_block_dot_grad`]: adjoint kernels
//!
//! Every entry point validates shapes and index bounds before touching an
//! accumulator. Duplicate block indices are summed.
//!
//! The free functions dispatch through a process-wide [`KernelManager`]
//! configured from the environment; construct a manager explicitly to pick a
//! provider or thread count per call site.

use blocksparse_common::{
    BackendPreference, GemvDims, IndexMatrix, KernelConfig, KernelError, OuterDims, Result, Tensor,
};
use std::sync::OnceLock;

pub mod backward;
pub mod cpu;
pub mod ops;
pub mod reference;
pub mod scatter_gather;

pub use backward::{DotGrads, GemvGrads, sparse_block_dot_grad, sparse_block_gemv_grad};
pub use cpu::{FallbackKernel, ParallelKernel};
pub use ops::{
    sparse_block_dot, sparse_block_gemv, sparse_block_gemv_inplace, sparse_block_outer,
    sparse_block_outer_inplace,
};
pub use scatter_gather::{gather_bias, scatter_add_rows};

/// Kernel provider trait
///
/// Providers receive inputs that already passed entry-point validation and
/// only accumulate; they never reset their destination.
pub trait BlockSparseProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn is_available(&self) -> bool;

    /// `O[b,j,:] += Σ_i H[b,i,:] · W[iIdx[b,i], oIdx[b,j]]`
    fn gemv(
        &self,
        o: &mut Tensor,
        w: &Tensor,
        h: &Tensor,
        i_idx: &IndexMatrix,
        o_idx: &IndexMatrix,
        dims: &GemvDims,
    ) -> Result<()>;

    /// `Acc[xIdx[b,i], yIdx[b,j], :, :] += outer(X[b,i,:], Y[b,j,:])`
    fn outer(
        &self,
        acc: &mut Tensor,
        x: &Tensor,
        y: &Tensor,
        x_idx: &IndexMatrix,
        y_idx: &IndexMatrix,
        dims: &OuterDims,
    ) -> Result<()>;

    /// `gradH[b,i,:] += Σ_j gradO[b,j,:] · W[iIdx[b,i], oIdx[b,j]]^T`
    fn gemv_input_grad(
        &self,
        grad_h: &mut Tensor,
        grad_o: &Tensor,
        w: &Tensor,
        i_idx: &IndexMatrix,
        o_idx: &IndexMatrix,
        dims: &GemvDims,
    ) -> Result<()>;
}

/// Kernel manager for selecting a provider with cached selection
pub struct KernelManager {
    providers: Vec<Box<dyn BlockSparseProvider>>,
    config: KernelConfig,
    selected: OnceLock<usize>,
}

impl KernelManager {
    /// Manager configured from `BLOCKSPARSE_*` environment variables.
    pub fn new() -> Self {
        Self::with_config(KernelConfig::from_env())
    }

    pub fn with_config(config: KernelConfig) -> Self {
        // Ordered by preference; the fallback kernel stays last.
        let providers: Vec<Box<dyn BlockSparseProvider>> =
            vec![Box::new(ParallelKernel::from_config(&config)), Box::new(FallbackKernel)];
        Self { providers, config, selected: OnceLock::new() }
    }

    /// Process-wide manager used by the free functions.
    pub fn global() -> &'static KernelManager {
        static GLOBAL: OnceLock<KernelManager> = OnceLock::new();
        GLOBAL.get_or_init(KernelManager::new)
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    fn wanted(&self) -> Option<&'static str> {
        match self.config.backend {
            BackendPreference::Auto => None,
            BackendPreference::Sequential => Some("fallback"),
            BackendPreference::Parallel => Some("parallel"),
        }
    }

    /// Select the provider honouring the configured backend, with caching
    pub fn select_best(&self) -> Result<&dyn BlockSparseProvider> {
        let selected_idx = self.selected.get_or_init(|| {
            let wanted = self.wanted();
            if let Some(name) = wanted {
                if let Some(i) =
                    self.providers.iter().position(|p| p.name() == name && p.is_available())
                {
                    log::info!("Selected block-sparse provider: {name} (requested)");
                    return i;
                }
                log::warn!("Requested block-sparse provider {name} unavailable, auto-selecting");
            }
            for (i, provider) in self.providers.iter().enumerate() {
                if provider.is_available() {
                    log::info!("Selected block-sparse provider: {}", provider.name());
                    return i;
                }
            }
            log::error!("No available block-sparse provider found");
            self.providers.len()
        });

        self.providers
            .get(*selected_idx)
            .map(|p| p.as_ref())
            .ok_or_else(|| KernelError::NoProvider.into())
    }

    /// Name of the currently selected provider, if selection already ran
    pub fn selected_provider_name(&self) -> Option<&'static str> {
        self.selected.get().and_then(|&idx| self.providers.get(idx)).map(|p| p.name())
    }

    /// List all available providers
    pub fn list_available_providers(&self) -> Vec<&'static str> {
        self.providers.iter().filter(|p| p.is_available()).map(|p| p.name()).collect()
    }

    /// Force reselection of the provider (for testing)
    #[cfg(test)]
    pub fn reset_selection(&mut self) {
        self.selected = OnceLock::new();
    }
}

impl Default for KernelManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(backend: BackendPreference) -> KernelManager {
        KernelManager::with_config(KernelConfig { backend, ..KernelConfig::default() })
    }

    #[test]
    fn test_auto_prefers_parallel() {
        let m = manager(BackendPreference::Auto);
        assert_eq!(m.selected_provider_name(), None);
        assert_eq!(m.select_best().unwrap().name(), "parallel");
        assert_eq!(m.selected_provider_name(), Some("parallel"));
    }

    #[test]
    fn test_sequential_request() {
        let m = manager(BackendPreference::Sequential);
        assert_eq!(m.select_best().unwrap().name(), "fallback");
    }

    #[test]
    fn test_selection_is_cached_until_reset() {
        let mut m = manager(BackendPreference::Parallel);
        assert_eq!(m.select_best().unwrap().name(), "parallel");
        m.config.backend = BackendPreference::Sequential;
        assert_eq!(m.select_best().unwrap().name(), "parallel");
        m.reset_selection();
        assert_eq!(m.select_best().unwrap().name(), "fallback");
    }

    #[test]
    fn test_list_available_providers() {
        let m = manager(BackendPreference::Auto);
        assert_eq!(m.list_available_providers(), vec!["parallel", "fallback"]);
    }
}
