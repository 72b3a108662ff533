use std::sync::Arc;

use super::config::{FallbackPolicy, ScanConfig};
use super::context::WgContext;
use super::error::ScanError;

/// Where a scan runs.
#[derive(Clone, Debug)]
pub enum Executor {
    /// Calling thread only.
    Sequential,
    /// Rayon's global thread pool.
    Host,
    /// A wgpu compute device.
    Device(Arc<WgContext>),
}

/// Per-call execution environment: the executor plus its tuning.
#[derive(Clone, Debug)]
pub struct Control {
    pub executor: Executor,
    pub config: ScanConfig,
}

impl Default for Control {
    fn default() -> Self {
        Self::host()
    }
}

impl Control {
    pub fn new(executor: Executor, config: ScanConfig) -> Self {
        Self { executor, config }
    }

    pub fn sequential() -> Self {
        Self::new(Executor::Sequential, ScanConfig::default())
    }

    pub fn host() -> Self {
        Self::new(Executor::Host, ScanConfig::default())
    }

    pub fn device(context: Arc<WgContext>) -> Self {
        Self::new(Executor::Device(context), ScanConfig::default())
    }

    /// Opens a device if one is available, otherwise uses the host pool.
    pub fn automatic() -> Self {
        Self::automatic_from(WgContext::new_blocking())
    }

    /// Opens a device, applying the fallback policy of `config` when none is available.
    pub fn device_with(config: ScanConfig) -> Result<Self, ScanError> {
        Self::device_from(WgContext::new_blocking(), config)
    }

    fn automatic_from(context: Result<WgContext, ScanError>) -> Self {
        match context {
            Ok(context) => Self::device(Arc::new(context)),
            Err(err) => {
                log::info!("no device executor ({}), scanning on the host", err);
                Self::host()
            }
        }
    }

    fn device_from(
        context: Result<WgContext, ScanError>,
        config: ScanConfig,
    ) -> Result<Self, ScanError> {
        match context {
            Ok(context) => Ok(Self::new(Executor::Device(Arc::new(context)), config)),
            Err(err) => match config.fallback {
                FallbackPolicy::Fail => Err(err),
                FallbackPolicy::Sequential => {
                    log::warn!("{}; falling back to sequential scans", err);
                    Ok(Self::new(Executor::Sequential, config))
                }
            },
        }
    }

    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    pub fn is_parallel(&self) -> bool {
        !matches!(self.executor, Executor::Sequential)
    }

    pub(crate) fn parallel_block_size(&self) -> Option<usize> {
        match self.executor {
            Executor::Sequential => None,
            Executor::Host => Some(self.config.block_size),
            Executor::Device(_) => Some(self.config.device_block_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_adapter() -> Result<WgContext, ScanError> {
        Err(ScanError::ExecutorUnavailable("no compute adapter found".to_string()))
    }

    #[test_log::test]
    fn automatic_without_device_uses_host() {
        let ctl = Control::automatic_from(no_adapter());
        assert!(matches!(ctl.executor, Executor::Host));
        assert!(ctl.is_parallel());
        assert_eq!(ctl.parallel_block_size(), Some(ctl.config.block_size));
    }

    #[test_log::test]
    fn automatic_is_always_parallel() {
        assert!(Control::automatic().is_parallel());
    }

    #[test_log::test]
    fn device_without_adapter_fails_by_default() {
        let err = Control::device_from(no_adapter(), ScanConfig::default()).unwrap_err();
        assert!(matches!(err, ScanError::ExecutorUnavailable(_)));
    }

    #[test_log::test]
    fn device_without_adapter_can_fall_back() {
        let config = ScanConfig::default().with_fallback(FallbackPolicy::Sequential);
        let ctl = Control::device_from(no_adapter(), config.clone()).unwrap();
        assert!(matches!(ctl.executor, Executor::Sequential));
        assert!(!ctl.is_parallel());
        assert_eq!(ctl.parallel_block_size(), None);
        assert_eq!(ctl.config, config);
    }

    #[test]
    fn sequential_control_is_not_parallel() {
        assert!(!Control::sequential().is_parallel());
        assert!(Control::host().is_parallel());
    }
}
