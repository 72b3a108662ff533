//! Tuning knobs for the scan dispatcher.
//!
//! None of the defaults carry meaning beyond performance: any valid block
//! size or threshold produces the same result.

use super::error::ConfigError;

pub const DEFAULT_BLOCK_SIZE: usize = 1 << 10;
pub const DEFAULT_DEVICE_BLOCK_SIZE: usize = 256;
pub const DEFAULT_SEQUENTIAL_THRESHOLD: usize = 4096;

/// Largest workgroup the device kernels are generated for.
pub const MAX_DEVICE_BLOCK_SIZE: usize = 1024;

/// What to do when a call asks for the device but the device cannot run it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Report `ScanError::ExecutorUnavailable`.
    #[default]
    Fail,
    /// Log a warning and run the sequential path instead.
    Sequential,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanConfig {
    /// Elements per block on the host executor.
    pub block_size: usize,
    /// Workgroup size of the device kernels, which is also the device block size.
    pub device_block_size: usize,
    /// Inputs of at most this many elements are scanned sequentially.
    pub sequential_threshold: usize,
    pub fallback: FallbackPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            device_block_size: DEFAULT_DEVICE_BLOCK_SIZE,
            sequential_threshold: DEFAULT_SEQUENTIAL_THRESHOLD,
            fallback: FallbackPolicy::Fail,
        }
    }
}

impl ScanConfig {
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_device_block_size(mut self, device_block_size: usize) -> Self {
        self.device_block_size = device_block_size;
        self
    }

    pub fn with_sequential_threshold(mut self, threshold: usize) -> Self {
        self.sequential_threshold = threshold;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // A block of one never shrinks the aggregate sequence, so recursion would not end.
        if self.block_size < 2 {
            return Err(ConfigError::InvalidBlockSize(self.block_size));
        }
        if !(2..=MAX_DEVICE_BLOCK_SIZE).contains(&self.device_block_size) {
            return Err(ConfigError::InvalidDeviceBlockSize(
                self.device_block_size,
            ));
        }
        Ok(())
    }

    /// Reads overrides from `WGSCAN_*` environment variables on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("WGSCAN_BLOCK_SIZE") {
            config.block_size = parse_usize("WGSCAN_BLOCK_SIZE", &value)?;
        }
        if let Some(value) = lookup("WGSCAN_DEVICE_BLOCK_SIZE") {
            config.device_block_size = parse_usize("WGSCAN_DEVICE_BLOCK_SIZE", &value)?;
        }
        if let Some(value) = lookup("WGSCAN_SEQUENTIAL_THRESHOLD") {
            config.sequential_threshold = parse_usize("WGSCAN_SEQUENTIAL_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("WGSCAN_FALLBACK") {
            config.fallback = match value.trim().to_ascii_lowercase().as_str() {
                "fail" => FallbackPolicy::Fail,
                "sequential" => FallbackPolicy::Sequential,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "WGSCAN_FALLBACK",
                        value,
                    })
                }
            };
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_usize(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        assert!(ScanConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_tiny_block_size() {
        let config = ScanConfig::default().with_block_size(1);
        assert_eq!(config.validate(), Err(ConfigError::InvalidBlockSize(1)));
    }

    #[test]
    fn validate_rejects_oversized_device_block() {
        let config = ScanConfig::default().with_device_block_size(2048);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDeviceBlockSize(2048))
        ));
    }

    #[test]
    fn lookup_without_overrides_yields_defaults() {
        let config = ScanConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, ScanConfig::default());
    }

    #[test]
    fn lookup_applies_overrides() {
        let config = ScanConfig::from_lookup(lookup_from(&[
            ("WGSCAN_BLOCK_SIZE", "64"),
            ("WGSCAN_DEVICE_BLOCK_SIZE", " 128 "),
            ("WGSCAN_SEQUENTIAL_THRESHOLD", "0"),
            ("WGSCAN_FALLBACK", "Sequential"),
        ]))
        .unwrap();
        assert_eq!(config.block_size, 64);
        assert_eq!(config.device_block_size, 128);
        assert_eq!(config.sequential_threshold, 0);
        assert_eq!(config.fallback, FallbackPolicy::Sequential);
    }

    #[test]
    fn lookup_rejects_garbage() {
        let err = ScanConfig::from_lookup(lookup_from(&[("WGSCAN_BLOCK_SIZE", "lots")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "WGSCAN_BLOCK_SIZE",
                value: "lots".to_string()
            }
        );

        let err = ScanConfig::from_lookup(lookup_from(&[("WGSCAN_FALLBACK", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "WGSCAN_FALLBACK", .. }));
    }

    #[test]
    fn lookup_validates_result() {
        let err = ScanConfig::from_lookup(lookup_from(&[("WGSCAN_BLOCK_SIZE", "1")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidBlockSize(1));
    }
}
