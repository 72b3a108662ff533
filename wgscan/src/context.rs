use wgpu::{
    AdapterInfo, Backends, DeviceDescriptor, Features, Instance, InstanceDescriptor, Limits,
    PowerPreference, RequestAdapterOptions,
};

use super::error::ScanError;

/// Device and queue shared by every device-side scan.
pub struct WgContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    adapter_info: AdapterInfo,
}

impl std::fmt::Debug for WgContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgContext")
            .field("adapter", &self.adapter_info.name)
            .field("backend", &self.adapter_info.backend)
            .finish_non_exhaustive()
    }
}

impl WgContext {
    pub async fn new() -> Result<Self, ScanError> {
        let instance = Instance::new(InstanceDescriptor {
            backends: Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| ScanError::ExecutorUnavailable("no compute adapter found".to_string()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "using adapter {:?} ({:?}, {:?})",
            adapter_info.name,
            adapter_info.backend,
            adapter_info.device_type
        );

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("wgscan-device"),
                    features: Features::empty(),
                    limits: adapter.limits(),
                },
                None,
            )
            .await
            .map_err(|err| ScanError::ExecutorUnavailable(err.to_string()))?;

        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }

    pub fn new_blocking() -> Result<Self, ScanError> {
        futures::executor::block_on(Self::new())
    }

    pub fn adapter_info(&self) -> &AdapterInfo {
        &self.adapter_info
    }

    pub fn limits(&self) -> Limits {
        self.device.limits()
    }
}
