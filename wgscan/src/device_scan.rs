use futures::executor::block_on;
use wgpu::util::DeviceExt;
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingResource, BindingType, Buffer, BufferBinding, BufferDescriptor,
    BufferUsages, CommandEncoder, CommandEncoderDescriptor, ComputePassDescriptor,
    ComputePipeline, ComputePipelineDescriptor, ErrorFilter, PipelineLayoutDescriptor,
    ShaderModuleDescriptor, ShaderSource, ShaderStages,
};

use super::config::ScanConfig;
use super::context::WgContext;
use super::device_vec::DeviceVec;
use super::error::ScanError;
use super::operator::{Element, Operator};
use super::scan::{ScanMode, Strategy};

// One module, three entry points:
//   block_scan      - Hillis-Steele scan of one workgroup-sized block in
//                     workgroup memory, writes the local result and the
//                     block aggregate.
//   propagate       - folds the block's exclusive prefix into its elements.
//   sequential_scan - a single invocation walking the whole buffer, used
//                     once a level is short enough.
// Blocks are laid out over a 2-D grid of workgroups, row by row, so the
// block count is not capped by the per-dimension dispatch limit. Grid
// cells past the last block see no valid slot.
// Out-of-range slots of a partial block sit to the right of every valid
// slot, so the scan never reads them into a valid result.
const SCAN_KERNEL: &str = r#"
{{ USER_CODE }}

fn combine(a: {{ T }}, b: {{ T }}) -> {{ T }} {
    {{ COMBINE }}
}

struct ScanParams {
    count: u32,
    inclusive: u32,
    seed: {{ T }},
    pad: u32,
};

@group(0) @binding(0) var<storage, read_write> data: array<{{ T }}>;
@group(0) @binding(1) var<storage, read_write> aggregates: array<{{ T }}>;
@group(0) @binding(2) var<uniform> params: ScanParams;

var<workgroup> scratch: array<{{ T }}, {{ BLOCK }}>;

@compute
@workgroup_size({{ BLOCK }})
fn block_scan(
    @builtin(local_invocation_id) local_id: vec3<u32>,
    @builtin(workgroup_id) group_id: vec3<u32>,
    @builtin(num_workgroups) num_groups: vec3<u32>,
) {
    let block_index = group_id.y * num_groups.x + group_id.x;
    let lid = local_id.x;
    let i = block_index * {{ BLOCK }}u + lid;
    if (i < params.count) {
        scratch[lid] = data[i];
    }
    workgroupBarrier();

    for (var dist = 1u; dist < {{ BLOCK }}u; dist = dist << 1u) {
        var value = scratch[lid];
        if (lid >= dist) {
            value = combine(scratch[lid - dist], value);
        }
        workgroupBarrier();
        scratch[lid] = value;
        workgroupBarrier();
    }

    if (i < params.count) {
        if (params.inclusive == 1u) {
            data[i] = scratch[lid];
        } else if (lid > 0u) {
            data[i] = scratch[lid - 1u];
        }
        let last = min(params.count - block_index * {{ BLOCK }}u, {{ BLOCK }}u) - 1u;
        if (lid == last) {
            aggregates[block_index] = scratch[lid];
        }
    }
}

@compute
@workgroup_size({{ BLOCK }})
fn propagate(
    @builtin(local_invocation_id) local_id: vec3<u32>,
    @builtin(workgroup_id) group_id: vec3<u32>,
    @builtin(num_workgroups) num_groups: vec3<u32>,
) {
    let block_index = group_id.y * num_groups.x + group_id.x;
    let i = block_index * {{ BLOCK }}u + local_id.x;
    if (i >= params.count) {
        return;
    }
    let prefix = aggregates[block_index];
    if (params.inclusive == 1u) {
        if (block_index > 0u) {
            data[i] = combine(prefix, data[i]);
        }
    } else if (local_id.x == 0u) {
        data[i] = prefix;
    } else {
        data[i] = combine(prefix, data[i]);
    }
}

@compute
@workgroup_size(1)
fn sequential_scan() {
    let count = params.count;
    if (count == 0u) {
        return;
    }
    if (params.inclusive == 1u) {
        var acc = data[0];
        for (var i = 1u; i < count; i = i + 1u) {
            acc = combine(acc, data[i]);
            data[i] = acc;
        }
    } else {
        var acc = params.seed;
        for (var i = 0u; i < count; i = i + 1u) {
            let value = data[i];
            data[i] = acc;
            acc = combine(acc, value);
        }
    }
}
"#;

/// Scan kernels compiled for one element type, operator and block size.
///
/// Compiling is the expensive part; keep a `DeviceScan` around to scan
/// many buffers with the same operator.
pub struct DeviceScan<'c, T: Element> {
    context: &'c WgContext,
    identity: T,
    block_size: usize,
    sequential_threshold: usize,
    max_groups_per_dimension: u32,
    aux_layout: BindGroupLayout,
    single_layout: BindGroupLayout,
    block_pipeline: ComputePipeline,
    propagate_pipeline: ComputePipeline,
    sequential_pipeline: ComputePipeline,
}

impl<'c, T: Element> DeviceScan<'c, T> {
    pub fn new(
        context: &'c WgContext,
        op: &Operator<T>,
        config: &ScanConfig,
    ) -> Result<Self, ScanError> {
        let wgsl_type = T::WGSL_TYPE.ok_or_else(|| {
            ScanError::ExecutorUnavailable(format!(
                "{} has no device representation",
                std::any::type_name::<T>()
            ))
        })?;

        let limits = context.limits();
        let block = config.device_block_size as u32;
        if block > limits.max_compute_workgroup_size_x
            || block > limits.max_compute_invocations_per_workgroup
            || block as u64 * std::mem::size_of::<T>() as u64
                > limits.max_compute_workgroup_storage_size as u64
        {
            return Err(ScanError::ExecutorUnavailable(format!(
                "device cannot run workgroups of {} invocations",
                block
            )));
        }

        // User code and the combine body may use `{{ T }}` themselves, so they go in first.
        let source = SCAN_KERNEL
            .replace("{{ USER_CODE }}", op.user_code())
            .replace("{{ COMBINE }}", &op.wgsl_combine()?)
            .replace("{{ T }}", wgsl_type)
            .replace("{{ BLOCK }}", &block.to_string());

        let device = &context.device;
        device.push_error_scope(ErrorFilter::Validation);

        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("ScanShader"),
            source: ShaderSource::Wgsl(source.into()),
        });

        let aux_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("ScanAuxBindGroupLayout"),
            entries: &[
                storage_entry(0),
                // aggregates on the way up, offsets on the way down
                storage_entry(1),
                uniform_entry(2),
            ],
        });

        let single_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("ScanSingleBindGroupLayout"),
            entries: &[storage_entry(0), uniform_entry(2)],
        });

        let aux_pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("ScanAuxPipelineLayout"),
            bind_group_layouts: &[&aux_layout],
            push_constant_ranges: &[],
        });

        let single_pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("ScanSinglePipelineLayout"),
            bind_group_layouts: &[&single_layout],
            push_constant_ranges: &[],
        });

        let block_pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("ScanBlockPipeline"),
            layout: Some(&aux_pipeline_layout),
            module: &shader,
            entry_point: "block_scan",
        });

        let propagate_pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("ScanPropagatePipeline"),
            layout: Some(&aux_pipeline_layout),
            module: &shader,
            entry_point: "propagate",
        });

        let sequential_pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("ScanSequentialPipeline"),
            layout: Some(&single_pipeline_layout),
            module: &shader,
            entry_point: "sequential_scan",
        });

        if let Some(err) = block_on(device.pop_error_scope()) {
            return Err(ScanError::OperatorGeneration(format!(
                "`{}` for {}: {}",
                op.name(),
                wgsl_type,
                err
            )));
        }

        log::debug!(
            "compiled `{}` scan kernels for {} with workgroups of {}",
            op.name(),
            wgsl_type,
            block
        );

        Ok(Self {
            context,
            identity: op.identity(),
            block_size: config.device_block_size,
            sequential_threshold: config.sequential_threshold,
            max_groups_per_dimension: limits.max_compute_workgroups_per_dimension,
            aux_layout,
            single_layout,
            block_pipeline,
            propagate_pipeline,
            sequential_pipeline,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Checks that a buffer of `len` elements fits the device's storage binding limit.
    pub fn check_len(&self, len: usize) -> Result<(), ScanError> {
        let limits = self.context.limits();
        let bytes = len as u64 * std::mem::size_of::<T>() as u64;
        if bytes > limits.max_storage_buffer_binding_size as u64 || len > u32::MAX as usize {
            return Err(ScanError::ExecutorUnavailable(format!(
                "{} elements exceed the device storage binding limit",
                len
            )));
        }
        Ok(())
    }

    pub fn inclusive<'a>(&self, vector: &'a DeviceVec<T>) -> Result<&'a DeviceVec<T>, ScanError> {
        self.run(vector, ScanMode::Inclusive)?;
        Ok(vector)
    }

    pub fn exclusive<'a>(
        &self,
        vector: &'a DeviceVec<T>,
        init: T,
    ) -> Result<&'a DeviceVec<T>, ScanError> {
        self.run(vector, ScanMode::Exclusive(init))?;
        Ok(vector)
    }

    /// Scans `vector` in place. All levels go into one command buffer.
    pub fn run(&self, vector: &DeviceVec<T>, mode: ScanMode<T>) -> Result<(), ScanError> {
        if vector.is_empty() {
            return Ok(());
        }
        self.check_len(vector.len())?;

        let device = &self.context.device;
        device.push_error_scope(ErrorFilter::Validation);

        let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("ScanCommandEncoder"),
        });
        let mut keep_alive = Vec::new();
        self.encode(&mut encoder, &vector.buffer, vector.len(), mode, &mut keep_alive);
        self.context.queue.submit(std::iter::once(encoder.finish()));

        if let Some(err) = block_on(device.pop_error_scope()) {
            return Err(ScanError::DeviceExecution(err.to_string()));
        }
        Ok(())
    }

    /// Uploads `input`, scans it and reads the result into `output`.
    pub fn scan_slice(
        &self,
        input: &[T],
        output: &mut [T],
        mode: ScanMode<T>,
    ) -> Result<(), ScanError> {
        if output.len() < input.len() {
            return Err(ScanError::InvalidRange {
                input: input.len(),
                output: output.len(),
            });
        }
        if input.is_empty() {
            return Ok(());
        }
        let vector = DeviceVec::from_slice(self.context, input);
        self.run(&vector, mode)?;
        vector.copy_to_slice(self.context, &mut output[..input.len()])
    }

    pub fn scan_in_place(&self, data: &mut [T], mode: ScanMode<T>) -> Result<(), ScanError> {
        if data.is_empty() {
            return Ok(());
        }
        let vector = DeviceVec::from_slice(self.context, data);
        self.run(&vector, mode)?;
        vector.copy_to_slice(self.context, data)
    }

    fn encode(
        &self,
        encoder: &mut CommandEncoder,
        data: &Buffer,
        len: usize,
        mode: ScanMode<T>,
        keep_alive: &mut Vec<Buffer>,
    ) {
        let seed = mode.seed_or(self.identity);
        let params = self.params_buffer(len, mode.is_inclusive(), seed);

        match Strategy::select(len, self.sequential_threshold, Some(self.block_size)) {
            Strategy::Sequential => {
                let bind_group = self.single_bind_group(data, &params);
                let mut cpass = encoder.begin_compute_pass(&ComputePassDescriptor {
                    label: Some("ScanSequentialPass"),
                });
                cpass.set_pipeline(&self.sequential_pipeline);
                cpass.set_bind_group(0, &bind_group, &[]);
                cpass.dispatch_workgroups(1, 1, 1);
            }
            Strategy::Parallel { block_size } => {
                let groups = len.div_ceil(block_size);
                let (grid_x, grid_y) = dispatch_grid(groups, self.max_groups_per_dimension);
                log::trace!(
                    "device level: {} elements, {} blocks on a {}x{} grid",
                    len,
                    groups,
                    grid_x,
                    grid_y
                );

                let aggregates = self.context.device.create_buffer(&BufferDescriptor {
                    label: Some("ScanAggregates"),
                    size: (groups * std::mem::size_of::<T>()) as u64,
                    usage: BufferUsages::STORAGE,
                    mapped_at_creation: false,
                });
                let bind_group = self.aux_bind_group(data, &aggregates, &params);

                {
                    let mut cpass = encoder.begin_compute_pass(&ComputePassDescriptor {
                        label: Some("ScanBlockPass"),
                    });
                    cpass.set_pipeline(&self.block_pipeline);
                    cpass.set_bind_group(0, &bind_group, &[]);
                    cpass.dispatch_workgroups(grid_x, grid_y, 1);
                }

                self.encode(
                    encoder,
                    &aggregates,
                    groups,
                    ScanMode::Exclusive(seed),
                    keep_alive,
                );

                {
                    let mut cpass = encoder.begin_compute_pass(&ComputePassDescriptor {
                        label: Some("ScanPropagatePass"),
                    });
                    cpass.set_pipeline(&self.propagate_pipeline);
                    cpass.set_bind_group(0, &bind_group, &[]);
                    cpass.dispatch_workgroups(grid_x, grid_y, 1);
                }

                keep_alive.push(aggregates);
            }
        }

        keep_alive.push(params);
    }

    fn params_buffer(&self, len: usize, inclusive: bool, seed: T) -> Buffer {
        let mut params = Vec::with_capacity(16);
        params.extend_from_slice(&(len as u32).to_le_bytes());
        params.extend_from_slice(&(inclusive as u32).to_le_bytes());
        params.extend_from_slice(bytemuck::bytes_of(&seed));
        params.resize(16, 0);

        self.context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("ScanParamsBuffer"),
                contents: &params,
                usage: BufferUsages::UNIFORM,
            })
    }

    fn aux_bind_group(&self, data: &Buffer, aggregates: &Buffer, params: &Buffer) -> BindGroup {
        self.context
            .device
            .create_bind_group(&BindGroupDescriptor {
                label: Some("ScanAuxBindGroup"),
                layout: &self.aux_layout,
                entries: &[
                    buffer_entry(0, data),
                    buffer_entry(1, aggregates),
                    buffer_entry(2, params),
                ],
            })
    }

    fn single_bind_group(&self, data: &Buffer, params: &Buffer) -> BindGroup {
        self.context
            .device
            .create_bind_group(&BindGroupDescriptor {
                label: Some("ScanSingleBindGroup"),
                layout: &self.single_layout,
                entries: &[buffer_entry(0, data), buffer_entry(2, params)],
            })
    }
}

/// Rows of at most `max_per_dimension` workgroups, enough rows to cover `groups`.
fn dispatch_grid(groups: usize, max_per_dimension: u32) -> (u32, u32) {
    let width = groups.clamp(1, max_per_dimension.max(1) as usize);
    (width as u32, groups.div_ceil(width) as u32)
}

fn storage_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(16),
        },
        count: None,
    }
}

fn buffer_entry(binding: u32, buffer: &Buffer) -> BindGroupEntry<'_> {
    BindGroupEntry {
        binding,
        resource: BindingResource::Buffer(BufferBinding {
            buffer,
            offset: 0,
            size: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Option<WgContext> {
        match WgContext::new_blocking() {
            Ok(context) => Some(context),
            Err(err) => {
                log::warn!("skipping device test: {}", err);
                None
            }
        }
    }

    #[test_log::test]
    fn kernel_template_has_no_leftover_placeholders() {
        let source = SCAN_KERNEL
            .replace("{{ USER_CODE }}", "")
            .replace("{{ COMBINE }}", "return a + b;")
            .replace("{{ T }}", "u32")
            .replace("{{ BLOCK }}", "64");
        assert!(!source.contains("{{"));
        assert!(source.contains("array<u32, 64>"));
    }

    #[test]
    fn dispatch_grid_wraps_into_rows() {
        assert_eq!(dispatch_grid(1, 65_535), (1, 1));
        assert_eq!(dispatch_grid(65_535, 65_535), (65_535, 1));
        assert_eq!(dispatch_grid(65_536, 65_535), (65_535, 2));
        assert_eq!(dispatch_grid(75_000, 65_535), (65_535, 2));
        assert_eq!(dispatch_grid(10, 4), (4, 3));
    }

    #[test_log::test]
    fn scans_device_vec_in_place() {
        let Some(context) = context() else { return };
        let config = ScanConfig::default()
            .with_device_block_size(4)
            .with_sequential_threshold(0);
        let scan = DeviceScan::new(&context, &Operator::Add, &config).unwrap();
        assert_eq!(scan.block_size(), 4);

        let input: Vec<u32> = (1..=10).collect();
        let vector = DeviceVec::new(&context, input.len());
        assert_eq!(vector.len(), 10);
        vector.copy_from_slice(&context, &input).unwrap();
        scan.inclusive(&vector).unwrap();
        assert_eq!(
            vector.to_vec(&context).unwrap(),
            vec![1, 3, 6, 10, 15, 21, 28, 36, 45, 55]
        );

        vector.copy_from_slice(&context, &input).unwrap();
        scan.exclusive(&vector, 0).unwrap();
        assert_eq!(
            vector.to_vec(&context).unwrap(),
            vec![0, 1, 3, 6, 10, 15, 21, 28, 36, 45]
        );
    }

    #[test_log::test]
    fn broken_wgsl_is_an_operator_generation_error() {
        let Some(context) = context() else { return };
        let op = Operator::Custom(
            crate::operator::CustomOp::new("broken", 0u32, |a, b| a + b)
                .with_wgsl("return a +* b;"),
        );
        let err = DeviceScan::new(&context, &op, &ScanConfig::default())
            .err()
            .expect("invalid WGSL must not compile");
        assert!(matches!(err, ScanError::OperatorGeneration(_)), "{err}");
    }

    #[test_log::test]
    fn host_only_type_is_rejected() {
        let Some(context) = context() else { return };
        let err = DeviceScan::<u64>::new(&context, &Operator::Add, &ScanConfig::default())
            .err()
            .expect("u64 has no WGSL type");
        assert!(matches!(err, ScanError::ExecutorUnavailable(_)));
    }
}
