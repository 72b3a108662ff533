use super::context::WgContext;
use super::error::ScanError;
use super::operator::Element;
use futures::channel::oneshot;
use std::mem::size_of;
use wgpu::util::{BufferInitDescriptor, DeviceExt};
use wgpu::{Buffer, BufferDescriptor, BufferUsages, CommandEncoderDescriptor};

/// A typed storage buffer living on the device.
pub struct DeviceVec<T>
where
    T: Element,
{
    pub buffer: Buffer,
    len: usize,
    phantom: std::marker::PhantomData<T>,
}

impl<T> DeviceVec<T>
where
    T: Element,
{
    pub fn new(context: &WgContext, len: usize) -> Self {
        let buffer = context.device.create_buffer(&BufferDescriptor {
            label: Some("DeviceVec"),
            size: byte_len::<T>(len),
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        Self {
            buffer,
            len,
            phantom: std::marker::PhantomData,
        }
    }

    pub fn from_slice(context: &WgContext, slice: &[T]) -> Self {
        let buffer = context.device.create_buffer_init(&BufferInitDescriptor {
            label: Some("DeviceVec"),
            contents: bytemuck::cast_slice(slice),
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
        });

        Self {
            buffer,
            len: slice.len(),
            phantom: std::marker::PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn copy_from_slice(&self, context: &WgContext, slice: &[T]) -> Result<(), ScanError> {
        if slice.len() > self.len {
            return Err(ScanError::InvalidRange {
                input: slice.len(),
                output: self.len,
            });
        }
        if slice.is_empty() {
            return Ok(());
        }

        context
            .queue
            .write_buffer(&self.buffer, 0, bytemuck::cast_slice(slice));
        context.queue.submit(std::iter::empty());
        Ok(())
    }

    /// Reads the first `slice.len()` elements back into `slice`, blocking until the device is done.
    pub fn copy_to_slice(&self, context: &WgContext, slice: &mut [T]) -> Result<(), ScanError> {
        if slice.len() > self.len {
            return Err(ScanError::InvalidRange {
                input: self.len,
                output: slice.len(),
            });
        }
        if slice.is_empty() {
            return Ok(());
        }

        let mut encoder = context
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("DeviceVecReadback"),
            });

        let staging = context.device.create_buffer(&BufferDescriptor {
            label: Some("DeviceVecStaging"),
            size: byte_len::<T>(slice.len()),
            usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        encoder.copy_buffer_to_buffer(&self.buffer, 0, &staging, 0, byte_len::<T>(slice.len()));

        context.queue.submit(std::iter::once(encoder.finish()));

        let (sender, receiver) = oneshot::channel();
        let buffer_slice = staging.slice(..);
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        context.device.poll(wgpu::Maintain::Wait);

        match futures::executor::block_on(receiver) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(ScanError::DeviceExecution(err.to_string())),
            Err(_) => {
                return Err(ScanError::DeviceExecution(
                    "readback callback dropped".to_string(),
                ))
            }
        }

        {
            let mapped = buffer_slice.get_mapped_range();
            slice.copy_from_slice(bytemuck::cast_slice(&mapped));
        }
        staging.unmap();
        Ok(())
    }

    pub fn to_vec(&self, context: &WgContext) -> Result<Vec<T>, ScanError> {
        let mut out = vec![T::ZERO; self.len];
        self.copy_to_slice(context, &mut out)?;
        Ok(out)
    }
}

fn byte_len<T>(len: usize) -> u64 {
    size_of::<T>() as u64 * len as u64
}
