//! 基于 `wgpu` 计算着色器的逐切片计算核.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytemuck::{cast_slice, Pod, Zeroable};
use log::{error, warn};
use pollster::block_on;
use wgpu::util::DeviceExt;

use super::kernel::{GpuProvider, SliceKernel, SliceReadback};
use crate::error::{GpuError, GpuResult};
use crate::Idx2d;

const SLICE_WGSL: &str = include_str!("slice.wgsl");

/// 与着色器中 `@workgroup_size` 一致.
const WORKGROUP: usize = 64;

/// 单维 dispatch 的工作组上限.
const MAX_WORKGROUPS: usize = 65_535;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SliceParams {
    len: u32,
    threshold: f32,
    _pad: [u32; 2],
}

/// 通过 `wgpu` 探测并创建 GPU 上下文.
#[derive(Debug, Clone, Default)]
pub struct WgpuProvider {
    power_preference: wgpu::PowerPreference,
}

impl WgpuProvider {
    /// 设置适配器的功耗偏好.
    pub fn with_power_preference(mut self, power_preference: wgpu::PowerPreference) -> Self {
        self.power_preference = power_preference;
        self
    }
}

impl GpuProvider for WgpuProvider {
    fn create(&self) -> GpuResult<Box<dyn SliceKernel>> {
        Ok(Box::new(WgpuKernel::new(self.power_preference)?))
    }
}

/// `wgpu` 计算上下文: 设备、队列与两条计算流水线.
#[derive(Debug)]
pub struct WgpuKernel {
    device: wgpu::Device,
    queue: wgpu::Queue,
    layout: wgpu::BindGroupLayout,
    pack_pipeline: wgpu::ComputePipeline,
    classify_pipeline: wgpu::ComputePipeline,
    adapter_name: String,
    lost: Arc<AtomicBool>,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn panic_payload_to_string(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl WgpuKernel {
    /// 创建设备并编译着色器. 任何一步失败都返回 [`GpuError::Initialization`].
    pub fn new(power_preference: wgpu::PowerPreference) -> GpuResult<Self> {
        let instance = wgpu::Instance::default();
        let adapter = block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            ..Default::default()
        }))
        .ok_or_else(|| GpuError::Initialization("没有可用的 wgpu 适配器".to_string()))?;
        let adapter_name = adapter.get_info().name;

        let (device, queue) =
            block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None))
                .map_err(|e| GpuError::Initialization(e.to_string()))?;

        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, msg| {
            warn!("wgpu 设备丢失 ({reason:?}): {msg}");
            flag.store(true, Ordering::Release);
        });
        device.on_uncaptured_error(Box::new(|e: wgpu::Error| {
            error!("wgpu 未捕获错误: {e}")
        }));

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ct-quant.slice.layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ct-quant.slice.pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let shader = catch_unwind(AssertUnwindSafe(|| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("ct-quant.slice.shader"),
                source: wgpu::ShaderSource::Wgsl(SLICE_WGSL.into()),
            })
        }))
        .map_err(|payload| GpuError::Initialization(panic_payload_to_string(payload)))?;

        let pipeline = |entry_point: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point,
                compilation_options: Default::default(),
            })
        };
        let pack_pipeline = pipeline("threshold_pack");
        let classify_pipeline = pipeline("classify_density");
        if let Some(e) = block_on(device.pop_error_scope()) {
            return Err(GpuError::Initialization(e.to_string()));
        }

        Ok(Self {
            device,
            queue,
            layout,
            pack_pipeline,
            classify_pipeline,
            adapter_name,
            lost,
        })
    }

    #[inline]
    fn check_alive(&self) -> GpuResult<()> {
        if self.lost.load(Ordering::Acquire) {
            Err(GpuError::DeviceLost(self.adapter_name.clone()))
        } else {
            Ok(())
        }
    }

    /// 运算失败时区分设备丢失与一般错误.
    fn failure(&self, msg: String) -> GpuError {
        if self.lost.load(Ordering::Acquire) {
            GpuError::DeviceLost(msg)
        } else {
            GpuError::Operation(msg)
        }
    }

    fn storage_buffer(&self, label: &str, bytes: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: bytes,
            usage,
            mapped_at_creation: false,
        })
    }

    fn read_back<T: Pod>(&self, buffer: &wgpu::Buffer) -> GpuResult<Vec<T>> {
        let slice = buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = sender.send(res);
        });
        self.device.poll(wgpu::Maintain::Wait);
        match receiver.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(self.failure(e.to_string())),
            Err(_) => return Err(self.failure("回读回调未执行".to_string())),
        }
        let data = slice.get_mapped_range();
        let out = cast_slice::<u8, T>(&data).to_vec();
        drop(data);
        buffer.unmap();
        Ok(out)
    }
}

impl SliceKernel for WgpuKernel {
    fn name(&self) -> String {
        self.adapter_name.clone()
    }

    fn run_slice(
        &mut self,
        slice: &[f32],
        (h, w): Idx2d,
        threshold_hu: f32,
    ) -> GpuResult<SliceReadback> {
        self.check_alive()?;
        let len = h * w;
        if slice.len() != len {
            return Err(GpuError::Operation(format!(
                "切片长度 {} 与形状 {h} x {w} 不符",
                slice.len()
            )));
        }
        let groups = len.div_ceil(WORKGROUP);
        if groups > MAX_WORKGROUPS {
            return Err(GpuError::Operation(format!(
                "切片过大: {len} 个像素超出单次 dispatch 上限"
            )));
        }
        let bytes = (len * std::mem::size_of::<f32>()) as u64;

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        // 以下缓冲区只在本切片内存活.
        let input = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("ct-quant.slice.hu"),
                contents: cast_slice(slice),
                usage: wgpu::BufferUsages::STORAGE,
            });
        let params = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("ct-quant.slice.params"),
                contents: cast_slice(&[SliceParams {
                    len: len as u32,
                    threshold: threshold_hu,
                    _pad: [0; 2],
                }]),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let gpu_usage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC;
        let read_usage = wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST;
        let packed = self.storage_buffer("ct-quant.slice.packed", bytes, gpu_usage);
        let factors = self.storage_buffer("ct-quant.slice.factors", bytes, gpu_usage);
        let packed_staging = self.storage_buffer("ct-quant.slice.packed_staging", bytes, read_usage);
        let factors_staging =
            self.storage_buffer("ct-quant.slice.factors_staging", bytes, read_usage);

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ct-quant.slice.bind_group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: input.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: packed.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: factors.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: params.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ct-quant.slice.encoder"),
            });
        for (label, pipeline) in [
            ("ct-quant.slice.threshold_pack", &self.pack_pipeline),
            ("ct-quant.slice.classify_density", &self.classify_pipeline),
        ] {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups as u32, 1, 1);
        }
        encoder.copy_buffer_to_buffer(&packed, 0, &packed_staging, 0, bytes);
        encoder.copy_buffer_to_buffer(&factors, 0, &factors_staging, 0, bytes);
        self.queue.submit(Some(encoder.finish()));

        let validation = block_on(self.device.pop_error_scope());
        let oom = block_on(self.device.pop_error_scope());
        if let Some(e) = validation.or(oom) {
            return Err(self.failure(e.to_string()));
        }

        let packed = self.read_back::<f32>(&packed_staging)?;
        let factors = self.read_back::<u32>(&factors_staging)?;
        self.check_alive()?;
        Ok(SliceReadback { packed, factors })
    }
}
