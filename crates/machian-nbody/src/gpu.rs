//! GPU compute backend.
//!
//! Wraps a wgpu device/queue pair and two compute kernels: the combined
//! short-range + central-forcing pass used by the N-body stepper, and a
//! vectorized rotation-curve evaluation. The device is shared across
//! sessions behind an `Arc`; a launch mutex serializes command
//! submission so concurrent sessions never interleave kernel work.

use std::borrow::Cow;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use machian_engine::rotation::{GalaxyProfile, MIN_RADIUS_KPC};

use crate::backend::{Accel, ForceBackend};
use crate::engine::P3mParams;
use crate::particles::ParticleSystem;

/// Errors from GPU compute operations.
///
/// These never surface to API callers: every failure path falls back to
/// the CPU implementation and logs.
#[derive(Error, Debug)]
pub enum GpuError {
    /// No compatible GPU adapter was found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(String),

    /// Kernel launch failed.
    #[error("kernel launch failed: {0}")]
    Launch(String),

    /// Buffer mapping failed.
    #[error("buffer mapping failed: {0}")]
    BufferMapping(String),
}

const WORKGROUP_SIZE: u32 = 256;

/// Combined pairwise-correction and central-forcing kernel. One thread
/// per particle; the O(N^2) scan is fine at session particle counts.
const FORCES_SHADER: &str = r#"
struct Params {
    n: u32,
    box_size: f32,
    cutoff: f32,
    softening: f32,
    force_scale: f32,
    coupling: f32,
    m0: f32,
    scale_length: f32,
    beta: f32,
    center: f32,
    min_radius: f32,
    _pad: f32,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> px: array<f32>;
@group(0) @binding(2) var<storage, read> py: array<f32>;
@group(0) @binding(3) var<storage, read_write> accel: array<vec2<f32>>;

const G_KPC: f32 = 4.30091e-6;

fn periodic_delta(a: f32, b: f32, box_size: f32) -> f32 {
    var d = a - b;
    if (d > box_size * 0.5) { d = d - box_size; }
    if (d < -box_size * 0.5) { d = d + box_size; }
    return d;
}

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= params.n) {
        return;
    }
    let xi = px[i];
    let yi = py[i];
    let cutoff_sq = params.cutoff * params.cutoff;
    let eps_sq = params.softening * params.softening;
    let shift = pow(cutoff_sq + eps_sq, -1.5);
    let scale = params.force_scale * params.coupling;

    var ax = 0.0;
    var ay = 0.0;
    for (var j: u32 = 0u; j < params.n; j = j + 1u) {
        if (j == i) {
            continue;
        }
        let dx = periodic_delta(xi, px[j], params.box_size);
        let dy = periodic_delta(yi, py[j], params.box_size);
        let r_sq = dx * dx + dy * dy;
        if (r_sq < cutoff_sq) {
            let f = pow(r_sq + eps_sq, -1.5) - shift;
            ax = ax - dx * f * scale;
            ay = ay - dy * f * scale;
        }
    }

    let rx = xi - params.center;
    let ry = yi - params.center;
    let r = max(sqrt(rx * rx + ry * ry), params.min_radius);
    let x = r / params.scale_length;
    let m_enc = params.m0 * (1.0 - (1.0 + x) * exp(-x));
    let inertia = pow(1.0 + x, -params.beta);
    let v_sq = G_KPC * m_enc / r / inertia;
    let a_mag = v_sq / r;
    ax = ax - a_mag * rx / r;
    ay = ay - a_mag * ry / r;

    accel[i] = vec2<f32>(ax, ay);
}
"#;

/// Rotation-curve kernel: one thread per sampled radius.
const PROFILE_SHADER: &str = r#"
struct Params {
    n: u32,
    m0: f32,
    scale_length: f32,
    beta: f32,
    min_radius: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> radii: array<f32>;
@group(0) @binding(2) var<storage, read_write> velocities: array<f32>;

const G_KPC: f32 = 4.30091e-6;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= params.n) {
        return;
    }
    let r = max(radii[i], params.min_radius);
    let x = r / params.scale_length;
    let m_enc = params.m0 * (1.0 - (1.0 + x) * exp(-x));
    let inertia = pow(1.0 + x, -params.beta);
    velocities[i] = sqrt(G_KPC * m_enc / r / inertia);
}
"#;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ForcesParams {
    n: u32,
    box_size: f32,
    cutoff: f32,
    softening: f32,
    force_scale: f32,
    coupling: f32,
    m0: f32,
    scale_length: f32,
    beta: f32,
    center: f32,
    min_radius: f32,
    _pad: f32,
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ProfileParams {
    n: u32,
    m0: f32,
    scale_length: f32,
    beta: f32,
    min_radius: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
}

/// Compute pipeline plus its bind group layout.
struct PipelineBundle {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

/// Process-wide GPU context: device, queue, and the shared kernels.
pub struct GpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    /// Serializes command submission across sessions.
    launch: Mutex<()>,
    profile_pipeline: PipelineBundle,
}

impl GpuDevice {
    /// Select an adapter and create the device and resident pipelines.
    pub fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|_| GpuError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        tracing::info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            "GPU adapter selected"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("machian nbody"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            ..Default::default()
        }))
        .map_err(|e: wgpu::RequestDeviceError| GpuError::DeviceRequest(e.to_string()))?;

        let profile_pipeline = create_pipeline(&device, "profile", PROFILE_SHADER, 2);

        Ok(Self {
            device,
            queue,
            adapter_info,
            launch: Mutex::new(()),
            profile_pipeline,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_info.name
    }

    fn storage_buffer(&self, label: &str, size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    fn uniform_buffer<T: bytemuck::Pod>(&self, label: &str, value: &T) -> wgpu::Buffer {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: std::mem::size_of::<T>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue
            .write_buffer(&buffer, 0, bytemuck::bytes_of(value));
        buffer
    }

    /// Dispatch a pipeline, copy the output to a staging buffer, and
    /// read it back. Takes the launch lock for the whole round trip.
    fn run_kernel(
        &self,
        bundle: &PipelineBundle,
        entries: &[wgpu::BindGroupEntry],
        threads: usize,
        output: &wgpu::Buffer,
        output_size: u64,
    ) -> Result<Vec<f32>, GpuError> {
        let _guard = self
            .launch
            .lock()
            .map_err(|_| GpuError::Launch("device launch lock poisoned".into()))?;

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kernel bind group"),
            layout: &bundle.layout,
            entries,
        });

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback staging"),
            size: output_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kernel encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("kernel pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&bundle.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let workgroups = (threads as u32).div_ceil(WORKGROUP_SIZE);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        encoder.copy_buffer_to_buffer(output, 0, &staging, 0, output_size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::PollType::wait());
        rx.recv()
            .map_err(|_| GpuError::BufferMapping("map callback dropped".into()))?
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?;

        let mapped = slice.get_mapped_range();
        let result: Vec<f32> = bytemuck::cast_slice(&mapped).to_vec();
        drop(mapped);
        staging.unmap();
        Ok(result)
    }

    /// Evaluate the rotation curve for a set of radii on the GPU.
    pub fn velocity_profile(
        &self,
        profile: &GalaxyProfile,
        radii: &[f64],
    ) -> Result<Vec<f64>, GpuError> {
        let n = radii.len();
        let radii_f32: Vec<f32> = radii.iter().map(|&r| r as f32).collect();

        let params = ProfileParams {
            n: n as u32,
            m0: profile.m0 as f32,
            scale_length: profile.scale_length as f32,
            beta: profile.beta as f32,
            min_radius: MIN_RADIUS_KPC as f32,
            _pad0: 0.0,
            _pad1: 0.0,
            _pad2: 0.0,
        };
        let params_buf = self.uniform_buffer("profile params", &params);
        let radii_buf = self.storage_buffer("profile radii", (n * 4) as u64);
        self.queue
            .write_buffer(&radii_buf, 0, bytemuck::cast_slice(&radii_f32));
        let out_buf = self.storage_buffer("profile velocities", (n * 4) as u64);

        let out = self.run_kernel(
            &self.profile_pipeline,
            &[
                bind_entry(0, &params_buf),
                bind_entry(1, &radii_buf),
                bind_entry(2, &out_buf),
            ],
            n,
            &out_buf,
            (n * 4) as u64,
        )?;
        Ok(out.into_iter().map(f64::from).collect())
    }
}

fn bind_entry(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}

/// Build a compute pipeline with one uniform binding followed by
/// `storage_bindings` storage buffers (the last is read-write output).
fn create_pipeline(
    device: &wgpu::Device,
    label: &str,
    shader: &str,
    storage_bindings: u32,
) -> PipelineBundle {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(shader)),
    });

    let mut entries = vec![wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }];
    for i in 1..=storage_bindings {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: i,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage {
                    read_only: i != storage_bindings,
                },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        });
    }

    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[&layout],
        ..Default::default()
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    });

    PipelineBundle { pipeline, layout }
}

/// Per-session GPU force backend. Owns its pipeline; shares the device.
pub struct GpuBackend {
    device: Arc<GpuDevice>,
    forces: Option<PipelineBundle>,
}

impl GpuBackend {
    pub fn new(device: Arc<GpuDevice>) -> Self {
        Self {
            device,
            forces: None,
        }
    }
}

impl ForceBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn particle_forces(
        &mut self,
        sys: &ParticleSystem,
        params: &P3mParams,
        profile: &GalaxyProfile,
    ) -> Result<Accel, GpuError> {
        let n = sys.len();
        let device = Arc::clone(&self.device);
        let bundle = self
            .forces
            .get_or_insert_with(|| create_pipeline(&device.device, "nbody forces", FORCES_SHADER, 3));

        let uniform = ForcesParams {
            n: n as u32,
            box_size: params.box_size,
            cutoff: params.cutoff,
            softening: params.softening,
            force_scale: params.force_scale,
            coupling: params.coupling(),
            m0: profile.m0 as f32,
            scale_length: profile.scale_length as f32,
            beta: profile.beta as f32,
            center: params.box_size / 2.0,
            min_radius: MIN_RADIUS_KPC as f32,
            _pad: 0.0,
        };
        let params_buf = device.uniform_buffer("forces params", &uniform);
        let px = device.storage_buffer("px", (n * 4) as u64);
        let py = device.storage_buffer("py", (n * 4) as u64);
        device.queue.write_buffer(&px, 0, bytemuck::cast_slice(&sys.x));
        device.queue.write_buffer(&py, 0, bytemuck::cast_slice(&sys.y));
        let out = device.storage_buffer("accel", (n * 8) as u64);

        let flat = device.run_kernel(
            bundle,
            &[
                bind_entry(0, &params_buf),
                bind_entry(1, &px),
                bind_entry(2, &py),
                bind_entry(3, &out),
            ],
            n,
            &out,
            (n * 8) as u64,
        )?;

        let mut accel = Accel::zeros(n);
        for i in 0..n {
            accel.ax[i] = flat[2 * i];
            accel.ay[i] = flat[2 * i + 1];
        }
        Ok(accel)
    }
}

// Device tests need real hardware; ignored by default as in CI.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;

    #[test]
    #[ignore = "requires GPU"]
    fn device_probe_and_profile_kernel() {
        let device = GpuDevice::new().unwrap();
        let profile = GalaxyProfile::new(1e11, 15.0, 5.0);
        let radii: Vec<f64> = (1..=100).map(|i| i as f64 * 0.5).collect();
        let gpu_v = device.velocity_profile(&profile, &radii).unwrap();
        for (r, v) in radii.iter().zip(&gpu_v) {
            let cpu_v = profile.circular_velocity(*r);
            assert!((v - cpu_v).abs() / cpu_v < 1e-3, "r={r}: {v} vs {cpu_v}");
        }
    }

    #[test]
    #[ignore = "requires GPU"]
    fn gpu_and_cpu_forces_agree() {
        let device = Arc::new(GpuDevice::new().unwrap());
        let profile = GalaxyProfile::new(1e11, 15.0, 5.0);
        let params = P3mParams::default();
        let sys = ParticleSystem::disk(500, &profile, params.box_size, 50.0, 9);

        let mut gpu = GpuBackend::new(device);
        let gpu_accel = gpu.particle_forces(&sys, &params, &profile).unwrap();
        let cpu_accel = CpuBackend::compute(&sys, &params, &profile);

        for i in 0..sys.len() {
            let scale = cpu_accel.ax[i].abs().max(cpu_accel.ay[i].abs()).max(1e-3);
            assert!((gpu_accel.ax[i] - cpu_accel.ax[i]).abs() / scale < 1e-2);
            assert!((gpu_accel.ay[i] - cpu_accel.ay[i]).abs() / scale < 1e-2);
        }
    }
}
