//! GPU kernel dispatch.
//!
//! One compute pipeline per kernel, built once at startup; each call uploads
//! its inputs, runs one thread per element, and reads the results back.
//!
//! The marching and integration kernels would exceed the default limit of 8
//! storage buffers per stage if every raw-op array bound separately, so some
//! inputs are interleaved host-side: ray spans as `vec4<f32>`, per-sample
//! `(ds, t)` pairs as `vec2<f32>`, composited color and depth as `vec4<f32>`.
//! The forward and backward integration entries share one shader module with
//! disjoint binding slots past the sample inputs; each pipeline layout lists
//! only the bindings its entry uses.

use wgpu::{BindGroup, BindGroupLayout, BufferUsages, ComputePipeline};

use crate::core::GridView;
use crate::gpu::context::{GpuContext, GpuError};
use crate::gpu::types::{IntegrateParamsGPU, MarchParamsGPU, MortonParamsGPU, PackbitsParamsGPU};
use crate::gpu::{buffers, shaders};
use crate::ops::{IntegratingDescriptor, MarchingDescriptor};
use crate::render::MarchConfig;

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
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

fn bind_group_layout(
    device: &wgpu::Device,
    label: &str,
    entries: &[wgpu::BindGroupLayoutEntry],
) -> BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries,
    })
}

fn compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &BindGroupLayout,
    module: &wgpu::ShaderModule,
    entry_point: &str,
) -> ComputePipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module,
        entry_point,
    })
}

/// Pair up per-ray spans and per-sample `(ds, t)` for the packed bindings.
fn interleave_sample_inputs(
    starts: &[u32],
    counts: &[u32],
    dss: &[f32],
    ts: &[f32],
) -> (Vec<[u32; 2]>, Vec<[f32; 2]>) {
    let spans = starts.iter().zip(counts).map(|(&s, &c)| [s, c]).collect();
    let ds_ts = dss.iter().zip(ts).map(|(&ds, &t)| [ds, t]).collect();
    (spans, ds_ts)
}

/// Padded marching output read back from the GPU.
///
/// Same layout as the CPU marcher's output slices; cascade levels stay
/// GPU-internal (the raw-op contract does not expose them either).
#[derive(Debug, Default)]
pub struct GpuMarchOutput {
    pub positions: Vec<f32>,
    pub dss: Vec<f32>,
    pub ts: Vec<f32>,
    pub counts: Vec<u32>,
}

pub struct GpuKernels {
    ctx: GpuContext,
    morton_encode_pipeline: ComputePipeline,
    morton_decode_pipeline: ComputePipeline,
    morton_bind_group_layout: BindGroupLayout,
    packbits_pipeline: ComputePipeline,
    packbits_bind_group_layout: BindGroupLayout,
    march_pipeline: ComputePipeline,
    march_bind_group_layout: BindGroupLayout,
    integrate_pipeline: ComputePipeline,
    integrate_bind_group_layout: BindGroupLayout,
    integrate_backward_pipeline: ComputePipeline,
    integrate_backward_bind_group_layout: BindGroupLayout,
}

impl GpuKernels {
    /// Initialize a device and build all kernel pipelines.
    pub fn new() -> Result<Self, GpuError> {
        Ok(Self::with_context(GpuContext::new_blocking()?))
    }

    /// Build the pipelines on an existing context.
    pub fn with_context(ctx: GpuContext) -> Self {
        let device = &ctx.device;

        let morton_shader = shaders::create_morton_shader(device);
        let packbits_shader = shaders::create_packbits_shader(device);
        let march_shader = shaders::create_march_shader(device);
        let integrate_shader = shaders::create_integrate_shader(device);

        let morton_bind_group_layout = bind_group_layout(
            device,
            "Morton Bind Group Layout",
            &[
                uniform_entry(0),
                storage_entry(1, true),  // src
                storage_entry(2, false), // dst
            ],
        );

        let packbits_bind_group_layout = bind_group_layout(
            device,
            "Packbits Bind Group Layout",
            &[
                uniform_entry(0),
                storage_entry(1, true),  // density
                storage_entry(2, false), // bits
            ],
        );

        let march_bind_group_layout = bind_group_layout(
            device,
            "March Bind Group Layout",
            &[
                uniform_entry(0),
                storage_entry(1, true),  // bits
                storage_entry(2, true),  // origins
                storage_entry(3, true),  // directions
                storage_entry(4, true),  // ray_spans
                storage_entry(5, false), // out_positions
                storage_entry(6, false), // out_dss
                storage_entry(7, false), // out_ts
                storage_entry(8, false), // out_counts
            ],
        );

        let integrate_bind_group_layout = bind_group_layout(
            device,
            "Integrate Bind Group Layout",
            &[
                uniform_entry(0),
                storage_entry(1, true),  // spans
                storage_entry(2, true),  // ds_ts
                storage_entry(3, true),  // sigmas
                storage_entry(4, true),  // rgbs
                storage_entry(5, false), // out_rgbd
                storage_entry(6, false), // out_opacity
            ],
        );

        let integrate_backward_bind_group_layout = bind_group_layout(
            device,
            "Integrate Backward Bind Group Layout",
            &[
                uniform_entry(0),
                storage_entry(1, true),   // spans
                storage_entry(2, true),   // ds_ts
                storage_entry(3, true),   // sigmas
                storage_entry(4, true),   // rgbs
                storage_entry(7, true),   // d_rgbd
                storage_entry(8, true),   // d_opacity
                storage_entry(9, false),  // out_d_sigmas
                storage_entry(10, false), // out_d_rgbs
            ],
        );

        let morton_encode_pipeline = compute_pipeline(
            device,
            "Morton Encode Pipeline",
            &morton_bind_group_layout,
            &morton_shader,
            "morton3d_encode",
        );
        let morton_decode_pipeline = compute_pipeline(
            device,
            "Morton Decode Pipeline",
            &morton_bind_group_layout,
            &morton_shader,
            "morton3d_decode",
        );
        let packbits_pipeline = compute_pipeline(
            device,
            "Packbits Pipeline",
            &packbits_bind_group_layout,
            &packbits_shader,
            "pack_density",
        );
        let march_pipeline = compute_pipeline(
            device,
            "March Pipeline",
            &march_bind_group_layout,
            &march_shader,
            "march_rays",
        );
        let integrate_pipeline = compute_pipeline(
            device,
            "Integrate Pipeline",
            &integrate_bind_group_layout,
            &integrate_shader,
            "integrate_rays",
        );
        let integrate_backward_pipeline = compute_pipeline(
            device,
            "Integrate Backward Pipeline",
            &integrate_backward_bind_group_layout,
            &integrate_shader,
            "integrate_rays_backward",
        );

        Self {
            ctx,
            morton_encode_pipeline,
            morton_decode_pipeline,
            morton_bind_group_layout,
            packbits_pipeline,
            packbits_bind_group_layout,
            march_pipeline,
            march_bind_group_layout,
            integrate_pipeline,
            integrate_bind_group_layout,
            integrate_backward_pipeline,
            integrate_backward_bind_group_layout,
        }
    }

    /// Submit one compute pass with `n_threads` total invocations.
    fn dispatch(
        &self,
        label: &str,
        pipeline: &ComputePipeline,
        bind_group: &BindGroup,
        n_threads: u32,
    ) {
        let mut encoder =
            self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(label),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups((n_threads + 255) / 256, 1, 1);
        }
        self.ctx.queue.submit(Some(encoder.finish()));
    }

    fn run_morton(
        &self,
        pipeline: &ComputePipeline,
        label: &str,
        src_data: &[u32],
        length: u32,
        dst_len: usize,
    ) -> Result<Vec<u32>, GpuError> {
        let device = &self.ctx.device;
        let params = MortonParamsGPU { length, _pad: [0; 3] };
        let params_buffer =
            buffers::create_buffer_init(device, "Morton Params", &[params], BufferUsages::UNIFORM);
        let src_buffer =
            buffers::create_buffer_init(device, "Morton Src", src_data, BufferUsages::STORAGE);
        let dst_buffer = buffers::create_buffer(
            device,
            "Morton Dst",
            (dst_len * std::mem::size_of::<u32>()) as u64,
            BufferUsages::STORAGE | BufferUsages::COPY_SRC,
        );

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Morton Bind Group"),
            layout: &self.morton_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: params_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: src_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: dst_buffer.as_entire_binding() },
            ],
        });

        self.dispatch(label, pipeline, &bind_group, length);
        buffers::read_buffer_blocking(device, &self.ctx.queue, &dst_buffer, dst_len)
    }

    /// Encode packed `(x, y, z)` coordinate triplets into Morton codes.
    pub fn morton3d(&self, coords: &[u32]) -> Result<Vec<u32>, GpuError> {
        assert_eq!(coords.len() % 3, 0, "coords length must be a multiple of 3");
        let length = coords.len() / 3;
        if length == 0 {
            return Ok(Vec::new());
        }
        self.run_morton(
            &self.morton_encode_pipeline,
            "Morton Encode",
            coords,
            length as u32,
            length,
        )
    }

    /// Decode Morton codes back into coordinate triplets.
    pub fn morton3d_invert(&self, codes: &[u32]) -> Result<Vec<u32>, GpuError> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        self.run_morton(
            &self.morton_decode_pipeline,
            "Morton Decode",
            codes,
            codes.len() as u32,
            codes.len() * 3,
        )
    }

    /// Pack a density grid into an occupancy bitfield on the GPU.
    ///
    /// Matches [`crate::core::pack_density_into_bits`]: strictly-greater
    /// threshold, bit `i` of the result is cell `i` of `density`.
    pub fn pack_density_into_bits(
        &self,
        density: &[f32],
        threshold: f32,
    ) -> Result<Vec<u8>, GpuError> {
        assert_eq!(density.len() % 8, 0, "density length must be a multiple of 8");
        let n_bytes = density.len() / 8;
        if n_bytes == 0 {
            return Ok(Vec::new());
        }
        let n_words = n_bytes.div_ceil(4);

        let device = &self.ctx.device;
        let params = PackbitsParamsGPU {
            n_words: n_words as u32,
            n_cells: density.len() as u32,
            density_threshold: threshold,
            _pad: 0,
        };
        let params_buffer = buffers::create_buffer_init(
            device,
            "Packbits Params",
            &[params],
            BufferUsages::UNIFORM,
        );
        let density_buffer =
            buffers::create_buffer_init(device, "Density Grid", density, BufferUsages::STORAGE);
        let bits_buffer = buffers::create_buffer(
            device,
            "Occupancy Bits",
            (n_words * std::mem::size_of::<u32>()) as u64,
            BufferUsages::STORAGE | BufferUsages::COPY_SRC,
        );

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Packbits Bind Group"),
            layout: &self.packbits_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: params_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: density_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: bits_buffer.as_entire_binding() },
            ],
        });

        self.dispatch("Packbits", &self.packbits_pipeline, &bind_group, n_words as u32);
        let words: Vec<u32> =
            buffers::read_buffer_blocking(device, &self.ctx.queue, &bits_buffer, n_words)?;
        Ok(buffers::words_to_bitfield(&words, n_bytes))
    }

    /// March a batch of rays on the GPU.
    ///
    /// Same contract as [`crate::render::march_rays`], with outputs returned
    /// as owned vectors.
    #[allow(clippy::too_many_arguments)]
    pub fn march_rays(
        &self,
        grid: GridView<'_>,
        config: &MarchConfig,
        origins: &[f32],
        directions: &[f32],
        t_starts: &[f32],
        t_ends: &[f32],
        noises: &[f32],
    ) -> Result<GpuMarchOutput, GpuError> {
        let n_rays = t_starts.len();
        let max = config.max_n_samples as usize;
        assert!(max > 0, "max_n_samples must be positive");
        assert_eq!(origins.len(), n_rays * 3, "origins length mismatch");
        assert_eq!(directions.len(), n_rays * 3, "directions length mismatch");
        assert_eq!(t_ends.len(), n_rays, "t_ends length mismatch");
        assert_eq!(noises.len(), n_rays, "noises length mismatch");
        if n_rays == 0 {
            return Ok(GpuMarchOutput::default());
        }

        let params = MarchParamsGPU::from(MarchingDescriptor {
            n_rays: n_rays as u32,
            max_n_samples: config.max_n_samples,
            k: grid.cascades(),
            g: grid.resolution(),
            bound: grid.bound(),
            stepsize_portion: config.stepsize_portion,
        });
        let words = buffers::bitfield_words(grid.bits());
        let spans: Vec<[f32; 4]> =
            (0..n_rays).map(|i| [t_starts[i], t_ends[i], noises[i], 0.0]).collect();

        let device = &self.ctx.device;
        let f32_size = std::mem::size_of::<f32>();
        let params_buffer =
            buffers::create_buffer_init(device, "March Params", &[params], BufferUsages::UNIFORM);
        let bits_buffer =
            buffers::create_buffer_init(device, "Occupancy Bits", &words, BufferUsages::STORAGE);
        let origins_buffer =
            buffers::create_buffer_init(device, "Ray Origins", origins, BufferUsages::STORAGE);
        let directions_buffer = buffers::create_buffer_init(
            device,
            "Ray Directions",
            directions,
            BufferUsages::STORAGE,
        );
        let spans_buffer =
            buffers::create_buffer_init(device, "Ray Spans", &spans, BufferUsages::STORAGE);
        let positions_buffer = buffers::create_buffer(
            device,
            "Sample Positions",
            (n_rays * max * 3 * f32_size) as u64,
            BufferUsages::STORAGE | BufferUsages::COPY_SRC,
        );
        let dss_buffer = buffers::create_buffer(
            device,
            "Sample Step Sizes",
            (n_rays * max * f32_size) as u64,
            BufferUsages::STORAGE | BufferUsages::COPY_SRC,
        );
        let ts_buffer = buffers::create_buffer(
            device,
            "Sample Ts",
            (n_rays * max * f32_size) as u64,
            BufferUsages::STORAGE | BufferUsages::COPY_SRC,
        );
        let counts_buffer = buffers::create_buffer(
            device,
            "Sample Counts",
            (n_rays * std::mem::size_of::<u32>()) as u64,
            BufferUsages::STORAGE | BufferUsages::COPY_SRC,
        );

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("March Bind Group"),
            layout: &self.march_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: params_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: bits_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: origins_buffer.as_entire_binding() },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: directions_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry { binding: 4, resource: spans_buffer.as_entire_binding() },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: positions_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry { binding: 6, resource: dss_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 7, resource: ts_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 8, resource: counts_buffer.as_entire_binding() },
            ],
        });

        self.dispatch("March Rays", &self.march_pipeline, &bind_group, n_rays as u32);

        let queue = &self.ctx.queue;
        Ok(GpuMarchOutput {
            positions: buffers::read_buffer_blocking(
                device,
                queue,
                &positions_buffer,
                n_rays * max * 3,
            )?,
            dss: buffers::read_buffer_blocking(device, queue, &dss_buffer, n_rays * max)?,
            ts: buffers::read_buffer_blocking(device, queue, &ts_buffer, n_rays * max)?,
            counts: buffers::read_buffer_blocking(device, queue, &counts_buffer, n_rays)?,
        })
    }

    /// Integrate compacted samples on the GPU.
    ///
    /// Same contract as [`crate::render::integrate_rays`]; returns
    /// `(color [n*3], depth [n], opacity [n])`.
    pub fn integrate_rays(
        &self,
        starts: &[u32],
        counts: &[u32],
        dss: &[f32],
        ts: &[f32],
        sigmas: &[f32],
        rgbs: &[f32],
    ) -> Result<(Vec<f32>, Vec<f32>, Vec<f32>), GpuError> {
        let n_rays = counts.len();
        let total = dss.len();
        assert_eq!(starts.len(), n_rays, "starts length mismatch");
        assert_eq!(ts.len(), total, "ts length mismatch");
        assert_eq!(sigmas.len(), total, "sigmas length mismatch");
        assert_eq!(rgbs.len(), total * 3, "rgbs length mismatch");
        if n_rays == 0 {
            return Ok((Vec::new(), Vec::new(), Vec::new()));
        }
        if total == 0 {
            // Zero-sample batches never touch the device; wgpu rejects
            // zero-sized buffers.
            return Ok((vec![0.0; n_rays * 3], vec![0.0; n_rays], vec![0.0; n_rays]));
        }

        let (spans, ds_ts) = interleave_sample_inputs(starts, counts, dss, ts);
        let params = IntegrateParamsGPU::from(IntegratingDescriptor {
            n_rays: n_rays as u32,
            total_samples: total as u32,
        });

        let device = &self.ctx.device;
        let f32_size = std::mem::size_of::<f32>();
        let params_buffer = buffers::create_buffer_init(
            device,
            "Integrate Params",
            &[params],
            BufferUsages::UNIFORM,
        );
        let spans_buffer =
            buffers::create_buffer_init(device, "Ray Sample Spans", &spans, BufferUsages::STORAGE);
        let ds_ts_buffer =
            buffers::create_buffer_init(device, "Sample Ds Ts", &ds_ts, BufferUsages::STORAGE);
        let sigmas_buffer =
            buffers::create_buffer_init(device, "Sample Sigmas", sigmas, BufferUsages::STORAGE);
        let rgbs_buffer =
            buffers::create_buffer_init(device, "Sample Rgbs", rgbs, BufferUsages::STORAGE);
        let rgbd_buffer = buffers::create_buffer(
            device,
            "Composited Rgbd",
            (n_rays * 4 * f32_size) as u64,
            BufferUsages::STORAGE | BufferUsages::COPY_SRC,
        );
        let opacity_buffer = buffers::create_buffer(
            device,
            "Composited Opacity",
            (n_rays * f32_size) as u64,
            BufferUsages::STORAGE | BufferUsages::COPY_SRC,
        );

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Integrate Bind Group"),
            layout: &self.integrate_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: params_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: spans_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: ds_ts_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: sigmas_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: rgbs_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 5, resource: rgbd_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 6, resource: opacity_buffer.as_entire_binding() },
            ],
        });

        self.dispatch("Integrate Rays", &self.integrate_pipeline, &bind_group, n_rays as u32);

        let queue = &self.ctx.queue;
        let rgbd: Vec<f32> = buffers::read_buffer_blocking(device, queue, &rgbd_buffer, n_rays * 4)?;
        let opacity = buffers::read_buffer_blocking(device, queue, &opacity_buffer, n_rays)?;

        let mut color = vec![0.0f32; n_rays * 3];
        let mut depth = vec![0.0f32; n_rays];
        for i in 0..n_rays {
            color[i * 3..i * 3 + 3].copy_from_slice(&rgbd[i * 4..i * 4 + 3]);
            depth[i] = rgbd[i * 4 + 3];
        }
        Ok((color, depth, opacity))
    }

    /// Backward pass of [`Self::integrate_rays`] on the GPU.
    ///
    /// Same contract as [`crate::diff::integrate_rays_backward`]; returns
    /// `(d_sigmas [total], d_rgbs [total*3])`.
    #[allow(clippy::too_many_arguments)]
    pub fn integrate_rays_backward(
        &self,
        starts: &[u32],
        counts: &[u32],
        dss: &[f32],
        ts: &[f32],
        sigmas: &[f32],
        rgbs: &[f32],
        d_color: &[f32],
        d_depth: &[f32],
        d_opacity: &[f32],
    ) -> Result<(Vec<f32>, Vec<f32>), GpuError> {
        let n_rays = counts.len();
        let total = dss.len();
        assert_eq!(starts.len(), n_rays, "starts length mismatch");
        assert_eq!(ts.len(), total, "ts length mismatch");
        assert_eq!(sigmas.len(), total, "sigmas length mismatch");
        assert_eq!(rgbs.len(), total * 3, "rgbs length mismatch");
        assert_eq!(d_color.len(), n_rays * 3, "d_color length mismatch");
        assert_eq!(d_depth.len(), n_rays, "d_depth length mismatch");
        assert_eq!(d_opacity.len(), n_rays, "d_opacity length mismatch");
        if n_rays == 0 || total == 0 {
            return Ok((Vec::new(), Vec::new()));
        }

        let (spans, ds_ts) = interleave_sample_inputs(starts, counts, dss, ts);
        let d_rgbd: Vec<[f32; 4]> = (0..n_rays)
            .map(|i| [d_color[i * 3], d_color[i * 3 + 1], d_color[i * 3 + 2], d_depth[i]])
            .collect();
        let params = IntegrateParamsGPU::from(IntegratingDescriptor {
            n_rays: n_rays as u32,
            total_samples: total as u32,
        });

        let device = &self.ctx.device;
        let f32_size = std::mem::size_of::<f32>();
        let params_buffer = buffers::create_buffer_init(
            device,
            "Integrate Params",
            &[params],
            BufferUsages::UNIFORM,
        );
        let spans_buffer =
            buffers::create_buffer_init(device, "Ray Sample Spans", &spans, BufferUsages::STORAGE);
        let ds_ts_buffer =
            buffers::create_buffer_init(device, "Sample Ds Ts", &ds_ts, BufferUsages::STORAGE);
        let sigmas_buffer =
            buffers::create_buffer_init(device, "Sample Sigmas", sigmas, BufferUsages::STORAGE);
        let rgbs_buffer =
            buffers::create_buffer_init(device, "Sample Rgbs", rgbs, BufferUsages::STORAGE);
        let d_rgbd_buffer =
            buffers::create_buffer_init(device, "Upstream Rgbd", &d_rgbd, BufferUsages::STORAGE);
        let d_opacity_buffer = buffers::create_buffer_init(
            device,
            "Upstream Opacity",
            d_opacity,
            BufferUsages::STORAGE,
        );
        let d_sigmas_buffer = buffers::create_buffer(
            device,
            "Sigma Gradients",
            (total * f32_size) as u64,
            BufferUsages::STORAGE | BufferUsages::COPY_SRC,
        );
        let d_rgbs_buffer = buffers::create_buffer(
            device,
            "Rgb Gradients",
            (total * 3 * f32_size) as u64,
            BufferUsages::STORAGE | BufferUsages::COPY_SRC,
        );

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Integrate Backward Bind Group"),
            layout: &self.integrate_backward_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: params_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: spans_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: ds_ts_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: sigmas_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: rgbs_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 7, resource: d_rgbd_buffer.as_entire_binding() },
                wgpu::BindGroupEntry {
                    binding: 8,
                    resource: d_opacity_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 9,
                    resource: d_sigmas_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry { binding: 10, resource: d_rgbs_buffer.as_entire_binding() },
            ],
        });

        self.dispatch(
            "Integrate Rays Backward",
            &self.integrate_backward_pipeline,
            &bind_group,
            n_rays as u32,
        );

        let queue = &self.ctx.queue;
        let d_sigmas = buffers::read_buffer_blocking(device, queue, &d_sigmas_buffer, total)?;
        let d_rgbs = buffers::read_buffer_blocking(device, queue, &d_rgbs_buffer, total * 3)?;
        Ok((d_sigmas, d_rgbs))
    }
}
