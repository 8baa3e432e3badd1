//! wgpu Target Backend
//!
//! Temporary render targets backed by `wgpu` textures.
//!
//! # Design
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              WgpuTargetBackend                       │
//! │                                                     │
//! │  free: HashMap<Key, Vec<PooledTexture>>             │
//! │  blit: pipelines per destination format             │
//! │                                                     │
//! │  acquire_temporary() → WgpuTarget (fresh or reused) │
//! │  release_temporary() → back into `free`             │
//! │  trim()              → drop idle textures           │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Clears and copies are encoded and submitted one by one so their order on
//! the queue matches the order the pipeline issued them in, interleaved
//! correctly with the collaborators' own submissions.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec4;
use rustc_hash::FxHashMap;

use crate::errors::{PeelError, Result};
use crate::renderer::backend::TargetBackend;
use crate::renderer::target::{ColorFormat, ColorSpace, Extent, RenderTargetDescriptor};

static NEXT_TARGET_ID: AtomicU64 = AtomicU64::new(1);

const TARGET_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

const BLIT_SHADER: &str = r"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(uv * vec2<f32>(2.0, -2.0) + vec2<f32>(-1.0, 1.0), 0.0, 1.0);
    out.uv = uv;
    return out;
}

@group(0) @binding(0) var src_texture: texture_2d<f32>;
@group(0) @binding(1) var src_sampler: sampler;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSampleLevel(src_texture, src_sampler, in.uv, 0.0);
}
";

// ─── Targets ──────────────────────────────────────────────────────────────────

/// A color texture with an optional depth plane.
pub struct WgpuTarget {
    id: u64,
    desc: RenderTargetDescriptor,
    format: wgpu::TextureFormat,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    depth: Option<(wgpu::Texture, wgpu::TextureView)>,
}

impl WgpuTarget {
    fn create(device: &wgpu::Device, desc: &RenderTargetDescriptor) -> Self {
        let format = desc.color_format.to_wgpu(desc.color_space);
        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: TARGET_USAGE,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let depth = (desc.depth_bits > 0).then(|| {
            let depth = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(desc.label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: depth_format(desc.depth_bits),
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            let view = depth.create_view(&wgpu::TextureViewDescriptor::default());
            (depth, view)
        });

        Self {
            id: NEXT_TARGET_ID.fetch_add(1, Ordering::Relaxed),
            desc: *desc,
            format,
            texture,
            view,
            depth,
        }
    }

    /// Wrap a texture the caller owns, such as a camera target.
    ///
    /// Copies into or out of it use the blit path unless extent and format
    /// match exactly, so the texture needs `TEXTURE_BINDING` when read and
    /// `RENDER_ATTACHMENT` when written.
    #[must_use]
    pub fn wrap(texture: wgpu::Texture, label: &'static str) -> Self {
        let format = texture.format();
        let size = texture.size();
        let (color_format, color_space) = match format {
            wgpu::TextureFormat::Rg32Float => (ColorFormat::Rg32Float, ColorSpace::Linear),
            f if f.is_srgb() => (ColorFormat::Rgba8, ColorSpace::Gamma),
            _ => (ColorFormat::Rgba8, ColorSpace::Linear),
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            id: NEXT_TARGET_ID.fetch_add(1, Ordering::Relaxed),
            desc: RenderTargetDescriptor {
                width: size.width,
                height: size.height,
                depth_bits: 0,
                color_format,
                color_space,
                label,
            },
            format,
            texture,
            view,
            depth: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn descriptor(&self) -> &RenderTargetDescriptor {
        &self.desc
    }

    #[must_use]
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    #[must_use]
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Depth attachment view, present on targets acquired with depth bits.
    #[must_use]
    pub fn depth_view(&self) -> Option<&wgpu::TextureView> {
        self.depth.as_ref().map(|(_, view)| view)
    }

    #[must_use]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }
}

fn depth_format(bits: u32) -> wgpu::TextureFormat {
    if bits <= 24 {
        wgpu::TextureFormat::Depth24Plus
    } else {
        wgpu::TextureFormat::Depth32Float
    }
}

// ─── Pool internals ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct PoolKey {
    width: u32,
    height: u32,
    depth_bits: u32,
    format: wgpu::TextureFormat,
}

impl PoolKey {
    fn from_desc(desc: &RenderTargetDescriptor) -> Self {
        Self {
            width: desc.width,
            height: desc.height,
            depth_bits: desc.depth_bits,
            format: desc.color_format.to_wgpu(desc.color_space),
        }
    }
}

struct PooledTarget {
    target: WgpuTarget,
    /// Frames spent in the free list without being reused.
    idle_frames: u32,
}

/// Fullscreen-triangle copy used when formats or extents differ.
struct BlitPass {
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    shader: wgpu::ShaderModule,
    pipelines: FxHashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

impl BlitPass {
    fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Peel Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(BLIT_SHADER)),
        });

        // Rg32Float is not filterable; nearest sampling serves every format
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Peel Blit Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Peel Blit Sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        Self {
            layout,
            sampler,
            shader,
            pipelines: FxHashMap::default(),
        }
    }

    fn pipeline(
        &mut self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
    ) -> &wgpu::RenderPipeline {
        let Self {
            layout,
            shader,
            pipelines,
            ..
        } = self;
        let (layout, shader) = (&*layout, &*shader);

        pipelines.entry(format).or_insert_with(|| {
            log::debug!("Creating peel blit pipeline for {format:?}");
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&format!("Peel Blit Pipeline {format:?}")),
                layout: Some(
                    &device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: Some("Peel Blit Pipeline Layout"),
                        bind_group_layouts: &[Some(layout)],
                        immediate_size: 0,
                    }),
                ),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        })
    }
}

// ─── Backend ──────────────────────────────────────────────────────────────────

/// GPU implementation of the temporary-target pool.
pub struct WgpuTargetBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    free: FxHashMap<PoolKey, Vec<PooledTarget>>,
    blit: BlitPass,
    /// Upper bound on the bytes of simultaneously leased targets.
    max_live_bytes: Option<u64>,
    live_bytes: u64,
}

impl WgpuTargetBackend {
    #[must_use]
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let blit = BlitPass::new(&device);
        Self {
            device,
            queue,
            free: FxHashMap::default(),
            blit,
            max_live_bytes: None,
            live_bytes: 0,
        }
    }

    /// Fail acquisitions that would push leased memory past `bytes`.
    #[must_use]
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.max_live_bytes = Some(bytes);
        self
    }

    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Bytes held by currently leased targets.
    #[must_use]
    pub fn live_bytes(&self) -> u64 {
        self.live_bytes
    }

    /// Textures waiting in the free lists.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }

    fn exhausted(desc: &RenderTargetDescriptor) -> PeelError {
        PeelError::ResourceExhausted {
            label: desc.label,
            width: desc.width,
            height: desc.height,
        }
    }

    fn blit(&mut self, src: &WgpuTarget, dst: &WgpuTarget) {
        let pipeline = self.blit.pipeline(&self.device, dst.format).clone();

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Peel Blit BG"),
            layout: &self.blit.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&src.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.blit.sampler),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Peel Blit"),
            });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Peel Blit Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &dst.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            rpass.set_pipeline(&pipeline);
            rpass.set_bind_group(0, &bind_group, &[]);
            rpass.draw(0..3, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl TargetBackend for WgpuTargetBackend {
    type Target = WgpuTarget;

    fn acquire_temporary(&mut self, desc: &RenderTargetDescriptor) -> Result<WgpuTarget> {
        let max_dim = self.device.limits().max_texture_dimension_2d;
        if desc.width > max_dim || desc.height > max_dim {
            return Err(Self::exhausted(desc));
        }

        let bytes = desc.byte_size();
        if self
            .max_live_bytes
            .is_some_and(|max| self.live_bytes + bytes > max)
        {
            return Err(Self::exhausted(desc));
        }

        let recycled = self
            .free
            .get_mut(&PoolKey::from_desc(desc))
            .and_then(Vec::pop);

        let target = if let Some(pooled) = recycled {
            let mut target = pooled.target;
            target.desc.label = desc.label;
            target
        } else {
            log::trace!(
                "Creating peel target '{}' {}x{}",
                desc.label,
                desc.width,
                desc.height
            );
            WgpuTarget::create(&self.device, desc)
        };

        self.live_bytes += bytes;
        Ok(target)
    }

    fn release_temporary(&mut self, target: WgpuTarget) {
        self.live_bytes = self.live_bytes.saturating_sub(target.desc.byte_size());
        self.free
            .entry(PoolKey::from_desc(&target.desc))
            .or_default()
            .push(PooledTarget {
                target,
                idle_frames: 0,
            });
    }

    fn clear(&mut self, target: &WgpuTarget, color: Vec4, clear_depth: bool) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Peel Clear"),
            });

        let depth_view = if clear_depth { target.depth_view() } else { None };
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Peel Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(color.x),
                            g: f64::from(color.y),
                            b: f64::from(color.z),
                            a: f64::from(color.w),
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: depth_view.map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn copy(&mut self, src: &WgpuTarget, dst: &WgpuTarget) {
        if src.id == dst.id {
            return;
        }

        if src.texture.size() != dst.texture.size() || src.format != dst.format {
            self.blit(src, dst);
            return;
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Peel Copy"),
            });
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &src.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &dst.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            src.texture.size(),
        );
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn extent(&self, target: &WgpuTarget) -> Extent {
        let size = target.texture.size();
        Extent::new(size.width, size.height)
    }

    fn trim(&mut self, max_idle_frames: u32) {
        for list in self.free.values_mut() {
            for pooled in list.iter_mut() {
                pooled.idle_frames += 1;
            }
            list.retain(|pooled| pooled.idle_frames <= max_idle_frames);
        }
        self.free.retain(|_, list| !list.is_empty());
    }
}
