//! GPU render backend using wgpu.
//!
//! Draws into an offscreen `Rgba8Unorm` texture and reads the result back into
//! the shared frame format. Edges are a line list with per-vertex color,
//! uploaded in fixed batches of [`EDGE_BATCH`] edges so no single upload grows
//! with the topology. Nodes and signals are point sprites: instanced quads
//! whose size comes from an instance attribute, shaded with a radial falloff
//! plus an additive glow term.
//!
//! Enable with the `gpu` feature flag.

use bytemuck::{Pod, Zeroable};
use std::borrow::Cow;
use wgpu::util::DeviceExt;

use super::{
    edge_style, node_style, signal_style, BackendKind, FrameView, RenderBackend, RenderError,
    RenderStats, Scene, NODE_RADIUS, SHADOW_BLUR,
};

/// Edges per vertex-buffer upload.
pub const EDGE_BATCH: usize = 500;

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Sprite quad half-extent relative to the solid disc radius, before glow.
const SPRITE_REACH: f32 = 1.5;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Globals {
    viewport: [f32; 2],
    reach: f32,
    _pad: f32,
    core_color: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct LineVertex {
    position: [f32; 2],
    color: [f32; 4],
}

impl LineVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x4];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<LineVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// One node or signal.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SpriteInstance {
    center: [f32; 2],
    /// Solid disc radius in pixels.
    size: f32,
    /// 0..1 weight of the active-center highlight.
    core: f32,
    /// Straight alpha; the shader premultiplies.
    color: [f32; 4],
    /// Per-sprite glow strength.
    glow: f32,
    _pad: [f32; 3],
}

impl SpriteInstance {
    const ATTRIBS: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        0 => Float32x2,
        1 => Float32,
        2 => Float32,
        3 => Float32x4,
        4 => Float32
    ];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<SpriteInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }
}

struct Target {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    readback: wgpu::Buffer,
    padded_row: u32,
    width: u32,
    height: u32,
}

pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    line_pipeline: wgpu::RenderPipeline,
    sprite_pipeline: wgpu::RenderPipeline,
    globals: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    max_dimension: u32,

    target: Option<Target>,
    edge_batches: Vec<wgpu::Buffer>,
    sprites: Option<(wgpu::Buffer, usize)>,

    line_scratch: Vec<LineVertex>,
    sprite_scratch: Vec<SpriteInstance>,
    pixels: Vec<u8>,
    disposed: bool,
}

fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

impl GpuBackend {
    /// Probe for an adapter, compile the shaders and size the target.
    ///
    /// Blocks until the device is ready. Any failure is returned; the caller
    /// decides whether to fall back.
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        // A software adapter is no better than the raster path.
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(RenderError::Adapter)?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("netweave device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| RenderError::Device(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|e: wgpu::Error| {
            tracing::error!(error = %e, "uncaptured wgpu error");
        }));

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("netweave shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(SHADER)),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("netweave globals layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("netweave pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let color_target = [Some(wgpu::ColorTargetState {
            format: TARGET_FORMAT,
            blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
            write_mask: wgpu::ColorWrites::ALL,
        })];

        let line_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("netweave edges"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_line"),
                compilation_options: Default::default(),
                buffers: &[LineVertex::layout()],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_line"),
                compilation_options: Default::default(),
                targets: &color_target,
            }),
            multiview: None,
            cache: None,
        });

        let sprite_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("netweave sprites"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_sprite"),
                compilation_options: Default::default(),
                buffers: &[SpriteInstance::layout()],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_sprite"),
                compilation_options: Default::default(),
                targets: &color_target,
            }),
            multiview: None,
            cache: None,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::Shader(err.to_string()));
        }

        let globals = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("netweave globals"),
            contents: bytemuck::bytes_of(&Globals {
                viewport: [1.0, 1.0],
                reach: SPRITE_REACH,
                _pad: 0.0,
                core_color: [1.0; 4],
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("netweave globals"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals.as_entire_binding(),
            }],
        });

        let max_dimension = device.limits().max_texture_dimension_2d;
        let mut backend = Self {
            device,
            queue,
            line_pipeline,
            sprite_pipeline,
            globals,
            bind_group,
            max_dimension,
            target: None,
            edge_batches: Vec::new(),
            sprites: None,
            line_scratch: Vec::new(),
            sprite_scratch: Vec::new(),
            pixels: Vec::new(),
            disposed: false,
        };
        backend.resize(width, height)?;
        tracing::debug!(adapter = ?adapter.get_info().name, "GPU backend ready");
        Ok(backend)
    }

    fn ensure_edge_batches(&mut self, batches: usize) {
        while self.edge_batches.len() < batches {
            let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("netweave edge batch"),
                size: (EDGE_BATCH * 2 * std::mem::size_of::<LineVertex>()) as wgpu::BufferAddress,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.edge_batches.push(buffer);
        }
    }

    fn ensure_sprite_capacity(&mut self, count: usize) {
        let fits = matches!(&self.sprites, Some((_, cap)) if *cap >= count);
        if fits {
            return;
        }
        let cap = count.next_power_of_two().max(64);
        if let Some((old, _)) = self.sprites.take() {
            old.destroy();
        }
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("netweave sprites"),
            size: (cap * std::mem::size_of::<SpriteInstance>()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.sprites = Some((buffer, cap));
    }

    fn collect_geometry(&mut self, scene: &Scene<'_>) {
        self.line_scratch.clear();
        for id in 0..scene.edges.len() {
            if let Some(style) = edge_style(scene, id) {
                let color = [style.color.r, style.color.g, style.color.b, style.color.a];
                self.line_scratch.push(LineVertex {
                    position: [style.from.x, style.from.y],
                    color,
                });
                self.line_scratch.push(LineVertex {
                    position: [style.to.x, style.to.y],
                    color,
                });
            }
        }

        self.sprite_scratch.clear();
        for id in 0..scene.nodes.len() {
            if let Some(style) = node_style(scene, id) {
                let core = style.core.map(|c| c.a).unwrap_or(0.0);
                self.sprite_scratch.push(SpriteInstance {
                    center: [style.center.x, style.center.y],
                    size: style.radius,
                    core,
                    color: [style.color.r, style.color.g, style.color.b, style.color.a],
                    glow: style.glow,
                    _pad: [0.0; 3],
                });
            }
        }
        for signal in scene.signals.iter() {
            if let Some(style) = signal_style(scene, signal) {
                self.sprite_scratch.push(SpriteInstance {
                    center: [style.center.x, style.center.y],
                    size: style.radius,
                    core: 0.0,
                    color: [style.color.r, style.color.g, style.color.b, style.color.a],
                    glow: scene.glow_intensity,
                    _pad: [0.0; 3],
                });
            }
        }
    }

    fn read_back(&mut self) -> Result<(), RenderError> {
        let Some(target) = self.target.as_ref() else {
            return Ok(());
        };
        let slice = target.readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|_| RenderError::Readback("map callback dropped".into()))?
            .map_err(|e| RenderError::Readback(e.to_string()))?;

        {
            let data = slice.get_mapped_range();
            let row = (target.width * 4) as usize;
            let padded = target.padded_row as usize;
            self.pixels.clear();
            for y in 0..target.height as usize {
                let start = y * padded;
                self.pixels.extend_from_slice(&data[start..start + row]);
            }
        }
        target.readback.unmap();
        Ok(())
    }
}

impl RenderBackend for GpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpu
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }
        if let Some(t) = &self.target {
            if t.width == width && t.height == height {
                return Ok(());
            }
        }
        if let Some(old) = self.target.take() {
            old.texture.destroy();
            old.readback.destroy();
        }
        self.pixels.clear();
        if width == 0 || height == 0 {
            return Ok(());
        }
        if width > self.max_dimension || height > self.max_dimension {
            return Err(RenderError::Surface { width, height });
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("netweave target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let padded_row = align_to(width * 4, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("netweave readback"),
            size: padded_row as wgpu::BufferAddress * height as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        self.target = Some(Target {
            texture,
            view,
            readback,
            padded_row,
            width,
            height,
        });
        Ok(())
    }

    fn render(&mut self, scene: &Scene<'_>) -> Result<RenderStats, RenderError> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }
        let Some((width, height)) = self.target.as_ref().map(|t| (t.width, t.height)) else {
            return Ok(RenderStats::default());
        };

        self.collect_geometry(scene);
        let batches = self.line_scratch.len().div_ceil(EDGE_BATCH * 2);
        self.ensure_edge_batches(batches);
        self.ensure_sprite_capacity(self.sprite_scratch.len());

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        // Quads grow with the glow so the halo matches the raster blur reach.
        let core = scene.colors.active_center;
        let reach = SPRITE_REACH + SHADOW_BLUR * scene.glow_intensity / NODE_RADIUS;
        self.queue.write_buffer(
            &self.globals,
            0,
            bytemuck::bytes_of(&Globals {
                viewport: [width as f32, height as f32],
                reach,
                _pad: 0.0,
                core_color: [core.r, core.g, core.b, core.a],
            }),
        );
        for (chunk, buffer) in self
            .line_scratch
            .chunks(EDGE_BATCH * 2)
            .zip(&self.edge_batches)
        {
            self.queue
                .write_buffer(buffer, 0, bytemuck::cast_slice(chunk));
        }
        if let Some((buffer, _)) = &self.sprites {
            if !self.sprite_scratch.is_empty() {
                self.queue
                    .write_buffer(buffer, 0, bytemuck::cast_slice(&self.sprite_scratch));
            }
        }

        let mut draw_calls = 0u32;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("netweave frame"),
            });
        if let Some(target) = &self.target {
            {
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("netweave pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &target.view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                pass.set_bind_group(0, &self.bind_group, &[]);

                pass.set_pipeline(&self.line_pipeline);
                for (chunk, buffer) in self
                    .line_scratch
                    .chunks(EDGE_BATCH * 2)
                    .zip(&self.edge_batches)
                {
                    let bytes = (chunk.len() * std::mem::size_of::<LineVertex>()) as u64;
                    pass.set_vertex_buffer(0, buffer.slice(..bytes));
                    pass.draw(0..chunk.len() as u32, 0..1);
                    draw_calls += 1;
                }

                if let Some((buffer, _)) = &self.sprites {
                    let count = self.sprite_scratch.len();
                    if count > 0 {
                        let bytes = (count * std::mem::size_of::<SpriteInstance>()) as u64;
                        pass.set_pipeline(&self.sprite_pipeline);
                        pass.set_vertex_buffer(0, buffer.slice(..bytes));
                        pass.draw(0..4, 0..count as u32);
                        draw_calls += 1;
                    }
                }
            }

            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    texture: &target.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &target.readback,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(target.padded_row),
                        rows_per_image: Some(height),
                    },
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::Gpu(err.to_string()));
        }
        self.read_back()?;
        Ok(RenderStats { draw_calls })
    }

    fn is_ready(&self) -> bool {
        !self.disposed
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if let Some(t) = self.target.take() {
            t.texture.destroy();
            t.readback.destroy();
        }
        for buffer in self.edge_batches.drain(..) {
            buffer.destroy();
        }
        if let Some((buffer, _)) = self.sprites.take() {
            buffer.destroy();
        }
        self.globals.destroy();
        self.pixels = Vec::new();
        self.disposed = true;
    }

    fn frame(&self) -> Option<FrameView<'_>> {
        let t = self.target.as_ref()?;
        if self.pixels.len() != (t.width * t.height * 4) as usize {
            return None;
        }
        Some(FrameView {
            width: t.width,
            height: t.height,
            pixels: &self.pixels,
        })
    }
}

/// WGSL for edges (line list) and nodes/signals (instanced point sprites).
const SHADER: &str = r#"
struct Globals {
    viewport: vec2<f32>,
    reach: f32,
    _pad: f32,
    core_color: vec4<f32>,
}

@group(0) @binding(0) var<uniform> globals: Globals;

fn to_clip(p: vec2<f32>) -> vec4<f32> {
    let ndc = vec2<f32>(
        p.x / globals.viewport.x * 2.0 - 1.0,
        1.0 - p.y / globals.viewport.y * 2.0,
    );
    return vec4<f32>(ndc, 0.0, 1.0);
}

struct LineOut {
    @builtin(position) position: vec4<f32>,
    @location(0) color: vec4<f32>,
}

@vertex
fn vs_line(@location(0) position: vec2<f32>, @location(1) color: vec4<f32>) -> LineOut {
    var out: LineOut;
    out.position = to_clip(position);
    out.color = color;
    return out;
}

@fragment
fn fs_line(in: LineOut) -> @location(0) vec4<f32> {
    return vec4<f32>(in.color.rgb * in.color.a, in.color.a);
}

struct SpriteOut {
    @builtin(position) position: vec4<f32>,
    @location(0) local: vec2<f32>,
    @location(1) color: vec4<f32>,
    @location(2) core: f32,
    @location(3) glow: f32,
}

@vertex
fn vs_sprite(
    @builtin(vertex_index) vi: u32,
    @location(0) center: vec2<f32>,
    @location(1) size: f32,
    @location(2) core: f32,
    @location(3) color: vec4<f32>,
    @location(4) glow: f32,
) -> SpriteOut {
    var corners = array<vec2<f32>, 4>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(1.0, 1.0),
    );
    let local = corners[vi];
    var out: SpriteOut;
    out.position = to_clip(center + local * size * globals.reach);
    // Distance units: 1.0 is the edge of the solid disc.
    out.local = local * globals.reach;
    out.color = color;
    out.core = core;
    out.glow = glow;
    return out;
}

@fragment
fn fs_sprite(in: SpriteOut) -> @location(0) vec4<f32> {
    let r = length(in.local);
    let disc = 1.0 - smoothstep(0.8, 1.0, r);
    let halo = exp(-r * 0.8) * in.glow;
    let center = in.core * (1.0 - smoothstep(0.0, 0.5, r));
    let rgb = mix(in.color.rgb, globals.core_color.rgb, clamp(center, 0.0, 1.0));
    let alpha = clamp(disc + halo * 0.5, 0.0, 1.0) * in.color.a;
    if alpha <= 0.001 {
        discard;
    }
    return vec4<f32>(rgb * alpha, alpha);
}
"#;

#[cfg(test)]
mod tests {
    use super::super::test_support::{scene, settled};
    use super::*;

    #[test]
    fn gpu_backend_creation() {
        // This test may fail on systems without GPU support
        match GpuBackend::new(64, 64) {
            Ok(mut gpu) => {
                let (topo, pool, active, colors) = settled(64.0, 64.0, &[2, 3]);
                let stats = gpu.render(&scene(&topo, &pool, &active, &colors));
                println!("GPU backend rendered: {:?}", stats.map(|s| s.draw_calls));
                gpu.dispose();
                assert!(!gpu.is_ready());
            }
            Err(e) => println!("No GPU available (expected in some CI environments): {e}"),
        }
    }

    #[test]
    fn row_alignment() {
        assert_eq!(align_to(4, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(257 * 4, 256), 1280);
    }

    #[test]
    fn batches_cover_all_edges() {
        // 1200 edges -> 2400 vertices -> 3 uploads of at most 500 edges.
        assert_eq!((1200usize * 2).div_ceil(EDGE_BATCH * 2), 3);
        assert_eq!((500usize * 2).div_ceil(EDGE_BATCH * 2), 1);
        assert_eq!(0usize.div_ceil(EDGE_BATCH * 2), 0);
    }
}
