//! GPU rendering pipeline using wgpu.
//!
//! This module provides the [`Renderer`] struct which handles:
//! - wgpu device and surface initialization
//! - Shader compilation and pipeline setup
//! - Scene mesh and drape texture upload
//! - Shadow and main render passes

pub mod camera;

use std::sync::Arc;
use std::time::Instant;

use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::scene::{LightConfig, Scene};
use crate::terrain::texture::blank_texture;
use crate::terrain::{TextureStrategy, UvTransform, Vertex};
use crate::ui::{Ui, UiResponse};
use crate::view::TerrainView;
pub use camera::Camera;

/// Path tube color, kept saturated so the route reads against any drape.
const PATH_COLOR: [f32; 4] = [0.85, 0.12, 0.12, 1.0];
/// Pointer marker color.
const MARKER_COLOR: [f32; 4] = [0.15, 0.45, 0.9, 1.0];

/// Per-frame uniforms shared by the terrain and overlay shaders.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Globals {
    view_proj: [[f32; 4]; 4],
    light_view_proj: [[f32; 4]; 4],
    /// xyz: direction the light travels, w: ambient strength
    light_dir: [f32; 4],
    /// rgb: light color, w: shadow depth bias
    light_color: [f32; 4],
}

impl Globals {
    fn new() -> Self {
        Self {
            view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            light_view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            light_dir: [0.0, -1.0, 0.0, 1.0],
            light_color: [1.0, 1.0, 1.0, 0.0],
        }
    }

    fn update(&mut self, view_proj: Mat4, light_view_proj: Mat4, light: &LightConfig) {
        self.view_proj = view_proj.to_cols_array_2d();
        self.light_view_proj = light_view_proj.to_cols_array_2d();
        let dir = light.direction.normalize_or_zero();
        self.light_dir = [dir.x, dir.y, dir.z, light.ambient];
        self.light_color = [
            light.color[0],
            light.color[1],
            light.color[2],
            light.shadow.bias,
        ];
    }
}

/// Per-object uniforms for the overlay shader (path tube, pointer marker).
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ObjectUniform {
    model: [[f32; 4]; 4],
    color: [f32; 4],
}

impl ObjectUniform {
    fn new(color: [f32; 4]) -> Self {
        Self {
            model: Mat4::IDENTITY.to_cols_array_2d(),
            color,
        }
    }
}

/// Light-space transform for the depth-only shadow pass.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ShadowUniform {
    light_view_proj: [[f32; 4]; 4],
}

/// Vertex and index buffers for one mesh.
struct MeshBuffers {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_indices: u32,
}

impl MeshBuffers {
    fn upload(
        device: &wgpu::Device,
        label: &str,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Option<Self> {
        if vertices.is_empty() || indices.is_empty() {
            return None;
        }
        let vertex_label = format!("{label} Vertex Buffer");
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&vertex_label),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_label = format!("{label} Index Buffer");
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&index_label),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Some(Self {
            vertex_buffer,
            index_buffer,
            num_indices: indices.len() as u32,
        })
    }

    fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        render_pass.draw_indexed(0..self.num_indices, 0, 0..1);
    }
}

/// GPU renderer managing wgpu state and rendering.
///
/// Scene content comes in through [`upload_scene`](Renderer::upload_scene);
/// per-frame camera and marker state is read from the [`TerrainView`] passed
/// to [`render`](Renderer::render).
pub struct Renderer {
    // Core wgpu objects
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,

    /// Current window size (for aspect ratio and resize handling)
    pub size: winit::dpi::PhysicalSize<u32>,

    // Depth buffer
    depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,

    // Terrain pipeline (draped texture, lambert lighting, shadow lookup)
    terrain_pipeline: wgpu::RenderPipeline,
    globals_buffer: wgpu::Buffer,
    globals_bind_group: wgpu::BindGroup,
    drape_layout: wgpu::BindGroupLayout,
    drape_bind_group: wgpu::BindGroup,
    drape_sampler: wgpu::Sampler,
    uv_buffer: wgpu::Buffer,

    // Overlay pipeline (path tube, pointer marker)
    overlay_pipeline: wgpu::RenderPipeline,
    path_uniform_buffer: wgpu::Buffer,
    path_bind_group: wgpu::BindGroup,
    marker_uniform_buffer: wgpu::Buffer,
    marker_bind_group: wgpu::BindGroup,

    // Shadow pass
    shadow_pipeline: wgpu::RenderPipeline,
    shadow_uniform_buffer: wgpu::Buffer,
    shadow_uniform_bind_group: wgpu::BindGroup,
    shadow_map_layout: wgpu::BindGroupLayout,
    shadow_map_bind_group: wgpu::BindGroup,
    shadow_sampler: wgpu::Sampler,
    shadow_view: wgpu::TextureView,
    shadow_resolution: u32,

    // Mesh buffers
    terrain: Option<MeshBuffers>,
    path: Option<MeshBuffers>,
    marker: Option<MeshBuffers>,

    // Light and shadow frustum fit, refreshed on scene upload
    light: LightConfig,
    shadow_center: Vec3,
    shadow_radius: f32,

    // egui
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,

    /// UI state
    pub ui: Ui,

    /// Frame time for FPS calculation
    last_frame: Instant,
    frame_count: u32,
    fps: f32,
}

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

fn create_depth_texture(
    device: &wgpu::Device,
    width: u32,
    height: u32,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn create_shadow_map(device: &wgpu::Device, resolution: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Shadow Map"),
        size: wgpu::Extent3d {
            width: resolution,
            height: resolution,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_drape_sampler(device: &wgpu::Device, address_mode: wgpu::AddressMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Drape Sampler"),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

/// Upload an RGBA image and bind it together with the UV transform.
///
/// `write_texture` rows must be aligned to `COPY_BYTES_PER_ROW_ALIGNMENT`
/// when the image is taller than one row, so narrow images are re-packed
/// into a padded staging buffer first.
fn create_drape_bind_group(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    uv_buffer: &wgpu::Buffer,
    image: &image::RgbaImage,
) -> wgpu::BindGroup {
    let (width, height) = image.dimensions();
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Drape Texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    let row_bytes = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded_bytes_per_row = row_bytes.div_ceil(align) * align;
    let padded;
    let data: &[u8] = if padded_bytes_per_row == row_bytes {
        image.as_raw()
    } else {
        let src = image.as_raw();
        let mut buf = vec![0u8; (padded_bytes_per_row * height) as usize];
        for y in 0..height as usize {
            let s = y * row_bytes as usize;
            let d = y * padded_bytes_per_row as usize;
            buf[d..d + row_bytes as usize].copy_from_slice(&src[s..s + row_bytes as usize]);
        }
        padded = buf;
        &padded
    };

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(padded_bytes_per_row),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: uv_buffer.as_entire_binding(),
            },
        ],
        label: Some("Drape Bind Group"),
    })
}

fn create_shadow_map_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    shadow_view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(shadow_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
        label: Some("Shadow Map Bind Group"),
    })
}

impl Renderer {
    /// Create a new renderer for the given window.
    ///
    /// # Arguments
    ///
    /// * `window` - The window to render to
    ///
    /// # Errors
    ///
    /// Returns an error if GPU initialization fails.
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let size = window.inner_size();

        // Create wgpu instance
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        // Create surface for the window
        let surface = instance.create_surface(window.clone())?;

        // Request GPU adapter
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;

        // Create device and queue
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                label: None,
                memory_hints: Default::default(),
                trace: Default::default(),
                experimental_features: Default::default(),
            })
            .await?;

        // Configure surface
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        // Init egui
        let egui_ctx = egui::Context::default();
        let egui_state = egui_winit::State::new(
            egui_ctx,
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            Some(2048),
        );
        let egui_renderer = egui_wgpu::Renderer::new(
            &device,
            surface_format,
            egui_wgpu::RendererOptions {
                depth_stencil_format: Some(DEPTH_FORMAT),
                ..Default::default()
            },
        );
        let ui = Ui::new();

        // Create depth texture
        let (depth_texture, depth_view) = create_depth_texture(&device, size.width, size.height);

        // Load shaders
        let terrain_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Terrain Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/terrain.wgsl").into()),
        });
        let overlay_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Overlay Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/overlay.wgsl").into()),
        });
        let shadow_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Shadow Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/shadow.wgsl").into()),
        });

        // Globals uniform buffer and bind group (group 0 of both lit pipelines)
        let globals = Globals::new();
        let globals_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Globals Buffer"),
            contents: bytemuck::cast_slice(&[globals]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
            label: Some("Globals Bind Group Layout"),
        });

        let globals_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &globals_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buffer.as_entire_binding(),
            }],
            label: Some("Globals Bind Group"),
        });

        // Drape texture layout (group 1 of the terrain pipeline)
        let drape_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
            label: Some("Drape Bind Group Layout"),
        });

        let uv_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("UV Transform Buffer"),
            contents: bytemuck::cast_slice(&[UvTransform::IDENTITY]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        // A 1x1 white placeholder keeps the pipeline valid until a scene
        // texture arrives.
        let drape_sampler = create_drape_sampler(&device, wgpu::AddressMode::ClampToEdge);
        let drape_bind_group = create_drape_bind_group(
            &device,
            &queue,
            &drape_layout,
            &drape_sampler,
            &uv_buffer,
            &blank_texture(),
        );

        // Shadow map (group 2 of the terrain pipeline) plus the depth-only
        // pass resources that fill it
        let shadow_resolution = LightConfig::default().shadow.resolution;
        let shadow_view = create_shadow_map(&device, shadow_resolution);
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Comparison Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        let shadow_map_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
            label: Some("Shadow Map Bind Group Layout"),
        });

        let shadow_map_bind_group = create_shadow_map_bind_group(
            &device,
            &shadow_map_layout,
            &shadow_view,
            &shadow_sampler,
        );

        let shadow_uniform = ShadowUniform {
            light_view_proj: Mat4::IDENTITY.to_cols_array_2d(),
        };
        let shadow_uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Shadow Uniform Buffer"),
            contents: bytemuck::cast_slice(&[shadow_uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let shadow_uniform_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
                label: Some("Shadow Uniform Bind Group Layout"),
            });

        let shadow_uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &shadow_uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: shadow_uniform_buffer.as_entire_binding(),
            }],
            label: Some("Shadow Uniform Bind Group"),
        });

        // Overlay object uniforms (group 1 of the overlay pipeline), one
        // buffer each for the path tube and the pointer marker
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
            label: Some("Object Bind Group Layout"),
        });

        let path_uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Path Uniform Buffer"),
            contents: bytemuck::cast_slice(&[ObjectUniform::new(PATH_COLOR)]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let path_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &object_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: path_uniform_buffer.as_entire_binding(),
            }],
            label: Some("Path Bind Group"),
        });

        let marker_uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Marker Uniform Buffer"),
            contents: bytemuck::cast_slice(&[ObjectUniform::new(MARKER_COLOR)]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let marker_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &object_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: marker_uniform_buffer.as_entire_binding(),
            }],
            label: Some("Marker Bind Group"),
        });

        // Create terrain pipeline
        let terrain_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Terrain Pipeline Layout"),
                bind_group_layouts: &[&globals_layout, &drape_layout, &shadow_map_layout],
                push_constant_ranges: &[],
            });

        let terrain_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Terrain Pipeline"),
            layout: Some(&terrain_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &terrain_shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::desc()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &terrain_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });

        // Create overlay pipeline. Culling stays off so the open tube ends
        // and the thin marker cone read correctly from every angle.
        let overlay_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Overlay Pipeline Layout"),
                bind_group_layouts: &[&globals_layout, &object_layout],
                push_constant_ranges: &[],
            });

        let overlay_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Overlay Pipeline"),
            layout: Some(&overlay_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &overlay_shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::desc()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &overlay_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });

        // Create shadow pipeline (depth only, no fragment stage)
        let shadow_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Shadow Pipeline Layout"),
                bind_group_layouts: &[&shadow_uniform_layout],
                push_constant_ranges: &[],
            });

        let shadow_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Shadow Pipeline"),
            layout: Some(&shadow_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shadow_shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::desc()],
                compilation_options: Default::default(),
            },
            fragment: None,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });

        Ok(Self {
            surface,
            device,
            queue,
            config,
            size,
            depth_texture,
            depth_view,
            terrain_pipeline,
            globals_buffer,
            globals_bind_group,
            drape_layout,
            drape_bind_group,
            drape_sampler,
            uv_buffer,
            overlay_pipeline,
            path_uniform_buffer,
            path_bind_group,
            marker_uniform_buffer,
            marker_bind_group,
            shadow_pipeline,
            shadow_uniform_buffer,
            shadow_uniform_bind_group,
            shadow_map_layout,
            shadow_map_bind_group,
            shadow_sampler,
            shadow_view,
            shadow_resolution,
            terrain: None,
            path: None,
            marker: None,
            light: LightConfig::default(),
            shadow_center: Vec3::ZERO,
            shadow_radius: 1.0,
            egui_state,
            egui_renderer,
            ui,
            last_frame: Instant::now(),
            frame_count: 0,
            fps: 0.0,
        })
    }

    /// Handle window event
    pub fn handle_window_event(
        &mut self,
        window: &Window,
        event: &winit::event::WindowEvent,
    ) -> bool {
        self.egui_state.on_window_event(window, event).consumed
    }

    /// Handle window resize.
    ///
    /// Reconfigures the surface and depth buffer for the new size.
    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);

            // Recreate depth texture for new size
            let (depth_texture, depth_view) =
                create_depth_texture(&self.device, new_size.width, new_size.height);
            self.depth_texture = depth_texture;
            self.depth_view = depth_view;
        }
    }

    /// Upload a freshly built scene to the GPU.
    ///
    /// Replaces all mesh buffers, rebinds the drape texture (the procedural
    /// image when present, a white placeholder while an image file is still
    /// loading) and refits the shadow frustum around the new grid.
    pub fn upload_scene(&mut self, scene: &Scene) {
        self.terrain = MeshBuffers::upload(
            &self.device,
            "Terrain",
            &scene.terrain.vertices,
            &scene.terrain.indices,
        );
        self.path = scene.path.as_ref().and_then(|path| {
            MeshBuffers::upload(&self.device, "Path", &path.vertices, &path.indices)
        });
        self.marker = MeshBuffers::upload(
            &self.device,
            "Marker",
            &scene.marker.vertices,
            &scene.marker.indices,
        );

        // Path vertices are in world space; its model stays identity
        self.queue.write_buffer(
            &self.path_uniform_buffer,
            0,
            bytemuck::cast_slice(&[ObjectUniform::new(PATH_COLOR)]),
        );

        // Aligned drapes tile past [0,1]; everything else clamps
        let address_mode = match scene.texture {
            TextureStrategy::Aligned { .. } => wgpu::AddressMode::Repeat,
            _ => wgpu::AddressMode::ClampToEdge,
        };
        self.drape_sampler = create_drape_sampler(&self.device, address_mode);
        self.queue.write_buffer(
            &self.uv_buffer,
            0,
            bytemuck::cast_slice(&[scene.texture.uv_transform()]),
        );

        let blank = blank_texture();
        let image = scene.texture_image.as_ref().unwrap_or(&blank);
        self.upload_drape(image);

        // Fit the shadow frustum to the bounding sphere of the displaced grid
        let (height_min, height_max) = scene.grid.height_bounds();
        let extent = Vec3::new(
            scene.grid.long_dist,
            height_max - height_min,
            scene.grid.lat_dist,
        );
        self.shadow_center = Vec3::new(0.0, (height_min + height_max) * 0.5, 0.0);
        self.shadow_radius = (extent.length() * 0.5).max(1.0);
        self.light = scene.light;

        if scene.light.shadow.resolution != self.shadow_resolution {
            self.shadow_resolution = scene.light.shadow.resolution;
            self.shadow_view = create_shadow_map(&self.device, self.shadow_resolution);
            self.shadow_map_bind_group = create_shadow_map_bind_group(
                &self.device,
                &self.shadow_map_layout,
                &self.shadow_view,
                &self.shadow_sampler,
            );
        }
    }

    /// Replace the drape texture, keeping sampler and UV transform.
    ///
    /// Called when an asynchronously loaded image arrives.
    pub fn upload_drape(&mut self, image: &image::RgbaImage) {
        self.drape_bind_group = create_drape_bind_group(
            &self.device,
            &self.queue,
            &self.drape_layout,
            &self.drape_sampler,
            &self.uv_buffer,
            image,
        );
    }

    /// Orthographic light frustum covering the scene's bounding sphere.
    fn light_view_projection(&self) -> Mat4 {
        let dir = self.light.direction.normalize_or_zero();
        let up = if dir.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
        let eye = self.shadow_center - dir * self.shadow_radius * 2.0;
        let view = Mat4::look_at_rh(eye, self.shadow_center, up);
        let half = self.shadow_radius * self.light.shadow.margin;
        let proj = Mat4::orthographic_rh(-half, half, -half, half, 0.1, self.shadow_radius * 4.0);
        proj * view
    }

    /// Render a frame.
    ///
    /// Fills the shadow map, draws the scene from `view`'s camera and lays
    /// the egui overlay on top. Returns the UI's requests to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`wgpu::SurfaceError`] if surface acquisition fails.
    pub fn render(
        &mut self,
        view: &mut TerrainView,
        window: &Window,
    ) -> Result<UiResponse, wgpu::SurfaceError> {
        // Update FPS counter
        self.frame_count += 1;
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_frame).as_secs_f32();
        if elapsed >= 1.0 {
            self.fps = self.frame_count as f32 / elapsed;
            self.frame_count = 0;
            self.last_frame = now;
        }

        let output = self.surface.get_current_texture()?;
        let surface_view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        // Update uniforms
        let light_view_proj = self.light_view_projection();

        let mut globals = Globals::new();
        globals.update(view.view_projection(), light_view_proj, &self.light);
        self.queue
            .write_buffer(&self.globals_buffer, 0, bytemuck::cast_slice(&[globals]));

        let shadow_uniform = ShadowUniform {
            light_view_proj: light_view_proj.to_cols_array_2d(),
        };
        self.queue.write_buffer(
            &self.shadow_uniform_buffer,
            0,
            bytemuck::cast_slice(&[shadow_uniform]),
        );

        let marker_uniform = ObjectUniform {
            model: view.marker_transform().to_cols_array_2d(),
            color: MARKER_COLOR,
        };
        self.queue.write_buffer(
            &self.marker_uniform_buffer,
            0,
            bytemuck::cast_slice(&[marker_uniform]),
        );

        // Begin egui frame
        let raw_input = self.egui_state.take_egui_input(window);
        let egui_ctx = self.egui_state.egui_ctx().clone();
        let mut ui_response = UiResponse::default();
        let full_output = egui_ctx.run(raw_input, |ctx| {
            ui_response = self.ui.render(ctx, view, self.fps);
        });
        if ui_response.reset_view {
            view.camera = *view.home();
        }

        // Handle egui platform output (cursor changes, etc.)
        self.egui_state
            .handle_platform_output(window, full_output.platform_output);

        // Prepare egui for rendering
        let paint_jobs = egui_ctx.tessellate(full_output.shapes, full_output.pixels_per_point);
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.size.width, self.size.height],
            pixels_per_point: full_output.pixels_per_point,
        };

        // Update egui textures
        for (id, image_delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(&self.device, &self.queue, *id, image_delta);
        }

        // Create command encoder
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        // Upload egui buffers
        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );

        // Shadow pass: terrain and path from the light's point of view.
        // The marker tracks the pointer and casts no shadow.
        {
            let mut shadow_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Shadow Pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.shadow_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            shadow_pass.set_pipeline(&self.shadow_pipeline);
            shadow_pass.set_bind_group(0, &self.shadow_uniform_bind_group, &[]);
            if let Some(terrain) = &self.terrain {
                terrain.draw(&mut shadow_pass);
            }
            if let Some(path) = &self.path {
                path.draw(&mut shadow_pass);
            }
        }

        // Main pass
        {
            let render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &surface_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            // Convert to 'static lifetime for egui compatibility
            let mut render_pass = render_pass.forget_lifetime();

            if let Some(terrain) = &self.terrain {
                render_pass.set_pipeline(&self.terrain_pipeline);
                render_pass.set_bind_group(0, &self.globals_bind_group, &[]);
                render_pass.set_bind_group(1, &self.drape_bind_group, &[]);
                render_pass.set_bind_group(2, &self.shadow_map_bind_group, &[]);
                terrain.draw(&mut render_pass);
            }

            if self.path.is_some() || self.marker.is_some() {
                render_pass.set_pipeline(&self.overlay_pipeline);
                render_pass.set_bind_group(0, &self.globals_bind_group, &[]);
                if let Some(path) = &self.path {
                    render_pass.set_bind_group(1, &self.path_bind_group, &[]);
                    path.draw(&mut render_pass);
                }
                if let Some(marker) = &self.marker {
                    render_pass.set_bind_group(1, &self.marker_bind_group, &[]);
                    marker.draw(&mut render_pass);
                }
            }

            // Render egui UI
            self.egui_renderer
                .render(&mut render_pass, &paint_jobs, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }

        // Submit commands and present
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(ui_response)
    }
}
