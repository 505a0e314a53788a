//! Top-level renderer.
//!
//! Owns every GPU resource and drives the per-frame loop:
//!
//! - `update`: advance the frame ring (waiting on the timeline fence if
//!   the GPU is a full ring behind), animate lights, refit the shadow
//!   frustum, propagate dirty object/material constants into the current
//!   frame resource, and write both pass-constant slots plus the SSAO
//!   constants.
//! - `draw`: record the fixed pass sequence with its layout transitions,
//!   submit with a timeline signal, present, and stamp the frame
//!   resource's fence value.
//!
//! Fields are declared in reverse dependency order: every GPU resource
//! holds an `Arc<Device>`, so dropping top-to-bottom releases resources,
//! then the device, then the surface, then the instance.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3, Vec4};
use tracing::{debug, info, warn};

use drake_platform::{InputState, KeyCode, MouseButton, Surface, Window};
use drake_resources::{ResourceError, geometry, skull};
use drake_rhi::command::CommandPool;
use drake_rhi::descriptor::{
    CpuDescriptor, DescriptorPool, DescriptorSetLayout, GpuDescriptor, TextureTable,
};
use drake_rhi::device::Device;
use drake_rhi::image::{Image, ImageDesc, cmd_transition_image};
use drake_rhi::instance::Instance;
use drake_rhi::physical_device::select_physical_device;
use drake_rhi::pipeline::{CompareOp, CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use drake_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingBundle};
use drake_rhi::sampler::SamplerSet;
use drake_rhi::shader::{Shader, ShaderStage};
use drake_rhi::swapchain::Swapchain;
use drake_rhi::sync::{Semaphore, TimelineFence};
use drake_rhi::vertex::Vertex;
use drake_rhi::vk;
use drake_rhi::{RhiError, RhiResult};
use drake_scene::{Camera, LightRig};

use crate::constants::{PassConstants, SsaoConstants, ndc_to_texture};
use crate::depth_buffer::{DEPTH_FORMAT, DepthBuffer};
use crate::frame::{FrameRing, FrameResource};
use crate::graph::{PassGraph, PassId};
use crate::items::{
    Material, RenderItem, RenderLayer, update_material_buffer, update_object_constants,
};
use crate::mesh::MeshBuffer;
use crate::shadow::{ShadowMap, ShadowTransform, fit_to_scene};
use crate::ssao::{
    BlurDirection, Ssao, build_random_vectors, gauss_weights, pack_blur_weights,
};
use crate::targets::OffscreenTarget;
use crate::ui::{RenderControl, RenderSettings, UiTextureAllocator, ViewportSubmissions};
use crate::{MAX_SRV_SLOTS, NUM_FRAME_RESOURCES};

/// Blur iterations per frame (each runs horizontal + vertical).
const SSAO_BLUR_COUNT: u32 = 3;

/// Sigma of the ambient-map blur.
const SSAO_BLUR_SIGMA: f32 = 2.5;

/// Side length of the SSAO random-vector texture.
const RANDOM_VECTOR_MAP_SIZE: u32 = 256;

/// Scene ambient term.
const AMBIENT_LIGHT: Vec4 = Vec4::new(0.4, 0.4, 0.6, 1.0);

/// Static descriptor sets that outlive any single frame.
struct StaticSets {
    /// Environment set for lit passes: sky cube, shadow map, ambient map.
    env: vk::DescriptorSet,
    /// Placeholder-backed variant bound while the shadow pass renders
    /// into the shadow map itself.
    null_env: vk::DescriptorSet,
    /// SSAO inputs: normal map + scene depth.
    ssao_maps: vk::DescriptorSet,
    /// Kernel-rotation random vectors (SSAO pass input).
    ssao_input_random: vk::DescriptorSet,
    /// Ambient map 0 as blur input.
    ssao_input_ambient0: vk::DescriptorSet,
    /// Ambient map 1 as blur input.
    ssao_input_ambient1: vk::DescriptorSet,
}

/// Generated stand-ins for the texture assets that are out of scope.
struct PlaceholderTextures {
    /// Six 1x1 material maps (diffuse/normal pairs), table slots 0..6.
    materials: Vec<Image>,
    /// 1x1 sky cube.
    sky_cube: Image,
    /// 1x1 cube bound in the null environment set.
    null_cube: Image,
    /// 1x1 depth image bound as the null shadow map.
    null_depth: Image,
}

pub struct Renderer {
    // Scene state (no GPU resources).
    camera: Camera,
    lights: LightRig,
    scene_center: Vec3,
    scene_radius: f32,
    shadow_transform: ShadowTransform,
    items: Vec<RenderItem>,
    layers: [Vec<usize>; 3],
    materials: Vec<Material>,
    graph: PassGraph,
    viewports: ViewportSubmissions,
    settings: RenderSettings,
    render_to_offscreen: bool,
    draw_debug_layer: bool,
    frame_count: u64,
    width: u32,
    height: u32,
    framebuffer_resized: bool,
    sky_cube_slot: u32,
    null_cube_slot: u32,
    null_tex_slot: u32,
    static_sets: StaticSets,

    // GPU resources, dropped before the device below.
    ring: FrameRing,
    acquire_semaphores: Vec<Semaphore>,
    render_finished_semaphores: Vec<Semaphore>,
    timeline: TimelineFence,
    meshes: HashMap<&'static str, MeshBuffer>,
    placeholders: PlaceholderTextures,
    random_vector_map: Image,
    shadow_map: ShadowMap,
    ssao: Ssao,
    offscreen: OffscreenTarget,
    depth_buffer: DepthBuffer,
    pipelines: HashMap<&'static str, Pipeline>,
    scene_pipeline_layout: PipelineLayout,
    ssao_pipeline_layout: PipelineLayout,
    scene_set_layout: DescriptorSetLayout,
    env_set_layout: DescriptorSetLayout,
    ssao_frame_set_layout: DescriptorSetLayout,
    ssao_maps_set_layout: DescriptorSetLayout,
    ssao_input_set_layout: DescriptorSetLayout,
    descriptor_pool: DescriptorPool,
    textures: TextureTable,
    samplers: SamplerSet,
    swapchain: Swapchain,

    // Dropped after everything above has released its Arc.
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,
}

impl Renderer {
    /// Creates the renderer and builds the whole demo scene.
    pub fn new(window: &Window) -> RhiResult<Self> {
        let width = window.width();
        let height = window.height();

        info!("Initializing renderer ({}x{})", width, height);

        let enable_validation = cfg!(debug_assertions);
        let instance = Instance::new(enable_validation)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::Surface(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device_info)?;

        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.loader(),
            surface.handle(),
            width,
            height,
        )?;

        let samplers = SamplerSet::new(device.clone())?;
        let mut textures = TextureTable::new(device.clone(), MAX_SRV_SLOTS)?;

        let graphics_family = device.queue_families().graphics_family.unwrap();
        let upload_pool = CommandPool::new_transient(device.clone(), graphics_family)?;

        // Slot order mirrors the scene build: material maps first so the
        // material definitions can use fixed indices 0..5.
        let placeholders = Self::build_placeholder_textures(&device, &upload_pool, &mut textures, &samplers)?;
        let sky_cube_slot = textures.allocator_mut().alloc();
        // The table's array binding is 2D; cube views live in the
        // environment set, so the reserved cube slot is backed by a 2D
        // placeholder to keep the array fully defined.
        textures.write_srv(
            sky_cube_slot,
            placeholders.materials[4].view(),
            samplers.linear_wrap,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );

        let shadow_map = ShadowMap::new(device.clone(), &mut textures, samplers.shadow_compare)?;
        let ssao = Ssao::new(
            device.clone(),
            &mut textures,
            samplers.linear_clamp,
            width,
            height,
        )?;
        let depth_buffer = DepthBuffer::new(
            device.clone(),
            &mut textures,
            samplers.depth_border,
            width,
            height,
        )?;

        // Reserved null slots: one cube, two 2D.
        let null_cube_slot = textures.allocator_mut().alloc();
        let null_tex_slot = textures.allocator_mut().alloc_contiguous(2);
        for slot in [null_cube_slot, null_tex_slot, null_tex_slot + 1] {
            textures.write_srv(
                slot,
                placeholders.materials[4].view(),
                samplers.linear_wrap,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        }

        let offscreen = OffscreenTarget::new(
            device.clone(),
            &mut textures,
            samplers.linear_clamp,
            swapchain.format(),
            width,
            height,
        )?;

        let random_vector_map = Image::from_pixels(
            device.clone(),
            &upload_pool,
            &ImageDesc::texture(
                RANDOM_VECTOR_MAP_SIZE,
                RANDOM_VECTOR_MAP_SIZE,
                vk::Format::R8G8B8A8_UNORM,
            ),
            &build_random_vectors(RANDOM_VECTOR_MAP_SIZE),
        )?;

        Self::prime_target_layouts(
            &device,
            &upload_pool,
            &shadow_map,
            &ssao,
            &depth_buffer,
            &offscreen,
            &placeholders.null_depth,
        )?;

        // Descriptor set layouts and pipeline layouts.
        let scene_set_layout = Self::build_scene_set_layout(&device)?;
        let env_set_layout = Self::build_sampled_set_layout(&device, 3)?;
        let ssao_frame_set_layout = Self::build_ssao_frame_set_layout(&device)?;
        let ssao_maps_set_layout = Self::build_sampled_set_layout(&device, 2)?;
        let ssao_input_set_layout = Self::build_sampled_set_layout(&device, 1)?;

        let scene_pipeline_layout = PipelineLayout::new(
            device.clone(),
            &[
                scene_set_layout.handle(),
                textures.set_layout(),
                env_set_layout.handle(),
            ],
            &[],
        )?;
        let ssao_pipeline_layout = PipelineLayout::new(
            device.clone(),
            &[
                ssao_frame_set_layout.handle(),
                ssao_maps_set_layout.handle(),
                ssao_input_set_layout.handle(),
            ],
            &[vk::PushConstantRange::default()
                .stage_flags(vk::ShaderStageFlags::FRAGMENT)
                .offset(0)
                .size(std::mem::size_of::<u32>() as u32)],
        )?;

        // Pool for the per-frame sets plus the static sets.
        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                .descriptor_count(2 * NUM_FRAME_RESOURCES as u32),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(NUM_FRAME_RESOURCES as u32),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(NUM_FRAME_RESOURCES as u32),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(16),
        ];
        let descriptor_pool = DescriptorPool::new(
            device.clone(),
            2 * NUM_FRAME_RESOURCES as u32 + 8,
            &pool_sizes,
        )?;

        let static_sets = Self::allocate_static_sets(
            &descriptor_pool,
            &env_set_layout,
            &ssao_maps_set_layout,
            &ssao_input_set_layout,
        )?;

        let pipelines = Self::build_pipelines(
            &device,
            &scene_pipeline_layout,
            &ssao_pipeline_layout,
            swapchain.format(),
        )?;

        // Scene content.
        let meshes = Self::build_geometry(&device)?;
        let materials = Self::build_materials(sky_cube_slot);
        let (items, layers) = Self::build_render_items(&meshes);

        let ring = FrameRing::new(
            (0..NUM_FRAME_RESOURCES)
                .map(|_| {
                    FrameResource::new(
                        device.clone(),
                        &descriptor_pool,
                        scene_set_layout.handle(),
                        ssao_frame_set_layout.handle(),
                        items.len() as u32,
                        materials.len() as u32,
                    )
                })
                .collect::<RhiResult<Vec<_>>>()?,
        );

        let timeline = TimelineFence::new(device.clone())?;
        let acquire_semaphores = (0..NUM_FRAME_RESOURCES)
            .map(|_| Semaphore::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;
        let render_finished_semaphores = (0..swapchain.image_count())
            .map(|_| Semaphore::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;

        let mut camera = Camera::new();
        camera.position = Vec3::new(0.0, 2.0, -15.0);
        camera.set_lens(
            0.25 * std::f32::consts::PI,
            width as f32 / height as f32,
            1.0,
            1000.0,
        );

        // The grid is the widest object: 20 x 30, centered at the origin.
        let scene_center = Vec3::ZERO;
        let scene_radius = (10.0f32 * 10.0 + 15.0 * 15.0).sqrt();

        let lights = LightRig::new();
        let shadow_transform = fit_to_scene(lights.key_light_direction(), scene_center, scene_radius);

        let mut renderer = Self {
            camera,
            lights,
            scene_center,
            scene_radius,
            shadow_transform,
            items,
            layers,
            materials,
            graph: PassGraph::new(),
            viewports: ViewportSubmissions::new(),
            settings: RenderSettings::default(),
            render_to_offscreen: false,
            draw_debug_layer: false,
            frame_count: 0,
            width,
            height,
            framebuffer_resized: false,
            sky_cube_slot,
            null_cube_slot,
            null_tex_slot,
            static_sets,
            ring,
            acquire_semaphores,
            render_finished_semaphores,
            timeline,
            meshes,
            placeholders,
            random_vector_map,
            shadow_map,
            ssao,
            offscreen,
            depth_buffer,
            pipelines,
            scene_pipeline_layout,
            ssao_pipeline_layout,
            scene_set_layout,
            env_set_layout,
            ssao_frame_set_layout,
            ssao_maps_set_layout,
            ssao_input_set_layout,
            descriptor_pool,
            textures,
            samplers,
            swapchain,
            device,
            surface,
            instance,
        };
        renderer.rewrite_pass_input_sets();

        info!(
            "Renderer initialized: {} render items, {} materials, {} frame resources",
            renderer.items.len(),
            renderer.materials.len(),
            NUM_FRAME_RESOURCES
        );

        Ok(renderer)
    }

    // ------------------------------------------------------------------
    // Startup builders
    // ------------------------------------------------------------------

    fn build_placeholder_textures(
        device: &Arc<Device>,
        pool: &CommandPool,
        table: &mut TextureTable,
        samplers: &SamplerSet,
    ) -> RhiResult<PlaceholderTextures> {
        // Diffuse/normal pairs for bricks, tile, and the default white
        // material. Flat normal maps encode +Z.
        let pixels: [[u8; 4]; 6] = [
            [150, 60, 50, 255],   // bricks diffuse
            [128, 128, 255, 255], // bricks normal
            [200, 200, 200, 255], // tile diffuse
            [128, 128, 255, 255], // tile normal
            [255, 255, 255, 255], // default diffuse
            [128, 128, 255, 255], // default normal
        ];

        let mut materials = Vec::with_capacity(pixels.len());
        for rgba in pixels {
            let image = Image::from_pixels(
                device.clone(),
                pool,
                &ImageDesc::texture(1, 1, vk::Format::R8G8B8A8_UNORM),
                &rgba,
            )?;
            table.create_srv(
                image.view(),
                samplers.anisotropic_wrap,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
            materials.push(image);
        }

        let sky_pixel: [u8; 4] = [120, 160, 220, 255];
        let sky_faces: Vec<u8> = sky_pixel.repeat(6);
        let sky_cube = Image::from_pixels(
            device.clone(),
            pool,
            &ImageDesc::cube_texture(1, vk::Format::R8G8B8A8_UNORM),
            &sky_faces,
        )?;

        let null_faces: Vec<u8> = [0u8, 0, 0, 255].repeat(6);
        let null_cube = Image::from_pixels(
            device.clone(),
            pool,
            &ImageDesc::cube_texture(1, vk::Format::R8G8B8A8_UNORM),
            &null_faces,
        )?;

        // The shadow slot of the null environment set needs a depth-format
        // image for its comparison sampler; contents never matter.
        let null_depth = Image::new(device.clone(), &ImageDesc::depth_target(1, 1, DEPTH_FORMAT))?;

        debug!("Placeholder textures created");

        Ok(PlaceholderTextures {
            materials,
            sky_cube,
            null_cube,
            null_depth,
        })
    }

    /// Moves every render/depth target into SHADER_READ_ONLY once, so the
    /// steady-state pass transitions are uniform from frame one.
    fn prime_target_layouts(
        device: &Arc<Device>,
        pool: &CommandPool,
        shadow_map: &ShadowMap,
        ssao: &Ssao,
        depth_buffer: &DepthBuffer,
        offscreen: &OffscreenTarget,
        null_depth: &Image,
    ) -> RhiResult<()> {
        drake_rhi::command::submit_once(device, pool, |cmd| {
            for (image, aspect) in [
                (shadow_map.image(), vk::ImageAspectFlags::DEPTH),
                (depth_buffer.image(), vk::ImageAspectFlags::DEPTH),
                (null_depth, vk::ImageAspectFlags::DEPTH),
                (ssao.normal_map(), vk::ImageAspectFlags::COLOR),
                (ssao.ambient_map(0), vk::ImageAspectFlags::COLOR),
                (ssao.ambient_map(1), vk::ImageAspectFlags::COLOR),
                (offscreen.image(), vk::ImageAspectFlags::COLOR),
            ] {
                cmd_transition_image(
                    cmd.handle(),
                    device,
                    image.handle(),
                    aspect,
                    1,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                );
            }
            Ok(())
        })
    }

    fn build_scene_set_layout(device: &Arc<Device>) -> RhiResult<DescriptorSetLayout> {
        let bindings = [
            // Pass constants: element selected per pass via dynamic offset.
            vk::DescriptorSetLayoutBinding::default()
                .binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT),
            // Object constants: element selected per draw.
            vk::DescriptorSetLayoutBinding::default()
                .binding(1)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::VERTEX),
            // Material table.
            vk::DescriptorSetLayoutBinding::default()
                .binding(2)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT),
        ];
        DescriptorSetLayout::new(device.clone(), &bindings)
    }

    fn build_ssao_frame_set_layout(device: &Arc<Device>) -> RhiResult<DescriptorSetLayout> {
        let bindings = [vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)];
        DescriptorSetLayout::new(device.clone(), &bindings)
    }

    /// A set of `count` fragment-visible combined image samplers at
    /// bindings `0..count`.
    fn build_sampled_set_layout(
        device: &Arc<Device>,
        count: u32,
    ) -> RhiResult<DescriptorSetLayout> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = (0..count)
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            })
            .collect();
        DescriptorSetLayout::new(device.clone(), &bindings)
    }

    fn allocate_static_sets(
        pool: &DescriptorPool,
        env_layout: &DescriptorSetLayout,
        maps_layout: &DescriptorSetLayout,
        input_layout: &DescriptorSetLayout,
    ) -> RhiResult<StaticSets> {
        let sets = pool.allocate(&[
            env_layout.handle(),
            env_layout.handle(),
            maps_layout.handle(),
            input_layout.handle(),
            input_layout.handle(),
            input_layout.handle(),
        ])?;
        Ok(StaticSets {
            env: sets[0],
            null_env: sets[1],
            ssao_maps: sets[2],
            ssao_input_random: sets[3],
            ssao_input_ambient0: sets[4],
            ssao_input_ambient1: sets[5],
        })
    }

    fn build_pipelines(
        device: &Arc<Device>,
        scene_layout: &PipelineLayout,
        ssao_layout: &PipelineLayout,
        color_format: vk::Format,
    ) -> RhiResult<HashMap<&'static str, Pipeline>> {
        let shader_dir = Path::new("shaders/spirv");
        let load = |name: &str, stage: ShaderStage| {
            Shader::from_spirv_file(device.clone(), &shader_dir.join(name), stage, "main")
        };

        let default_vs = load("default.vert.spv", ShaderStage::Vertex)?;
        let default_fs = load("default.frag.spv", ShaderStage::Fragment)?;
        let shadow_vs = load("shadow.vert.spv", ShaderStage::Vertex)?;
        let shadow_fs = load("shadow.frag.spv", ShaderStage::Fragment)?;
        let normals_vs = load("normals.vert.spv", ShaderStage::Vertex)?;
        let normals_fs = load("normals.frag.spv", ShaderStage::Fragment)?;
        let ssao_vs = load("ssao.vert.spv", ShaderStage::Vertex)?;
        let ssao_fs = load("ssao.frag.spv", ShaderStage::Fragment)?;
        let blur_vs = load("ssao_blur.vert.spv", ShaderStage::Vertex)?;
        let blur_fs = load("ssao_blur.frag.spv", ShaderStage::Fragment)?;
        let sky_vs = load("sky.vert.spv", ShaderStage::Vertex)?;
        let sky_fs = load("sky.frag.spv", ShaderStage::Fragment)?;
        let debug_vs = load("debug.vert.spv", ShaderStage::Vertex)?;
        let debug_fs = load("debug.frag.spv", ShaderStage::Fragment)?;

        let mut pipelines = HashMap::new();

        // The main pass draws over depth pre-laid by the normals pass, so
        // opaque geometry tests EQUAL with writes off.
        pipelines.insert(
            "opaque",
            GraphicsPipelineBuilder::new()
                .vertex_shader(&default_vs)
                .fragment_shader(&default_fs)
                .vertex_input(
                    Vertex::binding_description(),
                    &Vertex::attribute_descriptions(),
                )
                .depth_compare(CompareOp::Equal)
                .depth_write(false)
                .color_format(color_format)
                .depth_format(DEPTH_FORMAT)
                .build(device.clone(), scene_layout)?,
        );

        // Depth-only, biased to push acne under the comparison test.
        pipelines.insert(
            "shadow",
            GraphicsPipelineBuilder::new()
                .vertex_shader(&shadow_vs)
                .fragment_shader(&shadow_fs)
                .vertex_input(
                    Vertex::binding_description(),
                    &Vertex::attribute_descriptions(),
                )
                .depth_bias(4.0, 0.0, 1.5)
                .depth_format(DEPTH_FORMAT)
                .build(device.clone(), scene_layout)?,
        );

        pipelines.insert(
            "normals",
            GraphicsPipelineBuilder::new()
                .vertex_shader(&normals_vs)
                .fragment_shader(&normals_fs)
                .vertex_input(
                    Vertex::binding_description(),
                    &Vertex::attribute_descriptions(),
                )
                .color_format(crate::ssao::NORMAL_MAP_FORMAT)
                .depth_format(DEPTH_FORMAT)
                .build(device.clone(), scene_layout)?,
        );

        // The camera sits inside the sky sphere; LESS_EQUAL lets the far
        // plane pass against cleared depth.
        pipelines.insert(
            "sky",
            GraphicsPipelineBuilder::new()
                .vertex_shader(&sky_vs)
                .fragment_shader(&sky_fs)
                .vertex_input(
                    Vertex::binding_description(),
                    &Vertex::attribute_descriptions(),
                )
                .cull_mode(CullMode::None)
                .depth_compare(CompareOp::LessEqual)
                .color_format(color_format)
                .depth_format(DEPTH_FORMAT)
                .build(device.clone(), scene_layout)?,
        );

        pipelines.insert(
            "debug",
            GraphicsPipelineBuilder::new()
                .vertex_shader(&debug_vs)
                .fragment_shader(&debug_fs)
                .vertex_input(
                    Vertex::binding_description(),
                    &Vertex::attribute_descriptions(),
                )
                .depth_compare(CompareOp::LessEqual)
                .depth_write(false)
                .color_format(color_format)
                .depth_format(DEPTH_FORMAT)
                .build(device.clone(), scene_layout)?,
        );

        // Full-screen passes: no vertex input, no depth.
        pipelines.insert(
            "ssao",
            GraphicsPipelineBuilder::new()
                .vertex_shader(&ssao_vs)
                .fragment_shader(&ssao_fs)
                .cull_mode(CullMode::None)
                .depth_test(false)
                .depth_write(false)
                .color_format(crate::ssao::AMBIENT_MAP_FORMAT)
                .build(device.clone(), ssao_layout)?,
        );
        pipelines.insert(
            "ssao_blur",
            GraphicsPipelineBuilder::new()
                .vertex_shader(&blur_vs)
                .fragment_shader(&blur_fs)
                .cull_mode(CullMode::None)
                .depth_test(false)
                .depth_write(false)
                .color_format(crate::ssao::AMBIENT_MAP_FORMAT)
                .build(device.clone(), ssao_layout)?,
        );

        info!("Built {} pipelines", pipelines.len());
        Ok(pipelines)
    }

    fn build_geometry(device: &Arc<Device>) -> RhiResult<HashMap<&'static str, MeshBuffer>> {
        let box_mesh = geometry::create_box(1.0, 1.0, 1.0);
        let grid = geometry::create_grid(20.0, 30.0, 60, 40);
        let sphere = geometry::create_sphere(0.5, 20, 20);
        let cylinder = geometry::create_cylinder(0.5, 0.3, 3.0, 20, 20);
        let quad = geometry::create_quad(0.0, 0.0, 1.0, 1.0, 0.0);

        let mut meshes = HashMap::new();
        meshes.insert(
            "shapes",
            MeshBuffer::build(
                device.clone(),
                &[
                    ("box", &box_mesh),
                    ("grid", &grid),
                    ("sphere", &sphere),
                    ("cylinder", &cylinder),
                    ("quad", &quad),
                ],
            )?,
        );

        match skull::load(Path::new("assets/models/skull.txt")) {
            Ok(mesh) => {
                meshes.insert("skull", MeshBuffer::build(device.clone(), &[("skull", &mesh)])?);
            }
            Err(ResourceError::FileNotFound(path)) => {
                warn!("Skull model missing at {}; skipping", path.display());
            }
            Err(e) => return Err(RhiError::InvalidHandle(e.to_string())),
        }

        Ok(meshes)
    }

    fn build_materials(sky_cube_slot: u32) -> Vec<Material> {
        vec![
            Material::new(
                "bricks",
                0,
                0,
                1,
                Vec4::ONE,
                Vec3::splat(0.1),
                0.3,
            ),
            Material::new(
                "tile",
                1,
                2,
                3,
                Vec4::new(0.9, 0.9, 0.9, 1.0),
                Vec3::splat(0.2),
                0.1,
            ),
            Material::new(
                "mirror",
                2,
                4,
                5,
                Vec4::new(0.0, 0.0, 0.0, 1.0),
                Vec3::new(0.98, 0.97, 0.95),
                0.1,
            ),
            Material::new(
                "skull",
                3,
                4,
                5,
                Vec4::new(0.3, 0.3, 0.3, 1.0),
                Vec3::splat(0.6),
                0.2,
            ),
            Material::new(
                "sky",
                4,
                sky_cube_slot,
                sky_cube_slot,
                Vec4::ONE,
                Vec3::splat(0.1),
                1.0,
            ),
        ]
    }

    fn build_render_items(
        meshes: &HashMap<&'static str, MeshBuffer>,
    ) -> (Vec<RenderItem>, [Vec<usize>; 3]) {
        let mut items: Vec<RenderItem> = Vec::new();
        let mut layers: [Vec<usize>; 3] = Default::default();

        let mut push = |items: &mut Vec<RenderItem>,
                        layers: &mut [Vec<usize>; 3],
                        layer: RenderLayer,
                        mut item: RenderItem| {
            item.object_index = items.len() as u32;
            layers[layer.index()].push(items.len());
            items.push(item);
        };

        // Sky sphere, scaled out past everything.
        let mut sky = RenderItem::new(0, 4, "shapes", "sphere");
        sky.world = Mat4::from_scale(Vec3::splat(5000.0));
        push(&mut items, &mut layers, RenderLayer::Sky, sky);

        // Shadow-map debug quad: populated but only drawn when the debug
        // layer toggle is on.
        let quad = RenderItem::new(0, 0, "shapes", "quad");
        push(&mut items, &mut layers, RenderLayer::Debug, quad);

        let mut box_item = RenderItem::new(0, 0, "shapes", "box");
        box_item.world =
            Mat4::from_translation(Vec3::new(0.0, 0.5, 0.0)) * Mat4::from_scale(Vec3::new(2.0, 1.0, 2.0));
        box_item.tex_transform = Mat4::from_scale(Vec3::new(1.0, 0.5, 1.0));
        push(&mut items, &mut layers, RenderLayer::Opaque, box_item);

        if meshes.contains_key("skull") {
            let mut skull_item = RenderItem::new(0, 3, "skull", "skull");
            skull_item.world = Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0))
                * Mat4::from_scale(Vec3::splat(0.4));
            push(&mut items, &mut layers, RenderLayer::Opaque, skull_item);
        }

        let mut grid = RenderItem::new(0, 1, "shapes", "grid");
        grid.tex_transform = Mat4::from_scale(Vec3::new(8.0, 8.0, 1.0));
        push(&mut items, &mut layers, RenderLayer::Opaque, grid);

        // Five column pairs with mirror spheres on top.
        let brick_tex = Mat4::from_scale(Vec3::new(1.5, 2.0, 1.0));
        for i in 0..5 {
            let z = -10.0 + i as f32 * 5.0;
            for x in [-5.0f32, 5.0] {
                let mut cylinder = RenderItem::new(0, 0, "shapes", "cylinder");
                cylinder.world = Mat4::from_translation(Vec3::new(x, 1.5, z));
                cylinder.tex_transform = brick_tex;
                push(&mut items, &mut layers, RenderLayer::Opaque, cylinder);

                let mut sphere = RenderItem::new(0, 2, "shapes", "sphere");
                sphere.world = Mat4::from_translation(Vec3::new(x, 3.5, z));
                push(&mut items, &mut layers, RenderLayer::Opaque, sphere);
            }
        }

        (items, layers)
    }

    /// Writes the static descriptor sets whose image views change on
    /// resize (environment set, SSAO input sets).
    fn rewrite_pass_input_sets(&mut self) {
        let write_image = |set: vk::DescriptorSet,
                           binding: u32,
                           view: vk::ImageView,
                           sampler: vk::Sampler| {
            let image_info = [vk::DescriptorImageInfo::default()
                .sampler(sampler)
                .image_view(view)
                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];
            let write = vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(binding)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(&image_info);
            unsafe {
                self.device.handle().update_descriptor_sets(&[write], &[]);
            }
        };

        let sets = &self.static_sets;
        // Environment set: sky cube, shadow map, blurred ambient map.
        write_image(sets.env, 0, self.placeholders.sky_cube.view(), self.samplers.linear_wrap);
        write_image(sets.env, 1, self.shadow_map.image().view(), self.samplers.shadow_compare);
        write_image(sets.env, 2, self.ssao.ambient_map(0).view(), self.samplers.linear_clamp);

        // Null variant bound while the shadow map is a depth target.
        write_image(sets.null_env, 0, self.placeholders.null_cube.view(), self.samplers.linear_wrap);
        write_image(sets.null_env, 1, self.placeholders.null_depth.view(), self.samplers.shadow_compare);
        write_image(sets.null_env, 2, self.placeholders.materials[4].view(), self.samplers.linear_clamp);

        // SSAO inputs.
        write_image(sets.ssao_maps, 0, self.ssao.normal_map().view(), self.samplers.point_clamp);
        write_image(sets.ssao_maps, 1, self.depth_buffer.image().view(), self.samplers.depth_border);
        write_image(sets.ssao_input_random, 0, self.random_vector_map.view(), self.samplers.linear_wrap);
        write_image(sets.ssao_input_ambient0, 0, self.ssao.ambient_map(0).view(), self.samplers.linear_clamp);
        write_image(sets.ssao_input_ambient1, 0, self.ssao.ambient_map(1).view(), self.samplers.linear_clamp);
    }

    // ------------------------------------------------------------------
    // Per-frame update
    // ------------------------------------------------------------------

    /// Advances to the next frame resource (waiting on the timeline fence
    /// if needed) and refreshes all CPU-written constants.
    pub fn update(
        &mut self,
        input: &InputState,
        delta_time: f32,
        total_time: f32,
    ) -> RhiResult<()> {
        self.ring.advance(&self.timeline)?;

        self.process_input(input, delta_time);
        self.lights.animate(delta_time);
        self.shadow_transform = fit_to_scene(
            self.lights.key_light_direction(),
            self.scene_center,
            self.scene_radius,
        );

        // Light rotation moves the shadow transform every frame, which
        // flows through the pass constants; object and material data only
        // rewrites while dirty counters are draining.
        let frame = self.ring.current();
        update_object_constants(&mut self.items, &self.materials, |index, constants| {
            frame.object_cb.copy_data(index, constants)
        })?;
        update_material_buffer(&mut self.materials, |index, data| {
            frame.material_buffer.copy_data(index, data)
        })?;

        let main_pass = self.build_main_pass_constants(delta_time, total_time);
        let shadow_pass = self.build_shadow_pass_constants();
        let ssao_constants = self.build_ssao_constants(&main_pass);

        let frame = self.ring.current();
        frame.pass_cb.copy_data(PassConstants::MAIN_PASS, &main_pass)?;
        frame.pass_cb.copy_data(PassConstants::SHADOW_PASS, &shadow_pass)?;
        frame.ssao_cb.copy_data(0, &ssao_constants)?;

        Ok(())
    }

    fn process_input(&mut self, input: &InputState, delta_time: f32) {
        let speed = 10.0 * delta_time;
        if input.is_key_pressed(KeyCode::KeyW) {
            self.camera.walk(speed);
        }
        if input.is_key_pressed(KeyCode::KeyS) {
            self.camera.walk(-speed);
        }
        if input.is_key_pressed(KeyCode::KeyA) {
            self.camera.strafe(-speed);
        }
        if input.is_key_pressed(KeyCode::KeyD) {
            self.camera.strafe(speed);
        }

        if input.is_mouse_pressed(MouseButton::Right)
            && !input.is_mouse_just_pressed(MouseButton::Right)
        {
            // A quarter degree per pixel.
            let (dx, dy) = input.mouse_delta();
            self.camera.rotate_y((0.25 * dx).to_radians());
            self.camera.pitch((0.25 * dy).to_radians());
        }
    }

    fn build_main_pass_constants(&self, delta_time: f32, total_time: f32) -> PassConstants {
        let view = self.camera.view_matrix();
        let proj = self.camera.projection_matrix();
        let view_proj = proj * view;

        let lights = self.lights.lights();
        let mut constants = PassConstants {
            view,
            inv_view: view.inverse(),
            proj,
            inv_proj: proj.inverse(),
            view_proj,
            inv_view_proj: view_proj.inverse(),
            view_proj_tex: ndc_to_texture() * view_proj,
            shadow_transform: self.shadow_transform.world_to_shadow,
            eye_pos: self.camera.position,
            render_target_size: Vec2::new(self.width as f32, self.height as f32),
            inv_render_target_size: Vec2::new(1.0 / self.width as f32, 1.0 / self.height as f32),
            near_z: self.camera.near(),
            far_z: self.camera.far(),
            total_time,
            delta_time,
            ambient_light: AMBIENT_LIGHT,
            ..Default::default()
        };
        for (gpu, light) in constants.lights.iter_mut().zip(lights.iter()) {
            gpu.direction = light.direction;
            gpu.strength = light.strength;
        }
        constants
    }

    fn build_shadow_pass_constants(&self) -> PassConstants {
        let st = &self.shadow_transform;
        let view_proj = st.proj * st.view;
        let size = self.shadow_map.extent().width as f32;

        PassConstants {
            view: st.view,
            inv_view: st.view.inverse(),
            proj: st.proj,
            inv_proj: st.proj.inverse(),
            view_proj,
            inv_view_proj: view_proj.inverse(),
            eye_pos: st.light_pos,
            render_target_size: Vec2::splat(size),
            inv_render_target_size: Vec2::splat(1.0 / size),
            near_z: st.near_z,
            far_z: st.far_z,
            ..Default::default()
        }
    }

    fn build_ssao_constants(&self, main_pass: &PassConstants) -> SsaoConstants {
        let ambient_extent = self.ssao.ambient_extent();
        let weights = gauss_weights(SSAO_BLUR_SIGMA);

        SsaoConstants {
            proj: main_pass.proj,
            inv_proj: main_pass.inv_proj,
            proj_tex: ndc_to_texture() * main_pass.proj,
            offset_vectors: *self.ssao.offset_vectors(),
            blur_weights: pack_blur_weights(&weights),
            inv_render_target_size: Vec2::new(
                1.0 / ambient_extent.width as f32,
                1.0 / ambient_extent.height as f32,
            ),
            ..Default::default()
        }
    }

    // ------------------------------------------------------------------
    // Drawing
    // ------------------------------------------------------------------

    /// Records, submits, and presents one frame.
    pub fn draw(&mut self) -> RhiResult<()> {
        if self.framebuffer_resized {
            self.recreate_swapchain()?;
        }

        let acquire = self.acquire_semaphores[self.ring.current_index()].handle();
        let (image_index, _suboptimal) = match self.swapchain.acquire_next_image(acquire) {
            Ok(result) => result,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during acquire");
                self.recreate_swapchain()?;
                return Ok(());
            }
            Err(e) => return Err(RhiError::Vulkan(e)),
        };

        self.viewports.begin_frame();

        {
            let frame = self.ring.current();
            frame.command_buffer.reset()?;
            frame.command_buffer.begin()?;
        }
        let cmd = self.ring.current().command_buffer.handle();

        self.graph.begin_frame();
        self.record_shadow_pass(cmd);
        self.record_normals_pass(cmd);
        self.record_ssao_passes(cmd);
        self.record_main_pass(cmd, image_index);
        self.record_ui_overlay(cmd, image_index);

        self.ring.current().command_buffer.end()?;

        // Advance the fence and submit: the binary semaphore orders the
        // present, the timeline signal releases this frame resource once
        // the GPU is done with it.
        self.frame_count += 1;
        let fence_value = self.frame_count;
        let render_finished = self.render_finished_semaphores[image_index as usize].handle();

        let wait_semaphores = [acquire];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [cmd];
        let signal_semaphores = [render_finished, self.timeline.handle()];
        let wait_values = [0u64];
        let signal_values = [0u64, fence_value];

        let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::default()
            .wait_semaphore_values(&wait_values)
            .signal_semaphore_values(&signal_values);
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline_info);

        unsafe {
            self.device.handle().queue_submit(
                self.device.graphics_queue(),
                &[submit_info],
                vk::Fence::null(),
            )?;
        }
        self.ring.current_mut().fence_value = fence_value;

        match self
            .swapchain
            .present(self.device.present_queue(), image_index, render_finished)
        {
            Ok(false) => {}
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) | Err(vk::Result::SUBOPTIMAL_KHR) => {
                debug!("Swapchain suboptimal/out of date during present");
                self.framebuffer_resized = true;
            }
            Err(e) => return Err(RhiError::Vulkan(e)),
        }

        Ok(())
    }

    /// Binds every parameter of the scene layout: the per-frame set with
    /// both dynamic offsets, the texture table, and the environment set.
    /// Called exactly when the pass graph reports a layout change.
    fn bind_scene_parameters(&self, cmd: vk::CommandBuffer, env_set: vk::DescriptorSet) {
        let frame = self.ring.current();
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.scene_pipeline_layout.handle(),
                0,
                &[frame.scene_set],
                &[0, 0],
            );
            self.device.handle().cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.scene_pipeline_layout.handle(),
                1,
                &[self.textures.set(), env_set],
                &[],
            );
        }
    }

    /// Binds every parameter of the SSAO layout.
    fn bind_ssao_parameters(&self, cmd: vk::CommandBuffer) {
        let frame = self.ring.current();
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.ssao_pipeline_layout.handle(),
                0,
                &[
                    frame.ssao_set,
                    self.static_sets.ssao_maps,
                    self.static_sets.ssao_input_random,
                ],
                &[],
            );
            self.device.handle().cmd_push_constants(
                cmd,
                self.ssao_pipeline_layout.handle(),
                vk::ShaderStageFlags::FRAGMENT,
                0,
                &BlurDirection::Vertical.push_constant().to_le_bytes(),
            );
        }
    }

    fn bind_pipeline(&self, cmd: vk::CommandBuffer, name: &str) {
        unsafe {
            self.device.handle().cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipelines[name].handle(),
            );
        }
    }

    /// Draws one layer, rebinding the per-frame set with the pass and
    /// per-object dynamic offsets for each item.
    fn draw_layer(&self, cmd: vk::CommandBuffer, layer: RenderLayer, pass_index: u32) {
        let frame = self.ring.current();
        let pass_offset = frame.pass_cb.offset_of(pass_index) as u32;

        for &item_index in &self.layers[layer.index()] {
            let item = &self.items[item_index];
            let mesh = &self.meshes[item.mesh];
            let submesh = mesh.submesh(item.submesh);
            let object_offset = frame.object_cb.offset_of(item.object_index) as u32;

            unsafe {
                let d = self.device.handle();
                d.cmd_bind_vertex_buffers(cmd, 0, &[mesh.vertex_buffer()], &[0]);
                d.cmd_bind_index_buffer(cmd, mesh.index_buffer(), 0, vk::IndexType::UINT32);
                d.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.scene_pipeline_layout.handle(),
                    0,
                    &[frame.scene_set],
                    &[pass_offset, object_offset],
                );
                d.cmd_draw_indexed(
                    cmd,
                    submesh.index_count,
                    1,
                    submesh.first_index,
                    submesh.vertex_offset,
                    0,
                );
            }
        }
    }

    fn set_pass_area(&self, cmd: vk::CommandBuffer, bundle: &RenderingBundle) {
        unsafe {
            let d = self.device.handle();
            d.cmd_set_viewport(cmd, 0, &[bundle.viewport()]);
            d.cmd_set_scissor(cmd, 0, &[bundle.scissor()]);
        }
    }

    fn transition(
        &self,
        cmd: vk::CommandBuffer,
        image: &Image,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) {
        cmd_transition_image(cmd, &self.device, image.handle(), image.aspect(), 1, old, new);
    }

    fn record_shadow_pass(&mut self, cmd: vk::CommandBuffer) {
        if self.graph.begin_pass(PassId::Shadow) {
            // No texture sampling happens here; the null environment set
            // keeps the layout fully bound while the shadow map itself is
            // a depth target.
            self.bind_scene_parameters(cmd, self.static_sets.null_env);
        }

        self.transition(
            cmd,
            self.shadow_map.image(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        );

        let bundle = RenderingBundle::new(
            self.shadow_map.extent(),
            None,
            Some(&DepthAttachment::clear_store(
                self.shadow_map.image().view(),
            )),
        );
        unsafe {
            self.device.handle().cmd_begin_rendering(cmd, &bundle.info());
        }
        self.set_pass_area(cmd, &bundle);
        self.bind_pipeline(cmd, "shadow");
        self.draw_layer(cmd, RenderLayer::Opaque, PassConstants::SHADOW_PASS);
        unsafe {
            self.device.handle().cmd_end_rendering(cmd);
        }

        self.transition(
            cmd,
            self.shadow_map.image(),
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
    }

    fn record_normals_pass(&mut self, cmd: vk::CommandBuffer) {
        if self.graph.begin_pass(PassId::NormalsDepth) {
            self.bind_scene_parameters(cmd, self.static_sets.null_env);
        }

        self.transition(
            cmd,
            self.ssao.normal_map(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        self.transition(
            cmd,
            self.depth_buffer.image(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        );

        // World normals clear to +Z, depth to far.
        let bundle = RenderingBundle::new(
            self.ssao.render_extent(),
            Some(&ColorAttachment::clear(
                self.ssao.normal_map().view(),
                [0.0, 0.0, 1.0, 0.0],
            )),
            Some(&DepthAttachment::clear_store(
                self.depth_buffer.image().view(),
            )),
        );
        unsafe {
            self.device.handle().cmd_begin_rendering(cmd, &bundle.info());
        }
        self.set_pass_area(cmd, &bundle);
        self.bind_pipeline(cmd, "normals");
        self.draw_layer(cmd, RenderLayer::Opaque, PassConstants::MAIN_PASS);
        unsafe {
            self.device.handle().cmd_end_rendering(cmd);
        }

        self.transition(
            cmd,
            self.ssao.normal_map(),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        self.transition(
            cmd,
            self.depth_buffer.image(),
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
    }

    fn record_ssao_passes(&mut self, cmd: vk::CommandBuffer) {
        if self.graph.begin_pass(PassId::Ssao) {
            self.bind_ssao_parameters(cmd);
        }

        // Occlusion estimate into ambient map 0.
        self.transition(
            cmd,
            self.ssao.ambient_map(0),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        let bundle = RenderingBundle::new(
            self.ssao.ambient_extent(),
            Some(&ColorAttachment::clear(
                self.ssao.ambient_map(0).view(),
                [1.0, 1.0, 1.0, 1.0],
            )),
            None,
        );
        unsafe {
            self.device.handle().cmd_begin_rendering(cmd, &bundle.info());
        }
        self.set_pass_area(cmd, &bundle);
        self.bind_pipeline(cmd, "ssao");
        unsafe {
            self.device.handle().cmd_draw(cmd, 3, 1, 0, 0);
            self.device.handle().cmd_end_rendering(cmd);
        }
        self.transition(
            cmd,
            self.ssao.ambient_map(0),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );

        // Separable blur, ping-ponging 0 -> 1 -> 0.
        self.graph.begin_pass(PassId::SsaoBlur);
        self.bind_pipeline(cmd, "ssao_blur");
        for _ in 0..SSAO_BLUR_COUNT {
            self.record_blur_pass(cmd, BlurDirection::Horizontal);
            self.record_blur_pass(cmd, BlurDirection::Vertical);
        }
    }

    fn record_blur_pass(&self, cmd: vk::CommandBuffer, direction: BlurDirection) {
        let (input_set, target) = match direction {
            BlurDirection::Horizontal => (self.static_sets.ssao_input_ambient0, 1),
            BlurDirection::Vertical => (self.static_sets.ssao_input_ambient1, 0),
        };

        self.transition(
            cmd,
            self.ssao.ambient_map(target),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );

        let bundle = RenderingBundle::new(
            self.ssao.ambient_extent(),
            Some(&ColorAttachment::clear(
                self.ssao.ambient_map(target).view(),
                [1.0, 1.0, 1.0, 1.0],
            )),
            None,
        );
        unsafe {
            let d = self.device.handle();
            d.cmd_begin_rendering(cmd, &bundle.info());
            self.set_pass_area(cmd, &bundle);
            d.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.ssao_pipeline_layout.handle(),
                2,
                &[input_set],
                &[],
            );
            d.cmd_push_constants(
                cmd,
                self.ssao_pipeline_layout.handle(),
                vk::ShaderStageFlags::FRAGMENT,
                0,
                &direction.push_constant().to_le_bytes(),
            );
            d.cmd_draw(cmd, 3, 1, 0, 0);
            d.cmd_end_rendering(cmd);
        }

        self.transition(
            cmd,
            self.ssao.ambient_map(target),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
    }

    fn record_main_pass(&mut self, cmd: vk::CommandBuffer, image_index: u32) {
        if self.graph.begin_pass(PassId::Main) {
            self.bind_scene_parameters(cmd, self.static_sets.env);
        }

        let offscreen_mode = self.render_to_offscreen;

        // The swapchain image hosts either the scene or just the UI; it
        // becomes a color target either way.
        cmd_transition_image(
            cmd,
            &self.device,
            self.swapchain.image(image_index as usize),
            vk::ImageAspectFlags::COLOR,
            1,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        if offscreen_mode {
            self.transition(
                cmd,
                self.offscreen.image(),
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            );
        }
        // Depth is reloaded, not cleared: the opaque pipeline tests EQUAL
        // against the values laid down by the normals pass.
        self.transition(
            cmd,
            self.depth_buffer.image(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        );

        let target_view = if offscreen_mode {
            self.offscreen.image().view()
        } else {
            self.swapchain.image_view(image_index as usize)
        };

        let bundle = RenderingBundle::new(
            self.swapchain.extent(),
            Some(&ColorAttachment::clear(
                target_view,
                self.settings.clear_color,
            )),
            Some(&DepthAttachment::load(self.depth_buffer.image().view())),
        );
        unsafe {
            self.device.handle().cmd_begin_rendering(cmd, &bundle.info());
        }
        self.set_pass_area(cmd, &bundle);

        // Sky first: it fills the background wherever the opaque layer
        // left far depth, then opaque draws on its pre-laid depth.
        self.bind_pipeline(cmd, "sky");
        self.draw_layer(cmd, RenderLayer::Sky, PassConstants::MAIN_PASS);
        self.bind_pipeline(cmd, "opaque");
        self.draw_layer(cmd, RenderLayer::Opaque, PassConstants::MAIN_PASS);
        if self.draw_debug_layer {
            self.bind_pipeline(cmd, "debug");
            self.draw_layer(cmd, RenderLayer::Debug, PassConstants::MAIN_PASS);
        }

        unsafe {
            self.device.handle().cmd_end_rendering(cmd);
        }

        if offscreen_mode {
            self.transition(
                cmd,
                self.offscreen.image(),
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );

            // The swapchain image still needs its clear for the UI.
            let ui_bundle = RenderingBundle::new(
                self.swapchain.extent(),
                Some(&ColorAttachment::clear(
                    self.swapchain.image_view(image_index as usize),
                    self.settings.clear_color,
                )),
                None,
            );
            unsafe {
                self.device.handle().cmd_begin_rendering(cmd, &ui_bundle.info());
                self.device.handle().cmd_end_rendering(cmd);
            }
        }

        self.transition(
            cmd,
            self.depth_buffer.image(),
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );

        // Offer the intermediate targets to the UI's viewport panels.
        let allocator = self.textures.allocator();
        let normal_handle = allocator.gpu_handle(self.ssao.normal_slot());
        let ambient_handle = allocator.gpu_handle(self.ssao.ambient_slots()[0]);
        self.viewports
            .submit("Scene Normals", normal_handle, self.width, self.height);
        self.viewports
            .submit("SSAO", ambient_handle, self.width, self.height);
        self.viewports.submit(
            ViewportSubmissions::DEFAULT_VIEW,
            self.offscreen.srv_handle(),
            self.width,
            self.height,
        );
    }

    fn record_ui_overlay(&mut self, cmd: vk::CommandBuffer, image_index: u32) {
        // The overlay collaborator records its own draws here with its own
        // pipeline layout; the graph only needs to know our binding state
        // is gone afterwards.
        self.graph.begin_pass(PassId::UiOverlay);

        cmd_transition_image(
            cmd,
            &self.device,
            self.swapchain.image(image_index as usize),
            vk::ImageAspectFlags::COLOR,
            1,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
    }

    // ------------------------------------------------------------------
    // Resize & external surface
    // ------------------------------------------------------------------

    /// Notifies the renderer of a window resize; the swapchain is
    /// recreated at the top of the next frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            debug!("Ignoring resize to zero dimensions");
            return;
        }
        if width != self.width || height != self.height {
            self.width = width;
            self.height = height;
            self.framebuffer_resized = true;
            self.camera.set_aspect(width as f32 / height as f32);
        }
    }

    fn recreate_swapchain(&mut self) -> RhiResult<()> {
        self.device.wait_idle()?;

        self.swapchain.recreate(
            self.surface.loader(),
            self.surface.handle(),
            self.width,
            self.height,
        )?;

        self.depth_buffer.resize(
            self.device.clone(),
            &self.textures,
            self.samplers.depth_border,
            self.width,
            self.height,
        )?;
        self.ssao.resize(
            &self.textures,
            self.samplers.linear_clamp,
            self.width,
            self.height,
        )?;
        self.offscreen.resize(
            self.device.clone(),
            &self.textures,
            self.samplers.linear_clamp,
            self.width,
            self.height,
        )?;

        // Recreated images invalidated the static sets' views, and all
        // targets are back in UNDEFINED layout.
        self.rewrite_pass_input_sets();
        let graphics_family = self.device.queue_families().graphics_family.unwrap();
        let pool = CommandPool::new_transient(self.device.clone(), graphics_family)?;
        Self::prime_target_layouts(
            &self.device,
            &pool,
            &self.shadow_map,
            &self.ssao,
            &self.depth_buffer,
            &self.offscreen,
            &self.placeholders.null_depth,
        )?;

        self.render_finished_semaphores = (0..self.swapchain.image_count())
            .map(|_| Semaphore::new(self.device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;

        self.framebuffer_resized = false;
        info!("Swapchain recreated: {}x{}", self.width, self.height);
        Ok(())
    }

    /// Enables drawing of the debug layer (shadow map quad).
    pub fn set_draw_debug_layer(&mut self, enabled: bool) {
        self.draw_debug_layer = enabled;
    }

    /// The textures submitted for the UI's viewport panels this frame.
    pub fn viewport_submissions(&self) -> &ViewportSubmissions {
        &self.viewports
    }

    /// Reserved null descriptor slots (cube, 2D, 2D).
    pub fn null_slots(&self) -> (u32, u32, u32) {
        (self.null_cube_slot, self.null_tex_slot, self.null_tex_slot + 1)
    }

    /// Slot reserved for the sky cube map (its view is bound through the
    /// environment set; the slot keeps the table index space consistent).
    pub fn sky_cube_slot(&self) -> u32 {
        self.sky_cube_slot
    }
}

impl RenderControl for Renderer {
    fn set_render_to_offscreen(&mut self, enabled: bool) {
        self.render_to_offscreen = enabled;
    }

    fn render_to_offscreen(&self) -> bool {
        self.render_to_offscreen
    }

    fn render_settings(&mut self) -> &mut RenderSettings {
        &mut self.settings
    }
}

impl UiTextureAllocator for Renderer {
    fn allocate_ui_texture(&mut self) -> (CpuDescriptor, GpuDescriptor) {
        self.textures.allocator_mut().alloc_handles()
    }

    fn free_ui_texture(&mut self, cpu: CpuDescriptor, gpu: GpuDescriptor) {
        self.textures.allocator_mut().free_handles(cpu, gpu);
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Field order handles destruction order; only the GPU has to be
        // drained first.
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("Failed to wait for device idle during drop: {:?}", e);
        }
        info!("Renderer shutting down");
    }
}
