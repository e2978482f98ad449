//! Shader and pipeline layout utils.
//!
//! Shaders arrive as SPIR-V blobs compiled offline; nothing here knows how
//! they were produced.
use ash::{vk, Device};
use cstr::cstr;
use std::{
    ffi::CStr,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Entry point every shader stage is invoked through.
pub const SHADER_ENTRY_POINT: &CStr = cstr!("main");

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Errors that can occur while loading shaders or creating the layout.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The shader file couldn't be read.
    #[error("unable to read shader {path}")]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The bytes are not a SPIR-V module.
    #[error("invalid SPIR-V: {0}")]
    InvalidSpirv(String),
    /// The runtime rejected the shader module.
    #[error("failed to create shader module: {0}")]
    ShaderModule(#[source] vk::Result),
    /// The runtime rejected the pipeline layout.
    #[error("failed to create pipeline layout: {0}")]
    Layout(#[source] vk::Result),
}

/// Read a compiled shader from disk.
pub fn load_spirv(path: impl AsRef<Path>) -> Result<Vec<u8>, PipelineError> {
    let path = path.as_ref();
    fs::read(path).map_err(|source| PipelineError::Io {
        path: path.to_owned(),
        source,
    })
}

/// Turn SPIR-V bytes into words, accepting either endianness.
pub fn decode_spirv(bytes: &[u8]) -> Result<Vec<u32>, PipelineError> {
    let words = ash::util::read_spv(&mut io::Cursor::new(bytes))
        .map_err(|err| PipelineError::InvalidSpirv(err.to_string()))?;
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&magic) => Err(PipelineError::InvalidSpirv(format!(
            "bad magic number {magic:#010x}"
        ))),
        None => Err(PipelineError::InvalidSpirv("empty module".to_owned())),
    }
}

/// A shader module. Only needed until the pipeline objects using it exist.
pub struct ShaderModule {
    handle: vk::ShaderModule,
}

impl ShaderModule {
    /// Create a shader module from SPIR-V bytes.
    pub unsafe fn from_spirv(device: &Device, bytes: &[u8]) -> Result<Self, PipelineError> {
        let code = decode_spirv(bytes)?;
        let module_info = vk::ShaderModuleCreateInfo::builder().code(&code);
        let handle = device
            .create_shader_module(&module_info, None)
            .map_err(PipelineError::ShaderModule)?;
        Ok(ShaderModule { handle })
    }

    /// Describe this module as the `stage` of a pipeline.
    #[inline]
    pub fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.handle)
            .name(SHADER_ENTRY_POINT)
            .build()
    }

    /// Destroy the module.
    pub unsafe fn destroy(self, device: &Device) {
        device.destroy_shader_module(self.handle, None);
    }
}

/// The fixed-function part of the triangle pipeline.
#[derive(Debug, Clone, Copy)]
pub struct FixedFunctionState {
    /// Whole-extent viewport, depth 0 to 1.
    pub viewport: vk::Viewport,
    /// Whole-extent scissor.
    pub scissor: vk::Rect2D,
    /// How vertices are assembled.
    pub topology: vk::PrimitiveTopology,
    /// Polygon fill mode.
    pub polygon_mode: vk::PolygonMode,
    /// Faces that are culled.
    pub cull_mode: vk::CullModeFlags,
    /// Winding of front faces.
    pub front_face: vk::FrontFace,
    /// Rasterized line width.
    pub line_width: f32,
    /// Samples per pixel.
    pub samples: vk::SampleCountFlags,
    /// Blending of the single color attachment.
    pub color_blend: vk::PipelineColorBlendAttachmentState,
}

impl FixedFunctionState {
    /// State for drawing hard-coded triangles over the full `extent`.
    pub fn for_extent(extent: vk::Extent2D) -> Self {
        FixedFunctionState {
            viewport: vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            },
            scissor: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            line_width: 1.0,
            samples: vk::SampleCountFlags::TYPE_1,
            // color = a * src + (1 - a) * dst, alpha = src alpha
            color_blend: vk::PipelineColorBlendAttachmentState {
                blend_enable: vk::TRUE,
                src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
                dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
                color_blend_op: vk::BlendOp::ADD,
                src_alpha_blend_factor: vk::BlendFactor::ONE,
                dst_alpha_blend_factor: vk::BlendFactor::ZERO,
                alpha_blend_op: vk::BlendOp::ADD,
                color_write_mask: vk::ColorComponentFlags::R
                    | vk::ColorComponentFlags::G
                    | vk::ColorComponentFlags::B
                    | vk::ColorComponentFlags::A,
            },
        }
    }

    /// Vertex input state. Vertices are generated in the vertex shader, so
    /// there are no bindings or attributes.
    pub fn vertex_input(&self) -> vk::PipelineVertexInputStateCreateInfo {
        vk::PipelineVertexInputStateCreateInfo::default()
    }

    /// Input assembly state. No primitive restart.
    pub fn input_assembly(&self) -> vk::PipelineInputAssemblyStateCreateInfo {
        vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(self.topology)
            .primitive_restart_enable(false)
            .build()
    }

    /// Rasterization state. No depth clamp, discard or bias.
    pub fn rasterization(&self) -> vk::PipelineRasterizationStateCreateInfo {
        vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(self.polygon_mode)
            .line_width(self.line_width)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .depth_bias_enable(false)
            .build()
    }

    /// Multisample state. No sample shading.
    pub fn multisample(&self) -> vk::PipelineMultisampleStateCreateInfo {
        vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(self.samples)
            .build()
    }
}

/// An empty pipeline layout, along with the fixed-function state the
/// pipeline will be built with.
pub struct PipelineLayout {
    handle: vk::PipelineLayout,
    fixed_function: FixedFunctionState,
}

impl PipelineLayout {
    /// Check both shader blobs by turning them into modules, describe the
    /// fixed-function state for `extent` and create the layout. The shader
    /// modules are released before returning.
    pub unsafe fn create(
        device: &Device,
        vertex_spirv: &[u8],
        fragment_spirv: &[u8],
        extent: vk::Extent2D,
    ) -> Result<PipelineLayout, PipelineError> {
        let vertex = ShaderModule::from_spirv(device, vertex_spirv)?;
        let fragment = match ShaderModule::from_spirv(device, fragment_spirv) {
            Ok(fragment) => fragment,
            Err(err) => {
                vertex.destroy(device);
                return Err(err);
            }
        };

        let stages = [
            vertex.stage_info(vk::ShaderStageFlags::VERTEX),
            fragment.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];
        let fixed_function = FixedFunctionState::for_extent(extent);
        tracing::debug!(
            stages = stages.len(),
            viewport = ?fixed_function.viewport,
            "Described pipeline stages"
        );

        let layout_info = vk::PipelineLayoutCreateInfo::default();
        let handle = device.create_pipeline_layout(&layout_info, None);
        vertex.destroy(device);
        fragment.destroy(device);

        Ok(PipelineLayout {
            handle: handle.map_err(PipelineError::Layout)?,
            fixed_function,
        })
    }

    /// The raw layout handle.
    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }

    /// Fixed-function state matching the swapchain extent.
    #[inline]
    pub fn fixed_function(&self) -> &FixedFunctionState {
        &self.fixed_function
    }

    /// Destroy the layout.
    pub unsafe fn destroy(&mut self, device: &Device) {
        if self.handle != vk::PipelineLayout::null() {
            device.destroy_pipeline_layout(self.handle, None);
            self.handle = vk::PipelineLayout::null();
        }
    }
}
