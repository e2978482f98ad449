//! The whole bootstrap sequence, from loading Vulkan to the pipeline layout.
//!
//! Every handle is held by a small owner that destroys it on drop.
//! [`VulkanContext`] declares its owners in teardown order, so dropping it
//! (or bailing out halfway through [`VulkanContext::new`]) always releases
//! the pipeline layout, swapchain, device, surface, debug messenger and
//! instance in that order. Physical devices are never released.
use crate::query::AshQuery;
use crate::{
    ActiveDebugMessenger, BootstrapSmallVec, DebugMessenger, DeviceSelectionError, DeviceSelector,
    InstanceBuilder, InstanceCreationError, InstanceMetadata, LogicalDevice, PipelineError,
    PipelineLayout, SelectedDevice, Swapchain, SwapchainConfig, SwapchainOptions,
    ValidationLayers,
};
use ash::extensions::khr;
use ash::{vk, Device, Entry, Instance, LoadingError};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::{
    ffi::{CString, NulError},
    path::PathBuf,
};
use thiserror::Error;

/// Errors that can end the bootstrap sequence. None of them are retried.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The Vulkan library couldn't be loaded.
    #[error("unable to load vulkan")]
    Loading(#[from] LoadingError),
    /// A required layer, usually validation, is not installed.
    #[error("layers ({0:?}) requested, but not available")]
    UnsupportedLayer(BootstrapSmallVec<CString>),
    /// A required instance extension is not available.
    #[error("extensions ({0:?}) not present")]
    ExtensionsNotPresent(BootstrapSmallVec<CString>),
    /// The application name contains a nul byte.
    #[error("invalid application name")]
    InvalidName(#[from] NulError),
    /// The windowing system has no Vulkan surface support.
    #[error("unsupported windowing system")]
    UnsupportedWindow,
    /// No device can drive the surface.
    #[error("unable to find compatible hardware ({enumerated} devices enumerated)")]
    NoCompatibleHardware {
        /// Number of devices the runtime reported.
        enumerated: usize,
    },
    /// The runtime rejected a derived configuration.
    #[error("failed to create {resource}: {result}")]
    ResourceCreationFailed {
        /// What was being created.
        resource: &'static str,
        /// What the runtime answered.
        #[source]
        result: vk::Result,
    },
    /// A shader blob couldn't be read or isn't SPIR-V.
    #[error("shader error")]
    Shader(#[source] PipelineError),
    /// A query against the runtime failed.
    #[error("vulkan error")]
    Vulkan(#[source] vk::Result),
}

impl BootstrapError {
    fn creating(resource: &'static str) -> impl FnOnce(vk::Result) -> BootstrapError {
        move |result| BootstrapError::ResourceCreationFailed { resource, result }
    }
}

impl From<InstanceCreationError> for BootstrapError {
    fn from(err: InstanceCreationError) -> Self {
        match err {
            InstanceCreationError::VulkanError(result) => BootstrapError::Vulkan(result),
            InstanceCreationError::UnsupportedLayer(layers) => {
                BootstrapError::UnsupportedLayer(layers)
            }
            InstanceCreationError::ExtensionsNotPresent(extensions) => {
                BootstrapError::ExtensionsNotPresent(extensions)
            }
            InstanceCreationError::CreationFailed(result) => {
                BootstrapError::creating("instance")(result)
            }
            InstanceCreationError::DebugMessengerFailed(result) => {
                BootstrapError::creating("debug messenger")(result)
            }
        }
    }
}

impl From<DeviceSelectionError> for BootstrapError {
    fn from(err: DeviceSelectionError) -> Self {
        match err {
            DeviceSelectionError::VulkanError(result) => BootstrapError::Vulkan(result),
            DeviceSelectionError::NoCompatibleHardware { enumerated } => {
                BootstrapError::NoCompatibleHardware { enumerated }
            }
        }
    }
}

impl From<PipelineError> for BootstrapError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::ShaderModule(result) => BootstrapError::creating("shader module")(result),
            PipelineError::Layout(result) => BootstrapError::creating("pipeline layout")(result),
            err => BootstrapError::Shader(err),
        }
    }
}

/// What [`VulkanContext::new`] needs to know up front.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Application name advertised to the driver.
    pub app_name: String,
    /// Window size, used when the surface lets the application pick the extent.
    pub window_extent: vk::Extent2D,
    /// Validation layer policy. Defaults to [`ValidationLayers::for_build`].
    pub validation: ValidationLayers,
    /// Compiled vertex shader.
    pub vertex_shader: PathBuf,
    /// Compiled fragment shader.
    pub fragment_shader: PathBuf,
    /// Swapchain preferences.
    pub swapchain: SwapchainOptions,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            app_name: "Demo Triangle".to_owned(),
            window_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            validation: ValidationLayers::for_build(),
            vertex_shader: PathBuf::from("vert.spv"),
            fragment_shader: PathBuf::from("frag.spv"),
            swapchain: SwapchainOptions::default(),
        }
    }
}

struct OwnedInstance {
    instance: Instance,
    debug_messenger: Option<ActiveDebugMessenger>,
}

impl Drop for OwnedInstance {
    fn drop(&mut self) {
        tracing::debug!("Destroying instance {:?}", self.instance.handle());
        unsafe {
            if let Some(debug_messenger) = self.debug_messenger.take() {
                debug_messenger.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

struct OwnedSurface {
    loader: khr::Surface,
    handle: vk::SurfaceKHR,
}

impl Drop for OwnedSurface {
    fn drop(&mut self) {
        tracing::debug!("Destroying surface {:?}", self.handle);
        unsafe { self.loader.destroy_surface(self.handle, None) };
    }
}

struct OwnedDevice(LogicalDevice);

impl Drop for OwnedDevice {
    fn drop(&mut self) {
        tracing::debug!("Destroying device {:?}", self.0.device.handle());
        unsafe { self.0.device.destroy_device(None) };
    }
}

struct OwnedSwapchain {
    device: Device,
    swapchain: Swapchain,
}

impl Drop for OwnedSwapchain {
    fn drop(&mut self) {
        tracing::debug!("Destroying swapchain {:?}", self.swapchain.handle());
        unsafe { self.swapchain.destroy(&self.device) };
    }
}

struct OwnedPipelineLayout {
    device: Device,
    layout: PipelineLayout,
}

impl Drop for OwnedPipelineLayout {
    fn drop(&mut self) {
        tracing::debug!("Destroying pipeline layout {:?}", self.layout.handle());
        unsafe { self.layout.destroy(&self.device) };
    }
}

/// Everything needed to eventually draw a triangle to a window.
pub struct VulkanContext {
    // Fields drop in declaration order, which is the teardown order.
    pipeline_layout: OwnedPipelineLayout,
    swapchain: OwnedSwapchain,
    device: OwnedDevice,
    surface: OwnedSurface,
    instance: OwnedInstance,
    _entry: Entry,

    instance_metadata: InstanceMetadata,
    selected: SelectedDevice,
    swapchain_config: SwapchainConfig,
}

impl VulkanContext {
    /// Run the whole bootstrap sequence for `window`.
    ///
    /// The first failing step ends the sequence; whatever was created before
    /// it is released again.
    pub fn new(
        window: &(impl HasRawDisplayHandle + HasRawWindowHandle),
        config: &ContextConfig,
    ) -> Result<VulkanContext, BootstrapError> {
        let entry = unsafe { Entry::load() }?;

        let debug_messenger = if config.validation.is_enabled() {
            DebugMessenger::Default
        } else {
            DebugMessenger::Disable
        };
        let instance_builder = InstanceBuilder::new()
            .app_name(&config.app_name)?
            .app_version(1, 0)
            .engine_name("No Engine")?
            .engine_version(1, 0)
            .validation_layers(config.validation)
            .request_debug_messenger(debug_messenger)
            .require_surface_extensions(window)
            .ok_or(BootstrapError::UnsupportedWindow)?;
        let (instance, debug_messenger, instance_metadata) =
            unsafe { instance_builder.build(&entry) }?;
        let instance = OwnedInstance {
            instance,
            debug_messenger,
        };
        if config.validation.is_enabled()
            && !instance_metadata.is_layer_enabled(crate::VALIDATION_LAYER)
        {
            tracing::warn!("Validation was requested, but the layer is not installed");
        }

        let surface = OwnedSurface {
            loader: khr::Surface::new(&entry, &instance.instance),
            handle: unsafe {
                ash_window::create_surface(
                    &entry,
                    &instance.instance,
                    window.raw_display_handle(),
                    window.raw_window_handle(),
                    None,
                )
            }
            .map_err(BootstrapError::creating("window surface"))?,
        };

        let query = AshQuery::new(&instance.instance, &surface.loader);
        let selector = DeviceSelector::new();
        let selected = selector.select(&query, surface.handle)?;
        tracing::info!(
            name = %query.device_name(selected.physical_device),
            device_type = ?query.device_type(selected.physical_device),
            queue_families = ?selected.queue_families,
            "Selected physical device"
        );

        let device = OwnedDevice(
            unsafe {
                LogicalDevice::create(
                    &instance.instance,
                    &instance_metadata,
                    &selected,
                    selector.required_extensions(),
                )
            }
            .map_err(BootstrapError::creating("logical device"))?,
        );

        let swapchain_config =
            SwapchainConfig::for_device(&selected, config.window_extent, &config.swapchain);
        tracing::info!(?swapchain_config, "Negotiated swapchain configuration");
        let swapchain = OwnedSwapchain {
            device: device.0.device.clone(),
            swapchain: unsafe {
                Swapchain::create(
                    &instance.instance,
                    &device.0.device,
                    surface.handle,
                    &swapchain_config,
                    &config.swapchain,
                )
            }
            .map_err(BootstrapError::creating("swapchain"))?,
        };

        let vertex = crate::load_spirv(&config.vertex_shader)?;
        let fragment = crate::load_spirv(&config.fragment_shader)?;
        let pipeline_layout = OwnedPipelineLayout {
            device: device.0.device.clone(),
            layout: unsafe {
                PipelineLayout::create(
                    &device.0.device,
                    &vertex,
                    &fragment,
                    swapchain.swapchain.extent(),
                )
            }?,
        };

        Ok(VulkanContext {
            pipeline_layout,
            swapchain,
            device,
            surface,
            instance,
            _entry: entry,
            instance_metadata,
            selected,
            swapchain_config,
        })
    }

    /// The instance.
    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// What was enabled on the instance.
    #[inline]
    pub fn instance_metadata(&self) -> &InstanceMetadata {
        &self.instance_metadata
    }

    /// The window surface.
    #[inline]
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface.handle
    }

    /// The chosen physical device and what was learned selecting it.
    #[inline]
    pub fn selected_device(&self) -> &SelectedDevice {
        &self.selected
    }

    /// The logical device and its queues.
    #[inline]
    pub fn device(&self) -> &LogicalDevice {
        &self.device.0
    }

    /// The configuration the swapchain was built from.
    #[inline]
    pub fn swapchain_config(&self) -> &SwapchainConfig {
        &self.swapchain_config
    }

    /// The swapchain and its image views.
    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain.swapchain
    }

    /// The pipeline layout.
    #[inline]
    pub fn pipeline_layout(&self) -> &PipelineLayout {
        &self.pipeline_layout.layout
    }
}
