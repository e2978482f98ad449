//! Device selection and creation utils.
use crate::query::{DeviceQuery, SurfaceSupport};
use crate::{BootstrapSmallVec, InstanceMetadata};
use ash::extensions::khr::Swapchain;
use ash::prelude::VkResult;
use ash::{vk, Device, Instance};
use std::{
    ffi::{CStr, CString},
    fmt,
};
use thiserror::Error;

/// Queue family indices found while scanning a device. `None` means no
/// matching family has been found (yet).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct QueueFamilyIndices {
    /// First family able to run graphics work.
    pub graphics: Option<u32>,
    /// First family able to present to the surface.
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Both roles have been resolved.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// The resolved families, if both roles have been found.
    #[inline]
    pub fn resolve(self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }

    /// Scan the queue families of `device` in index order, recording the
    /// first graphics capable family and, independently, the first family
    /// able to present to `surface`. Families without queues are skipped.
    pub fn find(
        query: &impl DeviceQuery,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<QueueFamilyIndices> {
        let mut indices = QueueFamilyIndices::default();
        for (i, family) in (0u32..).zip(query.device_queue_families(device)?.iter()) {
            if family.queue_count == 0 {
                continue;
            }

            if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            {
                indices.graphics = Some(i);
            }

            if indices.present.is_none() && query.device_supports_present(device, i, surface)? {
                indices.present = Some(i);
            }

            if indices.is_complete() {
                break;
            }
        }

        Ok(indices)
    }
}

/// Resolved queue family indices of a suitable device.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct QueueFamilies {
    /// Family used for graphics work.
    pub graphics: u32,
    /// Family used for presentation.
    pub present: u32,
}

impl QueueFamilies {
    /// The distinct families, graphics first. One queue is created per entry.
    pub fn unique(&self) -> BootstrapSmallVec<u32> {
        let mut families = BootstrapSmallVec::new();
        families.push(self.graphics);
        if self.present != self.graphics {
            families.push(self.present);
        }
        families
    }
}

/// Why a device was turned down. Only the first failed check is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsuitableReason {
    /// No graphics or no presentation capable queue family.
    IncompleteQueueFamilies(QueueFamilyIndices),
    /// Required device extensions which are not supported.
    MissingExtensions(BootstrapSmallVec<CString>),
    /// The surface offers no formats or no present modes on this device.
    InadequateSurface,
}

impl fmt::Display for UnsuitableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnsuitableReason::IncompleteQueueFamilies(indices) => write!(
                f,
                "missing queue families (graphics: {:?}, present: {:?})",
                indices.graphics, indices.present
            ),
            UnsuitableReason::MissingExtensions(names) => {
                write!(f, "missing extensions {names:?}")
            }
            UnsuitableReason::InadequateSurface => {
                f.write_str("surface offers no formats or no present modes")
            }
        }
    }
}

/// A device that passed every check, with what was learned along the way.
#[derive(Debug, Clone)]
pub struct SelectedDevice {
    /// The chosen physical device. Never owned, never destroyed.
    pub physical_device: vk::PhysicalDevice,
    /// Graphics and present families.
    pub queue_families: QueueFamilies,
    /// Surface support as seen when the device was evaluated.
    pub surface_support: SurfaceSupport,
}

/// Verdict of [`evaluate`].
#[derive(Debug, Clone)]
pub enum Suitability {
    /// The device can drive the surface.
    Suitable(SelectedDevice),
    /// The device can't be used.
    Unsuitable(UnsuitableReason),
}

impl Suitability {
    /// Whether the verdict is [`Suitability::Suitable`].
    #[inline]
    pub fn is_suitable(&self) -> bool {
        matches!(self, Suitability::Suitable(_))
    }
}

/// Check whether `device` can present to `surface` with all of
/// `required_extensions` enabled.
///
/// The checks run in order (queue families, extensions, surface support) and
/// the first failure decides the verdict. Surface support is only queried
/// once the extensions are known to be there.
pub fn evaluate(
    query: &impl DeviceQuery,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    required_extensions: &[&CStr],
) -> VkResult<Suitability> {
    let indices = QueueFamilyIndices::find(query, device, surface)?;
    let queue_families = match indices.resolve() {
        Some(queue_families) => queue_families,
        None => {
            return Ok(Suitability::Unsuitable(
                UnsuitableReason::IncompleteQueueFamilies(indices),
            ))
        }
    };

    let supported = query.device_extensions(device)?;
    let missing: BootstrapSmallVec<CString> = required_extensions
        .iter()
        .filter(|&&name| !supported.contains(name))
        .map(|&name| name.to_owned())
        .collect();
    if !missing.is_empty() {
        return Ok(Suitability::Unsuitable(
            UnsuitableReason::MissingExtensions(missing),
        ));
    }

    let surface_support = query.surface_support(device, surface)?;
    if !surface_support.is_adequate() {
        return Ok(Suitability::Unsuitable(UnsuitableReason::InadequateSurface));
    }

    Ok(Suitability::Suitable(SelectedDevice {
        physical_device: device,
        queue_families,
        surface_support,
    }))
}

/// Errors that can occur during device selection.
#[derive(Debug, Error)]
pub enum DeviceSelectionError {
    /// A query against the runtime failed.
    #[error("vulkan error")]
    VulkanError(#[from] vk::Result),
    /// Either no device was enumerated, or none of them is suitable.
    #[error("unable to find compatible hardware ({enumerated} devices enumerated)")]
    NoCompatibleHardware {
        /// Number of devices the runtime reported. Zero means there is no
        /// Vulkan capable hardware at all.
        enumerated: usize,
    },
}

/// Picks the physical device to run on.
///
/// The first device in enumeration order that passes [`evaluate`] wins;
/// devices are not ranked against each other.
#[derive(Debug, Clone)]
pub struct DeviceSelector {
    required_extensions: BootstrapSmallVec<&'static CStr>,
}

impl DeviceSelector {
    /// Create a selector requiring swapchain support.
    #[inline]
    pub fn new() -> Self {
        let mut required_extensions = BootstrapSmallVec::new();
        required_extensions.push(Swapchain::name());
        DeviceSelector {
            required_extensions,
        }
    }

    /// Require a device which supports `extension`.
    /// The extension will be enabled.
    #[inline]
    pub fn require_extension(mut self, extension: &'static CStr) -> Self {
        if !self.required_extensions.contains(&extension) {
            self.required_extensions.push(extension);
        }
        self
    }

    /// Extensions a device must support to be selected.
    #[inline]
    pub fn required_extensions(&self) -> &[&'static CStr] {
        &self.required_extensions
    }

    /// Enumerate the devices known to `query` and pick the first suitable one.
    pub fn select(
        &self,
        query: &impl DeviceQuery,
        surface: vk::SurfaceKHR,
    ) -> Result<SelectedDevice, DeviceSelectionError> {
        let devices = query.enumerate_devices()?;
        self.select_from(query, &devices, surface)
    }

    /// Pick the first suitable device out of `devices`.
    pub fn select_from(
        &self,
        query: &impl DeviceQuery,
        devices: &[vk::PhysicalDevice],
        surface: vk::SurfaceKHR,
    ) -> Result<SelectedDevice, DeviceSelectionError> {
        if devices.is_empty() {
            tracing::warn!("No Vulkan capable devices were enumerated");
        }

        for &device in devices {
            match evaluate(query, device, surface, &self.required_extensions)? {
                Suitability::Suitable(selected) => {
                    tracing::debug!(?device, queue_families = ?selected.queue_families, "Device is suitable");
                    return Ok(selected);
                }
                Suitability::Unsuitable(reason) => {
                    tracing::debug!(?device, %reason, "Device is unsuitable");
                }
            }
        }

        Err(DeviceSelectionError::NoCompatibleHardware {
            enumerated: devices.len(),
        })
    }
}

impl Default for DeviceSelector {
    fn default() -> Self {
        Self::new()
    }
}

/// A created logical device and the queues retrieved from it.
pub struct LogicalDevice {
    /// The device itself.
    pub device: Device,
    /// Queue 0 of the graphics family.
    pub graphics_queue: vk::Queue,
    /// Queue 0 of the present family. May equal `graphics_queue`.
    pub present_queue: vk::Queue,
}

impl LogicalDevice {
    /// Create the logical device for `selected`, with one queue per unique
    /// queue family and `extensions` enabled.
    ///
    /// The instance's enabled layers are passed along as well, which only
    /// matters for loaders predating the removal of device layers.
    pub unsafe fn create(
        instance: &Instance,
        instance_metadata: &InstanceMetadata,
        selected: &SelectedDevice,
        extensions: &[&CStr],
    ) -> VkResult<LogicalDevice> {
        debug_assert_eq!(instance.handle(), instance_metadata.instance_handle());

        let priorities = [1.0];
        let queue_infos: BootstrapSmallVec<_> = selected
            .queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extension_ptrs: BootstrapSmallVec<_> =
            extensions.iter().map(|name| name.as_ptr()).collect();
        let layer_ptrs: BootstrapSmallVec<_> = instance_metadata
            .enabled_layers()
            .iter()
            .map(|name| name.as_ptr())
            .collect();
        let features = vk::PhysicalDeviceFeatures::default();

        let device_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs)
            .enabled_features(&features);

        let device = instance.create_device(selected.physical_device, &device_info, None)?;
        let families = selected.queue_families;
        Ok(LogicalDevice {
            graphics_queue: device.get_device_queue(families.graphics, 0),
            present_queue: device.get_device_queue(families.present, 0),
            device,
        })
    }
}
