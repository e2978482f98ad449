//! Runtime query utils.
//!
//! Everything the selection logic learns about a physical device goes through
//! [`DeviceQuery`], so the decision code can be driven by a real instance
//! ([`AshQuery`]) or by a hand-built description of hardware in tests.
use ash::extensions::khr::Surface;
use ash::prelude::VkResult;
use ash::{vk, Instance};
use std::{
    collections::HashSet,
    ffi::{CStr, CString},
    ptr,
};

/// Runs a Vulkan "enumerate" style call: the first invocation asks for the
/// element count, the second fills a buffer of that size.
///
/// `VK_INCOMPLETE` means the list grew between the two calls, in which case
/// the whole query is repeated.
///
/// # Safety
///
/// `f` must write at most `*count` elements to the pointer it receives and
/// update `count` to the number it actually wrote.
pub unsafe fn enumerate<T, F>(mut f: F) -> VkResult<Vec<T>>
where
    F: FnMut(&mut u32, *mut T) -> vk::Result,
{
    loop {
        let mut count = 0;
        f(&mut count, ptr::null_mut()).result()?;

        let mut data = Vec::with_capacity(count as usize);
        let err = f(&mut count, data.as_mut_ptr());
        if err != vk::Result::INCOMPLETE {
            err.result()?;
            data.set_len(count as usize);
            return Ok(data);
        }
    }
}

/// Snapshot of what a surface supports on one physical device.
///
/// Always queried fresh for the device being looked at.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    /// Image count bounds, extent bounds and the current extent.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format / color space pairs, in the order the runtime reports them.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported presentation modes, in the order the runtime reports them.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// A swapchain can only be built if at least one format and one present
    /// mode are on offer.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// The capability queries device selection needs from the graphics runtime.
pub trait DeviceQuery {
    /// All physical devices, in the order the runtime reports them.
    fn enumerate_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>>;

    /// Queue families of `device`, indexed by queue family index.
    fn device_queue_families(
        &self,
        device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::QueueFamilyProperties>>;

    /// Whether queue family `queue_index` of `device` can present to `surface`.
    fn device_supports_present(
        &self,
        device: vk::PhysicalDevice,
        queue_index: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool>;

    /// Names of every extension `device` supports.
    fn device_extensions(&self, device: vk::PhysicalDevice) -> VkResult<HashSet<CString>>;

    /// What `surface` supports when driven by `device`.
    fn surface_support(
        &self,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<SurfaceSupport>;
}

/// [`DeviceQuery`] backed by a live Vulkan instance.
#[derive(Clone, Copy)]
pub struct AshQuery<'a> {
    instance: &'a Instance,
    surface_loader: &'a Surface,
}

impl<'a> AshQuery<'a> {
    /// Borrow `instance` and `surface_loader` for the duration of the queries.
    /// `surface_loader` must have been created from `instance`.
    #[inline]
    pub fn new(instance: &'a Instance, surface_loader: &'a Surface) -> Self {
        AshQuery {
            instance,
            surface_loader,
        }
    }

    /// Human readable name of `device`.
    pub fn device_name(&self, device: vk::PhysicalDevice) -> String {
        let properties = unsafe { self.instance.get_physical_device_properties(device) };
        unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    /// Type of `device`, for diagnostics.
    pub fn device_type(&self, device: vk::PhysicalDevice) -> vk::PhysicalDeviceType {
        unsafe { self.instance.get_physical_device_properties(device) }.device_type
    }
}

impl DeviceQuery for AshQuery<'_> {
    fn enumerate_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        let fp = self.instance.fp_v1_0();
        let handle = self.instance.handle();
        unsafe {
            enumerate(|count, data| (fp.enumerate_physical_devices)(handle, count, data))
        }
    }

    fn device_queue_families(
        &self,
        device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::QueueFamilyProperties>> {
        let fp = self.instance.fp_v1_0();
        unsafe {
            enumerate(|count, data| {
                (fp.get_physical_device_queue_family_properties)(device, count, data);
                vk::Result::SUCCESS
            })
        }
    }

    fn device_supports_present(
        &self,
        device: vk::PhysicalDevice,
        queue_index: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(device, queue_index, surface)
        }
    }

    fn device_extensions(&self, device: vk::PhysicalDevice) -> VkResult<HashSet<CString>> {
        let fp = self.instance.fp_v1_0();
        let properties = unsafe {
            enumerate(|count, data| {
                (fp.enumerate_device_extension_properties)(device, ptr::null(), count, data)
            })?
        };

        Ok(properties
            .iter()
            .map(|extension| unsafe { CStr::from_ptr(extension.extension_name.as_ptr()) }.to_owned())
            .collect())
    }

    fn surface_support(
        &self,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<SurfaceSupport> {
        let fp = self.surface_loader.fp();
        unsafe {
            let capabilities = self
                .surface_loader
                .get_physical_device_surface_capabilities(device, surface)?;
            let formats = enumerate(|count, data| {
                (fp.get_physical_device_surface_formats_khr)(device, surface, count, data)
            })?;
            let present_modes = enumerate(|count, data| {
                (fp.get_physical_device_surface_present_modes_khr)(device, surface, count, data)
            })?;

            Ok(SurfaceSupport {
                capabilities,
                formats,
                present_modes,
            })
        }
    }
}
