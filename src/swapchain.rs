//! Swapchain utils.
//!
//! Negotiation is split from creation: [`SwapchainConfig::negotiate`] is pure
//! and decides everything from a [`SurfaceSupport`] snapshot, while
//! [`Swapchain::create`] only hands the decisions to the runtime.
use crate::device::{QueueFamilies, SelectedDevice};
use crate::query::SurfaceSupport;
use crate::BootstrapSmallVec;
use ash::extensions::khr;
use ash::prelude::VkResult;
use ash::{vk, Device, Instance};

/// Present mode every implementation has to support.
pub const FALLBACK_PRESENT_MODE: vk::PresentModeKHR = vk::PresentModeKHR::FIFO;

/// [`Swapchain`] configuration.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainOptions {
    preferred_format: vk::SurfaceFormatKHR,
    preferred_present_mode: vk::PresentModeKHR,
    usage: vk::ImageUsageFlags,
    composite_alpha: vk::CompositeAlphaFlagsKHR,
}

impl SwapchainOptions {
    /// Uses the default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Format and color space to look for. Defaults to 8-bit BGRA UNORM in
    /// the sRGB nonlinear color space.
    pub fn preferred_format(&mut self, format: vk::SurfaceFormatKHR) -> &mut Self {
        self.preferred_format = format;
        self
    }

    /// Present mode to look for before falling back to
    /// [`FALLBACK_PRESENT_MODE`]. Defaults to [`vk::PresentModeKHR::MAILBOX`].
    pub fn preferred_present_mode(&mut self, mode: vk::PresentModeKHR) -> &mut Self {
        self.preferred_present_mode = mode;
        self
    }

    /// Required swapchain image usage flags. Defaults to [`vk::ImageUsageFlags::COLOR_ATTACHMENT`].
    pub fn usage(&mut self, usage: vk::ImageUsageFlags) -> &mut Self {
        self.usage = usage;
        self
    }

    /// Requires swapchain image composite alpha. Defaults to [`vk::CompositeAlphaFlagsKHR::OPAQUE`].
    pub fn composite_alpha(&mut self, value: vk::CompositeAlphaFlagsKHR) -> &mut Self {
        self.composite_alpha = value;
        self
    }
}

impl Default for SwapchainOptions {
    fn default() -> Self {
        Self {
            preferred_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            preferred_present_mode: vk::PresentModeKHR::MAILBOX,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
        }
    }
}

fn same_format(a: vk::SurfaceFormatKHR, b: vk::SurfaceFormatKHR) -> bool {
    a.format == b.format && a.color_space == b.color_space
}

/// Pick the surface format.
///
/// A single `UNDEFINED` entry means the surface takes anything, so
/// `preferred` is used as is. Otherwise `preferred` is used if it is listed,
/// and the first listed format if it isn't. An empty list also yields
/// `preferred`.
pub fn choose_surface_format(
    available: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> vk::SurfaceFormatKHR {
    match available {
        [] => preferred,
        [only] if only.format == vk::Format::UNDEFINED => preferred,
        [first, ..] => available
            .iter()
            .copied()
            .find(|&format| same_format(format, preferred))
            .unwrap_or(*first),
    }
}

/// Pick `preferred` if it is available, [`FALLBACK_PRESENT_MODE`] otherwise.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        FALLBACK_PRESENT_MODE
    }
}

/// Pick the swapchain extent.
///
/// The runtime's current extent wins unless it is the `u32::MAX` "window
/// decides" marker, in which case `preferred` is clamped into the supported
/// range on each axis.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    preferred: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (min, max) = (capabilities.min_image_extent, capabilities.max_image_extent);
    vk::Extent2D {
        width: preferred.width.min(max.width).max(min.width),
        height: preferred.height.min(max.height).max(min.height),
    }
}

/// Format, present mode and extent negotiated with the surface.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceConfig {
    /// Image format and color space.
    pub format: vk::SurfaceFormatKHR,
    /// Presentation mode.
    pub present_mode: vk::PresentModeKHR,
    /// Image size.
    pub extent: vk::Extent2D,
}

/// Run the three independent surface decisions.
pub fn negotiate_surface_config(
    support: &SurfaceSupport,
    preferred_extent: vk::Extent2D,
    options: &SwapchainOptions,
) -> SurfaceConfig {
    SurfaceConfig {
        format: choose_surface_format(&support.formats, options.preferred_format),
        present_mode: choose_present_mode(&support.present_modes, options.preferred_present_mode),
        extent: choose_extent(&support.capabilities, preferred_extent),
    }
}

/// Image count and sharing parameters for the swapchain images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationParams {
    /// Minimum number of images to request.
    pub image_count: u32,
    /// [`vk::SharingMode::CONCURRENT`] when graphics and present families differ.
    pub sharing_mode: vk::SharingMode,
    /// Families sharing the images. Empty in exclusive mode.
    pub sharer_indices: BootstrapSmallVec<u32>,
}

/// One image more than the minimum, capped by a nonzero maximum. Sharing is
/// concurrent across both families when they differ, exclusive otherwise.
pub fn build_presentation_params(
    families: QueueFamilies,
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> PresentationParams {
    let mut image_count = capabilities.min_image_count.saturating_add(1);
    if capabilities.max_image_count > 0 {
        image_count = image_count.min(capabilities.max_image_count);
    }

    let (sharing_mode, sharer_indices) = if families.graphics != families.present {
        (vk::SharingMode::CONCURRENT, families.unique())
    } else {
        (vk::SharingMode::EXCLUSIVE, BootstrapSmallVec::new())
    };

    PresentationParams {
        image_count,
        sharing_mode,
        sharer_indices,
    }
}

/// Everything decided about a swapchain before creating it.
///
/// Never changed after negotiation. If the surface changes, negotiate a new
/// one.
#[derive(Debug, Clone)]
pub struct SwapchainConfig {
    /// Negotiated format, present mode and extent.
    pub surface: SurfaceConfig,
    /// Image count and sharing.
    pub presentation: PresentationParams,
    /// Families the presentation parameters were derived from.
    pub queue_families: QueueFamilies,
    /// Transform applied on presentation.
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainConfig {
    /// Negotiate against `support`, preferring `preferred_extent` (usually
    /// the window size) when the surface lets the application choose.
    pub fn negotiate(
        queue_families: QueueFamilies,
        support: &SurfaceSupport,
        preferred_extent: vk::Extent2D,
        options: &SwapchainOptions,
    ) -> SwapchainConfig {
        SwapchainConfig {
            surface: negotiate_surface_config(support, preferred_extent, options),
            presentation: build_presentation_params(queue_families, &support.capabilities),
            queue_families,
            pre_transform: support.capabilities.current_transform,
        }
    }

    /// [`SwapchainConfig::negotiate`] with what was learned while selecting
    /// the device.
    #[inline]
    pub fn for_device(
        selected: &SelectedDevice,
        preferred_extent: vk::Extent2D,
        options: &SwapchainOptions,
    ) -> SwapchainConfig {
        SwapchainConfig::negotiate(
            selected.queue_families,
            &selected.surface_support,
            preferred_extent,
            options,
        )
    }
}

const COLOR_SUBRESOURCE_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

/// A created swapchain, its images and one view per image.
pub struct Swapchain {
    loader: khr::Swapchain,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create the swapchain described by `config` for `surface`, then a 2D
    /// color view for each of its images.
    ///
    /// # Safety
    ///
    /// `device` must have been created from `instance` with the swapchain
    /// extension enabled, and `surface` must be the surface `config` was
    /// negotiated against.
    pub unsafe fn create(
        instance: &Instance,
        device: &Device,
        surface: vk::SurfaceKHR,
        config: &SwapchainConfig,
        options: &SwapchainOptions,
    ) -> VkResult<Swapchain> {
        let loader = khr::Swapchain::new(instance, device);
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(config.presentation.image_count)
            .image_format(config.surface.format.format)
            .image_color_space(config.surface.format.color_space)
            .image_extent(config.surface.extent)
            .image_array_layers(1)
            .image_usage(options.usage)
            .image_sharing_mode(config.presentation.sharing_mode)
            .queue_family_indices(&config.presentation.sharer_indices)
            .pre_transform(config.pre_transform)
            .composite_alpha(options.composite_alpha)
            .present_mode(config.surface.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let handle = loader.create_swapchain(&create_info, None)?;
        let mut swapchain = Swapchain {
            loader,
            handle,
            images: Vec::new(),
            image_views: Vec::new(),
            format: config.surface.format,
            extent: config.surface.extent,
        };

        // The runtime may create more images than requested.
        match swapchain.create_image_views(device) {
            Ok(()) => {
                tracing::info!(
                    images = swapchain.images.len(),
                    format = ?swapchain.format.format,
                    extent = ?swapchain.extent,
                    "Created swapchain"
                );
                Ok(swapchain)
            }
            Err(err) => {
                swapchain.destroy(device);
                Err(err)
            }
        }
    }

    unsafe fn create_image_views(&mut self, device: &Device) -> VkResult<()> {
        self.images = self.loader.get_swapchain_images(self.handle)?;
        for &image in &self.images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(COLOR_SUBRESOURCE_RANGE);
            self.image_views
                .push(device.create_image_view(&view_info, None)?);
        }

        Ok(())
    }

    /// The raw swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    /// Swapchain images, owned by the swapchain.
    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// One view per entry in [`images`](Self::images).
    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Format and color space of the images.
    #[inline]
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Dimensions of the images.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Destroy the image views, then the swapchain.
    ///
    /// # Safety
    ///
    /// `device` must be the device the swapchain was created with, and no
    /// image may be in use.
    pub unsafe fn destroy(&mut self, device: &Device) {
        for view in self.image_views.drain(..) {
            device.destroy_image_view(view, None);
        }
        self.images.clear();

        if self.handle != vk::SwapchainKHR::null() {
            self.loader.destroy_swapchain(self.handle, None);
            self.handle = vk::SwapchainKHR::null();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFERRED: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn pair(format: vk::SurfaceFormatKHR) -> (vk::Format, vk::ColorSpaceKHR) {
        (format.format, format.color_space)
    }

    fn size(extent: vk::Extent2D) -> (u32, u32) {
        (extent.width, extent.height)
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    fn window_decides(min: vk::Extent2D, max: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: min,
            max_image_extent: max,
            ..Default::default()
        }
    }

    #[test]
    fn undefined_format_yields_preferred() {
        let available = [format(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        assert_eq!(pair(choose_surface_format(&available, PREFERRED)), pair(PREFERRED));

        let odd_color_space = [format(
            vk::Format::UNDEFINED,
            vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        )];
        assert_eq!(
            pair(choose_surface_format(&odd_color_space, PREFERRED)),
            pair(PREFERRED)
        );
    }

    #[test]
    fn preferred_format_found_anywhere() {
        let others = [
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
            format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        for position in 0..=others.len() {
            let mut available = others.to_vec();
            available.insert(position, PREFERRED);
            assert_eq!(pair(choose_surface_format(&available, PREFERRED)), pair(PREFERRED));
        }
    }

    #[test]
    fn missing_preferred_format_yields_first() {
        let available = [
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        assert_eq!(
            pair(choose_surface_format(&available, PREFERRED)),
            pair(available[0])
        );
    }

    #[test]
    fn undefined_among_others_is_not_the_wildcard() {
        let available = [
            format(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(
            pair(choose_surface_format(&available, PREFERRED)),
            pair(available[0])
        );
    }

    #[test]
    fn mailbox_preferred_when_present() {
        let modes = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::MAILBOX], vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(
                &[vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::MAILBOX],
                vk::PresentModeKHR::MAILBOX
            ),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn fifo_fallback_without_mailbox() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            FALLBACK_PRESENT_MODE
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE], vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(
                &[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::IMMEDIATE],
                vk::PresentModeKHR::MAILBOX
            ),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn fixed_current_extent_is_returned_verbatim() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(1024, 768),
            min_image_extent: extent(64, 64),
            max_image_extent: extent(640, 480),
            ..Default::default()
        };
        let chosen = choose_extent(&caps, extent(800, 600));
        assert_eq!(size(chosen), (1024, 768));
        assert_eq!(size(chosen), size(caps.current_extent));
    }

    #[test]
    fn preferred_extent_within_bounds_is_unchanged() {
        let caps = window_decides(extent(64, 64), extent(4096, 4096));
        assert_eq!(size(choose_extent(&caps, extent(800, 600))), (800, 600));
    }

    #[test]
    fn preferred_extent_is_clamped_per_axis() {
        let caps = window_decides(extent(64, 64), extent(640, 480));
        assert_eq!(size(choose_extent(&caps, extent(800, 600))), (640, 480));

        let caps = window_decides(extent(64, 700), extent(4096, 4096));
        assert_eq!(size(choose_extent(&caps, extent(800, 600))), (800, 700));
    }

    #[test]
    fn shared_family_is_exclusive() {
        let params = build_presentation_params(
            QueueFamilies {
                graphics: 0,
                present: 0,
            },
            &capabilities(2, 0),
        );
        assert_eq!(params.sharing_mode, vk::SharingMode::EXCLUSIVE);
        assert!(params.sharer_indices.is_empty());
    }

    #[test]
    fn split_families_are_concurrent() {
        let params = build_presentation_params(
            QueueFamilies {
                graphics: 0,
                present: 1,
            },
            &capabilities(2, 0),
        );
        assert_eq!(params.sharing_mode, vk::SharingMode::CONCURRENT);
        assert_eq!(params.sharer_indices.as_slice(), &[0, 1]);
    }

    #[test]
    fn image_count_is_min_plus_one() {
        let families = QueueFamilies {
            graphics: 0,
            present: 0,
        };
        assert_eq!(build_presentation_params(families, &capabilities(2, 0)).image_count, 3);
        assert_eq!(build_presentation_params(families, &capabilities(2, 8)).image_count, 3);
    }

    #[test]
    fn image_count_saturates_at_u32_max() {
        let families = QueueFamilies {
            graphics: 0,
            present: 0,
        };
        assert_eq!(
            build_presentation_params(families, &capabilities(u32::MAX, 0)).image_count,
            u32::MAX
        );
        assert_eq!(
            build_presentation_params(families, &capabilities(u32::MAX, u32::MAX)).image_count,
            u32::MAX
        );
        assert_eq!(
            build_presentation_params(families, &capabilities(u32::MAX - 1, u32::MAX)).image_count,
            u32::MAX
        );
    }

    #[test]
    fn image_count_is_capped_by_nonzero_max() {
        let families = QueueFamilies {
            graphics: 0,
            present: 0,
        };
        assert_eq!(build_presentation_params(families, &capabilities(2, 2)).image_count, 2);
    }

    #[test]
    fn negotiate_combines_decisions() {
        let support = SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 1,
                max_image_count: 0,
                current_transform: vk::SurfaceTransformFlagsKHR::ROTATE_90,
                ..window_decides(extent(1, 1), extent(640, 480))
            },
            formats: vec![PREFERRED],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };
        let config = SwapchainConfig::negotiate(
            QueueFamilies {
                graphics: 2,
                present: 0,
            },
            &support,
            extent(800, 600),
            &SwapchainOptions::default(),
        );

        assert_eq!(pair(config.surface.format), pair(PREFERRED));
        assert_eq!(config.surface.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(size(config.surface.extent), (640, 480));
        assert_eq!(config.presentation.image_count, 2);
        assert_eq!(config.presentation.sharer_indices.as_slice(), &[2, 0]);
        assert_eq!(config.pre_transform, vk::SurfaceTransformFlagsKHR::ROTATE_90);
    }

    #[test]
    fn options_override_preferences() {
        let mut options = SwapchainOptions::new();
        options
            .preferred_format(format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR))
            .preferred_present_mode(vk::PresentModeKHR::IMMEDIATE);
        let support = SurfaceSupport {
            capabilities: capabilities(2, 0),
            formats: vec![
                PREFERRED,
                format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            ],
            present_modes: vec![vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE],
        };

        let config = negotiate_surface_config(&support, extent(800, 600), &options);
        assert_eq!(
            pair(config.format),
            (vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)
        );
        assert_eq!(config.present_mode, vk::PresentModeKHR::IMMEDIATE);
    }
}
