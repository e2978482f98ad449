//! Instance creation utils.
use crate::query::enumerate;
use crate::BootstrapSmallVec;
use ash::extensions::ext::DebugUtils;
use ash::prelude::VkResult;
use ash::{vk, Entry, Instance};
use cstr::cstr;
#[cfg(feature = "surface")]
use raw_window_handle::HasRawDisplayHandle;
use std::{
    collections::HashSet,
    ffi::{c_void, CStr, CString, NulError},
    fmt, ptr,
};
use thiserror::Error;

/// Name of the Khronos validation layer.
pub const VALIDATION_LAYER: &CStr = cstr!("VK_LAYER_KHRONOS_validation");

/// Require, request or disable validation layers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValidationLayers {
    /// Instance creation will fail if there are no validation layers installed.
    Require,
    /// If there are validation layers installed, enable them.
    Request,
    /// Don't enable validation layers.
    Disable,
}

impl ValidationLayers {
    /// The compiled-in toggle: validation is required in debug builds and
    /// disabled in release builds.
    #[inline]
    pub fn for_build() -> Self {
        if cfg!(debug_assertions) {
            ValidationLayers::Require
        } else {
            ValidationLayers::Disable
        }
    }

    /// Whether this setting asks for the layer at all.
    #[inline]
    pub fn is_enabled(self) -> bool {
        !matches!(self, ValidationLayers::Disable)
    }
}

/// Enable or disable the debug messenger, optionally providing a custom callback.
#[derive(Copy, Clone)]
pub enum DebugMessenger {
    /// Enables the debug messenger with the [`default_debug_callback`]
    /// callback.
    Default,
    /// Enables the debug messenger with a custom, user-provided callback.
    Custom {
        /// The user provided callback function. Feel free to take a look at the
        /// [`default_debug_callback`] when implementing your own.
        callback: vk::PFN_vkDebugUtilsMessengerCallbackEXT,
        /// A user data pointer passed to the debug callback.
        user_data_pointer: *mut c_void,
    },
    /// Disables the debug messenger.
    Disable,
}

/// The default debug callback used in [`DebugMessenger::Default`].
///
/// Forwards every message to `tracing` under the `vk-debug-messenger` target,
/// at the level matching its severity.
pub unsafe extern "system" fn default_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    let message_type = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "GENERAL",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "VALIDATION",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "PERFORMANCE",
        _ => "UNKNOWN",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => {
            tracing::trace!(target: "vk-debug-messenger", "[{}] {}", message_type, message)
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            tracing::info!(target: "vk-debug-messenger", "[{}] {}", message_type, message)
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            tracing::warn!(target: "vk-debug-messenger", "[{}] {}", message_type, message)
        }
        _ => tracing::error!(target: "vk-debug-messenger", "[{}] {}", message_type, message),
    }

    vk::FALSE
}

/// A created debug messenger together with the loader needed to destroy it.
pub struct ActiveDebugMessenger {
    loader: DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl ActiveDebugMessenger {
    /// The raw messenger handle.
    #[inline]
    pub fn handle(&self) -> vk::DebugUtilsMessengerEXT {
        self.messenger
    }

    /// Destroy the messenger. Must happen before the instance is destroyed.
    pub unsafe fn destroy(&self) {
        self.loader
            .destroy_debug_utils_messenger(self.messenger, None);
    }
}

/// Metadata for after instance creation.
#[derive(Clone)]
pub struct InstanceMetadata {
    instance_handle: vk::Instance,
    api_version: u32,
    enabled_layers: BootstrapSmallVec<CString>,
    enabled_extensions: BootstrapSmallVec<CString>,
}

impl InstanceMetadata {
    /// The instance this metadata belongs to.
    #[inline]
    pub fn instance_handle(&self) -> vk::Instance {
        self.instance_handle
    }

    /// Retrieve the used instance API version.
    #[inline]
    pub fn api_version_raw(&self) -> u32 {
        self.api_version
    }

    /// Retrieve the used instance API major version.
    #[inline]
    pub fn api_version_major(&self) -> u32 {
        vk::api_version_major(self.api_version)
    }

    /// Retrieve the used instance API minor version.
    #[inline]
    pub fn api_version_minor(&self) -> u32 {
        vk::api_version_minor(self.api_version)
    }

    /// List of all enabled layers in the instance.
    #[inline]
    pub fn enabled_layers(&self) -> &[CString] {
        &self.enabled_layers
    }

    /// Returns true if `layer` is enabled.
    #[inline]
    pub fn is_layer_enabled(&self, layer: &CStr) -> bool {
        self.enabled_layers.iter().any(|e| e.as_c_str() == layer)
    }

    /// List of all enabled extensions in the instance.
    #[inline]
    pub fn enabled_extensions(&self) -> &[CString] {
        &self.enabled_extensions
    }

    /// Returns true if `extension` is enabled.
    #[inline]
    pub fn is_extension_enabled(&self, extension: &CStr) -> bool {
        self.enabled_extensions
            .iter()
            .any(|e| e.as_c_str() == extension)
    }
}

impl fmt::Debug for InstanceMetadata {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("InstanceMetadata")
            .field(
                "api_version",
                &format_args!("{}.{}", self.api_version_major(), self.api_version_minor()),
            )
            .field("enabled_layers", &self.enabled_layers)
            .field("enabled_extensions", &self.enabled_extensions)
            .finish()
    }
}

/// Errors that can occur during instance creation.
#[derive(Debug, Error)]
pub enum InstanceCreationError {
    /// A query against the runtime failed.
    #[error("vulkan error")]
    VulkanError(#[from] vk::Result),
    /// One or more required layers are not present.
    #[error("layers ({0:?}) requested, but not available")]
    UnsupportedLayer(BootstrapSmallVec<CString>),
    /// One or more required extensions are not present.
    #[error("extensions ({0:?}) not present")]
    ExtensionsNotPresent(BootstrapSmallVec<CString>),
    /// The runtime rejected the instance create info.
    #[error("failed to create instance: {0}")]
    CreationFailed(#[source] vk::Result),
    /// The runtime rejected the debug messenger create info.
    #[error("failed to set up the debug messenger: {0}")]
    DebugMessengerFailed(#[source] vk::Result),
}

/// Outcome of checking a list of wanted names against what is available.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Negotiated {
    /// Names which are available and will be enabled, without duplicates.
    pub enabled: BootstrapSmallVec<CString>,
    /// Required names which are not available.
    pub missing: BootstrapSmallVec<CString>,
}

/// Split `wanted` (name, required) pairs into the ones to enable and the
/// required ones that are missing from `available`. Optional names that are
/// not available are dropped silently.
pub fn negotiate(wanted: &[(CString, bool)], available: &HashSet<CString>) -> Negotiated {
    let mut negotiated = Negotiated::default();
    for (name, required) in wanted {
        if negotiated.enabled.contains(name) || negotiated.missing.contains(name) {
            continue;
        }

        match (*required, available.contains(name.as_c_str())) {
            (_, true) => negotiated.enabled.push(name.clone()),
            (true, false) => negotiated.missing.push(name.clone()),
            (false, false) => (),
        }
    }

    negotiated
}

unsafe fn available_layers(entry: &Entry) -> VkResult<HashSet<CString>> {
    let fp = entry.fp_v1_0();
    let properties =
        enumerate(|count, data| (fp.enumerate_instance_layer_properties)(count, data))?;
    Ok(properties
        .iter()
        .map(|layer| CStr::from_ptr(layer.layer_name.as_ptr()).to_owned())
        .collect())
}

unsafe fn available_extensions(
    entry: &Entry,
    layers: &[CString],
) -> VkResult<HashSet<CString>> {
    let fp = entry.fp_v1_0();
    let mut names = HashSet::new();
    // The implicit extension list, then whatever each enabled layer adds.
    let sources = std::iter::once(ptr::null()).chain(layers.iter().map(|layer| layer.as_ptr()));
    for layer_name in sources {
        let properties = enumerate(|count, data| {
            (fp.enumerate_instance_extension_properties)(layer_name, count, data)
        })?;
        names.extend(
            properties
                .iter()
                .map(|extension| CStr::from_ptr(extension.extension_name.as_ptr()).to_owned()),
        );
    }

    Ok(names)
}

/// Allows to easily create an [`ash::Instance`] and friends.
pub struct InstanceBuilder {
    app_name: Option<CString>,
    app_version: Option<u32>,
    engine_name: Option<CString>,
    engine_version: Option<u32>,
    api_version: u32,
    layers: BootstrapSmallVec<(CString, bool)>,
    extensions: BootstrapSmallVec<(CString, bool)>,
    debug_messenger: DebugMessenger,
    debug_message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    debug_message_type: vk::DebugUtilsMessageTypeFlagsEXT,
}

impl InstanceBuilder {
    /// Create a new instance builder with opinionated defaults.
    #[inline]
    pub fn new() -> Self {
        InstanceBuilder {
            app_name: None,
            app_version: None,
            engine_name: None,
            engine_version: None,
            api_version: vk::API_VERSION_1_0,
            layers: BootstrapSmallVec::new(),
            extensions: BootstrapSmallVec::new(),
            debug_messenger: DebugMessenger::Disable,
            debug_message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            debug_message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        }
    }

    /// Application name to advertise.
    #[inline]
    pub fn app_name(mut self, app_name: &str) -> Result<Self, NulError> {
        self.app_name = Some(CString::new(app_name)?);
        Ok(self)
    }

    /// Application version to advertise.
    #[inline]
    pub fn app_version(mut self, major: u32, minor: u32) -> Self {
        self.app_version = Some(vk::make_api_version(0, major, minor, 0));
        self
    }

    /// Engine name to advertise.
    #[inline]
    pub fn engine_name(mut self, engine_name: &str) -> Result<Self, NulError> {
        self.engine_name = Some(CString::new(engine_name)?);
        Ok(self)
    }

    /// Engine version to advertise.
    #[inline]
    pub fn engine_version(mut self, major: u32, minor: u32) -> Self {
        self.engine_version = Some(vk::make_api_version(0, major, minor, 0));
        self
    }

    /// Instance API version to request. Defaults to 1.0.
    #[inline]
    pub fn api_version(mut self, major: u32, minor: u32) -> Self {
        self.api_version = vk::make_api_version(0, major, minor, 0);
        self
    }

    /// Try to enable this layer, ignore if it's not supported
    #[inline]
    pub fn request_layer(mut self, layer: &CStr) -> Self {
        self.layers.push((layer.to_owned(), false));
        self
    }

    /// Enable this layer, fail if it's not supported.
    #[inline]
    pub fn require_layer(mut self, layer: &CStr) -> Self {
        self.layers.push((layer.to_owned(), true));
        self
    }

    /// Try to enable this extension, ignore if it is not supported.
    #[inline]
    pub fn request_extension(mut self, extension: &CStr) -> Self {
        self.extensions.push((extension.to_owned(), false));
        self
    }

    /// Enable this extension, fail if it's not supported.
    #[inline]
    pub fn require_extension(mut self, extension: &CStr) -> Self {
        self.extensions.push((extension.to_owned(), true));
        self
    }

    #[cfg(feature = "surface")]
    /// Adds an requirement on all Vulkan extensions necessary to create a
    /// surface on `display_handle`. Returns `None` if the windowing system is
    /// not supported. This is only supported on feature `surface`.
    #[inline]
    pub fn require_surface_extensions(
        mut self,
        display_handle: &impl HasRawDisplayHandle,
    ) -> Option<Self> {
        let required_extensions =
            ash_window::enumerate_required_extensions(display_handle.raw_display_handle()).ok()?;
        self.extensions.extend(
            required_extensions
                .iter()
                .map(|&name| (unsafe { CStr::from_ptr(name) }.to_owned(), true)),
        );
        Some(self)
    }

    /// Add the Khronos validation layer, as required or requested.
    #[inline]
    pub fn validation_layers(mut self, validation_layers: ValidationLayers) -> Self {
        if validation_layers.is_enabled() {
            self.layers.push((
                VALIDATION_LAYER.to_owned(),
                matches!(validation_layers, ValidationLayers::Require),
            ));
        }

        self
    }

    /// Try to create a debug messenger with the config provided by
    /// `debug_messenger`.
    #[inline]
    pub fn request_debug_messenger(mut self, debug_messenger: DebugMessenger) -> Self {
        if !matches!(debug_messenger, DebugMessenger::Disable) {
            self.extensions.push((DebugUtils::name().to_owned(), false));
        }

        self.debug_messenger = debug_messenger;
        self
    }

    /// Filter for the severity of debug messages.
    #[inline]
    pub fn debug_message_severity(
        mut self,
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    ) -> Self {
        self.debug_message_severity = severity;
        self
    }

    /// Filter for the type of debug messages.
    #[inline]
    pub fn debug_message_type(mut self, ty: vk::DebugUtilsMessageTypeFlagsEXT) -> Self {
        self.debug_message_type = ty;
        self
    }

    fn messenger_info(&self) -> Option<vk::DebugUtilsMessengerCreateInfoEXT> {
        let info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(self.debug_message_severity)
            .message_type(self.debug_message_type);
        let info = match self.debug_messenger {
            DebugMessenger::Default => info.pfn_user_callback(Some(default_debug_callback)),
            DebugMessenger::Custom {
                callback,
                user_data_pointer,
            } => info.pfn_user_callback(callback).user_data(user_data_pointer),
            DebugMessenger::Disable => return None,
        };

        Some(info.build())
    }

    /// Returns the [`ash::Instance`], an debug messenger if it was
    /// requested and successfully created, and [`InstanceMetadata`] about what
    /// is actually enabled in the instance.
    pub unsafe fn build(
        self,
        entry: &Entry,
    ) -> Result<
        (Instance, Option<ActiveDebugMessenger>, InstanceMetadata),
        InstanceCreationError,
    > {
        let layers = negotiate(&self.layers, &available_layers(entry)?);
        if !layers.missing.is_empty() {
            return Err(InstanceCreationError::UnsupportedLayer(layers.missing));
        }

        let extensions = negotiate(
            &self.extensions,
            &available_extensions(entry, &layers.enabled)?,
        );
        if !extensions.missing.is_empty() {
            return Err(InstanceCreationError::ExtensionsNotPresent(
                extensions.missing,
            ));
        }

        tracing::debug!(
            layers = ?layers.enabled,
            extensions = ?extensions.enabled,
            "Negotiated instance layers and extensions"
        );

        let mut app_info = vk::ApplicationInfo::builder().api_version(self.api_version);
        if let Some(app_name) = &self.app_name {
            app_info = app_info.application_name(app_name);
        }
        if let Some(app_version) = self.app_version {
            app_info = app_info.application_version(app_version);
        }
        if let Some(engine_name) = &self.engine_name {
            app_info = app_info.engine_name(engine_name);
        }
        if let Some(engine_version) = self.engine_version {
            app_info = app_info.engine_version(engine_version);
        }

        let layer_ptrs: BootstrapSmallVec<_> =
            layers.enabled.iter().map(|name| name.as_ptr()).collect();
        let extension_ptrs: BootstrapSmallVec<_> =
            extensions.enabled.iter().map(|name| name.as_ptr()).collect();

        let is_debug_utils_enabled = extensions
            .enabled
            .iter()
            .any(|name| name.as_c_str() == DebugUtils::name());
        let mut messenger_info = self
            .messenger_info()
            .filter(|_| is_debug_utils_enabled);

        let mut instance_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);
        // Chained so instance creation and destruction are covered as well.
        if let Some(messenger_info) = messenger_info.as_mut() {
            instance_info = instance_info.push_next(messenger_info);
        }

        let instance = entry
            .create_instance(&instance_info, None)
            .map_err(InstanceCreationError::CreationFailed)?;

        let debug_messenger = match messenger_info {
            Some(mut messenger_info) => {
                messenger_info.p_next = ptr::null();
                let loader = DebugUtils::new(entry, &instance);
                match loader.create_debug_utils_messenger(&messenger_info, None) {
                    Ok(messenger) => Some(ActiveDebugMessenger { loader, messenger }),
                    Err(err) => {
                        instance.destroy_instance(None);
                        return Err(InstanceCreationError::DebugMessengerFailed(err));
                    }
                }
            }
            None => None,
        };

        let instance_metadata = InstanceMetadata {
            instance_handle: instance.handle(),
            api_version: self.api_version,
            enabled_layers: layers.enabled,
            enabled_extensions: extensions.enabled,
        };
        tracing::info!(?instance_metadata, "Created instance");

        Ok((instance, debug_messenger, instance_metadata))
    }
}

impl Default for InstanceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> HashSet<CString> {
        list.iter().map(|&name| CString::new(name).unwrap()).collect()
    }

    fn wanted(name: &str, required: bool) -> (CString, bool) {
        (CString::new(name).unwrap(), required)
    }

    #[test]
    fn negotiate_enables_available_names() {
        let available = names(&["VK_KHR_surface", "VK_EXT_debug_utils"]);
        let negotiated = negotiate(
            &[
                wanted("VK_KHR_surface", true),
                wanted("VK_EXT_debug_utils", false),
            ],
            &available,
        );

        assert_eq!(negotiated.enabled.len(), 2);
        assert!(negotiated.missing.is_empty());
    }

    #[test]
    fn negotiate_reports_missing_required() {
        let negotiated = negotiate(&[wanted("VK_LAYER_KHRONOS_validation", true)], &names(&[]));

        assert!(negotiated.enabled.is_empty());
        assert_eq!(
            negotiated.missing.as_slice(),
            &[CString::new("VK_LAYER_KHRONOS_validation").unwrap()]
        );
    }

    #[test]
    fn negotiate_drops_missing_optional() {
        let negotiated = negotiate(
            &[
                wanted("VK_KHR_surface", true),
                wanted("VK_EXT_debug_utils", false),
            ],
            &names(&["VK_KHR_surface"]),
        );

        assert_eq!(
            negotiated.enabled.as_slice(),
            &[CString::new("VK_KHR_surface").unwrap()]
        );
        assert!(negotiated.missing.is_empty());
    }

    #[test]
    fn negotiate_deduplicates() {
        let negotiated = negotiate(
            &[
                wanted("VK_KHR_surface", false),
                wanted("VK_KHR_surface", true),
                wanted("VK_KHR_xlib_surface", true),
                wanted("VK_KHR_xlib_surface", true),
            ],
            &names(&["VK_KHR_surface"]),
        );

        assert_eq!(negotiated.enabled.len(), 1);
        assert_eq!(negotiated.missing.len(), 1);
    }

    #[test]
    fn validation_layers_push_khronos_layer() {
        let builder = InstanceBuilder::new().validation_layers(ValidationLayers::Require);
        assert_eq!(
            builder.layers.as_slice(),
            &[(VALIDATION_LAYER.to_owned(), true)]
        );

        let builder = InstanceBuilder::new().validation_layers(ValidationLayers::Request);
        assert_eq!(
            builder.layers.as_slice(),
            &[(VALIDATION_LAYER.to_owned(), false)]
        );

        let builder = InstanceBuilder::new().validation_layers(ValidationLayers::Disable);
        assert!(builder.layers.is_empty());
    }

    #[test]
    fn build_toggle_follows_debug_assertions() {
        assert_eq!(
            ValidationLayers::for_build().is_enabled(),
            cfg!(debug_assertions)
        );
    }

    #[test]
    fn debug_messenger_requests_debug_utils() {
        let builder = InstanceBuilder::new().request_debug_messenger(DebugMessenger::Default);
        assert!(builder
            .extensions
            .iter()
            .any(|(name, required)| name.as_c_str() == DebugUtils::name() && !required));
        assert!(builder.messenger_info().is_some());

        let builder = InstanceBuilder::new();
        assert!(builder.extensions.is_empty());
        assert!(builder.messenger_info().is_none());
    }

    #[test]
    fn layer_and_extension_setters_record_requirement() {
        let builder = InstanceBuilder::new()
            .request_layer(cstr!("VK_LAYER_MESA_overlay"))
            .require_layer(VALIDATION_LAYER)
            .request_extension(DebugUtils::name())
            .require_extension(cstr!("VK_KHR_surface"));

        assert_eq!(
            builder.layers.as_slice(),
            &[
                wanted("VK_LAYER_MESA_overlay", false),
                (VALIDATION_LAYER.to_owned(), true),
            ]
        );
        assert_eq!(
            builder.extensions.as_slice(),
            &[
                (DebugUtils::name().to_owned(), false),
                wanted("VK_KHR_surface", true),
            ]
        );

        let layers = negotiate(&builder.layers, &names(&["VK_LAYER_KHRONOS_validation"]));
        assert_eq!(layers.enabled.as_slice(), &[VALIDATION_LAYER.to_owned()]);
        assert!(layers.missing.is_empty());

        let extensions = negotiate(&builder.extensions, &names(&["VK_EXT_debug_utils"]));
        assert_eq!(
            extensions.missing.as_slice(),
            &[CString::new("VK_KHR_surface").unwrap()]
        );
    }

    #[test]
    fn api_version_defaults_to_1_0() {
        assert_eq!(InstanceBuilder::new().api_version, vk::API_VERSION_1_0);
        assert_eq!(
            InstanceBuilder::new().api_version(1, 2).api_version,
            vk::API_VERSION_1_2
        );
    }

    #[test]
    fn debug_filters_reach_messenger_info() {
        let info = InstanceBuilder::new()
            .request_debug_messenger(DebugMessenger::Default)
            .debug_message_severity(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR)
            .debug_message_type(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION)
            .messenger_info()
            .unwrap();

        assert_eq!(
            info.message_severity,
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
        );
        assert_eq!(
            info.message_type,
            vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
        );
        assert!(info.pfn_user_callback.is_some());
        assert!(info.p_user_data.is_null());
    }

    #[test]
    fn custom_messenger_keeps_user_data() {
        unsafe extern "system" fn silent(
            _: vk::DebugUtilsMessageSeverityFlagsEXT,
            _: vk::DebugUtilsMessageTypeFlagsEXT,
            _: *const vk::DebugUtilsMessengerCallbackDataEXT,
            _: *mut c_void,
        ) -> vk::Bool32 {
            vk::FALSE
        }

        let mut counter = 0u32;
        let user_data = &mut counter as *mut u32 as *mut c_void;
        let builder = InstanceBuilder::new().request_debug_messenger(DebugMessenger::Custom {
            callback: Some(silent),
            user_data_pointer: user_data,
        });
        let info = builder.messenger_info().unwrap();

        assert!(info.pfn_user_callback.is_some());
        assert_eq!(info.p_user_data, user_data);
        assert!(builder
            .extensions
            .iter()
            .any(|(name, _)| name.as_c_str() == DebugUtils::name()));
    }

    #[test]
    fn default_callback_never_aborts() {
        let message = CString::new("validation message").unwrap();
        let data = vk::DebugUtilsMessengerCallbackDataEXT {
            p_message: message.as_ptr(),
            ..Default::default()
        };

        let verdict = unsafe {
            default_debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                ptr::null_mut(),
            )
        };
        assert_eq!(verdict, vk::FALSE);

        let verdict = unsafe {
            default_debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
                ptr::null(),
                ptr::null_mut(),
            )
        };
        assert_eq!(verdict, vk::FALSE);
    }

    #[test]
    fn metadata_reports_enabled_names() {
        let metadata = InstanceMetadata {
            instance_handle: vk::Instance::null(),
            api_version: vk::API_VERSION_1_1,
            enabled_layers: [VALIDATION_LAYER.to_owned()].into_iter().collect(),
            enabled_extensions: [DebugUtils::name().to_owned()].into_iter().collect(),
        };

        assert!(metadata.is_layer_enabled(VALIDATION_LAYER));
        assert!(!metadata.is_layer_enabled(cstr!("VK_LAYER_MESA_overlay")));
        assert!(metadata.is_extension_enabled(DebugUtils::name()));
        assert!(!metadata.is_extension_enabled(cstr!("VK_KHR_surface")));
        assert_eq!(
            (metadata.api_version_major(), metadata.api_version_minor()),
            (1, 1)
        );
    }

    #[test]
    #[ignore = "requires a Vulkan loader"]
    fn basic() {
        let entry = unsafe { Entry::load() }.unwrap();
        let (instance, debug_messenger, metadata) = unsafe {
            InstanceBuilder::new()
                .validation_layers(ValidationLayers::Request)
                .request_debug_messenger(DebugMessenger::Default)
                .build(&entry)
                .unwrap()
        };
        assert_eq!(metadata.instance_handle(), instance.handle());

        unsafe {
            if let Some(debug_messenger) = debug_messenger {
                debug_messenger.destroy();
            }
            instance.destroy_instance(None);
        }
    }
}
