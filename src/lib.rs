#![allow(clippy::missing_safety_doc)]
#![warn(missing_docs)]
/*!
The Vulkan bootstrap sequence needed before a first triangle can be drawn,
built on [`ash`].

- ✅ Instance creation, with validation layers and a debug messenger
- ✅ Physical device selection against a window surface
- ✅ Logical device creation and queue retrieval
- ✅ Swapchain negotiation and creation, with one view per image
- ✅ Shader loading and the pipeline layout

Device selection and swapchain negotiation are plain functions over
[`DeviceQuery`] and [`SurfaceSupport`], so they can be exercised without a
GPU.

## Cargo Features

- `surface` (enabled by default): Enables the use of [`raw-window-handle`]
  and the [`VulkanContext`] that runs the whole sequence for a window.

## Example

```rust,ignore
let config = ContextConfig::default();
let context = VulkanContext::new(&window, &config)?;
println!("{:?}", context.swapchain_config());
// Everything is released, in order, when `context` is dropped.
```

[`raw-window-handle`]: https://crates.io/crates/raw-window-handle
*/

#[cfg(feature = "surface")]
pub mod context;
pub mod device;
pub mod instance;
pub mod pipeline;
pub mod query;
pub mod swapchain;

#[cfg(feature = "surface")]
pub use context::*;
pub use device::*;
pub use instance::*;
pub use pipeline::*;
pub use query::{DeviceQuery, SurfaceSupport};
pub use swapchain::*;

type BootstrapSmallVec<T> = smallvec::SmallVec<[T; 8]>;
