//! GPU resource primitives (§4.A): device/surface context, the per-output
//! state cache, uniform buffers, and channel-texture loading.

pub mod channels;
pub mod context;
pub mod uniforms;

pub use channels::{load_channels, ChannelTexture};
pub use context::{OutputTarget, SharedGpu};
pub use uniforms::ShadertoyUniforms;
