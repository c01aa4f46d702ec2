/// GPU texture backend using wgpu
///
/// Implements the texture calls of the presentation pipeline on top of
/// wgpu, so movie frames land in real GPU textures.
///
/// Architecture:
/// - `context`: wgpu device/queue management
/// - `texture`: Texture allocation, upload and readback
/// - `backend`: [`WgpuGl`], the `GlApi` implementation
pub mod backend;
pub mod context;
pub mod texture;

pub use backend::WgpuGl;
pub use context::GpuContext;
pub use texture::GpuTexture;

/// GPU rendering capabilities
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    pub adapter_name: String,
    pub backend: String,
    pub max_texture_size: u32,
}

impl GpuCapabilities {
    pub fn log_info(&self) {
        log::info!("GPU Capabilities:");
        log::info!("  Adapter: {}", self.adapter_name);
        log::info!("  Backend: {}", self.backend);
        log::info!(
            "  Max Texture Size: {}x{}",
            self.max_texture_size,
            self.max_texture_size
        );
    }
}
