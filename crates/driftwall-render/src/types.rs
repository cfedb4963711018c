//! Small shared value types used across the render engine.

/// Shader compilation backend, feature-gated exactly as the teacher gates
/// it: `shaderc` compiles wrapped GLSL to SPIR-V, `naga` hands GLSL to
/// wgpu's built-in frontend when `shaderc` isn't available at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderCompiler {
    Shaderc,
    NagaGlsl,
}

impl Default for ShaderCompiler {
    fn default() -> Self {
        if cfg!(feature = "shaderc") {
            ShaderCompiler::Shaderc
        } else {
            ShaderCompiler::NagaGlsl
        }
    }
}

impl std::fmt::Display for ShaderCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderCompiler::Shaderc => f.write_str("shaderc"),
            ShaderCompiler::NagaGlsl => f.write_str("naga"),
        }
    }
}

/// Which pass a block of a multi-pass Shadertoy source belongs to (§4.C).
/// `BufferA`-`BufferD` render to an intermediate ping-pong target; `Image`
/// is the final pass written to the output surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PassKind {
    BufferA,
    BufferB,
    BufferC,
    BufferD,
    Image,
}

impl PassKind {
    pub fn marker(self) -> &'static str {
        match self {
            PassKind::BufferA => "Buffer A",
            PassKind::BufferB => "Buffer B",
            PassKind::BufferC => "Buffer C",
            PassKind::BufferD => "Buffer D",
            PassKind::Image => "Image",
        }
    }

    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker.trim() {
            "Buffer A" => Some(PassKind::BufferA),
            "Buffer B" => Some(PassKind::BufferB),
            "Buffer C" => Some(PassKind::BufferC),
            "Buffer D" => Some(PassKind::BufferD),
            "Image" => Some(PassKind::Image),
            _ => None,
        }
    }

    /// Ordering passes must render in: buffers first (in letter order),
    /// then the final image pass.
    pub fn render_order() -> [PassKind; 5] {
        [
            PassKind::BufferA,
            PassKind::BufferB,
            PassKind::BufferC,
            PassKind::BufferD,
            PassKind::Image,
        ]
    }

    pub fn is_buffer(self) -> bool {
        !matches!(self, PassKind::Image)
    }
}
