//! Error taxonomy for the render engine (§7): a closed set of kinds the
//! core recognizes, each carrying the output identifier and offending
//! value per §7's "every actionable error includes the output identifier
//! and the offending value".

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("[{output}] compositor backend error: {detail}")]
    CompositorBackend { output: String, detail: String },

    #[error("[{output}] GPU/EGL initialization failed: {detail}")]
    GpuInit { output: String, detail: String },

    #[error("[{output}] surface creation failed: {detail}")]
    SurfaceCreate { output: String, detail: String },

    #[error("[{output}] shader compile failed ({stage}): {info_log}")]
    ShaderCompile {
        output: String,
        stage: &'static str,
        info_log: String,
        line_hint: Option<u32>,
    },

    #[error("[{output}] shader link failed: {info_log}")]
    ShaderLink { output: String, info_log: String },

    #[error("[{output}] texture upload failed for {path}: {detail}")]
    TextureUpload {
        output: String,
        path: PathBuf,
        detail: String,
    },

    #[error("[{output}] image decode failed for {path}: {source}")]
    ImageDecode {
        output: String,
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("[{output}] I/O error at {path}: {source}")]
    Io {
        output: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[{output}] display/compositor connection lost")]
    DisplayLost { output: String },
}

/// Errors from the synchronous image decoder facade (§4.B).
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported image format for {0}")]
    FormatUnsupported(PathBuf),
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Structured shader compile/link failure, surfaced to the caller so the
/// previous shader can keep rendering (§4.C).
#[derive(Debug, Clone)]
pub struct ShaderError {
    pub stage: &'static str,
    pub info_log: String,
    pub line_hint: Option<u32>,
}

impl std::fmt::Display for ShaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.info_log)
    }
}

impl std::error::Error for ShaderError {}
