//! Shader wrapping and compilation for Shadertoy-style fragment shaders
//! (§4.C). Adapted near-verbatim from the teacher's `renderer/src/compile.rs`
//! HEADER/FOOTER injection strategy, with the uniform block layout
//! shrunk to match [`crate::gpu::uniforms::ShadertoyUniforms`] (no
//! `iSampleRate`/`iChannelTime`/crossfade mix, no fill-geometry remap:
//! image display-mode geometry is handled by the transition engine's quad,
//! not by the shader host), and extended with multi-pass splitting.

use std::borrow::Cow;

use anyhow::{anyhow, Context, Result};
use wgpu::naga::ShaderStage;

use crate::types::{PassKind, ShaderCompiler};

/// Splits a shader source into its passes. A single-pass shader (no
/// recognized `// Buffer A` / `// Image` marker lines) is returned as one
/// `Image` pass containing the whole source, matching §4.C's "detects
/// whether it is single-pass ... or multi-pass" rule.
pub fn split_passes(source: &str) -> Vec<(PassKind, String)> {
    let mut passes: Vec<(PassKind, String)> = Vec::new();
    let mut current: Option<(PassKind, String)> = None;

    for line in source.lines() {
        let trimmed = line.trim_start();
        if let Some(marker) = trimmed.strip_prefix("//").map(str::trim) {
            if let Some(kind) = PassKind::from_marker(marker) {
                if let Some(finished) = current.take() {
                    passes.push(finished);
                }
                current = Some((kind, String::new()));
                continue;
            }
        }
        if let Some((_, body)) = current.as_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }
    if let Some(finished) = current.take() {
        passes.push(finished);
    }

    if passes.is_empty() {
        passes.push((PassKind::Image, source.to_string()));
    }
    passes
}

/// Light static analysis recommending a render-target scale for a buffer
/// pass (§4.C: "operations suggesting blur/noise/feedback yield lower
/// recommended scales"). 1.0 means render at full output resolution.
pub fn recommended_buffer_scale(pass_source: &str) -> f32 {
    let lowered = pass_source.to_ascii_lowercase();
    let mut scale = 1.0f32;
    if lowered.contains("blur") {
        scale = scale.min(0.75);
    }
    if lowered.contains("noise") {
        scale = scale.min(0.75);
    }
    if lowered.contains("feedback") {
        scale = scale.min(0.5);
    }
    scale
}

pub fn compile_vertex_shader(
    device: &wgpu::Device,
    compiler: ShaderCompiler,
) -> Result<wgpu::ShaderModule> {
    compile_glsl(
        device,
        VERTEX_SHADER_GLSL,
        ShaderStage::Vertex,
        "driftwall fullscreen triangle vertex",
        compiler,
    )
}

/// Wraps one pass's Shadertoy GLSL body with our prelude/epilogue and
/// compiles it.
pub fn compile_fragment_shader(
    device: &wgpu::Device,
    source: &str,
    compiler: ShaderCompiler,
) -> Result<wgpu::ShaderModule> {
    let wrapped = wrap_shadertoy_fragment(source);
    compile_glsl(
        device,
        &wrapped,
        ShaderStage::Fragment,
        "driftwall shader pass",
        compiler,
    )
    .with_context(|| "failed to compile fragment shader")
}

fn wrap_shadertoy_fragment(source: &str) -> String {
    let mut sanitized = String::new();
    let mut skipped_version = false;
    for line in source.lines() {
        if !skipped_version && line.trim_start().starts_with("#version") {
            skipped_version = true;
            continue;
        }
        let trimmed = line.trim_start();
        let should_skip_uniform = trimmed.starts_with("uniform ")
            && (trimmed.contains("iResolution")
                || trimmed.contains("iTimeDelta")
                || trimmed.contains("iTime")
                || trimmed.contains("iFrameRate")
                || trimmed.contains("iFrame")
                || trimmed.contains("iMouse")
                || trimmed.contains("iDate")
                || trimmed.contains("iChannelResolution")
                || trimmed.contains("iChannel0")
                || trimmed.contains("iChannel1")
                || trimmed.contains("iChannel2")
                || trimmed.contains("iChannel3"));
        if should_skip_uniform {
            continue;
        }
        sanitized.push_str(line);
        sanitized.push('\n');
    }

    format!("{HEADER}\n#line 1\n{sanitized}{FOOTER}")
}

/// GLSL prologue; field layout must track [`crate::gpu::uniforms::ShadertoyUniforms`].
const HEADER: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform ShaderParams {
    vec4 _iResolution;
    float _iTime;
    float _iTimeDelta;
    float _iFrameRate;
    int _iFrame;
    vec4 _iMouse;
    vec4 _iDate;
    vec4 _iChannelResolution[4];
} ubo;

#define iResolution ubo._iResolution
#define iTime ubo._iTime
#define iTimeDelta ubo._iTimeDelta
#define iFrameRate ubo._iFrameRate
#define iFrame ubo._iFrame
#define iMouse ubo._iMouse
#define iDate ubo._iDate
#define iChannelResolution ubo._iChannelResolution

layout(set = 1, binding = 0) uniform texture2D driftwall_channel0_texture;
layout(set = 1, binding = 1) uniform sampler driftwall_channel0_sampler;
layout(set = 1, binding = 2) uniform texture2D driftwall_channel1_texture;
layout(set = 1, binding = 3) uniform sampler driftwall_channel1_sampler;
layout(set = 1, binding = 4) uniform texture2D driftwall_channel2_texture;
layout(set = 1, binding = 5) uniform sampler driftwall_channel2_sampler;
layout(set = 1, binding = 6) uniform texture2D driftwall_channel3_texture;
layout(set = 1, binding = 7) uniform sampler driftwall_channel3_sampler;

#define iChannel0 sampler2D(driftwall_channel0_texture, driftwall_channel0_sampler)
#define iChannel1 sampler2D(driftwall_channel1_texture, driftwall_channel1_sampler)
#define iChannel2 sampler2D(driftwall_channel2_texture, driftwall_channel2_sampler)
#define iChannel3 sampler2D(driftwall_channel3_texture, driftwall_channel3_sampler)

vec4 driftwall_gl_FragCoord;
#define gl_FragCoord driftwall_gl_FragCoord
";

const FOOTER: &str = r"void main() {
    #undef gl_FragCoord
    vec2 builtinFC = vec2(gl_FragCoord.x, gl_FragCoord.y);
    #define gl_FragCoord driftwall_gl_FragCoord

    vec2 fragCoord = vec2(builtinFC.x, iResolution.y - builtinFC.y);
    driftwall_gl_FragCoord = vec4(fragCoord, 0.0, 1.0);

    vec4 color = vec4(0.0);
    mainImage(color, fragCoord);
    outColor = vec4(color.rgb, color.a);
}
";

const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

fn compile_glsl(
    device: &wgpu::Device,
    source: &str,
    stage: ShaderStage,
    label: &'static str,
    compiler: ShaderCompiler,
) -> Result<wgpu::ShaderModule> {
    match compiler {
        ShaderCompiler::Shaderc => compile_with_shaderc(device, source, stage, label),
        ShaderCompiler::NagaGlsl => Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(source.to_owned()),
                stage,
                defines: &[],
            },
        })),
    }
}

#[cfg(feature = "shaderc")]
fn compile_with_shaderc(
    device: &wgpu::Device,
    source: &str,
    stage: ShaderStage,
    label: &'static str,
) -> Result<wgpu::ShaderModule> {
    use shaderc::{
        CompileOptions, Compiler, EnvVersion, OptimizationLevel, ShaderKind, SourceLanguage,
        TargetEnv,
    };

    let compiler = Compiler::new().context("failed to create shaderc compiler")?;
    let mut options = CompileOptions::new().context("failed to create shaderc options")?;
    options.set_source_language(SourceLanguage::GLSL);
    options.set_target_env(TargetEnv::Vulkan, EnvVersion::Vulkan1_1 as u32);
    options.set_optimization_level(if cfg!(debug_assertions) {
        OptimizationLevel::Zero
    } else {
        OptimizationLevel::Performance
    });

    let shader_kind = match stage {
        ShaderStage::Vertex => ShaderKind::Vertex,
        ShaderStage::Fragment => ShaderKind::Fragment,
        ShaderStage::Compute => ShaderKind::Compute,
        other => return Err(anyhow!("unsupported shader stage: {other:?}")),
    };

    let artifact = compiler
        .compile_into_spirv(source, shader_kind, label, "main", Some(&options))
        .with_context(|| format!("shaderc failed to compile {label}"))?;

    let warnings = artifact.get_warning_messages();
    if !warnings.is_empty() {
        tracing::warn!(label = label, warnings = %warnings, "shaderc emitted warnings");
    }

    let spirv = artifact.as_binary().to_vec();
    Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::SpirV(Cow::Owned(spirv)),
    }))
}

#[cfg(not(feature = "shaderc"))]
fn compile_with_shaderc(
    _device: &wgpu::Device,
    _source: &str,
    _stage: ShaderStage,
    label: &'static str,
) -> Result<wgpu::ShaderModule> {
    anyhow::bail!(
        "shaderc support was not enabled at build time; cannot compile {}",
        label
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_strips_shadertoy_uniforms() {
        let source = r#"
            #version 300 es
            uniform float iTime;
            uniform vec3 iResolution;
            void mainImage(out vec4 fragColor, in vec2 fragCoord) {
                fragColor = vec4(fragCoord, 0.0, 1.0);
            }
        "#;
        let wrapped = wrap_shadertoy_fragment(source);
        assert!(!wrapped.contains("uniform float iTime"));
        assert!(!wrapped.contains("uniform vec3 iResolution"));
        assert!(wrapped.contains("mainImage"));
    }

    #[test]
    fn single_pass_source_yields_one_image_pass() {
        let source = "void mainImage(out vec4 c, in vec2 uv) { c = vec4(1.0); }";
        let passes = split_passes(source);
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].0, PassKind::Image);
    }

    #[test]
    fn markers_split_source_into_ordered_passes() {
        let source = "\
// Buffer A
void mainImage(out vec4 c, in vec2 uv) { c = texture(iChannel0, uv); }
// Image
void mainImage(out vec4 c, in vec2 uv) { c = texture(iChannel0, uv); }
";
        let passes = split_passes(source);
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].0, PassKind::BufferA);
        assert_eq!(passes[1].0, PassKind::Image);
        assert!(passes[0].1.contains("mainImage"));
    }

    #[test]
    fn buffer_scale_recommendation_responds_to_keywords() {
        assert_eq!(recommended_buffer_scale("vec4 c = vec4(1.0);"), 1.0);
        assert!(recommended_buffer_scale("float b = blur(uv);") < 1.0);
        assert!(recommended_buffer_scale("vec4 prev = feedback(iChannel0, uv);") <= 0.5);
    }
}
