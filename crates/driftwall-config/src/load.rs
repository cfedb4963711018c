//! TOML deserialization and validation for the declarative config file
//! (§6). The tokenizer/parser itself is `toml`'s; this module owns the
//! schema, the duration-visitor helper, and the validate-after-parse pass.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;
use crate::paths::PathResolver;
use crate::types::{DisplayMode, ImageConfig, ModeConfig, ShaderConfig, TransitionKind, WallpaperConfig};

const DEFAULT_OUTPUT_KEY: &str = "default";
const MAX_CYCLE_DURATION: f64 = 86_400.0;
const MAX_TRANSITION_DURATION: f64 = 10.0;
const MAX_SHADER_SPEED: f32 = 100.0;

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    output: BTreeMap<String, RawOutputBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct RawOutputBlock {
    path: Option<String>,
    shader: Option<String>,
    mode: Option<String>,
    #[serde(default, deserialize_with = "deserialize_duration_opt")]
    duration: Option<Duration>,
    transition: Option<String>,
    #[serde(default, deserialize_with = "deserialize_duration_opt")]
    transition_duration: Option<Duration>,
    shader_speed: Option<f32>,
    shader_fps: Option<u16>,
    vsync: Option<bool>,
    #[serde(default)]
    channels: Vec<String>,
    show_fps: Option<bool>,
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or a human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs_f64(v)))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

/// One entry of the collaborator's published result: an output selector
/// (connector name, model name, or the literal `default`) paired with the
/// fully validated config that applies when that selector matches.
#[derive(Debug, Clone)]
pub struct OutputEntry {
    pub selector: String,
    pub config: WallpaperConfig,
}

/// Loads and validates the config file at `path`, expanding `path`/`shader`
/// directory references into alphabetical cycle lists. A zero-sized or
/// non-regular file falls through to [`default_entries`] per §7/§8.
pub fn config_load(path: &Path) -> Result<Vec<OutputEntry>, ConfigError> {
    let metadata = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(_) => {
            warn!(path = %path.display(), "config file missing, falling back to defaults");
            return Ok(default_entries());
        }
    };

    if !metadata.is_file() || metadata.len() == 0 {
        warn!(path = %path.display(), "config file is empty or not a regular file, falling back to defaults");
        return Ok(default_entries());
    }

    let raw_text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let document: RawDocument = match toml::from_str(&raw_text) {
        Ok(doc) => doc,
        Err(source) => {
            warn!(path = %path.display(), error = %source, "config file failed to parse, falling back to defaults");
            return Ok(default_entries());
        }
    };

    if document.output.is_empty() {
        warn!(path = %path.display(), "config file defines no output blocks, falling back to defaults");
        return Ok(default_entries());
    }

    let resolver = PathResolver::new().map_err(|err| ConfigError::invalid("*", "cwd", err.to_string()))?;

    let mut entries = Vec::with_capacity(document.output.len());
    for (selector, block) in document.output {
        let config = resolve_output_block(&selector, block, &resolver)?;
        entries.push(OutputEntry { selector, config });
    }
    Ok(entries)
}

fn resolve_output_block(
    selector: &str,
    block: RawOutputBlock,
    resolver: &PathResolver,
) -> Result<WallpaperConfig, ConfigError> {
    if block.path.is_some() && block.shader.is_some() {
        return Err(ConfigError::invalid(selector, "path/shader", "path and shader are mutually exclusive"));
    }
    if block.path.is_none() && block.shader.is_none() {
        return Err(ConfigError::invalid(selector, "path/shader", "exactly one of path or shader must be set"));
    }

    let cycle_duration = validate_range(
        selector,
        "duration",
        block.duration.map(|d| d.as_secs_f64()).unwrap_or(0.0),
        0.0,
        MAX_CYCLE_DURATION,
    )?;

    let show_fps = block.show_fps.unwrap_or(false);

    let mode = if let Some(path) = &block.path {
        let display_mode = match &block.mode {
            Some(raw) => DisplayMode::parse(raw)
                .ok_or_else(|| ConfigError::invalid(selector, "mode", format!("unknown display mode '{raw}'")))?,
            None => DisplayMode::default(),
        };
        let transition = match &block.transition {
            Some(raw) => TransitionKind::parse(raw)
                .ok_or_else(|| ConfigError::invalid(selector, "transition", format!("unknown transition '{raw}'")))?,
            None => TransitionKind::default(),
        };
        let transition_duration = validate_range(
            selector,
            "transition_duration",
            block.transition_duration.map(|d| d.as_secs_f64()).unwrap_or(0.5),
            0.0,
            MAX_TRANSITION_DURATION,
        )?;

        if block.shader_speed.is_some() || block.shader_fps.is_some() || block.vsync.is_some() || !block.channels.is_empty() {
            return Err(ConfigError::invalid(selector, "shader_*", "shader-only keys set on an image output"));
        }

        let resolved_path = resolver
            .normalize_local_path(path)
            .map_err(|err| ConfigError::invalid(selector, "path", err.to_string()))?;

        ModeConfig::Image(ImageConfig {
            path: resolved_path,
            display_mode,
            transition,
            transition_duration: Duration::from_secs_f64(transition_duration),
        })
    } else {
        let shader_path_raw = block.shader.as_ref().expect("shader set");
        if block.mode.is_some() || block.transition.is_some() || block.transition_duration.is_some() {
            return Err(ConfigError::invalid(selector, "mode/transition*", "image-only keys set on a shader output"));
        }

        let shader_speed = validate_range(
            selector,
            "shader_speed",
            block.shader_speed.unwrap_or(1.0) as f64,
            f64::EPSILON,
            MAX_SHADER_SPEED as f64,
        )? as f32;

        let shader_fps = block.shader_fps.unwrap_or(60);
        if !(1..=240).contains(&shader_fps) {
            return Err(ConfigError::invalid(selector, "shader_fps", format!("{shader_fps} not in 1..=240")));
        }

        let vsync = block.vsync.unwrap_or(true);

        let channels = block
            .channels
            .iter()
            .map(|raw| {
                resolver
                    .normalize_local_path(raw)
                    .map_err(|err| ConfigError::invalid(selector, "channels", err.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let resolved_shader = resolver
            .normalize_local_path(shader_path_raw)
            .map_err(|err| ConfigError::invalid(selector, "shader", err.to_string()))?;

        ModeConfig::Shader(ShaderConfig {
            shader_path: resolved_shader,
            shader_speed,
            shader_fps,
            vsync,
            channels,
        })
    };

    let cycle_paths = match &mode {
        ModeConfig::Image(cfg) => expand_cycle_list(&cfg.path),
        ModeConfig::Shader(cfg) => expand_cycle_list(&cfg.shader_path),
    };

    Ok(WallpaperConfig {
        mode,
        cycle_paths,
        cycle_duration: Duration::from_secs_f64(cycle_duration),
        show_fps,
    })
}

fn validate_range(output: &str, key: &str, value: f64, min: f64, max: f64) -> Result<f64, ConfigError> {
    if value.is_nan() || value < min || value > max {
        return Err(ConfigError::invalid(
            output,
            key,
            format!("{value} is not within [{min}, {max}]"),
        ));
    }
    Ok(value)
}

/// A path ending in `/` (or a path that is a directory) is expanded into an
/// alphabetical list of its regular-file children; anything else yields a
/// single-element cycle (cycling disabled unless the caller sets more than
/// one entry).
fn expand_cycle_list(path: &Path) -> Vec<PathBuf> {
    let is_dir_hint = path.to_string_lossy().ends_with('/') || path.is_dir();
    if !is_dir_hint {
        return vec![path.to_path_buf()];
    }

    let mut entries: Vec<PathBuf> = match std::fs::read_dir(path) {
        Ok(read_dir) => read_dir
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read wallpaper directory");
            Vec::new()
        }
    };
    entries.sort();
    entries
}

/// Matching order for an output's selector: connector name, then model,
/// falling back to the `default` entry.
pub fn resolve_for_output<'a>(
    entries: &'a [OutputEntry],
    connector: &str,
    model: &str,
) -> Option<&'a WallpaperConfig> {
    entries
        .iter()
        .find(|entry| entry.selector == connector)
        .or_else(|| entries.iter().find(|entry| entry.selector == model))
        .or_else(|| entries.iter().find(|entry| entry.selector == DEFAULT_OUTPUT_KEY))
        .map(|entry| &entry.config)
}

/// Built-in default used on first run or when the config file is missing,
/// empty, unparsable, or has no output blocks: probes a short list of common
/// wallpaper locations and otherwise falls back to a solid-black render (an
/// empty cycle list with no discoverable path signals that to the caller).
pub fn default_entries() -> Vec<OutputEntry> {
    let candidates = [
        "/usr/share/backgrounds/default.png",
        "/usr/share/pixmaps/backgrounds/default.png",
        "/usr/share/backgrounds",
    ];

    let discovered = candidates
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists());

    let mode = match discovered {
        Some(path) => ModeConfig::Image(ImageConfig {
            path: path.clone(),
            display_mode: DisplayMode::default(),
            transition: TransitionKind::default(),
            transition_duration: Duration::from_millis(500),
        }),
        None => ModeConfig::Image(ImageConfig {
            path: PathBuf::new(),
            display_mode: DisplayMode::default(),
            transition: TransitionKind::default(),
            transition_duration: Duration::from_millis(500),
        }),
    };

    let cycle_paths = match &mode {
        ModeConfig::Image(cfg) if cfg.path.is_dir() => expand_cycle_list(&cfg.path),
        ModeConfig::Image(cfg) if !cfg.path.as_os_str().is_empty() => vec![cfg.path.clone()],
        _ => Vec::new(),
    };

    vec![OutputEntry {
        selector: DEFAULT_OUTPUT_KEY.to_string(),
        config: WallpaperConfig {
            mode,
            cycle_paths,
            cycle_duration: Duration::from_secs(0),
            show_fps: false,
        },
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_single_image_output() {
        let file = write_temp(
            r#"
[output.default]
path = "/tmp/a.png"
mode = "fill"
"#,
        );
        let entries = config_load(file.path()).unwrap();
        assert_eq!(entries.len(), 1);
        let cfg = &entries[0].config;
        assert!(cfg.is_image());
        assert_eq!(cfg.image().unwrap().display_mode, DisplayMode::Fill);
    }

    #[test]
    fn rejects_both_path_and_shader() {
        let file = write_temp(
            r#"
[output.default]
path = "/tmp/a.png"
shader = "/tmp/a.glsl"
"#,
        );
        let err = config_load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn rejects_out_of_range_transition_duration() {
        let file = write_temp(
            r#"
[output.default]
path = "/tmp/a.png"
transition = "fade"
transition_duration = 20
"#,
        );
        let err = config_load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn empty_file_falls_back_to_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let entries = config_load(file.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].selector, "default");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let entries = config_load(Path::new("/nonexistent/path/driftwall.toml")).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn shader_block_parses_channels_and_fps() {
        let file = write_temp(
            r#"
[output.default]
shader = "/tmp/plasma.glsl"
shader_fps = 30
vsync = false
channels = ["/tmp/noise.png"]
"#,
        );
        let entries = config_load(file.path()).unwrap();
        let shader = entries[0].config.shader().unwrap();
        assert_eq!(shader.shader_fps, 30);
        assert!(!shader.vsync);
        assert_eq!(shader.channels.len(), 1);
    }

    #[test]
    fn resolve_for_output_prefers_connector_then_model_then_default() {
        let entries = vec![
            OutputEntry {
                selector: "default".into(),
                config: default_entries().remove(0).config,
            },
            OutputEntry {
                selector: "HDMI-A-2".into(),
                config: default_entries().remove(0).config,
            },
        ];
        assert!(resolve_for_output(&entries, "HDMI-A-2", "SomeModel").is_some());
        assert!(resolve_for_output(&entries, "DP-1", "SomeModel").is_some());
    }
}
