use std::path::PathBuf;
use std::time::Duration;

/// Display mode for a static image wallpaper.
///
/// Closed sum type plus a `(name, variant, alias)` table used by both parse
/// and display, replacing the stringly-typed mapping tables the source used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Center,
    Stretch,
    Fit,
    Fill,
    Tile,
}

impl DisplayMode {
    const TABLE: &'static [(&'static str, DisplayMode, &'static [&'static str])] = &[
        ("center", DisplayMode::Center, &[]),
        ("stretch", DisplayMode::Stretch, &["scale"]),
        ("fit", DisplayMode::Fit, &["contain"]),
        ("fill", DisplayMode::Fill, &["cover"]),
        ("tile", DisplayMode::Tile, &["repeat"]),
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::TABLE.iter().find_map(|(name, variant, aliases)| {
            (*name == normalized || aliases.contains(&normalized.as_str())).then_some(*variant)
        })
    }

    pub fn name(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(_, variant, _)| *variant == self)
            .map(|(name, _, _)| *name)
            .unwrap_or("center")
    }
}

impl Default for DisplayMode {
    fn default() -> Self {
        DisplayMode::Stretch
    }
}

/// Image-to-image transition kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    None,
    Fade,
    SlideLeft,
    SlideRight,
    Glitch,
    Pixelate,
}

impl TransitionKind {
    const TABLE: &'static [(&'static str, TransitionKind)] = &[
        ("none", TransitionKind::None),
        ("fade", TransitionKind::Fade),
        ("slide-left", TransitionKind::SlideLeft),
        ("slide-right", TransitionKind::SlideRight),
        ("glitch", TransitionKind::Glitch),
        ("pixelate", TransitionKind::Pixelate),
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::TABLE
            .iter()
            .find(|(name, _)| *name == normalized)
            .map(|(_, variant)| *variant)
    }

    pub fn name(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(_, variant)| *variant == self)
            .map(|(name, _)| *name)
            .unwrap_or("none")
    }
}

impl Default for TransitionKind {
    fn default() -> Self {
        TransitionKind::None
    }
}

/// A fully validated, immutable per-output image configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageConfig {
    pub path: PathBuf,
    pub display_mode: DisplayMode,
    pub transition: TransitionKind,
    pub transition_duration: Duration,
}

/// A fully validated, immutable per-output shader configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderConfig {
    pub shader_path: PathBuf,
    pub shader_speed: f32,
    pub shader_fps: u16,
    pub vsync: bool,
    pub channels: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModeConfig {
    Image(ImageConfig),
    Shader(ShaderConfig),
}

/// The per-output wallpaper configuration. Immutable once constructed; a new
/// output config replaces this value wholesale through `apply_config`, never
/// mutates it in place (the source's double-buffered config collapses to
/// this because the core disavows hot-reload).
#[derive(Debug, Clone, PartialEq)]
pub struct WallpaperConfig {
    pub mode: ModeConfig,
    /// Ordered sequence of paths the output cycles through. Empty means
    /// cycling is disabled (the single `path`/`shader` is shown forever).
    pub cycle_paths: Vec<PathBuf>,
    pub cycle_duration: Duration,
    pub show_fps: bool,
}

impl WallpaperConfig {
    pub fn is_image(&self) -> bool {
        matches!(self.mode, ModeConfig::Image(_))
    }

    pub fn is_shader(&self) -> bool {
        matches!(self.mode, ModeConfig::Shader(_))
    }

    pub fn cycle_enabled(&self) -> bool {
        self.cycle_paths.len() > 1
    }

    pub fn image(&self) -> Option<&ImageConfig> {
        match &self.mode {
            ModeConfig::Image(cfg) => Some(cfg),
            ModeConfig::Shader(_) => None,
        }
    }

    pub fn shader(&self) -> Option<&ShaderConfig> {
        match &self.mode {
            ModeConfig::Shader(cfg) => Some(cfg),
            ModeConfig::Image(_) => None,
        }
    }

    /// True when this is a shader config whose cycle list is made of image
    /// extensions rather than shader sources — the hybrid case from §4.E
    /// where cycling updates iChannel0 instead of swapping the program.
    pub fn is_hybrid_channel_cycle(&self) -> bool {
        self.is_shader()
            && !self.cycle_paths.is_empty()
            && self
                .cycle_paths
                .iter()
                .all(|p| is_image_extension(p))
    }
}

fn is_image_extension(path: &std::path::Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()).map(|e| e.to_ascii_lowercase()).as_deref(),
        Some("png") | Some("jpg") | Some("jpeg") | Some("bmp") | Some("gif")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mode_parses_names_and_aliases() {
        assert_eq!(DisplayMode::parse("fill"), Some(DisplayMode::Fill));
        assert_eq!(DisplayMode::parse("cover"), Some(DisplayMode::Fill));
        assert_eq!(DisplayMode::parse("  FIT "), Some(DisplayMode::Fit));
        assert_eq!(DisplayMode::parse("bogus"), None);
    }

    #[test]
    fn transition_kind_round_trips_name() {
        for kind in [
            TransitionKind::None,
            TransitionKind::Fade,
            TransitionKind::SlideLeft,
            TransitionKind::SlideRight,
            TransitionKind::Glitch,
            TransitionKind::Pixelate,
        ] {
            assert_eq!(TransitionKind::parse(kind.name()), Some(kind));
        }
    }

    #[test]
    fn hybrid_channel_cycle_detects_image_cycle_on_shader() {
        let cfg = WallpaperConfig {
            mode: ModeConfig::Shader(ShaderConfig {
                shader_path: PathBuf::from("/tmp/plasma.glsl"),
                shader_speed: 1.0,
                shader_fps: 60,
                vsync: true,
                channels: vec![],
            }),
            cycle_paths: vec![PathBuf::from("/tmp/a.png"), PathBuf::from("/tmp/b.jpg")],
            cycle_duration: Duration::from_secs(10),
            show_fps: false,
        };
        assert!(cfg.is_hybrid_channel_cycle());
    }
}
