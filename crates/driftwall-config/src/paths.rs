//! Environment and filesystem path resolution shared by the configuration
//! loader and the daemon's runtime-file placement.
//!
//! `PathResolver` performs the `$VAR` / `~` expansion used on every path read
//! from a config file; `runtime_dir` / `config_dir` implement the env-var
//! precedence from the external interfaces table (`XDG_CONFIG_HOME`, `HOME`,
//! `XDG_RUNTIME_DIR`, in that order per variable).

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories_next::BaseDirs;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PathResolver {
    cwd: PathBuf,
}

impl PathResolver {
    pub fn new() -> Result<Self> {
        let cwd = env::current_dir().context("failed to resolve current working directory")?;
        Ok(Self { cwd })
    }

    pub fn with_cwd<P: Into<PathBuf>>(cwd: P) -> Self {
        Self { cwd: cwd.into() }
    }

    pub fn expand_path(&self, input: &str) -> Result<PathBuf> {
        let expanded_env = expand_env_vars(input)?;
        let expanded = expand_home(&expanded_env)?;
        let path = PathBuf::from(expanded);
        debug!(original = %input, expanded = %path.display(), "expanded config path");
        Ok(path)
    }

    pub fn normalize_local_path(&self, input: &str) -> Result<PathBuf> {
        let expanded = self.expand_path(input)?;
        if expanded.is_absolute() {
            return Ok(expanded);
        }
        if expanded.as_os_str().is_empty() {
            anyhow::bail!("path must not be empty");
        }
        let candidate = self.cwd.join(&expanded);
        if candidate.exists() {
            return Ok(candidate);
        }
        Ok(expanded)
    }
}

fn expand_home(input: &str) -> Result<String> {
    if !input.starts_with('~') {
        return Ok(input.to_string());
    }

    let base_dirs = BaseDirs::new()
        .ok_or_else(|| anyhow!("unable to determine home directory for '~' expansion"))?;
    let home_dir = base_dirs.home_dir();

    if input == "~" {
        return Ok(home_dir.to_string_lossy().into_owned());
    }

    if let Some(rest) = input.strip_prefix("~/") {
        let mut path = home_dir.to_path_buf();
        path.push(rest);
        return Ok(path.to_string_lossy().into_owned());
    }

    anyhow::bail!("user-specific home expansion ('{input}') is not supported")
}

fn expand_env_vars(input: &str) -> Result<String> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                output.push(next);
            } else {
                output.push('\\');
            }
            continue;
        }

        if ch != '$' {
            output.push(ch);
            continue;
        }

        match chars.peek() {
            None => {
                output.push('$');
                break;
            }
            Some('{') => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    anyhow::bail!("missing closing '}}' in environment variable reference");
                }
                if name.is_empty() {
                    anyhow::bail!("environment variable name must not be empty");
                }
                let value = env::var(&name)
                    .map_err(|_| anyhow!("environment variable '{name}' is not set"))?;
                output.push_str(&value);
            }
            Some(&c) if is_env_name_char(c) => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if is_env_name_char(c) {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = env::var(&name)
                    .map_err(|_| anyhow!("environment variable '{name}' is not set"))?;
                output.push_str(&value);
            }
            _ => output.push('$'),
        }
    }

    Ok(output)
}

fn is_env_name_char(ch: char) -> bool {
    ch == '_' || ch.is_ascii_alphanumeric()
}

/// Default config file location: `$XDG_CONFIG_HOME/driftwall/config.toml`,
/// falling back to `$HOME/.config/driftwall/config.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return Ok(Path::new(&xdg).join("driftwall").join("config.toml"));
        }
    }
    if let Ok(home) = env::var("HOME") {
        if !home.is_empty() {
            return Ok(Path::new(&home).join(".config/driftwall/config.toml"));
        }
    }
    anyhow::bail!("neither XDG_CONFIG_HOME nor HOME is set; cannot locate config file")
}

/// Runtime directory for PID/state/set-index files:
/// `$XDG_RUNTIME_DIR`, falling back to `$HOME`, falling back to `/tmp`.
pub fn runtime_dir() -> PathBuf {
    if let Ok(dir) = env::var("XDG_RUNTIME_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Ok(home) = env::var("HOME") {
        if !home.is_empty() {
            return PathBuf::from(home);
        }
    }
    PathBuf::from("/tmp")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn expands_environment_variables() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("DRIFTWALL_PATH_TEST", "value");
        let resolver = PathResolver::with_cwd("/");
        let path = resolver.expand_path("/tmp/$DRIFTWALL_PATH_TEST").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/value"));
        env::remove_var("DRIFTWALL_PATH_TEST");
    }

    #[test]
    fn expands_home_prefix() {
        let resolver = PathResolver::with_cwd("/");
        let expanded = resolver.expand_path("~").unwrap();
        assert!(expanded.is_absolute());
    }

    #[test]
    fn normalize_local_path_prefers_cwd_when_exists() {
        let temp = tempfile::tempdir().unwrap();
        let file_path = temp.path().join("pack");
        std::fs::create_dir_all(&file_path).unwrap();

        let resolver = PathResolver::with_cwd(temp.path());
        let normalized = resolver.normalize_local_path("pack").unwrap();
        assert_eq!(normalized, file_path);
    }

    #[test]
    fn runtime_dir_prefers_xdg_runtime_dir() {
        let _guard = ENV_LOCK.lock().unwrap();
        let previous = env::var("XDG_RUNTIME_DIR").ok();
        env::set_var("XDG_RUNTIME_DIR", "/run/user/1000");
        assert_eq!(runtime_dir(), PathBuf::from("/run/user/1000"));
        match previous {
            Some(value) => env::set_var("XDG_RUNTIME_DIR", value),
            None => env::remove_var("XDG_RUNTIME_DIR"),
        }
    }
}
