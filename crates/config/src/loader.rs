use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::LockboxConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "lockbox.toml",
    "lockbox.yaml",
    "lockbox.yml",
    "lockbox.json",
];

/// Environment variable overriding `session.timeout_secs`.
pub const ENV_SESSION_TIMEOUT_SECS: &str = "LOCKBOX_SESSION_TIMEOUT_SECS";
/// Environment variable overriding `storage.database`.
pub const ENV_DATABASE: &str = "LOCKBOX_DATABASE";

static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);
static DATA_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

fn read_override(slot: &Mutex<Option<PathBuf>>) -> Option<PathBuf> {
    slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

fn write_override(slot: &Mutex<Option<PathBuf>>, path: PathBuf) {
    *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(path);
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "lockbox")
}

/// Use `path` instead of the user config dir for discovery and saving.
pub fn set_config_dir(path: PathBuf) {
    write_override(&CONFIG_DIR_OVERRIDE, path);
}

/// Use `path` instead of the user data dir.
pub fn set_data_dir(path: PathBuf) {
    write_override(&DATA_DIR_OVERRIDE, path);
}

/// The config directory: the override if set, else `~/.config/lockbox/`.
pub fn config_dir() -> Option<PathBuf> {
    read_override(&CONFIG_DIR_OVERRIDE)
        .or_else(|| project_dirs().map(|d| d.config_dir().to_path_buf()))
}

/// The data directory: the override if set, else the platform data dir.
pub fn data_dir() -> Option<PathBuf> {
    read_override(&DATA_DIR_OVERRIDE).or_else(|| project_dirs().map(|d| d.data_dir().to_path_buf()))
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<LockboxConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. the directory given to [`set_config_dir`], if any, exclusively
/// 2. `./lockbox.{toml,yaml,yml,json}` (project-local)
/// 3. `~/.config/lockbox/lockbox.{toml,yaml,yml,json}` (user-global)
///
/// Returns `LockboxConfig::default()` if no config file is found or the file
/// fails to parse.
pub fn discover_and_load() -> LockboxConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    LockboxConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    if let Some(dir) = read_override(&CONFIG_DIR_OVERRIDE) {
        return first_existing(&dir);
    }
    first_existing(Path::new("")).or_else(|| config_dir().and_then(|dir| first_existing(&dir)))
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Serialize `config` to TOML and write it to the config dir.
///
/// Creates parent directories if needed. Returns the path written to.
pub fn save_config(config: &LockboxConfig) -> anyhow::Result<PathBuf> {
    let dir = config_dir().ok_or_else(|| anyhow::anyhow!("no config directory available"))?;
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(CONFIG_FILENAMES[0]);
    let toml_str =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serialize config: {e}"))?;
    std::fs::write(&path, toml_str)?;
    debug!(path = %path.display(), "saved config");
    Ok(path)
}

/// Apply `LOCKBOX_*` environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut LockboxConfig) -> anyhow::Result<()> {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_env_overrides_with(
    config: &mut LockboxConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(raw) = lookup(ENV_SESSION_TIMEOUT_SECS) {
        config.session.timeout_secs = raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{ENV_SESSION_TIMEOUT_SECS}={raw:?}: {e}"))?;
    }
    if let Some(raw) = lookup(ENV_DATABASE)
        && !raw.is_empty()
    {
        config.storage.database = Some(PathBuf::from(raw));
    }
    Ok(())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<LockboxConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_each_format() {
        let dir = tempfile::tempdir().unwrap();
        let cases = [
            ("lockbox.toml", "[session]\ntimeout_secs = 60\n"),
            ("lockbox.yaml", "session:\n  timeout_secs: 60\n"),
            ("lockbox.json", r#"{"session": {"timeout_secs": 60}}"#),
        ];
        for (name, body) in cases {
            let path = dir.path().join(name);
            std::fs::write(&path, body).unwrap();
            let config = load_config(&path).unwrap();
            assert_eq!(config.session.timeout_secs, 60, "{name}");
            assert_eq!(config.kdf.t_cost, 3, "{name}");
        }
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lockbox.ini");
        std::fs::write(&path, "").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn missing_file_names_path() {
        let err = load_config(Path::new("/nonexistent/lockbox.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/lockbox.toml"));
    }

    #[test]
    fn first_existing_respects_order() {
        let dir = tempfile::tempdir().unwrap();
        assert!(first_existing(dir.path()).is_none());
        std::fs::write(dir.path().join("lockbox.json"), "{}").unwrap();
        std::fs::write(dir.path().join("lockbox.yaml"), "{}").unwrap();
        assert_eq!(
            first_existing(dir.path()).unwrap(),
            dir.path().join("lockbox.yaml")
        );
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = LockboxConfig::default();
        apply_env_overrides_with(&mut config, |name| match name {
            ENV_SESSION_TIMEOUT_SECS => Some(" 120 ".into()),
            ENV_DATABASE => Some("/tmp/vault.db".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.session.timeout_secs, 120);
        assert_eq!(
            config.storage.database.as_deref(),
            Some(Path::new("/tmp/vault.db"))
        );
    }

    #[test]
    fn bad_env_override_is_an_error() {
        let mut config = LockboxConfig::default();
        let err = apply_env_overrides_with(&mut config, |name| {
            (name == ENV_SESSION_TIMEOUT_SECS).then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains(ENV_SESSION_TIMEOUT_SECS));
        assert_eq!(config.session.timeout_secs, 900);
    }
}
