//! Configuration loading, validation and env substitution.
//!
//! Config files: `lockbox.toml`, `lockbox.yaml`, `lockbox.yml` or
//! `lockbox.json`, searched in `./` then the user config dir.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        apply_env_overrides, config_dir, data_dir, discover_and_load, find_config_file,
        load_config, save_config, set_config_dir, set_data_dir,
    },
    schema::{KdfConfig, LockboxConfig, MetricsConfig, SessionConfig, StorageConfig},
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_file, validate_str},
};
