/// Daemon configuration loading
use config::{Config, Environment, File};
use idphoto_mirror::{MirrorConfig, MirrorError, Result};
use std::path::Path;

/// Read from the working directory when no `--config` path is given
pub const DEFAULT_CONFIG_FILE: &str = "idphoto.toml";

/// Environment overrides look like `IDPHOTO_SOURCE_PATH=/mnt/photos`
pub const ENV_PREFIX: &str = "IDPHOTO";

/// Load configuration from file and environment, then validate it
///
/// An explicit `path` must exist; the default file is optional.
pub fn load(path: Option<&Path>) -> Result<MirrorConfig> {
    load_from(path, environment())
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn load_from(path: Option<&Path>, environment: Environment) -> Result<MirrorConfig> {
    let mut settings = Config::builder();

    settings = match path {
        Some(path) => settings.add_source(File::from(path)),
        None => settings.add_source(File::from(Path::new(DEFAULT_CONFIG_FILE)).required(false)),
    };

    // Override with environment variables (prefixed with IDPHOTO_)
    settings = settings.add_source(environment);

    let config: MirrorConfig = settings
        .build()
        .map_err(|e| MirrorError::Config(e.to_string()))?
        .try_deserialize()
        .map_err(|e| MirrorError::Config(e.to_string()))?;

    config.validate()?;
    Ok(config)
}
