/// Configuration Loading
///
/// chronicle reads an optional TOML file on top of built-in defaults;
/// the archive runs from CLI flags alone when no file exists. The
/// loaded Config is owned by the binary entry point and handed to
/// components at construction, like every other process-wide resource
/// in this tree.

pub use config::Config;
use std::error::Error;

/// Load configuration. `path` comes from the --config flag; without
/// it, a `config.toml` in the working directory is used when present.
pub fn load_config(path: Option<&str>) -> Result<Config, Box<dyn Error>> {
    let builder = Config::builder()
        .set_default("server.bind", "0.0.0.0:3005")?
        .set_default("cache.headers", 1000i64)?
        .set_default("cache.events", 1000i64)?
        .set_default("codec.level", 3i64)?;

    let builder = match path {
        Some(file) => builder.add_source(config::File::with_name(file)),
        None => builder.add_source(config::File::with_name("config.toml").required(false)),
    };

    builder.build().map_err(|e| Box::new(e) as Box<dyn Error>)
}

/// Expand `~` and environment variables in user-supplied paths.
pub fn expand_path(raw: &str) -> String {
    shellexpand::full(raw)
        .map(|expanded| expanded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_present_without_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config.get_string("server.bind").unwrap(), "0.0.0.0:3005");
        assert_eq!(config.get_int("cache.headers").unwrap(), 1000);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(load_config(Some("/nonexistent/chronicle.toml")).is_err());
    }

    #[test]
    fn test_expand_path_passthrough() {
        assert_eq!(expand_path("/var/lib/archive"), "/var/lib/archive");
    }
}
