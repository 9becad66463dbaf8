//! Logging initialisation via tracing-subscriber.
//!
//! Logs go to stderr so command output on stdout stays clean. A bare level
//! (`"debug"`) applies to this crate only and keeps the HTTP stack at `warn`;
//! a full `EnvFilter` directive is used as given.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

const CRATE_TARGET: &str = "projchat";
const DEPENDENCY_LEVEL: &str = "warn";

/// Level selected by repeated `-v` flags, if any.
pub fn verbosity_level(count: u8) -> Option<&'static str> {
    match count {
        0 => None,
        1 => Some("debug"),
        _ => Some("trace"),
    }
}

/// Turn a configured level into the `EnvFilter` directive to install.
pub fn directive(level: &str) -> Result<String, AppError> {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return Ok(level.to_string());
    }
    parse_level(level)?;
    Ok(format!("{DEPENDENCY_LEVEL},{CRATE_TARGET}={}", level.to_ascii_lowercase()))
}

/// Parse a bare level string, rejecting anything `LevelFilter` does not know.
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}

/// Install the global subscriber. Call once, after the level is resolved.
///
/// With `prefer_level` (a `-v` flag was given) `level` wins over `RUST_LOG`;
/// otherwise `RUST_LOG`, when set and valid, wins over `level`.
pub fn init(level: &str, prefer_level: bool) -> Result<(), AppError> {
    let configured = || {
        let directive = directive(level)?;
        EnvFilter::try_new(&directive)
            .map_err(|e| AppError::Logger(format!("invalid log filter '{directive}': {e}")))
    };
    let filter = if prefer_level {
        configured()?
    } else {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => configured()?,
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_is_scoped_to_crate() {
        assert_eq!(directive("debug").unwrap(), "warn,projchat=debug");
        assert_eq!(directive(" INFO ").unwrap(), "warn,projchat=info");
    }

    #[test]
    fn full_directive_passes_through() {
        assert_eq!(directive("reqwest=debug,projchat=trace").unwrap(), "reqwest=debug,projchat=trace");
    }

    #[test]
    fn unknown_level_errors() {
        assert!(directive("verbose").is_err());
        assert!(directive("").is_err());
        assert!(parse_level("off").is_ok());
    }

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(verbosity_level(0), None);
        assert_eq!(verbosity_level(1), Some("debug"));
        assert_eq!(verbosity_level(3), Some("trace"));
    }

    #[test]
    fn init_succeeds_or_already_init() {
        match init("info", false) {
            Ok(()) => {}
            Err(AppError::Logger(msg)) if msg.contains("set subscriber") => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
