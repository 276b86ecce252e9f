//! Tracing subscriber setup.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber.
///
/// `verbosity` is one of debug, info, warn or error (unknown values mean
/// info); `RUST_LOG` overrides it when set. `format` is "json" or anything
/// else for plain text. Returns `false` when a subscriber was already
/// installed, in which case nothing changes.
pub fn init(verbosity: &str, format: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(verbosity)));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false);

    let installed = if format.eq_ignore_ascii_case("json") {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };

    installed.is_ok()
}

fn level_directive(verbosity: &str) -> &'static str {
    match verbosity.to_lowercase().as_str() {
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive("DEBUG"), "debug");
        assert_eq!(level_directive("warn"), "warn");
        assert_eq!(level_directive("verbose"), "info");
    }

    #[test]
    fn test_second_init_is_harmless() {
        let _ = init("info", "text");
        assert!(!init("debug", "json"));
    }
}
