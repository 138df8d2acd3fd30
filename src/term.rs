//! Color decisions for diagnostics written to the terminal.
//!
//! `ATTR_CACHE_FS_COLOR` (`always`, `never` or `auto`) wins over the conventional `FORCE_COLOR`
//! and `NO_COLOR` variables. In `auto` mode color needs a terminal that is not `TERM=dumb`.

use std::env;
use std::io::IsTerminal;

const COLOR_VAR: &str = "ATTR_CACHE_FS_COLOR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorChoice {
    Always,
    Never,
    Auto,
}

impl ColorChoice {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "always" => Some(Self::Always),
            "never" => Some(Self::Never),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }

    fn from_env() -> Self {
        if let Some(choice) = env::var(COLOR_VAR).ok().as_deref().and_then(Self::parse) {
            return choice;
        }
        if is_set("FORCE_COLOR") {
            Self::Always
        } else if is_set("NO_COLOR") {
            Self::Never
        } else {
            Self::Auto
        }
    }

    fn resolve(self, is_terminal: bool, dumb: bool) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => is_terminal && !dumb,
        }
    }
}

fn is_set(var: &str) -> bool {
    env::var_os(var).is_some_and(|v| !v.is_empty())
}

/// Whether output written to `stream` should carry ANSI colors.
pub fn should_use_color<T: IsTerminal>(stream: &T) -> bool {
    let dumb = env::var_os("TERM").is_some_and(|t| t == "dumb");
    ColorChoice::from_env().resolve(stream.is_terminal(), dumb)
}
