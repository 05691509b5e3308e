//! Environment-driven configuration.
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `TSU_ADDR` | `0.0.0.0:3000` | listen address |
//! | `TSU_DEBUG` | off | process-wide debug flag (`1`, `true`, `yes`, `on`) |

const DEFAULT_ADDR: &str = "0.0.0.0:3000";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub addr: String,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self { addr: DEFAULT_ADDR.to_owned(), debug: false }
    }
}

impl Config {
    /// Reads `TSU_ADDR` and `TSU_DEBUG`, falling back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            addr: get("TSU_ADDR").filter(|a| !a.trim().is_empty()).unwrap_or(defaults.addr),
            debug: get("TSU_DEBUG").map(|v| parse_flag(&v)).unwrap_or(defaults.debug),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
