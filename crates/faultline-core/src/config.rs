//! Installation settings, read from the environment.

use tracing::warn;

/// Default alternate signal stack size: 256 KiB.
pub const DEFAULT_ALT_STACK_SIZE: usize = 256 * 1024;

/// Smallest alternate signal stack the dump runs on.
///
/// Threads spawned by `std::thread` carry std's own alternate stack of a few
/// KiB; a fault handled on anything smaller than this only gets a one-line
/// notice.
pub const MIN_SIGNAL_STACK: usize = 64 * 1024;

/// Set to `1`, `true` or `yes` to skip installing the handlers.
pub const ENV_DISABLE: &str = "FAULTLINE_DISABLE";

/// Alternate signal stack size in bytes; `0` keeps whatever stack is present.
pub const ENV_ALT_STACK_SIZE: &str = "FAULTLINE_ALT_STACK_SIZE";

/// Installation settings
///
/// ## Example
///
/// ```rust
/// use faultline_core::config::Config;
///
/// let config = Config::from_lookup(|key| (key == "FAULTLINE_DISABLE").then(|| "yes".to_string()));
/// assert!(!config.enabled);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config
{
    /// Whether to install the fault handlers at all.
    pub enabled: bool,
    /// Size of the alternate signal stack given to the initializing thread,
    /// raised to [`MIN_SIGNAL_STACK`] if smaller. `0` leaves the thread's
    /// current alternate stack alone.
    pub alt_stack_size: usize,
}

impl Default for Config
{
    fn default() -> Self
    {
        Self {
            enabled: true,
            alt_stack_size: DEFAULT_ALT_STACK_SIZE,
        }
    }
}

impl Config
{
    /// Read [`ENV_DISABLE`] and [`ENV_ALT_STACK_SIZE`] from the process environment.
    pub fn from_env() -> Self
    {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    ///
    /// Unparsable sizes are logged and replaced by the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_DISABLE) {
            config.enabled = !is_truthy(&value);
        }

        if let Some(value) = lookup(ENV_ALT_STACK_SIZE) {
            match value.trim().parse::<usize>() {
                Ok(size) => config.alt_stack_size = size,
                Err(err) => warn!(variable = ENV_ALT_STACK_SIZE, %value, %err, "ignoring invalid stack size"),
            }
        }

        config
    }
}

fn is_truthy(value: &str) -> bool
{
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

#[cfg(test)]
mod tests
{
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> Config
    {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults()
    {
        let config = lookup(&[]);
        assert!(config.enabled);
        assert_eq!(config.alt_stack_size, DEFAULT_ALT_STACK_SIZE);
    }

    #[test]
    fn test_disable_flag()
    {
        assert!(!lookup(&[(ENV_DISABLE, "1")]).enabled);
        assert!(!lookup(&[(ENV_DISABLE, " TRUE ")]).enabled);
        assert!(!lookup(&[(ENV_DISABLE, "yes")]).enabled);
        assert!(lookup(&[(ENV_DISABLE, "0")]).enabled);
        assert!(lookup(&[(ENV_DISABLE, "")]).enabled);
    }

    #[test]
    fn test_alt_stack_size()
    {
        assert_eq!(lookup(&[(ENV_ALT_STACK_SIZE, "65536")]).alt_stack_size, 65536);
        assert_eq!(lookup(&[(ENV_ALT_STACK_SIZE, "0")]).alt_stack_size, 0);
        assert_eq!(
            lookup(&[(ENV_ALT_STACK_SIZE, "lots")]).alt_stack_size,
            DEFAULT_ALT_STACK_SIZE
        );
    }
}
