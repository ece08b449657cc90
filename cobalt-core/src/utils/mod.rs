use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

#[cfg(feature = "serde")]
pub(crate) mod serde;

static ENV_VAR_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)\}").ok());

/// Expand `${NAME}` with the value of the environment variable, or nothing if unset.
pub fn replace_env_var_in_string(input: &str) -> Cow<'_, str> {
    match ENV_VAR_PATTERN.as_ref() {
        Some(re) => re.replace_all(input, |caps: &Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        }),
        None => Cow::Borrowed(input),
    }
}
