// ABOUTME: Application name validation.
// ABOUTME: The name keys the clone directory, remote directory, image, container and proxy site.

use std::fmt;
use thiserror::Error;

/// Name used when the operator does not pick one.
pub const DEFAULT_APP_NAME: &str = "app";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AppNameError {
    #[error("application name cannot be empty")]
    Empty,

    #[error("application name exceeds maximum length of 63 characters")]
    TooLong,

    #[error("application name must be at least 2 characters")]
    TooShort,

    #[error("application name must start with a letter or digit, found '{0}'")]
    InvalidStart(char),

    #[error("application name must be lowercase")]
    NotLowercase,

    #[error("invalid character in application name: '{0}'")]
    InvalidChar(char),

    #[error("application name must end with a letter or digit, found '{0}'")]
    InvalidEnd(char),

    #[error("application name cannot contain the separator run '{0}'")]
    InvalidSeparator(String),
}

/// Identity of a deployed application.
///
/// The allowed character set is the intersection of what docker accepts for
/// image repositories and container names and what is safe as a file name.
/// Letters and digits may be joined by `.`, `_`, `__` or a run of `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppName(String);

impl AppName {
    pub fn new(value: &str) -> Result<Self, AppNameError> {
        let first = value.chars().next().ok_or(AppNameError::Empty)?;

        if value.len() > 63 {
            return Err(AppNameError::TooLong);
        }

        if !first.is_ascii_alphanumeric() {
            return Err(AppNameError::InvalidStart(first));
        }

        for c in value.chars() {
            if c.is_ascii_uppercase() {
                return Err(AppNameError::NotLowercase);
            }
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && !matches!(c, '-' | '_' | '.') {
                return Err(AppNameError::InvalidChar(c));
            }
        }

        if value.len() < 2 {
            return Err(AppNameError::TooShort);
        }

        if let Some(last) = value.chars().last()
            && !last.is_ascii_alphanumeric()
        {
            return Err(AppNameError::InvalidEnd(last));
        }

        if let Some(run) = separator_runs(value).find(|run| !is_valid_separator(run)) {
            return Err(AppNameError::InvalidSeparator(run.to_string()));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Maximal runs of non-alphanumeric characters.
fn separator_runs(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(|c: char| c.is_ascii_alphanumeric())
        .filter(|run| !run.is_empty())
}

fn is_valid_separator(run: &str) -> bool {
    matches!(run, "." | "_" | "__") || run.chars().all(|c| c == '-')
}

impl Default for AppName {
    fn default() -> Self {
        Self(DEFAULT_APP_NAME.to_string())
    }
}

impl fmt::Display for AppName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_names() {
        for name in ["app", "demo", "my-app", "api_v2", "web.frontend", "9lives"] {
            assert!(AppName::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn default_is_app() {
        assert_eq!(AppName::default().as_str(), "app");
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(AppName::new(""), Err(AppNameError::Empty));
    }

    #[test]
    fn rejects_uppercase() {
        assert_eq!(AppName::new("MyApp"), Err(AppNameError::NotLowercase));
    }

    #[test]
    fn rejects_leading_separator() {
        assert_eq!(AppName::new("-app"), Err(AppNameError::InvalidStart('-')));
        assert_eq!(AppName::new(".app"), Err(AppNameError::InvalidStart('.')));
    }

    #[test]
    fn rejects_path_and_shell_characters() {
        assert_eq!(AppName::new("a/b"), Err(AppNameError::InvalidChar('/')));
        assert_eq!(AppName::new("a b"), Err(AppNameError::InvalidChar(' ')));
        assert_eq!(AppName::new("a'b"), Err(AppNameError::InvalidChar('\'')));
    }

    #[test]
    fn rejects_single_character() {
        assert_eq!(AppName::new("a"), Err(AppNameError::TooShort));
        assert!(AppName::new("ab").is_ok());
    }

    #[test]
    fn rejects_trailing_separator() {
        assert_eq!(AppName::new("demo-"), Err(AppNameError::InvalidEnd('-')));
        assert_eq!(AppName::new("demo."), Err(AppNameError::InvalidEnd('.')));
        assert_eq!(AppName::new("a_"), Err(AppNameError::InvalidEnd('_')));
    }

    #[test]
    fn separator_runs_follow_image_name_rules() {
        assert!(AppName::new("my--app").is_ok());
        assert!(AppName::new("my__app").is_ok());
        assert_eq!(
            AppName::new("a..b"),
            Err(AppNameError::InvalidSeparator("..".to_string()))
        );
        assert_eq!(
            AppName::new("a___b"),
            Err(AppNameError::InvalidSeparator("___".to_string()))
        );
        assert_eq!(
            AppName::new("a.-b"),
            Err(AppNameError::InvalidSeparator(".-".to_string()))
        );
    }

    #[test]
    fn rejects_overlong() {
        let name = "a".repeat(64);
        assert_eq!(AppName::new(&name), Err(AppNameError::TooLong));
        assert!(AppName::new(&"a".repeat(63)).is_ok());
    }
}
