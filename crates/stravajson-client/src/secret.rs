//! Secret reference resolver.
//!
//! Credential values in `credentials.toml` may point elsewhere instead of
//! holding the secret itself:
//!
//! - `pass::path/in/store` - first line of `pass show path/in/store`
//! - `env::VAR_NAME` - the value of `$VAR_NAME`
//! - anything else - used verbatim

/// A parsed credential value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretRef<'a> {
    /// Entry in the `pass` password store.
    Pass(&'a str),
    /// Environment variable name.
    Env(&'a str),
    /// Literal value.
    Plain(&'a str),
}

impl<'a> SecretRef<'a> {
    /// Classifies a raw value by its prefix.
    pub fn parse(value: &'a str) -> Self {
        if let Some(path) = value.strip_prefix("pass::") {
            Self::Pass(path)
        } else if let Some(var) = value.strip_prefix("env::") {
            Self::Env(var)
        } else {
            Self::Plain(value)
        }
    }

    /// Returns true for `pass::` and `env::` references.
    pub fn is_reference(&self) -> bool {
        !matches!(self, Self::Plain(_))
    }

    /// Produces the secret value.
    pub fn resolve(&self) -> Result<String, String> {
        match *self {
            Self::Pass(path) => resolve_pass(path),
            Self::Env(var) => std::env::var(var)
                .map_err(|_| format!("environment variable `{}` is not set", var)),
            Self::Plain(value) => Ok(value.to_string()),
        }
    }
}

/// Resolves a value that may be a secret reference.
pub fn resolve(value: &str) -> Result<String, String> {
    SecretRef::parse(value).resolve()
}

fn resolve_pass(path: &str) -> Result<String, String> {
    let output = std::process::Command::new("pass")
        .arg("show")
        .arg(path)
        .output()
        .map_err(|e| format!("failed to run `pass show {}`: {}", path, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "`pass show {}` failed ({}): {}",
            path,
            output.status,
            stderr.trim()
        ));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .ok_or_else(|| format!("`pass show {}` produced no output", path))
}
