//! Secret reference resolver.
//!
//! Values in `config.toml` can reference secrets stored outside the file:
//!
//! - `env::VAR_NAME` reads `$VAR_NAME` from the environment
//! - `pass::path/in/store` runs `pass show path/in/store` and takes the first line
//! - anything else is used as-is

/// Resolves a value that may carry a secret reference prefix.
pub fn resolve(value: &str) -> Result<String, String> {
    if let Some(var) = value.strip_prefix("env::") {
        resolve_env(var)
    } else if let Some(path) = value.strip_prefix("pass::") {
        resolve_pass(path)
    } else {
        Ok(value.to_string())
    }
}

fn resolve_env(var: &str) -> Result<String, String> {
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => Ok(value),
        Ok(_) => Err(format!("environment variable `{var}` is empty")),
        Err(_) => Err(format!("environment variable `{var}` is not set")),
    }
}

fn resolve_pass(path: &str) -> Result<String, String> {
    let output = std::process::Command::new("pass")
        .arg("show")
        .arg(path)
        .output()
        .map_err(|e| format!("failed to run `pass show {path}`: {e}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "`pass show {path}` failed ({}): {}",
            output.status,
            stderr.trim()
        ));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
        .ok_or_else(|| format!("`pass show {path}` produced no output"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passthrough() {
        assert_eq!(resolve("hello").unwrap(), "hello");
        assert_eq!(
            resolve("xxx.apps.googleusercontent.com").unwrap(),
            "xxx.apps.googleusercontent.com"
        );
    }

    #[test]
    fn env_prefix_resolves() {
        unsafe {
            std::env::set_var("_VOXCAL_TEST_SECRET", "s3cret");
        }
        assert_eq!(resolve("env::_VOXCAL_TEST_SECRET").unwrap(), "s3cret");
        unsafe {
            std::env::remove_var("_VOXCAL_TEST_SECRET");
        }
    }

    #[test]
    fn env_prefix_missing_var_errors() {
        let err = resolve("env::_VOXCAL_UNSET_VAR_4821").unwrap_err();
        assert!(err.contains("not set"));
    }

    #[test]
    fn pass_prefix_unknown_entry_errors() {
        assert!(resolve("pass::voxcal/no/such/entry/4821").is_err());
    }
}
