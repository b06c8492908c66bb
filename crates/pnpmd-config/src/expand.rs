//! `${VAR}` expansion for configuration strings.

use crate::ConfigError;

/// Expand environment variable references in a string.
///
/// Supports `${VAR}`, which fails when VAR is unset, and `${VAR:-default}`.
/// Strings without `${` are returned as they are, so a bare `$` in a value
/// is never expanded.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |var| -> Result<Option<String>, UnsetVar> {
        std::env::var(var).map(Some).map_err(|_| UnsetVar {
            name: var.to_owned(),
        })
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{}}} not set", e.cause.name),
    })
}

struct UnsetVar {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_var_in_path() {
        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::set_var("PNPMD_TEST_MAP_DIR", "/shared/maps");
        }
        let result = expand_env("${PNPMD_TEST_MAP_DIR}/pnpmd.map", "rules.path").unwrap();
        assert_eq!(result, "/shared/maps/pnpmd.map");
        unsafe {
            std::env::remove_var("PNPMD_TEST_MAP_DIR");
        }
    }

    #[test]
    fn test_expand_default_when_unset() {
        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::remove_var("PNPMD_TEST_UNSET_SECTION");
        }
        let result = expand_env("${PNPMD_TEST_UNSET_SECTION:-Keywords}", "toc.section").unwrap();
        assert_eq!(result, "Keywords");
    }

    #[test]
    fn test_missing_var_names_field() {
        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::remove_var("PNPMD_TEST_MISSING");
        }
        let err = expand_env("${PNPMD_TEST_MISSING}", "rules.path").unwrap_err();
        assert!(matches!(err, ConfigError::EnvVar { .. }));
        let message = err.to_string();
        assert!(message.contains("PNPMD_TEST_MISSING"));
        assert!(message.contains("rules.path"));
    }

    #[test]
    fn test_plain_values_unchanged() {
        assert_eq!(expand_env("pnpmd.map", "rules.path").unwrap(), "pnpmd.map");
        assert_eq!(expand_env("$HOME/x", "rules.path").unwrap(), "$HOME/x");
    }
}
