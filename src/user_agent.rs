//! User-Agent string for repository API traffic.

/// Tool identifier sent in the User-Agent.
const TOOL_NAME: &str = "libsafe-export";

/// Default User-Agent for API requests (identifies the tool and its version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{TOOL_NAME}/{version} (repository-archive-export)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_contains_crate_version() {
        let ua = default_user_agent();
        assert_eq!(
            env!("CARGO_PKG_VERSION"),
            ua.strip_prefix("libsafe-export/")
                .and_then(|s| s.split(' ').next())
                .expect("user agent has version"),
            "user agent must contain crate version"
        );
    }

    #[test]
    fn test_user_agent_identifies_purpose() {
        let ua = default_user_agent();
        assert!(ua.contains("repository-archive-export"), "{ua}");
    }
}
