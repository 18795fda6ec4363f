//! Typed wrappers for the service's REST endpoints.

pub mod client;

pub use client::ApiClient;

/// Whether the service would accept `name` as a repository name
/// (`[A-Za-z0-9._-]+`).
pub fn is_valid_repo_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_name_slug() {
        assert!(is_valid_repo_name("go-react_template.v2"));
        assert!(!is_valid_repo_name(""));
        assert!(!is_valid_repo_name("owner/repo"));
        assert!(!is_valid_repo_name("my repo"));
        assert!(!is_valid_repo_name("répo"));
    }
}
