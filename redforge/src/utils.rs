//! Utility functions

use serde::{Deserialize, Serialize};

/// Version information for redforge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Generate a random UUID v4
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Lower-case `raw` into a DNS label: `[a-z0-9-]`, no leading/trailing or
/// repeated hyphens, at most 63 characters
pub fn dns_label(raw: &str) -> String {
    let mut label = String::with_capacity(raw.len());
    for c in raw.to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '-'
        };
        if c == '-' && (label.is_empty() || label.ends_with('-')) {
            continue;
        }
        label.push(c);
    }

    let mut label: String = label.trim_end_matches('-').chars().take(63).collect();
    while label.ends_with('-') {
        label.pop();
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dns_label() {
        assert_eq!(dns_label("RedForge_Nucleus--9f8e"), "redforge-nucleus-9f8e");
        assert_eq!(dns_label("--Edge Case!!"), "edge-case");
        assert_eq!(dns_label(&"a".repeat(80)).len(), 63);
    }

    #[test]
    fn test_dns_label_truncation_never_ends_with_hyphen() {
        let raw = format!("{}-tail", "b".repeat(62));
        let label = dns_label(&raw);
        assert!(label.len() <= 63);
        assert!(!label.ends_with('-'));
    }

    #[test]
    fn test_generate_uuid_is_unique() {
        assert_ne!(generate_uuid(), generate_uuid());
    }
}
