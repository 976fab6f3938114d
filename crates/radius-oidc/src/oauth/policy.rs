//! Class-based admission and role mapping

use crate::config::OAuthConfig;

/// Split a class attribute value on `,` or `;` into trimmed, non-empty groups
pub fn split_groups(value: &str) -> Vec<String> {
    value
        .split([',', ';'])
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct ClassPolicy {
    /// Empty admits everyone
    pub permitted: Vec<String>,
    pub admin: Vec<String>,
    pub admin_role: String,
}

impl ClassPolicy {
    pub fn from_config(config: &OAuthConfig) -> Self {
        ClassPolicy {
            permitted: config.permitted_classes.clone(),
            admin: config.admin_classes.clone(),
            admin_role: config.admin_role.clone(),
        }
    }

    /// Whether a user with `groups` may log in
    pub fn admits(&self, groups: &[String]) -> bool {
        self.permitted.is_empty() || groups.iter().any(|g| self.permitted.contains(g))
    }

    /// Elevated role for members of an admin class
    pub fn role_for(&self, groups: &[String]) -> Option<String> {
        groups
            .iter()
            .any(|g| self.admin.contains(g))
            .then(|| self.admin_role.clone())
    }
}
