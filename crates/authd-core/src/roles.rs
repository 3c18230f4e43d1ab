//! Role mapping.
//!
//! Roles are derived from configured rules and a user's attributes. Every rule
//! is evaluated independently; the result is deduplicated and sorted.
//!
//! ```toml
//! [roles."*"]
//! by_group = ["*"]            # pass every group through as a role
//!
//! [roles.admin]
//! by_user_id = ["alice"]
//! by_group_dn = ["cn=admins,ou=groups,dc=example,dc=com"]
//! by_group = ["ops"]
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::storage::User;

/// Rule name and group entry that pass all groups through.
pub const WILDCARD: &str = "*";

/// Conditions under which a role is granted. Any match grants it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RoleMapping {
    /// Group names, compared case-insensitively.
    pub by_group: Vec<String>,
    /// Group distinguished names, compared per RFC 4514.
    pub by_group_dn: Vec<String>,
    /// User ids, compared case-insensitively.
    pub by_user_id: Vec<String>,
}

/// Role name to rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RoleMappings(pub BTreeMap<String, RoleMapping>);

impl RoleMappings {
    /// Creates an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule, builder style.
    #[must_use]
    pub fn with_rule(mut self, role: impl Into<String>, mapping: RoleMapping) -> Self {
        self.0.insert(role.into(), mapping);
        self
    }

    /// Roles of `user`, deduplicated and sorted.
    pub fn roles(&self, user: &User) -> Vec<String> {
        let mut roles = BTreeSet::new();
        let groups = &user.person.groups;
        let user_id = user.user_id.trim();

        for (role, mapping) in &self.0 {
            if role == WILDCARD {
                if mapping.by_group.iter().any(|group| group == WILDCARD) {
                    roles.extend(groups.iter().cloned());
                }
                continue;
            }

            let by_user = mapping
                .by_user_id
                .iter()
                .any(|id| equal_fold(id.trim(), user_id));
            let by_dn = || {
                mapping.by_group_dn.iter().any(|dn| {
                    groups
                        .iter()
                        .any(|group| DistinguishedName::equal_fold(dn, group))
                })
            };
            let by_group = || {
                mapping.by_group.iter().any(|wanted| {
                    let wanted = wanted.trim();
                    groups.iter().any(|group| equal_fold(group, wanted))
                })
            };

            if by_user || by_dn() || by_group() {
                roles.insert(role.clone());
            }
        }

        roles.into_iter().collect()
    }

    /// Checks that every configured DN parses.
    pub fn validate(&self) -> Result<(), String> {
        for (role, mapping) in &self.0 {
            for dn in &mapping.by_group_dn {
                DistinguishedName::parse(dn)
                    .map_err(|e| format!("role '{role}' has an invalid by_group_dn '{dn}': {e}"))?;
            }
        }
        Ok(())
    }
}

/// Unicode case-insensitive equality.
fn equal_fold(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// An RFC 4514 distinguished name normalized for comparison.
///
/// Attribute types and values are compared case-insensitively; attributes
/// inside a multi-valued RDN are compared regardless of order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    rdns: Vec<Vec<(String, String)>>,
}

impl DistinguishedName {
    /// Parses and normalizes a DN string.
    pub fn parse(input: &str) -> Result<Self, String> {
        let mut rdns = Vec::new();
        for rdn in split_unescaped(input, &[',', ';']) {
            let mut attributes = Vec::new();
            for ava in split_unescaped(&rdn, &['+']) {
                let (kind, value) = split_first_unescaped(&ava, '=')
                    .ok_or_else(|| format!("attribute '{}' has no '='", ava.trim()))?;
                let kind = kind.trim().to_lowercase();
                if kind.is_empty() {
                    return Err("empty attribute type".to_string());
                }
                attributes.push((kind, unescape_value(value)?.to_lowercase()));
            }
            attributes.sort();
            rdns.push(attributes);
        }
        if rdns.is_empty() {
            return Err("empty distinguished name".to_string());
        }
        Ok(Self { rdns })
    }

    /// Compares two DN strings. Unparsable input never matches.
    pub fn equal_fold(a: &str, b: &str) -> bool {
        match (Self::parse(a), Self::parse(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

/// Splits on any of `separators` that is not escaped by a backslash.
/// Escape sequences are kept verbatim for the next stage.
fn split_unescaped(input: &str, separators: &[char]) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if separators.contains(&c) {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    if !current.trim().is_empty() || !parts.is_empty() {
        parts.push(current);
    }
    parts
}

fn split_first_unescaped(input: &str, separator: char) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (index, c) in input.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == separator {
            return Some((&input[..index], &input[index + c.len_utf8()..]));
        }
    }
    None
}

/// Resolves `\c` and `\XX` escapes and drops unescaped surrounding spaces.
fn unescape_value(raw: &str) -> Result<String, String> {
    let raw = raw.trim_start();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut significant_len = 0;
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            if c != ' ' {
                significant_len = bytes.len();
            }
            continue;
        }
        let first = chars
            .next()
            .ok_or_else(|| "dangling escape".to_string())?;
        match chars.peek().copied() {
            Some(second) if first.is_ascii_hexdigit() && second.is_ascii_hexdigit() => {
                chars.next();
                let hex = format!("{first}{second}");
                let byte = u8::from_str_radix(&hex, 16).map_err(|e| e.to_string())?;
                bytes.push(byte);
            }
            _ => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(first.encode_utf8(&mut buf).as_bytes());
            }
        }
        significant_len = bytes.len();
    }

    bytes.truncate(significant_len);
    String::from_utf8(bytes).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Person;

    fn user(id: &str, groups: &[&str]) -> User {
        User {
            user_id: id.to_string(),
            person: Person {
                groups: groups.iter().map(|g| g.to_string()).collect(),
                ..Person::default()
            },
        }
    }

    #[test]
    fn test_wildcard_passes_groups_through() {
        let rules = RoleMappings::new().with_rule(
            "*",
            RoleMapping {
                by_group: vec!["*".to_string()],
                ..RoleMapping::default()
            },
        );
        assert_eq!(rules.roles(&user("bob", &["eng", "ops"])), vec!["eng", "ops"]);
    }

    #[test]
    fn test_wildcard_without_wildcard_group_grants_nothing() {
        let rules = RoleMappings::new().with_rule(
            "*",
            RoleMapping {
                by_group: vec!["eng".to_string()],
                ..RoleMapping::default()
            },
        );
        assert!(rules.roles(&user("bob", &["eng"])).is_empty());
    }

    #[test]
    fn test_by_user_id_ignores_groups_and_case() {
        let rules = RoleMappings::new().with_rule(
            "admin",
            RoleMapping {
                by_user_id: vec![" Alice ".to_string()],
                ..RoleMapping::default()
            },
        );
        assert_eq!(rules.roles(&user("alice", &[])), vec!["admin"]);
        assert_eq!(rules.roles(&user("alice", &["eng"])), vec!["admin"]);
        assert!(rules.roles(&user("bob", &["eng"])).is_empty());
    }

    #[test]
    fn test_by_group_is_case_insensitive() {
        let rules = RoleMappings::new().with_rule(
            "operator",
            RoleMapping {
                by_group: vec!["OPS".to_string()],
                ..RoleMapping::default()
            },
        );
        assert_eq!(rules.roles(&user("bob", &["ops"])), vec!["operator"]);
    }

    #[test]
    fn test_by_group_folds_non_ascii_letters() {
        let rules = RoleMappings::new().with_rule(
            "doctor",
            RoleMapping {
                by_group: vec!["ÄRZTE".to_string()],
                ..RoleMapping::default()
            },
        );
        assert_eq!(rules.roles(&user("bob", &["ärzte"])), vec!["doctor"]);
    }

    #[test]
    fn test_by_user_id_folds_non_ascii_letters() {
        let rules = RoleMappings::new().with_rule(
            "admin",
            RoleMapping {
                by_user_id: vec!["ÖZLEM".to_string()],
                ..RoleMapping::default()
            },
        );
        assert_eq!(rules.roles(&user("özlem", &[])), vec!["admin"]);
    }

    #[test]
    fn test_by_group_entries_are_trimmed() {
        let rules = RoleMappings::new().with_rule(
            "ops",
            RoleMapping {
                by_group: vec![" ops ".to_string()],
                ..RoleMapping::default()
            },
        );
        assert_eq!(rules.roles(&user("bob", &["ops"])), vec!["ops"]);
    }

    #[test]
    fn test_by_group_dn_uses_dn_equality() {
        let rules = RoleMappings::new().with_rule(
            "admin",
            RoleMapping {
                by_group_dn: vec!["CN=Admins, OU=Groups,DC=example,DC=com".to_string()],
                ..RoleMapping::default()
            },
        );
        let member = user("carol", &["cn=admins,ou=groups,dc=example,dc=com"]);
        assert_eq!(rules.roles(&member), vec!["admin"]);

        let other = user("dave", &["cn=admins,ou=people,dc=example,dc=com"]);
        assert!(rules.roles(&other).is_empty());
    }

    #[test]
    fn test_roles_are_deduplicated_and_sorted() {
        let rules = RoleMappings::new()
            .with_rule(
                "*",
                RoleMapping {
                    by_group: vec!["*".to_string()],
                    ..RoleMapping::default()
                },
            )
            .with_rule(
                "ops",
                RoleMapping {
                    by_user_id: vec!["erin".to_string()],
                    by_group: vec!["ops".to_string()],
                    ..RoleMapping::default()
                },
            )
            .with_rule(
                "auditor",
                RoleMapping {
                    by_user_id: vec!["erin".to_string()],
                    ..RoleMapping::default()
                },
            );
        assert_eq!(
            rules.roles(&user("erin", &["ops", "eng"])),
            vec!["auditor", "eng", "ops"]
        );
    }

    #[test]
    fn test_dn_equality() {
        assert!(DistinguishedName::equal_fold(
            "cn=John Smith,dc=example,dc=com",
            "CN=john smith, DC=Example ,DC=COM"
        ));
        assert!(DistinguishedName::equal_fold(
            "ou=Sales+cn=J. Smith,dc=example,dc=net",
            "CN=J. Smith+OU=Sales,DC=example,DC=net"
        ));
        assert!(DistinguishedName::equal_fold(
            r"cn=Smith\, John,dc=example",
            r"cn=Smith\2C John,dc=example"
        ));
        assert!(!DistinguishedName::equal_fold(
            "cn=a,dc=example",
            "dc=example,cn=a"
        ));
        assert!(!DistinguishedName::equal_fold("eng", "eng"));
    }

    #[test]
    fn test_validate_rejects_bad_dn() {
        let rules = RoleMappings::new().with_rule(
            "admin",
            RoleMapping {
                by_group_dn: vec!["not a dn".to_string()],
                ..RoleMapping::default()
            },
        );
        let err = rules.validate().unwrap_err();
        assert!(err.contains("admin"));
    }

    #[test]
    fn test_deserialize_from_toml_shape() {
        let json = r#"{"*": {"by_group": ["*"]}, "admin": {"by_user_id": ["alice"]}}"#;
        let rules: RoleMappings = serde_json::from_str(json).unwrap();
        assert_eq!(rules.0.len(), 2);
        assert_eq!(rules.0["admin"].by_user_id, vec!["alice"]);
    }
}
