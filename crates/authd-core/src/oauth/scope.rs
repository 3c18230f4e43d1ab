//! Scope strings.

/// Scope tokens of `available` that also appear in `requested`.
///
/// Matching is case-insensitive; case and order follow `available`.
/// Duplicates are kept.
///
/// ```
/// use authd_core::oauth::scope::intersect_scope;
///
/// assert_eq!(intersect_scope("openid profile email", "EMAIL OPENID"), "openid email");
/// ```
pub fn intersect_scope(available: &str, requested: &str) -> String {
    let requested: Vec<&str> = requested.split_whitespace().collect();
    let mut results = Vec::new();
    for available_token in available.split_whitespace() {
        for requested_token in &requested {
            if available_token.eq_ignore_ascii_case(requested_token) {
                results.push(available_token);
            }
        }
    }
    results.join(" ")
}

/// Whether `scope` contains the token `wanted` (case-insensitive).
pub fn has_scope(scope: &str, wanted: &str) -> bool {
    scope
        .split_whitespace()
        .any(|token| token.eq_ignore_ascii_case(wanted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection_follows_available_order_and_case() {
        assert_eq!(
            intersect_scope("openid profile email", "EMAIL OPENID"),
            "openid email"
        );
        assert_eq!(intersect_scope("openid Profile", "profile"), "Profile");
    }

    #[test]
    fn test_intersection_edge_cases() {
        assert_eq!(intersect_scope("openid", ""), "");
        assert_eq!(intersect_scope("", "openid"), "");
        assert_eq!(intersect_scope("openid email", "admin"), "");
        assert_eq!(intersect_scope("  openid\temail ", "email\nopenid"), "openid email");
        // duplicates are tolerated
        assert_eq!(intersect_scope("openid", "openid OPENID"), "openid openid");
    }

    #[test]
    fn test_has_scope_matches_whole_tokens() {
        assert!(has_scope("openid offline_access", "offline_access"));
        assert!(has_scope("OpenID", "openid"));
        assert!(!has_scope("openid_connect", "openid"));
        assert!(!has_scope("", "openid"));
    }
}
