//! Token claim sets and OIDC claim shaping.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::oauth::scope::has_scope;
use crate::storage::{Person, User};

/// Claim names that extra-claim templates may not override.
const REGISTERED_CLAIMS: &[&str] = &[
    "iss", "sub", "aud", "exp", "iat", "nbf", "jti", "typ", "scope", "nonce", "at_hash",
    "code_challenge",
];

/// Type tag carried in the `typ` claim.
///
/// ID tokens carry no tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    /// Access token.
    #[serde(rename = "AT")]
    AccessToken,
    /// Authorization code.
    #[serde(rename = "CODE")]
    AuthCode,
    /// Refresh token.
    #[serde(rename = "RT")]
    RefreshToken,
}

/// The `aud` claim: a single string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Default for Audience {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl Audience {
    /// Whether `value` is one of the audiences.
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::One(aud) => aud == value,
            Self::Many(auds) => auds.iter().any(|aud| aud == value),
        }
    }
}

impl From<&str> for Audience {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

/// Claims shared by every token this server issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub aud: Audience,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub jti: String,
    #[serde(rename = "typ", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<TokenType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,
    /// Profile and extra claims.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An extra claim definition.
///
/// Either a bare template string, always added, or a template that is only
/// added when the granted scope contains `scope`:
///
/// ```toml
/// [access_token_extra_claims]
/// user_id = "$user_id"
/// roles = { value = "$roles", scope = "roles" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimTemplate {
    Plain(String),
    Scoped { value: String, scope: String },
}

impl ClaimTemplate {
    fn template(&self) -> &str {
        match self {
            Self::Plain(value) | Self::Scoped { value, .. } => value,
        }
    }

    /// Whether the claim is emitted for `granted_scope`.
    pub fn applies_to(&self, granted_scope: &str) -> bool {
        match self {
            Self::Plain(_) => true,
            Self::Scoped { scope, .. } => has_scope(granted_scope, scope),
        }
    }

    /// Renders the template for `user`.
    ///
    /// A template that is exactly `$groups` or `$roles` renders as a JSON
    /// array; anywhere else those variables are joined with commas.
    pub fn render(&self, user: &User, roles: &[String]) -> Value {
        let template = self.template().trim();
        match template {
            "$groups" => return string_array(&user.person.groups),
            "$roles" => return string_array(roles),
            _ => {}
        }

        let person = &user.person;
        let rendered = template
            .replace("$user_id", &user.user_id)
            .replace("$given_name", &person.given_name)
            .replace("$family_name", &person.family_name)
            .replace("$email", &person.email)
            .replace("$department", &person.department)
            .replace("$birthdate", &person.birthdate)
            .replace("$groups", &person.groups.join(","))
            .replace("$roles", &roles.join(","));
        Value::String(rendered)
    }
}

fn string_array(values: &[String]) -> Value {
    Value::Array(values.iter().cloned().map(Value::String).collect())
}

/// Adds the rendered extra claims applicable to `granted_scope`.
///
/// Empty values are skipped and registered claim names are never overwritten.
pub fn add_extra_claims(
    claims: &mut Map<String, Value>,
    templates: &HashMap<String, ClaimTemplate>,
    user: &User,
    roles: &[String],
    granted_scope: &str,
) {
    for (name, template) in templates {
        if REGISTERED_CLAIMS.contains(&name.as_str()) {
            tracing::warn!(claim = %name, "Extra claim would override a registered claim, skipped");
            continue;
        }
        if !template.applies_to(granted_scope) {
            continue;
        }
        let value = template.render(user, roles);
        let empty = match &value {
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            _ => false,
        };
        if !empty {
            claims.insert(name.clone(), value);
        }
    }
}

fn insert_non_empty(claims: &mut Map<String, Value>, name: &str, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        claims.insert(name.to_string(), Value::String(value.to_string()));
    }
}

/// `profile` scope: `name`, `given_name`, `family_name`, `birthdate`.
pub fn add_profile_claims(claims: &mut Map<String, Value>, person: &Person) {
    insert_non_empty(claims, "name", &person.name());
    insert_non_empty(claims, "given_name", &person.given_name);
    insert_non_empty(claims, "family_name", &person.family_name);
    insert_non_empty(claims, "birthdate", &person.birthdate);
}

/// `email` scope.
pub fn add_email_claims(claims: &mut Map<String, Value>, person: &Person) {
    insert_non_empty(claims, "email", &person.email);
}

/// `phone` scope.
pub fn add_phone_claims(claims: &mut Map<String, Value>, person: &Person) {
    insert_non_empty(claims, "phone_number", &person.phone_number);
}

/// `address` scope: an `address` object, omitted when every part is empty.
pub fn add_address_claims(claims: &mut Map<String, Value>, person: &Person) {
    let mut address = Map::new();
    insert_non_empty(&mut address, "street_address", &person.street_address);
    insert_non_empty(&mut address, "locality", &person.locality);
    insert_non_empty(&mut address, "postal_code", &person.postal_code);
    if !address.is_empty() {
        claims.insert("address".to_string(), Value::Object(address));
    }
}

/// Adds each standard claim group whose scope token is in `granted_scope`.
pub fn add_scoped_person_claims(
    claims: &mut Map<String, Value>,
    person: &Person,
    granted_scope: &str,
) {
    if has_scope(granted_scope, "profile") {
        add_profile_claims(claims, person);
    }
    if has_scope(granted_scope, "email") {
        add_email_claims(claims, person);
    }
    if has_scope(granted_scope, "phone") {
        add_phone_claims(claims, person);
    }
    if has_scope(granted_scope, "address") {
        add_address_claims(claims, person);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alice() -> User {
        User::new(
            "alice",
            Person {
                given_name: "Alice".to_string(),
                family_name: "Liddell".to_string(),
                email: "alice@example.com".to_string(),
                department: "R&D".to_string(),
                phone_number: "+49 30 1234".to_string(),
                locality: "Berlin".to_string(),
                groups: vec!["eng".to_string(), "ops".to_string()],
                ..Person::default()
            },
        )
    }

    #[test]
    fn test_token_type_tags() {
        assert_eq!(serde_json::to_value(TokenType::AccessToken).unwrap(), "AT");
        assert_eq!(serde_json::to_value(TokenType::AuthCode).unwrap(), "CODE");
        assert_eq!(serde_json::to_value(TokenType::RefreshToken).unwrap(), "RT");
    }

    #[test]
    fn test_audience_forms() {
        let one: Audience = serde_json::from_value(json!("app")).unwrap();
        assert!(one.contains("app"));
        let many: Audience = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert!(many.contains("b"));
        assert!(!many.contains("c"));
    }

    #[test]
    fn test_claims_flatten_extra() {
        let mut claims = Claims {
            iss: "https://login.example.com".to_string(),
            sub: "alice".to_string(),
            aud: Audience::from("app"),
            iat: 1,
            exp: 2,
            jti: String::new(),
            token_type: Some(TokenType::AccessToken),
            scope: Some("openid".to_string()),
            code_challenge: None,
            nonce: None,
            at_hash: None,
            extra: Map::new(),
        };
        claims.extra.insert("department".to_string(), json!("R&D"));

        let value = serde_json::to_value(&claims).unwrap();
        assert_eq!(value["typ"], "AT");
        assert_eq!(value["aud"], "app");
        assert_eq!(value["department"], "R&D");
        assert!(value.get("nonce").is_none());
        assert!(value.get("jti").is_none());
    }

    #[test]
    fn test_template_rendering() {
        let user = alice();
        let roles = vec!["admin".to_string()];

        let plain = ClaimTemplate::Plain("$given_name $family_name <$email>".to_string());
        assert_eq!(
            plain.render(&user, &roles),
            json!("Alice Liddell <alice@example.com>")
        );
        assert_eq!(
            ClaimTemplate::Plain("$groups".to_string()).render(&user, &roles),
            json!(["eng", "ops"])
        );
        assert_eq!(
            ClaimTemplate::Plain(" $roles ".to_string()).render(&user, &roles),
            json!(["admin"])
        );
        assert_eq!(
            ClaimTemplate::Plain("groups=$groups".to_string()).render(&user, &roles),
            json!("groups=eng,ops")
        );
    }

    #[test]
    fn test_extra_claims_respect_scope_and_registered_names() {
        let templates: HashMap<String, ClaimTemplate> = serde_json::from_value(json!({
            "dept": "$department",
            "roles": { "value": "$roles", "scope": "roles" },
            "sub": "$email",
            "birthdate": "$birthdate"
        }))
        .unwrap();
        let roles = vec!["admin".to_string()];

        let mut claims = Map::new();
        add_extra_claims(&mut claims, &templates, &alice(), &roles, "openid");
        assert_eq!(claims.get("dept"), Some(&json!("R&D")));
        assert!(claims.get("roles").is_none());
        assert!(claims.get("sub").is_none());
        assert!(claims.get("birthdate").is_none());

        let mut claims = Map::new();
        add_extra_claims(&mut claims, &templates, &alice(), &roles, "openid ROLES");
        assert_eq!(claims.get("roles"), Some(&json!(["admin"])));
    }

    #[test]
    fn test_scoped_person_claims() {
        let person = alice().person;

        let mut claims = Map::new();
        add_scoped_person_claims(&mut claims, &person, "openid email");
        assert_eq!(Value::Object(claims), json!({ "email": "alice@example.com" }));

        let mut claims = Map::new();
        add_scoped_person_claims(&mut claims, &person, "profile phone address");
        assert_eq!(
            Value::Object(claims),
            json!({
                "name": "Alice Liddell",
                "given_name": "Alice",
                "family_name": "Liddell",
                "phone_number": "+49 30 1234",
                "address": { "locality": "Berlin" }
            })
        );
    }

    #[test]
    fn test_address_omitted_when_empty() {
        let mut claims = Map::new();
        add_address_claims(&mut claims, &Person::default());
        assert!(claims.is_empty());
    }
}
