//! Verified identity claims and permission resolution.
//!
//! A permission string only means something inside the scope it was granted in:
//! holding `content:write` in unit `news` says nothing about unit `sports` or the
//! organization as a whole.
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Deserializer, Serialize};

/// Which kind of token the claims came from (`ntt` claim).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TokenType {
    #[serde(rename = "access_token")]
    Access,
    #[serde(rename = "id_token")]
    Identity,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Display/audit data. Never used for authorization decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Userinfo {
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub email: String,
}

/// Two-level permission grant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default, deserialize_with = "null_as_default")]
    pub org: HashSet<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub units: HashMap<String, HashSet<String>>,
}

/// Claims derived from a verified token. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "sub")]
    pub subject: String,
    #[serde(rename = "org")]
    pub organization: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub groups: HashSet<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub userinfo: Userinfo,
    #[serde(rename = "ntt", default)]
    pub token_type: TokenType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub permissions: Permissions,
}

impl Claims {
    /// Organization-scope check.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.org.contains(permission)
    }

    /// Unit-scope check; an unknown unit is simply `false`.
    pub fn has_permission_in_unit(&self, unit: &str, permission: &str) -> bool {
        self.permissions
            .units
            .get(unit)
            .is_some_and(|perms| perms.contains(permission))
    }

    /// Unscoped check: organization grant first, then any unit.
    ///
    /// Unit iteration order is unspecified.
    pub fn has_permission_anywhere(&self, permission: &str) -> bool {
        self.has_permission(permission)
            || self
                .permissions
                .units
                .values()
                .any(|perms| perms.contains(permission))
    }

    pub fn is_member_of(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    pub fn is_access_token(&self) -> bool {
        self.token_type == TokenType::Access
    }

    /// Organization permissions followed by every unit permission, deduplicated.
    pub fn all_permissions(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        let mut org: Vec<&String> = self.permissions.org.iter().collect();
        org.sort();
        let mut units: Vec<(&String, &HashSet<String>)> = self.permissions.units.iter().collect();
        units.sort_by(|a, b| a.0.cmp(b.0));

        let unit_perms = units.into_iter().flat_map(|(_, perms)| {
            let mut perms: Vec<&String> = perms.iter().collect();
            perms.sort();
            perms
        });

        for p in org.into_iter().chain(unit_perms) {
            if seen.insert(p.as_str()) {
                out.push(p.clone());
            }
        }

        out
    }
}

// Tokens minted by other services may carry `null` for empty lists/objects.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn acme() -> Claims {
        serde_json::from_value(json!({
            "sub": "user-1",
            "org": "acme",
            "groups": ["editors"],
            "permissions": {
                "org": ["content:read"],
                "units": { "news": ["content:write"] }
            }
        }))
        .expect("claims")
    }

    #[test]
    fn org_scope_only_for_has_permission() {
        let claims = acme();
        assert!(claims.has_permission("content:read"));
        assert!(!claims.has_permission("content:write"));
    }

    #[test]
    fn unit_scope_is_isolated() {
        let claims = acme();
        assert!(claims.has_permission_in_unit("news", "content:write"));
        assert!(!claims.has_permission_in_unit("sports", "content:write"));
        assert!(!claims.has_permission_in_unit("news", "content:read"));
        assert!(!claims.has_permission_in_unit("missing", "anything"));
    }

    #[test]
    fn anywhere_covers_org_and_units() {
        let claims = acme();
        assert!(claims.has_permission_anywhere("content:read"));
        assert!(claims.has_permission_anywhere("content:write"));
        assert!(!claims.has_permission_anywhere("admin:manage"));
    }

    #[test]
    fn null_and_missing_lists_become_empty() {
        let claims: Claims = serde_json::from_value(json!({
            "sub": "user-2",
            "org": "acme",
            "groups": null,
            "permissions": { "org": null, "units": null },
            "unknown_extra": 42
        }))
        .expect("claims");

        assert!(claims.groups.is_empty());
        assert!(claims.permissions.org.is_empty());
        assert!(claims.permissions.units.is_empty());
        assert_eq!(claims.token_type, TokenType::Unknown);
    }

    #[test]
    fn token_type_discriminator() {
        let mut value = json!({ "sub": "s", "org": "o", "ntt": "access_token" });
        let claims: Claims = serde_json::from_value(value.clone()).unwrap();
        assert!(claims.is_access_token());

        value["ntt"] = json!("id_token");
        let claims: Claims = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(claims.token_type, TokenType::Identity);

        value["ntt"] = json!("something-new");
        let claims: Claims = serde_json::from_value(value).unwrap();
        assert_eq!(claims.token_type, TokenType::Unknown);
    }

    #[test]
    fn missing_org_is_rejected() {
        let res = serde_json::from_value::<Claims>(json!({ "sub": "s" }));
        assert!(res.is_err());
    }

    #[test]
    fn all_permissions_flattens_without_duplicates() {
        let claims: Claims = serde_json::from_value(json!({
            "sub": "s",
            "org": "o",
            "permissions": {
                "org": ["b", "a"],
                "units": { "u2": ["c", "a"], "u1": ["d"] }
            }
        }))
        .unwrap();

        assert_eq!(claims.all_permissions(), vec!["a", "b", "d", "c"]);
    }
}
