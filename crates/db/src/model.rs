use serde::{Deserialize, Serialize};

/// A role granted to a user, scoped to one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: String,
    pub db: String,
}

impl RoleGrant {
    pub fn new(role: impl Into<String>, db: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            db: db.into(),
        }
    }
}

/// A user as reported by the server's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub username: String,
    pub db: String,
    pub roles: Vec<RoleGrant>,
}

impl UserRecord {
    pub fn has_role(&self, grant: &RoleGrant) -> bool {
        self.roles.iter().any(|r| r == grant)
    }
}

/// Sort order or kind of a single index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexDirection {
    Asc,
    Desc,
    Text,
}

/// One field of a (possibly compound) index, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKey {
    pub field: String,
    #[serde(default = "IndexKey::default_direction")]
    pub direction: IndexDirection,
}

impl IndexKey {
    fn default_direction() -> IndexDirection {
        IndexDirection::Asc
    }

    pub fn new(field: impl Into<String>, direction: IndexDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// Named index to ensure on a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub keys: Vec<IndexKey>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexDefinition {
    pub fn ascending(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: vec![IndexKey::new(field, IndexDirection::Asc)],
            unique: false,
        }
    }

    pub fn text(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: vec![IndexKey::new(field, IndexDirection::Text)],
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_key_direction_defaults_to_ascending() {
        let key: IndexKey = serde_json::from_str(r#"{"field":"email"}"#).unwrap();
        assert_eq!(key.direction, IndexDirection::Asc);
    }

    #[test]
    fn text_index_deserializes_from_lowercase() {
        let index: IndexDefinition = serde_json::from_str(
            r#"{"name":"candidate_text","keys":[{"field":"$**","direction":"text"}]}"#,
        )
        .unwrap();
        assert_eq!(index, IndexDefinition::text("candidate_text", "$**"));
    }

    #[test]
    fn has_role_requires_matching_scope() {
        let record = UserRecord {
            username: "elevatus".to_string(),
            db: "elevatus".to_string(),
            roles: vec![RoleGrant::new("dbOwner", "admin")],
        };
        assert!(!record.has_role(&RoleGrant::new("dbOwner", "elevatus")));
        assert!(record.has_role(&RoleGrant::new("dbOwner", "admin")));
    }
}
