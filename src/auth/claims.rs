use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::connection::UserId;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Numeric user id, as a string
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Claims {
    /// Numeric identity handed to the hub
    pub fn user_id(&self) -> Result<UserId, AppError> {
        self.sub
            .parse()
            .map_err(|_| AppError::Auth(format!("Subject is not a numeric user id: {}", self.sub)))
    }

    /// Metadata attached to the connection: roles plus any string-valued
    /// custom claims.
    pub fn connection_metadata(&self) -> HashMap<String, String> {
        let mut metadata: HashMap<String, String> = self
            .extra
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect();
        if !self.roles.is_empty() {
            metadata.insert("roles".to_string(), self.roles.join(","));
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(sub: &str) -> Claims {
        serde_json::from_value(json!({
            "sub": sub,
            "exp": chrono::Utc::now().timestamp() + 60,
            "iat": chrono::Utc::now().timestamp(),
            "roles": ["admin", "support"],
            "tenant": "acme",
            "score": 7
        }))
        .unwrap()
    }

    #[test]
    fn test_numeric_subject() {
        assert_eq!(claims("42").user_id().unwrap(), 42);
        assert!(matches!(claims("user-42").user_id(), Err(AppError::Auth(_))));
    }

    #[test]
    fn test_connection_metadata() {
        let metadata = claims("1").connection_metadata();
        assert_eq!(metadata.get("roles").map(String::as_str), Some("admin,support"));
        assert_eq!(metadata.get("tenant").map(String::as_str), Some("acme"));
        // Non-string claims are not carried
        assert!(!metadata.contains_key("score"));
    }
}
