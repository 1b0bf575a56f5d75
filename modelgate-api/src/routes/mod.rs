/// API route handlers
///
/// Organized by resource:
///
/// - `health`: liveness and database connectivity
/// - `auth`: bearer token issuance
/// - `users`: registration and account management
/// - `models`: model registry and provider sync
/// - `access`: access rules and policy checks
/// - `usage`: usage recording and statistics

pub mod access;
pub mod auth;
pub mod health;
pub mod models;
pub mod usage;
pub mod users;

use serde::{Deserialize, Deserializer};

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`); use with `#[serde(default)]`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        limit: Option<Option<i64>>,
    }

    #[test]
    fn test_double_option() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.limit, None);

        let null: Patch = serde_json::from_str(r#"{"limit": null}"#).unwrap();
        assert_eq!(null.limit, Some(None));

        let value: Patch = serde_json::from_str(r#"{"limit": 500}"#).unwrap();
        assert_eq!(value.limit, Some(Some(500)));
    }
}
