use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A game as stored in the catalog table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CatalogEntry {
    pub id: String,
    #[serde(rename = "appid")]
    #[sqlx(rename = "appid")]
    pub app_id: String,
    pub name: String,
    pub multiplayer: Option<bool>,
}

impl CatalogEntry {
    /// Builds an unclassified entry for a listing under the given id.
    pub fn from_listing(id: String, listing: RemoteListing) -> Self {
        Self {
            id,
            app_id: listing.app_id,
            name: listing.name,
            multiplayer: None,
        }
    }
}

/// A game as reported by the Steam app list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteListing {
    #[serde(rename = "appid", deserialize_with = "app_id_from_json")]
    pub app_id: String,
    #[serde(default)]
    pub name: String,
}

impl RemoteListing {
    pub fn new(app_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            name: name.into(),
        }
    }
}

/// Canonical form used when comparing app ids.
pub fn app_id_key(app_id: &str) -> String {
    app_id.to_lowercase()
}

// GetAppList reports appid as a number; older dumps use strings.
fn app_id_from_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "appid must be a number or string, got {other}"
        ))),
    }
}

/// Steam store category ids relevant to classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ClassificationCategory {
    Multiplayer,
    SinglePlayer,
    Other(i64),
}

impl ClassificationCategory {
    pub fn from_id(id: i64) -> Self {
        match id {
            1 => ClassificationCategory::Multiplayer,
            2 => ClassificationCategory::SinglePlayer,
            other => ClassificationCategory::Other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_accepts_numeric_and_string_appids() {
        let numeric: RemoteListing =
            serde_json::from_str(r#"{"appid": 570, "name": "Dota 2"}"#).unwrap();
        assert_eq!(numeric.app_id, "570");
        let string: RemoteListing =
            serde_json::from_str(r#"{"appid": "AB12", "name": "X"}"#).unwrap();
        assert_eq!(string.app_id, "AB12");
        assert!(serde_json::from_str::<RemoteListing>(r#"{"appid": null}"#).is_err());
    }

    #[test]
    fn category_ids_map_both_ways() {
        assert_eq!(
            ClassificationCategory::from_id(1),
            ClassificationCategory::Multiplayer
        );
        assert_eq!(
            ClassificationCategory::from_id(2),
            ClassificationCategory::SinglePlayer
        );
        assert_eq!(
            ClassificationCategory::from_id(29),
            ClassificationCategory::Other(29)
        );
    }

    #[test]
    fn app_id_key_folds_case() {
        assert_eq!(app_id_key("AB"), app_id_key("ab"));
        assert_ne!(app_id_key("AB "), app_id_key("ab"));
    }
}
