use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Singleton settings document, stored under a fixed id.
pub const SETTINGS_DOC_ID: &str = "app";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub id: String,
    pub institution_name: String,
    pub notifications_enabled: bool,
    #[serde(default)]
    pub default_min_stock: Option<i64>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}
