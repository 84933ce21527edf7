use crate::domain::value_objects::{MovementStatus, MovementType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub id: String,
    pub article_id: String,
    #[serde(default)]
    pub article_name: Option<String>,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub quantity: i64,
    #[serde(default)]
    pub reason: Option<String>,
    pub user_id: String,
    pub user_name: String,
    pub status: MovementStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub validated_by: Option<String>,
    #[serde(default)]
    pub validated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}
