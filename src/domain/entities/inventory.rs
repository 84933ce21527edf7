use crate::domain::value_objects::InventoryStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub id: String,
    pub name: String,
    pub status: InventoryStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_by: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<InventoryItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub article_id: String,
    #[serde(default)]
    pub article_name: Option<String>,
    pub expected_quantity: i64,
    #[serde(default)]
    pub counted_quantity: Option<i64>,
}

impl InventoryItem {
    pub fn variance(&self) -> Option<i64> {
        self.counted_quantity
            .map(|counted| counted - self.expected_quantity)
    }
}
