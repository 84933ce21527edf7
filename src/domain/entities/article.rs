use crate::domain::value_objects::ArticleStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    pub current_stock: i64,
    pub min_stock: i64,
    #[serde(default)]
    pub supplier_id: Option<String>,
    pub status: ArticleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    pub fn new(name: String, current_stock: i64, min_stock: i64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            category: None,
            unit: None,
            current_stock,
            min_stock,
            supplier_id: None,
            status: ArticleStatus::for_level(current_stock, min_stock),
            created_at: now,
            updated_at: now,
        }
    }
}
