use crate::domain::value_objects::ArticleStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raised when a stock movement leaves an article at or under its minimum
/// threshold. Written in the same transaction as the movement itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAlert {
    pub id: String,
    pub article_id: String,
    #[serde(default)]
    pub article_name: Option<String>,
    pub level: ArticleStatus,
    pub current_stock: i64,
    pub min_stock: i64,
    pub created_at: DateTime<Utc>,
}
