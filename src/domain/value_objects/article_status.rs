use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    Normal,
    Low,
    Out,
}

impl ArticleStatus {
    /// Threshold rule: `out` iff zero, `low` iff at or under the minimum,
    /// `normal` otherwise.
    pub fn for_level(current_stock: i64, min_stock: i64) -> Self {
        if current_stock <= 0 {
            ArticleStatus::Out
        } else if current_stock <= min_stock {
            ArticleStatus::Low
        } else {
            ArticleStatus::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Normal => "normal",
            ArticleStatus::Low => "low",
            ArticleStatus::Out => "out",
        }
    }

    pub fn needs_alert(&self) -> bool {
        !matches!(self, ArticleStatus::Normal)
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
