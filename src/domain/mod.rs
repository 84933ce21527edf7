pub mod entities;
pub mod value_objects;

/// Remote collection names shared by services and readers.
pub mod collections {
    pub const ARTICLES: &str = "articles";
    pub const MOVEMENTS: &str = "movements";
    pub const INVENTORIES: &str = "inventories";
    pub const SUPPLIERS: &str = "suppliers";
    pub const USERS: &str = "users";
    pub const SETTINGS: &str = "settings";
    pub const STOCK_ALERTS: &str = "stock_alerts";
}
