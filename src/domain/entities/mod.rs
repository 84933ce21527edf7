mod article;
mod inventory;
mod movement;
mod settings;
mod stock_alert;
mod supplier;
mod user;

pub use article::Article;
pub use inventory::{Inventory, InventoryItem};
pub use movement::Movement;
pub use settings::{AppSettings, SETTINGS_DOC_ID};
pub use stock_alert::StockAlert;
pub use supplier::Supplier;
pub use user::User;
