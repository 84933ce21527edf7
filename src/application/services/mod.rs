pub mod context;
pub mod fallback;
pub mod fallback_reader;
pub mod inventory_service;
pub mod movement_service;
pub mod settings_service;
pub mod supplier_service;
pub mod sync_service;
pub mod user_service;

pub use context::{IdReconciliation, SyncContext};
pub use fallback_reader::{FallbackReader, ReadState, ReadView};
pub use inventory_service::InventoryService;
pub use movement_service::MovementService;
pub use settings_service::SettingsService;
pub use supplier_service::SupplierService;
pub use sync_service::{SyncParticipant, SyncReport, SyncService, SyncStatus};
pub use user_service::UserService;
