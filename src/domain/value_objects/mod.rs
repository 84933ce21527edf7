mod article_status;
mod document_id;
mod inventory_status;
mod movement_status;
mod movement_type;
mod operation_kind;
mod user_status;

pub use article_status::ArticleStatus;
pub use document_id::{is_local_id, DocumentId, LOCAL_ID_PREFIX};
pub use inventory_status::InventoryStatus;
pub use movement_status::MovementStatus;
pub use movement_type::MovementType;
pub use operation_kind::OperationKind;
pub use user_status::UserStatus;
