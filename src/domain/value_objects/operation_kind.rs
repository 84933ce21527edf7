use serde::{Deserialize, Serialize};
use std::fmt;

/// Queued operation kinds, named after the service methods they replay.
/// The wire form is camelCase so queue slots stay human-inspectable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    CreateStockEntry,
    CreateStockExit,
    ValidateMovement,
    RejectMovement,
    CreateInventory,
    RecordInventoryCount,
    CompleteInventory,
    CreateSupplier,
    UpdateSupplier,
    CreateUser,
    UpdateUser,
    DeactivateUser,
    UpdateSettings,
    Unknown(String),
}

impl OperationKind {
    pub fn as_str(&self) -> &str {
        match self {
            OperationKind::CreateStockEntry => "createStockEntry",
            OperationKind::CreateStockExit => "createStockExit",
            OperationKind::ValidateMovement => "validateMovement",
            OperationKind::RejectMovement => "rejectMovement",
            OperationKind::CreateInventory => "createInventory",
            OperationKind::RecordInventoryCount => "recordInventoryCount",
            OperationKind::CompleteInventory => "completeInventory",
            OperationKind::CreateSupplier => "createSupplier",
            OperationKind::UpdateSupplier => "updateSupplier",
            OperationKind::CreateUser => "createUser",
            OperationKind::UpdateUser => "updateUser",
            OperationKind::DeactivateUser => "deactivateUser",
            OperationKind::UpdateSettings => "updateSettings",
            OperationKind::Unknown(value) => value.as_str(),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for OperationKind {
    fn from(value: &str) -> Self {
        match value {
            "createStockEntry" => OperationKind::CreateStockEntry,
            "createStockExit" => OperationKind::CreateStockExit,
            "validateMovement" => OperationKind::ValidateMovement,
            "rejectMovement" => OperationKind::RejectMovement,
            "createInventory" => OperationKind::CreateInventory,
            "recordInventoryCount" => OperationKind::RecordInventoryCount,
            "completeInventory" => OperationKind::CompleteInventory,
            "createSupplier" => OperationKind::CreateSupplier,
            "updateSupplier" => OperationKind::UpdateSupplier,
            "createUser" => OperationKind::CreateUser,
            "updateUser" => OperationKind::UpdateUser,
            "deactivateUser" => OperationKind::DeactivateUser,
            "updateSettings" => OperationKind::UpdateSettings,
            other => OperationKind::Unknown(other.to_string()),
        }
    }
}
