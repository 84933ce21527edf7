pub mod actor;
pub mod remote_store;
