use serde::{Deserialize, Serialize};

/// Identity used to stamp writes (`userId`, `userName`, validator ids).
/// Supplied by the authentication collaborator, not managed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

pub trait ActorProvider: Send + Sync {
    fn current_actor(&self) -> Option<Actor>;
}
