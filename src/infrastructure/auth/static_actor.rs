use crate::application::ports::actor::{Actor, ActorProvider};

/// Fixed-identity provider for embedding contexts where the host application
/// resolves the signed-in user once (and for tests).
pub struct StaticActorProvider {
    actor: Actor,
}

impl StaticActorProvider {
    pub fn new(actor: Actor) -> Self {
        Self { actor }
    }
}

impl ActorProvider for StaticActorProvider {
    fn current_actor(&self) -> Option<Actor> {
        Some(self.actor.clone())
    }
}
