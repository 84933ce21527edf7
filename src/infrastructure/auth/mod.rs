mod static_actor;

pub use static_actor::StaticActorProvider;
