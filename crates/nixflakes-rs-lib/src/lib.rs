pub mod error;
pub use error::Result;
pub use error::Error;

pub mod config;
pub use config::Config;

pub mod package;
pub use package::PackageShape;
pub use package::Dependency;

pub mod flake;
pub use flake::FlakeIdentifier;
pub use flake::FlakeDescriptor;

pub mod events;
pub use events::FlakeEvent;
pub use events::EventBus;

pub mod store;
pub mod upstream;
pub mod recipe;
pub mod classifier;
pub mod in_progress;
pub mod build;

pub mod orchestrator;
pub use orchestrator::Orchestrator;
pub use orchestrator::ResolveOutcome;
