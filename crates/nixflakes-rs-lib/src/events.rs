//! Events emitted while resolving and building flakes.
//!
//! Every transition of the orchestrator is announced on an [`EventBus`].
//! Listeners register against an [`EventKind`] and are called synchronously in
//! registration order, observers that want everything can subscribe to the
//! broadcast channel instead.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::{Serialize, Deserialize};

use crate::flake::FlakeIdentifier;
use crate::package::PackageShape;

/// Why a flake could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum FailureReason {
	#[error("package is unknown upstream")]
	UnknownPackage,
	#[error("no recipe matches the package")]
	NoRecipe,
	#[error("dependency {0} failed")]
	DependencyFailed(FlakeIdentifier),
	#[error("failed to render recipe: {0}")]
	Render(String),
	#[error("tool invocation failed: {0}")]
	Tool(String),
	#[error("build failed, files preserved in {}", forensic_dir.display())]
	BuildTool { forensic_dir: PathBuf, output: String },
	#[error("failed to store flake: {0}")]
	Store(String),
	#[error("internal error: {0}")]
	Internal(String),
}

impl FailureReason {
	/// Forensic copy of the build, when one was taken.
	pub fn forensic_dir(&self) -> Option<&std::path::Path> {
		match self {
			FailureReason::BuildTool { forensic_dir, .. } => Some(forensic_dir),
			_ => None,
		}
	}
}

/// Payload of a successful flake creation, returned by the flake store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlakeCreated {
	pub flake: FlakeIdentifier,
	pub url: String,
	pub recipe: String,
	/// Rendered files, relative to the flake folder.
	pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlakeEvent {
	FlakeRequested { flake: FlakeIdentifier, flakes_folder: PathBuf },
	FlakeAvailable { flake: FlakeIdentifier, url: String },
	PythonPackageRequested { package: FlakeIdentifier },
	PythonPackageResolved { package: PackageShape },
	PythonPackageUnknown { package: FlakeIdentifier },
	BuildFlakeRequested { flake: FlakeIdentifier, output_dir: PathBuf },
	FlakeBuilt { flake: FlakeIdentifier, location: PathBuf },
	FlakeBuildFailed { flake: FlakeIdentifier, reason: FailureReason },
	FlakeCreated(FlakeCreated),
	FlakeCreationFailed { flake: FlakeIdentifier, reason: FailureReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
	FlakeRequested,
	FlakeAvailable,
	PythonPackageRequested,
	PythonPackageResolved,
	PythonPackageUnknown,
	BuildFlakeRequested,
	FlakeBuilt,
	FlakeBuildFailed,
	FlakeCreated,
	FlakeCreationFailed,
}

impl EventKind {
	pub const ALL: [EventKind; 10] = [
		EventKind::FlakeRequested,
		EventKind::FlakeAvailable,
		EventKind::PythonPackageRequested,
		EventKind::PythonPackageResolved,
		EventKind::PythonPackageUnknown,
		EventKind::BuildFlakeRequested,
		EventKind::FlakeBuilt,
		EventKind::FlakeBuildFailed,
		EventKind::FlakeCreated,
		EventKind::FlakeCreationFailed,
	];
}

impl FlakeEvent {
	pub fn kind(&self) -> EventKind {
		match self {
			FlakeEvent::FlakeRequested { .. } => EventKind::FlakeRequested,
			FlakeEvent::FlakeAvailable { .. } => EventKind::FlakeAvailable,
			FlakeEvent::PythonPackageRequested { .. } => EventKind::PythonPackageRequested,
			FlakeEvent::PythonPackageResolved { .. } => EventKind::PythonPackageResolved,
			FlakeEvent::PythonPackageUnknown { .. } => EventKind::PythonPackageUnknown,
			FlakeEvent::BuildFlakeRequested { .. } => EventKind::BuildFlakeRequested,
			FlakeEvent::FlakeBuilt { .. } => EventKind::FlakeBuilt,
			FlakeEvent::FlakeBuildFailed { .. } => EventKind::FlakeBuildFailed,
			FlakeEvent::FlakeCreated(_) => EventKind::FlakeCreated,
			FlakeEvent::FlakeCreationFailed { .. } => EventKind::FlakeCreationFailed,
		}
	}

	/// The flake or package the event is about.
	pub fn subject(&self) -> FlakeIdentifier {
		match self {
			FlakeEvent::FlakeRequested { flake, .. }
			| FlakeEvent::FlakeAvailable { flake, .. }
			| FlakeEvent::BuildFlakeRequested { flake, .. }
			| FlakeEvent::FlakeBuilt { flake, .. }
			| FlakeEvent::FlakeBuildFailed { flake, .. }
			| FlakeEvent::FlakeCreationFailed { flake, .. } => flake.clone(),
			FlakeEvent::PythonPackageRequested { package }
			| FlakeEvent::PythonPackageUnknown { package } => package.clone(),
			FlakeEvent::PythonPackageResolved { package } => FlakeIdentifier::from(package),
			FlakeEvent::FlakeCreated(created) => created.flake.clone(),
		}
	}
}

pub type EventHandler = Arc<dyn Fn(&FlakeEvent) + Send + Sync>;

pub struct EventBus {
	handlers: RwLock<HashMap<EventKind, Vec<EventHandler>>>,
	sender: tokio::sync::broadcast::Sender<FlakeEvent>,
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(256)
	}
}

impl EventBus {
	/// # Parameters
	/// - `capacity` - How many events a lagging broadcast subscriber may fall behind before losing some.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = tokio::sync::broadcast::channel(capacity.max(1));
		Self {
			handlers: RwLock::new(HashMap::new()),
			sender,
		}
	}

	/// Registers `handler` to be called for every event of `kind`.
	pub fn on(&self, kind: EventKind, handler: impl Fn(&FlakeEvent) + Send + Sync + 'static) {
		let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
		handlers.entry(kind).or_default().push(Arc::new(handler));
	}

	/// Receives every event emitted after this call.
	pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<FlakeEvent> {
		self.sender.subscribe()
	}

	pub fn emit(&self, event: FlakeEvent) {
		log::trace!("Emitting {:?} for {}", event.kind(), event.subject());

		/* Handlers are cloned out so one may register another without deadlocking */
		let handlers: Vec<EventHandler> = {
			let table = self.handlers.read().unwrap_or_else(|e| e.into_inner());
			table.get(&event.kind()).cloned().unwrap_or_default()
		};
		for handler in handlers {
			handler(&event);
		}

		/* An error only means nobody is subscribed */
		let _ = self.sender.send(event);
	}
}
