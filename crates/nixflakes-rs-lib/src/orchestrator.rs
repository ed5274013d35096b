//! # Orchestrator
//!
//! Answers "give me a flake for this package" end to end.
//!
//! For every flake the orchestrator goes through
//! `Requested -> (Available | InProgress -> BuildRequested -> (Created | Failed))`.
//! A flake already in the store is reported available straight away. Otherwise
//! the first requester registers it as in progress and drives resolution,
//! classification, recipe selection, rendering and the build, while later
//! requesters for the same flake wait for that outcome. Dependencies that need
//! their own flake are resolved concurrently before the flake is rendered.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use crate::build::{BuildOutcome, Builder};
use crate::classifier;
use crate::events::{EventBus, FailureReason, FlakeCreated, FlakeEvent};
use crate::flake::{FlakeDescriptor, FlakeIdentifier};
use crate::in_progress::{InProgressRecord, InProgressRegistry};
use crate::recipe::RecipeRepository;
use crate::recipe::matcher;
use crate::recipe::render::{self, RenderContext, TemplateRenderer};
use crate::store::FlakeRepository;
use crate::upstream::{NixpkgsIndex, PackageResolver};

/// Terminal state of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
	Available { flake: FlakeIdentifier, url: String },
	Created(FlakeCreated),
	Failed { flake: FlakeIdentifier, reason: FailureReason },
}

impl ResolveOutcome {
	pub fn flake(&self) -> &FlakeIdentifier {
		match self {
			ResolveOutcome::Available { flake, .. } | ResolveOutcome::Failed { flake, .. } => flake,
			ResolveOutcome::Created(created) => &created.flake,
		}
	}

	pub fn is_failed(&self) -> bool {
		matches!(self, ResolveOutcome::Failed { .. })
	}
}

/// Everything the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
	pub store: Arc<dyn FlakeRepository>,
	pub resolver: Arc<dyn PackageResolver>,
	pub nixpkgs: Arc<dyn NixpkgsIndex>,
	pub recipes: Arc<dyn RecipeRepository>,
	pub renderer: Arc<dyn TemplateRenderer>,
	pub builder: Arc<dyn Builder>,
}

type ResolveFuture = Pin<Box<dyn Future<Output = ResolveOutcome> + Send>>;

pub struct Orchestrator {
	collaborators: Collaborators,
	registry: Arc<InProgressRegistry<ResolveOutcome>>,
	bus: Arc<EventBus>,
	flakes_dir: PathBuf,
}

impl Orchestrator {
	/// # Parameters
	/// - `registry` - Flakes in progress, shared by every orchestrator of the process.
	/// - `bus` - Where events are emitted.
	/// - `flakes_dir` - Each flake is written to `<flakes_dir>/<name>-<version>`.
	pub fn new(collaborators: Collaborators, registry: Arc<InProgressRegistry<ResolveOutcome>>, bus: Arc<EventBus>, flakes_dir: impl Into<PathBuf>) -> Arc<Self> {
		Arc::new(Self {
			collaborators,
			registry,
			bus,
			flakes_dir: flakes_dir.into(),
		})
	}

	pub fn registry(&self) -> &InProgressRegistry<ResolveOutcome> {
		&self.registry
	}

	pub fn bus(&self) -> &EventBus {
		&self.bus
	}

	/// Resolves a flake for `name` at `version`, building it and its dependencies when needed.
	pub async fn resolve(self: &Arc<Self>, name: impl Into<String>, version: impl Into<String>) -> ResolveOutcome {
		self.clone().resolve_boxed(FlakeIdentifier::new(name, version)).await
	}

	fn resolve_boxed(self: Arc<Self>, flake: FlakeIdentifier) -> ResolveFuture {
		Box::pin(async move { self.drive(flake).await })
	}

	async fn drive(self: Arc<Self>, flake: FlakeIdentifier) -> ResolveOutcome {
		log::info!("Flake {} requested", flake);
		self.bus.emit(FlakeEvent::FlakeRequested { flake: flake.clone(), flakes_folder: self.flakes_dir.clone() });

		match self.lookup(&flake).await {
			Ok(Some(outcome)) => return outcome,
			Ok(None) => {},
			Err(reason) => return self.fail(&flake, reason),
		}

		let output_dir = self.flakes_dir.join(flake.folder_name());
		let (record, claim) = self.registry.get_or_create(&flake, output_dir);
		let Some(claim) = claim else {
			log::debug!("Flake {} is already in progress, waiting for it", flake);
			return self.attach(&record).await;
		};

		/* Someone may have finished this flake between the lookup and registering it */
		let outcome = match self.lookup(&flake).await {
			Ok(Some(outcome)) => outcome,
			Ok(None) => self.produce(&flake, &record).await,
			Err(reason) => self.fail(&flake, reason),
		};

		claim.finish(outcome.clone());
		outcome
	}

	async fn attach(&self, record: &InProgressRecord<ResolveOutcome>) -> ResolveOutcome {
		record.wait().await.unwrap_or_else(|e| ResolveOutcome::Failed {
			flake: record.flake().clone(),
			reason: FailureReason::Internal(e.to_string()),
		})
	}

	/// Step one, a flake in the store is available and needs nothing else.
	async fn lookup(&self, flake: &FlakeIdentifier) -> Result<Option<ResolveOutcome>, FailureReason> {
		let stored = self.collaborators.store.find_by_name_and_version(flake).await
			.map_err(|e| FailureReason::Store(e.to_string()))?;
		if stored.is_none() {
			return Ok(None);
		}

		let url = self.collaborators.store.url_for_flake(flake);
		log::info!("Flake {} is available at {}", flake, url);
		self.bus.emit(FlakeEvent::FlakeAvailable { flake: flake.clone(), url: url.clone() });
		Ok(Some(ResolveOutcome::Available { flake: flake.clone(), url }))
	}

	fn fail(&self, flake: &FlakeIdentifier, reason: FailureReason) -> ResolveOutcome {
		log::error!("Flake {} could not be created: {}", flake, reason);
		self.bus.emit(FlakeEvent::FlakeCreationFailed { flake: flake.clone(), reason: reason.clone() });
		ResolveOutcome::Failed { flake: flake.clone(), reason }
	}

	async fn produce(self: &Arc<Self>, flake: &FlakeIdentifier, record: &InProgressRecord<ResolveOutcome>) -> ResolveOutcome {
		let c = &self.collaborators;

		self.bus.emit(FlakeEvent::PythonPackageRequested { package: flake.clone() });
		let package = match c.resolver.resolve(flake).await {
			Ok(Some(package)) => package,
			Ok(None) => {
				log::warn!("Package {} is unknown", flake);
				self.bus.emit(FlakeEvent::PythonPackageUnknown { package: flake.clone() });
				return self.fail(flake, FailureReason::UnknownPackage);
			},
			Err(e) => return self.fail(flake, FailureReason::Internal(format!("package resolution failed: {}", e))),
		};
		self.bus.emit(FlakeEvent::PythonPackageResolved { package: package.clone() });

		if let Err(e) = self.registry.set_resolved_package(package.clone()) {
			return self.fail(flake, FailureReason::Internal(e.to_string()));
		}

		let registry = self.registry.clone();
		let in_progress = move |id: &FlakeIdentifier| registry.contains(id);
		let classification = match classifier::classify(&package, c.nixpkgs.as_ref(), c.store.as_ref(), &in_progress).await {
			Ok(classification) => classification,
			Err(e) => return self.fail(flake, FailureReason::Store(e.to_string())),
		};
		if !classification.sub_requests.is_empty() {
			log::info!("{} needs new flakes for {} dependencies", flake, classification.sub_requests.len());
		}

		if let Err(reason) = self.resolve_dependencies(flake, &classification).await {
			return self.fail(flake, reason);
		}

		let descriptor = FlakeDescriptor::new(package, classification.roles);
		self.render_and_build(&descriptor, record).await
	}

	/// Requests the missing dependencies and waits for those in progress.
	///
	/// Stored dependencies need nothing. A dependency that already waits for
	/// `flake`, directly or through others, is left to finish on its own.
	async fn resolve_dependencies(self: &Arc<Self>, flake: &FlakeIdentifier, classification: &classifier::Classification) -> Result<(), FailureReason> {
		let mut pending = tokio::task::JoinSet::new();
		for id in classification.sub_requests.iter().chain(classification.in_progress.iter()) {
			let Some(edge) = self.registry.wait_for(flake, id) else {
				log::warn!("Dependency cycle: {} depends on {} which is waiting for it", flake, id);
				continue;
			};

			let this = self.clone();
			let id = id.clone();
			let in_progress = classification.in_progress.contains(&id);
			pending.spawn(async move {
				let _edge = edge;
				let record = this.registry.get(&id);
				match record {
					Some(record) if in_progress => this.attach(&record).await,
					/* missing, or finished since it was classified */
					_ => this.resolve_boxed(id).await,
				}
			});
		}

		let mut failed: Option<FailureReason> = None;
		while let Some(joined) = pending.join_next().await {
			let reason = match joined {
				Ok(ResolveOutcome::Failed { flake: dependency, .. }) => FailureReason::DependencyFailed(dependency),
				Ok(_) => continue,
				Err(e) => FailureReason::Internal(format!("dependency task failed: {}", e)),
			};
			failed.get_or_insert(reason);
		}

		match failed {
			Some(reason) => Err(reason),
			None => Ok(()),
		}
	}

	async fn render_and_build(&self, descriptor: &FlakeDescriptor, record: &InProgressRecord<ResolveOutcome>) -> ResolveOutcome {
		let c = &self.collaborators;
		let flake = descriptor.identifier();

		let candidates = c.recipes.find_recipes_for(descriptor.package());
		let Some(recipe) = matcher::select_recipe(descriptor.package(), candidates) else {
			return self.fail(flake, FailureReason::NoRecipe);
		};
		log::info!("Using recipe `{}` for {}", recipe.name, flake);

		let merged = classifier::merged_declaration(descriptor.dependencies());
		let store = c.store.clone();
		let context = RenderContext::new(descriptor, &merged, &move |id: &FlakeIdentifier| store.url_for_flake(id));
		let rendered = match render::render_recipe(recipe, &context, c.renderer.as_ref())
			.and_then(|rendered| render::write_rendered(record.output_dir(), &rendered).map(|_| rendered))
		{
			Ok(rendered) => rendered,
			Err(e) => return self.fail(flake, FailureReason::Render(e.to_string())),
		};

		self.bus.emit(FlakeEvent::BuildFlakeRequested { flake: flake.clone(), output_dir: record.output_dir().to_path_buf() });
		match c.builder.build(flake, record.output_dir()).await {
			BuildOutcome::Built(location) => {
				self.bus.emit(FlakeEvent::FlakeBuilt { flake: flake.clone(), location });
			},
			BuildOutcome::Failed(reason) => {
				self.bus.emit(FlakeEvent::FlakeBuildFailed { flake: flake.clone(), reason: reason.clone() });
				return self.fail(flake, reason);
			},
		}

		match c.store.create(descriptor, &rendered, &recipe.name).await {
			Ok(created) => {
				log::info!("Flake {} created at {}", flake, created.url);
				self.bus.emit(FlakeEvent::FlakeCreated(created.clone()));
				ResolveOutcome::Created(created)
			},
			Err(e) => self.fail(flake, FailureReason::Store(e.to_string())),
		}
	}
}
