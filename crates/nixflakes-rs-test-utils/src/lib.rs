//! Various helpers for testing
//!
//! Stand-ins for the outside world: a tool runner that never spawns anything,
//! an in memory flake store, fixed package metadata and nixpkgs contents.
//! Setup helpers panic on failure so a broken fixture is obvious in the test output.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use nixflakes_rs::build::tools::{ToolOutput, ToolRunner};
use nixflakes_rs::events::{EventBus, EventKind, FlakeCreated};
use nixflakes_rs::in_progress::InProgressRegistry;
use nixflakes_rs::orchestrator::Collaborators;
use nixflakes_rs::recipe::DirectoryRecipeRepository;
use nixflakes_rs::recipe::render::{PlaceholderRenderer, RenderedTemplate};
use nixflakes_rs::store::{FlakeRepository, StoredFlake};
use nixflakes_rs::upstream::{NixpkgsIndex, PackageResolver};
use nixflakes_rs::{Config, Dependency, FlakeDescriptor, FlakeEvent, FlakeIdentifier, Orchestrator, PackageShape};

pub const ORIGINAL_HASH: &str = "sha256-AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";
pub const CORRECT_HASH: &str = "sha256-3Wc+z3nQyKkBu/ZFn6UQb7L7rlN8M5vvi6iq1FBB3ZI=";

pub const SETUPTOOLS_RECIPE: &str = "[flake]\nsetuptools = \"*\"\n\n[flake.metadata]\ntype = \"setuptools\"\n";

pub const FLAKE_TEMPLATE: &str = r#"{
  description = "{{ description }}";

  inputs = {
    nixpkgs.url = "github:NixOS/nixpkgs";
    {{ flakes_declaration }}
  };

  outputs = { self, nixpkgs, ... }: {
    # {{ name }} {{ version }}
    src = { pname = "{{ name }}"; hash = "{{ sha256 }}"; };
    propagated = [ {{ propagated_build_inputs_all_deps }} ];
    native = [
      {{ native_build_inputs_all_deps }}
    ];
    nativeFlakes = {
      {{ native_build_inputs_flakes_as_parameter_to_package_nix }}
    };
  };
}
"#;

/* Tool runner */

pub fn build_success() -> ToolOutput {
	ToolOutput { success: true, stdout: String::new(), stderr: String::new() }
}

/// What nix prints when the declared source hash is wrong.
pub fn hash_mismatch(got: &str) -> ToolOutput {
	ToolOutput {
		success: false,
		stdout: String::new(),
		stderr: format!(
			"error: hash mismatch in fixed-output derivation '/nix/store/xxx-source.drv':\n         specified: {}\n            got:    {}\n",
			ORIGINAL_HASH, got,
		),
	}
}

pub fn build_failure(message: &str) -> ToolOutput {
	ToolOutput { success: false, stdout: String::new(), stderr: message.to_string() }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
	pub program: String,
	pub args: Vec<String>,
	pub cwd: PathBuf,
}

/// Answers `git` calls with success and `nix build` with scripted outputs.
///
/// Scripted outputs are consumed in order, once they run out the fallback is returned.
pub struct ScriptedToolRunner {
	script: Mutex<VecDeque<ToolOutput>>,
	fallback: ToolOutput,
	git_fails: bool,
	nix_invocations: AtomicUsize,
	calls: Mutex<Vec<ToolCall>>,
	/// Contents of `flake.nix` as each `nix build` saw it.
	seen_flakes: Mutex<Vec<String>>,
}

impl ScriptedToolRunner {
	pub fn new(script: Vec<ToolOutput>, fallback: ToolOutput) -> Self {
		Self {
			script: Mutex::new(script.into()),
			fallback,
			git_fails: false,
			nix_invocations: AtomicUsize::new(0),
			calls: Mutex::new(Vec::new()),
			seen_flakes: Mutex::new(Vec::new()),
		}
	}

	pub fn succeeding() -> Self {
		Self::new(Vec::new(), build_success())
	}

	pub fn always(output: ToolOutput) -> Self {
		Self::new(Vec::new(), output)
	}

	/// Makes every `git` call fail.
	pub fn with_failing_git(mut self) -> Self {
		self.git_fails = true;
		self
	}

	pub fn nix_invocations(&self) -> usize {
		self.nix_invocations.load(Ordering::SeqCst)
	}

	pub fn calls(&self) -> Vec<ToolCall> {
		self.calls.lock().unwrap().clone()
	}

	pub fn seen_flakes(&self) -> Vec<String> {
		self.seen_flakes.lock().unwrap().clone()
	}
}

#[async_trait]
impl ToolRunner for ScriptedToolRunner {
	async fn run(&self, program: &str, args: &[&str], cwd: &Path) -> std::io::Result<ToolOutput> {
		self.calls.lock().unwrap().push(ToolCall {
			program: program.to_string(),
			args: args.iter().map(|a| a.to_string()).collect(),
			cwd: cwd.to_path_buf(),
		});

		if args.first() != Some(&"build") {
			return Ok(if self.git_fails { build_failure("fatal: not a git repository") } else { build_success() });
		}

		self.nix_invocations.fetch_add(1, Ordering::SeqCst);
		let flake = std::fs::read_to_string(cwd.join("flake.nix")).unwrap_or_default();
		self.seen_flakes.lock().unwrap().push(flake);

		let next = self.script.lock().unwrap().pop_front();
		Ok(next.unwrap_or_else(|| self.fallback.clone()))
	}
}

/* Collaborators */

/// Flake store kept in memory, flakes can be seeded with [`insert`](Self::insert).
#[derive(Default)]
pub struct InMemoryFlakeRepository {
	flakes: Mutex<HashMap<FlakeIdentifier, StoredFlake>>,
	creates: AtomicUsize,
}

impl InMemoryFlakeRepository {
	pub fn insert(&self, flake: FlakeIdentifier, recipe: &str) {
		let stored = StoredFlake { flake: flake.clone(), recipe: recipe.to_string(), files: Vec::new() };
		self.flakes.lock().unwrap().insert(flake, stored);
	}

	pub fn contains(&self, flake: &FlakeIdentifier) -> bool {
		self.flakes.lock().unwrap().contains_key(flake)
	}

	/// How many times [`FlakeRepository::create`] was called.
	pub fn creates(&self) -> usize {
		self.creates.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl FlakeRepository for InMemoryFlakeRepository {
	async fn find_by_name_and_version(&self, flake: &FlakeIdentifier) -> nixflakes_rs::Result<Option<StoredFlake>> {
		Ok(self.flakes.lock().unwrap().get(flake).cloned())
	}

	async fn create(&self, flake: &FlakeDescriptor, rendered: &[RenderedTemplate], recipe: &str) -> nixflakes_rs::Result<FlakeCreated> {
		self.creates.fetch_add(1, Ordering::SeqCst);
		let mut flakes = self.flakes.lock().unwrap();
		if flakes.contains_key(flake.identifier()) {
			return Err(nixflakes_rs::Error::AlreadyExists);
		}
		let stored = StoredFlake {
			flake: flake.identifier().clone(),
			recipe: recipe.to_string(),
			files: rendered.iter().map(RenderedTemplate::relative_path).collect(),
		};
		flakes.insert(stored.flake.clone(), stored.clone());

		Ok(FlakeCreated {
			url: self.url_for_flake(flake.identifier()),
			flake: stored.flake,
			recipe: stored.recipe,
			files: stored.files,
		})
	}

	fn url_for_flake(&self, flake: &FlakeIdentifier) -> String {
		format!("memory:{}", flake.folder_name())
	}
}

/// Package metadata from a fixed set of shapes.
#[derive(Default)]
pub struct StaticPackageResolver {
	packages: HashMap<FlakeIdentifier, PackageShape>,
	requests: Mutex<HashMap<FlakeIdentifier, usize>>,
	delay: Option<Duration>,
}

impl StaticPackageResolver {
	pub fn new(packages: Vec<PackageShape>) -> Self {
		Self {
			packages: packages.into_iter().map(|p| (FlakeIdentifier::from(&p), p)).collect(),
			..Default::default()
		}
	}

	/// Slows down every lookup, for tests that need overlapping requests.
	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);
		self
	}

	pub fn requests_for(&self, package: &FlakeIdentifier) -> usize {
		self.requests.lock().unwrap().get(package).copied().unwrap_or(0)
	}
}

#[async_trait]
impl PackageResolver for StaticPackageResolver {
	async fn resolve(&self, package: &FlakeIdentifier) -> nixflakes_rs::Result<Option<PackageShape>> {
		*self.requests.lock().unwrap().entry(package.clone()).or_default() += 1;
		if let Some(delay) = self.delay {
			tokio::time::sleep(delay).await;
		}
		Ok(self.packages.get(package).cloned())
	}
}

/// Nixpkgs providing every version of a fixed set of names.
#[derive(Debug, Default, Clone)]
pub struct StaticNixpkgsIndex {
	names: HashSet<String>,
}

impl StaticNixpkgsIndex {
	pub fn new(names: &[&str]) -> Self {
		Self { names: names.iter().map(|n| n.to_string()).collect() }
	}
}

impl NixpkgsIndex for StaticNixpkgsIndex {
	fn contains(&self, dependency: &Dependency) -> bool {
		self.names.contains(&dependency.name)
	}
}

/* Events */

/// Records every event emitted on a bus.
#[derive(Clone, Default)]
pub struct EventRecorder {
	events: Arc<Mutex<Vec<FlakeEvent>>>,
}

impl EventRecorder {
	pub fn attach(bus: &EventBus) -> Self {
		let recorder = Self::default();
		for kind in EventKind::ALL {
			let events = recorder.events.clone();
			bus.on(kind, move |e| events.lock().unwrap().push(e.clone()));
		}
		recorder
	}

	pub fn events(&self) -> Vec<FlakeEvent> {
		self.events.lock().unwrap().clone()
	}

	pub fn kinds_for(&self, flake: &FlakeIdentifier) -> Vec<EventKind> {
		self.events().iter().filter(|e| e.subject() == *flake).map(FlakeEvent::kind).collect()
	}

	pub fn count(&self, kind: EventKind) -> usize {
		self.events().iter().filter(|e| e.kind() == kind).count()
	}

	/// Position of the first event of `kind` about `flake`.
	pub fn position(&self, flake: &FlakeIdentifier, kind: EventKind) -> Option<usize> {
		self.events().iter().position(|e| e.kind() == kind && e.subject() == *flake)
	}
}

/* Packages and recipes */

/// A setuptools package whose dependencies are all propagated build inputs.
pub fn setuptools_package(name: &str, version: &str, propagated: &[(&str, &str)]) -> PackageShape {
	let mut package = PackageShape::new(name, version, "setuptools");
	package.description = format!("The {} package", name);
	package.license = "MIT".to_string();
	package.source_hash = ORIGINAL_HASH.to_string();
	package.dependencies.propagated_build = propagated.iter().map(|(n, v)| Dependency::new(*n, *v)).collect();
	package
}

/// Writes a recipe to `<recipes_dir>/<name>` with a `recipe.toml` and templates below `templates/`.
///
/// # Parameters
/// - `templates` - `(path, contents)` pairs, paths relative to the templates folder.
pub fn write_recipe(recipes_dir: &Path, name: &str, declaration: &str, templates: &[(&str, &str)]) -> std::io::Result<PathBuf> {
	let dir = recipes_dir.join(name);
	std::fs::create_dir_all(&dir)?;
	std::fs::write(dir.join(nixflakes_rs::recipe::declaration::DECLARATION_FILE), declaration)?;
	for (path, contents) in templates {
		let file = dir.join(nixflakes_rs::recipe::TEMPLATES_DIR).join(path);
		if let Some(parent) = file.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(file, contents)?;
	}
	Ok(dir)
}

/* Orchestrator */

/// An orchestrator wired to in memory collaborators inside a temporary directory.
pub struct Fixture {
	pub root: tempfile::TempDir,
	pub config: Config,
	pub runner: Arc<ScriptedToolRunner>,
	pub store: Arc<InMemoryFlakeRepository>,
	pub resolver: Arc<StaticPackageResolver>,
	pub events: EventRecorder,
	pub orchestrator: Arc<Orchestrator>,
}

impl Fixture {
	/// # Parameters
	/// - `nixpkgs` - Names nixpkgs provides.
	pub fn new(resolver: StaticPackageResolver, nixpkgs: &[&str], runner: ScriptedToolRunner) -> Self {
		let root = tempfile::tempdir().expect("failed to create temporary directory");
		let config = Config::rooted_at(root.path());
		write_recipe(config.recipes_dir(), "setuptools", SETUPTOOLS_RECIPE, &[("flake.nix.tmpl", FLAKE_TEMPLATE)])
			.expect("failed to write recipe");

		let runner = Arc::new(runner);
		let store = Arc::new(InMemoryFlakeRepository::default());
		let resolver = Arc::new(resolver);
		let bus = Arc::new(EventBus::default());
		let events = EventRecorder::attach(&bus);

		let collaborators = Collaborators {
			store: store.clone(),
			resolver: resolver.clone(),
			nixpkgs: Arc::new(StaticNixpkgsIndex::new(nixpkgs)),
			recipes: Arc::new(DirectoryRecipeRepository::load_strict(config.recipes_dir()).expect("failed to load recipes")),
			renderer: Arc::new(PlaceholderRenderer::new().expect("invalid placeholder pattern")),
			builder: Arc::new(nixflakes_rs::build::FlakeBuilder::new(&config, runner.clone()).expect("failed to create builder")),
		};
		let orchestrator = Orchestrator::new(collaborators, Arc::new(InProgressRegistry::new()), bus, config.flakes_dir());

		Self { root, config, runner, store, resolver, events, orchestrator }
	}

	pub fn output_dir(&self, flake: &FlakeIdentifier) -> PathBuf {
		self.config.flakes_dir().join(flake.folder_name())
	}
}
