use std::sync::Arc;

use nixflakes_rs::build::FlakeBuilder;
use nixflakes_rs::build::tools::ProcessRunner;
use nixflakes_rs::events::EventBus;
use nixflakes_rs::in_progress::InProgressRegistry;
use nixflakes_rs::orchestrator::Collaborators;
use nixflakes_rs::recipe::{DirectoryRecipeRepository, RecipeRepository};
use nixflakes_rs::recipe::render::PlaceholderRenderer;
use nixflakes_rs::store::FileSystemFlakeRepository;
use nixflakes_rs::upstream::{JsonNixpkgsIndex, JsonPackageResolver};
use nixflakes_rs::{Config, Orchestrator, ResolveOutcome};

const NIXPKGS_INDEX_FILE: &str = "nixpkgs.json";

#[tokio::main]
async fn main() {
	let mut opts;

	/* Parse console input */
	let parsed_options = {
		let args: Vec<String> = std::env::args().collect();

		opts = getopts::Options::new();
		opts.optflag("h", "help", "Show help");
		opts.optflag("v", "verbose", "Increased verbosity");
		opts.parsing_style(getopts::ParsingStyle::FloatingFrees);

		let parsed_options = match opts.parse(&args[1..]) {
			Ok(m) => m,
			Err(e) => { println!("Unable to parse options: {}", e); return },
		};

		if parsed_options.opt_present("h") {
			eprintln!("{}", opts.usage("Usage: nixflakes-rs-terminal [options] resolve <name> <version> | recipes"));
			return;
		}

		parsed_options
	};

	let mut logger = env_logger::Builder::from_default_env();
	if parsed_options.opt_present("v") && std::env::var_os("RUST_LOG").is_none() {
		logger.filter_level(log::LevelFilter::Debug);
	}
	logger.init();

	let config = Config::load_from_disk().unwrap_or_else(|e| {
		log::warn!("Failed to read config file: {}", e);
		log::warn!("Using default config.");
		Config::default()
	});

	let result = match parsed_options.free.first().map(String::as_str) {
		Some("resolve") => {
			match (parsed_options.free.get(1), parsed_options.free.get(2)) {
				(Some(name), Some(version)) => resolve(&config, name, version).await,
				_ => Err(Error::MissingArgument),
			}
		},
		Some("recipes") => list_recipes(&config),
		Some(other) => Err(Error::UnknownCommand(other.to_string())),
		None => {
			eprintln!("{}", opts.usage("Usage: nixflakes-rs-terminal [options] resolve <name> <version> | recipes"));
			return;
		},
	};

	if let Err(e) = result {
		log::error!("{}", e);
		std::process::exit(1);
	}
}

fn build_orchestrator(config: &Config) -> Result<Arc<Orchestrator>, Error> {
	let nixpkgs_path = config.data_dir().join(NIXPKGS_INDEX_FILE);
	let nixpkgs = JsonNixpkgsIndex::load(&nixpkgs_path).unwrap_or_else(|e| {
		log::warn!("Failed to read nixpkgs index {}: {}", nixpkgs_path.display(), e);
		log::warn!("Assuming nixpkgs provides nothing.");
		JsonNixpkgsIndex::default()
	});

	let collaborators = Collaborators {
		store: Arc::new(FileSystemFlakeRepository::new(config.flakes_dir())),
		resolver: Arc::new(JsonPackageResolver::new(config.data_dir())),
		nixpkgs: Arc::new(nixpkgs),
		recipes: Arc::new(DirectoryRecipeRepository::load(config.recipes_dir())?),
		renderer: Arc::new(PlaceholderRenderer::new().map_err(nixflakes_rs::Error::from)?),
		builder: Arc::new(FlakeBuilder::new(config, Arc::new(ProcessRunner))?),
	};

	Ok(Orchestrator::new(collaborators, Arc::new(InProgressRegistry::new()), Arc::new(EventBus::default()), config.flakes_dir()))
}

async fn resolve(config: &Config, name: &str, version: &str) -> Result<(), Error> {
	log::trace!("Resolving {}-{}", name, version);
	let orchestrator = build_orchestrator(config)?;

	match orchestrator.resolve(name, version).await {
		ResolveOutcome::Available { flake, url } => {
			println!("{} is already available at {}", flake, url);
			Ok(())
		},
		ResolveOutcome::Created(created) => {
			println!("Created {} from recipe `{}` at {}", created.flake, created.recipe, created.url);
			for file in &created.files {
				println!("\t{}", file.display());
			}
			Ok(())
		},
		ResolveOutcome::Failed { flake, reason } => {
			if let Some(forensic) = reason.forensic_dir() {
				println!("Build files of {} were kept in {}", flake, forensic.display());
			}
			Err(Error::Failed(reason))
		},
	}
}

fn list_recipes(config: &Config) -> Result<(), Error> {
	let (repo, failures) = DirectoryRecipeRepository::load_with_failures(config.recipes_dir())?;

	for recipe in repo.recipes() {
		println!("{} (type: {})", recipe.name, recipe.flake_type);
		for entry in &recipe.entries {
			println!("\t{} {}", entry.name, entry.spec);
		}
		for (name, version) in &recipe.supports {
			println!("\tsupports {}=={}", name, version);
		}
	}

	if !failures.is_empty() {
		println!("Malformed recipes:");
		for (name, e) in &failures {
			println!("\t{}: {}", name, e);
		}
	}
	Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("nixflakes-rs error: {0}")]
	NixflakesRs(#[from] nixflakes_rs::Error),
	#[error("Missing argument")]
	MissingArgument,
	#[error("Unknown command `{0}`")]
	UnknownCommand(String),
	#[error("Flake could not be created: {0}")]
	Failed(nixflakes_rs::events::FailureReason),
}
