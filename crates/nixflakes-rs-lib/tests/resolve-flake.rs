use std::time::Duration;

use nixflakes_rs::events::{EventKind, FailureReason};
use nixflakes_rs::{Dependency, FlakeIdentifier, ResolveOutcome};
use nixflakes_rs_test_utils::*;

fn init() {
	let _ = env_logger::builder().is_test(true).try_init();
}

fn requests() -> FlakeIdentifier { FlakeIdentifier::new("requests", "2.31.0") }
fn idna() -> FlakeIdentifier { FlakeIdentifier::new("idna", "3.4") }

#[tokio::test]
async fn creates_flake_and_missing_dependencies() {
	init();
	let resolver = StaticPackageResolver::new(vec![
		setuptools_package("requests", "2.31.0", &[("urllib3", "2.0.4"), ("idna", "3.4")]),
		setuptools_package("idna", "3.4", &[]),
	]);
	let f = Fixture::new(resolver, &["urllib3"], ScriptedToolRunner::succeeding());

	let outcome = f.orchestrator.resolve("requests", "2.31.0").await;

	let ResolveOutcome::Created(created) = outcome else { panic!("expected a created flake, got {:?}", outcome) };
	assert_eq!(created.flake, requests());
	assert_eq!(created.url, "memory:requests-2.31.0");
	assert_eq!(created.recipe, "setuptools");
	assert!(f.store.contains(&idna()));
	assert!(!f.store.contains(&FlakeIdentifier::new("urllib3", "2.0.4")));
	assert_eq!(f.runner.nix_invocations(), 2);
	assert!(f.orchestrator.registry().is_empty());

	/* idna is requested once requests is known and built before requests */
	let resolved = f.events.position(&requests(), EventKind::PythonPackageResolved).unwrap();
	let dependency_requested = f.events.position(&idna(), EventKind::FlakeRequested).unwrap();
	let dependency_created = f.events.position(&idna(), EventKind::FlakeCreated).unwrap();
	let build_requested = f.events.position(&requests(), EventKind::BuildFlakeRequested).unwrap();
	assert!(resolved < dependency_requested);
	assert!(dependency_created < build_requested);

	let flake = std::fs::read_to_string(f.output_dir(&requests()).join("flake.nix")).unwrap();
	assert!(flake.contains("idna-flake.url = \"memory:idna-3.4\";"));
	assert!(flake.contains("urllib3"));
	assert!(!flake.contains("urllib3-flake"));
	assert!(flake.contains("description = \"The requests package\";"));
}

#[tokio::test]
async fn event_sequence_of_a_new_flake() {
	init();
	let resolver = StaticPackageResolver::new(vec![setuptools_package("idna", "3.4", &[])]);
	let f = Fixture::new(resolver, &[], ScriptedToolRunner::succeeding());

	f.orchestrator.resolve("idna", "3.4").await;

	assert_eq!(f.events.kinds_for(&idna()), vec![
		EventKind::FlakeRequested,
		EventKind::PythonPackageRequested,
		EventKind::PythonPackageResolved,
		EventKind::BuildFlakeRequested,
		EventKind::FlakeBuilt,
		EventKind::FlakeCreated,
	]);
}

#[tokio::test]
async fn existing_flake_is_available() {
	init();
	let resolver = StaticPackageResolver::new(vec![setuptools_package("requests", "2.31.0", &[])]);
	let f = Fixture::new(resolver, &[], ScriptedToolRunner::succeeding());
	f.store.insert(requests(), "setuptools");

	let outcome = f.orchestrator.resolve("requests", "2.31.0").await;

	assert_eq!(outcome, ResolveOutcome::Available { flake: requests(), url: "memory:requests-2.31.0".to_string() });
	assert_eq!(f.events.kinds_for(&requests()), vec![EventKind::FlakeRequested, EventKind::FlakeAvailable]);
	assert_eq!(f.resolver.requests_for(&requests()), 0);
	assert_eq!(f.runner.nix_invocations(), 0);
	assert!(f.orchestrator.registry().is_empty());
}

#[tokio::test]
async fn stored_dependency_is_not_rebuilt() {
	init();
	let resolver = StaticPackageResolver::new(vec![
		setuptools_package("requests", "2.31.0", &[("idna", "3.4")]),
		setuptools_package("idna", "3.4", &[]),
	]);
	let f = Fixture::new(resolver, &[], ScriptedToolRunner::succeeding());
	f.store.insert(idna(), "setuptools");

	assert!(!f.orchestrator.resolve("requests", "2.31.0").await.is_failed());
	assert_eq!(f.resolver.requests_for(&idna()), 0);
	assert_eq!(f.runner.nix_invocations(), 1);
	assert!(f.events.kinds_for(&idna()).is_empty());

	let flake = std::fs::read_to_string(f.output_dir(&requests()).join("flake.nix")).unwrap();
	assert!(flake.contains("idna-flake.url = \"memory:idna-3.4\";"));
}

#[tokio::test]
async fn native_dependencies_split_between_nixpkgs_and_flakes() {
	init();
	let mut package = setuptools_package("requests", "2.31.0", &[]);
	package.dependencies.native_build = vec![Dependency::new("setuptools", "68.0.0"), Dependency::new("flit-core", "3.9.0")];
	let resolver = StaticPackageResolver::new(vec![package, setuptools_package("flit-core", "3.9.0", &[])]);
	let f = Fixture::new(resolver, &["setuptools"], ScriptedToolRunner::succeeding());
	let flit = FlakeIdentifier::new("flit-core", "3.9.0");
	let setuptools = FlakeIdentifier::new("setuptools", "68.0.0");

	let outcome = f.orchestrator.resolve("requests", "2.31.0").await;

	assert!(matches!(outcome, ResolveOutcome::Created(_)), "unexpected outcome {:?}", outcome);
	assert!(f.store.contains(&flit));
	assert!(!f.store.contains(&setuptools));
	assert!(f.events.kinds_for(&setuptools).is_empty());
	assert_eq!(f.resolver.requests_for(&flit), 1);
	assert_eq!(f.runner.nix_invocations(), 2);

	let flake = std::fs::read_to_string(f.output_dir(&requests()).join("flake.nix")).unwrap();
	assert!(flake.contains("native = [\n      flit-core\n      setuptools\n    ];"));
	assert!(flake.contains("nativeFlakes = {\n      flit-core = flit-core-flake.packages.${system}.flit-core;\n    };"));
	assert!(flake.contains("flit-core-flake.url = \"memory:flit-core-3.9.0\";"));
	assert!(!flake.contains("setuptools-flake"));
}

#[tokio::test]
async fn concurrent_requests_build_once() {
	init();
	let resolver = StaticPackageResolver::new(vec![setuptools_package("idna", "3.4", &[])])
		.with_delay(Duration::from_millis(50));
	let f = Fixture::new(resolver, &[], ScriptedToolRunner::succeeding());

	let mut handles = Vec::new();
	for _ in 0..8 {
		let orchestrator = f.orchestrator.clone();
		handles.push(tokio::spawn(async move { orchestrator.resolve("idna", "3.4").await }));
	}
	let mut outcomes = Vec::new();
	for handle in handles {
		outcomes.push(handle.await.unwrap());
	}

	assert!(matches!(outcomes[0], ResolveOutcome::Created(_)));
	assert!(outcomes.iter().all(|o| *o == outcomes[0]));
	assert_eq!(f.resolver.requests_for(&idna()), 1);
	assert_eq!(f.runner.nix_invocations(), 1);
	assert_eq!(f.store.creates(), 1);
	assert_eq!(f.events.count(EventKind::BuildFlakeRequested), 1);
	assert!(f.orchestrator.registry().is_empty());
}

#[tokio::test]
async fn shared_dependency_is_built_once() {
	init();
	let resolver = StaticPackageResolver::new(vec![
		setuptools_package("app", "1.0", &[("left", "1.0"), ("right", "1.0")]),
		setuptools_package("left", "1.0", &[("idna", "3.4")]),
		setuptools_package("right", "1.0", &[("idna", "3.4")]),
		setuptools_package("idna", "3.4", &[]),
	]).with_delay(Duration::from_millis(10));
	let f = Fixture::new(resolver, &[], ScriptedToolRunner::succeeding());

	assert!(!f.orchestrator.resolve("app", "1.0").await.is_failed());
	assert_eq!(f.resolver.requests_for(&idna()), 1);
	assert_eq!(f.runner.nix_invocations(), 4);
}

#[tokio::test]
async fn unknown_package_fails() {
	init();
	let f = Fixture::new(StaticPackageResolver::default(), &[], ScriptedToolRunner::succeeding());
	let nope = FlakeIdentifier::new("nope", "1.0");

	let outcome = f.orchestrator.resolve("nope", "1.0").await;

	assert_eq!(outcome, ResolveOutcome::Failed { flake: nope.clone(), reason: FailureReason::UnknownPackage });
	assert_eq!(f.events.kinds_for(&nope), vec![
		EventKind::FlakeRequested,
		EventKind::PythonPackageRequested,
		EventKind::PythonPackageUnknown,
		EventKind::FlakeCreationFailed,
	]);
	assert_eq!(f.runner.nix_invocations(), 0);
	assert!(f.orchestrator.registry().is_empty());
}

#[tokio::test]
async fn failed_dependency_fails_dependent() {
	init();
	let resolver = StaticPackageResolver::new(vec![setuptools_package("requests", "2.31.0", &[("idna", "3.4")])]);
	let f = Fixture::new(resolver, &[], ScriptedToolRunner::succeeding());

	let outcome = f.orchestrator.resolve("requests", "2.31.0").await;

	assert_eq!(outcome, ResolveOutcome::Failed { flake: requests(), reason: FailureReason::DependencyFailed(idna()) });
	assert_eq!(f.events.position(&requests(), EventKind::BuildFlakeRequested), None);
	assert_eq!(f.runner.nix_invocations(), 0);
}

#[tokio::test]
async fn dependency_cycle_terminates() {
	init();
	let resolver = StaticPackageResolver::new(vec![
		setuptools_package("a", "1.0", &[("b", "1.0")]),
		setuptools_package("b", "1.0", &[("a", "1.0")]),
	]);
	let f = Fixture::new(resolver, &[], ScriptedToolRunner::succeeding());

	let outcome = tokio::time::timeout(Duration::from_secs(10), f.orchestrator.resolve("a", "1.0")).await
		.expect("resolving a dependency cycle hung");

	assert!(matches!(outcome, ResolveOutcome::Created(_)));
	assert_eq!(f.runner.nix_invocations(), 2);
	assert_eq!(f.resolver.requests_for(&FlakeIdentifier::new("a", "1.0")), 1);
}

#[tokio::test]
async fn sibling_dependency_cycle_terminates() {
	init();
	let resolver = StaticPackageResolver::new(vec![
		setuptools_package("app", "1.0", &[("left", "1.0"), ("right", "1.0")]),
		setuptools_package("left", "1.0", &[("right", "1.0")]),
		setuptools_package("right", "1.0", &[("left", "1.0")]),
	]).with_delay(Duration::from_millis(10));
	let f = Fixture::new(resolver, &[], ScriptedToolRunner::succeeding());

	let outcome = tokio::time::timeout(Duration::from_secs(10), f.orchestrator.resolve("app", "1.0")).await
		.expect("resolving dependencies that depend on each other hung");

	assert!(matches!(outcome, ResolveOutcome::Created(_)), "unexpected outcome {:?}", outcome);
	assert_eq!(f.runner.nix_invocations(), 3);
	assert_eq!(f.resolver.requests_for(&FlakeIdentifier::new("left", "1.0")), 1);
	assert_eq!(f.resolver.requests_for(&FlakeIdentifier::new("right", "1.0")), 1);
	assert!(f.orchestrator.registry().is_empty());
}

#[tokio::test]
async fn abandoned_resolution_releases_the_flake() {
	init();
	let resolver = StaticPackageResolver::new(vec![setuptools_package("idna", "3.4", &[])])
		.with_delay(Duration::from_millis(200));
	let f = Fixture::new(resolver, &[], ScriptedToolRunner::succeeding());

	let waiter = {
		let orchestrator = f.orchestrator.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(20)).await;
			orchestrator.resolve("idna", "3.4").await
		})
	};
	let abandoned = tokio::time::timeout(Duration::from_millis(100), f.orchestrator.resolve("idna", "3.4")).await;

	assert!(abandoned.is_err());
	assert!(f.orchestrator.registry().is_empty());
	assert!(matches!(waiter.await.unwrap(), ResolveOutcome::Failed { reason: FailureReason::Internal(_), .. }));

	let retried = tokio::time::timeout(Duration::from_secs(5), f.orchestrator.resolve("idna", "3.4")).await
		.expect("resolving a released flake hung");
	assert!(matches!(retried, ResolveOutcome::Created(_)));
	assert_eq!(f.resolver.requests_for(&idna()), 2);
	assert!(f.orchestrator.registry().is_empty());
}

#[tokio::test]
async fn no_matching_recipe_fails() {
	init();
	let mut package = setuptools_package("flit-core", "3.9.0", &[]);
	package.package_type = "flit".to_string();
	let f = Fixture::new(StaticPackageResolver::new(vec![package]), &[], ScriptedToolRunner::succeeding());

	let outcome = f.orchestrator.resolve("flit-core", "3.9.0").await;

	assert!(matches!(outcome, ResolveOutcome::Failed { reason: FailureReason::NoRecipe, .. }));
	assert_eq!(f.runner.nix_invocations(), 0);
}

#[tokio::test]
async fn build_failure_is_reported_with_forensic_copy() {
	init();
	let resolver = StaticPackageResolver::new(vec![setuptools_package("idna", "3.4", &[])]);
	let f = Fixture::new(resolver, &[], ScriptedToolRunner::always(build_failure("error: attribute 'flit' missing")));

	let outcome = f.orchestrator.resolve("idna", "3.4").await;

	let ResolveOutcome::Failed { reason, .. } = outcome else { panic!("expected a failure, got {:?}", outcome) };
	let forensic = reason.forensic_dir().expect("no forensic copy").to_path_buf();
	assert_eq!(forensic, f.config.forensic_dir().join("idna-3.4"));
	assert!(forensic.join("flake.nix").is_file());

	let failed = f.events.position(&idna(), EventKind::FlakeBuildFailed).unwrap();
	let creation_failed = f.events.position(&idna(), EventKind::FlakeCreationFailed).unwrap();
	assert!(failed < creation_failed);
	assert!(!f.store.contains(&idna()));
	assert_eq!(f.store.creates(), 0);
}
