use std::path::PathBuf;
use std::sync::Arc;

use nixflakes_rs::build::{BuildOutcome, Builder, FlakeBuilder};
use nixflakes_rs::events::FailureReason;
use nixflakes_rs::{Config, FlakeIdentifier};
use nixflakes_rs_test_utils::*;

fn init() {
	let _ = env_logger::builder().is_test(true).try_init();
}

struct Setup {
	_root: tempfile::TempDir,
	runner: Arc<ScriptedToolRunner>,
	builder: FlakeBuilder,
	flake: FlakeIdentifier,
	output_dir: PathBuf,
}

/// A flake folder with a top level `flake.nix` and a `nix/` folder, both carrying the original hash.
fn setup(runner: ScriptedToolRunner) -> Setup {
	init();
	let root = tempfile::tempdir().unwrap();
	let config = Config::rooted_at(root.path());
	let flake = FlakeIdentifier::new("idna", "3.4");
	let output_dir = config.flakes_dir().join(flake.folder_name());

	std::fs::create_dir_all(output_dir.join("nix")).unwrap();
	std::fs::write(output_dir.join("flake.nix"), format!("{{ src.hash = \"{}\"; }}", ORIGINAL_HASH)).unwrap();
	std::fs::write(output_dir.join("nix").join("package.nix"), format!("{{ sha256 = \"{}\"; }}", ORIGINAL_HASH)).unwrap();

	let runner = Arc::new(runner);
	let builder = FlakeBuilder::new(&config, runner.clone()).unwrap();
	Setup { _root: root, runner, builder, flake, output_dir }
}

#[tokio::test]
async fn successful_first_attempt() {
	let s = setup(ScriptedToolRunner::succeeding());

	assert_eq!(s.builder.build(&s.flake, &s.output_dir).await, BuildOutcome::Built(s.output_dir.clone()));
	assert_eq!(s.runner.nix_invocations(), 1);
	assert!(std::fs::read_to_string(s.output_dir.join("flake.nix")).unwrap().contains(ORIGINAL_HASH));
}

#[tokio::test]
async fn hash_mismatch_is_repaired_once() {
	let s = setup(ScriptedToolRunner::new(vec![hash_mismatch(CORRECT_HASH)], build_success()));

	assert_eq!(s.builder.build(&s.flake, &s.output_dir).await, BuildOutcome::Built(s.output_dir.clone()));
	assert_eq!(s.runner.nix_invocations(), 2);

	let seen = s.runner.seen_flakes();
	assert!(seen[0].contains(ORIGINAL_HASH));
	assert!(seen[1].contains(CORRECT_HASH));

	/* the repaired files are copied back to the flake folder */
	let flake = std::fs::read_to_string(s.output_dir.join("flake.nix")).unwrap();
	let package = std::fs::read_to_string(s.output_dir.join("nix").join("package.nix")).unwrap();
	assert!(flake.contains(CORRECT_HASH) && !flake.contains(ORIGINAL_HASH));
	assert!(package.contains(CORRECT_HASH));
	assert!(!s.output_dir.join(".git").exists());
}

#[tokio::test]
async fn persistent_mismatch_gives_up_after_repair() {
	let s = setup(ScriptedToolRunner::always(hash_mismatch(CORRECT_HASH)));

	let BuildOutcome::Failed(reason) = s.builder.build(&s.flake, &s.output_dir).await else { panic!("build should fail") };

	assert_eq!(s.runner.nix_invocations(), 2);
	assert_eq!(reason.forensic_dir(), Some(s.builder.forensic_path(&s.flake).as_path()));
	let preserved = std::fs::read_to_string(s.builder.forensic_path(&s.flake).join("flake.nix")).unwrap();
	assert!(preserved.contains(CORRECT_HASH));
}

#[tokio::test]
async fn other_failures_are_not_retried() {
	let s = setup(ScriptedToolRunner::always(build_failure("error: attribute 'flit-core' missing")));

	let BuildOutcome::Failed(reason) = s.builder.build(&s.flake, &s.output_dir).await else { panic!("build should fail") };

	assert_eq!(s.runner.nix_invocations(), 1);
	match reason {
		FailureReason::BuildTool { forensic_dir, output } => {
			assert_eq!(forensic_dir, s.builder.forensic_path(&s.flake));
			assert!(output.contains("flit-core"));
		},
		other => panic!("unexpected failure {:?}", other),
	}
	assert!(std::fs::read_to_string(s.output_dir.join("flake.nix")).unwrap().contains(ORIGINAL_HASH));
}

#[tokio::test]
async fn forensic_copy_replaces_older_one() {
	let s = setup(ScriptedToolRunner::always(build_failure("error: boom")));
	let forensic = s.builder.forensic_path(&s.flake);
	std::fs::create_dir_all(&forensic).unwrap();
	std::fs::write(forensic.join("stale.txt"), "old").unwrap();

	s.builder.build(&s.flake, &s.output_dir).await;

	assert!(!forensic.join("stale.txt").exists());
	assert!(forensic.join("nix").join("package.nix").is_file());
}

#[tokio::test]
async fn scratch_directories_are_removed() {
	let s = setup(ScriptedToolRunner::new(vec![hash_mismatch(CORRECT_HASH)], build_failure("error: boom")));

	s.builder.build(&s.flake, &s.output_dir).await;

	let scratch_dirs = s.runner.calls().into_iter().map(|c| c.cwd).collect::<std::collections::HashSet<_>>();
	assert_eq!(scratch_dirs.len(), 1);
	assert!(scratch_dirs.iter().all(|d| !d.exists()));
}

#[tokio::test]
async fn every_top_level_entry_is_staged() {
	let s = setup(ScriptedToolRunner::succeeding());

	s.builder.build(&s.flake, &s.output_dir).await;

	let git_args = s.runner.calls().into_iter()
		.filter(|c| c.program == "git")
		.map(|c| c.args.join(" "))
		.collect::<Vec<_>>();
	assert_eq!(git_args, vec!["init", "add flake.nix", "add nix"]);
}

#[tokio::test]
async fn git_failure_is_a_tool_failure() {
	let s = setup(ScriptedToolRunner::succeeding().with_failing_git());

	let outcome = s.builder.build(&s.flake, &s.output_dir).await;

	assert!(matches!(outcome, BuildOutcome::Failed(FailureReason::Tool(_))));
	assert_eq!(s.runner.nix_invocations(), 0);
	assert!(!s.builder.forensic_path(&s.flake).exists());
}
