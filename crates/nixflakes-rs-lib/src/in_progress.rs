//! Bookkeeping for flakes that are currently being produced.
//!
//! The registry holds at most one [`InProgressRecord`] per flake. Whoever
//! creates the record gets a [`Claim`] and drives the build, everybody else
//! attaches to the record and waits for the outcome published through it.
//!
//! The registry also tracks which flake is waiting for which, so a wait that
//! would close a cycle can be refused instead of blocking forever.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::flake::FlakeIdentifier;
use crate::package::PackageShape;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
	#[error("package for {0} was already resolved")]
	PackageAlreadyResolved(FlakeIdentifier),
	#[error("no flake in progress for {0}")]
	RecordMissing(FlakeIdentifier),
	#[error("resolution of {0} was abandoned")]
	Abandoned(FlakeIdentifier),
}

#[derive(Debug, Clone)]
enum Progress<O> {
	Running,
	Done(O),
	Abandoned,
}

#[derive(Debug)]
pub struct InProgressRecord<O> {
	flake: FlakeIdentifier,
	output_dir: PathBuf,
	package: Mutex<Option<PackageShape>>,
	progress: tokio::sync::watch::Sender<Progress<O>>,
}

impl<O: Clone> InProgressRecord<O> {
	fn new(flake: FlakeIdentifier, output_dir: PathBuf) -> Self {
		let (progress, _) = tokio::sync::watch::channel(Progress::Running);
		Self {
			flake,
			output_dir,
			package: Mutex::new(None),
			progress,
		}
	}

	pub fn flake(&self) -> &FlakeIdentifier {
		&self.flake
	}

	/// Where the flake's files are written.
	pub fn output_dir(&self) -> &Path {
		&self.output_dir
	}

	/// The resolved package, `None` until [`InProgressRegistry::set_resolved_package`] is called.
	pub fn package(&self) -> Option<PackageShape> {
		self.package.lock().unwrap_or_else(|e| e.into_inner()).clone()
	}

	fn publish(&self, outcome: O) {
		self.progress.send_replace(Progress::Done(outcome));
	}

	fn abandon(&self) {
		self.progress.send_if_modified(|progress| match progress {
			Progress::Running => {
				*progress = Progress::Abandoned;
				true
			},
			_ => false,
		});
	}

	/// Waits for the outcome, returns immediately when it was already published.
	///
	/// # Errors
	/// - [`Abandoned`](RegistryError::Abandoned) when the claim was dropped without an outcome.
	pub async fn wait(&self) -> Result<O, RegistryError> {
		let mut rx = self.progress.subscribe();
		loop {
			let progress = rx.borrow_and_update().clone();
			match progress {
				Progress::Done(outcome) => return Ok(outcome),
				Progress::Abandoned => return Err(RegistryError::Abandoned(self.flake.clone())),
				Progress::Running => {},
			}
			/* `changed` only errors once the sender is dropped and `self` owns it */
			let _ = rx.changed().await;
		}
	}
}

/// Held by whoever drives a flake.
///
/// [`finish`](Self::finish) publishes the outcome and releases the record.
/// Dropping the claim without finishing, because the driving future was
/// dropped or panicked, releases the record too and wakes waiters with
/// [`Abandoned`](RegistryError::Abandoned).
#[derive(Debug)]
pub struct Claim<'a, O: Clone> {
	registry: &'a InProgressRegistry<O>,
	record: Arc<InProgressRecord<O>>,
	finished: bool,
}

impl<O: Clone> Claim<'_, O> {
	pub fn record(&self) -> &Arc<InProgressRecord<O>> {
		&self.record
	}

	pub fn finish(mut self, outcome: O) {
		self.registry.release(&self.record);
		self.record.publish(outcome);
		self.finished = true;
	}
}

impl<O: Clone> Drop for Claim<'_, O> {
	fn drop(&mut self) {
		if self.finished {
			return;
		}
		log::warn!("Resolution of {} was abandoned", self.record.flake);
		self.registry.release(&self.record);
		self.record.abandon();
	}
}

/// Edge `waiter -> target` in the waits-for graph, removed on drop.
#[derive(Debug)]
pub struct WaitEdge<O: Clone> {
	registry: Arc<InProgressRegistry<O>>,
	waiter: FlakeIdentifier,
	target: FlakeIdentifier,
}

impl<O: Clone> Drop for WaitEdge<O> {
	fn drop(&mut self) {
		let mut waits = self.registry.waits.lock().unwrap_or_else(|e| e.into_inner());
		if let Some(targets) = waits.get_mut(&self.waiter) {
			if let Some(count) = targets.get_mut(&self.target) {
				*count -= 1;
				if *count == 0 {
					targets.remove(&self.target);
				}
			}
			if targets.is_empty() {
				waits.remove(&self.waiter);
			}
		}
	}
}

/// Process wide set of flakes being produced, keyed by name and version.
#[derive(Debug)]
pub struct InProgressRegistry<O> {
	records: Mutex<HashMap<FlakeIdentifier, Arc<InProgressRecord<O>>>>,
	/// `waiter -> target -> count`, a flake can't finish before the flakes it waits for.
	waits: Mutex<HashMap<FlakeIdentifier, HashMap<FlakeIdentifier, usize>>>,
}

impl<O: Clone> Default for InProgressRegistry<O> {
	fn default() -> Self {
		Self { records: Mutex::new(HashMap::new()), waits: Mutex::new(HashMap::new()) }
	}
}

impl<O: Clone> InProgressRegistry<O> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the record for `flake`, creating it when missing.
	///
	/// The claim is only handed to the caller that created the record.
	pub fn get_or_create(&self, flake: &FlakeIdentifier, output_dir: impl Into<PathBuf>) -> (Arc<InProgressRecord<O>>, Option<Claim<'_, O>>) {
		let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
		if let Some(record) = records.get(flake) {
			return (record.clone(), None);
		}
		log::trace!("Registering {} as in progress", flake);
		let record = Arc::new(InProgressRecord::new(flake.clone(), output_dir.into()));
		records.insert(flake.clone(), record.clone());
		(record.clone(), Some(Claim { registry: self, record, finished: false }))
	}

	pub fn get(&self, flake: &FlakeIdentifier) -> Option<Arc<InProgressRecord<O>>> {
		self.records.lock().unwrap_or_else(|e| e.into_inner()).get(flake).cloned()
	}

	pub fn contains(&self, flake: &FlakeIdentifier) -> bool {
		self.records.lock().unwrap_or_else(|e| e.into_inner()).contains_key(flake)
	}

	/// Removes `record` if it is still the one registered for its flake.
	fn release(&self, record: &Arc<InProgressRecord<O>>) {
		log::trace!("Removing {} from in progress", record.flake);
		let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
		if records.get(&record.flake).is_some_and(|r| Arc::ptr_eq(r, record)) {
			records.remove(&record.flake);
		}
	}

	/// Stores the resolved package on the record, the only mutation a record goes through.
	///
	/// # Errors
	/// - [`RecordMissing`](RegistryError::RecordMissing) when nothing is in progress for the package.
	/// - [`PackageAlreadyResolved`](RegistryError::PackageAlreadyResolved) when called a second time for the same key.
	pub fn set_resolved_package(&self, package: PackageShape) -> Result<Arc<InProgressRecord<O>>, RegistryError> {
		let flake = FlakeIdentifier::from(&package);
		let record = self.get(&flake).ok_or_else(|| RegistryError::RecordMissing(flake.clone()))?;
		let mut slot = record.package.lock().unwrap_or_else(|e| e.into_inner());
		if slot.is_some() {
			return Err(RegistryError::PackageAlreadyResolved(flake));
		}
		*slot = Some(package);
		drop(slot);
		Ok(record)
	}

	/// Records that `waiter` is about to wait for `target`.
	///
	/// Returns `None` when `target` already waits for `waiter`, directly or
	/// through other flakes, since waiting would then never end.
	pub fn wait_for(self: &Arc<Self>, waiter: &FlakeIdentifier, target: &FlakeIdentifier) -> Option<WaitEdge<O>> {
		let mut waits = self.waits.lock().unwrap_or_else(|e| e.into_inner());
		if reaches(&waits, target, waiter) {
			return None;
		}
		*waits.entry(waiter.clone()).or_default().entry(target.clone()).or_default() += 1;
		Some(WaitEdge { registry: self.clone(), waiter: waiter.clone(), target: target.clone() })
	}

	pub fn len(&self) -> usize {
		self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Whether `to` can be reached from `from` in the waits-for graph, `from == to` included.
fn reaches(waits: &HashMap<FlakeIdentifier, HashMap<FlakeIdentifier, usize>>, from: &FlakeIdentifier, to: &FlakeIdentifier) -> bool {
	let mut visited = HashSet::<&FlakeIdentifier>::new();
	let mut stack = vec![from];
	while let Some(current) = stack.pop() {
		if current == to {
			return true;
		}
		if !visited.insert(current) {
			continue;
		}
		if let Some(targets) = waits.get(current) {
			stack.extend(targets.keys());
		}
	}
	false
}

#[cfg(test)]
mod tests {
	use super::*;

	fn id() -> FlakeIdentifier { FlakeIdentifier::new("requests", "2.31.0") }
	fn other() -> FlakeIdentifier { FlakeIdentifier::new("idna", "3.4") }

	#[test]
	fn second_get_or_create_attaches() {
		let registry = InProgressRegistry::<u8>::new();
		let (a, claim) = registry.get_or_create(&id(), "/tmp/a");
		let (b, second) = registry.get_or_create(&id(), "/tmp/b");
		assert!(claim.is_some() && second.is_none());
		assert!(Arc::ptr_eq(&a, &b) && b.output_dir() == Path::new("/tmp/a"));
	}

	#[test]
	fn resolving_twice_fails() {
		let registry = InProgressRegistry::<u8>::new();
		let _claim = registry.get_or_create(&id(), "/tmp").1;
		registry.set_resolved_package(PackageShape::new("requests", "2.31.0", "setuptools")).unwrap();
		assert!(matches!(
			registry.set_resolved_package(PackageShape::new("requests", "2.31.0", "setuptools")),
			Err(RegistryError::PackageAlreadyResolved(_))
		));
	}

	#[test]
	fn resolving_without_record_fails() {
		let registry = InProgressRegistry::<u8>::new();
		assert!(matches!(registry.set_resolved_package(PackageShape::new("x", "1", "")), Err(RegistryError::RecordMissing(_))));
	}

	#[test]
	fn finish_allows_fresh_record() {
		let registry = InProgressRegistry::<u8>::new();
		registry.get_or_create(&id(), "/tmp").1.unwrap().finish(1);
		assert!(registry.is_empty());
		assert!(registry.get_or_create(&id(), "/tmp").1.is_some());
	}

	#[test]
	fn concurrent_get_or_create_creates_once() {
		let registry = Arc::new(InProgressRegistry::<u8>::new());
		let barrier = Arc::new(std::sync::Barrier::new(16));
		let handles: Vec<_> = (0..16).map(|_| {
			let registry = registry.clone();
			let barrier = barrier.clone();
			std::thread::spawn(move || {
				let (_, claim) = registry.get_or_create(&id(), "/tmp");
				let created = claim.is_some();
				/* hold every claim until all threads registered */
				barrier.wait();
				created
			})
		}).collect();
		let created = handles.into_iter().map(|h| h.join().unwrap()).filter(|c| *c).count();
		assert_eq!(created, 1);
	}

	#[tokio::test]
	async fn waiters_get_published_outcome() {
		let registry = Arc::new(InProgressRegistry::<u8>::new());
		let (record, claim) = registry.get_or_create(&id(), "/tmp");
		let waiter = tokio::spawn(async move { record.wait().await });
		claim.unwrap().finish(7);
		assert_eq!(waiter.await.unwrap().unwrap(), 7);
	}

	#[tokio::test]
	async fn dropped_claim_releases_record_and_wakes_waiters() {
		let registry = InProgressRegistry::<u8>::new();
		let (record, claim) = registry.get_or_create(&id(), "/tmp");
		let waiter = tokio::spawn(async move { record.wait().await });
		drop(claim);
		assert!(registry.is_empty());
		assert!(matches!(waiter.await.unwrap(), Err(RegistryError::Abandoned(flake)) if flake == id()));
	}

	#[test]
	fn wait_closing_a_cycle_is_refused() {
		let registry = Arc::new(InProgressRegistry::<u8>::new());
		let third = FlakeIdentifier::new("charset-normalizer", "3.2.0");

		let first = registry.wait_for(&id(), &other()).unwrap();
		let _second = registry.wait_for(&other(), &third).unwrap();
		assert!(registry.wait_for(&third, &id()).is_none());
		assert!(registry.wait_for(&id(), &id()).is_none());

		drop(first);
		assert!(registry.wait_for(&third, &id()).is_some());
	}
}
