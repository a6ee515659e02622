//! Cached resource values and their lifecycle.
//!
//! Each resource moves through
//! `Absent -> Computing -> Present`, `Computing -> Failed` on error,
//! `Present | Failed -> Absent` on invalidation. Values are cached in memory
//! only and never persisted.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tessera_workflow::Workflow;

/// Lifecycle state of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResourceState {
  Absent,
  Computing,
  Present,
  Failed { message: String },
}

impl ResourceState {
  pub fn name(&self) -> &'static str {
    match self {
      ResourceState::Absent => "absent",
      ResourceState::Computing => "computing",
      ResourceState::Present => "present",
      ResourceState::Failed { .. } => "failed",
    }
  }
}

/// One published step output.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceEntry {
  /// Id of the producing step.
  pub producer: String,
  /// Output name on the producing step.
  pub output: String,
  pub state: ResourceState,
  pub value: Option<Value>,
  /// Fingerprint of the last computed value. Survives invalidation so a
  /// recomputation can tell whether the value actually changed.
  pub value_fingerprint: Option<String>,
  /// Fingerprint of the step definition the value was computed from.
  pub step_fingerprint: Option<String>,
  /// Bumped every time a value with a new fingerprint is committed.
  pub version: u64,
  /// Upstream resource -> the version it had when this value was computed.
  pub computed_against: IndexMap<String, u64>,
}

impl ResourceEntry {
  fn new(producer: &str, output: &str) -> Self {
    Self {
      producer: producer.to_string(),
      output: output.to_string(),
      state: ResourceState::Absent,
      value: None,
      value_fingerprint: None,
      step_fingerprint: None,
      version: 0,
      computed_against: IndexMap::new(),
    }
  }

  pub fn is_present(&self) -> bool {
    self.state == ResourceState::Present
  }

  fn clear(&mut self) {
    self.state = ResourceState::Absent;
    self.value = None;
    self.step_fingerprint = None;
    self.computed_against.clear();
  }
}

/// Resource name -> cached state, in workflow declaration order.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
  entries: IndexMap<String, ResourceEntry>,
  next_version: u64,
}

impl ResourceGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Bring the entry set in line with the resources `workflow` publishes.
  ///
  /// New resources start `Absent`; resources whose producer changed are
  /// reset; resources nobody publishes any more are dropped.
  pub fn sync(&mut self, workflow: &Workflow) {
    let mut synced = IndexMap::with_capacity(self.entries.len());
    for step in workflow.steps() {
      for (output, resource) in &step.outputs {
        let entry = match self.entries.shift_remove(resource) {
          Some(entry) if entry.producer == step.id && entry.output == *output => entry,
          _ => ResourceEntry::new(&step.id, output),
        };
        synced.insert(resource.clone(), entry);
      }
    }
    self.entries = synced;
  }

  pub fn get(&self, resource: &str) -> Option<&ResourceEntry> {
    self.entries.get(resource)
  }

  pub fn state(&self, resource: &str) -> Option<&ResourceState> {
    self.entries.get(resource).map(|e| &e.state)
  }

  /// The cached value, only while the resource is `Present`.
  pub fn value(&self, resource: &str) -> Option<&Value> {
    self
      .entries
      .get(resource)
      .filter(|e| e.is_present())
      .and_then(|e| e.value.as_ref())
  }

  pub fn entries(&self) -> impl Iterator<Item = (&str, &ResourceEntry)> {
    self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub(crate) fn mark_computing(&mut self, resource: &str) {
    if let Some(entry) = self.entries.get_mut(resource) {
      entry.state = ResourceState::Computing;
    }
  }

  /// Store a freshly computed value. Returns whether its fingerprint differs
  /// from the previously computed one.
  pub(crate) fn commit(
    &mut self,
    resource: &str,
    value: Value,
    value_fingerprint: String,
    step_fingerprint: &str,
    computed_against: IndexMap<String, u64>,
  ) -> bool {
    let Some(entry) = self.entries.get_mut(resource) else {
      return false;
    };

    let changed = entry.value_fingerprint.as_deref() != Some(value_fingerprint.as_str());
    if changed {
      self.next_version += 1;
      entry.version = self.next_version;
    }

    entry.state = ResourceState::Present;
    entry.value = Some(value);
    entry.value_fingerprint = Some(value_fingerprint);
    entry.step_fingerprint = Some(step_fingerprint.to_string());
    entry.computed_against = computed_against;
    changed
  }

  pub(crate) fn fail(&mut self, resource: &str, message: &str) {
    if let Some(entry) = self.entries.get_mut(resource) {
      entry.clear();
      entry.state = ResourceState::Failed {
        message: message.to_string(),
      };
    }
  }

  /// Reset the given resources to `Absent`. Returns the ones that were not
  /// `Absent` already.
  pub fn invalidate<'a, I>(&mut self, resources: I) -> Vec<String>
  where
    I: IntoIterator<Item = &'a str>,
  {
    let mut invalidated = Vec::new();
    for resource in resources {
      if let Some(entry) = self.entries.get_mut(resource)
        && entry.state != ResourceState::Absent
      {
        entry.clear();
        invalidated.push(resource.to_string());
      }
    }
    invalidated
  }

  /// Put a resource left `Computing` by an interrupted evaluation back to
  /// `Absent`.
  pub(crate) fn abandon(&mut self, resource: &str) {
    if let Some(entry) = self.entries.get_mut(resource)
      && entry.state == ResourceState::Computing
    {
      entry.clear();
    }
  }

  /// Resources of the given steps that are currently `Failed`.
  pub fn failed_of(&self, step_ids: &HashSet<String>) -> Vec<(&str, &str)> {
    self
      .entries
      .iter()
      .filter(|(_, e)| step_ids.contains(&e.producer))
      .filter_map(|(name, e)| match &e.state {
        ResourceState::Failed { message } => Some((name.as_str(), message.as_str())),
        _ => None,
      })
      .collect()
  }

  /// Whether every `Present` resource was computed against upstream
  /// resources that are still `Present` at the same version.
  ///
  /// Holding for every direct edge makes it hold transitively.
  pub fn is_consistent(&self) -> bool {
    self
      .entries
      .values()
      .filter(|e| e.is_present())
      .all(|e| {
        e.computed_against.iter().all(|(upstream, version)| {
          self
            .entries
            .get(upstream)
            .is_some_and(|u| u.is_present() && u.version == *version)
        })
      })
  }
}
