use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::WorkflowError;
use crate::step::Step;

/// Step dependency graph for traversal and analysis.
///
/// Edges run from the step producing a value to the step consuming it.
/// References to steps that do not exist are not edges; they are reported by
/// [`Workflow::validate`](crate::Workflow::validate) instead.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Step ids in declaration order.
  order: Vec<String>,
  /// step_id -> position in `order`.
  index: HashMap<String, usize>,
  /// Adjacency list: step_id -> downstream step_ids.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: step_id -> upstream step_ids.
  reverse_adjacency: HashMap<String, Vec<String>>,
  /// Steps that read from no other step.
  entry_points: Vec<String>,
}

impl Graph {
  /// Build a graph from steps in declaration order.
  pub fn new(steps: &[Step]) -> Self {
    let order: Vec<String> = steps.iter().map(|s| s.id.clone()).collect();
    let index: HashMap<String, usize> = order
      .iter()
      .enumerate()
      .map(|(i, id)| (id.clone(), i))
      .collect();

    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    // Initialize all steps
    for id in &order {
      adjacency.entry(id.clone()).or_default();
      reverse_adjacency.entry(id.clone()).or_default();
    }

    for step in steps {
      for upstream in step.dependencies() {
        if !index.contains_key(upstream) {
          continue;
        }
        adjacency
          .entry(upstream.to_string())
          .or_default()
          .push(step.id.clone());
        reverse_adjacency
          .entry(step.id.clone())
          .or_default()
          .push(upstream.to_string());
      }
    }

    let entry_points: Vec<String> = order
      .iter()
      .filter(|id| reverse_adjacency.get(*id).is_none_or(|v| v.is_empty()))
      .cloned()
      .collect();

    Self {
      order,
      index,
      adjacency,
      reverse_adjacency,
      entry_points,
    }
  }

  /// Steps with no upstream steps.
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Steps reading directly from `step_id`.
  pub fn downstream(&self, step_id: &str) -> &[String] {
    self
      .adjacency
      .get(step_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Steps `step_id` reads from directly.
  pub fn upstream(&self, step_id: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(step_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  pub fn contains(&self, step_id: &str) -> bool {
    self.index.contains_key(step_id)
  }

  /// Position of a step in declaration order.
  pub fn position(&self, step_id: &str) -> Option<usize> {
    self.index.get(step_id).copied()
  }

  /// `step_id` and every step it transitively reads from.
  pub fn upstream_closure(&self, step_id: &str) -> HashSet<String> {
    self.closure([step_id], |id| self.upstream(id))
  }

  /// The seeds and every step transitively reading from any of them.
  pub fn downstream_closure<'a, I>(&self, seeds: I) -> HashSet<String>
  where
    I: IntoIterator<Item = &'a str>,
  {
    self.closure(seeds, |id| self.downstream(id))
  }

  fn closure<'a, 'g, I, F>(&'g self, seeds: I, next: F) -> HashSet<String>
  where
    I: IntoIterator<Item = &'a str>,
    F: Fn(&str) -> &'g [String],
  {
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: Vec<String> = seeds
      .into_iter()
      .filter(|id| self.contains(id))
      .map(str::to_string)
      .collect();

    while let Some(id) = stack.pop() {
      if !visited.insert(id.clone()) {
        continue;
      }
      for neighbor in next(&id) {
        if !visited.contains(neighbor) {
          stack.push(neighbor.clone());
        }
      }
    }

    visited
  }

  /// Topological order of `subset` (Kahn's algorithm).
  ///
  /// Among steps that are ready at the same time the one declared first goes
  /// first, so the order is fully determined by the workflow.
  pub fn topological_order(&self, subset: &HashSet<String>) -> Result<Vec<String>, WorkflowError> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    for id in subset {
      let degree = self
        .upstream(id)
        .iter()
        .filter(|up| subset.contains(*up))
        .count();
      in_degree.insert(id.as_str(), degree);
    }

    let mut ready: BTreeSet<usize> = in_degree
      .iter()
      .filter(|(_, degree)| **degree == 0)
      .filter_map(|(id, _)| self.position(id))
      .collect();

    let mut sorted = Vec::with_capacity(subset.len());
    while let Some(position) = ready.pop_first() {
      let id = &self.order[position];
      sorted.push(id.clone());

      for down in self.downstream(id) {
        if let Some(degree) = in_degree.get_mut(down.as_str()) {
          *degree -= 1;
          if *degree == 0
            && let Some(p) = self.position(down)
          {
            ready.insert(p);
          }
        }
      }
    }

    if sorted.len() != subset.len() {
      let path = self
        .find_cycle()
        .unwrap_or_else(|| subset.iter().cloned().collect());
      return Err(WorkflowError::CyclicGraph { path });
    }

    Ok(sorted)
  }

  /// Topological order of the whole graph.
  pub fn full_order(&self) -> Result<Vec<String>, WorkflowError> {
    let all: HashSet<String> = self.order.iter().cloned().collect();
    self.topological_order(&all)
  }

  /// Find a cycle using DFS, returning it as a closed path (`a -> b -> a`).
  pub fn find_cycle(&self) -> Option<Vec<String>> {
    // 0 = unvisited, 1 = in progress, 2 = done
    let mut color: HashMap<&str, u8> = self.order.iter().map(|id| (id.as_str(), 0u8)).collect();
    let mut path: Vec<&str> = Vec::new();

    fn dfs<'a>(
      node: &'a str,
      graph: &'a Graph,
      color: &mut HashMap<&'a str, u8>,
      path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
      color.insert(node, 1);
      path.push(node);

      for neighbor in graph.downstream(node) {
        match color.get(neighbor.as_str()) {
          Some(1) => {
            // Back edge: the cycle is the path suffix starting at `neighbor`
            let start = path.iter().position(|id| *id == neighbor.as_str())?;
            let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
            cycle.push(neighbor.clone());
            return Some(cycle);
          }
          Some(0) => {
            if let Some(cycle) = dfs(neighbor, graph, color, path) {
              return Some(cycle);
            }
          }
          _ => {}
        }
      }

      path.pop();
      color.insert(node, 2);
      None
    }

    for id in &self.order {
      if color.get(id.as_str()) == Some(&0)
        && let Some(cycle) = dfs(id, self, &mut color, &mut path)
      {
        return Some(cycle);
      }
    }

    None
  }
}
