//! Dependency-ordered job/step summary embedded into instrumented runs.

use crate::core::workflow::markers::is_valid_job_id;
use crate::core::workflow::schema::{Job, Step, Workflow};
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub const MANIFEST_VERSION: u32 = 2;

/// Longest shell-command prefix used as a step display name.
const RUN_NAME_LIMIT: usize = 40;

/// Summary of one job as seen by log consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestJob {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<String>>,
    #[serde(default)]
    pub needs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "v")]
    pub version: u32,
    pub jobs: Vec<ManifestJob>,
}

impl Manifest {
    pub fn job_ids(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.id.as_str()).collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A job left unordered because it sits on a `needs` cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleWarning {
    pub job_id: String,
    pub cycle: Vec<String>,
}

impl fmt::Display for CycleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "job '{}' is part of a dependency cycle ({})",
            self.job_id,
            self.cycle.join(" -> ")
        )
    }
}

/// Shared, append-safe list of cycle warnings.
///
/// Cloning yields another handle to the same list; callers clear it between
/// runs.
#[derive(Debug, Clone, Default)]
pub struct CycleWarnings {
    inner: Arc<Mutex<Vec<CycleWarning>>>,
}

impl CycleWarnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, warning: CycleWarning) {
        tracing::warn!(job = %warning.job_id, "{}", warning);
        self.lock().push(warning);
    }

    pub fn snapshot(&self) -> Vec<CycleWarning> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CycleWarning>> {
        // A panic while holding the lock cannot leave a Vec half-pushed.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Display name for a step: name > id > action name > first command line > "Step".
pub fn step_display_name(step: &Step) -> String {
    if let Some(name) = step.name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return name.to_string();
    }
    if let Some(id) = step.id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return id.to_string();
    }
    if let Some(uses) = step.uses.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let without_ref = uses.split('@').next().unwrap_or(uses);
        let segment = without_ref
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(without_ref);
        if !segment.is_empty() {
            return segment.to_string();
        }
    }
    if let Some(run) = step.run.as_deref() {
        if let Some(line) = run.lines().map(str::trim).find(|line| !line.is_empty()) {
            return truncate_chars(line, RUN_NAME_LIMIT);
        }
    }
    "Step".to_string()
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(limit).collect();
    truncated.push_str("...");
    truncated
}

fn manifest_job(id: &str, job: &Job) -> ManifestJob {
    let steps = if job.is_reusable() {
        None
    } else {
        Some(job.steps.iter().map(step_display_name).collect())
    };
    ManifestJob {
        id: id.to_string(),
        name: job.display_name(id),
        steps,
        needs: job.needs(),
        uses: job.uses.clone(),
    }
}

fn collect_jobs(workflow: &Workflow, into: &mut BTreeMap<String, ManifestJob>) {
    for (id, job) in &workflow.jobs {
        if !is_valid_job_id(id) {
            tracing::debug!(job = %id, "excluding job with unsafe id from manifest");
            continue;
        }
        into.insert(id.clone(), manifest_job(id, job));
    }
}

/// Build the manifest of a single workflow.
pub fn build_manifest(workflow: &Workflow, warnings: &CycleWarnings) -> Manifest {
    let mut jobs = BTreeMap::new();
    collect_jobs(workflow, &mut jobs);
    Manifest {
        version: MANIFEST_VERSION,
        jobs: topological_sort(jobs, warnings),
    }
}

/// Merge several workflows into one manifest.
///
/// Workflows are merged in path order; a later definition of a job ID
/// replaces an earlier one.
pub fn build_combined_manifest(
    workflows: &BTreeMap<PathBuf, Workflow>,
    warnings: &CycleWarnings,
) -> Manifest {
    let mut jobs = BTreeMap::new();
    for workflow in workflows.values() {
        collect_jobs(workflow, &mut jobs);
    }
    Manifest {
        version: MANIFEST_VERSION,
        jobs: topological_sort(jobs, warnings),
    }
}

/// Kahn's algorithm, always emitting the lexicographically smallest ready job.
///
/// `needs` edges to jobs outside `jobs` are ignored. Jobs that cannot be
/// ordered are appended in lexicographic order; those on a cycle are recorded
/// in `warnings` once each.
pub fn topological_sort(
    jobs: BTreeMap<String, ManifestJob>,
    warnings: &CycleWarnings,
) -> Vec<ManifestJob> {
    let mut in_degree: BTreeMap<&str, usize> = jobs.keys().map(|id| (id.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for (id, job) in &jobs {
        let deps: BTreeSet<&str> = job
            .needs
            .iter()
            .map(String::as_str)
            .filter(|dep| jobs.contains_key(*dep))
            .collect();
        for dep in deps {
            dependents.entry(dep).or_default().push(id.as_str());
            *in_degree.entry(id.as_str()).or_default() += 1;
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order: Vec<&str> = Vec::with_capacity(jobs.len());

    while let Some(next) = ready.pop_first() {
        order.push(next);
        if let Some(children) = dependents.get(next) {
            for child in children {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(*child);
                    }
                }
            }
        }
    }

    if order.len() < jobs.len() {
        let emitted: BTreeSet<&str> = order.iter().copied().collect();
        let leftover: Vec<&str> = jobs
            .keys()
            .map(String::as_str)
            .filter(|id| !emitted.contains(id))
            .collect();
        record_cycles(&jobs, &leftover, warnings);
        order.extend(leftover);
    }

    let order: Vec<String> = order.into_iter().map(str::to_string).collect();
    let mut jobs = jobs;
    order.into_iter().filter_map(|id| jobs.remove(&id)).collect()
}

fn record_cycles(jobs: &BTreeMap<String, ManifestJob>, leftover: &[&str], warnings: &CycleWarnings) {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let indices: HashMap<&str, _> = leftover.iter().map(|id| (*id, graph.add_node(*id))).collect();
    for id in leftover {
        for dep in &jobs[*id].needs {
            if let Some(dep_idx) = indices.get(dep.as_str()) {
                graph.add_edge(*dep_idx, indices[id], ());
            }
        }
    }

    let mut cyclic: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for component in tarjan_scc(&graph) {
        let is_cycle = component.len() > 1
            || component
                .first()
                .is_some_and(|idx| graph.contains_edge(*idx, *idx));
        if !is_cycle {
            continue;
        }
        let mut members: Vec<String> = component.iter().map(|idx| graph[*idx].to_string()).collect();
        members.sort();
        for idx in &component {
            cyclic.insert(graph[*idx], members.clone());
        }
    }

    for id in leftover {
        match cyclic.remove(id) {
            Some(members) => warnings.record(CycleWarning {
                job_id: id.to_string(),
                cycle: members,
            }),
            None => {
                tracing::warn!(job = %id, "job depends on a dependency cycle and is ordered last");
            }
        }
    }
}
