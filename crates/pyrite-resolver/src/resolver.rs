//! The backtracking dependency solver.
//!
//! Search runs over a partial assignment (canonical name → chosen
//! package) with an explicit decision stack: each decision records the
//! candidate list, the candidate currently tried, and a snapshot of the
//! solver state taken before the assignment. A conflict backjumps to the
//! most recent decision that participates in the conflicting requirement
//! chains, advances it to its next candidate, and restores its snapshot.
//!
//! Candidate preference: a still-valid locked version first, then newest.
//! Dependency edges whose marker evaluates false against the target
//! environment are pruned before any repository traffic. Revisiting an
//! already-assigned package reuses the assignment (unioning the install
//! marker and expanding newly activated extras), so dependency cycles
//! terminate.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use pyrite_core::constraint::Constraint;
use pyrite_core::dependency::{canonicalize_name, Dependency};
use pyrite_core::environment::{Environment, MarkerEnvironment};
use pyrite_core::marker::Marker;
use pyrite_core::package::Package;
use pyrite_core::version::Version;
use pyrite_index::pool::RepositoryPool;
use pyrite_index::repository::MemoryRepository;
use pyrite_index::wheel::WheelName;
use pyrite_util::errors::{PyriteError, PyriteResult};

use crate::conflict::{ChainLink, Conflict, RequirementChain};
use crate::graph::{ResolvedGraph, ResolvedNode};
use crate::plan::{diff_with_installed, Operation};

/// A dependency edge waiting on the frontier.
#[derive(Clone)]
struct Edge {
    dep: Dependency,
    chain: RequirementChain,
    /// Set when the edge comes from an activated extra; its marker is
    /// evaluated with the `extra` variable bound to this name.
    for_extra: Option<String>,
}

/// A package chosen for a name, with the bookkeeping the solver needs.
#[derive(Clone)]
struct Assigned {
    package: Arc<Package>,
    /// Effective install condition: union of the reaching paths' markers.
    marker: Marker,
    /// Extras activated on this package so far.
    extras: BTreeSet<String>,
    /// The chain through which the assignment was first made.
    chain: RequirementChain,
}

/// Mutable search state, snapshotted per decision.
#[derive(Clone, Default)]
struct State {
    assignments: HashMap<String, Assigned>,
    frontier: VecDeque<Edge>,
}

/// One entry of the decision stack.
struct Decision {
    name: String,
    candidates: Vec<Arc<Package>>,
    index: usize,
    /// State as it was before this decision assigned anything.
    saved: State,
    edge: Edge,
}

/// The resolution engine. Construct once per run; the pool and pin
/// repositories stay caller-owned.
pub struct Resolver<'a> {
    pool: &'a RepositoryPool,
    environment: Environment,
    marker_env: MarkerEnvironment,
    python: Version,
    locked: Option<&'a MemoryRepository>,
    installed: Option<&'a MemoryRepository>,
}

impl<'a> Resolver<'a> {
    pub fn new(pool: &'a RepositoryPool, environment: Environment) -> Self {
        let marker_env = environment.marker_environment();
        let (major, minor, patch) = environment.python_version;
        Self {
            pool,
            marker_env,
            python: Version::new(major, minor, patch),
            environment,
            locked: None,
            installed: None,
        }
    }

    /// Prefer versions from a previous resolution when still valid,
    /// minimizing churn between runs.
    pub fn with_locked(mut self, locked: &'a MemoryRepository) -> Self {
        self.locked = Some(locked);
        self
    }

    /// Diff the plan against what is already installed; also consulted as
    /// a secondary pin preference.
    pub fn with_installed(mut self, installed: &'a MemoryRepository) -> Self {
        self.installed = Some(installed);
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Resolve the root package's requirements into an ordered list of
    /// install operations: every dependency no later than its dependents,
    /// ties by package name.
    pub async fn resolve(
        &self,
        root: &Package,
        extras: &[String],
        with_dev: bool,
    ) -> PyriteResult<Vec<Operation>> {
        let root_name = root.name().to_string();
        let root_extras: BTreeSet<String> =
            extras.iter().map(|e| canonicalize_name(e)).collect();

        let mut state = State::default();
        let root_arc = Arc::new(root.clone());
        state.assignments.insert(
            root_name.clone(),
            Assigned {
                package: root_arc.clone(),
                marker: Marker::Any,
                extras: root_extras.clone(),
                chain: RequirementChain::new(),
            },
        );
        Self::push_requires(
            &mut state,
            &root_arc,
            &root_extras,
            &RequirementChain::new(),
        );
        if with_dev {
            let display = format!("{} {}", root.pretty_name(), root.version());
            for dep in &root.dev_requires {
                state.frontier.push_back(Edge {
                    chain: RequirementChain::new()
                        .extended(ChainLink::new(&display, &root_name, dep)),
                    dep: dep.clone(),
                    for_extra: None,
                });
            }
        }

        let mut decisions: Vec<Decision> = Vec::new();

        while let Some(edge) = state.frontier.pop_front() {
            if !self.edge_applies(&edge) {
                tracing::debug!(dep = %edge.dep, "edge pruned by marker");
                continue;
            }

            if state.assignments.contains_key(&edge.dep.name) {
                if self.edge_satisfied(&state, &edge) {
                    Self::absorb_edge(&mut state, &edge);
                    continue;
                }
                let assigned = &state.assignments[&edge.dep.name];
                let conflict = Conflict {
                    name: edge.dep.name.clone(),
                    dep: edge.dep.clone(),
                    new_chain: edge.chain.clone(),
                    existing_chain: assigned.chain.clone(),
                    assigned: Some(assigned.package.version().clone()),
                };
                match self.backjump(&mut decisions, &conflict).await? {
                    Some(restored) => state = restored,
                    None => return Err(conflict.into_error()),
                }
                continue;
            }

            let candidates = self.candidates_for(&edge.dep).await?;
            let mut decision = Decision {
                name: edge.dep.name.clone(),
                candidates,
                index: 0,
                saved: state.clone(),
                edge: edge.clone(),
            };
            match self.activate(&mut decision).await? {
                Some(next) => {
                    state = next;
                    decisions.push(decision);
                }
                None => {
                    let conflict = Conflict {
                        name: edge.dep.name.clone(),
                        dep: edge.dep.clone(),
                        new_chain: edge.chain.clone(),
                        existing_chain: RequirementChain::new(),
                        assigned: None,
                    };
                    match self.backjump(&mut decisions, &conflict).await? {
                        Some(restored) => state = restored,
                        None => return Err(conflict.into_error()),
                    }
                }
            }
        }

        Ok(self.build_plan(&state, &root_name))
    }

    /// Whether an edge applies to the target environment at all.
    fn edge_applies(&self, edge: &Edge) -> bool {
        let env = match &edge.for_extra {
            Some(extra) => self.marker_env.with_extra(extra),
            None => self.marker_env.clone(),
        };
        edge.dep.marker.evaluate(&env)
    }

    /// Whether the already-assigned version satisfies this edge.
    fn edge_satisfied(&self, state: &State, edge: &Edge) -> bool {
        let assigned = &state.assignments[&edge.dep.name];
        if edge.dep.is_direct_reference() {
            return edge.dep.allows(&assigned.package);
        }
        edge.dep.constraint.allows(assigned.package.version())
    }

    /// Fold a compatible edge into the existing assignment: union the
    /// install marker, expand any newly activated extras.
    fn absorb_edge(state: &mut State, edge: &Edge) {
        let mut expand: Option<(Arc<Package>, BTreeSet<String>)> = None;
        if let Some(assigned) = state.assignments.get_mut(&edge.dep.name) {
            let edge_marker = edge.dep.marker.intersect(&assigned.package.marker);
            assigned.marker = assigned.marker.union(&edge_marker);

            let mut fresh = BTreeSet::new();
            for extra in &edge.dep.extras {
                let extra = canonicalize_name(extra);
                if assigned.extras.insert(extra.clone()) {
                    fresh.insert(extra);
                }
            }
            if !fresh.is_empty() {
                expand = Some((assigned.package.clone(), fresh));
            }
        }
        if let Some((package, fresh)) = expand {
            Self::push_requires(state, &package, &fresh, &edge.chain);
        }
    }

    /// Ordered candidates for a dependency: a still-valid pinned version
    /// first, then newest first as the pool returned them.
    async fn candidates_for(&self, dep: &Dependency) -> PyriteResult<Vec<Arc<Package>>> {
        let constraint = if dep.is_direct_reference() {
            Constraint::Any
        } else {
            dep.constraint.clone()
        };
        let mut candidates = self.pool.find_packages(&dep.name, &constraint).await?;
        if dep.is_direct_reference() {
            candidates.retain(|c| dep.allows(c));
        }
        self.prefer_pinned(dep, &mut candidates);
        Ok(candidates)
    }

    fn prefer_pinned(&self, dep: &Dependency, candidates: &mut Vec<Arc<Package>>) {
        for repo in [self.locked, self.installed].into_iter().flatten() {
            let pinned = repo
                .packages_named(&dep.name)
                .into_iter()
                .find(|p| dep.allows(p));
            if let Some(pinned) = pinned {
                if let Some(pos) = candidates
                    .iter()
                    .position(|c| c.version() == pinned.version())
                {
                    if pos > 0 {
                        let preferred = candidates.remove(pos);
                        candidates.insert(0, preferred);
                    }
                    tracing::debug!(package = %pinned.name(), version = %pinned.version(), "preferring pinned version");
                    return;
                }
            }
        }
    }

    /// Try candidates from the decision's current index until one is
    /// viable; returns the post-assignment state, or `None` when the
    /// decision is exhausted.
    async fn activate(&self, decision: &mut Decision) -> PyriteResult<Option<State>> {
        while decision.index < decision.candidates.len() {
            let candidate = decision.candidates[decision.index].clone();
            let full = match self
                .pool
                .package(candidate.name(), candidate.version())
                .await
            {
                Ok(package) => package,
                Err(PyriteError::PackageNotFound { .. }) => {
                    decision.index += 1;
                    continue;
                }
                Err(err) => return Err(err),
            };
            if !full.python_constraint.allows(&self.python) {
                tracing::debug!(package = %full, "candidate rejected: unsupported interpreter");
                decision.index += 1;
                continue;
            }
            if !self.has_installable_artifact(&full) {
                tracing::debug!(
                    package = %full,
                    "candidate rejected: zero installable artifacts for this environment"
                );
                decision.index += 1;
                continue;
            }
            let mut state = decision.saved.clone();
            Self::assign(&mut state, full, &decision.edge);
            return Ok(Some(state));
        }
        Ok(None)
    }

    /// Whether the package publishes at least one artifact installable in
    /// the target environment. A package with no file listing at all
    /// (metadata-only sources, lock snapshots) is assumed installable; an
    /// sdist builds anywhere.
    fn has_installable_artifact(&self, package: &Package) -> bool {
        if package.files.is_empty() {
            return true;
        }
        package.files.iter().any(|f| {
            if f.file.ends_with(".whl") {
                WheelName::parse(&f.file)
                    .map(|w| w.supports(&self.environment))
                    .unwrap_or(false)
            } else {
                true
            }
        })
    }

    /// Backjump to the most recent decision participating in the conflict
    /// and advance it; `None` when every participant is exhausted.
    async fn backjump(
        &self,
        decisions: &mut Vec<Decision>,
        conflict: &Conflict,
    ) -> PyriteResult<Option<State>> {
        let mut level = decisions.len();
        while level > 0 {
            level -= 1;
            let participates = {
                let decision = &decisions[level];
                decision.name == conflict.name
                    || conflict.new_chain.mentions(&decision.name)
                    || conflict.existing_chain.mentions(&decision.name)
            };
            if !participates {
                continue;
            }
            let decision = &mut decisions[level];
            decision.index += 1;
            if let Some(state) = self.activate(decision).await? {
                tracing::debug!(
                    package = %decision.name,
                    candidate = decision.index,
                    "backjumped to earlier decision"
                );
                decisions.truncate(level + 1);
                return Ok(Some(state));
            }
        }
        Ok(None)
    }

    fn assign(state: &mut State, package: Arc<Package>, edge: &Edge) {
        let name = package.name().to_string();
        let extras: BTreeSet<String> = edge
            .dep
            .extras
            .iter()
            .map(|e| canonicalize_name(e))
            .collect();
        let marker = edge.dep.marker.intersect(&package.marker);
        state.assignments.insert(
            name,
            Assigned {
                package: package.clone(),
                marker,
                extras: extras.clone(),
                chain: edge.chain.clone(),
            },
        );
        Self::push_requires(state, &package, &extras, &edge.chain);
    }

    fn push_requires(
        state: &mut State,
        package: &Arc<Package>,
        extras: &BTreeSet<String>,
        chain: &RequirementChain,
    ) {
        let display = format!("{} {}", package.pretty_name(), package.version());
        for dep in &package.requires {
            state.frontier.push_back(Edge {
                chain: chain.extended(ChainLink::new(&display, package.name(), dep)),
                dep: dep.clone(),
                for_extra: None,
            });
        }
        for extra in extras {
            if let Some(deps) = package.extras.get(extra) {
                for dep in deps {
                    state.frontier.push_back(Edge {
                        chain: chain.extended(ChainLink::new(&display, package.name(), dep)),
                        dep: dep.clone(),
                        for_extra: Some(extra.clone()),
                    });
                }
            }
        }
    }

    /// Turn a complete assignment into ordered operations against the
    /// installed snapshot.
    fn build_plan(&self, state: &State, root_name: &str) -> Vec<Operation> {
        let mut graph = ResolvedGraph::new();
        for (name, assigned) in &state.assignments {
            if name == root_name {
                continue;
            }
            graph.add_node(ResolvedNode {
                name: name.clone(),
                version: assigned.package.version().clone(),
                marker: assigned.marker.clone(),
            });
        }
        for (name, assigned) in &state.assignments {
            if name == root_name {
                continue;
            }
            let Some(from) = graph.find(name) else {
                continue;
            };
            let extras: Vec<String> = assigned.extras.iter().cloned().collect();
            for dep in assigned.package.requires_with_extras(&extras) {
                if dep.name == root_name {
                    continue;
                }
                if let Some(to) = graph.find(&dep.name) {
                    graph.add_edge(from, to);
                }
            }
        }

        let resolved: Vec<(Arc<Package>, Marker)> = graph
            .topo_order()
            .into_iter()
            .map(|node| {
                let assigned = &state.assignments[&node.name];
                (assigned.package.clone(), node.marker.clone())
            })
            .collect();

        diff_with_installed(&resolved, self.installed)
    }
}
