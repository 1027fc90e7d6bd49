//! Agent registry
//!
//! Catalog of every agent known to the board, built-in and custom. Lookups
//! are ordered (priority, then id) so dispatch and listings are stable.

use super::builtin;
use super::prompt::CustomAgentConfig;
use super::traits::Agent;
use crate::board::BoardLayout;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A problem found by [`AgentRegistry::validate`]. Agents with issues can
/// never become ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum RegistryIssue {
    MissingDependency { agent: String, dependency: String },
    SelfDependency { agent: String },
    Cycle { agents: Vec<String> },
}

impl fmt::Display for RegistryIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDependency { agent, dependency } => {
                write!(f, "agent '{agent}' depends on unknown agent '{dependency}'")
            }
            Self::SelfDependency { agent } => write!(f, "agent '{agent}' depends on itself"),
            Self::Cycle { agents } => write!(f, "dependency cycle: {}", agents.join(" -> ")),
        }
    }
}

#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<BTreeMap<String, Arc<dyn Agent>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in catalog.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for agent in builtin::catalog() {
            registry.register(agent);
        }
        registry
    }

    /// Add custom agents declared in configuration.
    pub fn register_custom(&self, configs: &[CustomAgentConfig]) {
        for config in configs {
            self.register(Arc::new(config.clone().into_agent()));
        }
    }

    /// Register an agent, replacing any agent with the same id.
    pub fn register(&self, agent: Arc<dyn Agent>) -> Option<Arc<dyn Agent>> {
        let id = agent.id().to_string();
        let previous = self.write().insert(id.clone(), agent);
        if previous.is_some() {
            tracing::info!(agent = %id, "Agent replaced");
        } else {
            tracing::debug!(agent = %id, "Agent registered");
        }
        previous
    }

    pub fn unregister(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.write().remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// All agents by priority, then id.
    pub fn list(&self) -> Vec<Arc<dyn Agent>> {
        let mut agents: Vec<Arc<dyn Agent>> = self.read().values().cloned().collect();
        agents.sort_by(|a, b| {
            a.definition()
                .priority
                .cmp(&b.definition().priority)
                .then_with(|| a.id().cmp(b.id()))
        });
        agents
    }

    /// Agents grouped by target column, columns in display order (columns
    /// missing from the layout last, by id).
    pub fn list_grouped_by_column(&self, layout: &BoardLayout) -> Vec<(String, Vec<Arc<dyn Agent>>)> {
        let mut groups: BTreeMap<(u32, String), Vec<Arc<dyn Agent>>> = BTreeMap::new();
        for agent in self.list() {
            let column = agent.definition().column_id.clone();
            groups
                .entry((layout.position(&column), column))
                .or_default()
                .push(agent);
        }
        groups
            .into_iter()
            .map(|((_, column), agents)| (column, agents))
            .collect()
    }

    /// Agents fired by debounced transcript batches.
    pub fn first_pass_agents(&self) -> Vec<Arc<dyn Agent>> {
        self.list()
            .into_iter()
            .filter(|a| a.definition().is_first_pass())
            .collect()
    }

    /// Second-pass agents whose dependencies are all in `completed` and that
    /// are not in `dispatched`.
    pub fn ready_second_pass(
        &self,
        completed: &HashSet<String>,
        dispatched: &HashSet<String>,
    ) -> Vec<Arc<dyn Agent>> {
        self.list()
            .into_iter()
            .filter(|a| {
                let def = a.definition();
                !def.depends_on.is_empty()
                    && !dispatched.contains(&def.id)
                    && def.depends_on.iter().all(|d| completed.contains(d))
            })
            .collect()
    }

    /// Report missing dependencies, self dependencies and cycles.
    pub fn validate(&self) -> Vec<RegistryIssue> {
        let agents = self.read();
        let mut issues = Vec::new();

        let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
        for (id, agent) in agents.iter() {
            let mut edges = Vec::new();
            for dep in &agent.definition().depends_on {
                if dep == id {
                    issues.push(RegistryIssue::SelfDependency { agent: id.clone() });
                } else if !agents.contains_key(dep) {
                    issues.push(RegistryIssue::MissingDependency {
                        agent: id.clone(),
                        dependency: dep.clone(),
                    });
                } else {
                    edges.push(dep.as_str());
                }
            }
            graph.insert(id.as_str(), edges);
        }

        for cycle in find_cycles(&graph) {
            issues.push(RegistryIssue::Cycle { agents: cycle });
        }
        issues
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<dyn Agent>>> {
        self.agents.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<dyn Agent>>> {
        self.agents.write().unwrap_or_else(|p| p.into_inner())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search over `depends_on` edges; each cycle is reported once,
/// as the path from its first visited member back to itself.
fn find_cycles(graph: &HashMap<&str, Vec<&str>>) -> Vec<Vec<String>> {
    fn visit<'a>(
        node: &'a str,
        graph: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        marks.insert(node, Mark::Visiting);
        stack.push(node);
        let mut deps = graph.get(node).cloned().unwrap_or_default();
        deps.sort_unstable();
        for dep in deps {
            match marks.get(dep) {
                Some(Mark::Visiting) => {
                    if let Some(start) = stack.iter().position(|n| *n == dep) {
                        let mut cycle: Vec<String> =
                            stack[start..].iter().map(|s| s.to_string()).collect();
                        cycle.push(dep.to_string());
                        cycles.push(cycle);
                    }
                }
                Some(Mark::Done) => {}
                None => visit(dep, graph, marks, stack, cycles),
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
    }

    let mut nodes: Vec<&str> = graph.keys().copied().collect();
    nodes.sort_unstable();
    let mut marks = HashMap::new();
    let mut cycles = Vec::new();
    for node in nodes {
        if !marks.contains_key(node) {
            let mut stack = Vec::new();
            visit(node, graph, &mut marks, &mut stack, &mut cycles);
        }
    }
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::builtin::{ACTION_ITEMS, FOLLOW_UPS, INSIGHTS, QUESTIONS, SUMMARY, SYNTHESIS};
    use crate::agents::prompt::PromptAgent;
    use crate::agents::traits::AgentDefinition;

    fn agent(id: &str, column: &str, priority: u32, deps: &[&str]) -> Arc<dyn Agent> {
        let mut def = AgentDefinition::new(id, id, column, priority);
        if !deps.is_empty() {
            def = def.after(deps);
        }
        Arc::new(PromptAgent::new(def, "p"))
    }

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_builtins_validate_clean() {
        let registry = AgentRegistry::with_builtins();
        assert_eq!(registry.len(), 7);
        assert!(registry.validate().is_empty());
        assert!(registry.get(SUMMARY).is_some());
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn test_list_orders_by_priority_then_id() {
        let registry = AgentRegistry::new();
        registry.register(agent("b", "summary", 5, &[]));
        registry.register(agent("a", "summary", 5, &[]));
        registry.register(agent("c", "summary", 1, &[]));
        let ids: Vec<String> = registry.list().iter().map(|a| a.id().to_string()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_grouped_by_column_in_layout_order() {
        let registry = AgentRegistry::new();
        registry.register(agent("syn", "synthesis", 1, &[]));
        registry.register(agent("sum", "summary", 9, &[]));
        registry.register(agent("x", "elsewhere", 0, &[]));
        registry.register(agent("sum2", "summary", 2, &[]));

        let groups = registry.list_grouped_by_column(&BoardLayout::default());
        let columns: Vec<&str> = groups.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(columns, vec!["summary", "synthesis", "elsewhere"]);
        let summary_ids: Vec<&str> = groups[0].1.iter().map(|a| a.id()).collect();
        assert_eq!(summary_ids, vec!["sum2", "sum"]);
    }

    #[test]
    fn test_first_pass_and_ready_second_pass() {
        let registry = AgentRegistry::with_builtins();
        let first: Vec<String> = registry
            .first_pass_agents()
            .iter()
            .map(|a| a.id().to_string())
            .collect();
        assert!(first.contains(&SUMMARY.to_string()));
        assert!(!first.contains(&SYNTHESIS.to_string()));

        // Nothing ready until every dependency is in
        assert!(registry
            .ready_second_pass(&set(&[SUMMARY]), &HashSet::new())
            .is_empty());

        let ready = registry.ready_second_pass(&set(&[SUMMARY, INSIGHTS]), &HashSet::new());
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id(), SYNTHESIS);

        // Already dispatched this round
        assert!(registry
            .ready_second_pass(&set(&[SUMMARY, INSIGHTS]), &set(&[SYNTHESIS]))
            .is_empty());

        let ready = registry.ready_second_pass(
            &set(&[SUMMARY, INSIGHTS, QUESTIONS, ACTION_ITEMS]),
            &set(&[SYNTHESIS]),
        );
        assert_eq!(ready[0].id(), FOLLOW_UPS);
    }

    #[test]
    fn test_validate_reports_problems() {
        let registry = AgentRegistry::new();
        registry.register(agent("root", "summary", 1, &[]));
        registry.register(agent("orphan", "summary", 1, &["ghost"]));
        registry.register(agent("selfish", "summary", 1, &["selfish"]));
        registry.register(agent("a", "summary", 1, &["b"]));
        registry.register(agent("b", "summary", 1, &["a"]));

        let issues = registry.validate();
        assert!(issues.contains(&RegistryIssue::MissingDependency {
            agent: "orphan".into(),
            dependency: "ghost".into()
        }));
        assert!(issues.contains(&RegistryIssue::SelfDependency {
            agent: "selfish".into()
        }));
        let cycles: Vec<&RegistryIssue> = issues
            .iter()
            .filter(|i| matches!(i, RegistryIssue::Cycle { .. }))
            .collect();
        assert_eq!(
            cycles,
            vec![&RegistryIssue::Cycle {
                agents: vec!["a".into(), "b".into(), "a".into()]
            }]
        );
        assert_eq!(issues.len(), 3);
    }

    #[test]
    fn test_register_replaces_and_unregister_removes() {
        let registry = AgentRegistry::new();
        assert!(registry.register(agent("x", "summary", 1, &[])).is_none());
        assert!(registry.register(agent("x", "insights", 2, &[])).is_some());
        assert_eq!(registry.get("x").unwrap().definition().column_id, "insights");
        assert!(registry.unregister("x").is_some());
        assert!(registry.is_empty());
    }
}
