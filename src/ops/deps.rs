use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::model::plan::{PlanDetail, PlanStatus};
use crate::parse::markdown::extract_wikilinks;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyNode {
    pub filename: String,
    pub title: String,
    pub status: PlanStatus,
    /// Plans this one links to (resolved only)
    pub references: Vec<String>,
    /// Plans linking to this one
    pub referenced_by: Vec<String>,
    /// Link targets with no matching plan
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyGraph {
    pub nodes: Vec<DependencyNode>,
    pub edges: Vec<DependencyEdge>,
    pub adjacency: IndexMap<String, IndexSet<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDependencies {
    pub filename: String,
    pub references: Vec<String>,
    pub referenced_by: Vec<String>,
    /// Every plan reachable upstream, dependencies before dependents,
    /// ending with the plan itself
    pub chain: Vec<String>,
    pub unresolved: Vec<String>,
}

fn normalize(target: &str) -> String {
    let target = target.trim();
    if target.ends_with(".md") {
        target.to_string()
    } else {
        format!("{}.md", target)
    }
}

/// Link targets of one plan: `[[...]]` references in the body followed by
/// frontmatter `blockedBy` entries, deduplicated.
fn link_targets(plan: &PlanDetail) -> IndexSet<String> {
    let mut targets: IndexSet<String> = extract_wikilinks(&plan.content).into_iter().collect();
    if let Some(fm) = &plan.meta.frontmatter {
        targets.extend(fm.blocked_by.iter().filter(|b| !b.trim().is_empty()).map(|b| normalize(b)));
    }
    targets
}

/// Build the reference graph over a plan collection. Cycles are kept as
/// they are.
pub fn build_graph(plans: &[PlanDetail]) -> DependencyGraph {
    let known: IndexSet<&str> = plans.iter().map(|p| p.meta.filename.as_str()).collect();

    let mut adjacency: IndexMap<String, IndexSet<String>> = IndexMap::new();
    let mut unresolved: IndexMap<String, Vec<String>> = IndexMap::new();
    for plan in plans {
        let (resolved, missing): (Vec<String>, Vec<String>) = link_targets(plan)
            .into_iter()
            .partition(|t| known.contains(t.as_str()));
        adjacency.insert(plan.meta.filename.clone(), resolved.into_iter().collect());
        unresolved.insert(plan.meta.filename.clone(), missing);
    }

    let mut reverse: IndexMap<&str, Vec<String>> = IndexMap::new();
    let mut edges = Vec::new();
    for (from, targets) in &adjacency {
        for to in targets {
            reverse.entry(to.as_str()).or_default().push(from.clone());
            edges.push(DependencyEdge {
                from: from.clone(),
                to: to.clone(),
            });
        }
    }

    let nodes = plans
        .iter()
        .map(|plan| {
            let name = plan.meta.filename.as_str();
            DependencyNode {
                filename: name.to_string(),
                title: plan.meta.title.clone(),
                status: plan.meta.status(),
                references: adjacency
                    .get(name)
                    .map(|t| t.iter().cloned().collect())
                    .unwrap_or_default(),
                referenced_by: reverse.get(name).cloned().unwrap_or_default(),
                unresolved: unresolved.get(name).cloned().unwrap_or_default(),
            }
        })
        .collect();

    DependencyGraph {
        nodes,
        edges,
        adjacency,
    }
}

impl DependencyGraph {
    pub fn node(&self, filename: &str) -> Option<&DependencyNode> {
        self.nodes.iter().find(|n| n.filename == filename)
    }

    /// Upstream walk from `filename`. The visited set makes it terminate
    /// on cycles.
    pub fn chain(&self, filename: &str) -> Vec<String> {
        let mut visited = IndexSet::new();
        let mut chain = Vec::new();
        self.walk(filename, &mut visited, &mut chain);
        chain
    }

    fn walk(&self, current: &str, visited: &mut IndexSet<String>, chain: &mut Vec<String>) {
        if !visited.insert(current.to_string()) {
            return;
        }
        let Some(targets) = self.adjacency.get(current) else {
            return;
        };
        for target in targets {
            self.walk(target, visited, chain);
        }
        chain.push(current.to_string());
    }

    /// Point query for one plan; `None` when the plan is not in the graph.
    pub fn plan_dependencies(&self, filename: &str) -> Option<PlanDependencies> {
        let node = self.node(filename)?;
        Some(PlanDependencies {
            filename: node.filename.clone(),
            references: node.references.clone(),
            referenced_by: node.referenced_by.clone(),
            chain: self.chain(filename),
            unresolved: node.unresolved.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::plan::{PlanFrontmatter, PlanMeta};

    fn plan(filename: &str, body: &str, blocked_by: &[&str]) -> PlanDetail {
        let frontmatter = (!blocked_by.is_empty()).then(|| PlanFrontmatter {
            blocked_by: blocked_by.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        });
        PlanDetail {
            meta: PlanMeta {
                filename: filename.into(),
                title: filename.trim_end_matches(".md").into(),
                created_at: String::new(),
                modified_at: String::new(),
                mtime_ms: 0,
                size: 0,
                preview: String::new(),
                sections: Vec::new(),
                related_project: None,
                frontmatter,
            },
            content: body.into(),
        }
    }

    #[test]
    fn cycle_terminates_with_both_edges() {
        let plans = vec![plan("a.md", "see [[b]]", &[]), plan("b.md", "back to [[a.md]]", &[])];
        let graph = build_graph(&plans);
        assert!(graph.adjacency["a.md"].contains("b.md"));
        assert!(graph.adjacency["b.md"].contains("a.md"));
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.chain("a.md"), vec!["b.md", "a.md"]);
    }

    #[test]
    fn blocked_by_adds_edges_and_missing_targets_are_unresolved() {
        let plans = vec![
            plan("base.md", "", &[]),
            plan("api.md", "needs [[ghost]]", &["base"]),
            plan("ui.md", "after [[api]]", &[]),
        ];
        let graph = build_graph(&plans);
        let api = graph.node("api.md").unwrap();
        assert_eq!(api.references, vec!["base.md"]);
        assert_eq!(api.unresolved, vec!["ghost.md"]);
        assert_eq!(api.referenced_by, vec!["ui.md"]);
        assert!(!graph.adjacency["api.md"].contains("ghost.md"));

        let deps = graph.plan_dependencies("ui.md").unwrap();
        assert_eq!(deps.chain, vec!["base.md", "api.md", "ui.md"]);
        assert!(graph.plan_dependencies("nope.md").is_none());
    }

    #[test]
    fn duplicate_links_collapse() {
        let plans = vec![plan("a.md", "[[b]] [[b|again]]", &["b.md"]), plan("b.md", "", &[])];
        let graph = build_graph(&plans);
        assert_eq!(graph.edges, vec![DependencyEdge { from: "a.md".into(), to: "b.md".into() }]);
    }
}
