//! Task alias graph
//!
//! Built-in tasks and aliases are petgraph nodes; an edge runs from an alias
//! to each task it lists. Aliases are checked for cycles at load and
//! flattened into an ordered list of invocations on demand.

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::config::{Config, BUILTIN_TASKS};
use crate::error::{GristError, Result};

/// Tasks grist implements itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuiltinTask {
    Lint,
    Qunit,
    Concat,
    Min,
}

impl BuiltinTask {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "lint" => Some(Self::Lint),
            "qunit" => Some(Self::Qunit),
            "concat" => Some(Self::Concat),
            "min" => Some(Self::Min),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Lint => "lint",
            Self::Qunit => "qunit",
            Self::Concat => "concat",
            Self::Min => "min",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Lint => "Check JavaScript files against the jshint rules",
            Self::Qunit => "Run test pages through the headless runner",
            Self::Concat => "Concatenate sources into one file",
            Self::Min => "Minify sources and prepend the banner",
        }
    }

    /// Whether the task is split into named targets
    pub fn has_targets(self) -> bool {
        matches!(self, Self::Concat | Self::Min)
    }
}

impl fmt::Display for BuiltinTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One step of a run: a built-in task, optionally narrowed to one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInvocation {
    pub task: BuiltinTask,
    pub target: Option<String>,
}

impl fmt::Display for TaskInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{}:{}", self.task, target),
            None => write!(f, "{}", self.task),
        }
    }
}

/// A node in the task graph
#[derive(Debug, Clone)]
pub enum TaskNode {
    Builtin(BuiltinTask),
    Alias { name: String, members: Vec<String> },
}

impl TaskNode {
    pub fn name(&self) -> &str {
        match self {
            TaskNode::Builtin(task) => task.name(),
            TaskNode::Alias { name, .. } => name,
        }
    }
}

/// The task alias graph
#[derive(Debug)]
pub struct TaskGraph {
    graph: DiGraph<TaskNode, ()>,
    name_to_index: HashMap<String, NodeIndex>,
    targets: BTreeMap<BuiltinTask, Vec<String>>,
}

impl TaskGraph {
    /// Build the graph from configuration, rejecting unknown members and cycles
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();
        let mut targets = BTreeMap::new();

        for name in BUILTIN_TASKS {
            if let Some(task) = BuiltinTask::from_name(name) {
                name_to_index.insert(name.to_string(), graph.add_node(TaskNode::Builtin(task)));
                if task.has_targets() {
                    targets.insert(task, config.targets(name));
                }
            }
        }

        let aliases: Vec<(String, Vec<String>)> = config
            .alias_names()
            .into_iter()
            .filter_map(|name| config.alias(&name).map(|members| (name, members)))
            .collect();

        for (name, members) in &aliases {
            let idx = graph.add_node(TaskNode::Alias {
                name: name.clone(),
                members: members.clone(),
            });
            name_to_index.insert(name.clone(), idx);
        }

        let mut this = Self {
            graph,
            name_to_index,
            targets,
        };

        for (name, members) in &aliases {
            let from = this.name_to_index[name];
            for member in members {
                let (task, _) = this.resolve_member(member)?;
                this.graph.add_edge(from, task, ());
            }
        }

        if is_cyclic_directed(&this.graph) {
            let cycle = this.find_cycle_description();
            return Err(GristError::CyclicAlias { cycle });
        }

        Ok(this)
    }

    /// Look up a `name` or `task:target` entry, checking the target exists
    fn resolve_member<'m>(&self, member: &'m str) -> Result<(NodeIndex, Option<&'m str>)> {
        let (name, target) = match member.split_once(':') {
            Some((name, target)) => (name, Some(target)),
            None => (member, None),
        };

        let idx = *self.name_to_index.get(name).ok_or_else(|| GristError::TaskNotFound {
            name: name.to_string(),
            available: self.task_names(),
        })?;

        if let Some(target) = target {
            let known = match &self.graph[idx] {
                TaskNode::Builtin(task) => self
                    .targets
                    .get(task)
                    .is_some_and(|t| t.iter().any(|t| t == target)),
                TaskNode::Alias { .. } => false,
            };
            if !known {
                return Err(GristError::TargetNotFound {
                    task: name.to_string(),
                    target: target.to_string(),
                });
            }
        }

        Ok((idx, target))
    }

    /// Flatten a task or alias into the ordered steps it runs. Duplicates
    /// are kept: an alias listing `lint` twice lints twice.
    pub fn expand(&self, name: &str) -> Result<Vec<TaskInvocation>> {
        let mut out = Vec::new();
        self.expand_into(name, &mut out)?;
        Ok(out)
    }

    fn expand_into(&self, member: &str, out: &mut Vec<TaskInvocation>) -> Result<()> {
        let (idx, target) = self.resolve_member(member)?;

        match &self.graph[idx] {
            TaskNode::Builtin(task) => out.push(TaskInvocation {
                task: *task,
                target: target.map(str::to_string),
            }),
            TaskNode::Alias { members, .. } => {
                for m in members {
                    self.expand_into(m, out)?;
                }
            }
        }

        Ok(())
    }

    /// Expand several requested names in order
    pub fn expand_all(&self, names: &[String]) -> Result<Vec<TaskInvocation>> {
        let mut out = Vec::new();
        for name in names {
            self.expand_into(name, &mut out)?;
        }
        Ok(out)
    }

    /// Find a human-readable description of a cycle
    fn find_cycle_description(&self) -> String {
        let mut names: Vec<&String> = self.name_to_index.keys().collect();
        names.sort();

        for name in names {
            let idx = self.name_to_index[name];
            let mut visited = HashSet::new();
            let mut path = vec![name.clone()];

            if self.dfs_find_cycle(idx, idx, &mut visited, &mut path) {
                return path.join(" -> ");
            }
        }

        "unknown cycle".to_string()
    }

    fn dfs_find_cycle(
        &self,
        current: NodeIndex,
        target: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        path: &mut Vec<String>,
    ) -> bool {
        for neighbor in self.graph.neighbors(current) {
            if neighbor == target {
                path.push(self.graph[target].name().to_string());
                return true;
            }

            if visited.insert(neighbor) {
                path.push(self.graph[neighbor].name().to_string());
                if self.dfs_find_cycle(neighbor, target, visited, path) {
                    return true;
                }
                path.pop();
            }
        }

        false
    }

    /// All task and alias names, sorted
    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.name_to_index.keys().cloned().collect();
        names.sort();
        names
    }

    /// Aliases with their member lists, sorted by name
    pub fn aliases(&self) -> Vec<(&str, &[String])> {
        let mut out: Vec<(&str, &[String])> = self
            .graph
            .node_weights()
            .filter_map(|node| match node {
                TaskNode::Alias { name, members } => Some((name.as_str(), members.as_slice())),
                TaskNode::Builtin(_) => None,
            })
            .collect();
        out.sort_by_key(|(name, _)| *name);
        out
    }

    /// Configured targets of a multi-target task
    pub fn targets(&self, task: BuiltinTask) -> &[String] {
        self.targets.get(&task).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(toml: &str) -> Result<TaskGraph> {
        TaskGraph::from_config(&Config::parse(toml).unwrap())
    }

    const BASE: &str = r#"
        [lint]
        files = "js/*.js"

        [concat.dist]
        src = ["a.js"]
        dest = "dist/a.js"

        [concat.extra]
        src = ["b.js"]
        dest = "dist/b.js"

        [min.dist]
        src = ["dist/a.js"]
        dest = "dist/a.min.js"
    "#;

    #[test]
    fn test_implicit_default_uses_configured_sections() {
        let g = graph(BASE).unwrap();
        let steps: Vec<String> = g.expand("default").unwrap().iter().map(|s| s.to_string()).collect();
        assert_eq!(steps, vec!["lint", "concat", "min"]);
    }

    #[test]
    fn test_nested_alias_with_targets() {
        let toml = format!(
            "{}\n[tasks]\ndefault = \"lint build\"\nbuild = [\"concat:dist\", \"min:dist\"]\n",
            BASE
        );
        let g = graph(&toml).unwrap();
        let steps = g.expand("default").unwrap();
        assert_eq!(
            steps,
            vec![
                TaskInvocation {
                    task: BuiltinTask::Lint,
                    target: None
                },
                TaskInvocation {
                    task: BuiltinTask::Concat,
                    target: Some("dist".to_string())
                },
                TaskInvocation {
                    task: BuiltinTask::Min,
                    target: Some("dist".to_string())
                },
            ]
        );
        assert_eq!(g.aliases().len(), 2);
        assert!(g.task_names().contains(&"build".to_string()));
    }

    #[test]
    fn test_duplicates_are_kept() {
        let toml = format!("{}\n[tasks]\ntwice = \"lint lint\"\n", BASE);
        let g = graph(&toml).unwrap();
        assert_eq!(g.expand("twice").unwrap().len(), 2);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let toml = format!("{}\n[tasks]\na = \"lint b\"\nb = \"a\"\n", BASE);
        match graph(&toml) {
            Err(GristError::CyclicAlias { cycle }) => {
                assert!(cycle.contains("a -> b -> a"), "{}", cycle)
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_task_and_target() {
        let toml = format!("{}\n[tasks]\nship = \"deploy\"\n", BASE);
        assert!(matches!(graph(&toml), Err(GristError::TaskNotFound { .. })));

        let g = graph(BASE).unwrap();
        assert!(matches!(
            g.expand("concat:nope"),
            Err(GristError::TargetNotFound { .. })
        ));
        assert!(matches!(
            g.expand("lint:dist"),
            Err(GristError::TargetNotFound { .. })
        ));
        assert_eq!(g.expand("concat:extra").unwrap()[0].to_string(), "concat:extra");
    }
}
