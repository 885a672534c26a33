// src/core/graph.rs
use std::collections::HashSet;

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;
use super::modules::ModuleConfig;
use super::trace::{generator_identity, trace_now, Edge, HighLevelTrace, ModuleNode};

/// Builds the high-level module graph.
///
/// Inter-module edges come from analysis outside this crate and from hand
/// edits synced back from the document; builders must not invent them.
#[async_trait]
pub trait GraphBuilder: Send + Sync {
    async fn build(
        &self,
        config: &ModuleConfig,
        previous: Option<&HighLevelTrace>,
    ) -> Result<HighLevelTrace>;

    fn builder_name(&self) -> &str;
}

/// Default builder: one node per configured module, existing edges carried over
pub struct ConfigGraphBuilder;

#[async_trait]
impl GraphBuilder for ConfigGraphBuilder {
    async fn build(
        &self,
        config: &ModuleConfig,
        previous: Option<&HighLevelTrace>,
    ) -> Result<HighLevelTrace> {
        let known: HashSet<&str> = config.modules.iter().map(|m| m.id.as_str()).collect();

        let modules = config
            .modules
            .iter()
            .map(|module| {
                let prior = previous.and_then(|p| p.module(&module.id));
                ModuleNode {
                    id: module.id.clone(),
                    name: module.name.clone(),
                    description: module.description.clone(),
                    dependencies: retain_known(
                        &module.id,
                        prior.map(|p| p.dependencies.as_slice()).unwrap_or_default(),
                        &known,
                    ),
                    dependents: retain_known(
                        &module.id,
                        prior.map(|p| p.dependents.as_slice()).unwrap_or_default(),
                        &known,
                    ),
                }
            })
            .collect();

        Ok(HighLevelTrace {
            version: previous.map_or(0, |p| p.version) + 1,
            last_generated: trace_now(),
            generated_by: generator_identity(),
            modules,
        })
    }

    fn builder_name(&self) -> &str {
        "config"
    }
}

fn retain_known(module_id: &str, edges: &[Edge], known: &HashSet<&str>) -> Vec<Edge> {
    edges
        .iter()
        .filter(|edge| {
            let keep = known.contains(edge.target_id.as_str());
            if !keep {
                warn!(
                    "Dropping edge {} -> {}: target module no longer exists",
                    module_id, edge.target_id
                );
            }
            keep
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::modules::Module;

    fn config(ids: &[&str]) -> ModuleConfig {
        ModuleConfig::new(
            ids.iter()
                .map(|id| Module {
                    id: id.to_string(),
                    name: format!("{} module", id),
                    description: String::new(),
                    file_globs: vec![format!("{}/**", id)],
                })
                .collect(),
        )
    }

    fn edge(target: &str) -> Edge {
        Edge {
            target_id: target.to_string(),
            relationship_type: "uses".to_string(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn first_build_starts_at_version_one() {
        let trace = ConfigGraphBuilder.build(&config(&["a", "b"]), None).await.unwrap();
        assert_eq!(trace.version, 1);
        assert_eq!(trace.modules.len(), 2);
        assert!(trace.modules.iter().all(|m| m.dependencies.is_empty()));
    }

    #[tokio::test]
    async fn rebuild_keeps_edges_and_drops_dangling_ones() {
        let mut previous = ConfigGraphBuilder.build(&config(&["a", "b", "c"]), None).await.unwrap();
        previous.module_mut("a").unwrap().dependencies = vec![edge("b"), edge("c")];

        let rebuilt = ConfigGraphBuilder
            .build(&config(&["a", "b"]), Some(&previous))
            .await
            .unwrap();
        assert_eq!(rebuilt.version, 2);
        assert_eq!(rebuilt.module("a").unwrap().dependencies, vec![edge("b")]);
        assert!(rebuilt.module("c").is_none());
    }
}
