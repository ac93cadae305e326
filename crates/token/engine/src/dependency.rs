//! Dependency planning for batch resolution.
//!
//! Tokens in one batch are arranged into layers: layer N holds tokens
//! whose in-batch dependencies all sit in earlier layers, so everything
//! within a layer can resolve concurrently. Tokens caught in a cycle
//! never reach a layer; each strongly-entangled group is reported as
//! its own component so one cycle cannot poison unrelated tokens.

use std::collections::{HashMap, HashSet};

use token_types::{Token, TokenId};

/// The execution shape of one batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolutionPlan {
    /// Concurrency layers in execution order
    pub layers: Vec<Vec<TokenId>>,
    /// Cycle members, one entry per connected component
    pub cycles: Vec<Vec<TokenId>>,
    /// Dependencies that point outside the batch: `(token, dependency)`
    pub missing: Vec<(TokenId, TokenId)>,
}

impl ResolutionPlan {
    pub fn execution_order(&self) -> Vec<TokenId> {
        self.layers.iter().flatten().cloned().collect()
    }

    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    pub fn planned_count(&self) -> usize {
        self.layers.iter().map(Vec::len).sum()
    }
}

pub struct DependencyTracker;

impl DependencyTracker {
    /// Plan a batch. Tokens must be unique by id; dependencies that
    /// reference ids outside the batch are reported in `missing` and do
    /// not affect layering (the engine checks them against the live
    /// registry at execution time).
    pub fn plan(tokens: &[Token]) -> ResolutionPlan {
        let in_batch: HashSet<&TokenId> = tokens.iter().map(|t| &t.id).collect();
        let order_key: HashMap<&TokenId, &str> = tokens
            .iter()
            .map(|t| (&t.id, t.placeholder.as_str()))
            .collect();

        let mut indegree: HashMap<&TokenId, usize> = HashMap::new();
        let mut dependents: HashMap<&TokenId, Vec<&TokenId>> = HashMap::new();
        let mut missing = Vec::new();
        for token in tokens {
            let mut degree = 0;
            for dep in &token.dependencies {
                if in_batch.contains(dep) {
                    degree += 1;
                    dependents.entry(dep).or_default().push(&token.id);
                } else {
                    missing.push((token.id.clone(), dep.clone()));
                }
            }
            indegree.insert(&token.id, degree);
        }

        let mut remaining: HashSet<&TokenId> = in_batch.clone();
        let mut layers: Vec<Vec<TokenId>> = Vec::new();
        loop {
            let mut frontier: Vec<&TokenId> = remaining
                .iter()
                .filter(|id| indegree.get(*id).copied().unwrap_or(0) == 0)
                .copied()
                .collect();
            if frontier.is_empty() {
                break;
            }
            frontier.sort_by_key(|id| (order_key.get(*id).copied().unwrap_or(""), id.as_str()));
            for id in &frontier {
                remaining.remove(*id);
                if let Some(children) = dependents.get(*id) {
                    for child in children {
                        if let Some(degree) = indegree.get_mut(*child) {
                            *degree = degree.saturating_sub(1);
                        }
                    }
                }
            }
            layers.push(frontier.into_iter().cloned().collect());
        }

        // whatever is left sits on a cycle (possibly a self-loop);
        // split it into weakly-connected components
        let cycles = Self::components(&remaining, tokens, &order_key);

        ResolutionPlan {
            layers,
            cycles,
            missing,
        }
    }

    fn components(
        stuck: &HashSet<&TokenId>,
        tokens: &[Token],
        order_key: &HashMap<&TokenId, &str>,
    ) -> Vec<Vec<TokenId>> {
        if stuck.is_empty() {
            return Vec::new();
        }
        // undirected adjacency restricted to stuck tokens
        let mut adjacency: HashMap<&TokenId, Vec<&TokenId>> = HashMap::new();
        for token in tokens {
            if !stuck.contains(&token.id) {
                continue;
            }
            for dep in &token.dependencies {
                if let Some(dep_id) = stuck.get(dep) {
                    adjacency.entry(&token.id).or_default().push(*dep_id);
                    adjacency.entry(*dep_id).or_default().push(&token.id);
                }
            }
        }

        let mut seeds: Vec<&TokenId> = stuck.iter().copied().collect();
        seeds.sort_by_key(|id| (order_key.get(*id).copied().unwrap_or(""), id.as_str()));

        let mut visited: HashSet<&TokenId> = HashSet::new();
        let mut components = Vec::new();
        for seed in seeds {
            if visited.contains(seed) {
                continue;
            }
            let mut component = Vec::new();
            let mut stack = vec![seed];
            while let Some(id) = stack.pop() {
                if !visited.insert(id) {
                    continue;
                }
                component.push(id);
                if let Some(neighbors) = adjacency.get(id) {
                    for neighbor in neighbors {
                        if !visited.contains(*neighbor) {
                            stack.push(*neighbor);
                        }
                    }
                }
            }
            component.sort_by_key(|id| (order_key.get(*id).copied().unwrap_or(""), id.as_str()));
            components.push(component.into_iter().cloned().collect());
        }
        components
    }
}
