// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Build ordering of packages from their dependencies.

Given a mapping of package name to the (already architecture filtered) possibilities
it depends on, [sort_dependencies] emits the names in an order where every package
follows the packages it depends on. Dependencies on names that are not keys of the
mapping (packages outside the set being built) are ignored.

Nodes are emitted in generations: a generation holds every node whose dependencies
were all emitted by earlier generations. Within a generation nodes are ordered by name,
so the output is deterministic. [sort_generations] exposes the generations directly.
 */

use {
    crate::{architecture::Architecture, dependency::Possibility, schema::SourcePackage},
    log::{debug, trace, warn},
    std::collections::{BTreeMap, BTreeSet},
    thiserror::Error,
};

/// Dependencies could not be ordered because some of them form a cycle.
///
/// `residual` holds every node that could not be emitted. This includes the nodes of
/// the cycle(s) and anything depending on them.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("dependency cycle detected among: {}", join_names(.residual))]
pub struct CycleError {
    pub residual: BTreeSet<String>,
}

fn join_names(names: &BTreeSet<String>) -> String {
    names.iter().map(|x| x.as_str()).collect::<Vec<_>>().join(", ")
}

/// Result type for build ordering.
pub type Result<T> = std::result::Result<T, CycleError>;

struct Node {
    name: String,
    /// Indices of nodes that must be emitted before this one.
    inbound: BTreeSet<usize>,
}

/// Dependency graph for a single sort. Nodes are stored sorted by name.
struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    fn new<'a>(declared: BTreeMap<String, Vec<&'a Possibility>>) -> Self {
        let index = declared
            .keys()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect::<BTreeMap<_, _>>();

        let nodes = declared
            .into_iter()
            .enumerate()
            .map(|(i, (name, possibilities))| {
                let mut inbound = BTreeSet::new();

                for possibility in possibilities {
                    match index.get(possibility.package_name()) {
                        Some(&target) if target == i => {
                            trace!("ignoring self dependency of {}", name);
                        }
                        Some(&target) => {
                            inbound.insert(target);
                        }
                        None => {
                            trace!(
                                "ignoring dependency of {} on external package {}",
                                name,
                                possibility.name
                            );
                        }
                    }
                }

                Node { name, inbound }
            })
            .collect::<Vec<_>>();

        debug!(
            "constructed build graph with {} nodes and {} edges",
            nodes.len(),
            nodes.iter().map(|n| n.inbound.len()).sum::<usize>()
        );

        Self { nodes }
    }

    fn generations(&self) -> Result<Vec<Vec<String>>> {
        let mut emitted = vec![false; self.nodes.len()];
        let mut remaining = self.nodes.len();
        let mut generations = vec![];

        while remaining > 0 {
            // Candidates are decided against the previous generations only.
            let generation = self
                .nodes
                .iter()
                .enumerate()
                .filter(|(i, node)| !emitted[*i] && node.inbound.iter().all(|j| emitted[*j]))
                .map(|(i, _)| i)
                .collect::<Vec<_>>();

            if generation.is_empty() {
                let residual = self
                    .nodes
                    .iter()
                    .zip(&emitted)
                    .filter(|(_, emitted)| !**emitted)
                    .map(|(node, _)| node.name.clone())
                    .collect::<BTreeSet<_>>();

                warn!(
                    "dependency cycle prevents ordering {} packages",
                    residual.len()
                );

                return Err(CycleError { residual });
            }

            for i in &generation {
                emitted[*i] = true;
            }
            remaining -= generation.len();

            let names = generation
                .into_iter()
                .map(|i| self.nodes[i].name.clone())
                .collect::<Vec<_>>();

            debug!("generation {}: {}", generations.len(), names.join(", "));
            generations.push(names);
        }

        Ok(generations)
    }
}

/// Sort packages into build generations.
///
/// Each generation only depends on packages in earlier generations, so the members
/// of a generation may be built in any order. Possibilities naming the same package
/// as their key are ignored. A name appearing more than once has its possibilities
/// merged.
pub fn sort_generations<'a, N, P>(
    packages: impl IntoIterator<Item = (N, P)>,
) -> Result<Vec<Vec<String>>>
where
    N: Into<String>,
    P: IntoIterator<Item = &'a Possibility>,
{
    let mut declared: BTreeMap<String, Vec<&'a Possibility>> = BTreeMap::new();

    for (name, possibilities) in packages {
        declared
            .entry(name.into())
            .or_default()
            .extend(possibilities);
    }

    Graph::new(declared).generations()
}

/// Sort packages so each one follows everything it depends on.
///
/// This is [sort_generations] flattened. On a cycle, nothing is emitted: the error
/// carries every package that could not be ordered.
pub fn sort_dependencies<'a, N, P>(
    packages: impl IntoIterator<Item = (N, P)>,
) -> Result<Vec<String>>
where
    N: Into<String>,
    P: IntoIterator<Item = &'a Possibility>,
{
    Ok(sort_generations(packages)?
        .into_iter()
        .flatten()
        .collect())
}

/// Compute the build order of source packages for an architecture.
///
/// Build dependencies name binary packages. They are resolved to the source package
/// listing that binary in its `Binary` field before sorting.
pub fn source_build_order(
    sources: &[SourcePackage],
    arch: &Architecture,
) -> crate::error::Result<Vec<String>> {
    let mut providers = BTreeMap::new();
    for source in sources {
        for binary in source.binaries() {
            providers.entry(binary.as_str()).or_insert(source.name());
        }
    }

    let mapped = sources
        .iter()
        .map(|source| {
            let possibilities = source
                .build_dependency_possibilities(arch)
                .into_iter()
                .filter_map(|p| {
                    providers
                        .get(p.package_name())
                        .map(|provider| p.with_name(provider))
                })
                .collect::<Vec<_>>();

            (source.name(), possibilities)
        })
        .collect::<Vec<_>>();

    Ok(sort_dependencies(
        mapped.iter().map(|(name, possibilities)| (*name, possibilities)),
    )?)
}
