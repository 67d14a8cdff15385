//! Derived graph structure: communities, hubs and bridges.
//!
//! Each derivation is a pure function of a finished [`KnowledgeGraph`] and
//! the chunk categories. [`StructureExtractor::extract`] runs the three
//! side by side on scoped threads; they share only `&` views.
//!
//! # Communities
//!
//! Louvain modularity optimisation with a resolution parameter γ. Moving
//! node `i` into community `c` is worth
//!
//! ```text
//! gain(i, c) = w(i, c) - γ · tot(c) · k(i) / 2m
//! ```
//!
//! where `w(i, c)` is the weight from `i` into `c`, `tot(c)` the summed
//! strength of `c`, `k(i)` the strength of `i` and `2m` twice the total edge
//! weight. Nodes are visited in a seeded shuffle; a move needs a strictly
//! larger gain than staying put, and equal gains go to the lowest community
//! label. Aggregated nodes are labelled in order of their lowest original
//! node index, so the final community ids are dense and stable.
//!
//! Graphs with fewer than two nodes have no structure: every set is empty.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::config::StructureConfig;
use crate::error::{Error, Result};
use crate::graph::KnowledgeGraph;
use crate::models::Category;

const GAIN_EPSILON: f64 = 1e-12;

/// Per-node structural indices. Immutable once derived.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphStructure {
    communities: Vec<usize>,
    community_count: usize,
    hub_flags: Vec<bool>,
    bridge_flags: Vec<bool>,
}

impl GraphStructure {
    /// Reassemble structure from persisted per-node values.
    ///
    /// `communities` is either empty (no structure) or holds one label per
    /// node; labels must be dense, starting at 0.
    pub fn from_parts(
        communities: Vec<usize>,
        hub_flags: Vec<bool>,
        bridge_flags: Vec<bool>,
    ) -> Result<Self> {
        let n = hub_flags.len();
        if bridge_flags.len() != n || !(communities.is_empty() || communities.len() == n) {
            return Err(Error::Snapshot {
                message: "node flag and community vectors differ in length".to_string(),
            });
        }
        let labels: BTreeSet<usize> = communities.iter().copied().collect();
        if labels.iter().enumerate().any(|(i, &l)| i != l) {
            return Err(Error::Snapshot {
                message: "community ids are not dense".to_string(),
            });
        }
        Ok(Self {
            community_count: labels.len(),
            communities,
            hub_flags,
            bridge_flags,
        })
    }

    pub fn node_count(&self) -> usize {
        self.hub_flags.len()
    }

    pub fn community_of(&self, index: usize) -> Option<usize> {
        self.communities.get(index).copied()
    }

    pub fn community_count(&self) -> usize {
        self.community_count
    }

    /// One label per node, or empty when the graph had no structure.
    pub fn communities(&self) -> &[usize] {
        &self.communities
    }

    /// Node indices in `community`, ascending.
    pub fn community_members(&self, community: usize) -> Vec<usize> {
        self.communities
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == community)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_hub(&self, index: usize) -> bool {
        self.hub_flags.get(index).copied().unwrap_or(false)
    }

    pub fn is_bridge(&self, index: usize) -> bool {
        self.bridge_flags.get(index).copied().unwrap_or(false)
    }

    pub fn hubs(&self) -> Vec<usize> {
        flagged(&self.hub_flags)
    }

    pub fn bridges(&self) -> Vec<usize> {
        flagged(&self.bridge_flags)
    }
}

fn flagged(flags: &[bool]) -> Vec<usize> {
    flags
        .iter()
        .enumerate()
        .filter(|(_, &f)| f)
        .map(|(i, _)| i)
        .collect()
}

pub struct StructureExtractor {
    config: StructureConfig,
}

impl StructureExtractor {
    pub fn new(config: StructureConfig) -> Self {
        Self { config }
    }

    /// Derive communities, hubs and bridges.
    ///
    /// `categories[i]` is the category of node `i`.
    pub fn extract(&self, graph: &KnowledgeGraph, categories: &[Category]) -> GraphStructure {
        let n = graph.node_count();
        if n < 2 {
            return GraphStructure {
                hub_flags: vec![false; n],
                bridge_flags: vec![false; n],
                ..GraphStructure::default()
            };
        }

        let (communities, hubs, bridges) = std::thread::scope(|s| {
            let communities = s.spawn(|| self.detect_communities(graph));
            let hubs = s.spawn(|| self.select_hubs(graph));
            let bridges = s.spawn(|| self.find_bridges(graph, categories));
            (
                communities
                    .join()
                    .unwrap_or_else(|e| std::panic::resume_unwind(e)),
                hubs.join().unwrap_or_else(|e| std::panic::resume_unwind(e)),
                bridges.join().unwrap_or_else(|e| std::panic::resume_unwind(e)),
            )
        });

        let community_count = communities.iter().max().map_or(0, |&m| m + 1);
        let mut hub_flags = vec![false; n];
        for i in hubs {
            hub_flags[i] = true;
        }
        let mut bridge_flags = vec![false; n];
        for i in bridges {
            bridge_flags[i] = true;
        }

        debug!(
            nodes = n,
            communities = community_count,
            hubs = hub_flags.iter().filter(|&&h| h).count(),
            bridges = bridge_flags.iter().filter(|&&b| b).count(),
            "derived graph structure"
        );

        GraphStructure {
            communities,
            community_count,
            hub_flags,
            bridge_flags,
        }
    }

    /// Community label per node. Empty for graphs with fewer than two nodes.
    pub fn detect_communities(&self, graph: &KnowledgeGraph) -> Vec<usize> {
        let n = graph.node_count();
        if n < 2 {
            return Vec::new();
        }

        let mut level = Level::from_graph(graph);
        let mut membership: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        for _ in 0..self.config.max_passes.max(1) {
            let (assignment, moved) = level.local_moving(
                self.config.resolution,
                self.config.max_passes.max(1),
                &mut rng,
            );
            if !moved {
                break;
            }
            let (labels, count) = level.relabel(&assignment);
            for m in membership.iter_mut() {
                *m = labels[assignment[*m]];
            }
            let shrunk = count < level.len();
            level = level.aggregate(&assignment, &labels, count);
            if !shrunk {
                break;
            }
        }

        membership
    }

    /// Top `(1 - hub_percentile)` share of nodes by degree.
    ///
    /// Ties on degree go to the lower node index, isolated nodes included.
    pub fn select_hubs(&self, graph: &KnowledgeGraph) -> Vec<usize> {
        let n = graph.node_count();
        if n < 2 {
            return Vec::new();
        }
        let count = hub_count(self.config.hub_percentile, n);

        let mut ranked: Vec<(usize, usize)> = (0..n).map(|i| (i, graph.degree(i))).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(count);

        let mut hubs: Vec<usize> = ranked.into_iter().map(|(i, _)| i).collect();
        hubs.sort_unstable();
        hubs
    }

    /// Nodes whose neighbours span at least `bridge_min_categories` categories.
    pub fn find_bridges(&self, graph: &KnowledgeGraph, categories: &[Category]) -> Vec<usize> {
        let n = graph.node_count();
        if n < 2 {
            return Vec::new();
        }
        (0..n)
            .filter(|&i| {
                let seen: BTreeSet<Category> = graph
                    .neighbors(i)
                    .filter_map(|(j, _)| categories.get(j).copied())
                    .collect();
                seen.len() >= self.config.bridge_min_categories
            })
            .collect()
    }
}

/// Number of hubs for `n` nodes. Values within float noise of an integer
/// are rounded rather than ceiled, so 10% of 100 is 10 and not 11.
pub fn hub_count(percentile: f64, n: usize) -> usize {
    let raw = (1.0 - percentile) * n as f64;
    let rounded = raw.round();
    let count = if (raw - rounded).abs() < 1e-6 {
        rounded
    } else {
        raw.ceil()
    };
    (count.max(0.0) as usize).min(n)
}

/// One level of the Louvain hierarchy. Adjacency is symmetric and excludes
/// self-loops, which are kept separately as internal weight.
struct Level {
    adjacency: Vec<Vec<(usize, f64)>>,
    self_loops: Vec<f64>,
    /// Lowest original node index folded into each level node.
    min_id: Vec<usize>,
}

impl Level {
    fn from_graph(graph: &KnowledgeGraph) -> Self {
        let n = graph.node_count();
        let adjacency: Vec<Vec<(usize, f64)>> = (0..n)
            .map(|i| {
                graph
                    .neighbors(i)
                    .map(|(j, e)| (j, e.weight as f64))
                    .collect::<Vec<_>>()
            })
            .collect();
        Self {
            adjacency,
            self_loops: vec![0.0; n],
            min_id: (0..n).collect(),
        }
    }

    fn len(&self) -> usize {
        self.adjacency.len()
    }

    fn strength(&self, i: usize) -> f64 {
        self.self_loops[i] + self.adjacency[i].iter().map(|&(_, w)| w).sum::<f64>()
    }

    /// Greedy local moving until a sweep moves nothing or `max_sweeps` is hit.
    /// Returns the community of each level node and whether anything moved.
    fn local_moving(
        &self,
        resolution: f64,
        max_sweeps: usize,
        rng: &mut StdRng,
    ) -> (Vec<usize>, bool) {
        let n = self.len();
        let strengths: Vec<f64> = (0..n).map(|i| self.strength(i)).collect();
        let m2: f64 = strengths.iter().sum();
        let mut community: Vec<usize> = (0..n).collect();
        if m2 <= 0.0 {
            return (community, false);
        }

        let mut totals = strengths.clone();
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);

        let mut moved_any = false;
        for _ in 0..max_sweeps {
            let mut moved = false;
            for &i in &order {
                let current = community[i];
                let k_i = strengths[i];

                let mut links: BTreeMap<usize, f64> = BTreeMap::new();
                for &(j, w) in &self.adjacency[i] {
                    *links.entry(community[j]).or_insert(0.0) += w;
                }

                totals[current] -= k_i;
                let gain = |c: usize, w: f64| w - resolution * totals[c] * k_i / m2;

                let mut best = current;
                let mut best_gain = gain(current, links.get(&current).copied().unwrap_or(0.0));
                for (&c, &w) in &links {
                    if c == current {
                        continue;
                    }
                    let g = gain(c, w);
                    let better = g > best_gain + GAIN_EPSILON
                        || (best != current && (g - best_gain).abs() <= GAIN_EPSILON && c < best);
                    if better {
                        best = c;
                        best_gain = g;
                    }
                }

                totals[best] += k_i;
                if best != current {
                    community[i] = best;
                    moved = true;
                }
            }
            if !moved {
                break;
            }
            moved_any = true;
        }

        (community, moved_any)
    }

    /// Dense labels for the communities in `assignment`, ordered by the
    /// lowest original node index each one contains.
    fn relabel(&self, assignment: &[usize]) -> (Vec<usize>, usize) {
        let mut first_seen: BTreeMap<usize, usize> = BTreeMap::new();
        for (i, &c) in assignment.iter().enumerate() {
            let entry = first_seen.entry(c).or_insert(usize::MAX);
            *entry = (*entry).min(self.min_id[i]);
        }
        let mut ordered: Vec<(usize, usize)> =
            first_seen.into_iter().map(|(c, min)| (min, c)).collect();
        ordered.sort_unstable();

        let mut labels = vec![usize::MAX; self.len()];
        for (label, &(_, c)) in ordered.iter().enumerate() {
            labels[c] = label;
        }
        (labels, ordered.len())
    }

    /// Collapse each community into one node.
    fn aggregate(&self, assignment: &[usize], labels: &[usize], count: usize) -> Level {
        let mut self_loops = vec![0.0; count];
        let mut min_id = vec![usize::MAX; count];
        let mut weights: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); count];

        for i in 0..self.len() {
            let ci = labels[assignment[i]];
            self_loops[ci] += self.self_loops[i];
            min_id[ci] = min_id[ci].min(self.min_id[i]);
            for &(j, w) in &self.adjacency[i] {
                let cj = labels[assignment[j]];
                if ci == cj {
                    self_loops[ci] += w;
                } else {
                    *weights[ci].entry(cj).or_insert(0.0) += w;
                }
            }
        }

        Level {
            adjacency: weights
                .into_iter()
                .map(|m| m.into_iter().collect::<Vec<_>>())
                .collect(),
            self_loops,
            min_id,
        }
    }
}
