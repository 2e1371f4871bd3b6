//! Shape analysis: is the structure reachable from each allocation site a
//! tree, a dag, or possibly cyclic?
//!
//! Works on the site containment graph from the points-to pass. The
//! classification drives the allocator: trees can be freed per-object,
//! dags need bulk free, cycles need a component island.

use super::cfg::{FlowGraph, SiteId};
use super::escape::PointsTo;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Shape {
    Tree,
    Dag,
    Cyclic,
}

/// Classify every site.
pub fn analyze(graph: &FlowGraph, pt: &PointsTo) -> Vec<Shape> {
    let n = graph.sites.len();

    // Boolean transitive closure of the containment graph. Site counts per
    // function are small; the cubic closure is simpler than SCC bookkeeping
    // and the passes run once per compile.
    let mut reach = pt.site_children.clone();
    for k in 0..n {
        for i in 0..n {
            if reach[i][k] {
                for j in 0..n {
                    if reach[k][j] && !reach[i][j] {
                        reach[i][j] = true;
                    }
                }
            }
        }
    }

    (0..n)
        .map(|s| {
            // Reachable set including the site itself.
            let in_scope = |t: SiteId| t == s || reach[s][t];
            // Cyclic: some reachable site can reach itself.
            for t in 0..n {
                if in_scope(t) && reach[t][t] {
                    return Shape::Cyclic;
                }
            }
            // Dag: some reachable site has two distinct reachable parents.
            for t in 0..n {
                if !in_scope(t) {
                    continue;
                }
                let parents = (0..n)
                    .filter(|&u| in_scope(u) && pt.site_children[u][t])
                    .count();
                if parents >= 2 {
                    return Shape::Dag;
                }
            }
            Shape::Tree
        })
        .collect()
}
