//! Block-level liveness by backward dataflow.

use super::cfg::{FlowGraph, Stmt, VarId};

pub struct Liveness {
    pub live_in: Vec<Vec<bool>>,
    pub live_out: Vec<Vec<bool>>,
}

fn uses(stmt: &Stmt, mut visit: impl FnMut(VarId)) {
    match *stmt {
        Stmt::Alloc { .. } => {}
        Stmt::Copy { src, .. } => visit(src),
        Stmt::StoreField { base, value } => {
            visit(base);
            visit(value);
        }
        Stmt::LoadField { base, .. } => visit(base),
        Stmt::Capture { closure, value } => {
            visit(closure);
            visit(value);
        }
        Stmt::StoreGlobal { value } => visit(value),
        Stmt::Return { value } => visit(value),
    }
}

fn def(stmt: &Stmt) -> Option<VarId> {
    match *stmt {
        Stmt::Alloc { dst, .. } | Stmt::Copy { dst, .. } | Stmt::LoadField { dst, .. } => Some(dst),
        _ => None,
    }
}

/// Compute per-block live-in/live-out sets.
pub fn analyze(graph: &FlowGraph) -> Liveness {
    let blocks = graph.blocks.len();
    let vars = graph.var_count;
    let mut live_in = vec![vec![false; vars]; blocks];
    let mut live_out = vec![vec![false; vars]; blocks];

    let mut changed = true;
    while changed {
        changed = false;
        // Reverse order converges faster on forward-shaped graphs.
        for b in (0..blocks).rev() {
            let mut out = vec![false; vars];
            for &succ in &graph.blocks[b].succs {
                for v in 0..vars {
                    out[v] |= live_in[succ][v];
                }
            }
            let mut live = out.clone();
            for stmt in graph.blocks[b].stmts.iter().rev() {
                if let Some(d) = def(stmt) {
                    live[d] = false;
                }
                uses(stmt, |v| live[v] = true);
            }
            if live != live_in[b] {
                live_in[b] = live;
                changed = true;
            }
            if out != live_out[b] {
                live_out[b] = out;
                changed = true;
            }
        }
    }
    Liveness { live_in, live_out }
}

impl Liveness {
    /// Do the two variables' block-level live ranges overlap anywhere?
    pub fn overlap(&self, a: VarId, b: VarId) -> bool {
        self.live_in
            .iter()
            .zip(&self.live_out)
            .any(|(li, lo)| (li[a] && li[b]) || (lo[a] && lo[b]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::cfg::SizeHint;

    #[test]
    fn straight_line_liveness() {
        // b0: v0 ← alloc; goto b1. b1: return v0.
        let mut g = FlowGraph::new(1);
        let s = g.add_site(SizeHint::Unknown);
        let b1 = g.add_block();
        g.add_edge(0, b1);
        g.push(0, Stmt::Alloc { dst: 0, site: s });
        g.push(b1, Stmt::Return { value: 0 });
        let lv = analyze(&g);
        assert!(lv.live_out[0][0], "v0 live across the edge");
        assert!(lv.live_in[b1][0]);
        assert!(!lv.live_in[0][0], "defined before use in b0");
    }

    #[test]
    fn branch_merges_liveness() {
        // b0 branches to b1 and b2; only b2 uses v1.
        let mut g = FlowGraph::new(2);
        let s = g.add_site(SizeHint::Unknown);
        let b1 = g.add_block();
        let b2 = g.add_block();
        g.add_edge(0, b1);
        g.add_edge(0, b2);
        g.push(0, Stmt::Alloc { dst: 0, site: s });
        g.push(0, Stmt::Copy { dst: 1, src: 0 });
        g.push(b2, Stmt::Return { value: 1 });
        let lv = analyze(&g);
        assert!(lv.live_out[0][1]);
        assert!(!lv.live_in[b1][1]);
        assert!(lv.live_in[b2][1]);
    }

    #[test]
    fn loop_keeps_var_live() {
        // b0: v0 ← alloc. b1: use v0, loop back to b1.
        let mut g = FlowGraph::new(1);
        let s = g.add_site(SizeHint::Unknown);
        let b1 = g.add_block();
        g.add_edge(0, b1);
        g.add_edge(b1, b1);
        g.push(0, Stmt::Alloc { dst: 0, site: s });
        g.push(b1, Stmt::StoreGlobal { value: 0 });
        let lv = analyze(&g);
        assert!(lv.live_in[b1][0]);
        assert!(lv.live_out[b1][0], "loop back edge keeps v0 live");
    }
}
