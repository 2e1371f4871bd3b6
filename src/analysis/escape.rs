//! Escape analysis: where can an object allocated at each site end up?
//!
//! A flow-insensitive points-to fixpoint first, then escape classes seeded
//! from the statements that leak values (returns, captures, global stores,
//! stores into parameters) and propagated down the site containment graph:
//! whatever an escaping object can hold escapes with it.

use super::cfg::{FlowGraph, SiteId, Stmt, VarId};

/// The escape lattice, least to greatest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum EscapeClass {
    None = 0,
    /// Stored into an object a parameter refers to: outlives the callee via
    /// the argument.
    Argument,
    /// Flows out through the return value.
    Return,
    /// Captured by a closure environment.
    Captured,
    /// Reaches a global slot.
    Global,
}

/// The may-point-to relation, shared with the shape pass.
pub struct PointsTo {
    /// `var_sites[v][s]`: may variable `v` hold an object from site `s`?
    pub var_sites: Vec<Vec<bool>>,
    /// `site_children[s][t]`: may an object of `s` hold a reference to an
    /// object of `t`?
    pub site_children: Vec<Vec<bool>>,
}

impl PointsTo {
    pub fn sites_of(&self, var: VarId) -> impl Iterator<Item = SiteId> + '_ {
        self.var_sites[var]
            .iter()
            .enumerate()
            .filter_map(|(s, &hit)| hit.then_some(s))
    }
}

fn or_into(dst: &mut [bool], src: &[bool]) -> bool {
    let mut changed = false;
    for (d, &s) in dst.iter_mut().zip(src) {
        if s && !*d {
            *d = true;
            changed = true;
        }
    }
    changed
}

/// Compute the points-to relation by iterating all statements to a fixpoint.
pub fn points_to(graph: &FlowGraph) -> PointsTo {
    let site_count = graph.sites.len();
    let mut pt = PointsTo {
        var_sites: vec![vec![false; site_count]; graph.var_count],
        site_children: vec![vec![false; site_count]; site_count],
    };
    let mut changed = true;
    while changed {
        changed = false;
        for (_, stmt) in graph.stmts() {
            match *stmt {
                Stmt::Alloc { dst, site } => {
                    if !pt.var_sites[dst][site] {
                        pt.var_sites[dst][site] = true;
                        changed = true;
                    }
                }
                Stmt::Copy { dst, src } => {
                    if dst != src {
                        let (d, s) = index_two(&mut pt.var_sites, dst, src);
                        changed |= or_into(d, s);
                    }
                }
                Stmt::LoadField { dst, base } => {
                    for s in 0..site_count {
                        if pt.var_sites[base][s] {
                            let children = pt.site_children[s].clone();
                            changed |= or_into(&mut pt.var_sites[dst], &children);
                        }
                    }
                }
                Stmt::StoreField { base, value } | Stmt::Capture { closure: base, value } => {
                    for s in 0..site_count {
                        if pt.var_sites[base][s] {
                            let held = pt.var_sites[value].clone();
                            changed |= or_into(&mut pt.site_children[s], &held);
                        }
                    }
                }
                Stmt::StoreGlobal { .. } | Stmt::Return { .. } => {}
            }
        }
    }
    pt
}

fn index_two<'a, T>(v: &'a mut [T], a: usize, b: usize) -> (&'a mut T, &'a T) {
    debug_assert!(a != b);
    if a < b {
        let (lo, hi) = v.split_at_mut(b);
        (&mut lo[a], &hi[0])
    } else {
        let (lo, hi) = v.split_at_mut(a);
        (&mut hi[0], &lo[b])
    }
}

pub struct EscapeSummary {
    pub var_escape: Vec<EscapeClass>,
    pub site_escape: Vec<EscapeClass>,
}

/// Classify every variable and site.
pub fn analyze(graph: &FlowGraph, pt: &PointsTo) -> EscapeSummary {
    let site_count = graph.sites.len();
    let mut site_escape = vec![EscapeClass::None; site_count];

    let mut raise_var = |site_escape: &mut Vec<EscapeClass>, var: VarId, class: EscapeClass| {
        for s in pt.sites_of(var) {
            if site_escape[s] < class {
                site_escape[s] = class;
            }
        }
    };

    for (_, stmt) in graph.stmts() {
        match *stmt {
            Stmt::Return { value } => raise_var(&mut site_escape, value, EscapeClass::Return),
            Stmt::Capture { value, .. } => raise_var(&mut site_escape, value, EscapeClass::Captured),
            Stmt::StoreGlobal { value } => raise_var(&mut site_escape, value, EscapeClass::Global),
            Stmt::StoreField { base, value } if graph.params.contains(&base) => {
                raise_var(&mut site_escape, value, EscapeClass::Argument)
            }
            _ => {}
        }
    }

    // Containment: an escaping object leaks everything it can hold.
    let mut changed = true;
    while changed {
        changed = false;
        for s in 0..site_count {
            let class = site_escape[s];
            if class == EscapeClass::None {
                continue;
            }
            for t in 0..site_count {
                if pt.site_children[s][t] && site_escape[t] < class {
                    site_escape[t] = class;
                    changed = true;
                }
            }
        }
    }

    let var_escape = (0..graph.var_count)
        .map(|v| {
            pt.sites_of(v)
                .map(|s| site_escape[s])
                .max()
                .unwrap_or(EscapeClass::None)
        })
        .collect();

    EscapeSummary {
        var_escape,
        site_escape,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::cfg::SizeHint;

    #[test]
    fn local_allocation_does_not_escape() {
        let mut g = FlowGraph::new(1);
        let s = g.add_site(SizeHint::Unknown);
        g.push(0, Stmt::Alloc { dst: 0, site: s });
        let pt = points_to(&g);
        let esc = analyze(&g, &pt);
        assert_eq!(esc.site_escape[s], EscapeClass::None);
    }

    #[test]
    fn returned_allocation_escapes_as_return() {
        let mut g = FlowGraph::new(1);
        let s = g.add_site(SizeHint::Unknown);
        g.push(0, Stmt::Alloc { dst: 0, site: s });
        g.push(0, Stmt::Return { value: 0 });
        let pt = points_to(&g);
        let esc = analyze(&g, &pt);
        assert_eq!(esc.site_escape[s], EscapeClass::Return);
        assert_eq!(esc.var_escape[0], EscapeClass::Return);
    }

    #[test]
    fn containment_propagates_escape() {
        // child stored into returned parent escapes too.
        let mut g = FlowGraph::new(2);
        let parent = g.add_site(SizeHint::Unknown);
        let child = g.add_site(SizeHint::Unknown);
        g.push(0, Stmt::Alloc { dst: 0, site: parent });
        g.push(0, Stmt::Alloc { dst: 1, site: child });
        g.push(0, Stmt::StoreField { base: 0, value: 1 });
        g.push(0, Stmt::Return { value: 0 });
        let pt = points_to(&g);
        let esc = analyze(&g, &pt);
        assert_eq!(esc.site_escape[child], EscapeClass::Return);
    }

    #[test]
    fn global_store_dominates_return() {
        let mut g = FlowGraph::new(1);
        let s = g.add_site(SizeHint::Unknown);
        g.push(0, Stmt::Alloc { dst: 0, site: s });
        g.push(0, Stmt::Return { value: 0 });
        g.push(0, Stmt::StoreGlobal { value: 0 });
        let pt = points_to(&g);
        let esc = analyze(&g, &pt);
        assert_eq!(esc.site_escape[s], EscapeClass::Global);
    }

    #[test]
    fn store_into_param_is_argument_escape() {
        let mut g = FlowGraph::new(2);
        g.params = vec![0];
        let s = g.add_site(SizeHint::Unknown);
        g.push(0, Stmt::Alloc { dst: 1, site: s });
        g.push(0, Stmt::StoreField { base: 0, value: 1 });
        let pt = points_to(&g);
        let esc = analyze(&g, &pt);
        assert_eq!(esc.site_escape[s], EscapeClass::Argument);
    }

    #[test]
    fn load_field_tracks_contents() {
        let mut g = FlowGraph::new(3);
        let parent = g.add_site(SizeHint::Unknown);
        let child = g.add_site(SizeHint::Unknown);
        g.push(0, Stmt::Alloc { dst: 0, site: parent });
        g.push(0, Stmt::Alloc { dst: 1, site: child });
        g.push(0, Stmt::StoreField { base: 0, value: 1 });
        g.push(0, Stmt::LoadField { dst: 2, base: 0 });
        g.push(0, Stmt::Return { value: 2 });
        let pt = points_to(&g);
        assert!(pt.var_sites[2][child]);
        let esc = analyze(&g, &pt);
        assert_eq!(esc.site_escape[child], EscapeClass::Return);
    }
}
