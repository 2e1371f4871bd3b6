//! Allocation directive derivation: the decision table that turns escape,
//! shape, liveness and size information into what the code generator
//! actually emits per allocation site.

use super::cfg::{FlowGraph, SizeHint, Stmt};
use super::escape::{EscapeClass, EscapeSummary, PointsTo};
use super::liveness::Liveness;
use super::partition::Partition;
use super::shape::Shape;

/// Size-class regions for dynamically sized escapees.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SizeClass {
    Tiny,
    Small,
    Medium,
    Large,
}

impl SizeClass {
    pub fn for_bytes(bytes: usize) -> SizeClass {
        match bytes {
            0..=256 => SizeClass::Tiny,
            257..=4096 => SizeClass::Small,
            4097..=65536 => SizeClass::Medium,
            _ => SizeClass::Large,
        }
    }
}

/// How the destination region should be sized.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Sizing {
    /// `region_create_exact(n)`.
    Exact(usize),
    /// A pooled size-class region.
    Class(SizeClass),
    /// A growable region.
    Growable,
}

impl Sizing {
    fn from_hint(hint: SizeHint) -> Sizing {
        match hint {
            SizeHint::Static(n) => Sizing::Exact(n),
            SizeHint::Dynamic { bound: Some(n) } => Sizing::Class(SizeClass::for_bytes(n)),
            SizeHint::Dynamic { bound: None } | SizeHint::Unknown => Sizing::Growable,
        }
    }
}

/// Which region an escaping allocation lands in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegionChoice {
    /// The caller's region (return and argument escape).
    Caller,
    /// The capturing closure's region.
    Closure,
    /// The thread's global region.
    Global,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Non-escaping tree: stack cells with per-object `free_tree`.
    Stack,
    /// Non-escaping dag or cycle: scratch, bulk-freed at scope exit.
    Scratch,
    /// Escaping, acyclic: a region picked by the escape destination.
    Region(RegionChoice, Sizing),
    /// Escaping and possibly cyclic: a component island; boundary strong
    /// references go through `acquire_handle`.
    Component,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Directive {
    pub placement: Placement,
    /// Dense lifetime-partition class; sites in one class share a scope
    /// boundary and may share a region instance.
    pub lifetime_class: usize,
}

/// What the callee may do with each parameter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OwnershipMode {
    /// The callee keeps a reference beyond the call.
    Owned,
    /// Read within the call only.
    Borrowed,
    /// Flows out through the return value.
    Consumed,
}

pub struct AnalysisResult {
    pub escape: Vec<EscapeClass>,
    pub shape: Vec<Shape>,
    pub directives: Vec<Directive>,
    pub param_modes: Vec<OwnershipMode>,
}

/// The lifetime partition: variables that interact through a statement and
/// whose block-level live ranges overlap collapse into one class; each site
/// belongs to its defining variable's class.
fn lifetime_classes(graph: &FlowGraph, liveness: &Liveness) -> Vec<usize> {
    let mut partition = Partition::new(graph.var_count);
    for (_, stmt) in graph.stmts() {
        let pair = match *stmt {
            Stmt::Copy { dst, src } => Some((dst, src)),
            Stmt::StoreField { base, value } => Some((base, value)),
            Stmt::LoadField { dst, base } => Some((dst, base)),
            Stmt::Capture { closure, value } => Some((closure, value)),
            _ => None,
        };
        if let Some((a, b)) = pair {
            if a != b && liveness.overlap(a, b) {
                partition.union(a, b);
            }
        }
    }
    let var_classes = partition.classes();

    // A site's class is its first allocating variable's class.
    let mut site_class = vec![0; graph.sites.len()];
    for (_, stmt) in graph.stmts() {
        if let Stmt::Alloc { dst, site } = *stmt {
            site_class[site] = var_classes[dst];
        }
    }
    site_class
}

fn region_choice(class: EscapeClass) -> RegionChoice {
    match class {
        EscapeClass::Return | EscapeClass::Argument => RegionChoice::Caller,
        EscapeClass::Captured => RegionChoice::Closure,
        EscapeClass::Global => RegionChoice::Global,
        EscapeClass::None => unreachable!("non-escaping sites never pick a region"),
    }
}

/// Apply the decision table per site.
pub fn derive(
    graph: &FlowGraph,
    escape: &EscapeSummary,
    shapes: &[Shape],
    liveness: &Liveness,
) -> Vec<Directive> {
    let classes = lifetime_classes(graph, liveness);
    graph
        .sites
        .iter()
        .enumerate()
        .map(|(s, site)| {
            let placement = match (escape.site_escape[s], shapes[s]) {
                (EscapeClass::None, Shape::Tree) => Placement::Stack,
                (EscapeClass::None, _) => Placement::Scratch,
                (_, Shape::Cyclic) => Placement::Component,
                (class, _) => {
                    Placement::Region(region_choice(class), Sizing::from_hint(site.size_hint))
                }
            };
            Directive {
                placement,
                lifetime_class: classes[s],
            }
        })
        .collect()
}

/// Parameter modes from the variables' escape classes.
pub fn param_modes(graph: &FlowGraph, escape: &EscapeSummary) -> Vec<OwnershipMode> {
    graph
        .params
        .iter()
        .map(|&p| {
            // A parameter's own sites are what the caller passed in; how far
            // they travel decides the mode.
            let class = param_class(graph, escape, p);
            match class {
                EscapeClass::None | EscapeClass::Argument => OwnershipMode::Borrowed,
                EscapeClass::Return => OwnershipMode::Consumed,
                EscapeClass::Captured | EscapeClass::Global => OwnershipMode::Owned,
            }
        })
        .collect()
}

fn param_class(graph: &FlowGraph, escape: &EscapeSummary, param: usize) -> EscapeClass {
    // Parameters usually hold no local sites, so look at how the variable
    // itself is used, not only at what it may point to.
    let mut class = escape.var_escape[param];
    for (_, stmt) in graph.stmts() {
        let observed = match *stmt {
            Stmt::Return { value } if value == param => EscapeClass::Return,
            Stmt::Capture { value, .. } if value == param => EscapeClass::Captured,
            Stmt::StoreGlobal { value } if value == param => EscapeClass::Global,
            Stmt::StoreField { value, .. } if value == param => EscapeClass::Argument,
            _ => EscapeClass::None,
        };
        if observed > class {
            class = observed;
        }
    }
    class
}

/// Run the full pipeline.
pub fn analyze(graph: &FlowGraph) -> AnalysisResult {
    let pt: PointsTo = super::escape::points_to(graph);
    let escape = super::escape::analyze(graph, &pt);
    let shapes = super::shape::analyze(graph, &pt);
    let liveness = super::liveness::analyze(graph);
    let directives = derive(graph, &escape, &shapes, &liveness);
    let param_modes = param_modes(graph, &escape);
    AnalysisResult {
        escape: escape.site_escape,
        shape: shapes,
        directives,
        param_modes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::cfg::FlowGraph;

    #[test]
    fn local_tree_goes_to_stack() {
        let mut g = FlowGraph::new(1);
        let s = g.add_site(SizeHint::Static(32));
        g.push(0, Stmt::Alloc { dst: 0, site: s });
        let result = analyze(&g);
        assert_eq!(result.directives[s].placement, Placement::Stack);
    }

    #[test]
    fn local_shared_structure_goes_to_scratch() {
        let mut g = FlowGraph::new(3);
        let root = g.add_site(SizeHint::Unknown);
        let left = g.add_site(SizeHint::Unknown);
        let child = g.add_site(SizeHint::Unknown);
        g.push(0, Stmt::Alloc { dst: 0, site: root });
        g.push(0, Stmt::Alloc { dst: 1, site: left });
        g.push(0, Stmt::Alloc { dst: 2, site: child });
        g.push(0, Stmt::StoreField { base: 0, value: 1 });
        g.push(0, Stmt::StoreField { base: 0, value: 2 });
        g.push(0, Stmt::StoreField { base: 1, value: 2 });
        let result = analyze(&g);
        assert_eq!(result.directives[root].placement, Placement::Scratch);
    }

    #[test]
    fn returned_static_site_gets_exact_caller_region() {
        let mut g = FlowGraph::new(1);
        let s = g.add_site(SizeHint::Static(128));
        g.push(0, Stmt::Alloc { dst: 0, site: s });
        g.push(0, Stmt::Return { value: 0 });
        let result = analyze(&g);
        assert_eq!(
            result.directives[s].placement,
            Placement::Region(RegionChoice::Caller, Sizing::Exact(128))
        );
    }

    #[test]
    fn captured_dynamic_site_gets_closure_class_region() {
        let mut g = FlowGraph::new(2);
        let clo = g.add_site(SizeHint::Unknown);
        let s = g.add_site(SizeHint::Dynamic { bound: Some(1000) });
        g.push(0, Stmt::Alloc { dst: 0, site: clo });
        g.push(0, Stmt::Alloc { dst: 1, site: s });
        g.push(0, Stmt::Capture { closure: 0, value: 1 });
        g.push(0, Stmt::Return { value: 0 });
        let result = analyze(&g);
        assert_eq!(
            result.directives[s].placement,
            Placement::Region(RegionChoice::Closure, Sizing::Class(SizeClass::Small))
        );
    }

    #[test]
    fn escaping_cycle_becomes_component() {
        let mut g = FlowGraph::new(2);
        let a = g.add_site(SizeHint::Unknown);
        let b = g.add_site(SizeHint::Unknown);
        g.push(0, Stmt::Alloc { dst: 0, site: a });
        g.push(0, Stmt::Alloc { dst: 1, site: b });
        g.push(0, Stmt::StoreField { base: 0, value: 1 });
        g.push(0, Stmt::StoreField { base: 1, value: 0 });
        g.push(0, Stmt::Return { value: 0 });
        let result = analyze(&g);
        assert_eq!(result.directives[a].placement, Placement::Component);
        assert_eq!(result.directives[b].placement, Placement::Component);
    }

    #[test]
    fn global_store_targets_global_region() {
        let mut g = FlowGraph::new(1);
        let s = g.add_site(SizeHint::Unknown);
        g.push(0, Stmt::Alloc { dst: 0, site: s });
        g.push(0, Stmt::StoreGlobal { value: 0 });
        let result = analyze(&g);
        assert_eq!(
            result.directives[s].placement,
            Placement::Region(RegionChoice::Global, Sizing::Growable)
        );
    }

    #[test]
    fn parameter_modes() {
        // p0 read only; p1 returned; p2 captured.
        let mut g = FlowGraph::new(4);
        g.params = vec![0, 1, 2];
        let clo = g.add_site(SizeHint::Unknown);
        g.push(0, Stmt::Alloc { dst: 3, site: clo });
        g.push(0, Stmt::LoadField { dst: 3, base: 0 });
        g.push(0, Stmt::Return { value: 1 });
        g.push(0, Stmt::Capture { closure: 3, value: 2 });
        let result = analyze(&g);
        assert_eq!(result.param_modes[0], OwnershipMode::Borrowed);
        assert_eq!(result.param_modes[1], OwnershipMode::Consumed);
        assert_eq!(result.param_modes[2], OwnershipMode::Owned);
    }

    #[test]
    fn interacting_live_vars_share_a_lifetime_class() {
        let mut g = FlowGraph::new(3);
        let a = g.add_site(SizeHint::Unknown);
        let b = g.add_site(SizeHint::Unknown);
        let c = g.add_site(SizeHint::Unknown);
        let b1 = g.add_block();
        g.add_edge(0, b1);
        g.push(0, Stmt::Alloc { dst: 0, site: a });
        g.push(0, Stmt::Alloc { dst: 1, site: b });
        g.push(0, Stmt::Alloc { dst: 2, site: c });
        g.push(0, Stmt::StoreField { base: 0, value: 1 });
        g.push(b1, Stmt::Return { value: 0 });
        g.push(b1, Stmt::StoreGlobal { value: 1 });
        let result = analyze(&g);
        let d = &result.directives;
        assert_eq!(d[a].lifetime_class, d[b].lifetime_class);
        assert_ne!(d[a].lifetime_class, d[c].lifetime_class);
    }
}
