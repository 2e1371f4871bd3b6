//! The static analysis pipeline feeding the allocator.
//!
//! The compiler lowers each function to a [`FlowGraph`](cfg::FlowGraph) and
//! calls [`analyze`]; the result tells the code generator, per allocation
//! site, whether to emit stack cells, scratch allocations, region
//! allocations (and in which region, sized how), or component islands — and,
//! per parameter, what the callee may do with it.
//!
//! Passes, in order: points-to and escape classes, shape
//! (tree/dag/cyclic) over the site containment graph, block liveness, the
//! lifetime partition, and finally directive derivation.

pub mod cfg;
pub mod directive;
pub mod escape;
pub mod liveness;
pub mod partition;
pub mod shape;

pub use cfg::{AllocSite, Block, BlockId, FlowGraph, SiteId, SizeHint, Stmt, VarId};
pub use directive::{
    analyze, AnalysisResult, Directive, OwnershipMode, Placement, RegionChoice, SizeClass, Sizing,
};
pub use escape::EscapeClass;
pub use shape::Shape;
