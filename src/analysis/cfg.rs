//! The analysis input: a control-flow graph with per-variable def/use
//! information and allocation sites.
//!
//! The front end lowers each function to this form; the passes in this
//! module tree never see syntax. Variables and sites are dense indices.

pub type VarId = usize;
pub type BlockId = usize;
pub type SiteId = usize;

/// What the front end knows about an allocation site's size.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SizeHint {
    /// Exactly `n` bytes, known at compile time.
    Static(usize),
    /// Computed at run time, optionally bounded.
    Dynamic { bound: Option<usize> },
    Unknown,
}

#[derive(Copy, Clone, Debug)]
pub struct AllocSite {
    pub size_hint: SizeHint,
}

/// One lowered statement. Field-insensitive: all stores into an object look
/// alike to the passes.
#[derive(Copy, Clone, Debug)]
pub enum Stmt {
    /// `dst ← fresh object` from `site`.
    Alloc { dst: VarId, site: SiteId },
    /// `dst ← src`.
    Copy { dst: VarId, src: VarId },
    /// `base.f ← value`.
    StoreField { base: VarId, value: VarId },
    /// `dst ← base.f`.
    LoadField { dst: VarId, base: VarId },
    /// `closure` captures `value` into its environment.
    Capture { closure: VarId, value: VarId },
    /// A global slot receives `value`.
    StoreGlobal { value: VarId },
    /// The function returns `value`.
    Return { value: VarId },
}

#[derive(Default, Clone, Debug)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub succs: Vec<BlockId>,
}

#[derive(Clone, Debug)]
pub struct FlowGraph {
    pub blocks: Vec<Block>,
    pub entry: BlockId,
    pub var_count: usize,
    /// Parameter variables, in order.
    pub params: Vec<VarId>,
    pub sites: Vec<AllocSite>,
}

impl FlowGraph {
    pub fn new(var_count: usize) -> Self {
        FlowGraph {
            blocks: vec![Block::default()],
            entry: 0,
            var_count,
            params: Vec::new(),
            sites: Vec::new(),
        }
    }

    pub fn add_block(&mut self) -> BlockId {
        self.blocks.push(Block::default());
        self.blocks.len() - 1
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from].succs.push(to);
    }

    pub fn add_site(&mut self, size_hint: SizeHint) -> SiteId {
        self.sites.push(AllocSite { size_hint });
        self.sites.len() - 1
    }

    pub fn push(&mut self, block: BlockId, stmt: Stmt) {
        debug_assert!(self.stmt_vars_in_range(&stmt));
        self.blocks[block].stmts.push(stmt);
    }

    fn stmt_vars_in_range(&self, stmt: &Stmt) -> bool {
        let check = |v: VarId| v < self.var_count;
        match *stmt {
            Stmt::Alloc { dst, site } => check(dst) && site < self.sites.len(),
            Stmt::Copy { dst, src } => check(dst) && check(src),
            Stmt::StoreField { base, value } => check(base) && check(value),
            Stmt::LoadField { dst, base } => check(dst) && check(base),
            Stmt::Capture { closure, value } => check(closure) && check(value),
            Stmt::StoreGlobal { value } => check(value),
            Stmt::Return { value } => check(value),
        }
    }

    /// Every statement in block order, with its block.
    pub fn stmts(&self) -> impl Iterator<Item = (BlockId, &Stmt)> {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(b, block)| block.stmts.iter().map(move |s| (b, s)))
    }
}
