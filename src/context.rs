//! The per-thread memory context.
//!
//! All thread-local substrate state lives in one struct threaded through
//! calls — the two scratch arenas, the region tether cache, the component
//! header pool, and the lazily created global region — so the core stays
//! testable and re-entrant. A `thread_local!` accessor is provided for
//! embedders that want the conventional hidden-context style.

use std::cell::RefCell;
use std::ptr;

use crate::component::ComponentPool;
use crate::region::scratch::ScratchPair;
use crate::region::tether::TetherCache;
use crate::region::Region;
use crate::util::logger;
use crate::util::options::Options;

pub struct MemContext {
    options: Options,
    scratch: ScratchPair,
    tether_cache: TetherCache,
    component_pool: ComponentPool,
    global_region: *mut Region,
}

impl MemContext {
    /// Build a context from the given options. The first context created in
    /// the process also initializes the built-in logger.
    pub fn new(options: Options) -> Self {
        logger::try_init();
        let scratch = ScratchPair::new(*options.arena_growth, *options.scratch_trim_threshold);
        let component_pool = ComponentPool::new(*options.component_slab_size);
        MemContext {
            options,
            scratch,
            tether_cache: TetherCache::new(),
            component_pool,
            global_region: ptr::null_mut(),
        }
    }

    /// A context with built-in defaults plus `OMNIMEM_*` environment
    /// overrides.
    pub fn from_env() -> Self {
        Self::new(Options::from_env())
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn scratch_mut(&mut self) -> &mut ScratchPair {
        &mut self.scratch
    }

    pub fn scratch(&self) -> &ScratchPair {
        &self.scratch
    }

    pub fn tether_cache_mut(&mut self) -> &mut TetherCache {
        &mut self.tether_cache
    }

    pub fn component_pool_mut(&mut self) -> &mut ComponentPool {
        &mut self.component_pool
    }

    pub fn component_pool(&self) -> &ComponentPool {
        &self.component_pool
    }

    /// Create a region with this context's growth policy and small-object
    /// threshold.
    pub fn create_region(&self) -> *mut Region {
        Region::create(*self.options.arena_growth, *self.options.small_object_threshold)
    }

    /// Create a region pre-sized for `bytes` of arena data. Exact regions
    /// skip the inline buffer so their entire payload is spliceable.
    pub fn create_region_exact(&self, bytes: usize) -> *mut Region {
        Region::create_exact(*self.options.arena_growth, bytes)
    }

    /// The thread's global region, created on first use. Its lifetime is
    /// bounded by the context's (and so by the thread's).
    pub fn get_or_create_global_region(&mut self) -> *mut Region {
        if self.global_region.is_null() {
            self.global_region = self.create_region();
        }
        self.global_region
    }
}

impl Default for MemContext {
    fn default() -> Self {
        Self::new(Options::new())
    }
}

impl Drop for MemContext {
    fn drop(&mut self) {
        // Teardown order: islands first (their dismantling may read objects
        // anywhere), then the global region, then scratch.
        self.component_pool.cleanup();
        if !self.global_region.is_null() {
            Region::exit(self.global_region);
            self.global_region = ptr::null_mut();
        }
        self.scratch.release_all();
    }
}

thread_local! {
    static CONTEXT: RefCell<MemContext> = RefCell::new(MemContext::from_env());
}

/// Run `f` with the calling thread's implicit context. Re-entrant use from
/// inside `f` panics (RefCell); embedders doing that should thread an
/// explicit [`MemContext`] instead.
pub fn with_context<R>(f: impl FnOnce(&mut MemContext) -> R) -> R {
    CONTEXT.with(|ctx| f(&mut ctx.borrow_mut()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_region_is_lazy_and_stable() {
        let mut ctx = MemContext::default();
        let g1 = ctx.get_or_create_global_region();
        let g2 = ctx.get_or_create_global_region();
        assert!(!g1.is_null());
        assert_eq!(g1, g2);
    }

    #[test]
    fn with_context_provides_scratch() {
        with_context(|ctx| {
            let frame = ctx.scratch_mut().begin(None);
            let p = ctx.scratch_mut().alloc(&frame, 64);
            assert!(!p.is_zero());
            ctx.scratch_mut().end(frame);
        });
    }

    #[test]
    fn teardown_is_clean_with_defaults() {
        let ctx = MemContext::default();
        drop(ctx);
    }
}
