//! Codegen-to-substrate interface: safe Rust APIs.
//!
//! This module provides the API surface the OmniLisp compiler's generated
//! code (and the evaluator) calls into. Each function is a thin, documented
//! delegation to the owning subsystem; the compiler is expected to inline
//! the fast paths on its side and call through here otherwise.
//!
//! Everything taking a `*mut Region` treats it as a C-style handle: the
//! caller guarantees the region is kept alive (scope, retain, or tether)
//! across the call.

use crate::component::{self, ComponentPool, ComponentTether, SymComponent, SymObj};
use crate::context::MemContext;
use crate::object::Value;
use crate::region::region_ref::RegionRef;
use crate::region::scratch::Scratch;
use crate::region::{Region, RegionStats};
use crate::transmigrate;
use crate::util::Address;

// ------------------------------------------------------------------------
// Region API

/// Create a fresh region in the Alive state, using the context's growth
/// policy and small-object threshold. Returns null on out-of-memory.
///
/// Arguments:
/// * `ctx`: the calling thread's memory context.
pub fn region_create(ctx: &MemContext) -> *mut Region {
    ctx.create_region()
}

/// Create a region pre-sized to hold `bytes` of arena data in one chunk.
/// The static-size analysis directive routes here.
///
/// Arguments:
/// * `ctx`: the calling thread's memory context.
/// * `bytes`: the exact arena extent the caller will fill.
pub fn region_create_exact(ctx: &MemContext, bytes: usize) -> *mut Region {
    ctx.create_region_exact(bytes)
}

/// End a region's scope. Allocation becomes forbidden; the storage survives
/// until the last external reference and tether are gone, at which point it
/// is freed (possibly right here).
///
/// Arguments:
/// * `region`: the region whose scope is ending. Only the owning thread may
///   call this, and only once.
pub fn region_exit(region: *mut Region) {
    Region::exit(region);
}

/// Allocate `size` bytes from a region. Small requests fill the region's
/// inline buffer first. Returns `Address::ZERO` on out-of-memory; never
/// aborts.
///
/// Arguments:
/// * `region`: the destination region; must be Alive and owned by the
///   calling thread.
/// * `size`: the number of bytes required.
pub fn region_alloc(region: *mut Region, size: usize) -> Address {
    unsafe { &*region }.alloc(size)
}

/// Construct a retaining fat pointer to `object` inside `region`.
///
/// Arguments:
/// * `object`: an address previously returned by an allocation in `region`.
/// * `region`: the owning region.
pub fn region_ref(object: Address, region: *mut Region) -> RegionRef {
    RegionRef::new(object, region)
}

/// Retain: duplicate a fat pointer, bumping the region's external count.
pub fn region_retain(reference: &RegionRef) -> RegionRef {
    reference.clone()
}

/// Release: drop a fat pointer, decrementing the region's external count
/// and freeing the region if it was the last thing keeping it.
pub fn region_release(reference: RegionRef) {
    drop(reference);
}

/// Begin a tether on `region` for the calling thread, coalesced through the
/// thread's tether cache.
///
/// Arguments:
/// * `ctx`: the calling thread's memory context.
/// * `region`: the region to borrow.
pub fn region_tether_start(ctx: &mut MemContext, region: *mut Region) {
    ctx.tether_cache_mut().start(region);
}

/// End a tether started on this thread. The last coalesced borrow performs
/// the atomic decrement and may free a draining region.
pub fn region_tether_end(ctx: &mut MemContext, region: *mut Region) {
    ctx.tether_cache_mut().end(region);
}

/// Move the chunk range containing `[start, end]` from `src` to `dest` in
/// O(1), without copying. Object addresses in the range stay valid.
///
/// Arguments:
/// * `dest`, `src`: the two regions; the caller owns both scopes.
/// * `start`, `end`: addresses inside the first and last chunk to move.
pub fn region_splice(dest: *mut Region, src: *mut Region, start: Address, end: Address) -> bool {
    Region::splice(unsafe { &*dest }, unsafe { &*src }, start, end)
}

/// A one-shot snapshot of a region's counters and footprint. This is the
/// observation primitive: it reads the packed liveness word once.
pub fn region_stats(region: *mut Region) -> RegionStats {
    unsafe { &*region }.stats()
}

/// The calling thread's global region, created on first use. Convenience
/// storage for values that escape to globals; its lifetime is the
/// context's.
pub fn get_or_create_global_region(ctx: &mut MemContext) -> *mut Region {
    ctx.get_or_create_global_region()
}

// ------------------------------------------------------------------------
// Scratch API

/// Open a scratch frame for transient allocations. `conflict`, when given,
/// names a frame whose results the caller is still reading; the new frame
/// takes the thread's other scratch arena.
pub fn scratch_begin(ctx: &mut MemContext, conflict: Option<&Scratch>) -> Scratch {
    ctx.scratch_mut().begin(conflict)
}

/// Allocate from a scratch frame. Valid until the frame ends.
pub fn scratch_alloc(ctx: &mut MemContext, scratch: &Scratch, size: usize) -> Address {
    ctx.scratch_mut().alloc(scratch, size)
}

/// Allocate from a scratch frame with explicit alignment.
pub fn scratch_alloc_aligned(
    ctx: &mut MemContext,
    scratch: &Scratch,
    size: usize,
    align: usize,
) -> Address {
    ctx.scratch_mut().alloc_aligned(scratch, size, align)
}

/// Close a scratch frame, reclaiming everything it allocated. Frames on the
/// same arena must close in LIFO order.
pub fn scratch_end(ctx: &mut MemContext, scratch: Scratch) {
    ctx.scratch_mut().end(scratch);
}

/// Release both scratch arenas entirely. Thread teardown only.
pub fn scratch_release_all(ctx: &mut MemContext) {
    ctx.scratch_mut().release_all();
}

// ------------------------------------------------------------------------
// Transmigration API

/// Move the object graph rooted at `root` from `src` to `dest`. Returns the
/// root's address in the destination (unchanged when the splice fast path
/// applied). See [`crate::transmigrate`] for the contract, including
/// partial-failure behavior under out-of-memory.
pub fn transmigrate(ctx: &mut MemContext, root: Value, src: *mut Region, dest: *mut Region) -> Value {
    transmigrate::transmigrate(ctx, root, src, dest)
}

/// As [`transmigrate`], processing `chunk` graph nodes at a time and
/// reporting fractional progress through `progress`.
pub fn transmigrate_incremental(
    ctx: &mut MemContext,
    root: Value,
    src: *mut Region,
    dest: *mut Region,
    chunk: usize,
    progress: &mut f64,
) -> Value {
    transmigrate::transmigrate_incremental(ctx, root, src, dest, chunk, progress)
}

// ------------------------------------------------------------------------
// Component API

/// A fresh island header from the thread's pool. Returns null on
/// out-of-memory.
pub fn component_new(ctx: &mut MemContext) -> *mut SymComponent {
    ctx.component_pool_mut().acquire()
}

/// Create an object record with `payload_bytes` of owned payload, ready to
/// be added to an island. Returns null on out-of-memory.
pub fn symobj_new(payload_bytes: usize) -> *mut SymObj {
    SymObj::create(payload_bytes)
}

/// Append `obj` to the island of `component` and point it at the root.
pub fn component_add_member(component: *mut SymComponent, obj: *mut SymObj) {
    component::add_member(component, obj);
}

/// Union-find find with path compression: the island's current root.
pub fn component_find(component: *mut SymComponent) -> *mut SymComponent {
    component::find(component)
}

/// Merge two islands; the caller holds strong references to both and
/// serializes island mutation. Returns the surviving root.
pub fn component_union(a: *mut SymComponent, b: *mut SymComponent) -> *mut SymComponent {
    component::union(a, b)
}

/// Record the edge `from → to`, merging islands first when it crosses them.
pub fn symobj_link(from: *mut SymObj, to: *mut SymObj) -> bool {
    component::link(from, to)
}

/// Remove one `from → to` edge.
pub fn symobj_unlink(from: *mut SymObj, to: *mut SymObj) -> bool {
    component::unlink(from, to)
}

/// Add a strong external reference to an island.
pub fn acquire_handle(component: *mut SymComponent) {
    component::acquire_handle(component);
}

/// Drop a strong external reference. An island whose counts both reach zero
/// is scheduled on the thread's dismantle queue — reclamation happens at
/// the next [`process_dismantle`] safe point, not here.
pub fn release_handle(ctx: &mut MemContext, component: *mut SymComponent) {
    if let Some(root) = component::release_handle(component) {
        ctx.component_pool_mut().schedule_dismantle(root);
    }
}

/// Begin a scoped borrow of an island.
pub fn component_tether_begin(component: *mut SymComponent) -> ComponentTether {
    component::tether_begin(component)
}

/// End a scoped borrow, scheduling dismantling if it was the last reference
/// of any kind.
pub fn component_tether_end(ctx: &mut MemContext, token: ComponentTether) {
    if let Some(root) = component::tether_end(token) {
        ctx.component_pool_mut().schedule_dismantle(root);
    }
}

/// Dismantle up to `batch` queued islands (zero drains the queue; pass the
/// `dismantle_batch` option for the configured default). Returns the number
/// dismantled.
pub fn process_dismantle(ctx: &mut MemContext, batch: usize) -> usize {
    ctx.component_pool_mut().process_dismantle(batch)
}

/// Thread-teardown drain: dismantle everything reclaimable and release the
/// pool's slab storage.
pub fn component_cleanup(ctx: &mut MemContext) {
    ctx.component_pool_mut().cleanup();
}

/// The thread's cumulative dismantle counters.
pub fn dismantle_stats(ctx: &MemContext) -> crate::component::DismantleStats {
    ctx.component_pool().stats()
}

/// Borrow the component pool directly, for embedders managing safe points
/// themselves.
pub fn component_pool(ctx: &mut MemContext) -> &mut ComponentPool {
    ctx.component_pool_mut()
}
