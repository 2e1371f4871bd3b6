// Scratch frames and the tether cache, observed from the outside: LIFO
// reclamation, the trim bound, and cross-thread visibility of coalesced
// tethers.

use omnimem::memory_manager as mm;
use omnimem::util::constants::DEFAULT_SCRATCH_TRIM_THRESHOLD;
use omnimem::{MemContext, Region};

#[test]
fn scratch_memory_is_valid_until_end() {
    let mut ctx = MemContext::default();
    let s = mm::scratch_begin(&mut ctx, None);
    let p = mm::scratch_alloc(&mut ctx, &s, 4096);
    assert!(!p.is_zero());
    for i in 0..4096usize {
        unsafe { (p + i).store::<u8>((i % 251) as u8) };
    }
    for i in (0..4096usize).step_by(7) {
        assert_eq!(unsafe { (p + i).load::<u8>() }, (i % 251) as u8);
    }
    mm::scratch_end(&mut ctx, s);
}

#[test]
fn aligned_scratch_allocation() {
    let mut ctx = MemContext::default();
    let s = mm::scratch_begin(&mut ctx, None);
    let p = mm::scratch_alloc_aligned(&mut ctx, &s, 128, 64);
    assert!(p.is_aligned_to(64));
    mm::scratch_end(&mut ctx, s);
}

#[test]
fn conflict_frames_use_both_arenas() {
    let mut ctx = MemContext::default();
    let outer = mm::scratch_begin(&mut ctx, None);
    let p = mm::scratch_alloc(&mut ctx, &outer, 64);
    unsafe { p.store::<u64>(41) };
    let inner = mm::scratch_begin(&mut ctx, Some(&outer));
    assert_ne!(outer.arena_index(), inner.arena_index());
    mm::scratch_alloc(&mut ctx, &inner, 1 << 16);
    mm::scratch_end(&mut ctx, inner);
    // The outer frame's data was never disturbed by the inner frame.
    assert_eq!(unsafe { p.load::<u64>() }, 41);
    mm::scratch_end(&mut ctx, outer);
}

#[test]
fn repeated_megabyte_frames_stay_under_the_trim_bound() {
    let mut ctx = MemContext::default();
    for _ in 0..10 {
        let s = mm::scratch_begin(&mut ctx, None);
        let p = mm::scratch_alloc(&mut ctx, &s, 1_000_000);
        assert!(!p.is_zero());
        mm::scratch_end(&mut ctx, s);
        assert!(
            ctx.scratch().footprint() <= DEFAULT_SCRATCH_TRIM_THRESHOLD + (1 << 20),
            "scratch held {} bytes after an outermost end",
            ctx.scratch().footprint()
        );
    }
    mm::scratch_release_all(&mut ctx);
    assert_eq!(ctx.scratch().footprint(), 0);
}

struct RegionPtr(*mut Region);
unsafe impl Send for RegionPtr {}

#[test]
fn coalesced_tethers_appear_as_one_to_other_threads() {
    let mut ctx = MemContext::default();
    let r = mm::region_create(&ctx);

    mm::region_tether_start(&mut ctx, r);
    mm::region_tether_start(&mut ctx, r);
    mm::region_tether_start(&mut ctx, r);

    let observed = {
        let ptr = RegionPtr(r);
        std::thread::spawn(move || {
            let ptr = ptr;
            mm::region_stats(ptr.0).tether_count
        })
            .join()
            .unwrap()
    };
    assert_eq!(observed, 1, "three local borrows coalesce to one atomic");

    mm::region_tether_end(&mut ctx, r);
    mm::region_tether_end(&mut ctx, r);
    assert_eq!(mm::region_stats(r).tether_count, 1);
    mm::region_tether_end(&mut ctx, r);
    assert_eq!(mm::region_stats(r).tether_count, 0);
    mm::region_exit(r);
}

#[test]
fn tethers_from_two_threads_count_separately() {
    let mut ctx = MemContext::default();
    let r = mm::region_create(&ctx);
    mm::region_tether_start(&mut ctx, r);

    let handle = {
        let ptr = RegionPtr(r);
        std::thread::spawn(move || {
            let ptr = ptr;
            let r = ptr.0;
            let mut remote_ctx = MemContext::default();
            mm::region_tether_start(&mut remote_ctx, r);
            let seen = mm::region_stats(r).tether_count;
            mm::region_tether_end(&mut remote_ctx, r);
            seen
        })
    };
    // Each thread's cache contributes one atomic borrow.
    assert_eq!(handle.join().unwrap(), 2);
    assert_eq!(mm::region_stats(r).tether_count, 1);
    mm::region_tether_end(&mut ctx, r);
    mm::region_exit(r);
}
