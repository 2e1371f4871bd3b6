// Region lifecycle end to end: scope exit, draining, reference
// conservation, and the stack-to-heap escape sequence.

use omnimem::memory_manager as mm;
use omnimem::object::{mk_pair_region, pair_car, pair_cdr, Value};
use omnimem::{MemContext, RegionRef};

#[test]
fn local_region_dies_with_its_scope() {
    let ctx = MemContext::default();
    let r = mm::region_create(&ctx);
    assert!(!r.is_null());
    let pair = mk_pair_region(unsafe { &*r }, Value::fixnum(1), Value::fixnum(2));
    assert!(pair.is_obj());
    let stats = mm::region_stats(r);
    assert!(stats.scope_alive);
    assert_eq!(stats.external_rc, 0);
    assert_eq!(stats.tether_count, 0);
    // No escape path: exit destroys the region and releases its storage.
    mm::region_exit(r);
}

#[test]
fn escaping_pair_survives_via_transmigration() {
    let mut ctx = MemContext::default();
    let caller = mm::region_create(&ctx);
    let local = mm::region_create(&ctx);

    let pair = mk_pair_region(unsafe { &*local }, Value::fixnum(1), Value::fixnum(2));
    // The callee's epilogue: pin the storage, end the scope, move the
    // result out, unpin.
    mm::region_tether_start(&mut ctx, local);
    mm::region_exit(local);
    let moved = mm::transmigrate(&mut ctx, pair, local, caller);
    mm::region_tether_end(&mut ctx, local); // frees the local region

    assert!(moved.is_obj());
    assert!(unsafe { &*caller }.contains(moved.obj()));
    assert_eq!(pair_car(moved).fixnum_value(), 1);
    assert_eq!(pair_cdr(moved).fixnum_value(), 2);
    mm::region_exit(caller);
}

#[test]
fn external_rc_counts_every_outstanding_ref() {
    let ctx = MemContext::default();
    let r = mm::region_create(&ctx);
    let obj = mm::region_alloc(r, 32);
    assert!(!obj.is_zero());

    let refs: Vec<RegionRef> = (0..7).map(|_| mm::region_ref(obj, r)).collect();
    assert_eq!(mm::region_stats(r).external_rc, 7);
    let extra = mm::region_retain(&refs[0]);
    assert_eq!(mm::region_stats(r).external_rc, 8);
    mm::region_release(extra);
    for reference in refs {
        mm::region_release(reference);
    }
    assert_eq!(mm::region_stats(r).external_rc, 0);
    mm::region_exit(r);
}

#[test]
fn draining_region_stays_readable_until_last_release() {
    let ctx = MemContext::default();
    let r = mm::region_create(&ctx);
    let obj = mm::region_alloc(r, 64);
    unsafe { obj.store::<u64>(0xfeed) };

    let handle = mm::region_ref(obj, r);
    mm::region_exit(r);
    let stats = mm::region_stats(r);
    assert!(!stats.scope_alive);
    assert_eq!(stats.external_rc, 1);
    assert_eq!(unsafe { handle.object().load::<u64>() }, 0xfeed);
    mm::region_release(handle); // the crossing release frees the region
}

#[test]
fn global_region_outlives_local_scopes() {
    let mut ctx = MemContext::default();
    let global = mm::get_or_create_global_region(&mut ctx);
    let local = mm::region_create(&ctx);
    let v = mk_pair_region(unsafe { &*local }, Value::fixnum(3), Value::NOTHING);
    mm::region_tether_start(&mut ctx, local);
    mm::region_exit(local);
    let escaped = mm::transmigrate(&mut ctx, v, local, global);
    mm::region_tether_end(&mut ctx, local);
    assert_eq!(pair_car(escaped).fixnum_value(), 3);
    // ctx teardown exits the global region.
}

#[test]
fn exact_region_serves_its_reservation_from_one_chunk() {
    let ctx = MemContext::default();
    let r = mm::region_create_exact(&ctx, 64 * 1024);
    let mut cursor = mm::region_alloc(r, 1024);
    for _ in 0..62 {
        let next = mm::region_alloc(r, 1024);
        assert!(!next.is_zero());
        cursor = next;
    }
    assert!(!cursor.is_zero());
    assert_eq!(mm::region_stats(r).chunk_count, 1);
    mm::region_exit(r);
}
