//! The transmigration engine: moving an object graph from one region to
//! another, preserving sharing and cycles.
//!
//! Two paths:
//! * **Region splice.** A terminal source (scope exited, no external
//!   references) whose data sits in a single arena chunk is moved by
//!   detaching that chunk and attaching it to the destination. No bytes are
//!   copied, the root pointer does not change, and the operation is O(1).
//!   This is the result-only shape: a function computed a fresh value in its
//!   local region and is returning it.
//! * **Iterative graph copy.** A scratch frame holds a visited bitmap over
//!   the source's address hull, a linearly searched remap table, and a
//!   worklist of `(source value, destination slot)` items. Each dequeue
//!   resolves one value: immediates pass through, cross-region references
//!   pass through, seen objects come from the remap table, and new objects
//!   are shallow-copied into the destination with their out-of-line storage
//!   and children queued behind them. Back edges converge because the remap
//!   entry is recorded before any child is processed.
//!
//! The incremental variant drives the same worklist in caller-specified
//! chunks through a [`Session`], reporting fractional progress between
//! chunks.

pub mod bitmap;
pub mod remap;
pub mod worklist;

use memoffset::offset_of;

use self::bitmap::RegionBitmap;
use self::remap::RemapTable;
use self::worklist::Worklist;
use crate::context::MemContext;
use crate::object::layout::*;
use crate::object::{ObjHeader, ObjTag, Value};
use crate::region::scratch::Scratch;
use crate::region::Region;
use crate::util::memory;
use crate::util::Address;

/// The outcome of driving a [`Session`] one chunk further.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    /// Fraction of discovered work processed so far, in `[0, 1)`.
    InProgress(f64),
    /// The relocated root. The session is closed.
    Done(Value),
}

/// A transmigration in flight. Create with [`Session::begin`], drive with
/// [`Session::step`] until it reports [`Progress::Done`], or discard with
/// [`Session::abort`]. While a session is open, other scratch users on this
/// thread must nest inside it (pass the session's frame as the conflict).
pub struct Session {
    src: *mut Region,
    dest: *mut Region,
    frame: Option<Scratch>,
    bitmap: Option<RegionBitmap>,
    remap: RemapTable,
    worklist: Worklist,
    result: Value,
    degraded: bool,
    spliced: bool,
    copied: usize,
}

impl Session {
    /// Open a transmigration of the graph rooted at `root` from `src` to
    /// `dest`. Null source, null destination, identical regions, immediate
    /// roots and roots outside `src` are all no-ops: the session is born
    /// done with the root unchanged.
    pub fn begin(ctx: &mut MemContext, root: Value, src: *mut Region, dest: *mut Region) -> Session {
        let mut session = Session {
            src,
            dest,
            frame: None,
            bitmap: None,
            remap: RemapTable::new(),
            worklist: Worklist::new(),
            result: root,
            degraded: false,
            spliced: false,
            copied: 0,
        };
        if src.is_null() || dest.is_null() || src == dest || !root.is_obj() {
            return session;
        }
        let src_ref = unsafe { &*src };
        if !src_ref.contains(root.obj()) {
            return session;
        }

        if src_ref.splice_eligible() {
            if let Some(chain) = src_ref.detach_single_chunk() {
                unsafe { &*dest }.attach_chunks(chain);
                session.spliced = true;
                debug!(
                    "transmigration splice: region {} -> region {}",
                    src_ref.id(),
                    unsafe { &*dest }.id()
                );
                return session;
            }
        }

        let frame = ctx.scratch_mut().begin(None);
        let (lo, hi) = src_ref
            .address_hull()
            .expect("source contains the root, so it cannot be empty");
        let bitmap = RegionBitmap::create(ctx.scratch_mut(), &frame, lo, hi);
        session.frame = Some(frame);
        match bitmap {
            Some(bitmap) => {
                session.bitmap = Some(bitmap);
                session.result = session.resolve(ctx, root);
            }
            None => {
                warn!(
                    "transmigration bitmap unavailable for region {} (hull too wide or scratch exhausted); shallow root copy only",
                    src_ref.id()
                );
                session.degraded = true;
                session.result = match session.copy_record(ctx, root.obj()) {
                    Some(new) => Value::from_obj(new),
                    None => root,
                };
                session.close(ctx);
            }
        }
        session
    }

    /// Process up to `chunk` worklist items (zero means no limit).
    pub fn step(&mut self, ctx: &mut MemContext, chunk: usize) -> Progress {
        if self.frame.is_none() {
            return Progress::Done(self.result);
        }
        let limit = if chunk == 0 { usize::MAX } else { chunk };
        for _ in 0..limit {
            match self.worklist.pop() {
                Some((src_val, slot)) => {
                    let resolved = self.resolve(ctx, src_val);
                    unsafe { slot.store::<Value>(resolved) };
                }
                None => break,
            }
        }
        if self.worklist.pending() == 0 {
            self.close(ctx);
            return Progress::Done(self.result);
        }
        Progress::InProgress(self.progress())
    }

    /// Abandon an in-flight transmigration, releasing its scratch state. The
    /// destination keeps whatever was already copied (the partial-failure
    /// contract); the caller discards it by discarding the destination
    /// region.
    pub fn abort(mut self, ctx: &mut MemContext) {
        self.close(ctx);
    }

    /// The scratch frame, for callers that need nested scratch while a
    /// session is open (pass it as the conflict).
    pub fn frame(&self) -> Option<&Scratch> {
        self.frame.as_ref()
    }

    /// Objects copied into the destination so far. For an all-or-nothing
    /// caller this must equal the source graph's object count on completion.
    pub fn copied_objects(&self) -> usize {
        self.copied
    }

    /// Did the splice fast path apply?
    pub fn spliced(&self) -> bool {
        self.spliced
    }

    fn progress(&self) -> f64 {
        let processed = self.worklist.processed();
        let total = processed + self.worklist.pending();
        if total == 0 {
            1.0
        } else {
            processed as f64 / total as f64
        }
    }

    fn close(&mut self, ctx: &mut MemContext) {
        self.bitmap = None;
        if let Some(frame) = self.frame.take() {
            ctx.scratch_mut().end(frame);
        }
    }

    /// Turn a source value into its destination form, copying on first
    /// visit. Immediates, nulls and references outside the source region
    /// pass through untouched.
    fn resolve(&mut self, ctx: &mut MemContext, val: Value) -> Value {
        if !val.is_obj() {
            return val;
        }
        let old = val.obj();
        if !unsafe { &*self.src }.contains(old) {
            return val;
        }
        let seen = match self.bitmap.as_mut() {
            Some(bitmap) => bitmap.test_and_set(old),
            None => return val,
        };
        if seen {
            match self.remap.lookup(old) {
                Some(new) => Value::from_obj(new),
                // A remap entry failed to record earlier (scratch OOM); the
                // best effort is the old pointer.
                None => val,
            }
        } else {
            match self.copy_record(ctx, old) {
                Some(new) => {
                    self.record_remap(ctx, old, new);
                    self.copied += 1;
                    Value::from_obj(new)
                }
                None => val,
            }
        }
    }

    fn record_remap(&mut self, ctx: &mut MemContext, old: Address, new: Address) {
        let Session {
            ref mut remap,
            ref frame,
            ..
        } = *self;
        let frame = frame.as_ref().expect("active session");
        if !remap.push(ctx.scratch_mut(), frame, old, new) {
            warn!("transmigration remap table exhausted; shared structure may duplicate");
        }
    }

    fn push_work(&mut self, ctx: &mut MemContext, val: Value, slot: Address) {
        if self.degraded {
            return;
        }
        let Session {
            ref mut worklist,
            ref frame,
            ..
        } = *self;
        let frame = frame.as_ref().expect("active session");
        if !worklist.push(ctx.scratch_mut(), frame, val, slot) {
            // The slot keeps its source pointer; the caller sees the
            // shortfall through the remap count.
            warn!("transmigration worklist exhausted; graph left partially copied");
        }
    }

    /// Shallow-copy one object record into the destination, relocate its
    /// out-of-line storage, and queue its children. This is the visitor the
    /// object layout contract talks about: one clause per tag.
    fn copy_record(&mut self, ctx: &mut MemContext, old: Address) -> Option<Address> {
        let tag = unsafe { old.load::<ObjHeader>() }.tag();
        let size = object_size(tag);
        let dest = unsafe { &*self.dest };
        let new = dest.alloc(size);
        if new.is_zero() {
            return None;
        }
        memory::copy(old, new, size);
        let value_size = std::mem::size_of::<Value>();

        match tag {
            ObjTag::Int | ObjTag::Float | ObjTag::Char | ObjTag::Nothing => {}
            ObjTag::Pair => {
                let car_slot = new + offset_of!(PairObj, car);
                let cdr_slot = new + offset_of!(PairObj, cdr);
                let car = unsafe { car_slot.load::<Value>() };
                let cdr = unsafe { cdr_slot.load::<Value>() };
                self.push_work(ctx, car, car_slot);
                self.push_work(ctx, cdr, cdr_slot);
            }
            ObjTag::Symbol | ObjTag::String | ObjTag::Keyword | ObjTag::Error => {
                let record = unsafe { new.as_mut_ref::<TextObj>() };
                if record.len > 0 {
                    let storage = dest.alloc(record.len);
                    if storage.is_zero() {
                        return Some(new); // bytes left pointing at the source
                    }
                    memory::copy(record.bytes, storage, record.len);
                    record.bytes = storage;
                }
            }
            ObjTag::Box => {
                let slot = new + offset_of!(BoxObj, slot);
                let inner = unsafe { slot.load::<Value>() };
                self.push_work(ctx, inner, slot);
            }
            ObjTag::Closure => {
                let record = unsafe { new.as_mut_ref::<ClosureObj>() };
                let params_slot = new + offset_of!(ClosureObj, params);
                self.push_work(ctx, record.params, params_slot);
                if record.capture_count > 0 {
                    let bytes = record.capture_count * value_size;
                    let storage = dest.alloc(bytes);
                    if storage.is_zero() {
                        return Some(new);
                    }
                    memory::copy(record.captures, storage, bytes);
                    record.captures = storage;
                    for i in 0..record.capture_count {
                        let slot = storage.shift::<Value>(i as isize);
                        let captured = unsafe { slot.load::<Value>() };
                        self.push_work(ctx, captured, slot);
                    }
                }
            }
            ObjTag::Array => {
                let record = unsafe { new.as_mut_ref::<ArrayObj>() };
                if record.cap > 0 {
                    let storage = dest.alloc(record.cap * value_size);
                    if storage.is_zero() {
                        return Some(new);
                    }
                    memory::copy(record.data, storage, record.len * value_size);
                    memory::zero(
                        storage + record.len * value_size,
                        (record.cap - record.len) * value_size,
                    );
                    record.data = storage;
                    for i in 0..record.len {
                        let slot = storage.shift::<Value>(i as isize);
                        let element = unsafe { slot.load::<Value>() };
                        self.push_work(ctx, element, slot);
                    }
                }
            }
            ObjTag::Dict => {
                let record = unsafe { new.as_mut_ref::<DictObj>() };
                if record.cap > 0 {
                    let entry_size = std::mem::size_of::<DictEntry>();
                    let storage = dest.alloc(record.cap * entry_size);
                    if storage.is_zero() {
                        return Some(new);
                    }
                    memory::copy(record.entries, storage, record.len * entry_size);
                    memory::zero(
                        storage + record.len * entry_size,
                        (record.cap - record.len) * entry_size,
                    );
                    record.entries = storage;
                    for i in 0..record.len {
                        let entry = storage.shift::<DictEntry>(i as isize);
                        let key_slot = entry + offset_of!(DictEntry, key);
                        let val_slot = entry + offset_of!(DictEntry, val);
                        let key = unsafe { key_slot.load::<Value>() };
                        let value = unsafe { val_slot.load::<Value>() };
                        self.push_work(ctx, key, key_slot);
                        self.push_work(ctx, value, val_slot);
                    }
                }
            }
            ObjTag::Tuple => {
                let record = unsafe { new.as_mut_ref::<TupleObj>() };
                if record.len > 0 {
                    let storage = dest.alloc(record.len * value_size);
                    if storage.is_zero() {
                        return Some(new);
                    }
                    memory::copy(record.data, storage, record.len * value_size);
                    record.data = storage;
                    for i in 0..record.len {
                        let slot = storage.shift::<Value>(i as isize);
                        let element = unsafe { slot.load::<Value>() };
                        self.push_work(ctx, element, slot);
                    }
                }
            }
            ObjTag::User => {
                let record = unsafe { new.as_mut_ref::<UserObj>() };
                if record.slot_count > 0 {
                    let storage = dest.alloc(record.slot_count * value_size);
                    if storage.is_zero() {
                        return Some(new);
                    }
                    memory::copy(record.slots, storage, record.slot_count * value_size);
                    record.slots = storage;
                    for i in 0..record.slot_count {
                        let slot = storage.shift::<Value>(i as isize);
                        let element = unsafe { slot.load::<Value>() };
                        self.push_work(ctx, element, slot);
                    }
                }
            }
        }
        Some(new)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug_assert!(
            self.frame.is_none(),
            "transmigration session dropped while active; drive it to Done or abort it"
        );
    }
}

/// Move the graph rooted at `root` from `src` to `dest`, returning the
/// relocated root. Splices when eligible; otherwise copies synchronously.
pub fn transmigrate(ctx: &mut MemContext, root: Value, src: *mut Region, dest: *mut Region) -> Value {
    let mut session = Session::begin(ctx, root, src, dest);
    loop {
        if let Progress::Done(result) = session.step(ctx, 0) {
            return result;
        }
    }
}

/// As [`transmigrate`], processing the worklist `chunk` items at a time and
/// writing fractional progress between chunks. Algorithmically identical to
/// the general path; it exists for graphs where peak latency matters. For
/// application-level cancellation between chunks, drive a [`Session`]
/// directly.
pub fn transmigrate_incremental(
    ctx: &mut MemContext,
    root: Value,
    src: *mut Region,
    dest: *mut Region,
    chunk: usize,
    progress: &mut f64,
) -> Value {
    let mut session = Session::begin(ctx, root, src, dest);
    loop {
        match session.step(ctx, chunk) {
            Progress::Done(result) => {
                *progress = 1.0;
                return result;
            }
            Progress::InProgress(fraction) => *progress = fraction,
        }
    }
}
