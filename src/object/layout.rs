//! Heap object layouts and the region-allocating constructors the codegen
//! emits calls to.
//!
//! Every object starts with an [`ObjHeader`]; the record shape per tag is
//! fixed and `#[repr(C)]`, so the transmigration visitor can shallow-copy a
//! record by its tag's size and then fix up the out-of-line storage.
//! Out-of-line storage (text bytes, element arrays) always lives in the same
//! region as the record.

use super::tag::{ObjHeader, ObjTag};
use super::value::Value;
use crate::region::Region;
use crate::util::memory;
use crate::util::Address;

#[repr(C)]
pub struct IntObj {
    pub header: ObjHeader,
    pub value: i64,
}

#[repr(C)]
pub struct FloatObj {
    pub header: ObjHeader,
    pub value: f64,
}

#[repr(C)]
pub struct CharObj {
    pub header: ObjHeader,
    pub value: char,
}

#[repr(C)]
pub struct NothingObj {
    pub header: ObjHeader,
}

#[repr(C)]
pub struct PairObj {
    pub header: ObjHeader,
    pub car: Value,
    pub cdr: Value,
}

/// Symbol, string, keyword and error records share this layout; the tag
/// tells them apart.
#[repr(C)]
pub struct TextObj {
    pub header: ObjHeader,
    pub len: usize,
    /// `len` bytes in the owning region. Zero address when `len == 0`.
    pub bytes: Address,
}

#[repr(C)]
pub struct BoxObj {
    pub header: ObjHeader,
    pub slot: Value,
}

#[repr(C)]
pub struct ClosureObj {
    pub header: ObjHeader,
    /// Opaque code pointer; passes through transmigration untouched.
    pub body: Address,
    /// The parameter list (a pair chain of symbols).
    pub params: Value,
    pub capture_count: usize,
    /// `capture_count` captured values in the owning region.
    pub captures: Address,
}

#[repr(C)]
pub struct ArrayObj {
    pub header: ObjHeader,
    pub len: usize,
    pub cap: usize,
    /// `cap` value slots in the owning region.
    pub data: Address,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct DictEntry {
    pub key: Value,
    pub val: Value,
}

#[repr(C)]
pub struct DictObj {
    pub header: ObjHeader,
    pub len: usize,
    pub cap: usize,
    /// `cap` entry slots in the owning region.
    pub entries: Address,
}

#[repr(C)]
pub struct TupleObj {
    pub header: ObjHeader,
    pub len: usize,
    /// `len` value slots in the owning region.
    pub data: Address,
}

#[repr(C)]
pub struct UserObj {
    pub header: ObjHeader,
    pub type_id: u32,
    pub slot_count: usize,
    /// `slot_count` value slots in the owning region.
    pub slots: Address,
}

/// The record size for a tag, for shallow copies.
pub fn object_size(tag: ObjTag) -> usize {
    use std::mem::size_of;
    match tag {
        ObjTag::Int => size_of::<IntObj>(),
        ObjTag::Float => size_of::<FloatObj>(),
        ObjTag::Char => size_of::<CharObj>(),
        ObjTag::Nothing => size_of::<NothingObj>(),
        ObjTag::Pair => size_of::<PairObj>(),
        ObjTag::Symbol | ObjTag::String | ObjTag::Keyword | ObjTag::Error => size_of::<TextObj>(),
        ObjTag::Box => size_of::<BoxObj>(),
        ObjTag::Closure => size_of::<ClosureObj>(),
        ObjTag::Array => size_of::<ArrayObj>(),
        ObjTag::Dict => size_of::<DictObj>(),
        ObjTag::Tuple => size_of::<TupleObj>(),
        ObjTag::User => size_of::<UserObj>(),
    }
}

fn alloc_record<T>(region: &Region, tag: ObjTag) -> *mut T {
    let addr = region.alloc(std::mem::size_of::<T>());
    if addr.is_zero() {
        return std::ptr::null_mut();
    }
    unsafe { addr.store(ObjHeader::new(tag)) };
    addr.to_mut_ptr::<T>()
}

fn alloc_value_slots(region: &Region, count: usize) -> Address {
    if count == 0 {
        return Address::ZERO;
    }
    let addr = region.alloc(count * std::mem::size_of::<Value>());
    if !addr.is_zero() {
        memory::zero(addr, count * std::mem::size_of::<Value>());
    }
    addr
}

/// Allocate a boxed integer in `region`. Returns `Value::NULL` on OOM.
pub fn mk_int_region(region: &Region, i: i64) -> Value {
    let obj = alloc_record::<IntObj>(region, ObjTag::Int);
    if obj.is_null() {
        return Value::NULL;
    }
    unsafe { (*obj).value = i };
    Value::from_obj(Address::from_mut_ptr(obj))
}

/// Allocate a float in `region`.
pub fn mk_float_region(region: &Region, f: f64) -> Value {
    let obj = alloc_record::<FloatObj>(region, ObjTag::Float);
    if obj.is_null() {
        return Value::NULL;
    }
    unsafe { (*obj).value = f };
    Value::from_obj(Address::from_mut_ptr(obj))
}

/// Allocate a character in `region`.
pub fn mk_char_region(region: &Region, c: char) -> Value {
    let obj = alloc_record::<CharObj>(region, ObjTag::Char);
    if obj.is_null() {
        return Value::NULL;
    }
    unsafe { (*obj).value = c };
    Value::from_obj(Address::from_mut_ptr(obj))
}

/// Allocate a boxed "nothing" in `region`. (The immediate
/// [`Value::NOTHING`] is normally preferred; boxed nothings appear where the
/// codegen needs an addressable cell.)
pub fn mk_nothing_region(region: &Region) -> Value {
    let obj = alloc_record::<NothingObj>(region, ObjTag::Nothing);
    if obj.is_null() {
        return Value::NULL;
    }
    Value::from_obj(Address::from_mut_ptr(obj))
}

/// Allocate a pair in `region`.
pub fn mk_pair_region(region: &Region, car: Value, cdr: Value) -> Value {
    let obj = alloc_record::<PairObj>(region, ObjTag::Pair);
    if obj.is_null() {
        return Value::NULL;
    }
    unsafe {
        (*obj).car = car;
        (*obj).cdr = cdr;
    }
    Value::from_obj(Address::from_mut_ptr(obj))
}

fn mk_text(region: &Region, tag: ObjTag, text: &str) -> Value {
    debug_assert!(tag.has_text());
    let obj = alloc_record::<TextObj>(region, tag);
    if obj.is_null() {
        return Value::NULL;
    }
    let bytes = if text.is_empty() {
        Address::ZERO
    } else {
        let storage = region.alloc(text.len());
        if storage.is_zero() {
            return Value::NULL;
        }
        memory::copy(Address::from_ptr(text.as_ptr()), storage, text.len());
        storage
    };
    unsafe {
        (*obj).len = text.len();
        (*obj).bytes = bytes;
    }
    Value::from_obj(Address::from_mut_ptr(obj))
}

/// Allocate a symbol in `region`, copying the name bytes into the region.
pub fn mk_sym_region(region: &Region, name: &str) -> Value {
    mk_text(region, ObjTag::Symbol, name)
}

/// Allocate a string in `region`.
pub fn mk_string_region(region: &Region, text: &str) -> Value {
    mk_text(region, ObjTag::String, text)
}

/// Allocate a keyword in `region`.
pub fn mk_keyword_region(region: &Region, name: &str) -> Value {
    mk_text(region, ObjTag::Keyword, name)
}

/// Allocate an error value in `region`.
pub fn mk_error_region(region: &Region, message: &str) -> Value {
    mk_text(region, ObjTag::Error, message)
}

/// Read the text payload of a symbol/string/keyword/error. The slice
/// borrows region storage: it is valid exactly as long as the owning region
/// is, which the caller guarantees the way it does for every object access.
pub fn text_of(value: Value) -> &'static str {
    debug_assert!(matches!(value.tag(), Some(t) if t.has_text()));
    let obj = unsafe { value.obj().as_ref::<TextObj>() };
    if obj.len == 0 {
        return "";
    }
    unsafe {
        std::str::from_utf8_unchecked(std::slice::from_raw_parts(
            obj.bytes.to_ptr::<u8>(),
            obj.len,
        ))
    }
}

/// Allocate a box cell in `region`.
pub fn mk_box_region(region: &Region, inner: Value) -> Value {
    let obj = alloc_record::<BoxObj>(region, ObjTag::Box);
    if obj.is_null() {
        return Value::NULL;
    }
    unsafe { (*obj).slot = inner };
    Value::from_obj(Address::from_mut_ptr(obj))
}

/// Allocate an array with room for `capacity` elements in `region`.
pub fn mk_array_region(region: &Region, capacity: usize) -> Value {
    let obj = alloc_record::<ArrayObj>(region, ObjTag::Array);
    if obj.is_null() {
        return Value::NULL;
    }
    let data = alloc_value_slots(region, capacity);
    if capacity > 0 && data.is_zero() {
        return Value::NULL;
    }
    unsafe {
        (*obj).len = 0;
        (*obj).cap = capacity;
        (*obj).data = data;
    }
    Value::from_obj(Address::from_mut_ptr(obj))
}

/// Append to an array, growing its storage (doubling, within `region`) when
/// full. Returns false on OOM.
pub fn array_push(region: &Region, array: Value, item: Value) -> bool {
    debug_assert_eq!(array.tag(), Some(ObjTag::Array));
    let obj = unsafe { array.obj().as_mut_ref::<ArrayObj>() };
    if obj.len == obj.cap {
        let new_cap = std::cmp::max(obj.cap * 2, 4);
        let new_data = alloc_value_slots(region, new_cap);
        if new_data.is_zero() {
            return false;
        }
        if obj.len > 0 {
            memory::copy(obj.data, new_data, obj.len * std::mem::size_of::<Value>());
        }
        // The old storage stays behind in the region; bump storage has no
        // per-object free.
        obj.data = new_data;
        obj.cap = new_cap;
    }
    unsafe {
        obj.data
            .shift::<Value>(obj.len as isize)
            .store::<Value>(item)
    };
    obj.len += 1;
    true
}

/// Read an array element.
pub fn array_get(array: Value, index: usize) -> Value {
    debug_assert_eq!(array.tag(), Some(ObjTag::Array));
    let obj = unsafe { array.obj().as_ref::<ArrayObj>() };
    debug_assert!(index < obj.len);
    unsafe { obj.data.shift::<Value>(index as isize).load::<Value>() }
}

/// Allocate an empty dict in `region`.
pub fn mk_dict_region(region: &Region) -> Value {
    let obj = alloc_record::<DictObj>(region, ObjTag::Dict);
    if obj.is_null() {
        return Value::NULL;
    }
    unsafe {
        (*obj).len = 0;
        (*obj).cap = 0;
        (*obj).entries = Address::ZERO;
    }
    Value::from_obj(Address::from_mut_ptr(obj))
}

fn dict_entries(obj: &DictObj) -> &[DictEntry] {
    if obj.len == 0 {
        return &[];
    }
    unsafe { std::slice::from_raw_parts(obj.entries.to_ptr::<DictEntry>(), obj.len) }
}

/// Insert or update a key. Keys compare by value word (fixnums and other
/// immediates by encoding, objects by identity). Returns false on OOM.
pub fn dict_insert(region: &Region, dict: Value, key: Value, val: Value) -> bool {
    debug_assert_eq!(dict.tag(), Some(ObjTag::Dict));
    let obj = unsafe { dict.obj().as_mut_ref::<DictObj>() };
    for i in 0..obj.len {
        let entry = unsafe { obj.entries.shift::<DictEntry>(i as isize).as_mut_ref::<DictEntry>() };
        if entry.key == key {
            entry.val = val;
            return true;
        }
    }
    if obj.len == obj.cap {
        let new_cap = std::cmp::max(obj.cap * 2, 8);
        let new_entries = region.alloc(new_cap * std::mem::size_of::<DictEntry>());
        if new_entries.is_zero() {
            return false;
        }
        if obj.len > 0 {
            memory::copy(
                obj.entries,
                new_entries,
                obj.len * std::mem::size_of::<DictEntry>(),
            );
        }
        obj.entries = new_entries;
        obj.cap = new_cap;
    }
    unsafe {
        obj.entries
            .shift::<DictEntry>(obj.len as isize)
            .store(DictEntry { key, val })
    };
    obj.len += 1;
    true
}

/// Look up a key.
pub fn dict_get(dict: Value, key: Value) -> Option<Value> {
    debug_assert_eq!(dict.tag(), Some(ObjTag::Dict));
    let obj = unsafe { dict.obj().as_ref::<DictObj>() };
    dict_entries(obj)
        .iter()
        .find(|e| e.key == key)
        .map(|e| e.val)
}

/// Allocate a tuple holding `items` in `region`.
pub fn mk_tuple_region(region: &Region, items: &[Value]) -> Value {
    let obj = alloc_record::<TupleObj>(region, ObjTag::Tuple);
    if obj.is_null() {
        return Value::NULL;
    }
    let data = alloc_value_slots(region, items.len());
    if !items.is_empty() {
        if data.is_zero() {
            return Value::NULL;
        }
        memory::copy(
            Address::from_ptr(items.as_ptr()),
            data,
            items.len() * std::mem::size_of::<Value>(),
        );
    }
    unsafe {
        (*obj).len = items.len();
        (*obj).data = data;
    }
    Value::from_obj(Address::from_mut_ptr(obj))
}

/// Read a tuple element.
pub fn tuple_get(tuple: Value, index: usize) -> Value {
    debug_assert_eq!(tuple.tag(), Some(ObjTag::Tuple));
    let obj = unsafe { tuple.obj().as_ref::<TupleObj>() };
    debug_assert!(index < obj.len);
    unsafe { obj.data.shift::<Value>(index as isize).load::<Value>() }
}

/// Allocate a closure in `region`: `body` is the opaque code pointer,
/// `params` the parameter list, `captures` the captured environment values
/// (copied into the region).
pub fn mk_closure_region(
    region: &Region,
    params: Value,
    body: Address,
    captures: &[Value],
) -> Value {
    let obj = alloc_record::<ClosureObj>(region, ObjTag::Closure);
    if obj.is_null() {
        return Value::NULL;
    }
    let storage = alloc_value_slots(region, captures.len());
    if !captures.is_empty() {
        if storage.is_zero() {
            return Value::NULL;
        }
        memory::copy(
            Address::from_ptr(captures.as_ptr()),
            storage,
            captures.len() * std::mem::size_of::<Value>(),
        );
    }
    unsafe {
        (*obj).body = body;
        (*obj).params = params;
        (*obj).capture_count = captures.len();
        (*obj).captures = storage;
    }
    Value::from_obj(Address::from_mut_ptr(obj))
}

/// Read a captured value from a closure.
pub fn closure_capture(closure: Value, index: usize) -> Value {
    debug_assert_eq!(closure.tag(), Some(ObjTag::Closure));
    let obj = unsafe { closure.obj().as_ref::<ClosureObj>() };
    debug_assert!(index < obj.capture_count);
    unsafe { obj.captures.shift::<Value>(index as isize).load::<Value>() }
}

/// Allocate a user-type record with the given slots in `region`.
pub fn mk_user_region(region: &Region, type_id: u32, slots: &[Value]) -> Value {
    let obj = alloc_record::<UserObj>(region, ObjTag::User);
    if obj.is_null() {
        return Value::NULL;
    }
    let storage = alloc_value_slots(region, slots.len());
    if !slots.is_empty() {
        if storage.is_zero() {
            return Value::NULL;
        }
        memory::copy(
            Address::from_ptr(slots.as_ptr()),
            storage,
            slots.len() * std::mem::size_of::<Value>(),
        );
    }
    unsafe {
        (*obj).type_id = type_id;
        (*obj).slot_count = slots.len();
        (*obj).slots = storage;
    }
    Value::from_obj(Address::from_mut_ptr(obj))
}

/// Accessors for pairs, shared by the engine and tests.
pub fn pair_car(pair: Value) -> Value {
    debug_assert_eq!(pair.tag(), Some(ObjTag::Pair));
    unsafe { pair.obj().as_ref::<PairObj>() }.car
}

pub fn pair_cdr(pair: Value) -> Value {
    debug_assert_eq!(pair.tag(), Some(ObjTag::Pair));
    unsafe { pair.obj().as_ref::<PairObj>() }.cdr
}

/// The boxed integer payload.
pub fn int_value(value: Value) -> i64 {
    debug_assert_eq!(value.tag(), Some(ObjTag::Int));
    unsafe { value.obj().as_ref::<IntObj>() }.value
}

/// The boxed float payload.
pub fn float_value(value: Value) -> f64 {
    debug_assert_eq!(value.tag(), Some(ObjTag::Float));
    unsafe { value.obj().as_ref::<FloatObj>() }.value
}
