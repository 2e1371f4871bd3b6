//! omnimem is the memory substrate of the OmniLisp native compiler: a
//! unified region-based manager with reference-counted region control
//! blocks, a static escape/shape/liveness pipeline that drives the
//! allocator, and deterministic cycle reclamation through Component-Level
//! Scope Tethering.
//!
//! Logically, this crate includes these major parts:
//! * Memory resources: chunked bump [arenas](util/heap/arena/struct.Arena.html)
//!   with snapshot/rewind/trim and O(1) chunk splicing.
//! * [Regions](region/struct.Region.html): logical owners of an arena plus an
//!   inline small-object buffer, with a packed liveness word
//!   (scope flag, external references, tethers) and deterministic
//!   destruction; [RegionRef](region/region_ref/struct.RegionRef.html) fat
//!   pointers retain their region; [scratch](region/scratch/index.html)
//!   frames and the [tether cache](region/tether/index.html) are the
//!   thread-local fast paths.
//! * The [transmigration engine](transmigrate/index.html): moving object
//!   graphs between regions with cycle preservation, an O(1) region-splice
//!   fast path, and an incremental chunked variant.
//! * [Components](component/index.html): strongly connected islands
//!   reclaimed as units through union-find headers, handle/tether counts and
//!   lazy dismantling.
//! * The [analysis pipeline](analysis/index.html): escape, shape and
//!   liveness passes producing per-site allocation directives.
//! * The [object model](object/index.html) and the
//!   [API surface](memory_manager/index.html) the code generator calls.
//!
//! The surface language, evaluator, macro and type systems live elsewhere
//! and consume this crate through [`memory_manager`].

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate static_assertions;

pub mod analysis;
pub mod component;
pub mod context;
pub mod memory_manager;
pub mod object;
pub mod region;
pub mod transmigrate;
pub mod util;

pub use crate::context::{with_context, MemContext};
pub use crate::object::{ObjTag, Value};
pub use crate::region::region_ref::RegionRef;
pub use crate::region::{Region, RegionStats};
pub use crate::util::address::Address;

// The packed counter words assume 64-bit atomics and 8-byte-alignable
// object words.
const_assert!(std::mem::size_of::<usize>() >= 4);
const_assert_eq!(crate::util::constants::INLINE_BUFFER_SIZE % 8, 0);
