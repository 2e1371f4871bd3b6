//! Fat pointers that keep their region alive.

use super::Region;
use crate::util::Address;

/// A `(object, region)` pair. Constructing or cloning one retains the
/// region's external reference count; dropping releases it. The object
/// address is borrowed from the region and is valid exactly as long as some
/// retain, tether or live scope covers the region — which the holder of this
/// value guarantees by holding it.
#[derive(Debug)]
pub struct RegionRef {
    object: Address,
    region: *mut Region,
}

// The liveness word is atomic; the object address is only dereferenced by
// callers who synchronize object access themselves (see the concurrency
// contract on `Region`).
unsafe impl Send for RegionRef {}
unsafe impl Sync for RegionRef {}

impl RegionRef {
    /// Construct a reference to `object` inside `region`, retaining the
    /// region.
    pub fn new(object: Address, region: *mut Region) -> RegionRef {
        debug_assert!(!region.is_null());
        Region::retain(region);
        RegionRef { object, region }
    }

    pub fn object(&self) -> Address {
        self.object
    }

    pub fn region(&self) -> *mut Region {
        self.region
    }

    /// Replace the object address, keeping the same region retained. Used
    /// when transmigration relocates the root inside the same handle.
    pub fn with_object(&self, object: Address) -> RegionRef {
        RegionRef::new(object, self.region)
    }
}

impl Clone for RegionRef {
    fn clone(&self) -> Self {
        Region::retain(self.region);
        RegionRef {
            object: self.object,
            region: self.region,
        }
    }
}

impl Drop for RegionRef {
    fn drop(&mut self) {
        Region::release(self.region);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::options::Options;

    fn create() -> *mut Region {
        let options = Options::new();
        Region::create(*options.arena_growth, *options.small_object_threshold)
    }

    #[test]
    fn refs_balance_the_counter() {
        let r = create();
        let region = unsafe { &*r };
        let obj = region.alloc(16);
        let a = RegionRef::new(obj, r);
        assert_eq!(region.external_rc(), 1);
        let b = a.clone();
        let c = RegionRef::new(obj, r);
        assert_eq!(region.external_rc(), 3);
        drop(a);
        drop(b);
        drop(c);
        assert_eq!(region.external_rc(), 0);
        Region::exit(r);
    }

    #[test]
    fn last_release_after_exit_destroys() {
        let r = create();
        let obj = unsafe { &*r }.alloc(16);
        unsafe { obj.store::<u64>(11) };
        let handle = RegionRef::new(obj, r);
        Region::exit(r);
        // Draining: the handle still pins the storage.
        assert_eq!(unsafe { handle.object().load::<u64>() }, 11);
        drop(handle); // destroys the region
    }
}
