use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A reference to an object owned outside the array system.
///
/// Object slots in an array each hold one of these. Storing a reference
/// into a slot acquires it, and the slot releases it when it is overwritten
/// or when the memory holding it is freed.
#[derive(Clone)]
pub struct ForeignRef(Arc<dyn Any + Send + Sync>);

impl ForeignRef {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        ForeignRef(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn use_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn ptr_eq(&self, other: &ForeignRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Move a new reference into the slot at `slot`, releasing whatever
    /// reference it held before.
    ///
    /// # Safety
    ///
    /// `slot` must point at a pointer-sized, pointer-aligned object slot
    /// that is either null or was last written by this function.
    pub(crate) unsafe fn store(slot: *mut u8, value: Option<&ForeignRef>) {
        let slot = slot as *mut *mut ForeignRef;
        let old = std::ptr::read_unaligned(slot);
        let new = match value {
            Some(v) => Box::into_raw(Box::new(v.clone())),
            None => std::ptr::null_mut(),
        };
        std::ptr::write_unaligned(slot, new);
        if !old.is_null() {
            drop(Box::from_raw(old));
        }
    }

    /// Read the reference held in an object slot, acquiring a new
    /// reference to it.
    ///
    /// # Safety
    ///
    /// Same requirements as [`ForeignRef::store`].
    pub(crate) unsafe fn load(slot: *const u8) -> Option<ForeignRef> {
        let slot = slot as *const *const ForeignRef;
        let ptr = std::ptr::read_unaligned(slot);
        ptr.as_ref().cloned()
    }
}

impl PartialEq for ForeignRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ForeignRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<object at {:p}>", Arc::as_ptr(&self.0) as *const u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_and_load_manage_references() {
        let obj = ForeignRef::new(String::from("hello"));
        let mut slot = [0u8; 8];
        unsafe {
            ForeignRef::store(slot.as_mut_ptr(), Some(&obj));
            assert_eq!(obj.use_count(), 2);

            let loaded = ForeignRef::load(slot.as_ptr()).unwrap();
            assert!(loaded.ptr_eq(&obj));
            assert_eq!(loaded.downcast_ref::<String>().unwrap(), "hello");
            drop(loaded);

            ForeignRef::store(slot.as_mut_ptr(), None);
        }
        assert_eq!(obj.use_count(), 1);
    }

    #[test]
    fn empty_slot_loads_nothing() {
        let slot = [0u8; 8];
        assert!(unsafe { ForeignRef::load(slot.as_ptr()) }.is_none());
    }
}
