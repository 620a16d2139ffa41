use std::fmt::Debug;
use std::sync::Arc;

use bitflags::bitflags;
use log::{debug, trace};

use super::arrmeta::ArrMeta;
use super::coercion::{load_word, store_word};
use crate::err;
use crate::error::{Error, Result};
use crate::memory::{ForeignRef, MemoryBlock, MAX_ALIGNMENT};
use crate::ndt::{Kind, Type, TypeNode, POINTER_SIZE};

bitflags! {
    /// Access and ownership flags carried by every array.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u8 {
        const READ = 0b001;
        const WRITE = 0b010;
        /// The array was allocated for itself rather than viewing another.
        const OWNS_DATA = 0b100;

        const READWRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// Everything an array handle knows about its data.
#[derive(Debug)]
pub struct ArrayPreamble {
    pub(crate) data: *mut u8,
    pub(crate) tp: Type,
    pub(crate) meta: ArrMeta,
    pub(crate) owner: MemoryBlock,
    pub(crate) flags: Flags,
}

// The data pointer always points into `owner` (or a block referenced from
// `meta`), which is kept alive by the preamble itself.
unsafe impl Send for ArrayPreamble {}
unsafe impl Sync for ArrayPreamble {}

/// Array
///
/// A multidimensional array value: a data pointer interpreted through a
/// [`Type`] and its [`ArrMeta`], kept valid by a reference to the
/// [`MemoryBlock`] holding the bytes. Cloning an `Array` makes another
/// handle to the same array. Views and projections make new arrays that
/// alias the same memory.
///
/// The default `Array` is the null array, which has no type and no data.
///
#[derive(Clone, Default)]
pub struct Array(Option<Arc<ArrayPreamble>>);

impl Array {
    pub fn null() -> Array {
        Array(None)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    pub(crate) fn from_preamble(preamble: ArrayPreamble) -> Array {
        debug_assert!(
            preamble.meta.matches(&preamble.tp),
            "arrmeta does not match type {}",
            preamble.tp
        );
        Array(Some(Arc::new(preamble)))
    }

    /// Access the preamble, failing with an attribute error naming `attr`
    /// when the array is null.
    pub(crate) fn preamble(&self, attr: &'static str) -> Result<&ArrayPreamble> {
        self.0.as_deref().ok_or(Error::NullHandle(attr))
    }

    /// Allocate a zero-filled array of type `tp`.
    ///
    /// ```
    /// use ndview::array::Array;
    ///
    /// let a = Array::allocate(&"3 * 4 * int32".parse().unwrap()).unwrap();
    /// assert_eq!(a.shape().unwrap(), vec![3, 4]);
    /// assert_eq!(a.strides().unwrap(), vec![16, 4]);
    /// ```
    ///
    pub fn allocate(tp: &Type) -> Result<Array> {
        if !objects_are_inline(tp) {
            return err!(format!(
                "object slots inside variable-sized data are not supported: {tp}"
            ));
        }

        let payload = tp.needs_payload().then(MemoryBlock::arena);
        let meta = ArrMeta::default_construct(tp, payload.as_ref())?;

        let size = tp.data_size()?;
        let align = tp.data_alignment().min(MAX_ALIGNMENT);
        let owner = if tp.has_objects() {
            let (ftp, fmeta) = (tp.clone(), meta.clone());
            MemoryBlock::heap_with_finalizer(
                size,
                align,
                Box::new(move |data| release_objects(&ftp, &fmeta, data)),
            )?
        } else {
            MemoryBlock::heap(size, align)?
        };

        trace!(
            "allocated array of type {tp} ({size} bytes data, {} bytes arrmeta)",
            tp.arrmeta_size()
        );

        Ok(Array::from_preamble(ArrayPreamble {
            data: owner.data(),
            tp: tp.clone(),
            meta,
            owner,
            flags: Flags::READWRITE | Flags::OWNS_DATA,
        }))
    }

    /// View a buffer owned elsewhere as an array of type `tp`.
    pub fn from_external(block: MemoryBlock, tp: &Type, writable: bool) -> Result<Array> {
        if tp.needs_payload() || tp.has_objects() {
            return err!(format!("type {tp} cannot be viewed over an external buffer"));
        }
        let size = tp.data_size()?;
        if block.len() < size {
            return err!(format!(
                "external buffer of {} bytes is too small for type {tp} ({size} bytes)",
                block.len()
            ));
        }
        let meta = ArrMeta::default_construct(tp, None)?;
        let flags = if writable {
            Flags::READWRITE
        } else {
            Flags::READ
        };
        Ok(Array::from_preamble(ArrayPreamble {
            data: block.data(),
            tp: tp.clone(),
            meta,
            owner: block,
            flags,
        }))
    }

    /// A zero-dimensional array holding one reference to a foreign object.
    pub fn wrap_foreign_object(obj: &ForeignRef) -> Result<Array> {
        let a = Array::allocate(&Type::object())?;
        let p = a.preamble("data")?;
        unsafe { ForeignRef::store(p.data, Some(obj)) };
        Ok(a)
    }

    /// A zero-dimensional `pointer[T]` array pointing at `target`'s data.
    pub fn pointer_to(target: &Array) -> Result<Array> {
        let p = target.preamble("data")?;
        let owner = MemoryBlock::heap(POINTER_SIZE, POINTER_SIZE)?;
        unsafe { store_word(owner.data(), p.data as usize) };
        debug!("pointer to array of type {}", p.tp);
        Ok(Array::from_preamble(ArrayPreamble {
            data: owner.data(),
            tp: Type::pointer(p.tp.clone()),
            meta: ArrMeta::Pointer {
                blockref: Some(p.owner.acquire()),
                offset: 0,
                target: Box::new(p.meta.clone()),
            },
            owner,
            flags: p.flags | Flags::OWNS_DATA,
        }))
    }

    pub fn get_type(&self) -> Result<&Type> {
        Ok(&self.preamble("type")?.tp)
    }

    pub fn arrmeta(&self) -> Result<&ArrMeta> {
        Ok(&self.preamble("arrmeta")?.meta)
    }

    pub fn ndim(&self) -> Result<usize> {
        Ok(self.preamble("ndim")?.tp.ndim())
    }

    pub fn flags(&self) -> Result<Flags> {
        Ok(self.preamble("flags")?.flags)
    }

    pub fn is_writable(&self) -> Result<bool> {
        Ok(self.preamble("flags")?.flags.contains(Flags::WRITE))
    }

    pub fn data_ptr(&self) -> Result<*const u8> {
        Ok(self.preamble("data")?.data)
    }

    /// The memory block keeping this array's bytes alive.
    pub fn owner(&self) -> Result<&MemoryBlock> {
        Ok(&self.preamble("owner")?.owner)
    }

    /// Dimension sizes, outermost first.
    ///
    /// A var dimension reports its size when it is the outermost dimension
    /// (the data pointer locates it), and `-1` when nested.
    pub fn shape(&self) -> Result<Vec<isize>> {
        let p = self.preamble("shape")?;
        let mut shape = Vec::with_capacity(p.tp.ndim());
        let (mut tp, mut meta, mut data) = (&p.tp, &p.meta, Some(p.data as *const u8));

        loop {
            match (tp.node(), meta) {
                (TypeNode::FixedDim { size, element }, ArrMeta::FixedDim { element: em, .. }) => {
                    shape.push(*size as isize);
                    (tp, meta) = (element, &**em);
                    data = data.filter(|_| *size == 1);
                }
                (TypeNode::VarDim { element }, ArrMeta::VarDim { element: em, .. }) => {
                    let size = data.map(|d| unsafe { load_word(d.add(POINTER_SIZE)) });
                    shape.push(size.map_or(-1, |s| s as isize));
                    (tp, meta, data) = (element, &**em, None);
                }
                (TypeNode::Pointer { target }, ArrMeta::Pointer { target: tm, offset, .. })
                    if target.ndim() > 0 =>
                {
                    data = data.and_then(|d| {
                        let addr = unsafe { load_word(d) };
                        (addr != 0).then(|| (addr as isize + offset) as *const u8)
                    });
                    (tp, meta) = (target, &**tm);
                }
                _ => return Ok(shape),
            }
        }
    }

    /// Byte strides, outermost first. Var dimensions report the stride
    /// between elements of their payload.
    pub fn strides(&self) -> Result<Vec<isize>> {
        let p = self.preamble("strides")?;
        let mut strides = Vec::with_capacity(p.tp.ndim());
        let (mut tp, mut meta) = (&p.tp, &p.meta);
        loop {
            match (tp.node(), meta) {
                (TypeNode::FixedDim { element, .. }, ArrMeta::FixedDim { stride, element: em })
                | (TypeNode::VarDim { element }, ArrMeta::VarDim { stride, element: em, .. }) => {
                    strides.push(*stride);
                    (tp, meta) = (element, &**em);
                }
                (TypeNode::Pointer { target }, ArrMeta::Pointer { target: tm, .. })
                    if target.ndim() > 0 =>
                {
                    (tp, meta) = (target, &**tm);
                }
                _ => return Ok(strides),
            }
        }
    }

    /// A view of the same data without write access.
    pub fn readonly(&self) -> Result<Array> {
        let p = self.preamble("flags")?;
        Ok(Array::from_preamble(ArrayPreamble {
            data: p.data,
            tp: p.tp.clone(),
            meta: p.meta.clone(),
            owner: p.owner.acquire(),
            flags: p.flags - Flags::WRITE - Flags::OWNS_DATA,
        }))
    }

    /// Whether two arrays are handles to the same array.
    pub fn ptr_eq(&self, other: &Array) -> bool {
        match (&self.0, &other.0) {
            (Some(l), Some(r)) => Arc::ptr_eq(l, r),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Debug for Array {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            None => write!(f, "Array(null)"),
            Some(p) => f
                .debug_struct("Array")
                .field("type", &p.tp)
                .field("data", &p.data)
                .field("flags", &p.flags)
                .field("owner", &p.owner)
                .finish(),
        }
    }
}

/// Object slots are only released by the heap block that holds them, so
/// they may not live inside var dimension or pointer payloads.
fn objects_are_inline(tp: &Type) -> bool {
    match tp.node() {
        TypeNode::VarDim { element } => !element.has_objects(),
        TypeNode::Pointer { target } => !target.has_objects(),
        TypeNode::FixedDim { element, .. } => objects_are_inline(element),
        TypeNode::Struct(st) => st.types().iter().all(objects_are_inline),
        _ => true,
    }
}

fn release_objects(tp: &Type, meta: &ArrMeta, data: *mut u8) {
    match (tp.node(), meta) {
        (TypeNode::Object, _) => unsafe { ForeignRef::store(data, None) },
        (TypeNode::FixedDim { size, element }, ArrMeta::FixedDim { stride, element: em }) => {
            for i in 0..*size {
                release_objects(element, em, data.wrapping_offset(i as isize * stride));
            }
        }
        (TypeNode::Struct(st), ArrMeta::Struct { data_offsets, fields }) => {
            for ((ftp, fmeta), offset) in st.types().iter().zip(fields).zip(data_offsets) {
                release_objects(ftp, fmeta, data.wrapping_add(*offset));
            }
        }
        _ => (),
    }
}

/// Fail with the actual kind unless `tp` has kind `expected`.
pub(crate) fn expect_kind(tp: &Type, expected: Kind) -> Result<()> {
    if tp.kind() == expected {
        Ok(())
    } else {
        Err(Error::UnsupportedKind {
            expected,
            actual: tp.clone(),
        })
    }
}
