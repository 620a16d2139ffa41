use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;

use super::kind::{Kind, ScalarType};
use crate::error::{Error, Result};

/// Size of a pointer-sized slot (pointers, object references, offsets).
pub const POINTER_SIZE: usize = std::mem::size_of::<usize>();

/// Type Descriptor
///
/// An immutable tree describing the dimensions, element type and field
/// layout of an array. Cloning a `Type` shares the tree; operations that
/// change a type always build new nodes, so one descriptor can safely back
/// any number of arrays.
///
#[derive(Clone, PartialEq, Eq)]
pub struct Type(Arc<TypeNode>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeNode {
    Scalar(ScalarType),
    FixedString(usize),
    String,
    FixedBytes { size: usize, align: usize },
    Bytes,
    Object,
    FixedDim { size: usize, element: Type },
    VarDim { element: Type },
    Pointer { target: Type },
    Struct(StructType),
}

/// Ordered `(name, type)` pairs with unique names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructType {
    names: Vec<String>,
    types: Vec<Type>,
    index: HashMap<String, usize>,
}

impl StructType {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn types(&self) -> &[Type] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn field_type(&self, i: usize) -> Option<&Type> {
        self.types.get(i)
    }

    /// Byte offsets of each field in the default layout, along with the
    /// total size of the struct (padded to its alignment).
    pub fn default_data_offsets(&self) -> Result<(Vec<usize>, usize)> {
        let mut offsets = Vec::with_capacity(self.types.len());
        let mut offset = 0usize;
        for tp in &self.types {
            offset = align_up(offset, tp.data_alignment()).ok_or(Error::AllocationFailed(None))?;
            offsets.push(offset);
            offset = offset
                .checked_add(tp.data_size()?)
                .ok_or(Error::AllocationFailed(None))?;
        }
        let size = align_up(offset, self.alignment()).ok_or(Error::AllocationFailed(None))?;
        Ok((offsets, size))
    }

    fn alignment(&self) -> usize {
        self.types
            .iter()
            .map(|t| t.data_alignment())
            .max()
            .unwrap_or(1)
    }
}

pub(crate) fn align_up(offset: usize, align: usize) -> Option<usize> {
    let align = align.max(1);
    offset.div_ceil(align).checked_mul(align)
}

impl Type {
    fn new(node: TypeNode) -> Type {
        Type(Arc::new(node))
    }

    pub fn node(&self) -> &TypeNode {
        &self.0
    }

    pub fn scalar(st: ScalarType) -> Type {
        Type::new(TypeNode::Scalar(st))
    }

    pub fn bool() -> Type {
        Type::scalar(ScalarType::Bool)
    }

    pub fn int32() -> Type {
        Type::scalar(ScalarType::Int32)
    }

    pub fn int64() -> Type {
        Type::scalar(ScalarType::Int64)
    }

    pub fn uint64() -> Type {
        Type::scalar(ScalarType::UInt64)
    }

    pub fn float32() -> Type {
        Type::scalar(ScalarType::Float32)
    }

    pub fn float64() -> Type {
        Type::scalar(ScalarType::Float64)
    }

    pub fn string() -> Type {
        Type::new(TypeNode::String)
    }

    pub fn fixed_string(size: usize) -> Type {
        Type::new(TypeNode::FixedString(size))
    }

    pub fn bytes() -> Type {
        Type::new(TypeNode::Bytes)
    }

    pub fn fixed_bytes(size: usize, align: usize) -> Type {
        Type::new(TypeNode::FixedBytes { size, align })
    }

    pub fn object() -> Type {
        Type::new(TypeNode::Object)
    }

    pub fn fixed_dim(size: usize, element: Type) -> Type {
        Type::new(TypeNode::FixedDim { size, element })
    }

    /// Wrap `element` in one fixed dimension per entry of `shape`, outermost
    /// first.
    pub fn fixed_dims(shape: &[usize], element: Type) -> Type {
        shape
            .iter()
            .rev()
            .fold(element, |el, &size| Type::fixed_dim(size, el))
    }

    pub fn var_dim(element: Type) -> Type {
        Type::new(TypeNode::VarDim { element })
    }

    pub fn pointer(target: Type) -> Type {
        Type::new(TypeNode::Pointer { target })
    }

    /// Build a struct type from ordered fields. Field names must be unique.
    pub fn make_struct<S>(fields: Vec<(S, Type)>) -> Result<Type>
    where
        S: Into<String>,
    {
        let mut names = Vec::with_capacity(fields.len());
        let mut types = Vec::with_capacity(fields.len());
        let mut index = HashMap::with_capacity(fields.len());
        for (i, (name, tp)) in fields.into_iter().enumerate() {
            let name: String = name.into();
            if index.insert(name.clone(), i).is_some() {
                return Err(Error::DuplicateField(name));
            }
            names.push(name);
            types.push(tp);
        }
        Ok(Type::new(TypeNode::Struct(StructType {
            names,
            types,
            index,
        })))
    }

    pub fn kind(&self) -> Kind {
        match self.node() {
            TypeNode::Scalar(st) => st.kind(),
            TypeNode::FixedString(_) | TypeNode::String => Kind::String,
            TypeNode::FixedBytes { .. } | TypeNode::Bytes => Kind::Bytes,
            TypeNode::Object => Kind::Object,
            TypeNode::FixedDim { .. } | TypeNode::VarDim { .. } => Kind::Dim,
            TypeNode::Pointer { .. } => Kind::Pointer,
            TypeNode::Struct(_) => Kind::Struct,
        }
    }

    pub fn as_scalar(&self) -> Option<ScalarType> {
        match self.node() {
            TypeNode::Scalar(st) => Some(*st),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructType> {
        match self.node() {
            TypeNode::Struct(st) => Some(st),
            _ => None,
        }
    }

    pub fn is_dim(&self) -> bool {
        self.kind() == Kind::Dim
    }

    /// Number of leading dimensions, looking through pointers.
    pub fn ndim(&self) -> usize {
        match self.node() {
            TypeNode::FixedDim { element, .. } | TypeNode::VarDim { element } => {
                1 + element.ndim()
            }
            TypeNode::Pointer { target } => target.ndim(),
            _ => 0,
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.ndim() == 0
    }

    /// The type with one dimension stripped, if this is a dimension.
    pub fn element_type(&self) -> Option<&Type> {
        match self.node() {
            TypeNode::FixedDim { element, .. } | TypeNode::VarDim { element } => Some(element),
            _ => None,
        }
    }

    /// The innermost type once all dimensions are stripped.
    pub fn dtype(&self) -> &Type {
        match self.node() {
            TypeNode::FixedDim { element, .. } | TypeNode::VarDim { element } => element.dtype(),
            TypeNode::Pointer { target } if target.ndim() > 0 => target.dtype(),
            _ => self,
        }
    }

    /// A new type with the same dimensions but `dtype` in place of the
    /// innermost type.
    pub fn with_replaced_dtype(&self, dtype: Type) -> Type {
        match self.node() {
            TypeNode::FixedDim { size, element } => {
                Type::fixed_dim(*size, element.with_replaced_dtype(dtype))
            }
            TypeNode::VarDim { element } => Type::var_dim(element.with_replaced_dtype(dtype)),
            TypeNode::Pointer { target } if target.ndim() > 0 => {
                Type::pointer(target.with_replaced_dtype(dtype))
            }
            _ => dtype,
        }
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.as_struct().and_then(|st| st.field_index(name))
    }

    /// Dimension sizes, outermost first. Variable dimensions report `-1`.
    pub fn shape(&self) -> Vec<isize> {
        let mut shape = Vec::with_capacity(self.ndim());
        let mut tp = self;
        loop {
            match tp.node() {
                TypeNode::FixedDim { size, element } => {
                    shape.push(*size as isize);
                    tp = element;
                }
                TypeNode::VarDim { element } => {
                    shape.push(-1);
                    tp = element;
                }
                TypeNode::Pointer { target } if target.ndim() > 0 => tp = target,
                _ => return shape,
            }
        }
    }

    /// Bytes one element of this type occupies inside its parent.
    ///
    /// Fails with [`Error::AllocationFailed`] when the size does not fit in
    /// the address space (more than `isize::MAX` bytes).
    pub fn data_size(&self) -> Result<usize> {
        let size = match self.node() {
            TypeNode::Scalar(st) => st.size(),
            TypeNode::FixedString(n) => *n,
            TypeNode::FixedBytes { size, .. } => *size,
            // (begin, end) pointer pairs into a blockref
            TypeNode::String | TypeNode::Bytes => 2 * POINTER_SIZE,
            TypeNode::Object | TypeNode::Pointer { .. } => POINTER_SIZE,
            TypeNode::FixedDim { size, element } => size
                .checked_mul(element.data_size()?)
                .ok_or(Error::AllocationFailed(None))?,
            // (data pointer, size)
            TypeNode::VarDim { .. } => 2 * POINTER_SIZE,
            TypeNode::Struct(st) => st.default_data_offsets()?.1,
        };
        if size > isize::MAX as usize {
            return Err(Error::AllocationFailed(None));
        }
        Ok(size)
    }

    pub fn data_alignment(&self) -> usize {
        match self.node() {
            TypeNode::Scalar(st) => st.size(),
            TypeNode::FixedString(_) => 1,
            TypeNode::FixedBytes { align, .. } => *align,
            TypeNode::String
            | TypeNode::Bytes
            | TypeNode::Object
            | TypeNode::Pointer { .. }
            | TypeNode::VarDim { .. } => POINTER_SIZE,
            TypeNode::FixedDim { element, .. } => element.data_alignment(),
            TypeNode::Struct(st) => st.alignment(),
        }
    }

    /// Bytes of per-array layout metadata this type needs.
    ///
    /// Each fixed dimension stores its size and stride, each var dimension a
    /// payload reference, stride and offset, each struct one offset per
    /// field, and variable strings and bytes a payload reference.
    pub fn arrmeta_size(&self) -> usize {
        match self.node() {
            TypeNode::FixedDim { element, .. } => 2 * POINTER_SIZE + element.arrmeta_size(),
            TypeNode::VarDim { element } => 3 * POINTER_SIZE + element.arrmeta_size(),
            TypeNode::Pointer { target } => 2 * POINTER_SIZE + target.arrmeta_size(),
            TypeNode::Struct(st) => st
                .types
                .iter()
                .map(|t| POINTER_SIZE + t.arrmeta_size())
                .sum(),
            TypeNode::String | TypeNode::Bytes => POINTER_SIZE,
            _ => 0,
        }
    }

    /// Whether any node stores payload outside the main buffer.
    pub fn needs_payload(&self) -> bool {
        match self.node() {
            TypeNode::String | TypeNode::Bytes | TypeNode::VarDim { .. } => true,
            TypeNode::FixedDim { element, .. } => element.needs_payload(),
            TypeNode::Pointer { target } => target.needs_payload(),
            TypeNode::Struct(st) => st.types.iter().any(|t| t.needs_payload()),
            _ => false,
        }
    }

    /// Whether any node holds foreign object references.
    pub fn has_objects(&self) -> bool {
        match self.node() {
            TypeNode::Object => true,
            TypeNode::FixedDim { element, .. } | TypeNode::VarDim { element } => {
                element.has_objects()
            }
            TypeNode::Pointer { target } => target.has_objects(),
            TypeNode::Struct(st) => st.types.iter().any(|t| t.has_objects()),
            _ => false,
        }
    }
}

impl From<ScalarType> for Type {
    fn from(st: ScalarType) -> Self {
        Type::scalar(st)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node() {
            TypeNode::Scalar(st) => write!(f, "{st}"),
            TypeNode::FixedString(n) => write!(f, "fixed_string[{n}]"),
            TypeNode::String => write!(f, "string"),
            TypeNode::FixedBytes { size, align } if *align <= 1 => {
                write!(f, "fixed_bytes[{size}]")
            }
            TypeNode::FixedBytes { size, align } => {
                write!(f, "fixed_bytes[{size}, align={align}]")
            }
            TypeNode::Bytes => write!(f, "bytes"),
            TypeNode::Object => write!(f, "object"),
            TypeNode::FixedDim { size, element } => write!(f, "{size} * {element}"),
            TypeNode::VarDim { element } => write!(f, "var * {element}"),
            TypeNode::Pointer { target } => write!(f, "pointer[{target}]"),
            TypeNode::Struct(st) => {
                write!(f, "{{")?;
                for (i, (name, tp)) in st.names.iter().zip(st.types.iter()).enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name} : {tp}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({self})")
    }
}
