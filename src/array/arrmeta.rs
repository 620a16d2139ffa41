use crate::error::{Error, Result};
use crate::internal_err;
use crate::memory::MemoryBlock;
use crate::ndt::{Type, TypeNode};

/// Array Metadata
///
/// Per-array layout information whose shape mirrors a [`Type`]: strides for
/// every dimension, payload references for variable-sized data and the
/// byte offset of every struct field. An `ArrMeta` is only meaningful next
/// to the type it was built for; the array keeps the two together.
///
#[derive(Debug, Clone, PartialEq)]
pub enum ArrMeta {
    /// Scalars, fixed strings and bytes, object slots.
    Empty,
    FixedDim {
        stride: isize,
        element: Box<ArrMeta>,
    },
    VarDim {
        blockref: Option<MemoryBlock>,
        stride: isize,
        offset: isize,
        element: Box<ArrMeta>,
    },
    Pointer {
        blockref: Option<MemoryBlock>,
        offset: isize,
        target: Box<ArrMeta>,
    },
    Struct {
        data_offsets: Vec<usize>,
        fields: Vec<ArrMeta>,
    },
    /// Variable-sized strings and bytes.
    BlockRef(Option<MemoryBlock>),
}

/// The metadata of a single dimension level, without its element.
#[derive(Debug, Clone, PartialEq)]
pub enum DimMeta {
    Fixed {
        stride: isize,
    },
    Var {
        blockref: Option<MemoryBlock>,
        stride: isize,
        offset: isize,
    },
}

impl DimMeta {
    pub fn stride(&self) -> isize {
        match self {
            DimMeta::Fixed { stride } | DimMeta::Var { stride, .. } => *stride,
        }
    }

    /// Attach the element metadata below this level.
    pub fn wrap(self, element: ArrMeta) -> ArrMeta {
        let element = Box::new(element);
        match self {
            DimMeta::Fixed { stride } => ArrMeta::FixedDim { stride, element },
            DimMeta::Var {
                blockref,
                stride,
                offset,
            } => ArrMeta::VarDim {
                blockref,
                stride,
                offset,
                element,
            },
        }
    }
}

impl ArrMeta {
    /// Build the default (C-contiguous, packed struct) metadata for `tp`.
    ///
    /// Variable-sized payloads are placed in `payload`, which must be an
    /// arena block whenever `tp` needs one.
    pub fn default_construct(tp: &Type, payload: Option<&MemoryBlock>) -> Result<ArrMeta> {
        match tp.node() {
            TypeNode::FixedDim { element, .. } => Ok(ArrMeta::FixedDim {
                stride: element.data_size()? as isize,
                element: Box::new(ArrMeta::default_construct(element, payload)?),
            }),
            TypeNode::VarDim { element } => Ok(ArrMeta::VarDim {
                blockref: Some(require_payload(tp, payload)?),
                stride: element.data_size()? as isize,
                offset: 0,
                element: Box::new(ArrMeta::default_construct(element, payload)?),
            }),
            TypeNode::Pointer { target } => Ok(ArrMeta::Pointer {
                blockref: None,
                offset: 0,
                target: Box::new(ArrMeta::default_construct(target, payload)?),
            }),
            TypeNode::Struct(st) => {
                let (data_offsets, _) = st.default_data_offsets()?;
                let fields = st
                    .types()
                    .iter()
                    .map(|t| ArrMeta::default_construct(t, payload))
                    .collect::<Result<Vec<_>>>()?;
                Ok(ArrMeta::Struct {
                    data_offsets,
                    fields,
                })
            }
            TypeNode::String | TypeNode::Bytes => {
                Ok(ArrMeta::BlockRef(Some(require_payload(tp, payload)?)))
            }
            _ => Ok(ArrMeta::Empty),
        }
    }

    /// Copy one dimension level, returning it along with the element
    /// metadata that follows it in `self`.
    ///
    /// Var dimensions keep their payload reference; if they have none,
    /// `owner` becomes the new one. Anything that is not a plain dimension
    /// (notably pointers) is rejected.
    pub fn copy_construct_onedim(
        &self,
        tp: &Type,
        owner: &MemoryBlock,
    ) -> Result<(DimMeta, &ArrMeta)> {
        match self {
            ArrMeta::FixedDim { stride, element } => Ok((DimMeta::Fixed { stride: *stride }, element)),
            ArrMeta::VarDim {
                blockref,
                stride,
                offset,
                element,
            } => Ok((
                DimMeta::Var {
                    blockref: Some(blockref.clone().unwrap_or_else(|| owner.acquire())),
                    stride: *stride,
                    offset: *offset,
                },
                element,
            )),
            _ => Err(Error::UnsupportedDimension(tp.clone())),
        }
    }

    /// Copy metadata for a whole subtree, attaching `owner` wherever a
    /// payload reference is missing. Struct offsets are copied verbatim.
    pub fn copy_construct(&self, owner: &MemoryBlock) -> ArrMeta {
        let adopt = |blockref: &Option<MemoryBlock>| {
            Some(blockref.clone().unwrap_or_else(|| owner.acquire()))
        };
        match self {
            ArrMeta::Empty => ArrMeta::Empty,
            ArrMeta::FixedDim { stride, element } => ArrMeta::FixedDim {
                stride: *stride,
                element: Box::new(element.copy_construct(owner)),
            },
            ArrMeta::VarDim {
                blockref,
                stride,
                offset,
                element,
            } => ArrMeta::VarDim {
                blockref: adopt(blockref),
                stride: *stride,
                offset: *offset,
                element: Box::new(element.copy_construct(owner)),
            },
            ArrMeta::Pointer {
                blockref,
                offset,
                target,
            } => ArrMeta::Pointer {
                blockref: adopt(blockref),
                offset: *offset,
                target: Box::new(target.copy_construct(owner)),
            },
            ArrMeta::Struct {
                data_offsets,
                fields,
            } => ArrMeta::Struct {
                data_offsets: data_offsets.clone(),
                fields: fields.iter().map(|f| f.copy_construct(owner)).collect(),
            },
            ArrMeta::BlockRef(blockref) => ArrMeta::BlockRef(adopt(blockref)),
        }
    }

    /// Stride of the outermost dimension.
    pub fn stride(&self) -> Option<isize> {
        match self {
            ArrMeta::FixedDim { stride, .. } | ArrMeta::VarDim { stride, .. } => Some(*stride),
            _ => None,
        }
    }

    pub fn element(&self) -> Option<&ArrMeta> {
        match self {
            ArrMeta::FixedDim { element, .. } | ArrMeta::VarDim { element, .. } => Some(element),
            ArrMeta::Pointer { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn data_offsets(&self) -> Option<&[usize]> {
        match self {
            ArrMeta::Struct { data_offsets, .. } => Some(data_offsets),
            _ => None,
        }
    }

    pub fn blockref(&self) -> Option<&MemoryBlock> {
        match self {
            ArrMeta::VarDim { blockref, .. }
            | ArrMeta::Pointer { blockref, .. }
            | ArrMeta::BlockRef(blockref) => blockref.as_ref(),
            _ => None,
        }
    }

    /// Whether this metadata has the shape `tp` calls for.
    pub fn matches(&self, tp: &Type) -> bool {
        match (self, tp.node()) {
            (ArrMeta::FixedDim { element: m, .. }, TypeNode::FixedDim { element: t, .. }) => {
                m.matches(t)
            }
            (ArrMeta::VarDim { element: m, .. }, TypeNode::VarDim { element: t }) => m.matches(t),
            (ArrMeta::Pointer { target: m, .. }, TypeNode::Pointer { target: t }) => m.matches(t),
            (
                ArrMeta::Struct {
                    data_offsets,
                    fields,
                },
                TypeNode::Struct(st),
            ) => {
                data_offsets.len() == st.len()
                    && fields.len() == st.len()
                    && fields.iter().zip(st.types()).all(|(m, t)| m.matches(t))
            }
            (ArrMeta::BlockRef(_), TypeNode::String | TypeNode::Bytes) => true,
            (
                ArrMeta::Empty,
                TypeNode::Scalar(_)
                | TypeNode::FixedString(_)
                | TypeNode::FixedBytes { .. }
                | TypeNode::Object,
            ) => true,
            _ => false,
        }
    }
}

fn require_payload(tp: &Type, payload: Option<&MemoryBlock>) -> Result<MemoryBlock> {
    match payload {
        Some(block) => Ok(block.acquire()),
        None => internal_err!(format!("type {tp} needs a payload block")),
    }
}
