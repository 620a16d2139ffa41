/// Fixed-size built-in scalar types.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter)]
pub enum ScalarType {
    #[strum(serialize = "bool")]
    Bool,
    #[strum(serialize = "int8")]
    Int8,
    #[strum(serialize = "int16")]
    Int16,
    #[strum(serialize = "int32")]
    Int32,
    #[strum(serialize = "int64")]
    Int64,
    #[strum(serialize = "uint8")]
    UInt8,
    #[strum(serialize = "uint16")]
    UInt16,
    #[strum(serialize = "uint32")]
    UInt32,
    #[strum(serialize = "uint64")]
    UInt64,
    #[strum(serialize = "float32")]
    Float32,
    #[strum(serialize = "float64")]
    Float64,
}

impl ScalarType {
    pub fn size(&self) -> usize {
        use ScalarType::*;
        match self {
            Bool | Int8 | UInt8 => 1,
            Int16 | UInt16 => 2,
            Int32 | UInt32 | Float32 => 4,
            Int64 | UInt64 | Float64 => 8,
        }
    }

    pub fn kind(&self) -> Kind {
        use ScalarType::*;
        match self {
            Bool => Kind::Bool,
            Int8 | Int16 | Int32 | Int64 => Kind::SInt,
            UInt8 | UInt16 | UInt32 | UInt64 => Kind::UInt,
            Float32 | Float64 => Kind::Real,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.kind(), Kind::SInt | Kind::UInt)
    }

    pub fn is_float(&self) -> bool {
        self.kind() == Kind::Real
    }
}

/// Broad classification of a type, reported in error messages.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, strum::Display)]
pub enum Kind {
    #[strum(serialize = "bool")]
    Bool,
    #[strum(serialize = "sint")]
    SInt,
    #[strum(serialize = "uint")]
    UInt,
    #[strum(serialize = "real")]
    Real,
    #[strum(serialize = "string")]
    String,
    #[strum(serialize = "bytes")]
    Bytes,
    #[strum(serialize = "object")]
    Object,
    #[strum(serialize = "dim")]
    Dim,
    #[strum(serialize = "pointer")]
    Pointer,
    #[strum(serialize = "struct")]
    Struct,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn names_round_trip() {
        for st in ScalarType::iter() {
            assert_eq!(ScalarType::from_str(&st.to_string()), Ok(st));
        }
    }

    #[test]
    fn unknown_name_fails() {
        assert!(ScalarType::from_str("int128").is_err());
    }

    #[test]
    fn kinds() {
        assert_eq!(ScalarType::UInt16.kind().to_string(), "uint");
        assert_eq!(ScalarType::Float32.kind(), Kind::Real);
        assert!(ScalarType::Int64.is_integer());
        assert!(!ScalarType::Bool.is_integer());
    }
}
