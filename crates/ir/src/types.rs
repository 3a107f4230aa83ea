//! This module contains IR types definitions.
use std::fmt;

/// IR types definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Type {
    I1,
    I8,
    I16,
    I32,
    I64,
    Ptr,
    Array {
        elem: Box<Type>,
        len: u64,
    },
    Struct {
        fields: Vec<Type>,
    },
    /// A vector whose length is a runtime multiple of `min_len`.
    ScalableVector {
        elem: Box<Type>,
        min_len: u64,
    },
    #[default]
    Unit,
}

impl Type {
    pub fn make_array(elem: Type, len: u64) -> Self {
        Self::Array {
            elem: elem.into(),
            len,
        }
    }

    pub fn make_struct(fields: &[Type]) -> Self {
        Self::Struct {
            fields: fields.to_vec(),
        }
    }

    pub fn make_scalable_vector(elem: Type, min_len: u64) -> Self {
        Self::ScalableVector {
            elem: elem.into(),
            min_len,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Self::Ptr)
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Self::Unit)
    }

    /// Returns the bit width of integral types.
    pub fn int_bits(&self) -> Option<u32> {
        match self {
            Self::I1 => Some(1),
            Self::I8 => Some(8),
            Self::I16 => Some(16),
            Self::I32 => Some(32),
            Self::I64 => Some(64),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::I1 => f.write_str("i1"),
            Self::I8 => f.write_str("i8"),
            Self::I16 => f.write_str("i16"),
            Self::I32 => f.write_str("i32"),
            Self::I64 => f.write_str("i64"),
            Self::Ptr => f.write_str("ptr"),
            Self::Array { elem, len } => write!(f, "[{elem};{len}]"),
            Self::Struct { fields } => {
                f.write_str("{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{field}")?;
                }
                f.write_str("}")
            }
            Self::ScalableVector { elem, min_len } => write!(f, "<vscale x {min_len} x {elem}>"),
            Self::Unit => f.write_str("unit"),
        }
    }
}

/// Size of a type in bytes. Scalable sizes are multiples of an unknown
/// runtime factor, `bytes` holds the minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeSize {
    pub bytes: u64,
    pub scalable: bool,
}

impl TypeSize {
    pub fn fixed(bytes: u64) -> Self {
        Self {
            bytes,
            scalable: false,
        }
    }

    pub fn scalable(min_bytes: u64) -> Self {
        Self {
            bytes: min_bytes,
            scalable: true,
        }
    }

    /// Returns the size if it is known at compile time.
    pub fn fixed_size(self) -> Option<u64> {
        (!self.scalable).then_some(self.bytes)
    }
}

impl fmt::Display for TypeSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.scalable {
            write!(f, "vscale x {}", self.bytes)
        } else {
            write!(f, "{}", self.bytes)
        }
    }
}
