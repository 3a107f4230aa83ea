//! This module contains IR value definition.
use std::fmt;

use cranelift_entity::entity_impl;

use crate::{inst::InstId, Type};

/// An opaque reference to [`Value`].
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);
entity_impl!(ValueId, "v");

/// A value data definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// The value is defined by an instruction.
    Inst { inst: InstId, ty: Type },

    /// The value is a function argument.
    Arg { ty: Type, idx: usize },

    /// The value is an immediate value.
    Immediate { imm: Immediate, ty: Type },
}

impl Value {
    pub fn ty(&self) -> &Type {
        match self {
            Self::Inst { ty, .. } | Self::Arg { ty, .. } | Self::Immediate { ty, .. } => ty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Immediate {
    I1(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
}

impl Immediate {
    pub fn ty(&self) -> Type {
        match self {
            Self::I1(_) => Type::I1,
            Self::I8(_) => Type::I8,
            Self::I16(_) => Type::I16,
            Self::I32(_) => Type::I32,
            Self::I64(_) => Type::I64,
        }
    }

    /// Returns the sign extended value of the immediate.
    pub fn as_i64(&self) -> i64 {
        match *self {
            Self::I1(v) => -(v as i64),
            Self::I8(v) => v as i64,
            Self::I16(v) => v as i64,
            Self::I32(v) => v as i64,
            Self::I64(v) => v,
        }
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::I1(v) => write!(f, "{}", *v as u8),
            Self::I8(v) => write!(f, "{}", v),
            Self::I16(v) => write!(f, "{}", v),
            Self::I32(v) => write!(f, "{}", v),
            Self::I64(v) => write!(f, "{}", v),
        }
    }
}

macro_rules! impl_imm_from {
    ($arg_ty:ty, $imm_ty:ty, $variant:path) => {
        impl From<$arg_ty> for Immediate {
            fn from(imm: $arg_ty) -> Self {
                $variant(imm as $imm_ty)
            }
        }
    };
}

impl_imm_from!(i8, i8, Immediate::I8);
impl_imm_from!(u8, i8, Immediate::I8);
impl_imm_from!(i16, i16, Immediate::I16);
impl_imm_from!(u16, i16, Immediate::I16);
impl_imm_from!(i32, i32, Immediate::I32);
impl_imm_from!(u32, i32, Immediate::I32);
impl_imm_from!(i64, i64, Immediate::I64);
impl_imm_from!(u64, i64, Immediate::I64);

impl From<bool> for Immediate {
    fn from(imm: bool) -> Self {
        Self::I1(imm)
    }
}
