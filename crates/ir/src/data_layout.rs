//! Target dependent sizes and alignments of [`Type`]s.
use stacksafe_triple::TargetTriple;

use crate::{types::TypeSize, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLayout {
    pointer_bits: u32,
}

impl DataLayout {
    pub fn new(pointer_bits: u32) -> Self {
        debug_assert!(pointer_bits == 32 || pointer_bits == 64);
        Self { pointer_bits }
    }

    pub fn from_triple(triple: &TargetTriple) -> Self {
        Self::new(triple.pointer_width())
    }

    pub fn pointer_bits(&self) -> u32 {
        self.pointer_bits
    }

    pub fn pointer_bytes(&self) -> u64 {
        (self.pointer_bits / 8) as u64
    }

    /// Returns the number of bytes occupied by a value of `ty` in memory,
    /// including trailing padding.
    pub fn size_of(&self, ty: &Type) -> TypeSize {
        match ty {
            Type::I1 | Type::I8 => TypeSize::fixed(1),
            Type::I16 => TypeSize::fixed(2),
            Type::I32 => TypeSize::fixed(4),
            Type::I64 => TypeSize::fixed(8),
            Type::Ptr => TypeSize::fixed(self.pointer_bytes()),
            Type::Unit => TypeSize::fixed(0),

            Type::Array { elem, len } => {
                let elem_size = self.size_of(elem);
                TypeSize {
                    bytes: elem_size.bytes.saturating_mul(*len),
                    scalable: elem_size.scalable,
                }
            }

            Type::ScalableVector { elem, min_len } => {
                TypeSize::scalable(self.size_of(elem).bytes.saturating_mul(*min_len))
            }

            Type::Struct { fields } => {
                let mut offset = 0u64;
                let mut scalable = false;
                for field in fields {
                    let size = self.size_of(field);
                    offset = align_to(offset, self.align_of(field)).saturating_add(size.bytes);
                    scalable |= size.scalable;
                }
                TypeSize {
                    bytes: align_to(offset, self.align_of(ty)),
                    scalable,
                }
            }
        }
    }

    pub fn align_of(&self, ty: &Type) -> u64 {
        match ty {
            Type::Array { elem, .. } | Type::ScalableVector { elem, .. } => self.align_of(elem),
            Type::Struct { fields } => fields.iter().map(|f| self.align_of(f)).max().unwrap_or(1),
            Type::Unit => 1,
            _ => self.size_of(ty).bytes.max(1),
        }
    }
}

fn align_to(offset: u64, align: u64) -> u64 {
    offset.div_ceil(align).saturating_mul(align)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_padding() {
        let dl = DataLayout::new(64);
        let ty = Type::make_struct(&[Type::I8, Type::I64, Type::I16]);
        assert_eq!(dl.size_of(&ty), TypeSize::fixed(24));
        assert_eq!(dl.align_of(&ty), 8);

        let dl = DataLayout::new(32);
        let ty = Type::make_struct(&[Type::I8, Type::Ptr]);
        assert_eq!(dl.size_of(&ty), TypeSize::fixed(8));
    }

    #[test]
    fn scalable() {
        let dl = DataLayout::new(64);
        let ty = Type::make_scalable_vector(Type::I32, 4);
        assert_eq!(dl.size_of(&ty), TypeSize::scalable(16));
        assert_eq!(dl.size_of(&ty).fixed_size(), None);

        let ty = Type::make_array(Type::I16, 10);
        assert_eq!(dl.size_of(&ty).fixed_size(), Some(20));
    }
}
