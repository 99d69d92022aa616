//! Typed views over the SPIR-V instructions the reflector honors.
//!
//! Decorations, storage classes, and execution modes stay raw `u32`s here:
//! modules routinely carry values from extensions these headers don't know,
//! and the reflector ignores anything it doesn't recognize rather than
//! rejecting the module.
use std::convert::TryFrom;

use mslc_core::parse::Instr;
use spirv::Dim;

type InstrId = u32;
type TypeId = u32;
type VariableId = u32;
type ConstantId = u32;
type MemberIdx = u32;

macro_rules! define_ops {
    ($($opcode:ident { $($field:ident: $ty:ty = $read_fn:ident(),)+ })+) => {
        $(
            pub struct $opcode<'a> {
                $(pub $field: $ty,)*
                _ph: ::std::marker::PhantomData<&'a ()>,
            }
            impl<'a> TryFrom<&Instr<'a>> for $opcode<'a> {
                type Error = crate::error::Error;
                fn try_from(instr: &Instr<'a>) -> crate::error::Result<Self> {
                    let mut operands = instr.operands();
                    let op = $opcode {
                        $($field: operands.$read_fn()?,)+
                        _ph: ::std::marker::PhantomData,
                    };
                    Ok(op)
                }
            }
        )+
    };
}

// The read order of each block matches the operand order in the SPIR-V
// specification.
define_ops! {
    OpName {
        target_id: InstrId = read_u32(),
        name: String = read_str(),
    }
    OpMemberName {
        target_id: InstrId = read_u32(),
        member_idx: MemberIdx = read_u32(),
        name: String = read_str(),
    }

    OpDecorate {
        target_id: InstrId = read_u32(),
        deco: u32 = read_u32(),
        params: &'a [u32] = read_list(),
    }
    OpMemberDecorate {
        target_id: InstrId = read_u32(),
        member_idx: MemberIdx = read_u32(),
        deco: u32 = read_u32(),
        params: &'a [u32] = read_list(),
    }

    OpConstant {
        ty_id: TypeId = read_u32(),
        const_id: ConstantId = read_u32(),
        value: &'a [u32] = read_list(),
    }

    OpTypeBool {
        ty_id: TypeId = read_u32(),
    }
    OpTypeInt {
        ty_id: TypeId = read_u32(),
        bits: u32 = read_u32(),
        is_signed: bool = read_bool(),
    }
    OpTypeFloat {
        ty_id: TypeId = read_u32(),
        bits: u32 = read_u32(),
    }
    OpTypeVector {
        ty_id: TypeId = read_u32(),
        scalar_ty_id: TypeId = read_u32(),
        nscalar: u32 = read_u32(),
    }
    OpTypeMatrix {
        ty_id: TypeId = read_u32(),
        vector_ty_id: TypeId = read_u32(),
        nvector: u32 = read_u32(),
    }
    OpTypeImage {
        ty_id: TypeId = read_u32(),
        scalar_ty_id: TypeId = read_u32(),
        dim: Dim = read_enum(),
        is_depth: u32 = read_u32(),
        is_array: bool = read_bool(),
        is_multisampled: bool = read_bool(),
        is_sampled: u32 = read_u32(),
    }
    OpTypeSampledImage {
        ty_id: TypeId = read_u32(),
        image_ty_id: TypeId = read_u32(),
    }
    OpTypeArray {
        ty_id: TypeId = read_u32(),
        element_ty_id: TypeId = read_u32(),
        nelement_const_id: ConstantId = read_u32(),
    }
    OpTypeRuntimeArray {
        ty_id: TypeId = read_u32(),
        element_ty_id: TypeId = read_u32(),
    }
    OpTypeStruct {
        ty_id: TypeId = read_u32(),
        member_ty_ids: &'a [TypeId] = read_list(),
    }
    OpTypePointer {
        ty_id: TypeId = read_u32(),
        store_cls: u32 = read_u32(),
        target_ty_id: TypeId = read_u32(),
    }

    OpVariable {
        ty_id: TypeId = read_u32(),
        var_id: VariableId = read_u32(),
        store_cls: u32 = read_u32(),
    }

    OpExecutionMode {
        func_id: InstrId = read_u32(),
        mode: u32 = read_u32(),
        params: &'a [u32] = read_list(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mslc_core::parse::{InstructionBuilder, Instrs};
    use spirv::Op;

    #[test]
    fn decodes_operands_in_order() {
        let words = InstructionBuilder::new(Op::TypeImage)
            .push(9)
            .push(2)
            .push(Dim::DimCube as u32)
            .push(1)
            .push(0)
            .push(0)
            .push(1)
            .push(0)
            .into_words();
        let mut instrs = Instrs::new(&words).unwrap();
        let instr = instrs.next().unwrap().unwrap();
        let op = OpTypeImage::try_from(&instr).unwrap();
        assert_eq!(op.ty_id, 9);
        assert_eq!(op.scalar_ty_id, 2);
        assert_eq!(op.dim, Dim::DimCube);
        assert_eq!(op.is_depth, 1);
        assert!(!op.is_array);
        assert!(!op.is_multisampled);
        assert_eq!(op.is_sampled, 1);
    }

    #[test]
    fn member_decorate_params() {
        let words = InstructionBuilder::new(Op::MemberDecorate)
            .push(5)
            .push(2)
            .push(spirv::Decoration::Offset as u32)
            .push(48)
            .into_words();
        let mut instrs = Instrs::new(&words).unwrap();
        let instr = instrs.next().unwrap().unwrap();
        let op = OpMemberDecorate::try_from(&instr).unwrap();
        assert_eq!(op.target_id, 5);
        assert_eq!(op.member_idx, 2);
        assert_eq!(op.deco, spirv::Decoration::Offset as u32);
        assert_eq!(op.params, &[48]);
    }
}
