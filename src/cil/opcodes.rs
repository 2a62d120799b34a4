//! The CIL instruction set
//!
//! CIL has several encodings for what is semantically the same instruction (`ldloc.0`,
//! `ldloc.s 0`, `ldloc 0`). Those families are merged here into one [`Opcode`] carrying its
//! index or value as an operand, and the encoder always picks the shortest encoding. Branches
//! are the exception: their short and long forms stay distinct, because which form is used is
//! observable (a short branch has a limited reach).
//!
//! Each opcode knows its canonical encoding, the shape of its operand, and how it affects the
//! evaluation stack.

use std::fmt;

/// Prefix byte introducing two-byte opcodes
pub const TWO_BYTE_PREFIX: u8 = 0xFE;

/// Shape of the inline operand following an opcode
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum OperandKind {
    InlineNone,
    ShortInlineBrTarget,
    InlineBrTarget,
    InlineSwitch,
    ShortInlineI,
    InlineI,
    InlineI8,
    ShortInlineR,
    InlineR,
    InlineString,
    InlineVar,
    InlineArg,
    InlineType,
    InlineMethod,
    InlineField,
    InlineTok,
    InlineSig,
}

impl OperandKind {
    /// Does the operand refer to another instruction?
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            OperandKind::ShortInlineBrTarget | OperandKind::InlineBrTarget
        )
    }
}

/// Number of values an instruction pops or pushes
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum StackCount {
    Fixed(u8),

    /// Depends on the operand (method signature or enclosing method's return type)
    Var,
}

const C0: StackCount = StackCount::Fixed(0);
const C1: StackCount = StackCount::Fixed(1);
const C2: StackCount = StackCount::Fixed(2);
const C3: StackCount = StackCount::Fixed(3);
const VAR: StackCount = StackCount::Var;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct StackBehaviour {
    pub pops: StackCount,
    pub pushes: StackCount,
}

macro_rules! opcodes {
    ($( $variant:ident = $name:literal, $code:literal, $kind:ident, $pop:ident, $push:ident; )*) => {
        /// CIL opcode (with macro forms merged)
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
        pub enum Opcode {
            $( $variant, )*
        }

        impl Opcode {
            /// Every opcode, in encoding order
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$variant, )* ];

            /// Mnemonic as it appears in disassembly
            pub fn name(self) -> &'static str {
                match self {
                    $( Opcode::$variant => $name, )*
                }
            }

            /// Canonical encoding: one byte, or `0xFE00 | second_byte` for two-byte opcodes
            pub fn code(self) -> u16 {
                match self {
                    $( Opcode::$variant => $code, )*
                }
            }

            pub fn operand_kind(self) -> OperandKind {
                match self {
                    $( Opcode::$variant => OperandKind::$kind, )*
                }
            }

            pub fn stack_behaviour(self) -> StackBehaviour {
                match self {
                    $( Opcode::$variant => StackBehaviour { pops: $pop, pushes: $push }, )*
                }
            }

            /// Look up an opcode by its canonical encoding
            ///
            /// Macro encodings (eg. `ldloc.0`) are not canonical; see [`MacroForm::decode`].
            pub fn from_code(code: u16) -> Option<Opcode> {
                match code {
                    $( $code => Some(Opcode::$variant), )*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    Nop = "nop", 0x00, InlineNone, C0, C0;
    Break = "break", 0x01, InlineNone, C0, C0;
    Ldnull = "ldnull", 0x14, InlineNone, C0, C1;
    LdcI4 = "ldc.i4", 0x20, InlineI, C0, C1;
    LdcI8 = "ldc.i8", 0x21, InlineI8, C0, C1;
    LdcR4 = "ldc.r4", 0x22, ShortInlineR, C0, C1;
    LdcR8 = "ldc.r8", 0x23, InlineR, C0, C1;
    Dup = "dup", 0x25, InlineNone, C1, C2;
    Pop = "pop", 0x26, InlineNone, C1, C0;
    Jmp = "jmp", 0x27, InlineMethod, C0, C0;
    Call = "call", 0x28, InlineMethod, VAR, VAR;
    Calli = "calli", 0x29, InlineSig, VAR, VAR;
    Ret = "ret", 0x2A, InlineNone, VAR, C0;
    BrS = "br.s", 0x2B, ShortInlineBrTarget, C0, C0;
    BrfalseS = "brfalse.s", 0x2C, ShortInlineBrTarget, C1, C0;
    BrtrueS = "brtrue.s", 0x2D, ShortInlineBrTarget, C1, C0;
    BeqS = "beq.s", 0x2E, ShortInlineBrTarget, C2, C0;
    BgeS = "bge.s", 0x2F, ShortInlineBrTarget, C2, C0;
    BgtS = "bgt.s", 0x30, ShortInlineBrTarget, C2, C0;
    BleS = "ble.s", 0x31, ShortInlineBrTarget, C2, C0;
    BltS = "blt.s", 0x32, ShortInlineBrTarget, C2, C0;
    BneUnS = "bne.un.s", 0x33, ShortInlineBrTarget, C2, C0;
    BgeUnS = "bge.un.s", 0x34, ShortInlineBrTarget, C2, C0;
    BgtUnS = "bgt.un.s", 0x35, ShortInlineBrTarget, C2, C0;
    BleUnS = "ble.un.s", 0x36, ShortInlineBrTarget, C2, C0;
    BltUnS = "blt.un.s", 0x37, ShortInlineBrTarget, C2, C0;
    Br = "br", 0x38, InlineBrTarget, C0, C0;
    Brfalse = "brfalse", 0x39, InlineBrTarget, C1, C0;
    Brtrue = "brtrue", 0x3A, InlineBrTarget, C1, C0;
    Beq = "beq", 0x3B, InlineBrTarget, C2, C0;
    Bge = "bge", 0x3C, InlineBrTarget, C2, C0;
    Bgt = "bgt", 0x3D, InlineBrTarget, C2, C0;
    Ble = "ble", 0x3E, InlineBrTarget, C2, C0;
    Blt = "blt", 0x3F, InlineBrTarget, C2, C0;
    BneUn = "bne.un", 0x40, InlineBrTarget, C2, C0;
    BgeUn = "bge.un", 0x41, InlineBrTarget, C2, C0;
    BgtUn = "bgt.un", 0x42, InlineBrTarget, C2, C0;
    BleUn = "ble.un", 0x43, InlineBrTarget, C2, C0;
    BltUn = "blt.un", 0x44, InlineBrTarget, C2, C0;
    Switch = "switch", 0x45, InlineSwitch, C1, C0;
    LdindI1 = "ldind.i1", 0x46, InlineNone, C1, C1;
    LdindU1 = "ldind.u1", 0x47, InlineNone, C1, C1;
    LdindI2 = "ldind.i2", 0x48, InlineNone, C1, C1;
    LdindU2 = "ldind.u2", 0x49, InlineNone, C1, C1;
    LdindI4 = "ldind.i4", 0x4A, InlineNone, C1, C1;
    LdindU4 = "ldind.u4", 0x4B, InlineNone, C1, C1;
    LdindI8 = "ldind.i8", 0x4C, InlineNone, C1, C1;
    LdindI = "ldind.i", 0x4D, InlineNone, C1, C1;
    LdindR4 = "ldind.r4", 0x4E, InlineNone, C1, C1;
    LdindR8 = "ldind.r8", 0x4F, InlineNone, C1, C1;
    LdindRef = "ldind.ref", 0x50, InlineNone, C1, C1;
    StindRef = "stind.ref", 0x51, InlineNone, C2, C0;
    StindI1 = "stind.i1", 0x52, InlineNone, C2, C0;
    StindI2 = "stind.i2", 0x53, InlineNone, C2, C0;
    StindI4 = "stind.i4", 0x54, InlineNone, C2, C0;
    StindI8 = "stind.i8", 0x55, InlineNone, C2, C0;
    StindR4 = "stind.r4", 0x56, InlineNone, C2, C0;
    StindR8 = "stind.r8", 0x57, InlineNone, C2, C0;
    Add = "add", 0x58, InlineNone, C2, C1;
    Sub = "sub", 0x59, InlineNone, C2, C1;
    Mul = "mul", 0x5A, InlineNone, C2, C1;
    Div = "div", 0x5B, InlineNone, C2, C1;
    DivUn = "div.un", 0x5C, InlineNone, C2, C1;
    Rem = "rem", 0x5D, InlineNone, C2, C1;
    RemUn = "rem.un", 0x5E, InlineNone, C2, C1;
    And = "and", 0x5F, InlineNone, C2, C1;
    Or = "or", 0x60, InlineNone, C2, C1;
    Xor = "xor", 0x61, InlineNone, C2, C1;
    Shl = "shl", 0x62, InlineNone, C2, C1;
    Shr = "shr", 0x63, InlineNone, C2, C1;
    ShrUn = "shr.un", 0x64, InlineNone, C2, C1;
    Neg = "neg", 0x65, InlineNone, C1, C1;
    Not = "not", 0x66, InlineNone, C1, C1;
    ConvI1 = "conv.i1", 0x67, InlineNone, C1, C1;
    ConvI2 = "conv.i2", 0x68, InlineNone, C1, C1;
    ConvI4 = "conv.i4", 0x69, InlineNone, C1, C1;
    ConvI8 = "conv.i8", 0x6A, InlineNone, C1, C1;
    ConvR4 = "conv.r4", 0x6B, InlineNone, C1, C1;
    ConvR8 = "conv.r8", 0x6C, InlineNone, C1, C1;
    ConvU4 = "conv.u4", 0x6D, InlineNone, C1, C1;
    ConvU8 = "conv.u8", 0x6E, InlineNone, C1, C1;
    Callvirt = "callvirt", 0x6F, InlineMethod, VAR, VAR;
    Cpobj = "cpobj", 0x70, InlineType, C2, C0;
    Ldobj = "ldobj", 0x71, InlineType, C1, C1;
    Ldstr = "ldstr", 0x72, InlineString, C0, C1;
    Newobj = "newobj", 0x73, InlineMethod, VAR, C1;
    Castclass = "castclass", 0x74, InlineType, C1, C1;
    Isinst = "isinst", 0x75, InlineType, C1, C1;
    ConvRUn = "conv.r.un", 0x76, InlineNone, C1, C1;
    Unbox = "unbox", 0x79, InlineType, C1, C1;
    Throw = "throw", 0x7A, InlineNone, C1, C0;
    Ldfld = "ldfld", 0x7B, InlineField, C1, C1;
    Ldflda = "ldflda", 0x7C, InlineField, C1, C1;
    Stfld = "stfld", 0x7D, InlineField, C2, C0;
    Ldsfld = "ldsfld", 0x7E, InlineField, C0, C1;
    Ldsflda = "ldsflda", 0x7F, InlineField, C0, C1;
    Stsfld = "stsfld", 0x80, InlineField, C1, C0;
    Stobj = "stobj", 0x81, InlineType, C2, C0;
    ConvOvfI1Un = "conv.ovf.i1.un", 0x82, InlineNone, C1, C1;
    ConvOvfI2Un = "conv.ovf.i2.un", 0x83, InlineNone, C1, C1;
    ConvOvfI4Un = "conv.ovf.i4.un", 0x84, InlineNone, C1, C1;
    ConvOvfI8Un = "conv.ovf.i8.un", 0x85, InlineNone, C1, C1;
    ConvOvfU1Un = "conv.ovf.u1.un", 0x86, InlineNone, C1, C1;
    ConvOvfU2Un = "conv.ovf.u2.un", 0x87, InlineNone, C1, C1;
    ConvOvfU4Un = "conv.ovf.u4.un", 0x88, InlineNone, C1, C1;
    ConvOvfU8Un = "conv.ovf.u8.un", 0x89, InlineNone, C1, C1;
    ConvOvfIUn = "conv.ovf.i.un", 0x8A, InlineNone, C1, C1;
    ConvOvfUUn = "conv.ovf.u.un", 0x8B, InlineNone, C1, C1;
    Box = "box", 0x8C, InlineType, C1, C1;
    Newarr = "newarr", 0x8D, InlineType, C1, C1;
    Ldlen = "ldlen", 0x8E, InlineNone, C1, C1;
    Ldelema = "ldelema", 0x8F, InlineType, C2, C1;
    LdelemI1 = "ldelem.i1", 0x90, InlineNone, C2, C1;
    LdelemU1 = "ldelem.u1", 0x91, InlineNone, C2, C1;
    LdelemI2 = "ldelem.i2", 0x92, InlineNone, C2, C1;
    LdelemU2 = "ldelem.u2", 0x93, InlineNone, C2, C1;
    LdelemI4 = "ldelem.i4", 0x94, InlineNone, C2, C1;
    LdelemU4 = "ldelem.u4", 0x95, InlineNone, C2, C1;
    LdelemI8 = "ldelem.i8", 0x96, InlineNone, C2, C1;
    LdelemI = "ldelem.i", 0x97, InlineNone, C2, C1;
    LdelemR4 = "ldelem.r4", 0x98, InlineNone, C2, C1;
    LdelemR8 = "ldelem.r8", 0x99, InlineNone, C2, C1;
    LdelemRef = "ldelem.ref", 0x9A, InlineNone, C2, C1;
    StelemI = "stelem.i", 0x9B, InlineNone, C3, C0;
    StelemI1 = "stelem.i1", 0x9C, InlineNone, C3, C0;
    StelemI2 = "stelem.i2", 0x9D, InlineNone, C3, C0;
    StelemI4 = "stelem.i4", 0x9E, InlineNone, C3, C0;
    StelemI8 = "stelem.i8", 0x9F, InlineNone, C3, C0;
    StelemR4 = "stelem.r4", 0xA0, InlineNone, C3, C0;
    StelemR8 = "stelem.r8", 0xA1, InlineNone, C3, C0;
    StelemRef = "stelem.ref", 0xA2, InlineNone, C3, C0;
    Ldelem = "ldelem", 0xA3, InlineType, C2, C1;
    Stelem = "stelem", 0xA4, InlineType, C3, C0;
    UnboxAny = "unbox.any", 0xA5, InlineType, C1, C1;
    ConvOvfI1 = "conv.ovf.i1", 0xB3, InlineNone, C1, C1;
    ConvOvfU1 = "conv.ovf.u1", 0xB4, InlineNone, C1, C1;
    ConvOvfI2 = "conv.ovf.i2", 0xB5, InlineNone, C1, C1;
    ConvOvfU2 = "conv.ovf.u2", 0xB6, InlineNone, C1, C1;
    ConvOvfI4 = "conv.ovf.i4", 0xB7, InlineNone, C1, C1;
    ConvOvfU4 = "conv.ovf.u4", 0xB8, InlineNone, C1, C1;
    ConvOvfI8 = "conv.ovf.i8", 0xB9, InlineNone, C1, C1;
    ConvOvfU8 = "conv.ovf.u8", 0xBA, InlineNone, C1, C1;
    Refanyval = "refanyval", 0xC2, InlineType, C1, C1;
    Ckfinite = "ckfinite", 0xC3, InlineNone, C1, C1;
    Mkrefany = "mkrefany", 0xC6, InlineType, C1, C1;
    Ldtoken = "ldtoken", 0xD0, InlineTok, C0, C1;
    ConvU2 = "conv.u2", 0xD1, InlineNone, C1, C1;
    ConvU1 = "conv.u1", 0xD2, InlineNone, C1, C1;
    ConvI = "conv.i", 0xD3, InlineNone, C1, C1;
    ConvOvfI = "conv.ovf.i", 0xD4, InlineNone, C1, C1;
    ConvOvfU = "conv.ovf.u", 0xD5, InlineNone, C1, C1;
    AddOvf = "add.ovf", 0xD6, InlineNone, C2, C1;
    AddOvfUn = "add.ovf.un", 0xD7, InlineNone, C2, C1;
    MulOvf = "mul.ovf", 0xD8, InlineNone, C2, C1;
    MulOvfUn = "mul.ovf.un", 0xD9, InlineNone, C2, C1;
    SubOvf = "sub.ovf", 0xDA, InlineNone, C2, C1;
    SubOvfUn = "sub.ovf.un", 0xDB, InlineNone, C2, C1;
    Endfinally = "endfinally", 0xDC, InlineNone, C0, C0;
    Leave = "leave", 0xDD, InlineBrTarget, C0, C0;
    LeaveS = "leave.s", 0xDE, ShortInlineBrTarget, C0, C0;
    StindI = "stind.i", 0xDF, InlineNone, C2, C0;
    ConvU = "conv.u", 0xE0, InlineNone, C1, C1;
    Arglist = "arglist", 0xFE00, InlineNone, C0, C1;
    Ceq = "ceq", 0xFE01, InlineNone, C2, C1;
    Cgt = "cgt", 0xFE02, InlineNone, C2, C1;
    CgtUn = "cgt.un", 0xFE03, InlineNone, C2, C1;
    Clt = "clt", 0xFE04, InlineNone, C2, C1;
    CltUn = "clt.un", 0xFE05, InlineNone, C2, C1;
    Ldftn = "ldftn", 0xFE06, InlineMethod, C0, C1;
    Ldvirtftn = "ldvirtftn", 0xFE07, InlineMethod, C1, C1;
    Ldarg = "ldarg", 0xFE09, InlineArg, C0, C1;
    Ldarga = "ldarga", 0xFE0A, InlineArg, C0, C1;
    Starg = "starg", 0xFE0B, InlineArg, C1, C0;
    Ldloc = "ldloc", 0xFE0C, InlineVar, C0, C1;
    Ldloca = "ldloca", 0xFE0D, InlineVar, C0, C1;
    Stloc = "stloc", 0xFE0E, InlineVar, C1, C0;
    Localloc = "localloc", 0xFE0F, InlineNone, C1, C1;
    Endfilter = "endfilter", 0xFE11, InlineNone, C1, C0;
    Unaligned = "unaligned.", 0xFE12, ShortInlineI, C0, C0;
    Volatile = "volatile.", 0xFE13, InlineNone, C0, C0;
    Tail = "tail.", 0xFE14, InlineNone, C0, C0;
    Initobj = "initobj", 0xFE15, InlineType, C1, C0;
    Constrained = "constrained.", 0xFE16, InlineType, C0, C0;
    Cpblk = "cpblk", 0xFE17, InlineNone, C3, C0;
    Initblk = "initblk", 0xFE18, InlineNone, C3, C0;
    No = "no.", 0xFE19, ShortInlineI, C0, C0;
    Rethrow = "rethrow", 0xFE1A, InlineNone, C0, C0;
    Sizeof = "sizeof", 0xFE1C, InlineType, C0, C1;
    Refanytype = "refanytype", 0xFE1D, InlineNone, C1, C1;
    Readonly = "readonly.", 0xFE1E, InlineNone, C0, C0;
}

impl Opcode {
    /// Number of bytes taken by the opcode itself
    pub fn size(self) -> usize {
        if self.code() > 0xFF {
            2
        } else {
            1
        }
    }

    /// Short-form counterpart of a long branch (or `None` if this isn't a long branch)
    pub fn short_form(self) -> Option<Opcode> {
        use Opcode::*;
        Some(match self {
            Br => BrS,
            Brfalse => BrfalseS,
            Brtrue => BrtrueS,
            Beq => BeqS,
            Bge => BgeS,
            Bgt => BgtS,
            Ble => BleS,
            Blt => BltS,
            BneUn => BneUnS,
            BgeUn => BgeUnS,
            BgtUn => BgtUnS,
            BleUn => BleUnS,
            BltUn => BltUnS,
            Leave => LeaveS,
            _ => return None,
        })
    }

    /// Long-form counterpart of a short branch (or `None` if this isn't a short branch)
    pub fn long_form(self) -> Option<Opcode> {
        use Opcode::*;
        Some(match self {
            BrS => Br,
            BrfalseS => Brfalse,
            BrtrueS => Brtrue,
            BeqS => Beq,
            BgeS => Bge,
            BgtS => Bgt,
            BleS => Ble,
            BltS => Blt,
            BneUnS => BneUn,
            BgeUnS => BgeUn,
            BgtUnS => BgtUn,
            BleUnS => BleUn,
            BltUnS => BltUn,
            LeaveS => Leave,
            _ => return None,
        })
    }

    /// Does the instruction carry one or more jump targets?
    pub fn is_branch(self) -> bool {
        self.operand_kind().is_branch() || self == Opcode::Switch
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Width of the immediate used by a particular encoding of a merged opcode
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MacroOperand {
    /// Value is implied by the opcode (eg. `ldloc.2`, `ldc.i4.m1`)
    Implied(i32),
    U8,
    I8,
    U16,
    I32,
}

impl MacroOperand {
    pub fn size(self) -> usize {
        match self {
            MacroOperand::Implied(_) => 0,
            MacroOperand::U8 | MacroOperand::I8 => 1,
            MacroOperand::U16 => 2,
            MacroOperand::I32 => 4,
        }
    }
}

/// A concrete encoding of one of the merged opcode families
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct MacroForm {
    pub code: u16,
    pub operand: MacroOperand,
}

impl MacroForm {
    /// Encoded width of this form (opcode and immediate)
    pub fn width(self) -> usize {
        let opcode = if self.code > 0xFF { 2 } else { 1 };
        opcode + self.operand.size()
    }

    /// Pick the shortest encoding of a merged opcode for a given value
    ///
    /// Returns `None` for opcodes that have a single encoding.
    pub fn shortest(opcode: Opcode, value: i64) -> Option<MacroForm> {
        use MacroOperand::*;
        let (code, operand) = match opcode {
            Opcode::Ldarg => match value {
                0..=3 => (0x02 + value as u16, Implied(value as i32)),
                4..=255 => (0x0E, U8),
                _ => (0xFE09, U16),
            },
            Opcode::Ldloc => match value {
                0..=3 => (0x06 + value as u16, Implied(value as i32)),
                4..=255 => (0x11, U8),
                _ => (0xFE0C, U16),
            },
            Opcode::Stloc => match value {
                0..=3 => (0x0A + value as u16, Implied(value as i32)),
                4..=255 => (0x13, U8),
                _ => (0xFE0E, U16),
            },
            Opcode::Ldarga => short_or_wide(value, 0x0F, 0xFE0A),
            Opcode::Starg => short_or_wide(value, 0x10, 0xFE0B),
            Opcode::Ldloca => short_or_wide(value, 0x12, 0xFE0D),
            Opcode::LdcI4 => match value {
                -1 => (0x15, Implied(-1)),
                0..=8 => (0x16 + value as u16, Implied(value as i32)),
                -128..=127 => (0x1F, I8),
                _ => (0x20, I32),
            },
            _ => return None,
        };
        Some(MacroForm { code, operand })
    }

    /// Recognize a non-canonical encoding of a merged opcode
    pub fn decode(code: u16) -> Option<(Opcode, MacroOperand)> {
        use MacroOperand::*;
        Some(match code {
            0x02..=0x05 => (Opcode::Ldarg, Implied(code as i32 - 0x02)),
            0x06..=0x09 => (Opcode::Ldloc, Implied(code as i32 - 0x06)),
            0x0A..=0x0D => (Opcode::Stloc, Implied(code as i32 - 0x0A)),
            0x0E => (Opcode::Ldarg, U8),
            0x0F => (Opcode::Ldarga, U8),
            0x10 => (Opcode::Starg, U8),
            0x11 => (Opcode::Ldloc, U8),
            0x12 => (Opcode::Ldloca, U8),
            0x13 => (Opcode::Stloc, U8),
            0x15 => (Opcode::LdcI4, Implied(-1)),
            0x16..=0x1E => (Opcode::LdcI4, Implied(code as i32 - 0x16)),
            0x1F => (Opcode::LdcI4, I8),
            _ => return None,
        })
    }
}

fn short_or_wide(value: i64, short: u16, wide: u16) -> (u16, MacroOperand) {
    if (0..=255).contains(&value) {
        (short, MacroOperand::U8)
    } else {
        (wide, MacroOperand::U16)
    }
}
