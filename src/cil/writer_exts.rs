use super::{
    Error, FieldData, MethodAttributes, MethodData, Opcode, Operand, TypeData, Writer,
};

/// Typed emit helpers
///
/// These pick the right opcode for what is being loaded, stored or called so that callers don't
/// have to (eg. `ldsfld` vs. `ldfld`, `call` vs. `callvirt`).
pub trait WriterExts<'g> {
    /// Push an integer constant onto the stack
    fn load_int(&mut self, value: i32) -> Result<&mut Self, Error>;

    /// Push a long constant onto the stack
    ///
    /// Small values are loaded as `int` and widened with `conv.i8`: `ldc.i4.2 conv.i8` is 2 bytes
    /// while `ldc.i8 2` is 9.
    fn load_long(&mut self, value: i64) -> Result<&mut Self, Error>;

    fn load_float(&mut self, value: f32) -> Result<&mut Self, Error>;
    fn load_double(&mut self, value: f64) -> Result<&mut Self, Error>;
    fn load_bool(&mut self, value: bool) -> Result<&mut Self, Error>;
    fn load_string(&mut self, value: &str) -> Result<&mut Self, Error>;
    fn load_null(&mut self) -> Result<&mut Self, Error>;

    fn load_local(&mut self, index: u16) -> Result<&mut Self, Error>;
    fn store_local(&mut self, index: u16) -> Result<&mut Self, Error>;
    fn load_local_address(&mut self, index: u16) -> Result<&mut Self, Error>;
    fn load_arg(&mut self, index: u16) -> Result<&mut Self, Error>;
    fn store_arg(&mut self, index: u16) -> Result<&mut Self, Error>;

    /// Load the receiver of the method being edited
    ///
    /// Fails for static methods, which have no receiver.
    fn load_this(&mut self) -> Result<&mut Self, Error>;

    /// Load a field, popping the instance first for instance fields
    fn load_field(&mut self, field: &'g FieldData<'g>) -> Result<&mut Self, Error>;

    /// Store into a field, popping the value (and the instance for instance fields)
    fn store_field(&mut self, field: &'g FieldData<'g>) -> Result<&mut Self, Error>;

    /// Call a method, virtually if it is virtual
    fn call(&mut self, method: &'g MethodData<'g>) -> Result<&mut Self, Error>;

    /// Construct a new object
    fn new_object(&mut self, constructor: &'g MethodData<'g>) -> Result<&mut Self, Error>;

    /// Box the value on top of the stack, if it is of a value type
    fn box_if_value_type(&mut self, ty: &'g TypeData<'g>) -> Result<&mut Self, Error>;

    /// Throw a new exception constructed from a message (`.ctor(string)`)
    fn throw_new(
        &mut self,
        constructor: &'g MethodData<'g>,
        message: &str,
    ) -> Result<&mut Self, Error>;

    /// Return from the method
    fn return_(&mut self) -> Result<&mut Self, Error>;
}

impl<'b, 'g> WriterExts<'g> for Writer<'b, 'g> {
    fn load_int(&mut self, value: i32) -> Result<&mut Self, Error> {
        self.emit_with(Opcode::LdcI4, Operand::Int32(value))
    }

    fn load_long(&mut self, value: i64) -> Result<&mut Self, Error> {
        match i32::try_from(value) {
            Ok(small) if (-128..=127).contains(&small) => {
                self.load_int(small)?.emit(Opcode::ConvI8)
            }
            _ => self.emit_with(Opcode::LdcI8, Operand::Int64(value)),
        }
    }

    fn load_float(&mut self, value: f32) -> Result<&mut Self, Error> {
        self.emit_with(Opcode::LdcR4, Operand::Float32(value))
    }

    fn load_double(&mut self, value: f64) -> Result<&mut Self, Error> {
        self.emit_with(Opcode::LdcR8, Operand::Float64(value))
    }

    fn load_bool(&mut self, value: bool) -> Result<&mut Self, Error> {
        self.load_int(value as i32)
    }

    fn load_string(&mut self, value: &str) -> Result<&mut Self, Error> {
        self.emit_with(Opcode::Ldstr, Operand::String(value.to_owned()))
    }

    fn load_null(&mut self) -> Result<&mut Self, Error> {
        self.emit(Opcode::Ldnull)
    }

    fn load_local(&mut self, index: u16) -> Result<&mut Self, Error> {
        self.emit_with(Opcode::Ldloc, Operand::Local(index))
    }

    fn store_local(&mut self, index: u16) -> Result<&mut Self, Error> {
        self.emit_with(Opcode::Stloc, Operand::Local(index))
    }

    fn load_local_address(&mut self, index: u16) -> Result<&mut Self, Error> {
        self.emit_with(Opcode::Ldloca, Operand::Local(index))
    }

    fn load_arg(&mut self, index: u16) -> Result<&mut Self, Error> {
        self.emit_with(Opcode::Ldarg, Operand::Argument(index))
    }

    fn store_arg(&mut self, index: u16) -> Result<&mut Self, Error> {
        self.emit_with(Opcode::Starg, Operand::Argument(index))
    }

    fn load_this(&mut self) -> Result<&mut Self, Error> {
        let method = self.body().method;
        if !method.signature.has_this {
            return Err(Error::ShapeMismatch(format!(
                "{:?} has no receiver",
                method
            )));
        }
        self.load_arg(0)
    }

    fn load_field(&mut self, field: &'g FieldData<'g>) -> Result<&mut Self, Error> {
        let opcode = if field.is_static() {
            Opcode::Ldsfld
        } else {
            Opcode::Ldfld
        };
        self.emit_with(opcode, Operand::Field(field))
    }

    fn store_field(&mut self, field: &'g FieldData<'g>) -> Result<&mut Self, Error> {
        let opcode = if field.is_static() {
            Opcode::Stsfld
        } else {
            Opcode::Stfld
        };
        self.emit_with(opcode, Operand::Field(field))
    }

    fn call(&mut self, method: &'g MethodData<'g>) -> Result<&mut Self, Error> {
        let opcode = if method.attributes.contains(MethodAttributes::VIRTUAL) {
            Opcode::Callvirt
        } else {
            Opcode::Call
        };
        self.emit_with(opcode, Operand::Method(method))
    }

    fn new_object(&mut self, constructor: &'g MethodData<'g>) -> Result<&mut Self, Error> {
        if !constructor.is_constructor() {
            return Err(Error::ShapeMismatch(format!(
                "{:?} is not a constructor",
                constructor
            )));
        }
        self.emit_with(Opcode::Newobj, Operand::Method(constructor))
    }

    fn box_if_value_type(&mut self, ty: &'g TypeData<'g>) -> Result<&mut Self, Error> {
        if ty.is_value_type {
            self.emit_with(Opcode::Box, Operand::Type(ty))
        } else {
            Ok(self)
        }
    }

    fn throw_new(
        &mut self,
        constructor: &'g MethodData<'g>,
        message: &str,
    ) -> Result<&mut Self, Error> {
        self.load_string(message)?
            .new_object(constructor)?
            .emit(Opcode::Throw)
    }

    fn return_(&mut self) -> Result<&mut Self, Error> {
        self.emit(Opcode::Ret)
    }
}
