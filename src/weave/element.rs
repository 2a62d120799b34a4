use crate::cil::{FieldData, MethodData, TypeData};
use std::fmt;

/// Kinds of program element a marker can be attached to
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ElementKind {
    Method,
    Property,
    Parameter,
    ReturnValue,
    Field,
    Event,
    Type,
    GenericParameter,
}

impl ElementKind {
    pub const ALL: &'static [ElementKind] = &[
        ElementKind::Method,
        ElementKind::Property,
        ElementKind::Parameter,
        ElementKind::ReturnValue,
        ElementKind::Field,
        ElementKind::Event,
        ElementKind::Type,
        ElementKind::GenericParameter,
    ];
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Method => "method",
            ElementKind::Property => "property",
            ElementKind::Parameter => "parameter",
            ElementKind::ReturnValue => "return value",
            ElementKind::Field => "field",
            ElementKind::Event => "event",
            ElementKind::Type => "type",
            ElementKind::GenericParameter => "generic parameter",
        };
        f.write_str(name)
    }
}

/// Program element a marker was found on
#[derive(Clone, Debug)]
pub enum Element<'g> {
    Method(&'g MethodData<'g>),

    /// Property, through its accessors
    Property {
        declaring_type: &'g TypeData<'g>,
        name: String,
        getter: Option<&'g MethodData<'g>>,
        setter: Option<&'g MethodData<'g>>,
    },

    /// Parameter of a method (0 is the first declared parameter, not `this`)
    Parameter {
        method: &'g MethodData<'g>,
        index: usize,
    },

    ReturnValue(&'g MethodData<'g>),

    Field(&'g FieldData<'g>),

    /// Event, through its accessors
    Event {
        declaring_type: &'g TypeData<'g>,
        name: String,
        add: Option<&'g MethodData<'g>>,
        remove: Option<&'g MethodData<'g>>,
    },

    Type(&'g TypeData<'g>),

    GenericParameter {
        owner: &'g TypeData<'g>,
        index: usize,
    },
}

impl<'g> Element<'g> {
    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Method(_) => ElementKind::Method,
            Element::Property { .. } => ElementKind::Property,
            Element::Parameter { .. } => ElementKind::Parameter,
            Element::ReturnValue(_) => ElementKind::ReturnValue,
            Element::Field(_) => ElementKind::Field,
            Element::Event { .. } => ElementKind::Event,
            Element::Type(_) => ElementKind::Type,
            Element::GenericParameter { .. } => ElementKind::GenericParameter,
        }
    }

    /// Method whose body gets rewritten when weaving this element, if there is an obvious one
    ///
    /// Properties and events have two candidate accessors; the getter and adder win.
    pub fn method(&self) -> Option<&'g MethodData<'g>> {
        match self {
            Element::Method(method)
            | Element::ReturnValue(method)
            | Element::Parameter { method, .. } => Some(*method),
            Element::Property { getter, setter, .. } => getter.or(*setter),
            Element::Event { add, remove, .. } => add.or(*remove),
            Element::Field(_) | Element::Type(_) | Element::GenericParameter { .. } => None,
        }
    }

    /// Name of the member, as used in diagnostics
    pub fn member_name(&self) -> String {
        match self {
            Element::Method(method) => method_name(method),
            Element::Property {
                declaring_type,
                name,
                ..
            }
            | Element::Event {
                declaring_type,
                name,
                ..
            } => format!("{}::{}", declaring_type.full_name(), name),
            Element::Parameter { method, index } => {
                format!("{} (parameter {})", method_name(method), index)
            }
            Element::ReturnValue(method) => format!("{} (return value)", method_name(method)),
            Element::Field(field) => {
                format!("{}::{}", field.declaring_type.full_name(), field.name)
            }
            Element::Type(ty) => ty.full_name(),
            Element::GenericParameter { owner, index } => {
                format!("{} (generic parameter {})", owner.full_name(), index)
            }
        }
    }
}

fn method_name(method: &MethodData<'_>) -> String {
    format!("{}::{}", method.declaring_type.full_name(), method.name)
}
