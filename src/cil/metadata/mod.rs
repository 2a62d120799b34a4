//! Types and members referenced from method bodies
//!
//! All metadata lives in arenas for the duration of a weaving run and is referred to through
//! `&'g` references. Two references are the same entity exactly when they point to the same
//! arena slot.

use elsa::map::FrozenMap;
use elsa::FrozenVec;
use std::fmt;
use typed_arena::Arena;

mod attributes;
mod core_types;
mod tokens;

pub use attributes::*;
pub use core_types::*;
pub use tokens::*;

pub struct MetadataArenas<'g> {
    type_arena: Arena<TypeData<'g>>,
    method_arena: Arena<MethodData<'g>>,
    field_arena: Arena<FieldData<'g>>,
    call_site_arena: Arena<CallSiteData<'g>>,
}

impl<'g> MetadataArenas<'g> {
    pub fn new() -> Self {
        MetadataArenas {
            type_arena: Arena::new(),
            method_arena: Arena::new(),
            field_arena: Arena::new(),
            call_site_arena: Arena::new(),
        }
    }
}

impl<'g> Default for MetadataArenas<'g> {
    fn default() -> Self {
        MetadataArenas::new()
    }
}

/// Every type and member known to one weaving run
///
/// This is what the host's metadata reader populates before bodies are decoded, and what tokens
/// resolve into.
pub struct MetadataGraph<'g> {
    arenas: &'g MetadataArenas<'g>,
    types: FrozenMap<String, &'g TypeData<'g>>,
}

impl<'g> MetadataGraph<'g> {
    /// New empty graph
    pub fn new(arenas: &'g MetadataArenas<'g>) -> Self {
        MetadataGraph {
            arenas,
            types: FrozenMap::new(),
        }
    }

    /// Find a type by its full name (eg. `System.Int32`)
    pub fn lookup_type(&'g self, full_name: &str) -> Option<&'g TypeData<'g>> {
        self.types.get(full_name)
    }

    /// Add a new type to the graph
    ///
    /// A type with the same full name replaces the earlier one for lookups.
    pub fn add_type(&self, data: TypeData<'g>) -> &'g TypeData<'g> {
        let data = &*self.arenas.type_arena.alloc(data);
        self.types.insert(data.full_name(), data);
        data
    }

    /// Add a method to the graph and to its declaring type
    ///
    /// Declaring the same method twice (same name, signature and staticness) returns the first.
    pub fn add_method(&self, method: MethodData<'g>) -> &'g MethodData<'g> {
        if let Some(m) = method.declaring_type.methods.iter().find(|m| {
            m.name == method.name
                && m.signature == method.signature
                && m.is_static() == method.is_static()
        }) {
            m
        } else {
            let data = &*self.arenas.method_arena.alloc(method);
            data.declaring_type.methods.push(data);
            data
        }
    }

    /// Add a field to the graph and to its declaring type
    pub fn add_field(&self, field: FieldData<'g>) -> &'g FieldData<'g> {
        let data = &*self.arenas.field_arena.alloc(field);
        data.declaring_type.fields.push(data);
        data
    }

    /// Add a standalone signature (the operand of `calli`)
    pub fn add_call_site(&self, call_site: CallSiteData<'g>) -> &'g CallSiteData<'g> {
        self.arenas.call_site_arena.alloc(call_site)
    }

    /// Add the handful of `System` types the editing helpers need
    pub fn insert_core_types(&self) -> CoreTypes<'g> {
        CoreTypes::add_to_graph(self)
    }
}

pub struct TypeData<'g> {
    pub namespace: String,
    pub name: String,

    /// Value types are boxed when loaded as `object`
    pub is_value_type: bool,

    pub methods: FrozenVec<&'g MethodData<'g>>,
    pub fields: FrozenVec<&'g FieldData<'g>>,
}

impl<'g> TypeData<'g> {
    pub fn new(namespace: &str, name: &str, is_value_type: bool) -> TypeData<'g> {
        TypeData {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            is_value_type,
            methods: FrozenVec::new(),
            fields: FrozenVec::new(),
        }
    }

    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Find a method declared on this type by name
    pub fn method(&'g self, name: &str) -> Option<&'g MethodData<'g>> {
        self.methods.iter().find(|m| m.name == name)
    }
}

impl<'g> PartialEq for TypeData<'g> {
    fn eq(&self, other: &TypeData<'g>) -> bool {
        self.namespace == other.namespace && self.name == other.name
    }
}

impl<'g> Eq for TypeData<'g> {}

impl<'g> fmt::Debug for TypeData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Parameters and return type of a method or call site
#[derive(Clone, PartialEq, Eq)]
pub struct MethodSignature<'g> {
    /// Is there an implicit `this` argument in slot 0?
    pub has_this: bool,

    pub parameters: Vec<&'g TypeData<'g>>,

    /// `None` for `void`
    pub return_type: Option<&'g TypeData<'g>>,
}

impl<'g> MethodSignature<'g> {
    pub fn new(
        has_this: bool,
        parameters: Vec<&'g TypeData<'g>>,
        return_type: Option<&'g TypeData<'g>>,
    ) -> MethodSignature<'g> {
        MethodSignature {
            has_this,
            parameters,
            return_type,
        }
    }

    /// Number of argument slots, including the implicit receiver
    pub fn argument_count(&self) -> usize {
        self.parameters.len() + self.has_this as usize
    }

    pub fn returns_value(&self) -> bool {
        self.return_type.is_some()
    }
}

impl<'g> fmt::Debug for MethodSignature<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_this {
            f.write_str("instance ")?;
        }
        match self.return_type {
            Some(ret) => write!(f, "{:?}", ret)?,
            None => f.write_str("void")?,
        }
        f.write_str("(")?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{:?}", param)?;
        }
        f.write_str(")")
    }
}

#[derive(PartialEq, Eq)]
pub struct MethodData<'g> {
    /// Declaring type
    ///
    /// Note: this is a pointer back to the type (so don't derive `Debug`)
    pub declaring_type: &'g TypeData<'g>,

    pub name: String,
    pub signature: MethodSignature<'g>,
    pub attributes: MethodAttributes,
}

impl<'g> MethodData<'g> {
    pub const CONSTRUCTOR: &'static str = ".ctor";

    pub fn new(
        declaring_type: &'g TypeData<'g>,
        name: &str,
        signature: MethodSignature<'g>,
        attributes: MethodAttributes,
    ) -> MethodData<'g> {
        MethodData {
            declaring_type,
            name: name.to_owned(),
            signature,
            attributes,
        }
    }

    pub fn is_static(&self) -> bool {
        self.attributes.contains(MethodAttributes::STATIC)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == Self::CONSTRUCTOR
    }
}

impl<'g> fmt::Debug for MethodData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}::{}:{:?}",
            self.declaring_type, self.name, self.signature
        )
    }
}

#[derive(PartialEq, Eq)]
pub struct FieldData<'g> {
    /// Declaring type
    ///
    /// Note: this is a pointer back to the type (so don't derive `Debug`)
    pub declaring_type: &'g TypeData<'g>,

    pub name: String,
    pub field_type: &'g TypeData<'g>,
    pub attributes: FieldAttributes,
}

impl<'g> FieldData<'g> {
    pub fn new(
        declaring_type: &'g TypeData<'g>,
        name: &str,
        field_type: &'g TypeData<'g>,
        attributes: FieldAttributes,
    ) -> FieldData<'g> {
        FieldData {
            declaring_type,
            name: name.to_owned(),
            field_type,
            attributes,
        }
    }

    pub fn is_static(&self) -> bool {
        self.attributes.contains(FieldAttributes::STATIC)
    }
}

impl<'g> fmt::Debug for FieldData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {:?}::{}",
            self.field_type, self.declaring_type, self.name
        )
    }
}

/// Standalone signature used by `calli`
#[derive(PartialEq, Eq)]
pub struct CallSiteData<'g> {
    pub signature: MethodSignature<'g>,
}

impl<'g> fmt::Debug for CallSiteData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "callsite {:?}", self.signature)
    }
}

/// Any member `ldtoken` can load
#[derive(Copy, Clone)]
pub enum MemberRef<'g> {
    Type(&'g TypeData<'g>),
    Method(&'g MethodData<'g>),
    Field(&'g FieldData<'g>),
}

impl<'g> PartialEq for MemberRef<'g> {
    fn eq(&self, other: &MemberRef<'g>) -> bool {
        use std::ptr::eq;
        match (self, other) {
            (MemberRef::Type(a), MemberRef::Type(b)) => eq(*a, *b),
            (MemberRef::Method(a), MemberRef::Method(b)) => eq(*a, *b),
            (MemberRef::Field(a), MemberRef::Field(b)) => eq(*a, *b),
            _ => false,
        }
    }
}

impl<'g> Eq for MemberRef<'g> {}

impl<'g> fmt::Debug for MemberRef<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberRef::Type(ty) => ty.fmt(f),
            MemberRef::Method(method) => method.fmt(f),
            MemberRef::Field(field) => field.fmt(f),
        }
    }
}
