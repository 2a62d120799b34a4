//! Metadata tokens
//!
//! In raw bytecode every type, method, field, signature and string operand is a 32-bit token:
//! the top byte picks a metadata table and the low three bytes are a 1-based row. Decoding needs
//! something that maps tokens to entities ([`TokenResolver`]), encoding needs the reverse
//! ([`TokenAllocator`]). The host's metadata reader/writer normally plays both roles;
//! [`TokenTable`] is a self-contained implementation of both.

use super::{CallSiteData, FieldData, MemberRef, MethodData, TypeData};
use crate::util::RefId;
use std::collections::HashMap;
use std::fmt;

/// Metadata table numbers (the top byte of a token)
pub mod table {
    pub const TYPE_REF: u8 = 0x01;
    pub const TYPE_DEF: u8 = 0x02;
    pub const FIELD: u8 = 0x04;
    pub const METHOD_DEF: u8 = 0x06;
    pub const MEMBER_REF: u8 = 0x0A;
    pub const STAND_ALONE_SIG: u8 = 0x11;
    pub const TYPE_SPEC: u8 = 0x1B;
    pub const METHOD_SPEC: u8 = 0x2B;

    /// Not a table: tokens for `ldstr` index the user string heap
    pub const USER_STRING: u8 = 0x70;
}

#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Token(pub u32);

impl Token {
    pub fn new(table: u8, row: u32) -> Token {
        Token(((table as u32) << 24) | (row & 0x00FF_FFFF))
    }

    pub fn table(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn row(self) -> u32 {
        self.0 & 0x00FF_FFFF
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Maps tokens found in raw bytecode to metadata entities
pub trait TokenResolver<'g> {
    fn resolve_type(&self, token: Token) -> Option<&'g TypeData<'g>>;
    fn resolve_method(&self, token: Token) -> Option<&'g MethodData<'g>>;
    fn resolve_field(&self, token: Token) -> Option<&'g FieldData<'g>>;
    fn resolve_call_site(&self, token: Token) -> Option<&'g CallSiteData<'g>>;
    fn resolve_string(&self, token: Token) -> Option<String>;

    /// Resolve the operand of `ldtoken`, which may be any kind of member
    fn resolve_member(&self, token: Token) -> Option<MemberRef<'g>> {
        match token.table() {
            table::FIELD => self.resolve_field(token).map(MemberRef::Field),
            table::METHOD_DEF | table::METHOD_SPEC => {
                self.resolve_method(token).map(MemberRef::Method)
            }
            table::MEMBER_REF => self
                .resolve_method(token)
                .map(MemberRef::Method)
                .or_else(|| self.resolve_field(token).map(MemberRef::Field)),
            _ => self.resolve_type(token).map(MemberRef::Type),
        }
    }
}

/// Hands out tokens for metadata entities when writing raw bytecode
pub trait TokenAllocator<'g> {
    fn type_token(&mut self, ty: &'g TypeData<'g>) -> Token;
    fn method_token(&mut self, method: &'g MethodData<'g>) -> Token;
    fn field_token(&mut self, field: &'g FieldData<'g>) -> Token;
    fn call_site_token(&mut self, call_site: &'g CallSiteData<'g>) -> Token;
    fn string_token(&mut self, string: &str) -> Token;

    fn member_token(&mut self, member: MemberRef<'g>) -> Token {
        match member {
            MemberRef::Type(ty) => self.type_token(ty),
            MemberRef::Method(method) => self.method_token(method),
            MemberRef::Field(field) => self.field_token(field),
        }
    }
}

/// Rows of one table, deduplicated by identity
struct Rows<'g, T> {
    rows: Vec<&'g T>,
    index: HashMap<RefId<'g, T>, u32>,
}

impl<'g, T> Rows<'g, T> {
    fn new() -> Self {
        Rows {
            rows: vec![],
            index: HashMap::new(),
        }
    }

    fn intern(&mut self, value: &'g T) -> u32 {
        let rows = &mut self.rows;
        *self.index.entry(RefId(value)).or_insert_with(|| {
            rows.push(value);
            rows.len() as u32
        })
    }

    fn get(&self, row: u32) -> Option<&'g T> {
        let idx = (row as usize).checked_sub(1)?;
        self.rows.get(idx).copied()
    }
}

/// In-memory token tables: allocates tokens on encode and resolves them on decode
pub struct TokenTable<'g> {
    types: Rows<'g, TypeData<'g>>,
    methods: Rows<'g, MethodData<'g>>,
    fields: Rows<'g, FieldData<'g>>,
    call_sites: Rows<'g, CallSiteData<'g>>,
    strings: Vec<String>,
    string_index: HashMap<String, u32>,
}

impl<'g> TokenTable<'g> {
    pub fn new() -> Self {
        TokenTable {
            types: Rows::new(),
            methods: Rows::new(),
            fields: Rows::new(),
            call_sites: Rows::new(),
            strings: vec![],
            string_index: HashMap::new(),
        }
    }
}

impl<'g> Default for TokenTable<'g> {
    fn default() -> Self {
        TokenTable::new()
    }
}

impl<'g> TokenAllocator<'g> for TokenTable<'g> {
    fn type_token(&mut self, ty: &'g TypeData<'g>) -> Token {
        Token::new(table::TYPE_DEF, self.types.intern(ty))
    }

    fn method_token(&mut self, method: &'g MethodData<'g>) -> Token {
        Token::new(table::METHOD_DEF, self.methods.intern(method))
    }

    fn field_token(&mut self, field: &'g FieldData<'g>) -> Token {
        Token::new(table::FIELD, self.fields.intern(field))
    }

    fn call_site_token(&mut self, call_site: &'g CallSiteData<'g>) -> Token {
        Token::new(table::STAND_ALONE_SIG, self.call_sites.intern(call_site))
    }

    fn string_token(&mut self, string: &str) -> Token {
        let row = match self.string_index.get(string) {
            Some(row) => *row,
            None => {
                self.strings.push(string.to_owned());
                let row = self.strings.len() as u32;
                self.string_index.insert(string.to_owned(), row);
                row
            }
        };
        Token::new(table::USER_STRING, row)
    }
}

impl<'g> TokenResolver<'g> for TokenTable<'g> {
    fn resolve_type(&self, token: Token) -> Option<&'g TypeData<'g>> {
        match token.table() {
            table::TYPE_DEF => self.types.get(token.row()),
            _ => None,
        }
    }

    fn resolve_method(&self, token: Token) -> Option<&'g MethodData<'g>> {
        match token.table() {
            table::METHOD_DEF => self.methods.get(token.row()),
            _ => None,
        }
    }

    fn resolve_field(&self, token: Token) -> Option<&'g FieldData<'g>> {
        match token.table() {
            table::FIELD => self.fields.get(token.row()),
            _ => None,
        }
    }

    fn resolve_call_site(&self, token: Token) -> Option<&'g CallSiteData<'g>> {
        match token.table() {
            table::STAND_ALONE_SIG => self.call_sites.get(token.row()),
            _ => None,
        }
    }

    fn resolve_string(&self, token: Token) -> Option<String> {
        match token.table() {
            table::USER_STRING => {
                let idx = (token.row() as usize).checked_sub(1)?;
                self.strings.get(idx).cloned()
            }
            _ => None,
        }
    }
}
