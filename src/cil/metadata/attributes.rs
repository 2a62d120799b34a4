use bitflags::bitflags;

bitflags! {
    /// Attributes on methods
    ///
    /// The low three bits are an access level (not independent flags); use [`Self::access`].
    ///
    /// [0]: https://www.ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf#page=281
    pub struct MethodAttributes: u16 {
        const PRIVATE = 0x0001;
        const FAM_AND_ASSEM = 0x0002;
        const ASSEMBLY = 0x0003;
        const FAMILY = 0x0004;
        const FAM_OR_ASSEM = 0x0005;
        const PUBLIC = 0x0006;
        const STATIC = 0x0010;
        const FINAL = 0x0020;
        const VIRTUAL = 0x0040;
        const HIDE_BY_SIG = 0x0080;
        const NEW_SLOT = 0x0100;
        const ABSTRACT = 0x0400;
        const SPECIAL_NAME = 0x0800;
        const RT_SPECIAL_NAME = 0x1000;
    }
}

bitflags! {
    /// Attributes on fields
    ///
    /// [0]: https://www.ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf#page=276
    pub struct FieldAttributes: u16 {
        const PRIVATE = 0x0001;
        const FAM_AND_ASSEM = 0x0002;
        const ASSEMBLY = 0x0003;
        const FAMILY = 0x0004;
        const FAM_OR_ASSEM = 0x0005;
        const PUBLIC = 0x0006;
        const STATIC = 0x0010;
        const INIT_ONLY = 0x0020;
        const LITERAL = 0x0040;
        const NOT_SERIALIZED = 0x0080;
        const SPECIAL_NAME = 0x0200;
        const RT_SPECIAL_NAME = 0x0400;
        const HAS_DEFAULT = 0x8000;
    }
}

const ACCESS_MASK: u16 = 0x0007;

impl MethodAttributes {
    /// Access level alone
    pub fn access(self) -> MethodAttributes {
        MethodAttributes::from_bits_truncate(self.bits() & ACCESS_MASK)
    }
}

impl FieldAttributes {
    /// Access level alone
    pub fn access(self) -> FieldAttributes {
        FieldAttributes::from_bits_truncate(self.bits() & ACCESS_MASK)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn access_is_a_level_not_a_flag() {
        let attrs = MethodAttributes::PUBLIC | MethodAttributes::STATIC;
        assert_eq!(attrs.access(), MethodAttributes::PUBLIC);
        assert_ne!(attrs.access(), MethodAttributes::FAMILY);

        let field = FieldAttributes::PRIVATE | FieldAttributes::INIT_ONLY;
        assert_eq!(field.access(), FieldAttributes::PRIVATE);
    }
}
