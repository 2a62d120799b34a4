use std::fmt::{Debug, Error, Formatter};
use std::iter::Enumerate;
use std::ops::Sub;
use std::result::Result;
use std::slice::Iter;

/// Elements with an encoded width in bytes
pub trait Width {
    fn width(&self) -> usize;
}

/// Byte offset into a method body
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct Offset(pub usize);

impl Sub for Offset {
    type Output = isize;

    fn sub(self, other: Offset) -> isize {
        (self.0 as isize) - (other.0 as isize)
    }
}

/// Entries keyed by the byte offset at which they start
///
/// Branch operands and exception handler boundaries in raw bytecode are byte offsets, but the
/// instruction model refers to instructions by identity. Both the decoder and the splice engine
/// need to translate the former into the latter, and both can only do so once every instruction
/// has been seen (forward branches point at instructions that don't exist yet). The table is
/// that translation: fill it in one pass, then look offsets up in a second.
///
/// Offsets must be inserted in strictly increasing order. Lookups use binary search.
#[derive(Clone)]
pub struct OffsetTable<T> {
    /// Entries, along with their offset
    entries: Vec<(Offset, T)>,
}

impl<T> OffsetTable<T> {
    /// New empty table
    pub fn new() -> OffsetTable<T> {
        OffsetTable { entries: vec![] }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record an entry at an explicit offset
    ///
    /// Returns `false` (and does nothing) if the offset does not come strictly after the last
    /// entry's offset.
    pub fn insert_at(&mut self, offset: Offset, value: T) -> bool {
        if let Some((last, _)) = self.entries.last() {
            if offset <= *last {
                return false;
            }
        }
        self.entries.push((offset, value));
        true
    }

    /// Get an entry (and its index) by its offset
    pub fn get_offset(&self, offset: Offset) -> OffsetResult<'_, T> {
        match self.entries.binary_search_by_key(&offset, |(off, _)| *off) {
            Err(insert_at) if insert_at == self.entries.len() => OffsetResult::TooLarge,
            Err(insert_at) => OffsetResult::InvalidOffset(insert_at),
            Ok(found_idx) => OffsetResult::Ok(found_idx, &self.entries[found_idx].1),
        }
    }

    pub fn iter(&self) -> OffsetTableIter<'_, T> {
        self.into_iter()
    }
}

impl<T> Default for OffsetTable<T> {
    fn default() -> Self {
        OffsetTable::new()
    }
}

impl<A: PartialEq> PartialEq for OffsetTable<A> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

pub enum OffsetResult<'a, T> {
    /// Element was found
    Ok(usize, &'a T),

    /// Offset falls in the middle of the element at this index (or before it)
    InvalidOffset(usize),

    /// Offset is past the last element
    TooLarge,
}

impl<'a, T> OffsetResult<'a, T> {
    /// Convert to an `Option` and keep only the value found
    pub fn ok(&self) -> Option<&'a T> {
        match self {
            OffsetResult::Ok(_, found) => Some(found),
            OffsetResult::InvalidOffset(_) | OffsetResult::TooLarge => None,
        }
    }
}

/// Iterator for borrowed `OffsetTable`
pub struct OffsetTableIter<'a, T>(Enumerate<Iter<'a, (Offset, T)>>);

impl<'a, T> Iterator for OffsetTableIter<'a, T> {
    type Item = (Offset, usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(idx, (off, elem))| (*off, idx, elem))
    }
}

impl<'a, T> IntoIterator for &'a OffsetTable<T> {
    type Item = (Offset, usize, &'a T);
    type IntoIter = OffsetTableIter<'a, T>;

    fn into_iter(self) -> OffsetTableIter<'a, T> {
        OffsetTableIter(self.entries.iter().enumerate())
    }
}

impl<T: Debug> Debug for OffsetTable<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let mut list = f.debug_list();
        for (off, elem) in &self.entries {
            list.entry(&format_args!("IL_{:04x} = {:?}", off.0, elem));
        }
        list.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn iterates_in_offset_order() {
        let mut table: OffsetTable<char> = OffsetTable::new();
        table.insert_at(Offset(0), 'a');
        table.insert_at(Offset(1), 'b');
        table.insert_at(Offset(6), 'c');
        assert_eq!(
            table.iter().map(|(off, idx, c)| (off, idx, *c)).collect::<Vec<_>>(),
            vec![(Offset(0), 0, 'a'), (Offset(1), 1, 'b'), (Offset(6), 2, 'c')]
        );
        assert_eq!(format!("{:?}", table), "[IL_0000 = 'a', IL_0001 = 'b', IL_0006 = 'c']");
    }

    #[test]
    fn lookup_distinguishes_boundaries() {
        let mut table: OffsetTable<&str> = OffsetTable::new();
        assert!(table.insert_at(Offset(0), "nop"));
        assert!(table.insert_at(Offset(1), "ldc.i4"));
        assert!(table.insert_at(Offset(6), "ret"));

        assert_eq!(table.get_offset(Offset(1)).ok(), Some(&"ldc.i4"));
        assert!(matches!(
            table.get_offset(Offset(3)),
            OffsetResult::InvalidOffset(2)
        ));
        assert!(matches!(table.get_offset(Offset(7)), OffsetResult::TooLarge));
    }

    #[test]
    fn out_of_order_insert_is_rejected() {
        let mut table: OffsetTable<u8> = OffsetTable::new();
        assert!(table.insert_at(Offset(4), 1));
        assert!(!table.insert_at(Offset(4), 2));
        assert!(!table.insert_at(Offset(2), 3));
        assert_eq!(table.len(), 1);
    }
}
