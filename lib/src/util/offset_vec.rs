use crate::jvm::class_file::Serialize;
use byteorder::WriteBytesExt;
use std::fmt;

/// Elements that occupy some number of slots in an `OffsetVec`
pub trait Width {
    fn width(&self) -> usize;
}

/// Entries addressed by the sum of the widths of the preceding entries, rather than by position
///
/// The constant pool is the motivating case: `long` and `double` constants take up two indices,
/// and the index after them is unusable.
#[derive(Clone, PartialEq, Eq)]
pub struct OffsetVec<T> {
    /// Entries, sorted by their offset
    entries: Vec<(Offset, T)>,

    /// Offset the next pushed entry will get
    offset_len: Offset,
}

/// Offset into an `OffsetVec`
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

/// Why an entry could not be read or replaced
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OffsetError {
    /// Offset lands inside a wider entry
    Misaligned,

    /// Offset is past the end
    OutOfBounds,

    /// Replacement has width `.0` but the entry it replaces has width `.1`
    WidthMismatch(usize, usize),
}

impl<T: Width> OffsetVec<T> {
    pub fn new_starting_at(initial_offset: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            offset_len: initial_offset,
        }
    }

    /// Number of entries (not slots)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn offset_len(&self) -> Offset {
        self.offset_len
    }

    pub fn push(&mut self, entry: T) -> Offset {
        let offset = self.offset_len;
        self.offset_len.0 += entry.width();
        self.entries.push((offset, entry));
        offset
    }

    fn position(&self, offset: Offset) -> Result<usize, OffsetError> {
        self.entries
            .binary_search_by_key(&offset, |(entry_offset, _)| *entry_offset)
            .map_err(|insert_at| {
                if insert_at == self.entries.len() {
                    OffsetError::OutOfBounds
                } else {
                    OffsetError::Misaligned
                }
            })
    }

    pub fn get_offset(&self, offset: Offset) -> Result<&T, OffsetError> {
        let position = self.position(offset)?;
        Ok(&self.entries[position].1)
    }

    /// Overwrite the entry at an offset, keeping every other offset stable
    pub fn set_offset(&mut self, offset: Offset, entry: T) -> Result<T, OffsetError> {
        let position = self.position(offset)?;
        let slot = &mut self.entries[position].1;
        if slot.width() != entry.width() {
            return Err(OffsetError::WidthMismatch(entry.width(), slot.width()));
        }
        Ok(std::mem::replace(slot, entry))
    }

    pub fn offsets(&self) -> impl Iterator<Item = Offset> + '_ {
        self.entries.iter().map(|(offset, _)| *offset)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (Offset, &T)> + '_ {
        self.entries.iter().map(|(offset, entry)| (*offset, entry))
    }
}

/// The leading `u16` is the _offset_ length, which is how the constant pool count is encoded
/// (it includes the unusable slots after 8-byte constants).
impl<T: Serialize> Serialize for OffsetVec<T> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.offset_len.0 as u16).serialize(writer)?;
        for (_, entry) in &self.entries {
            entry.serialize(writer)?;
        }
        Ok(())
    }
}

impl<T: fmt::Debug> fmt::Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|(offset, entry)| format!("#{} = {:?}", offset.0, entry)),
            )
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    enum Entry {
        Int(u8),
        Long(u8),
    }

    impl Width for Entry {
        fn width(&self) -> usize {
            match self {
                Entry::Int(_) => 1,
                Entry::Long(_) => 2,
            }
        }
    }

    fn pool() -> OffsetVec<Entry> {
        let mut pool = OffsetVec::new_starting_at(Offset(1));
        pool.push(Entry::Int(1));
        pool.push(Entry::Long(2));
        pool.push(Entry::Int(3));
        pool
    }

    #[test]
    fn wide_entries_skip_an_offset() {
        let pool = pool();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.offset_len(), Offset(5));
        assert_eq!(
            pool.offsets().collect::<Vec<_>>(),
            vec![Offset(1), Offset(2), Offset(4)]
        );
        assert_eq!(pool.get_offset(Offset(4)), Ok(&Entry::Int(3)));
        assert_eq!(pool.get_offset(Offset(3)), Err(OffsetError::Misaligned));
        assert_eq!(pool.get_offset(Offset(5)), Err(OffsetError::OutOfBounds));
    }

    #[test]
    fn overwriting_keeps_widths() {
        let mut pool = pool();
        assert_eq!(pool.set_offset(Offset(2), Entry::Long(9)), Ok(Entry::Long(2)));
        assert_eq!(pool.get_offset(Offset(2)), Ok(&Entry::Long(9)));
        assert_eq!(
            pool.set_offset(Offset(2), Entry::Int(9)),
            Err(OffsetError::WidthMismatch(1, 2))
        );
        assert_eq!(
            pool.set_offset(Offset(7), Entry::Int(9)),
            Err(OffsetError::OutOfBounds)
        );
    }

    #[test]
    fn serialized_count_includes_unusable_slots() {
        impl Serialize for Entry {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                match self {
                    Entry::Int(b) | Entry::Long(b) => writer.write_u8(*b),
                }
            }
        }

        let mut bytes = vec![];
        pool().serialize(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0, 5, 1, 2, 3]);
    }
}
