//! The ELF walk: turns raw file bytes into labelled byte ranges.

use core::{fmt, ops::Range};

use log::{debug, trace};

use crate::{to_usize, Bytes, Error, FileType, Machine, ProgramType, Result, SectionType, StringTable};

/// Number of distinct colour slots annotations cycle through.
pub const COLORS: usize = 6;

/// A labelled half-open byte range `[start, end)` of the dumped buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub start: usize,
    pub end: usize,
    pub label: String,
    /// Colour slot in `0..COLORS`, only used to tell neighbouring ranges apart.
    pub color: usize,
}
impl Annotation {
    pub fn new(start: usize, end: usize, label: impl Into<String>, color: usize) -> Self {
        Self {
            start,
            end,
            label: label.into(),
            color,
        }
    }
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Location of a fixed-size field, relative to the file or to a table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub offset: usize,
    pub size: usize,
}
impl Field {
    pub const fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }
    pub fn end(self) -> usize {
        self.offset.saturating_add(self.size)
    }
    /// The same field inside a table entry starting at `base`.
    pub fn at(self, base: usize) -> Result<Self> {
        let offset = base.checked_add(self.offset).ok_or(Error::IntegerOverflow)?;
        Ok(Self::new(offset, self.size))
    }
}

const MAGIC: Field = Field::new(0x00, 4);
const IDENT_CLASS: Field = Field::new(0x04, 1);
const IDENT_DATA: Field = Field::new(0x05, 1);
const IDENT_VERSION: Field = Field::new(0x06, 1);
const IDENT_OSABI: Field = Field::new(0x07, 1);
const IDENT_ABIVERSION: Field = Field::new(0x08, 1);
const TYPE: Field = Field::new(0x10, 2);
const MACHINE: Field = Field::new(0x12, 2);
const VERSION: Field = Field::new(0x14, 4);
const PROGRAM_TYPE: Field = Field::new(0x00, 4);
const SECTION_NAME: Field = Field::new(0x00, 4);
const SECTION_TYPE: Field = Field::new(0x04, 4);

/// Offsets of every header and table entry field whose position depends on the ELF class.
#[derive(Debug, PartialEq, Eq)]
pub struct HeaderLayout {
    pub entry: Field,
    pub ph_offset: Field,
    pub sh_offset: Field,
    pub flags: Field,
    pub header_size: Field,
    pub ph_entry_size: Field,
    pub ph_count: Field,
    pub sh_entry_size: Field,
    pub sh_count: Field,
    pub section_name_table: Field,
    /// `sh_offset` within a section header.
    pub section_offset: Field,
    /// `sh_size` within a section header.
    pub section_size: Field,
}

pub const ELF32: HeaderLayout = HeaderLayout {
    entry: Field::new(0x18, 4),
    ph_offset: Field::new(0x1c, 4),
    sh_offset: Field::new(0x20, 4),
    flags: Field::new(0x24, 4),
    header_size: Field::new(0x28, 2),
    ph_entry_size: Field::new(0x2a, 2),
    ph_count: Field::new(0x2c, 2),
    sh_entry_size: Field::new(0x2e, 2),
    sh_count: Field::new(0x30, 2),
    section_name_table: Field::new(0x32, 2),
    section_offset: Field::new(0x10, 4),
    section_size: Field::new(0x14, 4),
};

pub const ELF64: HeaderLayout = HeaderLayout {
    entry: Field::new(0x18, 8),
    ph_offset: Field::new(0x20, 8),
    sh_offset: Field::new(0x28, 8),
    flags: Field::new(0x30, 4),
    header_size: Field::new(0x34, 2),
    ph_entry_size: Field::new(0x36, 2),
    ph_count: Field::new(0x38, 2),
    sh_entry_size: Field::new(0x3a, 2),
    sh_count: Field::new(0x3c, 2),
    section_name_table: Field::new(0x3e, 2),
    section_offset: Field::new(0x18, 8),
    section_size: Field::new(0x20, 8),
};

/// `EI_CLASS`, resolved once and used to pick a [`HeaderLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Elf32,
    Elf64,
    Unknown(u8),
}
impl Class {
    pub fn layout(self) -> Option<&'static HeaderLayout> {
        match self {
            Class::Elf32 => Some(&ELF32),
            Class::Elf64 => Some(&ELF64),
            Class::Unknown(_) => None,
        }
    }
}
impl From<u8> for Class {
    fn from(value: u8) -> Self {
        match value {
            1 => Class::Elf32,
            2 => Class::Elf64,
            v => Class::Unknown(v),
        }
    }
}
impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Class::Elf32 => "32-bit",
            Class::Elf64 => "64-bit",
            Class::Unknown(_) => "UNKNOWN",
        })
    }
}

/// `EI_DATA`. Only labelled; multi-byte fields are always read little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Little,
    Big,
    Unknown(u8),
}
impl From<u8> for Encoding {
    fn from(value: u8) -> Self {
        match value {
            1 => Encoding::Little,
            2 => Encoding::Big,
            v => Encoding::Unknown(v),
        }
    }
}
impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Encoding::Little => "little",
            Encoding::Big => "big",
            Encoding::Unknown(_) => "UNKNOWN",
        })
    }
}

/// A program or section header table as described by the ELF header.
#[derive(Debug, Clone, Copy)]
struct Table {
    offset: u64,
    entry_size: u64,
    count: u64,
}
impl Table {
    fn entry(self, index: u64) -> Result<usize> {
        let start = index.checked_mul(self.entry_size)
            .and_then(|relative| relative.checked_add(self.offset))
            .ok_or(Error::IntegerOverflow)?;
        to_usize(start)
    }
    /// Entries that start inside a buffer of `len` bytes, stopping at the first that does not.
    fn entries(self, len: usize) -> TableIter {
        TableIter {
            table: self,
            len,
            index: 0,
        }
    }
}

struct TableIter {
    table: Table,
    len: usize,
    index: u64,
}
impl Iterator for TableIter {
    type Item = (u64, Range<usize>);
    fn next(&mut self) -> Option<Self::Item> {
        if self.index == self.table.count || self.table.entry_size == 0 {
            return None
        }
        let start = self.table.entry(self.index).ok().filter(|&start| start < self.len)?;
        let end = start.saturating_add(to_usize(self.table.entry_size).unwrap_or(usize::MAX));
        let index = self.index;
        self.index += 1;
        Some((index, start..end))
    }
}

/// Accumulates annotations for a single pass over one buffer.
///
/// Every read is bounds-checked: a field cut short by the end of the buffer is
/// labelled `UNKNOWN (truncated)` and fields that start past the end are left
/// out, so a malformed file still produces as much of the dump as possible.
pub struct Annotator<'a> {
    data: Bytes<'a>,
    annotations: Vec<Annotation>,
    color: usize,
}
impl<'a> Annotator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data: Bytes::new(data),
            annotations: Vec::new(),
            color: 0,
        }
    }

    /// Add an annotation, clipped to the buffer. Empty ranges are dropped.
    pub fn push(&mut self, start: usize, end: usize, label: impl Into<String>) {
        let end = end.min(self.data.len());
        if start >= end {
            return
        }
        let label = label.into();
        trace!("{start:#x}..{end:#x} {label}");
        self.annotations.push(Annotation::new(start, end, label, self.color));
        self.color = (self.color + 1) % COLORS;
    }

    /// Walk the header and both header tables, returning annotations sorted by start offset.
    pub fn run(mut self) -> Vec<Annotation> {
        self.header();
        self.annotations.sort_by_key(|annotation| annotation.start);
        self.annotations
    }

    fn header(&mut self) {
        let data = self.data;
        self.record(MAGIC, "Magic Number", data.get(MAGIC.offset, MAGIC.size), |magic| escape(magic));
        let class = self.record(IDENT_CLASS, "Bit", data.u8(IDENT_CLASS.offset).map(Class::from), Class::to_string);
        self.record(IDENT_DATA, "Endianness", data.u8(IDENT_DATA.offset).map(Encoding::from), Encoding::to_string);
        for (field, name) in [
            (IDENT_VERSION, "ELF Version"),
            (IDENT_OSABI, "ABI"),
            (IDENT_ABIVERSION, "ABI Version"),
        ] {
            self.record(field, name, data.u8(field.offset), |&byte| escape(&[byte]));
        }
        self.record(TYPE, "Type", data.u16(TYPE.offset).map(FileType), FileType::to_string);
        self.record(MACHINE, "ISA", data.u16(MACHINE.offset).map(Machine), Machine::to_string);
        self.record(VERSION, "Version", data.u32(VERSION.offset), u32::to_string);

        let Some(layout) = class.and_then(Class::layout) else {
            debug!("no layout for class {class:?}, skipping the rest of the header");
            return
        };
        self.uint(layout.entry, "Entry Point", hex);
        let ph_offset = self.uint(layout.ph_offset, "Program Header Offset", hex);
        let sh_offset = self.uint(layout.sh_offset, "Section Header Offset", hex);
        self.uint(layout.flags, "Flags", hex);
        self.uint(layout.header_size, "Header Size", u64::to_string);
        let ph_entry_size = self.uint(layout.ph_entry_size, "Program Header Entry Size", u64::to_string);
        let ph_count = self.uint(layout.ph_count, "Program Header Count", u64::to_string);
        let sh_entry_size = self.uint(layout.sh_entry_size, "Section Header Entry Size", u64::to_string);
        let sh_count = self.uint(layout.sh_count, "Section Header Count", u64::to_string);
        let name_index = self.uint(layout.section_name_table, "Section Name Index", u64::to_string);

        match (ph_offset, ph_entry_size, ph_count) {
            (Some(offset), Some(entry_size), Some(count)) => self.programs(Table { offset, entry_size, count }),
            _ => debug!("program header table is unreadable, skipping it"),
        }
        match (sh_offset, sh_entry_size, sh_count) {
            (Some(offset), Some(entry_size), Some(count)) => {
                let table = Table { offset, entry_size, count };
                let names = name_index.and_then(|index| self.section_names(layout, table, index));
                self.sections(table, names)
            }
            _ => debug!("section header table is unreadable, skipping it"),
        }
    }

    fn programs(&mut self, table: Table) {
        for (index, entry) in table.entries(self.data.len()) {
            let label = format!("Program Header {index}");
            let ty = PROGRAM_TYPE.at(entry.start).and_then(|field| self.data.u32(field.offset));
            match ty {
                Ok(ty) => self.push(entry.start, entry.end, format!("{label}: {}", ProgramType(ty))),
                Err(e) => self.truncated(entry, &label, e),
            }
        }
    }

    fn sections(&mut self, table: Table, names: Option<StringTable<'a>>) {
        for (index, entry) in table.entries(self.data.len()) {
            let label = format!("Section Header {index}");
            let ty = SECTION_TYPE.at(entry.start).and_then(|field| self.data.u32(field.offset));
            match ty {
                Ok(ty) => {
                    let mut label = format!("{label}: {}", SectionType(ty));
                    if let Some(name) = names.and_then(|names| self.section_name(names, entry.start)) {
                        label.push_str(&format!(" ({name})"));
                    }
                    self.push(entry.start, entry.end, label)
                }
                Err(e) => self.truncated(entry, &label, e),
            }
        }
    }

    /// The entry's name, escaped so control bytes cannot break the dump's line layout.
    fn section_name(&self, names: StringTable<'a>, entry: usize) -> Option<String> {
        let name = SECTION_NAME.at(entry)
            .and_then(|field| self.data.u32(field.offset))
            .and_then(|offset| names.get_bytes(offset));
        match name {
            Ok(name) if !name.is_empty() => Some(escape(name)),
            Ok(_) => None,
            Err(e) => {
                debug!("section name at {entry:#x}: {e}");
                None
            }
        }
    }

    /// Locate the section header string table. `SHN_UNDEF` or an unreadable entry yields `None`.
    fn section_names(&self, layout: &HeaderLayout, table: Table, index: u64) -> Option<StringTable<'a>> {
        if index == 0 || index >= table.count {
            return None
        }
        match self.string_table(layout, table, index) {
            Ok(names) => Some(names),
            Err(e) => {
                debug!("section name table {index}: {e}");
                None
            }
        }
    }

    fn string_table(&self, layout: &HeaderLayout, table: Table, index: u64) -> Result<StringTable<'a>> {
        let entry = table.entry(index)?;
        let offset = layout.section_offset.at(entry)?;
        let size = layout.section_size.at(entry)?;
        let offset = self.data.uint(offset.offset, offset.size)?;
        let size = self.data.uint(size.offset, size.size)?;
        let end = offset.checked_add(size).ok_or(Error::IntegerOverflow)?;
        self.data.range(offset..end).map(StringTable::new)
    }

    /// Annotate a single field, substituting a truncation marker when the read fails.
    fn record<T>(&mut self, field: Field, name: &str, value: Result<T>, describe: impl FnOnce(&T) -> String) -> Option<T> {
        match value {
            Ok(value) => {
                self.push(field.offset, field.end(), format!("{name}: {}", describe(&value)));
                Some(value)
            }
            Err(e) => {
                self.truncated(field.offset..field.end(), name, e);
                None
            }
        }
    }

    fn uint(&mut self, field: Field, name: &str, describe: fn(&u64) -> String) -> Option<u64> {
        let value = self.data.uint(field.offset, field.size);
        self.record(field, name, value, describe)
    }

    fn truncated(&mut self, range: Range<usize>, name: &str, error: Error) {
        debug!("{name} at {:#x}: {error}", range.start);
        self.push(range.start, range.end, format!("{name}: UNKNOWN (truncated)"));
    }
}

/// Bytes as a byte-string literal prints them, without the `b'..'` delimiters.
///
/// Printable ASCII is kept, `\t \n \r \\` are backslashed and anything else
/// becomes `\xNN`. Only the delimiting quote is backslashed: `'`, or `"` when
/// the bytes hold a `'` and no `"`.
fn escape(bytes: &[u8]) -> String {
    let quote = if bytes.contains(&b'\'') && !bytes.contains(&b'"') { b'"' } else { b'\'' };
    let mut text = String::with_capacity(bytes.len());
    for &byte in bytes {
        match byte {
            b'\'' | b'"' if byte != quote => text.push(char::from(byte)),
            _ => text.extend(core::ascii::escape_default(byte).map(char::from)),
        }
    }
    text
}

fn hex(value: &u64) -> String {
    format!("{value:#x}")
}

/// Annotate every ELF header field, program header and section header found in `data`.
///
/// Never fails: unreadable fields become `UNKNOWN (truncated)` labels.
///
/// ```
/// let annotations = elf_hexdump::annotate(b"\x7fELF\x02\x01\x01");
/// let labels: Vec<_> = annotations.iter().map(|a| a.label.as_str()).collect();
/// assert_eq!(labels, ["Magic Number: \\x7fELF", "Bit: 64-bit", "Endianness: little", "ELF Version: \\x01"]);
/// ```
pub fn annotate(data: &[u8]) -> Vec<Annotation> {
    Annotator::new(data).run()
}
