//! Hex dumps of ELF files with the header fields labelled inline.
//!
//! ```
//! let elf = [0x7f, b'E', b'L', b'F'];
//! let annotations = elf_hexdump::annotate(&elf);
//! assert_eq!(annotations.len(), 1);
//! assert_eq!(annotations[0].label, "Magic Number: \\x7fELF");
//!
//! let dump = elf_hexdump::Renderer::plain().render(&elf, &annotations);
//! assert_eq!(dump, "00000000|\t7f 45 4c 46\t\tMagic Number: \\x7fELF\n");
//! ```

use core::ops::Range;

macro_rules! c_enum {
    (
        $vis:vis $name:ident($ty:ty) {
            $($item:ident = $value:expr => $label:literal),* $(,)?
        }
    ) => {
        #[derive(::core::clone::Clone, ::core::marker::Copy, ::core::cmp::PartialEq, ::core::cmp::Eq)]
        #[repr(transparent)]
        $vis struct $name(pub $ty);
        impl $name {
            $(
                #[allow(non_upper_case_globals)]
                $vis const $item: Self = Self($value);
            )*
            /// The conventional name of the value, if it is one we know.
            $vis fn name(self) -> ::core::option::Option<&'static str> {
                match self.0 {
                    $($value => ::core::option::Option::Some($label),)*
                    _ => ::core::option::Option::None
                }
            }
        }
        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.name().unwrap_or("UNKNOWN"))
            }
        }
        impl ::core::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                #[derive(Debug)]
                struct Unknown($ty);
                match *self {
                    $(Self::$item => f.write_str(stringify!($item)),)*
                    Self(value) => ::core::fmt::Debug::fmt(&Unknown(value), f)
                }
            }
        }
        impl ::core::convert::From<$ty> for $name {
            fn from(value: $ty) -> Self {
                Self(value)
            }
        }
        impl ::core::convert::From<$name> for $ty {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    }
}

mod annotate;
mod render;

pub use annotate::{annotate, Annotation, Annotator, Class, Encoding, Field, HeaderLayout, COLORS, ELF32, ELF64};
pub use render::{render, Renderer, BLOCK_SIZE, PALETTE};

pub type Result<T> = core::result::Result<T, Error>;
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("integer overflow while computing an offset")]
    IntegerOverflow,
    #[error("index out of range")]
    IndexOutOfRange,
    #[error("unexpected end of file reading {len} bytes at {offset:#x}")]
    UnexpectedEoF { offset: usize, len: usize },
    #[error("unterminated string")]
    UnterminatedString,
}

/// Bounds-checked little-endian reads over the raw file.
#[derive(Debug, Clone, Copy)]
pub struct Bytes<'a>(&'a [u8]);
impl<'a> Bytes<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self(data)
    }
    pub fn len(self) -> usize {
        self.0.len()
    }
    pub fn is_empty(self) -> bool {
        self.0.is_empty()
    }
    pub fn get(self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let end = offset.checked_add(len).ok_or(Error::IntegerOverflow)?;
        self.0.get(offset..end).ok_or(Error::UnexpectedEoF { offset, len })
    }
    pub fn range(self, range: Range<u64>) -> Result<&'a [u8]> {
        let offset = to_usize(range.start)?;
        let len = to_usize(range.end.checked_sub(range.start).ok_or(Error::IntegerOverflow)?)?;
        self.get(offset, len)
    }
    pub fn u8(self, offset: usize) -> Result<u8> {
        self.get(offset, 1).map(|b| b[0])
    }
    pub fn u16(self, offset: usize) -> Result<u16> {
        self.array(offset).map(u16::from_le_bytes)
    }
    pub fn u32(self, offset: usize) -> Result<u32> {
        self.array(offset).map(u32::from_le_bytes)
    }
    pub fn u64(self, offset: usize) -> Result<u64> {
        self.array(offset).map(u64::from_le_bytes)
    }
    /// Read an unsigned field of 1, 2, 4 or 8 bytes, widened to `u64`.
    pub fn uint(self, offset: usize, size: usize) -> Result<u64> {
        match size {
            1 => self.u8(offset).map(u64::from),
            2 => self.u16(offset).map(u64::from),
            4 => self.u32(offset).map(u64::from),
            8 => self.u64(offset),
            _ => Err(Error::IndexOutOfRange),
        }
    }
    fn array<const N: usize>(self, offset: usize) -> Result<[u8; N]> {
        let bytes = self.get(offset, N)?;
        let mut array = [0; N];
        array.copy_from_slice(bytes);
        Ok(array)
    }
}

pub(crate) fn to_usize(value: u64) -> Result<usize> {
    value.try_into().map_err(|_| Error::IntegerOverflow)
}

#[derive(Copy, Clone)]
pub struct StringTable<'a>(&'a [u8]);
impl<'a> StringTable<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self(data)
    }
    /// Get the byte slice of a string in the string table, not including the null terminator.
    pub fn get_bytes(self, index: u32) -> Result<&'a [u8]> {
        let index = to_usize(index.into())?;
        self.0.get(index..).ok_or(Error::IndexOutOfRange)
            .and_then(|s| {
                let end = memchr::memchr(0, s).ok_or(Error::UnterminatedString)?;
                Ok(&s[0..end])
            })
    }
}
impl<'a> core::fmt::Debug for StringTable<'a> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("StringTable")
            .field(&[..])
            .finish()
    }
}

c_enum!{
    pub FileType(u16) {
        None = 0 => "ET_NONE",
        Relocatable = 1 => "ET_REL",
        Executable = 2 => "ET_EXEC",
        SharedObject = 3 => "ET_DYN",
        Core = 4 => "ET_CORE",
        LowOs = 0xfe00 => "ET_LOOS",
        HighOs = 0xfeff => "ET_HIOS",
        LowProcessor = 0xff00 => "ET_LOPROC",
        HighProcessor = 0xffff => "ET_HIPROC"
    }
}
c_enum!{
    pub Machine(u16) {
        None = 0x00 => "No specific instruction set",
        Sparc = 0x02 => "SPARC",
        X86 = 0x03 => "x86",
        Mips = 0x08 => "MIPS",
        PowerPc = 0x14 => "PowerPC",
        S390 = 0x16 => "S390",
        Arm = 0x28 => "ARM",
        SuperH = 0x2a => "SuperH",
        Ia64 = 0x32 => "IA-64",
        X86_64 = 0x3e => "x86-64",
        AArch64 = 0xb7 => "AArch64",
        RiscV = 0xf3 => "RISC-V"
    }
}
c_enum!{
    pub ProgramType(u32) {
        Null = 0 => "PT_NULL",
        Load = 1 => "PT_LOAD",
        Dynamic = 2 => "PT_DYNAMIC",
        Interpreter = 3 => "PT_INTERP",
        Note = 4 => "PT_NOTE",
        SharedLibrary = 5 => "PT_SHLIB",
        ProgramHeader = 6 => "PT_PHDR",
        ThreadLocalStorage = 7 => "PT_TLS",
        LowOs = 0x60000000 => "PT_LOOS",
        HighOs = 0x6fffffff => "PT_HIOS",
        LowProcessor = 0x70000000 => "PT_LOPROC",
        HighProcessor = 0x7fffffff => "PT_HIPROC"
    }
}
c_enum!{
    pub SectionType(u32) {
        Null = 0x0 => "SHT_NULL",
        Program = 0x1 => "SHT_PROGBITS",
        SymbolTable = 0x2 => "SHT_SYMTAB",
        StringTable = 0x3 => "SHT_STRTAB",
        Rela = 0x4 => "SHT_RELA",
        HashTable = 0x5 => "SHT_HASH",
        Dynamic = 0x6 => "SHT_DYNAMIC",
        Note = 0x7 => "SHT_NOTE",
        NoBits = 0x8 => "SHT_NOBITS",
        Rel = 0x9 => "SHT_REL",
        SharedLibrary = 0xa => "SHT_SHLIB",
        DynamicSymbolTable = 0xb => "SHT_DYNSYM",
        InitArray = 0xe => "SHT_INIT_ARRAY",
        FiniArray = 0xf => "SHT_FINI_ARRAY",
        PreinitArray = 0x10 => "SHT_PREINIT_ARRAY",
        Group = 0x11 => "SHT_GROUP",
        SymbolIndex = 0x12 => "SHT_SYMTAB_SHNDX",
        Count = 0x13 => "SHT_NUM"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_fall_back_to_unknown() {
        assert_eq!(FileType(2).to_string(), "ET_EXEC");
        assert_eq!(FileType(0xfe00).to_string(), "ET_LOOS");
        assert_eq!(FileType(5).to_string(), "UNKNOWN");
        assert_eq!(Machine(0x3e).to_string(), "x86-64");
        assert_eq!(Machine(0x99).name(), None);
        assert_eq!(ProgramType(0x7fffffff).to_string(), "PT_HIPROC");
        assert_eq!(SectionType(0xc).to_string(), "UNKNOWN");
        assert_eq!(SectionType(0x13).to_string(), "SHT_NUM");
    }

    #[test]
    fn debug_names_the_constant() {
        assert_eq!(format!("{:?}", ProgramType::Load), "Load");
        assert_eq!(format!("{:x?}", ProgramType(0x1234)), "Unknown(1234)");
    }

    #[test]
    fn reads_are_bounds_checked() {
        let bytes = Bytes::new(&[0x01, 0x02, 0x03, 0x04, 0x05]);
        assert_eq!(bytes.u16(0).unwrap(), 0x0201);
        assert_eq!(bytes.u32(1).unwrap(), 0x05040302);
        assert!(matches!(bytes.u32(2), Err(Error::UnexpectedEoF { offset: 2, len: 4 })));
        assert!(matches!(bytes.u64(0), Err(Error::UnexpectedEoF { .. })));
        assert!(matches!(bytes.get(usize::MAX, 2), Err(Error::IntegerOverflow)));
        assert_eq!(bytes.uint(3, 2).unwrap(), 0x0504);
        assert!(bytes.uint(0, 3).is_err());
        assert_eq!(bytes.range(1..3).unwrap(), &[0x02, 0x03]);
        assert!(bytes.range(3..1).is_err());
    }

    #[test]
    fn string_table_lookup() {
        let table = StringTable::new(b"\0.text\0.data\0\xff\0.bss");
        assert_eq!(table.get_bytes(0).unwrap(), b"");
        assert_eq!(table.get_bytes(1).unwrap(), b".text");
        assert_eq!(table.get_bytes(7).unwrap(), b".data");
        assert_eq!(table.get_bytes(13).unwrap(), b"\xff");
        assert!(matches!(table.get_bytes(15), Err(Error::UnterminatedString)));
        assert!(matches!(table.get_bytes(100), Err(Error::IndexOutOfRange)));
    }
}
