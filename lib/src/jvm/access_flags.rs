use crate::jvm::class_file::{Parse, Serialize};
use crate::jvm::Error;
use bitflags::bitflags;
use byteorder::{ReadBytesExt, WriteBytesExt};

bitflags! {
    /// Access flags on classes
    ///
    /// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.1-200-E.1>
    pub struct ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

bitflags! {
    /// Access flags on methods
    ///
    /// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.6-200-A.1>
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

bitflags! {
    /// Access flags on fields
    ///
    /// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.5-200-A.1>
    pub struct FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;
    }
}

impl ClassAccessFlags {
    pub fn is_interface(&self) -> bool {
        self.contains(ClassAccessFlags::INTERFACE)
    }
}

impl MethodAccessFlags {
    pub fn is_static(&self) -> bool {
        self.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_abstract(&self) -> bool {
        self.contains(MethodAccessFlags::ABSTRACT)
    }

    pub fn is_private(&self) -> bool {
        self.contains(MethodAccessFlags::PRIVATE)
    }
}

/// Flags are stored as a `u16`. Undefined bits are dropped when parsing.
macro_rules! flags_codec {
    ($($flags:ident),*) => {$(
        impl Serialize for $flags {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                self.bits().serialize(writer)
            }
        }

        impl Parse for $flags {
            fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
                u16::parse(reader).map($flags::from_bits_truncate)
            }
        }
    )*};
}

flags_codec!(ClassAccessFlags, MethodAccessFlags, FieldAccessFlags);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn undefined_bits_are_dropped() {
        let flags = MethodAccessFlags::parse(&mut &[0x02, 0x09][..]).unwrap();
        assert_eq!(flags, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC);
        assert!(flags.is_static() && !flags.is_private());

        let mut bytes = vec![];
        (ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT)
            .serialize(&mut bytes)
            .unwrap();
        assert_eq!(bytes, vec![0x06, 0x00]);
    }
}
