use super::class_file::{Constant, ConstantIndex};

#[derive(Debug)]
pub enum Error {
    ConstantPoolOverflow {
        constant: Constant,
        offset: u16,
    },
    IoError(std::io::Error),

    /// Class file does not start with `0xCAFEBABE`
    BadMagic([u8; 4]),

    /// Unknown constant pool tag
    UnknownConstantTag(u8),

    /// Bytes of a `CONSTANT_Utf8_info` are not valid modified UTF-8
    MalformedUtf8(Vec<u8>),

    /// Constant index points nowhere (or into the unusable half of a long/double)
    MissingConstant(ConstantIndex),

    /// Constant at this index is not of the kind that the context requires
    UnexpectedConstant {
        index: ConstantIndex,
        expected: &'static str,
    },

    /// Attribute contents do not match the format for its name
    MalformedAttribute {
        name: &'static str,
        reason: String,
    },

    /// Bytecode could not be decoded
    MalformedCode {
        offset: usize,
        reason: String,
    },

    /// Descriptor or signature could not be parsed
    MalformedDescriptor(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}
