use crate::jvm::class_file::{
    Attribute, AttributeLike, Code, ConstantPool, Parse, Serialize, Utf8ConstantIndex,
};
use crate::jvm::{Error, MethodAccessFlags};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Method {
    pub fn name<'a>(&self, constants: &'a ConstantPool) -> Result<&'a str, Error> {
        constants.utf8(self.name_index)
    }

    pub fn descriptor<'a>(&self, constants: &'a ConstantPool) -> Result<&'a str, Error> {
        constants.utf8(self.descriptor_index)
    }

    /// Position of the `Code` attribute (abstract and native methods have none)
    pub fn code_position(&self, constants: &ConstantPool) -> Result<Option<usize>, Error> {
        for (idx, attribute) in self.attributes.iter().enumerate() {
            if attribute.name(constants)? == Code::NAME {
                return Ok(Some(idx));
            }
        }
        Ok(None)
    }

    /// Decode the `Code` attribute, if there is one
    pub fn code(&self, constants: &ConstantPool) -> Result<Option<Code>, Error> {
        match self.code_position(constants)? {
            Some(idx) => self.attributes[idx].decode().map(Some),
            None => Ok(None),
        }
    }
}

impl Serialize for Method {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Parse for Method {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Method {
            access_flags: MethodAccessFlags::parse(reader)?,
            name_index: Utf8ConstantIndex::parse(reader)?,
            descriptor_index: Utf8ConstantIndex::parse(reader)?,
            attributes: Vec::parse(reader)?,
        })
    }
}
