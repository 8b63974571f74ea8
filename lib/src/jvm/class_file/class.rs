use crate::jvm::class_file::{
    Attribute, ClassConstantIndex, ConstantIndex, ConstantPool, Field, Method, Parse, Serialize,
    Version,
};
use crate::jvm::{BinaryName, ClassAccessFlags, Error, Name};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::fs;
use std::path::Path;

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,

    /// Only `java/lang/Object` (and `module-info`) have no superclass
    pub super_class: Option<ClassConstantIndex>,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Parse a class file from its bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<ClassFile, Error> {
        let mut reader = bytes;
        let class = ClassFile::parse(&mut reader)?;
        if !reader.is_empty() {
            return Err(Error::MalformedAttribute {
                name: "ClassFile",
                reason: format!("{} trailing bytes", reader.len()),
            });
        }
        Ok(class)
    }

    /// Encode the class file into bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }

    /// Load a class file from disk
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<ClassFile, Error> {
        let bytes = fs::read(path)?;
        ClassFile::from_bytes(&bytes)
    }

    /// Save the class file to disk
    pub fn save_to_path<P: AsRef<Path>>(
        &self,
        path: P,
        create_missing_directories: bool,
    ) -> std::io::Result<()> {
        let path = path.as_ref();
        if create_missing_directories {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut class_file = fs::File::create(path)?;
        self.serialize(&mut class_file)
    }

    /// Name of the class
    pub fn name(&self) -> Result<BinaryName, Error> {
        self.class_name_at(self.this_class)
    }

    /// Name of the superclass
    pub fn super_name(&self) -> Result<Option<BinaryName>, Error> {
        self.super_class
            .map(|super_class| self.class_name_at(super_class))
            .transpose()
    }

    /// Names of the directly implemented interfaces
    pub fn interface_names(&self) -> Result<Vec<BinaryName>, Error> {
        self.interfaces
            .iter()
            .map(|interface| self.class_name_at(*interface))
            .collect()
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.is_interface()
    }

    /// Find a method by name and descriptor
    pub fn find_method(&self, name: &str, descriptor: &str) -> Result<Option<usize>, Error> {
        for (idx, method) in self.methods.iter().enumerate() {
            if method.name(&self.constants)? == name
                && method.descriptor(&self.constants)? == descriptor
            {
                return Ok(Some(idx));
            }
        }
        Ok(None)
    }

    fn class_name_at(&self, index: ClassConstantIndex) -> Result<BinaryName, Error> {
        let name = self.constants.class_name(index)?;
        BinaryName::from_string(name.to_owned()).map_err(Error::MalformedDescriptor)
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        match self.super_class {
            Some(super_class) => super_class.serialize(writer)?,
            None => 0u16.serialize(writer)?,
        }
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Parse for ClassFile {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let mut magic = [0; 4];
        reader.read_exact(&mut magic)?;
        if magic != ClassFile::MAGIC {
            return Err(Error::BadMagic(magic));
        }

        let version = Version::parse(reader)?;
        let constants = ConstantPool::parse(reader)?;
        let access_flags = ClassAccessFlags::parse(reader)?;
        let this_class = ClassConstantIndex::parse(reader)?;
        let super_class = match ConstantIndex::parse(reader)? {
            ConstantIndex(0) => None,
            index => Some(ClassConstantIndex(index)),
        };

        Ok(ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces: Vec::parse(reader)?,
            fields: Vec::parse(reader)?,
            methods: Vec::parse(reader)?,
            attributes: Vec::parse(reader)?,
        })
    }
}
