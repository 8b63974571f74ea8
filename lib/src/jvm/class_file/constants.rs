use crate::jvm::class_file::{Parse, Serialize};
use crate::jvm::Error;
use crate::util::{Offset, OffsetVec, Width};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::hash::Hash;

/// Editable class file constants pool
///
/// Constants are addressed by their offset in the pool (starting at 1, with longs and doubles
/// taking two slots). Existing entries can be looked up by index or repointed in place with
/// [`ConstantPool::set`], and new entries can be interned with the `get_*` methods: these return
/// the index of an existing equal entry if there is one, and only append otherwise.
///
/// Appending never disturbs existing indices, so rewriting a reference is always a matter of
/// interning the new target and then updating the index fields that pointed at the old one.
#[derive(Clone)]
pub struct ConstantPool {
    constants: OffsetVec<Constant>,

    utf8s: HashMap<String, Utf8ConstantIndex>,
    classes: HashMap<Utf8ConstantIndex, ClassConstantIndex>,
    strings: HashMap<Utf8ConstantIndex, StringConstantIndex>,
    name_and_types: HashMap<(Utf8ConstantIndex, Utf8ConstantIndex), NameAndTypeConstantIndex>,
    fieldrefs: HashMap<(ClassConstantIndex, NameAndTypeConstantIndex), FieldRefConstantIndex>,
    methodrefs:
        HashMap<(ClassConstantIndex, NameAndTypeConstantIndex, bool), MethodRefConstantIndex>,
    method_handles: HashMap<(HandleKind, ConstantIndex), ConstantIndex>,
    method_types: HashMap<Utf8ConstantIndex, ConstantIndex>,
    integers: HashMap<i32, ConstantIndex>,
    invoke_dynamics: HashMap<(u16, NameAndTypeConstantIndex), InvokeDynamicConstantIndex>,
}

/// Symbolic view of a `CONSTANT_Fieldref_info`, `CONSTANT_Methodref_info`, or
/// `CONSTANT_InterfaceMethodref_info`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub class: String,
    pub name: String,
    pub descriptor: String,
    pub kind: MemberRefKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemberRefKind {
    Field,
    Method,
    InterfaceMethod,
}

impl ConstantPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantPool {
        ConstantPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            utf8s: HashMap::new(),
            classes: HashMap::new(),
            strings: HashMap::new(),
            name_and_types: HashMap::new(),
            fieldrefs: HashMap::new(),
            methodrefs: HashMap::new(),
            method_handles: HashMap::new(),
            method_types: HashMap::new(),
            integers: HashMap::new(),
            invoke_dynamics: HashMap::new(),
        }
    }

    /// Number of constants in the pool (not counting unusable slots)
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.len() == 0
    }

    /// Index that the next appended constant will get
    pub fn next_index(&self) -> ConstantIndex {
        ConstantIndex(self.constants.offset_len().0 as u16)
    }

    /// Iterate through all constants along with their indices
    pub fn iter(&self) -> impl Iterator<Item = (ConstantIndex, &Constant)> + '_ {
        self.constants
            .iter()
            .map(|(offset, constant)| (ConstantIndex(offset.0 as u16), constant))
    }

    /// Indices of all of the constants, in order
    pub fn indices(&self) -> Vec<ConstantIndex> {
        self.constants
            .offsets()
            .map(|offset| ConstantIndex(offset.0 as u16))
            .collect()
    }

    /// Look up a constant by index
    pub fn get(&self, index: impl Into<ConstantIndex>) -> Result<&Constant, Error> {
        let index = index.into();
        self.constants
            .get_offset(Offset(index.0 as usize))
            .map_err(|_| Error::MissingConstant(index))
    }

    /// Replace the constant at an index with another constant of the same width
    ///
    /// This is how references get repointed in place: every other constant or instruction using
    /// this index sees the new value.
    pub fn set(&mut self, index: impl Into<ConstantIndex>, constant: Constant) -> Result<(), Error> {
        let index = index.into();
        let old = self.get(index)?.clone();
        self.forget(index, &old);
        match self.constants.set_offset(Offset(index.0 as usize), constant.clone()) {
            Ok(_) => {
                self.remember(index, &constant);
                Ok(())
            }
            Err(_) => {
                self.remember(index, &old);
                Err(Error::UnexpectedConstant {
                    index,
                    expected: "constant of the same width",
                })
            }
        }
    }

    /// Get the contents of a UTF-8 constant
    pub fn utf8(&self, index: Utf8ConstantIndex) -> Result<&str, Error> {
        match self.get(index)? {
            Constant::Utf8(string) => Ok(string),
            _ => Err(Error::UnexpectedConstant {
                index: index.0,
                expected: "CONSTANT_Utf8",
            }),
        }
    }

    /// Get the name index of a class constant
    pub fn class(&self, index: ClassConstantIndex) -> Result<Utf8ConstantIndex, Error> {
        match self.get(index)? {
            Constant::Class(name) => Ok(*name),
            _ => Err(Error::UnexpectedConstant {
                index: index.0,
                expected: "CONSTANT_Class",
            }),
        }
    }

    /// Get the (binary) name of a class constant
    pub fn class_name(&self, index: ClassConstantIndex) -> Result<&str, Error> {
        self.utf8(self.class(index)?)
    }

    /// Get the name and descriptor indices of a name and type constant
    pub fn name_and_type(
        &self,
        index: NameAndTypeConstantIndex,
    ) -> Result<(Utf8ConstantIndex, Utf8ConstantIndex), Error> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => Ok((*name, *descriptor)),
            _ => Err(Error::UnexpectedConstant {
                index: index.0,
                expected: "CONSTANT_NameAndType",
            }),
        }
    }

    /// Get the name and descriptor strings of a name and type constant
    pub fn name_and_type_strs(
        &self,
        index: NameAndTypeConstantIndex,
    ) -> Result<(&str, &str), Error> {
        let (name, descriptor) = self.name_and_type(index)?;
        Ok((self.utf8(name)?, self.utf8(descriptor)?))
    }

    /// Resolve a field, method, or interface method reference into its symbolic form
    pub fn member_ref(&self, index: impl Into<ConstantIndex>) -> Result<MemberRef, Error> {
        let index = index.into();
        let (class, name_and_type, kind) = match self.get(index)? {
            Constant::FieldRef(class, name_and_type) => {
                (*class, *name_and_type, MemberRefKind::Field)
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                let kind = if *is_interface {
                    MemberRefKind::InterfaceMethod
                } else {
                    MemberRefKind::Method
                };
                (*class, *name_and_type, kind)
            }
            _ => {
                return Err(Error::UnexpectedConstant {
                    index,
                    expected: "CONSTANT_Fieldref or CONSTANT_Methodref",
                })
            }
        };
        let (name, descriptor) = self.name_and_type_strs(name_and_type)?;
        Ok(MemberRef {
            class: self.class_name(class)?.to_owned(),
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            kind,
        })
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65535, indexing starts at 1, and some constants take two
    /// spaces.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        let offset = self.constants.offset_len().0;
        if offset + constant.width() > u16::MAX as usize {
            return Err(Error::ConstantPoolOverflow {
                constant,
                offset: offset as u16,
            });
        }
        let index = ConstantIndex(offset as u16);
        self.remember(index, &constant);
        self.constants.push(constant);
        Ok(index)
    }

    /// Record a constant in the interning tables (the first of several equal entries wins)
    fn remember(&mut self, index: ConstantIndex, constant: &Constant) {
        match constant {
            Constant::Utf8(string) => {
                self.utf8s
                    .entry(string.clone())
                    .or_insert(Utf8ConstantIndex(index));
            }
            Constant::Class(name) => {
                self.classes
                    .entry(*name)
                    .or_insert(ClassConstantIndex(index));
            }
            Constant::String(utf8) => {
                self.strings
                    .entry(*utf8)
                    .or_insert(StringConstantIndex(index));
            }
            Constant::NameAndType { name, descriptor } => {
                self.name_and_types
                    .entry((*name, *descriptor))
                    .or_insert(NameAndTypeConstantIndex(index));
            }
            Constant::FieldRef(class, name_and_type) => {
                self.fieldrefs
                    .entry((*class, *name_and_type))
                    .or_insert(FieldRefConstantIndex(index));
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                self.methodrefs
                    .entry((*class, *name_and_type, *is_interface))
                    .or_insert(MethodRefConstantIndex(index));
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                self.method_handles
                    .entry((*handle_kind, *member))
                    .or_insert(index);
            }
            Constant::MethodType { descriptor } => {
                self.method_types.entry(*descriptor).or_insert(index);
            }
            Constant::Integer(integer) => {
                self.integers.entry(*integer).or_insert(index);
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => {
                self.invoke_dynamics
                    .entry((*bootstrap_method, *method_descriptor))
                    .or_insert(InvokeDynamicConstantIndex(index));
            }
            _ => (),
        }
    }

    /// Remove a constant from the interning tables (if it was the entry being used)
    fn forget(&mut self, index: ConstantIndex, constant: &Constant) {
        fn remove_if<K: Eq + Hash, V: Copy + Into<ConstantIndex>>(
            map: &mut HashMap<K, V>,
            key: &K,
            index: ConstantIndex,
        ) {
            if map.get(key).map(|found| (*found).into()) == Some(index) {
                map.remove(key);
            }
        }

        match constant {
            Constant::Utf8(string) => remove_if(&mut self.utf8s, string, index),
            Constant::Class(name) => remove_if(&mut self.classes, name, index),
            Constant::String(utf8) => remove_if(&mut self.strings, utf8, index),
            Constant::NameAndType { name, descriptor } => {
                remove_if(&mut self.name_and_types, &(*name, *descriptor), index)
            }
            Constant::FieldRef(class, name_and_type) => {
                remove_if(&mut self.fieldrefs, &(*class, *name_and_type), index)
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => remove_if(
                &mut self.methodrefs,
                &(*class, *name_and_type, *is_interface),
                index,
            ),
            Constant::MethodHandle {
                handle_kind,
                member,
            } => remove_if(&mut self.method_handles, &(*handle_kind, *member), index),
            Constant::MethodType { descriptor } => {
                remove_if(&mut self.method_types, descriptor, index)
            }
            Constant::Integer(integer) => remove_if(&mut self.integers, integer, index),
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => remove_if(
                &mut self.invoke_dynamics,
                &(*bootstrap_method, *method_descriptor),
                index,
            ),
            _ => (),
        }
    }

    /// Get or insert a utf8 constant from the constant pool
    pub fn get_utf8(&mut self, utf8: &str) -> Result<Utf8ConstantIndex, Error> {
        if let Some(idx) = self.utf8s.get(utf8) {
            Ok(*idx)
        } else {
            let constant = Constant::Utf8(utf8.to_owned());
            Ok(Utf8ConstantIndex(self.push_constant(constant)?))
        }
    }

    /// Get or insert a class constant from the constant pool
    pub fn get_class(&mut self, name: &str) -> Result<ClassConstantIndex, Error> {
        let name = self.get_utf8(name)?;
        if let Some(idx) = self.classes.get(&name) {
            Ok(*idx)
        } else {
            Ok(ClassConstantIndex(self.push_constant(Constant::Class(name))?))
        }
    }

    /// Get or insert a string constant from the constant pool
    pub fn get_string(&mut self, string: &str) -> Result<StringConstantIndex, Error> {
        let utf8 = self.get_utf8(string)?;
        if let Some(idx) = self.strings.get(&utf8) {
            Ok(*idx)
        } else {
            Ok(StringConstantIndex(self.push_constant(Constant::String(utf8))?))
        }
    }

    /// Get or insert a name & type constant from the constant pool
    pub fn get_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<NameAndTypeConstantIndex, Error> {
        let name = self.get_utf8(name)?;
        let descriptor = self.get_utf8(descriptor)?;
        if let Some(idx) = self.name_and_types.get(&(name, descriptor)) {
            Ok(*idx)
        } else {
            let constant = Constant::NameAndType { name, descriptor };
            Ok(NameAndTypeConstantIndex(self.push_constant(constant)?))
        }
    }

    /// Get or insert a field reference constant from the constant pool
    pub fn get_field_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<FieldRefConstantIndex, Error> {
        let class = self.get_class(class)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        if let Some(idx) = self.fieldrefs.get(&(class, name_and_type)) {
            Ok(*idx)
        } else {
            let constant = Constant::FieldRef(class, name_and_type);
            Ok(FieldRefConstantIndex(self.push_constant(constant)?))
        }
    }

    /// Get or insert a method (or interface method) reference constant from the constant pool
    pub fn get_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<MethodRefConstantIndex, Error> {
        let class = self.get_class(class)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        if let Some(idx) = self.methodrefs.get(&(class, name_and_type, is_interface)) {
            Ok(*idx)
        } else {
            let constant = Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            };
            Ok(MethodRefConstantIndex(self.push_constant(constant)?))
        }
    }

    /// Get or insert a method handle constant from the constant pool
    pub fn get_method_handle(
        &mut self,
        handle_kind: HandleKind,
        member: ConstantIndex,
    ) -> Result<ConstantIndex, Error> {
        if let Some(idx) = self.method_handles.get(&(handle_kind, member)) {
            Ok(*idx)
        } else {
            self.push_constant(Constant::MethodHandle {
                handle_kind,
                member,
            })
        }
    }

    /// Get or insert a method type constant from the constant pool
    pub fn get_method_type(&mut self, descriptor: &str) -> Result<ConstantIndex, Error> {
        let descriptor = self.get_utf8(descriptor)?;
        if let Some(idx) = self.method_types.get(&descriptor) {
            Ok(*idx)
        } else {
            self.push_constant(Constant::MethodType { descriptor })
        }
    }

    /// Get or insert an integer constant from the constant pool
    pub fn get_integer(&mut self, integer: i32) -> Result<ConstantIndex, Error> {
        if let Some(idx) = self.integers.get(&integer) {
            Ok(*idx)
        } else {
            self.push_constant(Constant::Integer(integer))
        }
    }

    /// Get or insert a dynamically-computed call site from the constant pool
    pub fn get_invoke_dynamic(
        &mut self,
        bootstrap_method: u16,
        method_descriptor: NameAndTypeConstantIndex,
    ) -> Result<InvokeDynamicConstantIndex, Error> {
        if let Some(idx) = self.invoke_dynamics.get(&(bootstrap_method, method_descriptor)) {
            Ok(*idx)
        } else {
            let constant = Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            };
            Ok(InvokeDynamicConstantIndex(self.push_constant(constant)?))
        }
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool::new()
    }
}

impl std::fmt::Debug for ConstantPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.constants.fmt(f)
    }
}

impl Serialize for ConstantPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.constants.serialize(writer)
    }
}

impl Parse for ConstantPool {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let count = u16::parse(reader)? as usize;
        let mut pool = ConstantPool::new();
        while pool.constants.offset_len().0 < count {
            let constant = Constant::parse(reader)?;
            pool.push_constant(constant)?;
        }
        Ok(pool)
    }
}

/// Constants as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,

        /// Depending on the method kind, this points to different things:
        ///
        ///   - `FieldRef` for `GetField`, `GetStatic`, `PutField`, `PutStatic`
        ///   - `MethodRef` for the rest
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        method_descriptor: NameAndTypeConstantIndex,
    },

    /// Module (only in `module-info` classes)
    Module(Utf8ConstantIndex),

    /// Package (only in `module-info` classes)
    Package(Utf8ConstantIndex),
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.serialize(writer)?;
                let buffer: Vec<u8> = encode_modified_utf8(string);
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                4u8.serialize(writer)?;
                float.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                8u8.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                15u8.serialize(writer)?;
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                17u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                method_descriptor.serialize(writer)?;
            }
            Constant::Module(name) => {
                19u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                20u8.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Parse for Constant {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        fn utf8<R: ReadBytesExt>(reader: &mut R) -> Result<Utf8ConstantIndex, Error> {
            Ok(Utf8ConstantIndex(ConstantIndex::parse(reader)?))
        }
        fn name_and_type<R: ReadBytesExt>(
            reader: &mut R,
        ) -> Result<NameAndTypeConstantIndex, Error> {
            Ok(NameAndTypeConstantIndex(ConstantIndex::parse(reader)?))
        }

        let tag = u8::parse(reader)?;
        let constant = match tag {
            1 => {
                let len = u16::parse(reader)? as usize;
                let mut bytes = vec![0; len];
                reader.read_exact(&mut bytes)?;
                Constant::Utf8(decode_modified_utf8(&bytes)?)
            }
            3 => Constant::Integer(reader.read_i32::<BigEndian>()?),
            4 => Constant::Float(f32::from_bits(reader.read_u32::<BigEndian>()?)),
            5 => Constant::Long(reader.read_i64::<BigEndian>()?),
            6 => Constant::Double(f64::from_bits(reader.read_u64::<BigEndian>()?)),
            7 => Constant::Class(utf8(reader)?),
            8 => Constant::String(utf8(reader)?),
            9 => {
                let class = ClassConstantIndex(ConstantIndex::parse(reader)?);
                Constant::FieldRef(class, name_and_type(reader)?)
            }
            10 | 11 => Constant::MethodRef {
                class: ClassConstantIndex(ConstantIndex::parse(reader)?),
                name_and_type: name_and_type(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: utf8(reader)?,
                descriptor: utf8(reader)?,
            },
            15 => Constant::MethodHandle {
                handle_kind: HandleKind::parse(reader)?,
                member: ConstantIndex::parse(reader)?,
            },
            16 => Constant::MethodType {
                descriptor: utf8(reader)?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: u16::parse(reader)?,
                name_and_type: name_and_type(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::parse(reader)?,
                method_descriptor: name_and_type(reader)?,
            },
            19 => Constant::Module(utf8(reader)?),
            20 => Constant::Package(utf8(reader)?),
            other => return Err(Error::UnknownConstantTag(other)),
        };
        Ok(constant)
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    for c in string.chars() {
        // Handle the exception for how `\u{0000}` is represented
        let len: usize = if c == '\u{0000}' { 2 } else { c.len_utf8() };
        let code: u32 = c as u32;

        match len {
            1 => buffer.push(code as u8),
            2 => {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
            3 => {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }

            // Supplementary characters: main divergence from unicode
            _ => {
                buffer.push(0b1110_1101);
                buffer.push(((code >> 16 & 0x0F) as u8).wrapping_sub(1) & 0x0F | 0b1010_0000);
                buffer.push((code >> 10 & 0x3F) as u8 | 0b1000_0000);

                buffer.push(0b1110_1101);
                buffer.push(((code >> 6 & 0x0F) as u8) | 0b1011_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
///
/// Only canonical encodings are accepted (so that re-encoding gives back the same bytes). Unpaired
/// surrogates cannot be represented in a Rust string and are rejected too.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String, Error> {
    let malformed = || Error::MalformedUtf8(bytes.to_vec());
    let continuation = |idx: usize| -> Result<u32, Error> {
        match bytes.get(idx) {
            Some(b) if b & 0b1100_0000 == 0b1000_0000 => Ok((b & 0x3F) as u32),
            _ => Err(malformed()),
        }
    };

    // Decode into UTF-16 code units first, then let the standard library pair surrogates
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        let b = bytes[idx] as u32;
        if b & 0x80 == 0 {
            if b == 0 {
                return Err(malformed());
            }
            units.push(b as u16);
            idx += 1;
        } else if b & 0b1110_0000 == 0b1100_0000 {
            let code = (b & 0x1F) << 6 | continuation(idx + 1)?;
            if code != 0 && code < 0x80 {
                return Err(malformed());
            }
            units.push(code as u16);
            idx += 2;
        } else if b & 0b1111_0000 == 0b1110_0000 {
            let code = (b & 0x0F) << 12 | continuation(idx + 1)? << 6 | continuation(idx + 2)?;
            if code < 0x800 {
                return Err(malformed());
            }
            units.push(code as u16);
            idx += 3;
        } else {
            return Err(malformed());
        }
    }

    String::from_utf16(&units).map_err(|_| malformed())
}

#[cfg(test)]
mod encode_modified_utf8_tests {
    use super::*;

    #[test]
    fn containing_null_byte() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
        assert_eq!(decode_modified_utf8(&[97, 192, 128, 97]).unwrap(), "a\x00a");
    }

    #[test]
    fn simple_ascii() {
        assert_eq!(encode_modified_utf8("foo"), vec![102, 111, 111]);
        assert_eq!(decode_modified_utf8(b"java/lang/Object").unwrap(), "java/lang/Object");
    }

    #[test]
    fn supplementary_characters() {
        let bytes = vec![
            237, 160, 128, 237, 176, 128, 237, 172, 191, 237, 191, 191, 237, 175, 191, 237, 191,
            191,
        ];
        assert_eq!(encode_modified_utf8("\u{10000}\u{dffff}\u{10FFFF}"), bytes);
        assert_eq!(
            decode_modified_utf8(&bytes).unwrap(),
            "\u{10000}\u{dffff}\u{10FFFF}"
        );
    }

    #[test]
    fn rejects_non_canonical_input() {
        // Raw NUL, overlong `/`, and a lone high surrogate
        assert!(decode_modified_utf8(&[0]).is_err());
        assert!(decode_modified_utf8(&[0xC0, 0xAF]).is_err());
        assert!(decode_modified_utf8(&[237, 160, 128]).is_err());
    }
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double` (JVMS 4.4.5):
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
/// >
/// > In retrospect, making 8-byte constants take two constant pool entries was a poor choice.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u16);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Parse for ConstantIndex {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ConstantIndex(u16::parse(reader)?))
    }
}

/// Typed wrappers around `ConstantIndex`, recording which kind of constant is expected there
macro_rules! typed_constant_index {
    ($($typed:ident),* $(,)?) => {
        $(
            #[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
            pub struct $typed(pub ConstantIndex);

            impl From<$typed> for ConstantIndex {
                fn from(index: $typed) -> ConstantIndex {
                    index.0
                }
            }

            impl Serialize for $typed {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    self.0.serialize(writer)
                }
            }

            impl Parse for $typed {
                fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
                    Ok($typed(ConstantIndex::parse(reader)?))
                }
            }
        )*
    };
}

typed_constant_index!(
    Utf8ConstantIndex,
    StringConstantIndex,
    NameAndTypeConstantIndex,
    ClassConstantIndex,
    FieldRefConstantIndex,
    MethodRefConstantIndex,
    InvokeDynamicConstantIndex,
);

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let byte: u8 = match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        };
        byte.serialize(writer)
    }
}

impl Parse for HandleKind {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let kind = match u8::parse(reader)? {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            other => {
                return Err(Error::MalformedAttribute {
                    name: "CONSTANT_MethodHandle",
                    reason: format!("unknown reference kind {}", other),
                })
            }
        };
        Ok(kind)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn interning_reuses_entries() {
        let mut pool = ConstantPool::new();
        let a = pool.get_method_ref("java/lang/String", "valueOf", "(I)Ljava/lang/String;", false).unwrap();
        let b = pool.get_method_ref("java/lang/String", "valueOf", "(I)Ljava/lang/String;", false).unwrap();
        assert_eq!(a, b);

        // Utf8 "java/lang/String", Class, Utf8 name, Utf8 descriptor, NameAndType, Methodref
        assert_eq!(pool.len(), 6);
        let class = pool.get_class("java/lang/String").unwrap();
        assert_eq!(pool.len(), 6);
        assert_eq!(pool.class_name(class).unwrap(), "java/lang/String");

        // Interface method refs are distinct from class method refs
        let c = pool.get_method_ref("java/lang/String", "valueOf", "(I)Ljava/lang/String;", true).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantPool::new();
        pool.push_constant(Constant::Long(1)).unwrap();
        let utf8 = pool.get_utf8("after").unwrap();
        assert_eq!(utf8, Utf8ConstantIndex(ConstantIndex(3)));
        assert!(matches!(pool.get(ConstantIndex(2)), Err(Error::MissingConstant(_))));

        let mut bytes = vec![];
        pool.serialize(&mut bytes).unwrap();
        let reparsed = ConstantPool::parse(&mut bytes.as_slice()).unwrap();
        assert_eq!(reparsed.utf8(utf8).unwrap(), "after");
        assert_eq!(reparsed.next_index(), ConstantIndex(4));
    }

    #[test]
    fn repointing_a_class_constant() {
        let mut pool = ConstantPool::new();
        let class = pool.get_class("java/time/Instant").unwrap();
        let new_name = pool.get_utf8("org/threeten/bp/Instant").unwrap();
        pool.set(class, Constant::Class(new_name)).unwrap();

        assert_eq!(pool.class_name(class).unwrap(), "org/threeten/bp/Instant");
        assert_eq!(pool.get_class("org/threeten/bp/Instant").unwrap(), class);

        // The old name no longer interns to the repointed constant
        assert_ne!(pool.get_class("java/time/Instant").unwrap(), class);

        // Widths must match
        assert!(pool.set(class, Constant::Long(0)).is_err());
    }

    #[test]
    fn member_refs() {
        let mut pool = ConstantPool::new();
        let field = pool.get_field_ref("a/B", "x", "I").unwrap();
        let method = pool.get_method_ref("a/I", "m", "()V", true).unwrap();

        let field = pool.member_ref(field).unwrap();
        assert_eq!(field.kind, MemberRefKind::Field);
        assert_eq!((field.class.as_str(), field.name.as_str(), field.descriptor.as_str()), ("a/B", "x", "I"));

        let method = pool.member_ref(method).unwrap();
        assert_eq!(method.kind, MemberRefKind::InterfaceMethod);
        let name = pool.get_utf8("x").unwrap();
        assert!(pool.member_ref(name).is_err());
    }
}
