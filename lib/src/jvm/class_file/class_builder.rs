use crate::jvm::class_file::{
    Attribute, AttributeLike, BootstrapMethod, BootstrapMethods, ClassConstantIndex, ClassFile,
    Code, ConstantIndex, ConstantPool, Field, Method, Serialize, Signature, Utf8ConstantIndex,
    Version,
};
use crate::jvm::{BinaryName, ClassAccessFlags, Error, FieldAccessFlags, MethodAccessFlags, Name};

/// Assemble a class file from scratch
///
/// Everything goes through one constant pool, which is exposed so that callers can intern the
/// constants their bytecode refers to before adding methods.
pub struct ClassBuilder {
    version: Version,

    /// Constants pool
    pub constants: ConstantPool,

    access_flags: ClassAccessFlags,
    this_class: ClassConstantIndex,
    super_class: Option<ClassConstantIndex>,
    interfaces: Vec<ClassConstantIndex>,
    fields: Vec<Field>,
    methods: Vec<Method>,
    attributes: Vec<Attribute>,

    /// Bootstrap methods get emitted as one attribute when the class is finished
    bootstrap_methods: Option<(Utf8ConstantIndex, Vec<BootstrapMethod>)>,
}

impl ClassBuilder {
    /// Create a new class builder
    pub fn new(
        version: Version,
        access_flags: ClassAccessFlags,
        this_class: &BinaryName,
        super_class: Option<&BinaryName>,
        interfaces: &[BinaryName],
    ) -> Result<ClassBuilder, Error> {
        let mut constants = ConstantPool::new();
        let this_class = constants.get_class(this_class.as_str())?;
        let super_class = super_class
            .map(|super_class| constants.get_class(super_class.as_str()))
            .transpose()?;
        let interfaces = interfaces
            .iter()
            .map(|interface| constants.get_class(interface.as_str()))
            .collect::<Result<_, _>>()?;

        Ok(ClassBuilder {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields: vec![],
            methods: vec![],
            attributes: vec![],
            bootstrap_methods: None,
        })
    }

    /// Add an attribute to the class
    pub fn add_attribute<A: AttributeLike>(&mut self, attribute: &A) -> Result<(), Error> {
        let attribute = Attribute::encode(attribute, &mut self.constants)?;
        self.attributes.push(attribute);
        Ok(())
    }

    /// Add a field to the class, optionally with a generic signature
    pub fn add_field(
        &mut self,
        access_flags: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
    ) -> Result<(), Error> {
        let name_index = self.constants.get_utf8(name)?;
        let descriptor_index = self.constants.get_utf8(descriptor)?;
        let mut attributes = vec![];
        if let Some(signature) = signature {
            let signature = Signature {
                signature: self.constants.get_utf8(signature)?,
            };
            attributes.push(Attribute::encode(&signature, &mut self.constants)?);
        }
        self.fields.push(Field {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
        Ok(())
    }

    /// Add a method to the class (abstract and native methods have no code)
    pub fn add_method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        code: Option<&Code>,
    ) -> Result<(), Error> {
        let attributes = match code {
            Some(code) => vec![Attribute::encode(code, &mut self.constants)?],
            None => vec![],
        };
        self.add_method_with_attributes(access_flags, name, descriptor, attributes)
    }

    /// Add a method with already encoded attributes
    pub fn add_method_with_attributes(
        &mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        attributes: Vec<Attribute>,
    ) -> Result<(), Error> {
        let name_index = self.constants.get_utf8(name)?;
        let descriptor_index = self.constants.get_utf8(descriptor)?;
        self.methods.push(Method {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
        Ok(())
    }

    /// Register a bootstrap method, returning its index in the `BootstrapMethods` attribute
    pub fn add_bootstrap_method(
        &mut self,
        method_handle: ConstantIndex,
        arguments: Vec<ConstantIndex>,
    ) -> Result<u16, Error> {
        let name = match &self.bootstrap_methods {
            Some((name, _)) => *name,
            None => self.constants.get_utf8(BootstrapMethods::NAME)?,
        };
        let (_, methods) = self.bootstrap_methods.get_or_insert_with(|| (name, vec![]));
        methods.push(BootstrapMethod {
            bootstrap_method: method_handle,
            bootstrap_arguments: arguments,
        });
        Ok(methods.len() as u16 - 1)
    }

    /// Consume the builder and return the class file
    pub fn result(mut self) -> ClassFile {
        if let Some((name_index, methods)) = self.bootstrap_methods {
            let mut info = vec![];
            // Writing to a `Vec` can't fail
            if BootstrapMethods(methods).serialize(&mut info).is_ok() {
                self.attributes.push(Attribute { name_index, info });
            }
        }
        ClassFile {
            version: self.version,
            constants: self.constants,
            access_flags: self.access_flags,
            this_class: self.this_class,
            super_class: self.super_class,
            interfaces: self.interfaces,
            fields: self.fields,
            methods: self.methods,
            attributes: self.attributes,
        }
    }
}
