use super::{ConversionObserver, Error, Program, Settings};
use crate::jvm::class_file::{
    AttributeLike, BootstrapMethods, ClassFile, Code, Constant, ConstantPool, HandleKind,
    MemberRef, MemberRefKind, Method, SourceFile,
};
use crate::jvm::class_graph::{ClassData, ClassGraph, ClassOrigin};
use crate::jvm::code::{InstructionSequenceReplacer, InvokeKind, ReplacementRule};
use crate::jvm::{BinaryName, ClassAccessFlags, MethodAccessFlags, Name, UnqualifiedName};
use std::collections::{BTreeSet, HashMap};

/// Moves static interface methods into helper classes
///
/// Runtimes before Java 8 can't call static methods on interfaces. For every interface in the
/// program declaring static methods, this:
///
///   1. creates a helper class named after the interface (`I` gets `I$$Util` by default), which
///      starts from a copy of the interface's constant pool so moved code needs no rewriting
///   2. moves the static methods (other than `<clinit>`) into the helper, making them public
///   3. redirects every `invokestatic` of a moved method, across the whole program, to the helper
///   4. repoints static method handles (eg. method references) to the helper
///
/// Interfaces without static methods are left alone, so running the relocator a second time does
/// nothing.
pub struct StaticInterfaceMethodRelocator<'a, 'g> {
    class_graph: &'a ClassGraph<'g>,
    settings: &'a Settings,
}

/// Helper class generated for one interface
struct Relocation {
    interface: BinaryName,
    helper: BinaryName,

    /// Name and descriptor of every moved method
    methods: Vec<(String, String)>,
}

impl<'a, 'g> StaticInterfaceMethodRelocator<'a, 'g> {
    pub fn new(
        class_graph: &'a ClassGraph<'g>,
        settings: &'a Settings,
    ) -> StaticInterfaceMethodRelocator<'a, 'g> {
        StaticInterfaceMethodRelocator {
            class_graph,
            settings,
        }
    }

    /// Relocate static methods out of every interface in the program
    ///
    /// Returns the number of helper classes created. If some helper class names are already
    /// taken, the other interfaces are still processed and then every colliding name is
    /// reported in an `Error::HelperClassCollision`.
    pub fn relocate_program(
        &self,
        program: &mut Program,
        observer: &mut dyn ConversionObserver,
    ) -> Result<usize, Error> {
        let mut relocations: Vec<Relocation> = vec![];
        let mut collisions: Vec<BinaryName> = vec![];

        for interface_name in program.names() {
            let movable = match program.get(interface_name.as_str()) {
                Some(class) => self.has_movable_methods(class)?,
                None => false,
            };
            if !movable {
                continue;
            }
            let helper_name = match self.helper_name(&interface_name) {
                Some(helper_name) => helper_name,
                None => continue,
            };
            if program.contains(helper_name.as_str())
                || self.class_graph.lookup_class(helper_name.as_str()).is_some()
            {
                log::error!(
                    "Cannot relocate static methods of {:?}: {:?} already exists",
                    interface_name,
                    helper_name
                );
                collisions.push(helper_name);
                continue;
            }

            let (relocation, helper) = match program.get_mut(interface_name.as_str()) {
                Some(interface) => self.extract_helper(interface, &interface_name, helper_name)?,
                None => continue,
            };
            self.register_helper(&relocation, &helper)?;

            observer.extra_class(&relocation.helper);
            for (name, descriptor) in &relocation.methods {
                observer.extra_member(&relocation.helper, name, descriptor);
            }
            log::debug!(
                "Moved {} static methods from {:?} to {:?}",
                relocation.methods.len(),
                relocation.interface,
                relocation.helper
            );
            program.insert(helper)?;
            relocations.push(relocation);
        }

        if !relocations.is_empty() {
            self.redirect_calls(program, &relocations, observer)?;
        }

        if collisions.is_empty() {
            Ok(relocations.len())
        } else {
            Err(Error::HelperClassCollision(collisions))
        }
    }

    fn has_movable_methods(&self, class: &ClassFile) -> Result<bool, Error> {
        if !class.is_interface() {
            return Ok(false);
        }
        for method in &class.methods {
            if is_movable(method, &class.constants)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn helper_name(&self, interface: &BinaryName) -> Option<BinaryName> {
        let name = format!("{}{}", interface.as_str(), self.settings.helper_class_suffix);
        match BinaryName::from_string(name) {
            Ok(name) => Some(name),
            Err(msg) => {
                log::warn!("Not relocating static methods of {:?}: {}", interface, msg);
                None
            }
        }
    }

    /// Split the static methods off an interface into a new helper class
    fn extract_helper(
        &self,
        interface: &mut ClassFile,
        interface_name: &BinaryName,
        helper_name: BinaryName,
    ) -> Result<(Relocation, ClassFile), Error> {
        let mut constants = interface.constants.clone();
        let this_class = constants.get_class(helper_name.as_str())?;
        let super_class = constants.get_class(BinaryName::OBJECT.as_str())?;

        let mut moved: Vec<Method> = vec![];
        let mut kept: Vec<Method> = vec![];
        for method in std::mem::take(&mut interface.methods) {
            if is_movable(&method, &interface.constants)? {
                moved.push(method);
            } else {
                kept.push(method);
            }
        }
        interface.methods = kept;

        let mut methods = vec![];
        for method in &mut moved {
            method
                .access_flags
                .remove(MethodAccessFlags::PRIVATE | MethodAccessFlags::PROTECTED);
            method.access_flags.insert(MethodAccessFlags::PUBLIC);
            methods.push((
                method.name(&constants)?.to_owned(),
                method.descriptor(&constants)?.to_owned(),
            ));
        }

        let mut attributes = vec![];
        for attribute in &interface.attributes {
            let name = attribute.name(&constants)?;
            if name == BootstrapMethods::NAME || name == SourceFile::NAME {
                attributes.push(attribute.clone());
            }
        }

        let helper = ClassFile {
            version: interface.version,
            constants,
            access_flags: ClassAccessFlags::PUBLIC
                | ClassAccessFlags::FINAL
                | ClassAccessFlags::SUPER
                | ClassAccessFlags::SYNTHETIC,
            this_class,
            super_class: Some(super_class),
            interfaces: vec![],
            fields: vec![],
            methods: moved,
            attributes,
        };
        let relocation = Relocation {
            interface: interface_name.clone(),
            helper: helper_name,
            methods,
        };
        Ok((relocation, helper))
    }

    /// Mirror the move in the class graph
    fn register_helper(&self, relocation: &Relocation, helper: &ClassFile) -> Result<(), Error> {
        match self.class_graph.lookup_class(relocation.interface.as_str()) {
            Some(interface) => {
                for (name, descriptor) in &relocation.methods {
                    if let Some(method) = interface.find_method(name, descriptor) {
                        self.class_graph.remove_method(method);
                    }
                }
            }
            None => log::debug!(
                "Interface {:?} is not in the class graph",
                relocation.interface
            ),
        }

        let object = self.class_graph.lookup_class(BinaryName::OBJECT.as_str());
        let helper_class = self.class_graph.add_class(ClassData::new(
            relocation.helper.clone(),
            object,
            helper.access_flags,
            ClassOrigin::Program,
        ));
        self.class_graph
            .add_class_file_methods(helper_class, helper)?;
        Ok(())
    }

    /// Point every static call and static method handle of a moved method at its helper class
    fn redirect_calls(
        &self,
        program: &mut Program,
        relocations: &[Relocation],
        observer: &mut dyn ConversionObserver,
    ) -> Result<(), Error> {
        let mut rules = vec![];
        let mut moved: HashMap<(String, String, String), String> = HashMap::new();
        for relocation in relocations {
            for (name, descriptor) in &relocation.methods {
                let from = MemberRef {
                    class: relocation.interface.as_str().to_owned(),
                    name: name.clone(),
                    descriptor: descriptor.clone(),
                    kind: MemberRefKind::InterfaceMethod,
                };
                let to = MemberRef {
                    class: relocation.helper.as_str().to_owned(),
                    name: name.clone(),
                    descriptor: descriptor.clone(),
                    kind: MemberRefKind::Method,
                };
                rules.push(ReplacementRule::invoke(
                    InvokeKind::Static,
                    from,
                    InvokeKind::Static,
                    to,
                ));
                moved.insert(
                    (
                        relocation.interface.as_str().to_owned(),
                        name.clone(),
                        descriptor.clone(),
                    ),
                    relocation.helper.as_str().to_owned(),
                );
            }
        }
        let replacer = InstructionSequenceReplacer::new(rules);
        let helpers: BTreeSet<&BinaryName> = relocations.iter().map(|r| &r.helper).collect();

        let mut modified: BTreeSet<BinaryName> = relocations
            .iter()
            .map(|relocation| relocation.interface.clone())
            .collect();
        for (class_name, class) in program.iter_mut() {
            let ClassFile {
                constants, methods, ..
            } = class;

            let mut class_modified = false;
            for method in methods.iter_mut() {
                let code_position = match method.code_position(constants)? {
                    Some(position) => position,
                    None => continue,
                };
                let mut code: Code = method.attributes[code_position].decode()?;
                let replaced = replacer.replace(&mut code, constants)?;
                if replaced > 0 {
                    method.attributes[code_position].replace(&code)?;
                    observer.replaced_instructions(class_name, method.name(constants)?, replaced);
                    class_modified = true;
                }
            }

            for index in constants.indices() {
                let member = match constants.get(index)? {
                    Constant::MethodHandle {
                        handle_kind: HandleKind::InvokeStatic,
                        member,
                    } => *member,
                    _ => continue,
                };
                let reference = constants.member_ref(member)?;
                if reference.kind != MemberRefKind::InterfaceMethod {
                    continue;
                }
                let key = (
                    reference.class.clone(),
                    reference.name.clone(),
                    reference.descriptor.clone(),
                );
                if let Some(helper) = moved.get(&key) {
                    let method_ref = constants.get_method_ref(
                        helper,
                        &reference.name,
                        &reference.descriptor,
                        false,
                    )?;
                    let handle = Constant::MethodHandle {
                        handle_kind: HandleKind::InvokeStatic,
                        member: method_ref.0,
                    };
                    constants.set(index, handle)?;
                    log::trace!(
                        "Repointed method handle {}.{} in {:?} to {}",
                        reference.class,
                        reference.name,
                        class_name,
                        helper
                    );
                    class_modified = true;
                }
            }

            if class_modified && !helpers.contains(&class_name) {
                modified.insert(class_name.clone());
            }
        }

        for class_name in &modified {
            observer.modified_class(class_name);
        }
        Ok(())
    }
}

/// Static methods other than the class initializer can be moved
fn is_movable(method: &Method, constants: &ConstantPool) -> Result<bool, Error> {
    Ok(method.access_flags.is_static()
        && method.name(constants)? != UnqualifiedName::CLINIT.as_str())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backport::ChangeLog;
    use crate::jvm::class_file::{ClassBuilder, Version};
    use crate::jvm::class_graph::ClassGraphArenas;
    use crate::jvm::code::{decode_instructions, opcodes};

    fn name(name: &str) -> BinaryName {
        BinaryName::from_string(name.to_owned()).unwrap()
    }

    fn code(code_array: Vec<u8>) -> Code {
        Code {
            max_stack: 1,
            max_locals: 1,
            code_array,
            exception_table: vec![],
            attributes: vec![],
        }
    }

    /// Interface with a static method `m()V`, a default method calling it, an abstract method,
    /// and a class initializer
    fn interface(interface: &str) -> ClassFile {
        let mut class = ClassBuilder::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
            &name(interface),
            Some(&BinaryName::OBJECT),
            &[],
        )
        .unwrap();
        let m = class
            .constants
            .get_method_ref(interface, "m", "()V", true)
            .unwrap();
        let [hi, lo] = m.0 .0.to_be_bytes();
        class
            .add_method(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                "m",
                "()V",
                Some(&code(vec![0xb1])),
            )
            .unwrap();
        class
            .add_method(
                MethodAccessFlags::PUBLIC,
                "d",
                "()V",
                Some(&code(vec![opcodes::INVOKESTATIC, hi, lo, 0xb1])),
            )
            .unwrap();
        class
            .add_method(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
                "a",
                "()I",
                None,
            )
            .unwrap();
        class
            .add_method(
                MethodAccessFlags::STATIC,
                "<clinit>",
                "()V",
                Some(&code(vec![0xb1])),
            )
            .unwrap();
        class.result()
    }

    /// Class calling `m()V` on an interface, and holding a method handle to it
    fn caller(caller: &str, interface: &str) -> (ClassFile, u16) {
        let mut class = ClassBuilder::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            &name(caller),
            Some(&BinaryName::OBJECT),
            &[],
        )
        .unwrap();
        let m = class
            .constants
            .get_method_ref(interface, "m", "()V", true)
            .unwrap();
        let handle = class
            .constants
            .get_method_handle(HandleKind::InvokeStatic, m.0)
            .unwrap();
        let [hi, lo] = m.0 .0.to_be_bytes();
        class
            .add_method(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                "run",
                "()V",
                Some(&code(vec![opcodes::INVOKESTATIC, hi, lo, 0xb1])),
            )
            .unwrap();
        (class.result(), handle.0)
    }

    fn invoked(class: &ClassFile, method: &str) -> MemberRef {
        let idx = class.find_method(method, "()V").unwrap().unwrap();
        let code = class.methods[idx].code(&class.constants).unwrap().unwrap();
        let instructions = decode_instructions(&code.code_array).unwrap();
        class
            .constants
            .member_ref(instructions[0].constant_index().unwrap())
            .unwrap()
    }

    #[test]
    fn moving_static_methods() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        graph.insert_java_library_types();
        let settings = Settings::new();

        let (caller, handle) = caller("a/Caller", "a/I");
        let mut program = Program::from_class_files(vec![interface("a/I"), caller]).unwrap();
        graph
            .add_class_files(program.class_files(), ClassOrigin::Program)
            .unwrap();

        let relocator = StaticInterfaceMethodRelocator::new(&graph, &settings);
        let mut log = ChangeLog::new();
        assert_eq!(relocator.relocate_program(&mut program, &mut log).unwrap(), 1);

        // Helper class holds `m`, interface keeps everything else
        let helper = program.get("a/I$$Util").unwrap();
        assert_eq!(helper.name().unwrap(), name("a/I$$Util"));
        assert_eq!(helper.super_name().unwrap(), Some(BinaryName::OBJECT));
        assert!(!helper.is_interface());
        assert_eq!(helper.methods.len(), 1);
        assert!(helper.find_method("m", "()V").unwrap().is_some());
        let interface = program.get("a/I").unwrap();
        assert!(interface.find_method("m", "()V").unwrap().is_none());
        assert!(interface.find_method("d", "()V").unwrap().is_some());
        assert!(interface.find_method("a", "()I").unwrap().is_some());
        assert!(interface.find_method("<clinit>", "()V").unwrap().is_some());

        // Calls from anywhere now go through the helper
        let expected = MemberRef {
            class: String::from("a/I$$Util"),
            name: String::from("m"),
            descriptor: String::from("()V"),
            kind: MemberRefKind::Method,
        };
        assert_eq!(invoked(program.get("a/Caller").unwrap(), "run"), expected);
        assert_eq!(invoked(interface, "d"), expected);
        let caller = program.get("a/Caller").unwrap();
        match caller.constants.get(crate::jvm::class_file::ConstantIndex(handle)).unwrap() {
            Constant::MethodHandle {
                handle_kind: HandleKind::InvokeStatic,
                member,
            } => assert_eq!(caller.constants.member_ref(*member).unwrap(), expected),
            other => panic!("unexpected constant {:?}", other),
        }

        // Class graph follows along
        let helper_class = graph.lookup_class("a/I$$Util").unwrap();
        assert!(helper_class.find_method("m", "()V").is_some());
        let interface_class = graph.lookup_class("a/I").unwrap();
        assert!(interface_class.find_method("m", "()V").is_none());
        assert!(interface_class.find_method("d", "()V").is_some());

        assert_eq!(log.extra_classes, vec![name("a/I$$Util")]);
        assert_eq!(
            log.extra_members,
            vec![(name("a/I$$Util"), String::from("m"), String::from("()V"))]
        );
        assert_eq!(log.modified_classes, vec![name("a/Caller"), name("a/I")]);

        // Nothing left to do the second time around
        let mut log = ChangeLog::new();
        assert_eq!(relocator.relocate_program(&mut program, &mut log).unwrap(), 0);
        assert!(log.is_empty());
    }

    #[test]
    fn helper_name_collisions() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        graph.insert_java_library_types();
        let settings = Settings::new();

        // `a/I$$Util` is taken, but `a/J` can still be relocated
        let (taken, _) = caller("a/I$$Util", "a/J");
        let mut program =
            Program::from_class_files(vec![interface("a/I"), interface("a/J"), taken]).unwrap();

        let relocator = StaticInterfaceMethodRelocator::new(&graph, &settings);
        let mut log = ChangeLog::new();
        match relocator.relocate_program(&mut program, &mut log) {
            Err(Error::HelperClassCollision(names)) => {
                assert_eq!(names, vec![name("a/I$$Util")])
            }
            other => panic!("expected a collision, got {:?}", other),
        }
        assert!(program.get("a/I").unwrap().find_method("m", "()V").unwrap().is_some());
        assert!(program.contains("a/J$$Util"));
        assert_eq!(log.extra_classes, vec![name("a/J$$Util")]);
        assert_eq!(
            invoked(program.get("a/I$$Util").unwrap(), "run").class,
            "a/J$$Util"
        );
    }

    #[test]
    fn custom_suffix() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let mut settings = Settings::new();
        settings.helper_class_suffix = String::from("Statics");

        let mut program = Program::from_class_files(vec![interface("a/I")]).unwrap();
        let relocator = StaticInterfaceMethodRelocator::new(&graph, &settings);
        relocator
            .relocate_program(&mut program, &mut crate::backport::IgnoreChanges)
            .unwrap();
        assert!(program.contains("a/IStatics"));
        assert!(graph.lookup_class("a/IStatics").is_some());
    }
}
