use super::{Error, Program};
use crate::jvm::class_file::{
    find_attribute, BootstrapMethod, BootstrapMethods, ClassConstantIndex, ClassFile, Constant,
    ConstantIndex, ConstantPool, HandleKind, MemberRef,
};
use crate::jvm::class_graph::{ClassGraph, ClassId, MethodId};
use crate::jvm::code::parse_method_descriptor;
use crate::jvm::{BinaryName, FieldType, MethodDescriptor, Name, UnqualifiedName};
use std::collections::BTreeMap;

/// `altMetafactory` flag: the lambda object must be serializable
pub const FLAG_SERIALIZABLE: i32 = 1;

/// `altMetafactory` flag: extra marker interfaces follow the flags
pub const FLAG_MARKERS: i32 = 2;

/// `altMetafactory` flag: extra bridge method types follow the flags (and markers)
pub const FLAG_BRIDGES: i32 = 4;

/// Lambda expressions found in a program, keyed by call site
pub type LambdaExpressions<'g> = BTreeMap<LambdaSite, LambdaExpression<'g>>;

/// An `invokedynamic` call site
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LambdaSite {
    /// Class containing the call site
    pub class: BinaryName,

    /// `CONSTANT_InvokeDynamic` used by the call site
    pub invoke_dynamic: ConstantIndex,
}

/// How the implementation method of a lambda is invoked
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InvokedKind {
    Static,
    Virtual,
    Special,
    Interface,

    /// Constructor reference (`Foo::new`)
    NewInstance,
}

impl InvokedKind {
    /// Field handles are not callable, so they have no counterpart
    pub fn from_handle_kind(handle_kind: HandleKind) -> Option<InvokedKind> {
        match handle_kind {
            HandleKind::InvokeStatic => Some(InvokedKind::Static),
            HandleKind::InvokeVirtual => Some(InvokedKind::Virtual),
            HandleKind::InvokeSpecial => Some(InvokedKind::Special),
            HandleKind::InvokeInterface => Some(InvokedKind::Interface),
            HandleKind::NewInvokeSpecial => Some(InvokedKind::NewInstance),
            HandleKind::GetField
            | HandleKind::GetStatic
            | HandleKind::PutField
            | HandleKind::PutStatic => None,
        }
    }
}

/// Decoded `LambdaMetafactory` call site
///
/// The call site produces an object implementing `interfaces` whose functional method
/// (`method_name` with type `method_descriptor`) forwards to the invoked method.
#[derive(Clone, Debug)]
pub struct LambdaExpression<'g> {
    /// Class containing the call site
    pub class: BinaryName,

    /// Index into the class's `BootstrapMethods` attribute
    pub bootstrap_method_index: u16,
    pub bootstrap_method: BootstrapMethod,

    /// Type of the `invokedynamic` itself: captured arguments in, functional object out
    pub factory_descriptor: MethodDescriptor<BinaryName>,

    /// Interfaces implemented by the lambda object (the functional interface comes first)
    pub interfaces: Vec<BinaryName>,

    /// Additional erased method types the lambda object must bridge
    pub bridge_descriptors: Vec<MethodDescriptor<BinaryName>>,

    /// Functional interface method being implemented
    pub method_name: UnqualifiedName,
    pub method_descriptor: MethodDescriptor<BinaryName>,

    /// Functional method type after specialization (eg. generics filled in)
    pub instantiated_descriptor: MethodDescriptor<BinaryName>,

    /// Flags passed to `altMetafactory` (always zero for `metafactory`)
    pub flags: i32,

    pub invoked_kind: InvokedKind,
    pub invoked_class_name: String,
    pub invoked_method_name: String,
    pub invoked_descriptor: String,

    /// Resolved invoked class and method (if they are known to the class graph)
    pub invoked_class: Option<ClassId<'g>>,
    pub invoked_method: Option<MethodId<'g>>,
}

impl<'g> LambdaExpression<'g> {
    /// Is this a constructor reference to a private constructor?
    pub fn references_private_constructor(&self) -> bool {
        self.invoked_kind == InvokedKind::NewInstance
            && self.invoked_method_name == UnqualifiedName::INIT.as_str()
            && self.invoked_method.map_or(false, |method| method.is_private())
    }

    pub fn is_serializable(&self) -> bool {
        self.flags & FLAG_SERIALIZABLE != 0
    }

    /// Does the lambda point at an existing method instead of at a synthetic `lambda$` body?
    pub fn is_method_reference(&self) -> bool {
        !self.invoked_method_name.starts_with("lambda$")
    }

    /// Does the call site capture nothing?
    pub fn is_stateless(&self) -> bool {
        self.factory_descriptor.parameters.is_empty()
    }

    /// The functional interface implemented by the lambda
    pub fn functional_interface(&self) -> Option<&BinaryName> {
        self.interfaces.first()
    }

    pub fn instantiated_method_descriptor(&self) -> &MethodDescriptor<BinaryName> {
        &self.instantiated_descriptor
    }
}

/// Finds the lambda expressions in classes
///
/// This only reads classes: nothing is rewritten. Call sites whose bootstrap arguments don't
/// have the shape `LambdaMetafactory` expects are skipped with a warning.
pub struct LambdaExpressionCollector<'a, 'g> {
    class_graph: &'a ClassGraph<'g>,
}

impl<'a, 'g> LambdaExpressionCollector<'a, 'g> {
    pub fn new(class_graph: &'a ClassGraph<'g>) -> LambdaExpressionCollector<'a, 'g> {
        LambdaExpressionCollector { class_graph }
    }

    /// Collect lambda expressions from every class in the program
    pub fn collect_program(&self, program: &Program) -> Result<LambdaExpressions<'g>, Error> {
        let mut lambdas = LambdaExpressions::new();
        for class in program.class_files() {
            self.collect_class(class, &mut lambdas)?;
        }
        log::debug!(
            "Found {} lambda expressions in {} classes",
            lambdas.len(),
            program.len()
        );
        Ok(lambdas)
    }

    /// Collect the lambda expressions of one class, returning how many were found
    pub fn collect_class(
        &self,
        class: &ClassFile,
        lambdas: &mut LambdaExpressions<'g>,
    ) -> Result<usize, Error> {
        let bootstrap_methods: BootstrapMethods =
            match find_attribute(&class.attributes, &class.constants)? {
                Some(bootstrap_methods) => bootstrap_methods,
                None => return Ok(0),
            };
        let class_name = class.name()?;
        let constants = &class.constants;

        let mut found = 0;
        for (index, constant) in constants.iter() {
            let (bootstrap_method_index, name_and_type) = match constant {
                Constant::InvokeDynamic {
                    bootstrap_method,
                    method_descriptor,
                } => (*bootstrap_method, *method_descriptor),
                _ => continue,
            };
            let bootstrap_method = match bootstrap_methods.0.get(bootstrap_method_index as usize) {
                Some(bootstrap_method) => bootstrap_method,
                None => {
                    log::warn!(
                        "Skipping call site {:?} in {:?}: missing bootstrap method {}",
                        index,
                        class_name,
                        bootstrap_method_index
                    );
                    continue;
                }
            };
            let is_alternate = match lambda_bootstrap(constants, bootstrap_method.bootstrap_method)? {
                Some(is_alternate) => is_alternate,
                None => continue,
            };

            let (method_name, factory_descriptor) = constants.name_and_type_strs(name_and_type)?;
            let decoded = self.decode(
                constants,
                &class_name,
                bootstrap_method_index,
                bootstrap_method,
                is_alternate,
                method_name,
                factory_descriptor,
            );
            match decoded {
                Ok(lambda) => {
                    log::trace!(
                        "Lambda {:?} at {:?} in {:?} invokes {}.{}{}",
                        lambda.interfaces,
                        index,
                        class_name,
                        lambda.invoked_class_name,
                        lambda.invoked_method_name,
                        lambda.invoked_descriptor
                    );
                    lambdas.insert(
                        LambdaSite {
                            class: class_name.clone(),
                            invoke_dynamic: index,
                        },
                        lambda,
                    );
                    found += 1;
                }
                Err(reason) => log::warn!(
                    "Skipping lambda call site {:?} in {:?}: {}",
                    index,
                    class_name,
                    reason
                ),
            }
        }
        Ok(found)
    }

    /// Decode the bootstrap arguments of a lambda call site
    ///
    /// The arguments are `(samMethodType, implMethod, instantiatedMethodType)` for both factories,
    /// followed for `altMetafactory` by the flags and then optional marker interfaces and bridges.
    #[allow(clippy::too_many_arguments)]
    fn decode(
        &self,
        constants: &ConstantPool,
        class_name: &BinaryName,
        bootstrap_method_index: u16,
        bootstrap_method: &BootstrapMethod,
        is_alternate: bool,
        method_name: &str,
        factory_descriptor: &str,
    ) -> Result<LambdaExpression<'g>, String> {
        let mut arguments = bootstrap_method.bootstrap_arguments.iter().copied();
        let mut next_argument = |what: &str| {
            arguments
                .next()
                .ok_or_else(|| format!("missing bootstrap argument ({})", what))
        };

        let method_descriptor = method_type(constants, next_argument("method type")?)?;
        let (invoked_kind, invoked) = method_handle(constants, next_argument("implementation")?)?;
        let instantiated_descriptor =
            method_type(constants, next_argument("instantiated method type")?)?;

        let factory_descriptor = parse_method_descriptor(factory_descriptor)
            .map_err(|err| format!("malformed descriptor {:?}", err))?;
        let functional_interface = match &factory_descriptor.return_type {
            Some(FieldType::Object(class)) => class.clone(),
            _ => return Err(String::from("factory does not return an interface")),
        };
        let method_name = UnqualifiedName::from_string(method_name.to_owned())?;

        let mut interfaces = vec![functional_interface];
        let mut bridge_descriptors = vec![];
        let mut flags = 0;
        if is_alternate {
            flags = integer(constants, next_argument("flags")?)?;
            if flags & FLAG_MARKERS != 0 {
                let count = integer(constants, next_argument("marker count")?)?;
                for _ in 0..count {
                    let marker = constants
                        .class_name(ClassConstantIndex(next_argument("marker")?))
                        .map_err(|err| format!("{:?}", err))?;
                    interfaces.push(BinaryName::from_string(marker.to_owned())?);
                }
            }
            if flags & FLAG_SERIALIZABLE != 0 && !interfaces.contains(&BinaryName::SERIALIZABLE) {
                interfaces.push(BinaryName::SERIALIZABLE);
            }
            if flags & FLAG_BRIDGES != 0 {
                let count = integer(constants, next_argument("bridge count")?)?;
                for _ in 0..count {
                    bridge_descriptors.push(method_type(constants, next_argument("bridge")?)?);
                }
            }
        }

        let invoked_class = self.class_graph.lookup_class(&invoked.class);
        let invoked_method = invoked_class.and_then(|class| {
            self.class_graph
                .resolve_method(class, &invoked.name, &invoked.descriptor)
        });

        Ok(LambdaExpression {
            class: class_name.clone(),
            bootstrap_method_index,
            bootstrap_method: bootstrap_method.clone(),
            factory_descriptor,
            interfaces,
            bridge_descriptors,
            method_name,
            method_descriptor,
            instantiated_descriptor,
            flags,
            invoked_kind,
            invoked_class_name: invoked.class,
            invoked_method_name: invoked.name,
            invoked_descriptor: invoked.descriptor,
            invoked_class,
            invoked_method,
        })
    }
}

/// Check if a bootstrap method handle is one of the lambda factories
///
/// Returns whether it is the `altMetafactory` variant.
fn lambda_bootstrap(constants: &ConstantPool, handle: ConstantIndex) -> Result<Option<bool>, Error> {
    let member = match constants.get(handle)? {
        Constant::MethodHandle {
            handle_kind: HandleKind::InvokeStatic,
            member,
        } => *member,
        _ => return Ok(None),
    };
    let member = constants.member_ref(member)?;
    if member.class != BinaryName::LAMBDAMETAFACTORY.as_str() {
        Ok(None)
    } else if member.name == UnqualifiedName::METAFACTORY.as_str() {
        Ok(Some(false))
    } else if member.name == UnqualifiedName::ALTMETAFACTORY.as_str() {
        Ok(Some(true))
    } else {
        Ok(None)
    }
}

fn method_type(
    constants: &ConstantPool,
    index: ConstantIndex,
) -> Result<MethodDescriptor<BinaryName>, String> {
    match constants.get(index) {
        Ok(Constant::MethodType { descriptor }) => {
            let descriptor = constants
                .utf8(*descriptor)
                .map_err(|err| format!("{:?}", err))?;
            parse_method_descriptor(descriptor).map_err(|err| format!("{:?}", err))
        }
        _ => Err(format!("expected a method type at {:?}", index)),
    }
}

fn method_handle(
    constants: &ConstantPool,
    index: ConstantIndex,
) -> Result<(InvokedKind, MemberRef), String> {
    match constants.get(index) {
        Ok(Constant::MethodHandle {
            handle_kind,
            member,
        }) => {
            let kind = InvokedKind::from_handle_kind(*handle_kind)
                .ok_or_else(|| format!("field handle {:?} cannot implement a lambda", handle_kind))?;
            let member = constants
                .member_ref(*member)
                .map_err(|err| format!("{:?}", err))?;
            Ok((kind, member))
        }
        _ => Err(format!("expected a method handle at {:?}", index)),
    }
}

fn integer(constants: &ConstantPool, index: ConstantIndex) -> Result<i32, String> {
    match constants.get(index) {
        Ok(Constant::Integer(value)) => Ok(*value),
        _ => Err(format!("expected an integer at {:?}", index)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{ClassBuilder, Code, Version};
    use crate::jvm::class_graph::{ClassData, ClassGraphArenas, ClassOrigin, MethodData};
    use crate::jvm::code::opcodes;
    use crate::jvm::{ClassAccessFlags, MethodAccessFlags, ParseDescriptor};

    fn name(name: &str) -> BinaryName {
        BinaryName::from_string(name.to_owned()).unwrap()
    }

    /// Class with one method whose body is a single lambda call site
    fn class_with_lambda(
        alternate: bool,
        implementation: (HandleKind, &str, &str, &str),
        factory_descriptor: &str,
        extra_arguments: impl FnOnce(&mut ConstantPool) -> Vec<ConstantIndex>,
    ) -> (ClassFile, ConstantIndex) {
        let mut class = ClassBuilder::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            &name("a/Lambdas"),
            Some(&BinaryName::OBJECT),
            &[],
        )
        .unwrap();

        let factory_name = if alternate { "altMetafactory" } else { "metafactory" };
        let factory = class
            .constants
            .get_method_ref(
                "java/lang/invoke/LambdaMetafactory",
                factory_name,
                "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;",
                false,
            )
            .unwrap();
        let factory = class
            .constants
            .get_method_handle(HandleKind::InvokeStatic, factory.0)
            .unwrap();

        let (handle_kind, invoked_class, invoked_name, invoked_descriptor) = implementation;
        let sam = class.constants.get_method_type("()Ljava/lang/Object;").unwrap();
        let invoked = class
            .constants
            .get_method_ref(invoked_class, invoked_name, invoked_descriptor, false)
            .unwrap();
        let invoked = class
            .constants
            .get_method_handle(handle_kind, invoked.0)
            .unwrap();
        let instantiated = class.constants.get_method_type("()Ljava/lang/String;").unwrap();

        let mut arguments = vec![sam, invoked, instantiated];
        arguments.extend(extra_arguments(&mut class.constants));
        let bootstrap = class.add_bootstrap_method(factory, arguments).unwrap();

        let name_and_type = class
            .constants
            .get_name_and_type("get", factory_descriptor)
            .unwrap();
        let call_site = class
            .constants
            .get_invoke_dynamic(bootstrap, name_and_type)
            .unwrap()
            .0;
        let [hi, lo] = call_site.0.to_be_bytes();

        let code = Code {
            max_stack: 1,
            max_locals: 0,
            code_array: vec![opcodes::INVOKEDYNAMIC, hi, lo, 0, 0, 0xb0],
            exception_table: vec![],
            attributes: vec![],
        };
        class
            .add_method(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                "supplier",
                factory_descriptor,
                Some(&code),
            )
            .unwrap();
        (class.result(), call_site)
    }

    #[test]
    fn collecting_simple_lambda() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        graph.insert_java_library_types();

        let (class, call_site) = class_with_lambda(
            false,
            (
                HandleKind::InvokeStatic,
                "a/Lambdas",
                "lambda$supplier$0",
                "()Ljava/lang/String;",
            ),
            "()Ljava/util/function/Supplier;",
            |_| vec![],
        );

        let mut lambdas = LambdaExpressions::new();
        let collector = LambdaExpressionCollector::new(&graph);
        assert_eq!(collector.collect_class(&class, &mut lambdas).unwrap(), 1);

        let lambda = &lambdas[&LambdaSite {
            class: name("a/Lambdas"),
            invoke_dynamic: call_site,
        }];
        assert_eq!(lambda.interfaces, vec![name("java/util/function/Supplier")]);
        assert_eq!(lambda.method_name.as_str(), "get");
        assert_eq!(
            lambda.method_descriptor,
            MethodDescriptor::parse("()Ljava/lang/Object;").unwrap()
        );
        assert_eq!(
            lambda.instantiated_method_descriptor(),
            &MethodDescriptor::parse("()Ljava/lang/String;").unwrap()
        );
        assert_eq!(lambda.invoked_kind, InvokedKind::Static);
        assert_eq!(lambda.invoked_method_name, "lambda$supplier$0");
        assert!(!lambda.is_method_reference());
        assert!(lambda.is_stateless());
        assert!(!lambda.is_serializable());
        assert!(lambda.bridge_descriptors.is_empty());

        // Not in the class graph
        assert!(lambda.invoked_class.is_none());
        assert!(!lambda.references_private_constructor());
    }

    #[test]
    fn serializable_lambda_has_two_interfaces() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        graph.insert_java_library_types();

        let (class, _) = class_with_lambda(
            true,
            (
                HandleKind::InvokeVirtual,
                "java/lang/Object",
                "toString",
                "()Ljava/lang/String;",
            ),
            "(Ljava/lang/Object;)Ljava/util/function/Supplier;",
            |constants| {
                let flags = constants.get_integer(FLAG_SERIALIZABLE | FLAG_BRIDGES).unwrap();
                let count = constants.get_integer(1).unwrap();
                let bridge = constants.get_method_type("()Ljava/lang/CharSequence;").unwrap();
                vec![flags, count, bridge]
            },
        );

        let collector = LambdaExpressionCollector::new(&graph);
        let mut lambdas = LambdaExpressions::new();
        collector.collect_class(&class, &mut lambdas).unwrap();
        let lambda = lambdas.values().next().unwrap();

        assert_eq!(
            lambda.interfaces,
            vec![
                name("java/util/function/Supplier"),
                name("java/io/Serializable")
            ]
        );
        assert_eq!(lambda.functional_interface(), Some(&name("java/util/function/Supplier")));
        assert!(lambda.is_serializable());
        assert!(lambda.is_method_reference());
        assert!(!lambda.is_stateless());
        assert_eq!(lambda.invoked_kind, InvokedKind::Virtual);
        assert_eq!(
            lambda.bridge_descriptors,
            vec![MethodDescriptor::parse("()Ljava/lang/CharSequence;").unwrap()]
        );
    }

    #[test]
    fn markers_come_after_functional_interface() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        graph.insert_java_library_types();

        let (class, _) = class_with_lambda(
            true,
            (
                HandleKind::InvokeStatic,
                "a/Lambdas",
                "lambda$supplier$0",
                "()Ljava/lang/String;",
            ),
            "()Ljava/util/function/Supplier;",
            |constants| {
                let flags = constants
                    .get_integer(FLAG_MARKERS | FLAG_SERIALIZABLE)
                    .unwrap();
                let count = constants.get_integer(1).unwrap();
                let marker = constants.get_class("a/Marker").unwrap();
                vec![flags, count, marker.0]
            },
        );

        let collector = LambdaExpressionCollector::new(&graph);
        let mut lambdas = LambdaExpressions::new();
        collector.collect_class(&class, &mut lambdas).unwrap();
        let lambda = lambdas.values().next().unwrap();
        assert_eq!(
            lambda.interfaces,
            vec![
                name("java/util/function/Supplier"),
                name("a/Marker"),
                name("java/io/Serializable")
            ]
        );
    }

    #[test]
    fn private_constructor_references() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        graph.insert_java_library_types();
        let widget = graph.add_class(ClassData::new(
            name("a/Widget"),
            graph.lookup_class("java/lang/Object"),
            ClassAccessFlags::PUBLIC,
            ClassOrigin::Program,
        ));
        graph.add_method(MethodData {
            class: widget,
            name: UnqualifiedName::INIT,
            descriptor: MethodDescriptor::parse("()V").unwrap(),
            access_flags: MethodAccessFlags::PRIVATE,
        });

        let (class, _) = class_with_lambda(
            false,
            (HandleKind::NewInvokeSpecial, "a/Widget", "<init>", "()V"),
            "()Ljava/util/function/Supplier;",
            |_| vec![],
        );
        let collector = LambdaExpressionCollector::new(&graph);
        let mut lambdas = LambdaExpressions::new();
        collector.collect_class(&class, &mut lambdas).unwrap();
        let lambda = lambdas.values().next().unwrap();
        assert_eq!(lambda.invoked_kind, InvokedKind::NewInstance);
        assert_eq!(lambda.invoked_class, Some(widget));
        assert!(lambda.references_private_constructor());
    }

    #[test]
    fn malformed_call_sites_are_skipped() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        graph.insert_java_library_types();

        // `altMetafactory` without its flags argument
        let (class, _) = class_with_lambda(
            true,
            (
                HandleKind::InvokeStatic,
                "a/Lambdas",
                "lambda$supplier$0",
                "()Ljava/lang/String;",
            ),
            "()Ljava/util/function/Supplier;",
            |_| vec![],
        );
        let collector = LambdaExpressionCollector::new(&graph);
        let mut lambdas = LambdaExpressions::new();
        assert_eq!(collector.collect_class(&class, &mut lambdas).unwrap(), 0);
        assert!(lambdas.is_empty());
    }
}
