use super::class_file::ClassFile;
use super::{
    BinaryName, ClassAccessFlags, Error, MethodAccessFlags, MethodDescriptor, Name,
    ParseDescriptor, RenderDescriptor, UnqualifiedName,
};
use crate::util::RefId;
use elsa::FrozenVec;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::fmt::Debug;
use typed_arena::Arena;

mod assignable;
mod java_lib_types;

pub use assignable::*;
pub use java_lib_types::*;

pub type ClassId<'g> = RefId<'g, ClassData<'g>>;
pub type MethodId<'g> = RefId<'g, MethodData<'g>>;

pub struct ClassGraphArenas<'g> {
    class_arena: Arena<ClassData<'g>>,
    method_arena: Arena<MethodData<'g>>,
}

impl<'g> ClassGraphArenas<'g> {
    pub fn new() -> Self {
        ClassGraphArenas {
            class_arena: Arena::new(),
            method_arena: Arena::new(),
        }
    }
}

impl<'g> Default for ClassGraphArenas<'g> {
    fn default() -> Self {
        ClassGraphArenas::new()
    }
}

/// Tracks the relationships between classes/interfaces and the methods on those classes
///
/// This is the combined repository of the program being converted and the library it is
/// converted against. Everything needed to resolve a symbolic reference lives here: the supertype
/// edges for subtyping queries and the declared methods (with their access flags) for method
/// resolution. Code and constant pools stay in the class files.
///
/// Classes can be added through a shared reference, so that passes holding on to `ClassId`s can
/// still register new classes (eg. generated helper types).
pub struct ClassGraph<'g> {
    arenas: &'g ClassGraphArenas<'g>,
    classes: RefCell<HashMap<BinaryName, ClassId<'g>>>,
}

impl<'g> ClassGraph<'g> {
    /// New empty graph
    pub fn new(arenas: &'g ClassGraphArenas<'g>) -> Self {
        ClassGraph {
            arenas,
            classes: RefCell::new(HashMap::new()),
        }
    }

    /// Find a class by its binary name
    pub fn lookup_class(&self, name: &str) -> Option<ClassId<'g>> {
        self.classes.borrow().get(name).copied()
    }

    /// All classes in the graph, sorted by name
    pub fn classes(&self) -> Vec<ClassId<'g>> {
        let mut classes: Vec<ClassId<'g>> = self.classes.borrow().values().copied().collect();
        classes.sort_by(|c1, c2| c1.name.cmp(&c2.name));
        classes
    }

    /// Add a new class to the class graph
    ///
    /// If there is already a class by the same name, the new one shadows it.
    pub fn add_class(&self, data: ClassData<'g>) -> ClassId<'g> {
        let data = RefId(&*self.arenas.class_arena.alloc(data));
        self.classes.borrow_mut().insert(data.name.clone(), data);
        data
    }

    /// Add a method to the class graph and to its class
    ///
    /// If the class already has a method with the same name and descriptor, that is returned
    /// instead.
    pub fn add_method(&self, method: MethodData<'g>) -> MethodId<'g> {
        if let Some(existing) = method
            .class
            .find_method(method.name.as_str(), &method.descriptor.render())
        {
            existing
        } else {
            let data = RefId(&*self.arenas.method_arena.alloc(method));
            data.class.methods.borrow_mut().push(data);
            data
        }
    }

    /// Remove a method from its class
    pub fn remove_method(&self, method: MethodId<'g>) {
        method.class.methods.borrow_mut().retain(|m| *m != method);
    }

    /// Add classes (along with their methods) from parsed class files
    ///
    /// Supertypes are linked regardless of the order of the class files. Supertypes which are
    /// neither in the input nor already in the graph are left unlinked. Classes whose names are
    /// already in the graph are skipped.
    pub fn add_class_files<'c>(
        &self,
        class_files: impl IntoIterator<Item = &'c ClassFile>,
        origin: ClassOrigin,
    ) -> Result<Vec<ClassId<'g>>, Error> {
        let mut pending: HashMap<BinaryName, &'c ClassFile> = HashMap::new();
        let mut order: Vec<BinaryName> = vec![];
        for class_file in class_files {
            let name = class_file.name()?;
            if self.lookup_class(name.as_str()).is_some() || pending.contains_key(&name) {
                log::debug!("Skipping duplicate class {:?}", name);
                continue;
            }
            order.push(name.clone());
            pending.insert(name, class_file);
        }

        let mut added = vec![];
        for name in order {
            self.link_pending(&name, &mut pending, &mut added, origin)?;
        }
        Ok(added)
    }

    /// Add a pending class file, first adding any of its supertypes that are also pending
    ///
    /// Every class added (supertypes included) is pushed onto `added`, supertypes first.
    fn link_pending(
        &self,
        name: &BinaryName,
        pending: &mut HashMap<BinaryName, &ClassFile>,
        added: &mut Vec<ClassId<'g>>,
        origin: ClassOrigin,
    ) -> Result<Option<ClassId<'g>>, Error> {
        let class_file = match pending.remove(name) {
            Some(class_file) => class_file,
            None => return Ok(None),
        };

        let mut supertype = |name: &BinaryName| -> Result<Option<ClassId<'g>>, Error> {
            match self.link_pending(name, pending, added, origin)? {
                Some(class) => Ok(Some(class)),
                None => {
                    let found = self.lookup_class(name.as_str());
                    if found.is_none() {
                        log::trace!("Supertype {:?} is not in the class graph", name);
                    }
                    Ok(found)
                }
            }
        };

        let superclass = match class_file.super_name()? {
            Some(super_name) => supertype(&super_name)?,
            None => None,
        };
        let mut interfaces = vec![];
        for interface_name in class_file.interface_names()? {
            if let Some(interface) = supertype(&interface_name)? {
                interfaces.push(interface);
            }
        }

        let class = self.add_class(ClassData::new(
            name.clone(),
            superclass,
            class_file.access_flags,
            origin,
        ));
        for interface in interfaces {
            class.interfaces.push(interface.0);
        }
        self.add_class_file_methods(class, class_file)?;
        added.push(class);
        Ok(Some(class))
    }

    /// Register all of the methods declared in a class file
    pub fn add_class_file_methods(
        &self,
        class: ClassId<'g>,
        class_file: &ClassFile,
    ) -> Result<(), Error> {
        for method in &class_file.methods {
            let name = method.name(&class_file.constants)?;
            let descriptor = method.descriptor(&class_file.constants)?;
            let name = match UnqualifiedName::from_string(name.to_owned()) {
                Ok(name) => name,
                Err(msg) => {
                    log::warn!("Skipping method in {:?}: {}", class.name, msg);
                    continue;
                }
            };
            let descriptor = match MethodDescriptor::parse(descriptor) {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    log::warn!(
                        "Skipping method {:?}.{:?} with malformed descriptor: {}",
                        class.name,
                        name,
                        err
                    );
                    continue;
                }
            };
            self.add_method(MethodData {
                class,
                name,
                descriptor,
                access_flags: method.access_flags,
            });
        }
        Ok(())
    }

    /// Resolve a method the way the JVM does for a symbolic method reference
    ///
    /// The search looks at the class itself, then its superclass chain, then all of the
    /// superinterfaces (breadth first).
    pub fn resolve_method(
        &self,
        class: ClassId<'g>,
        name: &str,
        descriptor: &str,
    ) -> Option<MethodId<'g>> {
        let mut next_class = Some(class);
        while let Some(class) = next_class {
            if let Some(method) = class.find_method(name, descriptor) {
                return Some(method);
            }
            next_class = class.superclass;
        }

        let mut visited: HashSet<ClassId<'g>> = HashSet::new();
        let mut to_visit: VecDeque<ClassId<'g>> = VecDeque::new();
        let mut next_class = Some(class);
        while let Some(class) = next_class {
            to_visit.extend(class.0.interfaces.iter().map(RefId));
            next_class = class.superclass;
        }
        while let Some(interface) = to_visit.pop_front() {
            if !visited.insert(interface) {
                continue;
            }
            if let Some(method) = interface.find_method(name, descriptor) {
                return Some(method);
            }
            to_visit.extend(interface.0.interfaces.iter().map(RefId));
        }

        None
    }

    /// Add standard types to the class graph
    pub fn insert_java_library_types(&self) -> JavaLibrary<'g> {
        JavaLibrary::add_to_graph(self)
    }
}

/// Whether a class is being converted or is only referenced
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ClassOrigin {
    Program,
    Library,
}

pub struct ClassData<'g> {
    /// Name of the class
    pub name: BinaryName,

    /// Superclass is missing for `java/lang/Object` itself and for unknown superclasses
    pub superclass: Option<ClassId<'g>>,

    /// Interfaces implemented (or super-interfaces)
    pub interfaces: FrozenVec<&'g ClassData<'g>>,

    /// Class access flags
    pub access_flags: ClassAccessFlags,

    pub origin: ClassOrigin,

    /// Methods
    pub methods: RefCell<Vec<MethodId<'g>>>,
}

impl<'g> ClassData<'g> {
    pub fn new(
        name: BinaryName,
        superclass: Option<ClassId<'g>>,
        access_flags: ClassAccessFlags,
        origin: ClassOrigin,
    ) -> ClassData<'g> {
        ClassData {
            name,
            superclass,
            interfaces: FrozenVec::new(),
            access_flags,
            origin,
            methods: RefCell::new(vec![]),
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.is_interface()
    }

    /// Find a method declared directly on this class
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<MethodId<'g>> {
        self.methods
            .borrow()
            .iter()
            .find(|method| method.name.as_str() == name && method.descriptor.render() == descriptor)
            .copied()
    }
}

impl<'g> PartialEq for ClassData<'g> {
    fn eq(&self, other: &ClassData<'g>) -> bool {
        self.name == other.name
    }
}

impl<'g> Eq for ClassData<'g> {}

impl<'g> Debug for ClassData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())
    }
}

pub struct MethodData<'g> {
    /// Class
    pub class: ClassId<'g>,

    /// Name of the method
    pub name: UnqualifiedName,

    /// Type of the method
    pub descriptor: MethodDescriptor<BinaryName>,

    /// Method access flags
    pub access_flags: MethodAccessFlags,
}

impl<'g> MethodData<'g> {
    pub fn is_static(&self) -> bool {
        self.access_flags.is_static()
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.is_abstract()
    }

    pub fn is_private(&self) -> bool {
        self.access_flags.is_private()
    }
}

impl<'g> Debug for MethodData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}.{}:{}",
            self.class.name.as_str(),
            self.name.as_str(),
            self.descriptor.render(),
        ))
    }
}
