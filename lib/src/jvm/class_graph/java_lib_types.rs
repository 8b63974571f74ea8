use super::{ClassData, ClassGraph, ClassId, ClassOrigin, MethodData};
use crate::jvm::{
    BinaryName, ClassAccessFlags, MethodAccessFlags, MethodDescriptor, ParseDescriptor,
    UnqualifiedName,
};

/// The handful of standard library types that the passes themselves need to know about
///
/// Everything else is expected to come from library class files.
pub struct JavaLibrary<'g> {
    pub object: ClassId<'g>,
    pub serializable: ClassId<'g>,
    pub cloneable: ClassId<'g>,
    pub comparable: ClassId<'g>,
    pub char_sequence: ClassId<'g>,
    pub string: ClassId<'g>,
    pub number: ClassId<'g>,
    pub integer: ClassId<'g>,
    pub class: ClassId<'g>,
    pub method_type: ClassId<'g>,
    pub method_handle: ClassId<'g>,
    pub method_handles_lookup: ClassId<'g>,
    pub call_site: ClassId<'g>,
    pub lambda_metafactory: ClassId<'g>,
}

const PUBLIC_CLASS: ClassAccessFlags = ClassAccessFlags::PUBLIC.union(ClassAccessFlags::SUPER);
const PUBLIC_FINAL_CLASS: ClassAccessFlags = PUBLIC_CLASS.union(ClassAccessFlags::FINAL);
const PUBLIC_ABSTRACT_CLASS: ClassAccessFlags = PUBLIC_CLASS.union(ClassAccessFlags::ABSTRACT);
const PUBLIC_INTERFACE: ClassAccessFlags = ClassAccessFlags::PUBLIC
    .union(ClassAccessFlags::INTERFACE)
    .union(ClassAccessFlags::ABSTRACT);

const PUBLIC: MethodAccessFlags = MethodAccessFlags::PUBLIC;
const PUBLIC_STATIC: MethodAccessFlags = PUBLIC.union(MethodAccessFlags::STATIC);
const PUBLIC_ABSTRACT: MethodAccessFlags = PUBLIC.union(MethodAccessFlags::ABSTRACT);
const PUBLIC_STATIC_VARARGS: MethodAccessFlags = PUBLIC_STATIC.union(MethodAccessFlags::VARARGS);

impl<'g> JavaLibrary<'g> {
    pub fn add_to_graph(class_graph: &ClassGraph<'g>) -> JavaLibrary<'g> {
        let class = |name: BinaryName,
                     superclass: Option<ClassId<'g>>,
                     interfaces: &[ClassId<'g>],
                     access_flags: ClassAccessFlags| {
            let class = class_graph.add_class(ClassData::new(
                name,
                superclass,
                access_flags,
                ClassOrigin::Library,
            ));
            for interface in interfaces {
                class.interfaces.push(interface.0);
            }
            class
        };
        let method = |class: ClassId<'g>,
                      name: UnqualifiedName,
                      descriptor: &'static str,
                      access_flags: MethodAccessFlags| {
            // These descriptors are all well-formed
            if let Ok(descriptor) = MethodDescriptor::parse(descriptor) {
                class_graph.add_method(MethodData {
                    class,
                    name,
                    descriptor,
                    access_flags,
                });
            }
        };
        let name = UnqualifiedName::name;

        let object = class(BinaryName::OBJECT, None, &[], PUBLIC_CLASS);
        method(object, UnqualifiedName::INIT, "()V", PUBLIC);
        method(object, name("equals"), "(Ljava/lang/Object;)Z", PUBLIC);
        method(object, name("hashCode"), "()I", PUBLIC);
        method(object, name("toString"), "()Ljava/lang/String;", PUBLIC);

        let serializable = class(BinaryName::SERIALIZABLE, Some(object), &[], PUBLIC_INTERFACE);
        let cloneable = class(BinaryName::CLONEABLE, Some(object), &[], PUBLIC_INTERFACE);

        let comparable = class(BinaryName::COMPARABLE, Some(object), &[], PUBLIC_INTERFACE);
        method(
            comparable,
            name("compareTo"),
            "(Ljava/lang/Object;)I",
            PUBLIC_ABSTRACT,
        );

        let char_sequence = class(BinaryName::CHARSEQUENCE, Some(object), &[], PUBLIC_INTERFACE);
        method(char_sequence, name("length"), "()I", PUBLIC_ABSTRACT);
        method(char_sequence, name("charAt"), "(I)C", PUBLIC_ABSTRACT);

        let string = class(
            BinaryName::STRING,
            Some(object),
            &[serializable, comparable, char_sequence],
            PUBLIC_FINAL_CLASS,
        );
        method(string, name("length"), "()I", PUBLIC);
        method(string, name("charAt"), "(I)C", PUBLIC);
        method(string, name("valueOf"), "(I)Ljava/lang/String;", PUBLIC_STATIC);
        method(
            string,
            name("valueOf"),
            "(Ljava/lang/Object;)Ljava/lang/String;",
            PUBLIC_STATIC,
        );

        let number = class(
            BinaryName::NUMBER,
            Some(object),
            &[serializable],
            PUBLIC_ABSTRACT_CLASS,
        );
        method(number, name("intValue"), "()I", PUBLIC_ABSTRACT);

        let integer = class(
            BinaryName::INTEGER,
            Some(number),
            &[comparable],
            PUBLIC_FINAL_CLASS,
        );
        method(integer, name("intValue"), "()I", PUBLIC);
        method(integer, name("valueOf"), "(I)Ljava/lang/Integer;", PUBLIC_STATIC);
        method(integer, name("toString"), "(I)Ljava/lang/String;", PUBLIC_STATIC);

        let class_cls = class(BinaryName::CLASS, Some(object), &[serializable], PUBLIC_FINAL_CLASS);
        let method_type = class(
            BinaryName::METHODTYPE,
            Some(object),
            &[serializable],
            PUBLIC_FINAL_CLASS,
        );
        let method_handle = class(
            BinaryName::METHODHANDLE,
            Some(object),
            &[],
            PUBLIC_ABSTRACT_CLASS,
        );
        let method_handles_lookup = class(
            BinaryName::METHODHANDLE_LOOKUP,
            Some(object),
            &[],
            PUBLIC_FINAL_CLASS,
        );
        let call_site = class(BinaryName::CALLSITE, Some(object), &[], PUBLIC_ABSTRACT_CLASS);

        let lambda_metafactory = class(
            BinaryName::LAMBDAMETAFACTORY,
            Some(object),
            &[],
            PUBLIC_FINAL_CLASS,
        );
        method(
            lambda_metafactory,
            UnqualifiedName::METAFACTORY,
            "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;",
            PUBLIC_STATIC,
        );
        method(
            lambda_metafactory,
            UnqualifiedName::ALTMETAFACTORY,
            "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;",
            PUBLIC_STATIC_VARARGS,
        );

        JavaLibrary {
            object,
            serializable,
            cloneable,
            comparable,
            char_sequence,
            string,
            number,
            integer,
            class: class_cls,
            method_type,
            method_handle,
            method_handles_lookup,
            call_site,
            lambda_metafactory,
        }
    }
}
