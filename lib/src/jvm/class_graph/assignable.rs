use crate::jvm::class_graph::ClassId;
use crate::util::RefId;
use std::collections::HashSet;

/// Subtyping relationship between types
pub trait Assignable {
    /// Is the first type assignable to the second?
    fn is_assignable(&self, super_type: &Self) -> bool;
}

/// Supertypes which were never linked into the graph are invisible here, so a class whose
/// superclass is unknown is only assignable to the types that are reachable.
impl<'g> Assignable for ClassId<'g> {
    fn is_assignable(&self, super_type: &ClassId<'g>) -> bool {
        // Classes can only be reached through the superclass chain
        if !super_type.is_interface() {
            let mut class = Some(*self);
            while let Some(current) = class {
                if current == *super_type {
                    return true;
                }
                class = current.superclass;
            }
            return false;
        }

        let mut seen: HashSet<ClassId<'g>> = HashSet::new();
        let mut pending: Vec<ClassId<'g>> = vec![*self];
        while let Some(class) = pending.pop() {
            if class == *super_type {
                return true;
            }
            if !seen.insert(class) {
                continue;
            }
            pending.extend(class.superclass);
            pending.extend(class.0.interfaces.iter().map(RefId));
        }
        false
    }
}

#[cfg(test)]
mod test {
    use crate::jvm::class_graph::{Assignable, ClassGraph, ClassGraphArenas};

    #[test]
    fn java_library_subtyping() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let java = class_graph.insert_java_library_types();

        let assignable = [
            (&java.object, &java.object),
            (&java.string, &java.object),
            (&java.integer, &java.number),
            (&java.integer, &java.object),
            (&java.string, &java.char_sequence),
            (&java.integer, &java.comparable),
            // through `java/lang/Number`
            (&java.integer, &java.serializable),
        ];
        for (sub, sup) in assignable {
            assert!(sub.is_assignable(sup), "{:?} <: {:?}", sub.name, sup.name);
        }

        let not_assignable = [
            (&java.object, &java.string),
            (&java.number, &java.integer),
            (&java.char_sequence, &java.string),
            (&java.object, &java.char_sequence),
        ];
        for (sub, sup) in not_assignable {
            assert!(!sub.is_assignable(sup), "{:?} </: {:?}", sub.name, sup.name);
        }
    }
}
