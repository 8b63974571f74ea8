use super::Error;
use crate::jvm::class_file::ClassFile;
use crate::jvm::BinaryName;
use std::collections::BTreeMap;

/// Classes being converted, keyed by name
///
/// Iteration is in name order, so passes over the program are deterministic.
#[derive(Debug, Default)]
pub struct Program {
    classes: BTreeMap<BinaryName, ClassFile>,
}

impl Program {
    pub fn new() -> Program {
        Program::default()
    }

    /// Build a program from class files, rejecting duplicate names
    pub fn from_class_files(
        class_files: impl IntoIterator<Item = ClassFile>,
    ) -> Result<Program, Error> {
        let mut program = Program::new();
        for class_file in class_files {
            program.insert(class_file)?;
        }
        Ok(program)
    }

    /// Add a class to the program
    pub fn insert(&mut self, class_file: ClassFile) -> Result<(), Error> {
        let name = class_file.name()?;
        if self.classes.contains_key(&name) {
            return Err(Error::DuplicateClass(name));
        }
        self.classes.insert(name, class_file);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ClassFile> {
        self.classes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ClassFile> {
        self.classes.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn names(&self) -> Vec<BinaryName> {
        self.classes.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BinaryName, &ClassFile)> {
        self.classes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&BinaryName, &mut ClassFile)> {
        self.classes.iter_mut()
    }

    pub fn class_files(&self) -> impl Iterator<Item = &ClassFile> {
        self.classes.values()
    }
}
