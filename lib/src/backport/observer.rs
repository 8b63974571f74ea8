use crate::jvm::BinaryName;

/// Callbacks for changes made by the conversion passes
///
/// Every method has an empty default, so implementations only override what they care about.
pub trait ConversionObserver {
    /// An existing class was changed (called at most once per class per pass)
    fn modified_class(&mut self, _class: &BinaryName) {}

    /// A new class was generated and added to the program
    fn extra_class(&mut self, _class: &BinaryName) {}

    /// A new member was added to a class
    fn extra_member(&mut self, _class: &BinaryName, _name: &str, _descriptor: &str) {}

    /// Instructions inside a method body were replaced
    fn replaced_instructions(&mut self, _class: &BinaryName, _method: &str, _count: usize) {}
}

/// Observer that ignores everything
pub struct IgnoreChanges;

impl ConversionObserver for IgnoreChanges {}

/// Observer that records every notification, in order
#[derive(Debug, Default)]
pub struct ChangeLog {
    /// Each class only appears once, even when several passes modify it
    pub modified_classes: Vec<BinaryName>,
    pub extra_classes: Vec<BinaryName>,
    pub extra_members: Vec<(BinaryName, String, String)>,
    pub replaced_instructions: Vec<(BinaryName, String, usize)>,
}

impl ChangeLog {
    pub fn new() -> ChangeLog {
        ChangeLog::default()
    }

    /// Was there any change at all?
    pub fn is_empty(&self) -> bool {
        self.modified_classes.is_empty()
            && self.extra_classes.is_empty()
            && self.extra_members.is_empty()
            && self.replaced_instructions.is_empty()
    }

    /// Total number of instruction sequences that were replaced
    pub fn replaced_instruction_count(&self) -> usize {
        self.replaced_instructions
            .iter()
            .map(|(_, _, count)| count)
            .sum()
    }
}

impl ConversionObserver for ChangeLog {
    fn modified_class(&mut self, class: &BinaryName) {
        if !self.modified_classes.contains(class) {
            self.modified_classes.push(class.clone());
        }
    }

    fn extra_class(&mut self, class: &BinaryName) {
        self.extra_classes.push(class.clone());
    }

    fn extra_member(&mut self, class: &BinaryName, name: &str, descriptor: &str) {
        self.extra_members
            .push((class.clone(), name.to_owned(), descriptor.to_owned()));
    }

    fn replaced_instructions(&mut self, class: &BinaryName, method: &str, count: usize) {
        self.replaced_instructions
            .push((class.clone(), method.to_owned(), count));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::Name;

    fn name(name: &str) -> BinaryName {
        BinaryName::from_string(name.to_owned()).unwrap()
    }

    #[test]
    fn classes_modified_by_several_passes() {
        let mut log = ChangeLog::new();
        assert!(log.is_empty());

        // Relocating static interface methods, then converting APIs
        log.modified_class(&name("a/I"));
        log.extra_class(&name("a/I$$Util"));
        log.modified_class(&name("a/Caller"));
        log.modified_class(&name("a/I"));
        log.replaced_instructions(&name("a/Caller"), "run", 2);
        log.replaced_instructions(&name("a/Caller"), "stop", 1);

        assert_eq!(log.modified_classes, vec![name("a/I"), name("a/Caller")]);
        assert_eq!(log.extra_classes, vec![name("a/I$$Util")]);
        assert_eq!(log.replaced_instruction_count(), 3);
        assert!(!log.is_empty());
    }
}
