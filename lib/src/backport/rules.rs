use super::pattern::{MatchResult, Matcher, Template};
use super::Error;
use crate::jvm::class_file::{MemberRef, MemberRefKind};
use crate::jvm::class_graph::{Assignable, ClassGraph, ClassId, MethodId};
use std::fmt;

/// Rule describing how to rewrite a reference
///
/// Converters are built from an ordered list of these. Each reference is checked against the rules
/// in order and the first one that matches is used.
#[derive(Clone, Debug)]
pub enum Replacement {
    Type(TypeReplacement),
    Method(MethodReplacement),
}

impl Replacement {
    /// Replace a type (class or interface) wherever it is mentioned
    pub fn replace_type(pattern: &str, replacement: &str) -> Result<Replacement, Error> {
        TypeReplacement::new(pattern, replacement).map(Replacement::Type)
    }

    /// Redirect calls to a method
    pub fn replace_method(
        class: &str,
        name: &str,
        descriptor: &str,
        replacement_class: &str,
        replacement_name: &str,
        replacement_descriptor: &str,
    ) -> Result<Replacement, Error> {
        MethodReplacement::new(
            class,
            name,
            descriptor,
            replacement_class,
            replacement_name,
            replacement_descriptor,
        )
        .map(Replacement::Method)
    }
}

/// Rename a class
#[derive(Clone, Debug)]
pub struct TypeReplacement {
    pub pattern: String,
    pub replacement: String,
    matcher: Matcher,
    template: Template,
}

impl TypeReplacement {
    pub fn new(pattern: &str, replacement: &str) -> Result<TypeReplacement, Error> {
        let matcher = Matcher::new(pattern);
        let template = Template::new(replacement, matcher.capture_count())?;
        Ok(TypeReplacement {
            pattern: pattern.to_owned(),
            replacement: replacement.to_owned(),
            matcher,
            template,
        })
    }

    pub fn matches(&self, class_name: &str) -> MatchResult {
        self.matcher.matches(class_name)
    }

    /// Compute the replacement name, given the result of a successful `matches` on the name
    pub fn apply(&self, class_name: &str, matched: &MatchResult) -> String {
        self.template.apply(class_name, &matched.captures)
    }

    /// Rename a class, if this rule applies to it
    pub fn replace(&self, class_name: &str) -> Option<String> {
        let matched = self.matches(class_name);
        if matched.matched {
            Some(self.apply(class_name, &matched))
        } else {
            None
        }
    }

    /// A replacement built from the matched name is always usable, but a fixed replacement name
    /// must refer to a class that actually exists
    pub fn is_valid(&self, class_graph: &ClassGraph) -> bool {
        self.template.is_derived() || class_graph.lookup_class(&self.replacement).is_some()
    }
}

/// How the method name of a method replacement is matched
#[derive(Clone, Debug)]
enum NameMatcher {
    /// `<static>`: any static method
    Static,

    /// `<default>`: any default method (non-abstract, non-static interface method)
    Default,

    Pattern(Matcher),
}

impl NameMatcher {
    const STATIC: &'static str = "<static>";
    const DEFAULT: &'static str = "<default>";
}

/// Redirect a method to a different class, name, and descriptor
#[derive(Clone, Debug)]
pub struct MethodReplacement {
    pub class_pattern: String,
    pub name_pattern: String,
    pub descriptor_pattern: String,

    pub replacement_class: String,
    pub replacement_name: String,
    pub replacement_descriptor: String,

    class_matcher: Matcher,
    name_matcher: NameMatcher,
    descriptor_matcher: Matcher,

    class_template: Template,
    name_template: Template,
    descriptor_template: Template,
}

/// Rules print the way they are written: `class.name(descriptor) -> class.name(descriptor)`
impl fmt::Display for MethodReplacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}{} -> {}.{}{}",
            self.class_pattern,
            self.name_pattern,
            self.descriptor_pattern,
            self.replacement_class,
            self.replacement_name,
            self.replacement_descriptor
        )
    }
}

/// Successful match of a method replacement against a resolved method
#[derive(Clone, Debug)]
pub struct MethodMatch<'g> {
    /// Class named by the method reference
    pub class: ClassId<'g>,

    /// Method the reference resolved to (possibly declared on a supertype)
    pub method: MethodId<'g>,

    class_captures: Vec<String>,
    name_captures: Vec<String>,
    descriptor_captures: Vec<String>,
}

/// Where a method replacement sends a call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodTarget {
    pub class: String,
    pub name: String,

    /// `None` means "keep the original descriptor" (types inside it still get replaced)
    pub descriptor: Option<String>,
}

impl MethodReplacement {
    pub fn new(
        class: &str,
        name: &str,
        descriptor: &str,
        replacement_class: &str,
        replacement_name: &str,
        replacement_descriptor: &str,
    ) -> Result<MethodReplacement, Error> {
        let class_matcher = Matcher::new(class);
        let name_matcher = match name {
            NameMatcher::STATIC => NameMatcher::Static,
            NameMatcher::DEFAULT => NameMatcher::Default,
            _ => NameMatcher::Pattern(Matcher::new(name)),
        };
        let descriptor_matcher = Matcher::descriptor(descriptor);

        let name_captures = match &name_matcher {
            NameMatcher::Pattern(matcher) => matcher.capture_count(),
            _ => 1,
        };
        let class_template = Template::new(replacement_class, class_matcher.capture_count())?;
        let name_template = Template::new(replacement_name, name_captures)?;
        let descriptor_template =
            Template::new(replacement_descriptor, descriptor_matcher.capture_count())?;

        Ok(MethodReplacement {
            class_pattern: class.to_owned(),
            name_pattern: name.to_owned(),
            descriptor_pattern: descriptor.to_owned(),
            replacement_class: replacement_class.to_owned(),
            replacement_name: replacement_name.to_owned(),
            replacement_descriptor: replacement_descriptor.to_owned(),
            class_matcher,
            name_matcher,
            descriptor_matcher,
            class_template,
            name_template,
            descriptor_template,
        })
    }

    /// A fixed replacement class must exist
    pub fn is_valid(&self, class_graph: &ClassGraph) -> bool {
        self.class_template.is_derived()
            || class_graph.lookup_class(&self.replacement_class).is_some()
    }

    /// Check whether a method reference is matched by this rule
    ///
    /// References which don't resolve (to a class and then a method on it) never match. The
    /// referenced class matches if its name matches the class pattern or, when the pattern is a
    /// single concrete class, if it is a subtype of that class. Wildcard class patterns never
    /// consult the inheritance hierarchy.
    pub fn matches<'g>(
        &self,
        class_graph: &ClassGraph<'g>,
        reference: &MemberRef,
    ) -> Option<MethodMatch<'g>> {
        if reference.kind == MemberRefKind::Field {
            return None;
        }
        let class = class_graph.lookup_class(&reference.class)?;
        let method = class_graph.resolve_method(class, &reference.name, &reference.descriptor)?;

        // Class
        let class_match = self.class_matcher.matches(&reference.class);
        let class_captures = if class_match.matched {
            class_match.captures
        } else {
            match &self.class_matcher {
                Matcher::Fixed(super_name) => {
                    let super_class = class_graph.lookup_class(super_name)?;
                    if !class.is_assignable(&super_class) {
                        return None;
                    }
                    vec![reference.class.clone()]
                }
                _ => return None,
            }
        };

        // Name
        let name_captures = match &self.name_matcher {
            NameMatcher::Static if method.is_static() => vec![reference.name.clone()],
            NameMatcher::Default
                if method.class.is_interface() && !method.is_abstract() && !method.is_static() =>
            {
                vec![reference.name.clone()]
            }
            NameMatcher::Pattern(matcher) => {
                let name_match = matcher.matches(&reference.name);
                if !name_match.matched {
                    return None;
                }
                name_match.captures
            }
            _ => return None,
        };

        // Descriptor
        let descriptor_match = self.descriptor_matcher.matches(&reference.descriptor);
        if !descriptor_match.matched {
            return None;
        }

        Some(MethodMatch {
            class,
            method,
            class_captures,
            name_captures,
            descriptor_captures: descriptor_match.captures,
        })
    }

    /// Compute the replacement target of a successful match
    pub fn apply(&self, reference: &MemberRef, matched: &MethodMatch) -> MethodTarget {
        let descriptor = if self.descriptor_template == Template::Keep {
            None
        } else {
            Some(
                self.descriptor_template
                    .apply(&reference.descriptor, &matched.descriptor_captures),
            )
        };
        MethodTarget {
            class: self
                .class_template
                .apply(&reference.class, &matched.class_captures),
            name: self
                .name_template
                .apply(&reference.name, &matched.name_captures),
            descriptor,
        }
    }
}
