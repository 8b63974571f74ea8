use super::rules::{MethodReplacement, MethodTarget, Replacement, TypeReplacement};
use super::{ConversionObserver, Error, Program, Settings};
use crate::jvm::class_file::{
    Annotation, AnnotationDefault, Attribute, AttributeLike, ClassFile, Code, Constant, ConstantIndex,
    ConstantPool, EnclosingMethod, HandleKind, LocalVariableTable, LocalVariableTypeTable, MemberRef,
    NameAndTypeConstantIndex, RuntimeInvisibleAnnotations,
    RuntimeInvisibleParameterAnnotations, RuntimeVisibleAnnotations,
    RuntimeVisibleParameterAnnotations, Signature, Utf8ConstantIndex,
};
use crate::jvm::class_graph::ClassGraph;
use crate::jvm::code::{decode_instructions, overwrite_padded, parse_method_descriptor, InvokeKind};
use crate::jvm::signatures::{
    rewrite_class_signature, rewrite_field_signature, rewrite_method_signature,
};
use crate::jvm::{
    BinaryName, FieldType, MethodDescriptor, Name, ParseDescriptor, RenderDescriptor,
};
use std::collections::{HashMap, HashSet};

/// Rewrites classes so that they use replacement types and methods
///
/// A converter is built from an ordered list of rules. Rules which could never be applied (a
/// fixed replacement class that doesn't exist) are dropped with a warning when the converter is
/// built. For every reference, the rules are tried in order and the first match wins, even if
/// applying it turns out to be impossible.
///
/// Within one class, the rewriting happens in this order:
///
///   1. method calls matched by method replacements are redirected (this needs the original
///      names and descriptors to resolve the call)
///   2. descriptors inside field/method references, `invokedynamic` call sites, and method types
///      have their types replaced
///   3. class constants are renamed (except for the class's own name)
///   4. field and method descriptors have their types replaced
///   5. attributes: generic signatures, local variable tables, enclosing methods, annotations
///
/// Constants added during step 1 are never revisited, so a call that was redirected doesn't also
/// get its descriptor rewritten.
pub struct ApiConverter<'a, 'g> {
    class_graph: &'a ClassGraph<'g>,
    settings: &'a Settings,
    types: Vec<TypeReplacement>,
    methods: Vec<MethodReplacement>,
}

/// Outcome of checking a method reference against the method replacements
#[derive(Clone, Debug)]
enum CallRedirect {
    /// No rule matched
    Unmatched,

    /// A rule matched, but its target does not exist
    Unresolved,

    Redirect(CallTarget),
}

impl CallRedirect {
    fn is_matched(&self) -> bool {
        !matches!(self, CallRedirect::Unmatched)
    }
}

/// Resolved destination of a redirected call
#[derive(Clone, Debug)]
struct CallTarget {
    /// Rule that produced this target (for diagnostics)
    rule: String,
    class: String,
    name: String,
    descriptor: String,
    parsed_descriptor: MethodDescriptor<BinaryName>,
    is_static: bool,
    is_interface: bool,
}

impl CallTarget {
    /// Pick the invocation instruction for the new target
    fn invoke_kind(&self, original: InvokeKind) -> InvokeKind {
        if self.is_static {
            InvokeKind::Static
        } else if self.is_interface {
            InvokeKind::Interface
        } else if original == InvokeKind::Special {
            InvokeKind::Special
        } else {
            InvokeKind::Virtual
        }
    }

    /// Pick the method handle kind for the new target
    fn handle_kind(&self, original: HandleKind) -> HandleKind {
        if self.is_static {
            HandleKind::InvokeStatic
        } else if original == HandleKind::NewInvokeSpecial {
            HandleKind::NewInvokeSpecial
        } else if self.is_interface {
            HandleKind::InvokeInterface
        } else if original == HandleKind::InvokeSpecial {
            HandleKind::InvokeSpecial
        } else {
            HandleKind::InvokeVirtual
        }
    }
}

/// Which kind of `Signature` attribute is being rewritten
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum SignatureContext {
    Class,
    Field,
    Method,
}

impl<'a, 'g> ApiConverter<'a, 'g> {
    pub fn new(
        class_graph: &'a ClassGraph<'g>,
        settings: &'a Settings,
        rules: impl IntoIterator<Item = Replacement>,
    ) -> ApiConverter<'a, 'g> {
        let mut types = vec![];
        let mut methods = vec![];
        for rule in rules {
            match rule {
                Replacement::Type(rule) if rule.is_valid(class_graph) => types.push(rule),
                Replacement::Type(rule) => log::warn!(
                    "Ignoring type replacement {} -> {}: replacement class does not exist",
                    rule.pattern,
                    rule.replacement
                ),
                Replacement::Method(rule) if rule.is_valid(class_graph) => methods.push(rule),
                Replacement::Method(rule) => log::warn!(
                    "Ignoring method replacement {}: replacement class does not exist",
                    rule
                ),
            }
        }
        ApiConverter {
            class_graph,
            settings,
            types,
            methods,
        }
    }

    /// Type replacements that were accepted, in order
    pub fn type_rules(&self) -> &[TypeReplacement] {
        &self.types
    }

    /// Method replacements that were accepted, in order
    pub fn method_rules(&self) -> &[MethodReplacement] {
        &self.methods
    }

    /// Convert every class in the program, returning how many were modified
    pub fn convert_program(
        &self,
        program: &mut Program,
        observer: &mut dyn ConversionObserver,
    ) -> Result<usize, Error> {
        let mut modified = 0;
        for (_, class) in program.iter_mut() {
            if self.convert_class(class, observer)? {
                modified += 1;
            }
        }
        log::info!("Rewrote {} of {} classes", modified, program.len());
        Ok(modified)
    }

    /// Convert one class, returning whether it was modified
    pub fn convert_class(
        &self,
        class: &mut ClassFile,
        observer: &mut dyn ConversionObserver,
    ) -> Result<bool, Error> {
        let class_name = class.name()?;
        let boundary = class.constants.next_index();

        // Method references matched by a method replacement, keyed by their constant
        let mut redirects: HashMap<ConstantIndex, CallRedirect> = HashMap::new();

        let mut modified = false;
        if !self.methods.is_empty() {
            modified |= self.replace_calls(&class_name, class, &mut redirects, observer)?;
            modified |= self.redirect_method_handles(class, boundary, &mut redirects)?;
        }
        if !self.types.is_empty() {
            let redirected: HashSet<ConstantIndex> = redirects
                .iter()
                .filter(|(_, redirect)| redirect.is_matched())
                .map(|(index, _)| *index)
                .collect();
            modified |= self.rewrite_constants(class, boundary, &redirected)?;
            modified |= self.rewrite_member_descriptors(class)?;
            modified |= self.rewrite_attributes(class)?;
        }

        if modified {
            log::debug!("Rewrote {:?}", class_name);
            observer.modified_class(&class_name);
        }
        Ok(modified)
    }

    /// New name for a class, if the first type replacement matching it changes it
    pub fn replace_type(&self, class_name: &str) -> Option<String> {
        for rule in &self.types {
            if let Some(replaced) = rule.replace(class_name) {
                return Some(replaced).filter(|replaced| replaced != class_name);
            }
        }
        None
    }

    /// Replace the types inside a field or method descriptor, if any need replacing
    ///
    /// Malformed descriptors are left alone.
    pub fn replace_descriptor(&self, descriptor: &str) -> Option<String> {
        // Class literals in annotations use return descriptors
        if descriptor == "V" {
            return None;
        }

        let rendered = if descriptor.starts_with('(') {
            match MethodDescriptor::<BinaryName>::parse(descriptor) {
                Ok(parsed) => parsed.map(|class| self.rename(class)).render(),
                Err(err) => {
                    log::warn!("Leaving malformed descriptor {:?}: {}", descriptor, err);
                    return None;
                }
            }
        } else {
            match FieldType::<BinaryName>::parse(descriptor) {
                Ok(parsed) => parsed.map(|class| self.rename(class)).render(),
                Err(err) => {
                    log::warn!("Leaving malformed descriptor {:?}: {}", descriptor, err);
                    return None;
                }
            }
        };
        Some(rendered).filter(|rendered| rendered != descriptor)
    }

    fn rename(&self, class: &BinaryName) -> BinaryName {
        match self.replace_type(class.as_str()) {
            None => class.clone(),
            Some(renamed) => BinaryName::from_string(renamed).unwrap_or_else(|msg| {
                log::warn!("Not renaming {:?}: {}", class, msg);
                class.clone()
            }),
        }
    }

    /// Redirect method calls matched by method replacements
    fn replace_calls(
        &self,
        class_name: &BinaryName,
        class: &mut ClassFile,
        redirects: &mut HashMap<ConstantIndex, CallRedirect>,
        observer: &mut dyn ConversionObserver,
    ) -> Result<bool, Error> {
        let ClassFile {
            constants, methods, ..
        } = class;

        // Matching is keyed on the constant, so each distinct call is only matched once
        let mut modified = false;

        for method in methods.iter_mut() {
            let code_position = match method.code_position(constants)? {
                Some(position) => position,
                None => continue,
            };
            let mut code: Code = method.attributes[code_position].decode()?;

            let calls: Vec<(usize, usize, InvokeKind, ConstantIndex)> =
                decode_instructions(&code.code_array)?
                    .iter()
                    .filter_map(|instruction| {
                        let kind = instruction.invoke_kind()?;
                        let index = instruction.constant_index()?;
                        Some((instruction.offset, instruction.len(), kind, index))
                    })
                    .collect();

            let mut replaced = 0;
            for (offset, length, original_kind, index) in calls {
                if !redirects.contains_key(&index) {
                    let redirect = self.call_redirect(constants, index)?;
                    redirects.insert(index, redirect);
                }
                let target = match redirects.get(&index) {
                    Some(CallRedirect::Redirect(target)) => target,
                    _ => continue,
                };

                let kind = target.invoke_kind(original_kind);
                if kind.encoded_len() > length {
                    log::warn!(
                        "Rule {} cannot apply at offset {} in {:?}: {:?} does not fit in place of {:?}",
                        target.rule,
                        offset,
                        class_name,
                        kind,
                        original_kind
                    );
                    continue;
                }
                let method_ref = constants.get_method_ref(
                    &target.class,
                    &target.name,
                    &target.descriptor,
                    target.is_interface,
                )?;
                let bytes = kind.encode(method_ref.0, &target.parsed_descriptor);
                if overwrite_padded(&mut code.code_array, offset, length, &bytes) {
                    replaced += 1;
                }
            }

            if replaced > 0 {
                method.attributes[code_position].replace(&code)?;
                let method_name = method.name(constants)?;
                log::trace!(
                    "Redirected {} calls in {:?}.{}",
                    replaced,
                    class_name,
                    method_name
                );
                observer.replaced_instructions(class_name, method_name, replaced);
                modified = true;
            }
        }
        Ok(modified)
    }

    /// Point method handles matched by method replacements at their new targets
    ///
    /// This covers method references (eg. `CharSequence::length` passed to the lambda
    /// metafactory), which never show up as `invoke*` instructions.
    fn redirect_method_handles(
        &self,
        class: &mut ClassFile,
        boundary: ConstantIndex,
        redirects: &mut HashMap<ConstantIndex, CallRedirect>,
    ) -> Result<bool, Error> {
        let constants = &mut class.constants;
        let mut modified = false;

        for index in constants.indices() {
            if index >= boundary {
                break;
            }
            let (handle_kind, member) = match constants.get(index)? {
                Constant::MethodHandle {
                    handle_kind,
                    member,
                } => (*handle_kind, *member),
                _ => continue,
            };
            if matches!(
                handle_kind,
                HandleKind::GetField
                    | HandleKind::GetStatic
                    | HandleKind::PutField
                    | HandleKind::PutStatic
            ) {
                continue;
            }

            if !redirects.contains_key(&member) {
                let redirect = self.call_redirect(constants, member)?;
                redirects.insert(member, redirect);
            }
            let target = match redirects.get(&member) {
                Some(CallRedirect::Redirect(target)) => target,
                _ => continue,
            };

            let method_ref = constants.get_method_ref(
                &target.class,
                &target.name,
                &target.descriptor,
                target.is_interface,
            )?;
            let handle = Constant::MethodHandle {
                handle_kind: target.handle_kind(handle_kind),
                member: method_ref.0,
            };
            log::trace!("Redirecting method handle #{} with rule {}", index.0, target.rule);
            constants.set(index, handle)?;
            modified = true;
        }
        Ok(modified)
    }

    /// Find out where a method reference should be redirected, if anywhere
    fn call_redirect(
        &self,
        constants: &ConstantPool,
        index: ConstantIndex,
    ) -> Result<CallRedirect, Error> {
        let reference = constants.member_ref(index)?;
        for rule in &self.methods {
            if let Some(matched) = rule.matches(self.class_graph, &reference) {
                let target = rule.apply(&reference, &matched);
                return Ok(match self.resolve_target(rule, &reference, target) {
                    Some(target) => CallRedirect::Redirect(target),
                    None => CallRedirect::Unresolved,
                });
            }
        }
        Ok(CallRedirect::Unmatched)
    }

    fn resolve_target(
        &self,
        rule: &MethodReplacement,
        reference: &MemberRef,
        target: MethodTarget,
    ) -> Option<CallTarget> {
        let descriptor = match target.descriptor {
            Some(descriptor) => descriptor,
            None => self
                .replace_descriptor(&reference.descriptor)
                .unwrap_or_else(|| reference.descriptor.clone()),
        };
        let class = match self.class_graph.lookup_class(&target.class) {
            Some(class) => class,
            None => {
                log::warn!(
                    "Not redirecting {}.{}{}: replacement class {} does not exist",
                    reference.class,
                    reference.name,
                    reference.descriptor,
                    target.class
                );
                return None;
            }
        };
        let method = match self
            .class_graph
            .resolve_method(class, &target.name, &descriptor)
        {
            Some(method) => method,
            None => {
                log::warn!(
                    "Not redirecting {}.{}{}: replacement method {}.{}{} does not exist",
                    reference.class,
                    reference.name,
                    reference.descriptor,
                    target.class,
                    target.name,
                    descriptor
                );
                return None;
            }
        };
        let parsed_descriptor = match parse_method_descriptor(&descriptor) {
            Ok(parsed) => parsed,
            Err(err) => {
                log::warn!("Not redirecting to malformed descriptor: {:?}", err);
                return None;
            }
        };
        log::trace!(
            "Redirecting {}.{}{} to {}.{}{}",
            reference.class,
            reference.name,
            reference.descriptor,
            target.class,
            target.name,
            descriptor
        );
        Some(CallTarget {
            rule: rule.to_string(),
            class: target.class,
            name: target.name,
            descriptor,
            parsed_descriptor,
            is_static: method.is_static(),
            is_interface: class.is_interface(),
        })
    }

    /// Rewrite the constants that existed before any calls were redirected
    ///
    /// Method references already matched by a method replacement keep their descriptor.
    fn rewrite_constants(
        &self,
        class: &mut ClassFile,
        boundary: ConstantIndex,
        redirected: &HashSet<ConstantIndex>,
    ) -> Result<bool, Error> {
        let this_class: ConstantIndex = class.this_class.into();
        let constants = &mut class.constants;
        let mut modified = false;

        for index in constants.indices() {
            if index >= boundary {
                break;
            }
            let replacement = match constants.get(index)?.clone() {
                Constant::FieldRef(class, name_and_type) => self
                    .rewrite_name_and_type(constants, name_and_type)?
                    .map(|name_and_type| Constant::FieldRef(class, name_and_type)),
                Constant::MethodRef { .. } if redirected.contains(&index) => None,
                Constant::MethodRef {
                    class,
                    name_and_type,
                    is_interface,
                } => self
                    .rewrite_name_and_type(constants, name_and_type)?
                    .map(|name_and_type| Constant::MethodRef {
                        class,
                        name_and_type,
                        is_interface,
                    }),
                Constant::InvokeDynamic {
                    bootstrap_method,
                    method_descriptor,
                } => self
                    .rewrite_name_and_type(constants, method_descriptor)?
                    .map(|method_descriptor| Constant::InvokeDynamic {
                        bootstrap_method,
                        method_descriptor,
                    }),
                Constant::Dynamic {
                    bootstrap_method,
                    name_and_type,
                } => self
                    .rewrite_name_and_type(constants, name_and_type)?
                    .map(|name_and_type| Constant::Dynamic {
                        bootstrap_method,
                        name_and_type,
                    }),
                Constant::MethodType { mut descriptor } => {
                    if self.rewrite_descriptor_index(constants, &mut descriptor)? {
                        Some(Constant::MethodType { descriptor })
                    } else {
                        None
                    }
                }
                Constant::Class(name) if index != this_class => {
                    let class_name = constants.utf8(name)?;

                    // Array classes are named by their descriptor
                    let renamed = if class_name.starts_with('[') {
                        self.replace_descriptor(class_name)
                    } else {
                        self.replace_type(class_name)
                    };
                    match renamed {
                        Some(renamed) => {
                            log::trace!("Renaming class constant {} to {}", class_name, renamed);
                            Some(Constant::Class(constants.get_utf8(&renamed)?))
                        }
                        None => None,
                    }
                }
                _ => None,
            };
            if let Some(constant) = replacement {
                constants.set(index, constant)?;
                modified = true;
            }
        }
        Ok(modified)
    }

    fn rewrite_member_descriptors(&self, class: &mut ClassFile) -> Result<bool, Error> {
        let ClassFile {
            constants,
            fields,
            methods,
            ..
        } = class;
        let mut modified = false;
        for field in fields {
            modified |= self.rewrite_descriptor_index(constants, &mut field.descriptor_index)?;
        }
        for method in methods {
            modified |= self.rewrite_descriptor_index(constants, &mut method.descriptor_index)?;
        }
        Ok(modified)
    }

    fn rewrite_attributes(&self, class: &mut ClassFile) -> Result<bool, Error> {
        let ClassFile {
            constants,
            fields,
            methods,
            attributes,
            ..
        } = class;
        let mut modified = self.rewrite_attribute_list(constants, attributes, SignatureContext::Class)?;
        for field in fields {
            modified |=
                self.rewrite_attribute_list(constants, &mut field.attributes, SignatureContext::Field)?;
        }
        for method in methods {
            modified |= self.rewrite_attribute_list(
                constants,
                &mut method.attributes,
                SignatureContext::Method,
            )?;
        }
        Ok(modified)
    }

    fn rewrite_attribute_list(
        &self,
        constants: &mut ConstantPool,
        attributes: &mut [Attribute],
        context: SignatureContext,
    ) -> Result<bool, Error> {
        let mut modified = false;
        for attribute in attributes {
            let name = attribute.name(constants)?;
            let changed = if name == Signature::NAME {
                self.settings.rewrite_generic_signatures
                    && self.rewrite_signature_attribute(constants, attribute, context)?
            } else if name == Code::NAME {
                self.rewrite_code_attribute(constants, attribute)?
            } else if name == EnclosingMethod::NAME {
                let mut enclosing: EnclosingMethod = attribute.decode()?;
                let changed = enclosing.method.0 .0 != 0
                    && match self.rewrite_name_and_type(constants, enclosing.method)? {
                        Some(method) => {
                            enclosing.method = method;
                            true
                        }
                        None => false,
                    };
                if changed {
                    attribute.replace(&enclosing)?;
                }
                changed
            } else if !self.settings.rewrite_annotations {
                false
            } else if name == RuntimeVisibleAnnotations::NAME {
                let mut annotations: RuntimeVisibleAnnotations = attribute.decode()?;
                self.rewrite_annotations(constants, attribute, &mut annotations, |a| {
                    a.0.iter_mut().collect()
                })?
            } else if name == RuntimeInvisibleAnnotations::NAME {
                let mut annotations: RuntimeInvisibleAnnotations = attribute.decode()?;
                self.rewrite_annotations(constants, attribute, &mut annotations, |a| {
                    a.0.iter_mut().collect()
                })?
            } else if name == RuntimeVisibleParameterAnnotations::NAME {
                let mut annotations: RuntimeVisibleParameterAnnotations = attribute.decode()?;
                self.rewrite_annotations(constants, attribute, &mut annotations, |a| {
                    a.0.iter_mut().flatten().collect()
                })?
            } else if name == RuntimeInvisibleParameterAnnotations::NAME {
                let mut annotations: RuntimeInvisibleParameterAnnotations = attribute.decode()?;
                self.rewrite_annotations(constants, attribute, &mut annotations, |a| {
                    a.0.iter_mut().flatten().collect()
                })?
            } else if name == AnnotationDefault::NAME {
                let mut default: AnnotationDefault = attribute.decode()?;
                let mut changed = false;
                default.0.visit_descriptors(&mut |index: &mut Utf8ConstantIndex| {
                    changed |= self.rewrite_descriptor_index(constants, index)?;
                    Ok(())
                })?;
                if changed {
                    attribute.replace(&default)?;
                }
                changed
            } else {
                false
            };
            modified |= changed;
        }
        Ok(modified)
    }

    /// Rewrite every annotation inside a decoded annotations attribute, writing it back if needed
    fn rewrite_annotations<A: AttributeLike>(
        &self,
        constants: &mut ConstantPool,
        attribute: &mut Attribute,
        decoded: &mut A,
        annotations: impl FnOnce(&mut A) -> Vec<&mut Annotation>,
    ) -> Result<bool, Error> {
        let mut changed = false;
        for annotation in annotations(decoded) {
            annotation.visit_descriptors(&mut |index: &mut Utf8ConstantIndex| {
                changed |= self.rewrite_descriptor_index(constants, index)?;
                Ok(())
            })?;
        }
        if changed {
            attribute.replace(decoded)?;
        }
        Ok(changed)
    }

    fn rewrite_signature_attribute(
        &self,
        constants: &mut ConstantPool,
        attribute: &mut Attribute,
        context: SignatureContext,
    ) -> Result<bool, Error> {
        let mut signature: Signature = attribute.decode()?;
        if self.rewrite_signature_index(constants, &mut signature.signature, context)? {
            attribute.replace(&signature)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Local variable tables inside method bodies
    fn rewrite_code_attribute(
        &self,
        constants: &mut ConstantPool,
        attribute: &mut Attribute,
    ) -> Result<bool, Error> {
        let mut code: Code = attribute.decode()?;
        let mut changed = false;
        for nested in &mut code.attributes {
            let name = nested.name(constants)?;
            if name == LocalVariableTable::NAME {
                let mut table: LocalVariableTable = nested.decode()?;
                let mut table_changed = false;
                for variable in &mut table.0 {
                    table_changed |= self.rewrite_descriptor_index(constants, &mut variable.descriptor)?;
                }
                if table_changed {
                    nested.replace(&table)?;
                    changed = true;
                }
            } else if name == LocalVariableTypeTable::NAME && self.settings.rewrite_generic_signatures {
                let mut table: LocalVariableTypeTable = nested.decode()?;
                let mut table_changed = false;
                for variable in &mut table.0 {
                    table_changed |= self.rewrite_signature_index(
                        constants,
                        &mut variable.descriptor,
                        SignatureContext::Field,
                    )?;
                }
                if table_changed {
                    nested.replace(&table)?;
                    changed = true;
                }
            }
        }
        if changed {
            attribute.replace(&code)?;
        }
        Ok(changed)
    }

    /// Point a name and type at a rewritten descriptor (if the descriptor changes)
    fn rewrite_name_and_type(
        &self,
        constants: &mut ConstantPool,
        name_and_type: NameAndTypeConstantIndex,
    ) -> Result<Option<NameAndTypeConstantIndex>, Error> {
        let (name, descriptor) = constants.name_and_type_strs(name_and_type)?;
        match self.replace_descriptor(descriptor) {
            Some(descriptor) => {
                let name = name.to_owned();
                Ok(Some(constants.get_name_and_type(&name, &descriptor)?))
            }
            None => Ok(None),
        }
    }

    /// Point a descriptor index at a rewritten descriptor (if the descriptor changes)
    fn rewrite_descriptor_index(
        &self,
        constants: &mut ConstantPool,
        index: &mut Utf8ConstantIndex,
    ) -> Result<bool, crate::jvm::Error> {
        let descriptor = constants.utf8(*index)?;
        match self.replace_descriptor(descriptor) {
            Some(descriptor) => {
                *index = constants.get_utf8(&descriptor)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Point a signature index at a rewritten signature (if the signature changes)
    fn rewrite_signature_index(
        &self,
        constants: &mut ConstantPool,
        index: &mut Utf8ConstantIndex,
        context: SignatureContext,
    ) -> Result<bool, Error> {
        let signature = constants.utf8(*index)?;
        let map_class = |class: &str| self.replace_type(class);
        let rewritten = match context {
            SignatureContext::Class => rewrite_class_signature(signature, map_class),
            SignatureContext::Field => rewrite_field_signature(signature, map_class),
            SignatureContext::Method => rewrite_method_signature(signature, map_class),
        };
        match rewritten {
            Ok(Some(rewritten)) => {
                *index = constants.get_utf8(&rewritten)?;
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(err) => {
                log::warn!("Leaving malformed signature {:?}: {:?}", signature, err);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backport::ChangeLog;
    use crate::jvm::class_file::{
        find_attribute, ClassBuilder, ElementValue, ElementValuePair, MemberRefKind, Version,
    };
    use crate::jvm::class_graph::{ClassData, ClassGraphArenas, ClassOrigin, MethodData};
    use crate::jvm::code::opcodes;
    use crate::jvm::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags, UnqualifiedName};

    fn name(name: &str) -> BinaryName {
        BinaryName::from_string(name.to_owned()).unwrap()
    }

    fn builder(class: &str) -> ClassBuilder {
        ClassBuilder::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            &name(class),
            Some(&BinaryName::OBJECT),
            &[],
        )
        .unwrap()
    }

    fn code(code_array: Vec<u8>) -> Code {
        Code {
            max_stack: 2,
            max_locals: 2,
            code_array,
            exception_table: vec![],
            attributes: vec![],
        }
    }

    fn method_code(class: &ClassFile, method: &str, descriptor: &str) -> Code {
        let idx = class.find_method(method, descriptor).unwrap().unwrap();
        class.methods[idx].code(&class.constants).unwrap().unwrap()
    }

    fn invoked(class: &ClassFile, code: &Code, offset: usize) -> MemberRef {
        let instructions = decode_instructions(&code.code_array).unwrap();
        let instruction = instructions
            .iter()
            .find(|instruction| instruction.offset == offset)
            .unwrap();
        class
            .constants
            .member_ref(instruction.constant_index().unwrap())
            .unwrap()
    }

    fn add_library_class<'g>(
        graph: &ClassGraph<'g>,
        class: &str,
        access_flags: ClassAccessFlags,
        methods: &[(&str, &str, MethodAccessFlags)],
    ) {
        let object = graph.lookup_class("java/lang/Object");
        let class = graph.add_class(ClassData::new(
            name(class),
            object,
            access_flags,
            ClassOrigin::Library,
        ));
        for (method, descriptor, access_flags) in methods {
            graph.add_method(MethodData {
                class,
                name: UnqualifiedName::from_string(method.to_string()).unwrap(),
                descriptor: MethodDescriptor::parse(descriptor).unwrap(),
                access_flags: *access_flags,
            });
        }
    }

    fn time_graph(graph: &ClassGraph) {
        graph.insert_java_library_types();
        let static_method = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC;
        add_library_class(
            graph,
            "java/time/Instant",
            ClassAccessFlags::PUBLIC,
            &[("now", "()Ljava/time/Instant;", static_method)],
        );
        add_library_class(
            graph,
            "org/threeten/bp/Instant",
            ClassAccessFlags::PUBLIC,
            &[("now", "()Lorg/threeten/bp/Instant;", static_method)],
        );
    }

    #[test]
    fn unmatched_class_is_untouched() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        time_graph(&graph);
        let settings = Settings::new();

        let mut class = builder("a/Clock");
        let now = class
            .constants
            .get_method_ref("java/lang/String", "valueOf", "(I)Ljava/lang/String;", false)
            .unwrap();
        let [hi, lo] = now.0 .0.to_be_bytes();
        class
            .add_field(FieldAccessFlags::PRIVATE, "name", "Ljava/lang/String;", None)
            .unwrap();
        class
            .add_method(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                "describe",
                "(I)Ljava/lang/String;",
                Some(&code(vec![0x1a, opcodes::INVOKESTATIC, hi, lo, 0xb0])),
            )
            .unwrap();
        let mut class = class.result();
        let before = class.to_bytes().unwrap();

        let converter = ApiConverter::new(
            &graph,
            &settings,
            vec![
                Replacement::replace_type("java/time/*", "org/threeten/bp/*").unwrap(),
                Replacement::replace_method(
                    "java/time/*",
                    "now",
                    "()Ljava/time/Instant;",
                    "org/threeten/bp/*",
                    "now",
                    "()Lorg/threeten/bp/Instant;",
                )
                .unwrap(),
            ],
        );
        let mut log = ChangeLog::new();
        assert!(!converter.convert_class(&mut class, &mut log).unwrap());
        assert!(log.is_empty());
        assert_eq!(class.to_bytes().unwrap(), before);
    }

    #[test]
    fn redirecting_time_calls() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        time_graph(&graph);
        let settings = Settings::new();

        let mut class = builder("a/Clock");
        let now = class
            .constants
            .get_method_ref("java/time/Instant", "now", "()Ljava/time/Instant;", false)
            .unwrap();
        let [hi, lo] = now.0 .0.to_be_bytes();
        class
            .add_method(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                "stamp",
                "()Ljava/time/Instant;",
                Some(&code(vec![opcodes::INVOKESTATIC, hi, lo, 0xb0])),
            )
            .unwrap();
        let mut class = class.result();

        let converter = ApiConverter::new(
            &graph,
            &settings,
            vec![
                Replacement::replace_method(
                    "java/time/*",
                    "now",
                    "()Ljava/time/Instant;",
                    "org/threeten/bp/*",
                    "now",
                    "()Lorg/threeten/bp/Instant;",
                )
                .unwrap(),
                Replacement::replace_type("java/time/*", "org/threeten/bp/*").unwrap(),
            ],
        );
        let mut log = ChangeLog::new();
        assert!(converter.convert_class(&mut class, &mut log).unwrap());
        assert_eq!(log.modified_classes, vec![name("a/Clock")]);
        assert_eq!(log.replaced_instruction_count(), 1);

        // The call was redirected and the method itself now returns the replacement type
        let body = method_code(&class, "stamp", "()Lorg/threeten/bp/Instant;");
        assert_eq!(body.code_array[0], opcodes::INVOKESTATIC);
        assert_eq!(
            invoked(&class, &body, 0),
            MemberRef {
                class: String::from("org/threeten/bp/Instant"),
                name: String::from("now"),
                descriptor: String::from("()Lorg/threeten/bp/Instant;"),
                kind: MemberRefKind::Method,
            }
        );

        // The redirected reference is left alone by the type rule
        assert_eq!(
            class.constants.member_ref(now).unwrap().descriptor,
            "()Ljava/time/Instant;"
        );

        // The re-parsed class is identical
        let bytes = class.to_bytes().unwrap();
        assert_eq!(ClassFile::from_bytes(&bytes).unwrap().to_bytes().unwrap(), bytes);
    }

    #[test]
    fn renaming_types_everywhere() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        time_graph(&graph);
        let settings = Settings::new();

        let mut class = builder("java/time/Holder");
        let array_class = class.constants.get_class("[Ljava/time/Instant;").unwrap();
        let [hi, lo] = array_class.0 .0.to_be_bytes();
        let instant_field = class
            .constants
            .get_field_ref("a/Other", "when", "Ljava/time/Instant;")
            .unwrap();
        let [fhi, flo] = instant_field.0 .0.to_be_bytes();
        class
            .add_field(
                FieldAccessFlags::PRIVATE,
                "stamps",
                "Ljava/util/List;",
                Some("Ljava/util/List<Ljava/time/Instant;>;"),
            )
            .unwrap();
        class
            .add_method(
                MethodAccessFlags::PUBLIC,
                "cast",
                "(Ljava/lang/Object;)[Ljava/time/Instant;",
                Some(&code(vec![
                    0x2b,
                    opcodes::CHECKCAST, hi, lo,
                    opcodes::GETSTATIC, fhi, flo,
                    0x57,
                    0xb0,
                ])),
            )
            .unwrap();
        let annotation_type = class.constants.get_utf8("Ljava/time/Marker;").unwrap();
        let value_name = class.constants.get_utf8("value").unwrap();
        let class_value = class.constants.get_utf8("Ljava/time/Instant;").unwrap();
        class
            .add_attribute(&RuntimeVisibleAnnotations(vec![Annotation {
                type_index: annotation_type,
                element_value_pairs: vec![ElementValuePair {
                    name: value_name,
                    value: ElementValue::Class(class_value),
                }],
            }]))
            .unwrap();
        let mut class = class.result();

        let converter = ApiConverter::new(
            &graph,
            &settings,
            vec![Replacement::replace_type("java/time/*", "org/threeten/bp/*").unwrap()],
        );
        let mut log = ChangeLog::new();
        assert!(converter.convert_class(&mut class, &mut log).unwrap());

        // Own name is untouched
        assert_eq!(class.name().unwrap(), name("java/time/Holder"));

        // Array class constant, field reference, and method descriptor
        assert_eq!(
            class.constants.class_name(array_class).unwrap(),
            "[Lorg/threeten/bp/Instant;"
        );
        let field = class.constants.member_ref(instant_field).unwrap();
        assert_eq!(field.descriptor, "Lorg/threeten/bp/Instant;");
        assert_eq!(field.class, "a/Other");
        assert!(class
            .find_method("cast", "(Ljava/lang/Object;)[Lorg/threeten/bp/Instant;")
            .unwrap()
            .is_some());

        // Generic signature on the field
        let signature: Signature = find_attribute(&class.fields[0].attributes, &class.constants)
            .unwrap()
            .unwrap();
        assert_eq!(
            class.constants.utf8(signature.signature).unwrap(),
            "Ljava/util/List<Lorg/threeten/bp/Instant;>;"
        );

        // Annotation type and class-valued element
        let annotations: RuntimeVisibleAnnotations =
            find_attribute(&class.attributes, &class.constants)
                .unwrap()
                .unwrap();
        let annotation = &annotations.0[0];
        assert_eq!(
            class.constants.utf8(annotation.type_index).unwrap(),
            "Lorg/threeten/bp/Marker;"
        );
        match &annotation.element_value_pairs[0].value {
            ElementValue::Class(value) => assert_eq!(
                class.constants.utf8(*value).unwrap(),
                "Lorg/threeten/bp/Instant;"
            ),
            other => panic!("unexpected element value {:?}", other),
        }
    }

    #[test]
    fn first_matching_rule_wins() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        time_graph(&graph);
        let settings = Settings::new();

        let converter = ApiConverter::new(
            &graph,
            &settings,
            vec![
                Replacement::replace_type("java/time/Instant", "org/threeten/bp/Instant").unwrap(),
                Replacement::replace_type("java/time/*", "java/time/*").unwrap(),
                Replacement::replace_type("java/**", "elsewhere/**").unwrap(),
            ],
        );
        assert_eq!(
            converter.replace_type("java/time/Instant").as_deref(),
            Some("org/threeten/bp/Instant")
        );
        // The identity rule matches first, so the catch-all never applies
        assert_eq!(converter.replace_type("java/time/Duration"), None);
        assert_eq!(
            converter.replace_type("java/util/List").as_deref(),
            Some("elsewhere/util/List")
        );
        assert_eq!(
            converter
                .replace_descriptor("(Ljava/time/Instant;[Ljava/time/Duration;I)V")
                .as_deref(),
            Some("(Lorg/threeten/bp/Instant;[Ljava/time/Duration;I)V")
        );
        assert_eq!(converter.replace_descriptor("V"), None);
        assert_eq!(converter.replace_descriptor("not a descriptor"), None);
    }

    #[test]
    fn invalid_rules_are_dropped() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        time_graph(&graph);
        let settings = Settings::new();
        let converter = ApiConverter::new(
            &graph,
            &settings,
            vec![
                Replacement::replace_type("java/time/Instant", "does/not/Exist").unwrap(),
                Replacement::replace_type("java/time/*", "<1>").unwrap(),
                Replacement::replace_method("**", "now", "**", "missing/Cls", "now", "**")
                    .unwrap(),
            ],
        );
        assert_eq!(converter.type_rules().len(), 1);
        assert_eq!(converter.type_rules()[0].replacement, "<1>");
        assert!(converter.method_rules().is_empty());
    }

    #[test]
    fn choosing_invoke_instructions() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        graph.insert_java_library_types();
        add_library_class(
            &graph,
            "compat/Strings",
            ClassAccessFlags::PUBLIC,
            &[(
                "length",
                "(Ljava/lang/CharSequence;)I",
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            )],
        );
        let settings = Settings::new();

        let mut class = builder("a/Caller");
        let call = class
            .constants
            .get_method_ref("java/lang/CharSequence", "length", "()I", true)
            .unwrap();
        let [hi, lo] = call.0 .0.to_be_bytes();
        class
            .add_method(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                "size",
                "(Ljava/lang/CharSequence;)I",
                Some(&code(vec![0x2a, opcodes::INVOKEINTERFACE, hi, lo, 1, 0, 0xac])),
            )
            .unwrap();
        let mut class = class.result();

        let converter = ApiConverter::new(
            &graph,
            &settings,
            vec![Replacement::replace_method(
                "java/lang/CharSequence",
                "length",
                "()I",
                "compat/Strings",
                "length",
                "(Ljava/lang/CharSequence;)I",
            )
            .unwrap()],
        );
        let mut log = ChangeLog::new();
        assert!(converter.convert_class(&mut class, &mut log).unwrap());

        let body = method_code(&class, "size", "(Ljava/lang/CharSequence;)I");
        assert_eq!(body.code_array[1], opcodes::INVOKESTATIC);
        assert_eq!(&body.code_array[4..], &[opcodes::NOP, opcodes::NOP, 0xac]);
        assert_eq!(invoked(&class, &body, 1).class, "compat/Strings");
        assert_eq!(invoked(&class, &body, 1).kind, MemberRefKind::Method);
        assert_eq!(
            log.replaced_instructions,
            vec![(name("a/Caller"), String::from("size"), 1)]
        );
    }

    fn redirect_now(rules: Vec<Replacement>) -> MemberRef {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        time_graph(&graph);
        add_library_class(
            &graph,
            "compat/Clock",
            ClassAccessFlags::PUBLIC,
            &[(
                "now",
                "()Lorg/threeten/bp/Instant;",
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            )],
        );
        let settings = Settings::new();

        let mut class = builder("a/Clock");
        let now = class
            .constants
            .get_method_ref("java/time/Instant", "now", "()Ljava/time/Instant;", false)
            .unwrap();
        let [hi, lo] = now.0 .0.to_be_bytes();
        class
            .add_method(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                "stamp",
                "()V",
                Some(&code(vec![opcodes::INVOKESTATIC, hi, lo, 0x57, 0xb1])),
            )
            .unwrap();
        let mut class = class.result();

        let converter = ApiConverter::new(&graph, &settings, rules);
        let mut log = ChangeLog::new();
        assert!(converter.convert_class(&mut class, &mut log).unwrap());
        let body = method_code(&class, "stamp", "()V");
        invoked(&class, &body, 0)
    }

    #[test]
    fn first_matching_method_rule_wins() {
        let exact = || {
            Replacement::replace_method(
                "java/time/Instant",
                "now",
                "**",
                "org/threeten/bp/Instant",
                "now",
                "()Lorg/threeten/bp/Instant;",
            )
            .unwrap()
        };
        let wildcard = || {
            Replacement::replace_method(
                "java/time/*",
                "now",
                "()Ljava/time/Instant;",
                "compat/Clock",
                "now",
                "()Lorg/threeten/bp/Instant;",
            )
            .unwrap()
        };

        assert_eq!(
            redirect_now(vec![exact(), wildcard()]).class,
            "org/threeten/bp/Instant"
        );
        assert_eq!(redirect_now(vec![wildcard(), exact()]).class, "compat/Clock");
    }

    #[test]
    fn oversized_redirects_are_skipped() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        graph.insert_java_library_types();
        add_library_class(
            &graph,
            "compat/Strings",
            ClassAccessFlags::PUBLIC,
            &[(
                "length",
                "(Ljava/lang/CharSequence;)I",
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            )],
        );
        add_library_class(
            &graph,
            "compat/Counter",
            ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
            &[(
                "length",
                "(Ljava/lang/CharSequence;)I",
                MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
            )],
        );
        let settings = Settings::new();

        let mut class = builder("a/Caller");
        let call = class
            .constants
            .get_method_ref("compat/Strings", "length", "(Ljava/lang/CharSequence;)I", false)
            .unwrap();
        let [hi, lo] = call.0 .0.to_be_bytes();
        class
            .add_method(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                "size",
                "(Ljava/lang/CharSequence;)I",
                Some(&code(vec![0x2a, opcodes::INVOKESTATIC, hi, lo, 0xac])),
            )
            .unwrap();
        let mut class = class.result();
        let before = class.to_bytes().unwrap();

        // `invokeinterface` takes five bytes, so it cannot replace a three byte `invokestatic`
        let converter = ApiConverter::new(
            &graph,
            &settings,
            vec![Replacement::replace_method(
                "compat/Strings",
                "length",
                "**",
                "compat/Counter",
                "length",
                "**",
            )
            .unwrap()],
        );
        assert_eq!(converter.method_rules().len(), 1);
        let mut log = ChangeLog::new();
        assert!(!converter.convert_class(&mut class, &mut log).unwrap());
        assert!(log.replaced_instructions.is_empty());
        assert_eq!(class.to_bytes().unwrap(), before);
    }

    #[test]
    fn redirecting_method_handles() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        graph.insert_java_library_types();
        add_library_class(
            &graph,
            "compat/Strings",
            ClassAccessFlags::PUBLIC,
            &[(
                "length",
                "(Ljava/lang/CharSequence;)I",
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            )],
        );
        let settings = Settings::new();

        // `CharSequence::length` as it would be passed to the lambda metafactory
        let mut class = builder("a/Caller");
        let length = class
            .constants
            .get_method_ref("java/lang/CharSequence", "length", "()I", true)
            .unwrap();
        let handle = class
            .constants
            .get_method_handle(HandleKind::InvokeInterface, length.0)
            .unwrap();
        let to_string = class
            .constants
            .get_method_ref("java/lang/Object", "toString", "()Ljava/lang/String;", false)
            .unwrap();
        let untouched = class
            .constants
            .get_method_handle(HandleKind::InvokeVirtual, to_string.0)
            .unwrap();
        let mut class = class.result();

        let converter = ApiConverter::new(
            &graph,
            &settings,
            vec![Replacement::replace_method(
                "java/lang/CharSequence",
                "length",
                "()I",
                "compat/Strings",
                "length",
                "(Ljava/lang/CharSequence;)I",
            )
            .unwrap()],
        );
        let mut log = ChangeLog::new();
        assert!(converter.convert_class(&mut class, &mut log).unwrap());
        assert_eq!(log.modified_classes, vec![name("a/Caller")]);

        let (handle_kind, member) = match class.constants.get(handle).unwrap() {
            Constant::MethodHandle {
                handle_kind,
                member,
            } => (*handle_kind, *member),
            other => panic!("unexpected constant {:?}", other),
        };
        assert_eq!(handle_kind, HandleKind::InvokeStatic);
        assert_eq!(
            class.constants.member_ref(member).unwrap(),
            MemberRef {
                class: String::from("compat/Strings"),
                name: String::from("length"),
                descriptor: String::from("(Ljava/lang/CharSequence;)I"),
                kind: MemberRefKind::Method,
            }
        );

        // Handles to methods no rule matches keep pointing where they did
        assert_eq!(
            class.constants.get(untouched).unwrap(),
            &Constant::MethodHandle {
                handle_kind: HandleKind::InvokeVirtual,
                member: to_string.0,
            }
        );
    }
}
