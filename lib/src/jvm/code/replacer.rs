use super::{decode_instructions, jump_targets, opcodes, Instruction, InvokeKind};
use crate::jvm::class_file::{ClassConstantIndex, Code, ConstantPool, MemberRef, MemberRefKind};
use crate::jvm::{BinaryName, Error, MethodDescriptor, ParseDescriptor};
use std::collections::HashMap;

/// Shape of one instruction to recognize
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstructionPattern {
    /// Any instruction with this opcode, whatever its operands
    Opcode(u8),

    /// Instruction whose constant operand is a field or method reference
    Member { opcode: u8, member: MemberRef },

    /// Instruction whose constant operand is a class (`new`, `checkcast`, ...)
    Class { opcode: u8, class: String },
}

/// Shape of one instruction to emit
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstructionTemplate {
    /// Method invocation, where the kind of the member reference decides whether an
    /// `InterfaceMethodref` or a `Methodref` gets interned
    Invoke { kind: InvokeKind, method: MemberRef },

    /// Already encoded instruction(s) without constant operands
    Raw(Vec<u8>),
}

impl InstructionTemplate {
    fn encoded_len(&self) -> usize {
        match self {
            InstructionTemplate::Invoke { kind, .. } => kind.encoded_len(),
            InstructionTemplate::Raw(bytes) => bytes.len(),
        }
    }

    fn encode(&self, constants: &mut ConstantPool, out: &mut Vec<u8>) -> Result<(), Error> {
        match self {
            InstructionTemplate::Invoke { kind, method } => {
                let index = constants.get_method_ref(
                    &method.class,
                    &method.name,
                    &method.descriptor,
                    method.kind == MemberRefKind::InterfaceMethod,
                )?;
                let descriptor = parse_method_descriptor(&method.descriptor)?;
                out.extend(kind.encode(index.0, &descriptor));
            }
            InstructionTemplate::Raw(bytes) => out.extend_from_slice(bytes),
        }
        Ok(())
    }
}

/// Replace one sequence of instructions with another
#[derive(Clone, Debug)]
pub struct ReplacementRule {
    pub pattern: Vec<InstructionPattern>,
    pub replacement: Vec<InstructionTemplate>,
}

impl ReplacementRule {
    /// Redirect a method invocation from one target to another
    pub fn invoke(
        from_kind: InvokeKind,
        from: MemberRef,
        to_kind: InvokeKind,
        to: MemberRef,
    ) -> ReplacementRule {
        ReplacementRule {
            pattern: vec![InstructionPattern::Member {
                opcode: from_kind.opcode(),
                member: from,
            }],
            replacement: vec![InstructionTemplate::Invoke {
                kind: to_kind,
                method: to,
            }],
        }
    }
}

/// Rewrites instruction sequences inside method bodies
///
/// Matches are only attempted at instruction boundaries and never span a jump target (so control
/// flow can't enter the middle of a replaced sequence). Rules are tried in order and the first one
/// that matches wins. Replacements never move code: the encoded replacement overwrites the matched
/// bytes and any leftover space is filled with `nop`. A replacement which would need more space
/// than the code it replaces is skipped.
pub struct InstructionSequenceReplacer {
    rules: Vec<ReplacementRule>,

    /// Rule indices keyed by the opcode their first pattern expects, in registration order
    by_first_opcode: HashMap<u8, Vec<usize>>,
}

impl InstructionSequenceReplacer {
    pub fn new(rules: Vec<ReplacementRule>) -> InstructionSequenceReplacer {
        let mut by_first_opcode: HashMap<u8, Vec<usize>> = HashMap::new();
        for (idx, rule) in rules.iter().enumerate() {
            if let Some(first) = rule.pattern.first() {
                by_first_opcode
                    .entry(first.opcode())
                    .or_default()
                    .push(idx);
            }
        }
        InstructionSequenceReplacer {
            rules,
            by_first_opcode,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_first_opcode.is_empty()
    }

    pub fn rules(&self) -> &[ReplacementRule] {
        &self.rules
    }

    /// Apply the rules to a method body, returning how many sequences were replaced
    pub fn replace(&self, code: &mut Code, constants: &mut ConstantPool) -> Result<usize, Error> {
        if self.is_empty() {
            return Ok(0);
        }

        // Find all matches first (`code` is borrowed by the decoded instructions)
        let mut edits: Vec<(usize, usize, usize)> = vec![];
        {
            let instructions = decode_instructions(&code.code_array)?;
            let targets = jump_targets(code, &instructions);
            let mut i = 0;
            while i < instructions.len() {
                let candidates = self.by_first_opcode.get(&instructions[i].opcode);
                let mut matched = None;
                for &rule_idx in candidates.into_iter().flatten() {
                    let pattern = &self.rules[rule_idx].pattern;
                    let window = match instructions.get(i..i + pattern.len()) {
                        Some(window) => window,
                        None => continue,
                    };
                    if window[1..].iter().any(|inst| targets.contains(&inst.offset)) {
                        continue;
                    }
                    if sequence_matches(pattern, window, constants)? {
                        let length = window.iter().map(Instruction::len).sum();
                        matched = Some((rule_idx, length, pattern.len()));
                        break;
                    }
                }
                match matched {
                    Some((rule_idx, length, count)) => {
                        edits.push((instructions[i].offset, length, rule_idx));
                        i += count;
                    }
                    None => i += 1,
                }
            }
        }

        let mut replaced = 0;
        for (offset, length, rule_idx) in edits {
            let replacement = &self.rules[rule_idx].replacement;
            let needed: usize = replacement.iter().map(InstructionTemplate::encoded_len).sum();
            if needed > length {
                log::warn!(
                    "Skipping replacement at offset {}: needs {} bytes but only {} are available",
                    offset,
                    needed,
                    length
                );
                continue;
            }
            let mut bytes = Vec::with_capacity(needed);
            for template in replacement {
                template.encode(constants, &mut bytes)?;
            }
            overwrite_padded(&mut code.code_array, offset, length, &bytes);
            replaced += 1;
        }
        Ok(replaced)
    }
}

impl InstructionPattern {
    fn opcode(&self) -> u8 {
        match self {
            InstructionPattern::Opcode(opcode)
            | InstructionPattern::Member { opcode, .. }
            | InstructionPattern::Class { opcode, .. } => *opcode,
        }
    }

    fn matches(&self, instruction: &Instruction, constants: &ConstantPool) -> Result<bool, Error> {
        if instruction.opcode != self.opcode() {
            return Ok(false);
        }
        match self {
            InstructionPattern::Opcode(_) => Ok(true),
            InstructionPattern::Member { member, .. } => match instruction.constant_index() {
                Some(index) => Ok(constants.member_ref(index)? == *member),
                None => Ok(false),
            },
            InstructionPattern::Class { class, .. } => match instruction.constant_index() {
                Some(index) => {
                    let index = ClassConstantIndex(index);
                    Ok(constants.class_name(index)? == class.as_str())
                }
                None => Ok(false),
            },
        }
    }
}

fn sequence_matches(
    pattern: &[InstructionPattern],
    window: &[Instruction],
    constants: &ConstantPool,
) -> Result<bool, Error> {
    for (pattern, instruction) in pattern.iter().zip(window) {
        if !pattern.matches(instruction, constants)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Overwrite `length` bytes of code at `offset`, filling whatever `replacement` leaves unused
/// with `nop`
///
/// Returns `false` (and leaves the code untouched) if the replacement doesn't fit.
pub fn overwrite_padded(
    code_array: &mut [u8],
    offset: usize,
    length: usize,
    replacement: &[u8],
) -> bool {
    if replacement.len() > length || offset + length > code_array.len() {
        return false;
    }
    let target = &mut code_array[offset..offset + length];
    target[..replacement.len()].copy_from_slice(replacement);
    for byte in &mut target[replacement.len()..] {
        *byte = opcodes::NOP;
    }
    true
}

pub(crate) fn parse_method_descriptor(
    descriptor: &str,
) -> Result<MethodDescriptor<BinaryName>, Error> {
    MethodDescriptor::parse(descriptor)
        .map_err(|err| Error::MalformedDescriptor(format!("{}: {}", descriptor, err)))
}
