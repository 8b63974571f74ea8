//! Field and method descriptors
//!
//! See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.3>

use super::{BinaryName, Name};
use std::io::{Error, ErrorKind, Result};
use std::iter::Peekable;
use std::str::Chars;

/// Descriptors that can be written back out in their class file form
pub trait RenderDescriptor {
    fn render(&self) -> String {
        let mut out = String::new();
        self.render_to(&mut out);
        out
    }

    fn render_to(&self, out: &mut String);
}

/// Descriptors that can be read from their class file form
pub trait ParseDescriptor: Sized {
    /// Parse the whole string as one descriptor
    fn parse(source: &str) -> Result<Self> {
        let mut source = source.chars().peekable();
        let parsed = Self::parse_from(&mut source)?;
        match source.next() {
            None => Ok(parsed),
            Some(c) => Err(invalid(format!("Unexpected trailing '{}'", c))),
        }
    }

    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self>;
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidInput, msg.into())
}

fn expect(source: &mut Peekable<Chars>, expected: char) -> Result<()> {
    match source.next() {
        Some(c) if c == expected => Ok(()),
        Some(c) => Err(invalid(format!("Expected '{}' but found '{}'", expected, c))),
        None => Err(Error::new(
            ErrorKind::UnexpectedEof,
            format!("Expected '{}'", expected),
        )),
    }
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    const ALL: [(char, BaseType); 8] = [
        ('B', BaseType::Byte),
        ('C', BaseType::Char),
        ('D', BaseType::Double),
        ('F', BaseType::Float),
        ('I', BaseType::Int),
        ('J', BaseType::Long),
        ('S', BaseType::Short),
        ('Z', BaseType::Boolean),
    ];

    fn from_char(c: char) -> Option<BaseType> {
        BaseType::ALL
            .iter()
            .find(|(tag, _)| *tag == c)
            .map(|(_, base)| *base)
    }

    fn tag(self) -> char {
        BaseType::ALL
            .iter()
            .find(|(_, base)| *base == self)
            .map_or('V', |(tag, _)| *tag)
    }

    /// Number of local variable (or operand stack) slots
    pub fn slots(self) -> usize {
        match self {
            BaseType::Double | BaseType::Long => 2,
            _ => 1,
        }
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, out: &mut String) {
        out.push(self.tag());
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.next() {
            Some(c) => BaseType::from_char(c)
                .ok_or_else(|| invalid(format!("Invalid primitive type '{}'", c))),
            None => Err(Error::new(ErrorKind::UnexpectedEof, "Missing primitive type")),
        }
    }
}

/// Class names appear as `Lname;` in descriptors
impl RenderDescriptor for BinaryName {
    fn render_to(&self, out: &mut String) {
        out.push('L');
        out.push_str(self.as_str());
        out.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        expect(source, 'L')?;
        let mut name = String::new();
        loop {
            match source.next() {
                Some(';') => return BinaryName::from_string(name).map_err(invalid),
                Some(c) => name.push(c),
                None => {
                    let msg = format!("Unterminated class 'L{}'", name);
                    return Err(Error::new(ErrorKind::UnexpectedEof, msg));
                }
            }
        }
    }
}

/// Type of a field, parameter, or return value
///
/// The class type is a parameter so that descriptors can be parsed once and then have their
/// classes substituted with `map`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType<Class> {
    Base(BaseType),
    Object(Class),
    Array(Box<FieldType<Class>>),
}

impl<C> FieldType<C> {
    pub fn map<C2>(&self, map_class: impl FnOnce(&C) -> C2) -> FieldType<C2> {
        match self {
            FieldType::Base(base) => FieldType::Base(*base),
            FieldType::Object(class) => FieldType::Object(map_class(class)),
            FieldType::Array(element) => FieldType::Array(Box::new(element.map(map_class))),
        }
    }

    /// Innermost class, if this is an object type or an (arbitrarily nested) array of objects
    pub fn class(&self) -> Option<&C> {
        match self {
            FieldType::Base(_) => None,
            FieldType::Object(class) => Some(class),
            FieldType::Array(element) => element.class(),
        }
    }

    pub fn array(element: FieldType<C>) -> FieldType<C> {
        FieldType::Array(Box::new(element))
    }

    pub fn slots(&self) -> usize {
        match self {
            FieldType::Base(base) => base.slots(),
            FieldType::Object(_) | FieldType::Array(_) => 1,
        }
    }
}

impl<C: RenderDescriptor> RenderDescriptor for FieldType<C> {
    fn render_to(&self, out: &mut String) {
        match self {
            FieldType::Base(base) => base.render_to(out),
            FieldType::Object(class) => class.render_to(out),
            FieldType::Array(element) => {
                out.push('[');
                element.render_to(out);
            }
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for FieldType<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.peek().copied() {
            Some('L') => C::parse_from(source).map(FieldType::Object),
            Some('[') => {
                source.next();
                FieldType::parse_from(source).map(FieldType::array)
            }
            Some(_) => BaseType::parse_from(source).map(FieldType::Base),
            None => Err(Error::new(ErrorKind::UnexpectedEof, "Missing field type")),
        }
    }
}

/// Parameter and return types of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor<Class> {
    pub parameters: Vec<FieldType<Class>>,

    /// `None` for `void`
    pub return_type: Option<FieldType<Class>>,
}

impl<C> MethodDescriptor<C> {
    /// Substitute every class mentioned in the descriptor
    pub fn map<C2>(&self, mut map_class: impl FnMut(&C) -> C2) -> MethodDescriptor<C2> {
        MethodDescriptor {
            parameters: self
                .parameters
                .iter()
                .map(|parameter| parameter.map(&mut map_class))
                .collect(),
            return_type: self.return_type.as_ref().map(|ret| ret.map(&mut map_class)),
        }
    }

    /// Argument slots taken up by a call (this is what `invokeinterface` encodes as its count)
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let receiver = if has_this_param { 1 } else { 0 };
        receiver + self.parameters.iter().map(FieldType::slots).sum::<usize>()
    }
}

impl<C: RenderDescriptor> RenderDescriptor for MethodDescriptor<C> {
    fn render_to(&self, out: &mut String) {
        out.push('(');
        for parameter in &self.parameters {
            parameter.render_to(out);
        }
        out.push(')');
        match &self.return_type {
            None => out.push('V'),
            Some(ret) => ret.render_to(out),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for MethodDescriptor<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        expect(source, '(')?;
        let mut parameters = vec![];
        while source.next_if_eq(&')').is_none() {
            parameters.push(FieldType::parse_from(source)?);
        }
        let return_type = match source.next_if_eq(&'V') {
            Some(_) => None,
            None => Some(FieldType::parse_from(source)?),
        };
        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    type FT = FieldType<BinaryName>;

    fn threeten(class: &BinaryName) -> BinaryName {
        match class.as_str().strip_prefix("java/time/") {
            Some(rest) => BinaryName::from_string(format!("org/threeten/bp/{}", rest)).unwrap(),
            None => class.clone(),
        }
    }

    #[test]
    fn field_types() {
        assert_eq!(FT::parse("J").unwrap(), FieldType::Base(BaseType::Long));
        assert_eq!(
            FT::parse("[[Ljava/lang/String;").unwrap(),
            FieldType::array(FieldType::array(FieldType::Object(BinaryName::STRING)))
        );
        assert_eq!(FT::parse("[[[D").unwrap().render(), "[[[D");
        assert_eq!(FT::parse("[[I").unwrap().class(), None);
        assert_eq!(
            FT::parse("[Ljava/lang/Object;").unwrap().class(),
            Some(&BinaryName::OBJECT)
        );
    }

    #[test]
    fn malformed_descriptors() {
        assert!(FT::parse("").is_err());
        assert!(FT::parse("V").is_err());
        assert!(FT::parse("Ljava/lang/Object").is_err());
        assert!(FT::parse("II").is_err());
        assert!(FT::parse("[").is_err());
        assert!(MethodDescriptor::<BinaryName>::parse("(I").is_err());
        assert!(MethodDescriptor::<BinaryName>::parse("()").is_err());
        assert!(MethodDescriptor::<BinaryName>::parse("I)V").is_err());
    }

    #[test]
    fn substituting_classes() {
        let desc =
            MethodDescriptor::<BinaryName>::parse("([Ljava/time/Instant;JI)Ljava/time/Duration;")
                .unwrap();
        let mapped = desc.map(threeten);
        assert_eq!(
            mapped.render(),
            "([Lorg/threeten/bp/Instant;JI)Lorg/threeten/bp/Duration;"
        );
        assert_eq!(mapped.parameter_length(true), 5);
        assert_eq!(mapped.parameter_length(false), 4);
    }

    #[test]
    fn void_methods() {
        let desc = MethodDescriptor::<BinaryName>::parse("()V").unwrap();
        assert_eq!(desc.parameters, vec![]);
        assert_eq!(desc.return_type, None);
        assert_eq!(desc.render(), "()V");
    }
}
