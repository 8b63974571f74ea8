use crate::jvm::class_file::{AttributeLike, ConstantIndex, Parse, Serialize, Utf8ConstantIndex};
use crate::jvm::Error;
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Annotation on a class, field, method, or parameter
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.16
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Field descriptor of the annotation interface
    pub type_index: Utf8ConstantIndex,
    pub element_value_pairs: Vec<ElementValuePair>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementValuePair {
    pub name: Utf8ConstantIndex,
    pub value: ElementValue,
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.16.1
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// Primitive or string constant (the tag is one of `BCDFIJSZs`)
    Constant { tag: u8, value: ConstantIndex },

    /// Enum constant, where `type_name` is the field descriptor of the enum
    Enum {
        type_name: Utf8ConstantIndex,
        const_name: Utf8ConstantIndex,
    },

    /// Class literal, given as a return descriptor (so `V` is allowed)
    Class(Utf8ConstantIndex),

    /// Nested annotation
    Annotation(Annotation),

    Array(Vec<ElementValue>),
}

impl Annotation {
    /// Visit every index in the annotation which points to a type descriptor
    pub fn visit_descriptors<F>(&mut self, visit: &mut F) -> Result<(), Error>
    where
        F: FnMut(&mut Utf8ConstantIndex) -> Result<(), Error>,
    {
        visit(&mut self.type_index)?;
        for pair in &mut self.element_value_pairs {
            pair.value.visit_descriptors(visit)?;
        }
        Ok(())
    }
}

impl ElementValue {
    /// Visit every index in the element value which points to a type descriptor
    pub fn visit_descriptors<F>(&mut self, visit: &mut F) -> Result<(), Error>
    where
        F: FnMut(&mut Utf8ConstantIndex) -> Result<(), Error>,
    {
        match self {
            ElementValue::Constant { .. } => Ok(()),
            ElementValue::Enum { type_name, .. } => visit(type_name),
            ElementValue::Class(class) => visit(class),
            ElementValue::Annotation(annotation) => annotation.visit_descriptors(visit),
            ElementValue::Array(values) => {
                for value in values {
                    value.visit_descriptors(visit)?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for Annotation {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.type_index.serialize(writer)?;
        self.element_value_pairs.serialize(writer)
    }
}

impl Parse for Annotation {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Annotation {
            type_index: Utf8ConstantIndex::parse(reader)?,
            element_value_pairs: Vec::parse(reader)?,
        })
    }
}

impl Serialize for ElementValuePair {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name.serialize(writer)?;
        self.value.serialize(writer)
    }
}

impl Parse for ElementValuePair {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ElementValuePair {
            name: Utf8ConstantIndex::parse(reader)?,
            value: ElementValue::parse(reader)?,
        })
    }
}

impl Serialize for ElementValue {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            ElementValue::Constant { tag, value } => {
                tag.serialize(writer)?;
                value.serialize(writer)
            }
            ElementValue::Enum {
                type_name,
                const_name,
            } => {
                b'e'.serialize(writer)?;
                type_name.serialize(writer)?;
                const_name.serialize(writer)
            }
            ElementValue::Class(class) => {
                b'c'.serialize(writer)?;
                class.serialize(writer)
            }
            ElementValue::Annotation(annotation) => {
                b'@'.serialize(writer)?;
                annotation.serialize(writer)
            }
            ElementValue::Array(values) => {
                b'['.serialize(writer)?;
                values.serialize(writer)
            }
        }
    }
}

impl Parse for ElementValue {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let tag = u8::parse(reader)?;
        let value = match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => {
                ElementValue::Constant {
                    tag,
                    value: ConstantIndex::parse(reader)?,
                }
            }
            b'e' => ElementValue::Enum {
                type_name: Utf8ConstantIndex::parse(reader)?,
                const_name: Utf8ConstantIndex::parse(reader)?,
            },
            b'c' => ElementValue::Class(Utf8ConstantIndex::parse(reader)?),
            b'@' => ElementValue::Annotation(Annotation::parse(reader)?),
            b'[' => ElementValue::Array(Vec::parse(reader)?),
            other => {
                return Err(Error::MalformedAttribute {
                    name: "element_value",
                    reason: format!("unknown tag {:?}", other as char),
                })
            }
        };
        Ok(value)
    }
}

/// Annotation attributes that are just a list of annotations
macro_rules! annotations_attribute {
    ($($attribute:ident),* $(,)?) => {
        $(
            #[derive(Debug, Clone, PartialEq, Eq)]
            pub struct $attribute(pub Vec<Annotation>);

            impl AttributeLike for $attribute {
                const NAME: &'static str = stringify!($attribute);
            }

            impl Serialize for $attribute {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    self.0.serialize(writer)
                }
            }

            impl Parse for $attribute {
                fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
                    Ok($attribute(Vec::parse(reader)?))
                }
            }
        )*
    };
}

/// Parameter annotation attributes: one list of annotations per parameter
///
/// Note that the parameter count is a single byte, unlike most other counts.
macro_rules! parameter_annotations_attribute {
    ($($attribute:ident),* $(,)?) => {
        $(
            #[derive(Debug, Clone, PartialEq, Eq)]
            pub struct $attribute(pub Vec<Vec<Annotation>>);

            impl AttributeLike for $attribute {
                const NAME: &'static str = stringify!($attribute);
            }

            impl Serialize for $attribute {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    (self.0.len() as u8).serialize(writer)?;
                    for annotations in &self.0 {
                        annotations.serialize(writer)?;
                    }
                    Ok(())
                }
            }

            impl Parse for $attribute {
                fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
                    let count = u8::parse(reader)?;
                    let parameters = (0..count)
                        .map(|_| Vec::parse(reader))
                        .collect::<Result<_, _>>()?;
                    Ok($attribute(parameters))
                }
            }
        )*
    };
}

annotations_attribute!(RuntimeVisibleAnnotations, RuntimeInvisibleAnnotations);
parameter_annotations_attribute!(
    RuntimeVisibleParameterAnnotations,
    RuntimeInvisibleParameterAnnotations,
);

/// Default value of an annotation interface element
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.22
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationDefault(pub ElementValue);

impl AttributeLike for AnnotationDefault {
    const NAME: &'static str = "AnnotationDefault";
}

impl Serialize for AnnotationDefault {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Parse for AnnotationDefault {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(AnnotationDefault(ElementValue::parse(reader)?))
    }
}
