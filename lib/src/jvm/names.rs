use std::borrow::{Borrow, Cow};
use std::fmt;

/// Names of methods and fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces, with `/` separating packages
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BinaryName(Cow<'static, str>);

pub trait Name: Sized {
    /// Extract the raw underlying string name
    fn as_str(&self) -> &str;

    /// Validate and wrap a string, explaining what is wrong with it on failure
    fn from_string(name: String) -> Result<Self, String>;
}

macro_rules! name_impls {
    ($name:ident) => {
        impl Name for $name {
            fn as_str(&self) -> &str {
                &self.0
            }

            fn from_string(name: String) -> Result<Self, String> {
                $name::validate(&name)?;
                Ok($name(Cow::Owned(name)))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        /// Lets maps keyed by names be queried with plain strings
        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl $name {
            /// Names known to be valid at compile time
            pub(crate) const fn name(value: &'static str) -> $name {
                $name(Cow::Borrowed(value))
            }
        }
    };
}

name_impls!(UnqualifiedName);
name_impls!(BinaryName);

impl UnqualifiedName {
    fn validate(name: &str) -> Result<(), String> {
        if name.is_empty() {
            Err(String::from("Unqualified name is empty"))
        } else if let Some(c) = name.chars().find(|c| matches!(c, '.' | ';' | '[' | '/')) {
            Err(format!("Unqualified name '{}' contains '{}'", name, c))
        } else {
            Ok(())
        }
    }

    pub const INIT: Self = Self::name("<init>");
    pub const CLINIT: Self = Self::name("<clinit>");

    // Bootstrap methods on `java/lang/invoke/LambdaMetafactory`
    pub const METAFACTORY: Self = Self::name("metafactory");
    pub const ALTMETAFACTORY: Self = Self::name("altMetafactory");
}

impl BinaryName {
    fn validate(name: &str) -> Result<(), String> {
        if name.is_empty() {
            return Err(String::from("Binary name is empty"));
        }
        for segment in name.split('/') {
            UnqualifiedName::validate(segment)
                .map_err(|msg| format!("Binary name '{}': {}", name, msg))?;
        }
        Ok(())
    }

    // JDK names
    pub const CHARSEQUENCE: Self = Self::name("java/lang/CharSequence");
    pub const CLASS: Self = Self::name("java/lang/Class");
    pub const CLONEABLE: Self = Self::name("java/lang/Cloneable");
    pub const COMPARABLE: Self = Self::name("java/lang/Comparable");
    pub const INTEGER: Self = Self::name("java/lang/Integer");
    pub const LAMBDAMETAFACTORY: Self = Self::name("java/lang/invoke/LambdaMetafactory");
    pub const METHODHANDLE_LOOKUP: Self = Self::name("java/lang/invoke/MethodHandles$Lookup");
    pub const METHODHANDLE: Self = Self::name("java/lang/invoke/MethodHandle");
    pub const METHODTYPE: Self = Self::name("java/lang/invoke/MethodType");
    pub const CALLSITE: Self = Self::name("java/lang/invoke/CallSite");
    pub const NUMBER: Self = Self::name("java/lang/Number");
    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const SERIALIZABLE: Self = Self::name("java/io/Serializable");
    pub const STRING: Self = Self::name("java/lang/String");
}
