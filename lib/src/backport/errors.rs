use crate::jvm;
use crate::jvm::BinaryName;

#[derive(Debug)]
pub enum Error {
    Jvm(jvm::Error),

    /// Pattern or replacement template was rejected when the rule was built
    InvalidPattern { pattern: String, reason: String },

    /// Generated helper classes would have shadowed existing classes
    HelperClassCollision(Vec<BinaryName>),

    /// Program already contains a class by this name
    DuplicateClass(BinaryName),
}

impl From<jvm::Error> for Error {
    fn from(err: jvm::Error) -> Error {
        Error::Jvm(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Jvm(jvm::Error::IoError(err))
    }
}
