use crate::jvm::class_file::{Parse, Serialize};
use crate::jvm::Error;
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Class file version
///
/// Ordering is by major then minor version, so `Version::JAVA8 < Version::JAVA11`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    pub const JAVA6: Version = Version::major(50);
    pub const JAVA7: Version = Version::major(51);
    pub const JAVA8: Version = Version::major(52);
    pub const JAVA9: Version = Version::major(53);
    pub const JAVA11: Version = Version::major(55);
    pub const JAVA17: Version = Version::major(61);

    const fn major(major: u16) -> Version {
        Version { major, minor: 0 }
    }
}

/// Minor version comes first in the class file
impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.minor.serialize(writer)?;
        self.major.serialize(writer)?;
        Ok(())
    }
}

impl Parse for Version {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let minor = u16::parse(reader)?;
        let major = u16::parse(reader)?;
        Ok(Version { major, minor })
    }
}
