// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use byteorder::WriteBytesExt;

/// Disk format version
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Version {
    /// Version for 0.x releases
    V1,
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", char::from(u8::from(*self)))
    }
}

impl From<Version> for u8 {
    fn from(value: Version) -> Self {
        match value {
            Version::V1 => b'1',
        }
    }
}

impl TryFrom<u8> for Version {
    type Error = ();
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'1' => Ok(Self::V1),
            _ => Err(()),
        }
    }
}

const MAGIC_BYTES: [u8; 3] = [b'@', b'@', b'@'];

impl Version {
    /// Length of the start marker, magic bytes + version tag.
    pub(crate) const fn len() -> usize {
        MAGIC_BYTES.len() + 1
    }

    pub(crate) fn parse_file_header(bytes: &[u8]) -> Option<Self> {
        let first_three = bytes.get(0..3)?;

        if first_three == MAGIC_BYTES {
            let version = *bytes.get(3)?;
            let version = Self::try_from(version).ok()?;

            Some(version)
        } else {
            None
        }
    }

    pub(crate) fn write_file_header<W: std::io::Write>(
        self,
        writer: &mut W,
    ) -> std::io::Result<usize> {
        writer.write_all(&MAGIC_BYTES)?;
        writer.write_u8(u8::from(self))?;
        Ok(Self::len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    #[allow(clippy::expect_used)]
    pub fn version_serialize() -> crate::Result<()> {
        let mut bytes = vec![];
        Version::V1.write_file_header(&mut bytes)?;
        assert_eq!(bytes, b"@@@1");
        Ok(())
    }

    #[test]
    pub fn version_deserialize_success() {
        let version = Version::parse_file_header(b"@@@1");
        assert_eq!(version, Some(Version::V1));
    }

    #[test]
    pub fn version_deserialize_fail() {
        assert!(Version::parse_file_header(b"@@#1").is_none());
        assert!(Version::parse_file_header(b"@@@9").is_none());
        assert!(Version::parse_file_header(b"@@").is_none());
    }

    #[test]
    #[allow(clippy::expect_used)]
    pub fn version_len() {
        let mut buf = vec![];
        let size = Version::V1.write_file_header(&mut buf).expect("can't fail");
        assert_eq!(Version::len(), size);
        assert_eq!(buf.len(), size);
    }
}
