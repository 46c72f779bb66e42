use std::fmt::Display;
use std::io::Cursor;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::Networkable;
use crate::DnsError;

const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;
const MAX_POINTER_JUMPS: usize = 32;

/// A domain name in its textual, fully-qualified form.
///
/// Names read off the wire always end with the root separator,
/// e.g. `www.example.com.`. Case is kept exactly as received.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Name {
    pub name: String,
}

impl Name {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
        }
    }

    /// Like [`Name::new`] but checks label and total lengths and requires the
    /// trailing root separator.
    pub fn parse(name: &str) -> Result<Self, DnsError> {
        if !name.ends_with('.') {
            return Err(DnsError::FormatError);
        }

        let name = Self::new(name);
        if name.name == "." {
            return Ok(name);
        }

        if name.wire_len() > MAX_NAME_LEN {
            return Err(DnsError::FormatError);
        }

        if name
            .to_host()
            .split('.')
            .any(|l| l.is_empty() || l.len() > MAX_LABEL_LEN)
        {
            return Err(DnsError::FormatError);
        }

        Ok(name)
    }

    pub fn root() -> Self {
        Self::new(".")
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The name in host-name syntax, without the trailing root separator.
    pub fn to_host(&self) -> &str {
        self.name.strip_suffix('.').unwrap_or(&self.name)
    }

    fn labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.to_host().split('.').filter(|l| !l.is_empty())
    }

    fn wire_len(&self) -> usize {
        self.labels().map(|l| l.len() + 1).sum::<usize>() + 1
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

impl Networkable for Name {
    fn to_bytes(&self) -> Bytes {
        let mut ret = BytesMut::with_capacity(self.wire_len());

        for section in self.labels() {
            // A label widened by lossy decoding must still fit its length octet
            let section = &section.as_bytes()[..section.len().min(MAX_LABEL_LEN)];
            ret.put_u8(section.len() as u8);
            ret.extend_from_slice(section);
        }

        ret.put_u8(0);

        ret.into()
    }

    fn from_bytes(bytes: &mut Cursor<&[u8]>) -> Result<Self, DnsError> {
        let mut parts: Vec<String> = Vec::new();
        let mut wire_len = 1;
        let mut jumps = 0;
        // Where to continue once the name has been followed through a pointer
        let mut resume_at = None;

        loop {
            if !bytes.has_remaining() {
                return Err(DnsError::FormatError);
            }

            let len = bytes.get_u8() as usize;
            if len == 0 {
                break;
            }

            if (len & 0b1100_0000) >> 6 == 0b11 {
                // Compressed
                if !bytes.has_remaining() {
                    return Err(DnsError::FormatError);
                }

                jumps += 1;
                if jumps > MAX_POINTER_JUMPS {
                    return Err(DnsError::FormatError);
                }

                let pointer = (((len & 0b0011_1111) as u16) << 8) | (bytes.get_u8() as u16);
                if resume_at.is_none() {
                    resume_at = Some(bytes.position());
                }
                if pointer as usize >= bytes.get_ref().len() {
                    return Err(DnsError::FormatError);
                }
                bytes.set_position(pointer as u64);
            } else if len > MAX_LABEL_LEN {
                return Err(DnsError::FormatError);
            } else {
                // Uncompressed
                if bytes.remaining() < len {
                    return Err(DnsError::FormatError);
                }

                wire_len += len + 1;
                if wire_len > MAX_NAME_LEN {
                    return Err(DnsError::FormatError);
                }

                // Labels are arbitrary octets; invalid UTF-8 is replaced rather than rejected
                let chars = bytes.copy_to_bytes(len);
                parts.push(String::from_utf8_lossy(&chars).into_owned());
            }
        }

        if let Some(position) = resume_at {
            bytes.set_position(position);
        }

        if parts.is_empty() {
            return Ok(Self::root());
        }

        let mut name = parts.join(".");
        name.push('.');

        Ok(Self::new(&name))
    }
}
