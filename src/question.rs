use std::io::Cursor;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::instrument;

use super::{Name, Networkable};
use crate::{DnsError, RecordType};

pub const CLASS_IN: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: Name,
    pub type_: RecordType,
    pub class: u16,
}

impl Question {
    pub fn new(name: Name, type_: RecordType) -> Self {
        Self {
            name,
            type_,
            class: CLASS_IN,
        }
    }
}

impl Networkable for Question {
    #[instrument(level = "trace", skip_all)]
    fn to_bytes(&self) -> Bytes {
        let mut ret = BytesMut::new();

        ret.extend_from_slice(&self.name.to_bytes());
        ret.put_u16(self.type_.to_int());
        ret.put_u16(self.class);

        ret.into()
    }

    #[instrument(level = "trace", skip_all)]
    fn from_bytes(bytes: &mut Cursor<&[u8]>) -> Result<Self, DnsError> {
        let name = Name::from_bytes(bytes)?;

        if bytes.remaining() < 4 {
            return Err(DnsError::FormatError);
        }

        let type_ = bytes.get_u16();
        let type_ = RecordType::from_int(type_);

        let class = bytes.get_u16();

        Ok(Self { name, type_, class })
    }
}
