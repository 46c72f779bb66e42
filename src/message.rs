use std::io::Cursor;

use bytes::{Bytes, BytesMut};
use tracing::instrument;

use super::{Header, Networkable, Question, ResourceRecord};
use crate::util::set_response_flags;
use crate::{DnsError, Flags, Name, RecordType};

/// Reply size a requester accepts over UDP when it does not advertise one.
pub const MAX_UDP_PAYLOAD: usize = 512;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
}

impl Message {
    pub fn new(header: Header) -> Self {
        Self {
            header,
            ..Default::default()
        }
    }

    /// A recursive query for `name` with a random id.
    pub fn query(name: Name, type_: RecordType) -> Self {
        let mut flags = Flags::default();
        flags.set_rd(true);

        let mut query = Self::new(Header::new(rand::random::<u16>(), flags));
        query.add_question(Question::new(name, type_));
        query
    }

    /// An empty reply correlated to `request`, echoing its questions.
    pub fn reply_to(request: &Message) -> Self {
        let flags = set_response_flags(request.header.flags);
        let mut reply = Self::new(Header::new(request.header.id, flags));

        for question in &request.questions {
            reply.add_question(question.clone());
        }

        reply
    }

    pub fn add_question(&mut self, question: Question) {
        self.header.num_questions += 1;
        self.questions.push(question)
    }

    pub fn add_answer(&mut self, answer: ResourceRecord) {
        self.header.num_answers += 1;
        self.answers.push(answer)
    }

    /// UDP payload size advertised in an EDNS OPT record, 512 otherwise.
    pub fn udp_payload_size(&self) -> usize {
        self.additionals
            .iter()
            .find(|r| r.type_ == RecordType::Opt)
            .map(|opt| (opt.class as usize).max(MAX_UDP_PAYLOAD))
            .unwrap_or(MAX_UDP_PAYLOAD)
    }

    /// Encodes the message in at most `limit` bytes. A message that does not
    /// fit loses its records, and its questions if still too long, and gets
    /// the TC flag.
    pub fn to_bytes_truncated(&self, limit: usize) -> Bytes {
        let bytes = self.to_bytes();
        if bytes.len() <= limit {
            return bytes;
        }

        let mut header = self.header.clone();
        header.flags.set_tc(true);
        header.num_answers = 0;
        header.num_authorities = 0;
        header.num_additionals = 0;

        let mut truncated = Self::new(header);
        truncated.questions = self.questions.clone();

        let bytes = truncated.to_bytes();
        if bytes.len() <= limit {
            return bytes;
        }

        truncated.header.num_questions = 0;
        truncated.questions.clear();
        truncated.to_bytes()
    }
}

fn read_records(
    bytes: &mut Cursor<&[u8]>,
    count: u16,
) -> Result<Vec<ResourceRecord>, DnsError> {
    (0..count).map(|_| ResourceRecord::from_bytes(bytes)).collect()
}

impl Networkable for Message {
    #[instrument(level = "debug", skip_all)]
    fn to_bytes(&self) -> Bytes {
        let mut response = BytesMut::new();
        response.extend_from_slice(&self.header.to_bytes());

        for question in self.questions.iter() {
            response.extend_from_slice(&question.to_bytes())
        }

        for record in self
            .answers
            .iter()
            .chain(self.authorities.iter())
            .chain(self.additionals.iter())
        {
            response.extend_from_slice(&record.to_bytes())
        }

        response.into()
    }

    #[instrument(level = "debug", skip_all)]
    fn from_bytes(bytes: &mut Cursor<&[u8]>) -> Result<Self, DnsError> {
        let header = Header::from_bytes(bytes)?;

        let questions = (0..header.num_questions)
            .map(|_| Question::from_bytes(bytes))
            .collect::<Result<Vec<_>, _>>()?;

        let answers = read_records(bytes, header.num_answers)?;
        let authorities = read_records(bytes, header.num_authorities)?;
        let additionals = read_records(bytes, header.num_additionals)?;

        Ok(Self {
            header,
            questions,
            answers,
            authorities,
            additionals,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::net::Ipv4Addr;

    use crate::{Message, Name, Networkable, RecordData, RecordType, ResourceRecord};

    #[test]
    fn reply_is_correlated_to_query() {
        let query = Message::query(Name::new("example.com."), RecordType::A);
        let reply = Message::reply_to(&query);

        assert_eq!(reply.header.id, query.header.id);
        assert!(reply.header.flags.qr());
        assert!(reply.header.flags.rd());
        assert_eq!(reply.questions, query.questions);
        assert_eq!(reply.header.num_questions, 1);
        assert!(reply.answers.is_empty());
    }

    #[test]
    fn reads_back_a_reply_with_answers() {
        let query = Message::query(Name::new("example.com."), RecordType::A);
        let mut reply = Message::reply_to(&query);
        reply.add_answer(ResourceRecord::a(
            Name::new("example.com."),
            Ipv4Addr::new(192, 168, 1, 100),
            3600,
        ));

        let bytes = reply.to_bytes();
        let read = Message::from_bytes(&mut Cursor::new(&bytes[..])).unwrap();

        assert_eq!(read, reply);
    }

    #[test]
    fn reads_query_from_dig() {
        // dig example.com A, with an EDNS OPT record in the additional section
        let data: &[u8] = b"\x12\x34\x01\x20\x00\x01\x00\x00\x00\x00\x00\x01\
            \x07example\x03com\x00\x00\x01\x00\x01\
            \x00\x00\x29\x04\xd0\x00\x00\x00\x00\x00\x00";

        let message = Message::from_bytes(&mut Cursor::new(data)).unwrap();
        assert_eq!(message.header.id, 0x1234);
        assert_eq!(message.questions[0].name.as_str(), "example.com.");
        assert_eq!(message.additionals[0].type_, RecordType::Opt);
    }

    fn reply_with_answers(questions: usize) -> Message {
        let mut query = Message::query(Name::new("example.com."), RecordType::A);
        for _ in 1..questions {
            query.add_question(query.questions[0].clone());
        }

        let mut reply = Message::reply_to(&query);
        for _ in 0..questions {
            reply.add_answer(ResourceRecord::a(
                Name::new("example.com."),
                Ipv4Addr::new(192, 168, 1, 100),
                3600,
            ));
        }
        reply
    }

    #[test]
    fn small_reply_is_not_truncated() {
        let reply = reply_with_answers(1);
        assert_eq!(reply.to_bytes_truncated(512), reply.to_bytes());
    }

    #[test]
    fn oversized_reply_drops_answers_and_sets_tc() {
        let reply = reply_with_answers(20);
        assert!(reply.to_bytes().len() > 512);

        let bytes = reply.to_bytes_truncated(512);
        assert!(bytes.len() <= 512);

        let read = Message::from_bytes(&mut Cursor::new(&bytes[..])).unwrap();
        assert!(read.header.flags.tc());
        assert_eq!(read.header.id, reply.header.id);
        assert_eq!(read.questions.len(), 20);
        assert!(read.answers.is_empty());
    }

    #[test]
    fn too_many_questions_leaves_header_only() {
        let bytes = reply_with_answers(40).to_bytes_truncated(512);

        let read = Message::from_bytes(&mut Cursor::new(&bytes[..])).unwrap();
        assert!(read.header.flags.tc());
        assert!(read.questions.is_empty());
        assert_eq!(bytes.len(), 12);
    }

    #[test]
    fn payload_size_from_edns() {
        let mut query = Message::query(Name::new("example.com."), RecordType::A);
        assert_eq!(query.udp_payload_size(), 512);

        query.header.num_additionals = 1;
        query.additionals.push(ResourceRecord {
            name: Name::root(),
            type_: RecordType::Opt,
            class: 1232,
            ttl: 0,
            data: RecordData::Other(Default::default()),
        });
        assert_eq!(query.udp_payload_size(), 1232);
    }

    #[test]
    fn rejects_missing_sections() {
        // Claims one question but carries none
        let data: &[u8] = b"\x12\x34\x01\x00\x00\x01\x00\x00\x00\x00\x00\x00";
        assert!(Message::from_bytes(&mut Cursor::new(data)).is_err());
    }
}
