use std::future::Future;
use std::io::{self, Cursor};
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tracing::{debug, info, instrument, warn};

use crate::handler::QueryHandler;
use crate::util::{set_response_flags, RCODE_FORMAT_ERROR, RCODE_NOT_IMPLEMENTED};
use crate::{Header, Message, Networkable};

// http://www.dnsflagday.net/2020/
const MAX_DATAGRAM: usize = 1232;

/// UDP front end: every datagram is decoded and answered on its own task.
pub struct Server {
    sock: Arc<UdpSocket>,
    handler: Arc<QueryHandler>,
}

impl Server {
    pub async fn bind(addr: impl ToSocketAddrs, handler: Arc<QueryHandler>) -> io::Result<Self> {
        let sock = UdpSocket::bind(addr).await?;

        Ok(Self {
            sock: Arc::new(sock),
            handler,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.sock.local_addr()
    }

    /// Serves until `shutdown` completes. Socket errors are logged and never
    /// end the loop.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        if let Ok(addr) = self.local_addr() {
            info!("listening on udp://{}", addr);
        }

        loop {
            let mut buf = [0; MAX_DATAGRAM];

            let (len, addr) = tokio::select! {
                _ = &mut shutdown => {
                    info!("shutting down");
                    return;
                }
                received = self.sock.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        warn!(error = %e, "failed to receive datagram");
                        continue;
                    }
                },
            };

            let sock = Arc::clone(&self.sock);
            let handler = Arc::clone(&self.handler);

            tokio::spawn(async move {
                if let Some(response) = handle_request(&handler, &buf[..len], addr).await {
                    if let Err(e) = sock.send_to(&response, addr).await {
                        warn!(error = %e, %addr, "failed to send reply");
                    }
                }
            });
        }
    }
}

fn error_reply(request: &Header, rcode: u8) -> Message {
    let mut flags = set_response_flags(request.flags);
    flags.set_rcode(rcode);
    Message::new(Header::new(request.id, flags))
}

#[instrument(level = "debug", skip(handler, data))]
async fn handle_request(handler: &QueryHandler, data: &[u8], addr: SocketAddr) -> Option<Bytes> {
    let request = match Message::from_bytes(&mut Cursor::new(data)) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "undecodable request");
            // Answer FORMERR when at least the id can be recovered
            let header = Header::from_bytes(&mut Cursor::new(data)).ok()?;
            if header.flags.qr() {
                return None;
            }
            return Some(error_reply(&header, RCODE_FORMAT_ERROR).to_bytes());
        }
    };

    if request.header.flags.qr() {
        debug!("discarding response sent to server");
        return None;
    }

    if request.header.flags.opcode() != 0 {
        debug!(opcode = request.header.flags.opcode(), "unimplemented opcode");
        return Some(error_reply(&request.header, RCODE_NOT_IMPLEMENTED).to_bytes());
    }

    for question in &request.questions {
        debug!("DNS query for {}", question.name);
    }

    let limit = request.udp_payload_size().min(MAX_DATAGRAM);
    let reply = handler.handle(&request).await;

    Some(reply.to_bytes_truncated(limit))
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};
    use std::net::{Ipv4Addr, SocketAddr};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::net::UdpSocket;
    use tokio::sync::oneshot;

    use super::Server;
    use crate::cache::ResolutionCache;
    use crate::handler::QueryHandler;
    use crate::lookup::{ForwardLookup, LookupError};
    use crate::{Message, Name, Networkable, Question, RecordData, RecordType, ResourceRecord};

    /// Never finishes for `stuck.test`, fails for everything else.
    struct FailingLookup;

    #[async_trait]
    impl ForwardLookup for FailingLookup {
        async fn lookup(&self, host: &str) -> Result<Vec<Ipv4Addr>, LookupError> {
            if host == "stuck.test" {
                std::future::pending::<()>().await;
            }

            Err(LookupError::Io {
                host: host.to_owned(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such host"),
            })
        }
    }

    async fn start() -> (SocketAddr, oneshot::Sender<()>) {
        let cache: ResolutionCache = [("example.com.", Ipv4Addr::new(192, 168, 1, 100))]
            .into_iter()
            .collect();
        let handler = QueryHandler::new(Arc::new(cache), Arc::new(FailingLookup))
            .with_lookup_timeout(Duration::from_secs(3600));

        let server = Server::bind("127.0.0.1:0", Arc::new(handler)).await.unwrap();
        let addr = server.local_addr().unwrap();

        let (tx, rx) = oneshot::channel();
        tokio::spawn(server.run(async {
            rx.await.ok();
        }));

        (addr, tx)
    }

    async fn exchange(server: SocketAddr, request: &[u8]) -> Message {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sock.send_to(request, server).await.unwrap();

        let mut buf = [0; 1232];
        let len = tokio::time::timeout(Duration::from_secs(5), sock.recv(&mut buf))
            .await
            .expect("no reply within 5s")
            .unwrap();
        Message::from_bytes(&mut Cursor::new(&buf[..len])).unwrap()
    }

    fn query_for(questions: &[(&str, RecordType)]) -> Message {
        let mut query = Message::query(Name::new(questions[0].0), questions[0].1);
        for (name, type_) in &questions[1..] {
            query.add_question(Question::new(Name::new(name), *type_));
        }
        query
    }

    fn with_edns(mut query: Message, payload_size: u16) -> Message {
        query.header.num_additionals += 1;
        query.additionals.push(ResourceRecord {
            name: Name::root(),
            type_: RecordType::Opt,
            class: payload_size,
            ttl: 0,
            data: RecordData::Other(Default::default()),
        });
        query
    }

    #[tokio::test]
    async fn answers_over_udp() {
        let (addr, _shutdown) = start().await;

        let query = Message::query(Name::new("example.com."), RecordType::A);
        let reply = exchange(addr, &query.to_bytes()).await;

        assert_eq!(reply.header.id, query.header.id);
        assert_eq!(reply.answers.len(), 1);
        assert_eq!(reply.answers[0].ipv4(), Some(Ipv4Addr::new(192, 168, 1, 100)));
    }

    #[tokio::test]
    async fn replies_even_when_resolution_fails() {
        let (addr, _shutdown) = start().await;

        let query = Message::query(Name::new("nonexistent.invalid."), RecordType::A);
        let reply = exchange(addr, &query.to_bytes()).await;

        assert_eq!(reply.header.id, query.header.id);
        assert_eq!(reply.header.flags.rcode(), 0);
        assert!(reply.answers.is_empty());
    }

    #[tokio::test]
    async fn malformed_request_gets_format_error() {
        let (addr, _shutdown) = start().await;

        // Header promising a question that is not there
        let request = [0xbe, 0xef, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0];
        let reply = exchange(addr, &request).await;

        assert_eq!(reply.header.id, 0xbeef);
        assert_eq!(reply.header.flags.rcode(), 1);
    }

    #[tokio::test]
    async fn unlisted_question_type_is_answered() {
        let (addr, _shutdown) = start().await;

        // HTTPS (65)
        let query = query_for(&[("example.com.", RecordType::Unknown(65))]);
        let reply = exchange(addr, &query.to_bytes()).await;

        assert_eq!(reply.header.flags.rcode(), 0);
        assert_eq!(reply.questions[0].type_, RecordType::Unknown(65));
        assert_eq!(reply.answers.len(), 1);
        assert_eq!(reply.answers[0].ipv4(), Some(Ipv4Addr::new(192, 168, 1, 100)));
    }

    #[tokio::test]
    async fn unlisted_type_does_not_spoil_other_questions() {
        let (addr, _shutdown) = start().await;

        // SRV (33) for a name nobody resolves
        let query = query_for(&[
            ("example.com.", RecordType::A),
            ("_x._tcp.example.com.", RecordType::Unknown(33)),
        ]);
        let reply = exchange(addr, &query.to_bytes()).await;

        assert_eq!(reply.header.flags.rcode(), 0);
        assert_eq!(reply.questions.len(), 2);
        assert_eq!(reply.answers.len(), 1);
        assert_eq!(reply.answers[0].name.as_str(), "example.com.");
    }

    #[tokio::test]
    async fn non_utf8_name_gets_empty_reply() {
        let (addr, _shutdown) = start().await;

        let request: &[u8] = b"\x00\x2a\x01\x00\x00\x01\x00\x00\x00\x00\x00\x00\
            \x03\xff\xfe\xfd\x03com\x00\x00\x01\x00\x01";
        let reply = exchange(addr, request).await;

        assert_eq!(reply.header.id, 0x2a);
        assert_eq!(reply.header.flags.rcode(), 0);
        assert!(reply.answers.is_empty());
    }

    #[tokio::test]
    async fn blocked_lookup_does_not_stall_other_queries() {
        let (addr, _shutdown) = start().await;

        let stuck = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let query = query_for(&[("stuck.test.", RecordType::A)]);
        stuck.send_to(&query.to_bytes(), addr).await.unwrap();

        let query = query_for(&[("example.com.", RecordType::A)]);
        let reply = exchange(addr, &query.to_bytes()).await;
        assert_eq!(reply.answers[0].ipv4(), Some(Ipv4Addr::new(192, 168, 1, 100)));

        let mut buf = [0; 1232];
        let pending = tokio::time::timeout(Duration::from_millis(100), stuck.recv(&mut buf)).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn oversized_reply_is_truncated() {
        let (addr, _shutdown) = start().await;

        let query = query_for(&[("example.com.", RecordType::A); 20]);
        let reply = exchange(addr, &query.to_bytes()).await;

        assert!(reply.header.flags.tc());
        assert_eq!(reply.header.id, query.header.id);
        assert!(reply.answers.is_empty());
    }

    #[tokio::test]
    async fn edns_payload_size_allows_larger_reply() {
        let (addr, _shutdown) = start().await;

        let query = with_edns(query_for(&[("example.com.", RecordType::A); 20]), 1232);
        let reply = exchange(addr, &query.to_bytes()).await;

        assert!(!reply.header.flags.tc());
        assert_eq!(reply.answers.len(), 20);
    }

    #[tokio::test]
    async fn unknown_opcode_is_not_implemented() {
        let (addr, _shutdown) = start().await;

        let mut query = Message::query(Name::new("example.com."), RecordType::A);
        query.header.flags.set_opcode(2);
        let reply = exchange(addr, &query.to_bytes()).await;

        assert_eq!(reply.header.flags.rcode(), 4);
        assert!(reply.answers.is_empty());
    }
}
