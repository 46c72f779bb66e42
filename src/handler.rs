use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::cache::ResolutionCache;
use crate::lookup::{ForwardLookup, LookupError};
use crate::{Message, Question, RecordType, ResourceRecord};

pub const DEFAULT_ANSWER_TTL: u32 = 3600;
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Counters {
    cache_hits: AtomicU64,
    forwarded: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of the handler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerStats {
    pub cache_hits: u64,
    pub forwarded: u64,
    pub dropped: u64,
}

/// Answers queries from the static table, falling back to a forward lookup.
///
/// Every question gets an A record whatever type it asks for. Handling never
/// fails: a question that cannot be resolved is left out of the
/// reply, so a client sees fewer answers than questions.
pub struct QueryHandler {
    cache: Arc<ResolutionCache>,
    lookup: Arc<dyn ForwardLookup>,
    answer_ttl: u32,
    lookup_timeout: Duration,
    counters: Counters,
}

impl QueryHandler {
    pub fn new(cache: Arc<ResolutionCache>, lookup: Arc<dyn ForwardLookup>) -> Self {
        Self {
            cache,
            lookup,
            answer_ttl: DEFAULT_ANSWER_TTL,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            counters: Counters::default(),
        }
    }

    pub fn with_answer_ttl(mut self, ttl: u32) -> Self {
        self.answer_ttl = ttl;
        self
    }

    /// Upper bound on a single forward lookup. Expiry counts as a failed
    /// resolution.
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn stats(&self) -> HandlerStats {
        HandlerStats {
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            forwarded: self.counters.forwarded.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    #[instrument(level = "debug", skip_all, fields(id = query.header.id))]
    pub async fn handle(&self, query: &Message) -> Message {
        let mut reply = Message::reply_to(query);

        for question in &query.questions {
            if let Some(addr) = self.answer(question).await {
                reply.add_answer(ResourceRecord::a(
                    question.name.clone(),
                    addr,
                    self.answer_ttl,
                ));
            }
        }

        reply
    }

    async fn answer(&self, question: &Question) -> Option<Ipv4Addr> {
        let name = &question.name;

        if question.type_ != RecordType::A {
            debug!(%name, type_ = ?question.type_, "answering with an address record");
        }

        if let Some(addr) = self.cache.lookup(name.as_str()) {
            debug!(%name, %addr, "serving from cache");
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Some(addr);
        }

        let host = name.to_host();
        let lookup = tokio::time::timeout(self.lookup_timeout, self.lookup.lookup(host));
        let result = match lookup.await {
            Ok(result) => result,
            Err(_) => Err(LookupError::Timeout(host.to_owned())),
        };

        match result {
            Ok(addrs) => match addrs.first() {
                Some(addr) => {
                    debug!(%name, %addr, "resolved upstream");
                    self.counters.forwarded.fetch_add(1, Ordering::Relaxed);
                    Some(*addr)
                }
                None => {
                    warn!(%name, "resolution returned no addresses, dropping question");
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
            Err(e) => {
                warn!(%name, error = %e, "resolution failed, dropping question");
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }
}
