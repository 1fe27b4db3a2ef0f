//! Per-connection session state.

use crate::directory::BindObject;
use crate::sasl::SaslContinuation;
use ldapd_core::Entry;
use ldapd_protocol::{LdapError, SearchRequest, SearchResultEntry};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Progress of the BIND operation.
pub enum BindState {
    Idle,
    /// A SASL dialog waiting for the client's next credentials.
    SaslInProgress {
        mechanism: String,
        continuation: Box<dyn SaslContinuation>,
    },
}

impl std::fmt::Debug for BindState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindState::Idle => f.write_str("Idle"),
            BindState::SaslInProgress { mechanism, .. } => f
                .debug_struct("SaslInProgress")
                .field("mechanism", mechanism)
                .finish_non_exhaustive(),
        }
    }
}

/// Lazily evaluated search results.
///
/// Entries are pulled from the directory only as results are requested, so
/// a cursor over an unbounded directory stays cheap until drained.
pub struct SearchCursor {
    request: SearchRequest,
    entries: Box<dyn Iterator<Item = Entry> + Send>,
    pending: Option<SearchResultEntry>,
    returned: u32,
    size_limit: u32,
}

impl SearchCursor {
    /// `size_limit` of 0 means unlimited.
    pub fn new(
        request: SearchRequest,
        entries: Box<dyn Iterator<Item = Entry> + Send>,
        size_limit: u32,
    ) -> Self {
        Self {
            request,
            entries,
            pending: None,
            returned: 0,
            size_limit,
        }
    }

    fn next_match(&mut self) -> Result<Option<SearchResultEntry>, LdapError> {
        if let Some(pending) = self.pending.take() {
            return Ok(Some(pending));
        }
        for entry in self.entries.by_ref() {
            if let Some(result) = entry.search(&self.request)? {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    /// Next matching entry; fails once the size limit would be exceeded.
    pub fn next_result(&mut self) -> Result<Option<SearchResultEntry>, LdapError> {
        let Some(result) = self.next_match()? else {
            return Ok(None);
        };
        if self.size_limit > 0 && self.returned >= self.size_limit {
            return Err(LdapError::SizeLimitExceeded(format!(
                "more than {} entries match",
                self.size_limit
            )));
        }
        self.returned += 1;
        Ok(Some(result))
    }

    /// Whether another matching entry exists. Looks ahead by one entry.
    pub fn has_more(&mut self) -> Result<bool, LdapError> {
        if self.pending.is_none() {
            self.pending = self.next_match()?;
        }
        Ok(self.pending.is_some())
    }

    /// Entries returned so far.
    pub fn returned(&self) -> u32 {
        self.returned
    }
}

/// A paged search suspended between client requests.
pub struct PagedSearch {
    /// BER encoding of the request that created the cursor.
    pub signature: Vec<u8>,
    pub cursor: SearchCursor,
}

/// A client session.
pub struct Session {
    /// Unique session ID.
    pub id: String,

    /// Remote address.
    pub remote_addr: SocketAddr,

    bind_object: BindObject,

    bind_state: BindState,

    /// Transport is TLS protected.
    tls_active: bool,

    /// Identity proven by the transport (client certificate).
    external_identity: Option<String>,

    /// Suspended paged searches by cookie.
    paged_searches: HashMap<Vec<u8>, PagedSearch>,

    next_cookie: u64,

    request_count: u64,

    created_at: Instant,

    last_activity: Instant,
}

impl Session {
    /// Creates a new anonymous session.
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            bind_object: BindObject::Anonymous,
            bind_state: BindState::Idle,
            tls_active: false,
            external_identity: None,
            paged_searches: HashMap::new(),
            next_cookie: 1,
            request_count: 0,
            created_at: Instant::now(),
            last_activity: Instant::now(),
        }
    }

    pub fn bind_object(&self) -> &BindObject {
        &self.bind_object
    }

    pub fn set_bind_object(&mut self, bind_object: BindObject) {
        self.bind_object = bind_object;
    }

    /// Takes the bind state, leaving `Idle`.
    pub fn take_bind_state(&mut self) -> BindState {
        std::mem::replace(&mut self.bind_state, BindState::Idle)
    }

    pub fn set_bind_state(&mut self, state: BindState) {
        self.bind_state = state;
    }

    /// Mechanism of the SASL dialog in progress, if any.
    pub fn sasl_mechanism(&self) -> Option<&str> {
        match &self.bind_state {
            BindState::SaslInProgress { mechanism, .. } => Some(mechanism),
            BindState::Idle => None,
        }
    }

    pub fn is_tls(&self) -> bool {
        self.tls_active
    }

    /// Marks the transport as TLS protected, recording the client
    /// certificate identity if one was presented.
    pub fn set_tls_active(&mut self, external_identity: Option<String>) {
        self.tls_active = true;
        self.external_identity = external_identity;
    }

    pub fn external_identity(&self) -> Option<&str> {
        self.external_identity.as_deref()
    }

    /// Stores a paged search and returns its new cookie.
    pub fn store_paged_search(&mut self, search: PagedSearch) -> Vec<u8> {
        let cookie = self.next_cookie.to_be_bytes().to_vec();
        self.next_cookie += 1;
        self.paged_searches.insert(cookie.clone(), search);
        cookie
    }

    /// Removes and returns the paged search for `cookie`.
    pub fn take_paged_search(&mut self, cookie: &[u8]) -> Option<PagedSearch> {
        self.paged_searches.remove(cookie)
    }

    pub fn paged_search_count(&self) -> usize {
        self.paged_searches.len()
    }

    /// Records a request.
    pub fn record_request(&mut self) {
        self.request_count += 1;
        self.last_activity = Instant::now();
    }

    /// Returns the request count.
    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    /// Returns the time since last activity.
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Returns the session age.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldapd_protocol::{Filter, ResultCode, SearchScope};
    use ldapd_schema::{Dn, Schema};
    use std::net::{IpAddr, Ipv4Addr};

    fn test_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 12345)
    }

    fn entries(n: usize) -> Box<dyn Iterator<Item = Entry> + Send> {
        let schema = Schema::standard().unwrap();
        let all: Vec<Entry> = (0..n)
            .map(|i| {
                let mut entry = Entry::new(
                    &schema,
                    Dn::parse(&format!("cn=e{},dc=example,dc=com", i)).unwrap(),
                );
                entry.attributes_mut().set_text("cn", &[format!("e{}", i)]).unwrap();
                entry
            })
            .collect();
        Box::new(all.into_iter())
    }

    fn request() -> SearchRequest {
        SearchRequest::new(
            "dc=example,dc=com",
            SearchScope::WholeSubtree,
            Filter::present("cn"),
        )
    }

    #[test]
    fn test_session_creation() {
        let session = Session::new(test_addr());
        assert_eq!(session.bind_object(), &BindObject::Anonymous);
        assert!(session.sasl_mechanism().is_none());
        assert!(!session.is_tls());
        assert_eq!(session.request_count(), 0);
    }

    #[test]
    fn test_tls_activation() {
        let mut session = Session::new(test_addr());
        session.set_tls_active(Some("cert:abcd".into()));
        assert!(session.is_tls());
        assert_eq!(session.external_identity(), Some("cert:abcd"));
    }

    #[test]
    fn test_cookies_are_unique() {
        let mut session = Session::new(test_addr());
        let a = session.store_paged_search(PagedSearch {
            signature: vec![1],
            cursor: SearchCursor::new(request(), entries(1), 0),
        });
        let b = session.store_paged_search(PagedSearch {
            signature: vec![1],
            cursor: SearchCursor::new(request(), entries(1), 0),
        });
        assert_ne!(a, b);
        assert_eq!(session.paged_search_count(), 2);
        assert!(session.take_paged_search(&a).is_some());
        assert!(session.take_paged_search(&a).is_none());
        assert_eq!(session.paged_search_count(), 1);
    }

    #[test]
    fn test_cursor_lookahead() {
        let mut cursor = SearchCursor::new(request(), entries(2), 0);
        assert!(cursor.has_more().unwrap());
        assert!(cursor.next_result().unwrap().is_some());
        assert!(cursor.has_more().unwrap());
        assert!(cursor.next_result().unwrap().is_some());
        assert!(!cursor.has_more().unwrap());
        assert!(cursor.next_result().unwrap().is_none());
        assert_eq!(cursor.returned(), 2);
    }

    #[test]
    fn test_cursor_size_limit() {
        let mut cursor = SearchCursor::new(request(), entries(3), 2);
        assert!(cursor.next_result().unwrap().is_some());
        assert!(cursor.next_result().unwrap().is_some());
        let err = cursor.next_result().unwrap_err();
        assert_eq!(err.result_code(), ResultCode::SizeLimitExceeded);

        // Exactly at the limit is fine
        let mut cursor = SearchCursor::new(request(), entries(2), 2);
        assert!(cursor.next_result().unwrap().is_some());
        assert!(cursor.next_result().unwrap().is_some());
        assert!(cursor.next_result().unwrap().is_none());
    }
}
