//! Request handlers.
//!
//! [`RequestHandler::handle`] runs one decoded request to completion and
//! returns every response message it produced. Domain errors become exactly
//! one typed error response; requests without a response type (unbind,
//! abandon) never answer.

use crate::config::Config;
use crate::directory::{BindObject, Directory, EntryIter};
use crate::error::ServerError;
use crate::metrics::Metrics;
use crate::sasl::{self, SaslContext, SaslMechanism, SaslOutcome};
use crate::session::{BindState, PagedSearch, SearchCursor, Session};
use ldapd_core::{Entry, RootDse, FEATURE_ABSOLUTE_FILTERS, FEATURE_ALL_OPERATIONAL_ATTRIBUTES};
use ldapd_protocol::extended::{
    PasswordModifyRequest, PasswordModifyResponse, PASSWORD_MODIFY_OID, STARTTLS_OID, WHOAMI_OID,
};
use ldapd_protocol::message::operation_name;
use ldapd_protocol::{
    encode, BindAuthentication, Control, LdapError, LdapMessage, LdapResult, PagedResults,
    ProtocolOp, ResultCode, SearchRequest, LDAP_VERSION, PAGED_RESULTS_OID,
};
use ldapd_schema::{Dn, Schema};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// DN of the subschema subentry.
pub const SUBSCHEMA_DN: &str = "cn=Subschema";

/// What the connection does after sending the responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    Continue,
    /// Close the connection (UNBIND).
    Close,
    /// Perform the TLS handshake, then continue.
    StartTls,
}

/// Responses to one request.
#[derive(Debug)]
pub struct HandleOutcome {
    pub responses: Vec<LdapMessage>,
    pub action: ConnectionAction,
}

/// Server capabilities and limits.
#[derive(Debug, Clone)]
pub struct HandlerOptions {
    /// Server-side size limit (0 = unlimited).
    pub size_limit: u32,
    /// Suspended paged searches allowed per connection.
    pub max_paged_cursors: usize,
    pub whoami: bool,
    pub password_modify: bool,
    pub paged_results: bool,
    /// StartTLS is offered on plain connections.
    pub starttls_available: bool,
    pub vendor_name: String,
    pub vendor_version: String,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            size_limit: 0,
            max_paged_cursors: 16,
            whoami: true,
            password_modify: true,
            paged_results: true,
            starttls_available: false,
            vendor_name: "ldapd".to_string(),
            vendor_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl HandlerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            size_limit: config.limits.size_limit,
            max_paged_cursors: config.limits.max_paged_cursors,
            whoami: config.features.whoami,
            password_modify: config.features.password_modify,
            paged_results: config.features.paged_results,
            starttls_available: config.tls.enabled && !config.tls.implicit,
            ..Default::default()
        }
    }
}

/// Final response of a request plus its controls.
struct Reply {
    op: ProtocolOp,
    controls: Vec<Control>,
}

impl From<ProtocolOp> for Reply {
    fn from(op: ProtocolOp) -> Self {
        Reply {
            op,
            controls: Vec::new(),
        }
    }
}

/// Request handler.
pub struct RequestHandler {
    schema: Schema,
    directory: Arc<dyn Directory>,
    mechanisms: Vec<Box<dyn SaslMechanism>>,
    options: HandlerOptions,
    subschema: Entry,
    /// Metrics for request tracking.
    metrics: Option<Arc<Metrics>>,
}

impl RequestHandler {
    /// Creates a handler offering the built-in SASL mechanisms.
    pub fn new(schema: Schema, directory: Arc<dyn Directory>) -> Result<Self, ServerError> {
        let subschema = Entry::subschema_subentry(&schema, Dn::parse(SUBSCHEMA_DN)?)?;
        let mechanisms = ["ANONYMOUS", "PLAIN", "EXTERNAL"]
            .into_iter()
            .filter_map(sasl::builtin)
            .collect();
        Ok(Self {
            schema,
            directory,
            mechanisms,
            options: HandlerOptions::default(),
            subschema,
            metrics: None,
        })
    }

    pub fn with_options(mut self, options: HandlerOptions) -> Self {
        self.options = options;
        self
    }

    /// Restricts the SASL mechanisms to the named built-in ones.
    pub fn with_sasl_mechanisms<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.mechanisms = names
            .iter()
            .filter_map(|name| {
                let mechanism = sasl::builtin(name.as_ref());
                if mechanism.is_none() {
                    warn!("Ignoring unknown SASL mechanism '{}'", name.as_ref());
                }
                mechanism
            })
            .collect();
        self
    }

    /// Adds a custom SASL mechanism.
    pub fn with_mechanism(mut self, mechanism: Box<dyn SaslMechanism>) -> Self {
        self.mechanisms.push(mechanism);
        self
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns a reference to the metrics, if set.
    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The root DSE as this session sees it. STARTTLS is withdrawn once the
    /// connection is protected.
    fn root_dse(&self, session: &Session) -> Result<Entry, LdapError> {
        let mut supported_extensions = Vec::new();
        if self.options.starttls_available && !session.is_tls() {
            supported_extensions.push(STARTTLS_OID.to_string());
        }
        if self.options.whoami {
            supported_extensions.push(WHOAMI_OID.to_string());
        }
        if self.options.password_modify {
            supported_extensions.push(PASSWORD_MODIFY_OID.to_string());
        }
        let mut supported_controls = Vec::new();
        if self.options.paged_results {
            supported_controls.push(PAGED_RESULTS_OID.to_string());
        }

        Entry::root_dse(
            &self.schema,
            &RootDse {
                naming_contexts: self.directory.naming_contexts(),
                subschema_subentry: Some(self.subschema.dn().to_string()),
                supported_extensions,
                supported_controls,
                supported_sasl_mechanisms: self
                    .mechanisms
                    .iter()
                    .map(|m| m.name().to_string())
                    .collect(),
                supported_features: vec![
                    FEATURE_ABSOLUTE_FILTERS.to_string(),
                    FEATURE_ALL_OPERATIONAL_ATTRIBUTES.to_string(),
                ],
                vendor_name: Some(self.options.vendor_name.clone()),
                vendor_version: Some(self.options.vendor_version.clone()),
            },
        )
    }

    /// Handles a request and returns its responses.
    pub fn handle(&self, session: &mut Session, message: LdapMessage) -> HandleOutcome {
        session.record_request();

        let op_name = message.op.name();
        let op_tag = message.op.tag();
        let message_id = message.message_id;

        // Start timing for metrics
        let timer = self.metrics.as_ref().map(|m| {
            m.request_duration
                .with_label_values(&[op_name])
                .start_timer()
        });
        if let Some(ref metrics) = self.metrics {
            metrics.requests_total.with_label_values(&[op_name]).inc();
        }
        debug!("[{}] #{} {}", session.remote_addr, message_id, op_name);

        let mut responses = Vec::new();
        let mut action = ConnectionAction::Continue;
        let result = match self.check_controls(&message) {
            Ok(()) => self.dispatch(session, message, &mut responses, &mut action),
            Err(e) => Err(e.into()),
        };

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                if matches!(e, ServerError::Ldap(_)) {
                    debug!(
                        "[{}] #{} {} failed: {}",
                        session.remote_addr, message_id, op_name, e
                    );
                } else {
                    error!(
                        "[{}] #{} {} failed: {}",
                        session.remote_addr, message_id, op_name, e
                    );
                }
                let result = LdapResult::new(e.result_code(), e.diagnostic_message());
                ProtocolOp::response_for(op_tag, result).map(Reply::from)
            }
        };

        if let Some(reply) = reply {
            if let (Some(metrics), Some(result)) = (&self.metrics, reply.op.result()) {
                metrics
                    .results_total
                    .with_label_values(&[result.result_code.name()])
                    .inc();
            }
            responses.push(LdapMessage::new(message_id, reply.op).with_controls(reply.controls));
        }

        drop(timer); // Observation happens on drop
        HandleOutcome { responses, action }
    }

    /// Rejects requests carrying critical controls no handler understands.
    fn check_controls(&self, message: &LdapMessage) -> Result<(), LdapError> {
        for control in &message.controls {
            let understood = control.control_type == PAGED_RESULTS_OID
                && self.options.paged_results
                && matches!(message.op, ProtocolOp::SearchRequest(_));
            if control.criticality && !understood {
                return Err(LdapError::UnavailableCriticalExtension(format!(
                    "unsupported critical control {}",
                    control.control_type
                )));
            }
        }
        Ok(())
    }

    fn dispatch(
        &self,
        session: &mut Session,
        message: LdapMessage,
        responses: &mut Vec<LdapMessage>,
        action: &mut ConnectionAction,
    ) -> Result<Option<Reply>, ServerError> {
        let message_id = message.message_id;
        let controls = message.controls;
        let reply = match message.op {
            ProtocolOp::BindRequest {
                version,
                name,
                authentication,
            } => self.handle_bind(session, version, &name, authentication)?,
            ProtocolOp::UnbindRequest => {
                info!("[{}] Unbind", session.remote_addr);
                *action = ConnectionAction::Close;
                return Ok(None);
            }
            ProtocolOp::SearchRequest(request) => {
                self.handle_search(session, message_id, request, &controls, responses)?
            }
            ProtocolOp::CompareRequest {
                entry,
                attribute,
                value,
            } => self.handle_compare(session, &entry, &attribute, &value)?,
            ProtocolOp::ExtendedRequest { name, value } => {
                self.handle_extended(session, &name, value.as_deref(), action)?
            }
            ProtocolOp::AddRequest { entry, attributes } => {
                self.directory.do_add(&Dn::parse(&entry)?, &attributes)?;
                ProtocolOp::AddResponse(LdapResult::success()).into()
            }
            ProtocolOp::DelRequest(entry) => {
                self.directory.do_delete(&Dn::parse(&entry)?)?;
                ProtocolOp::DelResponse(LdapResult::success()).into()
            }
            ProtocolOp::ModifyRequest { object, changes } => {
                self.directory.do_modify(&Dn::parse(&object)?, &changes)?;
                ProtocolOp::ModifyResponse(LdapResult::success()).into()
            }
            ProtocolOp::ModifyDnRequest {
                entry,
                new_rdn,
                delete_old_rdn,
                new_superior,
            } => {
                let new_superior = new_superior.as_deref().map(Dn::parse).transpose()?;
                self.directory.do_modify_dn(
                    &Dn::parse(&entry)?,
                    &new_rdn,
                    delete_old_rdn,
                    new_superior.as_ref(),
                )?;
                ProtocolOp::ModifyDnResponse(LdapResult::success()).into()
            }
            ProtocolOp::AbandonRequest(target) => {
                // Requests run to completion before the next one is read, so
                // there is never anything left to abandon.
                debug!("[{}] Abandon #{} ignored", session.remote_addr, target);
                return Ok(None);
            }
            other => {
                warn!(
                    "[{}] #{} Dropping unexpected {} from client",
                    session.remote_addr,
                    message_id,
                    other.name()
                );
                return Ok(None);
            }
        };
        Ok(Some(reply))
    }

    fn record_bind(&self, method: &str, outcome: &str) {
        if let Some(ref metrics) = self.metrics {
            metrics
                .binds_total
                .with_label_values(&[method, outcome])
                .inc();
        }
    }

    fn handle_bind(
        &self,
        session: &mut Session,
        version: i64,
        name: &str,
        authentication: BindAuthentication,
    ) -> Result<Reply, ServerError> {
        // Any bind resets the connection to anonymous first
        let previous = session.take_bind_state();
        session.set_bind_object(BindObject::Anonymous);

        if version != LDAP_VERSION {
            return Err(LdapError::ProtocolError(format!(
                "unsupported LDAP version {}",
                version
            ))
            .into());
        }

        match authentication {
            BindAuthentication::Simple(password) => {
                if let BindState::SaslInProgress { mechanism, .. } = &previous {
                    warn!(
                        "[{}] Simple bind aborts SASL {} dialog",
                        session.remote_addr, mechanism
                    );
                }
                let result = if name.is_empty() && password.is_empty() {
                    self.directory.do_bind_simple_anonymous()
                } else if password.is_empty() {
                    self.directory.do_bind_simple_unauthenticated(name)
                } else {
                    self.directory.do_bind_simple_authenticated(name, &password)
                };
                let bind = result.inspect_err(|_| self.record_bind("simple", "failure"))?;
                self.record_bind("simple", "success");
                info!(
                    "[{}] Bound as '{}' (simple)",
                    session.remote_addr,
                    bind.authz_id()
                );
                session.set_bind_object(bind);
                Ok(ProtocolOp::BindResponse {
                    result: LdapResult::success(),
                    server_sasl_creds: None,
                }
                .into())
            }
            BindAuthentication::Sasl {
                mechanism,
                credentials,
            } => self.handle_sasl_bind(session, previous, mechanism, credentials.as_deref()),
        }
    }

    fn handle_sasl_bind(
        &self,
        session: &mut Session,
        previous: BindState,
        mechanism: String,
        credentials: Option<&[u8]>,
    ) -> Result<Reply, ServerError> {
        let ctx = SaslContext {
            directory: self.directory.as_ref(),
            external_identity: session.external_identity(),
        };
        let outcome = match previous {
            BindState::SaslInProgress {
                mechanism: current,
                continuation,
            } if current.eq_ignore_ascii_case(&mechanism) => continuation.step(&ctx, credentials),
            previous => {
                if let BindState::SaslInProgress { mechanism: current, .. } = previous {
                    warn!(
                        "[{}] SASL {} aborts {} dialog",
                        session.remote_addr, mechanism, current
                    );
                }
                let handler = self
                    .mechanisms
                    .iter()
                    .find(|m| m.name().eq_ignore_ascii_case(&mechanism))
                    .ok_or_else(|| {
                        LdapError::AuthMethodNotSupported(format!(
                            "SASL mechanism {} is not supported",
                            mechanism
                        ))
                    })?;
                handler.start(&ctx, credentials)
            }
        };

        let method = format!("sasl_{}", mechanism.to_ascii_lowercase());
        match outcome.inspect_err(|_| self.record_bind(&method, "failure"))? {
            SaslOutcome::Complete { bind, server_data } => {
                self.record_bind(&method, "success");
                info!(
                    "[{}] Bound as '{}' (SASL {})",
                    session.remote_addr,
                    bind.authz_id(),
                    mechanism
                );
                session.set_bind_object(bind);
                Ok(ProtocolOp::BindResponse {
                    result: LdapResult::success(),
                    server_sasl_creds: server_data,
                }
                .into())
            }
            SaslOutcome::Challenge { data, continuation } => {
                debug!("[{}] SASL {} challenge", session.remote_addr, mechanism);
                session.set_bind_state(BindState::SaslInProgress {
                    mechanism,
                    continuation,
                });
                Ok(ProtocolOp::BindResponse {
                    result: LdapResult::new(ResultCode::SaslBindInProgress, ""),
                    server_sasl_creds: Some(data),
                }
                .into())
            }
        }
    }

    /// Entries a search looks at: the root DSE and subschema subentry when
    /// the request could name them, then whatever the directory offers.
    fn candidates(
        &self,
        session: &Session,
        base: &Dn,
        request: &SearchRequest,
    ) -> Result<EntryIter, LdapError> {
        let mut special = Vec::new();
        if base.is_root() {
            special.push(self.root_dse(session)?);
        }
        if self.subschema.match_search(base, request.scope, &request.filter) {
            special.push(self.subschema.clone());
        }
        let entries = self
            .directory
            .do_search(base, request.scope, &request.filter)?;
        Ok(Box::new(special.into_iter().chain(entries)))
    }

    /// Effective size limit; 0 means unlimited on either side.
    fn size_limit(&self, requested: u32) -> u32 {
        match (requested, self.options.size_limit) {
            (0, server) => server,
            (client, 0) => client,
            (client, server) => client.min(server),
        }
    }

    /// Sends up to `max` entries from the cursor.
    fn drain(
        &self,
        message_id: i32,
        cursor: &mut SearchCursor,
        max: Option<u32>,
        responses: &mut Vec<LdapMessage>,
    ) -> Result<(), LdapError> {
        let mut sent = 0u32;
        while max.map_or(true, |max| sent < max) {
            let Some(entry) = cursor.next_result()? else {
                break;
            };
            responses.push(LdapMessage::new(
                message_id,
                ProtocolOp::SearchResultEntry(entry),
            ));
            sent += 1;
            if let Some(ref metrics) = self.metrics {
                metrics.search_entries_total.inc();
            }
        }
        Ok(())
    }

    fn handle_search(
        &self,
        session: &mut Session,
        message_id: i32,
        request: SearchRequest,
        controls: &[Control],
        responses: &mut Vec<LdapMessage>,
    ) -> Result<Reply, ServerError> {
        let paged = controls
            .iter()
            .find(|c| c.control_type == PAGED_RESULTS_OID)
            .filter(|_| self.options.paged_results);
        if let Some(control) = paged {
            let page = PagedResults::from_control(control)
                .map_err(|e| LdapError::ProtocolError(e.to_string()))?;
            return self.handle_paged_search(session, message_id, request, page, responses);
        }

        let base = Dn::parse(&request.base_object)?;
        let entries = self.candidates(session, &base, &request)?;
        let size_limit = self.size_limit(request.size_limit);
        let mut cursor = SearchCursor::new(request, entries, size_limit);
        self.drain(message_id, &mut cursor, None, responses)?;
        debug!(
            "[{}] #{} search returned {} entries",
            session.remote_addr,
            message_id,
            cursor.returned()
        );
        Ok(ProtocolOp::SearchResultDone(LdapResult::success()).into())
    }

    fn handle_paged_search(
        &self,
        session: &mut Session,
        message_id: i32,
        request: SearchRequest,
        page: PagedResults,
        responses: &mut Vec<LdapMessage>,
    ) -> Result<Reply, ServerError> {
        let signature =
            encode(&LdapMessage::new(0, ProtocolOp::SearchRequest(request.clone()))).to_vec();

        let mut search = if page.cookie.is_empty() {
            if page.size == 0 {
                return Ok(paged_done(Vec::new()));
            }
            if session.paged_search_count() >= self.options.max_paged_cursors {
                return Err(LdapError::AdminLimitExceeded(format!(
                    "at most {} paged searches per connection",
                    self.options.max_paged_cursors
                ))
                .into());
            }
            let base = Dn::parse(&request.base_object)?;
            let entries = self.candidates(session, &base, &request)?;
            let size_limit = self.size_limit(request.size_limit);
            PagedSearch {
                signature,
                cursor: SearchCursor::new(request, entries, size_limit),
            }
        } else {
            let search = session.take_paged_search(&page.cookie).ok_or_else(|| {
                LdapError::UnwillingToPerform("unknown paged results cookie".to_string())
            })?;
            if let Some(ref metrics) = self.metrics {
                metrics.paged_cursors_active.dec();
            }
            if search.signature != signature {
                return Err(LdapError::UnwillingToPerform(
                    "search parameters changed between pages".to_string(),
                )
                .into());
            }
            if page.size == 0 {
                debug!("[{}] #{} paged search cancelled", session.remote_addr, message_id);
                return Ok(paged_done(Vec::new()));
            }
            search
        };

        self.drain(message_id, &mut search.cursor, Some(page.size), responses)?;
        let cookie = if search.cursor.has_more()? {
            if let Some(ref metrics) = self.metrics {
                metrics.paged_cursors_active.inc();
            }
            session.store_paged_search(search)
        } else {
            Vec::new()
        };
        Ok(paged_done(cookie))
    }

    fn handle_compare(
        &self,
        session: &Session,
        entry: &str,
        attribute: &str,
        value: &[u8],
    ) -> Result<Reply, ServerError> {
        let dn = Dn::parse(entry)?;
        let matched = if dn.is_root() {
            self.root_dse(session)?.compare(&dn, attribute, value)?
        } else if dn == *self.subschema.dn() {
            self.subschema.compare(&dn, attribute, value)?
        } else {
            match self.directory.do_compare(&dn, attribute, value)? {
                Some(found) => found.compare(&dn, attribute, value)?,
                None => return Err(LdapError::NoSuchObject(dn.to_string()).into()),
            }
        };
        let code = if matched {
            ResultCode::CompareTrue
        } else {
            ResultCode::CompareFalse
        };
        Ok(ProtocolOp::CompareResponse(LdapResult::new(code, "")).into())
    }

    fn handle_extended(
        &self,
        session: &mut Session,
        name: &str,
        value: Option<&[u8]>,
        action: &mut ConnectionAction,
    ) -> Result<Reply, ServerError> {
        match name {
            STARTTLS_OID if self.options.starttls_available => {
                if session.is_tls() {
                    return Err(
                        LdapError::OperationsError("TLS already established".to_string()).into(),
                    );
                }
                self.directory.do_starttls()?;
                *action = ConnectionAction::StartTls;
                Ok(ProtocolOp::ExtendedResponse {
                    result: LdapResult::success(),
                    name: Some(STARTTLS_OID.to_string()),
                    value: None,
                }
                .into())
            }
            WHOAMI_OID if self.options.whoami => {
                let authz_id = self.directory.do_whoami(session.bind_object())?;
                Ok(ProtocolOp::ExtendedResponse {
                    result: LdapResult::success(),
                    name: None,
                    value: Some(authz_id.into_bytes()),
                }
                .into())
            }
            PASSWORD_MODIFY_OID if self.options.password_modify => {
                let request = PasswordModifyRequest::decode(value)
                    .map_err(|e| LdapError::ProtocolError(e.to_string()))?;
                let user = request
                    .user_identity
                    .map(String::from_utf8)
                    .transpose()
                    .map_err(|_| LdapError::ProtocolError("userIdentity is not UTF-8".to_string()))?;
                let generated = self.directory.do_password_modify(
                    session.bind_object(),
                    user.as_deref(),
                    request.old_password.as_deref(),
                    request.new_password.as_deref(),
                )?;
                let value = generated.map(|password| {
                    PasswordModifyResponse {
                        generated_password: Some(password),
                    }
                    .encode()
                });
                Ok(ProtocolOp::ExtendedResponse {
                    result: LdapResult::success(),
                    name: None,
                    value,
                }
                .into())
            }
            other => Err(LdapError::ProtocolError(format!(
                "unsupported extended operation {}",
                other
            ))
            .into()),
        }
    }

    /// Response to a request that decoded only partially, if its operation
    /// has a response type.
    pub fn invalid_message_response(
        &self,
        message_id: Option<i32>,
        op_tag: Option<u8>,
        reason: &str,
    ) -> Option<LdapMessage> {
        let op_tag = op_tag?;
        let message_id = message_id?;
        let op = ProtocolOp::response_for(
            op_tag,
            LdapResult::new(ResultCode::ProtocolError, reason),
        )?;
        if let Some(ref metrics) = self.metrics {
            metrics
                .requests_total
                .with_label_values(&[operation_name(op_tag)])
                .inc();
            metrics
                .results_total
                .with_label_values(&[ResultCode::ProtocolError.name()])
                .inc();
        }
        Some(LdapMessage::new(message_id, op))
    }
}

fn paged_done(cookie: Vec<u8>) -> Reply {
    Reply {
        op: ProtocolOp::SearchResultDone(LdapResult::success()),
        controls: vec![PagedResults::new(0, cookie).into_control()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldapd_protocol::{Filter, SearchScope};
    use parking_lot::Mutex;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    struct TestDirectory {
        entries: Vec<Entry>,
        plain_calls: Mutex<Vec<(String, String, Option<String>)>>,
    }

    impl TestDirectory {
        fn new(schema: &Schema, extra: usize) -> Self {
            let mut entries = Vec::new();
            let mut test = Entry::new(schema, Dn::parse("cn=test,dc=example,dc=com").unwrap());
            test.attributes_mut().set_text("objectClass", &["top", "person"]).unwrap();
            test.attributes_mut().set_text("cn", &["Test"]).unwrap();
            test.attributes_mut().set_text("sn", &["Tester"]).unwrap();
            entries.push(test);
            for i in 0..extra {
                let mut entry = Entry::new(
                    schema,
                    Dn::parse(&format!("cn=e{},dc=example,dc=com", i)).unwrap(),
                );
                entry.attributes_mut().set_text("cn", &[format!("e{}", i)]).unwrap();
                entries.push(entry);
            }
            Self {
                entries,
                plain_calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl Directory for TestDirectory {
        fn naming_contexts(&self) -> Vec<String> {
            vec!["dc=example,dc=com".to_string()]
        }

        fn do_search(
            &self,
            _base: &Dn,
            _scope: SearchScope,
            _filter: &Filter,
        ) -> Result<EntryIter, LdapError> {
            Ok(Box::new(self.entries.clone().into_iter()))
        }

        fn do_compare(&self, dn: &Dn, _attribute: &str, _value: &[u8]) -> Result<Option<Entry>, LdapError> {
            Ok(self.entries.iter().find(|e| e.dn() == dn).cloned())
        }

        fn do_bind_sasl_plain(
            &self,
            authcid: &str,
            password: &str,
            authzid: Option<&str>,
        ) -> Result<BindObject, LdapError> {
            self.plain_calls.lock().push((
                authcid.to_string(),
                password.to_string(),
                authzid.map(str::to_string),
            ));
            if password == "password" {
                Ok(BindObject::External(authcid.to_string()))
            } else {
                Err(LdapError::InvalidCredentials("bad password".into()))
            }
        }
    }

    fn setup(extra: usize, options: HandlerOptions) -> (RequestHandler, Arc<TestDirectory>) {
        let schema = Schema::standard().unwrap();
        let directory = Arc::new(TestDirectory::new(&schema, extra));
        let handler = RequestHandler::new(schema, directory.clone())
            .unwrap()
            .with_options(options);
        (handler, directory)
    }

    fn session() -> Session {
        Session::new(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000))
    }

    fn search(id: i32, base: &str, scope: SearchScope, filter: &str) -> LdapMessage {
        LdapMessage::new(
            id,
            ProtocolOp::SearchRequest(SearchRequest::new(base, scope, filter.parse().unwrap())),
        )
    }

    fn paged(message: LdapMessage, size: u32, cookie: &[u8]) -> LdapMessage {
        message.with_controls(vec![PagedResults::new(size, cookie.to_vec()).into_control()])
    }

    fn bind(id: i32, name: &str, authentication: BindAuthentication) -> LdapMessage {
        LdapMessage::new(
            id,
            ProtocolOp::BindRequest {
                version: 3,
                name: name.to_string(),
                authentication,
            },
        )
    }

    fn sasl(mechanism: &str, credentials: Option<&[u8]>) -> BindAuthentication {
        BindAuthentication::Sasl {
            mechanism: mechanism.to_string(),
            credentials: credentials.map(|c| c.to_vec()),
        }
    }

    fn extended(id: i32, name: &str, value: Option<Vec<u8>>) -> LdapMessage {
        LdapMessage::new(
            id,
            ProtocolOp::ExtendedRequest {
                name: name.to_string(),
                value,
            },
        )
    }

    fn code(outcome: &HandleOutcome) -> ResultCode {
        outcome
            .responses
            .last()
            .and_then(|m| m.op.result())
            .map(|r| r.result_code)
            .unwrap()
    }

    fn entry_names(outcome: &HandleOutcome) -> Vec<String> {
        outcome
            .responses
            .iter()
            .filter_map(|m| match &m.op {
                ProtocolOp::SearchResultEntry(e) => Some(e.object_name.clone()),
                _ => None,
            })
            .collect()
    }

    fn cookie(outcome: &HandleOutcome) -> Vec<u8> {
        let done = outcome.responses.last().unwrap();
        PagedResults::from_control(done.control(PAGED_RESULTS_OID).unwrap())
            .unwrap()
            .cookie
    }

    #[test]
    fn test_search_case_insensitive_equality() {
        let (handler, _) = setup(0, HandlerOptions::default());
        let mut session = session();
        let outcome = handler.handle(
            &mut session,
            search(1, "dc=example,dc=com", SearchScope::WholeSubtree, "(cn=test)"),
        );
        assert_eq!(entry_names(&outcome), vec!["cn=test,dc=example,dc=com"]);
        assert_eq!(code(&outcome), ResultCode::Success);
        assert!(outcome.responses.iter().all(|m| m.message_id == 1));
        assert_eq!(outcome.action, ConnectionAction::Continue);
    }

    #[test]
    fn test_search_empty_and_matches_scope() {
        let (handler, _) = setup(2, HandlerOptions::default());
        let mut session = session();
        let mut request =
            SearchRequest::new("dc=example,dc=com", SearchScope::SingleLevel, Filter::And(vec![]));
        request.attributes = vec!["1.1".to_string()];
        let outcome = handler.handle(
            &mut session,
            LdapMessage::new(2, ProtocolOp::SearchRequest(request)),
        );
        assert_eq!(entry_names(&outcome).len(), 3);

        let outcome = handler.handle(
            &mut session,
            search(3, "cn=e0,dc=example,dc=com", SearchScope::BaseObject, "(&)"),
        );
        assert_eq!(entry_names(&outcome), vec!["cn=e0,dc=example,dc=com"]);
    }

    #[test]
    fn test_search_invalid_base() {
        let (handler, _) = setup(0, HandlerOptions::default());
        let outcome = handler.handle(
            &mut session(),
            search(1, "not a dn", SearchScope::WholeSubtree, "(cn=*)"),
        );
        assert_eq!(outcome.responses.len(), 1);
        assert_eq!(code(&outcome), ResultCode::InvalidDnSyntax);
    }

    #[test]
    fn test_size_limit_keeps_sent_entries() {
        let options = HandlerOptions {
            size_limit: 2,
            ..Default::default()
        };
        let (handler, _) = setup(4, options);
        let outcome = handler.handle(
            &mut session(),
            search(1, "dc=example,dc=com", SearchScope::WholeSubtree, "(cn=e*)"),
        );
        assert_eq!(entry_names(&outcome).len(), 2);
        assert_eq!(code(&outcome), ResultCode::SizeLimitExceeded);
    }

    #[test]
    fn test_compare() {
        let (handler, _) = setup(0, HandlerOptions::default());
        let mut session = session();
        let compare = |dn: &str, value: &[u8]| {
            LdapMessage::new(
                1,
                ProtocolOp::CompareRequest {
                    entry: dn.to_string(),
                    attribute: "cn".to_string(),
                    value: value.to_vec(),
                },
            )
        };

        let outcome = handler.handle(&mut session, compare("cn=missing,dc=example,dc=com", b"x"));
        assert_eq!(code(&outcome), ResultCode::NoSuchObject);
        let outcome = handler.handle(&mut session, compare("cn=test,dc=example,dc=com", b"Test"));
        assert_eq!(code(&outcome), ResultCode::CompareTrue);
        let outcome = handler.handle(&mut session, compare("cn=test,dc=example,dc=com", b"Nope"));
        assert_eq!(code(&outcome), ResultCode::CompareFalse);
        assert!(matches!(
            outcome.responses[0].op,
            ProtocolOp::CompareResponse(_)
        ));
    }

    #[test]
    fn test_simple_bind_defaults() {
        let (handler, _) = setup(0, HandlerOptions::default());
        let mut session = session();

        let outcome = handler.handle(&mut session, bind(1, "", BindAuthentication::Simple(vec![])));
        assert_eq!(code(&outcome), ResultCode::Success);
        assert!(session.bind_object().is_anonymous());

        let outcome = handler.handle(
            &mut session,
            bind(2, "cn=test,dc=example,dc=com", BindAuthentication::Simple(vec![])),
        );
        assert_eq!(code(&outcome), ResultCode::InvalidCredentials);
        assert!(matches!(
            outcome.responses[0].op,
            ProtocolOp::BindResponse { .. }
        ));
        assert!(session.bind_object().is_anonymous());
    }

    #[test]
    fn test_bind_version_2_rejected() {
        let (handler, _) = setup(0, HandlerOptions::default());
        let mut message = bind(1, "", BindAuthentication::Simple(vec![]));
        if let ProtocolOp::BindRequest { version, .. } = &mut message.op {
            *version = 2;
        }
        let outcome = handler.handle(&mut session(), message);
        assert_eq!(code(&outcome), ResultCode::ProtocolError);
    }

    #[test]
    fn test_sasl_plain_bind() {
        let (handler, directory) = setup(0, HandlerOptions::default());
        let mut session = session();

        let outcome = handler.handle(
            &mut session,
            bind(1, "", sasl("PLAIN", Some(b"authzid\0authcid\0password"))),
        );
        assert_eq!(code(&outcome), ResultCode::Success);
        assert_eq!(
            *directory.plain_calls.lock(),
            vec![(
                "authcid".to_string(),
                "password".to_string(),
                Some("authzid".to_string())
            )]
        );
        assert_eq!(session.bind_object().authz_id(), "u:authcid");

        let outcome = handler.handle(&mut session, bind(2, "", sasl("PLAIN", Some(b"no-separators"))));
        assert_eq!(code(&outcome), ResultCode::ProtocolError);
        assert_eq!(directory.plain_calls.lock().len(), 1);
        assert!(session.bind_object().is_anonymous());
    }

    #[test]
    fn test_sasl_multi_round() {
        let (handler, directory) = setup(0, HandlerOptions::default());
        let mut session = session();

        let outcome = handler.handle(&mut session, bind(1, "", sasl("PLAIN", None)));
        assert_eq!(code(&outcome), ResultCode::SaslBindInProgress);
        assert!(matches!(
            &outcome.responses[0].op,
            ProtocolOp::BindResponse { server_sasl_creds: Some(c), .. } if c.is_empty()
        ));
        assert_eq!(session.sasl_mechanism(), Some("PLAIN"));

        let outcome = handler.handle(&mut session, bind(2, "", sasl("PLAIN", Some(b"\0bob\0password"))));
        assert_eq!(code(&outcome), ResultCode::Success);
        assert!(session.sasl_mechanism().is_none());
        assert_eq!(directory.plain_calls.lock().len(), 1);
    }

    #[test]
    fn test_sasl_dialog_aborted() {
        let (handler, directory) = setup(0, HandlerOptions::default());
        let mut session = session();

        handler.handle(&mut session, bind(1, "", sasl("PLAIN", None)));
        let outcome = handler.handle(&mut session, bind(2, "", BindAuthentication::Simple(vec![])));
        assert_eq!(code(&outcome), ResultCode::Success);
        assert!(session.sasl_mechanism().is_none());

        handler.handle(&mut session, bind(3, "", sasl("PLAIN", None)));
        let outcome = handler.handle(&mut session, bind(4, "", sasl("ANONYMOUS", None)));
        // The default directory refuses SASL ANONYMOUS; the PLAIN dialog is gone either way
        assert_eq!(code(&outcome), ResultCode::AuthMethodNotSupported);
        assert!(session.sasl_mechanism().is_none());
        assert!(directory.plain_calls.lock().is_empty());

        let outcome = handler.handle(&mut session, bind(5, "", sasl("GSSAPI", None)));
        assert_eq!(code(&outcome), ResultCode::AuthMethodNotSupported);
    }

    #[test]
    fn test_paged_search_pages() {
        let (handler, _) = setup(5, HandlerOptions::default());
        let mut session = session();
        let request = || search(1, "dc=example,dc=com", SearchScope::WholeSubtree, "(cn=e*)");

        let mut names = Vec::new();
        let mut cookies = Vec::new();
        let mut current = Vec::new();
        let mut pages = 0;
        loop {
            let outcome = handler.handle(&mut session, paged(request(), 2, &current));
            assert_eq!(code(&outcome), ResultCode::Success);
            pages += 1;
            names.extend(entry_names(&outcome));
            current = cookie(&outcome);
            if current.is_empty() {
                break;
            }
            cookies.push(current.clone());
        }
        assert_eq!(pages, 3);
        assert_eq!(names.len(), 5);
        assert_eq!(cookies.len(), 2);
        assert_ne!(cookies[0], cookies[1]);
        assert_eq!(session.paged_search_count(), 0);
    }

    #[test]
    fn test_paged_search_exact_multiple() {
        let (handler, _) = setup(4, HandlerOptions::default());
        let mut session = session();
        let request = || search(1, "dc=example,dc=com", SearchScope::WholeSubtree, "(cn=e*)");

        let first = handler.handle(&mut session, paged(request(), 2, b""));
        let second = handler.handle(&mut session, paged(request(), 2, &cookie(&first)));
        assert_eq!(entry_names(&second).len(), 2);
        assert!(cookie(&second).is_empty());
    }

    #[test]
    fn test_paged_search_changed_parameters() {
        let (handler, _) = setup(5, HandlerOptions::default());
        let mut session = session();
        let first = handler.handle(
            &mut session,
            paged(search(1, "dc=example,dc=com", SearchScope::WholeSubtree, "(cn=e*)"), 2, b""),
        );
        let outcome = handler.handle(
            &mut session,
            paged(
                search(2, "dc=example,dc=com", SearchScope::WholeSubtree, "(cn=e1)"),
                2,
                &cookie(&first),
            ),
        );
        assert_eq!(code(&outcome), ResultCode::UnwillingToPerform);
        assert!(entry_names(&outcome).is_empty());

        let outcome = handler.handle(
            &mut session,
            paged(search(3, "dc=example,dc=com", SearchScope::WholeSubtree, "(cn=e*)"), 2, b"bogus"),
        );
        assert_eq!(code(&outcome), ResultCode::UnwillingToPerform);
    }

    #[test]
    fn test_paged_search_cancel() {
        let (handler, _) = setup(5, HandlerOptions::default());
        let mut session = session();
        let request = || search(1, "dc=example,dc=com", SearchScope::WholeSubtree, "(cn=e*)");

        let first = handler.handle(&mut session, paged(request(), 2, b""));
        assert_eq!(session.paged_search_count(), 1);
        let outcome = handler.handle(&mut session, paged(request(), 0, &cookie(&first)));
        assert_eq!(code(&outcome), ResultCode::Success);
        assert!(entry_names(&outcome).is_empty());
        assert!(cookie(&outcome).is_empty());
        assert_eq!(session.paged_search_count(), 0);
    }

    #[test]
    fn test_paged_search_size_limit_spans_pages() {
        let (handler, _) = setup(5, HandlerOptions::default());
        let mut session = session();
        let request = || {
            let mut request =
                SearchRequest::new("dc=example,dc=com", SearchScope::WholeSubtree, Filter::present("cn"));
            request.filter = "(cn=e*)".parse().unwrap();
            request.size_limit = 3;
            LdapMessage::new(1, ProtocolOp::SearchRequest(request))
        };

        let first = handler.handle(&mut session, paged(request(), 2, b""));
        assert_eq!(entry_names(&first).len(), 2);
        let second = handler.handle(&mut session, paged(request(), 2, &cookie(&first)));
        assert_eq!(entry_names(&second).len(), 1);
        assert_eq!(code(&second), ResultCode::SizeLimitExceeded);
    }

    #[test]
    fn test_paged_cursor_limit() {
        let options = HandlerOptions {
            max_paged_cursors: 1,
            ..Default::default()
        };
        let (handler, _) = setup(5, options);
        let mut session = session();
        let request = || search(1, "dc=example,dc=com", SearchScope::WholeSubtree, "(cn=e*)");

        handler.handle(&mut session, paged(request(), 2, b""));
        let outcome = handler.handle(&mut session, paged(request(), 2, b""));
        assert_eq!(code(&outcome), ResultCode::AdminLimitExceeded);
    }

    #[test]
    fn test_critical_controls() {
        let (handler, _) = setup(0, HandlerOptions::default());
        let mut session = session();
        let control = |criticality| Control {
            control_type: "1.2.3.4".to_string(),
            criticality,
            value: None,
        };

        let message = search(1, "dc=example,dc=com", SearchScope::WholeSubtree, "(cn=test)")
            .with_controls(vec![control(true)]);
        let outcome = handler.handle(&mut session, message);
        assert_eq!(outcome.responses.len(), 1);
        assert_eq!(code(&outcome), ResultCode::UnavailableCriticalExtension);

        let message = search(2, "dc=example,dc=com", SearchScope::WholeSubtree, "(cn=test)")
            .with_controls(vec![control(false)]);
        let outcome = handler.handle(&mut session, message);
        assert_eq!(entry_names(&outcome).len(), 1);
        assert_eq!(code(&outcome), ResultCode::Success);

        // Paged results is only understood on searches
        let mut critical_paging = PagedResults::new(2, Vec::new()).into_control();
        critical_paging.criticality = true;
        let message = extended(3, WHOAMI_OID, None).with_controls(vec![critical_paging]);
        let outcome = handler.handle(&mut session, message);
        assert_eq!(code(&outcome), ResultCode::UnavailableCriticalExtension);
    }

    #[test]
    fn test_whoami() {
        let (handler, _) = setup(0, HandlerOptions::default());
        let mut session = session();
        let whoami = |outcome: &HandleOutcome| match &outcome.responses[0].op {
            ProtocolOp::ExtendedResponse { value, .. } => value.clone().unwrap(),
            other => panic!("unexpected {:?}", other),
        };

        let outcome = handler.handle(&mut session, extended(1, WHOAMI_OID, None));
        assert_eq!(whoami(&outcome), b"");

        handler.handle(
            &mut session,
            bind(2, "", sasl("PLAIN", Some(b"\0alice\0password"))),
        );
        let outcome = handler.handle(&mut session, extended(3, WHOAMI_OID, None));
        assert_eq!(whoami(&outcome), b"u:alice");
    }

    #[test]
    fn test_password_modify_unsupported_by_default() {
        let (handler, _) = setup(0, HandlerOptions::default());
        let request = PasswordModifyRequest {
            new_password: Some(b"secret".to_vec()),
            ..Default::default()
        };
        let outcome = handler.handle(
            &mut session(),
            extended(1, PASSWORD_MODIFY_OID, Some(request.encode())),
        );
        assert_eq!(code(&outcome), ResultCode::UnwillingToPerform);

        let outcome = handler.handle(
            &mut session(),
            extended(2, PASSWORD_MODIFY_OID, Some(vec![0xff, 0x00])),
        );
        assert_eq!(code(&outcome), ResultCode::ProtocolError);
    }

    #[test]
    fn test_unknown_extended_operation() {
        let (handler, _) = setup(0, HandlerOptions::default());
        let outcome = handler.handle(&mut session(), extended(1, "1.2.3.4.5", None));
        assert_eq!(code(&outcome), ResultCode::ProtocolError);

        // Disabled features look unknown
        let options = HandlerOptions {
            whoami: false,
            ..Default::default()
        };
        let (handler, _) = setup(0, options);
        let outcome = handler.handle(&mut session(), extended(1, WHOAMI_OID, None));
        assert_eq!(code(&outcome), ResultCode::ProtocolError);
    }

    #[test]
    fn test_root_dse_withdraws_starttls() {
        let options = HandlerOptions {
            starttls_available: true,
            ..Default::default()
        };
        let (handler, _) = setup(0, options);
        let mut session = session();
        let root_dse = |handler: &RequestHandler, session: &mut Session| {
            let mut request =
                SearchRequest::new("", SearchScope::BaseObject, Filter::present("objectClass"));
            request.attributes = vec!["+".to_string()];
            let outcome = handler.handle(session, LdapMessage::new(1, ProtocolOp::SearchRequest(request)));
            match &outcome.responses[0].op {
                ProtocolOp::SearchResultEntry(entry) => entry.clone(),
                other => panic!("unexpected {:?}", other),
            }
        };

        let entry = root_dse(&handler, &mut session);
        let extensions = entry.values("supportedExtension").unwrap();
        assert!(extensions.contains(&STARTTLS_OID.as_bytes().to_vec()));
        assert!(extensions.contains(&WHOAMI_OID.as_bytes().to_vec()));
        assert_eq!(
            entry.values("supportedControl").unwrap(),
            &[PAGED_RESULTS_OID.as_bytes().to_vec()]
        );
        assert_eq!(entry.values("supportedSASLMechanisms").unwrap().len(), 3);
        assert_eq!(
            entry.values("namingContexts").unwrap(),
            &[b"dc=example,dc=com".to_vec()]
        );

        let outcome = handler.handle(&mut session, extended(2, STARTTLS_OID, None));
        assert_eq!(code(&outcome), ResultCode::Success);
        assert_eq!(outcome.action, ConnectionAction::StartTls);
        session.set_tls_active(None);

        let entry = root_dse(&handler, &mut session);
        let extensions = entry.values("supportedExtension").unwrap();
        assert!(!extensions.contains(&STARTTLS_OID.as_bytes().to_vec()));

        let outcome = handler.handle(&mut session, extended(3, STARTTLS_OID, None));
        assert_eq!(code(&outcome), ResultCode::OperationsError);
        assert_eq!(outcome.action, ConnectionAction::Continue);
    }

    #[test]
    fn test_starttls_unavailable() {
        let (handler, _) = setup(0, HandlerOptions::default());
        let outcome = handler.handle(&mut session(), extended(1, STARTTLS_OID, None));
        assert_eq!(code(&outcome), ResultCode::ProtocolError);
        assert_eq!(outcome.action, ConnectionAction::Continue);
    }

    #[test]
    fn test_subschema_search_and_compare() {
        let (handler, _) = setup(0, HandlerOptions::default());
        let mut session = session();
        let mut request = SearchRequest::new(
            SUBSCHEMA_DN,
            SearchScope::BaseObject,
            "(objectClass=subschema)".parse().unwrap(),
        );
        request.attributes = vec!["attributeTypes".to_string()];
        let outcome = handler.handle(&mut session, LdapMessage::new(1, ProtocolOp::SearchRequest(request)));
        assert_eq!(entry_names(&outcome), vec![SUBSCHEMA_DN]);

        let outcome = handler.handle(
            &mut session,
            LdapMessage::new(
                2,
                ProtocolOp::CompareRequest {
                    entry: SUBSCHEMA_DN.to_string(),
                    attribute: "objectClass".to_string(),
                    value: b"subschema".to_vec(),
                },
            ),
        );
        assert_eq!(code(&outcome), ResultCode::CompareTrue);
    }

    #[test]
    fn test_unbind_and_abandon() {
        let (handler, _) = setup(0, HandlerOptions::default());
        let mut session = session();

        let outcome = handler.handle(&mut session, LdapMessage::new(1, ProtocolOp::AbandonRequest(7)));
        assert!(outcome.responses.is_empty());
        assert_eq!(outcome.action, ConnectionAction::Continue);

        let outcome = handler.handle(&mut session, LdapMessage::new(2, ProtocolOp::UnbindRequest));
        assert!(outcome.responses.is_empty());
        assert_eq!(outcome.action, ConnectionAction::Close);

        // Critical controls on unbind never produce a response
        let message = LdapMessage::new(3, ProtocolOp::UnbindRequest).with_controls(vec![Control {
            control_type: "1.2.3".to_string(),
            criticality: true,
            value: None,
        }]);
        assert!(handler.handle(&mut session, message).responses.is_empty());
    }

    #[test]
    fn test_updates_are_refused() {
        let (handler, _) = setup(0, HandlerOptions::default());
        let outcome = handler.handle(
            &mut session(),
            LdapMessage::new(1, ProtocolOp::DelRequest("cn=test,dc=example,dc=com".to_string())),
        );
        assert_eq!(code(&outcome), ResultCode::UnwillingToPerform);
        assert!(matches!(outcome.responses[0].op, ProtocolOp::DelResponse(_)));
    }

    #[test]
    fn test_client_responses_dropped() {
        let (handler, _) = setup(0, HandlerOptions::default());
        let outcome = handler.handle(
            &mut session(),
            LdapMessage::new(1, ProtocolOp::SearchResultDone(LdapResult::success())),
        );
        assert!(outcome.responses.is_empty());
    }

    #[test]
    fn test_invalid_message_response() {
        let (handler, _) = setup(0, HandlerOptions::default());
        let response = handler
            .invalid_message_response(Some(4), Some(ldapd_protocol::message::TAG_SEARCH_REQUEST), "bad filter")
            .unwrap();
        assert_eq!(response.message_id, 4);
        assert!(matches!(
            &response.op,
            ProtocolOp::SearchResultDone(r) if r.result_code == ResultCode::ProtocolError
        ));
        assert!(handler
            .invalid_message_response(Some(4), Some(ldapd_protocol::message::TAG_ABANDON_REQUEST), "x")
            .is_none());
        assert!(handler.invalid_message_response(None, Some(0x63), "x").is_none());
    }

    #[test]
    fn test_metrics_recorded() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let schema = Schema::standard().unwrap();
        let handler = RequestHandler::new(schema.clone(), Arc::new(TestDirectory::new(&schema, 3)))
            .unwrap()
            .with_metrics(metrics.clone());
        let mut session = session();

        handler.handle(&mut session, bind(1, "", BindAuthentication::Simple(vec![])));
        handler.handle(
            &mut session,
            paged(search(2, "dc=example,dc=com", SearchScope::WholeSubtree, "(cn=e*)"), 1, b""),
        );

        assert_eq!(metrics.search_entries_total.get(), 1.0);
        assert_eq!(metrics.paged_cursors_active.get(), 1.0);
        assert_eq!(
            metrics
                .binds_total
                .with_label_values(&["simple", "success"])
                .get(),
            1.0
        );
        assert_eq!(
            metrics.results_total.with_label_values(&["success"]).get(),
            2.0
        );
    }
}
