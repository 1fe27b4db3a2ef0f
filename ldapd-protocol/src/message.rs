//! LDAPv3 message envelope and protocol operations (RFC4511 section 4).

use crate::ber::{tag, BerReader, BerWriter};
use crate::error::{LdapError, ProtocolError, ResultCode};
use crate::filter::Filter;

pub const TAG_BIND_REQUEST: u8 = 0x60;
pub const TAG_BIND_RESPONSE: u8 = 0x61;
pub const TAG_UNBIND_REQUEST: u8 = 0x42;
pub const TAG_SEARCH_REQUEST: u8 = 0x63;
pub const TAG_SEARCH_RESULT_ENTRY: u8 = 0x64;
pub const TAG_SEARCH_RESULT_DONE: u8 = 0x65;
pub const TAG_SEARCH_RESULT_REFERENCE: u8 = 0x73;
pub const TAG_MODIFY_REQUEST: u8 = 0x66;
pub const TAG_MODIFY_RESPONSE: u8 = 0x67;
pub const TAG_ADD_REQUEST: u8 = 0x68;
pub const TAG_ADD_RESPONSE: u8 = 0x69;
pub const TAG_DEL_REQUEST: u8 = 0x4a;
pub const TAG_DEL_RESPONSE: u8 = 0x6b;
pub const TAG_MODIFY_DN_REQUEST: u8 = 0x6c;
pub const TAG_MODIFY_DN_RESPONSE: u8 = 0x6d;
pub const TAG_COMPARE_REQUEST: u8 = 0x6e;
pub const TAG_COMPARE_RESPONSE: u8 = 0x6f;
pub const TAG_ABANDON_REQUEST: u8 = 0x50;
pub const TAG_EXTENDED_REQUEST: u8 = 0x77;
pub const TAG_EXTENDED_RESPONSE: u8 = 0x78;

const TAG_CONTROLS: u8 = 0xa0;
const TAG_AUTH_SIMPLE: u8 = 0x80;
const TAG_AUTH_SASL: u8 = 0xa3;
const TAG_REFERRAL: u8 = 0xa3;
const TAG_SERVER_SASL_CREDS: u8 = 0x87;
const TAG_NEW_SUPERIOR: u8 = 0x80;
const TAG_EXTENDED_REQUEST_NAME: u8 = 0x80;
const TAG_EXTENDED_REQUEST_VALUE: u8 = 0x81;
const TAG_EXTENDED_RESPONSE_NAME: u8 = 0x8a;
const TAG_EXTENDED_RESPONSE_VALUE: u8 = 0x8b;

/// Search scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchScope {
    BaseObject,
    SingleLevel,
    WholeSubtree,
}

impl SearchScope {
    fn from_i64(value: i64) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(SearchScope::BaseObject),
            1 => Ok(SearchScope::SingleLevel),
            2 => Ok(SearchScope::WholeSubtree),
            other => Err(ProtocolError::Malformed(format!(
                "unknown search scope {}",
                other
            ))),
        }
    }

    fn as_i64(&self) -> i64 {
        match self {
            SearchScope::BaseObject => 0,
            SearchScope::SingleLevel => 1,
            SearchScope::WholeSubtree => 2,
        }
    }
}

/// Alias dereferencing policy requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerefAliases {
    Never,
    InSearching,
    FindingBaseObject,
    Always,
}

impl DerefAliases {
    fn from_i64(value: i64) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(DerefAliases::Never),
            1 => Ok(DerefAliases::InSearching),
            2 => Ok(DerefAliases::FindingBaseObject),
            3 => Ok(DerefAliases::Always),
            other => Err(ProtocolError::Malformed(format!(
                "unknown derefAliases value {}",
                other
            ))),
        }
    }

    fn as_i64(&self) -> i64 {
        match self {
            DerefAliases::Never => 0,
            DerefAliases::InSearching => 1,
            DerefAliases::FindingBaseObject => 2,
            DerefAliases::Always => 3,
        }
    }
}

/// Result component shared by all response operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapResult {
    pub result_code: ResultCode,
    pub matched_dn: String,
    pub diagnostic_message: String,
}

impl LdapResult {
    pub fn success() -> Self {
        Self::new(ResultCode::Success, "")
    }

    pub fn new(result_code: ResultCode, diagnostic_message: impl Into<String>) -> Self {
        Self {
            result_code,
            matched_dn: String::new(),
            diagnostic_message: diagnostic_message.into(),
        }
    }

    fn encode_components(&self, w: &mut BerWriter) {
        w.write_integer(tag::ENUMERATED, self.result_code.code() as i64);
        w.write_octets(tag::OCTET_STRING, self.matched_dn.as_bytes());
        w.write_octets(tag::OCTET_STRING, self.diagnostic_message.as_bytes());
    }

    fn decode_components(r: &mut BerReader<'_>) -> Result<Self, ProtocolError> {
        let code = r.read_integer(tag::ENUMERATED)?;
        let matched_dn = r.read_string(tag::OCTET_STRING)?;
        let diagnostic_message = r.read_string(tag::OCTET_STRING)?;
        // Referrals are never produced by this server; skip them if present.
        r.read_optional(TAG_REFERRAL)?;
        Ok(Self {
            result_code: ResultCode::from_code(u32::try_from(code).unwrap_or(80)),
            matched_dn,
            diagnostic_message,
        })
    }
}

impl From<&LdapError> for LdapResult {
    fn from(err: &LdapError) -> Self {
        LdapResult::new(err.result_code(), err.message())
    }
}

/// A request or response control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub control_type: String,
    pub criticality: bool,
    pub value: Option<Vec<u8>>,
}

impl Control {
    fn encode(&self, w: &mut BerWriter) {
        w.write_constructed(tag::SEQUENCE, |w| {
            w.write_octets(tag::OCTET_STRING, self.control_type.as_bytes());
            if self.criticality {
                w.write_bool(tag::BOOLEAN, true);
            }
            if let Some(value) = &self.value {
                w.write_octets(tag::OCTET_STRING, value);
            }
        });
    }

    fn decode(r: &mut BerReader<'_>) -> Result<Self, ProtocolError> {
        let mut seq = r.read_constructed(tag::SEQUENCE)?;
        let control_type = seq.read_string(tag::OCTET_STRING)?;
        let criticality = if seq.peek_tag() == Some(tag::BOOLEAN) {
            seq.read_bool(tag::BOOLEAN)?
        } else {
            false
        };
        let value = seq.read_optional(tag::OCTET_STRING)?.map(|v| v.to_vec());
        Ok(Self {
            control_type,
            criticality,
            value,
        })
    }
}

/// Authentication choice of a BindRequest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindAuthentication {
    Simple(Vec<u8>),
    Sasl {
        mechanism: String,
        credentials: Option<Vec<u8>>,
    },
}

/// An attribute description with its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialAttribute {
    pub attribute_type: String,
    pub values: Vec<Vec<u8>>,
}

impl PartialAttribute {
    pub fn new(attribute_type: impl Into<String>, values: Vec<Vec<u8>>) -> Self {
        Self {
            attribute_type: attribute_type.into(),
            values,
        }
    }

    fn encode(&self, w: &mut BerWriter) {
        w.write_constructed(tag::SEQUENCE, |w| {
            w.write_octets(tag::OCTET_STRING, self.attribute_type.as_bytes());
            w.write_constructed(tag::SET, |w| {
                for value in &self.values {
                    w.write_octets(tag::OCTET_STRING, value);
                }
            });
        });
    }

    fn decode(r: &mut BerReader<'_>) -> Result<Self, ProtocolError> {
        let mut seq = r.read_constructed(tag::SEQUENCE)?;
        let attribute_type = seq.read_string(tag::OCTET_STRING)?;
        let mut set = seq.read_constructed(tag::SET)?;
        let mut values = Vec::new();
        while !set.is_empty() {
            values.push(set.read_octets(tag::OCTET_STRING)?.to_vec());
        }
        Ok(Self {
            attribute_type,
            values,
        })
    }
}

fn encode_attribute_list(w: &mut BerWriter, attributes: &[PartialAttribute]) {
    w.write_constructed(tag::SEQUENCE, |w| {
        for attr in attributes {
            attr.encode(w);
        }
    });
}

fn decode_attribute_list(r: &mut BerReader<'_>) -> Result<Vec<PartialAttribute>, ProtocolError> {
    let mut seq = r.read_constructed(tag::SEQUENCE)?;
    let mut attributes = Vec::new();
    while !seq.is_empty() {
        attributes.push(PartialAttribute::decode(&mut seq)?);
    }
    Ok(attributes)
}

/// Modification kind of a ModifyRequest change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOperation {
    Add,
    Delete,
    Replace,
}

/// One change of a ModifyRequest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub operation: ModifyOperation,
    pub modification: PartialAttribute,
}

/// Parameters of a SearchRequest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base_object: String,
    pub scope: SearchScope,
    pub deref_aliases: DerefAliases,
    pub size_limit: u32,
    pub time_limit: u32,
    pub types_only: bool,
    pub filter: Filter,
    pub attributes: Vec<String>,
}

impl SearchRequest {
    /// A search without limits returning all user attributes.
    pub fn new(base_object: impl Into<String>, scope: SearchScope, filter: Filter) -> Self {
        Self {
            base_object: base_object.into(),
            scope,
            deref_aliases: DerefAliases::Never,
            size_limit: 0,
            time_limit: 0,
            types_only: false,
            filter,
            attributes: Vec::new(),
        }
    }
}

/// A SearchResultEntry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResultEntry {
    pub object_name: String,
    pub attributes: Vec<PartialAttribute>,
}

impl SearchResultEntry {
    /// Values of the first attribute whose description matches `name` exactly
    /// (ignoring case).
    pub fn values(&self, name: &str) -> Option<&[Vec<u8>]> {
        self.attributes
            .iter()
            .find(|a| a.attribute_type.eq_ignore_ascii_case(name))
            .map(|a| a.values.as_slice())
    }
}

/// Protocol operation carried by an LDAP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolOp {
    BindRequest {
        version: i64,
        name: String,
        authentication: BindAuthentication,
    },
    BindResponse {
        result: LdapResult,
        server_sasl_creds: Option<Vec<u8>>,
    },
    UnbindRequest,
    SearchRequest(SearchRequest),
    SearchResultEntry(SearchResultEntry),
    SearchResultDone(LdapResult),
    SearchResultReference(Vec<String>),
    ModifyRequest {
        object: String,
        changes: Vec<Change>,
    },
    ModifyResponse(LdapResult),
    AddRequest {
        entry: String,
        attributes: Vec<PartialAttribute>,
    },
    AddResponse(LdapResult),
    DelRequest(String),
    DelResponse(LdapResult),
    ModifyDnRequest {
        entry: String,
        new_rdn: String,
        delete_old_rdn: bool,
        new_superior: Option<String>,
    },
    ModifyDnResponse(LdapResult),
    CompareRequest {
        entry: String,
        attribute: String,
        value: Vec<u8>,
    },
    CompareResponse(LdapResult),
    AbandonRequest(i32),
    ExtendedRequest {
        name: String,
        value: Option<Vec<u8>>,
    },
    ExtendedResponse {
        result: LdapResult,
        name: Option<String>,
        value: Option<Vec<u8>>,
    },
}

impl ProtocolOp {
    /// BER application tag of this operation.
    pub fn tag(&self) -> u8 {
        match self {
            ProtocolOp::BindRequest { .. } => TAG_BIND_REQUEST,
            ProtocolOp::BindResponse { .. } => TAG_BIND_RESPONSE,
            ProtocolOp::UnbindRequest => TAG_UNBIND_REQUEST,
            ProtocolOp::SearchRequest(_) => TAG_SEARCH_REQUEST,
            ProtocolOp::SearchResultEntry(_) => TAG_SEARCH_RESULT_ENTRY,
            ProtocolOp::SearchResultDone(_) => TAG_SEARCH_RESULT_DONE,
            ProtocolOp::SearchResultReference(_) => TAG_SEARCH_RESULT_REFERENCE,
            ProtocolOp::ModifyRequest { .. } => TAG_MODIFY_REQUEST,
            ProtocolOp::ModifyResponse(_) => TAG_MODIFY_RESPONSE,
            ProtocolOp::AddRequest { .. } => TAG_ADD_REQUEST,
            ProtocolOp::AddResponse(_) => TAG_ADD_RESPONSE,
            ProtocolOp::DelRequest(_) => TAG_DEL_REQUEST,
            ProtocolOp::DelResponse(_) => TAG_DEL_RESPONSE,
            ProtocolOp::ModifyDnRequest { .. } => TAG_MODIFY_DN_REQUEST,
            ProtocolOp::ModifyDnResponse(_) => TAG_MODIFY_DN_RESPONSE,
            ProtocolOp::CompareRequest { .. } => TAG_COMPARE_REQUEST,
            ProtocolOp::CompareResponse(_) => TAG_COMPARE_RESPONSE,
            ProtocolOp::AbandonRequest(_) => TAG_ABANDON_REQUEST,
            ProtocolOp::ExtendedRequest { .. } => TAG_EXTENDED_REQUEST,
            ProtocolOp::ExtendedResponse { .. } => TAG_EXTENDED_RESPONSE,
        }
    }

    /// Operation name used in logs and metrics.
    pub fn name(&self) -> &'static str {
        operation_name(self.tag())
    }

    /// Result component of a response operation.
    pub fn result(&self) -> Option<&LdapResult> {
        match self {
            ProtocolOp::BindResponse { result, .. } | ProtocolOp::ExtendedResponse { result, .. } => {
                Some(result)
            }
            ProtocolOp::SearchResultDone(result)
            | ProtocolOp::ModifyResponse(result)
            | ProtocolOp::AddResponse(result)
            | ProtocolOp::DelResponse(result)
            | ProtocolOp::ModifyDnResponse(result)
            | ProtocolOp::CompareResponse(result) => Some(result),
            _ => None,
        }
    }

    /// Builds the typed response answering a request with `request_tag`.
    ///
    /// Returns `None` for requests that never get a response (unbind, abandon)
    /// and for tags that are not requests.
    pub fn response_for(request_tag: u8, result: LdapResult) -> Option<ProtocolOp> {
        match request_tag {
            TAG_BIND_REQUEST => Some(ProtocolOp::BindResponse {
                result,
                server_sasl_creds: None,
            }),
            TAG_SEARCH_REQUEST => Some(ProtocolOp::SearchResultDone(result)),
            TAG_MODIFY_REQUEST => Some(ProtocolOp::ModifyResponse(result)),
            TAG_ADD_REQUEST => Some(ProtocolOp::AddResponse(result)),
            TAG_DEL_REQUEST => Some(ProtocolOp::DelResponse(result)),
            TAG_MODIFY_DN_REQUEST => Some(ProtocolOp::ModifyDnResponse(result)),
            TAG_COMPARE_REQUEST => Some(ProtocolOp::CompareResponse(result)),
            TAG_EXTENDED_REQUEST => Some(ProtocolOp::ExtendedResponse {
                result,
                name: None,
                value: None,
            }),
            _ => None,
        }
    }

    pub(crate) fn encode(&self, w: &mut BerWriter) {
        let op_tag = self.tag();
        match self {
            ProtocolOp::BindRequest {
                version,
                name,
                authentication,
            } => w.write_constructed(op_tag, |w| {
                w.write_integer(tag::INTEGER, *version);
                w.write_octets(tag::OCTET_STRING, name.as_bytes());
                match authentication {
                    BindAuthentication::Simple(password) => {
                        w.write_octets(TAG_AUTH_SIMPLE, password)
                    }
                    BindAuthentication::Sasl {
                        mechanism,
                        credentials,
                    } => w.write_constructed(TAG_AUTH_SASL, |w| {
                        w.write_octets(tag::OCTET_STRING, mechanism.as_bytes());
                        if let Some(credentials) = credentials {
                            w.write_octets(tag::OCTET_STRING, credentials);
                        }
                    }),
                }
            }),
            ProtocolOp::BindResponse {
                result,
                server_sasl_creds,
            } => w.write_constructed(op_tag, |w| {
                result.encode_components(w);
                if let Some(creds) = server_sasl_creds {
                    w.write_octets(TAG_SERVER_SASL_CREDS, creds);
                }
            }),
            ProtocolOp::UnbindRequest => w.write_null(op_tag),
            ProtocolOp::SearchRequest(req) => w.write_constructed(op_tag, |w| {
                w.write_octets(tag::OCTET_STRING, req.base_object.as_bytes());
                w.write_integer(tag::ENUMERATED, req.scope.as_i64());
                w.write_integer(tag::ENUMERATED, req.deref_aliases.as_i64());
                w.write_integer(tag::INTEGER, req.size_limit as i64);
                w.write_integer(tag::INTEGER, req.time_limit as i64);
                w.write_bool(tag::BOOLEAN, req.types_only);
                req.filter.encode(w);
                w.write_constructed(tag::SEQUENCE, |w| {
                    for attr in &req.attributes {
                        w.write_octets(tag::OCTET_STRING, attr.as_bytes());
                    }
                });
            }),
            ProtocolOp::SearchResultEntry(entry) => w.write_constructed(op_tag, |w| {
                w.write_octets(tag::OCTET_STRING, entry.object_name.as_bytes());
                encode_attribute_list(w, &entry.attributes);
            }),
            ProtocolOp::SearchResultReference(uris) => w.write_constructed(op_tag, |w| {
                for uri in uris {
                    w.write_octets(tag::OCTET_STRING, uri.as_bytes());
                }
            }),
            ProtocolOp::ModifyRequest { object, changes } => w.write_constructed(op_tag, |w| {
                w.write_octets(tag::OCTET_STRING, object.as_bytes());
                w.write_constructed(tag::SEQUENCE, |w| {
                    for change in changes {
                        w.write_constructed(tag::SEQUENCE, |w| {
                            let op = match change.operation {
                                ModifyOperation::Add => 0,
                                ModifyOperation::Delete => 1,
                                ModifyOperation::Replace => 2,
                            };
                            w.write_integer(tag::ENUMERATED, op);
                            change.modification.encode(w);
                        });
                    }
                });
            }),
            ProtocolOp::AddRequest { entry, attributes } => w.write_constructed(op_tag, |w| {
                w.write_octets(tag::OCTET_STRING, entry.as_bytes());
                encode_attribute_list(w, attributes);
            }),
            ProtocolOp::DelRequest(dn) => w.write_octets(op_tag, dn.as_bytes()),
            ProtocolOp::ModifyDnRequest {
                entry,
                new_rdn,
                delete_old_rdn,
                new_superior,
            } => w.write_constructed(op_tag, |w| {
                w.write_octets(tag::OCTET_STRING, entry.as_bytes());
                w.write_octets(tag::OCTET_STRING, new_rdn.as_bytes());
                w.write_bool(tag::BOOLEAN, *delete_old_rdn);
                if let Some(sup) = new_superior {
                    w.write_octets(TAG_NEW_SUPERIOR, sup.as_bytes());
                }
            }),
            ProtocolOp::CompareRequest {
                entry,
                attribute,
                value,
            } => w.write_constructed(op_tag, |w| {
                w.write_octets(tag::OCTET_STRING, entry.as_bytes());
                w.write_constructed(tag::SEQUENCE, |w| {
                    w.write_octets(tag::OCTET_STRING, attribute.as_bytes());
                    w.write_octets(tag::OCTET_STRING, value);
                });
            }),
            ProtocolOp::AbandonRequest(id) => w.write_integer(op_tag, *id as i64),
            ProtocolOp::ExtendedRequest { name, value } => w.write_constructed(op_tag, |w| {
                w.write_octets(TAG_EXTENDED_REQUEST_NAME, name.as_bytes());
                if let Some(value) = value {
                    w.write_octets(TAG_EXTENDED_REQUEST_VALUE, value);
                }
            }),
            ProtocolOp::ExtendedResponse {
                result,
                name,
                value,
            } => w.write_constructed(op_tag, |w| {
                result.encode_components(w);
                if let Some(name) = name {
                    w.write_octets(TAG_EXTENDED_RESPONSE_NAME, name.as_bytes());
                }
                if let Some(value) = value {
                    w.write_octets(TAG_EXTENDED_RESPONSE_VALUE, value);
                }
            }),
            ProtocolOp::SearchResultDone(result)
            | ProtocolOp::ModifyResponse(result)
            | ProtocolOp::AddResponse(result)
            | ProtocolOp::DelResponse(result)
            | ProtocolOp::ModifyDnResponse(result)
            | ProtocolOp::CompareResponse(result) => {
                w.write_constructed(op_tag, |w| result.encode_components(w))
            }
        }
    }

    /// Decodes an operation from its tag and contents octets.
    pub(crate) fn decode(op_tag: u8, contents: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = BerReader::new(contents);
        let op = match op_tag {
            TAG_BIND_REQUEST => {
                let version = r.read_integer(tag::INTEGER)?;
                let name = r.read_string(tag::OCTET_STRING)?;
                let (auth_tag, auth) = r.read_tlv()?;
                let authentication = match auth_tag {
                    TAG_AUTH_SIMPLE => BindAuthentication::Simple(auth.to_vec()),
                    TAG_AUTH_SASL => {
                        let mut sasl = BerReader::new(auth);
                        let mechanism = sasl.read_string(tag::OCTET_STRING)?;
                        let credentials =
                            sasl.read_optional(tag::OCTET_STRING)?.map(|c| c.to_vec());
                        BindAuthentication::Sasl {
                            mechanism,
                            credentials,
                        }
                    }
                    other => {
                        return Err(ProtocolError::Malformed(format!(
                            "unknown authentication choice {:#04x}",
                            other
                        )))
                    }
                };
                ProtocolOp::BindRequest {
                    version,
                    name,
                    authentication,
                }
            }
            TAG_BIND_RESPONSE => {
                let result = LdapResult::decode_components(&mut r)?;
                let server_sasl_creds = r.read_optional(TAG_SERVER_SASL_CREDS)?.map(|c| c.to_vec());
                ProtocolOp::BindResponse {
                    result,
                    server_sasl_creds,
                }
            }
            TAG_UNBIND_REQUEST => ProtocolOp::UnbindRequest,
            TAG_SEARCH_REQUEST => {
                let base_object = r.read_string(tag::OCTET_STRING)?;
                let scope = SearchScope::from_i64(r.read_integer(tag::ENUMERATED)?)?;
                let deref_aliases = DerefAliases::from_i64(r.read_integer(tag::ENUMERATED)?)?;
                let size_limit = read_limit(&mut r, "sizeLimit")?;
                let time_limit = read_limit(&mut r, "timeLimit")?;
                let types_only = r.read_bool(tag::BOOLEAN)?;
                let filter = Filter::decode(&mut r)?;
                let mut seq = r.read_constructed(tag::SEQUENCE)?;
                let mut attributes = Vec::new();
                while !seq.is_empty() {
                    attributes.push(seq.read_string(tag::OCTET_STRING)?);
                }
                ProtocolOp::SearchRequest(SearchRequest {
                    base_object,
                    scope,
                    deref_aliases,
                    size_limit,
                    time_limit,
                    types_only,
                    filter,
                    attributes,
                })
            }
            TAG_SEARCH_RESULT_ENTRY => {
                let object_name = r.read_string(tag::OCTET_STRING)?;
                let attributes = decode_attribute_list(&mut r)?;
                ProtocolOp::SearchResultEntry(SearchResultEntry {
                    object_name,
                    attributes,
                })
            }
            TAG_SEARCH_RESULT_REFERENCE => {
                let mut uris = Vec::new();
                while !r.is_empty() {
                    uris.push(r.read_string(tag::OCTET_STRING)?);
                }
                ProtocolOp::SearchResultReference(uris)
            }
            TAG_MODIFY_REQUEST => {
                let object = r.read_string(tag::OCTET_STRING)?;
                let mut seq = r.read_constructed(tag::SEQUENCE)?;
                let mut changes = Vec::new();
                while !seq.is_empty() {
                    let mut change = seq.read_constructed(tag::SEQUENCE)?;
                    let operation = match change.read_integer(tag::ENUMERATED)? {
                        0 => ModifyOperation::Add,
                        1 => ModifyOperation::Delete,
                        2 => ModifyOperation::Replace,
                        other => {
                            return Err(ProtocolError::Malformed(format!(
                                "unknown modify operation {}",
                                other
                            )))
                        }
                    };
                    let modification = PartialAttribute::decode(&mut change)?;
                    changes.push(Change {
                        operation,
                        modification,
                    });
                }
                ProtocolOp::ModifyRequest { object, changes }
            }
            TAG_ADD_REQUEST => {
                let entry = r.read_string(tag::OCTET_STRING)?;
                let attributes = decode_attribute_list(&mut r)?;
                ProtocolOp::AddRequest { entry, attributes }
            }
            TAG_DEL_REQUEST => ProtocolOp::DelRequest(
                String::from_utf8(contents.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)?,
            ),
            TAG_MODIFY_DN_REQUEST => {
                let entry = r.read_string(tag::OCTET_STRING)?;
                let new_rdn = r.read_string(tag::OCTET_STRING)?;
                let delete_old_rdn = r.read_bool(tag::BOOLEAN)?;
                let new_superior = match r.read_optional(TAG_NEW_SUPERIOR)? {
                    Some(sup) => Some(
                        String::from_utf8(sup.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)?,
                    ),
                    None => None,
                };
                ProtocolOp::ModifyDnRequest {
                    entry,
                    new_rdn,
                    delete_old_rdn,
                    new_superior,
                }
            }
            TAG_COMPARE_REQUEST => {
                let entry = r.read_string(tag::OCTET_STRING)?;
                let mut ava = r.read_constructed(tag::SEQUENCE)?;
                let attribute = ava.read_string(tag::OCTET_STRING)?;
                let value = ava.read_octets(tag::OCTET_STRING)?.to_vec();
                ProtocolOp::CompareRequest {
                    entry,
                    attribute,
                    value,
                }
            }
            TAG_ABANDON_REQUEST => {
                let id = crate::ber::decode_integer(contents)?;
                ProtocolOp::AbandonRequest(
                    i32::try_from(id)
                        .map_err(|_| ProtocolError::Malformed(format!("message id {}", id)))?,
                )
            }
            TAG_EXTENDED_REQUEST => {
                let name = r.read_string(TAG_EXTENDED_REQUEST_NAME)?;
                let value = r
                    .read_optional(TAG_EXTENDED_REQUEST_VALUE)?
                    .map(|v| v.to_vec());
                ProtocolOp::ExtendedRequest { name, value }
            }
            TAG_EXTENDED_RESPONSE => {
                let result = LdapResult::decode_components(&mut r)?;
                let name = match r.read_optional(TAG_EXTENDED_RESPONSE_NAME)? {
                    Some(name) => Some(
                        String::from_utf8(name.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)?,
                    ),
                    None => None,
                };
                let value = r
                    .read_optional(TAG_EXTENDED_RESPONSE_VALUE)?
                    .map(|v| v.to_vec());
                ProtocolOp::ExtendedResponse {
                    result,
                    name,
                    value,
                }
            }
            TAG_SEARCH_RESULT_DONE => {
                ProtocolOp::SearchResultDone(LdapResult::decode_components(&mut r)?)
            }
            TAG_MODIFY_RESPONSE => ProtocolOp::ModifyResponse(LdapResult::decode_components(&mut r)?),
            TAG_ADD_RESPONSE => ProtocolOp::AddResponse(LdapResult::decode_components(&mut r)?),
            TAG_DEL_RESPONSE => ProtocolOp::DelResponse(LdapResult::decode_components(&mut r)?),
            TAG_MODIFY_DN_RESPONSE => {
                ProtocolOp::ModifyDnResponse(LdapResult::decode_components(&mut r)?)
            }
            TAG_COMPARE_RESPONSE => {
                ProtocolOp::CompareResponse(LdapResult::decode_components(&mut r)?)
            }
            other => {
                return Err(ProtocolError::Malformed(format!(
                    "unknown protocol operation {:#04x}",
                    other
                )))
            }
        };
        Ok(op)
    }
}

fn read_limit(r: &mut BerReader<'_>, what: &str) -> Result<u32, ProtocolError> {
    let value = r.read_integer(tag::INTEGER)?;
    u32::try_from(value).map_err(|_| ProtocolError::Malformed(format!("{} {}", what, value)))
}

/// Operation name for an application tag.
pub fn operation_name(op_tag: u8) -> &'static str {
    match op_tag {
        TAG_BIND_REQUEST => "bind",
        TAG_BIND_RESPONSE => "bind_response",
        TAG_UNBIND_REQUEST => "unbind",
        TAG_SEARCH_REQUEST => "search",
        TAG_SEARCH_RESULT_ENTRY => "search_result_entry",
        TAG_SEARCH_RESULT_DONE => "search_result_done",
        TAG_SEARCH_RESULT_REFERENCE => "search_result_reference",
        TAG_MODIFY_REQUEST => "modify",
        TAG_MODIFY_RESPONSE => "modify_response",
        TAG_ADD_REQUEST => "add",
        TAG_ADD_RESPONSE => "add_response",
        TAG_DEL_REQUEST => "delete",
        TAG_DEL_RESPONSE => "delete_response",
        TAG_MODIFY_DN_REQUEST => "modify_dn",
        TAG_MODIFY_DN_RESPONSE => "modify_dn_response",
        TAG_COMPARE_REQUEST => "compare",
        TAG_COMPARE_RESPONSE => "compare_response",
        TAG_ABANDON_REQUEST => "abandon",
        TAG_EXTENDED_REQUEST => "extended",
        TAG_EXTENDED_RESPONSE => "extended_response",
        _ => "unknown",
    }
}

/// An LDAP message envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapMessage {
    pub message_id: i32,
    pub op: ProtocolOp,
    pub controls: Vec<Control>,
}

impl LdapMessage {
    pub fn new(message_id: i32, op: ProtocolOp) -> Self {
        Self {
            message_id,
            op,
            controls: Vec::new(),
        }
    }

    pub fn with_controls(mut self, controls: Vec<Control>) -> Self {
        self.controls = controls;
        self
    }

    /// Finds a control by OID.
    pub fn control(&self, control_type: &str) -> Option<&Control> {
        self.controls
            .iter()
            .find(|c| c.control_type == control_type)
    }

    pub(crate) fn encode(&self, w: &mut BerWriter) {
        w.write_constructed(tag::SEQUENCE, |w| {
            w.write_integer(tag::INTEGER, self.message_id as i64);
            self.op.encode(w);
            if !self.controls.is_empty() {
                w.write_constructed(TAG_CONTROLS, |w| {
                    for control in &self.controls {
                        control.encode(w);
                    }
                });
            }
        });
    }

    /// Decodes the contents of the outer LDAPMessage SEQUENCE.
    ///
    /// Errors carry the message id and operation tag when they were readable.
    pub(crate) fn decode(contents: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = BerReader::new(contents);
        let invalid = |message_id, op_tag, reason: String| ProtocolError::InvalidMessage {
            message_id,
            op_tag,
            reason,
        };

        let message_id = r
            .read_integer(tag::INTEGER)
            .map_err(|e| invalid(None, None, e.to_string()))?;
        let message_id = i32::try_from(message_id)
            .ok()
            .filter(|id| *id >= 0)
            .ok_or_else(|| invalid(None, None, format!("message id {} out of range", message_id)))?;

        let (op_tag, op_contents) = r
            .read_tlv()
            .map_err(|e| invalid(Some(message_id), None, e.to_string()))?;
        let op = ProtocolOp::decode(op_tag, op_contents)
            .map_err(|e| invalid(Some(message_id), Some(op_tag), e.to_string()))?;

        let mut controls = Vec::new();
        if let Some(ctrl) = r
            .read_optional(TAG_CONTROLS)
            .map_err(|e| invalid(Some(message_id), Some(op_tag), e.to_string()))?
        {
            let mut seq = BerReader::new(ctrl);
            while !seq.is_empty() {
                controls.push(
                    Control::decode(&mut seq)
                        .map_err(|e| invalid(Some(message_id), Some(op_tag), e.to_string()))?,
                );
            }
        }

        Ok(Self {
            message_id,
            op,
            controls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_for_request() {
        let result = LdapResult::new(ResultCode::ProtocolError, "bad");
        assert!(matches!(
            ProtocolOp::response_for(TAG_SEARCH_REQUEST, result.clone()),
            Some(ProtocolOp::SearchResultDone(_))
        ));
        assert!(matches!(
            ProtocolOp::response_for(TAG_BIND_REQUEST, result.clone()),
            Some(ProtocolOp::BindResponse { .. })
        ));
        assert!(ProtocolOp::response_for(TAG_UNBIND_REQUEST, result.clone()).is_none());
        assert!(ProtocolOp::response_for(TAG_ABANDON_REQUEST, result.clone()).is_none());
        assert!(ProtocolOp::response_for(0x7e, result).is_none());
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(ProtocolOp::UnbindRequest.name(), "unbind");
        assert_eq!(ProtocolOp::DelRequest("cn=x".to_string()).name(), "delete");
        assert_eq!(operation_name(0x7e), "unknown");
    }

    #[test]
    fn test_result_accessor() {
        let op = ProtocolOp::CompareResponse(LdapResult::new(ResultCode::CompareTrue, ""));
        assert_eq!(op.result().unwrap().result_code, ResultCode::CompareTrue);
        assert!(ProtocolOp::UnbindRequest.result().is_none());
    }

    #[test]
    fn test_result_from_error() {
        let err = LdapError::InvalidCredentials("wrong password".to_string());
        let result = LdapResult::from(&err);
        assert_eq!(result.result_code, ResultCode::InvalidCredentials);
        assert_eq!(result.diagnostic_message, "wrong password");
        assert!(result.matched_dn.is_empty());
    }

    #[test]
    fn test_search_result_entry_values() {
        let entry = SearchResultEntry {
            object_name: "cn=a".to_string(),
            attributes: vec![PartialAttribute::new("cn", vec![b"a".to_vec()])],
        };
        assert_eq!(entry.values("CN").unwrap(), &[b"a".to_vec()]);
        assert!(entry.values("sn").is_none());
    }
}
