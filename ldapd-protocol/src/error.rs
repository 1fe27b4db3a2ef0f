//! Protocol error types, LDAP result codes and the LDAP error taxonomy.

use std::fmt;
use thiserror::Error;

/// Errors raised while framing or decoding BER encoded LDAP messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("malformed BER framing: {0}")]
    Framing(String),

    #[error("malformed BER element: {0}")]
    Malformed(String),

    #[error("unexpected tag: expected {expected:#04x}, got {actual:#04x}")]
    UnexpectedTag { expected: u8, actual: u8 },

    /// A complete message was read off the buffer but its contents are invalid.
    ///
    /// The bytes have been consumed so the stream stays in sync.
    #[error("invalid message (id {message_id:?}, op {op_tag:?}): {reason}")]
    InvalidMessage {
        message_id: Option<i32>,
        op_tag: Option<u8>,
        reason: String,
    },

    #[error("invalid filter: {reason}")]
    InvalidFilter { reason: String },

    #[error("invalid UTF-8 in string value")]
    InvalidUtf8,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns true if the byte stream can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ProtocolError::InvalidMessage { .. })
    }
}

/// LDAPv3 result codes (RFC4511 Appendix A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    OperationsError,
    ProtocolError,
    TimeLimitExceeded,
    SizeLimitExceeded,
    CompareFalse,
    CompareTrue,
    AuthMethodNotSupported,
    StrongerAuthRequired,
    Referral,
    AdminLimitExceeded,
    UnavailableCriticalExtension,
    ConfidentialityRequired,
    SaslBindInProgress,
    NoSuchAttribute,
    UndefinedAttributeType,
    InappropriateMatching,
    ConstraintViolation,
    AttributeOrValueExists,
    InvalidAttributeSyntax,
    NoSuchObject,
    AliasProblem,
    InvalidDnSyntax,
    AliasDereferencingProblem,
    InappropriateAuthentication,
    InvalidCredentials,
    InsufficientAccessRights,
    Busy,
    Unavailable,
    UnwillingToPerform,
    LoopDetect,
    NamingViolation,
    ObjectClassViolation,
    NotAllowedOnNonLeaf,
    NotAllowedOnRdn,
    EntryAlreadyExists,
    ObjectClassModsProhibited,
    AffectsMultipleDsas,
    Other,
}

const RESULT_CODES: &[(ResultCode, u32, &str)] = &[
    (ResultCode::Success, 0, "success"),
    (ResultCode::OperationsError, 1, "operationsError"),
    (ResultCode::ProtocolError, 2, "protocolError"),
    (ResultCode::TimeLimitExceeded, 3, "timeLimitExceeded"),
    (ResultCode::SizeLimitExceeded, 4, "sizeLimitExceeded"),
    (ResultCode::CompareFalse, 5, "compareFalse"),
    (ResultCode::CompareTrue, 6, "compareTrue"),
    (ResultCode::AuthMethodNotSupported, 7, "authMethodNotSupported"),
    (ResultCode::StrongerAuthRequired, 8, "strongerAuthRequired"),
    (ResultCode::Referral, 10, "referral"),
    (ResultCode::AdminLimitExceeded, 11, "adminLimitExceeded"),
    (
        ResultCode::UnavailableCriticalExtension,
        12,
        "unavailableCriticalExtension",
    ),
    (ResultCode::ConfidentialityRequired, 13, "confidentialityRequired"),
    (ResultCode::SaslBindInProgress, 14, "saslBindInProgress"),
    (ResultCode::NoSuchAttribute, 16, "noSuchAttribute"),
    (ResultCode::UndefinedAttributeType, 17, "undefinedAttributeType"),
    (ResultCode::InappropriateMatching, 18, "inappropriateMatching"),
    (ResultCode::ConstraintViolation, 19, "constraintViolation"),
    (ResultCode::AttributeOrValueExists, 20, "attributeOrValueExists"),
    (ResultCode::InvalidAttributeSyntax, 21, "invalidAttributeSyntax"),
    (ResultCode::NoSuchObject, 32, "noSuchObject"),
    (ResultCode::AliasProblem, 33, "aliasProblem"),
    (ResultCode::InvalidDnSyntax, 34, "invalidDNSyntax"),
    (
        ResultCode::AliasDereferencingProblem,
        36,
        "aliasDereferencingProblem",
    ),
    (
        ResultCode::InappropriateAuthentication,
        48,
        "inappropriateAuthentication",
    ),
    (ResultCode::InvalidCredentials, 49, "invalidCredentials"),
    (ResultCode::InsufficientAccessRights, 50, "insufficientAccessRights"),
    (ResultCode::Busy, 51, "busy"),
    (ResultCode::Unavailable, 52, "unavailable"),
    (ResultCode::UnwillingToPerform, 53, "unwillingToPerform"),
    (ResultCode::LoopDetect, 54, "loopDetect"),
    (ResultCode::NamingViolation, 64, "namingViolation"),
    (ResultCode::ObjectClassViolation, 65, "objectClassViolation"),
    (ResultCode::NotAllowedOnNonLeaf, 66, "notAllowedOnNonLeaf"),
    (ResultCode::NotAllowedOnRdn, 67, "notAllowedOnRDN"),
    (ResultCode::EntryAlreadyExists, 68, "entryAlreadyExists"),
    (
        ResultCode::ObjectClassModsProhibited,
        69,
        "objectClassModsProhibited",
    ),
    (ResultCode::AffectsMultipleDsas, 71, "affectsMultipleDSAs"),
    (ResultCode::Other, 80, "other"),
];

impl ResultCode {
    /// Numeric value carried on the wire.
    pub fn code(&self) -> u32 {
        RESULT_CODES
            .iter()
            .find(|(rc, _, _)| rc == self)
            .map(|(_, code, _)| *code)
            .unwrap_or(80)
    }

    /// Maps a wire value back to a result code. Unassigned values map to `Other`.
    pub fn from_code(code: u32) -> Self {
        RESULT_CODES
            .iter()
            .find(|(_, c, _)| *c == code)
            .map(|(rc, _, _)| *rc)
            .unwrap_or(ResultCode::Other)
    }

    /// RFC4511 descriptor, e.g. `noSuchObject`.
    pub fn name(&self) -> &'static str {
        RESULT_CODES
            .iter()
            .find(|(rc, _, _)| rc == self)
            .map(|(_, _, name)| *name)
            .unwrap_or("other")
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// Domain errors that map onto exactly one LDAP result code.
///
/// Raised by request handlers and directory callbacks; the dispatcher turns
/// each into a single error response carrying the diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LdapError {
    #[error("operationsError: {0}")]
    OperationsError(String),
    #[error("protocolError: {0}")]
    ProtocolError(String),
    #[error("timeLimitExceeded: {0}")]
    TimeLimitExceeded(String),
    #[error("sizeLimitExceeded: {0}")]
    SizeLimitExceeded(String),
    #[error("authMethodNotSupported: {0}")]
    AuthMethodNotSupported(String),
    #[error("strongerAuthRequired: {0}")]
    StrongerAuthRequired(String),
    #[error("adminLimitExceeded: {0}")]
    AdminLimitExceeded(String),
    #[error("unavailableCriticalExtension: {0}")]
    UnavailableCriticalExtension(String),
    #[error("confidentialityRequired: {0}")]
    ConfidentialityRequired(String),
    #[error("noSuchAttribute: {0}")]
    NoSuchAttribute(String),
    #[error("undefinedAttributeType: {0}")]
    UndefinedAttributeType(String),
    #[error("inappropriateMatching: {0}")]
    InappropriateMatching(String),
    #[error("constraintViolation: {0}")]
    ConstraintViolation(String),
    #[error("attributeOrValueExists: {0}")]
    AttributeOrValueExists(String),
    #[error("invalidAttributeSyntax: {0}")]
    InvalidAttributeSyntax(String),
    #[error("noSuchObject: {0}")]
    NoSuchObject(String),
    #[error("aliasProblem: {0}")]
    AliasProblem(String),
    #[error("invalidDNSyntax: {0}")]
    InvalidDnSyntax(String),
    #[error("aliasDereferencingProblem: {0}")]
    AliasDereferencingProblem(String),
    #[error("inappropriateAuthentication: {0}")]
    InappropriateAuthentication(String),
    #[error("invalidCredentials: {0}")]
    InvalidCredentials(String),
    #[error("insufficientAccessRights: {0}")]
    InsufficientAccessRights(String),
    #[error("busy: {0}")]
    Busy(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("unwillingToPerform: {0}")]
    UnwillingToPerform(String),
    #[error("loopDetect: {0}")]
    LoopDetect(String),
    #[error("namingViolation: {0}")]
    NamingViolation(String),
    #[error("objectClassViolation: {0}")]
    ObjectClassViolation(String),
    #[error("notAllowedOnNonLeaf: {0}")]
    NotAllowedOnNonLeaf(String),
    #[error("notAllowedOnRDN: {0}")]
    NotAllowedOnRdn(String),
    #[error("entryAlreadyExists: {0}")]
    EntryAlreadyExists(String),
    #[error("objectClassModsProhibited: {0}")]
    ObjectClassModsProhibited(String),
    #[error("affectsMultipleDSAs: {0}")]
    AffectsMultipleDsas(String),
    #[error("other: {0}")]
    Other(String),
}

impl LdapError {
    /// Result code sent to the client for this error.
    pub fn result_code(&self) -> ResultCode {
        match self {
            LdapError::OperationsError(_) => ResultCode::OperationsError,
            LdapError::ProtocolError(_) => ResultCode::ProtocolError,
            LdapError::TimeLimitExceeded(_) => ResultCode::TimeLimitExceeded,
            LdapError::SizeLimitExceeded(_) => ResultCode::SizeLimitExceeded,
            LdapError::AuthMethodNotSupported(_) => ResultCode::AuthMethodNotSupported,
            LdapError::StrongerAuthRequired(_) => ResultCode::StrongerAuthRequired,
            LdapError::AdminLimitExceeded(_) => ResultCode::AdminLimitExceeded,
            LdapError::UnavailableCriticalExtension(_) => ResultCode::UnavailableCriticalExtension,
            LdapError::ConfidentialityRequired(_) => ResultCode::ConfidentialityRequired,
            LdapError::NoSuchAttribute(_) => ResultCode::NoSuchAttribute,
            LdapError::UndefinedAttributeType(_) => ResultCode::UndefinedAttributeType,
            LdapError::InappropriateMatching(_) => ResultCode::InappropriateMatching,
            LdapError::ConstraintViolation(_) => ResultCode::ConstraintViolation,
            LdapError::AttributeOrValueExists(_) => ResultCode::AttributeOrValueExists,
            LdapError::InvalidAttributeSyntax(_) => ResultCode::InvalidAttributeSyntax,
            LdapError::NoSuchObject(_) => ResultCode::NoSuchObject,
            LdapError::AliasProblem(_) => ResultCode::AliasProblem,
            LdapError::InvalidDnSyntax(_) => ResultCode::InvalidDnSyntax,
            LdapError::AliasDereferencingProblem(_) => ResultCode::AliasDereferencingProblem,
            LdapError::InappropriateAuthentication(_) => ResultCode::InappropriateAuthentication,
            LdapError::InvalidCredentials(_) => ResultCode::InvalidCredentials,
            LdapError::InsufficientAccessRights(_) => ResultCode::InsufficientAccessRights,
            LdapError::Busy(_) => ResultCode::Busy,
            LdapError::Unavailable(_) => ResultCode::Unavailable,
            LdapError::UnwillingToPerform(_) => ResultCode::UnwillingToPerform,
            LdapError::LoopDetect(_) => ResultCode::LoopDetect,
            LdapError::NamingViolation(_) => ResultCode::NamingViolation,
            LdapError::ObjectClassViolation(_) => ResultCode::ObjectClassViolation,
            LdapError::NotAllowedOnNonLeaf(_) => ResultCode::NotAllowedOnNonLeaf,
            LdapError::NotAllowedOnRdn(_) => ResultCode::NotAllowedOnRdn,
            LdapError::EntryAlreadyExists(_) => ResultCode::EntryAlreadyExists,
            LdapError::ObjectClassModsProhibited(_) => ResultCode::ObjectClassModsProhibited,
            LdapError::AffectsMultipleDsas(_) => ResultCode::AffectsMultipleDsas,
            LdapError::Other(_) => ResultCode::Other,
        }
    }

    /// Diagnostic message sent to the client.
    pub fn message(&self) -> &str {
        match self {
            LdapError::OperationsError(m)
            | LdapError::ProtocolError(m)
            | LdapError::TimeLimitExceeded(m)
            | LdapError::SizeLimitExceeded(m)
            | LdapError::AuthMethodNotSupported(m)
            | LdapError::StrongerAuthRequired(m)
            | LdapError::AdminLimitExceeded(m)
            | LdapError::UnavailableCriticalExtension(m)
            | LdapError::ConfidentialityRequired(m)
            | LdapError::NoSuchAttribute(m)
            | LdapError::UndefinedAttributeType(m)
            | LdapError::InappropriateMatching(m)
            | LdapError::ConstraintViolation(m)
            | LdapError::AttributeOrValueExists(m)
            | LdapError::InvalidAttributeSyntax(m)
            | LdapError::NoSuchObject(m)
            | LdapError::AliasProblem(m)
            | LdapError::InvalidDnSyntax(m)
            | LdapError::AliasDereferencingProblem(m)
            | LdapError::InappropriateAuthentication(m)
            | LdapError::InvalidCredentials(m)
            | LdapError::InsufficientAccessRights(m)
            | LdapError::Busy(m)
            | LdapError::Unavailable(m)
            | LdapError::UnwillingToPerform(m)
            | LdapError::LoopDetect(m)
            | LdapError::NamingViolation(m)
            | LdapError::ObjectClassViolation(m)
            | LdapError::NotAllowedOnNonLeaf(m)
            | LdapError::NotAllowedOnRdn(m)
            | LdapError::EntryAlreadyExists(m)
            | LdapError::ObjectClassModsProhibited(m)
            | LdapError::AffectsMultipleDsas(m)
            | LdapError::Other(m) => m,
        }
    }
}
