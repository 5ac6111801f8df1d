//! LDAP result codes.
//!
//! The numeric values follow RFC 4511 and the common `ldap.h` extensions. Only the codes the
//! client distinguishes get their own variant; anything else round-trips through
//! [`ResultCode::Other`].

use std::fmt;

/// Result code returned by a directory server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
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
    ProxyAuthzFailure,
    InappropriateAuthentication,
    InvalidCredentials,
    InsufficientAccess,
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
    VlvError,
    /// `other` (80) as sent by the server.
    OtherError,
    /// A code without a dedicated variant.
    Other(u32),
}

const TABLE: &[(u32, ResultCode, &str)] = &[
    (0x00, ResultCode::Success, "success"),
    (0x01, ResultCode::OperationsError, "operationsError"),
    (0x02, ResultCode::ProtocolError, "protocolError"),
    (0x03, ResultCode::TimeLimitExceeded, "timeLimitExceeded"),
    (0x04, ResultCode::SizeLimitExceeded, "sizeLimitExceeded"),
    (0x05, ResultCode::CompareFalse, "compareFalse"),
    (0x06, ResultCode::CompareTrue, "compareTrue"),
    (0x07, ResultCode::AuthMethodNotSupported, "authMethodNotSupported"),
    (0x08, ResultCode::StrongerAuthRequired, "strongerAuthRequired"),
    (0x0a, ResultCode::Referral, "referral"),
    (0x0b, ResultCode::AdminLimitExceeded, "adminLimitExceeded"),
    (0x0c, ResultCode::UnavailableCriticalExtension, "unavailableCriticalExtension"),
    (0x0d, ResultCode::ConfidentialityRequired, "confidentialityRequired"),
    (0x0e, ResultCode::SaslBindInProgress, "saslBindInProgress"),
    (0x10, ResultCode::NoSuchAttribute, "noSuchAttribute"),
    (0x11, ResultCode::UndefinedAttributeType, "undefinedAttributeType"),
    (0x12, ResultCode::InappropriateMatching, "inappropriateMatching"),
    (0x13, ResultCode::ConstraintViolation, "constraintViolation"),
    (0x14, ResultCode::AttributeOrValueExists, "attributeOrValueExists"),
    (0x15, ResultCode::InvalidAttributeSyntax, "invalidAttributeSyntax"),
    (0x20, ResultCode::NoSuchObject, "noSuchObject"),
    (0x21, ResultCode::AliasProblem, "aliasProblem"),
    (0x22, ResultCode::InvalidDnSyntax, "invalidDNSyntax"),
    (0x24, ResultCode::AliasDereferencingProblem, "aliasDereferencingProblem"),
    (0x2f, ResultCode::ProxyAuthzFailure, "proxiedAuthorizationDenied"),
    (0x30, ResultCode::InappropriateAuthentication, "inappropriateAuthentication"),
    (0x31, ResultCode::InvalidCredentials, "invalidCredentials"),
    (0x32, ResultCode::InsufficientAccess, "insufficientAccessRights"),
    (0x33, ResultCode::Busy, "busy"),
    (0x34, ResultCode::Unavailable, "unavailable"),
    (0x35, ResultCode::UnwillingToPerform, "unwillingToPerform"),
    (0x36, ResultCode::LoopDetect, "loopDetect"),
    (0x40, ResultCode::NamingViolation, "namingViolation"),
    (0x41, ResultCode::ObjectClassViolation, "objectClassViolation"),
    (0x42, ResultCode::NotAllowedOnNonLeaf, "notAllowedOnNonLeaf"),
    (0x43, ResultCode::NotAllowedOnRdn, "notAllowedOnRDN"),
    (0x44, ResultCode::EntryAlreadyExists, "entryAlreadyExists"),
    (0x45, ResultCode::ObjectClassModsProhibited, "objectClassModsProhibited"),
    (0x47, ResultCode::AffectsMultipleDsas, "affectsMultipleDSAs"),
    (0x4c, ResultCode::VlvError, "vlvError"),
    (0x50, ResultCode::OtherError, "other"),
];

impl ResultCode {
    /// Maps a numeric result code onto its variant.
    #[must_use]
    pub fn from_code(code: u32) -> Self {
        TABLE
            .iter()
            .find(|(value, _, _)| *value == code)
            .map_or(Self::Other(code), |(_, variant, _)| *variant)
    }

    /// Numeric value as sent on the wire.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::Other(code) => code,
            known => TABLE
                .iter()
                .find(|(_, variant, _)| *variant == known)
                .map_or(u32::MAX, |(value, _, _)| *value),
        }
    }

    /// Protocol name of the code, if it is one the client knows.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        TABLE
            .iter()
            .find(|(_, variant, _)| *variant == self)
            .map(|(_, _, name)| *name)
    }

    /// Returns true for `success`.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true for `busy`, the only status the client retries.
    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::Busy)
    }
}

impl From<u32> for ResultCode {
    fn from(code: u32) -> Self {
        Self::from_code(code)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} {name}", self.code()),
            None => write!(f, "{}", self.code()),
        }
    }
}
