//! Standard schema definitions.
//!
//! - RFC4512 core: operational attributes, `top`, `subschema`, `alias`,
//!   `extensibleObject`
//! - RFC4517 syntaxes and matching rules (the subset ldapd implements)
//! - RFC4519 user schema subset
//! - RFC2307 NIS subset (`posixAccount`, `posixGroup`, `shadowAccount`)

use crate::definitions::{MatchingRuleDefinition, SchemaDefinitions, SyntaxDefinition};
use crate::error::SchemaError;
use crate::matching::{MatchAlgorithm as A, MatchingRuleKind as K};
use crate::syntax::{oids, SyntaxKind as S};

/// Tag carried by the schema description syntaxes so that
/// `objectIdentifierFirstComponentMatch` applies to them.
const FIRST_COMPONENT_TAG: &str = "2.5.13.30";

fn syntaxes() -> Vec<SyntaxDefinition> {
    let description_tags = [oids::DIRECTORY_STRING, FIRST_COMPONENT_TAG];
    vec![
        SyntaxDefinition::new(oids::ATTRIBUTE_TYPE_DESCRIPTION, "Attribute Type Description", S::SchemaDescription)
            .with_tags(&description_tags),
        SyntaxDefinition::new(oids::BOOLEAN, "Boolean", S::Boolean),
        SyntaxDefinition::new(oids::COUNTRY_STRING, "Country String", S::CountryString)
            .with_tags(&[oids::DIRECTORY_STRING]),
        SyntaxDefinition::new(oids::DN, "DN", S::Dn),
        SyntaxDefinition::new(oids::DIRECTORY_STRING, "Directory String", S::DirectoryString),
        SyntaxDefinition::new(oids::GENERALIZED_TIME, "Generalized Time", S::GeneralizedTime),
        SyntaxDefinition::new(oids::IA5_STRING, "IA5 String", S::Ia5String)
            .with_tags(&[oids::DIRECTORY_STRING]),
        SyntaxDefinition::new(oids::INTEGER, "INTEGER", S::Integer),
        SyntaxDefinition::new(oids::MATCHING_RULE_DESCRIPTION, "Matching Rule Description", S::SchemaDescription)
            .with_tags(&description_tags),
        SyntaxDefinition::new(oids::MATCHING_RULE_USE_DESCRIPTION, "Matching Rule Use Description", S::SchemaDescription)
            .with_tags(&description_tags),
        SyntaxDefinition::new(oids::NUMERIC_STRING, "Numeric String", S::NumericString)
            .with_tags(&[oids::DIRECTORY_STRING]),
        SyntaxDefinition::new(oids::OBJECT_CLASS_DESCRIPTION, "Object Class Description", S::SchemaDescription)
            .with_tags(&description_tags),
        SyntaxDefinition::new(oids::OID, "OID", S::Oid),
        SyntaxDefinition::new(oids::OCTET_STRING, "Octet String", S::OctetString),
        SyntaxDefinition::new(oids::PRINTABLE_STRING, "Printable String", S::PrintableString)
            .with_tags(&[oids::DIRECTORY_STRING]),
        SyntaxDefinition::new(oids::TELEPHONE_NUMBER, "Telephone Number", S::TelephoneNumber)
            .with_tags(&[oids::DIRECTORY_STRING]),
        SyntaxDefinition::new(oids::LDAP_SYNTAX_DESCRIPTION, "LDAP Syntax Description", S::SchemaDescription)
            .with_tags(&description_tags),
        SyntaxDefinition::new(oids::SUBSTRING_ASSERTION, "Substring Assertion", S::SubstringAssertion),
    ]
}

fn matching_rules() -> Vec<MatchingRuleDefinition> {
    use MatchingRuleDefinition as R;
    vec![
        R::new("2.5.13.0", "objectIdentifierMatch", oids::OID, K::Equality, A::ObjectIdentifier),
        R::new("2.5.13.1", "distinguishedNameMatch", oids::DN, K::Equality, A::DistinguishedName),
        R::new("2.5.13.2", "caseIgnoreMatch", oids::DIRECTORY_STRING, K::Equality, A::CaseIgnore),
        R::new("2.5.13.3", "caseIgnoreOrderingMatch", oids::DIRECTORY_STRING, K::Ordering, A::CaseIgnore),
        R::new("2.5.13.4", "caseIgnoreSubstringsMatch", oids::SUBSTRING_ASSERTION, K::Substr, A::CaseIgnore)
            .with_tag(oids::DIRECTORY_STRING),
        R::new("2.5.13.5", "caseExactMatch", oids::DIRECTORY_STRING, K::Equality, A::CaseExact),
        R::new("2.5.13.6", "caseExactOrderingMatch", oids::DIRECTORY_STRING, K::Ordering, A::CaseExact),
        R::new("2.5.13.7", "caseExactSubstringsMatch", oids::SUBSTRING_ASSERTION, K::Substr, A::CaseExact)
            .with_tag(oids::DIRECTORY_STRING),
        R::new("2.5.13.8", "numericStringMatch", oids::NUMERIC_STRING, K::Equality, A::NumericString),
        R::new("2.5.13.9", "numericStringOrderingMatch", oids::NUMERIC_STRING, K::Ordering, A::NumericString),
        R::new("2.5.13.10", "numericStringSubstringsMatch", oids::SUBSTRING_ASSERTION, K::Substr, A::NumericString)
            .with_tag(oids::NUMERIC_STRING),
        R::new("2.5.13.13", "booleanMatch", oids::BOOLEAN, K::Equality, A::Boolean),
        R::new("2.5.13.14", "integerMatch", oids::INTEGER, K::Equality, A::Integer),
        R::new("2.5.13.15", "integerOrderingMatch", oids::INTEGER, K::Ordering, A::Integer),
        R::new("2.5.13.17", "octetStringMatch", oids::OCTET_STRING, K::Equality, A::OctetString),
        R::new("2.5.13.18", "octetStringOrderingMatch", oids::OCTET_STRING, K::Ordering, A::OctetString),
        R::new("2.5.13.20", "telephoneNumberMatch", oids::TELEPHONE_NUMBER, K::Equality, A::TelephoneNumber),
        R::new("2.5.13.21", "telephoneNumberSubstringsMatch", oids::SUBSTRING_ASSERTION, K::Substr, A::TelephoneNumber)
            .with_tag(oids::TELEPHONE_NUMBER),
        R::new("2.5.13.27", "generalizedTimeMatch", oids::GENERALIZED_TIME, K::Equality, A::GeneralizedTime),
        R::new("2.5.13.28", "generalizedTimeOrderingMatch", oids::GENERALIZED_TIME, K::Ordering, A::GeneralizedTime),
        R::new("2.5.13.30", "objectIdentifierFirstComponentMatch", oids::OID, K::Equality, A::ObjectIdentifierFirstComponent)
            .with_tag(FIRST_COMPONENT_TAG),
        R::new("1.3.6.1.4.1.1466.109.114.1", "caseExactIA5Match", oids::IA5_STRING, K::Equality, A::CaseExact),
        R::new("1.3.6.1.4.1.1466.109.114.2", "caseIgnoreIA5Match", oids::IA5_STRING, K::Equality, A::CaseIgnore),
        R::new("1.3.6.1.4.1.1466.109.114.3", "caseIgnoreIA5SubstringsMatch", oids::SUBSTRING_ASSERTION, K::Substr, A::CaseIgnore)
            .with_tag(oids::IA5_STRING),
    ]
}

const CORE_ATTRIBUTE_TYPES: &[&str] = &[
    "( 2.5.4.0 NAME 'objectClass' EQUALITY objectIdentifierMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.38 )",
    "( 2.5.4.1 NAME 'aliasedObjectName' EQUALITY distinguishedNameMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.12 SINGLE-VALUE )",
    "( 2.5.18.1 NAME 'createTimestamp' EQUALITY generalizedTimeMatch ORDERING generalizedTimeOrderingMatch \
       SYNTAX 1.3.6.1.4.1.1466.115.121.1.24 SINGLE-VALUE NO-USER-MODIFICATION USAGE directoryOperation )",
    "( 2.5.18.2 NAME 'modifyTimestamp' EQUALITY generalizedTimeMatch ORDERING generalizedTimeOrderingMatch \
       SYNTAX 1.3.6.1.4.1.1466.115.121.1.24 SINGLE-VALUE NO-USER-MODIFICATION USAGE directoryOperation )",
    "( 2.5.18.3 NAME 'creatorsName' EQUALITY distinguishedNameMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.12 \
       SINGLE-VALUE NO-USER-MODIFICATION USAGE directoryOperation )",
    "( 2.5.18.4 NAME 'modifiersName' EQUALITY distinguishedNameMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.12 \
       SINGLE-VALUE NO-USER-MODIFICATION USAGE directoryOperation )",
    "( 2.5.18.9 NAME 'hasSubordinates' EQUALITY booleanMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.7 \
       SINGLE-VALUE NO-USER-MODIFICATION USAGE directoryOperation )",
    "( 2.5.18.10 NAME 'subschemaSubentry' EQUALITY distinguishedNameMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.12 \
       SINGLE-VALUE NO-USER-MODIFICATION USAGE directoryOperation )",
    "( 2.5.21.5 NAME 'attributeTypes' EQUALITY objectIdentifierFirstComponentMatch \
       SYNTAX 1.3.6.1.4.1.1466.115.121.1.3 USAGE directoryOperation )",
    "( 2.5.21.6 NAME 'objectClasses' EQUALITY objectIdentifierFirstComponentMatch \
       SYNTAX 1.3.6.1.4.1.1466.115.121.1.37 USAGE directoryOperation )",
    "( 2.5.21.4 NAME 'matchingRules' EQUALITY objectIdentifierFirstComponentMatch \
       SYNTAX 1.3.6.1.4.1.1466.115.121.1.30 USAGE directoryOperation )",
    "( 2.5.21.8 NAME 'matchingRuleUse' EQUALITY objectIdentifierFirstComponentMatch \
       SYNTAX 1.3.6.1.4.1.1466.115.121.1.31 USAGE directoryOperation )",
    "( 1.3.6.1.4.1.1466.101.120.16 NAME 'ldapSyntaxes' EQUALITY objectIdentifierFirstComponentMatch \
       SYNTAX 1.3.6.1.4.1.1466.115.121.1.54 USAGE directoryOperation )",
    "( 1.3.6.1.4.1.1466.101.120.5 NAME 'namingContexts' SYNTAX 1.3.6.1.4.1.1466.115.121.1.12 USAGE dSAOperation )",
    "( 1.3.6.1.4.1.1466.101.120.7 NAME 'supportedExtension' SYNTAX 1.3.6.1.4.1.1466.115.121.1.38 USAGE dSAOperation )",
    "( 1.3.6.1.4.1.1466.101.120.13 NAME 'supportedControl' SYNTAX 1.3.6.1.4.1.1466.115.121.1.38 USAGE dSAOperation )",
    "( 1.3.6.1.4.1.1466.101.120.14 NAME 'supportedSASLMechanisms' SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 USAGE dSAOperation )",
    "( 1.3.6.1.4.1.4203.1.3.5 NAME 'supportedFeatures' EQUALITY objectIdentifierMatch \
       SYNTAX 1.3.6.1.4.1.1466.115.121.1.38 USAGE dSAOperation )",
    "( 1.3.6.1.4.1.1466.101.120.15 NAME 'supportedLDAPVersion' SYNTAX 1.3.6.1.4.1.1466.115.121.1.27 USAGE dSAOperation )",
    "( 1.3.6.1.1.4 NAME 'vendorName' EQUALITY caseExactMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 \
       SINGLE-VALUE NO-USER-MODIFICATION USAGE dSAOperation )",
    "( 1.3.6.1.1.5 NAME 'vendorVersion' EQUALITY caseExactMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 \
       SINGLE-VALUE NO-USER-MODIFICATION USAGE dSAOperation )",
];

const CORE_OBJECT_CLASSES: &[&str] = &[
    "( 2.5.6.0 NAME 'top' ABSTRACT MUST objectClass )",
    "( 2.5.6.1 NAME 'alias' SUP top STRUCTURAL MUST aliasedObjectName )",
    "( 2.5.20.1 NAME 'subschema' AUXILIARY \
       MAY ( objectClasses $ attributeTypes $ matchingRules $ matchingRuleUse $ ldapSyntaxes ) )",
    "( 1.3.6.1.4.1.1466.101.120.111 NAME 'extensibleObject' SUP top AUXILIARY )",
];

const RFC4519_ATTRIBUTE_TYPES: &[&str] = &[
    "( 2.5.4.41 NAME 'name' EQUALITY caseIgnoreMatch SUBSTR caseIgnoreSubstringsMatch \
       SYNTAX 1.3.6.1.4.1.1466.115.121.1.15{32768} )",
    "( 2.5.4.3 NAME ( 'cn' 'commonName' ) SUP name )",
    "( 2.5.4.4 NAME ( 'sn' 'surname' ) SUP name )",
    "( 2.5.4.42 NAME 'givenName' SUP name )",
    "( 2.5.4.12 NAME 'title' SUP name )",
    "( 2.5.4.7 NAME ( 'l' 'localityName' ) SUP name )",
    "( 2.5.4.10 NAME ( 'o' 'organizationName' ) SUP name )",
    "( 2.5.4.11 NAME ( 'ou' 'organizationalUnitName' ) SUP name )",
    "( 2.5.4.6 NAME ( 'c' 'countryName' ) SUP name SYNTAX 1.3.6.1.4.1.1466.115.121.1.11 SINGLE-VALUE )",
    "( 0.9.2342.19200300.100.1.25 NAME ( 'dc' 'domainComponent' ) EQUALITY caseIgnoreIA5Match \
       SUBSTR caseIgnoreIA5SubstringsMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.26 SINGLE-VALUE )",
    "( 2.5.4.13 NAME 'description' EQUALITY caseIgnoreMatch SUBSTR caseIgnoreSubstringsMatch \
       SYNTAX 1.3.6.1.4.1.1466.115.121.1.15{1024} )",
    "( 2.5.4.49 NAME 'distinguishedName' EQUALITY distinguishedNameMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.12 )",
    "( 2.5.4.31 NAME 'member' SUP distinguishedName )",
    "( 2.5.4.32 NAME 'owner' SUP distinguishedName )",
    "( 2.5.4.34 NAME 'seeAlso' SUP distinguishedName )",
    "( 0.9.2342.19200300.100.1.1 NAME ( 'uid' 'userid' ) EQUALITY caseIgnoreMatch \
       SUBSTR caseIgnoreSubstringsMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15{256} )",
    "( 0.9.2342.19200300.100.1.3 NAME ( 'mail' 'rfc822Mailbox' ) EQUALITY caseIgnoreIA5Match \
       SUBSTR caseIgnoreIA5SubstringsMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.26{256} )",
    "( 2.5.4.20 NAME 'telephoneNumber' EQUALITY telephoneNumberMatch SUBSTR telephoneNumberSubstringsMatch \
       SYNTAX 1.3.6.1.4.1.1466.115.121.1.50{32} )",
    "( 2.5.4.35 NAME 'userPassword' EQUALITY octetStringMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.40{128} )",
];

const RFC4519_OBJECT_CLASSES: &[&str] = &[
    "( 2.5.6.6 NAME 'person' SUP top STRUCTURAL MUST ( sn $ cn ) \
       MAY ( userPassword $ telephoneNumber $ seeAlso $ description ) )",
    "( 2.5.6.7 NAME 'organizationalPerson' SUP person STRUCTURAL MAY ( title $ ou $ l ) )",
    "( 2.16.840.1.113730.3.2.2 NAME 'inetOrgPerson' SUP organizationalPerson STRUCTURAL \
       MAY ( givenName $ mail $ uid ) )",
    "( 2.5.6.4 NAME 'organization' SUP top STRUCTURAL MUST o \
       MAY ( userPassword $ telephoneNumber $ seeAlso $ l $ description ) )",
    "( 2.5.6.5 NAME 'organizationalUnit' SUP top STRUCTURAL MUST ou \
       MAY ( userPassword $ telephoneNumber $ seeAlso $ l $ description ) )",
    "( 2.5.6.9 NAME 'groupOfNames' SUP top STRUCTURAL MUST ( member $ cn ) \
       MAY ( owner $ ou $ o $ seeAlso $ description ) )",
    "( 1.3.6.1.4.1.1466.344 NAME 'dcObject' SUP top AUXILIARY MUST dc )",
    "( 1.3.6.1.1.3.1 NAME 'uidObject' SUP top AUXILIARY MUST uid )",
];

const NIS_ATTRIBUTE_TYPES: &[&str] = &[
    "( 1.3.6.1.1.1.1.0 NAME 'uidNumber' EQUALITY integerMatch ORDERING integerOrderingMatch \
       SYNTAX 1.3.6.1.4.1.1466.115.121.1.27 SINGLE-VALUE )",
    "( 1.3.6.1.1.1.1.1 NAME 'gidNumber' EQUALITY integerMatch ORDERING integerOrderingMatch \
       SYNTAX 1.3.6.1.4.1.1466.115.121.1.27 SINGLE-VALUE )",
    "( 1.3.6.1.1.1.1.2 NAME 'gecos' EQUALITY caseIgnoreIA5Match SUBSTR caseIgnoreIA5SubstringsMatch \
       SYNTAX 1.3.6.1.4.1.1466.115.121.1.26 SINGLE-VALUE )",
    "( 1.3.6.1.1.1.1.3 NAME 'homeDirectory' EQUALITY caseExactIA5Match \
       SYNTAX 1.3.6.1.4.1.1466.115.121.1.26 SINGLE-VALUE )",
    "( 1.3.6.1.1.1.1.4 NAME 'loginShell' EQUALITY caseExactIA5Match \
       SYNTAX 1.3.6.1.4.1.1466.115.121.1.26 SINGLE-VALUE )",
    "( 1.3.6.1.1.1.1.5 NAME 'shadowLastChange' EQUALITY integerMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.27 SINGLE-VALUE )",
    "( 1.3.6.1.1.1.1.6 NAME 'shadowMin' EQUALITY integerMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.27 SINGLE-VALUE )",
    "( 1.3.6.1.1.1.1.7 NAME 'shadowMax' EQUALITY integerMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.27 SINGLE-VALUE )",
    "( 1.3.6.1.1.1.1.8 NAME 'shadowWarning' EQUALITY integerMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.27 SINGLE-VALUE )",
    "( 1.3.6.1.1.1.1.9 NAME 'shadowInactive' EQUALITY integerMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.27 SINGLE-VALUE )",
    "( 1.3.6.1.1.1.1.10 NAME 'shadowExpire' EQUALITY integerMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.27 SINGLE-VALUE )",
    "( 1.3.6.1.1.1.1.11 NAME 'shadowFlag' EQUALITY integerMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.27 SINGLE-VALUE )",
    "( 1.3.6.1.1.1.1.12 NAME 'memberUid' EQUALITY caseExactIA5Match SUBSTR caseIgnoreIA5SubstringsMatch \
       SYNTAX 1.3.6.1.4.1.1466.115.121.1.26 )",
];

const NIS_OBJECT_CLASSES: &[&str] = &[
    "( 1.3.6.1.1.1.2.0 NAME 'posixAccount' SUP top AUXILIARY \
       MUST ( cn $ uid $ uidNumber $ gidNumber $ homeDirectory ) \
       MAY ( userPassword $ loginShell $ gecos $ description ) )",
    "( 1.3.6.1.1.1.2.1 NAME 'shadowAccount' SUP top AUXILIARY MUST uid \
       MAY ( userPassword $ shadowLastChange $ shadowMin $ shadowMax $ shadowWarning \
       $ shadowInactive $ shadowExpire $ shadowFlag $ description ) )",
    "( 1.3.6.1.1.1.2.2 NAME 'posixGroup' SUP top STRUCTURAL MUST ( cn $ gidNumber ) \
       MAY ( userPassword $ memberUid $ description ) )",
];

/// RFC4512 core definitions, present in every schema.
pub fn core_definitions() -> Result<SchemaDefinitions, SchemaError> {
    let mut definitions = SchemaDefinitions::parse(CORE_ATTRIBUTE_TYPES, CORE_OBJECT_CLASSES)?;
    definitions.syntaxes = syntaxes();
    definitions.matching_rules = matching_rules();
    Ok(definitions)
}

/// RFC4519 user schema subset.
pub fn rfc4519_definitions() -> Result<SchemaDefinitions, SchemaError> {
    SchemaDefinitions::parse(RFC4519_ATTRIBUTE_TYPES, RFC4519_OBJECT_CLASSES)
}

/// RFC2307 NIS subset. Depends on the RFC4519 definitions.
pub fn nis_definitions() -> Result<SchemaDefinitions, SchemaError> {
    SchemaDefinitions::parse(NIS_ATTRIBUTE_TYPES, NIS_OBJECT_CLASSES)
}
