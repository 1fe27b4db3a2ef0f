//! Directory backends.
//!
//! A [`Directory`] supplies entries and decides authentication. Every method
//! has a default, so a backend only implements what it supports. Methods are
//! called from all connection tasks without serialization.

use crate::auth::PasswordValidator;
use crate::config::{DirectoryConfig, UserConfig};
use ldapd_core::{Entry, EntryTemplate};
use ldapd_protocol::{Change, Filter, LdapError, PartialAttribute, SearchScope};
use ldapd_schema::{Dn, Rdn, Schema, Value};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// The identity a connection is bound as.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BindObject {
    #[default]
    Anonymous,
    /// A directory entry.
    Dn(Dn),
    /// An identity established outside LDAP, e.g. by a client certificate.
    External(String),
}

impl BindObject {
    /// RFC4513 authorization identity: empty, `dn:<dn>` or `u:<user>`.
    pub fn authz_id(&self) -> String {
        match self {
            BindObject::Anonymous => String::new(),
            BindObject::Dn(dn) => format!("dn:{}", dn),
            BindObject::External(id) => format!("u:{}", id),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, BindObject::Anonymous)
    }
}

/// Lazily produced search candidates.
pub type EntryIter = Box<dyn Iterator<Item = Entry> + Send>;

/// Host side of the request handler.
pub trait Directory: Send + Sync {
    /// Naming contexts advertised in the root DSE.
    fn naming_contexts(&self) -> Vec<String> {
        Vec::new()
    }

    /// Candidate entries for a search. Candidates may lie outside the search
    /// area or fail the filter; each one is checked again before it is
    /// returned.
    fn do_search(
        &self,
        _base: &Dn,
        _scope: SearchScope,
        _filter: &Filter,
    ) -> Result<EntryIter, LdapError> {
        Ok(Box::new(std::iter::empty()))
    }

    /// The entry a COMPARE targets, or `None` if it does not exist.
    fn do_compare(&self, _dn: &Dn, _attribute: &str, _value: &[u8]) -> Result<Option<Entry>, LdapError> {
        Ok(None)
    }

    /// Simple bind with empty name and password.
    fn do_bind_simple_anonymous(&self) -> Result<BindObject, LdapError> {
        Ok(BindObject::Anonymous)
    }

    /// Simple bind with a name but no password (RFC4513 section 5.1.2).
    fn do_bind_simple_unauthenticated(&self, _name: &str) -> Result<BindObject, LdapError> {
        Err(LdapError::InvalidCredentials(
            "unauthenticated bind is not allowed".to_string(),
        ))
    }

    /// Simple bind with name and password.
    fn do_bind_simple_authenticated(
        &self,
        _name: &str,
        _password: &[u8],
    ) -> Result<BindObject, LdapError> {
        Err(LdapError::InvalidCredentials("invalid credentials".to_string()))
    }

    fn do_bind_sasl_anonymous(&self, _trace: Option<&str>) -> Result<BindObject, LdapError> {
        Err(LdapError::AuthMethodNotSupported(
            "SASL ANONYMOUS is not supported".to_string(),
        ))
    }

    fn do_bind_sasl_plain(
        &self,
        _authcid: &str,
        _password: &str,
        _authzid: Option<&str>,
    ) -> Result<BindObject, LdapError> {
        Err(LdapError::InvalidCredentials("invalid credentials".to_string()))
    }

    /// `identity` is the transport identity of the connection, if any.
    fn do_bind_sasl_external(
        &self,
        _identity: Option<&str>,
        _authzid: Option<&str>,
    ) -> Result<BindObject, LdapError> {
        Err(LdapError::AuthMethodNotSupported(
            "SASL EXTERNAL is not supported".to_string(),
        ))
    }

    /// Called before a StartTLS upgrade; an error refuses it.
    fn do_starttls(&self) -> Result<(), LdapError> {
        Ok(())
    }

    fn do_whoami(&self, bind: &BindObject) -> Result<String, LdapError> {
        Ok(bind.authz_id())
    }

    /// Changes a password. Returns the generated password when `new` is absent.
    fn do_password_modify(
        &self,
        _bind: &BindObject,
        _user: Option<&str>,
        _old: Option<&[u8]>,
        _new: Option<&[u8]>,
    ) -> Result<Option<Vec<u8>>, LdapError> {
        Err(LdapError::UnwillingToPerform(
            "password change is not supported".to_string(),
        ))
    }

    fn do_add(&self, _dn: &Dn, _attributes: &[PartialAttribute]) -> Result<(), LdapError> {
        Err(read_only())
    }

    fn do_delete(&self, _dn: &Dn) -> Result<(), LdapError> {
        Err(read_only())
    }

    fn do_modify(&self, _dn: &Dn, _changes: &[Change]) -> Result<(), LdapError> {
        Err(read_only())
    }

    fn do_modify_dn(
        &self,
        _dn: &Dn,
        _new_rdn: &str,
        _delete_old_rdn: bool,
        _new_superior: Option<&Dn>,
    ) -> Result<(), LdapError> {
        Err(read_only())
    }
}

/// Whether `candidate` can satisfy every constraint value under the
/// attribute's EQUALITY rule. Comparisons that cannot be decided keep the
/// candidate, so pruning never drops an entry the filter would match.
fn admits(schema: &Schema, attribute: &str, constraints: &[Value], candidate: Value) -> bool {
    if constraints.is_empty() {
        return true;
    }
    let Some(rule) = schema
        .attribute_type(attribute)
        .and_then(|at| at.equality)
        .map(|id| schema.matching_rule_by_id(id))
    else {
        return true;
    };
    let candidate = [candidate];
    constraints.iter().all(|constraint| {
        rule.match_equal(schema, &candidate, &constraint.to_bytes())
            .unwrap_or(true)
    })
}

fn read_only() -> LdapError {
    LdapError::UnwillingToPerform("directory is read-only".to_string())
}

/// A directory built from configuration.
///
/// Serves the base entry, `ou=people` and `ou=groups`, one posixGroup per
/// configured group and one posixAccount per configured user. User entries
/// are generated from an [`EntryTemplate`] only when a search can match them.
pub struct StaticDirectory {
    schema: Schema,
    base: Dn,
    people: Dn,
    entries: Arc<Vec<Entry>>,
    users: Arc<Vec<UserConfig>>,
    template: Arc<EntryTemplate>,
    passwords: RwLock<PasswordValidator>,
    allow_anonymous: bool,
}

impl StaticDirectory {
    pub fn new(
        schema: &Schema,
        config: &DirectoryConfig,
        allow_anonymous: bool,
    ) -> Result<Self, LdapError> {
        let base = Dn::parse(&config.base_dn)?;
        let people = base.child(Rdn::single("ou", "people"));
        let groups = base.child(Rdn::single("ou", "groups"));

        let mut entries = Vec::new();

        let mut root = Entry::new(schema, base.clone());
        let attrs = root.attributes_mut();
        attrs.set_text("objectClass", &["top", "organization", "dcObject"])?;
        attrs.set_text("o", &[&config.organization])?;
        if let Some(rdn) = base.rdn() {
            for assertion in rdn.assertions() {
                attrs.set_text(&assertion.attribute, &[&assertion.value])?;
            }
        }
        entries.push(root);

        for (dn, ou) in [(&people, "people"), (&groups, "groups")] {
            let mut entry = Entry::new(schema, dn.clone());
            entry
                .attributes_mut()
                .set_text("objectClass", &["top", "organizationalUnit"])?;
            entry.attributes_mut().set_text("ou", &[ou])?;
            entries.push(entry);
        }

        for group in &config.groups {
            let mut entry = Entry::new(schema, groups.child(Rdn::single("cn", group.cn.as_str())));
            let attrs = entry.attributes_mut();
            attrs.set_text("objectClass", &["top", "posixGroup"])?;
            attrs.set_text("cn", &[&group.cn])?;
            attrs.set("gidNumber", vec![Value::Integer(group.gid_number)])?;
            attrs.set_text("memberUid", group.members.as_slice())?;
            entries.push(entry);
        }

        let mut template = EntryTemplate::new(schema, people.clone(), "uid")?;
        template.attributes_mut().set_text(
            "objectClass",
            &["top", "person", "organizationalPerson", "inetOrgPerson", "posixAccount"],
        )?;
        for wildcard in [
            "cn",
            "sn",
            "uidNumber",
            "gidNumber",
            "homeDirectory",
            "loginShell",
            "mail",
        ] {
            template.set_wildcard(wildcard)?;
        }

        let passwords = PasswordValidator::new(
            config
                .users
                .iter()
                .filter_map(|u| u.password_hash.clone().map(|h| (u.uid.clone(), h))),
        );

        info!(
            "Static directory at {}: {} entries, {} users ({} with passwords)",
            base,
            entries.len(),
            config.users.len(),
            passwords.len()
        );

        Ok(Self {
            schema: schema.clone(),
            base,
            people,
            entries: Arc::new(entries),
            users: Arc::new(config.users.clone()),
            template: Arc::new(template),
            passwords: RwLock::new(passwords),
            allow_anonymous,
        })
    }

    /// Generates the entry of one configured user.
    fn user_entry(template: &EntryTemplate, user: &UserConfig) -> Result<Entry, LdapError> {
        let cn = user.cn.clone().unwrap_or_else(|| user.uid.clone());
        let sn = cn.rsplit(' ').next().unwrap_or(&cn).to_string();
        let home = user
            .home_directory
            .clone()
            .unwrap_or_else(|| format!("/home/{}", user.uid));
        let mut overrides = vec![
            ("cn", vec![Value::String(cn)]),
            ("sn", vec![Value::String(sn)]),
            ("uidNumber", vec![Value::Integer(user.uid_number)]),
            ("gidNumber", vec![Value::Integer(user.gid_number)]),
            ("homeDirectory", vec![Value::String(home)]),
        ];
        if let Some(shell) = &user.login_shell {
            overrides.push(("loginShell", vec![Value::String(shell.clone())]));
        }
        if let Some(mail) = &user.mail {
            overrides.push(("mail", vec![Value::String(mail.clone())]));
        }
        template.create_entry(&user.uid, overrides)
    }

    /// The uid named by a user DN, `dn:<dn>`, `u:<uid>` or a bare uid.
    fn resolve_user(&self, identity: &str) -> Option<&UserConfig> {
        let uid = if let Some(uid) = identity.strip_prefix("u:") {
            uid.to_string()
        } else {
            let dn_text = identity.strip_prefix("dn:").unwrap_or(identity);
            match Dn::parse(dn_text) {
                Ok(dn) if dn.is_child_of(&self.people) => {
                    let assertion = dn.rdn()?.assertions().first()?;
                    if !assertion.attribute.eq_ignore_ascii_case("uid") {
                        return None;
                    }
                    assertion.value.clone()
                }
                _ if !identity.contains('=') => identity.to_string(),
                _ => return None,
            }
        };
        self.users.iter().find(|u| u.uid.eq_ignore_ascii_case(&uid))
    }

    fn user_dn(&self, user: &UserConfig) -> Dn {
        self.people.child(Rdn::single("uid", user.uid.as_str()))
    }

    fn check_password(&self, identity: &str, password: &[u8]) -> Result<BindObject, LdapError> {
        match self.resolve_user(identity) {
            Some(user) if self.passwords.read().validate(&user.uid, password) => {
                Ok(BindObject::Dn(self.user_dn(user)))
            }
            _ => {
                debug!("Password check failed for '{}'", identity);
                Err(LdapError::InvalidCredentials("invalid credentials".to_string()))
            }
        }
    }
}

impl Directory for StaticDirectory {
    fn naming_contexts(&self) -> Vec<String> {
        vec![self.base.to_string()]
    }

    fn do_search(&self, base: &Dn, scope: SearchScope, filter: &Filter) -> Result<EntryIter, LdapError> {
        let fixed = self.entries.as_ref().clone().into_iter();
        if !self.template.match_search(base, scope, filter) {
            return Ok(Box::new(fixed));
        }

        let constraints = self.template.extract_search_constraints(base, scope, filter);
        let uids = constraints.get("uid", false)?;
        let uid_numbers = constraints.get("uidNumber", false)?;
        debug!(
            "Generating users under {} (uid constraints: {:?})",
            self.people, uids
        );

        let schema = self.schema.clone();
        let users = Arc::clone(&self.users);
        let template = Arc::clone(&self.template);
        let generated = (0..users.len()).filter_map(move |i| {
            let user = &users[i];
            if !admits(&schema, "uid", &uids, Value::String(user.uid.clone())) {
                return None;
            }
            if !admits(&schema, "uidNumber", &uid_numbers, Value::Integer(user.uid_number)) {
                return None;
            }
            Self::user_entry(&template, user).ok()
        });
        Ok(Box::new(fixed.chain(generated)))
    }

    fn do_compare(&self, dn: &Dn, _attribute: &str, _value: &[u8]) -> Result<Option<Entry>, LdapError> {
        if let Some(entry) = self.entries.iter().find(|e| e.dn() == dn) {
            return Ok(Some(entry.clone()));
        }
        match self.resolve_user(&format!("dn:{}", dn)) {
            Some(user) => Ok(Some(Self::user_entry(&self.template, user)?)),
            None => Ok(None),
        }
    }

    fn do_bind_simple_anonymous(&self) -> Result<BindObject, LdapError> {
        if self.allow_anonymous {
            Ok(BindObject::Anonymous)
        } else {
            Err(LdapError::InappropriateAuthentication(
                "anonymous bind is disabled".to_string(),
            ))
        }
    }

    fn do_bind_simple_authenticated(
        &self,
        name: &str,
        password: &[u8],
    ) -> Result<BindObject, LdapError> {
        Dn::parse(name)?;
        self.check_password(&format!("dn:{}", name), password)
    }

    fn do_bind_sasl_anonymous(&self, trace: Option<&str>) -> Result<BindObject, LdapError> {
        if let Some(trace) = trace {
            debug!("SASL ANONYMOUS trace: {}", trace);
        }
        self.do_bind_simple_anonymous()
    }

    fn do_bind_sasl_plain(
        &self,
        authcid: &str,
        password: &str,
        authzid: Option<&str>,
    ) -> Result<BindObject, LdapError> {
        let bind = self.check_password(authcid, password.as_bytes())?;
        if let Some(authzid) = authzid {
            let same = match (&bind, self.resolve_user(authzid)) {
                (BindObject::Dn(dn), Some(user)) => *dn == self.user_dn(user),
                _ => false,
            };
            if !same {
                return Err(LdapError::InsufficientAccessRights(format!(
                    "not authorized to assume identity '{}'",
                    authzid
                )));
            }
        }
        Ok(bind)
    }

    fn do_bind_sasl_external(
        &self,
        identity: Option<&str>,
        authzid: Option<&str>,
    ) -> Result<BindObject, LdapError> {
        let identity = identity.ok_or_else(|| {
            LdapError::InappropriateAuthentication("no client certificate presented".to_string())
        })?;
        match authzid {
            None => Ok(BindObject::External(identity.to_string())),
            Some(authzid) => Err(LdapError::InsufficientAccessRights(format!(
                "not authorized to assume identity '{}'",
                authzid
            ))),
        }
    }

    fn do_password_modify(
        &self,
        bind: &BindObject,
        user: Option<&str>,
        old: Option<&[u8]>,
        new: Option<&[u8]>,
    ) -> Result<Option<Vec<u8>>, LdapError> {
        let BindObject::Dn(bound_dn) = bind else {
            return Err(LdapError::UnwillingToPerform(
                "password change requires a bound user".to_string(),
            ));
        };
        let target = match user {
            Some(identity) => self.resolve_user(identity),
            None => self.resolve_user(&format!("dn:{}", bound_dn)),
        }
        .ok_or_else(|| LdapError::NoSuchObject("no such user".to_string()))?;
        if self.user_dn(target) != *bound_dn {
            return Err(LdapError::InsufficientAccessRights(
                "only the user may change their password".to_string(),
            ));
        }

        let mut passwords = self.passwords.write();
        if let Some(old) = old {
            if !passwords.validate(&target.uid, old) {
                return Err(LdapError::InvalidCredentials(
                    "old password does not match".to_string(),
                ));
            }
        }
        let (password, generated) = match new {
            Some(new) => (new.to_vec(), None),
            None => {
                let generated = uuid::Uuid::new_v4().simple().to_string().into_bytes();
                (generated.clone(), Some(generated))
            }
        };
        passwords.set_password(&target.uid, &password);
        info!("Password changed for {}", target.uid);
        Ok(generated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupConfig;
    use ldapd_protocol::{ResultCode, SearchRequest};

    fn config() -> DirectoryConfig {
        DirectoryConfig {
            users: vec![
                UserConfig {
                    uid: "alice".into(),
                    cn: Some("Alice Liddell".into()),
                    uid_number: 1000,
                    gid_number: 100,
                    password_hash: Some(PasswordValidator::hash_password(b"wonderland")),
                    ..Default::default()
                },
                UserConfig {
                    uid: "bob".into(),
                    uid_number: 1001,
                    gid_number: 100,
                    ..Default::default()
                },
            ],
            groups: vec![GroupConfig {
                cn: "staff".into(),
                gid_number: 100,
                members: vec!["alice".into(), "bob".into()],
            }],
            ..Default::default()
        }
    }

    fn directory() -> StaticDirectory {
        StaticDirectory::new(&Schema::standard().unwrap(), &config(), true).unwrap()
    }

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn search(dir: &StaticDirectory, base: &str, scope: SearchScope, filter: &str) -> Vec<String> {
        let mut request = SearchRequest::new(base, scope, filter.parse().unwrap());
        request.attributes = vec!["1.1".into()];
        dir.do_search(&dn(base), scope, &request.filter)
            .unwrap()
            .filter_map(|e| e.search(&request).unwrap())
            .map(|r| r.object_name)
            .collect()
    }

    #[test]
    fn test_search_all() {
        let dir = directory();
        let names = search(&dir, "dc=example,dc=com", SearchScope::WholeSubtree, "(objectClass=*)");
        assert_eq!(names.len(), 6);
        assert!(names.contains(&"uid=alice,ou=people,dc=example,dc=com".to_string()));
        assert!(names.contains(&"cn=staff,ou=groups,dc=example,dc=com".to_string()));
    }

    #[test]
    fn test_search_users() {
        let dir = directory();
        let base = "dc=example,dc=com";
        let scope = SearchScope::WholeSubtree;
        assert_eq!(
            search(&dir, base, scope, "(&(objectClass=posixAccount)(uid=bob))"),
            vec!["uid=bob,ou=people,dc=example,dc=com"]
        );
        assert_eq!(search(&dir, base, scope, "(uidNumber>=1001)").len(), 1);
        assert_eq!(search(&dir, base, scope, "(cn=alice*)").len(), 1);
        assert_eq!(search(&dir, base, scope, "(memberUid=alice)").len(), 1);
        assert!(search(&dir, base, scope, "(uid=carol)").is_empty());
    }

    #[test]
    fn test_pruning_uses_equality_rule() {
        let dir = directory();
        let base = "dc=example,dc=com";
        let scope = SearchScope::WholeSubtree;
        let alice = vec!["uid=alice,ou=people,dc=example,dc=com".to_string()];
        assert_eq!(search(&dir, base, scope, "(uid=alice )"), alice);
        assert_eq!(search(&dir, base, scope, "(uid= ALICE)"), alice);
        assert_eq!(
            search(&dir, base, scope, "(&(objectClass=posixAccount)(uid=Alice)(uidNumber=1000))"),
            alice
        );
        assert!(search(&dir, base, scope, "(&(uid=alice)(uidNumber=1001))").is_empty());
    }

    #[test]
    fn test_template_pruning_skips_generation() {
        let dir = directory();
        let filter: Filter = "(objectClass=posixGroup)".parse().unwrap();
        let candidates = dir
            .do_search(&dn("dc=example,dc=com"), SearchScope::WholeSubtree, &filter)
            .unwrap()
            .count();
        // Only the fixed entries are produced
        assert_eq!(candidates, 4);
    }

    #[test]
    fn test_compare_generated_user() {
        let dir = directory();
        let target = dn("uid=alice,ou=people,dc=example,dc=com");
        let entry = dir.do_compare(&target, "uidNumber", b"1000").unwrap().unwrap();
        assert!(entry.compare(&target, "uidNumber", b"1000").unwrap());
        assert!(dir
            .do_compare(&dn("uid=nobody,ou=people,dc=example,dc=com"), "cn", b"x")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_simple_bind() {
        let dir = directory();
        let bind = dir
            .do_bind_simple_authenticated("uid=alice,ou=people,dc=example,dc=com", b"wonderland")
            .unwrap();
        assert_eq!(bind.authz_id(), "dn:uid=alice,ou=people,dc=example,dc=com");

        let err = dir
            .do_bind_simple_authenticated("uid=alice,ou=people,dc=example,dc=com", b"nope")
            .unwrap_err();
        assert_eq!(err.result_code(), ResultCode::InvalidCredentials);
        // Users without a password can never bind
        assert!(dir
            .do_bind_simple_authenticated("uid=bob,ou=people,dc=example,dc=com", b"")
            .is_err());
        let err = dir.do_bind_simple_authenticated("not a dn", b"x").unwrap_err();
        assert_eq!(err.result_code(), ResultCode::InvalidDnSyntax);
    }

    #[test]
    fn test_anonymous_disabled() {
        let dir = StaticDirectory::new(&Schema::standard().unwrap(), &config(), false).unwrap();
        let err = dir.do_bind_simple_anonymous().unwrap_err();
        assert_eq!(err.result_code(), ResultCode::InappropriateAuthentication);
        assert!(dir.do_bind_sasl_anonymous(None).is_err());
    }

    #[test]
    fn test_sasl_plain_identities() {
        let dir = directory();
        assert!(dir.do_bind_sasl_plain("alice", "wonderland", None).is_ok());
        assert!(dir.do_bind_sasl_plain("u:alice", "wonderland", Some("u:alice")).is_ok());
        let err = dir
            .do_bind_sasl_plain("alice", "wonderland", Some("u:bob"))
            .unwrap_err();
        assert_eq!(err.result_code(), ResultCode::InsufficientAccessRights);
    }

    #[test]
    fn test_sasl_external() {
        let dir = directory();
        let err = dir.do_bind_sasl_external(None, None).unwrap_err();
        assert_eq!(err.result_code(), ResultCode::InappropriateAuthentication);
        let bind = dir.do_bind_sasl_external(Some("cert:ab12"), None).unwrap();
        assert_eq!(bind.authz_id(), "u:cert:ab12");
    }

    #[test]
    fn test_password_modify() {
        let dir = directory();
        let alice = dir.do_bind_sasl_plain("alice", "wonderland", None).unwrap();

        let err = dir
            .do_password_modify(&alice, None, Some(b"wrong"), Some(b"new"))
            .unwrap_err();
        assert_eq!(err.result_code(), ResultCode::InvalidCredentials);

        let generated = dir
            .do_password_modify(&alice, None, Some(b"wonderland"), None)
            .unwrap()
            .unwrap();
        let generated = String::from_utf8(generated).unwrap();
        assert!(dir.do_bind_sasl_plain("alice", &generated, None).is_ok());
        assert!(dir.do_bind_sasl_plain("alice", "wonderland", None).is_err());

        let err = dir
            .do_password_modify(&alice, Some("u:bob"), None, Some(b"x"))
            .unwrap_err();
        assert_eq!(err.result_code(), ResultCode::InsufficientAccessRights);

        let err = dir
            .do_password_modify(&BindObject::Anonymous, Some("u:alice"), None, Some(b"x"))
            .unwrap_err();
        assert_eq!(err.result_code(), ResultCode::UnwillingToPerform);
    }

    #[test]
    fn test_defaults_are_read_only() {
        struct Empty;
        impl Directory for Empty {}
        let dir = Empty;
        assert_eq!(
            dir.do_delete(&dn("cn=x")).unwrap_err().result_code(),
            ResultCode::UnwillingToPerform
        );
        assert_eq!(
            dir.do_bind_simple_unauthenticated("cn=x").unwrap_err().result_code(),
            ResultCode::InvalidCredentials
        );
        assert!(dir
            .do_search(&Dn::root(), SearchScope::WholeSubtree, &Filter::And(vec![]))
            .unwrap()
            .next()
            .is_none());
    }
}
