//! Per-entry attribute storage.

use ldapd_protocol::LdapError;
use ldapd_schema::{AttributeType, AttributeTypeId, Schema, Value};

/// Attribute values of one entry, keyed by attribute type.
///
/// Keys may be given as OID or any name of the attribute type. Values are
/// always lists; an unset attribute and an empty list are the same thing.
/// Insertion order is preserved so responses list attributes in the order
/// they were set.
#[derive(Debug, Clone)]
pub struct AttributeDict {
    schema: Schema,
    attributes: Vec<(AttributeTypeId, Vec<Value>)>,
}

impl AttributeDict {
    pub fn new(schema: &Schema) -> Self {
        Self {
            schema: schema.clone(),
            attributes: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Resolves a key to its attribute type.
    pub fn resolve(&self, key: &str) -> Result<AttributeTypeId, LdapError> {
        self.schema
            .attribute_type_id(key)
            .ok_or_else(|| LdapError::UndefinedAttributeType(key.to_string()))
    }

    fn slot(&mut self, id: AttributeTypeId) -> &mut Vec<Value> {
        let index = match self.attributes.iter().position(|(a, _)| *a == id) {
            Some(index) => index,
            None => {
                self.attributes.push((id, Vec::new()));
                self.attributes.len() - 1
            }
        };
        &mut self.attributes[index].1
    }

    /// Replaces all values of an attribute.
    pub fn set(&mut self, key: &str, values: Vec<Value>) -> Result<(), LdapError> {
        let id = self.resolve(key)?;
        self.set_by_id(id, values);
        Ok(())
    }

    pub fn set_by_id(&mut self, id: AttributeTypeId, values: Vec<Value>) {
        *self.slot(id) = values;
    }

    /// Replaces all values of an attribute, decoding each string with the
    /// attribute's syntax.
    pub fn set_text<S: AsRef<str>>(&mut self, key: &str, values: &[S]) -> Result<(), LdapError> {
        let id = self.resolve(key)?;
        let syntax = self
            .schema
            .syntax_by_id(self.schema.attribute_type_by_id(id).syntax);
        let values = values
            .iter()
            .map(|v| syntax.decode(v.as_ref().as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;
        self.set_by_id(id, values);
        Ok(())
    }

    pub fn append(&mut self, key: &str, value: Value) -> Result<(), LdapError> {
        let id = self.resolve(key)?;
        self.slot(id).push(value);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Result<Vec<Value>, LdapError> {
        let id = self.resolve(key)?;
        Ok(match self.attributes.iter().position(|(a, _)| *a == id) {
            Some(index) => self.attributes.remove(index).1,
            None => Vec::new(),
        })
    }

    /// Values stored under exactly this attribute type.
    pub fn local_values(&self, id: AttributeTypeId) -> &[Value] {
        self.attributes
            .iter()
            .find(|(a, _)| *a == id)
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    /// Values of an attribute type, optionally unioned with the values of
    /// all its subtypes.
    pub fn get_by_id(&self, id: AttributeTypeId, subtypes: bool) -> Vec<Value> {
        let mut values = self.local_values(id).to_vec();
        if subtypes {
            for subtype in &self.schema.attribute_type_by_id(id).subtypes {
                values.extend_from_slice(self.local_values(*subtype));
            }
        }
        values
    }

    /// Values of the attribute named by `key`. With `subtypes`, a lookup of
    /// `name` also sees `cn` and `sn` values.
    pub fn get(&self, key: &str, subtypes: bool) -> Result<Vec<Value>, LdapError> {
        Ok(self.get_by_id(self.resolve(key)?, subtypes))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.schema
            .attribute_type_id(key)
            .is_some_and(|id| !self.local_values(id).is_empty())
    }

    /// Attributes with at least one value, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (AttributeTypeId, &AttributeType, &[Value])> {
        self.attributes
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(id, values)| (*id, self.schema.attribute_type_by_id(*id), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends every value of `other`.
    pub fn extend(&mut self, other: &AttributeDict) {
        for (id, values) in &other.attributes {
            self.slot(*id).extend(values.iter().cloned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldapd_protocol::ResultCode;

    fn dict() -> AttributeDict {
        AttributeDict::new(&Schema::standard().unwrap())
    }

    #[test]
    fn test_set_and_get_by_any_name() {
        let mut attrs = dict();
        attrs.set_text("cn", &["Test"]).unwrap();
        assert_eq!(attrs.get("commonName", false).unwrap(), vec![Value::from("Test")]);
        assert_eq!(attrs.get("2.5.4.3", false).unwrap(), vec![Value::from("Test")]);
        assert!(attrs.contains("CN"));
    }

    #[test]
    fn test_subtype_lookup() {
        let mut attrs = dict();
        attrs.set_text("cn", &["Alice"]).unwrap();
        attrs.set_text("sn", &["Smith"]).unwrap();
        attrs.set_text("name", &["Direct"]).unwrap();

        let with = attrs.get("name", true).unwrap();
        assert_eq!(with.len(), 3);
        assert!(with.contains(&Value::from("Alice")));
        assert_eq!(attrs.get("name", false).unwrap(), vec![Value::from("Direct")]);
        // Supertypes are not visible from a subtype
        assert_eq!(attrs.get("cn", true).unwrap().len(), 1);
    }

    #[test]
    fn test_text_is_decoded_by_syntax() {
        let mut attrs = dict();
        attrs.set_text("uidNumber", &["1000"]).unwrap();
        assert_eq!(attrs.get("uidNumber", false).unwrap(), vec![Value::Integer(1000)]);

        let err = attrs.set_text("uidNumber", &["many"]).unwrap_err();
        assert_eq!(err.result_code(), ResultCode::InvalidAttributeSyntax);
    }

    #[test]
    fn test_unknown_attribute() {
        let mut attrs = dict();
        let err = attrs.set("bogusAttr", vec![]).unwrap_err();
        assert_eq!(err.result_code(), ResultCode::UndefinedAttributeType);
        assert!(!attrs.contains("bogusAttr"));
    }

    #[test]
    fn test_empty_is_unset() {
        let mut attrs = dict();
        attrs.set("description", vec![]).unwrap();
        assert!(!attrs.contains("description"));
        assert!(attrs.is_empty());

        attrs.append("description", Value::from("one")).unwrap();
        attrs.append("description", Value::from("two")).unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.remove("description").unwrap().len(), 2);
        assert!(attrs.is_empty());
    }

    #[test]
    fn test_iteration_order() {
        let mut attrs = dict();
        attrs.set_text("sn", &["b"]).unwrap();
        attrs.set_text("cn", &["a"]).unwrap();
        let names: Vec<_> = attrs.iter().map(|(_, at, _)| at.name().to_string()).collect();
        assert_eq!(names, vec!["sn", "cn"]);
    }
}
