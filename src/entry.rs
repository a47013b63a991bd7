//! Helper methods for extracting data from search results.
use std::collections::HashMap;

use ldap3::SearchEntry;

use crate::error::Error;

/// An extension trait for directory attribute maps that provides convenience
/// methods for extracting data.
pub trait AttributesExt {
	/// All values of an attribute. Empty if the attribute is not present.
	fn values(&self, attr: &str) -> &[String];

	/// Get the first value of an attribute.
	fn attr_first(&self, attr: &str) -> Option<&str> {
		self.values(attr).first().map(String::as_str)
	}

	/// Get the value of an attribute that must hold exactly one value.
	fn attr_one(&self, attr: &str) -> Result<&str, Error> {
		match self.values(attr) {
			[value] => Ok(value.as_str()),
			values => Err(Error::Cardinality {
				what: attr.to_owned(),
				expected: "exactly one",
				found: values.len(),
			}),
		}
	}

	/// Get the value of an attribute that holds at most one value.
	fn attr_optional(&self, attr: &str) -> Result<Option<&str>, Error> {
		match self.values(attr) {
			[] => Ok(None),
			[value] => Ok(Some(value.as_str())),
			values => Err(Error::Cardinality {
				what: attr.to_owned(),
				expected: "at most one",
				found: values.len(),
			}),
		}
	}
}

impl AttributesExt for HashMap<String, Vec<String>> {
	fn values(&self, attr: &str) -> &[String] {
		self.get(attr).map_or(&[][..], Vec::as_slice)
	}
}

impl AttributesExt for SearchEntry {
	fn values(&self, attr: &str) -> &[String] {
		AttributesExt::values(&self.attrs, attr)
	}
}
