//! Registry of the Redmine custom fields the adapters read and write.

use std::fmt;

/// A Redmine custom field.
///
/// Fields with an attribute name may be used as lookup keys: a lookup
/// re-reads the field through that attribute to verify every returned issue
/// really holds the searched value. Fields without one can only be read and
/// written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CustomField {
	/// First name of a user
	FirstName,
	/// Grid boxes labelled for a user
	LabeledGridBoxes,
	/// Last name of a user
	LastName,
	/// City of a proposal's lab
	NcCity,
	/// Mailing address of a proposal's lab
	NcLabMailingAddress,
	/// Project id at the national center
	NcProjectId,
	/// State of a proposal's lab
	NcState,
	/// Zip code of a proposal's lab
	NcZip,
	/// Name of the principal investigator
	Pi,
	/// Mail address of the principal investigator
	PiEmail,
	/// PPMS group identifier
	PpmsGroup,
	/// Mail address of the primary user
	PrimaryUserEmail,
	/// Directory login of a user
	LdapUsername,
}

impl CustomField {
	/// Every registered field
	pub const ALL: [Self; 13] = [
		Self::FirstName,
		Self::LabeledGridBoxes,
		Self::LastName,
		Self::NcCity,
		Self::NcLabMailingAddress,
		Self::NcProjectId,
		Self::NcState,
		Self::NcZip,
		Self::Pi,
		Self::PiEmail,
		Self::PpmsGroup,
		Self::PrimaryUserEmail,
		Self::LdapUsername,
	];

	/// The numeric Redmine id of the stock registry. Instances may renumber
	/// some fields, see [`FieldIds`].
	#[must_use]
	pub const fn id(self) -> u64 {
		match self {
			Self::FirstName => 42,
			Self::LabeledGridBoxes => 133,
			Self::LastName => 43,
			Self::NcCity => 81,
			Self::NcLabMailingAddress => 129,
			Self::NcProjectId => 74,
			Self::NcState => 82,
			Self::NcZip => 128,
			Self::Pi => 135,
			Self::PiEmail => 25,
			Self::PpmsGroup => 63,
			Self::PrimaryUserEmail => 27,
			Self::LdapUsername => 26,
		}
	}

	/// The display name, which is also how issues label the field
	#[must_use]
	pub const fn name(self) -> &'static str {
		match self {
			Self::FirstName => "First Name",
			Self::LabeledGridBoxes => "Labeled Grid Boxes",
			Self::LastName => "Last Name",
			Self::NcCity => "NC-City",
			Self::NcLabMailingAddress => "NC-Lab Mailing Address",
			Self::NcProjectId => "NC-Project ID",
			Self::NcState => "NC-State",
			Self::NcZip => "NC-Zip",
			Self::Pi => "PI",
			Self::PiEmail => "PI email",
			Self::PpmsGroup => "PPMS Group Identifier",
			Self::PrimaryUserEmail => "Primary User Email",
			Self::LdapUsername => "LDAP Username",
		}
	}

	/// The entity attribute exposing the field, if it may be searched on
	#[must_use]
	pub const fn attr(self) -> Option<&'static str> {
		match self {
			Self::PiEmail => Some("pi_email"),
			Self::PpmsGroup => Some("ppms_group"),
			Self::PrimaryUserEmail => Some("email"),
			Self::LdapUsername => Some("ldap"),
			_ => None,
		}
	}

	/// The query parameter filtering issues by this field
	#[must_use]
	pub fn search_id(self) -> String {
		format!("cf_{}", self.id())
	}
}

/// The numeric ids of the custom fields on one Redmine instance.
///
/// Every field uses its stock id except the directory login, whose id varies
/// between instances and is taken from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldIds {
	/// Id of [`CustomField::LdapUsername`]
	ldap_username: u64,
}

impl FieldIds {
	/// Ids with the directory login field renumbered to `ldap_username`
	#[must_use]
	pub const fn new(ldap_username: u64) -> Self {
		Self { ldap_username }
	}

	/// The id of `field` on this instance
	#[must_use]
	pub const fn id(self, field: CustomField) -> u64 {
		match field {
			CustomField::LdapUsername => self.ldap_username,
			field => field.id(),
		}
	}
}

impl Default for FieldIds {
	fn default() -> Self {
		Self::new(CustomField::LdapUsername.id())
	}
}

impl fmt::Display for CustomField {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.name(), self.id())
	}
}
