//! Error codes

/// Errors that can occur when using this library
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// The environment variable naming the configuration file is not set.
	#[error("Environment variable {0} is not set")]
	Env(&'static str),
	/// The configuration file has no section with the requested name.
	#[error("Missing configuration section [{0}]")]
	MissingSection(String),
	/// The configuration file could not be parsed.
	#[error(transparent)]
	Toml(#[from] toml::de::Error),
	/// A required attribute in a search result or record was missing.
	#[error("Missing data: {0}")]
	Missing(String),
	/// The contents of an attribute did not confirm to the expected syntax.
	#[error("Malformed data: {0}")]
	Invalid(String),
	/// An attribute or result set expected to hold a fixed number of values
	/// held a different number.
	#[error("Expected {expected} value(s) for {what}, found {found}")]
	Cardinality {
		/// What was being counted
		what: String,
		/// How many values were allowed
		expected: &'static str,
		/// How many values were present
		found: usize,
	},
	/// An issue does not define a custom field it is expected to carry.
	#[error("issue [{issue}] does not define custom field [{field}]")]
	MissingField {
		/// The id of the offending issue
		issue: u64,
		/// The display name of the custom field
		field: String,
	},
	/// A lookup by custom field returned an issue whose field does not hold
	/// the searched value. Redmine returns every issue of a project when the
	/// field is not flagged as filterable and searchable.
	#[error("{entity}: {field} is {found:?}, searched for {expected:?}")]
	SearchIntegrity {
		/// Display form of the offending entity
		entity: String,
		/// The attribute name of the searched field
		field: &'static str,
		/// The value that was searched for
		expected: String,
		/// The value the returned issue actually holds
		found: String,
	},
	/// A custom field without an attribute name was used as a lookup key.
	#[error("Custom field [{0}] cannot be used for lookups")]
	Unsearchable(&'static str),
	/// The requested record does not exist.
	#[error("Not found: {0}")]
	NotFound(String),
	/// A remote API answered with an unsuccessful status.
	#[error("{url} answered {status}: {body}")]
	Api {
		/// The requested URL
		url: String,
		/// The status code of the response
		status: reqwest::StatusCode,
		/// The response body
		body: String,
	},
	/// An IO error occurred, e.g. when reading the config or certificates
	#[error(transparent)]
	Io(#[from] std::io::Error),
	/// An underlying protocol error or similar occurred, or the LDAP library
	/// was used incorrectly.
	#[error(transparent)]
	Ldap(#[from] ldap3::LdapError),
	/// An HTTP request failed
	#[error(transparent)]
	Http(#[from] reqwest::Error),
	/// A response body could not be decoded
	#[error(transparent)]
	Json(#[from] serde_json::Error),
	/// A query against the Leginon database failed
	#[error(transparent)]
	Database(#[from] sqlx::Error),
}
