//! Client for groups and group members in PPMS
//!
//! PPMS is queried through its "PUMAPI": every call is a form POST carrying
//! the API key and an `action`. Record lookups are requested as JSON, list
//! actions answer with one identifier per line.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tracing::debug;
use url::Url;

use crate::{config::PpmsConfig, error::Error};

/// A group record as returned by the `getgroup` action.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupRecord {
	/// The group identifier
	pub unitlogin: String,
	/// Display name of the group, usually the PI's name
	#[serde(default)]
	pub unitname: String,
	/// The PI's name, "Last, First" or just "Last"
	pub headname: String,
	/// The PI's mail address
	pub heademail: String,
	/// The institution the group belongs to
	#[serde(default)]
	pub institution: String,
	/// Whether the group is active
	#[serde(deserialize_with = "flag")]
	pub active: bool,
}

/// A PPMS user, as returned by the `getuser` action.
#[derive(Debug, Clone, Deserialize)]
pub struct Member {
	/// Login name
	pub login: String,
	/// First name
	#[serde(default, rename = "fname")]
	pub first_name: String,
	/// Last name
	#[serde(default, rename = "lname")]
	pub last_name: String,
	/// Mail address
	#[serde(default)]
	pub email: String,
	/// Affiliation of the user
	#[serde(default)]
	pub affiliation: String,
	/// The group the user belongs to
	#[serde(default)]
	pub unitlogin: String,
	/// Whether the account is active
	#[serde(default, deserialize_with = "flag")]
	pub active: bool,
}

/// Deserialize PPMS booleans, which arrive as JSON booleans, numbers or
/// strings depending on the action.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
	match serde_json::Value::deserialize(deserializer)? {
		serde_json::Value::Bool(value) => Ok(value),
		serde_json::Value::Number(n) => Ok(n.as_i64() != Some(0)),
		serde_json::Value::String(s) => {
			Ok(matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
		}
		serde_json::Value::Null => Ok(false),
		other => Err(serde::de::Error::custom(format!("invalid flag {other}"))),
	}
}

/// A view over a group record.
#[derive(Debug, Clone)]
pub struct Group {
	/// The raw record
	record: GroupRecord,
}

impl Group {
	/// Wrap a raw record
	#[must_use]
	pub fn new(record: GroupRecord) -> Self {
		Self { record }
	}

	/// The group identifier
	#[must_use]
	pub fn name(&self) -> &str {
		&self.record.unitlogin
	}

	/// The PI's first name, absent if the head name has no comma
	#[must_use]
	pub fn pi_first(&self) -> Option<&str> {
		self.record.headname.split(',').nth(1).map(str::trim)
	}

	/// The PI's last name
	#[must_use]
	pub fn pi_last(&self) -> &str {
		self.record.headname.split(',').next().unwrap_or_default().trim()
	}

	/// The PI's mail address, trimmed and lower-cased
	#[must_use]
	pub fn pi_email(&self) -> String {
		self.record.heademail.trim().to_lowercase()
	}

	/// Whether the group is active
	#[must_use]
	pub fn active(&self) -> bool {
		self.record.active
	}

	/// The raw record
	#[must_use]
	pub fn record(&self) -> &GroupRecord {
		&self.record
	}
}

impl fmt::Display for Group {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[{}|{}]", self.name(), self.pi_email())
	}
}

/// The PUMAPI calls used by [`Connection`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Pumapi: Send + Sync {
	/// Fetch a group record, `None` if PPMS does not know the group.
	async fn get_group(&self, unitlogin: &str) -> Result<Option<GroupRecord>, Error>;
	/// List all group identifiers.
	async fn get_groups(&self) -> Result<Vec<String>, Error>;
	/// Fetch the members of a group.
	async fn get_group_users(&self, unitlogin: &str) -> Result<Vec<Member>, Error>;
}

/// PUMAPI over HTTP
#[derive(Debug, Clone)]
pub struct PumapiClient {
	/// HTTP client
	client: reqwest::Client,
	/// The PUMAPI endpoint
	url: Url,
	/// The API key
	key: String,
}

impl PumapiClient {
	/// Create a client for the configured endpoint.
	pub fn new(config: &PpmsConfig) -> Result<Self, Error> {
		let client = reqwest::Client::builder().build()?;
		Ok(Self { client, url: config.url.clone(), key: config.key.clone() })
	}

	/// Perform one action and return the response body.
	async fn request(&self, action: &str, params: &[(&str, &str)]) -> Result<String, Error> {
		let mut form = vec![("apikey", self.key.as_str()), ("action", action)];
		form.extend_from_slice(params);
		debug!(action, "PPMS request");
		let response = self.client.post(self.url.clone()).form(&form).send().await?;
		let status = response.status();
		let body = response.text().await?;
		if !status.is_success() {
			return Err(Error::Api { url: self.url.to_string(), status, body });
		}
		Ok(body)
	}

	/// Perform a record action, `None` on an empty answer.
	async fn record<T: serde::de::DeserializeOwned>(
		&self,
		action: &str,
		params: &[(&str, &str)],
	) -> Result<Option<T>, Error> {
		let mut params = params.to_vec();
		params.push(("format", "json"));
		parse_record(&self.request(action, &params).await?)
	}
}

/// Decode the answer to a record action. PPMS answers unknown records with
/// an empty body and wraps some records in a one-element array.
fn parse_record<T: serde::de::DeserializeOwned>(body: &str) -> Result<Option<T>, Error> {
	if body.trim().is_empty() {
		return Ok(None);
	}
	match serde_json::from_str::<serde_json::Value>(body)? {
		serde_json::Value::Array(records) => {
			records.into_iter().next().map(serde_json::from_value).transpose().map_err(Error::from)
		}
		record => Ok(Some(serde_json::from_value(record)?)),
	}
}

/// Split a list response into its non-empty lines
fn lines(body: &str) -> Vec<String> {
	body.lines().map(str::trim).filter(|line| !line.is_empty()).map(str::to_owned).collect()
}

#[async_trait]
impl Pumapi for PumapiClient {
	async fn get_group(&self, unitlogin: &str) -> Result<Option<GroupRecord>, Error> {
		self.record("getgroup", &[("unitlogin", unitlogin)]).await
	}

	async fn get_groups(&self) -> Result<Vec<String>, Error> {
		Ok(lines(&self.request("getgroups", &[]).await?))
	}

	async fn get_group_users(&self, unitlogin: &str) -> Result<Vec<Member>, Error> {
		let logins = lines(&self.request("getgroupusers", &[("unitlogin", unitlogin)]).await?);
		let mut members = Vec::with_capacity(logins.len());
		for login in logins {
			let member = self
				.record("getuser", &[("login", login.as_str())])
				.await?
				.ok_or_else(|| Error::NotFound(format!("PPMS user {login}")))?;
			members.push(member);
		}
		Ok(members)
	}
}

/// A connection to PPMS.
#[derive(Debug)]
pub struct Connection<A: Pumapi = PumapiClient> {
	/// The API the connection talks to
	api: A,
}

impl Connection {
	/// Create a connection for the configured endpoint.
	pub fn new(config: &PpmsConfig) -> Result<Self, Error> {
		Ok(Self { api: PumapiClient::new(config)? })
	}
}

impl<A: Pumapi> Connection<A> {
	/// Create a connection on top of the given API
	pub fn with_api(api: A) -> Self {
		Self { api }
	}

	/// Fetch a group, `None` if it does not exist.
	pub async fn maybe_group(&self, gid: &str) -> Result<Option<Group>, Error> {
		Ok(self.api.get_group(gid).await?.map(Group::new))
	}

	/// Fetch a group that must exist.
	pub async fn group(&self, gid: &str) -> Result<Group, Error> {
		self.maybe_group(gid).await?.ok_or_else(|| Error::NotFound(format!("PPMS group {gid}")))
	}

	/// All group identifiers.
	pub async fn groups(&self) -> Result<Vec<String>, Error> {
		self.api.get_groups().await
	}

	/// The members of a group.
	pub async fn users_for_group(&self, gid: &str) -> Result<Vec<Member>, Error> {
		self.api.get_group_users(gid).await
	}
}
