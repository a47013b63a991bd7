//! Client for looking up user accounts in the LDAP directory

use std::{collections::HashMap, fmt};

use ldap3::{
	adapters::{Adapter, EntriesOnly, PagedResults},
	LdapConnAsync, Scope, SearchEntry, SearchStream,
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{config::LdapConfig, entry::AttributesExt, error::Error};

/// Filter matching user account entries
const ACCOUNT_FILTER: &str = "(objectClass=posixAccount)";

/// Attributes requested for every user entry
const ATTRIBUTES: [&str; 3] = ["uid", "mail", "gidNumber"];

/// A user account in the directory.
///
/// Paged enumeration hands back raw attribute maps while point lookups hand
/// back complete search entries; both expose the same accessors.
#[derive(Debug, Clone)]
pub enum User {
	/// An attribute map produced by a paged search
	Paged(HashMap<String, Vec<String>>),
	/// A single entry produced by a point lookup
	Entry(SearchEntry),
}

impl User {
	/// The attributes backing this user
	fn attributes(&self) -> &dyn AttributesExt {
		match self {
			Self::Paged(attrs) => attrs,
			Self::Entry(entry) => entry,
		}
	}

	/// The login name. Exactly one `uid` value is expected.
	pub fn username(&self) -> Result<&str, Error> {
		self.attributes().attr_one("uid")
	}

	/// The mail address, if the account has one.
	pub fn email(&self) -> Result<Option<&str>, Error> {
		self.attributes().attr_optional("mail")
	}

	/// The numeric primary group of the account, if present.
	pub fn gid_number(&self) -> Result<Option<u32>, Error> {
		self.attributes()
			.attr_optional("gidNumber")?
			.map(|gid| gid.parse().map_err(|_| Error::Invalid(format!("gidNumber {gid:?}"))))
			.transpose()
	}

	/// The distinguished name, only known for point lookups.
	#[must_use]
	pub fn dn(&self) -> Option<&str> {
		match self {
			Self::Paged(_) => None,
			Self::Entry(entry) => Some(&entry.dn),
		}
	}
}

impl fmt::Display for User {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let attributes = self.attributes();
		write!(
			f,
			"{}: {}",
			attributes.attr_first("uid").unwrap_or("<no uid>"),
			attributes.attr_first("mail").unwrap_or("None")
		)
	}
}

/// A bound connection to the directory.
#[derive(Debug)]
pub struct Connection {
	/// The configuration the connection was opened with.
	config: LdapConfig,
	/// The LDAP handle.
	ldap: ldap3::Ldap,
	/// Background task driving the connection.
	driver: JoinHandle<()>,
}

impl Connection {
	/// Connect to the server and bind with the configured credentials. Fails
	/// if the credentials are rejected.
	pub async fn connect(config: LdapConfig) -> Result<Self, Error> {
		let settings = config.connection.to_settings().await?;
		let (conn, mut ldap) = LdapConnAsync::from_url_with_settings(settings, &config.url).await?;
		let driver = tokio::spawn(async move {
			if let Err(err) = conn.drive().await {
				warn!("Ldap connection error {err}");
			}
		});

		ldap.simple_bind(&config.bind_dn, &config.password).await?.success()?;
		debug!(url = %config.url, bind_dn = %config.bind_dn, "Bound to directory");
		Ok(Self { config, ldap, driver })
	}

	/// Enumerate all user accounts below the users organizational unit. Every
	/// call starts a fresh paged search.
	pub async fn users(&mut self) -> Result<UserStream, Error> {
		let adapters: Vec<Box<dyn Adapter<_, _>>> = vec![
			Box::new(EntriesOnly::new()),
			Box::new(PagedResults::new(self.config.page_size)),
		];
		let stream = self
			.ldap
			.streaming_search_with(
				adapters,
				&self.config.users_ou,
				Scope::Subtree,
				ACCOUNT_FILTER,
				ATTRIBUTES.to_vec(),
			)
			.await?;
		Ok(UserStream { stream })
	}

	/// Look up the account with the given uid. More than one match violates
	/// the directory's uniqueness of uids and is reported as an error.
	pub async fn user_for_uid(&mut self, uid: &str) -> Result<Option<User>, Error> {
		let filter = format!("(&{ACCOUNT_FILTER}(uid={}))", ldap3::ldap_escape(uid));
		let (mut entries, _result) = self
			.ldap
			.search(&self.config.users_ou, Scope::Subtree, &filter, ATTRIBUTES.to_vec())
			.await?
			.success()?;
		match entries.len() {
			0 => Ok(None),
			1 => Ok(entries.pop().map(|entry| User::Entry(SearchEntry::construct(entry)))),
			found => Err(Error::Cardinality {
				what: format!("uid={uid}"),
				expected: "at most one",
				found,
			}),
		}
	}

	/// Unbind and wait for the connection to shut down
	pub async fn unbind(mut self) -> Result<(), Error> {
		self.ldap.unbind().await?;
		if let Err(err) = self.driver.await {
			warn!("Failed to join background task: {err}");
		}
		Ok(())
	}
}

/// A lazy sequence of users produced by [`Connection::users`].
pub struct UserStream {
	/// The underlying paged search
	stream: SearchStream<'static, &'static str, Vec<&'static str>>,
}

impl fmt::Debug for UserStream {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("UserStream").finish_non_exhaustive()
	}
}

impl UserStream {
	/// Fetch the next user, requesting another page from the server when the
	/// current one is exhausted.
	pub async fn next(&mut self) -> Result<Option<User>, Error> {
		Ok(self.stream.next().await?.map(|entry| User::Paged(SearchEntry::construct(entry).attrs)))
	}

	/// Check the final result of the search.
	pub async fn finish(mut self) -> Result<(), Error> {
		self.stream.finish().await.success()?;
		Ok(())
	}

	/// Drain the remaining users into a vector.
	pub async fn collect(mut self) -> Result<Vec<User>, Error> {
		let mut users = Vec::new();
		while let Some(user) = self.next().await? {
			users.push(user);
		}
		self.finish().await?;
		Ok(users)
	}
}
