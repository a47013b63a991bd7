//! Integration layer between the systems a cryo-EM facility runs on.
//!
//! The crate gives typed access to four backends:
//! * [`ldap`]: the directory holding user accounts
//! * [`ppms`]: the booking system's PUMAPI, which knows groups and members
//! * [`redmine`]: the issue tracker used as a database of user and project
//!   requests, with dirty-tracked custom fields written back in batches
//! * [`leginon`]: the microscope acquisition database, read-only
//!
//! Connection settings for all of them come from one TOML document named by
//! the `NEON_CONFIG` environment variable, see [`config`].
//!
//! For a general primer on LDAP, the [introduction] in the `ldap3` crate is an
//! excellent resource.
//!
//! [introduction]: https://github.com/inejge/ldap3/blob/master/LDAP-primer.md
//!
//! # Getting started
//! Find every Redmine user request whose PPMS group has no active PI:
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use futures::TryStreamExt;
//! use neon::{config::Config, ppms, redmine};
//!
//! let config = Config::from_env()?;
//! let ppms = ppms::Connection::new(&config.ppms.ok_or("no [ppms] section")?)?;
//! let redmine = redmine::Connection::new(&config.redmine.ok_or("no [redmine] section")?)?;
//!
//! let users = redmine.emgusers(None);
//! futures::pin_mut!(users);
//! while let Some(user) = users.try_next().await? {
//!     let Ok(group) = user.ppms_group() else { continue };
//!     if !ppms.maybe_group(&group).await?.is_some_and(|group| group.active()) {
//!         println!("{user} belongs to inactive group {group}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//! * Redmine lookups fetch a single page of results; enumerations page
//!   through everything.
//! * Leginon is only read, never written.

pub mod affiliation;
pub mod config;
pub mod entry;
pub mod error;
pub mod ldap;
pub mod leginon;
pub mod ppms;
pub mod redmine;
#[cfg(test)]
mod testing;

pub use ldap3::{self, SearchEntry};

pub use crate::{
	config::{
		Config, ConnectionConfig, LdapConfig, LeginonConfig, PpmsConfig, RedmineConfig, TLSConfig,
	},
	entry::AttributesExt,
	error::Error,
	ldap::User,
	leginon::Leginon,
	redmine::{CustomField, EmgProject, EmgUser, Entity, Proposal},
};
