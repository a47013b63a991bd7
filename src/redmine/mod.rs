//! Redmine as a database of user and project requests.
//!
//! Users and projects are issues in two Redmine projects; their data lives
//! in custom fields. Issues are wrapped in [`EmgUser`], [`EmgProject`] and
//! [`Proposal`], modified through typed setters and written back in batches
//! with [`Connection::update`].

mod client;
mod connection;
mod entity;
mod field;
mod issue;

pub use self::{
	client::{IssueTracker, RedmineClient},
	connection::{Connection, LazyConnection, OPEN, PAGE_SIZE},
	entity::{EmgProject, EmgUser, Entity, Field, Proposal},
	field::{CustomField, FieldIds},
	issue::{CustomFieldPatch, CustomFieldValue, Issue, IssueFilter, IssueUpdate, Status},
};
