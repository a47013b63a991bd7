//! Queries and updates against the user and project request projects

use futures::{stream, Stream, TryStreamExt};
use time::Date;
use tracing::{debug, error, info};
use url::Url;

use crate::{
	config::RedmineConfig,
	error::Error,
	redmine::{
		client::{IssueTracker, RedmineClient},
		entity::{EmgProject, EmgUser, Entity},
		field::{CustomField, FieldIds},
		issue::{Issue, IssueFilter, IssueUpdate},
	},
};

/// Number of issues requested per page
pub const PAGE_SIZE: u32 = 25;

/// Status filter used for user lookups unless told otherwise
pub const OPEN: &str = "open";

/// A connection to Redmine.
#[derive(Debug)]
pub struct Connection<T: IssueTracker = RedmineClient> {
	/// The transport
	tracker: T,
	/// Base URL of the instance, used to build issue links
	url: Url,
	/// Identifier of the user request project
	users_project: String,
	/// Identifier of the project request project
	projects_project: String,
	/// Status id used by [`Connection::close`]
	closed_status: u64,
	/// Custom field ids of the instance
	fields: FieldIds,
}

impl Connection {
	/// Create a connection to the configured instance.
	pub fn new(config: &RedmineConfig) -> Result<Self, Error> {
		let tracker = RedmineClient::new(config.url.clone(), &config.key)?;
		Ok(Self::with_tracker(tracker, config))
	}
}

impl<T: IssueTracker> Connection<T> {
	/// Create a connection on top of the given transport.
	pub fn with_tracker(tracker: T, config: &RedmineConfig) -> Self {
		Self {
			tracker,
			url: config.url.clone(),
			users_project: config.users_project.clone(),
			projects_project: config.projects_project.clone(),
			closed_status: config.closed_status,
			fields: config.field_ids(),
		}
	}

	/// Fetch one issue.
	pub async fn get(&self, id: u64) -> Result<Issue, Error> {
		self.tracker.get(id).await
	}

	/// Stream all issues of a project, optionally only those updated on or
	/// after `updated_on`. Pages are fetched as the stream is polled; the
	/// stream ends at the first empty page.
	pub fn issues<'a>(
		&'a self,
		project_id: &str,
		updated_on: Option<Date>,
	) -> impl Stream<Item = Result<Issue, Error>> + 'a {
		let mut filter = IssueFilter::project(project_id);
		filter.updated_on = updated_on;
		stream::try_unfold(0, move |offset| {
			let page = filter.clone().page(PAGE_SIZE, offset);
			async move {
				let issues = self.tracker.filter(&page).await?;
				debug!(project = %page.project_id, offset, count = issues.len(), "Fetched page");
				if issues.is_empty() {
					return Ok(None);
				}
				Ok::<_, Error>(Some((issues, offset + PAGE_SIZE)))
			}
		})
		.map_ok(|issues| stream::iter(issues.into_iter().map(Ok::<Issue, Error>)))
		.try_flatten()
	}

	/// Stream the issues of the user request project.
	pub fn emgusers(
		&self,
		updated_on: Option<Date>,
	) -> impl Stream<Item = Result<EmgUser, Error>> + '_ {
		self.issues(&self.users_project, updated_on)
			.map_ok(|issue| EmgUser::from(Entity::new(issue, &self.url)))
	}

	/// Stream the issues of the project request project.
	pub fn emgprojects(
		&self,
		updated_on: Option<Date>,
	) -> impl Stream<Item = Result<EmgProject, Error>> + '_ {
		self.issues(&self.projects_project, updated_on)
			.map_ok(|issue| EmgProject::from(Entity::new(issue, &self.url)))
	}

	/// Find the issues of a project whose custom field equals `value`.
	///
	/// Redmine ignores filters on custom fields that are not flagged as
	/// filterable and searchable and returns every issue of the project
	/// instead. Each returned issue is therefore checked to really hold the
	/// searched value; a mismatch fails the whole lookup.
	async fn lookup(
		&self,
		project: &str,
		field: CustomField,
		value: &str,
		status: Option<&str>,
	) -> Result<Vec<Entity>, Error> {
		let attr = field.attr().ok_or(Error::Unsearchable(field.name()))?;
		let mut filter = IssueFilter::project(project).custom(self.fields.id(field), value);
		if let Some(status) = status {
			filter = filter.status(status);
		}

		let entities: Vec<_> = self
			.tracker
			.filter(&filter)
			.await?
			.into_iter()
			.map(|issue| Entity::new(issue, &self.url))
			.collect();
		for entity in &entities {
			let found = entity.get(field)?;
			if found != value {
				error!(
					issue = entity.id(),
					field = attr,
					expected = value,
					found = %found,
					"Search returned a non-matching issue"
				);
				return Err(Error::SearchIntegrity {
					entity: entity.to_string(),
					field: attr,
					expected: value.to_owned(),
					found,
				});
			}
		}
		debug!(project, field = attr, value, count = entities.len(), "Looked up issues");
		Ok(entities)
	}

	/// Look up users with the given status.
	async fn emgusers_for(
		&self,
		field: CustomField,
		value: &str,
		status: &str,
	) -> Result<Vec<EmgUser>, Error> {
		let users = self.lookup(&self.users_project, field, value, Some(status)).await?;
		Ok(users.into_iter().map(EmgUser::from).collect())
	}

	/// Look up projects.
	async fn emgprojects_for(
		&self,
		field: CustomField,
		value: &str,
	) -> Result<Vec<EmgProject>, Error> {
		let projects = self.lookup(&self.projects_project, field, value, None).await?;
		Ok(projects.into_iter().map(EmgProject::from).collect())
	}

	/// The user with the given directory login and status.
	pub async fn emguser_for_ldap(
		&self,
		ldap: &str,
		status: &str,
	) -> Result<Option<EmgUser>, Error> {
		single(self.emgusers_for(CustomField::LdapUsername, ldap, status).await?, ldap)
	}

	/// The open user whose primary mail address is `email`.
	pub async fn emguser_for_email(&self, email: &str) -> Result<Option<EmgUser>, Error> {
		single(self.emgusers_for(CustomField::PrimaryUserEmail, email, OPEN).await?, email)
	}

	/// All open users whose primary mail address is `email`. Primary mail
	/// addresses are unique, this exists to track down duplicates.
	pub async fn emgusers_for_email(&self, email: &str) -> Result<Vec<EmgUser>, Error> {
		self.emgusers_for(CustomField::PrimaryUserEmail, email, OPEN).await
	}

	/// All open users of the PI with the mail address `email`.
	pub async fn emgusers_for_pi_email(&self, email: &str) -> Result<Vec<EmgUser>, Error> {
		self.emgusers_for(CustomField::PiEmail, email, OPEN).await
	}

	/// All open users of a PPMS group.
	pub async fn emgusers_for_ppms_group(&self, group: &str) -> Result<Vec<EmgUser>, Error> {
		self.emgusers_for(CustomField::PpmsGroup, group, OPEN).await
	}

	/// All projects whose primary user has the mail address `email`.
	pub async fn emgprojects_for_email(&self, email: &str) -> Result<Vec<EmgProject>, Error> {
		self.emgprojects_for(CustomField::PrimaryUserEmail, email).await
	}

	/// All projects of the PI with the mail address `email`.
	pub async fn emgprojects_for_pi_email(&self, email: &str) -> Result<Vec<EmgProject>, Error> {
		self.emgprojects_for(CustomField::PiEmail, email).await
	}

	/// All projects of a PPMS group.
	pub async fn emgprojects_for_ppms_group(&self, group: &str) -> Result<Vec<EmgProject>, Error> {
		self.emgprojects_for(CustomField::PpmsGroup, group).await
	}

	/// Send the changed custom fields of each entity, one request per
	/// entity. Entities without changes are skipped. An entity is marked
	/// clean only after its request succeeded, so a failed update can be
	/// retried with the same entities.
	pub async fn update<'e, I, E>(&self, entities: I) -> Result<(), Error>
	where
		I: IntoIterator<Item = &'e mut E>,
		E: AsMut<Entity> + ?Sized + 'e,
	{
		for entity in entities {
			let entity: &mut Entity = entity.as_mut();
			let custom_fields = entity.pending(self.fields);
			if custom_fields.is_empty() {
				continue;
			}
			let count = custom_fields.len();
			self.tracker
				.update(entity.id(), &IssueUpdate { custom_fields, status_id: None })
				.await?;
			entity.commit();
			info!(issue = entity.id(), fields = count, "Updated issue");
		}
		Ok(())
	}

	/// Move each entity to the closed status. Local changes are neither
	/// sent nor discarded.
	pub async fn close<'e, I, E>(&self, entities: I) -> Result<(), Error>
	where
		I: IntoIterator<Item = &'e E>,
		E: AsRef<Entity> + ?Sized + 'e,
	{
		for entity in entities {
			let entity: &Entity = entity.as_ref();
			let id = entity.id();
			let update =
				IssueUpdate { status_id: Some(self.closed_status), ..IssueUpdate::default() };
			self.tracker.update(id, &update).await?;
			info!(issue = id, "Closed issue");
		}
		Ok(())
	}
}

/// Unwrap a lookup that may match at most once.
fn single<V>(mut found: Vec<V>, key: &str) -> Result<Option<V>, Error> {
	match found.len() {
		0 | 1 => Ok(found.pop()),
		count => Err(Error::Cardinality {
			what: key.to_owned(),
			expected: "at most one",
			found: count,
		}),
	}
}

/// A [`Connection`] created on first use.
#[derive(Debug)]
pub struct LazyConnection {
	/// Settings for creating the connection
	config: RedmineConfig,
	/// The connection, once created
	conn: Option<Connection>,
}

impl LazyConnection {
	/// Remember the settings without connecting.
	#[must_use]
	pub fn new(config: RedmineConfig) -> Self {
		Self { config, conn: None }
	}

	/// The connection, created on the first call and reused afterwards.
	pub fn get(&mut self) -> Result<&Connection, Error> {
		let conn = match self.conn.take() {
			Some(conn) => conn,
			None => {
				debug!(url = %self.config.url, "Creating Redmine connection");
				Connection::new(&self.config)?
			}
		};
		Ok(self.conn.insert(conn))
	}
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use std::sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	};

	use futures::TryStreamExt;
	use url::Url;

	use super::{Connection, LazyConnection, OPEN, PAGE_SIZE};
	use crate::{
		config::RedmineConfig,
		error::Error,
		redmine::{
			client::MockIssueTracker,
			entity::tests::{base_url, issue},
			field::CustomField,
			issue::{CustomFieldPatch, Issue},
		},
	};

	fn config() -> RedmineConfig {
		RedmineConfig {
			url: base_url(),
			key: "key".to_owned(),
			users_project: "emg-users".to_owned(),
			projects_project: "emg-projects".to_owned(),
			closed_status: 5,
			ldap_username_field: 26,
		}
	}

	fn user(id: u64, email: &str) -> Issue {
		issue(
			id,
			&[
				(CustomField::FirstName, "Jane"),
				(CustomField::LastName, "Doe"),
				(CustomField::PrimaryUserEmail, email),
				(CustomField::PiEmail, "pi@x.org"),
				(CustomField::LdapUsername, "jdoe"),
			],
		)
	}

	fn remote_failure() -> Error {
		Error::Api {
			url: "https://redmine.example.org/issues/1.json".to_owned(),
			status: reqwest::StatusCode::BAD_GATEWAY,
			body: String::new(),
		}
	}

	#[tokio::test]
	async fn pagination_yields_every_issue_in_order() {
		const TOTAL: u64 = 60;
		let mut tracker = MockIssueTracker::new();
		tracker
			.expect_filter()
			.withf(|filter| filter.project_id == "emg-users" && filter.limit == Some(PAGE_SIZE))
			.times(4)
			.returning(|filter| {
				let offset = u64::from(filter.offset.unwrap());
				let end = (offset + u64::from(PAGE_SIZE)).min(TOTAL);
				Ok((offset..end).map(|i| issue(i + 1, &[])).collect())
			});
		let conn = Connection::with_tracker(tracker, &config());

		let issues: Vec<Issue> = conn.issues("emg-users", None).try_collect().await.unwrap();
		assert_eq!(issues.len(), 60);
		assert!(issues.iter().map(|i| i.id).eq(1..=TOTAL), "Issues must arrive in server order");
	}

	#[tokio::test]
	async fn pagination_passes_update_filter() {
		let mut tracker = MockIssueTracker::new();
		tracker
			.expect_filter()
			.withf(|filter| {
				filter.updated_on == Some(time::macros::date!(2024 - 01 - 01))
					&& filter.offset == Some(0)
			})
			.times(1)
			.returning(|_| Ok(vec![]));
		let conn = Connection::with_tracker(tracker, &config());

		let users: Vec<_> =
			conn.emgusers(Some(time::macros::date!(2024 - 01 - 01))).try_collect().await.unwrap();
		assert!(users.is_empty());
	}

	#[tokio::test]
	async fn setting_the_same_value_sends_nothing() {
		let mut tracker = MockIssueTracker::new();
		tracker
			.expect_filter()
			.returning(|_| Ok(vec![user(1, "jane@x.org")]));
		tracker
			.expect_update()
			.withf(|id, update| {
				*id == 1
					&& update.custom_fields.len() == 1
					&& update.custom_fields[0].id == CustomField::PrimaryUserEmail.id()
					&& update.custom_fields[0].value == "jane@y.org"
			})
			.times(1)
			.returning(|_, _| Ok(()));
		let conn = Connection::with_tracker(tracker, &config());

		let mut user = conn.emguser_for_email("jane@x.org").await.unwrap().unwrap();
		user.set_email("jane@x.org").unwrap();
		conn.update([&mut user]).await.unwrap();

		user.set_email("jane@y.org").unwrap();
		conn.update([&mut user]).await.unwrap();
		assert!(!user.is_dirty());

		// nothing changed since the last update
		conn.update([&mut user]).await.unwrap();
	}

	#[tokio::test]
	async fn only_dirty_entities_are_sent() {
		let mut tracker = MockIssueTracker::new();
		tracker
			.expect_filter()
			.returning(|_| Ok(vec![user(1, "a@x.org"), user(2, "b@x.org")]));
		tracker.expect_update().withf(|id, _| *id == 2).times(1).returning(|_, _| Ok(()));
		let conn = Connection::with_tracker(tracker, &config());

		let mut users = conn.emgusers_for_pi_email("pi@x.org").await.unwrap();
		assert_eq!(users.len(), 2);
		users[1].set_email("c@x.org").unwrap();
		conn.update(&mut users).await.unwrap();
	}

	#[tokio::test]
	async fn failed_update_keeps_changes() {
		let calls = Arc::new(AtomicUsize::new(0));
		let mut tracker = MockIssueTracker::new();
		tracker.expect_filter().returning(|_| Ok(vec![user(1, "a@x.org")]));
		tracker
			.expect_update()
			.withf(|id, update| *id == 1 && update.custom_fields.len() == 1)
			.times(2)
			.returning({
				let calls = Arc::clone(&calls);
				move |_, _| {
					if calls.fetch_add(1, Ordering::SeqCst) == 0 {
						Err(remote_failure())
					} else {
						Ok(())
					}
				}
			});
		let conn = Connection::with_tracker(tracker, &config());

		let mut user = conn.emguser_for_email("a@x.org").await.unwrap().unwrap();
		user.set_email("b@x.org").unwrap();
		assert!(matches!(conn.update([&mut user]).await, Err(Error::Api { .. })));
		assert!(user.is_dirty(), "A failed update must keep the change pending");

		conn.update([&mut user]).await.unwrap();
		assert!(!user.is_dirty());
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn lookup_rejects_non_matching_results() {
		let mut tracker = MockIssueTracker::new();
		tracker
			.expect_filter()
			.withf(|filter| filter.custom == [(27, "jane@x.org".to_owned())])
			.returning(|_| Ok(vec![user(1, "jane@x.org"), user(2, "someone@else.org")]));
		let conn = Connection::with_tracker(tracker, &config());

		let result = conn.emgusers_for_email("jane@x.org").await;
		assert!(matches!(
			result,
			Err(Error::SearchIntegrity { field: "email", ref found, .. })
				if found == "someone@else.org"
		));
	}

	#[tokio::test]
	async fn single_result_lookups() {
		let mut tracker = MockIssueTracker::new();
		tracker
			.expect_filter()
			.withf(|filter| filter.status_id.as_deref() == Some("open"))
			.returning(|_| Ok(vec![user(1, "jane@x.org"), user(2, "jane@x.org")]));
		let conn = Connection::with_tracker(tracker, &config());
		assert!(matches!(
			conn.emguser_for_email("jane@x.org").await,
			Err(Error::Cardinality { found: 2, .. })
		));

		let mut tracker = MockIssueTracker::new();
		tracker
			.expect_filter()
			.withf(|filter| filter.status_id.as_deref() == Some("*"))
			.returning(|_| Ok(vec![]));
		let conn = Connection::with_tracker(tracker, &config());
		assert!(conn.emguser_for_ldap("jdoe", "*").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn renumbered_ldap_field() {
		let mut tracker = MockIssueTracker::new();
		tracker
			.expect_filter()
			.withf(|filter| filter.custom == [(99, "jdoe".to_owned())])
			.returning(|_| Ok(vec![user(1, "jane@x.org")]));
		tracker
			.expect_update()
			.withf(|id, update| {
				*id == 1
					&& update.custom_fields
						== [CustomFieldPatch { id: 99, value: "jroe".to_owned() }]
			})
			.times(1)
			.returning(|_, _| Ok(()));
		let mut config = config();
		config.ldap_username_field = 99;
		let conn = Connection::with_tracker(tracker, &config);

		let mut user = conn.emguser_for_ldap("jdoe", OPEN).await.unwrap().unwrap();
		user.set(CustomField::LdapUsername, "jroe").unwrap();
		conn.update([&mut user]).await.unwrap();
	}

	#[tokio::test]
	async fn last_full_page_is_followed_by_an_empty_one() {
		let mut tracker = MockIssueTracker::new();
		tracker
			.expect_filter()
			.times(2)
			.returning(|filter| {
				if filter.offset == Some(0) {
					Ok((1..=u64::from(PAGE_SIZE)).map(|id| issue(id, &[])).collect())
				} else {
					Ok(vec![])
				}
			});
		let conn = Connection::with_tracker(tracker, &config());

		let issues: Vec<Issue> = conn.issues("emg-users", None).try_collect().await.unwrap();
		assert_eq!(issues.len(), 25);
	}

	#[tokio::test]
	async fn project_lookups() {
		let mut tracker = MockIssueTracker::new();
		tracker
			.expect_filter()
			.withf(|filter| filter.project_id == "emg-projects" && filter.status_id.is_none())
			.returning(|_| Ok(vec![issue(3, &[(CustomField::PpmsGroup, "smithlab")])]));
		let conn = Connection::with_tracker(tracker, &config());

		let projects = conn.emgprojects_for_ppms_group("smithlab").await.unwrap();
		assert_eq!(projects.len(), 1);
		assert_eq!(projects[0].url(), "https://redmine.example.org/issues/3");
	}

	#[tokio::test]
	async fn unsearchable_fields_are_rejected() {
		let conn = Connection::with_tracker(MockIssueTracker::new(), &config());
		assert!(matches!(
			conn.lookup("emg-users", CustomField::Pi, "Dr. Who", None).await,
			Err(Error::Unsearchable("PI"))
		));
	}

	#[tokio::test]
	async fn close_ignores_pending_changes() {
		let mut tracker = MockIssueTracker::new();
		tracker.expect_filter().returning(|_| Ok(vec![user(1, "a@x.org"), user(2, "a@x.org")]));
		tracker
			.expect_update()
			.withf(|_, update| update.status_id == Some(5) && update.custom_fields.is_empty())
			.times(2)
			.returning(|_, _| Ok(()));
		let conn = Connection::with_tracker(tracker, &config());

		let mut users = conn.emgusers_for_email("a@x.org").await.unwrap();
		users[0].set_email("b@x.org").unwrap();
		conn.close(&users).await.unwrap();
		assert!(users[0].is_dirty());
	}

	#[test]
	fn lazy_connection_is_created_once() {
		let mut lazy = LazyConnection::new(config());
		let first: *const Connection = lazy.get().unwrap();
		let second: *const Connection = lazy.get().unwrap();
		assert_eq!(first, second);

		let mut config = config();
		config.url = Url::parse("https://example.org").unwrap();
		assert_eq!(LazyConnection::new(config).get().unwrap().url.as_str(), "https://example.org/");
	}
}
