//! Wire types for the Redmine REST API.

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::error::Error;

time::serde::format_description!(redmine_date, Date, "[year]-[month]-[day]");

/// An issue as returned by `GET /issues.json` or `GET /issues/<id>.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
	/// The immutable issue id
	pub id: u64,
	/// The issue subject
	#[serde(default)]
	pub subject: String,
	/// The current status
	pub status: Option<Status>,
	/// The start date, if set
	#[serde(default, with = "redmine_date::option")]
	pub start_date: Option<Date>,
	/// The time of the last change
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub updated_on: Option<OffsetDateTime>,
	/// Custom field values; absent when the tracker defines none
	pub custom_fields: Option<Vec<CustomFieldValue>>,
}

/// An issue status
#[derive(Debug, Clone, Deserialize)]
pub struct Status {
	/// Status id
	pub id: u64,
	/// Status name, e.g. "New" or "Closed"
	pub name: String,
}

/// The value of one custom field on an issue
#[derive(Debug, Clone, Deserialize)]
pub struct CustomFieldValue {
	/// The field id
	pub id: u64,
	/// The field's display name
	pub name: String,
	/// The value; null for unset fields, a list for multi-value fields
	#[serde(default)]
	pub value: serde_json::Value,
}

impl Issue {
	/// Look up a custom field by display name. Returns `None` if the issue
	/// does not define the field, an empty string if it is unset and the
	/// trimmed value otherwise.
	pub fn custom(&self, name: &str) -> Result<Option<String>, Error> {
		let Some(field) = self.custom_fields.iter().flatten().find(|field| field.name == name)
		else {
			return Ok(None);
		};
		match &field.value {
			serde_json::Value::Null => Ok(Some(String::new())),
			serde_json::Value::String(value) => Ok(Some(value.trim().to_owned())),
			other => Err(Error::Invalid(format!(
				"issue [{}] custom field [{name}] is not a string: {other}",
				self.id
			))),
		}
	}

	/// Look up a custom field that the issue must define.
	pub fn must_custom(&self, name: &str) -> Result<String, Error> {
		self.custom(name)?
			.ok_or_else(|| Error::MissingField { issue: self.id, field: name.to_owned() })
	}
}

/// Response body of `GET /issues.json`
#[derive(Debug, Deserialize)]
pub(crate) struct IssueList {
	/// One page of issues
	pub issues: Vec<Issue>,
}

/// Response body of `GET /issues/<id>.json`
#[derive(Debug, Deserialize)]
pub(crate) struct IssueEnvelope {
	/// The requested issue
	pub issue: Issue,
}

/// Query parameters for `GET /issues.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueFilter {
	/// Project identifier
	pub project_id: String,
	/// Status filter, e.g. "open" or "*"; Redmine defaults to open issues
	pub status_id: Option<String>,
	/// Only issues updated on or after this date
	pub updated_on: Option<Date>,
	/// Custom field constraints as (field id, value)
	pub custom: Vec<(u64, String)>,
	/// Page size
	pub limit: Option<u32>,
	/// Offset of the first issue of the page
	pub offset: Option<u32>,
}

impl IssueFilter {
	/// All open issues of a project
	#[must_use]
	pub fn project(project_id: &str) -> Self {
		Self {
			project_id: project_id.to_owned(),
			status_id: None,
			updated_on: None,
			custom: Vec::new(),
			limit: None,
			offset: None,
		}
	}

	/// Restrict to a status
	#[must_use]
	pub fn status(mut self, status: &str) -> Self {
		self.status_id = Some(status.to_owned());
		self
	}

	/// Restrict to issues whose custom field with id `field_id` equals
	/// `value`
	#[must_use]
	pub fn custom(mut self, field_id: u64, value: &str) -> Self {
		self.custom.push((field_id, value.to_owned()));
		self
	}

	/// Request one page
	#[must_use]
	pub fn page(mut self, limit: u32, offset: u32) -> Self {
		self.limit = Some(limit);
		self.offset = Some(offset);
		self
	}

	/// Render the filter as query parameters
	pub fn to_query(&self) -> Result<Vec<(String, String)>, Error> {
		let mut query = vec![("project_id".to_owned(), self.project_id.clone())];
		if let Some(status) = &self.status_id {
			query.push(("status_id".to_owned(), status.clone()));
		}
		if let Some(date) = self.updated_on {
			let date = date
				.format(&time::macros::format_description!("[year]-[month]-[day]"))
				.map_err(|err| Error::Invalid(err.to_string()))?;
			query.push(("updated_on".to_owned(), format!(">={date}")));
		}
		for (field_id, value) in &self.custom {
			query.push((format!("cf_{field_id}"), value.clone()));
		}
		if let Some(limit) = self.limit {
			query.push(("limit".to_owned(), limit.to_string()));
		}
		if let Some(offset) = self.offset {
			query.push(("offset".to_owned(), offset.to_string()));
		}
		Ok(query)
	}
}

/// Body of `PUT /issues/<id>.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueUpdate {
	/// Custom fields to overwrite
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub custom_fields: Vec<CustomFieldPatch>,
	/// New status
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status_id: Option<u64>,
}

/// One custom field of an [`IssueUpdate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomFieldPatch {
	/// Field id
	pub id: u64,
	/// New value
	pub value: String,
}

/// Wrapper Redmine expects around [`IssueUpdate`]
#[derive(Debug, Serialize)]
pub(crate) struct UpdateEnvelope<'a> {
	/// The update
	pub issue: &'a IssueUpdate,
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use time::macros::date;

	use super::{CustomFieldPatch, Issue, IssueFilter, IssueUpdate, UpdateEnvelope};
	use crate::{error::Error, redmine::field::CustomField};

	const ISSUE: &str = r#"{
		"id": 19188,
		"subject": "Jane Doe",
		"status": {"id": 1, "name": "New"},
		"start_date": "2024-03-01",
		"updated_on": "2024-03-02T10:00:00Z",
		"custom_fields": [
			{"id": 27, "name": "Primary User Email", "value": " jane@example.org "},
			{"id": 25, "name": "PI email", "value": null},
			{"id": 133, "name": "Labeled Grid Boxes", "multiple": true, "value": ["a", "b"]}
		]
	}"#;

	#[test]
	fn decode_issue() {
		let issue: Issue = serde_json::from_str(ISSUE).unwrap();
		assert_eq!(issue.id, 19188);
		assert_eq!(issue.start_date, Some(date!(2024 - 03 - 01)));
		assert_eq!(issue.status.unwrap().name, "New");
	}

	#[test]
	fn custom_values() {
		let issue: Issue = serde_json::from_str(ISSUE).unwrap();
		assert_eq!(
			issue.custom("Primary User Email").unwrap().as_deref(),
			Some("jane@example.org")
		);
		assert_eq!(issue.custom("PI email").unwrap().as_deref(), Some(""), "Null maps to empty");
		assert_eq!(issue.custom("PI").unwrap(), None, "Undefined field maps to None");
		assert!(matches!(issue.custom("Labeled Grid Boxes"), Err(Error::Invalid(_))));
		assert!(matches!(
			issue.must_custom("PI"),
			Err(Error::MissingField { issue: 19188, field }) if field == "PI"
		));
	}

	#[test]
	fn issue_without_custom_fields() {
		let issue: Issue = serde_json::from_str(r#"{"id": 1, "subject": "x"}"#).unwrap();
		assert_eq!(issue.custom("PI").unwrap(), None);
		assert_eq!(issue.start_date, None);
	}

	#[test]
	fn filter_query() {
		let mut filter = IssueFilter::project("emg-users")
			.status("open")
			.custom(CustomField::PrimaryUserEmail.id(), "jane@example.org")
			.page(25, 50);
		filter.updated_on = Some(date!(2024 - 01 - 31));
		let query = filter.to_query().unwrap();
		let query: Vec<(&str, &str)> =
			query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
		assert_eq!(
			query,
			[
				("project_id", "emg-users"),
				("status_id", "open"),
				("updated_on", ">=2024-01-31"),
				("cf_27", "jane@example.org"),
				("limit", "25"),
				("offset", "50"),
			]
		);
	}

	#[test]
	fn update_body() {
		let update = IssueUpdate {
			custom_fields: vec![CustomFieldPatch { id: 27, value: "x@y".to_owned() }],
			status_id: None,
		};
		let body = serde_json::to_value(UpdateEnvelope { issue: &update }).unwrap();
		assert_eq!(
			body,
			serde_json::json!({"issue": {"custom_fields": [{"id": 27, "value": "x@y"}]}})
		);

		let close = IssueUpdate { status_id: Some(5), ..IssueUpdate::default() };
		let body = serde_json::to_value(UpdateEnvelope { issue: &close }).unwrap();
		assert_eq!(body, serde_json::json!({"issue": {"status_id": 5}}));
	}
}
