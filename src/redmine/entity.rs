//! Typed views over Redmine issues with tracking of local changes.
//!
//! An [`Entity`] wraps one fetched issue. Custom fields are read straight
//! from the issue until they are first written; a write creates a [`Field`]
//! cell holding the current value and a dirty flag. [`Connection::update`]
//! sends the dirty cells and clears the flags once Redmine accepted them.
//!
//! [`Connection::update`]: crate::redmine::Connection::update

use std::{
	collections::{hash_map::Entry, HashMap},
	fmt,
	ops::{Deref, DerefMut},
};

use time::Date;
use url::Url;

use crate::{
	error::Error,
	redmine::{
		field::{CustomField, FieldIds},
		issue::{CustomFieldPatch, Issue},
	},
};

/// A custom field value and whether it changed since it was last loaded or
/// committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
	/// The current value
	value: String,
	/// Whether `value` still has to be sent to Redmine
	dirty: bool,
}

impl Field {
	/// A clean cell holding a loaded value
	#[must_use]
	pub fn new(value: String) -> Self {
		Self { value, dirty: false }
	}

	/// The current value
	#[must_use]
	pub fn value(&self) -> &str {
		&self.value
	}

	/// Change the value. Setting the current value again leaves the dirty
	/// flag as it is.
	pub fn set(&mut self, value: &str) {
		if self.value == value {
			return;
		}
		value.clone_into(&mut self.value);
		self.dirty = true;
	}

	/// Whether the value has to be sent
	#[must_use]
	pub fn is_dirty(&self) -> bool {
		self.dirty
	}

	/// Mark the value as persisted
	pub fn clean(&mut self) {
		self.dirty = false;
	}
}

/// An issue together with its locally tracked custom fields.
#[derive(Debug, Clone)]
pub struct Entity {
	/// The fetched issue
	issue: Issue,
	/// Web URL of the issue
	url: String,
	/// Cells for every custom field written so far
	fields: HashMap<CustomField, Field>,
}

impl Entity {
	/// Wrap an issue of the Redmine instance at `base_url`.
	#[must_use]
	pub fn new(issue: Issue, base_url: &Url) -> Self {
		let url = format!("{}/issues/{}", base_url.as_str().trim_end_matches('/'), issue.id);
		Self { issue, url, fields: HashMap::new() }
	}

	/// The issue id
	#[must_use]
	pub fn id(&self) -> u64 {
		self.issue.id
	}

	/// The wrapped issue as fetched
	#[must_use]
	pub fn issue(&self) -> &Issue {
		&self.issue
	}

	/// Web URL of the issue
	#[must_use]
	pub fn url(&self) -> &str {
		&self.url
	}

	/// The current value of a custom field, including unsent local changes.
	/// Fails if the issue does not define the field.
	pub fn get(&self, field: CustomField) -> Result<String, Error> {
		match self.fields.get(&field) {
			Some(cell) => Ok(cell.value().to_owned()),
			None => self.issue.must_custom(field.name()),
		}
	}

	/// Change a custom field. Fails if the issue does not define the field.
	pub fn set(&mut self, field: CustomField, value: &str) -> Result<(), Error> {
		self.cell(field)?.set(value);
		Ok(())
	}

	/// The cell of a custom field, loading it from the issue on first use.
	pub fn cell(&mut self, field: CustomField) -> Result<&mut Field, Error> {
		Ok(match self.fields.entry(field) {
			Entry::Occupied(cell) => cell.into_mut(),
			Entry::Vacant(cell) => cell.insert(Field::new(self.issue.must_custom(field.name())?)),
		})
	}

	/// Whether any custom field has unsent changes
	#[must_use]
	pub fn is_dirty(&self) -> bool {
		self.fields.values().any(Field::is_dirty)
	}

	/// The dirty custom fields, numbered by `ids` and ordered by field id.
	#[must_use]
	pub fn pending(&self, ids: FieldIds) -> Vec<CustomFieldPatch> {
		let mut patches: Vec<_> = self
			.fields
			.iter()
			.filter(|(_, cell)| cell.is_dirty())
			.map(|(field, cell)| CustomFieldPatch {
				id: ids.id(*field),
				value: cell.value().to_owned(),
			})
			.collect();
		patches.sort_by_key(|patch| patch.id);
		patches
	}

	/// Mark every cell as persisted.
	pub fn commit(&mut self) {
		self.fields.values_mut().for_each(Field::clean);
	}

	/// Mail address of the primary user
	pub fn email(&self) -> Result<String, Error> {
		self.get(CustomField::PrimaryUserEmail)
	}

	/// Change the mail address of the primary user
	pub fn set_email(&mut self, value: &str) -> Result<(), Error> {
		self.set(CustomField::PrimaryUserEmail, value)
	}

	/// Mail address of the PI
	pub fn pi_email(&self) -> Result<String, Error> {
		self.get(CustomField::PiEmail)
	}

	/// Change the mail address of the PI
	pub fn set_pi_email(&mut self, value: &str) -> Result<(), Error> {
		self.set(CustomField::PiEmail, value)
	}

	/// PPMS group identifier
	pub fn ppms_group(&self) -> Result<String, Error> {
		self.get(CustomField::PpmsGroup)
	}
}

impl fmt::Display for Entity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.issue.subject, self.url)
	}
}

impl AsRef<Entity> for Entity {
	fn as_ref(&self) -> &Entity {
		self
	}
}

impl AsMut<Entity> for Entity {
	fn as_mut(&mut self) -> &mut Entity {
		self
	}
}

/// Implement the plumbing shared by the typed views.
macro_rules! view {
	($name:ident) => {
		impl From<Entity> for $name {
			fn from(entity: Entity) -> Self {
				Self(entity)
			}
		}

		impl Deref for $name {
			type Target = Entity;

			fn deref(&self) -> &Entity {
				&self.0
			}
		}

		impl DerefMut for $name {
			fn deref_mut(&mut self) -> &mut Entity {
				&mut self.0
			}
		}

		impl AsRef<Entity> for $name {
			fn as_ref(&self) -> &Entity {
				&self.0
			}
		}

		impl AsMut<Entity> for $name {
			fn as_mut(&mut self) -> &mut Entity {
				&mut self.0
			}
		}
	};
}

/// An issue of the user request project.
#[derive(Debug, Clone)]
pub struct EmgUser(Entity);

view!(EmgUser);

impl EmgUser {
	/// Whether the user is their own PI
	pub fn is_pi(&self) -> Result<bool, Error> {
		Ok(self.email()? == self.pi_email()?)
	}

	/// Name of the PI
	pub fn pi(&self) -> Result<String, Error> {
		self.get(CustomField::Pi)
	}

	/// Change the name of the PI
	pub fn set_pi(&mut self, value: &str) -> Result<(), Error> {
		self.set(CustomField::Pi, value)
	}

	/// First name
	pub fn first_name(&self) -> Result<String, Error> {
		self.get(CustomField::FirstName)
	}

	/// Last name
	pub fn last_name(&self) -> Result<String, Error> {
		self.get(CustomField::LastName)
	}

	/// "First Last"
	pub fn name(&self) -> Result<String, Error> {
		Ok(format!("{} {}", self.first_name()?, self.last_name()?))
	}

	/// Grid boxes labelled for the user
	pub fn labeled_grid_boxes(&self) -> Result<String, Error> {
		self.get(CustomField::LabeledGridBoxes)
	}

	/// Change the labelled grid boxes
	pub fn set_labeled_grid_boxes(&mut self, value: &str) -> Result<(), Error> {
		self.set(CustomField::LabeledGridBoxes, value)
	}

	/// Directory login
	pub fn ldap(&self) -> Result<String, Error> {
		self.get(CustomField::LdapUsername)
	}
}

impl fmt::Display for EmgUser {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.name() {
			Ok(name) => write!(f, "{name} ({})", self.url()),
			Err(_) => fmt::Display::fmt(&self.0, f),
		}
	}
}

/// An issue of the project request project.
#[derive(Debug, Clone)]
pub struct EmgProject(Entity);

view!(EmgProject);

impl EmgProject {
	/// Name of the primary user
	pub fn primary_user_name(&self) -> Result<String, Error> {
		self.issue().must_custom("Primary User Name")
	}

	/// Institution of the project
	pub fn institution(&self) -> Result<String, Error> {
		self.issue().must_custom("Institution")
	}

	/// Start date of the project
	pub fn start_date(&self) -> Result<Date, Error> {
		self.issue()
			.start_date
			.ok_or_else(|| Error::Missing(format!("start date of issue [{}]", self.id())))
	}

	/// Project id at the national center
	pub fn nc_project_id(&self) -> Result<String, Error> {
		self.get(CustomField::NcProjectId)
	}

	/// Change the national center project id
	pub fn set_nc_project_id(&mut self, value: &str) -> Result<(), Error> {
		self.set(CustomField::NcProjectId, value)
	}
}

impl fmt::Display for EmgProject {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.0, f)
	}
}

/// A national center proposal.
#[derive(Debug, Clone)]
pub struct Proposal(Entity);

view!(Proposal);

impl Proposal {
	/// Project id at the national center
	pub fn nc_project_id(&self) -> Result<String, Error> {
		self.get(CustomField::NcProjectId)
	}

	/// Mailing address of the lab
	pub fn lab_mailing_address(&self) -> Result<String, Error> {
		self.get(CustomField::NcLabMailingAddress)
	}

	/// Change the mailing address of the lab
	pub fn set_lab_mailing_address(&mut self, value: &str) -> Result<(), Error> {
		self.set(CustomField::NcLabMailingAddress, value)
	}

	/// City of the lab
	pub fn city(&self) -> Result<String, Error> {
		self.get(CustomField::NcCity)
	}

	/// Change the city of the lab
	pub fn set_city(&mut self, value: &str) -> Result<(), Error> {
		self.set(CustomField::NcCity, value)
	}

	/// State of the lab
	pub fn state(&self) -> Result<String, Error> {
		self.get(CustomField::NcState)
	}

	/// Change the state of the lab
	pub fn set_state(&mut self, value: &str) -> Result<(), Error> {
		self.set(CustomField::NcState, value)
	}

	/// Zip code of the lab
	pub fn zip(&self) -> Result<String, Error> {
		self.get(CustomField::NcZip)
	}

	/// Change the zip code of the lab
	pub fn set_zip(&mut self, value: &str) -> Result<(), Error> {
		self.set(CustomField::NcZip, value)
	}
}

impl fmt::Display for Proposal {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.0, f)
	}
}
