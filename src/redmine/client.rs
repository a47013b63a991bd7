//! Transport for the Redmine REST API

use async_trait::async_trait;
use reqwest::{header, Response};
use tracing::debug;
use url::Url;

use crate::{
	error::Error,
	redmine::issue::{Issue, IssueEnvelope, IssueFilter, IssueList, IssueUpdate, UpdateEnvelope},
};

/// Header carrying the API key
const API_KEY_HEADER: &str = "x-redmine-api-key";

/// The issue calls used by [`Connection`](crate::redmine::Connection).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IssueTracker: Send + Sync {
	/// Fetch one issue.
	async fn get(&self, id: u64) -> Result<Issue, Error>;
	/// Fetch the issues matching a filter. Only one page is returned, sized
	/// by the filter's limit or the server default.
	async fn filter(&self, filter: &IssueFilter) -> Result<Vec<Issue>, Error>;
	/// Apply an update to one issue.
	async fn update(&self, id: u64, update: &IssueUpdate) -> Result<(), Error>;
}

/// The Redmine REST API over HTTP
#[derive(Debug, Clone)]
pub struct RedmineClient {
	/// HTTP client, carrying the API key as a default header
	client: reqwest::Client,
	/// Base URL of the instance
	url: Url,
}

impl RedmineClient {
	/// Create a client for the instance at `url`.
	pub fn new(url: Url, key: &str) -> Result<Self, Error> {
		let mut headers = header::HeaderMap::new();
		let mut key = header::HeaderValue::from_str(key)
			.map_err(|_| Error::Invalid("Redmine API key is not a valid header value".to_owned()))?;
		key.set_sensitive(true);
		headers.insert(API_KEY_HEADER, key);
		let client = reqwest::Client::builder().default_headers(headers).build()?;
		Ok(Self { client, url })
	}

	/// URL of an API resource below the base URL
	fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
		let mut url = self.url.clone();
		url.path_segments_mut()
			.map_err(|()| Error::Invalid(format!("{} cannot be a base URL", self.url)))?
			.pop_if_empty()
			.extend(segments);
		Ok(url)
	}
}

/// Turn unsuccessful responses into [`Error::Api`]
async fn check(response: Response) -> Result<Response, Error> {
	let status = response.status();
	if status.is_success() {
		return Ok(response);
	}
	let url = response.url().to_string();
	let body = response.text().await.unwrap_or_default();
	if status == reqwest::StatusCode::NOT_FOUND {
		return Err(Error::NotFound(url));
	}
	Err(Error::Api { url, status, body })
}

#[async_trait]
impl IssueTracker for RedmineClient {
	async fn get(&self, id: u64) -> Result<Issue, Error> {
		let url = self.endpoint(&["issues", &format!("{id}.json")])?;
		debug!(%url, "Fetching issue");
		let response = check(self.client.get(url).send().await?).await?;
		Ok(response.json::<IssueEnvelope>().await?.issue)
	}

	async fn filter(&self, filter: &IssueFilter) -> Result<Vec<Issue>, Error> {
		let url = self.endpoint(&["issues.json"])?;
		let query = filter.to_query()?;
		debug!(%url, ?query, "Filtering issues");
		let response = check(self.client.get(url).query(&query).send().await?).await?;
		Ok(response.json::<IssueList>().await?.issues)
	}

	async fn update(&self, id: u64, update: &IssueUpdate) -> Result<(), Error> {
		let url = self.endpoint(&["issues", &format!("{id}.json")])?;
		debug!(%url, ?update, "Updating issue");
		check(self.client.put(url).json(&UpdateEnvelope { issue: update }).send().await?).await?;
		Ok(())
	}
}
