//! Read-only access to the Leginon database.
//!
//! The schema belongs to Leginon; the rows below map the columns this crate
//! reads, under the legacy column names. Nothing here writes to the
//! database.

use std::fmt;

use sqlx::{mysql::MySqlPoolOptions, FromRow, MySqlPool};
use time::OffsetDateTime;
use tracing::debug;

use crate::{config::LeginonConfig, error::Error};

/// A Leginon user (`UserData`).
#[derive(Debug, Clone, FromRow)]
pub struct UserData {
	/// Row id
	#[sqlx(rename = "DEF_id")]
	pub def_id: i32,
	/// Creation time
	#[sqlx(rename = "DEF_timestamp")]
	pub def_timestamp: OffsetDateTime,
	/// Login name, unique
	pub username: String,
	/// First name
	pub firstname: Option<String>,
	/// Last name
	pub lastname: Option<String>,
	/// Password hash
	pub password: Option<String>,
	/// Mail address
	pub email: Option<String>,
	/// Group of the user
	#[sqlx(rename = "REF|GroupData|group")]
	pub ref_groupdata_group: i32,
	/// Whether the user is barred from Leginon
	pub noleginon: Option<i32>,
	/// Whether the user sees the advanced interface
	pub advanced: Option<i32>,
}

impl fmt::Display for UserData {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.username)
	}
}

/// An imaging session (`SessionData`).
#[derive(Debug, Clone, FromRow)]
pub struct SessionData {
	/// Row id
	#[sqlx(rename = "DEF_id")]
	pub def_id: i32,
	/// Creation time
	#[sqlx(rename = "DEF_timestamp")]
	pub def_timestamp: OffsetDateTime,
	/// Session name
	pub name: Option<String>,
	/// The user running the session
	#[sqlx(rename = "REF|UserData|user")]
	pub ref_userdata_user: Option<i32>,
	/// Directory holding the session's images
	#[sqlx(rename = "image path")]
	pub image_path: Option<String>,
	/// Free-form comment
	pub comment: Option<String>,
	/// Whether the session is hidden
	pub hidden: Option<i32>,
	/// Grid holder used
	#[sqlx(rename = "REF|GridHolderData|holder")]
	pub ref_gridholderdata_holder: Option<i32>,
}

impl fmt::Display for SessionData {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name.as_deref().unwrap_or("<no name>"))
	}
}

/// Camera configuration of one exposure (`CameraEMData`).
#[derive(Debug, Clone, FromRow)]
pub struct CameraEmData {
	/// Row id
	#[sqlx(rename = "DEF_id")]
	pub def_id: i32,
	/// Creation time
	#[sqlx(rename = "DEF_timestamp")]
	pub def_timestamp: OffsetDateTime,
	/// The session the exposure belongs to
	#[sqlx(rename = "REF|SessionData|session")]
	pub ref_sessiondata_session: Option<i32>,
	/// Camera host clock
	#[sqlx(rename = "system time")]
	pub system_time: Option<f64>,
	/// Image width
	#[sqlx(rename = "SUBD|dimension|x")]
	pub subd_dimension_x: Option<i32>,
	/// Image height
	#[sqlx(rename = "SUBD|dimension|y")]
	pub subd_dimension_y: Option<i32>,
	/// Horizontal binning
	#[sqlx(rename = "SUBD|binning|x")]
	pub subd_binning_x: Option<i32>,
	/// Vertical binning
	#[sqlx(rename = "SUBD|binning|y")]
	pub subd_binning_y: Option<i32>,
	/// Multiplier applied to binned images
	#[sqlx(rename = "binned multiplier")]
	pub binned_multiplier: Option<f64>,
	/// Horizontal offset
	#[sqlx(rename = "SUBD|offset|x")]
	pub subd_offset_x: Option<i32>,
	/// Vertical offset
	#[sqlx(rename = "SUBD|offset|y")]
	pub subd_offset_y: Option<i32>,
	/// Exposure time in milliseconds
	#[sqlx(rename = "exposure time")]
	pub exposure_time: Option<f64>,
	/// Exposure type, e.g. "normal" or "dark"
	#[sqlx(rename = "exposure type")]
	pub exposure_type: Option<String>,
	/// Time of the exposure
	#[sqlx(rename = "exposure timestamp")]
	pub exposure_timestamp: Option<f64>,
	/// Whether the camera was inserted
	pub inserted: Option<i32>,
	/// Whether the image was dumped
	pub dump: Option<i32>,
	/// Horizontal pixel size
	#[sqlx(rename = "SUBD|pixel size|x")]
	pub subd_pixel_size_x: Option<f64>,
	/// Vertical pixel size
	#[sqlx(rename = "SUBD|pixel size|y")]
	pub subd_pixel_size_y: Option<f64>,
	/// Whether an energy filter was used
	#[sqlx(rename = "energy filtered")]
	pub energy_filtered: Option<i32>,
	/// Energy filter state
	#[sqlx(rename = "energy filter")]
	pub energy_filter: Option<i32>,
	/// Energy filter slit width
	#[sqlx(rename = "energy filter width")]
	pub energy_filter_width: Option<f64>,
	/// Number of frames
	pub nframes: Option<i32>,
	/// Whether frames were saved
	#[sqlx(rename = "save frames")]
	pub save_frames: Option<i32>,
	/// Whether frames were aligned
	#[sqlx(rename = "align frames")]
	pub align_frames: Option<i32>,
	/// Frame alignment filter
	#[sqlx(rename = "align filter")]
	pub align_filter: Option<String>,
	/// Name of the saved frame stack
	#[sqlx(rename = "frames name")]
	pub frames_name: Option<String>,
	/// Time per frame
	#[sqlx(rename = "frame time")]
	pub frame_time: Option<f64>,
	/// Frame flip
	#[sqlx(rename = "frame flip")]
	pub frame_flip: Option<i32>,
	/// Frame rotation
	#[sqlx(rename = "frame rotate")]
	pub frame_rotate: Option<i32>,
	/// Detector temperature
	pub temperature: Option<f64>,
	/// Detector temperature status
	#[sqlx(rename = "temperature status")]
	pub temperature_status: Option<String>,
	/// Readout delay
	#[sqlx(rename = "readout delay")]
	pub readout_delay: Option<i32>,
	/// Gain index
	#[sqlx(rename = "gain index")]
	pub gain_index: Option<i32>,
	/// Whether the camera corrected the image
	#[sqlx(rename = "system corrected")]
	pub system_corrected: Option<i32>,
	/// The camera instrument
	#[sqlx(rename = "REF|InstrumentData|ccdcamera")]
	pub ref_instrumentdata_ccdcamera: Option<i32>,
	/// Frames used
	#[sqlx(rename = "SEQ|use frames")]
	pub seq_use_frames: Option<String>,
}

impl CameraEmData {
	/// "<session>|<timestamp>", given the session the exposure belongs to
	#[must_use]
	pub fn label(&self, session: Option<&SessionData>) -> String {
		label(session, self.def_timestamp)
	}
}

/// Format a camera label
fn label(session: Option<&SessionData>, timestamp: OffsetDateTime) -> String {
	let session = session.map_or_else(|| "<no session>".to_owned(), ToString::to_string);
	format!("{session}|{timestamp}")
}

/// An acquired image (`AcquisitionImageData`).
#[derive(Debug, Clone, FromRow)]
pub struct AcquisitionImageData {
	/// Row id
	#[sqlx(rename = "DEF_id")]
	pub def_id: i32,
	/// Creation time
	#[sqlx(rename = "DEF_timestamp")]
	pub def_timestamp: OffsetDateTime,
	/// The session the image belongs to
	#[sqlx(rename = "REF|SessionData|session")]
	pub ref_sessiondata_session: Option<i32>,
	/// File name of the MRC image
	#[sqlx(rename = "MRC|image")]
	pub mrc_image: Option<String>,
	/// Pixel type
	pub pixeltype: Option<String>,
	/// Number of pixels
	pub pixels: Option<i32>,
	/// Label of the acquisition node
	pub label: Option<String>,
	/// File name without extension
	pub filename: Option<String>,
	/// Image list
	#[sqlx(rename = "REF|ImageListData|list")]
	pub ref_imagelistdata_list: Option<i32>,
	/// Processing queue
	#[sqlx(rename = "REF|QueueData|queue")]
	pub ref_queuedata_queue: Option<i32>,
	/// Microscope state
	#[sqlx(rename = "REF|ScopeEMData|scope")]
	pub ref_scopeemdata_scope: Option<i32>,
	/// Camera configuration
	#[sqlx(rename = "REF|CameraEMData|camera")]
	pub ref_cameraemdata_camera: Option<i32>,
	/// Corrector plan
	#[sqlx(rename = "REF|CorrectorPlanData|corrector plan")]
	pub ref_correctorplandata_corrector_plan: Option<i32>,
	/// Correction channel
	#[sqlx(rename = "correction channel")]
	pub correction_channel: Option<i32>,
	/// Channel
	pub channel: Option<i32>,
	/// Dark reference
	#[sqlx(rename = "REF|DarkImageData|dark")]
	pub ref_darkimagedata_dark: Option<i32>,
	/// Bright reference
	#[sqlx(rename = "REF|BrightImageData|bright")]
	pub ref_brightimagedata_bright: Option<i32>,
	/// Gain normalization reference
	#[sqlx(rename = "REF|NormImageData|norm")]
	pub ref_normimagedata_norm: Option<i32>,
	/// Preset
	#[sqlx(rename = "REF|PresetData|preset")]
	pub ref_presetdata_preset: Option<i32>,
	/// Acquisition target
	#[sqlx(rename = "REF|AcquisitionImageTargetData|target")]
	pub ref_acquisitionimagetargetdata_target: Option<i32>,
	/// Microscope target
	#[sqlx(rename = "REF|EMTargetData|emtarget")]
	pub ref_emtargetdata_emtarget: Option<i32>,
	/// Grid
	#[sqlx(rename = "REF|GridData|grid")]
	pub ref_griddata_grid: Option<i32>,
	/// Spot well map
	#[sqlx(rename = "REF|SpotWellMapData|spotmap")]
	pub ref_spotwellmapdata_spotmap: Option<i32>,
	/// Tilt series
	#[sqlx(rename = "REF|TiltSeriesData|tilt series")]
	pub ref_tiltseriesdata_tilt_series: Option<i32>,
	/// Image version
	pub version: Option<i32>,
	/// Position within the tilt series
	pub tiltnumber: Option<i32>,
	/// Mover parameters
	#[sqlx(rename = "REF|MoverParamsData|mover")]
	pub ref_moverparamsdata_mover: Option<i32>,
	/// Frames used
	#[sqlx(rename = "SEQ|use frames")]
	pub seq_use_frames: Option<String>,
}

impl fmt::Display for AcquisitionImageData {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.mrc_image.as_deref().unwrap_or("<no mrc>"))
	}
}

/// A connection pool to the Leginon database.
#[derive(Debug, Clone)]
pub struct Leginon {
	/// The pool
	pool: MySqlPool,
}

impl Leginon {
	/// Connect to the configured database.
	pub async fn connect(config: &LeginonConfig) -> Result<Self, Error> {
		let pool = MySqlPoolOptions::new()
			.max_connections(config.max_connections)
			.connect(&config.url)
			.await?;
		debug!("Connected to Leginon database");
		Ok(Self { pool })
	}

	/// Wrap an existing pool
	#[must_use]
	pub fn with_pool(pool: MySqlPool) -> Self {
		Self { pool }
	}

	/// All users, ordered by username.
	pub async fn users(&self) -> Result<Vec<UserData>, Error> {
		Ok(sqlx::query_as("SELECT * FROM `UserData` ORDER BY `username`")
			.fetch_all(&self.pool)
			.await?)
	}

	/// The user with the given login name.
	pub async fn user_for_username(&self, username: &str) -> Result<Option<UserData>, Error> {
		Ok(sqlx::query_as("SELECT * FROM `UserData` WHERE `username` = ?")
			.bind(username)
			.fetch_optional(&self.pool)
			.await?)
	}

	/// One session.
	pub async fn session(&self, id: i32) -> Result<Option<SessionData>, Error> {
		Ok(sqlx::query_as("SELECT * FROM `SessionData` WHERE `DEF_id` = ?")
			.bind(id)
			.fetch_optional(&self.pool)
			.await?)
	}

	/// The sessions of a user, oldest first.
	pub async fn sessions_for_user(&self, user: &UserData) -> Result<Vec<SessionData>, Error> {
		Ok(sqlx::query_as(
			"SELECT * FROM `SessionData` WHERE `REF|UserData|user` = ? ORDER BY `DEF_timestamp`",
		)
		.bind(user.def_id)
		.fetch_all(&self.pool)
		.await?)
	}

	/// The camera configurations recorded in a session.
	pub async fn cameras_for_session(
		&self,
		session: &SessionData,
	) -> Result<Vec<CameraEmData>, Error> {
		Ok(sqlx::query_as(
			"SELECT * FROM `CameraEMData` WHERE `REF|SessionData|session` = ? \
			 ORDER BY `DEF_timestamp`",
		)
		.bind(session.def_id)
		.fetch_all(&self.pool)
		.await?)
	}

	/// The images acquired in a session.
	pub async fn images_for_session(
		&self,
		session: &SessionData,
	) -> Result<Vec<AcquisitionImageData>, Error> {
		Ok(sqlx::query_as(
			"SELECT * FROM `AcquisitionImageData` WHERE `REF|SessionData|session` = ? \
			 ORDER BY `DEF_timestamp`",
		)
		.bind(session.def_id)
		.fetch_all(&self.pool)
		.await?)
	}

	/// The camera configuration an image was taken with.
	pub async fn camera_for_image(
		&self,
		image: &AcquisitionImageData,
	) -> Result<Option<CameraEmData>, Error> {
		let Some(camera) = image.ref_cameraemdata_camera else {
			return Ok(None);
		};
		Ok(sqlx::query_as("SELECT * FROM `CameraEMData` WHERE `DEF_id` = ?")
			.bind(camera)
			.fetch_optional(&self.pool)
			.await?)
	}
}
