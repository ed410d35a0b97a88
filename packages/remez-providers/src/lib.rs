pub mod embedding;
pub mod generative;

pub use embedding::embed;
pub use generative::generate;

use reqwest::{
	Response, StatusCode,
	header::{AUTHORIZATION, HeaderMap, HeaderName},
};
use serde_json::{Map, Value};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// HTTP 429 and provider-specific quota rejections.
	#[error("Provider rejected the call for exceeding quota.")]
	Quota,
	/// 5xx-class upstream failures, retried the same way as quota errors.
	#[error("Provider returned a transient server error (status {status}).")]
	Transient { status: u16 },
	#[error("Provider response was malformed: {message}")]
	Malformed { message: String },
	#[error("Invalid provider configuration: {message}")]
	Config { message: String },
	#[error(transparent)]
	Http(#[from] reqwest::Error),
}

impl Error {
	/// Whether the orchestrator should retry this call after backing off.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Quota | Self::Transient { .. } => true,
			Self::Http(err) => err.is_timeout() || err.is_connect(),
			Self::Malformed { .. } | Self::Config { .. } => false,
		}
	}
}

/// Maps an HTTP response into the quota/transient/other error classes before
/// the body is consumed.
pub(crate) fn classify_status(response: Response) -> Result<Response> {
	let status = response.status();

	if status == StatusCode::TOO_MANY_REQUESTS {
		return Err(Error::Quota);
	}
	if status.is_server_error() {
		return Err(Error::Transient { status: status.as_u16() });
	}

	Ok(response.error_for_status()?)
}

pub(crate) fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(
		AUTHORIZATION,
		format!("Bearer {api_key}")
			.parse()
			.map_err(|_| Error::Config { message: "API key is not a valid header value.".to_string() })?,
	);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::Config { message: "Default header values must be strings.".to_string() });
		};
		let name = HeaderName::from_bytes(key.as_bytes())
			.map_err(|_| Error::Config { message: format!("Invalid header name {key:?}.") })?;

		headers.insert(
			name,
			raw.parse()
				.map_err(|_| Error::Config { message: format!("Invalid header value for {key:?}.") })?,
		);
	}

	Ok(headers)
}
