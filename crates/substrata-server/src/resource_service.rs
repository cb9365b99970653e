//! Resource HTTP service: serves content-addressed blobs by
//! URL, honouring a single `Range: bytes=a-b`/`bytes=a-` request and long
//! immutable caching. Grounded in `identity_server`'s axum router-building
//! style, adapted from its JSON API surface to raw byte responses.

use axum::{
	body::Body,
	extract::{Path, State},
	http::{HeaderMap, HeaderValue, StatusCode},
	response::{IntoResponse, Response},
	routing::get,
	Router,
};
use substrata_common::model::resource::ResourceState;
use tracing::instrument;

use crate::app::SharedApp;

pub fn router(app: SharedApp) -> Router {
	Router::new().route("/resource/:url", get(get_resource)).with_state(app)
}

struct ByteRange {
	start: u64,
	end: u64, // inclusive
}

/// Parses a single `bytes=a-b` or `bytes=a-` range against `file_size`.
/// Multi-ranges and anything out of bounds is rejected.
fn parse_range(header: &str, file_size: u64) -> Option<ByteRange> {
	let spec = header.strip_prefix("bytes=")?;
	if spec.contains(',') {
		return None; // multi-range not supported
	}
	let (a, b) = spec.split_once('-')?;
	let start: u64 = a.parse().ok()?;
	if start >= file_size {
		return None;
	}
	let end = if b.is_empty() {
		file_size - 1
	} else {
		let end: u64 = b.parse().ok()?;
		if end < start || end >= file_size {
			return None;
		}
		end
	};
	Some(ByteRange { start, end })
}

#[instrument(skip(app))]
async fn get_resource(State(app): State<SharedApp>, Path(url): Path<String>, headers: HeaderMap) -> Response {
	let local_path = {
		let Some(entry) = app.resources.get(&url) else {
			return StatusCode::NOT_FOUND.into_response();
		};
		if entry.state != ResourceState::Present {
			return StatusCode::NOT_FOUND.into_response();
		}
		entry.local_path.clone()
	};

	if headers.contains_key(axum::http::header::IF_MODIFIED_SINCE) {
		// content-addressed: the body can never change under the same URL.
		return StatusCode::NOT_MODIFIED.into_response();
	}

	let full_path = app.config.resource_dir.join(&local_path);
	let bytes = match tokio::fs::read(&full_path).await {
		Ok(b) => b,
		Err(_) => return StatusCode::NOT_FOUND.into_response(),
	};
	let file_size = bytes.len() as u64;

	let mut response = if let Some(range_header) = headers.get(axum::http::header::RANGE).and_then(|v| v.to_str().ok()) {
		match parse_range(range_header, file_size) {
			Some(range) => {
				let body = bytes[range.start as usize..=range.end as usize].to_vec();
				let mut resp = (StatusCode::PARTIAL_CONTENT, Body::from(body)).into_response();
				resp.headers_mut().insert(
					axum::http::header::CONTENT_RANGE,
					HeaderValue::from_str(&format!("bytes {}-{}/{}", range.start, range.end, file_size)).unwrap(),
				);
				resp
			}
			None => return StatusCode::RANGE_NOT_SATISFIABLE.into_response(),
		}
	} else {
		(StatusCode::OK, Body::from(bytes)).into_response()
	};

	response
		.headers_mut()
		.insert(axum::http::header::CACHE_CONTROL, HeaderValue::from_static("max-age=1000000000, immutable"));
	response
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn range_with_explicit_end_is_accepted() {
		let r = parse_range("bytes=10-19", 100).unwrap();
		assert_eq!(r.start, 10);
		assert_eq!(r.end, 19);
	}

	#[test]
	fn open_ended_range_extends_to_file_size_minus_one() {
		let r = parse_range("bytes=90-", 100).unwrap();
		assert_eq!(r.start, 90);
		assert_eq!(r.end, 99);
	}

	#[test]
	fn range_starting_past_end_of_file_is_rejected() {
		assert!(parse_range("bytes=100-", 100).is_none());
	}

	#[test]
	fn multi_range_is_rejected() {
		assert!(parse_range("bytes=0-10,20-30", 100).is_none());
	}

	#[test]
	fn end_before_start_is_rejected() {
		assert!(parse_range("bytes=50-10", 100).is_none());
	}
}
