// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::net::{IpAddr, SocketAddr};

use http_body_util::Full;
use hyper::{
    body::Bytes,
    header,
    http::{self, HeaderMap, HeaderValue},
    Response, StatusCode,
};
use serde_json::{json, Value};
use tracing::{debug, error};

pub type HttpResponse = Response<Full<Bytes>>;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Serializes `body` into a JSON response with the given status and the
/// permissive CORS header every intake response carries.
pub fn json_response(status: StatusCode, body: &Value) -> http::Result<HttpResponse> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(Full::new(Bytes::from(body.to_string())))
}

/// Does two things:
/// 1. Logs the given message. A success status code (within 200-299) will cause a debug log to be
///    written, otherwise error will be written.
/// 2. Returns the given message in the body of JSON response with the given status code.
///
/// Response body format:
/// {
///     "success": bool,
///     "message": message
/// }
pub fn log_and_create_http_response(
    message: &str,
    status: StatusCode,
) -> http::Result<HttpResponse> {
    if status.is_success() {
        debug!("{message}");
    } else {
        error!("{message}");
    }
    json_response(
        status,
        &json!({ "success": status.is_success(), "message": message }),
    )
}

/// Answers a CORS preflight request.
pub fn preflight_response() -> http::Result<HttpResponse> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(header::ACCESS_CONTROL_ALLOW_METHODS, "GET,POST,OPTIONS")
        .header(header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type")
        .body(Full::new(Bytes::new()))
}

/// Takes a request's header map, and verifies that the "content-length" header, when present, is
/// valid and less than the given max_content_length.
///
/// A request without "content-length" and "Transfer-Encoding" carries no body and passes; the body
/// then reads as empty. Will return None if no issues are found. Otherwise logs an error (with the
/// given prefix) and returns and HTTP Response with the appropriate error status code.
pub fn verify_request_content_length(
    header_map: &HeaderMap,
    max_content_length: usize,
    error_message_prefix: &str,
) -> Option<http::Result<HttpResponse>> {
    let content_length_header = match header_map.get(header::CONTENT_LENGTH) {
        Some(res) => res,
        None => {
            match header_map.get(header::TRANSFER_ENCODING) {
                Some(transfer_encoding_header) => debug!(
                    "Transfer-Encoding header is present: {:?}",
                    transfer_encoding_header
                ),
                None => debug!("No Content-Length header, treating body as empty"),
            }
            return None;
        }
    };
    let content_length = match content_length_header
        .to_str()
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
    {
        Some(res) => res,
        None => {
            return Some(log_and_create_http_response(
                &format!("{error_message_prefix}: Invalid Content-Length header"),
                StatusCode::BAD_REQUEST,
            ));
        }
    };
    if content_length > max_content_length {
        return Some(log_and_create_http_response(
            &format!("{error_message_prefix}: Payload too large"),
            StatusCode::PAYLOAD_TOO_LARGE,
        ));
    }
    None
}

/// Resolves the client address: the first `X-Forwarded-For` entry when a
/// proxy supplied one, otherwise the peer address of the connection.
pub fn client_ip(header_map: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = header_map
        .get(X_FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| value.parse::<IpAddr>().is_ok());

    match forwarded {
        Some(ip) => Some(ip.to_string()),
        None => peer.map(|addr| addr.ip().to_string()),
    }
}

pub fn user_agent(header_map: &HeaderMap) -> Option<String> {
    header_map
        .get(header::USER_AGENT)
        .and_then(|value: &HeaderValue| value.to_str().ok())
        .map(str::to_string)
}
