// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{header, Response, StatusCode};
use tracing::{debug, warn};

pub type HttpResponse = Response<Full<Bytes>>;

/// Does two things:
/// 1. Logs the given message. A success status code (within 200-299) will cause a debug log to be
///    written, otherwise a warning will be written.
/// 2. Returns the given message as a plaintext body with the given status code. Statuses that
///    cannot carry a body (such as 204) get an empty one.
pub fn log_and_create_http_response(message: &str, status: StatusCode) -> HttpResponse {
    if status.is_success() {
        debug!("{message}");
    } else {
        warn!("{message}");
    }
    let body = if status == StatusCode::NO_CONTENT {
        Bytes::new()
    } else {
        Bytes::from(message.to_string())
    };
    with_content_type(Response::new(Full::new(body)), status, "text/plain; charset=utf-8")
}

pub fn create_html_response(html: &'static str) -> HttpResponse {
    with_content_type(
        Response::new(Full::new(Bytes::from_static(html.as_bytes()))),
        StatusCode::OK,
        "text/html; charset=utf-8",
    )
}

fn with_content_type(
    mut response: HttpResponse,
    status: StatusCode,
    content_type: &'static str,
) -> HttpResponse {
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static(content_type),
    );
    response
}
