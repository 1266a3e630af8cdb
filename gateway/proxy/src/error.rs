use crate::Body;
use http::{header, HeaderValue, Response};
use kanali_gateway_core::Error;

#[derive(Debug, serde::Serialize)]
struct ErrorBody<'a> {
    status: u16,
    message: &'a str,
}

/// Renders a request-level failure as a JSON response.
pub(crate) fn respond(error: &Error) -> Response<Body> {
    let status = error.status();
    let message = error.to_string();
    let body = serde_json::to_vec(&ErrorBody {
        status: status.as_u16(),
        message: &message,
    })
    .unwrap_or_else(|_| message.clone().into_bytes());

    let mut rsp = Response::new(Body::from(body));
    *rsp.status_mut() = status;
    rsp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if let Error::RateLimited { retry_after } = error {
        // Round up so that clients never retry before the window closes.
        let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
        rsp.headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    rsp
}
