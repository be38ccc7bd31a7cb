use bytes::Bytes;
use http::{header, Response, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};

/// Body type every handler in ferry speaks: upstream bodies and canned
/// responses are both boxed into it.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Wrap a byte payload into the shared body type.
pub fn full_body(body: impl Into<Bytes>) -> ProxyBody {
    Full::new(body.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Plain-text response with the given status.
pub fn text_response(status: StatusCode, body: &'static str) -> Response<ProxyBody> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CONTENT_LENGTH, body.len())
        .body(full_body(body.as_bytes()))
        .unwrap_or_else(|_| {
            let mut resp = Response::new(full_body(&b"Internal Server Error"[..]));
            *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            resp
        })
}
