//! Client: the answer under construction for the current request

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::debug;

use crate::recipe::StepError;

/// Buffered response accepted by the client
#[derive(Debug, Clone)]
pub struct Answer {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Answer {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: &str) -> Result<Self, StepError> {
        let value = HeaderValue::from_str(value).map_err(|e| StepError::Internal(e.into()))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn with_body(mut self, content_type: &str, body: impl Into<Bytes>) -> Result<Self, StepError> {
        self.body = body.into();
        self.with_header(header::CONTENT_TYPE, content_type)
    }

    pub fn html(status: StatusCode, html: String) -> Result<Self, StepError> {
        Self::new(status).with_body("text/html; charset=utf-8", html)
    }

    pub fn json(status: StatusCode, value: &impl Serialize) -> Result<Self, StepError> {
        let body = serde_json::to_vec(value).map_err(|e| StepError::Internal(e.into()))?;
        Self::new(status).with_body("application/json", body)
    }

    /// 303 See Other, so browsers follow with a GET after a form post
    pub fn redirect(location: &str) -> Result<Self, StepError> {
        Self::new(StatusCode::SEE_OTHER).with_header(header::LOCATION, location)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Receives the response of a request, exactly once in the normal case
///
/// Headers added with [`Client::add_header`] (cookies for instance) are
/// merged into whatever answer is finally sent.
#[derive(Debug, Default)]
pub struct Client {
    answer: Option<Answer>,
    failed: bool,
    headers: HeaderMap,
}

impl Client {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept_response(&mut self, answer: Answer) {
        if self.answer.is_some() {
            debug!("Client already has a response, replacing it");
        }
        self.answer = Some(answer);
    }

    /// Answer with an error page; replaces any response accepted before
    pub fn error_in_request(&mut self, answer: Answer) {
        self.failed = true;
        self.answer = Some(answer);
    }

    pub fn add_header(&mut self, name: HeaderName, value: &str) -> Result<(), StepError> {
        let value = HeaderValue::from_str(value).map_err(|e| StepError::Internal(e.into()))?;
        self.headers.append(name, value);
        Ok(())
    }

    /// Headers merged into the answer when it is sent
    pub fn pending_headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn has_response(&self) -> bool {
        self.answer.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn answer(&self) -> Option<&Answer> {
        self.answer.as_ref()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.answer.as_ref().map(|answer| answer.status)
    }
}

impl IntoResponse for Client {
    fn into_response(self) -> Response {
        let Some(answer) = self.answer else {
            let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
            response.headers_mut().extend(self.headers);
            return response;
        };

        let mut response = Response::new(Body::from(answer.body));
        *response.status_mut() = answer.status;
        *response.headers_mut() = answer.headers;
        for (name, value) in self.headers.iter() {
            response.headers_mut().append(name.clone(), value.clone());
        }
        response
    }
}
