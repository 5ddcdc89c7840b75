//! Server request: what the steps know about the incoming HTTP request

use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Multipart, RawPathParams, Request};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::IpAddr;

use crate::recipe::StepError;

/// Upper bound for urlencoded and JSON bodies
const MAX_FORM_BYTES: usize = 2 * 1024 * 1024;

/// File sent in a multipart form
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct ServerRequest {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    /// Parameters captured by the route (`/admin/content/{id}`)
    pub params: HashMap<String, String>,
    pub headers: HeaderMap,
    /// Submitted fields: urlencoded and multipart text fields as strings,
    /// JSON bodies as they were sent
    pub form: Option<Value>,
    pub upload: Option<UploadedFile>,
}

impl ServerRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: HashMap::new(),
            params: HashMap::new(),
            headers: HeaderMap::new(),
            form: None,
            upload: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, form: Value) -> Self {
        Self::new(Method::POST, path).with_form(form)
    }

    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_form(mut self, form: Value) -> Self {
        self.form = Some(form);
        self
    }

    pub fn with_upload(mut self, upload: UploadedFile) -> Self {
        self.upload = Some(upload);
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: &'static str) -> Self {
        self.headers.insert(name, HeaderValue::from_static(value));
        self
    }

    /// Read method, path, query, route parameters and body of an axum request
    pub async fn from_request(request: Request) -> Result<Self, StepError> {
        let (mut parts, body) = request.into_parts();

        let params = match RawPathParams::from_request_parts(&mut parts, &()).await {
            Ok(raw) => raw
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            Err(_) => HashMap::new(),
        };

        let mut server_request = Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(parse_query).unwrap_or_default(),
            params,
            headers: parts.headers.clone(),
            form: None,
            upload: None,
        };

        if !matches!(server_request.method, Method::POST | Method::PUT | Method::PATCH) {
            return Ok(server_request);
        }

        let content_type = server_request.header(header::CONTENT_TYPE.as_str()).unwrap_or("").to_lowercase();
        let request = Request::from_parts(parts, body);

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(request, &())
                .await
                .map_err(|e| StepError::bad_request(format!("Invalid multipart body: {}", e)))?;
            server_request.read_multipart(multipart).await?;
        } else {
            let bytes = axum::body::to_bytes(request.into_body(), MAX_FORM_BYTES)
                .await
                .map_err(|e| StepError::bad_request(format!("Failed to read request body: {}", e)))?;

            if content_type.starts_with("application/json") {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| StepError::bad_request(format!("Invalid JSON body: {}", e)))?;
                server_request.form = Some(value);
            } else if content_type.starts_with("application/x-www-form-urlencoded") || content_type.is_empty() {
                let text = std::str::from_utf8(&bytes)
                    .map_err(|_| StepError::bad_request("Form body is not valid UTF-8"))?;
                server_request.form = Some(Value::Object(form_fields(parse_pairs(text))));
            } else {
                return Err(StepError::bad_request(format!("Unsupported content type: {}", content_type)));
            }
        }

        Ok(server_request)
    }

    async fn read_multipart(&mut self, mut multipart: Multipart) -> Result<(), StepError> {
        let mut pairs = Vec::new();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| StepError::bad_request(format!("Invalid multipart field: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| StepError::bad_request(format!("Failed to read upload: {}", e)))?;
                    if !file_name.is_empty() && !data.is_empty() {
                        self.upload = Some(UploadedFile {
                            field: name,
                            file_name,
                            content_type,
                            data,
                        });
                    }
                }
                None => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| StepError::bad_request(format!("Invalid form field: {}", e)))?;
                    pairs.push((name, value));
                }
            }
        }

        self.form = Some(Value::Object(form_fields(pairs)));
        Ok(())
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn is_post(&self) -> bool {
        self.method == Method::POST
    }

    /// Whether the client asked for JSON rather than HTML
    pub fn wants_json(&self) -> bool {
        self.header(header::ACCEPT.as_str())
            .map(|accept| accept.contains("application/json") && !accept.contains("text/html"))
            .unwrap_or(false)
    }

    pub fn session_token(&self) -> Option<String> {
        session_token(&self.headers)
    }

    /// Client address reported by the reverse proxy
    ///
    /// The first `X-Forwarded-For` entry wins over `X-Real-IP`.
    pub fn client_ip(&self) -> Option<IpAddr> {
        self.header("x-forwarded-for")
            .and_then(|forwarded| forwarded.split(',').next())
            .or_else(|| self.header("x-real-ip"))
            .and_then(|ip| ip.trim().parse().ok())
    }
}

/// Session token from the `Authorization: Bearer` header or the `session` cookie
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .find_map(|cookie| cookie.trim().strip_prefix("session=").map(str::to_string))
        .filter(|token| !token.is_empty())
}

fn parse_query(query: &str) -> HashMap<String, String> {
    parse_pairs(query).into_iter().collect()
}

fn parse_pairs(encoded: &str) -> Vec<(String, String)> {
    encoded
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(name), decode_component(value))
        })
        .collect()
}

fn decode_component(text: &str) -> String {
    let text = text.replace('+', " ");
    urlencoding::decode(&text)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(text)
}

/// Collect fields into a JSON object; `name[]` fields become arrays and
/// `name[key]` fields become objects
fn form_fields(pairs: Vec<(String, String)>) -> Map<String, Value> {
    let mut fields = Map::new();
    for (name, value) in pairs {
        if let Some(list) = name.strip_suffix("[]") {
            let entry = fields
                .entry(list.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(values) = entry {
                values.push(Value::String(value));
            }
            continue;
        }

        let nested = name
            .strip_suffix(']')
            .and_then(|name| name.split_once('['))
            .filter(|(parent, key)| !parent.is_empty() && !key.is_empty());
        match nested {
            Some((parent, key)) => {
                let entry = fields
                    .entry(parent.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(map) = entry {
                    map.insert(key.to_string(), Value::String(value));
                }
            }
            None => {
                fields.insert(name, Value::String(value));
            }
        }
    }
    fields
}
