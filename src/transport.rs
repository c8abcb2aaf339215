//! HTTP transport for delivery calls.
use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, Url};

use crate::Result;

/// A delivery call ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: Url,
    /// JSON body.
    pub body: Vec<u8>,
    /// Bound on both connecting and reading the response.
    pub timeout: Duration,
}

/// Raw outcome of a completed call. Non-success status codes are not errors at this layer.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Sends delivery calls.
///
/// Implementations report timeouts, refused connections and other network failures as
/// [`Error::Network`](crate::Error::Network). Retrying is up to the implementation.
pub trait Transport {
    fn send(&mut self, request: &HttpRequest) -> Result<HttpResponse>;
}

impl<T: FnMut(&HttpRequest) -> Result<HttpResponse>> Transport for T {
    fn send(&mut self, request: &HttpRequest) -> Result<HttpResponse> {
        self(request)
    }
}

/// Blocking `reqwest` transport.
#[derive(Default)]
pub struct HttpTransport {
    // Client holds a connection pool internally, so we're reusing the client between requests. It
    // is rebuilt only when the connect timeout changes.
    client: Option<(Duration, reqwest::blocking::Client)>,
}

impl HttpTransport {
    pub fn new() -> HttpTransport {
        HttpTransport::default()
    }

    fn client(&mut self, connect_timeout: Duration) -> Result<reqwest::blocking::Client> {
        if let Some((timeout, client)) = &self.client {
            if *timeout == connect_timeout {
                return Ok(client.clone());
            }
        }
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        self.client = Some((connect_timeout, client.clone()));
        Ok(client)
    }
}

impl Transport for HttpTransport {
    fn send(&mut self, request: &HttpRequest) -> Result<HttpResponse> {
        let client = self.client(request.timeout)?;

        log::debug!(target: "mbox_prefetch",
                    host = request.url.host_str().unwrap_or_default();
                    "sending delivery request");
        let response = client
            .post(request.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .timeout(request.timeout)
            .body(request.body.clone())
            .send()?;

        let status = response.status().as_u16();
        let body = response.bytes()?.to_vec();
        log::debug!(target: "mbox_prefetch", status = status, bytes = body.len(); "received delivery response");

        Ok(HttpResponse { status, body })
    }
}
