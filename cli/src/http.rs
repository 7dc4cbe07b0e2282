//! `reqwest` implementation of the request seam.

#[cfg(test)]
#[path = "http_test.rs"]
mod http_test;

use accounts::transport::{ApiRequest, Method, RawResponse, Transport};
use accounts::TransportError;
use async_trait::async_trait;

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("accounts-cli/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    fn build(&self, request: ApiRequest) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(to_reqwest_method(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        builder
    }
}

#[async_trait(?Send)]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse, TransportError> {
        let request = self
            .build(request)
            .build()
            .map_err(|err| TransportError::Build(err.to_string()))?;
        tracing::debug!(method = %request.method(), url = %request.url(), "sending");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| TransportError::Body(err.to_string()))?;
        Ok(RawResponse { status, body })
    }
}

pub fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
    }
}
