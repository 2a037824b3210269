use crate::{
    data::{ResponseData, TestRequest},
    error::Error,
    frame::ContentType,
    util,
};
use async_trait::async_trait;
use hyper::{body, header, Body, Request, Response, Uri};
use hyper_tls::HttpsConnector;
use std::fmt::Debug;
use tracing::debug;

#[async_trait]
pub trait HttpClient: Debug {
    /// Sends `request` to the application served at `base_url`.
    async fn make_request(
        &self,
        base_url: &str,
        request: &TestRequest,
    ) -> Result<ResponseData, Error>;

    /// Fetches the body of `url` as text.
    async fn fetch(&self, url: &str) -> Result<String, Error>;
}

#[derive(Debug)]
pub struct HyperHttpClient {}

impl HyperHttpClient {
    pub fn new() -> Self {
        Self {}
    }

    async fn send(request: Request<Body>) -> Result<ResponseData, Error> {
        let client = hyper::Client::builder().build::<_, Body>(HttpsConnector::new());
        let response = client.request(request).await?;

        Self::into_response_data(response).await
    }

    async fn into_response_data(response: Response<Body>) -> Result<ResponseData, Error> {
        let status_code = response.status().as_u16();
        let headers = util::extract_headers(response.headers());
        let content_type = headers
            .get(header::CONTENT_TYPE.as_str())
            .map(ContentType::parse)
            .unwrap_or_default();
        let body = body::to_bytes(response.into_body()).await?;
        let body = content_type.decode(&body).into_owned();

        Ok(ResponseData {
            status_code,
            headers,
            body,
        })
    }
}

#[async_trait]
impl HttpClient for HyperHttpClient {
    async fn make_request(
        &self,
        base_url: &str,
        request: &TestRequest,
    ) -> Result<ResponseData, Error> {
        let url = util::join_url(base_url, &request.url_path);
        let uri: Uri = url.parse()?;
        let mut request_builder = Request::builder()
            .uri(uri)
            .method(request.method.as_str());

        if let Some(headers_mut) = request_builder.headers_mut() {
            util::put_headers(
                headers_mut,
                request
                    .headers
                    .iter()
                    .filter(|(header_name, _)| !util::is_restricted(header_name)),
            )?;
        }

        let body = request.payload().unwrap_or_default().to_string();
        let hyper_request: Request<Body> = request_builder.body(body.into())?;

        debug!(method = %request.method, %url, "replaying request");

        Self::send(hyper_request).await
    }

    async fn fetch(&self, url: &str) -> Result<String, Error> {
        let uri: Uri = url.parse()?;
        let request = Request::get(uri).body(Body::empty())?;
        let response = Self::send(request).await?;

        if !(200..300).contains(&response.status_code) {
            return Err(Error::InvalidScenario(format!(
                "{} answered with status {}",
                url, response.status_code
            )));
        }

        Ok(response.body)
    }
}

impl Default for HyperHttpClient {
    fn default() -> Self {
        Self::new()
    }
}
