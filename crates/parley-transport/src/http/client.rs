//! REST client used by adapters for outbound platform calls.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, ClientBuilder, Method, RequestBuilder, Response, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use parley_core::{TransportError, TransportResult};

/// Response bodies longer than this are cut in [`TransportError::Status`].
const MAX_ERROR_BODY: usize = 512;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How requests authenticate.
#[derive(Debug, Clone, Default)]
pub enum Auth {
    /// No credentials.
    #[default]
    None,
    /// A header sent with every request, e.g. `Authorization: Bot <token>`.
    Header {
        /// Header name.
        name: String,
        /// Header value.
        value: String,
    },
    /// An `access_token` query parameter appended to every URL.
    AccessToken(String),
}

impl Auth {
    /// Creates header authentication.
    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Header {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Creates query parameter authentication.
    pub fn access_token(token: impl Into<String>) -> Self {
        Self::AccessToken(token.into())
    }
}

/// One file of a multipart upload.
#[derive(Debug, Clone)]
pub struct FilePart {
    /// Form field name, e.g. `files[0]` or `filedata`.
    pub field: String,
    /// File name reported to the server.
    pub file_name: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// A multipart body made of text fields and files.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    fields: Vec<(String, String)>,
    files: Vec<FilePart>,
}

impl MultipartForm {
    /// Creates an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Adds a file.
    pub fn file(
        mut self,
        field: impl Into<String>,
        file_name: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        self.files.push(FilePart {
            field: field.into(),
            file_name: file_name.into(),
            bytes: bytes.into(),
        });
        self
    }

    /// Returns the text fields.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Returns the files.
    pub fn files(&self) -> &[FilePart] {
        &self.files
    }

    fn into_reqwest(self) -> Form {
        let form = self
            .fields
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value));
        self.files.into_iter().fold(form, |form, file| {
            form.part(file.field, Part::bytes(file.bytes).file_name(file.file_name))
        })
    }
}

/// JSON REST client bound to one API base URL.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    auth: Auth,
}

impl RestClient {
    /// Creates a client with the default 30 second timeout.
    pub fn new(base_url: impl Into<String>) -> TransportResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Creates a client with a custom timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> TransportResult<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth: Auth::None,
        })
    }

    /// Sets how requests authenticate.
    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Builds the absolute URL of `path` with `query` and credentials.
    pub fn url(&self, path: &str, query: &[(&str, &str)]) -> TransportResult<Url> {
        let raw = if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        };
        let mut url =
            Url::parse(&raw).map_err(|e| TransportError::InvalidConfig(format!("{raw}: {e}")))?;

        let token = match &self.auth {
            Auth::AccessToken(token) => Some(token.as_str()),
            _ => None,
        };
        if !query.is_empty() || token.is_some() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
            if let Some(token) = token {
                pairs.append_pair("access_token", token);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.auth {
            Auth::Header { name, value } => builder.header(name.as_str(), value.as_str()),
            _ => builder,
        }
    }

    /// Sends `GET path` and decodes the JSON response.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> TransportResult<T> {
        let url = self.url(path, query)?;
        trace!(path, "GET");
        let response = send(self.request(Method::GET, url)).await?;
        decode(response).await
    }

    /// Sends `POST path` with a JSON body and decodes the JSON response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> TransportResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path, &[])?;
        trace!(path, "POST");
        let response = send(self.request(Method::POST, url).json(body)).await?;
        decode(response).await
    }

    /// Sends `POST path` with a multipart body and decodes the JSON response.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: MultipartForm,
    ) -> TransportResult<T> {
        let url = self.url(path, &[])?;
        debug!(path, files = form.files().len(), "POST multipart");
        let response = send(
            self.request(Method::POST, url)
                .multipart(form.into_reqwest()),
        )
        .await?;
        decode(response).await
    }

    /// Sends `DELETE path`, ignoring any response body.
    pub async fn delete(&self, path: &str) -> TransportResult<()> {
        let url = self.url(path, &[])?;
        trace!(path, "DELETE");
        send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}

async fn send(builder: RequestBuilder) -> TransportResult<Response> {
    let response = builder.send().await.map_err(map_reqwest_error)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        body.truncate(cut);
    }
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> TransportResult<T> {
    let bytes = response.bytes().await.map_err(map_reqwest_error)?;
    // Empty bodies (204) decode as JSON null so callers may ask for `()`.
    let bytes: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
    serde_json::from_slice(bytes)
        .map_err(|e| TransportError::SendFailed(format!("invalid response body: {e}")))
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::ConnectionFailed {
            url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            reason: err.to_string(),
        }
    } else {
        TransportError::SendFailed(err.to_string())
    }
}
