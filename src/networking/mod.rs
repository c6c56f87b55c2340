use std::fs;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Certificate, Client, Response, StatusCode, Url};

use crate::config::{KeystoreSection, ServerSection};
use crate::error::{Result, UpdaterError};

#[cfg(test)]
pub mod memory;

/// Connect and read timeout applied to every request.
pub const TIMEOUT: Duration = Duration::from_millis(5000);

/// Read access to resources published under the update server.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `path` as UTF-8 text.
    async fn fetch_text(&self, path: &str) -> Result<String>;
    /// Fetch `path` as raw bytes, fully buffered.
    async fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>>;
}

/// HTTP fetcher that opens a fresh client for every request.
#[derive(Clone)]
pub struct NetworkClient {
    base: Url,
    root_certificate: Option<Certificate>,
}

impl NetworkClient {
    pub fn new(server: &ServerSection, keystore: Option<&KeystoreSection>) -> Result<Self> {
        let base = base_url(&server.scheme, &server.host, server.port)?;
        let root_certificate = keystore.and_then(|keystore| {
            load_certificate(&keystore.path)
                .inspect_err(|err| {
                    warn!(
                        "network client: ignoring keystore {} ({err})",
                        keystore.path.display()
                    )
                })
                .ok()
        });
        Ok(Self {
            base,
            root_certificate,
        })
    }

    /// Absolute URL of `path` on the update server.
    pub fn url(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);
        url
    }

    fn client(&self) -> Result<Client> {
        let mut builder = Client::builder()
            .connect_timeout(TIMEOUT)
            .read_timeout(TIMEOUT);
        if let Some(certificate) = &self.root_certificate {
            builder = builder.add_root_certificate(certificate.clone());
        }
        Ok(builder.build()?)
    }

    async fn get(&self, client: &Client, path: &str) -> Result<Response> {
        let url = self.url(path);
        debug!("network client: GET {url}");
        let response = client.get(url.clone()).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(UpdaterError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Fetcher for NetworkClient {
    async fn fetch_text(&self, path: &str) -> Result<String> {
        let client = self.client()?;
        let response = self.get(&client, path).await?;
        Ok(response.text().await?)
    }

    async fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let client = self.client()?;
        let response = self.get(&client, path).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

fn base_url(scheme: &str, host: &str, port: u16) -> Result<Url> {
    let raw = format!("{scheme}://{host}:{port}/");
    Url::parse(&raw).map_err(|err| UpdaterError::InvalidUrl(format!("{raw}: {err}")))
}

/// Trusted root certificate, PEM unless the file extension says DER.
fn load_certificate(path: &Path) -> Result<Certificate> {
    let bytes = fs::read(path)?;
    let is_der = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("der") || ext.eq_ignore_ascii_case("cer"));
    let certificate = if is_der {
        Certificate::from_der(&bytes)?
    } else {
        Certificate::from_pem(&bytes)?
    };
    Ok(certificate)
}
