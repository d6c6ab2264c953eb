use crate::error::Result;

/// Fetches object bytes from the URL handed to an object-transform handler.
#[async_trait::async_trait]
pub trait ObjectSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetches presigned object URLs over HTTP.
#[derive(Clone, Default)]
pub struct HttpObjectSource {
    client: reqwest::Client,
}

impl HttpObjectSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ObjectSource for HttpObjectSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }
}
