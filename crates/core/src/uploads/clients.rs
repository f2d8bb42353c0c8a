use super::{LinkStore, ObjectStore, SocialPoster, StorageObject, UrlShortener};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, multipart};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

pub const DEFAULT_SHORTENER_ENDPOINT: &str = "https://www.googleapis.com/urlshortener/v1/url";
pub const DEFAULT_SOCIAL_API: &str = "https://api.x.com/2";

#[derive(Debug, Deserialize)]
struct ShortenResponse {
    id: String,
}

/// URL shortener speaking the `{"longUrl"}` → `{"id"}` protocol.
pub struct ShortenerClient {
    client: Client,
    endpoint: String,
    api_key: SecretString,
}

impl ShortenerClient {
    pub fn new(endpoint: String, api_key: SecretString) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl UrlShortener for ShortenerClient {
    async fn shorten(&self, long_url: &str) -> Result<String> {
        let body = serde_json::json!({ "longUrl": long_url });

        let resp = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&body)
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            return Err(anyhow::anyhow!("Status Code: {}", resp.status()));
        }

        let shortened = resp.json::<ShortenResponse>().await?;
        Ok(shortened.id)
    }
}

/// Realtime database accessed through its REST interface.
pub struct RealtimeDatabase {
    client: Client,
    base_url: String,
    secret: Option<SecretString>,
}

impl RealtimeDatabase {
    pub fn new(base_url: String, secret: Option<SecretString>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            secret,
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl LinkStore for RealtimeDatabase {
    async fn write_link(&self, path: &str, short_url: &str) -> Result<()> {
        let mut request = self.client.put(self.url_for(path)).json(&short_url);
        if let Some(secret) = &self.secret {
            request = request.query(&[("auth", secret.expose_secret())]);
        }
        request
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("Database refused write to {path}"))?;
        Ok(())
    }
}

/// Fetches objects through their public download URL.
pub struct HttpObjectStore {
    client: Client,
}

impl HttpObjectStore {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn download(&self, object: &StorageObject) -> Result<Vec<u8>> {
        let bytes = self
            .client
            .get(object.public_url())
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    data: MediaData,
}

#[derive(Debug, Deserialize)]
struct MediaData {
    id: String,
}

/// Posts to the booth's social account with a user-context bearer token.
pub struct SocialClient {
    client: Client,
    api_base: String,
    token: SecretString,
}

impl SocialClient {
    pub fn new(api_base: String, token: SecretString) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        }
    }
}

#[async_trait]
impl SocialPoster for SocialClient {
    async fn upload_media(&self, image: Vec<u8>) -> Result<String> {
        let part = multipart::Part::bytes(image)
            .file_name("photo.jpg")
            .mime_str("image/jpeg")?;
        let form = multipart::Form::new()
            .text("media_category", "tweet_image")
            .part("media", part);

        let resp = self
            .client
            .post(format!("{}/media/upload", self.api_base))
            .bearer_auth(self.token.expose_secret())
            .multipart(form)
            .send()
            .await?
            .error_for_status()
            .context("Media upload rejected")?
            .json::<MediaUploadResponse>()
            .await?;
        Ok(resp.data.id)
    }

    async fn post_status(&self, status: &str, media_id: &str) -> Result<()> {
        let body = serde_json::json!({
            "text": status,
            "media": { "media_ids": [media_id] }
        });
        self.client
            .post(format!("{}/tweets", self.api_base))
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .context("Status post rejected")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url_joins_path_once() {
        let db = RealtimeDatabase::new("https://booth.firebaseio.com/".to_string(), None);
        assert_eq!(
            db.url_for("/links/images/1494967521"),
            "https://booth.firebaseio.com/links/images/1494967521.json"
        );
    }
}
