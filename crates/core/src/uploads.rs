//! Reacts to photos the booth uploads to cloud storage.
//!
//! For every new object the public URL is shortened, the short link is stored
//! where the booth screen can pick it up, and, if the booth flagged the
//! picture for it, the photo is posted to the social account.

pub mod clients;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::try_join;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

const PUBLIC_URL_BASE: &str = "https://firebasestorage.googleapis.com/v0";
const RESOURCE_EXISTS: &str = "exists";
const TWEET_FLAG: &str = "tweetme";
const DOWNLOAD_TOKEN: &str = "firebaseStorageDownloadTokens";
const LINKS_ROOT: &str = "/links/";

/// The object carried by a storage-change event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageObject {
    pub bucket: String,
    /// Object path inside the bucket, e.g. `images/1494967521.jpg`.
    pub name: String,
    pub resource_state: String,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

impl StorageObject {
    /// Deletions and metadata-only changes are not new photos.
    pub fn exists(&self) -> bool {
        self.resource_state == RESOURCE_EXISTS
    }

    /// Any non-empty `tweetme` value asks for a post, "false" included.
    pub fn wants_post(&self) -> bool {
        self.metadata_value(TWEET_FLAG).is_some_and(|flag| !flag.is_empty())
    }

    fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref()?.get(key).map(String::as_str)
    }

    /// Download URL that works without credentials thanks to the object's
    /// download token.
    pub fn public_url(&self) -> String {
        let mut url = format!(
            "{PUBLIC_URL_BASE}/b/{}/o/{}?alt=media",
            self.bucket,
            urlencoding::encode(&self.name)
        );
        if let Some(token) = self.metadata_value(DOWNLOAD_TOKEN) {
            url.push_str("&token=");
            url.push_str(token);
        }
        url
    }

    /// Database path of the short link: `images/foo.jpg` → `/links/images/foo`.
    pub fn link_path(&self) -> String {
        let stem = match self.name.rfind('.') {
            Some(dot) if !self.name[dot..].contains('/') => &self.name[..dot],
            _ => self.name.as_str(),
        };
        format!("{LINKS_ROOT}{stem}")
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait UrlShortener: Send + Sync {
    async fn shorten(&self, long_url: &str) -> Result<String>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait LinkStore: Send + Sync {
    async fn write_link(&self, path: &str, short_url: &str) -> Result<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, object: &StorageObject) -> Result<Vec<u8>>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SocialPoster: Send + Sync {
    /// Uploads an image and returns the media id to attach to a post.
    async fn upload_media(&self, image: Vec<u8>) -> Result<String>;

    async fn post_status(&self, status: &str, media_id: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum UploadOutcome {
    /// The event was not about a new object.
    Ignored,
    Recorded { short_url: String, posted: bool },
}

pub struct UploadNotifier {
    shortener: Arc<dyn UrlShortener>,
    links: Arc<dyn LinkStore>,
    objects: Arc<dyn ObjectStore>,
    social: Option<Arc<dyn SocialPoster>>,
}

impl UploadNotifier {
    pub fn new(
        shortener: Arc<dyn UrlShortener>,
        links: Arc<dyn LinkStore>,
        objects: Arc<dyn ObjectStore>,
        social: Option<Arc<dyn SocialPoster>>,
    ) -> Self {
        Self {
            shortener,
            links,
            objects,
            social,
        }
    }

    /// Runs the pipeline for one storage event. The first failing stage
    /// abandons the rest; nothing is retried.
    pub async fn handle(&self, object: &StorageObject) -> Result<UploadOutcome> {
        if !object.exists() {
            info!("File deleted at path: {}", object.name);
            return Ok(UploadOutcome::Ignored);
        }

        let public_url = object.public_url();
        info!("Public URL: {public_url}");

        let short_url = self
            .shortener
            .shorten(&public_url)
            .await
            .with_context(|| format!("Failed to shorten URL for {}", object.name))?;
        info!("Short URL: {short_url}");

        let link_path = object.link_path();
        let record = async {
            self.links
                .write_link(&link_path, &short_url)
                .await
                .with_context(|| format!("Failed to write short URL to {link_path}"))
        };
        let post = self.post(object, &short_url);
        let ((), posted) = try_join(record, post).await?;

        Ok(UploadOutcome::Recorded { short_url, posted })
    }

    async fn post(&self, object: &StorageObject, short_url: &str) -> Result<bool> {
        if !object.wants_post() {
            return Ok(false);
        }
        let Some(social) = &self.social else {
            info!("Post requested for {} but social posting is disabled", object.name);
            return Ok(false);
        };

        let image = self
            .objects
            .download(object)
            .await
            .with_context(|| format!("Failed to download {}", object.name))?;
        info!("Image downloaded: {} bytes", image.len());

        let media_id = social
            .upload_media(image)
            .await
            .context("Failed to upload image to social account")?;
        social
            .post_status(&post_text(short_url), &media_id)
            .await
            .context("Failed to post status")?;
        info!("Posted {} with media {media_id}", object.name);
        Ok(true)
    }
}

pub fn post_text(short_url: &str) -> String {
    format!("Hey! Here's your photo: {short_url}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(tweet: bool) -> StorageObject {
        let mut metadata = HashMap::from([(
            DOWNLOAD_TOKEN.to_string(),
            "tok-123".to_string(),
        )]);
        if tweet {
            metadata.insert(TWEET_FLAG.to_string(), "true".to_string());
        }
        StorageObject {
            bucket: "booth.appspot.com".to_string(),
            name: "images/1494967521.jpg".to_string(),
            resource_state: "exists".to_string(),
            metadata: Some(metadata),
        }
    }

    fn shortener_returning(short: &'static str) -> MockUrlShortener {
        let mut shortener = MockUrlShortener::new();
        shortener
            .expect_shorten()
            .times(1)
            .returning(move |_| Ok(short.to_string()));
        shortener
    }

    #[test]
    fn test_public_url_encodes_path_and_appends_token() {
        assert_eq!(
            photo(false).public_url(),
            "https://firebasestorage.googleapis.com/v0/b/booth.appspot.com/o/images%2F1494967521.jpg?alt=media&token=tok-123"
        );
    }

    #[test]
    fn test_link_path_strips_extension() {
        assert_eq!(photo(false).link_path(), "/links/images/1494967521");
        let no_ext = StorageObject {
            name: "images.v2/raw".to_string(),
            ..photo(false)
        };
        assert_eq!(no_ext.link_path(), "/links/images.v2/raw");
    }

    #[test]
    fn test_deserializes_storage_event_object() {
        let object: StorageObject = serde_json::from_str(
            r#"{"bucket": "b", "name": "images/x.jpg", "resourceState": "not_exists"}"#,
        )
        .unwrap();
        assert!(!object.exists());
        assert!(!object.wants_post());
    }

    #[test]
    fn test_any_non_empty_flag_requests_a_post() {
        let flagged = |value: &str| StorageObject {
            metadata: Some(HashMap::from([(TWEET_FLAG.to_string(), value.to_string())])),
            ..photo(false)
        };
        assert!(flagged("true").wants_post());
        assert!(flagged("false").wants_post());
        assert!(!flagged("").wants_post());
        assert!(!photo(false).wants_post());
    }

    #[test]
    fn test_outcome_serializes_camel_case_fields() {
        let outcome = UploadOutcome::Recorded {
            short_url: "https://goo.gl/abc".to_string(),
            posted: true,
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({
                "outcome": "recorded",
                "shortUrl": "https://goo.gl/abc",
                "posted": true
            })
        );
        assert_eq!(
            serde_json::to_value(UploadOutcome::Ignored).unwrap(),
            serde_json::json!({ "outcome": "ignored" })
        );
    }

    #[tokio::test]
    async fn test_deleted_object_is_ignored() {
        // No expectations: any call on these mocks fails the test.
        let notifier = UploadNotifier::new(
            Arc::new(MockUrlShortener::new()),
            Arc::new(MockLinkStore::new()),
            Arc::new(MockObjectStore::new()),
            None,
        );
        let deleted = StorageObject {
            resource_state: "not_exists".to_string(),
            ..photo(true)
        };
        assert_eq!(notifier.handle(&deleted).await.unwrap(), UploadOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_records_short_link_without_posting() {
        let mut links = MockLinkStore::new();
        links
            .expect_write_link()
            .withf(|path, short_url| {
                path == "/links/images/1494967521" && short_url == "https://goo.gl/abc"
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let notifier = UploadNotifier::new(
            Arc::new(shortener_returning("https://goo.gl/abc")),
            Arc::new(links),
            Arc::new(MockObjectStore::new()),
            Some(Arc::new(MockSocialPoster::new())),
        );

        let outcome = notifier.handle(&photo(false)).await.unwrap();
        assert_eq!(
            outcome,
            UploadOutcome::Recorded {
                short_url: "https://goo.gl/abc".to_string(),
                posted: false
            }
        );
    }

    #[tokio::test]
    async fn test_flagged_photo_is_posted_with_short_link() {
        let mut links = MockLinkStore::new();
        links.expect_write_link().times(1).returning(|_, _| Ok(()));

        let mut objects = MockObjectStore::new();
        objects
            .expect_download()
            .times(1)
            .returning(|_| Ok(vec![0xFF, 0xD8, 0xFF]));

        let mut social = MockSocialPoster::new();
        social
            .expect_upload_media()
            .withf(|image| image.len() == 3)
            .times(1)
            .returning(|_| Ok("media-42".to_string()));
        social
            .expect_post_status()
            .withf(|status, media_id| {
                status == "Hey! Here's your photo: https://goo.gl/xyz" && media_id == "media-42"
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let notifier = UploadNotifier::new(
            Arc::new(shortener_returning("https://goo.gl/xyz")),
            Arc::new(links),
            Arc::new(objects),
            Some(Arc::new(social)),
        );

        let outcome = notifier.handle(&photo(true)).await.unwrap();
        assert_eq!(
            outcome,
            UploadOutcome::Recorded {
                short_url: "https://goo.gl/xyz".to_string(),
                posted: true
            }
        );
    }

    #[tokio::test]
    async fn test_shortener_failure_abandons_the_rest() {
        let mut shortener = MockUrlShortener::new();
        shortener
            .expect_shorten()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("Status Code: 403")));

        let notifier = UploadNotifier::new(
            Arc::new(shortener),
            Arc::new(MockLinkStore::new()),
            Arc::new(MockObjectStore::new()),
            None,
        );

        let err = notifier.handle(&photo(true)).await.unwrap_err();
        assert!(format!("{err:#}").contains("Status Code: 403"));
    }

    #[tokio::test]
    async fn test_flagged_photo_without_social_account_is_only_recorded() {
        let mut links = MockLinkStore::new();
        links.expect_write_link().times(1).returning(|_, _| Ok(()));

        let notifier = UploadNotifier::new(
            Arc::new(shortener_returning("https://goo.gl/q")),
            Arc::new(links),
            Arc::new(MockObjectStore::new()),
            None,
        );

        let outcome = notifier.handle(&photo(true)).await.unwrap();
        assert!(matches!(outcome, UploadOutcome::Recorded { posted: false, .. }));
    }
}
