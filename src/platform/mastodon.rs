use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::MastodonConfig;
use crate::platform::sse::SseDecoder;
use crate::platform::{
    MediaAttachment, Mention, PublishedStatus, StatusPost, StatusPublisher, Visibility,
};

const NOTIFICATION_TYPE_MENTION: &str = "mention";

#[derive(Debug, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub notification_type: String,
    pub account: Account,
    #[serde(default)]
    pub status: Option<Status>,
}

#[derive(Debug, Deserialize)]
pub struct Account {
    pub acct: String,
}

#[derive(Debug, Deserialize)]
pub struct Status {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub visibility: Visibility,
}

impl Notification {
    /// Reduces a mention notification to a [`Mention`]; anything else is `None`.
    pub fn into_mention(self) -> Option<Mention> {
        if self.notification_type != NOTIFICATION_TYPE_MENTION {
            return None;
        }
        let status = self.status?;
        Some(Mention {
            status_id: status.id,
            content: status.content,
            username: self.account.acct.trim_start_matches('@').to_string(),
            visibility: status.visibility,
        })
    }
}

#[derive(Debug, Deserialize)]
struct UploadedMedia {
    id: String,
}

pub struct MastodonClient {
    client: reqwest::Client,
    config: MastodonConfig,
    dry_run: bool,
}

impl MastodonClient {
    pub fn new(config: MastodonConfig, dry_run: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            dry_run,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    /// Opens the user notification stream and yields decoded notifications.
    ///
    /// The stream ends when the connection drops; errors are yielded as items.
    pub async fn stream_notifications(
        &self,
    ) -> Result<impl Stream<Item = Result<Notification>>> {
        let url = self.url("/api/v1/streaming/user/notification");
        info!("Connecting to notification stream: {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.access_token)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .context("Failed to connect to the streaming API")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Streaming API error ({}): {}", status, error_body);
        }

        let mut decoder = SseDecoder::new();
        let notifications = response
            .bytes_stream()
            .map(move |chunk| -> Vec<Result<Notification>> {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => return vec![Err(anyhow::Error::new(e).context("Stream read failed"))],
                };
                decoder
                    .push(&chunk)
                    .into_iter()
                    .filter(|event| event.event == "notification")
                    .map(|event| {
                        serde_json::from_str::<Notification>(&event.data)
                            .context("Failed to decode notification")
                    })
                    .collect()
            })
            .flat_map(stream::iter);

        Ok(notifications)
    }

    async fn post_for_status(&self, request: reqwest::RequestBuilder) -> Result<PublishedStatus> {
        let response = request
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .context("Failed to send request to Mastodon")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Mastodon API error ({}): {}", status, error_body);
        }

        response
            .json()
            .await
            .context("Failed to parse Mastodon response")
    }
}

#[async_trait]
impl StatusPublisher for MastodonClient {
    async fn publish_status(&self, post: &StatusPost) -> Result<Option<PublishedStatus>> {
        if self.dry_run {
            info!("[dry-run] Would publish: {}", post.status);
            return Ok(None);
        }

        let url = self.url("/api/v1/statuses");
        debug!("Publishing status to {}", url);
        let published = self.post_for_status(self.client.post(&url).json(post)).await?;
        debug!("Published status {}", published.id);
        Ok(Some(published))
    }

    async fn reblog(&self, status_id: &str) -> Result<Option<PublishedStatus>> {
        if self.dry_run {
            info!("[dry-run] Would reblog status {}", status_id);
            return Ok(None);
        }

        let url = self.url(&format!("/api/v1/statuses/{}/reblog", status_id));
        self.post_for_status(self.client.post(&url)).await.map(Some)
    }

    async fn upload_media(&self, media: &MediaAttachment) -> Result<Option<String>> {
        if self.dry_run {
            info!("[dry-run] Would upload media {}", media.url);
            return Ok(None);
        }

        let download = self
            .client
            .get(&media.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("Failed to download media {}", media.url))?;
        let mime = download
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = download
            .bytes()
            .await
            .with_context(|| format!("Failed to read media {}", media.url))?;

        let file_name = media
            .url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("media")
            .to_string();
        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(file_name)
            .mime_str(&mime)
            .context("Invalid media content type")?;
        let mut form = reqwest::multipart::Form::new().part("file", part);
        if let Some(alt) = &media.alt_text {
            form = form.text("description", alt.clone());
        }

        let response = self
            .client
            .post(self.url("/api/v2/media"))
            .bearer_auth(&self.config.access_token)
            .multipart(form)
            .send()
            .await
            .context("Failed to upload media")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Media upload error ({}): {}", status, error_body);
        }

        let uploaded: UploadedMedia = response
            .json()
            .await
            .context("Failed to parse media upload response")?;
        Ok(Some(uploaded.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, dry_run: bool) -> MastodonClient {
        MastodonClient::new(
            MastodonConfig {
                api_base_url: format!("{}/", server.uri()),
                access_token: "secret".to_string(),
                visibility: Visibility::Public,
            },
            dry_run,
        )
    }

    #[test]
    fn test_mention_from_notification() {
        let json = r#"{
            "id": "99",
            "type": "mention",
            "account": {"acct": "xavi@social.example"},
            "status": {"id": "123", "content": "<p>hi</p>", "visibility": "unlisted"}
        }"#;
        let notification: Notification = serde_json::from_str(json).unwrap();
        let mention = notification.into_mention().unwrap();
        assert_eq!(mention.status_id, "123");
        assert_eq!(mention.username, "xavi@social.example");
        assert_eq!(mention.visibility, Visibility::Unlisted);
        assert_eq!(mention.content, "<p>hi</p>");
    }

    #[test]
    fn test_non_mention_ignored() {
        let json = r#"{"type": "follow", "account": {"acct": "pepe"}}"#;
        let notification: Notification = serde_json::from_str(json).unwrap();
        assert!(notification.into_mention().is_none());
    }

    #[tokio::test]
    async fn test_publish_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/statuses"))
            .and(header("Authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "status": "@xavi Added",
                "in_reply_to_id": "123",
                "visibility": "direct"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "456"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, false);
        let mut post = StatusPost::text("@xavi Added", Visibility::Direct);
        post.in_reply_to_id = Some("123".to_string());

        let published = client.publish_status(&post).await.unwrap();
        assert_eq!(published, Some(PublishedStatus { id: "456".to_string() }));
    }

    #[tokio::test]
    async fn test_publish_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/statuses"))
            .respond_with(ResponseTemplate::new(422).set_body_string("Validation failed"))
            .mount(&server)
            .await;

        let client = client_for(&server, false);
        let err = client
            .publish_status(&StatusPost::text("x", Visibility::Public))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("422"));
    }

    #[tokio::test]
    async fn test_reblog() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/statuses/77/reblog"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "78"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, false);
        let reblogged = client.reblog("77").await.unwrap().unwrap();
        assert_eq!(reblogged.id, "78");
    }

    #[tokio::test]
    async fn test_upload_media() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img/one.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "image/png")
                    .set_body_bytes(vec![0x89, 0x50, 0x4e, 0x47]),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v2/media"))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({"id": "m1"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, false);
        let media = MediaAttachment {
            url: format!("{}/img/one.png", server.uri()),
            alt_text: Some("a picture".to_string()),
        };
        assert_eq!(client.upload_media(&media).await.unwrap(), Some("m1".to_string()));
    }

    #[tokio::test]
    async fn test_dry_run_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server, true);
        assert!(client
            .publish_status(&StatusPost::text("x", Visibility::Public))
            .await
            .unwrap()
            .is_none());
        assert!(client.reblog("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stream_notifications() {
        let server = MockServer::start().await;
        let body = concat!(
            ":thump\n\n",
            "event: notification\n",
            "data: {\"type\":\"mention\",\"account\":{\"acct\":\"xavi\"},",
            "\"status\":{\"id\":\"5\",\"content\":\"<p>@feeder hello</p>\",\"visibility\":\"public\"}}\n\n",
        );
        Mock::given(method("GET"))
            .and(path("/api/v1/streaming/user/notification"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, false);
        let stream = client.stream_notifications().await.unwrap();
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 1);
        let mention = items
            .into_iter()
            .next()
            .unwrap()
            .unwrap()
            .into_mention()
            .unwrap();
        assert_eq!(mention.status_id, "5");
        assert_eq!(mention.username, "xavi");
    }
}
