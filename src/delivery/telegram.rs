//! [`DeliverySink`] over the Telegram Bot API.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{ChatId, DeliverySink};
use crate::errors::SendError;
use crate::record::{DeliveryRef, SourceKey};

/// Maximum size of a file uploaded by a bot.
pub const TELEGRAM_UPLOAD_LIMIT: u64 = 50 * 1024 * 1024;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

const SHARE_BUTTON_TEXT: &str = "📤 Share";
const UPLOAD_VIDEO_ACTION: &str = "upload_video";

#[derive(Serialize)]
struct InlineButton<'a> {
    text: &'a str,
    switch_inline_query: &'a str,
}

#[derive(Serialize)]
struct ReplyMarkup<'a> {
    inline_keyboard: [[InlineButton<'a>; 1]; 1],
}

impl<'a> ReplyMarkup<'a> {
    fn share(key: &'a SourceKey) -> Self {
        Self {
            inline_keyboard: [[InlineButton {
                text: SHARE_BUTTON_TEXT,
                switch_inline_query: key.as_str(),
            }]],
        }
    }
}

#[derive(Serialize)]
struct SendVideo<'a> {
    chat_id: i64,
    video: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<&'a str>,
    supports_streaming: bool,
    reply_markup: ReplyMarkup<'a>,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Serialize)]
struct SendChatAction<'a> {
    chat_id: i64,
    action: &'a str,
}

/// Bot API response envelope.
#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Deserialize)]
struct Message {
    video: Option<Video>,
}

#[derive(Deserialize)]
struct Video {
    file_id: String,
    file_unique_id: String,
}

impl From<Video> for DeliveryRef {
    fn from(video: Video) -> Self {
        Self {
            id: video.file_id,
            unique_id: video.file_unique_id,
        }
    }
}

/// Used to create precisely configured [`TelegramSink`].
#[must_use]
#[derive(Clone, Default)]
pub struct TelegramSinkBuilder {
    token: String,
    api_url: Option<String>,
    caption: Option<String>,
    accept_invalid_certs: bool,
    reqwest_client: Option<ReqwestClient>,
}

impl TelegramSinkBuilder {
    /// Create new builder for bot with `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Default::default()
        }
    }

    /// Set Bot API server URL. Defaults to [`DEFAULT_API_URL`].
    pub fn api_url(&mut self, api_url: impl Into<String>) -> &mut Self {
        self.api_url = Some(api_url.into());
        self
    }

    /// Set caption attached to every sent video.
    pub fn caption(&mut self, caption: Option<String>) -> &mut Self {
        self.caption = caption.filter(|c| !c.is_empty());
        self
    }

    /// Skip TLS certificate verification. Ignored if custom client is set.
    pub fn accept_invalid_certs(&mut self, accept: bool) -> &mut Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Set [`reqwest::Client`] to use for API calls.
    pub fn reqwest_client(&mut self, reqwest_client: ReqwestClient) -> &mut Self {
        self.reqwest_client = Some(reqwest_client);
        self
    }

    /// Build sink.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client can't be initialized.
    pub fn build(&self) -> Result<TelegramSink, SendError> {
        let client = match &self.reqwest_client {
            Some(client) => client.clone(),
            None => ReqwestClient::builder()
                .danger_accept_invalid_certs(self.accept_invalid_certs)
                .build()
                .map_err(|err| SendError::Http(err.without_url()))?,
        };
        Ok(TelegramSink {
            client,
            api_url: self
                .api_url
                .as_deref()
                .unwrap_or(DEFAULT_API_URL)
                .trim_end_matches('/')
                .to_string(),
            token: self.token.clone(),
            caption: self.caption.clone(),
        })
    }
}

impl fmt::Debug for TelegramSinkBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramSinkBuilder")
            .field("api_url", &self.api_url)
            .field("caption", &self.caption)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish_non_exhaustive()
    }
}

/// Telegram bot sending videos and messages.
#[derive(Clone)]
pub struct TelegramSink {
    client: ReqwestClient,
    api_url: String,
    token: String,
    caption: Option<String>,
}

impl TelegramSink {
    pub fn builder(token: impl Into<String>) -> TelegramSinkBuilder {
        TelegramSinkBuilder::new(token)
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    async fn post_json<B, T>(&self, method: &str, body: &B) -> Result<T, SendError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        trace!("POST {}", method);
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|err| SendError::Http(err.without_url()))?;
        Self::parse_response(method, response).await
    }

    async fn post_form<T: DeserializeOwned>(&self, method: &str, form: Form) -> Result<T, SendError> {
        trace!("POST {} (multipart)", method);
        let response = self
            .client
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(|err| SendError::Http(err.without_url()))?;
        Self::parse_response(method, response).await
    }

    async fn parse_response<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<T, SendError> {
        let status = response.status();
        let parsed = response.json::<ApiResponse<T>>().await;
        match parsed {
            Ok(ApiResponse {
                ok: true,
                result: Some(result),
                ..
            }) => Ok(result),
            Ok(response) => {
                let code = response.error_code.unwrap_or(i64::from(status.as_u16()));
                let description = response.description.unwrap_or_default();
                debug!(method, code, %description, "Bot API call failed");
                if code == i64::from(StatusCode::TOO_MANY_REQUESTS.as_u16()) {
                    Err(SendError::RateLimited {
                        retry_after: response
                            .parameters
                            .and_then(|p| p.retry_after)
                            .map(Duration::from_secs),
                    })
                } else {
                    Err(SendError::Api { code, description })
                }
            }
            Err(_) if status == StatusCode::TOO_MANY_REQUESTS => {
                Err(SendError::RateLimited { retry_after: None })
            }
            Err(err) => Err(SendError::Http(err.without_url())),
        }
    }
}

impl fmt::Debug for TelegramSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramSink")
            .field("api_url", &self.api_url)
            .field("caption", &self.caption)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DeliverySink for TelegramSink {
    async fn send_by_reference(
        &self,
        chat: ChatId,
        reference: &DeliveryRef,
        share_key: &SourceKey,
    ) -> Result<(), SendError> {
        let body = SendVideo {
            chat_id: chat.0,
            video: &reference.id,
            caption: self.caption.as_deref(),
            supports_streaming: true,
            reply_markup: ReplyMarkup::share(share_key),
        };
        self.post_json::<_, IgnoredAny>("sendVideo", &body).await?;
        Ok(())
    }

    async fn send_by_bytes(
        &self,
        chat: ChatId,
        filename: &str,
        content: &[u8],
        share_key: &SourceKey,
    ) -> Result<Option<DeliveryRef>, SendError> {
        let markup = serde_json::to_string(&ReplyMarkup::share(share_key))?;
        let video = Part::bytes(content.to_vec())
            .file_name(filename.to_string())
            .mime_str("video/mp4")
            .map_err(|err| SendError::Http(err.without_url()))?;
        let mut form = Form::new()
            .text("chat_id", chat.to_string())
            .text("supports_streaming", "true")
            .text("reply_markup", markup)
            .part("video", video);
        if let Some(caption) = &self.caption {
            form = form.text("caption", caption.clone());
        }
        let message: Message = self.post_form("sendVideo", form).await?;
        Ok(message.video.map(Into::into))
    }

    async fn send_text(&self, chat: ChatId, text: &str) -> Result<(), SendError> {
        let body = SendMessage {
            chat_id: chat.0,
            text,
        };
        self.post_json::<_, IgnoredAny>("sendMessage", &body).await?;
        Ok(())
    }

    async fn send_upload_action(&self, chat: ChatId) -> Result<(), SendError> {
        let body = SendChatAction {
            chat_id: chat.0,
            action: UPLOAD_VIDEO_ACTION,
        };
        self.post_json::<_, IgnoredAny>("sendChatAction", &body).await?;
        Ok(())
    }
}
