use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use shared::{
    domain::{DiscussionId, Identity, MessageId},
    error::ApiError,
    protocol::{
        Ack, DiscussionDescriptor, DiscussionSummary, MarkSeenRequest, Message,
        SendMessageRequest, StartDiscussionRequest, UpdateMessageRequest,
    },
};
use url::Url;

use crate::error::TransportError;

/// Backend operations the engine depends on. Every method either yields data or
/// fails; an unacknowledged request is reported as a failure.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn list_discussions(
        &self,
        identity: &Identity,
    ) -> Result<Vec<DiscussionSummary>, TransportError>;
    async fn list_messages(&self, discussion_id: &DiscussionId)
        -> Result<Vec<Message>, TransportError>;
    async fn start_discussion(
        &self,
        identity_a: &Identity,
        identity_b: &Identity,
    ) -> Result<DiscussionDescriptor, TransportError>;
    async fn send_message(
        &self,
        discussion_id: &DiscussionId,
        sender: &Identity,
        content: &str,
    ) -> Result<(), TransportError>;
    async fn update_message(
        &self,
        message_id: &MessageId,
        content: &str,
    ) -> Result<(), TransportError>;
    async fn delete_message(&self, message_id: &MessageId) -> Result<(), TransportError>;
    async fn mark_seen(
        &self,
        discussion_id: &DiscussionId,
        identity: &Identity,
    ) -> Result<(), TransportError>;
}

pub struct HttpTransport {
    http: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(server_url: &str) -> Result<Self, TransportError> {
        Self::with_client(Client::new(), server_url)
    }

    pub fn with_client(http: Client, server_url: &str) -> Result<Self, TransportError> {
        let mut base_url = Url::parse(server_url)?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(format!(
                "{server_url} cannot be used as a base url"
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, TransportError> {
        let response = check_status(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn expect_ack(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<(), TransportError> {
        let response = check_status(request.send().await?).await?;
        let body = response.text().await?;
        if Ack::from_body(&body).success {
            Ok(())
        } else {
            Err(TransportError::Rejected { operation })
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api) => Err(TransportError::Api {
            status: status.as_u16(),
            code: api.code,
            message: api.message,
        }),
        Err(_) => Err(TransportError::Status {
            status: status.as_u16(),
        }),
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn list_discussions(
        &self,
        identity: &Identity,
    ) -> Result<Vec<DiscussionSummary>, TransportError> {
        let url = self.endpoint(&["discussions"])?;
        self.fetch_json(
            self.http
                .get(url)
                .query(&[("identity", identity.as_str())]),
        )
        .await
    }

    async fn list_messages(
        &self,
        discussion_id: &DiscussionId,
    ) -> Result<Vec<Message>, TransportError> {
        let url = self.endpoint(&["discussions", discussion_id.as_str(), "messages"])?;
        self.fetch_json(self.http.get(url)).await
    }

    async fn start_discussion(
        &self,
        identity_a: &Identity,
        identity_b: &Identity,
    ) -> Result<DiscussionDescriptor, TransportError> {
        let url = self.endpoint(&["discussions"])?;
        self.fetch_json(self.http.post(url).json(&StartDiscussionRequest {
            identity_a: identity_a.clone(),
            identity_b: identity_b.clone(),
        }))
        .await
    }

    async fn send_message(
        &self,
        discussion_id: &DiscussionId,
        sender: &Identity,
        content: &str,
    ) -> Result<(), TransportError> {
        let url = self.endpoint(&["discussions", discussion_id.as_str(), "messages"])?;
        self.expect_ack(
            "send message",
            self.http.post(url).json(&SendMessageRequest {
                sender_identity: sender.clone(),
                content: content.to_string(),
            }),
        )
        .await
    }

    async fn update_message(
        &self,
        message_id: &MessageId,
        content: &str,
    ) -> Result<(), TransportError> {
        let url = self.endpoint(&["messages", message_id.as_str()])?;
        self.expect_ack(
            "update message",
            self.http.put(url).json(&UpdateMessageRequest {
                content: content.to_string(),
            }),
        )
        .await
    }

    async fn delete_message(&self, message_id: &MessageId) -> Result<(), TransportError> {
        let url = self.endpoint(&["messages", message_id.as_str()])?;
        self.expect_ack("delete message", self.http.delete(url)).await
    }

    async fn mark_seen(
        &self,
        discussion_id: &DiscussionId,
        identity: &Identity,
    ) -> Result<(), TransportError> {
        let url = self.endpoint(&["discussions", discussion_id.as_str(), "seen"])?;
        self.expect_ack(
            "mark seen",
            self.http.post(url).json(&MarkSeenRequest {
                identity: identity.clone(),
            }),
        )
        .await
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
