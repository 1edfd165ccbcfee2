//! Gmail API client: the narrow provider surface the organizer depends on

use async_trait::async_trait;
use google_gmail1::api::{Label, ModifyMessageRequest};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::{GmailHub, LABELS_SCOPE, MODIFY_SCOPE};
use crate::error::{GmailError, Result};
use crate::models::{Header, LabelInfo, Message, MessagePage, MessagePayload};

/// Gmail's special user id for the authenticated account
const USER_ID: &str = "me";

/// Gmail caps `maxResults` on message listings at 500
pub const MAX_PAGE_SIZE: u32 = 500;

/// Partial response selector for per-message fetches.
///
/// `mimeType` keeps the payload object in the response even when the message
/// has none of the requested headers and Gmail omits `headers`.
const MESSAGE_FIELDS: &str = "id,payload/mimeType,payload/headers";

/// Per-call deadline for listing requests
const LIST_TIMEOUT: Duration = Duration::from_secs(30);

/// Parameters of one message listing request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub query: Option<String>,
    pub page_size: u32,
    pub page_token: Option<String>,
}

/// Trait defining the Gmail operations used by the organizer, for easier testing
#[async_trait]
pub trait GmailClient: Send + Sync {
    /// List one page of message ids
    async fn list_message_ids(&self, request: &ListRequest) -> Result<MessagePage>;

    /// Fetch the headers of a single message
    async fn get_message(&self, id: &str) -> Result<Message>;

    /// List all labels in the account
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a new label
    async fn create_label(&self, name: &str) -> Result<LabelInfo>;

    /// Add labels to a message in a single modify call
    async fn modify_message(&self, id: &str, add_label_ids: &[String]) -> Result<()>;

    /// Email address of the authenticated account
    async fn account_email(&self) -> Result<String>;
}

#[cfg(test)]
mockall::mock! {
    pub GmailClient {}

    #[async_trait]
    impl GmailClient for GmailClient {
        async fn list_message_ids(&self, request: &ListRequest) -> Result<MessagePage>;
        async fn get_message(&self, id: &str) -> Result<Message>;
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn create_label(&self, name: &str) -> Result<LabelInfo>;
        async fn modify_message(&self, id: &str, add_label_ids: &[String]) -> Result<()>;
        async fn account_email(&self) -> Result<String>;
    }
}

/// Production Gmail client over a `google-gmail1` hub.
///
/// Read-only calls and label creation are retried with exponential backoff
/// on transient errors. Message modification is never retried.
pub struct ProductionGmailClient {
    hub: GmailHub,
    max_retries: u32,
}

impl ProductionGmailClient {
    pub fn new(hub: GmailHub) -> Self {
        Self {
            hub,
            max_retries: 3,
        }
    }

    /// Check if an error is retryable
    fn should_retry(error: &GmailError) -> bool {
        error.is_transient()
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(
        operation_name: &str,
        max_retries: u32,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = Duration::from_secs(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if Self::should_retry(&e) && attempts <= max_retries => {
                    let wait = e
                        .retry_after()
                        .map_or(delay, |requested| requested.max(delay))
                        .min(Duration::from_secs(30));
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name,
                        attempts,
                        max_retries + 1,
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(30));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run a listing call with a deadline so a stalled connection cannot hang the run
    async fn with_timeout<T, Fut>(operation_name: &str, call: Fut) -> Result<T>
    where
        Fut: Future<Output = std::result::Result<T, google_gmail1::Error>>,
    {
        match tokio::time::timeout(LIST_TIMEOUT, call).await {
            Ok(result) => result.map_err(GmailError::from),
            Err(_) => {
                warn!("Gmail API {} call timed out after {:?}", operation_name, LIST_TIMEOUT);
                Err(GmailError::NetworkError(format!(
                    "{} timed out after {:?}",
                    operation_name, LIST_TIMEOUT
                )))
            }
        }
    }
}

/// Convert a Gmail API message into our header-only [`Message`]
fn parse_message(msg: google_gmail1::api::Message) -> Result<Message> {
    let id = msg
        .id
        .ok_or_else(|| GmailError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let payload = msg.payload.map(|part| MessagePayload {
        headers: part
            .headers
            .unwrap_or_default()
            .into_iter()
            .filter_map(|h| match (h.name, h.value) {
                (Some(name), Some(value)) => Some(Header { name, value }),
                _ => None,
            })
            .collect(),
    });

    Ok(Message { id, payload })
}

#[async_trait]
impl GmailClient for ProductionGmailClient {
    async fn list_message_ids(&self, request: &ListRequest) -> Result<MessagePage> {
        Self::with_retry("list_message_ids", self.max_retries, || async {
            let mut call = self
                .hub
                .users()
                .messages_list(USER_ID)
                .max_results(request.page_size.clamp(1, MAX_PAGE_SIZE));

            if let Some(query) = request.query.as_deref() {
                call = call.q(query);
            }
            if let Some(token) = request.page_token.as_deref() {
                call = call.page_token(token);
            }

            let (_, response) =
                Self::with_timeout("list_message_ids", call.add_scope(MODIFY_SCOPE).doit()).await?;

            let ids: Vec<String> = response
                .messages
                .unwrap_or_default()
                .into_iter()
                .filter_map(|m| m.id)
                .collect();

            debug!("Listed {} message ids", ids.len());
            Ok(MessagePage {
                ids,
                next_page_token: response.next_page_token,
            })
        })
        .await
    }

    async fn get_message(&self, id: &str) -> Result<Message> {
        Self::with_retry("get_message", self.max_retries, || async {
            let (_, msg) = self
                .hub
                .users()
                .messages_get(USER_ID, id)
                .format("metadata")
                .add_metadata_headers("From")
                .param("fields", MESSAGE_FIELDS)
                .add_scope(MODIFY_SCOPE)
                .doit()
                .await?;

            parse_message(msg)
        })
        .await
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Self::with_retry("list_labels", self.max_retries, || async {
            let call = self.hub.users().labels_list(USER_ID).add_scope(LABELS_SCOPE).doit();
            let (_, response) = Self::with_timeout("list_labels", call).await?;

            let labels: Vec<LabelInfo> = response
                .labels
                .unwrap_or_default()
                .into_iter()
                .filter_map(|label| match (label.id, label.name) {
                    (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                    _ => None,
                })
                .collect();

            debug!("Successfully parsed {} labels", labels.len());
            Ok(labels)
        })
        .await
    }

    async fn create_label(&self, name: &str) -> Result<LabelInfo> {
        Self::with_retry("create_label", self.max_retries, || async {
            let label = Label {
                name: Some(name.to_string()),
                message_list_visibility: Some("show".to_string()),
                label_list_visibility: Some("labelShow".to_string()),
                ..Default::default()
            };

            let (_, created) = self
                .hub
                .users()
                .labels_create(label, USER_ID)
                .add_scope(LABELS_SCOPE)
                .doit()
                .await?;

            let id = created
                .id
                .ok_or_else(|| GmailError::LabelError("Created label has no ID".to_string()))?;
            Ok(LabelInfo {
                id,
                name: created.name.unwrap_or_else(|| name.to_string()),
            })
        })
        .await
    }

    async fn modify_message(&self, id: &str, add_label_ids: &[String]) -> Result<()> {
        let request = ModifyMessageRequest {
            add_label_ids: Some(add_label_ids.to_vec()),
            remove_label_ids: None,
        };

        self.hub
            .users()
            .messages_modify(request, USER_ID, id)
            .add_scope(MODIFY_SCOPE)
            .doit()
            .await?;

        Ok(())
    }

    async fn account_email(&self) -> Result<String> {
        let (_, profile) = self
            .hub
            .users()
            .get_profile(USER_ID)
            .add_scope(MODIFY_SCOPE)
            .doit()
            .await?;

        Ok(profile.email_address.unwrap_or_default())
    }
}
