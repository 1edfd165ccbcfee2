//! Lazy message source: paginated id listing followed by per-id header fetches

use async_stream::stream;
use futures::stream::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::{GmailClient, ListRequest, MAX_PAGE_SIZE};
use crate::error::GmailError;
use crate::models::Message;

/// Item produced by [`MessageSource::fetch`]
#[derive(Debug)]
pub enum SourceEvent {
    /// A fetched message summary
    Message(Message),
    /// The id listing failed; only ids obtained before the failure follow
    ListingFailed(GmailError),
}

pub type SourceStream<'a> = Pin<Box<dyn Stream<Item = SourceEvent> + Send + 'a>>;

/// Produces the most recent messages of the account, one at a time
pub struct MessageSource {
    client: Arc<dyn GmailClient>,
    query: Option<String>,
}

impl MessageSource {
    pub fn new(client: Arc<dyn GmailClient>) -> Self {
        Self {
            client,
            query: None,
        }
    }

    /// Narrow the listing with a Gmail search query
    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query.filter(|q| !q.trim().is_empty());
        self
    }

    /// Collect up to `limit` ids, following page tokens.
    ///
    /// On failure the ids gathered so far are returned alongside the error.
    async fn list_ids(&self, limit: usize) -> (Vec<String>, Option<GmailError>) {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        while ids.len() < limit {
            let remaining = limit - ids.len();
            let request = ListRequest {
                query: self.query.clone(),
                page_size: remaining.min(MAX_PAGE_SIZE as usize) as u32,
                page_token: page_token.take(),
            };

            let page = match self.client.list_message_ids(&request).await {
                Ok(page) => page,
                Err(e) => return (ids, Some(e)),
            };

            debug!("Listed page with {} message ids", page.ids.len());
            let exhausted = page.ids.is_empty();
            ids.extend(page.ids.into_iter().take(remaining));

            match page.next_page_token {
                Some(token) if !exhausted => page_token = Some(token),
                _ => break,
            }
        }

        (ids, None)
    }

    /// Stream up to `limit` messages.
    ///
    /// Each call queries Gmail afresh. Messages whose fetch fails are logged
    /// and skipped without ending the stream.
    pub fn fetch(&self, limit: usize) -> SourceStream<'_> {
        Box::pin(stream! {
            let (ids, listing_error) = if limit == 0 {
                (Vec::new(), None)
            } else {
                self.list_ids(limit).await
            };

            if let Some(e) = listing_error {
                warn!("Listing messages failed after {} ids: {}", ids.len(), e);
                yield SourceEvent::ListingFailed(e);
            }

            info!("Fetching headers for {} messages", ids.len());

            for id in ids {
                match self.client.get_message(&id).await {
                    Ok(message) => yield SourceEvent::Message(message),
                    Err(e) => warn!("Failed to fetch message {}: {}", id, e),
                }
            }
        })
    }
}
