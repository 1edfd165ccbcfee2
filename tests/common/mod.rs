//! Common test utilities and fixtures

#![allow(dead_code)]

use gmail_organizer::client::{GmailClient, ListRequest};
use gmail_organizer::error::Result;
use gmail_organizer::models::{Header, LabelInfo, Message, MessagePage};
use mockall::mock;
use std::sync::{Arc, Mutex};

/// Message with a `From` header and a subject
pub fn message_from(id: &str, from: &str) -> Message {
    Message::with_headers(
        id,
        vec![
            Header::new("From", from),
            Header::new("Subject", format!("Message {}", id)),
        ],
    )
}

pub fn label(id: &str, name: &str) -> LabelInfo {
    LabelInfo {
        id: id.to_string(),
        name: name.to_string(),
    }
}

mock! {
    pub GmailClient {}

    #[async_trait::async_trait]
    impl GmailClient for GmailClient {
        async fn list_message_ids(&self, request: &ListRequest) -> Result<MessagePage>;
        async fn get_message(&self, id: &str) -> Result<Message>;
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn create_label(&self, name: &str) -> Result<LabelInfo>;
        async fn modify_message(&self, id: &str, add_label_ids: &[String]) -> Result<()>;
        async fn account_email(&self) -> Result<String>;
    }
}

/// Record of the calls that change the account
#[derive(Debug, Default, Clone)]
pub struct Mailbox {
    pub labels: Arc<Mutex<Vec<LabelInfo>>>,
    pub modified: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl Mailbox {
    pub fn with_labels(labels: Vec<LabelInfo>) -> Self {
        Self {
            labels: Arc::new(Mutex::new(labels)),
            ..Default::default()
        }
    }

    pub fn modified(&self) -> Vec<(String, Vec<String>)> {
        self.modified.lock().unwrap().clone()
    }

    pub fn label_names(&self) -> Vec<String> {
        self.labels.lock().unwrap().iter().map(|l| l.name.clone()).collect()
    }
}

/// Mock serving `messages` as one listing page and tracking label and modify calls in `mailbox`
pub fn mock_account(messages: Vec<Message>, mailbox: &Mailbox) -> MockGmailClient {
    let mut client = MockGmailClient::new();

    let ids: Vec<String> = messages.iter().map(|m| m.id.clone()).collect();
    client.expect_list_message_ids().returning(move |request| {
        Ok(MessagePage {
            ids: ids.iter().take(request.page_size as usize).cloned().collect(),
            next_page_token: None,
        })
    });

    client.expect_get_message().returning(move |id| {
        messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| gmail_organizer::GmailError::NotFound(id.to_string()))
    });

    let labels = Arc::clone(&mailbox.labels);
    client
        .expect_list_labels()
        .returning(move || Ok(labels.lock().unwrap().clone()));

    let labels = Arc::clone(&mailbox.labels);
    client.expect_create_label().returning(move |name| {
        let mut labels = labels.lock().unwrap();
        let created = label(&format!("Label_{}", labels.len() + 1), name);
        labels.push(created.clone());
        Ok(created)
    });

    let modified = Arc::clone(&mailbox.modified);
    client.expect_modify_message().returning(move |id, ids| {
        modified.lock().unwrap().push((id.to_string(), ids.to_vec()));
        Ok(())
    });

    client
        .expect_account_email()
        .returning(|| Ok("me@example.com".to_string()));

    client
}
