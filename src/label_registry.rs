//! Label name to Gmail label id resolution, creating missing labels on demand
use crate::client::GmailClient;
use crate::error::{GmailError, Result};
use crate::models::LabelInfo;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Read-only label name -> id mapping for one run.
///
/// Lookups are case-insensitive because Gmail treats label names that way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMapping {
    ids: HashMap<String, String>, // lowercase name -> id
}

impl LabelMapping {
    fn key(name: &str) -> String {
        name.to_lowercase()
    }

    fn insert(&mut self, name: &str, id: String) {
        self.ids.insert(Self::key(name), id);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.ids.get(&Self::key(name)).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ids.contains_key(&Self::key(name))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Translate label names to ids, failing on the first unknown name
    pub fn resolve<'a, I>(&self, names: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        names
            .into_iter()
            .map(|name| {
                self.get(name).map(str::to_string).ok_or_else(|| {
                    GmailError::LabelError(format!("no label id resolved for '{}'", name))
                })
            })
            .collect()
    }
}

impl FromIterator<LabelInfo> for LabelMapping {
    fn from_iter<T: IntoIterator<Item = LabelInfo>>(iter: T) -> Self {
        let mut mapping = Self::default();
        for label in iter {
            mapping.insert(&label.name, label.id);
        }
        mapping
    }
}

/// Outcome of comparing wanted label names against the account's labels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelPlan {
    /// Names that already exist (will be reused)
    pub existing: Vec<String>,
    /// Names that would be created
    pub missing: Vec<String>,
}

/// Result of [`LabelRegistry::ensure`]
#[derive(Debug, Clone)]
pub struct EnsuredLabels {
    pub mapping: LabelMapping,
    /// Names created during this call
    pub created: Vec<String>,
}

/// Resolves label names against a fresh snapshot of the account's labels
pub struct LabelRegistry {
    client: Arc<dyn GmailClient>,
}

impl LabelRegistry {
    pub fn new(client: Arc<dyn GmailClient>) -> Self {
        Self { client }
    }

    async fn snapshot(&self) -> Result<LabelMapping> {
        let labels = self
            .client
            .list_labels()
            .await
            .map_err(|e| GmailError::LabelError(format!("Failed to list labels: {}", e)))?;

        info!("Loaded {} existing labels", labels.len());
        Ok(labels.into_iter().collect())
    }

    /// Split `names` into labels that exist and labels that would be created
    pub async fn plan(&self, names: &BTreeSet<String>) -> Result<LabelPlan> {
        let snapshot = self.snapshot().await?;
        let (existing, missing): (Vec<String>, Vec<String>) = names
            .iter()
            .cloned()
            .partition(|name| snapshot.contains(name));
        Ok(LabelPlan { existing, missing })
    }

    /// Resolve every name to an id, creating the labels that do not exist yet.
    ///
    /// The existence check runs against labels fetched by this call, so
    /// repeating it never creates a duplicate.
    pub async fn ensure(&self, names: &BTreeSet<String>) -> Result<EnsuredLabels> {
        let mut mapping = self.snapshot().await?;
        let mut created = Vec::new();

        for name in names {
            if let Some(id) = mapping.get(name) {
                debug!("Label '{}' already exists with ID {}", name, id);
                continue;
            }

            info!("Creating label: {}", name);
            let label = self.client.create_label(name).await.map_err(|e| {
                GmailError::LabelError(format!("Failed to create label '{}': {}", name, e))
            })?;

            info!("Created label '{}' with ID: {}", name, label.id);
            mapping.insert(name, label.id);
            created.push(name.clone());
        }

        // only the requested names are needed from here on
        let mapping = names
            .iter()
            .filter_map(|name| {
                mapping.get(name).map(|id| LabelInfo {
                    id: id.to_string(),
                    name: name.clone(),
                })
            })
            .collect();

        Ok(EnsuredLabels { mapping, created })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockGmailClient;
    use mockall::predicate::*;

    fn label(id: &str, name: &str) -> LabelInfo {
        LabelInfo {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_mapping_is_case_insensitive() {
        let mapping: LabelMapping = vec![label("L1", "Work")].into_iter().collect();
        assert_eq!(mapping.get("work"), Some("L1"));
        assert_eq!(mapping.get("WORK"), Some("L1"));
        assert!(!mapping.contains("College"));
    }

    #[test]
    fn test_resolve_reports_unknown_label() {
        let mapping: LabelMapping = vec![label("L1", "Work")].into_iter().collect();
        let ids = mapping.resolve(&names(&["Work"])).unwrap();
        assert_eq!(ids, vec!["L1".to_string()]);

        let err = mapping.resolve(&names(&["Work", "College"])).unwrap_err();
        assert!(err.to_string().contains("'College'"));
    }

    #[tokio::test]
    async fn test_ensure_creates_only_missing() {
        let mut client = MockGmailClient::new();
        client
            .expect_list_labels()
            .times(1)
            .returning(|| Ok(vec![label("INBOX", "INBOX"), label("L1", "work")]));
        client
            .expect_create_label()
            .with(eq("College"))
            .times(1)
            .returning(|name| Ok(label("L2", name)));

        let registry = LabelRegistry::new(Arc::new(client));
        let ensured = registry.ensure(&names(&["Work", "College"])).await.unwrap();

        assert_eq!(ensured.created, vec!["College".to_string()]);
        assert_eq!(ensured.mapping.len(), 2);
        assert_eq!(ensured.mapping.get("Work"), Some("L1"));
        assert_eq!(ensured.mapping.get("College"), Some("L2"));
        assert!(!ensured.mapping.contains("INBOX"));
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let account = Arc::new(std::sync::Mutex::new(Vec::<LabelInfo>::new()));
        let mut client = MockGmailClient::new();

        let listed = Arc::clone(&account);
        client
            .expect_list_labels()
            .times(2)
            .returning(move || Ok(listed.lock().unwrap().clone()));

        let stored = Arc::clone(&account);
        client
            .expect_create_label()
            .times(2)
            .returning(move |name| {
                let created = label(&format!("id-{}", name), name);
                stored.lock().unwrap().push(created.clone());
                Ok(created)
            });

        let registry = LabelRegistry::new(Arc::new(client));
        let wanted = names(&["Work", "College"]);

        let first = registry.ensure(&wanted).await.unwrap();
        let second = registry.ensure(&wanted).await.unwrap();

        assert_eq!(first.created.len(), 2);
        assert!(second.created.is_empty());
        assert_eq!(first.mapping, second.mapping);
        assert_eq!(account.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ensure_fails_when_listing_fails() {
        let mut client = MockGmailClient::new();
        client
            .expect_list_labels()
            .returning(|| Err(GmailError::Forbidden("scope".to_string())));
        client.expect_create_label().never();

        let registry = LabelRegistry::new(Arc::new(client));
        let err = registry.ensure(&names(&["Work"])).await.unwrap_err();
        assert!(matches!(err, GmailError::LabelError(_)));
    }

    #[tokio::test]
    async fn test_ensure_fails_when_creation_fails() {
        let mut client = MockGmailClient::new();
        client.expect_list_labels().returning(|| Ok(vec![]));
        client
            .expect_create_label()
            .returning(|_| Err(GmailError::BadRequest("invalid name".to_string())));

        let registry = LabelRegistry::new(Arc::new(client));
        let err = registry.ensure(&names(&["Work"])).await.unwrap_err();
        assert!(err.to_string().contains("Failed to create label 'Work'"));
    }

    #[tokio::test]
    async fn test_plan_does_not_create() {
        let mut client = MockGmailClient::new();
        client
            .expect_list_labels()
            .returning(|| Ok(vec![label("L1", "Work")]));
        client.expect_create_label().never();

        let registry = LabelRegistry::new(Arc::new(client));
        let plan = registry
            .plan(&names(&["Work", "College", "Conditions"]))
            .await
            .unwrap();

        assert_eq!(plan.existing, vec!["Work".to_string()]);
        assert_eq!(plan.missing, vec!["College".to_string(), "Conditions".to_string()]);
    }
}
