//! Notion API client.
//!
//! Notion has no per-email user lookup, so the directory side lists the whole
//! workspace (paginated) and matches emails locally. Page creation targets a
//! database via the special `title` property key, which works regardless of
//! what the database calls its title column.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::directory::{DirectoryUser, UserDirectory, UserMapping};
use crate::error::PipelineError;
use crate::util::{http_client, name_from_email};

const NOTION_API_BASE: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

#[derive(Debug, thiserror::Error)]
pub enum NotionError {
    #[error("Notion API request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Notion API error {status}: {message}")]
    Api { status: u16, message: String },
}

impl NotionError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            NotionError::Http(e) => e.is_timeout() || e.is_connect(),
            NotionError::Api { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

async fn error_for_response(resp: reqwest::Response) -> NotionError {
    let status = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    NotionError::Api { status, message }
}

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct UsersResponse {
    #[serde(default)]
    results: Vec<NotionUserRaw>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotionUserRaw {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    person: Option<PersonRaw>,
}

#[derive(Debug, Deserialize)]
struct PersonRaw {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatePageResponse {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

/// A human workspace member with a known email.
#[derive(Debug, Clone)]
pub struct NotionPerson {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
}

fn normalize_user(raw: NotionUserRaw) -> Option<NotionPerson> {
    if raw.kind.as_deref() != Some("person") {
        return None;
    }
    let email = raw.person?.email?;
    Some(NotionPerson {
        id: raw.id,
        name: raw.name,
        email,
    })
}

// ============================================================================
// Recap page content
// ============================================================================

/// One action item rendered for the page.
#[derive(Debug, Clone)]
pub struct RecapTask {
    pub text: String,
    pub owner: Option<String>,
}

/// Content for a recap page, already rendered to plain strings.
#[derive(Debug, Clone, Default)]
pub struct RecapPage {
    pub title: String,
    pub summary: String,
    pub key_points: Vec<String>,
    pub decisions: Vec<String>,
    pub action_items: Vec<RecapTask>,
}

fn heading_block(text: &str) -> serde_json::Value {
    serde_json::json!({
        "object": "block",
        "type": "heading_2",
        "heading_2": { "rich_text": [{ "type": "text", "text": { "content": text } }] }
    })
}

fn bullet_block(text: &str) -> serde_json::Value {
    serde_json::json!({
        "object": "block",
        "type": "bulleted_list_item",
        "bulleted_list_item": { "rich_text": [{ "type": "text", "text": { "content": text } }] }
    })
}

fn page_children(page: &RecapPage) -> Vec<serde_json::Value> {
    let mut children = Vec::new();

    if !page.summary.is_empty() {
        children.push(heading_block("Summary"));
        children.push(serde_json::json!({
            "object": "block",
            "type": "paragraph",
            "paragraph": { "rich_text": [{ "type": "text", "text": { "content": page.summary } }] }
        }));
    }

    if !page.key_points.is_empty() {
        children.push(heading_block("Key Points"));
        children.extend(page.key_points.iter().map(|p| bullet_block(p)));
    }

    if !page.decisions.is_empty() {
        children.push(heading_block("Decisions"));
        children.extend(page.decisions.iter().map(|d| bullet_block(d)));
    }

    if !page.action_items.is_empty() {
        children.push(heading_block("Action Items"));
        for task in &page.action_items {
            let text = match &task.owner {
                Some(owner) => format!("{} ({})", task.text, owner),
                None => task.text.clone(),
            };
            children.push(serde_json::json!({
                "object": "block",
                "type": "to_do",
                "to_do": {
                    "rich_text": [{ "type": "text", "text": { "content": text } }],
                    "checked": false
                }
            }));
        }
    }

    children
}

// ============================================================================
// Client
// ============================================================================

#[derive(Clone)]
pub struct NotionClient {
    http: reqwest::Client,
    api_token: String,
}

impl NotionClient {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            http: http_client(),
            api_token: api_token.into(),
        }
    }

    /// List every human member of the workspace, following pagination.
    pub async fn list_people(&self) -> Result<Vec<NotionPerson>, NotionError> {
        let mut people = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(format!("{}/users", NOTION_API_BASE))
                .bearer_auth(&self.api_token)
                .header("Notion-Version", NOTION_VERSION)
                .query(&[("page_size", "100")]);

            if let Some(ref c) = cursor {
                request = request.query(&[("start_cursor", c.as_str())]);
            }

            let resp = request.send().await?;
            if !resp.status().is_success() {
                return Err(error_for_response(resp).await);
            }

            let body: UsersResponse = resp.json().await?;
            people.extend(body.results.into_iter().filter_map(normalize_user));

            if !body.has_more {
                break;
            }
            cursor = body.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        Ok(people)
    }

    /// Create a recap page in a database. Returns the page URL.
    pub async fn create_recap_page(
        &self,
        database_id: &str,
        page: &RecapPage,
    ) -> Result<String, NotionError> {
        let body = serde_json::json!({
            "parent": { "database_id": database_id },
            "properties": {
                "title": {
                    "title": [{ "type": "text", "text": { "content": page.title } }]
                }
            },
            "children": page_children(page),
        });

        let resp = self
            .http
            .post(format!("{}/pages", NOTION_API_BASE))
            .bearer_auth(&self.api_token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(error_for_response(resp).await);
        }

        let created: CreatePageResponse = resp.json().await?;
        Ok(created
            .url
            .unwrap_or_else(|| format!("https://www.notion.so/{}", created.id.replace('-', ""))))
    }
}

#[async_trait]
impl UserDirectory for NotionClient {
    async fn batch_lookup(&self, emails: &[String]) -> Result<UserMapping, PipelineError> {
        // One workspace listing serves the whole batch.
        let people = self.list_people().await?;
        let by_email: HashMap<String, &NotionPerson> = people
            .iter()
            .map(|p| (p.email.to_ascii_lowercase(), p))
            .collect();

        let mut mapping = UserMapping::new();
        for email in emails {
            match by_email.get(&email.to_ascii_lowercase()) {
                Some(person) => {
                    mapping.insert(
                        email.clone(),
                        DirectoryUser {
                            id: person.id.clone(),
                            display_name: person
                                .name
                                .clone()
                                .filter(|n| !n.trim().is_empty())
                                .unwrap_or_else(|| name_from_email(email)),
                        },
                    );
                }
                None => log::debug!("Notion: no workspace member for {}", email),
            }
        }
        Ok(mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_users_response_filters_bots_and_emailless() {
        let json = r#"{
            "results": [
                {
                    "id": "d40e767c-d7af-4b18-a86d-55c61f1e39a4",
                    "name": "Avocado Lovelace",
                    "type": "person",
                    "person": { "email": "avo@example.org" }
                },
                {
                    "id": "9a3b5ae0-c6e6-482d-b0e1-ed315ee6dc57",
                    "name": "Doug Engelbot",
                    "type": "bot",
                    "bot": {}
                },
                {
                    "id": "6c8b0f29-guest",
                    "name": "Guest",
                    "type": "person",
                    "person": {}
                }
            ],
            "has_more": false,
            "next_cursor": null
        }"#;

        let resp: UsersResponse = serde_json::from_str(json).unwrap();
        let people: Vec<_> = resp.results.into_iter().filter_map(normalize_user).collect();

        assert_eq!(people.len(), 1);
        assert_eq!(people[0].email, "avo@example.org");
        assert_eq!(people[0].name.as_deref(), Some("Avocado Lovelace"));
    }

    #[test]
    fn test_users_response_pagination_fields() {
        let json = r#"{"results": [], "has_more": true, "next_cursor": "abc-123"}"#;

        let resp: UsersResponse = serde_json::from_str(json).unwrap();
        assert!(resp.has_more);
        assert_eq!(resp.next_cursor.as_deref(), Some("abc-123"));
    }

    #[test]
    fn test_page_children_layout() {
        let page = RecapPage {
            title: "Weekly Sync".to_string(),
            summary: "We synced.".to_string(),
            key_points: vec!["Point".to_string()],
            decisions: vec![],
            action_items: vec![
                RecapTask {
                    text: "Ship the fix".to_string(),
                    owner: Some("Sarah Chen".to_string()),
                },
                RecapTask {
                    text: "File the ticket".to_string(),
                    owner: None,
                },
            ],
        };

        let children = page_children(&page);
        // Summary heading + paragraph, key points heading + bullet,
        // action items heading + two to_dos. No decisions section.
        assert_eq!(children.len(), 7);

        let todo_text = children[5]["to_do"]["rich_text"][0]["text"]["content"]
            .as_str()
            .unwrap();
        assert_eq!(todo_text, "Ship the fix (Sarah Chen)");

        let unowned = children[6]["to_do"]["rich_text"][0]["text"]["content"]
            .as_str()
            .unwrap();
        assert_eq!(unowned, "File the ticket");
    }

    #[test]
    fn test_create_page_response_url_fallback() {
        let with_url: CreatePageResponse = serde_json::from_str(
            r#"{"id": "b55c9c91-384d-452b-81db-d1ef79372b75", "url": "https://www.notion.so/Recap-b55c9c91384d452b81dbd1ef79372b75"}"#,
        )
        .unwrap();
        assert!(with_url.url.is_some());

        let without: CreatePageResponse =
            serde_json::from_str(r#"{"id": "b55c9c91-384d-452b-81db-d1ef79372b75"}"#).unwrap();
        assert!(without.url.is_none());
        assert_eq!(
            format!("https://www.notion.so/{}", without.id.replace('-', "")),
            "https://www.notion.so/b55c9c91384d452b81dbd1ef79372b75"
        );
    }
}
