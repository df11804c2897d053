//! Mail REST API client
//!
//! Thin typed wrappers over the `/mail` routes. Every call goes through
//! the session manager, so a 401 is refreshed and replayed transparently.

use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::http::{ApiError, ApiRequest, envelope};
use crate::models::{MessageId, MessagePreview};
use crate::session::SessionManager;

/// Keys under which list payloads carry their items
const LIST_KEYS: &[&str] = &["previews", "threads", "emails", "results", "items"];

/// One page of a folder listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmailPage {
    pub previews: Vec<MessagePreview>,
    /// Continuation cursor; `None` on the last page
    pub next_page_token: Option<String>,
}

impl EmailPage {
    pub fn has_more(&self) -> bool {
        self.next_page_token.is_some()
    }

    fn from_json(body: &Value) -> Self {
        let data = envelope::payload(body);
        let next_page_token = envelope::first_field(data, &["nextPageToken", "next_page_token"])
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        Self {
            previews: MessagePreview::list_from_json(envelope::list_items(body, LIST_KEYS)),
            next_page_token,
        }
    }
}

/// A mailbox (folder) as listed by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "unreadCount")]
    pub unread_count: u32,
    #[serde(default, alias = "totalCount")]
    pub total_count: u32,
}

/// A mail label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Changes applied by the modify endpoint; absent fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModifyEmail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trash: Option<bool>,
}

impl ModifyEmail {
    pub fn unread(unread: bool) -> Self {
        Self {
            unread: Some(unread),
            ..Self::default()
        }
    }

    pub fn starred(starred: bool) -> Self {
        Self {
            starred: Some(starred),
            ..Self::default()
        }
    }

    pub fn labels(labels: Vec<String>) -> Self {
        Self {
            labels: Some(labels),
            ..Self::default()
        }
    }

    pub fn trash() -> Self {
        Self {
            trash: Some(true),
            ..Self::default()
        }
    }
}

/// A message to send, reply with, or save as a draft
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub subject: String,
    pub body: String,
}

impl OutgoingEmail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("to".to_string(), self.to.clone()),
            ("subject".to_string(), self.subject.clone()),
            ("body".to_string(), self.body.clone()),
        ];
        if let Some(cc) = self.cc.as_ref().filter(|cc| !cc.is_empty()) {
            fields.push(("cc".to_string(), cc.clone()));
        }
        if let Some(bcc) = self.bcc.as_ref().filter(|bcc| !bcc.is_empty()) {
            fields.push(("bcc".to_string(), bcc.clone()));
        }
        fields
    }
}

/// Client for the `/mail` routes
#[derive(Clone)]
pub struct MailApi {
    session: Arc<SessionManager>,
}

impl MailApi {
    /// Route prefix of the mail API
    const BASE: &'static str = "/mail";

    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    fn path(suffix: &str) -> String {
        format!("{}{}", Self::BASE, suffix)
    }

    fn email_path(id: &MessageId, action: &str) -> String {
        format!("{}/emails/{}{}", Self::BASE, urlencoding::encode(id.as_str()), action)
    }

    /// List the user's mailboxes
    pub fn list_mailboxes(&self) -> Result<Vec<MailboxInfo>, ApiError> {
        let body = self.session.execute_json(ApiRequest::get(Self::path("/mailboxes")))?;
        Ok(envelope::list_items(&body, &["mailboxes"])
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect())
    }

    /// List one page of a mailbox
    ///
    /// # Arguments
    /// * `mailbox` - Mailbox id or label
    /// * `limit` - Page size
    /// * `page_token` - Cursor from the previous page, if continuing
    pub fn list_emails(
        &self,
        mailbox: &str,
        limit: usize,
        page_token: Option<&str>,
    ) -> Result<EmailPage, ApiError> {
        let path = Self::path(&format!("/mailboxes/{}/emails", urlencoding::encode(mailbox)));
        let mut request = ApiRequest::get(path).query("limit", limit.to_string());
        if let Some(token) = page_token {
            request = request.query("page_token", token);
        }

        let page = EmailPage::from_json(&self.session.execute_json(request)?);
        debug!(
            "Listed {} previews from {} (more: {})",
            page.previews.len(),
            mailbox,
            page.has_more()
        );
        Ok(page)
    }

    /// Full thread detail
    pub fn get_email(&self, id: &MessageId) -> Result<Value, ApiError> {
        let body = self.session.execute_json(ApiRequest::get(Self::email_path(id, "")))?;
        Ok(envelope::payload(&body).clone())
    }

    pub fn send_email(&self, email: &OutgoingEmail) -> Result<Value, ApiError> {
        self.post_form(Self::path("/emails/send"), email)
    }

    pub fn reply_email(&self, id: &MessageId, email: &OutgoingEmail) -> Result<Value, ApiError> {
        self.post_form(Self::email_path(id, "/reply"), email)
    }

    pub fn create_draft(&self, email: &OutgoingEmail) -> Result<Value, ApiError> {
        self.post_form(Self::path("/drafts"), email)
    }

    fn post_form(&self, path: String, email: &OutgoingEmail) -> Result<Value, ApiError> {
        let body = self
            .session
            .execute_json(ApiRequest::post(path).form(email.form_fields()))?;
        Ok(envelope::payload(&body).clone())
    }

    /// Apply flag and label changes to a message
    pub fn modify_email(&self, id: &MessageId, changes: &ModifyEmail) -> Result<(), ApiError> {
        let body = serde_json::to_value(changes).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.session
            .execute(ApiRequest::post(Self::email_path(id, "/modify")).json(body))?;
        Ok(())
    }

    /// Keyword search
    pub fn search(&self, query: &str) -> Result<Vec<MessagePreview>, ApiError> {
        self.search_at("/search", query)
    }

    /// Semantic (embedding) search
    pub fn search_semantic(&self, query: &str) -> Result<Vec<MessagePreview>, ApiError> {
        self.search_at("/search/semantic", query)
    }

    fn search_at(&self, suffix: &str, query: &str) -> Result<Vec<MessagePreview>, ApiError> {
        let request = ApiRequest::get(Self::path(suffix)).query("q", query);
        let body = self.session.execute_json(request)?;
        Ok(MessagePreview::list_from_json(envelope::list_items(&body, LIST_KEYS)))
    }

    /// Ask the server to (re)index the mailbox for search
    pub fn sync_search_index(&self) -> Result<(), ApiError> {
        self.session
            .execute(ApiRequest::post(Self::path("/search/sync")))?;
        Ok(())
    }

    /// Raw attachment bytes
    pub fn download_attachment(
        &self,
        message_id: &MessageId,
        attachment_id: &str,
    ) -> Result<Vec<u8>, ApiError> {
        let mut request = ApiRequest::get(Self::path("/attachments"))
            .query("messageId", message_id.as_str())
            .query("attachmentId", attachment_id);
        request.set_header("Accept", "application/octet-stream");
        Ok(self.session.execute(request)?.body)
    }

    pub fn list_labels(&self) -> Result<Vec<Label>, ApiError> {
        let body = self.session.execute_json(ApiRequest::get(Self::path("/labels")))?;
        Ok(envelope::list_items(&body, &["labels"])
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect())
    }

    /// Snooze a message until the given time
    pub fn snooze_email(&self, id: &MessageId, until: DateTime<Utc>) -> Result<(), ApiError> {
        let body = json!({ "snooze_until": until.to_rfc3339_opts(SecondsFormat::Secs, true) });
        self.session
            .execute(ApiRequest::post(Self::email_path(id, "/snooze")).json(body))?;
        Ok(())
    }

    /// Server-generated summary of a message
    pub fn summarize_email(&self, id: &MessageId) -> Result<String, ApiError> {
        let body = self
            .session
            .execute_json(ApiRequest::post(Self::email_path(id, "/summarize")))?;
        let data = envelope::payload(&body);
        data.as_str()
            .or_else(|| envelope::first_field(data, &["summary", "text"]).and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| ApiError::Decode("summary response did not contain text".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ApiResponse, Body, MockTransport};
    use crate::storage::InMemoryLocalStore;

    fn client(handler: impl Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync + 'static) -> (MailApi, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new(handler));
        let session = Arc::new(SessionManager::new(
            transport.clone(),
            Arc::new(InMemoryLocalStore::new()),
        ));
        (MailApi::new(session), transport)
    }

    #[test]
    fn test_list_emails_reads_threads_and_cursor() {
        let (api, transport) = client(|_| {
            Ok(ApiResponse::json(
                200,
                &json!({ "data": { "threads": [{ "id": "t1" }, { "id": "t2" }], "nextPageToken": "p2" } }),
            ))
        });

        let page = api.list_emails("inbox", 20, Some("p1")).unwrap();
        assert_eq!(page.previews.len(), 2);
        assert_eq!(page.next_page_token.as_deref(), Some("p2"));

        let requests = transport.requests();
        assert_eq!(requests[0].path, "/mail/mailboxes/inbox/emails");
        assert!(requests[0].query.contains(&("limit".into(), "20".into())));
        assert!(requests[0].query.contains(&("page_token".into(), "p1".into())));
    }

    #[test]
    fn test_modify_sends_only_present_fields() {
        let (api, transport) = client(|_| Ok(ApiResponse::json(200, &json!({ "success": true }))));
        api.modify_email(&MessageId::new("m 1"), &ModifyEmail::starred(true))
            .unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.path, "/mail/emails/m%201/modify");
        assert_eq!(request.body, Body::Json(json!({ "starred": true })));
    }

    #[test]
    fn test_send_email_posts_form() {
        let (api, transport) = client(|_| Ok(ApiResponse::json(200, &json!({ "data": { "id": "s1" } }))));
        let mut email = OutgoingEmail::new("ann@example.com", "Hi", "Hello");
        email.cc = Some("bob@example.com".into());

        let sent = api.send_email(&email).unwrap();
        assert_eq!(sent["id"], "s1");

        let Body::Form(fields) = &transport.requests()[0].body else {
            panic!("expected a form body");
        };
        assert!(fields.contains(&("cc".into(), "bob@example.com".into())));
        assert!(!fields.iter().any(|(k, _)| k == "bcc"));
    }

    #[test]
    fn test_summarize_accepts_bare_or_wrapped_text() {
        let (api, _) = client(|_| Ok(ApiResponse::json(200, &json!({ "data": { "summary": "short" } }))));
        assert_eq!(api.summarize_email(&MessageId::new("m1")).unwrap(), "short");

        let (api, _) = client(|_| Ok(ApiResponse::json(200, &json!({ "data": "shorter" }))));
        assert_eq!(api.summarize_email(&MessageId::new("m1")).unwrap(), "shorter");
    }
}
