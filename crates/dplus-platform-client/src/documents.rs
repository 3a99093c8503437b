//! Typed client for the two document tables.
//!
//! Generated directive PDFs live in `pdf_documents`, uploaded medical
//! documents in `medical_documents`. Both share the same columns; the
//! client tags each row with its [`DocumentKind`] and merges them.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | GET    | `/rest/v1/{table}?user_id=eq.{id}&order=created_at.desc` | List a patient's documents |
//! | GET    | `/rest/v1/{table}?id=eq.{id}` | Get document |
//! | DELETE | `/rest/v1/{table}?id=eq.{id}` | Delete document |

use dplus_core::{DocumentId, DocumentKind, MedicalDocument, UserId};

use crate::config::join;
use crate::error::PlatformError;
use crate::rest::{self, REST_PREFIX, RETURN_REPRESENTATION};

/// Client for PDF and medical documents.
#[derive(Debug, Clone)]
pub struct DocumentClient {
    http: reqwest::Client,
    base_url: url::Url,
}

impl DocumentClient {
    pub(crate) fn new(http: reqwest::Client, base_url: url::Url) -> Self {
        Self { http, base_url }
    }

    fn table_url(&self, kind: DocumentKind) -> String {
        join(&self.base_url, &format!("{REST_PREFIX}/{}", kind.table()))
    }

    /// Documents of one kind for a patient, newest first.
    pub async fn list_kind_for_user(
        &self,
        kind: DocumentKind,
        user_id: UserId,
    ) -> Result<Vec<MedicalDocument>, PlatformError> {
        let endpoint = format!("GET /{}?user_id={user_id}", kind.table());
        let url = self.table_url(kind);
        let query = [
            ("user_id", rest::eq(user_id)),
            ("order", "created_at.desc".to_string()),
            ("select", "*".to_string()),
        ];

        let resp = rest::execute(&endpoint, self.http.get(&url).query(&query)).await?;
        let mut docs: Vec<MedicalDocument> = rest::decode(&endpoint, resp).await?;
        for doc in &mut docs {
            doc.kind = kind;
        }
        Ok(docs)
    }

    /// All documents of a patient across both tables, newest first.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<MedicalDocument>, PlatformError> {
        let (pdfs, medical) = tokio::try_join!(
            self.list_kind_for_user(DocumentKind::Directive, user_id),
            self.list_kind_for_user(DocumentKind::Medical, user_id),
        )?;
        let mut all = pdfs;
        all.extend(medical);
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    /// Get one document.
    pub async fn get(
        &self,
        kind: DocumentKind,
        id: DocumentId,
    ) -> Result<Option<MedicalDocument>, PlatformError> {
        let endpoint = format!("GET /{}/{id}", kind.table());
        let url = self.table_url(kind);
        let query = [("id", rest::eq(id)), ("select", "*".to_string())];

        let resp = rest::execute(&endpoint, self.http.get(&url).query(&query)).await?;
        let doc: Option<MedicalDocument> = rest::decode_first(&endpoint, resp).await?;
        Ok(doc.map(|mut d| {
            d.kind = kind;
            d
        }))
    }

    /// Delete a document. Returns whether a row was removed.
    pub async fn delete(&self, kind: DocumentKind, id: DocumentId) -> Result<bool, PlatformError> {
        let endpoint = format!("DELETE /{}/{id}", kind.table());
        let url = self.table_url(kind);
        let query = [("id", rest::eq(id))];

        let resp = rest::execute(
            &endpoint,
            self.http
                .delete(&url)
                .query(&query)
                .header("Prefer", RETURN_REPRESENTATION),
        )
        .await?;
        let removed: Vec<serde_json::Value> = rest::decode(&endpoint, resp).await?;
        Ok(!removed.is_empty())
    }
}
