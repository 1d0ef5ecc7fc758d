//! Personal library gateway: saved sources, folders and PDF uploads.
//!
//! Endpoints used (all under `/user_storage/{user}` or `/user_pdf_storage/{user}`):
//!   GET    sources?path=        list sources, optionally within a folder
//!   GET    source/{id}          fetch one source
//!   POST   source               save a source (409 when already saved)
//!   DELETE source/{id}
//!   PUT    source/{id}/move     `{new_path}`
//!   GET    folders
//!   POST   folder               (409 when the folder exists)
//!   DELETE folder/{path}        path is percent-encoded as one segment
//!   POST   get_upload_url       presigned S3 PUT target
//!   POST   register_upload      attach an uploaded PDF to the library

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use medsearch_sources::RawSource;

use crate::backend::LibraryBackend;
use crate::error::ApiError;
use crate::http::{check_status, encode_component, Gateway, HttpApi};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// A paper saved in the user's library.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredSource {
    pub source_id: Option<String>,
    pub user_uid: String,
    pub title: String,
    pub authors: Vec<String>,
    pub journal: String,
    pub publication_date: String,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub mesh_terms: Option<Vec<String>>,
    pub publication_type: Option<Vec<String>>,
    pub pmc_id: Option<String>,
    pub country: Option<String>,
    pub citation_format: Option<String>,
    pub number_of_citations: Option<u32>,
    pub relevancy_score: Option<f64>,
    pub doi: Option<String>,
    pub pmid: Option<String>,
    pub is_full_text_available: Option<bool>,
    pub is_pdf_saved: Option<bool>,
    pub s3_pdf_url: Option<String>,
    pub s3_text_url: Option<String>,
    pub path: Option<String>,
    pub created_at: Option<String>,
    pub last_accessed: Option<String>,
    pub tags: Option<Vec<String>>,
    pub user_paper_title: Option<String>,
}

impl StoredSource {
    /// Library record for a source cited in a thread answer.
    pub fn from_raw(source: &RawSource, path: &str) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            title: source.title.clone(),
            authors: source.authors.clone(),
            journal: source.journal.clone(),
            publication_date: source.publication_date.clone(),
            abstract_text: non_empty(&source.abstract_text),
            keywords: Some(source.keywords.clone()),
            mesh_terms: Some(source.mesh_terms.clone()),
            publication_type: Some(source.publication_type.clone()),
            pmc_id: source.pmc_id.clone(),
            country: non_empty(&source.country),
            citation_format: non_empty(&source.citation_format),
            number_of_citations: Some(source.number_of_citations),
            doi: source.doi.clone(),
            pmid: non_empty(&source.pmid),
            is_full_text_available: Some(source.is_full_text_available),
            is_pdf_saved: Some(false),
            path: Some(normalise_folder_path(path)),
            tags: Some(vec![]),
            ..Default::default()
        }
    }

    /// Title shown in listings: the user's own title when set.
    pub fn display_title(&self) -> &str {
        self.user_paper_title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.title)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderInfo {
    pub folder_path: String,
    pub display_name: Option<String>,
    pub created_at: Option<String>,
    pub last_modified: Option<String>,
    pub parent_folder: Option<String>,
}

/// Presigned upload target returned by `get_upload_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadTicket {
    pub upload_url: String,
    pub key: String,
    pub content_type: String,
    #[serde(default)]
    pub expires_in: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved(StoredSource),
    /// The library already holds this paper. Treated as success.
    AlreadySaved(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FolderOutcome {
    Created(FolderInfo),
    /// Surfaced to the user as a warning.
    AlreadyExists(String),
}

/// Ensure a folder path starts and ends with `/`.
pub fn normalise_folder_path(path: &str) -> String {
    let mut normalised = String::with_capacity(path.len() + 2);
    if !path.starts_with('/') {
        normalised.push('/');
    }
    normalised.push_str(path);
    if !normalised.ends_with('/') {
        normalised.push('/');
    }
    normalised
}

/// S3 object metadata only accepts ASCII.
pub fn sanitise_title(title: &str) -> String {
    title.chars().map(|c| if c.is_ascii() { c } else { '-' }).collect()
}

/// Client-side id for a newly saved source: `src_` plus 8 hex characters.
pub fn new_source_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("src_{}", &uuid[..8])
}

/// Save a thread source into the library; an existing copy counts as success.
pub async fn save_to_library<L>(library: &L, source: &RawSource, path: &str) -> Result<SaveOutcome, ApiError>
where
    L: LibraryBackend + ?Sized,
{
    match library.add_source(StoredSource::from_raw(source, path)).await {
        Ok(saved) => Ok(SaveOutcome::Saved(saved)),
        Err(ApiError::Conflict(detail)) => {
            info!(pmid = %source.pmid, "Source already in library: {detail}");
            Ok(SaveOutcome::AlreadySaved(detail))
        }
        Err(e) => Err(e),
    }
}

pub async fn create_folder<L>(library: &L, path: &str, display_name: Option<String>) -> Result<FolderOutcome, ApiError>
where
    L: LibraryBackend + ?Sized,
{
    let folder = FolderInfo {
        folder_path: normalise_folder_path(path),
        display_name,
        ..Default::default()
    };
    match library.create_folder(folder).await {
        Ok(created) => Ok(FolderOutcome::Created(created)),
        Err(ApiError::Conflict(detail)) => {
            warn!(%path, "Folder already exists: {detail}");
            Ok(FolderOutcome::AlreadyExists(detail))
        }
        Err(e) => Err(e),
    }
}

/// Upload a PDF: request a presigned URL, PUT the bytes, register the object.
pub async fn upload_pdf<L>(
    library: &L,
    filename: &str,
    body: Vec<u8>,
    title: &str,
    path: &str,
) -> Result<StoredSource, ApiError>
where
    L: LibraryBackend + ?Sized,
{
    let ticket = library.upload_url(filename, PDF_CONTENT_TYPE, Some(title)).await?;
    if !library.upload_to_presigned(&ticket, body).await? {
        return Err(ApiError::Upload(format!("storage rejected {filename}")));
    }
    library.register_upload(&ticket.key, title, path).await
}

#[derive(Debug, Serialize)]
struct MoveRequest {
    new_path: String,
}

#[derive(Debug, Serialize)]
struct UploadUrlRequest<'a> {
    filename: &'a str,
    content_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<UploadMetadata>,
}

#[derive(Debug, Serialize)]
struct UploadMetadata {
    title: String,
}

#[derive(Debug, Serialize)]
struct RegisterUploadRequest<'a> {
    key: &'a str,
    title: &'a str,
    path: String,
}

impl HttpApi {
    async fn storage_url(&self, route: &str) -> Result<String, ApiError> {
        let user = self.current_user().await?;
        Ok(self.url(Gateway::Library, &format!("user_storage/{}/{}", encode_component(&user), route)))
    }

    async fn pdf_storage_url(&self, route: &str) -> Result<String, ApiError> {
        let user = self.current_user().await?;
        Ok(self.url(Gateway::Library, &format!("user_pdf_storage/{}/{}", encode_component(&user), route)))
    }
}

#[async_trait]
impl LibraryBackend for HttpApi {
    #[instrument(skip(self))]
    async fn list_sources(&self, path: Option<&str>) -> Result<Vec<StoredSource>, ApiError> {
        let url = self.storage_url("sources").await?;
        let mut req = self.authorize(Gateway::Library, self.client.get(&url)?).await;
        if let Some(path) = path {
            req = req.query(&[("path", path)]);
        }
        let resp = check_status(req.send().await?, "fetch user sources").await?;
        Ok(resp.json().await?)
    }

    #[instrument(skip(self))]
    async fn get_source(&self, source_id: &str) -> Result<StoredSource, ApiError> {
        let url = self.storage_url(&format!("source/{}", encode_component(source_id))).await?;
        let req = self.authorize(Gateway::Library, self.client.get(&url)?).await;
        let resp = check_status(req.send().await?, "source").await?;
        Ok(resp.json().await?)
    }

    #[instrument(skip(self, source), fields(title = %source.title))]
    async fn add_source(&self, mut source: StoredSource) -> Result<StoredSource, ApiError> {
        source.user_uid = self.current_user().await?;
        if source.source_id.as_deref().map_or(true, str::is_empty) {
            source.source_id = Some(new_source_id());
        }

        let url = self.storage_url("source").await?;
        let req = self.authorize(Gateway::Library, self.client.post(&url)?).await;
        let resp = check_status(req.json(&source).send().await?, "add user source").await?;
        Ok(resp.json().await?)
    }

    #[instrument(skip(self))]
    async fn delete_source(&self, source_id: &str) -> Result<(), ApiError> {
        let url = self.storage_url(&format!("source/{}", encode_component(source_id))).await?;
        let req = self.authorize(Gateway::Library, self.client.delete(&url)?).await;
        check_status(req.send().await?, "source").await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn move_source(&self, source_id: &str, new_path: &str) -> Result<StoredSource, ApiError> {
        let url = self.storage_url(&format!("source/{}/move", encode_component(source_id))).await?;
        let req = self.authorize(Gateway::Library, self.client.put(&url)?).await;
        let body = MoveRequest { new_path: normalise_folder_path(new_path) };
        let resp = check_status(req.json(&body).send().await?, "move user source").await?;
        Ok(resp.json().await?)
    }

    #[instrument(skip(self))]
    async fn list_folders(&self) -> Result<Vec<FolderInfo>, ApiError> {
        let url = self.storage_url("folders").await?;
        let req = self.authorize(Gateway::Library, self.client.get(&url)?).await;
        let resp = check_status(req.send().await?, "fetch user folders").await?;
        Ok(resp.json().await?)
    }

    #[instrument(skip(self))]
    async fn create_folder(&self, mut folder: FolderInfo) -> Result<FolderInfo, ApiError> {
        if folder.folder_path.is_empty() {
            return Err(ApiError::Status { status: 400, message: "Folder path is required".to_string() });
        }
        folder.folder_path = normalise_folder_path(&folder.folder_path);

        let url = self.storage_url("folder").await?;
        let req = self.authorize(Gateway::Library, self.client.post(&url)?).await;
        let resp = check_status(req.json(&folder).send().await?, "create user folder").await?;
        Ok(resp.json().await?)
    }

    #[instrument(skip(self))]
    async fn delete_folder(&self, folder_path: &str) -> Result<(), ApiError> {
        let path = encode_component(&normalise_folder_path(folder_path));
        let url = self.storage_url(&format!("folder/{path}")).await?;
        let req = self.authorize(Gateway::Library, self.client.delete(&url)?).await;
        check_status(req.send().await?, "folder").await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn upload_url(
        &self,
        filename: &str,
        content_type: &str,
        title: Option<&str>,
    ) -> Result<UploadTicket, ApiError> {
        let url = self.pdf_storage_url("get_upload_url").await?;
        let req = self.authorize(Gateway::Library, self.client.post(&url)?).await;
        let body = UploadUrlRequest {
            filename,
            content_type,
            metadata: title.map(|t| UploadMetadata { title: sanitise_title(t) }),
        };
        let resp = check_status(req.json(&body).send().await?, "get upload URL").await?;
        Ok(resp.json().await?)
    }

    #[instrument(skip(self, ticket, body), fields(key = %ticket.key, bytes = body.len()))]
    async fn upload_to_presigned(&self, ticket: &UploadTicket, body: Vec<u8>) -> Result<bool, ApiError> {
        // Presigned URLs carry their own credentials; no API key or bearer token.
        let resp = self
            .client
            .put(&ticket.upload_url)?
            .header(reqwest::header::CONTENT_TYPE, ticket.content_type.as_str())
            .body(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            warn!(status = resp.status().as_u16(), "Presigned upload rejected");
        }
        Ok(resp.status().is_success())
    }

    #[instrument(skip(self))]
    async fn register_upload(&self, key: &str, title: &str, path: &str) -> Result<StoredSource, ApiError> {
        let url = self.pdf_storage_url("register_upload").await?;
        let req = self.authorize(Gateway::Library, self.client.post(&url)?).await;
        let body = RegisterUploadRequest { key, title, path: normalise_folder_path(path) };
        match check_status(req.json(&body).send().await?, "register upload").await {
            Ok(resp) => Ok(resp.json().await?),
            Err(ApiError::Conflict(_)) => {
                warn!("Register upload conflict: source already exists");
                Err(ApiError::Conflict("Source already exists in this location.".to_string()))
            }
            Err(e) => Err(e),
        }
    }
}
