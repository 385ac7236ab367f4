use std::sync::Arc;

use {
    moltis_media::{MediaStore, MimeDetector, OCTET_STREAM},
    reqwest::header::CONTENT_TYPE,
    serde::Deserialize,
    tracing::{debug, warn},
};

use crate::{Error, Result, rich_text::MediaFetchTask};

/// Open-API host for message file downloads.
pub const DINGTALK_API_BASE: &str = "https://api.dingtalk.com";

/// Robot code carried by robots not bound to an app; those cannot download
/// message files.
pub const UNSCOPED_ROBOT_CODE: &str = "normal";

/// Size ceiling handed to the media store for inbound files.
pub const DEFAULT_INBOUND_MEDIA_MAX_BYTES: usize = 30 * 1024 * 1024;

/// Media store bucket for files received from users.
pub const INBOUND_MEDIA_BUCKET: &str = "inbound";

/// A rich-text image persisted by the media store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedMedia {
    pub path: String,
    pub content_type: String,
    pub placeholder: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadUrlResponse {
    download_url: Option<String>,
}

/// Downloads rich-text images and hands them to the media store.
#[derive(Clone)]
pub struct MediaResolver {
    http: reqwest::Client,
    api_base: String,
    store: Option<Arc<dyn MediaStore>>,
    mime_detectors: Vec<Arc<dyn MimeDetector>>,
}

impl MediaResolver {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            api_base: DINGTALK_API_BASE.to_string(),
            store: None,
            mime_detectors: Vec::new(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_store(mut self, store: Option<Arc<dyn MediaStore>>) -> Self {
        self.store = store;
        self
    }

    /// Detectors are tried in the order given.
    pub fn with_mime_detectors(mut self, detectors: Vec<Arc<dyn MimeDetector>>) -> Self {
        self.mime_detectors = detectors;
        self
    }

    /// Fetch and store every task, best effort. Failed tasks are logged and
    /// dropped. Nothing is fetched without a store, an access token, or an
    /// app-bound robot code.
    pub async fn resolve(
        &self,
        account_id: &str,
        tasks: &[MediaFetchTask],
        robot_code: Option<&str>,
        access_token: &str,
    ) -> Vec<SavedMedia> {
        if tasks.is_empty() {
            return Vec::new();
        }
        let Some(store) = self.store.as_deref() else {
            debug!(account_id, "no media store configured, skipping rich text images");
            return Vec::new();
        };
        let robot_code = robot_code.map(str::trim).unwrap_or_default();
        if access_token.is_empty() || robot_code.is_empty() || robot_code == UNSCOPED_ROBOT_CODE {
            debug!(
                account_id,
                robot_code, "missing access token or app robot code, skipping rich text images"
            );
            return Vec::new();
        }

        let mut saved = Vec::with_capacity(tasks.len());
        for task in tasks {
            match self
                .fetch_one(account_id, store, task, robot_code, access_token)
                .await
            {
                Ok(Some(media)) => saved.push(media),
                Ok(None) => {},
                Err(e) => warn!(account_id, "rich text image download/save failed: {e}"),
            }
        }
        saved
    }

    async fn fetch_one(
        &self,
        account_id: &str,
        store: &dyn MediaStore,
        task: &MediaFetchTask,
        robot_code: &str,
        access_token: &str,
    ) -> Result<Option<SavedMedia>> {
        let download_url = self
            .resolve_download_url(&task.download_code, robot_code, access_token)
            .await?;
        if download_url.is_empty() {
            warn!(account_id, "empty downloadUrl for rich text image");
            return Ok(None);
        }

        let resp = self.http.get(&download_url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::media_fetch_failed(format!(
                "file download returned {}",
                resp.status()
            )));
        }
        let declared = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        let bytes = resp.bytes().await?;
        let content_type = self.detect_content_type(account_id, &bytes, &declared).await;

        let stored = store
            .save_buffer(
                &bytes,
                &content_type,
                INBOUND_MEDIA_BUCKET,
                DEFAULT_INBOUND_MEDIA_MAX_BYTES,
            )
            .await
            .map_err(|e| Error::external("save inbound media", e))?;
        let Some(stored) = stored.filter(|stored| !stored.path.as_os_str().is_empty()) else {
            warn!(account_id, "media store returned no path");
            return Ok(None);
        };

        Ok(Some(SavedMedia {
            path: stored.path.to_string_lossy().into_owned(),
            content_type: stored.content_type.unwrap_or(content_type),
            placeholder: task.placeholder.clone(),
        }))
    }

    async fn resolve_download_url(
        &self,
        download_code: &str,
        robot_code: &str,
        access_token: &str,
    ) -> Result<String> {
        let url = format!(
            "{}/v1.0/robot/messageFiles/download",
            self.api_base.trim_end_matches('/')
        );
        let resp = self
            .http
            .post(url)
            .header("x-acs-dingtalk-access-token", access_token)
            .json(&serde_json::json!({
                "downloadCode": download_code,
                "robotCode": robot_code,
            }))
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::media_fetch_failed(format!(
                "download code exchange failed ({status}): {body}"
            )));
        }
        let body: DownloadUrlResponse = resp.json().await?;
        Ok(body.download_url.unwrap_or_default().trim().to_string())
    }

    /// First usable answer from the detector chain, then the declared HTTP
    /// type, then octet-stream. Detector errors are logged and skipped.
    pub async fn detect_content_type(&self, account_id: &str, bytes: &[u8], declared: &str) -> String {
        for detector in &self.mime_detectors {
            match detector.detect(bytes).await {
                Ok(Some(mime)) if !mime.trim().is_empty() => return mime.trim().to_string(),
                Ok(_) => {},
                Err(e) => debug!(account_id, "mime detection failed: {e}"),
            }
        }
        if declared.is_empty() {
            OCTET_STREAM.to_string()
        } else {
            declared.to_string()
        }
    }
}
