//! HTTP object-storage backend.
//!
//! Reads go through the public object URL so the updater needs no
//! credentials. Writes use the media upload endpoint with
//! `predefinedAcl=publicRead`, which publishes the object in the same request.

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::Url;
use reqwest::blocking::{Body, Client, RequestBuilder};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use tracing::{debug, info, warn};

use crate::config::{UpdaterConfig, artifact_object_name, metadata_object_name};
use crate::error::{Result, UpdateError};
use crate::marker::VersionMarker;
use crate::remote::{ArtifactStore, MetadataStore};
use crate::steps::USER_AGENT_VALUE;

/// Object-storage client for one bucket.
#[derive(Debug, Clone)]
pub struct GcsStore {
    metadata_client: Client,
    transfer_client: Client,
    base_url: String,
    storage: String,
    access_token: Option<String>,
}

impl GcsStore {
    /// Create a store for `storage` under `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        storage: impl Into<String>,
        metadata_timeout: Duration,
        transfer_timeout: Duration,
    ) -> Result<Self> {
        let metadata_client = Client::builder().timeout(metadata_timeout).build()?;
        let transfer_client = Client::builder().timeout(transfer_timeout).build()?;

        Ok(Self {
            metadata_client,
            transfer_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            storage: storage.into(),
            access_token: None,
        })
    }

    /// Store described by an updater config.
    pub fn from_config(config: &UpdaterConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            &config.storage,
            config.metadata_timeout(),
            config.transfer_timeout(),
        )
    }

    /// Attach a bearer token for writes.
    #[must_use]
    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Public URL of an object.
    #[must_use]
    pub fn object_url(&self, object: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.storage, object)
    }

    fn upload_url(&self, object: &str) -> Result<Url> {
        let endpoint = format!("{}/upload/storage/v1/b/{}/o", self.base_url, self.storage);
        let mut url = Url::parse(&endpoint)
            .map_err(|e| UpdateError::Config(format!("invalid storage url {endpoint}: {e}")))?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", object)
            .append_pair("predefinedAcl", "publicRead");
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(USER_AGENT, USER_AGENT_VALUE);
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn upload(&self, client: &Client, object: &str, content_type: &str, body: Body) -> Result<()> {
        let url = self.upload_url(object)?;
        debug!("Uploading {object} to {}", self.storage);

        let response = self
            .authorized(client.post(url))
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()?;
        response.error_for_status()?;
        Ok(())
    }
}

impl MetadataStore for GcsStore {
    fn get(&self, variant: &str) -> Result<VersionMarker> {
        let url = self.object_url(&metadata_object_name(variant));
        debug!("Fetching remote marker from {url}");

        let response = self
            .metadata_client
            .get(&url)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .send()?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            info!("No marker published for '{variant}', bootstrapping the initial marker");
            let marker = VersionMarker::initial();
            if let Err(err) = self.put(variant, &marker) {
                warn!("Could not store the initial marker for '{variant}': {err}");
            }
            return Ok(marker);
        }
        if !status.is_success() {
            return Err(UpdateError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes()?;
        VersionMarker::from_json(&bytes)
    }

    fn put(&self, variant: &str, marker: &VersionMarker) -> Result<()> {
        let object = metadata_object_name(variant);
        self.upload(
            &self.metadata_client,
            &object,
            "application/json",
            Body::from(marker.to_json()?),
        )?;
        info!("Published marker {} for '{variant}'", marker.version);
        Ok(())
    }
}

impl ArtifactStore for GcsStore {
    fn upload_archive(&self, variant: &str, version: &str, archive: &Path) -> Result<String> {
        let object = artifact_object_name(variant, version);
        let file = File::open(archive).map_err(|e| UpdateError::io("open", archive, e))?;

        self.upload(
            &self.transfer_client,
            &object,
            "application/zip",
            Body::from(file),
        )?;

        let url = self.object_url(&object);
        info!("Uploaded {} to {url}", archive.display());
        Ok(url)
    }
}
