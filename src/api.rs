use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::ResolvedConfig;
use crate::domain::{ImageHeader, ImageId, ImageRegions, Region, Resource, SceneGraph};
use crate::error::VgError;

/// Everything the sources and the cache builder need from the dataset
/// servers.
pub trait VgApi {
    fn fetch_all_image_ids(&self) -> Result<Vec<ImageId>, VgError>;
    /// Header and regions of one image.
    fn fetch_image_regions(&self, id: ImageId) -> Result<ImageRegions, VgError>;
    fn fetch_scene_graph(&self, id: ImageId) -> Result<SceneGraph, VgError>;
    /// Writes the zip archive of `resource` to `destination`.
    fn download_archive(&self, resource: Resource, destination: &Path) -> Result<(), VgError>;
}

impl<T: VgApi + ?Sized> VgApi for &T {
    fn fetch_all_image_ids(&self) -> Result<Vec<ImageId>, VgError> {
        (**self).fetch_all_image_ids()
    }

    fn fetch_image_regions(&self, id: ImageId) -> Result<ImageRegions, VgError> {
        (**self).fetch_image_regions(id)
    }

    fn fetch_scene_graph(&self, id: ImageId) -> Result<SceneGraph, VgError> {
        (**self).fetch_scene_graph(id)
    }

    fn download_archive(&self, resource: Resource, destination: &Path) -> Result<(), VgError> {
        (**self).download_archive(resource, destination)
    }
}

#[derive(Debug, Deserialize)]
struct IdPage {
    results: Vec<ImageId>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Clone)]
pub struct VgHttpClient {
    client: Client,
    api_base: String,
    dataset_base: String,
}

impl VgHttpClient {
    pub fn new(config: &ResolvedConfig) -> Result<Self, VgError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("vg-records/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| VgError::SourceUnavailable(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| VgError::SourceUnavailable(err.to_string()))?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            dataset_base: config.dataset_base.trim_end_matches('/').to_string(),
        })
    }

    fn image_url(&self, id: ImageId) -> String {
        format!("{}/images/{}", self.api_base, id)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, VgError> {
        tracing::debug!(url, "GET");
        let response = self.send_with_retries(|| self.client.get(url))?;
        let response = Self::handle_status(response)?;
        response
            .json()
            .map_err(|err| VgError::Decode(format!("{url}: {err}")))
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, VgError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "dataset request failed".to_string());
        Err(VgError::ApiStatus { status, message })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, VgError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(VgError::SourceUnavailable(err.to_string()));
                }
            }
        }
    }
}

impl VgApi for VgHttpClient {
    fn fetch_all_image_ids(&self) -> Result<Vec<ImageId>, VgError> {
        let mut ids = Vec::new();
        let mut page = 1usize;
        loop {
            let url = format!("{}/images/all?page={page}", self.api_base);
            let data: IdPage = self.get_json(&url)?;
            ids.extend(data.results);
            if data.next.is_none() {
                break;
            }
            page += 1;
        }
        tracing::info!(count = ids.len(), "fetched image id catalog");
        Ok(ids)
    }

    fn fetch_image_regions(&self, id: ImageId) -> Result<ImageRegions, VgError> {
        let image: ImageHeader = self.get_json(&self.image_url(id))?;
        let regions: Vec<Region> = self.get_json(&format!("{}/regions", self.image_url(id)))?;
        Ok(ImageRegions { image, regions })
    }

    fn fetch_scene_graph(&self, id: ImageId) -> Result<SceneGraph, VgError> {
        self.get_json(&format!("{}/graph", self.image_url(id)))
    }

    fn download_archive(&self, resource: Resource, destination: &Path) -> Result<(), VgError> {
        let url = resource.archive_url(&self.dataset_base);
        tracing::info!(%url, "downloading archive");
        let response = self.send_with_retries(|| self.client.get(&url))?;
        let mut response = Self::handle_status(response)?;
        let mut file =
            File::create(destination).map_err(|err| VgError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| VgError::SourceUnavailable(format!("{url}: {err}")))?;
        Ok(())
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
