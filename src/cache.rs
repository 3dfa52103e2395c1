use std::collections::{HashMap, HashSet};
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::Builder;

use crate::api::VgApi;
use crate::catalog;
use crate::domain::{ImageHeader, ImageId, Region, Resource, SceneGraph};
use crate::error::VgError;
use crate::fs_util::{self, atomic_rename_dir, for_each_json_element};

pub const BY_ID_DIR: &str = "by-id";
pub const IMAGE_IDS_FILE: &str = "all_image_ids";
const SCENE_GRAPH_INDEX_STEP: &str = "scene_graphs_by_id";

/// Paths of the on-disk bundle. Nothing here touches the filesystem.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: Utf8PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn resource_path(&self, resource: Resource) -> Utf8PathBuf {
        self.root.join(resource.file_name())
    }

    pub fn by_id_dir(&self) -> Utf8PathBuf {
        self.root.join(BY_ID_DIR)
    }

    pub fn scene_graph_path(&self, id: ImageId) -> Utf8PathBuf {
        self.by_id_dir().join(format!("{id}.json"))
    }

    pub fn image_ids_path(&self) -> Utf8PathBuf {
        self.root.join(IMAGE_IDS_FILE)
    }

    pub fn provenance_path(&self, step: &str) -> Utf8PathBuf {
        self.root.join("metadata").join(format!("{step}.json"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    AlreadyPresent,
    Built,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: String,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub root: String,
    pub steps: Vec<StepReport>,
}

impl CacheReport {
    /// True when every step found its output already on disk.
    pub fn is_noop(&self) -> bool {
        self.steps
            .iter()
            .all(|step| step.outcome == StepOutcome::AlreadyPresent)
    }

    pub fn built(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|step| step.outcome == StepOutcome::Built)
            .map(|step| step.step.as_str())
            .collect()
    }
}

/// Written next to the bundle once a step completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub step: String,
    pub source: String,
    pub built_at: String,
    pub tool: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub step: String,
    pub path: String,
    pub present: bool,
    pub provenance: Option<Provenance>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub root: String,
    pub entries: Vec<StatusEntry>,
}

impl CacheStatus {
    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(|entry| entry.present)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub image: ImageHeader,
    pub regions: Vec<Region>,
}

/// Image id to cached header and regions, restricted to the ids that were
/// asked for when it was built.
#[derive(Debug, Clone, Default)]
pub struct CacheIndex {
    entries: HashMap<ImageId, IndexEntry>,
}

impl CacheIndex {
    pub fn get(&self, id: ImageId) -> Option<&IndexEntry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ImageId> + '_ {
        self.entries.keys().copied()
    }
}

#[derive(Debug, Deserialize)]
struct RegionEntry {
    #[serde(alias = "image_id")]
    id: ImageId,
    #[serde(default)]
    regions: Vec<Region>,
}

/// Owns the bundle under one cache root. Assumes a single builder per
/// directory: concurrent builders may both download the same archive.
pub struct CacheBuilder<A: VgApi> {
    layout: CacheLayout,
    api: A,
}

impl<A: VgApi> CacheBuilder<A> {
    pub fn new(root: impl Into<Utf8PathBuf>, api: A) -> Self {
        Self {
            layout: CacheLayout::new(root),
            api,
        }
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Downloads and derives whatever part of the bundle is missing. Every
    /// existing file is trusted as complete, so a second call on a finished
    /// cache makes no API calls.
    pub fn ensure(&self) -> Result<CacheReport, VgError> {
        fs::create_dir_all(self.layout.root().as_std_path()).map_err(|err| {
            cache_error(self.layout.root().as_str(), err.to_string())
        })?;

        let mut steps = Vec::new();
        for resource in Resource::ALL {
            let outcome = self.ensure_resource(resource)?;
            steps.push(StepReport {
                step: resource.name().to_string(),
                outcome,
            });
        }
        steps.push(StepReport {
            step: SCENE_GRAPH_INDEX_STEP.to_string(),
            outcome: self.ensure_scene_graph_index()?,
        });
        steps.push(StepReport {
            step: IMAGE_IDS_FILE.to_string(),
            outcome: self.ensure_image_ids()?,
        });

        Ok(CacheReport {
            root: self.layout.root().to_string(),
            steps,
        })
    }

    fn ensure_resource(&self, resource: Resource) -> Result<StepOutcome, VgError> {
        let target = self.layout.resource_path(resource);
        if target.as_std_path().exists() {
            tracing::debug!(%resource, "bundle file present");
            return Ok(StepOutcome::AlreadyPresent);
        }

        tracing::info!(%resource, "bundle file missing; downloading");
        let fail = |cause: String| cache_error(resource.name(), cause);
        let staging = Builder::new()
            .prefix(".vg-staging")
            .tempdir_in(self.layout.root().as_std_path())
            .map_err(|err| fail(err.to_string()))?;
        let archive_path = staging.path().join(format!("{}.zip", resource.name()));
        let extract_dir = staging.path().join("extracted");
        fs::create_dir_all(&extract_dir).map_err(|err| fail(err.to_string()))?;

        self.api
            .download_archive(resource, &archive_path)
            .map_err(|err| fail(err.to_string()))?;
        fs_util::extract_zip(&archive_path, &extract_dir).map_err(|err| fail(err.to_string()))?;
        let extracted = fs_util::find_file(&extract_dir, &resource.file_name())
            .map_err(|err| fail(err.to_string()))?
            .ok_or_else(|| fail(format!("archive does not contain {}", resource.file_name())))?;
        fs::rename(&extracted, target.as_std_path()).map_err(|err| fail(err.to_string()))?;

        self.write_provenance(resource.name(), "download")?;
        Ok(StepOutcome::Built)
    }

    /// Splits `scene_graphs.json` into `by-id/<id>.json`, one file per image.
    fn ensure_scene_graph_index(&self) -> Result<StepOutcome, VgError> {
        let by_id = self.layout.by_id_dir();
        if by_id.as_std_path().exists() {
            return Ok(StepOutcome::AlreadyPresent);
        }

        tracing::info!(dir = %by_id, "splitting scene graphs by image id");
        let fail = |cause: String| cache_error(SCENE_GRAPH_INDEX_STEP, cause);
        let staging = Builder::new()
            .prefix(".vg-by-id")
            .tempdir_in(self.layout.root().as_std_path())
            .map_err(|err| fail(err.to_string()))?;

        let mut written = 0usize;
        for_each_json_element(
            &self.layout.resource_path(Resource::SceneGraphs),
            |graph: Value| {
                let id = graph
                    .get("image_id")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| VgError::Decode("scene graph without image_id".to_string()))
                    .and_then(ImageId::new)?;
                let content =
                    serde_json::to_vec(&graph).map_err(|err| VgError::Decode(err.to_string()))?;
                fs::write(staging.path().join(format!("{id}.json")), content)
                    .map_err(|err| VgError::Filesystem(err.to_string()))?;
                written += 1;
                Ok(())
            },
        )
        .map_err(|err| fail(err.to_string()))?;

        atomic_rename_dir(staging.path(), by_id.as_std_path())
            .map_err(|err| fail(err.to_string()))?;
        tracing::info!(written, "scene graph index built");

        self.write_provenance(SCENE_GRAPH_INDEX_STEP, Resource::SceneGraphs.name())?;
        Ok(StepOutcome::Built)
    }

    fn ensure_image_ids(&self) -> Result<StepOutcome, VgError> {
        let path = self.layout.image_ids_path();
        if path.as_std_path().exists() {
            return Ok(StepOutcome::AlreadyPresent);
        }

        tracing::info!(%path, "persisting image id catalog");
        let fail = |cause: String| cache_error(IMAGE_IDS_FILE, cause);
        let ids = catalog::all_image_ids(&self.api).map_err(|err| fail(err.to_string()))?;
        catalog::persist_image_ids(&path, &ids).map_err(|err| fail(err.to_string()))?;

        self.write_provenance(IMAGE_IDS_FILE, "api")?;
        Ok(StepOutcome::Built)
    }

    fn write_provenance(&self, step: &str, source: &str) -> Result<(), VgError> {
        let provenance = Provenance {
            step: step.to_string(),
            source: source.to_string(),
            built_at: Utc::now().to_rfc3339(),
            tool: format!("vg-records/{}", env!("CARGO_PKG_VERSION")),
        };
        let content = serde_json::to_vec_pretty(&provenance)
            .map_err(|err| cache_error(step, err.to_string()))?;
        fs_util::write_bytes_atomic(&self.layout.provenance_path(step), &content)
    }

    /// Reports which parts of the bundle exist. Never touches the network.
    pub fn status(&self) -> CacheStatus {
        let mut entries: Vec<(String, Utf8PathBuf)> = Resource::ALL
            .iter()
            .map(|resource| {
                (
                    resource.name().to_string(),
                    self.layout.resource_path(*resource),
                )
            })
            .collect();
        entries.push((SCENE_GRAPH_INDEX_STEP.to_string(), self.layout.by_id_dir()));
        entries.push((IMAGE_IDS_FILE.to_string(), self.layout.image_ids_path()));

        let entries = entries
            .into_iter()
            .map(|(step, path)| {
                let provenance = fs::read(self.layout.provenance_path(&step).as_std_path())
                    .ok()
                    .and_then(|bytes| serde_json::from_slice(&bytes).ok());
                StatusEntry {
                    present: path.as_std_path().exists(),
                    path: path.to_string(),
                    step,
                    provenance,
                }
            })
            .collect();

        CacheStatus {
            root: self.layout.root().to_string(),
            entries,
        }
    }

    /// Loads headers and regions for `filter` (every image when `None`).
    /// Both bundle files are streamed, so memory follows the filter size.
    pub fn build_index(&self, filter: Option<&HashSet<ImageId>>) -> Result<CacheIndex, VgError> {
        let wanted = |id: ImageId| filter.is_none_or(|ids| ids.contains(&id));

        let mut headers = HashMap::new();
        for_each_json_element(
            &self.layout.resource_path(Resource::ImageData),
            |header: ImageHeader| {
                if wanted(header.id) {
                    headers.insert(header.id, header);
                }
                Ok(())
            },
        )?;

        let mut entries = HashMap::new();
        for_each_json_element(
            &self.layout.resource_path(Resource::RegionDescriptions),
            |entry: RegionEntry| {
                if !wanted(entry.id) {
                    return Ok(());
                }
                let image = headers.get(&entry.id).cloned().ok_or_else(|| {
                    VgError::Decode(format!(
                        "image {} has region descriptions but no image data",
                        entry.id
                    ))
                })?;
                entries.insert(
                    entry.id,
                    IndexEntry {
                        image,
                        regions: entry.regions,
                    },
                );
                Ok(())
            },
        )?;

        tracing::info!(indexed = entries.len(), "local region index built");
        Ok(CacheIndex { entries })
    }

    /// Reads a persisted scene graph from `by-id/`, if present.
    pub fn load_cached_scene_graph(&self, id: ImageId) -> Result<Option<SceneGraph>, VgError> {
        let path = self.layout.scene_graph_path(id);
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read(path.as_std_path())
            .map_err(|err| VgError::Filesystem(format!("read {path}: {err}")))?;
        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|err| VgError::Decode(format!("{path}: {err}")))
    }

    pub fn into_api(self) -> A {
        self.api
    }
}

fn cache_error(resource: &str, cause: String) -> VgError {
    VgError::CacheBuild {
        resource: resource.to_string(),
        cause,
    }
}
