#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Mutex;

use serde_json::{Value, json};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use vg_records::api::VgApi;
use vg_records::domain::{ImageHeader, ImageId, ImageRegions, Region, Resource, SceneGraph};
use vg_records::error::VgError;

pub fn id(value: u64) -> ImageId {
    ImageId::new(value).unwrap()
}

pub fn ids(values: &[u64]) -> Vec<ImageId> {
    values.iter().map(|value| id(*value)).collect()
}

/// In-memory stand-in for the dataset servers. The bundle archives are
/// generated from the same data the API answers with.
#[derive(Default)]
pub struct MockApi {
    images: BTreeMap<ImageId, ImageRegions>,
    /// Images the API knows that are absent from the bulk bundle.
    api_only: BTreeMap<ImageId, ImageRegions>,
    /// Per-image overrides of what the API reports for `coco_id`.
    remote_coco_override: BTreeMap<ImageId, Option<u64>>,
    failing_archive: Mutex<Option<Resource>>,
    failing_regions: HashSet<ImageId>,
    calls: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn new(image_ids: &[u64]) -> Self {
        let mut api = MockApi::default();
        for value in image_ids {
            let entry = sample_image(*value);
            api.images.insert(entry.image.id, entry);
        }
        api
    }

    pub fn with_api_only_image(mut self, value: u64) -> Self {
        let entry = sample_image(value);
        self.api_only.insert(entry.image.id, entry);
        self
    }

    pub fn with_remote_coco_id(mut self, value: u64, coco_id: Option<u64>) -> Self {
        self.remote_coco_override.insert(id(value), coco_id);
        self
    }

    pub fn with_failing_regions(mut self, value: u64) -> Self {
        self.failing_regions.insert(id(value));
        self
    }

    pub fn fail_archive(&self, resource: Option<Resource>) {
        *self.failing_archive.lock().unwrap() = resource;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn bundle_json(&self, resource: Resource) -> Value {
        match resource {
            Resource::ImageData => Value::Array(
                self.images
                    .values()
                    .map(|entry| {
                        json!({
                            "image_id": entry.image.id,
                            "width": entry.image.width,
                            "height": entry.image.height,
                            "coco_id": entry.image.coco_id,
                            "flickr_id": entry.image.flickr_id,
                            "url": entry.image.url,
                        })
                    })
                    .collect(),
            ),
            Resource::RegionDescriptions => Value::Array(
                self.images
                    .values()
                    .map(|entry| {
                        let regions: Vec<Value> = entry
                            .regions
                            .iter()
                            .map(|region| {
                                json!({
                                    "region_id": region.id,
                                    "image_id": region.image_id,
                                    "x": region.x,
                                    "y": region.y,
                                    "width": region.width,
                                    "height": region.height,
                                    "phrase": region.phrase,
                                })
                            })
                            .collect();
                        json!({ "id": entry.image.id, "regions": regions })
                    })
                    .collect(),
            ),
            Resource::SceneGraphs => Value::Array(
                self.images
                    .keys()
                    .map(|image_id| scene_graph_json(*image_id))
                    .collect(),
            ),
            Resource::Synsets => json!({ "dog.n.01": "dog", "cat.n.01": "cat" }),
        }
    }
}

impl VgApi for MockApi {
    fn fetch_all_image_ids(&self) -> Result<Vec<ImageId>, VgError> {
        self.record("ids".to_string());
        let mut all: Vec<ImageId> = self.images.keys().copied().collect();
        all.extend(self.api_only.keys().copied());
        Ok(all)
    }

    fn fetch_image_regions(&self, image_id: ImageId) -> Result<ImageRegions, VgError> {
        self.record(format!("regions:{image_id}"));
        if self.failing_regions.contains(&image_id) {
            return Err(VgError::ApiStatus {
                status: 500,
                message: "boom".to_string(),
            });
        }
        let mut entry = self
            .images
            .get(&image_id)
            .or_else(|| self.api_only.get(&image_id))
            .cloned()
            .ok_or_else(|| VgError::ApiStatus {
                status: 404,
                message: "not found".to_string(),
            })?;
        if let Some(coco_id) = self.remote_coco_override.get(&image_id) {
            entry.image.coco_id = *coco_id;
        }
        Ok(entry)
    }

    fn fetch_scene_graph(&self, image_id: ImageId) -> Result<SceneGraph, VgError> {
        self.record(format!("graph:{image_id}"));
        Ok(SceneGraph(scene_graph_json(image_id)))
    }

    fn download_archive(&self, resource: Resource, destination: &Path) -> Result<(), VgError> {
        self.record(format!("archive:{resource}"));
        if *self.failing_archive.lock().unwrap() == Some(resource) {
            return Err(VgError::SourceUnavailable("connection reset".to_string()));
        }
        let content = serde_json::to_vec(&self.bundle_json(resource)).unwrap();
        // Synsets ship inside a directory, like some of the real archives.
        let entry_name = match resource {
            Resource::Synsets => format!("data/{}", resource.file_name()),
            _ => resource.file_name(),
        };
        std::fs::write(destination, zip_bytes(&entry_name, &content))
            .map_err(|err| VgError::Filesystem(err.to_string()))
    }
}

pub fn zip_bytes(name: &str, content: &[u8]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    writer.start_file(name, options).unwrap();
    writer.write_all(content).unwrap();
    writer.finish().unwrap().into_inner()
}

pub fn sample_image(value: u64) -> ImageRegions {
    let image_id = id(value);
    ImageRegions {
        image: ImageHeader {
            id: image_id,
            width: 800,
            height: 600,
            coco_id: Some(value * 10),
            flickr_id: None,
            url: format!("https://cs.stanford.edu/people/rak248/VG_100K/{value}.jpg"),
        },
        regions: (0..3)
            .map(|i| Region {
                id: value * 100 + i,
                image_id,
                x: i as i64 * 10,
                y: 5,
                width: 20,
                height: 30,
                phrase: format!("region {i} of image {value}"),
                object_ids: Vec::new(),
            })
            .collect(),
    }
}

pub fn scene_graph_json(image_id: ImageId) -> Value {
    json!({
        "image_id": image_id,
        "objects": [{ "object_id": image_id.get() * 7, "names": ["dog"] }],
        "relationships": [],
    })
}
