use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::VgError;

/// Visual Genome image identifier. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct ImageId(u64);

impl ImageId {
    pub fn new(value: u64) -> Result<Self, VgError> {
        if value == 0 {
            return Err(VgError::InvalidImageId(value.to_string()));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for ImageId {
    type Error = VgError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ImageId> for u64 {
    fn from(id: ImageId) -> Self {
        id.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ImageId {
    type Err = VgError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parsed = value
            .trim()
            .parse::<u64>()
            .map_err(|_| VgError::InvalidImageId(value.to_string()))?;
        Self::new(parsed).map_err(|_| VgError::InvalidImageId(value.to_string()))
    }
}

/// Image metadata. The API spells the key `id`, the bundle spells it
/// `image_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHeader {
    #[serde(alias = "image_id")]
    pub id: ImageId,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub coco_id: Option<u64>,
    #[serde(default)]
    pub flickr_id: Option<u64>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    #[serde(alias = "region_id")]
    pub id: u64,
    #[serde(alias = "image")]
    pub image_id: ImageId,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub phrase: String,
    #[serde(default)]
    pub object_ids: Vec<u64>,
}

/// Scene graph payload. Passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneGraph(pub Value);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub image: ImageHeader,
    pub regions: Vec<Region>,
    pub scene_graph: Option<SceneGraph>,
}

impl Record {
    pub fn id(&self) -> ImageId {
        self.image.id
    }
}

/// Header plus regions for one image, as returned by a single region
/// lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRegions {
    pub image: ImageHeader,
    pub regions: Vec<Region>,
}

/// Bulk archives published alongside the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    ImageData,
    RegionDescriptions,
    SceneGraphs,
    Synsets,
}

impl Resource {
    pub const ALL: [Resource; 4] = [
        Resource::ImageData,
        Resource::RegionDescriptions,
        Resource::SceneGraphs,
        Resource::Synsets,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Resource::ImageData => "image_data",
            Resource::RegionDescriptions => "region_descriptions",
            Resource::SceneGraphs => "scene_graphs",
            Resource::Synsets => "synsets",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.json", self.name())
    }

    pub fn archive_url(self, dataset_base: &str) -> String {
        format!(
            "{}/{}.json.zip",
            dataset_base.trim_end_matches('/'),
            self.name()
        )
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
