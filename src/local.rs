use std::collections::HashSet;

use camino::Utf8PathBuf;
use rand::Rng;

use crate::api::VgApi;
use crate::cache::{CacheBuilder, CacheIndex, CacheLayout};
use crate::catalog;
use crate::domain::{ImageId, Record};
use crate::error::VgError;
use crate::remote::record_error;
use crate::source::RecordSource;

/// Serves headers and regions from the cached bundle. Scene graphs still
/// come from the API and are never written back.
pub struct LocalSource<A: VgApi> {
    api: A,
    layout: CacheLayout,
    ids: Vec<ImageId>,
    index: CacheIndex,
    include_scene_graphs: bool,
}

impl<A: VgApi> LocalSource<A> {
    /// Ensures the bundle under `data_dir`, then indexes the requested ids.
    /// `None` means every id in the persisted catalog.
    pub fn new(
        api: A,
        ids: Option<Vec<ImageId>>,
        data_dir: impl Into<Utf8PathBuf>,
    ) -> Result<Self, VgError> {
        let builder = CacheBuilder::new(data_dir, api);
        let report = builder.ensure()?;
        tracing::info!(root = %report.root, built = ?report.built(), "local cache ready");

        let ids = match ids {
            Some(ids) => ids,
            None => catalog::load_image_ids(&builder.layout().image_ids_path())?,
        };
        let wanted: HashSet<ImageId> = ids.iter().copied().collect();
        let index = builder.build_index(Some(&wanted))?;
        let layout = builder.layout().clone();

        Ok(Self {
            api: builder.into_api(),
            layout,
            ids,
            index,
            include_scene_graphs: false,
        })
    }

    /// Samples from the persisted catalog, so no id listing call is made
    /// once the cache exists.
    pub fn sample<R: Rng + ?Sized>(
        api: A,
        n: usize,
        rng: &mut R,
        data_dir: impl Into<Utf8PathBuf>,
    ) -> Result<Self, VgError> {
        let data_dir = data_dir.into();
        let builder = CacheBuilder::new(data_dir.clone(), api);
        builder.ensure()?;
        let all = catalog::load_image_ids(&builder.layout().image_ids_path())?;
        let ids = catalog::sample_ids(&all, n, rng);
        Self::new(builder.into_api(), Some(ids), data_dir)
    }

    pub fn with_scene_graphs(mut self, include: bool) -> Self {
        self.include_scene_graphs = include;
        self
    }

    pub fn index(&self) -> &CacheIndex {
        &self.index
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Every id in the persisted catalog, regardless of what this source
    /// iterates over.
    pub fn all_image_ids(&self) -> Result<Vec<ImageId>, VgError> {
        catalog::load_image_ids(&self.layout.image_ids_path())
    }
}

impl<A: VgApi> RecordSource for LocalSource<A> {
    fn ids(&self) -> &[ImageId] {
        &self.ids
    }

    fn fetch_record(&self, id: ImageId) -> Result<Record, VgError> {
        let entry = self.index.get(id).ok_or(VgError::MissingRecord(id))?;
        let scene_graph = if self.include_scene_graphs {
            tracing::debug!(%id, "fetching scene graph");
            Some(
                self.api
                    .fetch_scene_graph(id)
                    .map_err(|err| record_error(id, err))?,
            )
        } else {
            None
        };
        Ok(Record {
            image: entry.image.clone(),
            regions: entry.regions.clone(),
            scene_graph,
        })
    }
}
