use rand::Rng;

use crate::api::VgApi;
use crate::catalog;
use crate::domain::{ImageId, ImageRegions, Record};
use crate::error::VgError;
use crate::source::RecordSource;

/// Fetches every record from the dataset API: one region call per image,
/// plus a scene-graph call when enabled.
pub struct RemoteSource<A: VgApi> {
    api: A,
    ids: Vec<ImageId>,
    include_scene_graphs: bool,
}

impl<A: VgApi> RemoteSource<A> {
    /// `None` means every image the API lists.
    pub fn new(api: A, ids: Option<Vec<ImageId>>) -> Result<Self, VgError> {
        let ids = match ids {
            Some(ids) => ids,
            None => catalog::all_image_ids(&api)?,
        };
        Ok(Self {
            api,
            ids,
            include_scene_graphs: false,
        })
    }

    pub fn sample<R: Rng + ?Sized>(api: A, n: usize, rng: &mut R) -> Result<Self, VgError> {
        let all = catalog::all_image_ids(&api)?;
        let ids = catalog::sample_ids(&all, n, rng);
        Self::new(api, Some(ids))
    }

    /// Scene graphs are expensive; off by default.
    pub fn with_scene_graphs(mut self, include: bool) -> Self {
        self.include_scene_graphs = include;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }
}

impl<A: VgApi> RecordSource for RemoteSource<A> {
    fn ids(&self) -> &[ImageId] {
        &self.ids
    }

    fn fetch_record(&self, id: ImageId) -> Result<Record, VgError> {
        tracing::debug!(%id, "fetching remote record");
        let ImageRegions { image, regions } = self
            .api
            .fetch_image_regions(id)
            .map_err(|err| record_error(id, err))?;
        let scene_graph = if self.include_scene_graphs {
            Some(
                self.api
                    .fetch_scene_graph(id)
                    .map_err(|err| record_error(id, err))?,
            )
        } else {
            None
        };
        Ok(Record {
            image,
            regions,
            scene_graph,
        })
    }
}

pub(crate) fn record_error(id: ImageId, cause: VgError) -> VgError {
    VgError::RecordFetch {
        id,
        cause: cause.to_string(),
    }
}
