mod common;

use std::collections::HashSet;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use vg_records::cache::{CacheBuilder, StepOutcome};
use vg_records::catalog;
use vg_records::domain::Resource;
use vg_records::error::VgError;

use common::{MockApi, id, ids};

fn temp_root(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().join("data")).unwrap()
}

#[test]
fn first_build_downloads_everything_and_second_is_a_noop() {
    let temp = tempfile::tempdir().unwrap();
    let api = MockApi::new(&[1, 3, 5, 42]);
    let builder = CacheBuilder::new(temp_root(&temp), &api);

    let first = builder.ensure().unwrap();
    assert!(first.steps.iter().all(|step| step.outcome == StepOutcome::Built));
    assert_eq!(api.count("archive:"), 4);
    assert_eq!(api.count("ids"), 1);

    let calls_before = api.call_count();
    let second = builder.ensure().unwrap();
    assert!(second.is_noop());
    assert_eq!(api.call_count(), calls_before);
}

#[test]
fn layout_matches_the_documented_contract() {
    let temp = tempfile::tempdir().unwrap();
    let api = MockApi::new(&[1, 42]);
    let builder = CacheBuilder::new(temp_root(&temp), &api);
    builder.ensure().unwrap();

    let layout = builder.layout();
    for resource in Resource::ALL {
        assert!(layout.resource_path(resource).as_std_path().is_file());
    }
    assert!(layout.scene_graph_path(id(1)).as_std_path().is_file());
    assert!(layout.scene_graph_path(id(42)).as_std_path().is_file());
    assert_eq!(
        catalog::load_image_ids(&layout.image_ids_path()).unwrap(),
        ids(&[1, 42])
    );

    let status = builder.status();
    assert!(status.is_complete());
    assert!(status.entries.iter().all(|entry| entry.provenance.is_some()));
}

#[test]
fn scene_graphs_are_split_one_file_per_image() {
    let temp = tempfile::tempdir().unwrap();
    let api = MockApi::new(&[7, 8]);
    let builder = CacheBuilder::new(temp_root(&temp), &api);
    builder.ensure().unwrap();

    let graph = builder.load_cached_scene_graph(id(8)).unwrap().unwrap();
    assert_eq!(graph.0, common::scene_graph_json(id(8)));
    assert!(builder.load_cached_scene_graph(id(9)).unwrap().is_none());
}

#[test]
fn failed_download_leaves_no_partial_resource() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp_root(&temp);
    let api = MockApi::new(&[1, 2]);
    api.fail_archive(Some(Resource::Synsets));
    let builder = CacheBuilder::new(root.clone(), &api);

    let err = builder.ensure().unwrap_err();
    assert_matches!(err, VgError::CacheBuild { resource, .. } if resource == "synsets");

    let layout = builder.layout();
    assert!(!layout.resource_path(Resource::Synsets).as_std_path().exists());
    assert!(layout.resource_path(Resource::ImageData).as_std_path().exists());
    let leftovers: Vec<_> = std::fs::read_dir(root.as_std_path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with(".vg-"))
        .collect();
    assert!(leftovers.is_empty(), "staging left behind: {leftovers:?}");

    api.fail_archive(None);
    let report = builder.ensure().unwrap();
    assert_eq!(
        report.built(),
        vec!["synsets", "scene_graphs_by_id", "all_image_ids"]
    );
    assert_eq!(api.count("archive:image_data"), 1);
}

#[test]
fn index_holds_exactly_the_requested_ids_present_in_the_bundle() {
    let temp = tempfile::tempdir().unwrap();
    let api = MockApi::new(&[1, 2, 3, 4, 5]);
    let builder = CacheBuilder::new(temp_root(&temp), &api);
    builder.ensure().unwrap();

    let wanted: HashSet<_> = ids(&[2, 4, 999]).into_iter().collect();
    let index = builder.build_index(Some(&wanted)).unwrap();

    assert_eq!(index.len(), 2);
    assert!(index.contains(id(2)));
    assert!(index.contains(id(4)));
    assert!(!index.contains(id(1)));
    assert!(!index.contains(id(999)));

    let entry = index.get(id(4)).unwrap();
    assert_eq!(entry.image.coco_id, Some(40));
    assert_eq!(entry.regions, common::sample_image(4).regions);
}

#[test]
fn unfiltered_index_covers_the_whole_bundle() {
    let temp = tempfile::tempdir().unwrap();
    let api = MockApi::new(&[1, 2, 3]);
    let builder = CacheBuilder::new(temp_root(&temp), &api);
    builder.ensure().unwrap();

    let index = builder.build_index(None).unwrap();
    let mut indexed: Vec<_> = index.ids().collect();
    indexed.sort();
    assert_eq!(indexed, ids(&[1, 2, 3]));
}
