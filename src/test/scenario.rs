use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::grid::{GridPointSource, ReducedGaussianGrid, RegularGrid, UnstructuredPoints};
use crate::point::PointLonLat;
use crate::search::{
    BackendRegistry, MappedFileBackend, Search, SearchConfig, MAPPED_FILE_LOADER,
};
use crate::test::{brute_force, four_by_four, EPS};
use crate::GridIndexError;

fn private() -> SearchConfig {
    SearchConfig {
        caching: false,
        ..Default::default()
    }
}

fn mapped(root: &std::path::Path) -> SearchConfig {
    SearchConfig {
        loader: MAPPED_FILE_LOADER.to_string(),
        cache_root: root.to_path_buf(),
        lock_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

#[test]
fn four_by_four_end_to_end() {
    let grid = four_by_four();
    let registry = BackendRegistry::with_defaults();
    let search = Search::open_with(&registry, &grid, &private()).unwrap();

    let points: Vec<PointLonLat> = grid.points().collect();
    assert_eq!(points[5], PointLonLat::new(90., -30.));
    assert_eq!(search.nearest(&points[5]).unwrap().unwrap().index, 5);

    // centre of the cell between longitudes 0 and 90, latitudes -30 and 30
    let mid = PointLonLat::new(45., 0.);
    let found = search.k_nearest(&mid, 3).unwrap();
    let indices: Vec<usize> = found.iter().map(|n| n.index).collect();
    assert_eq!(indices, brute_force(&grid, &mid, 3));
    assert!(indices.iter().all(|i| [4, 5, 8, 9].contains(i)));
    assert!(found.windows(2).all(|w| w[0].distance <= w[1].distance));
}

#[test]
fn every_point_finds_itself() {
    let registry = BackendRegistry::with_defaults();
    let grids: Vec<Box<dyn GridPointSource>> = vec![
        Box::new(four_by_four()),
        Box::new(RegularGrid::global(7.5, EPS).unwrap()),
        Box::new(ReducedGaussianGrid::octahedral(8, EPS).unwrap()),
    ];

    for grid in &grids {
        let search = Search::open_with(&registry, grid.as_ref(), &private()).unwrap();
        for (i, p) in grid.points().enumerate() {
            let found = search.nearest(&p).unwrap().unwrap();
            assert_eq!(found.index, i, "self query of {:?}", p);
            assert_eq!(found.distance, 0.);
        }
    }
}

#[test]
fn single_neighbour_is_nearest() {
    let grid = ReducedGaussianGrid::octahedral(16, EPS).unwrap();
    let registry = BackendRegistry::with_defaults();
    let search = Search::open_with(&registry, &grid, &private()).unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..500 {
        let p = PointLonLat::new(rng.gen_range(-180. ..540.), rng.gen_range(-90. ..=90.));
        let nearest = search.nearest(&p).unwrap().unwrap();
        assert_eq!(search.k_nearest(&p, 1).unwrap(), vec![nearest]);
        assert_eq!(nearest.index, brute_force(&grid, &p, 1)[0]);
    }
}

#[test]
fn k_nearest_matches_brute_force() {
    let grid = RegularGrid::global(5., EPS).unwrap();
    let registry = BackendRegistry::with_defaults();
    let search = Search::open_with(&registry, &grid, &private()).unwrap();

    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..100 {
        let p = PointLonLat::new(rng.gen_range(0. ..360.), rng.gen_range(-90. ..=90.));
        let k = rng.gen_range(2..20);
        let indices: Vec<usize> = search
            .k_nearest(&p, k)
            .unwrap()
            .iter()
            .map(|n| n.index)
            .collect();
        assert_eq!(indices, brute_force(&grid, &p, k));
    }
}

#[test]
fn cropped_grid_search() {
    let grid = RegularGrid::global(1., EPS).unwrap();
    let cropped = grid.crop(60., -10., 30., 40.).unwrap();
    assert_eq!(cropped.longitudes().first(), -10.);
    assert_eq!(cropped.size(), 51 * 31);

    let registry = BackendRegistry::with_defaults();
    let search = Search::open_with(&registry, &cropped, &private()).unwrap();

    // a point east of the crop snaps to its border
    let found = search.nearest(&PointLonLat::new(41., 45.)).unwrap().unwrap();
    let points: Vec<PointLonLat> = cropped.points().collect();
    assert_eq!(points[found.index], PointLonLat::new(40., 45.));
}

#[test]
fn second_open_builds_nothing() {
    let grid = RegularGrid::global(2., EPS).unwrap();
    let registry = BackendRegistry::with_defaults();
    let config = SearchConfig::default();

    let first = Search::open_with(&registry, &grid, &config).unwrap();
    assert_eq!(first.stats().builds, 1);
    let footprint = registry.trees().footprint();
    assert!(footprint > 0);

    let second = Search::open_with(&registry, &grid, &config).unwrap();
    assert_eq!(second.stats().builds, 0);
    assert_eq!(second.stats().skipped_builds, 1);
    assert_eq!(registry.trees().footprint(), footprint);

    let p = PointLonLat::new(33., -12.);
    assert_eq!(
        first.nearest(&p).unwrap().unwrap(),
        second.nearest(&p).unwrap().unwrap()
    );
}

#[test]
fn concurrent_opens_build_once() {
    let grid = RegularGrid::global(1., EPS).unwrap();
    let registry = BackendRegistry::with_defaults();
    let config = SearchConfig::default();
    let builds = AtomicU64::new(0);

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let search = Search::open_with(&registry, &grid, &config).unwrap();
                builds.fetch_add(search.stats().builds, Ordering::Relaxed);
                assert!(search.nearest(&PointLonLat::new(1., 1.)).unwrap().is_some());
            });
        }
    });

    assert_eq!(builds.load(Ordering::Relaxed), 1);
    assert_eq!(registry.trees().len(), 1);
}

#[test]
fn mapped_file_survives_the_registry() {
    let dir = tempfile::tempdir().unwrap();
    let config = mapped(dir.path());
    let grid = ReducedGaussianGrid::octahedral(12, EPS).unwrap();

    let first = Search::open_with(&BackendRegistry::with_defaults(), &grid, &config).unwrap();
    assert_eq!(first.backend_name(), MAPPED_FILE_LOADER);
    assert_eq!(first.stats().builds, 1);

    let blob = dir.path().join(format!("{}.kdtree", grid.identity()));
    assert!(blob.exists());

    // a fresh registry stands in for another process
    let second = Search::open_with(&BackendRegistry::with_defaults(), &grid, &config).unwrap();
    assert_eq!(second.stats().builds, 0);
    assert_eq!(second.footprint(), first.footprint());

    let p = PointLonLat::new(-20., 61.);
    assert_eq!(
        first.k_nearest(&p, 4).unwrap(),
        second.k_nearest(&p, 4).unwrap()
    );
}

#[test]
fn lock_file_of_a_dead_builder_is_reused() {
    let dir = tempfile::tempdir().unwrap();
    let config = mapped(dir.path());
    let grid = four_by_four();

    std::fs::write(dir.path().join(format!("{}.lock", grid.identity())), b"4242\n").unwrap();

    let search = Search::open_with(&BackendRegistry::with_defaults(), &grid, &config).unwrap();
    assert_eq!(search.stats().builds, 1);
    assert_eq!(search.nearest(&PointLonLat::new(90., -30.)).unwrap().unwrap().index, 5);
}

#[test]
fn mapped_file_is_rebuilt_when_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let config = mapped(dir.path());
    let grid = four_by_four();

    std::fs::write(
        dir.path().join(format!("{}.kdtree", grid.identity())),
        [0xdb_u8, 1, 0],
    )
    .unwrap();

    let search = Search::open_with(&BackendRegistry::with_defaults(), &grid, &config).unwrap();
    assert_eq!(search.stats().builds, 1);
    assert_eq!(search.nearest(&PointLonLat::new(90., -30.)).unwrap().unwrap().index, 5);
}

#[test]
fn mapped_backend_reports_its_path() {
    let dir = tempfile::tempdir().unwrap();
    let config = mapped(dir.path());
    let grid = four_by_four();
    let registry = BackendRegistry::with_defaults();

    let backend = MappedFileBackend::new(&crate::search::BackendContext {
        identity: grid.identity(),
        config: &config,
        trees: registry.trees().clone(),
        locks: registry.locks().clone(),
    });
    assert_eq!(
        backend.blob_path(),
        dir.path().join(format!("regular-16-{:016x}.kdtree", grid.identity().digest()))
    );
}

#[test]
fn config_from_json() {
    let dir = tempfile::tempdir().unwrap();
    let json = format!(
        r#"{{"loader": "mapped-cache-file", "fast_build": false, "cache_root": {:?}}}"#,
        dir.path()
    );
    let config: SearchConfig = serde_json::from_str(&json).unwrap();

    let points = UnstructuredPoints::from(vec![(0., 0.), (120., 45.), (240., -45.)]);
    let search = Search::open_with(&BackendRegistry::with_defaults(), &points, &config).unwrap();
    assert_eq!(
        search.nearest(&PointLonLat::new(118., 40.)).unwrap().unwrap().index,
        1
    );
}

#[test]
fn unknown_loader_fails_before_building() {
    let config = SearchConfig {
        loader: "s3".to_string(),
        ..Default::default()
    };
    assert!(matches!(
        Search::open_with(&BackendRegistry::with_defaults(), &four_by_four(), &config),
        Err(GridIndexError::Config(_))
    ));
}
