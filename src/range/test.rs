use std::sync::Arc;

use crate::error::GridIndexError;
use crate::fraction::Fraction;
use crate::range::{
    crop_rows, gaussian_latitudes, monotonic_crop, octahedral_pl, Endpoints, LatitudeCache,
    Range, RangeKind,
};

fn assert_values(range: &Range, expected: &[f64]) {
    let values = range.values();
    assert_eq!(values.len(), expected.len(), "{:?}", values);
    for (v, e) in values.iter().zip(expected) {
        assert!((v - e).abs() < 1e-12, "{:?} != {:?}", values, expected);
    }
}

#[test]
fn periodic_longitudes() {
    for n in [1, 4, 360, 1440, 3600] {
        let range = Range::regular_longitude(n, 0., 360., 0.).unwrap();
        assert!(range.periodic());
        assert_eq!(range.endpoints(), Endpoints::OpenEnd);
        assert_eq!(range.values().len(), n);
        assert_eq!(range.increment(), Fraction::new(360, n as i64).unwrap());
        assert_eq!(range.first(), 0.);
    }

    // closed, with the last value one increment before the wrap
    let range = Range::regular_longitude(3600, 0., 359.9, 0.).unwrap();
    assert!(range.periodic());
    assert_eq!(range.endpoints(), Endpoints::Closed);

    let range = Range::regular_longitude(3599, 0., 359.8, 0.).unwrap();
    assert!(!range.periodic());

    let range = Range::regular_latitude(181, 90., -90., 0.).unwrap();
    assert!(!range.periodic());
}

#[test]
fn values_are_snapped_through_fractions() {
    let range = Range::regular_longitude(3600, 0., 360., 0.).unwrap();
    let values = range.values();
    assert_eq!(values[1234], 123.4);
    assert_eq!(values[3599], 359.9);

    let range = Range::regular_cartesian(5, 0., 1., 0.).unwrap();
    assert_eq!(range.values(), &[0., 0.25, 0.5, 0.75, 1.]);
    assert!(!range.periodic());
}

#[test]
fn values_are_cached() {
    let range = Range::regular_latitude(11, 0., 10., 0.).unwrap();
    let first = range.values().as_ptr();
    assert!(std::ptr::eq(first, range.values().as_ptr()));
}

#[test]
fn construction_errors() {
    assert!(matches!(
        Range::regular_longitude(0, 0., 360., 0.),
        Err(GridIndexError::Construction(_))
    ));
    assert!(matches!(
        Range::regular_longitude(4, 0., 360., -1.),
        Err(GridIndexError::Construction(_))
    ));
    assert!(matches!(
        Range::regular_latitude(10, 0., 91., 0.),
        Err(GridIndexError::Construction(_))
    ));
    assert!(matches!(
        Range::regular_longitude(10, 0., 400., 0.),
        Err(GridIndexError::Construction(_))
    ));
    assert!(matches!(
        Range::regular_cartesian(1, 0., 1., 0.),
        Err(GridIndexError::Construction(_))
    ));
    assert!(matches!(
        Range::gaussian_latitude(0, false, 0.),
        Err(GridIndexError::Construction(_))
    ));

    assert!(Range::regular_cartesian(1, 2., 2., 0.).is_ok());
    assert!(Range::regular_latitude(3, 90.000001, -90., 1e-3).is_ok());
}

#[test]
fn repeated_bound_needs_a_single_value() {
    assert!(matches!(
        Range::regular_longitude(5, 0., 0., 0.),
        Err(GridIndexError::Construction(_))
    ));
    assert!(matches!(
        Range::regular_cartesian(2, 3., 3., 0.),
        Err(GridIndexError::Construction(_))
    ));
    assert_values(&Range::regular_longitude(1, 0., 0., 0.).unwrap(), &[0.]);
}

#[test]
fn unrepresentable_span_fails_to_construct() {
    assert!(matches!(
        Range::regular_cartesian(3, -9e18, 9e18, 0.),
        Err(GridIndexError::Construction(_))
    ));

    let wide = Range::regular_cartesian(3, -4e18, 4e18, 0.).unwrap();
    assert_values(&wide, &[-4e18, 0., 4e18]);
}

#[test]
fn crop_periodic_longitude() {
    let range = Range::regular_longitude(36, 0., 360., 0.).unwrap();
    let cropped = range.crop(10., 20.).unwrap();
    assert!(!cropped.periodic());
    assert_values(&cropped, &[10., 20.]);

    let range = Range::regular_longitude(3600, 0., 360., 0.).unwrap();
    let cropped = range.crop(10., 20.).unwrap();
    assert!(!cropped.periodic());
    assert_eq!(cropped.size(), 101);
    assert_eq!(cropped.first(), 10.);
    assert_eq!(cropped.last(), 20.);
    assert_eq!(cropped.increment(), range.increment());

    // bounds snap inwards
    let cropped = range.crop(10.05, 19.95).unwrap();
    assert_eq!(cropped.first(), 10.1);
    assert_eq!(cropped.last(), 19.9);
    assert!(cropped.first() >= 10.05 && cropped.last() <= 19.95);

    // windows across the meridian
    let range = Range::regular_longitude(36, 0., 360., 0.).unwrap();
    let cropped = range.crop(-20., 20.).unwrap();
    assert_values(&cropped, &[-20., -10., 0., 10., 20.]);

    // a window covering every value is periodic again
    let cropped = range.crop(-180., 180.).unwrap();
    assert!(cropped.periodic());
    assert_eq!(cropped.size(), 36);
    assert_eq!(cropped.first(), -180.);

    let cropped = range.crop(5., 355.).unwrap();
    assert!(!cropped.periodic());
    assert_eq!(cropped.size(), 35);
}

#[test]
fn crop_null_width_periodic_is_not_implemented() {
    let range = Range::regular_longitude(4, 0., 360., 0.).unwrap();
    assert!(matches!(
        range.crop(10., 20.),
        Err(GridIndexError::NotImplemented(_))
    ));
}

#[test]
fn crop_regional_longitude() {
    let range = Range::regular_longitude(35, 0., 340., 0.).unwrap();
    assert!(!range.periodic());

    assert!(matches!(
        range.crop(330., 370.),
        Err(GridIndexError::NotImplemented(_))
    ));

    // 360 is 0 on this axis
    let cropped = range.crop(350., 360.).unwrap();
    assert_values(&cropped, &[0.]);

    let cropped = range.crop(-5., 5.).unwrap();
    assert_values(&cropped, &[0.]);

    let cropped = range.crop(695., 705.).unwrap();
    assert_values(&cropped, &[340.]);

    // [-30, 5] is [330, 365], holding 330, 340 and 0
    assert!(matches!(
        range.crop(-30., 5.),
        Err(GridIndexError::NotImplemented(_))
    ));

    assert!(matches!(
        range.crop(342., 348.),
        Err(GridIndexError::Construction(_))
    ));
}

#[test]
fn crop_descending_latitude() {
    let range = Range::regular_latitude(181, 90., -90., 0.).unwrap();
    assert!(range.is_descending());

    let cropped = range.crop(45.5, 30.2).unwrap();
    assert_eq!(cropped.size(), 15);
    assert_eq!(cropped.first(), 45.);
    assert_eq!(cropped.last(), 31.);
    assert!(cropped.is_descending());

    let single = range.crop(30., 30.).unwrap();
    assert_values(&single, &[30.]);

    assert!(matches!(
        range.crop(30., 45.),
        Err(GridIndexError::Construction(_))
    ));
    assert!(matches!(
        range.crop(95., 92.),
        Err(GridIndexError::Construction(_))
    ));
}

#[test]
fn crop_within_tolerance() {
    let range = Range::regular_latitude(181, -90., 90., 1e-6).unwrap();
    let cropped = range.crop(9.9999999, 20.0000001).unwrap();
    assert_eq!(cropped.first(), 10.);
    assert_eq!(cropped.last(), 20.);

    let cropped = range.crop(10.0000001, 9.9999999).unwrap();
    assert_values(&cropped, &[10.]);
}

#[test]
fn flip_twice_restores_values() {
    let ranges = vec![
        Range::regular_longitude(36, 0., 360., 0.).unwrap(),
        Range::regular_longitude(4, 360., 0., 0.).unwrap(),
        Range::regular_latitude(7, -90., 90., 0.).unwrap(),
        Range::regular_cartesian(1, 3., 3., 0.).unwrap(),
        Range::gaussian_latitude(8, false, 0.).unwrap(),
    ];

    for range in ranges {
        let flipped = range.flip();
        let reversed: Vec<f64> = range.values().iter().rev().copied().collect();
        assert_eq!(flipped.values(), reversed.as_slice());
        assert_eq!(flipped.periodic(), range.periodic());

        let restored = flipped.flip();
        assert_eq!(restored.values(), range.values());
        assert_eq!(restored.endpoints(), range.endpoints());
    }
}

#[test]
fn flip_reclassifies_open_end() {
    let range = Range::regular_longitude(4, 0., 360., 0.).unwrap();
    let flipped = range.flip();
    assert_eq!(flipped.endpoints(), Endpoints::OpenStart);
    assert!(flipped.periodic());
    assert_eq!(flipped.values(), &[270., 180., 90., 0.]);

    // flipping before values are materialized computes the same values
    let fresh = Range::regular_longitude(4, 0., 360., 0.).unwrap().flip();
    assert_eq!(fresh.values(), &[270., 180., 90., 0.]);
}

#[test]
fn gaussian_latitudes_n64() {
    let lats = gaussian_latitudes(64, false);
    assert_eq!(lats.len(), 128);

    let expected_north = [
        (0, 88.9277),
        (1, 87.5387),
        (2, 86.1415),
        (10, 74.94),
        (32, 44.1241),
        (43, 28.7157),
        (62, 2.10115),
        (63, 0.700384),
    ];
    for (i, lat) in expected_north {
        assert!((lats[i] - lat).abs() < 1e-4, "{} {}", lats[i], lat);
        assert!((lats[127 - i] + lat).abs() < 1e-4);
    }

    assert!(lats.windows(2).all(|w| w[0] > w[1]));
    for i in 0..64 {
        assert!((lats[i] + lats[127 - i]).abs() < 1e-12);
    }

    let increasing = gaussian_latitudes(64, true);
    assert!(increasing.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(increasing[0], lats[127]);
}

#[test]
fn gaussian_range() {
    let range = Range::gaussian_latitude(64, false, 1e-9).unwrap();
    assert_eq!(range.kind(), RangeKind::GaussianLatitude { n: 64 });
    assert_eq!(range.size(), 128);
    assert!(!range.periodic());
    assert!(range.is_descending());
    assert!(range.includes_north_pole());
    assert!(range.includes_south_pole());
    assert_eq!(range.values(), gaussian_latitudes(64, false).as_slice());

    let cropped = range.crop(30., -30.).unwrap();
    assert_eq!(cropped.size(), 42);
    assert!((cropped.first() - 28.7157).abs() < 1e-4);
    assert!((cropped.last() + 28.7157).abs() < 1e-4);
    assert!(!cropped.includes_north_pole());
    assert!(!cropped.includes_south_pole());

    let increasing = Range::gaussian_latitude(64, true, 1e-9).unwrap();
    let cropped_increasing = increasing.crop(-30., 30.).unwrap();
    assert_eq!(cropped_increasing.size(), 42);
    let reversed: Vec<f64> = cropped.values().iter().rev().copied().collect();
    assert_eq!(cropped_increasing.values(), reversed.as_slice());

    let north = range.crop(90., 80.).unwrap();
    assert!(north.includes_north_pole());
    assert!(!north.includes_south_pole());

    assert!(matches!(
        range.crop(0.1, -0.1),
        Err(GridIndexError::Construction(_))
    ));
}

#[test]
fn latitude_cache_footprint() {
    let cache = Arc::new(LatitudeCache::new());
    assert_eq!(cache.footprint(), 0);

    for (n, footprint) in [(16, 256), (24, 640), (24, 640), (32, 1152), (16, 1152)] {
        cache.latitudes(n);
        assert_eq!(cache.footprint(), footprint);
    }

    let range = Range::gaussian_latitude_with_cache(48, true, 0., cache.clone()).unwrap();
    assert_eq!(cache.footprint(), 1152 + 768);
    assert_eq!(range.values().len(), 96);

    cache.purge();
    assert_eq!(cache.footprint(), 0);
}

#[test]
fn poles() {
    let range = Range::regular_latitude(181, 90., -90., 0.).unwrap();
    assert!(range.includes_north_pole());
    assert!(range.includes_south_pole());

    let range = Range::regular_latitude(4, 89., 84.5, 0.).unwrap();
    assert!(range.includes_north_pole());
    assert!(!range.includes_south_pole());

    let range = Range::regular_latitude(3, 87., 85., 0.).unwrap();
    assert!(!range.includes_north_pole());

    let range = Range::regular_longitude(4, 0., 360., 0.).unwrap();
    assert!(!range.includes_north_pole());
}

#[test]
fn from_increment() {
    let range = Range::longitude_from_increment(1., 0., 360., 0., 0.).unwrap();
    assert_eq!(range.size(), 360);
    assert!(range.periodic());

    let range = Range::longitude_from_increment(0.5, -10.2, 10.2, 0., 0.).unwrap();
    assert_eq!(range.size(), 41);
    assert_eq!(range.first(), -10.);
    assert_eq!(range.last(), 10.);

    let range = Range::longitude_from_increment(1., 0.3, 10., 0.5, 0.).unwrap();
    assert_eq!(range.size(), 10);
    assert_eq!(range.first(), 0.5);
    assert_eq!(range.last(), 9.5);

    let range = Range::latitude_from_increment(1., -90., 90., 0., 0.).unwrap();
    assert_eq!(range.size(), 181);
    assert_eq!(range.first(), 90.);
    assert_eq!(range.last(), -90.);

    let range = Range::latitude_from_increment(0.25, -10.1, 10.1, 0., 0.).unwrap();
    assert_eq!(range.first(), 10.);
    assert_eq!(range.last(), -10.);
    assert_eq!(range.size(), 81);

    assert!(Range::latitude_from_increment(1., 10., -10., 0., 0.).is_err());
}

#[test]
fn monotonic_crop_windows() {
    let tests: [(f64, f64, (usize, usize), Vec<f64>); 4] = [
        (1., 1., (0, 1), vec![1.]),
        (1., 2., (0, 3), vec![1., 1., 1.]),
        (2., 3., (1, 3), vec![1., 2., 3., 4., 5., 6.]),
        (2., 3., (3, 5), vec![6., 5., 4., 3., 2., 1.]),
    ];

    for (min, max, expected, values) in tests {
        assert_eq!(monotonic_crop(&values, min, max, 0.), expected);
    }
}

#[test]
fn octahedral_counts() {
    assert_eq!(
        octahedral_pl(16),
        vec![
            20, 24, 28, 32, 36, 40, 44, 48, 52, 56, 60, 64, 68, 72, 76, 80, 80, 76, 72, 68, 64,
            60, 56, 52, 48, 44, 40, 36, 32, 28, 24, 20
        ]
    );
}

#[test]
fn reduced_crop_uses_narrowest_window() {
    let rows: Vec<Range> = octahedral_pl(16)
        .into_iter()
        .map(|pl| Range::regular_longitude(pl, 0., 360., 1e-9).unwrap())
        .collect();

    let cropped = crop_rows(&rows, 0., 30.).unwrap();
    assert_eq!(cropped.len(), rows.len());

    for row in cropped.iter() {
        let row = row.as_ref().unwrap();
        assert_eq!(row.first(), 0.);
        assert!(row.last() <= 18. + 1e-9);
        assert!(!row.periodic());
    }

    // the 20 point row (18 degrees) limits every other row
    assert_values(cropped[0].as_ref().unwrap(), &[0., 18.]);
    assert_values(cropped[1].as_ref().unwrap(), &[0., 15.]);
    assert_values(cropped[15].as_ref().unwrap(), &[0., 4.5, 9., 13.5, 18.]);
}

#[test]
fn reduced_crop_edge_cases() {
    let rows = vec![
        Range::regular_longitude(4, 0., 360., 1e-9).unwrap(),
        Range::regular_longitude(36, 0., 360., 1e-9).unwrap(),
    ];

    // near-global windows keep rows untouched
    let cropped = crop_rows(&rows, -180., 180.).unwrap();
    assert_eq!(cropped[0].as_ref().unwrap().size(), 4);
    assert_eq!(cropped[1].as_ref().unwrap().size(), 36);

    // rows without a value in the window are empty
    let cropped = crop_rows(&rows, 10., 20.).unwrap();
    assert!(cropped[0].is_none());
    assert_values(cropped[1].as_ref().unwrap(), &[10., 20.]);

    // a crop covering a whole row keeps it periodic
    let rows = vec![Range::regular_longitude(4, 0., 360., 1e-9).unwrap()];
    let cropped = crop_rows(&rows, 0., 300.).unwrap();
    let row = cropped[0].as_ref().unwrap();
    assert!(row.periodic());
    assert_eq!(row.size(), 4);

    let lat = vec![Range::regular_latitude(3, 0., 10., 0.).unwrap()];
    assert!(crop_rows(&lat, 0., 10.).is_err());
}
