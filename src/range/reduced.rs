use std::collections::HashMap;

use crate::error::{GridIndexError, Result};
use crate::fraction::Fraction;
use crate::range::regular::crop_window;
use crate::range::{Range, RangeKind};

/// Number of points per latitude row of an octahedral reduced Gaussian grid with `n` latitudes per
/// hemisphere: `20, 24, ..., 16 + 4n` from the north pole to the equator, mirrored southwards.
pub fn octahedral_pl(n: usize) -> Vec<usize> {
    let north: Vec<usize> = (0..n).map(|j| 20 + 4 * j).collect();
    north.iter().chain(north.iter().rev()).copied().collect()
}

/// Crop the longitude rows of a reduced grid to `[west, east]`.
///
/// Rows with different increments snap the window differently. Every distinct row shape is cropped
/// first, and all rows are then cropped again to the narrowest window shared by those results, so
/// every returned row lies within the same bounds. A row with no value in that window yields
/// `None`. A row whose crop still covers the whole row stays periodic.
///
/// A window within the rows' tolerance of a full period keeps every row as it is.
pub fn crop_rows(rows: &[Range], west: f64, east: f64) -> Result<Vec<Option<Range>>> {
    if let Some(row) = rows
        .iter()
        .find(|r| r.kind() != RangeKind::RegularLongitude)
    {
        return Err(GridIndexError::Construction(format!(
            "reduced rows must be regular longitude ranges, got {:?}",
            row.kind()
        )));
    }

    let eps = rows.iter().map(|r| r.eps()).fold(0., f64::max);
    if west > east + eps {
        return Err(GridIndexError::Construction(format!(
            "crop bounds [{}, {}] are not ordered",
            west, east
        )));
    }

    if east - west >= 360. - eps {
        return Ok(rows.iter().cloned().map(Some).collect());
    }

    // each distinct row shape once
    let mut shapes: HashMap<(Fraction, Fraction, usize), Option<Range>> = HashMap::new();
    for row in rows {
        let key = (row.increment(), row.first_fraction(), row.size());
        if !shapes.contains_key(&key) {
            let cropped = crop_window(&ascending(row), west, east)?;
            shapes.insert(key, cropped);
        }
    }

    let mut window: Option<(Fraction, Fraction)> = None;
    for cropped in shapes.values().flatten() {
        let (first, last) = (cropped.first_fraction(), cropped.last_fraction());
        window = Some(match window {
            None => (first, last),
            Some((w, e)) => (w.max(first), e.min(last)),
        });
    }

    let Some((w, e)) = window else {
        return Ok(vec![None; rows.len()]);
    };
    if w > e {
        return Err(GridIndexError::NotImplemented(format!(
            "rows cropped to [{}, {}] share no common window",
            west, east
        )));
    }

    let (w, e) = (w.to_f64(), e.to_f64());
    rows.iter()
        .map(|row| crop_window(&ascending(row), w, e))
        .collect()
}

fn ascending(row: &Range) -> Range {
    if row.is_descending() {
        row.flip()
    } else {
        row.clone()
    }
}
