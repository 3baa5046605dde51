//! Encoded polyline decoding (precision 1e5).

use safe_steps_grid_models::GeoPoint;

use crate::DirectionsError;

const PRECISION: f64 = 1e5;

/// Decodes an encoded polyline into `(lat, lng)` points.
///
/// # Errors
///
/// Returns [`DirectionsError::Polyline`] on characters outside the
/// encoding alphabet, a truncated value, an unpaired latitude, or a
/// coordinate that overflows.
pub fn decode_polyline(encoded: &str) -> Result<Vec<GeoPoint>, DirectionsError> {
    let bytes = encoded.as_bytes();
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;
    let mut points = Vec::new();

    while index < bytes.len() {
        lat = accumulate(lat, next_delta(bytes, &mut index)?, index)?;
        if index >= bytes.len() {
            return Err(DirectionsError::Polyline {
                position: index,
                message: "latitude without longitude".to_string(),
            });
        }
        lng = accumulate(lng, next_delta(bytes, &mut index)?, index)?;

        #[allow(clippy::cast_precision_loss)]
        points.push(GeoPoint::new(lat as f64 / PRECISION, lng as f64 / PRECISION));
    }

    Ok(points)
}

fn accumulate(total: i64, delta: i64, position: usize) -> Result<i64, DirectionsError> {
    total
        .checked_add(delta)
        .ok_or_else(|| DirectionsError::Polyline {
            position,
            message: "coordinate overflow".to_string(),
        })
}

fn next_delta(bytes: &[u8], index: &mut usize) -> Result<i64, DirectionsError> {
    let mut result: i64 = 0;
    let mut shift = 0;

    loop {
        let Some(&byte) = bytes.get(*index) else {
            return Err(DirectionsError::Polyline {
                position: *index,
                message: "truncated value".to_string(),
            });
        };
        if !(63..=126).contains(&byte) {
            return Err(DirectionsError::Polyline {
                position: *index,
                message: format!("unexpected character {:?}", char::from(byte)),
            });
        }
        if shift > 60 {
            return Err(DirectionsError::Polyline {
                position: *index,
                message: "value overflow".to_string(),
            });
        }
        *index += 1;

        let chunk = i64::from(byte - 63);
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
    }

    Ok(if result & 1 == 0 {
        result >> 1
    } else {
        !(result >> 1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(p: &GeoPoint, lat: f64, lng: f64) {
        assert!((p.lat - lat).abs() < 1e-9, "lat {} != {lat}", p.lat);
        assert!((p.lng - lng).abs() < 1e-9, "lng {} != {lng}", p.lng);
    }

    #[test]
    fn decodes_reference_polyline() {
        let points = decode_polyline("_p~iF~ps|U_ulLnnqC_mqNvxq`@").unwrap();
        assert_eq!(points.len(), 3);
        assert_close(&points[0], 38.5, -120.2);
        assert_close(&points[1], 40.7, -120.95);
        assert_close(&points[2], 43.252, -126.453);
    }

    #[test]
    fn empty_polyline_has_no_points() {
        assert!(decode_polyline("").unwrap().is_empty());
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(matches!(
            decode_polyline("_p~iF~ps|"),
            Err(DirectionsError::Polyline { .. })
        ));
        assert!(matches!(
            decode_polyline("_p~iF"),
            Err(DirectionsError::Polyline { .. })
        ));
    }

    #[test]
    fn rejects_accumulated_overflow() {
        // One near-maximal positive delta, repeated until the latitude sum overflows.
        let huge = format!("}}{}F", "~".repeat(11));
        assert!(matches!(
            decode_polyline(&huge.repeat(6)),
            Err(DirectionsError::Polyline { message, .. }) if message == "coordinate overflow"
        ));
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(matches!(
            decode_polyline("_p~iF ps|U"),
            Err(DirectionsError::Polyline { .. })
        ));
    }
}
