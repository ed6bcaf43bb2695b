//! Server payload model.
//!
//! The pathfinding server answers every request with one JSON object
//! carrying the elevation grid, optional aerial imagery parameters, an
//! optional path, and a result code. [`TerrainResponse`] mirrors that
//! object; [`load_response`] reads and validates one from disk.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("Cannot read payload: {0}")]
    FileNotFound(String),
    #[error("Malformed payload JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Grid dimensions must be at least 1x1, got {nx}x{ny}")]
    EmptyGrid { nx: u32, ny: u32 },
    #[error("Plane extents must be positive, got {long_dist} x {lat_dist}")]
    InvalidExtent { long_dist: f32, lat_dist: f32 },
    #[error("Grid is {nx}x{ny} but elev carries {actual} samples, expected {expected}")]
    ElevationLength {
        nx: u32,
        ny: u32,
        actual: usize,
        expected: usize,
    },
    #[error("Elevation sample {index} is {value}, expected a finite non-negative height")]
    InvalidElevation { index: usize, value: f32 },
    #[error("Path carries {len} coordinates, expected an even count of (i, j) pairs")]
    OddPathLength { len: usize },
    #[error("Path cell ({i}, {j}) lies outside the {nx}x{ny} grid")]
    PathOutOfBounds { i: u32, j: u32, nx: u32, ny: u32 },
}

/// Outcome of the server-side path search, decoded from the raw
/// `result` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    /// 0: no path was requested.
    Idle,
    /// 1: a path was found and is included in the payload.
    Found,
    /// 2: the requested start cell is unusable.
    InvalidStart,
    /// 3: the requested end cell is unusable.
    InvalidEnd,
    /// 4: the search exhausted the grid without reaching the end.
    NoPath,
    /// Any other code; treated as silent success.
    Unknown(u32),
}

impl PathStatus {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => PathStatus::Idle,
            1 => PathStatus::Found,
            2 => PathStatus::InvalidStart,
            3 => PathStatus::InvalidEnd,
            4 => PathStatus::NoPath,
            other => PathStatus::Unknown(other),
        }
    }

    /// User-facing message for failure codes, `None` for the silent ones.
    pub fn alert(&self) -> Option<&'static str> {
        match self {
            PathStatus::InvalidStart => Some("Invalid Starting Location"),
            PathStatus::InvalidEnd => Some("Invalid Ending Location"),
            PathStatus::NoPath => Some("No Path Found"),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PathStatus::Idle => "idle",
            PathStatus::Found => "path found",
            PathStatus::InvalidStart => "invalid start",
            PathStatus::InvalidEnd => "invalid end",
            PathStatus::NoPath => "no path found",
            PathStatus::Unknown(_) => "unknown",
        }
    }
}

/// One server response payload.
///
/// `elev` is row-major with `nx` samples per row: grid cell `(i, j)` is
/// `elev[j * nx + i]`. The texture fields select the drape strategy:
/// no `image_url` means procedural shading, an `image_url` alone means a
/// direct drape, and any UV field alongside it means a geographically
/// aligned drape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainResponse {
    pub nx: u32,
    pub ny: u32,
    pub long_dist: f32,
    pub lat_dist: f32,
    pub elev: Vec<f32>,
    #[serde(default)]
    pub result: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tex_scale_x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tex_scale_y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tex_shift_x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tex_shift_y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<u32>>,
}

impl TerrainResponse {
    pub fn status(&self) -> PathStatus {
        PathStatus::from_code(self.result)
    }

    /// Path coordinates re-paired into `(i, j)` grid cells.
    pub fn path_cells(&self) -> Vec<(u32, u32)> {
        self.path
            .as_deref()
            .unwrap_or(&[])
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
            .collect()
    }

    /// Check the payload invariants: a non-empty grid with positive
    /// extents, `nx * ny` finite non-negative elevation samples, and a
    /// path (if any) of paired in-bounds cell coordinates.
    pub fn validate(&self) -> Result<(), ResponseError> {
        if self.nx == 0 || self.ny == 0 {
            return Err(ResponseError::EmptyGrid {
                nx: self.nx,
                ny: self.ny,
            });
        }
        if !(self.long_dist > 0.0) || !(self.lat_dist > 0.0) {
            return Err(ResponseError::InvalidExtent {
                long_dist: self.long_dist,
                lat_dist: self.lat_dist,
            });
        }

        let expected = self.nx as usize * self.ny as usize;
        if self.elev.len() != expected {
            return Err(ResponseError::ElevationLength {
                nx: self.nx,
                ny: self.ny,
                actual: self.elev.len(),
                expected,
            });
        }
        for (index, &value) in self.elev.iter().enumerate() {
            if !value.is_finite() || value < 0.0 {
                return Err(ResponseError::InvalidElevation { index, value });
            }
        }

        if let Some(path) = &self.path {
            if path.len() % 2 != 0 {
                return Err(ResponseError::OddPathLength { len: path.len() });
            }
            for pair in path.chunks_exact(2) {
                let (i, j) = (pair[0], pair[1]);
                if i >= self.nx || j >= self.ny {
                    return Err(ResponseError::PathOutOfBounds {
                        i,
                        j,
                        nx: self.nx,
                        ny: self.ny,
                    });
                }
            }
        }

        Ok(())
    }

    /// Rewrite a relative `image_url` to be relative to `base` (the
    /// payload file's directory), leaving absolute paths alone.
    pub fn resolve_image_path(&mut self, base: &Path) {
        if let Some(url) = &self.image_url {
            let path = Path::new(url);
            if path.is_relative() {
                self.image_url = Some(base.join(path).display().to_string());
            }
        }
    }
}

/// Load a payload from a JSON file and validate it.
///
/// A relative `image_url` inside the payload is resolved against the
/// payload file's directory.
pub fn load_response<P: AsRef<Path>>(path: P) -> Result<TerrainResponse, ResponseError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|_| ResponseError::FileNotFound(path.display().to_string()))?;

    let mut response = parse_response(&content)?;
    if let Some(base) = path.parent() {
        response.resolve_image_path(base);
    }
    Ok(response)
}

/// Parse payload JSON (useful for testing).
pub fn parse_response(content: &str) -> Result<TerrainResponse, ResponseError> {
    let response: TerrainResponse = serde_json::from_str(content)?;
    response.validate()?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn flat_payload() -> TerrainResponse {
        TerrainResponse {
            nx: 3,
            ny: 2,
            long_dist: 300.0,
            lat_dist: 200.0,
            elev: vec![0.0; 6],
            result: 0,
            image_url: None,
            tex_scale_x: None,
            tex_scale_y: None,
            tex_shift_x: None,
            tex_shift_y: None,
            path: None,
        }
    }

    #[test]
    fn test_parse_minimal_payload() {
        let content = r#"{
            "nx": 2, "ny": 2,
            "long_dist": 100.0, "lat_dist": 100.0,
            "elev": [0.0, 1.0, 2.0, 3.0],
            "result": 1
        }"#;
        let response = parse_response(content).unwrap();

        assert_eq!(response.nx, 2);
        assert_eq!(response.ny, 2);
        assert_eq!(response.status(), PathStatus::Found);
        assert!(response.image_url.is_none());
        assert!(response.path.is_none());
    }

    #[test]
    fn test_optional_fields_skipped_on_serialize() {
        let json = serde_json::to_string(&flat_payload()).unwrap();
        assert!(!json.contains("image_url"));
        assert!(!json.contains("tex_scale_x"));
        assert!(!json.contains("path"));

        let back: TerrainResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.nx, 3);
        assert_eq!(back.elev.len(), 6);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(PathStatus::from_code(0), PathStatus::Idle);
        assert_eq!(PathStatus::from_code(1), PathStatus::Found);
        assert_eq!(PathStatus::from_code(2), PathStatus::InvalidStart);
        assert_eq!(PathStatus::from_code(3), PathStatus::InvalidEnd);
        assert_eq!(PathStatus::from_code(4), PathStatus::NoPath);
        assert_eq!(PathStatus::from_code(9), PathStatus::Unknown(9));
    }

    #[test]
    fn test_alert_messages() {
        assert_eq!(PathStatus::Idle.alert(), None);
        assert_eq!(PathStatus::Found.alert(), None);
        assert_eq!(
            PathStatus::InvalidStart.alert(),
            Some("Invalid Starting Location")
        );
        assert_eq!(
            PathStatus::InvalidEnd.alert(),
            Some("Invalid Ending Location")
        );
        assert_eq!(PathStatus::NoPath.alert(), Some("No Path Found"));
        assert_eq!(PathStatus::Unknown(17).alert(), None);
    }

    #[test]
    fn test_path_cells_pairing() {
        let mut response = flat_payload();
        response.path = Some(vec![0, 0, 1, 1, 2, 1]);
        assert_eq!(response.path_cells(), vec![(0, 0), (1, 1), (2, 1)]);

        response.path = None;
        assert!(response.path_cells().is_empty());
    }

    #[test]
    fn test_validate_elevation_length() {
        let mut response = flat_payload();
        response.elev = vec![0.0; 5];
        assert!(matches!(
            response.validate(),
            Err(ResponseError::ElevationLength {
                actual: 5,
                expected: 6,
                ..
            })
        ));
    }

    #[test]
    fn test_validate_empty_grid() {
        let mut response = flat_payload();
        response.nx = 0;
        assert!(matches!(
            response.validate(),
            Err(ResponseError::EmptyGrid { .. })
        ));
    }

    #[test]
    fn test_validate_extents() {
        let mut response = flat_payload();
        response.lat_dist = -1.0;
        assert!(matches!(
            response.validate(),
            Err(ResponseError::InvalidExtent { .. })
        ));
    }

    #[test]
    fn test_validate_negative_elevation() {
        let mut response = flat_payload();
        response.elev[4] = -2.0;
        assert!(matches!(
            response.validate(),
            Err(ResponseError::InvalidElevation { index: 4, .. })
        ));
    }

    #[test]
    fn test_validate_odd_path() {
        let mut response = flat_payload();
        response.path = Some(vec![0, 0, 1]);
        assert!(matches!(
            response.validate(),
            Err(ResponseError::OddPathLength { len: 3 })
        ));
    }

    #[test]
    fn test_validate_path_bounds() {
        let mut response = flat_payload();
        response.path = Some(vec![0, 0, 3, 1]);
        assert!(matches!(
            response.validate(),
            Err(ResponseError::PathOutOfBounds { i: 3, j: 1, .. })
        ));
    }

    #[test]
    fn test_load_resolves_relative_image() {
        let dir = tempfile::tempdir().unwrap();
        let payload_path = dir.path().join("payload.json");
        let mut file = std::fs::File::create(&payload_path).unwrap();
        write!(
            file,
            r#"{{"nx": 1, "ny": 1, "long_dist": 10.0, "lat_dist": 10.0,
                "elev": [5.0], "result": 1, "image_url": "map.png"}}"#
        )
        .unwrap();

        let response = load_response(&payload_path).unwrap();
        let expected = dir.path().join("map.png").display().to_string();
        assert_eq!(response.image_url.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_response("/nonexistent/payload.json");
        assert!(matches!(result, Err(ResponseError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_malformed_json() {
        assert!(matches!(
            parse_response("{not json"),
            Err(ResponseError::Json(_))
        ));
    }
}
