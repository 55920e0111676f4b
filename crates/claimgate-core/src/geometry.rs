//! Spatial comparison of claim geometries against constraint geometries.
//!
//! Geometries arrive as well-known text. A geometry claim may also be a
//! bounding box object (`{"xmin":..,"ymin":..,"xmax":..,"ymax":..}`), either
//! inline or as a JSON string.

use geo::{coord, Geometry, Intersects, Rect, Relate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wkt::TryFromWkt;

use crate::error::{PolicyError, PolicyResult};

/// Axis-aligned rectangle with closed bounds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BoundingBox {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// `self` lies entirely within `other` (edges may touch).
    pub fn is_inside(&self, other: &BoundingBox) -> bool {
        self.xmin >= other.xmin
            && self.ymin >= other.ymin
            && self.xmax <= other.xmax
            && self.ymax <= other.ymax
    }

    /// Boxes share at least one point.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.xmax >= other.xmin
            && self.xmin <= other.xmax
            && self.ymax >= other.ymin
            && self.ymin <= other.ymax
    }

    pub fn to_geometry(&self) -> Geometry<f64> {
        Geometry::Rect(Rect::new(
            coord! { x: self.xmin, y: self.ymin },
            coord! { x: self.xmax, y: self.ymax },
        ))
    }

    fn from_value(value: &Value) -> PolicyResult<Self> {
        let bbox: BoundingBox = serde_json::from_value(value.clone())
            .map_err(|e| PolicyError::geometry_parse(value.to_string(), e.to_string()))?;
        bbox.validated(value)
    }

    fn validated(self, source: &Value) -> PolicyResult<Self> {
        let finite = [self.xmin, self.ymin, self.xmax, self.ymax]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.xmin > self.xmax || self.ymin > self.ymax {
            return Err(PolicyError::geometry_parse(
                source.to_string(),
                "bounding box must have finite bounds with min <= max",
            ));
        }
        Ok(self)
    }
}

/// Parse well-known text into a geometry.
pub fn parse_geometry(text: &str) -> PolicyResult<Geometry<f64>> {
    Geometry::<f64>::try_from_wkt_str(text.trim()).map_err(|e| {
        tracing::warn!(reason = "E_GEOMETRY_PARSE", input = text, "failed to parse geometry: {}", e);
        PolicyError::geometry_parse(text, e.to_string())
    })
}

/// Parse a claim value: WKT string, bounding box object, or a JSON string
/// holding a bounding box object.
pub fn parse_claim_geometry(value: &Value) -> PolicyResult<Geometry<f64>> {
    match value {
        Value::String(s) if s.trim_start().starts_with('{') => {
            let inner: Value = serde_json::from_str(s)
                .map_err(|e| PolicyError::geometry_parse(s.as_str(), e.to_string()))?;
            Ok(BoundingBox::from_value(&inner)?.to_geometry())
        }
        Value::String(s) => parse_geometry(s),
        Value::Object(_) => Ok(BoundingBox::from_value(value)?.to_geometry()),
        other => Err(PolicyError::geometry_parse(
            other.to_string(),
            "geometry claim must be WKT text or a bounding box object",
        )),
    }
}

/// Same point set (DE-9IM `T*F**FFF*`).
pub fn geometry_equals(a: &Geometry<f64>, b: &Geometry<f64>) -> bool {
    a.relate(b).is_equal_topo()
}

/// Non-empty intersection, boundaries and single points included.
pub fn geometry_intersects(a: &Geometry<f64>, b: &Geometry<f64>) -> bool {
    a.intersects(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SQUARE: &str = "POLYGON((0 0,2 0,2 2,0 2,0 0))";

    #[test]
    fn test_point_inside_polygon_intersects() {
        let point = parse_geometry("POINT(1 1)").unwrap();
        let square = parse_geometry(SQUARE).unwrap();
        assert!(geometry_intersects(&point, &square));
        assert!(!geometry_equals(&point, &square));
    }

    #[test]
    fn test_boundary_contact_counts_as_intersection() {
        let corner = parse_geometry("POINT(2 2)").unwrap();
        let square = parse_geometry(SQUARE).unwrap();
        assert!(geometry_intersects(&corner, &square));

        let outside = parse_geometry("POINT(3 3)").unwrap();
        assert!(!geometry_intersects(&outside, &square));
    }

    #[test]
    fn test_equality_ignores_vertex_order() {
        let a = parse_geometry(SQUARE).unwrap();
        let b = parse_geometry("POLYGON((2 2,0 2,0 0,2 0,2 2))").unwrap();
        assert!(geometry_equals(&a, &b));
    }

    #[test]
    fn test_invalid_wkt_is_an_error() {
        let err = parse_geometry("not-a-wkt-string").unwrap_err();
        assert!(matches!(err, PolicyError::GeometryParse { .. }));
    }

    #[test]
    fn test_bounding_box_claim_forms() {
        let inline = parse_claim_geometry(&json!({"xmin": 0.0, "ymin": 0.0, "xmax": 2.0, "ymax": 2.0}))
            .unwrap();
        let square = parse_geometry(SQUARE).unwrap();
        assert!(geometry_equals(&inline, &square));

        let as_text =
            parse_claim_geometry(&json!(r#"{"xmin":0,"ymin":0,"xmax":1,"ymax":1}"#)).unwrap();
        assert!(geometry_intersects(&as_text, &square));
    }

    #[test]
    fn test_inverted_bounding_box_is_rejected() {
        let err = parse_claim_geometry(&json!({"xmin": 5, "ymin": 0, "xmax": 1, "ymax": 1}))
            .unwrap_err();
        assert!(matches!(err, PolicyError::GeometryParse { .. }));

        let err = parse_claim_geometry(&json!({"xmin": "a", "ymin": 0, "xmax": 1, "ymax": 1}))
            .unwrap_err();
        assert!(matches!(err, PolicyError::GeometryParse { .. }));
    }

    #[test]
    fn test_bounding_box_relations() {
        let outer = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let inner = BoundingBox::new(2.0, 2.0, 3.0, 3.0);
        let touching = BoundingBox::new(10.0, 10.0, 12.0, 12.0);
        let apart = BoundingBox::new(11.0, 11.0, 12.0, 12.0);

        assert!(inner.is_inside(&outer));
        assert!(!outer.is_inside(&inner));
        assert!(outer.intersects(&touching));
        assert!(!outer.intersects(&apart));
    }
}
