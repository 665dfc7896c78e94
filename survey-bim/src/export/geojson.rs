//! Export GeoJSON des points transformés (contrôle qualité)
//!
//! Dump en streaming des points acceptés, en coordonnées monde du CRS
//! cible: superposable directement dans un SIG pour vérifier la
//! transformation avant de livrer les artefacts.

use std::io::Write;

use anyhow::Result;
use geo::{Geometry, Point};
use geozero::geojson::GeoJsonWriter;
use geozero::GeozeroGeometry;

use crate::tin::Surface;

/// Exporte les points de la surface en FeatureCollection GeoJSON
pub fn write_geojson<W: Write>(writer: &mut W, surface: &Surface) -> Result<()> {
    // Header FeatureCollection avec CRS
    write!(
        writer,
        r#"{{"type":"FeatureCollection","crs":{{"type":"name","properties":{{"name":"urn:ogc:def:crs:EPSG::{}"}}}},"features":["#,
        surface.crs.epsg_code
    )?;

    for (i, point) in surface.points.iter().enumerate() {
        if i > 0 {
            write!(writer, ",")?;
        }
        write_point_feature(writer, point)?;
    }

    write!(writer, "]}}")?;
    writer.flush()?;

    Ok(())
}

/// Écrit une feature point
fn write_point_feature<W: Write>(
    writer: &mut W,
    point: &crate::transform::TransformedRecord,
) -> Result<()> {
    write!(
        writer,
        r#"{{"type":"Feature","id":"{}","#,
        escape_json(&point.record.id)
    )?;

    // Geometry via geozero (coordonnées monde, pas locales)
    write!(writer, r#""geometry":"#)?;
    let mut geom_buf = Vec::new();
    let mut geom_writer = GeoJsonWriter::new(&mut geom_buf);
    let geometry = Geometry::Point(Point::new(point.world[0], point.world[1]));
    geometry.process_geom(&mut geom_writer)?;
    writer.write_all(&geom_buf)?;

    write!(
        writer,
        r#","properties":{{"id":"{}","code":"{}","description":"{}","local_x":{},"local_y":{},"local_z":{}}}}}"#,
        escape_json(&point.record.id),
        escape_json(&point.record.code),
        escape_json(&point.record.description),
        point.local[0],
        point.local[1],
        point.local[2]
    )?;

    Ok(())
}

/// Échappe une chaîne pour JSON
fn escape_json(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrsDescriptor;
    use crate::transform::{LocalOrigin, TransformedRecord};
    use pnezd::SurveyRecord;

    fn sample_surface() -> Surface {
        Surface {
            name: "S".to_string(),
            points: vec![TransformedRecord {
                record: SurveyRecord {
                    id: "101".to_string(),
                    x: 18.07,
                    y: 59.33,
                    z: 18.833,
                    description: "corner".to_string(),
                    code: "FENCE".to_string(),
                    row: 2,
                },
                world: [157896.161, 6407066.260, 18.833],
                local: [0.0, 0.0, 0.0],
            }],
            triangles: Vec::new(),
            crs: CrsDescriptor {
                epsg_code: 3006,
                name: "SWEREF99 TM".to_string(),
            },
            origin: LocalOrigin {
                x0: 157896.161,
                y0: 6407066.260,
                z0: 18.833,
            },
        }
    }

    #[test]
    fn test_write_geojson() {
        let mut buffer = Vec::new();
        write_geojson(&mut buffer, &sample_surface()).unwrap();
        let json = String::from_utf8(buffer).unwrap();

        assert!(json.contains(r#""type":"FeatureCollection""#));
        assert!(json.contains("EPSG::3006"));
        assert!(json.contains(r#""id":"101""#));
        assert!(json.contains(r#""code":"FENCE""#));
        // Coordonnées monde dans la géométrie
        assert!(json.contains("157896.161"));

        // Le document est du JSON valide
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["features"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_escape_json() {
        assert_eq!(escape_json("hello"), "hello");
        assert_eq!(escape_json("hello\"world"), "hello\\\"world");
        assert_eq!(escape_json("line\nbreak"), "line\\nbreak");
    }
}
