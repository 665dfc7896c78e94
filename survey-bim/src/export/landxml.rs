//! Export LandXML 1.2 pour le guidage d'engins
//!
//! Le firmware machine-control parse du texte à précision fixe: le
//! formatage numérique reprend exactement la précision configurée pour
//! la transformation. Un écart ici est un bug de justesse, pas un
//! choix de style. Pas d'attribut date/heure: deux runs sur la même
//! entrée produisent un document identique à l'octet près.

use std::collections::HashSet;
use std::io::Write;

use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::tin::Surface;

const LANDXML_NS: &str = "http://www.landxml.org/schema/LandXML-1.2";

/// Écrit le document LandXML complet.
///
/// Sans triangulation, le document dégrade en points seuls (CgPoints
/// sans élément Surfaces).
pub fn write_landxml<W: Write>(
    out: W,
    surface: &Surface,
    precision: u8,
    project_name: &str,
) -> Result<()> {
    let mut writer = Writer::new_with_indent(out, b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("LandXML");
    root.push_attribute(("xmlns", LANDXML_NS));
    root.push_attribute(("version", "1.2"));
    writer.write_event(Event::Start(root))?;

    // Déclaration du système de coordonnées cible
    let mut crs = BytesStart::new("CoordinateSystem");
    crs.push_attribute(("epsgCode", surface.crs.epsg_code.to_string().as_str()));
    crs.push_attribute(("name", surface.crs.name.as_str()));
    writer.write_event(Event::Empty(crs))?;

    let mut project = BytesStart::new("Project");
    project.push_attribute(("name", project_name));
    writer.write_event(Event::Start(project))?;
    let mut application = BytesStart::new("Application");
    application.push_attribute(("name", "survey-bim"));
    application.push_attribute(("version", env!("CARGO_PKG_VERSION")));
    writer.write_event(Event::Empty(application))?;
    writer.write_event(Event::End(BytesEnd::new("Project")))?;

    // Points nommés avec leurs métadonnées
    if !surface.points.is_empty() {
        let mut cg_points = BytesStart::new("CgPoints");
        cg_points.push_attribute(("name", "Survey Points"));
        writer.write_event(Event::Start(cg_points))?;

        for point in &surface.points {
            let mut cg_point = BytesStart::new("CgPoint");
            cg_point.push_attribute(("name", point.record.id.as_str()));
            if !point.record.code.is_empty() {
                cg_point.push_attribute(("code", point.record.code.as_str()));
            }
            if !point.record.description.is_empty() {
                cg_point.push_attribute(("desc", point.record.description.as_str()));
            }
            writer.write_event(Event::Start(cg_point))?;
            writer.write_event(Event::Text(BytesText::new(&coords(
                point.local, precision,
            ))))?;
            writer.write_event(Event::End(BytesEnd::new("CgPoint")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("CgPoints")))?;
    }

    // Surface TIN: points référencés par identifiant positionnel
    // 1-based, faces par triple de références
    if !surface.triangles.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("Surfaces")))?;

        let mut surface_elem = BytesStart::new("Surface");
        surface_elem.push_attribute(("name", surface.name.as_str()));
        writer.write_event(Event::Start(surface_elem))?;

        let mut definition = BytesStart::new("Definition");
        definition.push_attribute(("surfType", "TIN"));
        writer.write_event(Event::Start(definition))?;

        writer.write_event(Event::Start(BytesStart::new("Pnts")))?;
        for (i, point) in surface.points.iter().enumerate() {
            let mut p = BytesStart::new("P");
            p.push_attribute(("id", (i + 1).to_string().as_str()));
            writer.write_event(Event::Start(p))?;
            writer.write_event(Event::Text(BytesText::new(&coords(
                point.local, precision,
            ))))?;
            writer.write_event(Event::End(BytesEnd::new("P")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("Pnts")))?;

        writer.write_event(Event::Start(BytesStart::new("Faces")))?;
        for triangle in &surface.triangles {
            writer.write_event(Event::Start(BytesStart::new("F")))?;
            writer.write_event(Event::Text(BytesText::new(&format!(
                "{} {} {}",
                triangle.a + 1,
                triangle.b + 1,
                triangle.c + 1
            ))))?;
            writer.write_event(Event::End(BytesEnd::new("F")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("Faces")))?;

        writer.write_event(Event::End(BytesEnd::new("Definition")))?;
        writer.write_event(Event::End(BytesEnd::new("Surface")))?;
        writer.write_event(Event::End(BytesEnd::new("Surfaces")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("LandXML")))?;
    Ok(())
}

/// Texte coordonnées `X Y Z` à précision fixe
fn coords(local: [f64; 3], precision: u8) -> String {
    let p = precision as usize;
    format!(
        "{:.*} {:.*} {:.*}",
        p, local[0], p, local[1], p, local[2]
    )
}

/// Validation structurelle du document produit.
///
/// Vérifie les contraintes du schéma cible: racine LandXML,
/// CoordinateSystem avec epsgCode, et résolution de chaque référence
/// de face vers un identifiant de point déclaré. Un échec ici est une
/// erreur de sérialisation pour cet artefact.
pub fn validate_document(xml: &str) -> Result<()> {
    let mut reader = Reader::from_str(xml);

    let mut root_seen = false;
    let mut crs_seen = false;
    let mut in_faces = false;
    let mut in_face = false;
    let mut point_ids: HashSet<u64> = HashSet::new();
    let mut face_refs: Vec<u64> = Vec::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event().context("Malformed XML")? {
            Event::Start(e) | Event::Empty(e)
                if depth == 0 && !matches!(e.name().as_ref(), b"LandXML") =>
            {
                anyhow::bail!("Root element must be LandXML");
            }
            Event::Start(e) => {
                match e.name().as_ref() {
                    b"LandXML" => root_seen = true,
                    b"CoordinateSystem" => {
                        if attribute(&e, b"epsgCode")?.is_none() {
                            anyhow::bail!("CoordinateSystem without epsgCode");
                        }
                        crs_seen = true;
                    }
                    b"Faces" => in_faces = true,
                    b"F" if in_faces => in_face = true,
                    b"P" => {
                        let id = attribute(&e, b"id")?
                            .ok_or_else(|| anyhow::anyhow!("P element without id"))?;
                        let id: u64 = id.parse().context("P id is not numeric")?;
                        if !point_ids.insert(id) {
                            anyhow::bail!("Duplicate point id {}", id);
                        }
                    }
                    _ => {}
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if e.name().as_ref() == b"CoordinateSystem" {
                    if attribute(&e, b"epsgCode")?.is_none() {
                        anyhow::bail!("CoordinateSystem without epsgCode");
                    }
                    crs_seen = true;
                }
            }
            Event::Text(text) if in_face => {
                let content = text.unescape().context("Malformed face text")?;
                for token in content.split_whitespace() {
                    face_refs.push(token.parse().context("Face reference is not numeric")?);
                }
            }
            Event::End(e) => {
                match e.name().as_ref() {
                    b"Faces" => in_faces = false,
                    b"F" => in_face = false,
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !root_seen {
        anyhow::bail!("Missing LandXML root element");
    }
    if !crs_seen {
        anyhow::bail!("Missing CoordinateSystem element");
    }
    for reference in &face_refs {
        if !point_ids.contains(reference) {
            anyhow::bail!("Face references unknown point id {}", reference);
        }
    }
    if face_refs.len() % 3 != 0 {
        anyhow::bail!("Face list is not a sequence of triples");
    }

    Ok(())
}

fn attribute(e: &BytesStart, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.context("Malformed attribute")?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrsDescriptor;
    use crate::tin::TriangleRef;
    use crate::transform::{LocalOrigin, TransformedRecord};
    use pnezd::SurveyRecord;

    fn sample_surface(with_triangles: bool) -> Surface {
        let point = |id: &str, code: &str, x: f64, y: f64, z: f64, row: usize| {
            TransformedRecord {
                record: SurveyRecord {
                    id: id.to_string(),
                    x,
                    y,
                    z,
                    description: if id == "1" {
                        "north & east corner".to_string()
                    } else {
                        String::new()
                    },
                    code: code.to_string(),
                    row,
                },
                world: [x, y, z],
                local: [x, y, z],
            }
        };

        Surface {
            name: "Survey_Points_Surface".to_string(),
            points: vec![
                point("101", "FENCE", 0.0, 0.0, 0.0, 2),
                point("102", "ROAD", 6.004, 0.0, 0.5, 3),
                point("103", "", 3.0, 176.792, 1.936, 4),
            ],
            triangles: if with_triangles {
                vec![TriangleRef { a: 0, b: 1, c: 2 }]
            } else {
                Vec::new()
            },
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

    fn render(surface: &Surface) -> String {
        let mut buffer = Vec::new();
        write_landxml(&mut buffer, surface, 3, "Survey Project").unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_document_structure() {
        let xml = render(&sample_surface(true));

        assert!(xml.contains(r#"<LandXML xmlns="http://www.landxml.org/schema/LandXML-1.2" version="1.2">"#));
        assert!(xml.contains(r#"<CoordinateSystem epsgCode="3006" name="SWEREF99 TM"/>"#));
        assert!(xml.contains(r#"<Definition surfType="TIN">"#));
        assert!(xml.contains(r#"<P id="1">0.000 0.000 0.000</P>"#));
        assert!(xml.contains(r#"<P id="2">6.004 0.000 0.500</P>"#));
        assert!(xml.contains("<F>1 2 3</F>"));
    }

    #[test]
    fn test_metadata_preserved_on_cgpoints() {
        let xml = render(&sample_surface(true));

        assert!(xml.contains(r#"<CgPoint name="101" code="FENCE" desc="north &amp; east corner">"#));
        // Code vide: pas d'attribut
        assert!(xml.contains(r#"<CgPoint name="103">"#));
    }

    #[test]
    fn test_points_only_document_has_no_surfaces() {
        let xml = render(&sample_surface(false));

        assert!(xml.contains("<CgPoints"));
        assert!(!xml.contains("<Surfaces>"));
        validate_document(&xml).unwrap();
    }

    #[test]
    fn test_precision_formatting_matches_transform() {
        let mut buffer = Vec::new();
        write_landxml(&mut buffer, &sample_surface(true), 2, "P").unwrap();
        let xml = String::from_utf8(buffer).unwrap();

        assert!(xml.contains("6.00 0.00 0.50"));
        assert!(!xml.contains("6.004"));
    }

    #[test]
    fn test_produced_document_validates() {
        validate_document(&render(&sample_surface(true))).unwrap();
    }

    #[test]
    fn test_deterministic_output() {
        let surface = sample_surface(true);
        assert_eq!(render(&surface), render(&surface));
    }

    #[test]
    fn test_validate_rejects_unresolved_face_reference() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<LandXML xmlns="http://www.landxml.org/schema/LandXML-1.2" version="1.2">
  <CoordinateSystem epsgCode="3006" name="SWEREF99 TM"/>
  <Surfaces>
    <Surface name="S">
      <Definition surfType="TIN">
        <Pnts>
          <P id="1">0.0 0.0 0.0</P>
          <P id="2">1.0 0.0 0.0</P>
          <P id="3">0.0 1.0 0.0</P>
        </Pnts>
        <Faces>
          <F>1 2 99</F>
        </Faces>
      </Definition>
    </Surface>
  </Surfaces>
</LandXML>"#;

        let err = validate_document(xml).unwrap_err();
        assert!(err.to_string().contains("unknown point id 99"));
    }

    #[test]
    fn test_validate_rejects_missing_coordinate_system() {
        let xml = r#"<LandXML version="1.2"></LandXML>"#;
        let err = validate_document(xml).unwrap_err();
        assert!(err.to_string().contains("CoordinateSystem"));
    }

    #[test]
    fn test_validate_rejects_wrong_root() {
        let xml = r#"<NotLandXML/>"#;
        assert!(validate_document(xml).is_err());
    }
}
