//! Sérialisation du graphe BIM en IFC 4X3 (ISO-10303-21)
//!
//! Écriture texte en streaming. Les GlobalId sont dérivés d'un hash
//! blake3 de clés stables (projet, rôle, identifiant de point): deux
//! runs sur la même entrée produisent un fichier identique à l'octet
//! près. Le champ timestamp de FILE_NAME reste vide pour la même
//! raison.

use std::io::Write;

use anyhow::Result;

use super::graph::{BimGraph, PropertyValue};

/// Alphabet base64 des GlobalId IFC
const GUID_ALPHABET: &[u8; 64] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz_$";

/// Écrit le graphe complet en fichier SPF
pub fn write_spf<W: Write>(out: &mut W, graph: &BimGraph, precision: u8) -> Result<()> {
    let mut emitter = Emitter { out, next_id: 1 };
    emitter.header(&graph.project_name)?;

    // Unités et contexte de représentation
    let unit = emitter.push("IFCSIUNIT(*,.LENGTHUNIT.,$,.METRE.)".to_string())?;
    let units = emitter.push(format!("IFCUNITASSIGNMENT((#{}))", unit))?;
    let zero = emitter.push("IFCCARTESIANPOINT((0.,0.,0.))".to_string())?;
    let world_axis = emitter.push(format!("IFCAXIS2PLACEMENT3D(#{},$,$)", zero))?;
    let context = emitter.push(format!(
        "IFCGEOMETRICREPRESENTATIONCONTEXT($,'Model',3,1.0E-5,#{},$)",
        world_axis
    ))?;

    let project = emitter.push(format!(
        "IFCPROJECT('{}',$,'{}',$,$,$,$,(#{}),#{})",
        global_id(&graph.project_name, "project", ""),
        escape(&graph.project_name),
        context,
        units
    ))?;

    // Géoréférencement: CRS projeté + conversion vers l'origine locale
    let crs = emitter.push(format!(
        "IFCPROJECTEDCRS('EPSG:{}','{}',$,$,$,$,#{})",
        graph.crs.descriptor.epsg_code,
        escape(&graph.crs.descriptor.name),
        unit
    ))?;
    emitter.push(format!(
        "IFCMAPCONVERSION(#{},#{},{},{},{},1.,0.,1.)",
        context,
        crs,
        real(graph.crs.origin.x0, precision),
        real(graph.crs.origin.y0, precision),
        real(graph.crs.origin.z0, precision)
    ))?;

    // Site sous le projet
    let site_placement = emitter.push(format!("IFCLOCALPLACEMENT($,#{})", world_axis))?;
    let site = emitter.push(format!(
        "IFCSITE('{}',$,'{}',$,$,#{},$,$,.ELEMENT.,$,$,$,$,$)",
        global_id(&graph.project_name, "site", ""),
        escape(&graph.site_name),
        site_placement
    ))?;
    emitter.push(format!(
        "IFCRELAGGREGATES('{}',$,$,$,#{},(#{}))",
        global_id(&graph.project_name, "rel-aggregates", ""),
        project,
        site
    ))?;

    // Une annotation par point, placée relativement au site
    let mut annotations = Vec::with_capacity(graph.points.len());
    for point in &graph.points {
        let location = emitter.push(format!(
            "IFCCARTESIANPOINT(({},{},{}))",
            real(point.local[0], precision),
            real(point.local[1], precision),
            real(point.local[2], precision)
        ))?;
        let axis = emitter.push(format!("IFCAXIS2PLACEMENT3D(#{},$,$)", location))?;
        let placement = emitter.push(format!(
            "IFCLOCALPLACEMENT(#{},#{})",
            site_placement, axis
        ))?;
        let representation = emitter.push(format!(
            "IFCSHAPEREPRESENTATION(#{},'Point','Point',(#{}))",
            context, zero
        ))?;
        let shape = emitter.push(format!("IFCPRODUCTDEFINITIONSHAPE($,$,(#{}))", representation))?;

        let key = point_key(graph, point.index);
        let annotation = emitter.push(format!(
            "IFCANNOTATION('{}',$,'{}','{}',$,#{},#{},.SURVEY.)",
            global_id(&graph.project_name, "annotation", &key),
            escape(&point.name),
            escape(&point.description),
            placement,
            shape
        ))?;
        annotations.push(annotation);

        let mut property_ids = Vec::with_capacity(point.properties.len());
        for property in &point.properties {
            let nominal = match &property.value {
                PropertyValue::Label(v) => format!("IFCLABEL('{}')", escape(v)),
                PropertyValue::Text(v) => format!("IFCTEXT('{}')", escape(v)),
                PropertyValue::Real(v) => format!("IFCREAL({})", real(*v, precision)),
            };
            property_ids.push(emitter.push(format!(
                "IFCPROPERTYSINGLEVALUE('{}',$,{},$)",
                property.name, nominal
            ))?);
        }
        let pset = emitter.push(format!(
            "IFCPROPERTYSET('{}',$,'SurveyData',$,({}))",
            global_id(&graph.project_name, "pset", &key),
            refs(&property_ids)
        ))?;
        emitter.push(format!(
            "IFCRELDEFINESBYPROPERTIES('{}',$,$,$,(#{}),#{})",
            global_id(&graph.project_name, "rel-props", &key),
            annotation,
            pset
        ))?;
    }

    // Surface tessellée (si la triangulation a produit des faces)
    let mut contained = annotations.clone();
    if let Some(tessellated) = &graph.surface {
        let coords: Vec<String> = tessellated
            .vertices
            .iter()
            .map(|v| {
                format!(
                    "({},{},{})",
                    real(v[0], precision),
                    real(v[1], precision),
                    real(v[2], precision)
                )
            })
            .collect();
        let point_list = emitter.push(format!(
            "IFCCARTESIANPOINTLIST3D(({}),$)",
            coords.join(",")
        ))?;

        // CoordIndex IFC: 1-based
        let faces: Vec<String> = tessellated
            .faces
            .iter()
            .map(|f| format!("({},{},{})", f[0] + 1, f[1] + 1, f[2] + 1))
            .collect();
        let face_set = emitter.push(format!(
            "IFCTRIANGULATEDFACESET(#{},$,.F.,({}),$)",
            point_list,
            faces.join(",")
        ))?;

        let representation = emitter.push(format!(
            "IFCSHAPEREPRESENTATION(#{},'Body','Tessellation',(#{}))",
            context, face_set
        ))?;
        let shape = emitter.push(format!("IFCPRODUCTDEFINITIONSHAPE($,$,(#{}))", representation))?;
        let terrain = emitter.push(format!(
            "IFCGEOGRAPHICELEMENT('{}',$,'{}',$,$,#{},#{},$,.TERRAIN.)",
            global_id(&graph.project_name, "surface", &tessellated.name),
            escape(&tessellated.name),
            site_placement,
            shape
        ))?;
        contained.push(terrain);
    }

    emitter.push(format!(
        "IFCRELCONTAINEDINSPATIALSTRUCTURE('{}',$,$,$,({}),#{})",
        global_id(&graph.project_name, "containment", ""),
        refs(&contained),
        site
    ))?;

    // Collections nommées par code de classification
    for group in &graph.groups {
        let entity = emitter.push(format!(
            "IFCGROUP('{}',$,'{}',$,$)",
            global_id(&graph.project_name, "group", &group.code),
            escape(&group.code)
        ))?;
        let members: Vec<u32> = group.members.iter().map(|&i| annotations[i]).collect();
        emitter.push(format!(
            "IFCRELASSIGNSTOGROUP('{}',$,$,$,({}),$,#{})",
            global_id(&graph.project_name, "rel-group", &group.code),
            refs(&members),
            entity
        ))?;
    }

    emitter.footer()?;
    Ok(())
}

/// Clé stable d'un point pour les GlobalId (l'ID levé est unique dans
/// le lot)
fn point_key(graph: &BimGraph, index: usize) -> String {
    graph.points[index]
        .properties
        .iter()
        .find_map(|p| match (&p.name, &p.value) {
            (&"ID", PropertyValue::Label(v)) => Some(v.clone()),
            _ => None,
        })
        .unwrap_or_else(|| index.to_string())
}

struct Emitter<'a, W: Write> {
    out: &'a mut W,
    next_id: u32,
}

impl<W: Write> Emitter<'_, W> {
    fn push(&mut self, body: String) -> Result<u32> {
        let id = self.next_id;
        self.next_id += 1;
        writeln!(self.out, "#{}= {};", id, body)?;
        Ok(id)
    }

    fn header(&mut self, project_name: &str) -> Result<()> {
        writeln!(self.out, "ISO-10303-21;")?;
        writeln!(self.out, "HEADER;")?;
        writeln!(self.out, "FILE_DESCRIPTION((''),'2;1');")?;
        writeln!(
            self.out,
            "FILE_NAME('{}.ifc','',(''),(''),'survey-bim {}','survey-bim','');",
            escape(project_name),
            env!("CARGO_PKG_VERSION")
        )?;
        writeln!(self.out, "FILE_SCHEMA(('IFC4X3'));")?;
        writeln!(self.out, "ENDSEC;")?;
        writeln!(self.out, "DATA;")?;
        Ok(())
    }

    fn footer(&mut self) -> Result<()> {
        writeln!(self.out, "ENDSEC;")?;
        writeln!(self.out, "END-ISO-10303-21;")?;
        Ok(())
    }
}

/// Liste de références `#a,#b,#c`
fn refs(ids: &[u32]) -> String {
    ids.iter()
        .map(|id| format!("#{}", id))
        .collect::<Vec<_>>()
        .join(",")
}

/// Formatte un réel IFC à précision fixe (toujours avec un point)
fn real(value: f64, precision: u8) -> String {
    if precision == 0 {
        format!("{:.0}.", value)
    } else {
        format!("{:.*}", precision as usize, value)
    }
}

/// Échappe une chaîne SPF (apostrophe doublée, backslash doublé)
fn escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\'' => result.push_str("''"),
            '\\' => result.push_str("\\\\"),
            '\n' | '\r' => result.push(' '),
            c => result.push(c),
        }
    }
    result
}

/// GlobalId IFC déterministe: blake3(projet|rôle|clé) tronqué à
/// 128 bits, encodé sur l'alphabet base64 IFC (22 caractères)
fn global_id(project: &str, role: &str, key: &str) -> String {
    let hash = blake3::hash(format!("{}|{}|{}", project, role, key).as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash.as_bytes()[..16]);
    encode_guid(&bytes)
}

fn encode_guid(bytes: &[u8; 16]) -> String {
    let mut num = u128::from_be_bytes(*bytes);
    let mut out = [0u8; 22];
    for slot in out.iter_mut().rev() {
        *slot = GUID_ALPHABET[(num & 0x3F) as usize];
        num >>= 6;
    }
    out.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bim::graph::build_graph;
    use crate::config::CrsDescriptor;
    use crate::tin::{Surface, TriangleRef};
    use crate::transform::{LocalOrigin, TransformedRecord};
    use pnezd::SurveyRecord;
    use std::collections::HashSet;

    fn sample_graph() -> BimGraph {
        let point = |id: &str, code: &str, x: f64, y: f64, z: f64, row: usize| {
            TransformedRecord {
                record: SurveyRecord {
                    id: id.to_string(),
                    x,
                    y,
                    z,
                    description: format!("point {}", id),
                    code: code.to_string(),
                    row,
                },
                world: [x + 157896.161, y + 6407066.260, z + 18.833],
                local: [x, y, z],
            }
        };

        let surface = Surface {
            name: "Survey_Points_Surface".to_string(),
            points: vec![
                point("1", "ROAD", 0.0, 0.0, 0.0, 2),
                point("2", "ROAD", 6.004, 0.0, 0.5, 3),
                point("3", "FENCE", 3.0, 176.792, 1.936, 4),
            ],
            triangles: vec![TriangleRef { a: 0, b: 1, c: 2 }],
            crs: CrsDescriptor {
                epsg_code: 3006,
                name: "SWEREF99 TM".to_string(),
            },
            origin: LocalOrigin {
                x0: 157896.161,
                y0: 6407066.260,
                z0: 18.833,
            },
        };
        build_graph(&surface, "Survey Project")
    }

    fn render(graph: &BimGraph) -> String {
        let mut buffer = Vec::new();
        write_spf(&mut buffer, graph, 3).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_spf_structure() {
        let spf = render(&sample_graph());

        assert!(spf.starts_with("ISO-10303-21;"));
        assert!(spf.ends_with("END-ISO-10303-21;\n"));
        assert!(spf.contains("FILE_SCHEMA(('IFC4X3'));"));
        assert!(spf.contains("IFCPROJECT("));
        assert!(spf.contains("IFCSITE("));
        assert!(spf.contains("IFCRELAGGREGATES("));
        assert_eq!(spf.matches("IFCANNOTATION(").count(), 3);
        assert_eq!(spf.matches("IFCPROPERTYSET(").count(), 3);
    }

    #[test]
    fn test_georeferencing_carries_origin() {
        let spf = render(&sample_graph());

        assert!(spf.contains("IFCPROJECTEDCRS('EPSG:3006','SWEREF99 TM'"));
        assert!(spf.contains("157896.161,6407066.260,18.833,1.,0.,1."));
    }

    #[test]
    fn test_tessellated_surface_one_based_indices() {
        let spf = render(&sample_graph());

        assert!(spf.contains("IFCTRIANGULATEDFACESET("));
        assert!(spf.contains("(1,2,3)"));
        assert!(spf.contains("IFCGEOGRAPHICELEMENT("));
        assert!(spf.contains(".TERRAIN."));
    }

    #[test]
    fn test_groups_by_code() {
        let spf = render(&sample_graph());
        assert!(spf.contains("IFCGROUP("));
        assert!(spf.contains("'ROAD'"));
        assert!(spf.contains("'FENCE'"));
        assert_eq!(spf.matches("IFCRELASSIGNSTOGROUP(").count(), 2);
    }

    #[test]
    fn test_deterministic_output() {
        let graph = sample_graph();
        assert_eq!(render(&graph), render(&graph));
    }

    #[test]
    fn test_global_ids_unique_and_well_formed() {
        let spf = render(&sample_graph());
        let mut guids = HashSet::new();

        for line in spf.lines() {
            // Les entités racines portent leur GlobalId en premier
            // attribut: #n= IFCXXX('<22 chars>',...
            if let Some(start) = line.find("('") {
                let rest = &line[start + 2..];
                if let Some(end) = rest.find('\'') {
                    let candidate = &rest[..end];
                    if candidate.len() == 22
                        && candidate.bytes().all(|b| GUID_ALPHABET.contains(&b))
                    {
                        assert!(guids.insert(candidate.to_string()), "duplicate GlobalId");
                    }
                }
            }
        }

        // project + site + rel-aggregates + 3×(annotation, pset,
        // rel-props) + surface + containment + 2×(group, rel-group)
        assert!(guids.len() >= 15, "expected at least 15 GlobalIds, got {}", guids.len());
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("l'angle"), "l''angle");
        assert_eq!(escape("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_encode_guid_length_and_alphabet() {
        let id = global_id("p", "role", "key");
        assert_eq!(id.len(), 22);
        assert!(id.bytes().all(|b| GUID_ALPHABET.contains(&b)));
        // Premier caractère: 2 bits de poids fort → '0'..'3'
        assert!(('0'..='3').contains(&id.chars().next().unwrap()));
    }

    #[test]
    fn test_real_formatting() {
        assert_eq!(real(1.5, 3), "1.500");
        assert_eq!(real(-0.125, 3), "-0.125");
        assert_eq!(real(2.0, 0), "2.");
    }
}
