//! Graphe d'objets BIM neutre
//!
//! Construit depuis la `Surface` sans aucun calcul géométrique: toutes
//! les coordonnées sont déjà finales.

use std::collections::BTreeMap;

use crate::config::CrsDescriptor;
use crate::tin::Surface;
use crate::transform::LocalOrigin;

/// Valeur typée d'une propriété
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Label(String),
    Text(String),
    Real(f64),
}

/// Propriété nommée d'un jeu de propriétés
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: &'static str,
    pub value: PropertyValue,
}

/// Annotation spatiale portant un point de levé et ses métadonnées
#[derive(Debug, Clone)]
pub struct PointAnnotation {
    /// Position dans la séquence de points de la surface (0-based)
    pub index: usize,

    pub name: String,
    pub description: String,

    /// Coordonnées locales du placement
    pub local: [f64; 3],

    /// Jeu de propriétés `SurveyData`
    pub properties: Vec<Property>,
}

/// Surface tessellée (sommets locaux + faces 0-based)
#[derive(Debug, Clone)]
pub struct TessellatedSurface {
    pub name: String,
    pub vertices: Vec<[f64; 3]>,
    pub faces: Vec<[usize; 3]>,
}

/// Collection nommée de points partageant un code de classification
#[derive(Debug, Clone)]
pub struct CodeGroup {
    pub code: String,

    /// Indices d'annotations, dans l'ordre des points
    pub members: Vec<usize>,
}

/// Descripteur de CRS projeté + décalage d'origine locale: permet à
/// tout consommateur de reconstruire les coordonnées absolues
#[derive(Debug, Clone)]
pub struct ProjectedCrs {
    pub descriptor: CrsDescriptor,
    pub origin: LocalOrigin,
}

/// Graphe complet: hiérarchie projet → site et entités attachées
#[derive(Debug, Clone)]
pub struct BimGraph {
    pub project_name: String,
    pub site_name: String,
    pub crs: ProjectedCrs,
    pub points: Vec<PointAnnotation>,
    pub surface: Option<TessellatedSurface>,
    pub groups: Vec<CodeGroup>,
}

/// Construit le graphe d'objets depuis la surface du pipeline
pub fn build_graph(surface: &Surface, project_name: &str) -> BimGraph {
    let points: Vec<PointAnnotation> = surface
        .points
        .iter()
        .enumerate()
        .map(|(index, p)| {
            let r = &p.record;
            PointAnnotation {
                index,
                name: format!("Point {}", r.id),
                description: r.description.clone(),
                local: p.local,
                properties: vec![
                    Property {
                        name: "ID",
                        value: PropertyValue::Label(r.id.clone()),
                    },
                    Property {
                        name: "Description",
                        value: PropertyValue::Text(r.description.clone()),
                    },
                    Property {
                        name: "Code",
                        value: PropertyValue::Label(r.code.clone()),
                    },
                    Property {
                        name: "LocalX",
                        value: PropertyValue::Real(p.local[0]),
                    },
                    Property {
                        name: "LocalY",
                        value: PropertyValue::Real(p.local[1]),
                    },
                    Property {
                        name: "LocalZ",
                        value: PropertyValue::Real(p.local[2]),
                    },
                    Property {
                        name: "OriginalX",
                        value: PropertyValue::Real(p.local[0] + surface.origin.x0),
                    },
                    Property {
                        name: "OriginalY",
                        value: PropertyValue::Real(p.local[1] + surface.origin.y0),
                    },
                    Property {
                        name: "OriginalZ",
                        value: PropertyValue::Real(p.local[2] + surface.origin.z0),
                    },
                ],
            }
        })
        .collect();

    let tessellated = if surface.triangles.is_empty() {
        None
    } else {
        Some(TessellatedSurface {
            name: surface.name.clone(),
            vertices: surface.points.iter().map(|p| p.local).collect(),
            faces: surface
                .triangles
                .iter()
                .map(|t| [t.a, t.b, t.c])
                .collect(),
        })
    };

    // Groupes par code, triés pour une sortie déterministe
    let mut by_code: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (index, p) in surface.points.iter().enumerate() {
        if !p.record.code.is_empty() {
            by_code.entry(p.record.code.clone()).or_default().push(index);
        }
    }
    let groups = by_code
        .into_iter()
        .map(|(code, members)| CodeGroup { code, members })
        .collect();

    BimGraph {
        project_name: project_name.to_string(),
        site_name: "Survey Site".to_string(),
        crs: ProjectedCrs {
            descriptor: surface.crs.clone(),
            origin: surface.origin,
        },
        points,
        surface: tessellated,
        groups,
    }
}
