//! Triangulation de surface (TIN 2.5D)
//!
//! Delaunay 2D sur la projection (local_x, local_y) des points; le Z de
//! chaque sommet vient du local_z du point. Surface purement 2.5D,
//! jamais un maillage volumique.

use std::collections::HashMap;

use delaunator::{triangulate, Point};
use geo::{Area, Coord, Triangle as GeoTriangle};
use tracing::debug;

use crate::config::CrsDescriptor;
use crate::transform::{LocalOrigin, TransformedRecord};
use pnezd::RowWarning;

/// Triple ordonné d'indices dans la séquence de points.
///
/// Invariants: aire strictement positive, enroulement anti-horaire
/// dans le plan XY, plus petit indice en tête.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TriangleRef {
    pub a: usize,
    pub b: usize,
    pub c: usize,
}

/// Surface triangulée: valeur pure, sans ressource externe
#[derive(Debug, Clone)]
pub struct Surface {
    pub name: String,

    /// Tous les points acceptés, dans l'ordre du lot transformé
    pub points: Vec<TransformedRecord>,

    /// Triangles sur les positions XY distinctes; vide si moins de
    /// 3 positions distinctes ou points colinéaires
    pub triangles: Vec<TriangleRef>,

    pub crs: CrsDescriptor,
    pub origin: LocalOrigin,
}

/// Construit la surface triangulée du lot.
///
/// Les positions XY dupliquées à la précision d'arrondi près gardent la
/// première occurrence pour la triangulation; tous les points restent
/// dans `Surface::points` (l'écart entre les deux comptes est documenté
/// par les warnings retournés). Moins de 3 positions distinctes ou des
/// points exactement colinéaires donnent une surface sans triangle:
/// ce n'est pas une erreur.
pub fn build_surface(
    name: &str,
    points: Vec<TransformedRecord>,
    crs: CrsDescriptor,
    origin: LocalOrigin,
    precision: u8,
) -> (Surface, Vec<RowWarning>) {
    let factor = 10_f64.powi(precision as i32);
    let mut warnings = Vec::new();

    // Première occurrence par position XY quantifiée
    let mut first_by_key: HashMap<(i64, i64), usize> = HashMap::new();
    let mut distinct: Vec<usize> = Vec::with_capacity(points.len());

    for (i, p) in points.iter().enumerate() {
        let key = (
            (p.local[0] * factor).round() as i64,
            (p.local[1] * factor).round() as i64,
        );
        match first_by_key.get(&key) {
            Some(&first) => warnings.push(RowWarning {
                row: p.record.row,
                id: p.record.id.clone(),
                message: format!(
                    "duplicate XY position (same as point '{}'), excluded from triangulation",
                    points[first].record.id
                ),
            }),
            None => {
                first_by_key.insert(key, i);
                distinct.push(i);
            }
        }
    }

    let triangles = if distinct.len() < 3 {
        Vec::new()
    } else {
        delaunay_triangles(&points, &distinct)
    };

    debug!(
        points = points.len(),
        distinct = distinct.len(),
        triangles = triangles.len(),
        "Surface built"
    );

    (
        Surface {
            name: name.to_string(),
            points,
            triangles,
            crs,
            origin,
        },
        warnings,
    )
}

/// Triangulation Delaunay sur les positions distinctes, indices
/// remappés vers la séquence complète
fn delaunay_triangles(points: &[TransformedRecord], distinct: &[usize]) -> Vec<TriangleRef> {
    let flat: Vec<Point> = distinct
        .iter()
        .map(|&i| Point {
            x: points[i].local[0],
            y: points[i].local[1],
        })
        .collect();

    // Déterministe pour un ordre d'entrée donné (exigé pour les tests
    // de régression contre des sorties de référence)
    let triangulation = triangulate(&flat);

    let mut triangles = Vec::with_capacity(triangulation.triangles.len() / 3);
    for t in triangulation.triangles.chunks_exact(3) {
        let (a, b, c) = (distinct[t[0]], distinct[t[1]], distinct[t[2]]);
        if let Some(triangle) = orient_ccw(points, a, b, c) {
            triangles.push(canonical(triangle));
        }
    }

    // Ordre canonique indépendant des détails internes de l'algorithme
    triangles.sort_unstable_by_key(|t| (t.a, t.b, t.c));
    triangles
}

/// Force l'enroulement anti-horaire; élimine les triangles d'aire nulle
fn orient_ccw(points: &[TransformedRecord], a: usize, b: usize, c: usize) -> Option<TriangleRef> {
    let coord = |i: usize| Coord {
        x: points[i].local[0],
        y: points[i].local[1],
    };

    let area = GeoTriangle::new(coord(a), coord(b), coord(c)).signed_area();
    if area > 0.0 {
        Some(TriangleRef { a, b, c })
    } else if area < 0.0 {
        Some(TriangleRef { a, b: c, c: b })
    } else {
        None
    }
}

/// Rotation du triangle pour mettre le plus petit indice en tête,
/// enroulement préservé
fn canonical(t: TriangleRef) -> TriangleRef {
    let TriangleRef { a, b, c } = t;
    if a < b && a < c {
        TriangleRef { a, b, c }
    } else if b < a && b < c {
        TriangleRef { a: b, b: c, c: a }
    } else {
        TriangleRef { a: c, b: a, c: b }
    }
}
