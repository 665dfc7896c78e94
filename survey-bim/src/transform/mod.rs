//! Moteur de transformation de coordonnées
//!
//! Projette chaque point du CRS source vers le CRS cible, résout
//! l'origine locale selon la politique configurée, puis ancre les
//! coordonnées: `local = monde - origine`, arrondi à la précision
//! configurée. L'invariant `local + origine == monde` tient à
//! `10^-précision` près pour chaque point accepté.

pub mod reproject;

pub use reproject::Reprojector;

use serde::Serialize;
use tracing::debug;

use crate::report::{Reject, RejectStage};
use pnezd::SurveyRecord;

/// Origine locale soustraite des coordonnées absolues
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocalOrigin {
    pub x0: f64,
    pub y0: f64,
    pub z0: f64,
}

/// Politique de résolution de l'origine locale
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OriginPolicy {
    /// Origine fournie par la configuration
    Fixed { x0: f64, y0: f64, z0: f64 },

    /// Minimum composante par composante du lot projeté
    DeriveMin,

    /// Centre de gravité du lot projeté, arrondi à la précision du run
    DeriveCentroid,
}

/// Enregistrement ancré à l'origine locale
///
/// `world` garde la coordonnée cible avant arrondi: c'est la référence
/// de l'invariant de reconstruction.
#[derive(Debug, Clone)]
pub struct TransformedRecord {
    pub record: SurveyRecord,
    pub world: [f64; 3],
    pub local: [f64; 3],
}

/// Résultat de la transformation d'un lot
#[derive(Debug)]
pub struct TransformOutcome {
    pub records: Vec<TransformedRecord>,
    pub rejects: Vec<Reject>,
    pub origin: LocalOrigin,
}

/// Arrondit à `precision` décimales, demi-pas à l'opposé de zéro.
///
/// `f64::round` arrondit les demi-pas à l'opposé de zéro: c'est la
/// convention attendue par l'outillage de référence, là où un arrondi
/// banquier divergerait silencieusement.
pub fn round_half_away(value: f64, precision: u8) -> f64 {
    let factor = 10_f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Transforme un lot de points validés.
///
/// La projection est le seul sous-pas autorisé à échouer par
/// enregistrement: une coordonnée hors domaine produit un rejet, le run
/// continue. Chaque transformation est une fonction pure de
/// (point, CRS source, CRS cible, origine, précision): aucun point
/// n'influence la transformation d'un autre.
pub fn transform_batch(
    records: &[SurveyRecord],
    reprojector: &Reprojector,
    policy: OriginPolicy,
    precision: u8,
) -> TransformOutcome {
    let mut projected: Vec<(SurveyRecord, [f64; 3])> = Vec::with_capacity(records.len());
    let mut rejects = Vec::new();

    for record in records {
        match reprojector.project(record.x, record.y) {
            // La projection est plane: Z reste dans le datum vertical
            // du levé
            Ok((wx, wy)) => projected.push((record.clone(), [wx, wy, record.z])),
            Err(e) => rejects.push(Reject {
                stage: RejectStage::Transform,
                row: record.row,
                id: Some(record.id.clone()),
                raw: String::new(),
                reason: e.to_string(),
            }),
        }
    }

    let origin = resolve_origin(policy, &projected, precision);
    debug!(
        x0 = origin.x0,
        y0 = origin.y0,
        z0 = origin.z0,
        accepted = projected.len(),
        rejected = rejects.len(),
        "Local origin resolved"
    );

    let records = projected
        .into_iter()
        .map(|(record, world)| {
            let local = [
                round_half_away(world[0] - origin.x0, precision),
                round_half_away(world[1] - origin.y0, precision),
                round_half_away(world[2] - origin.z0, precision),
            ];
            TransformedRecord {
                record,
                world,
                local,
            }
        })
        .collect();

    TransformOutcome {
        records,
        rejects,
        origin,
    }
}

/// Résout l'origine locale depuis la politique et le lot projeté
fn resolve_origin(
    policy: OriginPolicy,
    projected: &[(SurveyRecord, [f64; 3])],
    precision: u8,
) -> LocalOrigin {
    match policy {
        OriginPolicy::Fixed { x0, y0, z0 } => LocalOrigin { x0, y0, z0 },
        OriginPolicy::DeriveMin => {
            let mut origin = LocalOrigin {
                x0: f64::INFINITY,
                y0: f64::INFINITY,
                z0: f64::INFINITY,
            };
            for (_, world) in projected {
                origin.x0 = origin.x0.min(world[0]);
                origin.y0 = origin.y0.min(world[1]);
                origin.z0 = origin.z0.min(world[2]);
            }
            if projected.is_empty() {
                LocalOrigin {
                    x0: 0.0,
                    y0: 0.0,
                    z0: 0.0,
                }
            } else {
                origin
            }
        }
        OriginPolicy::DeriveCentroid => {
            if projected.is_empty() {
                return LocalOrigin {
                    x0: 0.0,
                    y0: 0.0,
                    z0: 0.0,
                };
            }
            let n = projected.len() as f64;
            let mut sum = [0.0_f64; 3];
            for (_, world) in projected {
                sum[0] += world[0];
                sum[1] += world[1];
                sum[2] += world[2];
            }
            // Arrondi à la précision du run: l'origine résolue est
            // elle-même représentable et les re-runs reproductibles
            LocalOrigin {
                x0: round_half_away(sum[0] / n, precision),
                y0: round_half_away(sum[1] / n, precision),
                z0: round_half_away(sum[2] / n, precision),
            }
        }
    }
}
