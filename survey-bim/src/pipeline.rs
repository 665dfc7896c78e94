//! Orchestration du pipeline complet
//!
//! Séquence Ingestion → Transformation → Triangulation → (BIM |
//! machine-control), en accumulant les rejets par enregistrement au
//! lieu d'abandonner au premier. Seules les erreurs fatales (source
//! illisible, CRS invalide, destination non inscriptible) interrompent
//! le run; un échec de sérialisation n'est fatal que pour son artefact.
//!
//! Le run est une passe batch synchrone: chaque run possède son lot de
//! points et son origine, jetés à la fin. Relancer sur une entrée et
//! une configuration inchangées produit des artefacts identiques à
//! l'octet près.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::bim;
use crate::config::RunConfig;
use crate::export::{geojson, landxml};
use crate::report::{Reject, RejectStage, RunReport};
use crate::tin::{self, Surface};
use crate::transform::{self, LocalOrigin, Reprojector, TransformedRecord};
use pnezd::PnezdError;

/// Erreur fatale interrompant le run complet
#[derive(Debug, Error)]
pub enum FatalError {
    /// Source illisible ou inexploitable
    #[error("Unreadable source {path}: {reason}")]
    UnreadableSource { path: PathBuf, reason: String },

    /// Configuration invalide (CRS inconnu, précision hors bornes)
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    /// Destination non inscriptible
    #[error("Unwritable destination {path}: {reason}")]
    UnwritableDestination { path: PathBuf, reason: String },
}

/// Artefact de sortie demandé
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ArtifactKind {
    /// Modèle BIM (IFC 4X3)
    Bim,
    /// Surface machine-control (LandXML)
    MachineControl,
    /// Points transformés en GeoJSON (contrôle qualité)
    GeoJson,
}

impl ArtifactKind {
    /// Nom stable de l'artefact (clés de rapport)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bim => "bim",
            Self::MachineControl => "machine-control",
            Self::GeoJson => "geojson",
        }
    }

    /// Extension du fichier de sortie
    fn extension(&self) -> &'static str {
        match self {
            Self::Bim => "ifc",
            Self::MachineControl => "xml",
            Self::GeoJson => "geojson",
        }
    }
}

/// Statut d'écriture d'un artefact
#[derive(Debug, Clone, Serialize)]
pub enum WriteStatus {
    /// Artefact écrit (taille + checksum blake3 du contenu)
    Written { bytes: u64, checksum: String },
    /// Échec de sérialisation ou d'écriture, fatal pour cet artefact
    /// seulement
    Failed { reason: String },
}

/// Résultat agrégé d'un run
#[derive(Debug)]
pub struct PipelineResult {
    /// Points acceptés, dans l'ordre des lignes source
    pub accepted: Vec<TransformedRecord>,

    /// Rejets de l'ingestion et de la transformation
    pub rejected: Vec<Reject>,

    /// Surface triangulée; None si aucun point accepté
    pub surface: Option<Surface>,

    /// Origine locale résolue
    pub origin: LocalOrigin,

    /// Statut de chaque artefact demandé
    pub artifacts: BTreeMap<ArtifactKind, WriteStatus>,
}

/// Exécute le pipeline complet sur un fichier source.
///
/// Les chemins de sortie sont dérivés du nom du fichier source:
/// `<stem>.ifc`, `<stem>.xml`, `<stem>.geojson` dans `output_dir`.
pub fn run(
    config: &RunConfig,
    input: &Path,
    output_dir: &Path,
    kinds: &[ArtifactKind],
) -> Result<(PipelineResult, RunReport), FatalError> {
    let started_at = Instant::now();
    let mut report = RunReport::new(&input.display().to_string());

    config.validate().map_err(|e| FatalError::Config {
        reason: e.to_string(),
    })?;

    // Destination vérifiée avant tout travail
    std::fs::create_dir_all(output_dir).map_err(|e| FatalError::UnwritableDestination {
        path: output_dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    // Un EPSG invalide est une erreur de configuration, pas un rejet
    let reprojector = Reprojector::new(config.source.epsg_code, config.target.epsg_code)
        .map_err(|e| FatalError::Config {
            reason: e.to_string(),
        })?;

    // 1. Ingestion
    let parsed = pnezd::parse(input, &config.parse).map_err(|e| match e {
        PnezdError::InvalidOptions(reason) => FatalError::Config { reason },
        other => FatalError::UnreadableSource {
            path: input.to_path_buf(),
            reason: other.to_string(),
        },
    })?;

    info!(
        records = parsed.records.len(),
        rejects = parsed.rejects.len(),
        delimiter = %parsed.delimiter,
        "Ingestion complete"
    );

    let mut rejected: Vec<Reject> = parsed
        .rejects
        .into_iter()
        .map(|r| Reject {
            stage: RejectStage::Ingest,
            row: r.row,
            id: None,
            raw: r.raw,
            reason: r.reason.to_string(),
        })
        .collect();
    let mut warnings = parsed.warnings;

    // 2. Transformation vers le CRS cible + ancrage à l'origine locale
    let outcome = transform::transform_batch(
        &parsed.records,
        &reprojector,
        config.origin,
        config.precision,
    );
    rejected.extend(outcome.rejects);

    // 3. Triangulation (dégradation en points seuls si dégénérée)
    let surface = if outcome.records.is_empty() {
        None
    } else {
        let (surface, tin_warnings) = tin::build_surface(
            &config.surface_name,
            outcome.records.clone(),
            config.target.clone(),
            outcome.origin,
            config.precision,
        );
        warnings.extend(tin_warnings);
        Some(surface)
    };

    // 4. Fan-out: chaque artefact écrit indépendamment
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("survey");
    let mut artifacts = BTreeMap::new();

    for &kind in kinds {
        let path = output_dir.join(format!("{}.{}", stem, kind.extension()));
        let status = match &surface {
            Some(surface) => write_artifact(kind, &path, surface, config),
            None => WriteStatus::Failed {
                reason: "no accepted records".to_string(),
            },
        };

        if let WriteStatus::Failed { reason } = &status {
            warn!(artifact = kind.name(), reason = %reason, "Artifact failed");
        } else {
            info!(artifact = kind.name(), path = %path.display(), "Artifact written");
        }
        artifacts.insert(kind, status);
    }

    // Rapport
    report.record_accepted(outcome.records.len());
    for reject in &rejected {
        report.record_reject(reject.clone());
    }
    for warning in &warnings {
        report.record_warning(warning.clone());
    }
    if let Some(s) = &surface {
        report.set_triangles(s.triangles.len());
    }
    for (kind, status) in &artifacts {
        report.record_artifact(kind.name(), status.clone());
    }
    report.set_duration(started_at.elapsed());
    report.finalize();

    Ok((
        PipelineResult {
            accepted: outcome.records,
            rejected,
            surface,
            origin: outcome.origin,
            artifacts,
        },
        report,
    ))
}

/// Sérialise un artefact en mémoire, le valide le cas échéant, puis
/// l'écrit d'un bloc (fermeture garantie sur tous les chemins)
fn write_artifact(
    kind: ArtifactKind,
    path: &Path,
    surface: &Surface,
    config: &RunConfig,
) -> WriteStatus {
    let serialized: anyhow::Result<Vec<u8>> = (|| {
        let mut buffer = Vec::new();
        match kind {
            ArtifactKind::Bim => {
                let graph = bim::build_graph(surface, &config.project_name);
                bim::spf::write_spf(&mut buffer, &graph, config.precision)?;
            }
            ArtifactKind::MachineControl => {
                landxml::write_landxml(&mut buffer, surface, config.precision, &config.project_name)?;
                let document = std::str::from_utf8(&buffer)?;
                landxml::validate_document(document)?;
            }
            ArtifactKind::GeoJson => {
                geojson::write_geojson(&mut buffer, surface)?;
            }
        }
        Ok(buffer)
    })();

    match serialized {
        Ok(bytes) => match std::fs::write(path, &bytes) {
            Ok(()) => WriteStatus::Written {
                bytes: bytes.len() as u64,
                checksum: hex::encode(blake3::hash(&bytes).as_bytes()),
            },
            Err(e) => WriteStatus::Failed {
                reason: format!("write {}: {}", path.display(), e),
            },
        },
        Err(e) => WriteStatus::Failed {
            reason: e.to_string(),
        },
    }
}
