//! Rapport de run avec graceful degradation
//!
//! Collecte les rejets, warnings et statuts d'artefacts d'un run
//! complet. Aucune donnée n'est écartée silencieusement: chaque rejet
//! porte sa ligne source et son motif, pour laisser l'appelant juger
//! si le taux de rejet est acceptable.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use crate::pipeline::WriteStatus;
use pnezd::RowWarning;

/// Statut global du run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    /// Run réussi sans rejet ni échec d'artefact
    Success,
    /// Run réussi avec des rejets ou un artefact en échec
    PartialSuccess,
    /// Aucun point accepté ou aucun artefact produit
    Failed,
}

/// Stade du pipeline ayant produit un rejet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectStage {
    /// Validation à l'ingestion
    Ingest,
    /// Projection de coordonnées
    Transform,
}

/// Rejet par enregistrement avec contexte
#[derive(Debug, Clone, Serialize)]
pub struct Reject {
    /// Stade d'origine
    pub stage: RejectStage,

    /// Numéro de ligne source (1-based)
    pub row: usize,

    /// Identifiant du point si connu
    pub id: Option<String>,

    /// Contenu brut de la ligne (vide pour les rejets de projection)
    pub raw: String,

    /// Motif du rejet
    pub reason: String,
}

/// Rapport complet d'un run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Fichier source
    pub input: String,

    /// Durée du run
    pub duration_secs: f64,

    /// Statut global
    pub status: RunStatus,

    // Compteurs globaux
    /// Nombre de points acceptés
    pub records_accepted: usize,
    /// Nombre de lignes rejetées
    pub records_rejected: usize,
    /// Nombre de triangles de la surface
    pub triangles: usize,

    /// Rejets par motif
    pub by_reason: HashMap<String, usize>,

    /// Statut de chaque artefact demandé
    pub artifacts: BTreeMap<String, WriteStatus>,

    /// Liste des rejets
    pub rejects: Vec<Reject>,
    /// Liste des warnings
    pub warnings: Vec<RowWarning>,
}

impl RunReport {
    /// Crée un nouveau rapport pour un fichier source
    pub fn new(input: &str) -> Self {
        Self {
            input: input.to_string(),
            duration_secs: 0.0,
            status: RunStatus::Success,
            records_accepted: 0,
            records_rejected: 0,
            triangles: 0,
            by_reason: HashMap::new(),
            artifacts: BTreeMap::new(),
            rejects: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Enregistre le nombre de points acceptés
    pub fn record_accepted(&mut self, count: usize) {
        self.records_accepted = count;
    }

    /// Enregistre un rejet
    pub fn record_reject(&mut self, reject: Reject) {
        self.records_rejected += 1;
        *self.by_reason.entry(reject.reason.clone()).or_default() += 1;
        self.rejects.push(reject);
    }

    /// Enregistre un warning
    pub fn record_warning(&mut self, warning: RowWarning) {
        self.warnings.push(warning);
    }

    /// Enregistre le statut d'un artefact
    pub fn record_artifact(&mut self, name: &str, status: WriteStatus) {
        self.artifacts.insert(name.to_string(), status);
    }

    /// Enregistre le nombre de triangles
    pub fn set_triangles(&mut self, count: usize) {
        self.triangles = count;
    }

    /// Définit la durée du run
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final
    pub fn finalize(&mut self) {
        let artifact_failed = self
            .artifacts
            .values()
            .any(|s| matches!(s, WriteStatus::Failed { .. }));
        let artifact_written = self
            .artifacts
            .values()
            .any(|s| matches!(s, WriteStatus::Written { .. }));

        self.status = if self.records_accepted == 0 {
            RunStatus::Failed
        } else if !self.artifacts.is_empty() && !artifact_written {
            RunStatus::Failed
        } else if self.records_rejected > 0 || artifact_failed {
            RunStatus::PartialSuccess
        } else {
            RunStatus::Success
        };
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("RUN REPORT - {}", self.input);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);

        println!("\n--- SUMMARY ---");
        println!(
            "Records: {} accepted, {} rejected, {} warnings",
            self.records_accepted,
            self.records_rejected,
            self.warnings.len()
        );
        println!("Triangles: {}", self.triangles);

        if !self.artifacts.is_empty() {
            println!("\n--- ARTIFACTS ---");
            for (name, status) in &self.artifacts {
                match status {
                    WriteStatus::Written { bytes, checksum } => {
                        println!("  {}: {} bytes (blake3 {})", name, bytes, &checksum[..16]);
                    }
                    WriteStatus::Failed { reason } => {
                        println!("  {}: FAILED - {}", name, reason);
                    }
                }
            }
        }

        if !self.by_reason.is_empty() {
            println!("\n--- REJECTS BY REASON ---");
            let mut reasons: Vec<_> = self.by_reason.iter().collect();
            reasons.sort_by_key(|(k, _)| k.as_str());
            for (reason, count) in reasons {
                println!("  {}: {}", reason, count);
            }
        }

        if !self.warnings.is_empty() {
            println!("\n--- WARNINGS ({}) ---", self.warnings.len());
            for w in self.warnings.iter().take(10) {
                println!("  [row {}] {}: {}", w.row, w.id, w.message);
            }
            if self.warnings.len() > 10 {
                println!("  ... and {} more", self.warnings.len() - 10);
            }
        }

        if !self.rejects.is_empty() {
            println!("\n--- REJECTS ({}) ---", self.rejects.len());
            for r in self.rejects.iter().take(20) {
                let id = r.id.as_deref().unwrap_or("-");
                println!("  {:?} [row {}:{}] {}", r.stage, r.row, id, r.reason);
            }
            if self.rejects.len() > 20 {
                println!("  ... and {} more", self.rejects.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{}: {} accepted, {} rejected, {} triangles, {} artifacts",
            self.input,
            self.records_accepted,
            self.records_rejected,
            self.triangles,
            self.artifacts.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reject(reason: &str) -> Reject {
        Reject {
            stage: RejectStage::Ingest,
            row: 3,
            id: None,
            raw: "raw".to_string(),
            reason: reason.to_string(),
        }
    }

    fn written() -> WriteStatus {
        WriteStatus::Written {
            bytes: 100,
            checksum: "ab".repeat(32),
        }
    }

    fn failed() -> WriteStatus {
        WriteStatus::Failed {
            reason: "disk full".to_string(),
        }
    }

    #[test]
    fn test_finalize_success() {
        let mut report = RunReport::new("survey.csv");
        report.record_accepted(10);
        report.record_artifact("bim", written());
        report.finalize();
        assert_eq!(report.status, RunStatus::Success);
    }

    #[test]
    fn test_finalize_partial_on_rejects() {
        let mut report = RunReport::new("survey.csv");
        report.record_accepted(9);
        report.record_reject(reject("invalid coordinate X: 'abc'"));
        report.record_artifact("bim", written());
        report.finalize();
        assert_eq!(report.status, RunStatus::PartialSuccess);
    }

    #[test]
    fn test_finalize_partial_on_single_artifact_failure() {
        // L'échec d'un artefact n'empêche pas l'autre branche
        let mut report = RunReport::new("survey.csv");
        report.record_accepted(10);
        report.record_artifact("bim", failed());
        report.record_artifact("machine-control", written());
        report.finalize();
        assert_eq!(report.status, RunStatus::PartialSuccess);
    }

    #[test]
    fn test_finalize_failed_when_no_accepted_records() {
        let mut report = RunReport::new("survey.csv");
        report.record_reject(reject("missing id"));
        report.finalize();
        assert_eq!(report.status, RunStatus::Failed);
    }

    #[test]
    fn test_finalize_failed_when_all_artifacts_fail() {
        let mut report = RunReport::new("survey.csv");
        report.record_accepted(10);
        report.record_artifact("bim", failed());
        report.record_artifact("machine-control", failed());
        report.finalize();
        assert_eq!(report.status, RunStatus::Failed);
    }

    #[test]
    fn test_rejects_counted_by_reason() {
        let mut report = RunReport::new("survey.csv");
        report.record_reject(reject("missing id"));
        report.record_reject(reject("missing id"));
        report.record_reject(reject("duplicate id (first seen at row 2)"));
        assert_eq!(report.records_rejected, 3);
        assert_eq!(report.by_reason["missing id"], 2);
    }

    #[test]
    fn test_warnings_do_not_degrade_status() {
        let mut report = RunReport::new("survey.csv");
        report.record_accepted(5);
        report.record_warning(RowWarning {
            row: 4,
            id: "7".to_string(),
            message: "missing Z, defaulted to 0".to_string(),
        });
        report.record_artifact("bim", written());
        report.finalize();
        assert_eq!(report.status, RunStatus::Success);
    }

    #[test]
    fn test_summary() {
        let mut report = RunReport::new("survey.csv");
        report.record_accepted(26);
        report.set_triangles(39);
        let summary = report.summary();
        assert!(summary.contains("survey.csv"));
        assert!(summary.contains("26 accepted"));
        assert!(summary.contains("39 triangles"));
    }
}
