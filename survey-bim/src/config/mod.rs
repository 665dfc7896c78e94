//! Configuration du pipeline
//!
//! Le registre des systèmes de coordonnées et la configuration de run
//! sont des valeurs immuables passées explicitement dans la chaîne
//! d'appels: aucun état CRS global au processus.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::transform::OriginPolicy;
use pnezd::ParseOptions;

/// Variable d'environnement pointant vers un registre CRS externe
const CRS_FILE_ENV: &str = "SURVEY_CRS_FILE";

/// Descripteur d'un système de coordonnées, attaché à la surface et
/// aux deux artefacts de sortie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrsDescriptor {
    pub epsg_code: u32,
    pub name: String,
}

/// Profil nommé du registre
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrsProfile {
    pub epsg_code: u32,
    pub display_name: String,
}

/// Registre des systèmes de coordonnées connus
#[derive(Debug, Deserialize, Serialize)]
pub struct CrsRegistry {
    #[serde(flatten)]
    pub profiles: HashMap<String, CrsProfile>,
}

impl CrsRegistry {
    /// Charge le registre embarqué
    pub fn embedded() -> Result<Self> {
        serde_json::from_str(include_str!("presets/crs.json"))
            .context("Failed to parse embedded CRS registry")
    }

    /// Charge un registre depuis un fichier JSON
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read CRS registry: {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse CRS registry JSON")
    }

    /// Registre depuis `SURVEY_CRS_FILE` si défini, sinon l'embarqué
    pub fn from_env_or_embedded() -> Result<Self> {
        match std::env::var(CRS_FILE_ENV) {
            Ok(path) => Self::load(Path::new(&path)),
            Err(_) => Self::embedded(),
        }
    }

    /// Résout une spécification CRS: nom de profil, `EPSG:nnnn`, ou
    /// code numérique nu
    pub fn resolve(&self, spec: &str) -> Result<CrsDescriptor> {
        let spec = spec.trim();

        if let Some(profile) = self.profiles.get(spec) {
            return Ok(CrsDescriptor {
                epsg_code: profile.epsg_code,
                name: profile.display_name.clone(),
            });
        }

        let code_str = spec
            .strip_prefix("EPSG:")
            .or_else(|| spec.strip_prefix("epsg:"))
            .unwrap_or(spec);

        if let Ok(code) = code_str.parse::<u32>() {
            // Reprendre le nom d'affichage si un profil porte ce code
            let name = self
                .profiles
                .values()
                .find(|p| p.epsg_code == code)
                .map(|p| p.display_name.clone())
                .unwrap_or_else(|| format!("EPSG:{}", code));
            return Ok(CrsDescriptor {
                epsg_code: code,
                name,
            });
        }

        anyhow::bail!(
            "Unknown CRS '{}'. Use a profile name ({}), EPSG:nnnn or a bare code",
            spec,
            self.profile_names().join(", ")
        )
    }

    fn profile_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Configuration d'un run du pipeline
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// CRS des coordonnées du fichier source
    pub source: CrsDescriptor,

    /// CRS cible des artefacts
    pub target: CrsDescriptor,

    /// Politique de résolution de l'origine locale
    pub origin: OriginPolicy,

    /// Nombre de décimales des coordonnées locales
    pub precision: u8,

    /// Nom de projet embarqué dans les artefacts
    pub project_name: String,

    /// Nom de la surface triangulée
    pub surface_name: String,

    /// Options de parsing de la table source
    pub parse: ParseOptions,
}

impl RunConfig {
    /// Valide les bornes de la configuration
    pub fn validate(&self) -> Result<()> {
        // Au-delà de 9 décimales le quantificateur i64 du dédoublonnage
        // XY déborderait pour des coordonnées métriques nationales
        if self.precision > 9 {
            anyhow::bail!(
                "Coordinate precision must be 0-9 decimals, got {}",
                self.precision
            );
        }
        if self.project_name.is_empty() {
            anyhow::bail!("Project name must not be empty");
        }
        Ok(())
    }
}
