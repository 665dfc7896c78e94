//! Reprojection de coordonnées avec PROJ
//!
//! Ce module est disponible uniquement avec le feature `reproject`.
//! Sans le feature, seules les transformations identité (CRS source ==
//! CRS cible) sont acceptées.

#[cfg(feature = "reproject")]
use anyhow::{Context, Result};
#[cfg(feature = "reproject")]
use proj::Proj;

/// Reprojection de points entre deux systèmes de coordonnées
#[cfg(feature = "reproject")]
pub struct Reprojector {
    proj: Proj,
    source_epsg: u32,
    target_epsg: u32,
}

#[cfg(feature = "reproject")]
impl Reprojector {
    /// Crée un nouveau reprojector entre deux EPSG.
    ///
    /// Un code EPSG invalide est une erreur de configuration fatale:
    /// elle signale un pipeline mal configuré, pas une donnée mauvaise.
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self> {
        let source = format!("EPSG:{}", source_epsg);
        let target = format!("EPSG:{}", target_epsg);

        let proj = Proj::new_known_crs(&source, &target, None).context(format!(
            "Failed to create projection from {} to {}",
            source, target
        ))?;

        Ok(Self {
            proj,
            source_epsg,
            target_epsg,
        })
    }

    /// Retourne l'EPSG source
    pub fn source_epsg(&self) -> u32 {
        self.source_epsg
    }

    /// Retourne l'EPSG cible
    pub fn target_epsg(&self) -> u32 {
        self.target_epsg
    }

    /// Reprojector inverse (cible → source), pour les tests aller-retour
    pub fn inverse(&self) -> Result<Self> {
        Self::new(self.target_epsg, self.source_epsg)
    }

    /// Transforme une coordonnée plane unique.
    ///
    /// Une coordonnée hors du domaine de la projection est une erreur
    /// par enregistrement (rejet), jamais un abandon du run.
    pub fn project(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        if self.source_epsg == self.target_epsg {
            return Ok((x, y));
        }

        let (px, py) = self
            .proj
            .convert((x, y))
            .context("Coordinate transformation failed")?;

        if !px.is_finite() || !py.is_finite() {
            anyhow::bail!(
                "Coordinate ({}, {}) outside projection domain",
                x,
                y
            );
        }

        Ok((px, py))
    }
}

#[cfg(feature = "reproject")]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wgs84_to_sweref99_tm() {
        // Point connu: Stockholm (environ)
        // WGS84: lon=18.07, lat=59.33
        // SWEREF99 TM: X≈674000, Y≈6580000
        let reprojector = Reprojector::new(4326, 3006).unwrap();

        let (x, y) = reprojector.project(18.07, 59.33).unwrap();

        assert!(
            x > 650_000.0 && x < 700_000.0,
            "Easting should be around 674000, got {}",
            x
        );
        assert!(
            y > 6_550_000.0 && y < 6_610_000.0,
            "Northing should be around 6580000, got {}",
            y
        );
    }

    #[test]
    fn test_identity_transform() {
        let reprojector = Reprojector::new(3006, 3006).unwrap();

        let (x, y) = reprojector.project(157896.161, 6407066.260).unwrap();
        assert_eq!(x, 157896.161);
        assert_eq!(y, 6407066.260);
    }

    #[test]
    fn test_round_trip() {
        // Propriété aller-retour de la projection sous-jacente
        let forward = Reprojector::new(4326, 3006).unwrap();
        let back = forward.inverse().unwrap();

        let (lon, lat) = (18.063240, 59.334591);
        let (x, y) = forward.project(lon, lat).unwrap();
        let (lon2, lat2) = back.project(x, y).unwrap();

        assert!((lon - lon2).abs() < 1e-7, "lon drifted: {} vs {}", lon, lon2);
        assert!((lat - lat2).abs() < 1e-7, "lat drifted: {} vs {}", lat, lat2);
    }

    #[test]
    fn test_invalid_epsg() {
        let result = Reprojector::new(99999, 4326);
        assert!(result.is_err());
    }
}

// Implémentation factice quand le feature reproject est désactivé
#[cfg(not(feature = "reproject"))]
use anyhow::{bail, Result};

/// Reprojector factice - seules les transformations identité passent
#[cfg(not(feature = "reproject"))]
pub struct Reprojector {
    epsg: u32,
}

#[cfg(not(feature = "reproject"))]
impl Reprojector {
    /// Tente de créer un reprojector - échoue si les EPSG diffèrent
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self> {
        if source_epsg == target_epsg {
            Ok(Self { epsg: source_epsg })
        } else {
            bail!(
                "Reprojection from EPSG:{} to EPSG:{} requires the 'reproject' feature. \
                 Build with: cargo build --features reproject",
                source_epsg,
                target_epsg
            )
        }
    }

    /// Retourne l'EPSG source
    pub fn source_epsg(&self) -> u32 {
        self.epsg
    }

    /// Retourne l'EPSG cible
    pub fn target_epsg(&self) -> u32 {
        self.epsg
    }

    /// Reprojector inverse (identité)
    pub fn inverse(&self) -> Result<Self> {
        Ok(Self { epsg: self.epsg })
    }

    /// Retourne la coordonnée inchangée
    pub fn project(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        Ok((x, y))
    }
}
