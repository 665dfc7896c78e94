//! Exports machine-control et contrôle qualité
//!
//! - `landxml`: document de surface consommé par le matériel de
//!   guidage d'engins
//! - `geojson`: dump des points transformés pour inspection SIG

pub mod geojson;
pub mod landxml;
