//! Adaptateur d'écriture BIM
//!
//! `graph` construit un graphe d'objets neutre (hiérarchie
//! projet → site, annotations de points, surface tessellée, groupes
//! par code, descripteur de CRS projeté). `spf` est l'adaptateur fin
//! qui sérialise ce graphe en fichier IFC 4X3 (ISO-10303-21); un autre
//! backend BIM pourrait consommer le même graphe.

pub mod graph;
pub mod spf;

pub use graph::{build_graph, BimGraph};
