//! Porta de integração com o motor de Reconhecimento de Entidades.
//!
//! O motor de NER é um colaborador externo; este módulo define apenas o
//! contrato consumido pela resolução de documentos. Qualquer span com um
//! rótulo de localidade vira candidato a menção de município, ao lado dos
//! matches do automato e dos padrões determinísticos.

use serde::{Deserialize, Serialize};

/// Rótulos tratados como menções de localidade.
pub const LOCATION_LABELS: &[&str] = &["LOC", "LOCATION", "GPE", "CITY"];

/// Span de entidade produzido pelo motor de NER ou por regras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpan {
    pub label: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub score: f64,
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    "ner".to_string()
}

/// Contrato do motor de reconhecimento de entidades.
pub trait NerEngine {
    fn analyze(&self, text: &str) -> Vec<EntitySpan>;
}

/// Verdadeiro quando o rótulo indica uma localidade.
pub fn is_location_label(label: &str) -> bool {
    LOCATION_LABELS.contains(&label)
}
