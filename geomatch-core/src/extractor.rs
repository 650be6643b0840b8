//! # Extração de Cidades por Campo do Artigo
//!
//! Percorre os campos textuais relevantes de um artigo (título e corpo,
//! com fallback para `content`), roda o matcher em cada um e anexa os
//! sinais contextuais. O payload resultante carrega também o texto
//! normalizado e o mapa de offsets de cada campo, permitindo auditar os
//! intervalos encontrados contra o texto original.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fetch::now_isoformat;
use crate::matcher::CityMatcher;
use crate::normalizer::normalize_text_with_offsets;
use crate::signals::{enrich_matches_with_signals, Signals};

/// Documento de entrada do enriquecimento.
///
/// Campos desconhecidos do JSON de origem são ignorados na
/// desserialização; os ausentes ficam vazios.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Article {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_version: Option<String>,
}

impl Article {
    /// Identificador preferencial do artigo (`id`, depois `url`).
    pub fn identifier(&self) -> String {
        self.id
            .as_deref()
            .filter(|value| !value.is_empty())
            .or(self.url.as_deref().filter(|value| !value.is_empty()))
            .unwrap_or("unknown-article")
            .to_string()
    }

    /// Verdadeiro quando não há nenhum campo textual para analisar.
    pub fn is_empty(&self) -> bool {
        let has_text = |value: &Option<String>| {
            value
                .as_deref()
                .map(|text| !text.trim().is_empty())
                .unwrap_or(false)
        };
        !has_text(&self.title) && !has_text(&self.body) && !has_text(&self.content)
    }
}

/// Texto de um campo com sua versão normalizada e o mapa de offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPayload {
    pub text: String,
    pub normalized_text: String,
    pub offsets: Vec<usize>,
}

/// Ocorrência encontrada em um campo específico do artigo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub field: String,
    pub city_id: Option<String>,
    pub name: String,
    pub state_code: Option<String>,
    pub surface: String,
    pub start: usize,
    pub end: usize,
    pub method: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signals: Option<Signals>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Metadados da execução da extração.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExtractionMetadata {
    pub version: String,
    pub ts: String,
    pub notes: Vec<String>,
}

/// Resultado estruturado da extração de cidades de um artigo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExtractionPayload {
    pub fields: BTreeMap<String, FieldPayload>,
    pub matches: Vec<FieldMatch>,
    #[serde(rename = "cities_extraction")]
    pub metadata: ExtractionMetadata,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|text| !text.is_empty())
}

/// Gera o payload estruturado com as cidades mencionadas no artigo.
///
/// O título é sempre analisado quando presente. O corpo tem precedência
/// sobre `content`; quando só `content` existe, a nota
/// `used_content_field` registra o fallback. A ausência de ambos gera a
/// nota `missing_body_and_content`.
pub fn extract_cities_from_article(
    article: &Article,
    matcher: &CityMatcher,
    catalog_version: &str,
) -> ExtractionPayload {
    let mut notes: Vec<String> = Vec::new();
    let mut fields_payload: BTreeMap<String, FieldPayload> = BTreeMap::new();
    let mut matches_payload: Vec<FieldMatch> = Vec::new();

    let mut fields_to_process: Vec<(&str, &str)> = Vec::new();
    if let Some(title) = non_empty(&article.title) {
        fields_to_process.push(("title", title));
    }
    if let Some(body) = non_empty(&article.body) {
        fields_to_process.push(("body", body));
    } else if let Some(content) = non_empty(&article.content) {
        fields_to_process.push(("content", content));
        notes.push("used_content_field".to_string());
    } else {
        notes.push("missing_body_and_content".to_string());
    }

    for (field_name, text) in fields_to_process {
        let normalized = normalize_text_with_offsets(text);
        fields_payload.insert(
            field_name.to_string(),
            FieldPayload {
                text: text.to_string(),
                normalized_text: normalized.text,
                offsets: normalized.offsets,
            },
        );

        for found in matcher.find_matches(text) {
            matches_payload.push(FieldMatch {
                field: field_name.to_string(),
                city_id: found.city_id,
                name: found.name,
                state_code: found.state_code,
                surface: found.surface,
                start: found.start,
                end: found.end,
                method: found.method,
                score: found.score,
                signals: None,
                confidence: None,
            });
        }
    }

    let mut matches_payload = enrich_matches_with_signals(matches_payload, &fields_payload);
    matches_payload.sort_by(|a, b| {
        a.field
            .cmp(&b.field)
            .then(a.start.cmp(&b.start))
            .then(a.end.cmp(&b.end))
    });

    ExtractionPayload {
        fields: fields_payload,
        matches: matches_payload,
        metadata: ExtractionMetadata {
            version: catalog_version.to_string(),
            ts: now_isoformat(),
            notes,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogRecord;

    fn build_matcher() -> CityMatcher {
        let records = vec![
            CatalogRecord {
                id: "2504009".to_string(),
                name: "Campina Grande".to_string(),
                state_code: "PB".to_string(),
                ..Default::default()
            },
            CatalogRecord {
                id: "3304557".to_string(),
                name: "Rio de Janeiro".to_string(),
                state_code: "RJ".to_string(),
                ..Default::default()
            },
            CatalogRecord {
                id: "3550308".to_string(),
                name: "São Paulo".to_string(),
                state_code: "SP".to_string(),
                ..Default::default()
            },
        ];
        CityMatcher::new(&records)
    }

    #[test]
    fn test_extract_returns_structured_matches() {
        let matcher = build_matcher();
        let article = Article {
            title: Some("Campina Grande celebra acordo com Rio de Janeiro".to_string()),
            body: Some("A comitiva de Campina Grande visitará São Paulo amanhã.".to_string()),
            ..Default::default()
        };

        let result = extract_cities_from_article(&article, &matcher, "test");

        let field_names: Vec<&str> = result.fields.keys().map(String::as_str).collect();
        assert_eq!(field_names, vec!["body", "title"]);

        let title_info = &result.fields["title"];
        assert!(title_info.normalized_text.starts_with("campina grande"));
        assert_eq!(title_info.offsets[0], 0);

        let body_info = &result.fields["body"];
        assert!(body_info.normalized_text.contains("campina"));
        assert_eq!(body_info.offsets.len(), body_info.normalized_text.chars().count());

        for item in &result.matches {
            assert!(item.signals.is_some());
            assert!(item.confidence.is_some());
        }

        let title = article.title.as_deref().unwrap();
        let body = article.body.as_deref().unwrap();
        let span_of = |field: &str, surface: &str| {
            result
                .matches
                .iter()
                .find(|m| m.field == field && m.surface == surface)
                .map(|m| (m.start, m.end))
                .unwrap_or_else(|| panic!("{surface} não encontrado em {field}"))
        };

        let expected = title.find("Campina Grande").unwrap();
        assert_eq!(span_of("title", "Campina Grande"), (expected, expected + 14));
        let expected = title.find("Rio de Janeiro").unwrap();
        assert_eq!(span_of("title", "Rio de Janeiro"), (expected, expected + 14));
        let expected = body.find("Campina Grande").unwrap();
        assert_eq!(span_of("body", "Campina Grande"), (expected, expected + 14));
        let expected = body.find("São Paulo").unwrap();
        assert_eq!(
            span_of("body", "São Paulo"),
            (expected, expected + "São Paulo".len())
        );

        assert_eq!(result.metadata.version, "test");
        assert!(result.metadata.notes.is_empty());
        assert!(result.metadata.ts.ends_with('Z'));
    }

    #[test]
    fn test_extract_falls_back_to_content_field() {
        let matcher = build_matcher();
        let article = Article {
            title: Some("Campina Grande anuncia investimentos".to_string()),
            content: Some(
                "O evento terá participação de representantes do Rio de Janeiro.".to_string(),
            ),
            ..Default::default()
        };

        let result = extract_cities_from_article(&article, &matcher, "test");
        assert!(result.fields.contains_key("content"));
        assert!(!result.fields.contains_key("body"));
        assert_eq!(result.metadata.notes, vec!["used_content_field"]);
        assert!(result
            .matches
            .iter()
            .any(|m| m.field == "content" && m.surface == "Rio de Janeiro"));
    }

    #[test]
    fn test_extract_without_text_records_note() {
        let matcher = build_matcher();
        let article = Article {
            title: Some("Campina Grande em pauta".to_string()),
            ..Default::default()
        };

        let result = extract_cities_from_article(&article, &matcher, "test");
        assert_eq!(result.metadata.notes, vec!["missing_body_and_content"]);
        assert!(result.fields.contains_key("title"));
    }

    #[test]
    fn test_title_matches_receive_boost_and_context() {
        let matcher = CityMatcher::new(&[
            CatalogRecord {
                id: "2408102".to_string(),
                name: "Natal".to_string(),
                state_code: "RN".to_string(),
                ..Default::default()
            },
            CatalogRecord {
                id: "3550308".to_string(),
                name: "São Paulo".to_string(),
                state_code: "SP".to_string(),
                ..Default::default()
            },
        ]);
        let article = Article {
            title: Some("Prefeito de Natal visita São Paulo".to_string()),
            body: Some(
                "O prefeito de Natal (RN) discutiu acordos com representantes paulistas."
                    .to_string(),
            ),
            ..Default::default()
        };

        let result = extract_cities_from_article(&article, &matcher, "test");

        let natal_title = result
            .matches
            .iter()
            .find(|m| m.field == "title" && m.surface == "Natal")
            .unwrap();
        let signals = natal_title.signals.as_ref().unwrap();
        assert_eq!(signals.title_boost, 0.4);
        assert!(signals.admin_marker);

        let natal_body = result
            .matches
            .iter()
            .find(|m| m.field == "body" && m.surface == "Natal")
            .unwrap();
        let signals = natal_body.signals.as_ref().unwrap();
        assert_eq!(signals.title_boost, 0.0);
        assert!(signals.admin_marker);
        assert_eq!(signals.context_state.as_deref(), Some("RN"));
    }
}
