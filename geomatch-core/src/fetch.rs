//! # Atualização Remota do Catálogo
//!
//! Baixa a lista de municípios de fontes públicas e a normaliza para o
//! formato canônico do catálogo. A fonte primária é configurável; em caso
//! de falha, as demais fontes são tentadas em ordem fixa. Registros sem
//! identificador ou sem nome são descartados durante a normalização.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::catalog::{CatalogError, CatalogMetadata, CatalogPayload, CatalogRecord};

/// Fonte primária padrão para o download do catálogo.
pub const PRIMARY_SOURCE: &str = "ibge";

/// Identificadores das fontes conhecidas, na ordem de fallback.
pub const SOURCE_KEYS: &[&str] = &["ibge", "brasilapi"];

/// Descritor de uma fonte remota de municípios.
pub struct CitySource {
    pub name: &'static str,
    pub url: &'static str,
}

fn source_descriptor(key: &str) -> Option<CitySource> {
    match key {
        "ibge" => Some(CitySource {
            name: "IBGE Localidades API",
            url: "https://servicodados.ibge.gov.br/api/v1/localidades/municipios",
        }),
        "brasilapi" => Some(CitySource {
            name: "BrasilAPI",
            url: "https://brasilapi.com.br/api/ibge/municipios/v1",
        }),
        _ => None,
    }
}

/// Metadados dos estados usados para completar registros da BrasilAPI.
const STATE_METADATA: &[(&str, &str, &str)] = &[
    ("AC", "Acre", "Norte"),
    ("AL", "Alagoas", "Nordeste"),
    ("AP", "Amapá", "Norte"),
    ("AM", "Amazonas", "Norte"),
    ("BA", "Bahia", "Nordeste"),
    ("CE", "Ceará", "Nordeste"),
    ("DF", "Distrito Federal", "Centro-Oeste"),
    ("ES", "Espírito Santo", "Sudeste"),
    ("GO", "Goiás", "Centro-Oeste"),
    ("MA", "Maranhão", "Nordeste"),
    ("MT", "Mato Grosso", "Centro-Oeste"),
    ("MS", "Mato Grosso do Sul", "Centro-Oeste"),
    ("MG", "Minas Gerais", "Sudeste"),
    ("PA", "Pará", "Norte"),
    ("PB", "Paraíba", "Nordeste"),
    ("PR", "Paraná", "Sul"),
    ("PE", "Pernambuco", "Nordeste"),
    ("PI", "Piauí", "Nordeste"),
    ("RJ", "Rio de Janeiro", "Sudeste"),
    ("RN", "Rio Grande do Norte", "Nordeste"),
    ("RS", "Rio Grande do Sul", "Sul"),
    ("RO", "Rondônia", "Norte"),
    ("RR", "Roraima", "Norte"),
    ("SC", "Santa Catarina", "Sul"),
    ("SP", "São Paulo", "Sudeste"),
    ("SE", "Sergipe", "Nordeste"),
    ("TO", "Tocantins", "Norte"),
];

fn state_metadata(code: &str) -> Option<(&'static str, &'static str)> {
    STATE_METADATA
        .iter()
        .find(|(uf, _, _)| *uf == code)
        .map(|(_, name, region)| (*name, *region))
}

/// Porta de busca remota do catálogo.
///
/// Implementações devem tentar a fonte primária e cair para as demais,
/// devolvendo os registros normalizados e a chave da fonte efetiva.
pub trait CatalogFetcher: Sync {
    fn fetch(&self, primary: &str) -> Result<(Vec<CatalogRecord>, String), CatalogError>;
}

/// Buscador HTTP com timeout de requisição e fallback entre fontes.
pub struct HttpCatalogFetcher {
    client: reqwest::blocking::Client,
}

impl Default for HttpCatalogFetcher {
    fn default() -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("configuração do cliente HTTP válida");
        Self { client }
    }
}

impl HttpCatalogFetcher {
    fn download_raw(&self, key: &str) -> Result<Vec<Value>, CatalogError> {
        let descriptor = source_descriptor(key).ok_or_else(|| CatalogError::UnknownSource(key.to_string()))?;

        let response = self
            .client
            .get(descriptor.url)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|err| CatalogError::Fetch {
                source_name: descriptor.name.to_string(),
                message: err.to_string(),
            })?;

        let payload: Value = response.json().map_err(|err| CatalogError::InvalidResponse {
            source_name: descriptor.name.to_string(),
            message: format!("JSON não pôde ser decodificado: {err}"),
        })?;

        match payload {
            Value::Array(items) => Ok(items),
            _ => Err(CatalogError::InvalidResponse {
                source_name: descriptor.name.to_string(),
                message: "era esperada uma lista".to_string(),
            }),
        }
    }
}

impl CatalogFetcher for HttpCatalogFetcher {
    fn fetch(&self, primary: &str) -> Result<(Vec<CatalogRecord>, String), CatalogError> {
        let mut tried: Vec<&str> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        let order = std::iter::once(primary).chain(
            SOURCE_KEYS
                .iter()
                .copied()
                .filter(move |key| *key != primary),
        );

        for key in order {
            if tried.contains(&key) {
                continue;
            }
            tried.push(key);
            let attempt = self
                .download_raw(key)
                .and_then(|raw| normalize_records(key, &raw));
            match attempt {
                Ok(records) => {
                    info!(source = key, records = records.len(), "fonte retornou municípios");
                    return Ok((records, key.to_string()));
                }
                Err(err) => {
                    warn!(source = key, error = %err, "falha ao usar fonte de municípios");
                    errors.push(format!("{key}: {err}"));
                }
            }
        }

        Err(CatalogError::AllSourcesFailed(errors.join("; ")))
    }
}

fn value_to_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    }
}

fn value_to_float(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    }
}

fn normalize_ibge(records: &[Value]) -> Vec<CatalogRecord> {
    let mut normalized = Vec::with_capacity(records.len());
    for item in records {
        let micro = item.get("microrregiao");
        let meso = micro.and_then(|value| value.get("mesorregiao"));
        let uf_info = meso.and_then(|value| value.get("UF"));
        let region_info = uf_info.and_then(|value| value.get("regiao"));

        let Some(id) = value_to_string(item.get("id")) else {
            continue;
        };
        let Some(name) = value_to_string(item.get("nome")) else {
            continue;
        };

        normalized.push(CatalogRecord {
            id,
            name,
            state_code: value_to_string(uf_info.and_then(|value| value.get("sigla"))).unwrap_or_default(),
            state_name: value_to_string(uf_info.and_then(|value| value.get("nome"))),
            region: value_to_string(region_info.and_then(|value| value.get("nome"))),
            mesoregion: value_to_string(meso.and_then(|value| value.get("nome"))),
            microregion: value_to_string(micro.and_then(|value| value.get("nome"))),
            ..Default::default()
        });
    }
    normalized
}

fn normalize_brasilapi(records: &[Value]) -> Vec<CatalogRecord> {
    let mut normalized = Vec::with_capacity(records.len());
    for item in records {
        let id = value_to_string(item.get("codigo_ibge")).or_else(|| value_to_string(item.get("codigo")));
        let Some(id) = id else {
            continue;
        };
        let Some(name) = value_to_string(item.get("nome")) else {
            continue;
        };

        let state_code = value_to_string(item.get("estado"))
            .or_else(|| value_to_string(item.get("uf")))
            .unwrap_or_default();
        let details = state_metadata(&state_code);

        normalized.push(CatalogRecord {
            id,
            name,
            state_name: details.map(|(name, _)| name.to_string()),
            region: details
                .map(|(_, region)| region.to_string())
                .or_else(|| value_to_string(item.get("regiao"))),
            latitude: value_to_float(item.get("latitude")),
            longitude: value_to_float(item.get("longitude")),
            is_capital: item.get("capital").and_then(Value::as_bool).unwrap_or(false),
            siafi_id: value_to_string(item.get("siafi_id")),
            ddd: value_to_string(item.get("ddd")),
            timezone: value_to_string(item.get("fuso_horario"))
                .or_else(|| value_to_string(item.get("timezone"))),
            state_code,
            ..Default::default()
        });
    }
    normalized
}

/// Normaliza os registros crus de uma fonte para o formato canônico.
///
/// Deduplica por identificador e ordena de forma determinística (id
/// numérico, depois nome). Uma lista vazia após a filtragem é tratada como
/// erro recuperável da fonte.
pub fn normalize_records(source: &str, raw_records: &[Value]) -> Result<Vec<CatalogRecord>, CatalogError> {
    let records = match source {
        "ibge" => normalize_ibge(raw_records),
        "brasilapi" => normalize_brasilapi(raw_records),
        _ => return Err(CatalogError::UnknownSource(source.to_string())),
    };

    let filtered: Vec<CatalogRecord> = records
        .into_iter()
        .filter(|record| !record.id.is_empty() && !record.name.is_empty())
        .collect();
    if filtered.is_empty() {
        return Err(CatalogError::EmptyCatalog(source.to_string()));
    }

    let mut seen = std::collections::HashSet::new();
    let mut deduped: Vec<CatalogRecord> = Vec::with_capacity(filtered.len());
    for record in filtered {
        if seen.insert(record.id.clone()) {
            deduped.push(record);
        }
    }

    deduped.sort_by(|a, b| {
        let numeric_a = a.id.parse::<u64>().unwrap_or(u64::MAX);
        let numeric_b = b.id.parse::<u64>().unwrap_or(u64::MAX);
        numeric_a
            .cmp(&numeric_b)
            .then_with(|| a.id.cmp(&b.id))
            .then_with(|| a.name.cmp(&b.name))
    });

    Ok(deduped)
}

/// Digest SHA-256 (hexadecimal) da lista canônica de registros.
pub fn compute_checksum(records: &[CatalogRecord]) -> String {
    let serialized = serde_json::to_string(records).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Instante atual em UTC no formato ISO-8601 com sufixo "Z".
pub fn now_isoformat() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Monta o payload versionado a partir de registros já normalizados.
pub fn assemble_payload(
    version: &str,
    primary_source: &str,
    effective_source: &str,
    records: Vec<CatalogRecord>,
) -> CatalogPayload {
    let checksum = compute_checksum(&records);
    CatalogPayload {
        metadata: CatalogMetadata {
            version: version.to_string(),
            primary_source: primary_source.to_string(),
            source: effective_source.to_string(),
            downloaded_at: now_isoformat(),
            record_count: records.len(),
            checksum,
        },
        data: records,
    }
}

/// Gera o arquivo de cache versionado de municípios.
///
/// Mantém o arquivo existente a menos que `refresh` seja pedido.
pub fn build_cache(
    fetcher: &dyn CatalogFetcher,
    primary_source: &str,
    output_path: &Path,
    refresh: bool,
    version: &str,
) -> Result<PathBuf, CatalogError> {
    if output_path.exists() && !refresh {
        info!(path = %output_path.display(), "cache já existe; use refresh para sobrescrever");
        return Ok(output_path.to_path_buf());
    }

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| CatalogError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let (records, effective_source) = fetcher.fetch(primary_source)?;
    let payload = assemble_payload(version, primary_source, &effective_source, records);

    let mut serialized = serde_json::to_string_pretty(&payload).map_err(|source| CatalogError::Malformed {
        path: output_path.to_path_buf(),
        source,
    })?;
    serialized.push('\n');
    std::fs::write(output_path, serialized).map_err(|source| CatalogError::Io {
        path: output_path.to_path_buf(),
        source,
    })?;

    info!(
        path = %output_path.display(),
        records = payload.data.len(),
        source = effective_source.as_str(),
        "cache de municípios salvo"
    );

    Ok(output_path.to_path_buf())
}
