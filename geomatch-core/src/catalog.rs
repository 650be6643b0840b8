//! # Catálogo Versionado de Municípios
//!
//! O catálogo é a fonte canônica de municípios usada por todos os estágios
//! de resolução. Cada versão corresponde a um snapshot imutável gravado em
//! um arquivo JSON local (`municipios_br_<versão>.json`), opcionalmente
//! espelhado em um backend de armazenamento injetável.
//!
//! ## Precedência de carga
//!
//! 1. Backend de armazenamento (quando injetado) com catálogo completo.
//! 2. Arquivo local versionado.
//! 3. Atualização remota via [`crate::fetch`], apenas quando o arquivo
//!    local contém uma amostra incompleta e `ensure_complete` foi pedido.
//!
//! Uma atualização que falha nunca derruba o chamador: degradamos para o
//! último payload em cache e registramos o aviso. A ausência total de
//! catálogo é o único caso fatal.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::fetch::{self, CatalogFetcher, HttpCatalogFetcher};

/// Versão padrão do catálogo quando o chamador não informa outra.
pub const CITY_CACHE_VERSION: &str = "2025-01";

/// Quantidade mínima de municípios esperada de um catálogo completo.
pub const DEFAULT_MINIMUM_RECORD_COUNT: usize = 5000;

/// Par de coordenadas geográficas em graus decimais.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// Retângulo envolvente de um município, quando a fonte fornece.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

/// Resumo da capital do estado, anexado a cada registro após a carga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalSummary {
    pub id: String,
    pub name: String,
    pub state_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coords: Option<LatLon>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

/// Registro canônico de um município.
///
/// Imutável depois de carregado para uma dada versão do catálogo. Os campos
/// derivados (`coords`, `state_capital`) são preenchidos pelo enriquecimento
/// pós-carga e não precisam existir no arquivo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CatalogRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesoregion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub microregion: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alt_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_capital: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub siafi_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ddd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coords: Option<LatLon>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_capital: Option<CapitalSummary>,
}

impl CatalogRecord {
    /// Variantes de nome usadas na indexação (nome canônico + alternativos).
    pub fn variants(&self) -> Vec<&str> {
        let mut variants = Vec::with_capacity(1 + self.alt_names.len());
        let canonical = self.name.trim();
        if !canonical.is_empty() {
            variants.push(canonical);
        }
        for alt in &self.alt_names {
            let cleaned = alt.trim();
            if !cleaned.is_empty() && !variants.contains(&cleaned) {
                variants.push(cleaned);
            }
        }
        variants
    }
}

/// Metadados de um snapshot do catálogo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CatalogMetadata {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub primary_source: String,
    /// Fonte efetivamente usada (pode diferir da primária após fallback).
    #[serde(default)]
    pub source: String,
    /// Instante UTC do download, com sufixo "Z".
    #[serde(default)]
    pub downloaded_at: String,
    #[serde(default)]
    pub record_count: usize,
    /// Digest hexadecimal SHA-256 da lista serializada de registros.
    #[serde(default)]
    pub checksum: String,
}

/// Payload completo de uma versão do catálogo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CatalogPayload {
    #[serde(default)]
    pub metadata: CatalogMetadata,
    #[serde(default)]
    pub data: Vec<CatalogRecord>,
}

impl CatalogPayload {
    /// Contagem de registros declarada nos metadados, caindo para o tamanho
    /// real da lista quando os metadados não informam.
    pub fn record_count(&self) -> usize {
        if self.metadata.record_count > 0 {
            self.metadata.record_count
        } else {
            self.data.len()
        }
    }
}

/// Erros de carga e atualização do catálogo.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catálogo de municípios não encontrado em {path}; execute o gerador de cache ou informe outra versão")]
    NotFound { path: PathBuf },
    #[error("fonte desconhecida: {0}")]
    UnknownSource(String),
    #[error("falha ao acessar {source_name}: {message}")]
    Fetch { source_name: String, message: String },
    #[error("resposta inválida da fonte {source_name}: {message}")]
    InvalidResponse { source_name: String, message: String },
    #[error("fonte {0} não retornou registros válidos após normalização")]
    EmptyCatalog(String),
    #[error("não foi possível obter o catálogo de municípios ({0})")]
    AllSourcesFailed(String),
    #[error("erro de E/S em {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON inválido em {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Backend de armazenamento para espelhar catálogos por versão.
pub trait CatalogStorage: Send + Sync {
    fn load(&self, version: &str) -> Option<CatalogPayload>;
    fn save(&self, version: &str, payload: &CatalogPayload);
}

/// Armazenamento em memória, útil em testes e em composições locais.
#[derive(Default)]
pub struct MemoryCatalogStorage {
    payloads: Mutex<HashMap<String, CatalogPayload>>,
}

impl MemoryCatalogStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(version: &str, payload: CatalogPayload) -> Self {
        let storage = Self::new();
        storage
            .payloads
            .lock()
            .insert(version.to_string(), payload);
        storage
    }
}

impl CatalogStorage for MemoryCatalogStorage {
    fn load(&self, version: &str) -> Option<CatalogPayload> {
        self.payloads.lock().get(version).cloned()
    }

    fn save(&self, version: &str, payload: &CatalogPayload) {
        if payload.data.is_empty() {
            // Catálogo vazio não é espelhado; manter o anterior é mais útil.
            return;
        }
        self.payloads
            .lock()
            .insert(version.to_string(), payload.clone());
    }
}

/// Opções de carga do catálogo.
pub struct LoadOptions<'a> {
    /// Quando verdadeiro, uma amostra menor que `minimum_record_count`
    /// dispara a atualização remota.
    pub ensure_complete: bool,
    pub primary_source: &'a str,
    pub minimum_record_count: usize,
    /// Buscador remoto injetável. `None` usa o buscador HTTP padrão.
    pub fetcher: Option<&'a dyn CatalogFetcher>,
    /// Backend de armazenamento consultado antes do arquivo local.
    pub storage: Option<&'a dyn CatalogStorage>,
}

impl Default for LoadOptions<'_> {
    fn default() -> Self {
        Self {
            ensure_complete: false,
            primary_source: fetch::PRIMARY_SOURCE,
            minimum_record_count: DEFAULT_MINIMUM_RECORD_COUNT,
            fetcher: None,
            storage: None,
        }
    }
}

/// Gerencia os arquivos de cache versionados do catálogo.
///
/// O mutex interno serializa atualizações concorrentes da mesma instância,
/// evitando downloads redundantes e escritas duplicadas quando vários
/// chamadores pedem a mesma versão ao mesmo tempo.
pub struct CatalogStore {
    data_dir: PathBuf,
    refresh_lock: Mutex<()>,
}

impl CatalogStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Caminho do arquivo de cache da versão informada.
    pub fn cache_path(&self, version: &str) -> PathBuf {
        self.data_dir.join(format!("municipios_br_{version}.json"))
    }

    /// Carrega o catálogo da versão informada seguindo a precedência
    /// armazenamento → arquivo local → atualização remota.
    pub fn load(&self, version: &str, options: &LoadOptions<'_>) -> Result<CatalogPayload, CatalogError> {
        let _guard = self.refresh_lock.lock();
        let cache_path = self.cache_path(version);

        if let Some(storage) = options.storage {
            if let Some(payload) = storage.load(version) {
                let complete = !options.ensure_complete
                    || payload.record_count() >= options.minimum_record_count;
                if complete {
                    let enriched = enrich_payload(payload);
                    self.write_cache_file(&cache_path, &enriched);
                    return Ok(enriched);
                }
            }
        }

        let cached = match read_payload(&cache_path) {
            Ok(payload) => Some(payload),
            Err(CatalogError::NotFound { .. }) => None,
            Err(err) => return Err(err),
        };

        let needs_refresh = options.ensure_complete
            && cached
                .as_ref()
                .map(|payload| payload.record_count() < options.minimum_record_count)
                .unwrap_or(true);

        if !needs_refresh {
            return cached
                .map(enrich_payload)
                .ok_or(CatalogError::NotFound { path: cache_path });
        }

        let default_fetcher;
        let fetcher: &dyn CatalogFetcher = match options.fetcher {
            Some(injected) => injected,
            None => {
                default_fetcher = HttpCatalogFetcher::default();
                &default_fetcher
            }
        };

        match fetcher.fetch(options.primary_source) {
            Ok((records, effective_source)) => {
                let payload = fetch::assemble_payload(
                    version,
                    options.primary_source,
                    &effective_source,
                    records,
                );
                let enriched = enrich_payload(payload);
                self.write_cache_file(&cache_path, &enriched);
                if let Some(storage) = options.storage {
                    storage.save(version, &enriched);
                }
                info!(
                    version,
                    source = effective_source.as_str(),
                    records = enriched.data.len(),
                    "catálogo de municípios atualizado"
                );
                Ok(enriched)
            }
            Err(err) => {
                warn!(version, error = %err, "falha ao atualizar catálogo; usando payload em cache");
                cached
                    .map(enrich_payload)
                    .ok_or(CatalogError::NotFound { path: cache_path })
            }
        }
    }

    fn write_cache_file(&self, path: &Path, payload: &CatalogPayload) {
        if let Some(parent) = path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %err, "não foi possível criar diretório de cache");
                return;
            }
        }
        match serde_json::to_string_pretty(payload) {
            Ok(mut serialized) => {
                serialized.push('\n');
                if let Err(err) = fs::write(path, serialized) {
                    warn!(path = %path.display(), error = %err, "não foi possível gravar cache do catálogo");
                }
            }
            Err(err) => {
                warn!(error = %err, "não foi possível serializar o catálogo");
            }
        }
    }
}

fn read_payload(path: &Path) -> Result<CatalogPayload, CatalogError> {
    if !path.exists() {
        return Err(CatalogError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| CatalogError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Enriquece os registros com contexto geográfico derivado.
///
/// Preenche o par `coords` a partir de latitude/longitude e anexa a cada
/// registro o resumo da capital do seu estado, quando ela existe no
/// snapshot. Registros da própria capital também recebem a referência.
pub fn enrich_payload(mut payload: CatalogPayload) -> CatalogPayload {
    for record in &mut payload.data {
        if record.coords.is_none() {
            if let (Some(lat), Some(lon)) = (record.latitude, record.longitude) {
                record.coords = Some(LatLon { lat, lon });
            }
        }
    }

    let capitals: HashMap<String, CapitalSummary> = payload
        .data
        .iter()
        .filter(|record| record.is_capital && !record.state_code.is_empty())
        .map(|record| {
            (
                record.state_code.clone(),
                CapitalSummary {
                    id: record.id.clone(),
                    name: record.name.clone(),
                    state_code: record.state_code.clone(),
                    coords: record.coords,
                    bbox: record.bbox,
                },
            )
        })
        .collect();

    for record in &mut payload.data {
        if record.state_capital.is_none() {
            record.state_capital = capitals.get(&record.state_code).cloned();
        }
    }

    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_payload(record_count: usize) -> CatalogPayload {
        CatalogPayload {
            metadata: CatalogMetadata {
                version: "test".to_string(),
                primary_source: "fixture".to_string(),
                source: "fixture".to_string(),
                downloaded_at: "2024-01-01T00:00:00Z".to_string(),
                record_count,
                checksum: "abc".to_string(),
            },
            data: vec![CatalogRecord {
                id: "1100015".to_string(),
                name: "Alta Floresta D'Oeste".to_string(),
                state_code: "RO".to_string(),
                ..Default::default()
            }],
        }
    }

    fn write_catalog(store: &CatalogStore, version: &str, payload: &CatalogPayload) {
        let path = store.cache_path(version);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string(payload).unwrap()).unwrap();
    }

    struct FakeFetcher {
        outcome: Result<(Vec<CatalogRecord>, String), String>,
        calls: Mutex<usize>,
    }

    impl FakeFetcher {
        fn succeeding(records: Vec<CatalogRecord>) -> Self {
            Self {
                outcome: Ok((records, "ibge".to_string())),
                calls: Mutex::new(0),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                outcome: Err(message.to_string()),
                calls: Mutex::new(0),
            }
        }
    }

    impl CatalogFetcher for FakeFetcher {
        fn fetch(&self, _primary: &str) -> Result<(Vec<CatalogRecord>, String), CatalogError> {
            *self.calls.lock() += 1;
            match &self.outcome {
                Ok(value) => Ok(value.clone()),
                Err(message) => Err(CatalogError::AllSourcesFailed(message.clone())),
            }
        }
    }

    fn fetched_records() -> Vec<CatalogRecord> {
        vec![
            CatalogRecord {
                id: "5300108".to_string(),
                name: "Brasília".to_string(),
                state_code: "DF".to_string(),
                ..Default::default()
            },
            CatalogRecord {
                id: "3550308".to_string(),
                name: "São Paulo".to_string(),
                state_code: "SP".to_string(),
                ..Default::default()
            },
        ]
    }

    #[test]
    fn test_load_fetches_full_dataset_when_sample() {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::new(dir.path());
        write_catalog(&store, "test", &sample_payload(10));

        let fetcher = FakeFetcher::succeeding(fetched_records());
        let options = LoadOptions {
            ensure_complete: true,
            minimum_record_count: 20,
            fetcher: Some(&fetcher),
            ..Default::default()
        };

        let result = store.load("test", &options).unwrap();
        assert_eq!(*fetcher.calls.lock(), 1);
        assert_eq!(result.data.len(), 2);
        assert_eq!(result.metadata.record_count, 2);

        let stored = read_payload(&store.cache_path("test")).unwrap();
        assert_eq!(stored.data.len(), 2);
    }

    #[test]
    fn test_load_returns_cached_when_fetch_fails() {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::new(dir.path());
        write_catalog(&store, "test", &sample_payload(10));

        let fetcher = FakeFetcher::failing("boom");
        let options = LoadOptions {
            ensure_complete: true,
            minimum_record_count: 20,
            fetcher: Some(&fetcher),
            ..Default::default()
        };

        let result = store.load("test", &options).unwrap();
        assert_eq!(result.metadata.source, "fixture");
    }

    #[test]
    fn test_load_uses_cached_when_complete() {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::new(dir.path());
        write_catalog(&store, "test", &sample_payload(6000));

        let fetcher = FakeFetcher::failing("não deveria buscar");
        let options = LoadOptions {
            ensure_complete: true,
            minimum_record_count: 20,
            fetcher: Some(&fetcher),
            ..Default::default()
        };

        let result = store.load("test", &options).unwrap();
        assert_eq!(result.metadata.record_count, 6000);
        assert_eq!(*fetcher.calls.lock(), 0);
    }

    #[test]
    fn test_load_reads_from_storage_before_fetch() {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::new(dir.path());
        write_catalog(&store, "test", &sample_payload(10));

        let storage_payload = CatalogPayload {
            metadata: CatalogMetadata {
                version: "test".to_string(),
                record_count: 6000,
                ..Default::default()
            },
            data: fetched_records(),
        };
        let storage = MemoryCatalogStorage::with_payload("test", storage_payload.clone());
        let fetcher = FakeFetcher::failing("não deveria buscar");
        let options = LoadOptions {
            ensure_complete: true,
            minimum_record_count: 20,
            fetcher: Some(&fetcher),
            storage: Some(&storage),
            ..Default::default()
        };

        let result = store.load("test", &options).unwrap();
        assert_eq!(*fetcher.calls.lock(), 0);
        assert_eq!(result.data.len(), storage_payload.data.len());

        let mirrored = read_payload(&store.cache_path("test")).unwrap();
        assert_eq!(mirrored.data.len(), storage_payload.data.len());
    }

    #[test]
    fn test_load_missing_everything_is_fatal() {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::new(dir.path());
        let result = store.load("missing", &LoadOptions::default());
        assert!(matches!(result, Err(CatalogError::NotFound { .. })));
    }

    #[test]
    fn test_load_persists_refresh_into_storage() {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::new(dir.path());
        write_catalog(&store, "test", &sample_payload(10));

        let storage = MemoryCatalogStorage::new();
        let fetcher = FakeFetcher::succeeding(fetched_records());
        let options = LoadOptions {
            ensure_complete: true,
            minimum_record_count: 20,
            fetcher: Some(&fetcher),
            storage: Some(&storage),
            ..Default::default()
        };

        let result = store.load("test", &options).unwrap();
        assert_eq!(result.data.len(), 2);

        let saved = storage.load("test").expect("payload espelhado");
        assert_eq!(saved.data.len(), 2);
    }

    #[test]
    fn test_enrich_payload_adds_coords_and_capital() {
        let payload = CatalogPayload {
            metadata: CatalogMetadata::default(),
            data: vec![
                CatalogRecord {
                    id: "2".to_string(),
                    name: "Cidade B".to_string(),
                    state_code: "AA".to_string(),
                    latitude: Some(-15.0),
                    longitude: Some(-47.0),
                    is_capital: true,
                    ..Default::default()
                },
                CatalogRecord {
                    id: "1".to_string(),
                    name: "Cidade A".to_string(),
                    state_code: "AA".to_string(),
                    latitude: Some(-10.0),
                    longitude: Some(-45.0),
                    ..Default::default()
                },
            ],
        };

        let enriched = enrich_payload(payload);
        let city_a = enriched.data.iter().find(|r| r.id == "1").unwrap();
        assert_eq!(city_a.coords, Some(LatLon { lat: -10.0, lon: -45.0 }));
        let capital = city_a.state_capital.as_ref().expect("capital do estado");
        assert_eq!(capital.id, "2");
        assert_eq!(capital.name, "Cidade B");

        let capital_record = enriched.data.iter().find(|r| r.id == "2").unwrap();
        assert_eq!(capital_record.state_capital.as_ref().unwrap().id, "2");
    }
}
