//! # geomatch-core — Resolução Geoespacial de Menções a Municípios
//!
//! Este crate reconhece, desambigua e ranqueia menções a municípios
//! brasileiros em textos de notícias, elegendo uma localidade primária por
//! documento junto com a lista completa de cidades mencionadas e a trilha
//! de auditoria das candidatas rejeitadas.
//!
//! ## Arquitetura do Sistema
//!
//! O dado flui por uma cadeia linear de estágios, todos determinísticos:
//!
//! 1. **Normalização** ([`normalizer`]): o texto é convertido para uma
//!    forma sem acentos e minúscula, preservando o offset original de cada
//!    caractere.
//! 2. **Matching** ([`matcher`]): um automato multi-padrão construído a
//!    partir do catálogo varre o texto normalizado e emite as ocorrências
//!    cruas, com fronteira de palavra verificada.
//! 3. **Sinais** ([`signals`]): cada ocorrência recebe reforços de posição
//!    (título), de marcador administrativo e o estado mencionado na mesma
//!    sentença.
//! 4. **Desambiguação** ([`disambiguation`], [`gazetteer`]): a superfície é
//!    resolvida contra o índice de nomes do catálogo usando as dicas de
//!    estado explícitas e contextuais.
//! 5. **Agregação** ([`aggregator`]): as ocorrências são consolidadas por
//!    município e a cidade primária é eleita por uma cascata determinística
//!    de desempates.
//!
//! O [`pipeline`] compõe os estágios com implementações injetáveis; o
//! [`catalog`] mantém os snapshots versionados de municípios que alimentam
//! tudo acima.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use geomatch_core::catalog::CatalogRecord;
//! use geomatch_core::extractor::{extract_cities_from_article, Article};
//! use geomatch_core::matcher::CityMatcher;
//!
//! let records = vec![CatalogRecord {
//!     id: "2408102".to_string(),
//!     name: "Natal".to_string(),
//!     state_code: "RN".to_string(),
//!     ..Default::default()
//! }];
//! let matcher = CityMatcher::new(&records);
//!
//! let article = Article {
//!     title: Some("Prefeito de Natal anuncia obras".to_string()),
//!     body: Some("A cidade de Natal (RN) receberá investimentos.".to_string()),
//!     ..Default::default()
//! };
//!
//! let extraction = extract_cities_from_article(&article, &matcher, "v1");
//! for item in &extraction.matches {
//!     println!("{} em {} ({}..{})", item.surface, item.field, item.start, item.end);
//! }
//! ```
//!
//! ## Concorrência
//!
//! O processamento de um documento é síncrono e limitado por CPU. Um
//! [`matcher::CityMatcher`] construído é imutável e pode ser compartilhado
//! entre threads; o módulo [`batch`] paraleliza entre documentos. A única
//! operação bloqueante de E/S é a atualização do catálogo, que aplica
//! timeout de requisição e nunca derruba um enriquecimento em andamento.

pub mod aggregator;
pub mod batch;
pub mod catalog;
pub mod disambiguation;
pub mod extractor;
pub mod fetch;
pub mod gazetteer;
pub mod geoutils;
pub mod matcher;
pub mod ner;
pub mod normalizer;
pub mod pipeline;
pub mod resolver;
pub mod signals;

pub use aggregator::{aggregate_with_primary_city, AggregatedCity, CitySummary, SuppressedEntry};
pub use catalog::{CatalogPayload, CatalogRecord, CatalogStore, CatalogStorage, LoadOptions};
pub use disambiguation::{disambiguate_city, DisambiguationResult, ResolutionStatus};
pub use extractor::{extract_cities_from_article, Article, ExtractionPayload};
pub use gazetteer::CityGazetteer;
pub use matcher::{CityMatch, CityMatcher};
pub use pipeline::{enrich_geo, EnrichmentOutput, RawMatch};
pub use signals::Signals;
