//! CLI de enriquecimento geográfico de artigos.
//!
//! O subcomando `enrich` processa um artigo JSON pelo pipeline completo e
//! imprime o payload enriquecido; `build-cache` baixa e grava um snapshot
//! versionado do catálogo de municípios.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use geomatch_core::catalog::{
    CatalogMetadata, CatalogPayload, CatalogStore, LoadOptions, CITY_CACHE_VERSION,
};
use geomatch_core::extractor::{extract_cities_from_article, Article};
use geomatch_core::fetch::{build_cache, HttpCatalogFetcher, PRIMARY_SOURCE};
use geomatch_core::matcher::CityMatcher;
use geomatch_core::pipeline::{
    aggregate_result, build_raw_matches, default_apply_signals, default_disambiguate, enrich_geo,
    resolve_article_id,
};

#[derive(Parser)]
#[command(name = "geomatch", about = "Enriquecimento geográfico de artigos de notícias")]
struct Cli {
    /// Nível de log (DEBUG, INFO, WARNING, ERROR).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Processa um artigo JSON e gera o payload enriquecido.
    Enrich(EnrichArgs),
    /// Baixa e grava o cache versionado de municípios.
    BuildCache(BuildCacheArgs),
}

#[derive(Args)]
struct EnrichArgs {
    /// Caminho do arquivo JSON do artigo (use '-' para ler de stdin).
    article: String,

    /// Arquivo para salvar o resultado em JSON (padrão: stdout).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Formata o JSON de saída com indentação.
    #[arg(long)]
    pretty: bool,

    /// Caminho alternativo para o catálogo de municípios em JSON.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Versão do catálogo quando usar o carregamento padrão.
    #[arg(long)]
    catalog_version: Option<String>,

    /// Baixa o catálogo completo caso o arquivo local seja uma amostra.
    #[arg(long)]
    ensure_complete: bool,

    /// Quantidade mínima de cidades esperada ao validar o catálogo.
    #[arg(long, default_value_t = 5000)]
    minimum_record_count: usize,

    /// Fonte primária usada ao atualizar o catálogo.
    #[arg(long, default_value = PRIMARY_SOURCE)]
    primary_source: String,

    /// Diretório dos arquivos de cache do catálogo.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Campo usado como identificador principal do artigo.
    #[arg(long, default_value = "id")]
    id_field: String,

    /// Campos adicionais tentados como identificador quando o principal
    /// está vazio.
    #[arg(long = "fallback-id", default_values_t = [String::from("url")])]
    fallback_id: Vec<String>,

    /// Inclui os dados de extração de cidades no JSON gerado.
    #[arg(long)]
    include_extraction: bool,
}

#[derive(Args)]
struct BuildCacheArgs {
    /// Fonte primária para o download do catálogo.
    #[arg(long, default_value = PRIMARY_SOURCE)]
    source: String,

    /// Versão do catálogo a ser gravada.
    #[arg(long, default_value = CITY_CACHE_VERSION)]
    version: String,

    /// Caminho do arquivo de saída (padrão: <data-dir>/municipios_br_<versão>.json).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Diretório dos arquivos de cache do catálogo.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Ignora o cache existente e força novo download.
    #[arg(long)]
    refresh: bool,
}

fn init_logging(level: Option<&str>) {
    let filter = level
        .map(|value| EnvFilter::new(value.to_lowercase()))
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn read_article(path: &str) -> Result<serde_json::Value> {
    let payload: serde_json::Value = if path == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("falha ao ler stdin")?;
        serde_json::from_str(&buffer).context("entrada JSON inválida em stdin")?
    } else {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("arquivo de artigo não encontrado: {path}"))?;
        serde_json::from_str(&contents).with_context(|| format!("JSON inválido em {path}"))?
    };
    if !payload.is_object() {
        bail!("o artigo deve ser um objeto JSON");
    }
    Ok(payload)
}

fn load_catalog_payload(args: &EnrichArgs) -> Result<CatalogPayload> {
    if let Some(path) = &args.catalog {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("catálogo não encontrado: {}", path.display()))?;
        let value: serde_json::Value =
            serde_json::from_str(&contents).context("catálogo JSON inválido")?;
        let payload = if value.is_array() {
            CatalogPayload {
                metadata: CatalogMetadata {
                    version: "custom".to_string(),
                    ..Default::default()
                },
                data: serde_json::from_value(value).context("lista de municípios inválida")?,
            }
        } else {
            serde_json::from_value(value).context("payload de catálogo inválido")?
        };
        return Ok(payload);
    }

    let store = CatalogStore::new(&args.data_dir);
    let version = args.catalog_version.as_deref().unwrap_or(CITY_CACHE_VERSION);
    let options = LoadOptions {
        ensure_complete: args.ensure_complete,
        primary_source: &args.primary_source,
        minimum_record_count: args.minimum_record_count,
        ..Default::default()
    };
    Ok(store.load(version, &options)?)
}

fn run_enrich(args: &EnrichArgs) -> Result<()> {
    let raw_article = read_article(&args.article)?;
    let article: Article =
        serde_json::from_value(raw_article.clone()).context("campos do artigo inválidos")?;

    let catalog_payload = load_catalog_payload(args)?;
    let catalog_metadata = catalog_payload.metadata.clone();
    let catalog_entries = catalog_payload.data.clone();

    let matcher = CityMatcher::from_payload(&catalog_payload);
    let extraction =
        extract_cities_from_article(&article, &matcher, &catalog_metadata.version);

    let article_id = resolve_article_id(&raw_article, &args.id_field, &args.fallback_id);
    let raw_matches = build_raw_matches(&extraction);

    let output = enrich_geo(
        &article,
        raw_matches,
        move || Ok(catalog_entries),
        default_apply_signals,
        default_disambiguate,
        |matches, article, catalog| {
            aggregate_result(
                matches,
                article,
                catalog,
                &extraction,
                &article_id,
                Some(&catalog_metadata),
            )
        },
    )?;

    info!(
        article = output.article_id.as_str(),
        matches = output.matches.len(),
        cities = output.mentioned_cities.len(),
        "artigo processado"
    );

    let mut payload = serde_json::to_value(&output)?;
    if args.include_extraction {
        payload["extraction"] = serde_json::to_value(&extraction)?;
    }

    let serialized = if args.pretty {
        serde_json::to_string_pretty(&payload)?
    } else {
        serde_json::to_string(&payload)?
    };

    if let Some(path) = &args.output {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("falha ao criar {}", parent.display()))?;
        }
        std::fs::write(path, format!("{serialized}\n"))
            .with_context(|| format!("falha ao gravar {}", path.display()))?;
    } else {
        println!("{serialized}");
    }

    Ok(())
}

fn run_build_cache(args: &BuildCacheArgs) -> Result<()> {
    let store = CatalogStore::new(&args.data_dir);
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| store.cache_path(&args.version));

    let fetcher = HttpCatalogFetcher::default();
    build_cache(&fetcher, &args.source, &output, args.refresh, &args.version)
        .context("falha ao gerar o catálogo")?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match &cli.command {
        Command::Enrich(args) => run_enrich(args),
        Command::BuildCache(args) => run_build_cache(args),
    }
}
