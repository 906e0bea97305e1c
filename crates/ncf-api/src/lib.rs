use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::connect_info::ConnectInfo,
    extract::DefaultBodyLimit,
    extract::State,
    http::header::{HeaderName, HeaderValue, CONTENT_TYPE},
    http::Method,
    http::Request,
    middleware,
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use governor::{
    clock::DefaultClock, middleware::NoOpMiddleware, state::keyed::DashMapStateStore, Quota,
    RateLimiter,
};
use ncf_common::db::create_pool_from_url_checked;
use ncf_common::logging::init_tracing;
use ncf_common::mapping::database::load_database_vocabulary;
use ncf_common::mapping::static_files::{load_max_length_table, load_static_vocabulary};
use ncf_common::{
    AdjustmentKind, CandleNcfModel, FacetVocabulary, LazyModel, MappingProvider, MatchModel,
    MatchScorer, MetricsObserver, TalentRanker,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;

pub mod error;
pub mod handlers;

use error::ApiError;
use handlers::{explain, health, predict, rank};

const SHUTDOWN_DRAIN_GRACE: Duration = Duration::from_millis(200);
const BODY_LIMIT_BYTES: usize = 256 * 1024;
const DEFAULT_MODEL_FILE: &str = "ncf_model.safetensors";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MappingSourceKind {
    /// JSON mapping files under the asset directory
    Static,
    /// Reference tables in Postgres
    Database,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelLoading {
    /// Load weights before the listener binds
    Eager,
    /// Load weights on the first prediction
    Lazy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AdjustmentChoice {
    None,
    #[value(name = "tag_count_penalty")]
    TagCountPenalty,
}

impl From<AdjustmentChoice> for AdjustmentKind {
    fn from(value: AdjustmentChoice) -> Self {
        match value {
            AdjustmentChoice::None => AdjustmentKind::None,
            AdjustmentChoice::TagCountPenalty => AdjustmentKind::TagCountPenalty,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "ncf-api", about = "HTTP API scoring project/talent matches")]
pub struct Cli {
    /// Server port
    #[arg(long, env = "PORT", default_value_t = 5000)]
    port: u16,

    /// Where facet mappings come from
    #[arg(long, env = "NCF_MAPPING_SOURCE", default_value = "static", value_enum)]
    mapping_source: MappingSourceKind,

    /// Directory holding mapping_<facet>.json, maxlen.json and the model weights
    #[arg(long, env = "NCF_ASSET_DIR", default_value = "model_assets")]
    asset_dir: PathBuf,

    /// PostgreSQL connection string, required for the database mapping source
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Explicit max-length table used with the database mapping source
    #[arg(long, env = "NCF_MAXLEN_PATH")]
    maxlen_path: Option<PathBuf>,

    /// Safetensors weights, defaults to <asset_dir>/ncf_model.safetensors
    #[arg(long, env = "NCF_MODEL_PATH")]
    model_path: Option<PathBuf>,

    #[arg(long, env = "NCF_MODEL_LOADING", default_value = "eager", value_enum)]
    model_loading: ModelLoading,

    #[arg(long, env = "NCF_SCORE_ADJUSTMENT", default_value = "none", value_enum)]
    score_adjustment: AdjustmentChoice,

    /// Drop ranked talents scoring below this value
    #[arg(long, env = "NCF_RANK_THRESHOLD")]
    rank_threshold: Option<f32>,

    /// Comma separated list of allowed CORS origins
    #[arg(long, env = "NCF_CORS_ORIGINS", default_value = "http://localhost:3000")]
    cors_origins: String,

    #[arg(long, env = "NCF_METRICS_PORT", default_value_t = 9100)]
    metrics_port: u16,

    #[arg(long, env = "NCF_RATE_LIMIT_PER_SEC", default_value_t = 20)]
    rate_limit_per_sec: u64,

    #[arg(long, env = "NCF_RATE_LIMIT_BURST", default_value_t = 40)]
    rate_limit_burst: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub per_sec: u64,
    pub burst: u32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub mapping_source: MappingSourceKind,
    pub asset_dir: PathBuf,
    pub database_url: Option<String>,
    pub maxlen_path: Option<PathBuf>,
    pub model_path: PathBuf,
    pub model_loading: ModelLoading,
    pub adjustment: AdjustmentKind,
    pub rank_threshold: Option<f32>,
    pub cors_origins: Vec<String>,
    pub metrics_port: u16,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, ApiError> {
        let cors_origins = cli
            .cors_origins
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect::<Vec<_>>();

        if cors_origins.iter().any(|origin| origin == "*") {
            return Err(ApiError::Configuration(
                "NCF_CORS_ORIGINS must list explicit origins".into(),
            ));
        }

        if cli.mapping_source == MappingSourceKind::Database && cli.database_url.is_none() {
            return Err(ApiError::Configuration(
                "DATABASE_URL is required when NCF_MAPPING_SOURCE=database".into(),
            ));
        }

        if let Some(threshold) = cli.rank_threshold {
            if !threshold.is_finite() {
                return Err(ApiError::Configuration(
                    "NCF_RANK_THRESHOLD must be a finite number".into(),
                ));
            }
        }

        if cli.rate_limit_per_sec == 0 || cli.rate_limit_burst == 0 {
            return Err(ApiError::Configuration(
                "NCF_RATE_LIMIT_PER_SEC and NCF_RATE_LIMIT_BURST must be positive".into(),
            ));
        }

        let model_path = cli
            .model_path
            .unwrap_or_else(|| cli.asset_dir.join(DEFAULT_MODEL_FILE));

        Ok(Self {
            port: cli.port,
            mapping_source: cli.mapping_source,
            asset_dir: cli.asset_dir,
            database_url: cli.database_url,
            maxlen_path: cli.maxlen_path,
            model_path,
            model_loading: cli.model_loading,
            adjustment: cli.score_adjustment.into(),
            rank_threshold: cli.rank_threshold,
            cors_origins,
            metrics_port: cli.metrics_port,
            rate_limit: RateLimitConfig {
                per_sec: cli.rate_limit_per_sec,
                burst: cli.rate_limit_burst,
            },
        })
    }

    pub fn for_tests() -> Self {
        Self {
            port: 5000,
            mapping_source: MappingSourceKind::Static,
            asset_dir: PathBuf::from("model_assets"),
            database_url: None,
            maxlen_path: None,
            model_path: PathBuf::from("model_assets").join(DEFAULT_MODEL_FILE),
            model_loading: ModelLoading::Eager,
            adjustment: AdjustmentKind::None,
            rank_threshold: None,
            cors_origins: vec!["http://localhost:3000".into()],
            metrics_port: 9100,
            rate_limit: RateLimitConfig {
                per_sec: 20,
                burst: 40,
            },
        }
    }
}

/// The scoring model as held by the service.
#[derive(Clone)]
pub enum ModelHandle {
    Eager(Arc<dyn MatchModel>),
    Lazy(Arc<LazyModel>),
}

impl ModelHandle {
    pub fn as_model(&self) -> Arc<dyn MatchModel> {
        match self {
            ModelHandle::Eager(model) => model.clone(),
            ModelHandle::Lazy(model) => model.clone() as Arc<dyn MatchModel>,
        }
    }

    pub fn is_loaded(&self) -> bool {
        match self {
            ModelHandle::Eager(_) => true,
            ModelHandle::Lazy(model) => model.is_loaded(),
        }
    }
}

type IpRateLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock, NoOpMiddleware>;

#[derive(Clone)]
pub struct AppState {
    pub scorer: Arc<MatchScorer>,
    pub ranker: TalentRanker,
    pub model: ModelHandle,
    pub config: AppConfig,
    rate_limiter: Arc<IpRateLimiter>,
    pub readiness: Arc<AtomicBool>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        config: AppConfig,
        mappings: Arc<dyn MappingProvider>,
        model: ModelHandle,
    ) -> Result<Self, ApiError> {
        let scorer = Arc::new(
            MatchScorer::new(mappings, model.as_model())
                .with_adjustment(config.adjustment.strategy())
                .with_observer(Arc::new(MetricsObserver)),
        );
        let ranker = TalentRanker::new(scorer.clone()).with_threshold(config.rank_threshold);
        let rate_limiter = build_ip_limiter(config.rate_limit)?;

        Ok(Self {
            scorer,
            ranker,
            model,
            config,
            rate_limiter,
            readiness: Arc::new(AtomicBool::new(true)),
        })
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
}

fn build_ip_limiter(config: RateLimitConfig) -> Result<Arc<IpRateLimiter>, ApiError> {
    let nanos_per_token = 1_000_000_000u64 / config.per_sec.max(1);
    let burst = NonZeroU32::new(config.burst)
        .ok_or_else(|| ApiError::Configuration("rate limit burst must be positive".into()))?;
    let quota = Quota::with_period(Duration::from_nanos(nanos_per_token.max(1)))
        .ok_or_else(|| ApiError::Configuration("rate limit period must be positive".into()))?
        .allow_burst(burst);

    Ok(Arc::new(RateLimiter::keyed(quota)))
}

fn request_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
}

async fn global_rate_limit(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(client_ip) = request_ip(&req) {
        if state.rate_limiter.check_key(&client_ip).is_err() {
            return Err(ApiError::TooManyRequests("rate limit exceeded".into()));
        }
    }

    Ok(next.run(req).await)
}

async fn attach_request_id_context(req: Request<Body>, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    error::with_request_id(request_id, next.run(req)).await
}

pub fn create_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    let request_id_header = HeaderName::from_static("x-request-id");
    let trace_header = request_id_header.clone();

    let trace = TraceLayer::new_for_http().make_span_with(move |request: &Request<Body>| {
        let request_id = request
            .headers()
            .get(&trace_header)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");

        tracing::info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
            status = tracing::field::Empty,
        )
    });

    Router::new()
        .route("/", get(health::root))
        .route("/test", get(health::root))
        .route("/livez", get(health::livez))
        .route("/readyz", get(health::readyz))
        .route("/predict", post(predict::predict))
        .route("/rank_talent", post(rank::rank_talent))
        .route("/explain", post(explain::explain))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            global_rate_limit,
        ))
        .layer(middleware::from_fn(attach_request_id_context))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(trace)
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(
            request_id_header,
            MakeRequestUuid::default(),
        ))
        .layer(cors)
        .with_state(state)
}

/// State over injected mappings and model with default test configuration.
pub fn test_state(
    mappings: Arc<dyn MappingProvider>,
    model: ModelHandle,
) -> Result<SharedState, ApiError> {
    Ok(Arc::new(AppState::new(
        AppConfig::for_tests(),
        mappings,
        model,
    )?))
}

async fn load_vocabulary(config: &AppConfig) -> Result<FacetVocabulary, ApiError> {
    match config.mapping_source {
        MappingSourceKind::Static => Ok(load_static_vocabulary(&config.asset_dir)?),
        MappingSourceKind::Database => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                ApiError::Configuration("DATABASE_URL is required for database mappings".into())
            })?;
            let max_lengths = config
                .maxlen_path
                .as_deref()
                .map(load_max_length_table)
                .transpose()?;

            let pool = create_pool_from_url_checked(url).await?;
            Ok(load_database_vocabulary(&pool, max_lengths).await?)
        }
    }
}

fn load_model(config: &AppConfig) -> Result<ModelHandle, ApiError> {
    match config.model_loading {
        ModelLoading::Eager => {
            let model = CandleNcfModel::load(&config.model_path)?;
            Ok(ModelHandle::Eager(Arc::new(model)))
        }
        ModelLoading::Lazy => {
            info!(path = %config.model_path.display(), "model will load on first prediction");
            Ok(ModelHandle::Lazy(Arc::new(LazyModel::candle(&config.model_path))))
        }
    }
}

pub async fn run() -> Result<(), ApiError> {
    dotenv().ok();
    init_tracing(env!("CARGO_PKG_NAME"));

    let cli = Cli::parse();
    let config = AppConfig::from_cli(cli)?;
    ncf_metrics::init_metrics(config.metrics_port);

    let vocabulary = load_vocabulary(&config).await?;
    let model = load_model(&config)?;

    let state = Arc::new(AppState::new(config.clone(), Arc::new(vocabulary), model)?);

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let app = create_router(state.clone());

    info!(
        %addr,
        mapping_source = ?config.mapping_source,
        model_loading = ?config.model_loading,
        adjustment = state.scorer.adjustment_name(),
        rank_threshold = ?config.rank_threshold,
        "ncf-api listening"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let service = app.into_make_service_with_connect_info::<SocketAddr>();

    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    Ok(())
}

async fn shutdown_signal(state: SharedState) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    state.readiness.store(false, Ordering::SeqCst);

    // Let load balancers see /readyz fail before connections stop.
    tokio::time::sleep(SHUTDOWN_DRAIN_GRACE).await;
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["ncf-api"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[tokio::test]
    async fn sets_request_id_when_missing() {
        let app = create_router(testing::state());

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[test]
    fn model_path_defaults_into_asset_dir() {
        let config = AppConfig::from_cli(cli(&["--asset-dir", "assets"])).unwrap();

        assert_eq!(config.model_path, PathBuf::from("assets").join(DEFAULT_MODEL_FILE));
        assert_eq!(config.mapping_source, MappingSourceKind::Static);
        assert_eq!(config.adjustment, AdjustmentKind::None);
    }

    #[test]
    fn parses_strategy_choices() {
        let config = AppConfig::from_cli(cli(&[
            "--score-adjustment",
            "tag_count_penalty",
            "--model-loading",
            "lazy",
            "--rank-threshold",
            "0.25",
        ]))
        .unwrap();

        assert_eq!(config.adjustment, AdjustmentKind::TagCountPenalty);
        assert_eq!(config.model_loading, ModelLoading::Lazy);
        assert_eq!(config.rank_threshold, Some(0.25));
    }

    #[test]
    fn database_source_requires_url() {
        let err = AppConfig::from_cli(cli(&["--mapping-source", "database"])).unwrap_err();
        assert!(matches!(err, ApiError::Configuration(msg) if msg.contains("DATABASE_URL")));
    }

    #[test]
    fn rejects_wildcard_cors() {
        let err = AppConfig::from_cli(cli(&["--cors-origins", "*"])).unwrap_err();
        assert!(matches!(err, ApiError::Configuration(_)));
    }

    #[test]
    fn rejects_non_finite_threshold() {
        let err = AppConfig::from_cli(cli(&["--rank-threshold", "NaN"])).unwrap_err();
        assert!(matches!(err, ApiError::Configuration(_)));
    }

    #[test]
    fn lazy_handle_reports_load_state() {
        let lazy = Arc::new(LazyModel::new(|| {
            let model: Arc<dyn MatchModel> = Arc::new(testing::FixedModel(0.1));
            Ok(model)
        }));
        let handle = ModelHandle::Lazy(lazy.clone());

        assert!(!handle.is_loaded());
        lazy.get().unwrap();
        assert!(handle.is_loaded());
    }
}
