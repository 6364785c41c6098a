use actix_cors::Cors;
use actix_web::http::StatusCode;
use actix_web::{web, App, HttpResponse, HttpServer, ResponseError};
use semdex_core::{location_summary, DocumentId, Error, FitInfo, LocationSummary, ModelHandle, SimilarityHit};
use semdex_storage::ArtifactStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] Error),

    #[error("Reload unavailable: server was started without an artifact directory")]
    NoStore,

    #[error("Background task failed: {0}")]
    Blocking(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Core(Error::NotReady) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Core(Error::DocumentNotFound(_) | Error::ClusterNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Core(Error::InvalidDimension { .. } | Error::InvalidConfig(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NoStore => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string()
        }))
    }
}

type ApiResult = std::result::Result<HttpResponse, ApiError>;

/// Shared server state: the published model and where to reload it from
#[derive(Clone)]
pub struct AppState {
    pub handle: Arc<ModelHandle>,
    pub store: Option<ArtifactStore>,
}

#[derive(Deserialize)]
struct SearchRequest {
    text: String,
    limit: Option<usize>,
    /// How many streets/zips to include in the location summary
    top_locations: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    hits: Vec<SimilarityHit>,
    locations: LocationSummary,
}

#[derive(Deserialize)]
struct ClustersQuery {
    representatives: Option<usize>,
    top_terms: Option<usize>,
}

#[derive(Deserialize)]
struct AssignRequest {
    text: String,
}

#[derive(Serialize)]
struct InfoResponse {
    generation: u64,
    dataset: FitInfo,
    config: semdex_core::PipelineConfig,
    explained_variance: f64,
}

pub struct RestApi;

impl RestApi {
    pub async fn start(state: AppState, port: u16) -> std::io::Result<()> {
        info!(port, "starting HTTP server");
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(cors)
                .app_data(web::Data::new(state.clone()))
                .configure(routes)
        })
        .bind(("0.0.0.0", port))?
        .run()
        .await
    }
}

/// Route table, shared by the server and tests
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/search", web::post().to(search))
        .route("/clusters", web::get().to(clusters))
        .route("/clusters/assign", web::post().to(assign_text))
        .route("/documents/{id}/cluster", web::get().to(document_cluster))
        .route("/info", web::get().to(model_info))
        .route("/reload", web::post().to(reload));
}

async fn search(state: web::Data<AppState>, req: web::Json<SearchRequest>) -> ApiResult {
    let model = state.handle.current()?;
    let req = req.into_inner();
    let limit = req.limit.unwrap_or(DEFAULT_LIMIT);
    let hits = model.similarity_search(&req.text, limit)?;
    let locations = location_summary(&hits, req.top_locations.unwrap_or(DEFAULT_LIMIT));
    Ok(HttpResponse::Ok().json(SearchResponse { hits, locations }))
}

async fn clusters(state: web::Data<AppState>, query: web::Query<ClustersQuery>) -> ApiResult {
    let model = state.handle.current()?;
    let report = model.cluster_report(
        query.representatives.unwrap_or(5),
        query.top_terms.unwrap_or(DEFAULT_LIMIT),
    )?;
    Ok(HttpResponse::Ok().json(report))
}

async fn assign_text(state: web::Data<AppState>, req: web::Json<AssignRequest>) -> ApiResult {
    let model = state.handle.current()?;
    let cluster_id = model.predict_cluster(&req.text)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "cluster_id": cluster_id })))
}

async fn document_cluster(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    let model = state.handle.current()?;
    let id = DocumentId::from(path.into_inner());
    let cluster_id = model.assign_cluster(&id)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "document_id": id,
        "cluster_id": cluster_id
    })))
}

async fn model_info(state: web::Data<AppState>) -> ApiResult {
    let model = state.handle.current()?;
    Ok(HttpResponse::Ok().json(InfoResponse {
        generation: state.handle.generation(),
        dataset: model.info().clone(),
        config: model.config().clone(),
        explained_variance: model.basis().explained_variance_ratio().iter().sum(),
    }))
}

async fn reload(state: web::Data<AppState>) -> ApiResult {
    let store = state.store.clone().ok_or(ApiError::NoStore)?;
    let loaded = web::block(move || store.load_state())
        .await
        .map_err(|e| ApiError::Blocking(e.to_string()))?;
    let fitted = loaded.map_err(|e| {
        warn!(error = %e, "reload failed; keeping the current model");
        ApiError::from(e)
    })?;
    let documents = fitted.len();
    let generation = state.handle.publish(fitted);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "generation": generation,
        "documents": documents
    })))
}
