use actix_web::http::header::{self, ContentType};
use actix_web::{get, guard, web, HttpRequest, HttpResponse};
use cnn_runner_core::ModelHolder;
use tracing::{debug, warn};

use crate::error::InvocationError;
use crate::preprocess::{self, ImageSpec};

/// The only media type `/invocations` accepts.
pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// Shared by every worker: the lazily-loaded model and the input layout.
pub struct AppState {
    pub holder: ModelHolder,
    pub image: ImageSpec,
}

impl AppState {
    pub fn new(holder: ModelHolder, image: ImageSpec) -> Self {
        Self { holder, image }
    }
}

/// Registers `/ping` and `/invocations`. Expects `web::Data<AppState>` in app data.
///
/// The content type is matched by a route guard, so a request that is not
/// `image/jpeg` gets 415 before its body is read or size-checked.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(ping).service(
        web::resource("/invocations")
            .route(
                web::post()
                    .guard(guard::Header("content-type", JPEG_CONTENT_TYPE))
                    .to(invocations),
            )
            .route(web::post().to(unsupported_media_type)),
    );
}

#[get("/ping")]
async fn ping(state: web::Data<AppState>) -> Result<HttpResponse, InvocationError> {
    let available = web::block(move || match state.holder.get_model() {
        Ok(_) => true,
        Err(e) => {
            warn!("Health check failed: {e:#}");
            false
        }
    })
    .await?;

    let mut response = if available {
        HttpResponse::Ok()
    } else {
        HttpResponse::NotFound()
    };
    Ok(response.content_type(ContentType::json()).body("\n"))
}

async fn invocations(
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, InvocationError> {
    let score = web::block(move || -> Result<Option<f32>, InvocationError> {
        let batch = preprocess::decode_batch(&body, &state.image)?;
        state
            .holder
            .predict(&batch)
            .map_err(InvocationError::Inference)
    })
    .await??
    .ok_or(InvocationError::ModelUnavailable)?;

    debug!("Prediction: {score}");
    Ok(HttpResponse::Ok().json(score))
}

/// Any `/invocations` POST whose `Content-Type` is not exactly `image/jpeg`.
async fn unsupported_media_type(req: HttpRequest) -> Result<HttpResponse, InvocationError> {
    debug!(
        "Rejected content type {:?}",
        req.headers().get(header::CONTENT_TYPE)
    );
    Err(InvocationError::UnsupportedMediaType)
}
