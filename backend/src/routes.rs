use actix_multipart::{Field, Multipart, MultipartError};
use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use futures::TryStreamExt;
use log::{error, info};
use serde_json::json;
use shared::{ErrorResponse, HealthReport};
use uuid::Uuid;

use crate::classifier::{ClassifyError, ModelProvisioner, RawImage};
use crate::config::UploadConfig;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No file uploaded")]
    MissingFile,
    #[error("File must be an image")]
    NotAnImage,
    #[error("Empty file received")]
    EmptyFile,
    #[error("File too large")]
    TooLarge,
    #[error("Invalid image format: {0}")]
    InvalidImage(String),
    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Server error: {0}")]
    Internal(String),
}

impl From<ClassifyError> for ApiError {
    fn from(err: ClassifyError) -> Self {
        match err {
            ClassifyError::InvalidImageFormat(detail) => ApiError::InvalidImage(detail),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ApiError::Internal(detail) = self {
            error!("Unexpected error in predict endpoint: {}", detail);
        }
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api").route(web::get().to(api_index)))
        .service(web::resource("/api/predict").route(web::post().to(predict)))
        .service(web::resource("/api/health").route(web::get().to(health)));
}

async fn api_index() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": "Sneaker Authentication API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "predict": "POST /api/predict",
            "health": "GET /api/health",
        }
    }))
}

fn is_image(field: &Field) -> bool {
    field
        .content_type()
        .map(|mime| mime.essence_str().starts_with("image/"))
        .unwrap_or(false)
}

/// Reads the first file part (preferring one named `file`) into memory,
/// rejecting non-image parts before their body is read.
async fn read_upload(payload: &mut Multipart, max_bytes: usize) -> Result<Vec<u8>, ApiError> {
    while let Some(mut field) = payload.try_next().await? {
        let named_file = field.name() == Some("file");
        let has_filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .is_some();
        if !named_file && !has_filename {
            continue;
        }
        if !is_image(&field) {
            return Err(ApiError::NotAnImage);
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            if bytes.len() + chunk.len() > max_bytes {
                return Err(ApiError::TooLarge);
            }
            bytes.extend_from_slice(&chunk);
        }
        if bytes.is_empty() {
            return Err(ApiError::EmptyFile);
        }
        return Ok(bytes);
    }
    Err(ApiError::MissingFile)
}

async fn predict(
    provisioner: web::Data<ModelProvisioner>,
    upload: web::Data<UploadConfig>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let request_id = Uuid::new_v4();
    let bytes = read_upload(&mut payload, upload.max_bytes).await?;
    let image = RawImage::decode(&bytes)?;
    info!(
        "[{}] Received {}x{} image ({} bytes)",
        request_id,
        image.width(),
        image.height(),
        bytes.len()
    );
    drop(bytes);

    let result = provisioner.predict(request_id, image).await;
    Ok(HttpResponse::Ok().json(result))
}

pub fn health_report(provisioner: &ModelProvisioner) -> HealthReport {
    let artifact = provisioner.locator().status();
    let state = provisioner.state();
    let model_status = match artifact.size_bytes {
        Some(size) if artifact.found => {
            format!("available ({:.1} MB)", size as f64 / (1024.0 * 1024.0))
        }
        _ => "not found".to_string(),
    };
    let working_directory = std::env::current_dir()
        .map(|dir| dir.display().to_string())
        .unwrap_or_default();

    HealthReport {
        status: "healthy".to_string(),
        model_status,
        model_found: artifact.found,
        model_size_bytes: artifact.size_bytes,
        model_path: artifact.path.display().to_string(),
        model_download_url: provisioner.locator().remote_url().map(str::to_string),
        model_loaded: provisioner.is_ready(),
        compute_target: state.compute_target,
        working_directory,
        timestamp: chrono::Utc::now().to_rfc3339(),
        memory_optimized: true,
        memory: provisioner.reclaimer().sample(),
    }
}

async fn health(provisioner: web::Data<ModelProvisioner>) -> HttpResponse {
    HttpResponse::Ok().json(health_report(&provisioner))
}
