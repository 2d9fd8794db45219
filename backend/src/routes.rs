use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::error::ErrorInternalServerError;
use actix_web::{Error, HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use log::{error, info, warn};
use shared::{
    BatchResponse, ClassLabel, ClassificationResponse, EngineStatusResponse, ErrorResponse,
    ItemResponse, VerificationResponse,
};

use crate::batch::{BatchError, BatchProcessor, BatchSettings, ClassificationResult, ItemOutcome, Report};
use crate::config::TriageConfig;
use crate::inference::InferenceEngine;
use crate::sample::ImageSample;
use crate::verification::{VerificationClient, VerificationOutcome};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<InferenceEngine>,
    pub config: Arc<TriageConfig>,
    pub verifier: Option<VerificationClient>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/classify").route(web::post().to(handle_classify)))
        .service(web::resource("/api/status").route(web::get().to(handle_status)));
}

enum Upload {
    Accepted(Vec<ImageSample>),
    Rejected(BatchError),
}

/// Streams file fields into samples. Reading stops at the first file past
/// `max_images`; a field past `max_image_bytes` is drained without buffering.
async fn read_samples(mut payload: Multipart, settings: &BatchSettings) -> Result<Upload, Error> {
    let mut samples = Vec::new();

    while let Some(mut field) = payload.try_next().await? {
        let Some(file_name) = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string)
        else {
            continue;
        };
        if samples.len() == settings.max_images {
            return Ok(Upload::Rejected(BatchError::BatchSizeExceeded {
                requested: samples.len() + 1,
                allowed: settings.max_images,
            }));
        }
        let mime_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_default();

        let mut image_data = Vec::new();
        let mut received = 0usize;
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            received += chunk.len();
            if received <= settings.max_image_bytes {
                image_data.extend_from_slice(&chunk);
            } else if !image_data.is_empty() {
                image_data = Vec::new();
            }
        }

        if received > settings.max_image_bytes {
            warn!("{} exceeds {} bytes, body discarded", file_name, settings.max_image_bytes);
            samples.push(ImageSample::oversized(file_name, mime_type, received));
        } else {
            samples.push(ImageSample::new(file_name, mime_type, image_data));
        }
    }

    if samples.is_empty() {
        return Ok(Upload::Rejected(BatchError::EmptyBatch));
    }
    Ok(Upload::Accepted(samples))
}

async fn handle_classify(state: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, Error> {
    let settings = BatchSettings::from(state.config.as_ref());
    let samples = match read_samples(payload, &settings).await? {
        Upload::Accepted(samples) => samples,
        Upload::Rejected(e) => {
            warn!("Rejecting upload: {}", e);
            return Ok(HttpResponse::BadRequest().json(batch_error_response(&e)));
        }
    };
    info!("Received {} file(s) for classification", samples.len());

    let engine = state.engine.clone();
    let batch = samples.clone();
    let outcome = web::block(move || {
        let mut processor = BatchProcessor::new(engine, settings, rand::rng());
        processor.process(&batch, |progress| {
            log::debug!(
                "{}/{} done ({:.0}%): {}",
                progress.completed,
                progress.total,
                progress.fraction() * 100.0,
                progress.file_name
            );
        })
    })
    .await
    .map_err(|e| {
        error!("Batch worker failed: {}", e);
        ErrorInternalServerError("Batch processing failed")
    })?;

    let report = match outcome {
        Ok(report) => report,
        Err(e) => return Ok(HttpResponse::BadRequest().json(batch_error_response(&e))),
    };

    let mut items = Vec::with_capacity(report.len());
    for item in report.items() {
        let response = match item {
            ItemOutcome::Classified(result) => {
                let verification = match &state.verifier {
                    Some(verifier) => {
                        let sample = &samples[result.position];
                        Some(verify(verifier, sample, result.predicted_class).await)
                    }
                    None => None,
                };
                ItemResponse::Classified {
                    position: result.position,
                    file_name: result.file_name.clone(),
                    fingerprint: result.fingerprint.clone(),
                    result: classification_response(result),
                    verification,
                }
            }
            ItemOutcome::Failed(failed) => ItemResponse::Failed {
                position: failed.position,
                file_name: failed.file_name.clone(),
                error: failed.error.to_string(),
            },
        };
        items.push(response);
    }

    Ok(HttpResponse::Ok().json(batch_response(&report, items)))
}

async fn verify(verifier: &VerificationClient, sample: &ImageSample, label: ClassLabel) -> VerificationResponse {
    match verifier.verify(sample, label).await {
        Ok(VerificationOutcome::Rejected) => VerificationResponse::Rejected,
        Ok(VerificationOutcome::Narrative(text)) => VerificationResponse::Narrative(text),
        Err(e) => {
            error!("Verification of {} failed: {}", sample.file_name(), e);
            VerificationResponse::Error(e.to_string())
        }
    }
}

async fn handle_status(state: web::Data<AppState>) -> HttpResponse {
    let (mode, reason) = match state.engine.unavailable_reason() {
        Some(reason) => ("unavailable", Some(reason.to_string())),
        None => ("loaded", None),
    };

    HttpResponse::Ok().json(EngineStatusResponse {
        mode: mode.to_string(),
        reason,
        max_images: state.config.batch.max_images,
        uncertainty_threshold: state.config.classification.uncertainty_threshold,
        class_labels: ClassLabel::display_names(),
        verification_enabled: state.verifier.is_some(),
    })
}

fn batch_error_response(e: &BatchError) -> ErrorResponse {
    let (requested, allowed) = match e {
        BatchError::BatchSizeExceeded { requested, allowed } => (Some(*requested), Some(*allowed)),
        BatchError::EmptyBatch => (Some(0), None),
    };
    ErrorResponse {
        error: e.to_string(),
        requested,
        allowed,
    }
}

fn classification_response(result: &ClassificationResult) -> ClassificationResponse {
    ClassificationResponse {
        id: result.id,
        probabilities: result.probabilities.values().to_vec(),
        class_labels: ClassLabel::display_names(),
        predicted_class: result.predicted_class,
        predicted_index: result.predicted_index(),
        confidence: result.confidence,
        uncertain: result.uncertain,
        narrative: result.narrative.clone(),
        mode: result.mode,
    }
}

fn batch_response(report: &Report, items: Vec<ItemResponse>) -> BatchResponse {
    BatchResponse {
        batch_id: report.batch_id(),
        created_at: report.created_at(),
        degraded: report.degraded(),
        items,
    }
}
