use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    response::Html,
    Json,
};
use vibook_vqa::{
    imgproc::decode_image,
    vqa::{VqaRequest, VqaResponse},
    VqaError,
};

use crate::app::AppState;
use crate::error::ApiError;

/// The fields of a `POST /vqa` form.
struct VqaForm {
    question: String,
    image: Bytes,
}

impl VqaForm {
    async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut question = None;
        let mut image = None;

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("question") => question = Some(field.text().await?),
                Some("image") => image = Some(field.bytes().await?),
                _ => {}
            }
        }

        let question =
            question.ok_or_else(|| ApiError::InvalidForm("Field required: question".into()))?;
        if question.trim().is_empty() {
            return Err(ApiError::InvalidForm(
                "Field must not be empty: question".into(),
            ));
        }
        let image = image.ok_or_else(|| ApiError::InvalidForm("Field required: image".into()))?;

        Ok(Self { question, image })
    }
}

pub async fn index(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let page = state
        .pages
        .render_index(state.host.is_ready())
        .map_err(|e| {
            log::error!("Failed to render the page: {e}");
            ApiError::Internal(e.to_string())
        })?;

    Ok(Html(page))
}

/// Answer a question about an uploaded image.
///
/// Readiness is checked before the body is read, so an unavailable model answers 503 to
/// any request.
pub async fn vqa(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<VqaResponse>, ApiError> {
    if !state.host.is_ready() {
        log::warn!("Rejecting /vqa request: the model is not loaded");
        return Err(ApiError::ModelUnavailable);
    }

    let form = VqaForm::from_multipart(multipart?).await?;
    log::info!(
        "Received question {:?} with an image of {} bytes",
        form.question,
        form.image.len()
    );

    let host = state.host.clone();
    let result = tokio::task::spawn_blocking(move || -> Result<VqaResponse, VqaError> {
        let image = decode_image(&form.image)?;
        VqaRequest {
            question: form.question,
            image,
        }
        .answer(&host)
    })
    .await
    .map_err(|e| {
        log::error!("VQA task failed: {e}");
        ApiError::Internal(e.to_string())
    })?;

    match result {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            log::error!("Error during VQA processing: {e}");
            Err(e.into())
        }
    }
}
