//! Review route handlers, including slot image uploads.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use dongne_core::{ImageSlot, ReviewId, ShopId};

use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::Review;
use crate::services::media::ImageFormat;
use crate::state::AppState;

/// Multipart field carrying the image.
const IMAGE_FIELD: &str = "image";

/// Review creation body.
#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub shop_id: ShopId,
    pub body: String,
}

/// Body edit request, shared with comments.
#[derive(Debug, Deserialize)]
pub struct BodyRequest {
    pub body: String,
}

/// Result of a delete.
#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

/// Result of an image upload.
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub slot: ImageSlot,
    pub url: String,
}

fn parse_slot(raw: i64) -> Result<ImageSlot> {
    ImageSlot::new(raw).map_err(|e| AppError::BadRequest(e.to_string()))
}

/// `POST /api/reviews`
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(principal): RequireAuth,
    Json(req): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>)> {
    let review = state
        .reviews()
        .create(principal.id, req.shop_id, &req.body)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// `GET /api/reviews/{id}`
pub async fn show(State(state): State<AppState>, Path(id): Path<ReviewId>) -> Result<Json<Review>> {
    Ok(Json(state.reviews().get(id).await?))
}

/// `PATCH /api/reviews/{id}`
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(principal): RequireAuth,
    Path(id): Path<ReviewId>,
    Json(req): Json<BodyRequest>,
) -> Result<Json<Review>> {
    let review = state
        .reviews()
        .update_body(id, principal.id, &req.body)
        .await?;
    Ok(Json(review))
}

/// `DELETE /api/reviews/{id}`
pub async fn delete(
    State(state): State<AppState>,
    RequireAuth(principal): RequireAuth,
    Path(id): Path<ReviewId>,
) -> Result<Json<DeletedResponse>> {
    let deleted = state.reviews().delete(id, principal.id).await?;
    Ok(Json(DeletedResponse { deleted }))
}

/// Store the `image` field of a multipart body in a slot.
///
/// The declared content type wins; without one the filename extension is
/// used. Size and type limits are enforced by the media service.
///
/// # Route
///
/// `PUT /api/reviews/{id}/images/{slot}`
pub async fn upload_image(
    State(state): State<AppState>,
    RequireAuth(principal): RequireAuth,
    Path((id, slot)): Path<(ReviewId, i64)>,
    mut multipart: Multipart,
) -> Result<Json<ImageResponse>> {
    let slot = parse_slot(slot)?;
    let (bytes, mime) = read_image_field(&mut multipart).await?;

    let url = state
        .media()
        .upload(id, principal.id, bytes, &mime, slot)
        .await?;
    Ok(Json(ImageResponse { slot, url }))
}

/// Clear a slot.
///
/// # Route
///
/// `DELETE /api/reviews/{id}/images/{slot}`
pub async fn delete_image(
    State(state): State<AppState>,
    RequireAuth(principal): RequireAuth,
    Path((id, slot)): Path<(ReviewId, i64)>,
) -> Result<Json<DeletedResponse>> {
    let slot = parse_slot(slot)?;
    let deleted = state.media().delete(id, principal.id, slot).await?;
    Ok(Json(DeletedResponse { deleted }))
}

async fn read_image_field(multipart: &mut Multipart) -> Result<(Bytes, String)> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let mime = field
            .content_type()
            .filter(|ct| *ct != "application/octet-stream")
            .map(str::to_owned)
            .or_else(|| {
                field
                    .file_name()
                    .and_then(|name| name.rsplit_once('.'))
                    .and_then(|(_, ext)| ImageFormat::from_extension(ext))
                    .map(|format| format.mime().to_owned())
            })
            .unwrap_or_default();

        return Ok((field.bytes().await?, mime));
    }

    Err(AppError::BadRequest(format!(
        "missing multipart field '{IMAGE_FIELD}'"
    )))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_out_of_range_is_bad_request() {
        assert_eq!(parse_slot(0).unwrap_err().status(), StatusCode::BAD_REQUEST);
        assert_eq!(parse_slot(6).unwrap_err().status(), StatusCode::BAD_REQUEST);
        assert_eq!(parse_slot(5).unwrap().get(), 5);
    }
}
