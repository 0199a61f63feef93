//! Comment route handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use dongne_core::{CommentId, ReviewId};

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::Comment;
use crate::routes::reviews::{BodyRequest, DeletedResponse};
use crate::state::AppState;

/// `GET /api/reviews/{id}/comments`
pub async fn list(
    State(state): State<AppState>,
    Path(review_id): Path<ReviewId>,
) -> Result<Json<Vec<Comment>>> {
    Ok(Json(state.comments().list(review_id).await?))
}

/// `POST /api/reviews/{id}/comments`
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(principal): RequireAuth,
    Path(review_id): Path<ReviewId>,
    Json(req): Json<BodyRequest>,
) -> Result<(StatusCode, Json<Comment>)> {
    let comment = state
        .comments()
        .create(review_id, principal.id, &req.body)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// `PATCH /api/comments/{id}`
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(principal): RequireAuth,
    Path(id): Path<CommentId>,
    Json(req): Json<BodyRequest>,
) -> Result<Json<Comment>> {
    let comment = state
        .comments()
        .update_body(id, principal.id, &req.body)
        .await?;
    Ok(Json(comment))
}

/// `DELETE /api/comments/{id}`
pub async fn delete(
    State(state): State<AppState>,
    RequireAuth(principal): RequireAuth,
    Path(id): Path<CommentId>,
) -> Result<Json<DeletedResponse>> {
    let deleted = state.comments().delete(id, principal.id).await?;
    Ok(Json(DeletedResponse { deleted }))
}
