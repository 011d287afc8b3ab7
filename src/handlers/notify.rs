use axum::{extract::State, Json};

use crate::error::{ApiResponse, AppError, Result};
use crate::models::SendEmailRequest;
use crate::services::mailer;
use crate::AppState;

/// Email a share link to someone
/// POST /api/file/send-email
pub async fn send_email(
    State(state): State<AppState>,
    Json(req): Json<SendEmailRequest>,
) -> Result<Json<ApiResponse<()>>> {
    let email = req.email.as_deref().map(str::trim).unwrap_or_default();
    let link = req.download_link.as_deref().map(str::trim).unwrap_or_default();
    if email.is_empty() || link.is_empty() {
        return Err(AppError::BadRequest(
            "Email and download link are required".to_string(),
        ));
    }

    let message = mailer::share_link_notification(
        email,
        link,
        req.file_name.as_deref(),
        req.expiry_time.as_deref(),
    );
    state.mailer.send(&message).await?;

    Ok(Json(ApiResponse::<()>::success_message("Email sent successfully")))
}
