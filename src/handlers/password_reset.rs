use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

/// ユーザー有無に関わらず返す唯一のメッセージ
const RESET_REQUEST_MESSAGE: &str =
    "メールアドレスが登録されている場合、パスワードリセット用のリンクを送信しました";

// === リセットリクエスト ===

#[derive(Debug, Deserialize)]
pub struct ResetRequestRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ResetRequestResponse {
    pub message: String,
}

/// POST /api/password/reset-request
///
/// # Security
/// 常に200を返す（ユーザー存在有無を漏洩しない）
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<ResetRequestRequest>,
) -> Result<Json<ResetRequestResponse>, AppError> {
    validate_email(&request.email)?;

    state
        .password_reset_service
        .request_reset(&request.email)
        .await?;

    Ok(Json(ResetRequestResponse {
        message: RESET_REQUEST_MESSAGE.to_string(),
    }))
}

// === トークン検証 ===

#[derive(Debug, Deserialize)]
pub struct VerifyTokenQuery {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyTokenResponse {
    pub valid: bool,
    pub message: String,
}

/// GET /api/password/reset/verify?token=...
///
/// 存在しない・期限切れ・空のトークンはすべて同じエラー
pub async fn verify_reset_token(
    State(state): State<AppState>,
    Query(query): Query<VerifyTokenQuery>,
) -> Result<Json<VerifyTokenResponse>, AppError> {
    if !state
        .password_reset_service
        .verify_token(&query.token)
        .await?
    {
        return Err(AppError::InvalidOrExpiredToken);
    }

    Ok(Json(VerifyTokenResponse {
        valid: true,
        message: "トークンは有効です".to_string(),
    }))
}

// === パスワードリセット実行 ===

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default, alias = "password")]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct ResetPasswordResponse {
    pub message: String,
}

/// POST /api/password/reset
///
/// # Security
/// - token, new_password はログに出力しない
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<ResetPasswordResponse>, AppError> {
    validate_reset_password_request(&request)?;

    state
        .password_reset_service
        .complete_reset(&request.token, &request.new_password)
        .await?;

    Ok(Json(ResetPasswordResponse {
        message: "パスワードが更新されました".to_string(),
    }))
}

/// メールアドレスの必須チェック
///
/// 形式は検証しない（登録有無の判定はサービス側で行う）
fn validate_email(email: &str) -> Result<(), AppError> {
    if email.trim().is_empty() {
        return Err(AppError::Validation("メールアドレスは必須です".to_string()));
    }
    Ok(())
}

/// リセットパスワードリクエストのバリデーション
fn validate_reset_password_request(request: &ResetPasswordRequest) -> Result<(), AppError> {
    // 空トークンも存在しないトークンと同じ応答にする
    if request.token.trim().is_empty() {
        return Err(AppError::InvalidOrExpiredToken);
    }
    if request.new_password.chars().count() < 8 {
        return Err(AppError::Validation(
            "パスワードは8文字以上で入力してください".to_string(),
        ));
    }
    Ok(())
}
