use std::sync::Arc;

use crate::config::Config;
use crate::repositories::UserStore;
use crate::services::{AuthService, EmailService, Mailer, PasswordResetService, ResetSettings};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// 認証サービス
    pub auth_service: AuthService,
    /// パスワードリセットサービス
    pub password_reset_service: PasswordResetService,
}

impl AppState {
    /// 新しい AppState を作成
    pub fn new(config: &Config, user_store: Arc<dyn UserStore>, mailer: Arc<dyn Mailer>) -> Self {
        let auth_service = AuthService::new(user_store.clone());
        let password_reset_service = PasswordResetService::new(
            user_store,
            EmailService::new(mailer),
            ResetSettings::from_config(config),
        );

        if config.app_env.is_development() {
            tracing::warn!("開発モード: リセットURLをログに出力します");
        }

        Self {
            auth_service,
            password_reset_service,
        }
    }
}
