use std::sync::Arc;

use async_trait::async_trait;

#[cfg(feature = "email")]
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
#[cfg(feature = "email")]
use secrecy::ExposeSecret;

#[cfg(feature = "email")]
use crate::config::Config;

const PASSWORD_RESET_SUBJECT: &str = "パスワード再設定のご案内";

/// メール送信エラー
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("メールアドレスが不正です: {0}")]
    Address(String),

    #[error("メッセージの構築に失敗しました: {0}")]
    Build(String),

    #[error("メール送信に失敗しました: {0}")]
    Transport(String),
}

/// 送信するメール
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// メール送信手段
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// 開発環境用: 送信せずログ出力のみ
///
/// 本文にはリセットトークンが含まれるため、宛先と件名のみ出力する
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        tracing::info!(
            to = %mail.to,
            subject = %mail.subject,
            "メール送信（開発モード）"
        );
        Ok(())
    }
}

/// SMTP 送信（lettre）
#[cfg(feature = "email")]
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

#[cfg(feature = "email")]
impl SmtpMailer {
    /// 設定から SmtpMailer を作成
    ///
    /// SMTPホストまたは送信元アドレスが未設定の場合は `None`
    pub fn from_config(config: &Config) -> Result<Option<Self>, MailError> {
        let (Some(host), Some(from_address)) = (&config.smtp_host, &config.smtp_from_address)
        else {
            return Ok(None);
        };

        let from = from_address
            .parse::<Mailbox>()
            .map_err(|e| MailError::Address(e.to_string()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(
                username.expose_secret().clone(),
                password.expose_secret().clone(),
            ));
        }

        Ok(Some(Self {
            transport: builder.build(),
            from,
        }))
    }
}

#[cfg(feature = "email")]
#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let to = mail
            .to
            .parse::<Mailbox>()
            .map_err(|e| MailError::Address(e.to_string()))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(mail.html_body.clone())
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        Ok(())
    }
}

/// メール送信サービス
#[derive(Clone)]
pub struct EmailService {
    mailer: Arc<dyn Mailer>,
}

impl EmailService {
    /// 新しい EmailService を作成
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    /// パスワードリセットメールを送信
    pub async fn send_password_reset_email(
        &self,
        to: &str,
        name: Option<&str>,
        reset_url: &str,
    ) -> Result<(), MailError> {
        let mail = OutgoingMail {
            to: to.to_string(),
            subject: PASSWORD_RESET_SUBJECT.to_string(),
            html_body: password_reset_body(name, reset_url),
        };

        self.mailer.send(&mail).await
    }
}

fn password_reset_body(name: Option<&str>, reset_url: &str) -> String {
    let greeting = match name {
        Some(name) if !name.trim().is_empty() => format!("{name} 様"),
        _ => "お客様".to_string(),
    };

    format!(
        r#"<p>{greeting}</p>
<p>パスワード再設定のリクエストを受け付けました。以下のリンクから新しいパスワードを設定してください。</p>
<p><a href="{reset_url}">パスワードを再設定する</a></p>
<p>このリンクの有効期限は24時間です。お心当たりがない場合はこのメールを破棄してください。</p>
<p style="word-break: break-all;">{reset_url}</p>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct ChannelMailer(mpsc::UnboundedSender<OutgoingMail>);

    #[async_trait]
    impl Mailer for ChannelMailer {
        async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
            self.0
                .send(mail.clone())
                .map_err(|e| MailError::Transport(e.to_string()))
        }
    }

    #[tokio::test]
    async fn test_password_reset_email_contains_link() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let service = EmailService::new(Arc::new(ChannelMailer(tx)));

        service
            .send_password_reset_email(
                "a@example.com",
                Some("Alice"),
                "http://localhost:3000/reset-password/abc",
            )
            .await
            .unwrap();

        let mail = rx.recv().await.unwrap();
        assert_eq!(mail.to, "a@example.com");
        assert_eq!(mail.subject, PASSWORD_RESET_SUBJECT);
        assert!(
            mail.html_body
                .contains(r#"href="http://localhost:3000/reset-password/abc""#)
        );
        assert!(mail.html_body.contains("Alice 様"));
    }

    #[test]
    fn test_body_without_name() {
        let body = password_reset_body(None, "http://x/reset-password/t");
        assert!(body.starts_with("<p>お客様</p>"));
    }

    #[tokio::test]
    async fn test_log_mailer_always_succeeds() {
        let mail = OutgoingMail {
            to: "a@example.com".to_string(),
            subject: "subject".to_string(),
            html_body: "body".to_string(),
        };
        assert!(LogMailer.send(&mail).await.is_ok());
    }
}
