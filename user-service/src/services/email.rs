use async_trait::async_trait;
use lettre::{
    Message, SmtpTransport, Transport, message::header::ContentType,
    transport::smtp::authentication::Credentials,
};
use service_core::error::AppError;
use std::time::Duration;

/// Outbound mail collaborator. Any failure is terminal for the request
/// that triggered it; there is no silent partial success.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_password_reset_otp(&self, to_email: &str, code: &str) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct EmailService {
    mailer: SmtpTransport,
    from_address: String,
}

impl EmailService {
    pub fn new(config: &crate::config::SmtpConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "Email service initialized");

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: &str,
        html_body: &str,
    ) -> Result<(), AppError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|e: lettre::address::AddressError| AppError::InternalError(e.into()))?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| AppError::InternalError(e.into()))?)
            .subject(subject)
            .multipart(
                lettre::message::MultiPart::alternative()
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body.to_string()),
                    )
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )
            .map_err(|e| AppError::InternalError(e.into()))?;

        // Send email in blocking thread pool to avoid blocking async runtime
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent successfully");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e.to_string(), to = %to_email, "Failed to send email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl EmailProvider for EmailService {
    async fn send_password_reset_otp(&self, to_email: &str, code: &str) -> Result<(), AppError> {
        let html_body = format!(
            r###"            <html>
                <body style="font-family: Arial, sans-serif;">
                    <h2>Password Reset Code</h2>
                    <p>We received a request to reset your password. Your one-time code is:</p>
                    <p style="font-size: 28px; font-weight: bold; letter-spacing: 4px;">{}</p>
                    <p style="color: #666; font-size: 12px;">
                        This code will expire in 10 minutes. If you didn't request this, please ignore this email.
                    </p>
                </body>
            </html>
            "###,
            code
        );

        let plain_body = format!(
            "Password Reset Code\n\n            We received a request to reset your password. Your one-time code is: {}

            This code will expire in 10 minutes. If you didn't request this, please ignore this email.",
            code
        );

        self.send_email(to_email, "Password Reset Code", &plain_body, &html_body)
            .await
    }
}

/// Recording mock mailer for tests: captures every sent code and can be
/// switched into a failing mode to exercise delivery errors.
#[derive(Default)]
pub struct MockEmailService {
    sent: std::sync::Mutex<Vec<(String, String)>>,
    fail: std::sync::atomic::AtomicBool,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    /// (recipient, code) pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_password_reset_otp(&self, to_email: &str, code: &str) -> Result<(), AppError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AppError::EmailError("SMTP connection refused".to_string()));
        }

        self.sent
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Mailer mutex poisoned: {}", e)))?
            .push((to_email.to_string(), code.to_string()));
        Ok(())
    }
}
