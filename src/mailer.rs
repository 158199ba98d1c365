use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use thiserror::Error;

use crate::config::{AppConfig, SmtpSettings};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid email address: {0}")]
    Address(String),
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("send failed: {0}")]
    Transport(String),
}

/// A fully rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Mailer Trait
///
/// The outbound email collaborator. Implementations only deliver; rendering and the
/// best-effort policy live in [`Notifier`].
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError>;
}

pub type MailerState = Arc<dyn Mailer>;

// --- SMTP ---

/// SmtpMailer
///
/// Delivers over SMTP with `lettre`. The connection is opened lazily on first send.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    #[tracing::instrument(
        name = "smtp_mailer_new",
        skip(settings),
        fields(host = %settings.host, port = %settings.port, use_tls = %settings.use_tls)
    )]
    pub fn new(settings: &SmtpSettings) -> Result<Self, MailError> {
        let from: Mailbox = format!("{} <{}>", settings.from_name, settings.from_address)
            .parse()
            .map_err(|e| MailError::Address(format!("{e}")))?;

        let builder = if settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .map_err(|e| MailError::Transport(format!("{e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
        };

        let mut builder = builder.port(settings.port);
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        tracing::debug!("SMTP mailer initialized");
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[tracing::instrument(name = "smtp_send", skip(self, email), fields(to = %email.to))]
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| MailError::Address(format!("{e}")))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html)
            .map_err(|e| MailError::Build(format!("{e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(format!("{e}")))?;

        tracing::info!("email sent");
        Ok(())
    }
}

// --- Log-only ---

/// Used when no SMTP host is configured: every message is written to the log instead.
#[derive(Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "email delivery disabled; message logged only"
        );
        tracing::debug!(body = %email.html, "suppressed email body");
        Ok(())
    }
}

// --- Mock ---

/// MockMailer
///
/// Records every message instead of sending it. `failing()` builds one that rejects
/// every send, for exercising the best-effort paths.
#[derive(Default)]
pub struct MockMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    fail: bool,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    /// Messages accepted so far, in send order.
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Transport("mock transport is down".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(email);
        Ok(())
    }
}

// --- Templates ---

/// Replaces every `{{key}}` with its value from `data`. Whitespace inside the braces is
/// ignored; unknown keys and unterminated braces are left as written.
pub fn render_template(template: &str, data: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let placeholder = &rest[start..start + 2 + end + 2];
        match data.get(after_open[..end].trim()) {
            Some(value) => out.push_str(value),
            None => out.push_str(placeholder),
        }
        rest = &after_open[end + 2..];
    }

    out.push_str(rest);
    out
}

/// Escapes text for use inside HTML element content or a quoted attribute.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// The notification kinds the credential flows emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailEvent {
    Registration,
    AdminNewUser,
    PasswordChanged,
    PasswordResetLink,
}

impl MailEvent {
    fn subject(self) -> &'static str {
        match self {
            MailEvent::Registration => "Welcome to {{appName}}",
            MailEvent::AdminNewUser => "New User Registration Notification",
            MailEvent::PasswordChanged => "Password Changed Notification",
            MailEvent::PasswordResetLink => "Password Reset Request",
        }
    }

    fn body(self) -> &'static str {
        match self {
            MailEvent::Registration => {
                "<h1>Welcome to {{appName}}!</h1>\n\
                 <p>Dear {{firstName}},</p>\n\
                 <p>Thank you for registering with {{appName}}. Your account has been successfully created.</p>\n\
                 <p>You can now login to your account using your email and password.</p>\n\
                 <p>Best regards,<br>{{appName}} Team</p>"
            }
            MailEvent::AdminNewUser => {
                "<h1>New User Registration</h1>\n\
                 <p>A new user has registered:</p>\n\
                 <ul>\n\
                 <li>Name: {{firstName}} {{lastName}}</li>\n\
                 <li>Email: {{email}}</li>\n\
                 <li>Registration Date: {{registrationDate}}</li>\n\
                 </ul>"
            }
            MailEvent::PasswordChanged => {
                "<h1>Password Changed</h1>\n\
                 <p>Dear {{firstName}},</p>\n\
                 <p>Your password has been successfully changed.</p>\n\
                 <p>If you did not make this change, please contact support immediately.</p>\n\
                 <p>Best regards,<br>{{appName}} Team</p>"
            }
            MailEvent::PasswordResetLink => {
                "<h1>Password Reset Request</h1>\n\
                 <p>Dear {{firstName}},</p>\n\
                 <p>You have requested to reset your password. Click the link below to reset your password:</p>\n\
                 <p><a href=\"{{resetLink}}\">Reset Password</a></p>\n\
                 <p>This link will expire in {{resetExpiry}} hours.</p>\n\
                 <p>If you did not request this, please ignore this email.</p>\n\
                 <p>Best regards,<br>{{appName}} Team</p>"
            }
        }
    }
}

/// Notifier
///
/// Renders [`MailEvent`] templates and hands them to the configured [`Mailer`].
/// Delivery is best-effort: a failure is logged and swallowed, never returned to the
/// operation that triggered it.
#[derive(Clone)]
pub struct Notifier {
    mailer: MailerState,
    app_name: String,
}

impl Notifier {
    pub fn new(mailer: MailerState, config: &AppConfig) -> Self {
        Self {
            mailer,
            app_name: config.app_name.clone(),
        }
    }

    /// Renders `event` with `data` (plus `appName`) and sends it to `recipient`.
    /// Values are HTML-escaped in the body; the subject is plain text.
    /// Returns whether the mailer accepted the message.
    pub async fn notify(
        &self,
        event: MailEvent,
        recipient: &str,
        mut data: HashMap<&str, String>,
    ) -> bool {
        data.entry("appName").or_insert_with(|| self.app_name.clone());
        let escaped: HashMap<&str, String> = data
            .iter()
            .map(|(key, value)| (*key, escape_html(value)))
            .collect();

        let email = OutgoingEmail {
            to: recipient.to_string(),
            subject: render_template(event.subject(), &data),
            html: render_template(event.body(), &escaped),
        };

        match self.mailer.send(email).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, ?event, to = %recipient, "notification email failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_substituted_and_unknown_ones_kept() {
        let data = HashMap::from([("firstName", "Ada".to_string())]);
        assert_eq!(
            render_template("Hi {{firstName}}, {{ firstName }}! {{missing}}", &data),
            "Hi Ada, Ada! {{missing}}"
        );
    }

    #[test]
    fn unterminated_placeholder_is_left_alone() {
        let data = HashMap::from([("a", "1".to_string())]);
        assert_eq!(render_template("x {{a}} {{b", &data), "x 1 {{b");
    }

    #[test]
    fn markup_characters_are_escaped() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
        assert_eq!(escape_html("plain text"), "plain text");
    }

    #[tokio::test]
    async fn notify_escapes_values_in_the_body_only() {
        let mailer = Arc::new(MockMailer::new());
        let notifier = Notifier::new(mailer.clone() as MailerState, &AppConfig::default());

        let accepted = notifier
            .notify(
                MailEvent::AdminNewUser,
                "ops@example.com",
                HashMap::from([
                    ("firstName", "<b>Eve</b>".to_string()),
                    ("lastName", "O'Neil".to_string()),
                    ("email", "eve@example.com".to_string()),
                    ("registrationDate", "today".to_string()),
                ]),
            )
            .await;
        assert!(accepted);

        let sent = mailer.sent();
        assert!(sent[0].html.contains("Name: &lt;b&gt;Eve&lt;/b&gt; O&#39;Neil"));
        assert!(!sent[0].html.contains("<b>Eve</b>"));
        assert_eq!(sent[0].subject, "New User Registration Notification");
    }
}
