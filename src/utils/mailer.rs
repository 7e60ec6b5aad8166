use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::models::site_models::Lead;

/// SMTP notifier for the agency inbox. Configuration is optional: with no
/// SMTP settings in the environment every send is silently skipped, which
/// keeps local development quiet.
pub struct Mailer {
    transport: Option<SmtpTransport>,
    from: String,
    inbox: String,
}

impl Mailer {
    pub fn from_env() -> Self {
        let host = std::env::var("SMTP_HOST").ok();
        let username = std::env::var("SMTP_USERNAME").ok();
        let password = std::env::var("SMTP_PASSWORD").ok();
        let from = std::env::var("SMTP_FROM")
            .unwrap_or_else(|_| "noreply@harborviewestates.com".to_string());
        let inbox = std::env::var("LEADS_INBOX")
            .unwrap_or_else(|_| "enquiries@harborviewestates.com".to_string());

        let transport = match (host, username, password) {
            (Some(host), Some(username), Some(password)) => {
                match SmtpTransport::starttls_relay(&host) {
                    Ok(builder) => Some(
                        builder
                            .credentials(Credentials::new(username, password))
                            .build(),
                    ),
                    Err(e) => {
                        tracing::error!("Failed to create SMTP relay: {}", e);
                        None
                    }
                }
            }
            _ => {
                tracing::info!("SMTP not configured, lead notifications disabled");
                None
            }
        };

        Self { transport, from, inbox }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            transport: None,
            from: "noreply@example.com".to_string(),
            inbox: "inbox@example.com".to_string(),
        }
    }

    /// Best-effort notification about a new lead. Failures are logged and
    /// swallowed; the lead row is already safely in the database.
    pub fn notify_new_lead(&self, lead: &Lead) {
        let transport = match &self.transport {
            Some(transport) => transport,
            None => return,
        };

        let subject = format!("New {} enquiry from {}", lead.inquiry_type, lead.name);
        let body = format!(
            "Name: {}\nEmail: {}\nPhone: {}\nType: {}\nReference: {}\n\n{}\n",
            lead.name,
            lead.email,
            lead.phone.as_deref().unwrap_or("-"),
            lead.inquiry_type,
            lead.reference,
            lead.message,
        );

        let message = match Message::builder()
            .from(match self.from.parse() {
                Ok(mailbox) => mailbox,
                Err(e) => {
                    tracing::error!("Invalid SMTP_FROM address: {}", e);
                    return;
                }
            })
            .to(match self.inbox.parse() {
                Ok(mailbox) => mailbox,
                Err(e) => {
                    tracing::error!("Invalid LEADS_INBOX address: {}", e);
                    return;
                }
            })
            .subject(subject)
            .body(body)
        {
            Ok(message) => message,
            Err(e) => {
                tracing::error!("Failed to build lead notification email: {}", e);
                return;
            }
        };

        if let Err(e) = transport.send(&message) {
            tracing::error!("Failed to send lead notification email: {}", e);
        }
    }
}
