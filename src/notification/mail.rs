//! Outbound mail transport

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

use crate::config::SmtpConfig;

/// Display name on every outgoing message
const SENDER_NAME: &str = "Wallet Service";

/// Port that speaks TLS from the first byte
const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Mail transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// SMTP relay client.
///
/// Port 465 uses implicit TLS; any other port upgrades with STARTTLS when the
/// server offers it.
pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let credentials = Credentials::new(config.user.clone(), config.pass.clone());

        let builder = if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| MailError::Transport(e.to_string()))?
        } else {
            let tls = TlsParameters::new(config.host.clone())
                .map_err(|e| MailError::Transport(e.to_string()))?;
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .tls(Tls::Opportunistic(tls))
        };

        let transport = builder
            .port(config.port)
            .credentials(credentials)
            .build();

        let from = Mailbox::new(Some(SENDER_NAME.to_string()), parse_address(&config.user)?);

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(Mailbox::new(None, parse_address(&mail.to)?))
            .subject(mail.subject)
            .header(ContentType::TEXT_HTML)
            .body(mail.html_body)
            .map_err(|e| MailError::Build(e.to_string()))?;

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        tracing::debug!(to = %mail.to, code = %response.code(), "Mail accepted by relay");
        Ok(())
    }
}

fn parse_address(address: &str) -> Result<Address, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}
