use anyhow::Context;
use lettre::{
    message::{header::ContentType, Attachment as MailAttachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use crate::config::SmtpConfig;

#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachment: Option<Attachment>,
}

#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig, timeout: std::time::Duration) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
            .context("smtp relay")?
            .port(cfg.port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .timeout(Some(timeout))
            .build();
        let from = cfg.from.parse::<Mailbox>().context("parse MAIL_FROM")?;
        Ok(Self { transport, from })
    }
}

fn build_message(from: &Mailbox, email: OutgoingEmail) -> anyhow::Result<Message> {
    let to = email
        .to
        .parse::<Mailbox>()
        .with_context(|| format!("parse recipient {}", email.to))?;
    let builder = Message::builder()
        .from(from.clone())
        .to(to)
        .subject(email.subject);
    let html = SinglePart::html(email.html);

    let message = match email.attachment {
        Some(att) => {
            let content_type = ContentType::parse(&att.content_type)
                .map_err(|e| anyhow::anyhow!("invalid attachment content type: {}", e))?;
            builder.multipart(
                MultiPart::mixed()
                    .singlepart(html)
                    .singlepart(MailAttachment::new(att.filename).body(att.body, content_type)),
            )?
        }
        None => builder.singlepart(html)?,
    };
    Ok(message)
}

#[async_trait::async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        let to = email.to.clone();
        let subject = email.subject.clone();
        let message = build_message(&self.from, email)?;
        self.transport.send(message).await.context("smtp send")?;
        info!(%to, %subject, "email sent");
        Ok(())
    }
}

#[cfg(test)]
pub mod fake {
    use std::sync::Mutex;

    use super::{Mailer, OutgoingEmail};

    /// Keeps every message in memory instead of talking to a relay.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<OutgoingEmail>>,
    }

    #[async_trait::async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(email);
            Ok(())
        }
    }
}
