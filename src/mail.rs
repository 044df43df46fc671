use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    config::{MailBackend, MailConfig},
    errors::TransportError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub subject: String,
    pub body: String,
    pub from: String,
    pub to: Vec<String>,
}

impl OutgoingMail {
    fn to_rfc822(&self) -> String {
        format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}",
            self.from,
            self.to.join(", "),
            self.subject,
            self.body
        )
    }
}

/// Outbound mail. Implementations must report every delivery failure.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError>;
}

fn check_recipients(mail: &OutgoingMail) -> Result<(), TransportError> {
    if mail.to.is_empty() || mail.to.iter().any(|addr| !addr.contains('@')) {
        return Err(TransportError::Rejected(format!(
            "invalid recipient list: {:?}",
            mail.to
        )));
    }
    Ok(())
}

/// Writes each message to the log instead of delivering it.
pub struct ConsoleTransport;

#[async_trait]
impl MailTransport for ConsoleTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError> {
        check_recipients(mail)?;
        log::info!("Outgoing mail:\n{}", mail.to_rfc822());
        Ok(())
    }
}

/// Drops one file per message into an outbox directory.
pub struct FileTransport {
    dir: PathBuf,
}

impl FileTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl MailTransport for FileTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError> {
        check_recipients(mail)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let name = format!(
            "{}-{}.eml",
            chrono::Utc::now().format("%Y%m%d%H%M%S"),
            uuid::Uuid::new_v4()
        );
        let path = self.dir.join(name);
        tokio::fs::write(&path, mail.to_rfc822()).await?;
        log::debug!("Mail written to {}", path.display());
        Ok(())
    }
}

pub fn transport_from_config(config: &MailConfig) -> Arc<dyn MailTransport> {
    match config.backend {
        MailBackend::Console => Arc::new(ConsoleTransport),
        MailBackend::File => Arc::new(FileTransport::new(config.outbox_dir.clone())),
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records messages in memory, or fails every send when built with `failing`.
    #[derive(Default)]
    pub struct RecordingTransport {
        pub sent: Mutex<Vec<OutgoingMail>>,
        failure: Option<String>,
    }

    impl RecordingTransport {
        pub fn failing(detail: &str) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failure: Some(detail.to_owned()),
            }
        }

        pub fn sent(&self) -> Vec<OutgoingMail> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError> {
            if let Some(detail) = &self.failure {
                return Err(TransportError::Rejected(detail.clone()));
            }
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(to: &[&str]) -> OutgoingMail {
        OutgoingMail {
            subject: "Booking Confirmation - Cozy Beach House".into(),
            body: "Your booking has been confirmed!".into(),
            from: "noreply@alxtravel.com".into(),
            to: to.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn file_transport_writes_one_file_per_message() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FileTransport::new(dir.path().join("outbox"));
        transport.send(&mail(&["a@b.com"])).await.unwrap();

        let mut entries = std::fs::read_dir(dir.path().join("outbox")).unwrap();
        let entry = entries.next().unwrap().unwrap();
        assert!(entries.next().is_none());
        let contents = std::fs::read_to_string(entry.path()).unwrap();
        assert!(contents.contains("To: a@b.com"));
        assert!(contents.contains("Subject: Booking Confirmation - Cozy Beach House"));
    }

    #[tokio::test]
    async fn transports_reject_bad_recipients() {
        assert!(matches!(
            ConsoleTransport.send(&mail(&[])).await,
            Err(TransportError::Rejected(_))
        ));
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FileTransport::new(dir.path()).send(&mail(&["nobody"])).await,
            Err(TransportError::Rejected(_))
        ));
    }
}
