use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use tera::{Context, Tera};

use crate::{
    config::MailConfig,
    db::Store,
    errors::NotifyError,
    mail::{MailTransport, OutgoingMail},
    models::BookingDetails,
};

const CONFIRMATION_TEMPLATE: &str = "booking_confirmation.txt";

lazy_static! {
    pub static ref TEMPLATES: Tera = {
        let mut tera = Tera::default();
        if let Err(e) = tera.add_raw_template(
            CONFIRMATION_TEMPLATE,
            include_str!("../templates/booking_confirmation.txt"),
        ) {
            log::error!("Parsing error(s): {}", e);
            ::std::process::exit(1);
        }
        tera
    };
}

/// What happened to one confirmation. Always a value, never a crash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent { recipient: String },
    NotFound { booking_id: String },
    Failed { detail: String },
}

impl NotifyOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, NotifyOutcome::Sent { .. })
    }
}

impl fmt::Display for NotifyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyOutcome::Sent { recipient } => {
                write!(f, "Email sent successfully to {}", recipient)
            }
            NotifyOutcome::NotFound { booking_id } => {
                write!(f, "Booking with ID {} not found", booking_id)
            }
            NotifyOutcome::Failed { detail } => write!(f, "Error sending email: {}", detail),
        }
    }
}

/// Sends booking confirmations. Holds no per-call state, so one instance
/// can serve any number of concurrent bookings.
#[derive(Clone)]
pub struct Notifier {
    store: Store,
    transport: Arc<dyn MailTransport>,
    from_address: String,
}

impl Notifier {
    pub fn new(store: Store, transport: Arc<dyn MailTransport>, config: &MailConfig) -> Self {
        Self {
            store,
            transport,
            from_address: config.default_from_email.clone(),
        }
    }

    pub async fn notify_booking_confirmed(&self, booking_id: &str) -> NotifyOutcome {
        let outcome = match self.deliver(booking_id).await {
            Ok(recipient) => NotifyOutcome::Sent { recipient },
            Err(NotifyError::NotFound(booking_id)) => NotifyOutcome::NotFound { booking_id },
            Err(e) => NotifyOutcome::Failed {
                detail: e.to_string(),
            },
        };

        match &outcome {
            NotifyOutcome::Sent { .. } => log::info!("{}", outcome),
            NotifyOutcome::NotFound { .. } => log::warn!("{}", outcome),
            NotifyOutcome::Failed { .. } => {
                log::error!("Booking {}: {}", booking_id, outcome)
            }
        }
        outcome
    }

    async fn deliver(&self, booking_id: &str) -> Result<String, NotifyError> {
        let details = self
            .store
            .booking_details(booking_id)
            .await?
            .ok_or_else(|| NotifyError::NotFound(booking_id.to_owned()))?;

        let mail = self.render(&details)?;
        self.transport.send(&mail).await?;
        Ok(details.guest_email)
    }

    pub fn render(&self, details: &BookingDetails) -> Result<OutgoingMail, NotifyError> {
        let mut context = Context::new();
        context.insert("recipient_name", &details.guest_display_name());
        context.insert("listing_title", &details.listing_title);
        context.insert("check_in_date", &details.check_in_date.to_string());
        context.insert("check_out_date", &details.check_out_date.to_string());
        context.insert("total_price", &format!("{:.2}", details.total_price));
        context.insert("booking_ref", &details.booking_id);

        let body = TEMPLATES.render(CONFIRMATION_TEMPLATE, &context)?;

        Ok(OutgoingMail {
            subject: format!("Booking Confirmation - {}", details.listing_title),
            body,
            from: self.from_address.clone(),
            to: vec![details.guest_email.clone()],
        })
    }
}
