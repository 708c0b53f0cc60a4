//! Post-commit order notifications.
//!
//! Delivery capabilities are injected as [`SmsSender`] and [`Mailer`]. A
//! failed channel is logged and reported, never propagated: a committed order
//! stays committed no matter what happens here.

pub mod messages;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use storefront_core::OrderId;
use storefront_orders::OrderSnapshot;

use crate::config::Config;
use crate::jobs::{Job, JobExecutor, JobId, JobKind, JobResult, JobStore, RetryPolicy};

/// Job kind the confirmation email is queued under.
pub const CONFIRMATION_JOB_KIND: &str = "notifications.order_confirmation";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// An email ready to hand to a [`Mailer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub trait SmsSender: Send + Sync {
    fn send_sms(&self, to: &str, body: &str) -> Result<(), NotificationError>;
}

pub trait Mailer: Send + Sync {
    fn send_mail(&self, mail: &OutgoingMail) -> Result<(), NotificationError>;
}

impl<T: SmsSender + ?Sized> SmsSender for Arc<T> {
    fn send_sms(&self, to: &str, body: &str) -> Result<(), NotificationError> {
        (**self).send_sms(to, body)
    }
}

impl<T: Mailer + ?Sized> Mailer for Arc<T> {
    fn send_mail(&self, mail: &OutgoingMail) -> Result<(), NotificationError> {
        (**self).send_mail(mail)
    }
}

/// SMS sender that only logs. Used when no gateway is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSms;

impl SmsSender for LogSms {
    fn send_sms(&self, to: &str, body: &str) -> Result<(), NotificationError> {
        info!(to, body, "sms (not sent, no gateway configured)");
        Ok(())
    }
}

/// Mailer that only logs. Used when no mail transport is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send_mail(&self, mail: &OutgoingMail) -> Result<(), NotificationError> {
        info!(to = %mail.to, subject = %mail.subject, "email (not sent, no transport configured)");
        Ok(())
    }
}

/// What happened on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ChannelOutcome {
    Sent,
    /// Not attempted, e.g. no recipient address
    Skipped(String),
    Failed(String),
    /// Handed to the job runner
    Queued(JobId),
}

impl ChannelOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ChannelOutcome::Failed(_))
    }
}

/// Per-channel outcomes of one [`NotificationDispatcher::notify`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub customer_sms: ChannelOutcome,
    pub admin_email: ChannelOutcome,
    pub confirmation_email: ChannelOutcome,
}

/// Job payload for the confirmation email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationEmail {
    pub order_id: OrderId,
    pub from: String,
    pub to: String,
}

impl ConfirmationEmail {
    pub fn to_mail(&self) -> OutgoingMail {
        OutgoingMail {
            from: self.from.clone(),
            to: self.to.clone(),
            subject: messages::confirmation_subject(self.order_id),
            body: messages::confirmation_body(self.order_id),
        }
    }
}

struct ConfirmationQueue {
    jobs: Arc<dyn JobStore>,
    policy: RetryPolicy,
}

/// Sends the customer SMS, the admin email and the confirmation email for a
/// placed order.
pub struct NotificationDispatcher {
    sms: Arc<dyn SmsSender>,
    mailer: Arc<dyn Mailer>,
    from_email: String,
    admin_email: String,
    confirmations: Option<ConfirmationQueue>,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("from_email", &self.from_email)
            .field("admin_email", &self.admin_email)
            .field("queued_confirmations", &self.confirmations.is_some())
            .finish()
    }
}

impl NotificationDispatcher {
    pub fn new(
        sms: Arc<dyn SmsSender>,
        mailer: Arc<dyn Mailer>,
        from_email: impl Into<String>,
        admin_email: impl Into<String>,
    ) -> Self {
        Self {
            sms,
            mailer,
            from_email: from_email.into(),
            admin_email: admin_email.into(),
            confirmations: None,
        }
    }

    pub fn from_config(sms: Arc<dyn SmsSender>, mailer: Arc<dyn Mailer>, config: &Config) -> Self {
        Self::new(sms, mailer, &config.from_email, &config.admin_email)
    }

    /// Dispatcher that only logs. Useful for tools and tests that place
    /// orders without caring about delivery.
    pub fn logging(config: &Config) -> Self {
        Self::from_config(Arc::new(LogSms), Arc::new(LogMailer), config)
    }

    /// Route confirmation emails through `jobs` instead of sending inline.
    pub fn with_job_queue(mut self, jobs: Arc<dyn JobStore>, policy: RetryPolicy) -> Self {
        self.confirmations = Some(ConfirmationQueue { jobs, policy });
        self
    }

    /// Notify everyone interested in a freshly placed order.
    ///
    /// Never fails. Each channel is attempted independently.
    pub fn notify(&self, snapshot: &OrderSnapshot) -> DispatchReport {
        let report = DispatchReport {
            customer_sms: self.send_customer_sms(snapshot),
            admin_email: self.send_admin_email(snapshot),
            confirmation_email: self.send_confirmation(snapshot),
        };
        debug!(order_id = %snapshot.order_id, ?report, "order notifications dispatched");
        report
    }

    fn send_customer_sms(&self, snapshot: &OrderSnapshot) -> ChannelOutcome {
        let Some(phone) = snapshot.customer.phone_number.as_deref() else {
            return ChannelOutcome::Skipped("customer has no phone number".to_string());
        };
        match self.sms.send_sms(phone, &messages::customer_sms(snapshot)) {
            Ok(()) => ChannelOutcome::Sent,
            Err(e) => {
                warn!(order_id = %snapshot.order_id, error = %e, "failed to send order sms");
                ChannelOutcome::Failed(e.to_string())
            }
        }
    }

    fn send_admin_email(&self, snapshot: &OrderSnapshot) -> ChannelOutcome {
        let mail = messages::admin_mail(snapshot, &self.from_email, &self.admin_email);
        match self.mailer.send_mail(&mail) {
            Ok(()) => ChannelOutcome::Sent,
            Err(e) => {
                warn!(order_id = %snapshot.order_id, error = %e, "failed to send admin order email");
                ChannelOutcome::Failed(e.to_string())
            }
        }
    }

    fn send_confirmation(&self, snapshot: &OrderSnapshot) -> ChannelOutcome {
        let Some(email) = snapshot.customer.email.as_deref() else {
            return ChannelOutcome::Skipped("customer has no email address".to_string());
        };
        let payload = ConfirmationEmail {
            order_id: snapshot.order_id,
            from: self.from_email.clone(),
            to: email.to_string(),
        };

        match &self.confirmations {
            Some(queue) => self.enqueue_confirmation(queue, &payload),
            None => match self.mailer.send_mail(&payload.to_mail()) {
                Ok(()) => ChannelOutcome::Sent,
                Err(e) => {
                    warn!(order_id = %payload.order_id, error = %e, "failed to send order confirmation");
                    ChannelOutcome::Failed(e.to_string())
                }
            },
        }
    }

    fn enqueue_confirmation(
        &self,
        queue: &ConfirmationQueue,
        payload: &ConfirmationEmail,
    ) -> ChannelOutcome {
        let value = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => return ChannelOutcome::Failed(e.to_string()),
        };
        let job = Job::new(JobKind::new(CONFIRMATION_JOB_KIND), value)
            .with_retry_policy(queue.policy.clone());

        match queue.jobs.enqueue(job) {
            Ok(job_id) => {
                debug!(order_id = %payload.order_id, %job_id, "order confirmation queued");
                ChannelOutcome::Queued(job_id)
            }
            Err(e) => {
                warn!(order_id = %payload.order_id, error = %e, "failed to queue order confirmation");
                ChannelOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Retry policy for confirmation emails taken from configuration.
pub fn confirmation_retry_policy(config: &Config) -> RetryPolicy {
    RetryPolicy::fixed(
        config.confirmation_max_attempts,
        config.confirmation_retry_delay,
    )
}

/// Register the handler that delivers queued confirmation emails.
pub fn register_confirmation_handler<S>(executor: &mut JobExecutor<S>, mailer: Arc<dyn Mailer>)
where
    S: JobStore + 'static,
{
    executor.register_handler(CONFIRMATION_JOB_KIND, move |job| {
        let payload: ConfirmationEmail = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => return JobResult::Failure(format!("invalid confirmation payload: {e}")),
        };
        match mailer.send_mail(&payload.to_mail()) {
            Ok(()) => JobResult::Success,
            Err(e) => JobResult::Failure(e.to_string()),
        }
    });
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use rust_decimal_macros::dec;

    use storefront_core::{CustomerId, Price, ProductId};
    use storefront_orders::{Customer, OrderStatus, SnapshotLine};

    use super::testing::*;
    use super::*;
    use crate::jobs::InMemoryJobStore;

    fn snapshot(customer: Customer) -> OrderSnapshot {
        let price = Price::new(dec!(4.50)).unwrap();
        OrderSnapshot {
            order_id: OrderId::new(),
            customer,
            created_at: Utc::now(),
            status: OrderStatus::Pending,
            items: vec![SnapshotLine {
                product: ProductId::new(),
                product_name: "Sourdough".to_string(),
                price,
                quantity: 1,
                total_price: price.times(1),
            }],
            total_price: price.times(1),
        }
    }

    fn full_customer() -> Customer {
        Customer::new(CustomerId::new(), "Alice")
            .with_email("alice@example.com")
            .with_phone_number("+15550100")
    }

    fn dispatcher(sms: Arc<dyn SmsSender>, mailer: Arc<dyn Mailer>) -> NotificationDispatcher {
        NotificationDispatcher::new(sms, mailer, "shop@example.com", "ops@example.com")
    }

    #[test]
    fn all_channels_sent_inline() {
        let sms = Arc::new(RecordingSms::default());
        let mailer = Arc::new(RecordingMailer::default());
        let snap = snapshot(full_customer());

        let report = dispatcher(sms.clone(), mailer.clone()).notify(&snap);

        assert_eq!(report.customer_sms, ChannelOutcome::Sent);
        assert_eq!(report.admin_email, ChannelOutcome::Sent);
        assert_eq!(report.confirmation_email, ChannelOutcome::Sent);

        let texts = sms.sent.lock().unwrap();
        assert_eq!(texts[0].0, "+15550100");
        assert!(texts[0].1.ends_with("Total: 4.50."));

        let mails = mailer.sent.lock().unwrap();
        assert_eq!(mails[0].to, "ops@example.com");
        assert_eq!(mails[0].from, "shop@example.com");
        assert_eq!(mails[1].to, "alice@example.com");
        assert_eq!(mails[1].subject, format!("Order Confirmation #{}", snap.order_id));
    }

    #[test]
    fn missing_contacts_skip_customer_channels() {
        let sms = Arc::new(RecordingSms::default());
        let mailer = Arc::new(RecordingMailer::default());
        let snap = snapshot(Customer::new(CustomerId::new(), "Bob"));

        let report = dispatcher(sms.clone(), mailer.clone()).notify(&snap);

        assert!(matches!(report.customer_sms, ChannelOutcome::Skipped(_)));
        assert_eq!(report.admin_email, ChannelOutcome::Sent);
        assert!(matches!(report.confirmation_email, ChannelOutcome::Skipped(_)));
        assert!(sms.sent.lock().unwrap().is_empty());
        assert_eq!(mailer.subjects(), vec![format!("New Order #{}", snap.order_id)]);
    }

    #[test]
    fn sms_failure_does_not_stop_email() {
        let mailer = Arc::new(RecordingMailer::default());
        let report = dispatcher(Arc::new(FailingSms), mailer.clone()).notify(&snapshot(full_customer()));

        assert!(report.customer_sms.is_failed());
        assert_eq!(report.admin_email, ChannelOutcome::Sent);
        assert_eq!(mailer.sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn mail_failure_is_reported_not_raised() {
        let mailer = Arc::new(FailingMailer::default());
        let report = dispatcher(Arc::new(RecordingSms::default()), mailer.clone())
            .notify(&snapshot(full_customer()));

        assert_eq!(report.customer_sms, ChannelOutcome::Sent);
        assert!(report.admin_email.is_failed());
        assert!(report.confirmation_email.is_failed());
        assert_eq!(mailer.attempts(), 2);
    }

    #[test]
    fn queued_confirmation_is_delivered_by_executor() {
        let jobs = InMemoryJobStore::arc();
        let mailer = Arc::new(RecordingMailer::default());
        let dispatcher = dispatcher(Arc::new(RecordingSms::default()), mailer.clone())
            .with_job_queue(jobs.clone(), RetryPolicy::fixed(3, Duration::ZERO));

        let snap = snapshot(full_customer());
        let report = dispatcher.notify(&snap);
        assert!(matches!(report.confirmation_email, ChannelOutcome::Queued(_)));
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);

        let mut executor = JobExecutor::new(jobs.clone());
        register_confirmation_handler(&mut executor, mailer.clone());
        assert_eq!(executor.run_pending().unwrap(), 1);

        assert_eq!(
            mailer.subjects().last().cloned(),
            Some(format!("Order Confirmation #{}", snap.order_id))
        );
        assert_eq!(jobs.stats().unwrap().completed, 1);
    }

    #[test]
    fn confirmation_dead_letters_after_max_attempts() {
        let jobs = InMemoryJobStore::arc();
        let failing = Arc::new(FailingMailer::default());
        let dispatcher = dispatcher(Arc::new(RecordingSms::default()), failing.clone())
            .with_job_queue(jobs.clone(), RetryPolicy::fixed(3, Duration::ZERO));

        let report = dispatcher.notify(&snapshot(full_customer()));
        assert!(report.admin_email.is_failed());
        assert!(matches!(report.confirmation_email, ChannelOutcome::Queued(_)));

        let mut executor = JobExecutor::new(jobs.clone());
        register_confirmation_handler(&mut executor, failing.clone());
        // Zero delay: every retry is due immediately.
        assert_eq!(executor.run_pending().unwrap(), 3);

        // One inline admin attempt plus three confirmation attempts.
        assert_eq!(failing.attempts(), 4);
        let dead = jobs.list_dead_letters(10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].job.attempt, 3);
        assert_eq!(dead[0].reason, "delivery failed: smtp unavailable");
    }

    #[test]
    fn retry_policy_follows_config() {
        let config = Config::default();
        let policy = confirmation_retry_policy(&config);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_after(1), Duration::from_secs(60));
    }
}
