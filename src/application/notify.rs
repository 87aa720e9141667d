//! Best-effort notifications.
//!
//! Nothing in here can fail the operation that triggered it: sends run on a
//! spawned task and failures end up in the log only.

use crate::domain::notification::{EmailMessage, Geolocation};
use crate::domain::ports::{GeolocatorRef, MailerRef};
use crate::domain::user::User;
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const UNKNOWN_LOCATION: &str = "Unknown location";

/// Fire-and-forget email submission.
#[derive(Clone)]
pub struct NotificationDispatcher {
    mailer: MailerRef,
}

impl NotificationDispatcher {
    pub fn new(mailer: MailerRef) -> Self {
        Self { mailer }
    }

    /// Sends `message` off the caller's path. Awaiting the handle is optional;
    /// it resolves to whether delivery succeeded.
    pub fn dispatch(&self, message: EmailMessage) -> JoinHandle<bool> {
        let mailer = Arc::clone(&self.mailer);
        tokio::spawn(async move { deliver(&mailer, message).await })
    }
}

async fn deliver(mailer: &MailerRef, message: EmailMessage) -> bool {
    let to = message.to.clone();
    match mailer.send(message).await {
        Ok(()) => {
            tracing::debug!(to = %to, "email delivered");
            true
        }
        Err(e) => {
            tracing::error!(to = %to, error = %e, "email delivery failed");
            false
        }
    }
}

/// Loopback, private, link-local and unparseable addresses never leave the host.
fn is_local_address(ip: &str) -> bool {
    let ip = ip.trim();
    if ip.is_empty() || ip.eq_ignore_ascii_case("localhost") {
        return true;
    }
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        Ok(IpAddr::V6(v6)) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
        Err(_) => true,
    }
}

/// Emails a user about a new login, with the location of the login IP.
#[derive(Clone)]
pub struct LoginNotifier {
    geolocator: Option<GeolocatorRef>,
    dispatcher: NotificationDispatcher,
}

impl LoginNotifier {
    pub fn new(geolocator: Option<GeolocatorRef>, dispatcher: NotificationDispatcher) -> Self {
        Self {
            geolocator,
            dispatcher,
        }
    }

    /// Human-readable location of `ip`. Never fails.
    pub async fn locate(&self, ip: &str) -> String {
        if is_local_address(ip) {
            return Geolocation::local_network().formatted();
        }
        let Some(geolocator) = &self.geolocator else {
            return UNKNOWN_LOCATION.to_string();
        };
        match geolocator.locate(ip).await {
            Ok(location) => {
                let formatted = location.formatted();
                if formatted.is_empty() {
                    UNKNOWN_LOCATION.to_string()
                } else {
                    formatted
                }
            }
            Err(e) => {
                tracing::warn!(ip, error = %e, "geolocation failed, using unknown location");
                UNKNOWN_LOCATION.to_string()
            }
        }
    }

    pub fn notify(&self, user: &User, ip: &str) -> JoinHandle<bool> {
        self.notify_at(user, ip, Utc::now())
    }

    pub fn notify_at(&self, user: &User, ip: &str, login_time: DateTime<Utc>) -> JoinHandle<bool> {
        let notifier = self.clone();
        let ip = ip.to_string();
        let to = user.email.clone();
        let name = user.name.clone();

        tokio::spawn(async move {
            let location = notifier.locate(&ip).await;
            let message = EmailMessage {
                to,
                subject: "New login to your account".to_string(),
                body: format!(
                    "Hello {name},\n\nA login to your account was detected at {} from {location}.\n\
                     If this was not you, please reset your password.\n",
                    login_time.format("%Y-%m-%d %H:%M:%S UTC")
                ),
            };
            deliver(&notifier.dispatcher.mailer, message).await
        })
    }
}
