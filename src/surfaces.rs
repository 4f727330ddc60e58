// User-facing surfaces
// Loading / error modals and notifications the relay drives but does not
// render; the default implementation writes them to the log
//
// Numan Thabit 2025 Nov

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorModal {
    pub title: String,
    pub description: String,
    pub close_label: String,
}

impl ErrorModal {
    pub fn fee_rpc_error(repeated: bool) -> Self {
        Self {
            title: "fee_calculating_rpc_error_title".into(),
            description: "fee_calculating_rpc_error_description".into(),
            close_label: if repeated {
                "cancel".into()
            } else {
                "fee_calculating_rpc_error_close".into()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    PinChanged,
    TransactionSent { txhash: String },
    DelegationSent { txhash: String, validator: String },
}

#[async_trait]
pub trait Surfaces: Send + Sync {
    fn show_loading(&self);
    fn hide_loading(&self);
    /// Resolves once the user dismisses the modal.
    async fn show_error(&self, modal: ErrorModal);
    fn send_notification(&self, notification: Notification);
}

/// Headless surfaces: modals are dismissed immediately.
#[derive(Debug, Default, Clone)]
pub struct LogSurfaces;

#[async_trait]
impl Surfaces for LogSurfaces {
    fn show_loading(&self) {
        info!("loading");
    }

    fn hide_loading(&self) {
        info!("loading done");
    }

    async fn show_error(&self, modal: ErrorModal) {
        info!(title = %modal.title, close = %modal.close_label, "error modal");
    }

    fn send_notification(&self, notification: Notification) {
        info!(?notification, "notification");
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingSurfaces {
        pub events: Mutex<Vec<String>>,
        pub modals: Mutex<Vec<ErrorModal>>,
        pub notifications: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Surfaces for RecordingSurfaces {
        fn show_loading(&self) {
            self.events.lock().unwrap().push("loading".into());
        }

        fn hide_loading(&self) {
            self.events.lock().unwrap().push("loaded".into());
        }

        async fn show_error(&self, modal: ErrorModal) {
            self.events.lock().unwrap().push(format!("error:{}", modal.close_label));
            self.modals.lock().unwrap().push(modal);
        }

        fn send_notification(&self, notification: Notification) {
            self.events.lock().unwrap().push("notification".into());
            self.notifications.lock().unwrap().push(notification);
        }
    }
}
