mod notifications;

pub use notifications::{DynNotifier, LogNotifier, Notifier, WebhookNotifier};
