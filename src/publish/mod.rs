// src/publish/mod.rs
//! Outbound publishing: Slack notifications, Medium drafts, and the
//! GitHub Pages markdown export.

pub mod medium;
pub mod pages;
pub mod slack;

pub use medium::MediumClient;
pub use pages::PagesPublisher;
pub use slack::SlackNotifier;
