use crate::config::NotificationSettings;
use crate::error::NotificationError;
use crate::prelude::*;
use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{error, info};

const USERNAME: &str = "backup-robot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupStatus {
    Succeeded { backup_name: String },
    Failed { error: String },
}

#[derive(Debug, Serialize)]
pub struct Payload {
    pub text: String,
    pub username: String,
    pub channel: String,
    pub icon_emoji: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Serialize)]
pub struct Attachment {
    pub fields: Vec<Field>,
}

#[derive(Debug, Serialize)]
pub struct Field {
    pub title: String,
    pub value: String,
    pub short: bool,
}

impl Field {
    fn new(title: &str, value: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            value: value.into(),
            short: false,
        }
    }
}

/// Posts the run's outcome to a Slack incoming webhook.
pub struct SlackNotifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
    channel: String,
    dc: String,
    backup_type: String,
}

impl SlackNotifier {
    pub fn new(settings: &NotificationSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: settings.slack.webhook_url.clone(),
            channel: settings.slack.channel.clone(),
            dc: settings.dc.clone(),
            backup_type: settings.backup_type.clone(),
        }
    }

    pub fn payload(&self, status: &BackupStatus, now: DateTime<Local>) -> Payload {
        let mut fields = vec![
            Field::new("Date", now.to_string()),
            Field::new("DCName", format!("🏢 {}", self.dc)),
            Field::new("Type", self.backup_type.clone()),
        ];

        let (text, icon_emoji) = match status {
            BackupStatus::Succeeded { backup_name } => {
                fields.push(Field::new("Status", "✅ succeeded"));
                fields.push(Field::new("Name", backup_name.clone()));
                ("Backup procedure is successful", ":ok:")
            }
            BackupStatus::Failed { error } => {
                fields.push(Field::new("Status", "❌ Failed"));
                fields.push(Field::new("Debug", error.clone()));
                ("Backup procedure is not successful", ":warning:")
            }
        };

        Payload {
            text: text.to_string(),
            username: USERNAME.to_string(),
            channel: self.channel.clone(),
            icon_emoji: icon_emoji.to_string(),
            attachments: vec![Attachment { fields }],
        }
    }

    /// Sends one notification. Failures are logged and returned for the caller to ignore.
    pub async fn notify(&self, status: BackupStatus) -> Result<()> {
        let Some(url) = &self.webhook_url else {
            info!("Slack webhook is not configured, skipping notification");
            return Ok(());
        };

        let payload = self.payload(&status, Local::now());
        let response = self.client.post(url).json(&payload).send().await.map_err(|e| {
            error!("Sending notification is failed: {}", e);
            NotificationError::Send(e)
        })?;

        if !response.status().is_success() {
            error!("Sending notification is failed: webhook answered {}", response.status());
            return Err(NotificationError::Status(response.status()).into());
        }

        info!("Notification Sent Successfully!");
        Ok(())
    }
}
