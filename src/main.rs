use dotenv::dotenv;
use os_database_backup::config::{load, NotificationSettings, Settings};
use os_database_backup::notification::{BackupStatus, SlackNotifier};
use os_database_backup::pipeline;
use std::process::ExitCode;
use tracing::{error, info};

/// Any failed run exits with this code.
const FAILURE_EXIT_CODE: u8 = 4;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv().ok();
    tracing_subscriber::fmt::init();
    info!("Starting OpenStack database backup");

    let config = match load() {
        Ok(config) => config,
        Err(e) => {
            error!("Reading configuration is not successful: {}", e);
            return ExitCode::from(FAILURE_EXIT_CODE);
        }
    };
    let notifier = SlackNotifier::new(&NotificationSettings::from_config(&config));

    let settings = match Settings::from_config(config) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Loading configuration is not successful: {}", e);
            let _ = notifier
                .notify(BackupStatus::Failed {
                    error: e.to_string(),
                })
                .await;
            return ExitCode::from(FAILURE_EXIT_CODE);
        }
    };

    match pipeline::run(&settings).await {
        Ok(backup_name) => {
            info!("Backup {} shipped and rotated", backup_name);
            // Delivery failures are already logged by the notifier.
            let _ = notifier.notify(BackupStatus::Succeeded { backup_name }).await;
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Backup run is not successful: {}", e);
            let _ = notifier
                .notify(BackupStatus::Failed {
                    error: e.to_string(),
                })
                .await;
            ExitCode::from(FAILURE_EXIT_CODE)
        }
    }
}
