use std::path::PathBuf;

use clap::Args;

pub const DEFAULT_API_URL: &str = "https://b2b.itresume.ru/api/statistics";

#[derive(Args, Debug, Clone)]
pub struct DbConfig {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,
}

#[derive(Args, Debug, Clone)]
pub struct LogConfig {
    /// Directory for daily log files
    #[arg(long, env = "LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// Number of daily log files to keep
    #[arg(long, env = "LOG_KEEP_FILES", default_value_t = 3)]
    pub log_keep_files: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ApiConfig {
    #[arg(long = "api-url", env = "STATS_API_URL", default_value = DEFAULT_API_URL)]
    pub url: String,

    #[arg(long = "api-client", env = "STATS_API_CLIENT")]
    pub client: String,

    #[arg(long = "api-client-key", env = "STATS_API_CLIENT_KEY", hide_env_values = true)]
    pub client_key: String,

    /// How many days back from now to request
    #[arg(
        long,
        env = "STATS_DAYS_BACK",
        default_value_t = 7,
        value_parser = clap::value_parser!(u32).range(1..=3650)
    )]
    pub days_back: u32,

    #[arg(long = "api-timeout-secs", env = "STATS_API_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct MirrorConfig {
    /// Directory for CSV mirrors when Google Sheets is not configured
    #[arg(long, env = "MIRROR_DIR", default_value = "mirror")]
    pub mirror_dir: PathBuf,

    #[arg(long, env = "SHEETS_SPREADSHEET_ID")]
    pub sheets_spreadsheet_id: Option<String>,

    /// OAuth access token with the spreadsheets scope
    #[arg(long, env = "SHEETS_ACCESS_TOKEN", hide_env_values = true)]
    pub sheets_access_token: Option<String>,

    #[arg(long, env = "SHEETS_RAW_WORKSHEET", default_value = "Raw Data")]
    pub raw_worksheet: String,

    #[arg(long, env = "SHEETS_REPORT_WORKSHEET", default_value = "Daily Report")]
    pub report_worksheet: String,

    /// Link to the mirror placed in the notification email
    #[arg(long, env = "SPREADSHEET_URL")]
    pub spreadsheet_url: Option<String>,
}

impl MirrorConfig {
    pub fn sheets(&self) -> Option<(&str, &str)> {
        match (&self.sheets_spreadsheet_id, &self.sheets_access_token) {
            (Some(id), Some(token)) if !id.is_empty() && !token.is_empty() => {
                Some((id.as_str(), token.as_str()))
            }
            _ => None,
        }
    }

    pub fn link(&self) -> String {
        if let Some(url) = &self.spreadsheet_url {
            return url.clone();
        }
        match self.sheets() {
            Some((id, _)) => format!("https://docs.google.com/spreadsheets/d/{id}/edit"),
            None => self.mirror_dir.display().to_string(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct EmailConfig {
    #[arg(long, env = "EMAIL_SENDER")]
    pub email_sender: Option<String>,

    #[arg(long, env = "EMAIL_SENDER_PASSWORD", hide_env_values = true)]
    pub email_sender_password: Option<String>,

    #[arg(long, env = "EMAIL_RECEIVER")]
    pub email_receiver: Option<String>,

    #[arg(long, env = "EMAIL_SMTP_SERVER", default_value = "smtp.gmail.com")]
    pub smtp_server: String,

    #[arg(long, env = "EMAIL_SMTP_PORT", default_value_t = 465)]
    pub smtp_port: u16,
}

/// Sender, password and receiver, when all three are configured.
pub struct EmailCredentials<'a> {
    pub sender: &'a str,
    pub password: &'a str,
    pub receiver: &'a str,
}

impl EmailConfig {
    pub fn credentials(&self) -> Option<EmailCredentials<'_>> {
        Some(EmailCredentials {
            sender: present(&self.email_sender)?,
            password: present(&self.email_sender_password)?,
            receiver: present(&self.email_receiver)?,
        })
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Everything one `run` needs, built once from the command line and environment.
#[derive(Args, Debug, Clone)]
pub struct RunConfig {
    #[command(flatten)]
    pub api: ApiConfig,

    #[command(flatten)]
    pub mirror: MirrorConfig,

    #[command(flatten)]
    pub email: EmailConfig,
}
