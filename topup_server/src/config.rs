use std::{env, io::Write, net::IpAddr};

use jwt_compact::alg::Hs256Key;
use log::*;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde_json::json;
use tempfile::NamedTempFile;
use topup_common::{
    helpers::{parse_boolean_flag, parse_list},
    Secret,
};
use topup_engine::gateway::RoboKassaConfig;

use crate::errors::ServerError;

const DEFAULT_TOPUP_HOST: &str = "127.0.0.1";
const DEFAULT_TOPUP_PORT: u16 = 8480;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/topup_store.db";
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 25;
/// The shortest HS256 secret we accept from the environment.
const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub auth: AuthConfig,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_forwarded: bool,
    /// If supplied, RoboKassa result callbacks are only accepted from these addresses.
    pub robokassa_whitelist: Option<Vec<IpAddr>>,
    pub robokassa: RoboKassaConfig,
    pub telegram: Option<TelegramConfig>,
    pub event_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_TOPUP_HOST.to_string(),
            port: DEFAULT_TOPUP_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            auth: AuthConfig::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            robokassa_whitelist: None,
            robokassa: RoboKassaConfig::default(),
            telegram: None,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("TOPUP_HOST").ok().unwrap_or_else(|| DEFAULT_TOPUP_HOST.into());
        let port = env::var("TOPUP_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for TOPUP_PORT. {e} Using the default, {DEFAULT_TOPUP_PORT}, \
                         instead."
                    );
                    DEFAULT_TOPUP_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_TOPUP_PORT);
        let database_url = env::var("TOPUP_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ TOPUP_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let auth = AuthConfig::try_from_env().unwrap_or_else(|e| {
            warn!(
                "🪛️ Could not load the authentication configuration from environment variables. {e}. Reverting to the \
                 default configuration."
            );
            AuthConfig::default()
        });
        let use_x_forwarded_for = parse_boolean_flag(env::var("TOPUP_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("TOPUP_USE_FORWARDED").ok(), false);
        let robokassa_whitelist = configure_robokassa_whitelist();
        let robokassa = RoboKassaConfig::from_env_or_default();
        let telegram = TelegramConfig::from_env();
        let event_buffer_size = env::var("TOPUP_EVENT_BUFFER_SIZE")
            .ok()
            .and_then(|s| {
                s.parse::<usize>()
                    .map_err(|e| warn!("🪛️ Invalid configuration value for TOPUP_EVENT_BUFFER_SIZE. {e}"))
                    .ok()
            })
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_EVENT_BUFFER_SIZE);
        Self {
            host,
            port,
            database_url,
            auth,
            use_x_forwarded_for,
            use_forwarded,
            robokassa_whitelist,
            robokassa,
            telegram,
            event_buffer_size,
        }
    }
}

fn configure_robokassa_whitelist() -> Option<Vec<IpAddr>> {
    let whitelist = env::var("TOPUP_ROBOKASSA_IP_WHITELIST").ok().and_then(|s| {
        if ["none", "false", "0", ""].contains(&s.trim().to_lowercase().as_str()) {
            info!("🪛️ RoboKassa IP whitelist is disabled.");
            return None;
        }
        let (addrs, rejected) = parse_list::<IpAddr>(&s);
        rejected.iter().for_each(|r| warn!("🪛️ Ignoring invalid IP address ({r}) in TOPUP_ROBOKASSA_IP_WHITELIST"));
        Some(addrs)
    });
    match &whitelist {
        Some(whitelist) if whitelist.is_empty() => {
            warn!(
                "🚨️ The RoboKassa IP whitelist was configured, but is empty. The server will run, but won't accept any \
                 payment notifications."
            );
        },
        None => {
            info!("🪛️ No RoboKassa IP whitelist is set. Only signature validation will be used.");
        },
        Some(v) => {
            let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
            info!("🪛️ RoboKassa IP whitelist: {addrs}");
        },
    }
    whitelist
}

//-------------------------------------------------  AuthConfig  -------------------------------------------------------
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// The shared HS256 secret that the authentication service signs access tokens with.
    pub jwt_secret: Secret<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        let mut tmpfile = NamedTempFile::new().ok().and_then(|f| f.keep().ok());
        warn!(
            "🚨️🚨️🚨️ The JWT secret has not been set. I'm using a random value for this session. DO NOT operate on \
             production like this, since no token issued by the authentication service will be accepted. 🚨️🚨️🚨️"
        );
        let secret = thread_rng().sample_iter(&Alphanumeric).take(48).map(char::from).collect::<String>();
        match &mut tmpfile {
            Some((f, p)) => {
                let key_data = json!({ "jwt_secret": secret }).to_string();
                match writeln!(f, "{key_data}") {
                    Ok(()) => warn!(
                        "🚨️🚨️🚨️ The JWT secret for this session was written to {}. If this is a production \
                         instance, you are doing it wrong! Set the TOPUP_JWT_SECRET environment variable instead. \
                         🚨️🚨️🚨️",
                        p.to_str().unwrap_or("???")
                    ),
                    Err(e) => warn!("🪛️ Could not write the JWT secret to the temporary file. {e}"),
                }
            },
            None => {
                warn!("🪛️ Could not create a temporary file to store the JWT secret.");
            },
        }
        Self { jwt_secret: Secret::new(secret) }
    }
}

impl AuthConfig {
    pub fn new<S: Into<String>>(secret: S) -> Self {
        Self { jwt_secret: Secret::new(secret.into()) }
    }

    pub fn try_from_env() -> Result<Self, ServerError> {
        let secret = env::var("TOPUP_JWT_SECRET")
            .map_err(|e| ServerError::ConfigurationError(format!("{e} [TOPUP_JWT_SECRET]")))?;
        if secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ServerError::ConfigurationError(format!(
                "TOPUP_JWT_SECRET must be at least {MIN_JWT_SECRET_LENGTH} characters long"
            )));
        }
        Ok(Self::new(secret))
    }

    pub fn key(&self) -> Hs256Key {
        Hs256Key::new(self.jwt_secret.reveal().as_bytes())
    }
}

//-------------------------------------------------  TelegramConfig  ---------------------------------------------------
#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: Secret<String>,
    pub admin_chat_ids: Vec<String>,
}

impl TelegramConfig {
    /// Returns `None`, which disables the notifier, unless a bot token and at least one chat id are configured.
    pub fn from_env() -> Option<Self> {
        let Some(bot_token) = env::var("TOPUP_TELEGRAM_BOT_TOKEN").ok().filter(|s| !s.trim().is_empty()) else {
            info!("🪛️ TOPUP_TELEGRAM_BOT_TOKEN is not set. Telegram notifications are disabled.");
            return None;
        };
        let ids = env::var("TOPUP_TELEGRAM_ADMIN_CHAT_IDS").unwrap_or_default();
        let (admin_chat_ids, _) = parse_list::<String>(&ids);
        if admin_chat_ids.is_empty() {
            warn!(
                "🪛️ A Telegram bot token is configured, but TOPUP_TELEGRAM_ADMIN_CHAT_IDS is empty. Telegram \
                 notifications are disabled."
            );
            return None;
        }
        info!("🪛️ Telegram notifications will be sent to {} chat(s).", admin_chat_ids.len());
        Some(Self { bot_token: Secret::new(bot_token.trim().to_string()), admin_chat_ids })
    }
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// A subset of the server configuration that is used to configure the server's behaviour. Generally we try to keep this
/// as small as possible, and exclude secrets to avoid passing sensitive information around the system.
#[derive(Clone, Debug)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
    /// Where customers are sent back to after visiting the hosted payment page.
    pub frontend_url: String,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            use_x_forwarded_for: config.use_x_forwarded_for,
            use_forwarded: config.use_forwarded,
            frontend_url: config.robokassa.frontend_url.clone(),
        }
    }
}
