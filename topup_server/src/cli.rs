use std::{env, env::VarError};

const HELP: &str = include_str!("./cli-help.txt");

/// The server is configured entirely from the environment. Any argument at all prints the help text and the current
/// configuration, and tells the caller not to start the server.
pub fn handle_command_line_args() -> bool {
    if env::args().len() <= 1 {
        return false;
    }
    println!("\n{HELP}\n");
    print_environment();
    true
}

fn print_environment() {
    // Passwords, the JWT secret and the bot token are never listed here
    const DISPLAY_ENVS: [&str; 16] = [
        "RUST_LOG",
        "TOPUP_HOST",
        "TOPUP_PORT",
        "TOPUP_DATABASE_URL",
        "TOPUP_FRONTEND_URL",
        "TOPUP_USE_X_FORWARDED_FOR",
        "TOPUP_USE_FORWARDED",
        "TOPUP_ROBOKASSA_IP_WHITELIST",
        "TOPUP_ROBOKASSA_MERCHANT_LOGIN",
        "TOPUP_ROBOKASSA_IS_TEST",
        "TOPUP_ROBOKASSA_HASH_ALGORITHM",
        "TOPUP_ROBOKASSA_BASE_URL",
        "TOPUP_GATEWAY_TIMEOUT_MS",
        "TOPUP_REFERRAL_PERCENTAGE",
        "TOPUP_EVENT_BUFFER_SIZE",
        "TOPUP_TELEGRAM_ADMIN_CHAT_IDS",
    ];

    println!("Configuration from the environment (secrets omitted):");
    for name in DISPLAY_ENVS {
        let value = match env::var(name) {
            Ok(v) => v,
            Err(VarError::NotPresent) => "(unset)".to_string(),
            Err(VarError::NotUnicode(v)) => format!("(not unicode) {}", v.to_string_lossy()),
        };
        println!("  {name:<35} {value}");
    }
}
