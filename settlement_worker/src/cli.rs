use std::{env, env::VarError};

/// The worker takes no arguments, so any argument is a request for help. Returns true if help was printed.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 14] = [
        "RUST_LOG",
        "SSE_DATABASE_URL",
        "SSE_MAX_DB_CONNECTIONS",
        "SSE_RUN_MIGRATIONS",
        "SSE_HOLD_POLICY",
        "SSE_SETTLEMENT_HOLD_DAYS",
        "SSE_MONTHLY_SETTLEMENT_DAY",
        "SSE_PROBATION_ORDERS",
        "SSE_DEFAULT_REFUND_METHOD",
        "SSE_BATCH_INTERVAL_SECS",
        "SSE_REFUND_RETRY_INTERVAL_SECS",
        "SSE_RECONCILE_INTERVAL_SECS",
        "SSE_GATEWAY_URL",
        "SSE_GATEWAY_API_KEY",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(_) if name.ends_with("_KEY") => "****".into(),
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
