use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
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
    // Be explicit about which envars to print. Merchant keys live in the database, never in the environment.
    const DISPLAY_ENVS: [&str; 9] = [
        "RUST_LOG",
        "VPAY_HOST",
        "VPAY_PORT",
        "VPAY_DATABASE_URL",
        "VPAY_FRONTEND_URL",
        "VPAY_MAX_CONNECTIONS",
        "VPAY_RUN_MIGRATIONS",
        "VPAY_MAX_ALLOCATION_ATTEMPTS",
        "VPAY_NOTIFY_TIMEOUT",
    ];

    println!("Current environment values:");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
